//! Chunk framing over XChaCha20-Poly1305
//!
//! One encryption session works like this:
//!
//! - A random 24-byte header is drawn and a session subkey is derived
//!   from it and the key via HKDF-SHA256. The header goes on the wire in
//!   the clear; every chunk is bound to it through the subkey.
//! - Chunk `i` is sealed with nonce `i` (64-bit little-endian counter,
//!   zero-padded to 24 bytes). The counter nonce makes chunks
//!   positionally dependent: they cannot be reordered, dropped, or
//!   decoded out of sequence.
//! - The chunk's tag byte is prepended to the plaintext before the AEAD
//!   pass, so it is both confidential and authenticated. Ciphertext
//!   length is always plaintext length + [`ABYTES`](crate::ABYTES).
//!
//! Both halves run the AEAD in place over a pinned scratch buffer, so
//! plaintext bytes only ever sit in memory that is locked against swap
//! and zeroed on drop.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::keyfile::Key;
use crate::secret::SecretBuf;
use crate::{SealError, SealResult, ABYTES, CHUNK_SIZE, HEADER_LEN};

/// Domain separation for the per-session subkey.
const STREAM_INFO: &[u8] = b"sealfile/stream/v1";

const TAG_MESSAGE: u8 = 0x00;
const TAG_FINAL: u8 = 0x03;

/// Poly1305 MAC bytes trailing each chunk.
const MAC_LEN: usize = ABYTES - 1;

/// Per-chunk marker: every chunk is `Message` except the stream's
/// terminal chunk, which is `Final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Message,
    Final,
}

impl Tag {
    fn wire(self) -> u8 {
        match self {
            Tag::Message => TAG_MESSAGE,
            Tag::Final => TAG_FINAL,
        }
    }

    fn from_wire(byte: u8, index: u64) -> SealResult<Self> {
        match byte {
            TAG_MESSAGE => Ok(Tag::Message),
            TAG_FINAL => Ok(Tag::Final),
            // Unreachable from our encoder; a forged tag byte cannot
            // carry a valid MAC under the session subkey.
            _ => Err(SealError::AuthenticationFailed { index }),
        }
    }
}

/// HKDF-SHA256(ikm = key, salt = header) -> per-session subkey.
fn derive_cipher(key: &Key, header: &[u8]) -> SealResult<XChaCha20Poly1305> {
    let mut subkey = [0u8; 32];
    Hkdf::<Sha256>::new(Some(header), key.as_bytes())
        .expand(STREAM_INFO, &mut subkey)
        // A 32-byte OKM is always within the HKDF output bound.
        .map_err(|_| SealError::InvalidHeader)?;
    let cipher = XChaCha20Poly1305::new((&subkey).into());
    subkey.zeroize();
    Ok(cipher)
}

fn chunk_nonce(index: u64) -> XNonce {
    let mut nonce = [0u8; 24];
    nonce[..8].copy_from_slice(&index.to_le_bytes());
    nonce.into()
}

/// Encryption half of the framing protocol.
pub struct SealStream {
    cipher: XChaCha20Poly1305,
    scratch: SecretBuf,
    index: u64,
    finalized: bool,
}

impl SealStream {
    /// Start a new session: fresh random header, derived subkey.
    ///
    /// The returned header is pinned like any other key-derived
    /// material; it must be written as the first bytes of the
    /// container, and the decoder needs it before anything else.
    pub fn init(key: &Key) -> SealResult<(Self, SecretBuf)> {
        let mut header = SecretBuf::zeroed(HEADER_LEN)?;
        OsRng.fill_bytes(header.as_mut_slice());
        let cipher = derive_cipher(key, header.as_slice())?;
        tracing::debug!("encryption session initialized");
        Ok((
            Self {
                cipher,
                scratch: SecretBuf::zeroed(CHUNK_SIZE + 1)?,
                index: 0,
                finalized: false,
            },
            header,
        ))
    }

    /// Seal one chunk. Output length is input length + [`ABYTES`](crate::ABYTES).
    ///
    /// `Tag::Final` must be used exactly once, on the chunk produced by
    /// the read that reached end of input — even when that read returned
    /// zero bytes.
    pub fn seal_chunk(&mut self, plaintext: &[u8], tag: Tag) -> SealResult<Vec<u8>> {
        debug_assert!(!self.finalized, "seal_chunk called after the final chunk");
        if plaintext.len() > CHUNK_SIZE {
            return Err(SealError::Crypto("chunk exceeds maximum plaintext size"));
        }
        let body_len = plaintext.len() + 1;
        let body = &mut self.scratch.as_mut_slice()[..body_len];
        body[0] = tag.wire();
        body[1..].copy_from_slice(plaintext);
        let mac = self
            .cipher
            .encrypt_in_place_detached(&chunk_nonce(self.index), b"", body)
            .map_err(|_| SealError::Crypto("chunk encryption failed"))?;
        let mut sealed = Vec::with_capacity(body_len + MAC_LEN);
        sealed.extend_from_slice(body);
        sealed.extend_from_slice(mac.as_slice());
        self.index += 1;
        if tag == Tag::Final {
            self.finalized = true;
        }
        Ok(sealed)
    }
}

/// Decryption half. Chunks must be presented in container order.
pub struct OpenStream {
    cipher: XChaCha20Poly1305,
    scratch: SecretBuf,
    index: u64,
    finished: bool,
}

impl OpenStream {
    /// Initialize decode state from a received container header.
    pub fn init(key: &Key, header: &[u8]) -> SealResult<Self> {
        if header.len() != HEADER_LEN {
            return Err(SealError::InvalidHeader);
        }
        let cipher = derive_cipher(key, header)?;
        tracing::debug!("decryption session initialized");
        Ok(Self {
            cipher,
            scratch: SecretBuf::zeroed(CHUNK_SIZE + 1)?,
            index: 0,
            finished: false,
        })
    }

    /// Open one chunk and couple its tag to the physical end of input.
    ///
    /// The recovered plaintext is borrowed from a pinned scratch buffer
    /// owned by the stream; it stays valid until the next call.
    ///
    /// `at_eof` must be true exactly when no ciphertext remains after
    /// this chunk. The container records no length anywhere, so the only
    /// truncation and extension detector is that `Final` coincides with
    /// the end of input: a `Message` tag at eof means the container lost
    /// its tail, and a `Final` tag before eof means bytes were appended
    /// or streams were spliced.
    pub fn open_chunk(&mut self, ciphertext: &[u8], at_eof: bool) -> SealResult<(&[u8], Tag)> {
        debug_assert!(!self.finished, "open_chunk called after the final chunk");
        if ciphertext.len() < ABYTES {
            // Too short to hold a tag byte and a MAC: the container was
            // cut off mid-chunk (or right at a chunk boundary).
            return Err(SealError::PrematureEndOfStream);
        }
        let body_len = ciphertext.len() - MAC_LEN;
        if body_len > self.scratch.len() {
            return Err(SealError::Crypto("chunk exceeds maximum ciphertext size"));
        }
        let body = &mut self.scratch.as_mut_slice()[..body_len];
        body.copy_from_slice(&ciphertext[..body_len]);
        let mac = chacha20poly1305::Tag::from_slice(&ciphertext[body_len..]);
        self.cipher
            .decrypt_in_place_detached(&chunk_nonce(self.index), b"", body, mac)
            .map_err(|_| SealError::AuthenticationFailed { index: self.index })?;
        let tag = Tag::from_wire(body[0], self.index)?;
        self.index += 1;
        match (at_eof, tag) {
            (true, Tag::Final) => self.finished = true,
            (true, Tag::Message) => return Err(SealError::PrematureEndOfStream),
            (false, Tag::Final) => return Err(SealError::UnexpectedFinalTag),
            (false, Tag::Message) => {}
        }
        Ok((&self.scratch.as_slice()[1..body_len], tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> Key {
        Key::generate().unwrap()
    }

    #[test]
    fn test_single_chunk_roundtrip() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let sealed = seal.seal_chunk(b"hello, sealed world", Tag::Final).unwrap();

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        let (plaintext, tag) = open.open_chunk(&sealed, true).unwrap();

        assert_eq!(plaintext, b"hello, sealed world");
        assert_eq!(tag, Tag::Final);
    }

    #[test]
    fn test_chunk_overhead_is_fixed() {
        let key = test_key();
        let (mut seal, _) = SealStream::init(&key).unwrap();
        for len in [0usize, 1, 100, 2048] {
            let sealed = seal.seal_chunk(&vec![0u8; len], Tag::Message).unwrap();
            assert_eq!(sealed.len(), len + ABYTES);
        }
    }

    #[test]
    fn test_empty_final_chunk_roundtrip() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let sealed = seal.seal_chunk(b"", Tag::Final).unwrap();
        assert_eq!(sealed.len(), ABYTES);

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        let (plaintext, tag) = open.open_chunk(&sealed, true).unwrap();
        assert!(plaintext.is_empty());
        assert_eq!(tag, Tag::Final);
    }

    #[test]
    fn test_header_lives_in_redacted_secret_memory() {
        let (_, header) = SealStream::init(&test_key()).unwrap();
        assert_eq!(header.len(), HEADER_LEN);
        let rendered = format!("{header:?}");
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_oversized_plaintext_is_a_cipher_error() {
        let key = test_key();
        let (mut seal, _) = SealStream::init(&key).unwrap();
        assert!(matches!(
            seal.seal_chunk(&vec![0u8; CHUNK_SIZE + 1], Tag::Message),
            Err(SealError::Crypto(_))
        ));
    }

    #[test]
    fn test_oversized_ciphertext_is_a_cipher_error() {
        let key = test_key();
        let (_, header) = SealStream::init(&key).unwrap();
        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&vec![0u8; CHUNK_SIZE + ABYTES + 1], false),
            Err(SealError::Crypto(_))
        ));
    }

    #[test]
    fn test_tampered_chunk_fails_authentication() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let mut sealed = seal.seal_chunk(b"payload", Tag::Final).unwrap();
        sealed[3] ^= 0x01;

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&sealed, true),
            Err(SealError::AuthenticationFailed { index: 0 })
        ));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let sealed = seal.seal_chunk(b"payload", Tag::Final).unwrap();

        let other = test_key();
        let mut open = OpenStream::init(&other, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&sealed, true),
            Err(SealError::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn test_message_tag_at_eof_is_premature_end() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let sealed = seal.seal_chunk(b"interior chunk", Tag::Message).unwrap();

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&sealed, true),
            Err(SealError::PrematureEndOfStream)
        ));
    }

    #[test]
    fn test_final_tag_before_eof_is_unexpected() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let sealed = seal.seal_chunk(b"terminal chunk", Tag::Final).unwrap();

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&sealed, false),
            Err(SealError::UnexpectedFinalTag)
        ));
    }

    #[test]
    fn test_chunks_cannot_be_reordered() {
        let key = test_key();
        let (mut seal, header) = SealStream::init(&key).unwrap();
        let first = seal.seal_chunk(b"first", Tag::Message).unwrap();
        let second = seal.seal_chunk(b"second", Tag::Final).unwrap();

        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&second, false),
            Err(SealError::AuthenticationFailed { index: 0 })
        ));

        // In order they still decode.
        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        open.open_chunk(&first, false).unwrap();
        let (plaintext, _) = open.open_chunk(&second, true).unwrap();
        assert_eq!(plaintext, b"second");
    }

    #[test]
    fn test_short_header_rejected() {
        let key = test_key();
        assert!(matches!(
            OpenStream::init(&key, &[0u8; HEADER_LEN - 1]),
            Err(SealError::InvalidHeader)
        ));
    }

    #[test]
    fn test_chunk_shorter_than_overhead_is_premature_end() {
        let key = test_key();
        let (_, header) = SealStream::init(&key).unwrap();
        let mut open = OpenStream::init(&key, header.as_slice()).unwrap();
        assert!(matches!(
            open.open_chunk(&[0u8; ABYTES - 1], true),
            Err(SealError::PrematureEndOfStream)
        ));
    }

    #[test]
    fn test_sessions_have_distinct_headers() {
        let key = test_key();
        let (_, h1) = SealStream::init(&key).unwrap();
        let (_, h2) = SealStream::init(&key).unwrap();
        assert_ne!(h1.as_slice(), h2.as_slice(), "headers must be fresh per session");
    }

    #[test]
    fn test_identical_plaintext_distinct_ciphertext_across_keys() {
        let plaintext = b"the same bytes every time";
        let (mut s1, h1) = SealStream::init(&test_key()).unwrap();
        let (mut s2, h2) = SealStream::init(&test_key()).unwrap();

        assert_ne!(h1.as_slice(), h2.as_slice());
        assert_ne!(
            s1.seal_chunk(plaintext, Tag::Final).unwrap(),
            s2.seal_chunk(plaintext, Tag::Final).unwrap()
        );
    }
}
