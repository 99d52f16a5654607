//! sealfile: streaming authenticated file encryption
//!
//! A container is a self-describing ciphertext file:
//!
//! ```text
//! [0 .. 24)   session header (random, not secret)
//! [24 .. )    chunks, in plaintext order:
//!               MESSAGE chunk: CHUNK_SIZE + ABYTES bytes (all but the last)
//!               FINAL chunk:   n + ABYTES bytes, 0 <= n < CHUNK_SIZE (always last)
//! ```
//!
//! Each chunk is one XChaCha20-Poly1305 operation under a per-session
//! subkey derived from the key and the header. The chunk's tag byte
//! (`MESSAGE` or `FINAL`) travels encrypted inside the chunk body, so the
//! decoder can pair it with the physical end of input and turn truncation
//! or trailing data into a hard error. The container records no length.
//!
//! Key material, the header, and plaintext chunk buffers live in memory
//! that is pinned against swapping and zeroed on release.

pub mod codec;
pub mod error;
pub mod keyfile;
pub mod secret;
pub mod stream;

pub use codec::{decrypt_file, decrypt_stream, encrypt_file, encrypt_stream, generate_key_file};
pub use error::{SealError, SealResult};
pub use keyfile::Key;
pub use secret::SecretBuf;
pub use stream::{OpenStream, SealStream, Tag};

/// Size of the symmetric key in bytes (256-bit)
pub const KEY_LEN: usize = 32;

/// Size of the per-session container header
pub const HEADER_LEN: usize = 24;

/// Plaintext bytes per non-final chunk
pub const CHUNK_SIZE: usize = 2048;

/// Per-chunk overhead: 1 encrypted tag byte + 16-byte Poly1305 MAC
pub const ABYTES: usize = 17;

/// Ciphertext bytes of a full chunk
pub const ENC_CHUNK_SIZE: usize = CHUNK_SIZE + ABYTES;
