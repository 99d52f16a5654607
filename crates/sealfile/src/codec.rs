//! Drives bytes between files and the stream framer, chunk by chunk
//!
//! One call is one full-file operation: read, transform, write, in
//! container order, with every output chunk written in full before the
//! next read. Any I/O or framing failure aborts the whole run; bytes
//! already flushed to the destination are left behind and the caller is
//! expected to treat an aborted destination as invalid.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::keyfile::{self, Key};
use crate::secret::SecretBuf;
use crate::stream::{OpenStream, SealStream, Tag};
use crate::{SealError, SealResult, CHUNK_SIZE, ENC_CHUNK_SIZE, HEADER_LEN};

/// Read until `buf` is full or the source is exhausted.
///
/// Returns the number of bytes read; anything shorter than `buf` means
/// end of input was reached on this fill.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Encrypt everything from `reader` into a container on `writer`.
pub fn encrypt_stream(
    key: &Key,
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> SealResult<()> {
    let (mut stream, header) = SealStream::init(key)?;
    writer.write_all(header.as_slice())?;
    drop(header);

    let mut buf = SecretBuf::zeroed(CHUNK_SIZE)?;
    let mut chunks: u64 = 0;
    loop {
        let n = fill(reader, buf.as_mut_slice())?;
        // A short fill means this read reached end of input. A plaintext
        // that is an exact multiple of the chunk size therefore ends in
        // a zero-length final chunk, produced by the read after it.
        let tag = if n < CHUNK_SIZE { Tag::Final } else { Tag::Message };
        let sealed = stream.seal_chunk(&buf.as_slice()[..n], tag)?;
        writer.write_all(&sealed)?;
        chunks += 1;
        if tag == Tag::Final {
            break;
        }
    }
    writer.flush()?;
    debug!(chunks, "container sealed");
    Ok(())
}

/// Decrypt a container from `reader`, writing recovered plaintext to
/// `writer`.
pub fn decrypt_stream(
    key: &Key,
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> SealResult<()> {
    let mut header = SecretBuf::zeroed(HEADER_LEN)?;
    if fill(reader, header.as_mut_slice())? < HEADER_LEN {
        return Err(SealError::InvalidHeader);
    }
    let mut stream = OpenStream::init(key, header.as_slice())?;

    let mut buf = vec![0u8; ENC_CHUNK_SIZE];
    let mut chunks: u64 = 0;
    loop {
        let n = fill(reader, &mut buf)?;
        // Every non-final chunk is exactly ENC_CHUNK_SIZE bytes and the
        // final chunk is always shorter, so a short fill marks end of
        // input. A zero-length fill here is a container cut off at a
        // chunk boundary; open_chunk turns it into PrematureEndOfStream.
        let at_eof = n < ENC_CHUNK_SIZE;
        let (plaintext, tag) = stream.open_chunk(&buf[..n], at_eof)?;
        writer.write_all(plaintext)?;
        chunks += 1;
        if tag == Tag::Final {
            break;
        }
    }
    writer.flush()?;
    debug!(chunks, "container opened");
    Ok(())
}

/// Generate a fresh key and write it to `keyfile`.
pub fn generate_key_file(keyfile: &Path) -> SealResult<()> {
    let key = Key::generate()?;
    keyfile::persist(&key, keyfile)
}

/// Encrypt `source` into a new container at `dest`.
///
/// The destination is created fresh; if the run fails partway, whatever
/// was already flushed stays on disk.
pub fn encrypt_file(keyfile: &Path, source: &Path, dest: &Path) -> SealResult<()> {
    let key = keyfile::load(keyfile)?;
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(create_dest(dest)?);
    encrypt_stream(&key, &mut reader, &mut writer)?;
    finish(writer)?;
    info!("ciphertext written: {}", dest.display());
    Ok(())
}

/// Recover the plaintext of a container at `source` into a new file at
/// `dest`, verifying integrity and completeness along the way.
pub fn decrypt_file(keyfile: &Path, source: &Path, dest: &Path) -> SealResult<()> {
    let key = keyfile::load(keyfile)?;
    let mut reader = BufReader::new(File::open(source)?);
    let mut writer = BufWriter::new(create_dest(dest)?);
    decrypt_stream(&key, &mut reader, &mut writer)?;
    finish(writer)?;
    info!("plaintext written: {}", dest.display());
    Ok(())
}

fn create_dest(path: &Path) -> SealResult<File> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

/// Hand the buffered writer back and make close failures visible.
fn finish(writer: BufWriter<File>) -> SealResult<()> {
    let file = writer
        .into_inner()
        .map_err(|e| SealError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}
