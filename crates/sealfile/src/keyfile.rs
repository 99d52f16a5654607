//! Keyfile generation, persistence, and loading
//!
//! A keyfile is exactly [`KEY_LEN`](crate::KEY_LEN) raw bytes. No header,
//! no metadata.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use rand::rngs::OsRng;
use rand::RngCore;

use crate::secret::SecretBuf;
use crate::{SealError, SealResult, KEY_LEN};

/// The symmetric encryption key. Pinned in memory and zeroed on drop.
pub struct Key {
    buf: SecretBuf,
}

impl Key {
    /// Draw a fresh random key from the operating system RNG.
    pub fn generate() -> SealResult<Self> {
        let mut buf = SecretBuf::zeroed(KEY_LEN)?;
        OsRng.fill_bytes(buf.as_mut_slice());
        tracing::debug!("generated a fresh {}-byte key", KEY_LEN);
        Ok(Self { buf })
    }

    fn from_buf(buf: SecretBuf) -> Self {
        debug_assert_eq!(buf.len(), KEY_LEN);
        Self { buf }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key").field("bytes", &"[REDACTED]").finish()
    }
}

/// Write the raw key bytes to `path`.
///
/// The keyfile is created fresh (never overwritten) and owner-only on
/// unix. A short write or a failed flush is fatal; a partially written
/// keyfile is never reported as success.
pub fn persist(key: &Key, path: &Path) -> SealResult<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(key.as_bytes())?;
    file.sync_all()?;
    tracing::info!("keyfile written: {}", path.display());
    Ok(())
}

/// Read exactly [`KEY_LEN`](crate::KEY_LEN) bytes from `path`.
///
/// A shorter file is `InvalidKeyfile`, never a truncated key. Trailing
/// bytes beyond the key length are ignored.
pub fn load(path: &Path) -> SealResult<Key> {
    let mut file = File::open(path)?;
    let mut buf = SecretBuf::zeroed(KEY_LEN)?;
    let mut filled = 0;
    while filled < KEY_LEN {
        match file.read(&mut buf.as_mut_slice()[filled..])? {
            0 => return Err(SealError::InvalidKeyfile { len: filled }),
            n => filled += n,
        }
    }
    tracing::debug!("keyfile loaded: {}", path.display());
    Ok(Key::from_buf(buf))
}
