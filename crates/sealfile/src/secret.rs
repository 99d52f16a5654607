//! Pinned, scrub-on-drop buffers for sensitive bytes

use zeroize::Zeroize;

use crate::{SealError, SealResult};

/// A heap buffer that is locked into physical memory for its lifetime
/// and zeroed before release.
///
/// Locking keeps the bytes out of swap; the `Drop` impl zeroes them on
/// every exit path, including early returns and errors, before the pages
/// are unlocked and freed.
pub struct SecretBuf {
    bytes: Box<[u8]>,
    lock: Option<region::LockGuard>,
}

impl SecretBuf {
    /// Allocate a zero-filled buffer of `len` bytes and pin it.
    pub fn zeroed(len: usize) -> SealResult<Self> {
        let bytes = vec![0u8; len].into_boxed_slice();
        let lock = if len == 0 {
            None
        } else {
            let guard = region::lock(bytes.as_ptr(), bytes.len()).map_err(|e| {
                SealError::SecureMemory(format!("failed to pin {len} bytes to RAM: {e}"))
            })?;
            Some(guard)
        };
        Ok(Self { bytes, lock })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for SecretBuf {
    fn drop(&mut self) {
        // Scrub first, then unlock, then let the allocation go.
        self.bytes.zeroize();
        self.lock.take();
    }
}

impl std::fmt::Debug for SecretBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuf")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
