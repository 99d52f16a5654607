use thiserror::Error;

pub type SealResult<T> = Result<T, SealError>;

/// Every failure aborts the whole operation; nothing here is retried.
#[derive(Debug, Error)]
pub enum SealError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid keyfile: {len} bytes, expected {}", crate::KEY_LEN)]
    InvalidKeyfile { len: usize },

    #[error("ciphertext file does not contain a valid header")]
    InvalidHeader,

    #[error("corrupt chunk detected at index {index}")]
    AuthenticationFailed { index: u64 },

    #[error("ciphertext ended without a final chunk: container is truncated")]
    PrematureEndOfStream,

    #[error("final chunk seen before end of ciphertext: container has trailing data")]
    UnexpectedFinalTag,

    #[error("secure memory operation failed: {0}")]
    SecureMemory(String),

    /// Cipher-level failure outside the authentication path, such as a
    /// chunk larger than the framing protocol can carry.
    #[error("cipher failure: {0}")]
    Crypto(&'static str),
}
