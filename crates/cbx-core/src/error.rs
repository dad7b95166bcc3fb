use thiserror::Error;

pub type CbxResult<T> = Result<T, CbxError>;

/// Error taxonomy shared across the workspace.
///
/// `Crypto` and `EnvelopeCorrupt` are deliberately distinct: the former means
/// the cipher itself rejected its inputs (bad key length, malformed ciphertext
/// length, bad padding), the latter means decryption succeeded at the cipher
/// level but the plaintext failed downstream parsing — which almost always
/// means the wrong key was used, not transport corruption.
#[derive(Debug, Error)]
pub enum CbxError {
    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("envelope corrupt (wrong key?): {0}")]
    EnvelopeCorrupt(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid task transition: {0}")]
    InvalidTransition(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CbxError {
    pub fn crypto(msg: impl Into<String>) -> Self {
        CbxError::Crypto(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        CbxError::EnvelopeCorrupt(msg.into())
    }
}
