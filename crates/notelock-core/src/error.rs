use thiserror::Error;

/// Errors produced by the key custodian, the note codec and the note store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NoteError {
    /// Key facility unavailable or generation parameters rejected.
    #[error("key generation failed: {reason}")]
    KeyGeneration { reason: String },
    /// The authentication validity window of the master key has lapsed.
    #[error("master key unavailable: re-authentication required")]
    KeyUnavailable,
    /// Ciphertext or tag failed verification (tampered, corrupt or wrong key).
    #[error("authentication tag mismatch")]
    AuthenticationTagMismatch,
    /// Header magic or scheme tag not recognised.
    #[error("unsupported file format: {reason}")]
    UnsupportedFormat { reason: String },
    /// Requested note or exported copy does not exist.
    #[error("file not found: {name}")]
    NotFound { name: String },
    /// Identifier does not follow the naming convention.
    #[error("invalid file name: {name}")]
    InvalidName { name: String },
    /// Underlying storage failure.
    #[error("i/o failure: {reason}")]
    Io { reason: String },
}

impl NoteError {
    pub fn io<E: ToString>(err: E) -> Self {
        NoteError::Io {
            reason: err.to_string(),
        }
    }

    /// Map an I/O error, turning `NotFound` into the domain variant for `name`.
    pub fn from_io(err: std::io::Error, name: &str) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            NoteError::NotFound {
                name: name.to_string(),
            }
        } else {
            NoteError::io(err)
        }
    }
}
