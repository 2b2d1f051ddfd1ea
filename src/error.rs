use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can end a conversion round.
///
/// Every variant is terminal for the round it happens in; nothing is retried.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Network or transport failure while talking to the backend
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("Conversion failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The returned archive could not be read
    #[error("Failed to read result archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The backend returned JSON we could not understand
    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Nothing was staged for conversion
    #[error("Select at least one file first")]
    EmptySelection,

    /// A file was rejected by the accepted media family
    #[error("Unsupported file '{name}' ({media_type})")]
    Unsupported { name: String, media_type: String },

    #[error("Too many files: {count} (at most {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("Selection too large: {total} bytes (at most {max})")]
    TooLarge { total: u64, max: u64 },

    #[error("Conversion cancelled")]
    Cancelled,

    /// A round is already in flight
    #[error("A conversion is already running")]
    Busy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings storage could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ConvertError {
    /// User errors are reported as a prompt before any request goes out.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ConvertError::EmptySelection
                | ConvertError::Unsupported { .. }
                | ConvertError::TooManyFiles { .. }
                | ConvertError::TooLarge { .. }
        )
    }
}
