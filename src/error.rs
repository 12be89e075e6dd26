use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Malformed file contents. `offset` is the byte offset into an
    /// in-memory buffer, or the raw virtual offset for data read through a
    /// block transport.
    #[error("format error at byte {offset}: {message}")]
    Format { offset: u64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("io error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        Error::Format {
            offset,
            message: message.into(),
        }
    }

    /// True for errors caused by malformed file contents.
    pub fn is_format(&self) -> bool {
        matches!(self, Error::Format { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}
