#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("feature not available: {0}")]
    NotAvailable(String),
}

impl Error {
    pub(crate) fn probe<S: Into<String>>(msg: S) -> Self {
        Error::Probe(msg.into())
    }

    pub(crate) fn invalid_data<S: Into<String>>(msg: S) -> Self {
        Error::InvalidData(msg.into())
    }

    pub(crate) fn not_available<S: Into<String>>(msg: S) -> Self {
        Error::NotAvailable(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
