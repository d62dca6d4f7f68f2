use thiserror::Error;

/// A single HTTP exchange with the measurement server failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("server answered HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("body transfer failed: {0}")]
    Body(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn is_status(&self, code: u16) -> bool {
        matches!(self, TransportError::Status(c) if *c == code)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else if e.is_body() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

/// A measurement phase could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasureError {
    #[error("upload failed: host upload size limit exceeded")]
    SizeLimitExceeded,

    #[error("upload failed")]
    UploadFailed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
