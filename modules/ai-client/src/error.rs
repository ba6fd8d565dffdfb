use thiserror::Error;

pub type Result<T> = std::result::Result<T, AiError>;

/// Failures talking to the model provider.
#[derive(Debug, Error)]
pub enum AiError {
    /// Connection, TLS or timeout failure before a response arrived.
    #[error("request to Claude failed: {0}")]
    Network(String),

    #[error("Claude returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body (or a request header) could not be built or read.
    #[error("malformed Claude payload: {0}")]
    Parse(String),

    #[error("Claude reply contained no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for AiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Network(e.to_string())
        }
    }
}
