use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Driver timed out: {0}")]
    Timeout(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid driver response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DriverError::Timeout(err.to_string())
        } else if err.is_decode() {
            DriverError::Decode(err.to_string())
        } else {
            DriverError::Network(err.to_string())
        }
    }
}
