use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Actuator error: {0}")]
    Actuator(String),

    #[error("Generator error: {0}")]
    Generator(String),

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
