pub mod config;
pub mod error;
pub mod types;

pub use config::{Environment, OutreachConfig};
pub use error::OutreachError;
pub use types::*;
