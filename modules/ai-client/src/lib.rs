pub mod claude;
pub mod error;
pub mod util;

pub use claude::Claude;
pub use error::{AiError, Result};
pub use util::truncate_chars;
