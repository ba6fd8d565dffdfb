pub mod actuator;
pub mod call;
pub mod candidate;
pub mod dedup;
pub mod engagement;
pub mod error;
pub mod filter;
pub mod generator;
pub mod pacing;
pub mod rate_limit;
pub mod reconcile;
pub mod recorder;
pub mod select;
pub mod store;
pub mod strategy;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
