pub mod error;
mod guard;
pub mod report;
pub mod smoke;

pub use error::SmokeError;
pub use report::{DestroyOutcome, Failure, SmokeReport};
pub use smoke::run_smoke_test;
