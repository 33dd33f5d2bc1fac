pub mod mocks;
pub mod remote;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use mocks::{score, RecordingSink};
#[allow(unused_imports)]
pub use remote::MockRemote;
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder, SCORE_METRIC};
