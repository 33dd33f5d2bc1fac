pub mod aliases;
pub mod resolver;

mod errors;
pub mod models;

pub use errors::StatsError;
pub use models::*;
pub use resolver::{available_stats, StatPath, StatResolver, TOTAL_STAT};
