use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatsError {
    #[error("Invalid stat path '{path}': expected 2 or 3 dot-separated segments, got {segments}")]
    InvalidPath { path: String, segments: usize },

    #[error("Invalid stat path '{path}': empty segment")]
    EmptySegment { path: String },
}
