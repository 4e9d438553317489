use thiserror::Error;

/// Result type for chunk planning
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Errors raised before any synthesis work is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    /// Script is empty or whitespace only
    #[error("Script is empty")]
    EmptyScript,

    /// Script contains no terminal punctuation at all
    #[error("Script contains no sentence boundaries")]
    NoSentenceBoundary,

    /// Chunk limits must be positive
    #[error("Invalid chunk limits: max_chars={max_chars}, max_sentences={max_sentences}")]
    InvalidLimits {
        max_chars: usize,
        max_sentences: usize,
    },

    /// Speaker segments do not tile the script text
    #[error("Invalid speaker segments: {0}")]
    InvalidSegments(String),
}
