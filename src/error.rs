use crate::session::TransitionError;

pub type CoachResult<T> = Result<T, CoachError>;

/// Errors surfaced by the coaching engine.
///
/// A missing pose or an unresolved reference frame is not an error: the
/// evaluation loop recovers from both locally and reports them as tick
/// outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum CoachError {
    #[error("reference data unavailable for clip '{clip}': {reason}")]
    DataUnavailable { clip: String, reason: String },

    #[error("feedback request failed: {0}")]
    FeedbackRequestFailed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// Session cannot start until the blocking condition is cleared
    #[error("session blocked: {0}")]
    SessionBlocked(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl CoachError {
    pub fn data_unavailable(clip: impl Into<String>, reason: impl ToString) -> Self {
        Self::DataUnavailable {
            clip: clip.into(),
            reason: reason.to_string(),
        }
    }
}
