use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    LoadingReferenceData,
    Ready,
    /// 1-based index into the clip list
    Active { step: usize },
    /// Passed through when advancing from the last clip
    Completed,
    /// Reference data could not be loaded; blocks `start`
    LoadFailed { message: String },
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn step(&self) -> Option<usize> {
        match self {
            Self::Active { step } => Some(*step),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot {action} while {state:?}")]
    InvalidTransition { action: &'static str, state: SessionState },

    #[error("score {score} is below the {required} required to advance")]
    AdvanceGated { score: u8, required: u8 },

    #[error("reference data failed to load: {0}")]
    LoadFailed(String),
}

/// When the performer may move on to the next clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvancePolicy {
    #[default]
    Always,
    MinScore(u8),
}

impl AdvancePolicy {
    pub fn allows(&self, score: u8) -> bool {
        match self {
            Self::Always => true,
            Self::MinScore(required) => score >= *required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Moved to the given step
    Advanced(usize),
    /// Finished the last clip and started over at step 1
    Wrapped,
}

/// Session lifecycle, independent of any timer or I/O.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    clip_count: usize,
    policy: AdvancePolicy,
}

impl SessionMachine {
    pub fn new(clip_count: usize, policy: AdvancePolicy) -> Self {
        Self {
            state: SessionState::Idle,
            clip_count,
            policy,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn policy(&self) -> AdvancePolicy {
        self.policy
    }

    pub fn clip_count(&self) -> usize {
        self.clip_count
    }

    /// Idle (or a failed load) → LoadingReferenceData
    pub fn begin_loading(&mut self) -> Result<(), TransitionError> {
        match self.state {
            SessionState::Idle | SessionState::LoadFailed { .. } => {
                self.state = SessionState::LoadingReferenceData;
                Ok(())
            }
            _ => Err(self.invalid("load reference data")),
        }
    }

    /// LoadingReferenceData → Ready on success, LoadFailed otherwise
    pub fn finish_loading(&mut self, result: Result<(), String>) -> Result<(), TransitionError> {
        if self.state != SessionState::LoadingReferenceData {
            return Err(self.invalid("finish loading"));
        }
        match result {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(message) => {
                self.state = SessionState::LoadFailed {
                    message: message.clone(),
                };
                Err(TransitionError::LoadFailed(message))
            }
        }
    }

    /// Ready → Active(1)
    pub fn start(&mut self) -> Result<usize, TransitionError> {
        if let SessionState::LoadFailed { message } = &self.state {
            return Err(TransitionError::LoadFailed(message.clone()));
        }
        if self.state != SessionState::Ready || self.clip_count == 0 {
            return Err(self.invalid("start"));
        }
        self.state = SessionState::Active { step: 1 };
        Ok(1)
    }

    pub fn can_advance(&self, score: u8) -> bool {
        self.state.is_active() && self.policy.allows(score)
    }

    /// Active(step) → Active(step + 1), or through Completed back to Active(1)
    /// from the last clip.
    pub fn advance(&mut self, score: u8) -> Result<AdvanceOutcome, TransitionError> {
        let SessionState::Active { step } = self.state else {
            return Err(self.invalid("advance"));
        };
        if let AdvancePolicy::MinScore(required) = self.policy {
            if score < required {
                return Err(TransitionError::AdvanceGated { score, required });
            }
        }

        if step < self.clip_count {
            self.state = SessionState::Active { step: step + 1 };
            Ok(AdvanceOutcome::Advanced(step + 1))
        } else {
            self.state = SessionState::Completed;
            tracing::info!(
                clips = self.clip_count,
                state = ?self.state,
                "all clips done, starting over"
            );
            self.state = SessionState::Active { step: 1 };
            Ok(AdvanceOutcome::Wrapped)
        }
    }

    /// Active → Ready. Stopping a session that is not running is a no-op.
    pub fn stop(&mut self) {
        if self.state.is_active() || self.state == SessionState::Completed {
            self.state = SessionState::Ready;
        }
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::InvalidTransition {
            action,
            state: self.state.clone(),
        }
    }
}
