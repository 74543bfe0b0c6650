use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::error::CoachResult;
use crate::feedback::{Effect, FeedbackScheduler, PendingRequest};
use crate::pose::{LandmarkFrame, Registers, StreamId};
use crate::score::{build_scorer, Scorer};
use crate::segment::IdealSegmentStore;
use crate::sync::{FrameSynchronizer, ReferenceClock};

/// Where the frame the performer is compared against comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// Ideal segment frame at the reference video's playback time
    #[default]
    IdealSegment,
    /// Latest frame in the reference register, as detected on the playing video
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No user pose this tick
    PoseAbsent,
    /// No reference frame for the current playback position
    SynchronizationMiss,
    Scored,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub score: u8,
    pub feedback: Option<String>,
    /// Request the caller must send to the feedback generator
    pub request: Option<PendingRequest>,
}

/// One evaluation step: register read, synchronize, score, schedule feedback.
///
/// Holds the displayed score and feedback text between ticks. Never waits on
/// the feedback generator; issued requests are returned to the caller and
/// their outcomes come back through [`Evaluator::apply_completion`].
pub struct Evaluator {
    registers: Registers,
    clock: Arc<dyn ReferenceClock>,
    store: Arc<IdealSegmentStore>,
    synchronizer: FrameSynchronizer,
    source: ReferenceSource,
    scorer: Arc<dyn Scorer>,
    scheduler: FeedbackScheduler,
    score: u8,
    feedback: Option<String>,
}

impl Evaluator {
    pub fn new(
        registers: Registers,
        clock: Arc<dyn ReferenceClock>,
        store: Arc<IdealSegmentStore>,
        synchronizer: FrameSynchronizer,
        scorer: Arc<dyn Scorer>,
        scheduler: FeedbackScheduler,
    ) -> Self {
        Self {
            registers,
            clock,
            store,
            synchronizer,
            source: ReferenceSource::default(),
            scorer,
            scheduler,
            score: 0,
            feedback: None,
        }
    }

    pub fn from_config(
        config: &Config,
        registers: Registers,
        clock: Arc<dyn ReferenceClock>,
        store: Arc<IdealSegmentStore>,
    ) -> Self {
        Self::new(
            registers,
            clock,
            store,
            FrameSynchronizer::from_config(&config.engine),
            build_scorer(&config.scorer),
            FeedbackScheduler::from_config(&config.feedback),
        )
        .with_reference_source(config.engine.reference_source)
    }

    pub fn with_reference_source(mut self, source: ReferenceSource) -> Self {
        self.source = source;
        self
    }

    pub fn tick(&mut self, clip: &str, now: Instant) -> TickReport {
        let Some(user) = self.registers.read_latest(StreamId::User) else {
            self.score = 0;
            self.feedback = Some(self.scheduler.messages().not_visible.clone());
            return self.report(TickOutcome::PoseAbsent, None);
        };

        let Some(reference) = self.reference_frame(clip) else {
            self.score = 0;
            return self.report(TickOutcome::SynchronizationMiss, None);
        };

        self.score = self.scorer.score(&user, &reference);
        let request = match self
            .scheduler
            .maybe_request_feedback(self.score, Some(&user), &reference, now)
        {
            Effect::NoAction => None,
            Effect::UseCannedPositive => {
                self.feedback = Some(self.scheduler.messages().positive.clone());
                None
            }
            Effect::IssueRequest(pending) => Some(pending),
        };
        tracing::trace!(clip, score = self.score, scorer = self.scorer.name(), "tick scored");
        self.report(TickOutcome::Scored, request)
    }

    /// Applies a finished feedback request. Returns false if it was stale.
    pub fn apply_completion(&mut self, ticket: u64, outcome: CoachResult<String>) -> bool {
        if !self.scheduler.complete(ticket, outcome) {
            return false;
        }
        self.feedback = self.scheduler.last_message().map(str::to_string);
        true
    }

    /// Clears score and feedback and drops any outstanding request. The
    /// feedback cooldown keeps running.
    pub fn reset_outputs(&mut self) {
        self.score = 0;
        self.feedback = None;
        self.scheduler.abandon();
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn is_feedback_pending(&self) -> bool {
        self.scheduler.is_in_flight()
    }

    fn reference_frame(&self, clip: &str) -> Option<LandmarkFrame> {
        match self.source {
            ReferenceSource::IdealSegment => self
                .synchronizer
                .resolve(&self.store, clip, self.clock.playback_time())
                .cloned(),
            ReferenceSource::Live => self.registers.read_latest(StreamId::Reference),
        }
    }

    fn report(&self, outcome: TickOutcome, request: Option<PendingRequest>) -> TickReport {
        TickReport {
            outcome,
            score: self.score,
            feedback: self.feedback.clone(),
            request,
        }
    }
}
