use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::FeedbackConfig;
use crate::error::CoachError;
use crate::pose::LandmarkFrame;
use crate::score::JointAngles;

/// Body sent to the feedback generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRequest {
    pub user_pose: LandmarkFrame,
    pub reference_pose: LandmarkFrame,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_angles: Option<BTreeMap<String, f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_angles: Option<BTreeMap<String, f32>>,
}

impl FeedbackRequest {
    pub fn new(user_pose: LandmarkFrame, reference_pose: LandmarkFrame) -> Self {
        let user_angles = JointAngles::from_frame(&user_pose).map(|a| a.to_map());
        let reference_angles = JointAngles::from_frame(&reference_pose).map(|a| a.to_map());
        Self {
            user_pose,
            reference_pose,
            user_angles,
            reference_angles,
        }
    }
}

/// A request the caller must send, identified by its ticket
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub ticket: u64,
    pub payload: FeedbackRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    NoAction,
    IssueRequest(PendingRequest),
    UseCannedPositive,
}

#[derive(Debug, Clone)]
pub struct FeedbackMessages {
    pub positive: String,
    pub not_visible: String,
    pub error: String,
}

impl From<&FeedbackConfig> for FeedbackMessages {
    fn from(config: &FeedbackConfig) -> Self {
        Self {
            positive: config.positive_message.clone(),
            not_visible: config.not_visible_message.clone(),
            error: config.error_message.clone(),
        }
    }
}

/// Rate-limits and single-flights calls to the feedback generator.
///
/// At most one request is outstanding. A new one is allowed only after the
/// previous one completed and `cooldown` has passed since it was issued,
/// whether it succeeded or not.
#[derive(Debug)]
pub struct FeedbackScheduler {
    cooldown: Duration,
    threshold: u8,
    messages: FeedbackMessages,
    last_request_at: Option<Instant>,
    in_flight: Option<u64>,
    last_message: Option<String>,
    next_ticket: u64,
}

impl FeedbackScheduler {
    pub fn new(cooldown: Duration, threshold: u8, messages: FeedbackMessages) -> Self {
        Self {
            cooldown,
            threshold,
            messages,
            last_request_at: None,
            in_flight: None,
            last_message: None,
            next_ticket: 1,
        }
    }

    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self::new(config.cooldown(), config.threshold, FeedbackMessages::from(config))
    }

    pub fn maybe_request_feedback(
        &mut self,
        score: u8,
        user: Option<&LandmarkFrame>,
        reference: &LandmarkFrame,
        now: Instant,
    ) -> Effect {
        let Some(user) = user else {
            return Effect::NoAction;
        };
        if score >= self.threshold {
            return Effect::UseCannedPositive;
        }
        if self.in_flight.is_some() || self.cooling_down(now) {
            return Effect::NoAction;
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.last_request_at = Some(now);
        tracing::debug!(ticket, score, "feedback request issued");
        Effect::IssueRequest(PendingRequest {
            ticket,
            payload: FeedbackRequest::new(user.clone(), reference.clone()),
        })
    }

    /// Applies the outcome of request `ticket`. Returns false when the ticket
    /// is not the one in flight and the outcome was discarded.
    pub fn complete(&mut self, ticket: u64, outcome: Result<String, CoachError>) -> bool {
        if self.in_flight != Some(ticket) {
            tracing::debug!(ticket, "discarding stale feedback completion");
            return false;
        }
        self.in_flight = None;
        let message = match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(ticket, "feedback request failed: {}", e);
                self.messages.error.clone()
            }
        };
        self.last_message = Some(message);
        true
    }

    /// Drops the outstanding request and the last message. The ticket becomes
    /// stale; the cooldown still counts from the last request.
    pub fn abandon(&mut self) {
        self.in_flight = None;
        self.last_message = None;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn messages(&self) -> &FeedbackMessages {
        &self.messages
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.last_request_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }
}
