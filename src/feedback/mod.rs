//! Throttled coaching feedback.

pub mod generator;
pub mod scheduler;

pub use generator::{parse_response, FeedbackGenerator, HttpFeedbackGenerator};
pub use scheduler::{Effect, FeedbackMessages, FeedbackRequest, FeedbackScheduler, PendingRequest};
