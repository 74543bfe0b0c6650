//! Pose similarity scoring.
//!
//! Both scorers are pure: the same pair of frames always yields the same
//! integer in [0, 100]. Degenerate input (mismatched frame lengths, nothing
//! comparable) scores 0.

pub mod angle;
pub mod positional;

use serde::Deserialize;
use std::sync::Arc;

use crate::config::ScorerConfig;
use crate::pose::LandmarkFrame;

pub use angle::{joint_angle, Joint, JointAngleScorer, JointAngles};
pub use positional::PositionalDistanceScorer;

pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, user: &LandmarkFrame, reference: &LandmarkFrame) -> u8;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    #[default]
    Positional,
    Angle,
}

pub fn build_scorer(config: &ScorerConfig) -> Arc<dyn Scorer> {
    match config.kind {
        ScorerKind::Positional => {
            Arc::new(PositionalDistanceScorer::new(config.visibility_threshold))
        }
        ScorerKind::Angle => Arc::new(JointAngleScorer::new(config.visibility_threshold)),
    }
}

/// floor(similarity * 100) with similarity clamped to [0, 1]
pub(crate) fn to_score(similarity: f32) -> u8 {
    if !similarity.is_finite() {
        return 0;
    }
    (similarity.clamp(0.0, 1.0) * 100.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_score_bounds() {
        assert_eq!(to_score(1.0), 100);
        assert_eq!(to_score(0.999), 99);
        assert_eq!(to_score(1.7), 100);
        assert_eq!(to_score(-0.3), 0);
        assert_eq!(to_score(f32::NAN), 0);
    }

    #[test]
    fn test_build_scorer_by_kind() {
        let mut config = ScorerConfig::default();
        assert_eq!(build_scorer(&config).name(), "positional");
        config.kind = ScorerKind::Angle;
        assert_eq!(build_scorer(&config).name(), "angle");
    }
}
