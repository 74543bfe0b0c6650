use super::{to_score, Scorer};
use crate::pose::{LandmarkFrame, LandmarkIndex};

/// Largest possible distance between two points in the unit cube
const MAX_LANDMARK_DISTANCE: f32 = 1.732_050_8;

pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.7;

/// Mean 3-D distance over the important joints, normalized by the unit-cube diagonal.
///
/// Assumes both streams frame the performer comparably; use the angle scorer
/// when they do not.
#[derive(Debug, Clone, Copy)]
pub struct PositionalDistanceScorer {
    visibility_threshold: f32,
}

impl PositionalDistanceScorer {
    pub fn new(visibility_threshold: f32) -> Self {
        Self { visibility_threshold }
    }

    /// Similarity in [0, 1], or None when no joint is visible in both frames
    pub fn similarity(&self, user: &LandmarkFrame, reference: &LandmarkFrame) -> Option<f32> {
        if user.len() != reference.len() {
            return None;
        }

        let mut total_distance = 0.0f32;
        let mut valid = 0usize;
        for index in LandmarkIndex::IMPORTANT {
            let (Some(u), Some(r)) = (user.landmark(index), reference.landmark(index)) else {
                continue;
            };
            if u.is_visible(self.visibility_threshold) && r.is_visible(self.visibility_threshold) {
                total_distance += u.distance(r);
                valid += 1;
            }
        }

        if valid == 0 {
            return None;
        }
        let similarity = 1.0 - total_distance / (valid as f32 * MAX_LANDMARK_DISTANCE);
        Some(similarity.clamp(0.0, 1.0))
    }
}

impl Default for PositionalDistanceScorer {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_THRESHOLD)
    }
}

impl Scorer for PositionalDistanceScorer {
    fn name(&self) -> &'static str {
        "positional"
    }

    fn score(&self, user: &LandmarkFrame, reference: &LandmarkFrame) -> u8 {
        self.similarity(user, reference).map_or(0, to_score)
    }
}
