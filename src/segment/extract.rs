//! Picks the steadiest, best-visible window of a full recording as the ideal segment.

use super::{IdealFrame, IdealSegment};
use crate::error::{CoachError, CoachResult};
use crate::pose::{LandmarkFrame, LandmarkIndex};
use crate::score::Joint;

pub const DEFAULT_WINDOW_SIZE: usize = 25;

/// Penalty per unit of missing visibility, worth 50 degrees of motion per joint angle
const VISIBILITY_PENALTY: f32 = Joint::COUNT as f32 * 50.0;

/// Landmarks whose visibility counts toward frame quality: the tracked
/// joints plus nose and ears.
const QUALITY_LANDMARKS: [LandmarkIndex; 15] = [
    LandmarkIndex::Nose,
    LandmarkIndex::LeftEar,
    LandmarkIndex::RightEar,
    LandmarkIndex::LeftShoulder,
    LandmarkIndex::RightShoulder,
    LandmarkIndex::LeftElbow,
    LandmarkIndex::RightElbow,
    LandmarkIndex::LeftWrist,
    LandmarkIndex::RightWrist,
    LandmarkIndex::LeftHip,
    LandmarkIndex::RightHip,
    LandmarkIndex::LeftKnee,
    LandmarkIndex::RightKnee,
    LandmarkIndex::LeftAnkle,
    LandmarkIndex::RightAnkle,
];

/// Quality cost of `current` given its successor; lower is better.
///
/// Joint angle motion between the two frames plus a penalty for poorly
/// visible landmarks in `current`.
pub fn frame_quality(current: &LandmarkFrame, next: &LandmarkFrame) -> f32 {
    let motion: f32 = Joint::ALL
        .iter()
        .filter_map(|joint| Some((joint.measure(current)? - joint.measure(next)?).abs()))
        .sum();

    let avg_visibility = current.average_visibility(&QUALITY_LANDMARKS);
    motion + (1.0 - avg_visibility) * VISIBILITY_PENALTY
}

/// Start of the `window`-long run of qualities with the lowest sum; the earliest wins ties.
pub fn best_window(qualities: &[f32], window: usize) -> Option<usize> {
    if window == 0 || qualities.len() < window {
        return None;
    }
    let mut best = None;
    let mut best_sum = f32::INFINITY;
    for (start, run) in qualities.windows(window).enumerate() {
        let sum: f32 = run.iter().sum();
        if sum < best_sum {
            best_sum = sum;
            best = Some(start);
        }
    }
    best
}

/// Cuts the ideal segment out of a full recording.
///
/// A recording needs at least `window + 1` frames since every quality value
/// looks one frame ahead.
pub fn extract_ideal_segment(recording: &IdealSegment, window: usize) -> CoachResult<IdealSegment> {
    let frames = recording.frames();
    let qualities: Vec<f32> = frames
        .windows(2)
        .map(|pair| frame_quality(&pair[0].landmarks, &pair[1].landmarks))
        .collect();

    let start = best_window(&qualities, window).ok_or_else(|| {
        CoachError::data_unavailable(
            recording.clip(),
            format!(
                "recording has {} frames, need at least {} for a {}-frame window",
                frames.len(),
                window + 1,
                window
            ),
        )
    })?;

    tracing::info!(
        clip = recording.clip(),
        start,
        window,
        "ideal window selected"
    );
    let selected: Vec<IdealFrame> = frames[start..start + window].to_vec();
    Ok(IdealSegment::new(recording.clip(), selected))
}
