//! Maps reference playback time onto ideal segment frames.

pub mod clock;
pub mod synchronizer;

use serde::Deserialize;

pub use clock::{
    ClockMode, EngineClock, PlaybackClock, PlaybackControl, PlaybackLimits, ReferenceClock,
    SharedClock,
};
pub use synchronizer::FrameSynchronizer;

/// Frame rate assumed for every reference video
pub const NOMINAL_FPS: f64 = 30.0;

/// What happens when playback runs past the last ideal frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexPolicy {
    /// Wrap around to the start of the segment
    #[default]
    Cyclic,
    /// No frame past the end
    Bounded,
}

/// Index of the ideal frame shown at `time` seconds, or None if there is none.
///
/// The raw index is `floor(time * fps)` with no rounding slack.
pub fn frame_index(time: Option<f64>, fps: f64, len: usize, policy: IndexPolicy) -> Option<usize> {
    let time = time?;
    if len == 0 || !time.is_finite() || time < 0.0 || !(fps.is_finite() && fps > 0.0) {
        return None;
    }
    let raw = (time * fps).floor();
    if !raw.is_finite() || raw > usize::MAX as f64 {
        return None;
    }
    let raw = raw as usize;
    match policy {
        IndexPolicy::Cyclic => Some(raw % len),
        IndexPolicy::Bounded => (raw < len).then_some(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_index_scenario() {
        // 2.0667s at 30fps is raw frame 62, which wraps to 0 on a two-frame segment
        assert_eq!(frame_index(Some(2.0667), 30.0, 2, IndexPolicy::Cyclic), Some(0));
        assert_eq!(frame_index(Some(2.0667), 30.0, 2, IndexPolicy::Bounded), None);
        assert_eq!(frame_index(Some(2.0667), 30.0, 100, IndexPolicy::Bounded), Some(62));
    }

    #[test]
    fn test_frame_index_within_frames() {
        for frame in 0..300usize {
            let time = (frame as f64 + 0.5) / 30.0;
            assert_eq!(frame_index(Some(time), 30.0, 1000, IndexPolicy::Bounded), Some(frame));
        }
    }

    #[test]
    fn test_frame_index_boundary_is_floor() {
        // k/32 is exact in binary, so each boundary lands on its own frame
        for frame in 0..300usize {
            let time = frame as f64 / 32.0;
            assert_eq!(frame_index(Some(time), 32.0, 1000, IndexPolicy::Bounded), Some(frame));
        }
        // just below a boundary stays on the previous frame
        let before = 62.0 / 30.0 - 1e-9;
        assert_eq!(frame_index(Some(before), 30.0, 1000, IndexPolicy::Bounded), Some(61));
    }

    #[test]
    fn test_cyclic_period() {
        let len = 25;
        for step in 0..50 {
            let t = 0.013 + step as f64 * 0.0711;
            let period = len as f64 / 30.0;
            assert_eq!(
                frame_index(Some(t), 30.0, len, IndexPolicy::Cyclic),
                frame_index(Some(t + period), 30.0, len, IndexPolicy::Cyclic),
                "t={}",
                t
            );
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(frame_index(None, 30.0, 10, IndexPolicy::Cyclic), None);
        assert_eq!(frame_index(Some(1.0), 30.0, 0, IndexPolicy::Cyclic), None);
        assert_eq!(frame_index(Some(-0.5), 30.0, 10, IndexPolicy::Cyclic), None);
        assert_eq!(frame_index(Some(f64::NAN), 30.0, 10, IndexPolicy::Cyclic), None);
        assert_eq!(frame_index(Some(f64::INFINITY), 30.0, 10, IndexPolicy::Cyclic), None);
        assert_eq!(frame_index(Some(1.0), 0.0, 10, IndexPolicy::Cyclic), None);
    }
}
