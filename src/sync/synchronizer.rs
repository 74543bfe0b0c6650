use super::{frame_index, IndexPolicy, NOMINAL_FPS};
use crate::config::EngineConfig;
use crate::pose::LandmarkFrame;
use crate::segment::{IdealSegment, IdealSegmentStore};

/// Resolves the ideal frame matching the reference video's playback position
#[derive(Debug, Clone, Copy)]
pub struct FrameSynchronizer {
    fps: f64,
    policy: IndexPolicy,
}

impl FrameSynchronizer {
    pub fn new(fps: f64, policy: IndexPolicy) -> Self {
        Self { fps, policy }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.nominal_fps, config.index_policy)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn policy(&self) -> IndexPolicy {
        self.policy
    }

    /// Frame of `clip` shown at `time`. None for an unknown clip, an empty
    /// segment, an unknown time, or a bounded index past the end.
    pub fn resolve<'a>(
        &self,
        store: &'a IdealSegmentStore,
        clip: &str,
        time: Option<f64>,
    ) -> Option<&'a LandmarkFrame> {
        self.resolve_in(store.get(clip)?, time)
    }

    pub fn resolve_in<'a>(
        &self,
        segment: &'a IdealSegment,
        time: Option<f64>,
    ) -> Option<&'a LandmarkFrame> {
        let index = frame_index(time, self.fps, segment.len(), self.policy)?;
        segment.frame(index).map(|f| &f.landmarks)
    }
}

impl Default for FrameSynchronizer {
    fn default() -> Self {
        Self::new(NOMINAL_FPS, IndexPolicy::Cyclic)
    }
}
