//! Reference ("ideal") pose segments per dance clip.

pub mod extract;
pub mod store;

pub use extract::{best_window, extract_ideal_segment, frame_quality, DEFAULT_WINDOW_SIZE};
pub use store::{IdealFrame, IdealSegment, IdealSegmentStore};
