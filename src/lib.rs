pub mod config;
pub mod error;
pub mod feedback;
pub mod pose;
pub mod protocol;
pub mod score;
pub mod segment;
pub mod session;
pub mod sync;

pub use error::{CoachError, CoachResult};
