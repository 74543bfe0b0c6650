pub mod landmark;
pub mod register;

pub use landmark::{Landmark, LandmarkFrame, LandmarkIndex};
pub use register::{LandmarkRegister, Registers, StreamId};
