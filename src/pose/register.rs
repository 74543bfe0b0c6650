use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::LandmarkFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamId {
    /// Live camera of the performer
    User,
    /// Playing reference video
    Reference,
}

/// Latest-frame cell for one landmark stream.
///
/// The producer overwrites, the evaluation loop reads. Nothing older than the
/// last write is kept.
#[derive(Debug, Default)]
pub struct LandmarkRegister {
    latest: Mutex<Option<LandmarkFrame>>,
    detached: AtomicBool,
}

impl LandmarkRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame` (or "no pose"). Returns false once the register is detached.
    pub fn update(&self, frame: Option<LandmarkFrame>) -> bool {
        if self.detached.load(Ordering::Acquire) {
            return false;
        }
        *self.lock() = frame;
        true
    }

    pub fn read_latest(&self) -> Option<LandmarkFrame> {
        self.lock().clone()
    }

    /// Stops accepting writes; the last value stays readable.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn lock(&self) -> MutexGuard<'_, Option<LandmarkFrame>> {
        // A writer cannot leave the cell half-written, so a poisoned lock is still usable
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The user and reference registers of one session
#[derive(Debug, Clone, Default)]
pub struct Registers {
    user: Arc<LandmarkRegister>,
    reference: Arc<LandmarkRegister>,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stream: StreamId) -> &Arc<LandmarkRegister> {
        match stream {
            StreamId::User => &self.user,
            StreamId::Reference => &self.reference,
        }
    }

    pub fn update(&self, stream: StreamId, frame: Option<LandmarkFrame>) -> bool {
        self.get(stream).update(frame)
    }

    pub fn read_latest(&self, stream: StreamId) -> Option<LandmarkFrame> {
        self.get(stream).read_latest()
    }

    pub fn detach_all(&self) {
        self.user.detach();
        self.reference.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;

    fn frame(x: f32) -> LandmarkFrame {
        LandmarkFrame::new(vec![Landmark::planar(x, 0.5, 1.0)])
    }

    #[test]
    fn test_empty_register_is_absent() {
        let reg = LandmarkRegister::new();
        assert!(reg.read_latest().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let reg = LandmarkRegister::new();
        reg.update(Some(frame(0.1)));
        reg.update(Some(frame(0.2)));
        assert_eq!(reg.read_latest(), Some(frame(0.2)));
    }

    #[test]
    fn test_absent_overwrites_present() {
        let reg = LandmarkRegister::new();
        reg.update(Some(frame(0.1)));
        reg.update(None);
        assert!(reg.read_latest().is_none());
    }

    #[test]
    fn test_detached_register_ignores_writes() {
        let reg = LandmarkRegister::new();
        assert!(reg.update(Some(frame(0.1))));
        reg.detach();
        assert!(!reg.update(Some(frame(0.9))));
        assert_eq!(reg.read_latest(), Some(frame(0.1)));
    }

    #[test]
    fn test_streams_are_independent() {
        let regs = Registers::new();
        regs.update(StreamId::User, Some(frame(0.3)));
        assert_eq!(regs.read_latest(StreamId::User), Some(frame(0.3)));
        assert!(regs.read_latest(StreamId::Reference).is_none());

        let cloned = regs.clone();
        cloned.update(StreamId::Reference, Some(frame(0.4)));
        assert_eq!(regs.read_latest(StreamId::Reference), Some(frame(0.4)));

        regs.detach_all();
        assert!(cloned.get(StreamId::User).is_detached());
    }

    #[test]
    fn test_concurrent_writer() {
        let reg = Arc::new(LandmarkRegister::new());
        let writer = Arc::clone(&reg);
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                writer.update(Some(frame(i as f32)));
            }
        });
        handle.join().unwrap();
        assert_eq!(reg.read_latest(), Some(frame(99.0)));
    }
}
