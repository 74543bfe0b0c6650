use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Source of the reference video's playback position
pub trait ReferenceClock: Send + Sync {
    /// Seconds into the reference video, or None before playback has a position
    fn playback_time(&self) -> Option<f64>;
}

/// Playback time reported by an external player
#[derive(Debug, Default)]
pub struct SharedClock {
    time: Mutex<Option<f64>>,
}

impl SharedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, seconds: f64) {
        *self.lock() = seconds.is_finite().then_some(seconds);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<f64>> {
        self.time.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ReferenceClock for SharedClock {
    fn playback_time(&self) -> Option<f64> {
        *self.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackLimits {
    pub min_rate: f64,
    pub max_rate: f64,
    pub rate_step: f64,
}

impl Default for PlaybackLimits {
    fn default() -> Self {
        Self {
            min_rate: 0.25,
            max_rate: 3.0,
            rate_step: 0.25,
        }
    }
}

#[derive(Debug)]
struct PlaybackState {
    /// Position at `anchor`, None until the first `play`
    position: Option<f64>,
    anchor: Instant,
    playing: bool,
    rate: f64,
}

/// Local playback clock with pause, seek, and a variable rate.
///
/// The position loops over `duration` when one is set.
#[derive(Debug)]
pub struct PlaybackClock {
    limits: PlaybackLimits,
    duration: Option<f64>,
    state: Mutex<PlaybackState>,
}

impl PlaybackClock {
    pub fn new(limits: PlaybackLimits) -> Self {
        Self {
            limits,
            duration: None,
            state: Mutex::new(PlaybackState {
                position: None,
                anchor: Instant::now(),
                playing: false,
                rate: 1.0,
            }),
        }
    }

    /// Loops playback every `seconds`. Non-positive values disable looping.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    pub fn play(&self) {
        self.play_at(Instant::now());
    }

    pub fn play_at(&self, now: Instant) {
        let mut state = self.lock();
        let position = self.position_of(&state, now).unwrap_or(0.0);
        state.position = Some(position);
        state.anchor = now;
        state.playing = true;
    }

    pub fn pause(&self) {
        self.pause_at(Instant::now());
    }

    pub fn pause_at(&self, now: Instant) {
        let mut state = self.lock();
        state.position = self.position_of(&state, now);
        state.anchor = now;
        state.playing = false;
    }

    pub fn seek(&self, seconds: f64) {
        self.seek_at(seconds, Instant::now());
    }

    pub fn seek_at(&self, seconds: f64, now: Instant) {
        if !seconds.is_finite() {
            return;
        }
        let mut state = self.lock();
        state.position = Some(self.wrap(seconds.max(0.0)));
        state.anchor = now;
    }

    pub fn rate(&self) -> f64 {
        self.lock().rate
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    /// Sets the playback rate, clamped to the configured limits
    pub fn set_rate(&self, rate: f64) -> f64 {
        self.set_rate_at(rate, Instant::now())
    }

    pub fn set_rate_at(&self, rate: f64, now: Instant) -> f64 {
        let mut state = self.lock();
        if state.playing {
            state.position = self.position_of(&state, now);
            state.anchor = now;
        }
        if rate.is_finite() {
            state.rate = rate.clamp(self.limits.min_rate, self.limits.max_rate);
        }
        state.rate
    }

    pub fn faster(&self) -> f64 {
        let rate = self.rate() + self.limits.rate_step;
        self.set_rate(rate)
    }

    pub fn slower(&self) -> f64 {
        let rate = self.rate() - self.limits.rate_step;
        self.set_rate(rate)
    }

    pub fn position_at(&self, now: Instant) -> Option<f64> {
        let state = self.lock();
        self.position_of(&state, now)
    }

    fn position_of(&self, state: &PlaybackState, now: Instant) -> Option<f64> {
        let base = state.position?;
        let elapsed = if state.playing {
            now.saturating_duration_since(state.anchor).as_secs_f64() * state.rate
        } else {
            0.0
        };
        Some(self.wrap(base + elapsed))
    }

    fn wrap(&self, position: f64) -> f64 {
        match self.duration {
            Some(duration) => position % duration,
            None => position,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new(PlaybackLimits::default())
    }
}

impl ReferenceClock for PlaybackClock {
    fn playback_time(&self) -> Option<f64> {
        self.position_at(Instant::now())
    }
}

/// Which clock drives the reference position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Position is reported by the producer's video player
    #[default]
    External,
    /// Position is kept by the engine's own playback clock
    Local,
}

/// Transport controls for the engine-side playback clock
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum PlaybackControl {
    Play,
    Pause,
    Faster,
    Slower,
    Seek(f64),
}

/// The clock a running engine reads, with the inputs that move it.
#[derive(Debug, Clone)]
pub enum EngineClock {
    External(Arc<SharedClock>),
    Local(Arc<PlaybackClock>),
}

impl EngineClock {
    pub fn new(mode: ClockMode, limits: PlaybackLimits, duration: Option<f64>) -> Self {
        match mode {
            ClockMode::External => Self::External(Arc::new(SharedClock::new())),
            ClockMode::Local => {
                let clock = PlaybackClock::new(limits);
                let clock = match duration {
                    Some(seconds) => clock.with_duration(seconds),
                    None => clock,
                };
                Self::Local(Arc::new(clock))
            }
        }
    }

    pub fn reference(&self) -> Arc<dyn ReferenceClock> {
        match self {
            Self::External(clock) => clock.clone(),
            Self::Local(clock) => clock.clone(),
        }
    }

    /// A reported player position. The local clock treats it as a seek.
    pub fn report_time(&self, seconds: f64) {
        match self {
            Self::External(clock) => clock.set(seconds),
            Self::Local(clock) => clock.seek(seconds),
        }
    }

    /// Returns false when the clock is external and ignores transport controls.
    pub fn control(&self, control: PlaybackControl) -> bool {
        let Self::Local(clock) = self else {
            return false;
        };
        match control {
            PlaybackControl::Play => clock.play(),
            PlaybackControl::Pause => clock.pause(),
            PlaybackControl::Faster => {
                let rate = clock.faster();
                tracing::info!(rate, "playback rate");
            }
            PlaybackControl::Slower => {
                let rate = clock.slower();
                tracing::info!(rate, "playback rate");
            }
            PlaybackControl::Seek(seconds) => clock.seek(seconds),
        }
        true
    }
}
