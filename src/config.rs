use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CoachError;
use crate::score::ScorerKind;
use crate::session::{AdvancePolicy, ReferenceSource};
use crate::sync::{ClockMode, EngineClock, IndexPolicy, PlaybackLimits};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Evaluation period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Assumed frame rate of every reference video
    #[serde(default = "default_nominal_fps")]
    pub nominal_fps: f64,
    /// "cyclic" wraps past the end of the ideal segment, "bounded" scores 0 there
    #[serde(default)]
    pub index_policy: IndexPolicy,
    /// "ideal_segment" or "live"
    #[serde(default)]
    pub reference_source: ReferenceSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    /// "positional" or "angle"
    #[serde(default)]
    pub kind: ScorerKind,
    /// Landmarks at or below this visibility are ignored by the positional scorer
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_feedback_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Scores at or above this get the canned positive message instead of a request
    #[serde(default = "default_feedback_threshold")]
    pub threshold: u8,
    #[serde(default = "default_positive_message")]
    pub positive_message: String,
    #[serde(default = "default_not_visible_message")]
    pub not_visible_message: String,
    #[serde(default = "default_error_message")]
    pub error_message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Dance clips in step order
    #[serde(default = "default_clips")]
    pub clips: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Appended to the clip name to form the segment file name
    #[serde(default = "default_file_suffix")]
    pub file_suffix: String,
    #[serde(default)]
    pub advance_policy: AdvancePolicyKind,
    #[serde(default = "default_min_advance_score")]
    pub min_advance_score: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvancePolicyKind {
    #[default]
    Always,
    MinScore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default)]
    pub mode: ClockMode,
    /// Loop length of the local clock in seconds
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    #[serde(default = "default_rate_step")]
    pub rate_step: f64,
}

fn default_tick_ms() -> u64 { 500 }
fn default_nominal_fps() -> f64 { 30.0 }
fn default_visibility_threshold() -> f32 { 0.7 }
fn default_feedback_endpoint() -> String { "http://127.0.0.1:5000/evaluate_pose".to_string() }
fn default_feedback_timeout_ms() -> u64 { 10_000 }
fn default_cooldown_ms() -> u64 { 3000 }
fn default_feedback_threshold() -> u8 { 70 }
fn default_positive_message() -> String {
    "Great job! Keep going with the same rhythm.".to_string()
}
fn default_not_visible_message() -> String {
    "You are not visible on camera. Please step into the frame.".to_string()
}
fn default_error_message() -> String { "Could not reach the feedback service.".to_string() }
fn default_clips() -> Vec<String> {
    (1..=6).map(|i| format!("dance{}", i)).collect()
}
fn default_data_dir() -> PathBuf { PathBuf::from("reference_data") }
fn default_file_suffix() -> String { "_ideal_segment.json".to_string() }
fn default_min_advance_score() -> u8 { 70 }
fn default_listen_addr() -> String { "127.0.0.1:7878".to_string() }
fn default_min_rate() -> f64 { 0.25 }
fn default_max_rate() -> f64 { 3.0 }
fn default_rate_step() -> f64 { 0.25 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            nominal_fps: default_nominal_fps(),
            index_policy: IndexPolicy::default(),
            reference_source: ReferenceSource::default(),
        }
    }
}

impl EngineConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            kind: ScorerKind::default(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            endpoint: default_feedback_endpoint(),
            timeout_ms: default_feedback_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
            threshold: default_feedback_threshold(),
            positive_message: default_positive_message(),
            not_visible_message: default_not_visible_message(),
            error_message: default_error_message(),
        }
    }
}

impl FeedbackConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            clips: default_clips(),
            data_dir: default_data_dir(),
            file_suffix: default_file_suffix(),
            advance_policy: AdvancePolicyKind::default(),
            min_advance_score: default_min_advance_score(),
        }
    }
}

impl SessionConfig {
    pub fn advance_policy(&self) -> AdvancePolicy {
        match self.advance_policy {
            AdvancePolicyKind::Always => AdvancePolicy::Always,
            AdvancePolicyKind::MinScore => AdvancePolicy::MinScore(self.min_advance_score),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen_addr: default_listen_addr() }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: ClockMode::default(),
            duration_seconds: None,
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            rate_step: default_rate_step(),
        }
    }
}

impl PlaybackConfig {
    pub fn limits(&self) -> PlaybackLimits {
        PlaybackLimits {
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            rate_step: self.rate_step,
        }
    }

    pub fn build_clock(&self) -> EngineClock {
        EngineClock::new(self.mode, self.limits(), self.duration_seconds)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::parse(&content)?;
        Ok(config)
    }

    /// Reads the config file, falling back to defaults when it is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    "using default config: {e:#}"
                );
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoachError> {
        if self.engine.tick_ms == 0 {
            return Err(CoachError::Config("engine.tick_ms must be positive".into()));
        }
        if !(self.engine.nominal_fps.is_finite() && self.engine.nominal_fps > 0.0) {
            return Err(CoachError::Config("engine.nominal_fps must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.scorer.visibility_threshold) {
            return Err(CoachError::Config(
                "scorer.visibility_threshold must be within [0, 1]".into(),
            ));
        }
        if self.feedback.threshold > 100 || self.session.min_advance_score > 100 {
            return Err(CoachError::Config("score thresholds must be within [0, 100]".into()));
        }
        if self.session.clips.is_empty() {
            return Err(CoachError::Config("session.clips must not be empty".into()));
        }
        let limits = self.playback.limits();
        let rates_valid =
            limits.min_rate > 0.0 && limits.min_rate <= limits.max_rate && limits.rate_step > 0.0;
        if !rates_valid {
            return Err(CoachError::Config("playback rates are inconsistent".into()));
        }
        if let Some(d) = self.playback.duration_seconds {
            if !(d.is_finite() && d > 0.0) {
                return Err(CoachError::Config("playback.duration_seconds must be positive".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.engine.tick_ms, 500);
        assert_eq!(config.engine.nominal_fps, 30.0);
        assert_eq!(config.engine.index_policy, IndexPolicy::Cyclic);
        assert_eq!(config.scorer.kind, ScorerKind::Positional);
        assert_eq!(config.feedback.cooldown_ms, 3000);
        assert_eq!(config.feedback.threshold, 70);
        assert_eq!(config.session.clips.len(), 6);
        assert_eq!(config.session.advance_policy(), AdvancePolicy::Always);
    }

    #[test]
    fn test_partial_sections() {
        let toml = r#"
            [scorer]
            kind = "angle"

            [engine]
            index_policy = "bounded"

            [session]
            clips = ["intro", "chorus"]
            advance_policy = "min_score"
            min_advance_score = 80
        "#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.scorer.kind, ScorerKind::Angle);
        assert_eq!(config.scorer.visibility_threshold, 0.7);
        assert_eq!(config.engine.index_policy, IndexPolicy::Bounded);
        assert_eq!(config.engine.reference_source, ReferenceSource::IdealSegment);
        assert_eq!(config.session.clips, vec!["intro", "chorus"]);
        assert_eq!(config.session.advance_policy(), AdvancePolicy::MinScore(80));
        assert_eq!(config.session.file_suffix, "_ideal_segment.json");
    }

    #[test]
    fn test_local_playback_clock() {
        let toml = r#"
            [playback]
            mode = "local"
            duration_seconds = 12.0
            max_rate = 2.0
        "#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.playback.mode, ClockMode::Local);
        assert!(matches!(config.playback.build_clock(), EngineClock::Local(_)));
        assert!(matches!(Config::default().playback.build_clock(), EngineClock::External(_)));
        assert!(Config::parse("[playback]\nduration_seconds = -1.0").is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::parse("[engine]\ntick_ms = 0").is_err());
        assert!(Config::parse("[session]\nclips = []").is_err());
        assert!(Config::parse("[feedback]\nthreshold = 120").is_err());
        assert!(Config::parse("[scorer]\nkind = \"euclid\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/dance_coach.toml");
        assert_eq!(config.server.listen_addr, "127.0.0.1:7878");
    }
}
