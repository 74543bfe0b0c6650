use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::SessionConfig;
use crate::error::{CoachError, CoachResult};
use crate::pose::{Landmark, LandmarkFrame, LandmarkIndex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdealFrame {
    pub frame: usize,
    pub landmarks: LandmarkFrame,
}

/// Landmark entry as written by the recording tools. `id` is the joint slot
/// when present; otherwise the entry's position is.
#[derive(Debug, Deserialize)]
struct RawLandmark {
    #[serde(default)]
    id: Option<usize>,
    #[serde(flatten)]
    landmark: Landmark,
}

#[derive(Debug, Deserialize)]
struct RawIdealFrame {
    #[serde(default, alias = "frame_number")]
    frame: Option<usize>,
    landmarks: Vec<RawLandmark>,
}

/// Ordered reference frames of one clip. Playback order is insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct IdealSegment {
    clip: String,
    frames: Vec<IdealFrame>,
}

impl IdealSegment {
    pub fn new(clip: impl Into<String>, frames: Vec<IdealFrame>) -> Self {
        Self {
            clip: clip.into(),
            frames,
        }
    }

    /// Builds a segment numbering the frames by position
    pub fn from_landmark_frames(clip: impl Into<String>, frames: Vec<LandmarkFrame>) -> Self {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(frame, landmarks)| IdealFrame { frame, landmarks })
            .collect();
        Self::new(clip, frames)
    }

    /// Parses a segment document. An empty or malformed document is `DataUnavailable`.
    pub fn parse(clip: &str, json: &str) -> CoachResult<Self> {
        let raw: Vec<RawIdealFrame> =
            serde_json::from_str(json).map_err(|e| CoachError::data_unavailable(clip, e))?;
        if raw.is_empty() {
            return Err(CoachError::data_unavailable(clip, "segment has no frames"));
        }

        let frames = raw
            .into_iter()
            .enumerate()
            .map(|(position, raw_frame)| {
                Ok(IdealFrame {
                    frame: raw_frame.frame.unwrap_or(position),
                    landmarks: place_landmarks(clip, raw_frame.landmarks)?,
                })
            })
            .collect::<CoachResult<Vec<_>>>()?;
        Ok(Self::new(clip, frames))
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.frames)
    }

    pub fn clip(&self) -> &str {
        &self.clip
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frame(&self, index: usize) -> Option<&IdealFrame> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[IdealFrame] {
        &self.frames
    }
}

/// Puts each landmark in its `id` slot. Slots no entry names stay invisible.
fn place_landmarks(clip: &str, raw: Vec<RawLandmark>) -> CoachResult<LandmarkFrame> {
    if raw.iter().all(|l| l.id.is_none()) {
        return Ok(LandmarkFrame::new(raw.into_iter().map(|l| l.landmark).collect()));
    }

    let mut slots: Vec<Option<Landmark>> = Vec::new();
    for entry in raw {
        let Some(id) = entry.id else {
            let reason = "landmark without id in an indexed frame";
            return Err(CoachError::data_unavailable(clip, reason));
        };
        if id >= LandmarkIndex::COUNT {
            let reason = format!("landmark id {} out of range", id);
            return Err(CoachError::data_unavailable(clip, reason));
        }
        if slots.len() <= id {
            slots.resize(id + 1, None);
        }
        if slots[id].replace(entry.landmark).is_some() {
            return Err(CoachError::data_unavailable(clip, format!("duplicate landmark id {}", id)));
        }
    }
    Ok(LandmarkFrame::new(
        slots.into_iter().map(Option::unwrap_or_default).collect(),
    ))
}

/// Ideal segments of every configured clip, keyed by clip name
#[derive(Debug, Clone, Default)]
pub struct IdealSegmentStore {
    data_dir: PathBuf,
    file_suffix: String,
    segments: HashMap<String, Arc<IdealSegment>>,
}

impl IdealSegmentStore {
    pub fn new(data_dir: impl Into<PathBuf>, file_suffix: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            file_suffix: file_suffix.into(),
            segments: HashMap::new(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.data_dir, &config.file_suffix)
    }

    pub fn segment_path(&self, clip: &str) -> PathBuf {
        self.data_dir.join(format!("{}{}", clip, self.file_suffix))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Reads and parses one clip without adding it to the store
    pub async fn load(&self, clip: &str) -> CoachResult<IdealSegment> {
        let path = self.segment_path(clip);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoachError::data_unavailable(clip, format!("{}: {}", path.display(), e)))?;
        IdealSegment::parse(clip, &content)
    }

    /// Loads every clip or none: on the first failure the store is left unchanged.
    pub async fn load_all(&mut self, clips: &[String]) -> CoachResult<()> {
        let mut loaded = HashMap::with_capacity(clips.len());
        for clip in clips {
            let segment = self.load(clip).await?;
            tracing::debug!(clip = %clip, frames = segment.len(), "ideal segment loaded");
            loaded.insert(clip.clone(), Arc::new(segment));
        }
        self.segments.extend(loaded);
        Ok(())
    }

    pub fn insert(&mut self, segment: IdealSegment) {
        self.segments
            .insert(segment.clip().to_string(), Arc::new(segment));
    }

    pub fn get(&self, clip: &str) -> Option<&IdealSegment> {
        self.segments.get(clip).map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FRAMES: &str = r#"[
        {"frame": 0, "landmarks": [{"id": 0, "x": 0.1, "y": 0.2, "z": 0.0, "visibility": 0.9}]},
        {"frame": 1, "landmarks": [{"id": 0, "x": 0.3, "y": 0.4, "z": 0.0, "visibility": 0.8}]}
    ]"#;

    #[test]
    fn test_parse_keeps_order() {
        let segment = IdealSegment::parse("dance1", TWO_FRAMES).unwrap();
        assert_eq!(segment.clip(), "dance1");
        assert_eq!(segment.len(), 2);
        assert_eq!(segment.frame(1).unwrap().frame, 1);
        assert_eq!(segment.frame(1).unwrap().landmarks.get(0).unwrap().x, 0.3);
    }

    #[test]
    fn test_parse_recording_format() {
        // frame_number + angles + timestamp, as written by the recording script
        let json = r#"[{
            "frame_number": 7,
            "timestamp_ms": 233.3,
            "angles": {"left_elbow_angle": 120.0},
            "landmarks": [
                {"id": 1, "x": 0.5, "y": 0.5, "z": 0.0, "visibility": 1.0},
                {"id": 0, "x": 0.1, "y": 0.1, "z": 0.0, "visibility": 1.0}
            ]
        }]"#;
        let segment = IdealSegment::parse("dance2", json).unwrap();
        let frame = segment.frame(0).unwrap();
        assert_eq!(frame.frame, 7);
        // placed by id
        assert_eq!(frame.landmarks.get(0).unwrap().x, 0.1);
    }

    #[test]
    fn test_parse_sparse_ids_keep_their_slots() {
        let json = r#"[{"frame": 0, "landmarks": [
            {"id": 12, "x": 0.6, "y": 0.3, "visibility": 0.9},
            {"id": 0, "x": 0.5, "y": 0.1, "visibility": 0.9},
            {"id": 11, "x": 0.4, "y": 0.3, "visibility": 0.9}
        ]}]"#;
        let segment = IdealSegment::parse("dance3", json).unwrap();
        let landmarks = &segment.frame(0).unwrap().landmarks;
        assert_eq!(landmarks.len(), 13);
        assert_eq!(landmarks.landmark(LandmarkIndex::LeftShoulder).unwrap().x, 0.4);
        assert_eq!(landmarks.landmark(LandmarkIndex::RightShoulder).unwrap().x, 0.6);
        // unnamed slots are filled but never visible
        assert_eq!(landmarks.get(1).unwrap().visibility, 0.0);
    }

    #[test]
    fn test_parse_rejects_bad_ids() {
        let duplicate = r#"[{"landmarks": [{"id": 3, "x": 0.1, "y": 0.1}, {"id": 3, "x": 0.2, "y": 0.2}]}]"#;
        let out_of_range = r#"[{"landmarks": [{"id": 99, "x": 0.1, "y": 0.1}]}]"#;
        let mixed = r#"[{"landmarks": [{"id": 0, "x": 0.1, "y": 0.1}, {"x": 0.2, "y": 0.2}]}]"#;
        for json in [duplicate, out_of_range, mixed] {
            assert!(matches!(
                IdealSegment::parse("c", json),
                Err(CoachError::DataUnavailable { .. })
            ));
        }
    }

    #[test]
    fn test_parse_missing_frame_number_uses_position() {
        let json = r#"[{"landmarks": []}, {"landmarks": []}]"#;
        let segment = IdealSegment::parse("c", json).unwrap();
        assert_eq!(segment.frame(1).unwrap().frame, 1);
    }

    #[test]
    fn test_parse_rejects_empty_and_malformed() {
        assert!(matches!(
            IdealSegment::parse("c", "[]"),
            Err(CoachError::DataUnavailable { .. })
        ));
        assert!(matches!(
            IdealSegment::parse("c", "{\"frames\": 3}"),
            Err(CoachError::DataUnavailable { .. })
        ));
        assert!(IdealSegment::parse("c", "[{\"frame\": 0}]").is_err());
    }

    #[test]
    fn test_json_round_trip_is_loadable() {
        let segment = IdealSegment::parse("dance1", TWO_FRAMES).unwrap();
        let json = segment.to_json_pretty().unwrap();
        assert_eq!(IdealSegment::parse("dance1", &json).unwrap(), segment);
    }

    #[tokio::test]
    async fn test_load_all_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_ideal_segment.json"), TWO_FRAMES).unwrap();
        std::fs::write(dir.path().join("b_ideal_segment.json"), TWO_FRAMES).unwrap();

        let mut store = IdealSegmentStore::new(dir.path(), "_ideal_segment.json");
        let clips = vec!["a".to_string(), "b".to_string()];
        store.load_all(&clips).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().len(), 2);
        assert!(store.get("c").is_none());
    }

    #[tokio::test]
    async fn test_load_all_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), TWO_FRAMES).unwrap();
        std::fs::write(dir.path().join("b.json"), "not json").unwrap();

        let mut store = IdealSegmentStore::new(dir.path(), ".json");
        let clips = vec!["a".to_string(), "b".to_string()];
        let err = store.load_all(&clips).await.unwrap_err();
        match err {
            CoachError::DataUnavailable { clip, .. } => assert_eq!(clip, "b"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdealSegmentStore::new(dir.path(), ".json");
        assert!(matches!(
            store.load("ghost").await,
            Err(CoachError::DataUnavailable { .. })
        ));
    }
}
