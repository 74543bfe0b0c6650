use serde::{Deserialize, Serialize};

/// Body joints of the 33-point MediaPipe pose topology used by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEar = 7,
    RightEar = 8,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
}

impl LandmarkIndex {
    /// Landmarks per frame produced by the pose estimator
    pub const COUNT: usize = 33;

    /// Joints compared by the positional scorer
    pub const IMPORTANT: [LandmarkIndex; 13] = [
        Self::Nose,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];
}

/// Single estimated joint position in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth; some producers omit it
    #[serde(default)]
    pub z: Option<f32>,
    /// Detection confidence in [0, 1]
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 {
    1.0
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            visibility,
        }
    }

    pub fn planar(x: f32, y: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility,
        }
    }

    /// Strictly above the threshold
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility > threshold
    }

    /// 3-D Euclidean distance; a missing depth counts as 0
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z.unwrap_or(0.0) - other.z.unwrap_or(0.0);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: None,
            visibility: 0.0,
        }
    }
}

/// Full set of landmarks for one subject at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkFrame {
    landmarks: Vec<Landmark>,
}

impl LandmarkFrame {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    pub fn landmark(&self, index: LandmarkIndex) -> Option<&Landmark> {
        self.get(index as usize)
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Mean visibility over the given joints the frame has; 0 if it has none of them
    pub fn average_visibility(&self, indices: &[LandmarkIndex]) -> f32 {
        let (sum, count) = indices
            .iter()
            .filter_map(|&i| self.landmark(i))
            .fold((0.0f32, 0usize), |(sum, count), l| (sum + l.visibility, count + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }
}

impl From<Vec<Landmark>> for LandmarkFrame {
    fn from(landmarks: Vec<Landmark>) -> Self {
        Self::new(landmarks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_values() {
        assert_eq!(LandmarkIndex::Nose as usize, 0);
        assert_eq!(LandmarkIndex::LeftHip as usize, 23);
        assert_eq!(LandmarkIndex::RightAnkle as usize, 28);
        assert_eq!(LandmarkIndex::RightEar as usize, 8);
    }

    #[test]
    fn test_visibility_is_strict() {
        let l = Landmark::planar(0.5, 0.5, 0.7);
        assert!(!l.is_visible(0.7));
        assert!(l.is_visible(0.69));
    }

    #[test]
    fn test_distance_missing_depth_is_zero() {
        let a = Landmark::planar(0.0, 0.0, 1.0);
        let b = Landmark::new(0.0, 0.0, 0.5, 1.0);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);

        let c = Landmark::new(1.0, 1.0, 1.0, 1.0);
        let d = Landmark::new(0.0, 0.0, 0.0, 1.0);
        assert!((c.distance(&d) - 3f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_deserialize_mediapipe_landmark() {
        let json = r#"[{"id": 0, "x": 0.5, "y": 0.25, "z": -0.1, "visibility": 0.9}, {"x": 0.1, "y": 0.2}]"#;
        let frame: LandmarkFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.get(0).unwrap().z, Some(-0.1));
        assert_eq!(frame.get(1).unwrap().z, None);
        assert_eq!(frame.get(1).unwrap().visibility, 1.0);
    }

    #[test]
    fn test_average_visibility_skips_missing() {
        let mut landmarks = vec![Landmark::planar(0.0, 0.0, 0.8); 12];
        landmarks[LandmarkIndex::LeftEar as usize].visibility = 0.4;
        let frame = LandmarkFrame::new(landmarks);
        let avg = frame.average_visibility(&[LandmarkIndex::Nose, LandmarkIndex::LeftHip]);
        assert!((avg - 0.8).abs() < 1e-6);
        let avg = frame.average_visibility(&[LandmarkIndex::Nose, LandmarkIndex::LeftEar]);
        assert!((avg - 0.6).abs() < 1e-6);
        assert_eq!(frame.average_visibility(&[LandmarkIndex::RightAnkle]), 0.0);
    }
}
