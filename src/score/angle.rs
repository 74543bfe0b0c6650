//! Joint-angle similarity.
//!
//! Compares the bend of eight joints instead of raw positions, so the score
//! does not depend on where the performer stands or how large they appear.

use std::collections::BTreeMap;

use super::positional::DEFAULT_VISIBILITY_THRESHOLD;
use super::{to_score, Scorer};
use crate::pose::{Landmark, LandmarkFrame, LandmarkIndex};

/// Angle at `p2` between the rays to `p1` and `p3`, in degrees within [0, 180]
pub fn joint_angle(p1: &Landmark, p2: &Landmark, p3: &Landmark) -> f32 {
    let radians = (p3.y - p2.y).atan2(p3.x - p2.x) - (p1.y - p2.y).atan2(p1.x - p2.x);
    let angle = radians.to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Joint {
    LeftElbow,
    RightElbow,
    LeftShoulder,
    RightShoulder,
    LeftKnee,
    RightKnee,
    LeftHip,
    RightHip,
}

impl Joint {
    pub const COUNT: usize = 8;

    pub const ALL: [Joint; Self::COUNT] = [
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftHip,
        Self::RightHip,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
        }
    }

    /// (outer, vertex, outer) landmarks spanning the joint
    pub fn triplet(self) -> (LandmarkIndex, LandmarkIndex, LandmarkIndex) {
        use LandmarkIndex::*;
        match self {
            Self::LeftElbow => (LeftShoulder, LeftElbow, LeftWrist),
            Self::RightElbow => (RightShoulder, RightElbow, RightWrist),
            Self::LeftShoulder => (LeftElbow, LeftShoulder, LeftHip),
            Self::RightShoulder => (RightElbow, RightShoulder, RightHip),
            Self::LeftKnee => (LeftHip, LeftKnee, LeftAnkle),
            Self::RightKnee => (RightHip, RightKnee, RightAnkle),
            Self::LeftHip => (LeftShoulder, LeftHip, LeftKnee),
            Self::RightHip => (RightShoulder, RightHip, RightKnee),
        }
    }

    /// True if all three landmarks are present and above `threshold`
    pub fn is_visible(self, frame: &LandmarkFrame, threshold: f32) -> bool {
        let (a, b, c) = self.triplet();
        [a, b, c]
            .into_iter()
            .all(|index| frame.landmark(index).map_or(false, |l| l.is_visible(threshold)))
    }

    /// None if the frame lacks any of the three landmarks
    pub fn measure(self, frame: &LandmarkFrame) -> Option<f32> {
        let (a, b, c) = self.triplet();
        Some(joint_angle(
            frame.landmark(a)?,
            frame.landmark(b)?,
            frame.landmark(c)?,
        ))
    }
}

/// The eight joint angles of one frame, in `Joint::ALL` order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointAngles([f32; Joint::COUNT]);

impl JointAngles {
    pub fn from_frame(frame: &LandmarkFrame) -> Option<Self> {
        let mut angles = [0.0; Joint::COUNT];
        for (slot, joint) in angles.iter_mut().zip(Joint::ALL) {
            *slot = joint.measure(frame)?;
        }
        Some(Self(angles))
    }

    pub fn get(&self, joint: Joint) -> f32 {
        self.0[joint as usize]
    }

    /// Sum of absolute per-joint differences in degrees
    pub fn total_difference(&self, other: &JointAngles) -> f32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    pub fn to_map(&self) -> BTreeMap<String, f32> {
        Joint::ALL
            .iter()
            .map(|&joint| (joint.name().to_string(), self.get(joint)))
            .collect()
    }
}

/// Every joint must be visible in both frames; a partly hidden body scores 0.
#[derive(Debug, Clone, Copy)]
pub struct JointAngleScorer {
    visibility_threshold: f32,
}

impl JointAngleScorer {
    pub fn new(visibility_threshold: f32) -> Self {
        Self { visibility_threshold }
    }

    pub fn similarity(&self, user: &LandmarkFrame, reference: &LandmarkFrame) -> Option<f32> {
        if user.len() != reference.len() {
            return None;
        }
        let visible = |frame: &LandmarkFrame| {
            Joint::ALL
                .iter()
                .all(|joint| joint.is_visible(frame, self.visibility_threshold))
        };
        if !(visible(user) && visible(reference)) {
            return None;
        }
        let user_angles = JointAngles::from_frame(user)?;
        let ref_angles = JointAngles::from_frame(reference)?;
        let max_difference = Joint::COUNT as f32 * 180.0;
        let similarity = 1.0 - user_angles.total_difference(&ref_angles) / max_difference;
        Some(similarity.clamp(0.0, 1.0))
    }
}

impl Default for JointAngleScorer {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_THRESHOLD)
    }
}

impl Scorer for JointAngleScorer {
    fn name(&self) -> &'static str {
        "angle"
    }

    fn score(&self, user: &LandmarkFrame, reference: &LandmarkFrame) -> u8 {
        self.similarity(user, reference).map_or(0, to_score)
    }
}
