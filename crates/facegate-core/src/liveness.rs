//! Soft anti-spoofing signals derived from consecutive landmark frames.
//!
//! A printed photo held in front of the camera shows neither natural head
//! motion nor eyelid closure. Two sticky flags record whether either has
//! been observed during the current capture session. The flags are
//! advisory: they never block a capture; callers log or enforce them.
//!
//! Frames must be fed in capture order, one session per instance.

use crate::types::{Landmarks, Point};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessConfig {
    /// Nose-tip displacements at or below this are sensor noise.
    pub min_movement_px: f64,
    /// Displacements at or above this are a scene cut, not motion.
    pub max_movement_px: f64,
    /// Eye aspect ratio below which the eyes count as closed.
    pub blink_ear_threshold: f64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            min_movement_px: 5.0,
            max_movement_px: 30.0,
            blink_ear_threshold: 0.2,
        }
    }
}

/// Accumulated liveness indicators for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LivenessFlags {
    pub movement: bool,
    pub blink: bool,
}

/// Eye aspect ratio over six eye points (corner, upper, upper, corner,
/// lower, lower). `None` when the eye corners coincide.
pub fn eye_aspect_ratio(eye: &[Point; 6]) -> Option<f64> {
    let vertical_1 = eye[1].distance_to(&eye[5]);
    let vertical_2 = eye[2].distance_to(&eye[4]);
    let horizontal = eye[0].distance_to(&eye[3]);
    if horizontal <= 0.0 {
        return None;
    }
    Some((vertical_1 + vertical_2) / (2.0 * horizontal))
}

#[derive(Debug, Clone, Default)]
pub struct LivenessSignal {
    config: LivenessConfig,
    previous_nose: Option<Point>,
    previous_ear: Option<f64>,
    flags: LivenessFlags,
}

impl LivenessSignal {
    pub fn new(config: LivenessConfig) -> Self {
        Self {
            config,
            previous_nose: None,
            previous_ear: None,
            flags: LivenessFlags::default(),
        }
    }

    pub fn flags(&self) -> LivenessFlags {
        self.flags
    }

    /// Feed one frame to both detectors.
    pub fn observe(&mut self, landmarks: &Landmarks) -> LivenessFlags {
        self.detect_movement(landmarks);
        self.detect_blink(landmarks);
        self.flags
    }

    /// Sets the movement flag when the nose tip moved a plausible distance
    /// since the previous frame. Returns the (sticky) flag.
    pub fn detect_movement(&mut self, landmarks: &Landmarks) -> bool {
        let nose = landmarks.nose_tip();
        if let Some(previous) = self.previous_nose.replace(nose) {
            let displacement = nose.distance_to(&previous);
            if displacement > self.config.min_movement_px
                && displacement < self.config.max_movement_px
                && !self.flags.movement
            {
                tracing::debug!(displacement, "liveness: movement observed");
                self.flags.movement = true;
            }
        }
        self.flags.movement
    }

    /// Sets the blink flag when the mean eye aspect ratio crosses from above
    /// the threshold to below it between consecutive frames. Returns the
    /// (sticky) flag.
    pub fn detect_blink(&mut self, landmarks: &Landmarks) -> bool {
        let ear = match (
            eye_aspect_ratio(&landmarks.left_eye),
            eye_aspect_ratio(&landmarks.right_eye),
        ) {
            (Some(left), Some(right)) => (left + right) / 2.0,
            _ => return self.flags.blink,
        };

        let threshold = self.config.blink_ear_threshold;
        if let Some(previous) = self.previous_ear.replace(ear) {
            if previous > threshold && ear < threshold && !self.flags.blink {
                tracing::debug!(previous, ear, "liveness: blink observed");
                self.flags.blink = true;
            }
        }
        self.flags.blink
    }

    pub fn reset(&mut self) {
        self.previous_nose = None;
        self.previous_ear = None;
        self.flags = LivenessFlags::default();
    }
}
