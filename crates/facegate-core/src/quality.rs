//! Per-frame capture quality gate.
//!
//! Scores one detected face against the ideal capture pose: face size,
//! centring, frontal pose, detector confidence and (optionally) eye
//! separation and vertical symmetry. Checks run in a fixed order and the
//! first failure wins. Every verdict carries an instruction meant to be
//! shown to the person in front of the camera.

use crate::types::{DetectionBox, Landmarks};
use serde::{Deserialize, Serialize};

const EXTENDED_MIN_CONFIDENCE: f64 = 0.65;
const EXTENDED_MIN_EYE_DISTANCE_PX: f64 = 40.0;
const EXTENDED_MAX_VERTICAL_ASYMMETRY: f64 = 0.5;

/// Why a frame was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Good,
    NoFace,
    TooFar,
    TooClose,
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    NotFrontal,
    LowConfidence,
    EyesTooNarrow,
    HeadTilted,
}

impl ReasonCode {
    pub fn message(self) -> &'static str {
        match self {
            Self::Good => "Position good, processing...",
            Self::NoFace => "No face detected",
            Self::TooFar => "Move closer to the camera",
            Self::TooClose => "Move back a little",
            Self::MoveLeft => "Move to the left",
            Self::MoveRight => "Move to the right",
            Self::MoveUp => "Move up",
            Self::MoveDown => "Move down",
            Self::NotFrontal => "Look straight at the camera",
            Self::LowConfidence => "Improve the lighting",
            Self::EyesTooNarrow => "Move closer to the camera",
            Self::HeadTilted => "Keep your head level",
        }
    }
}

/// Outcome of gating one frame. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityVerdict {
    pub accepted: bool,
    pub reason: ReasonCode,
    pub message: &'static str,
}

impl QualityVerdict {
    fn accept() -> Self {
        Self {
            accepted: true,
            reason: ReasonCode::Good,
            message: ReasonCode::Good.message(),
        }
    }

    pub fn reject(reason: ReasonCode) -> Self {
        Self {
            accepted: false,
            reason,
            message: reason.message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Smallest face-area / frame-area ratio accepted.
    pub min_face_ratio: f64,
    /// Largest face-area / frame-area ratio accepted.
    pub max_face_ratio: f64,
    /// Allowed horizontal centre offset, as a fraction of frame width.
    pub horizontal_tolerance: f64,
    /// Allowed vertical centre offset, as a fraction of frame height.
    pub vertical_tolerance: f64,
    /// Largest relative difference between nose-to-eye horizontal distances.
    pub max_rotation: f64,
    pub min_confidence: f64,
    /// Minimum distance between eye centres in pixels. `None` disables the check.
    pub min_eye_distance_px: Option<f64>,
    /// Largest relative difference between eye-to-nose and nose-to-mouth
    /// vertical distances. `None` disables the check.
    pub max_vertical_asymmetry: Option<f64>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_face_ratio: 0.08,
            max_face_ratio: 0.50,
            horizontal_tolerance: 0.25,
            vertical_tolerance: 0.20,
            max_rotation: 0.3,
            min_confidence: 0.6,
            min_eye_distance_px: None,
            max_vertical_asymmetry: None,
        }
    }
}

impl QualityConfig {
    /// Stricter profile with eye-separation and symmetry checks enabled.
    pub fn extended() -> Self {
        let mut config = Self::default();
        config.enable_extended();
        config
    }

    /// Turn on the extended checks without loosening anything already set.
    /// Explicit eye-distance and asymmetry limits are kept.
    pub fn enable_extended(&mut self) {
        self.min_confidence = self.min_confidence.max(EXTENDED_MIN_CONFIDENCE);
        self.min_eye_distance_px.get_or_insert(EXTENDED_MIN_EYE_DISTANCE_PX);
        self.max_vertical_asymmetry.get_or_insert(EXTENDED_MAX_VERTICAL_ASYMMETRY);
    }
}

/// Stateless frame scorer.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        face: &DetectionBox,
        landmarks: &Landmarks,
        frame_width: u32,
        frame_height: u32,
    ) -> QualityVerdict {
        let (frame_w, frame_h) = (frame_width as f64, frame_height as f64);
        let verdict = match self.first_failure(face, landmarks, frame_w, frame_h) {
            Some(reason) => QualityVerdict::reject(reason),
            None => QualityVerdict::accept(),
        };
        tracing::trace!(reason = ?verdict.reason, accepted = verdict.accepted, "quality verdict");
        verdict
    }

    fn first_failure(
        &self,
        face: &DetectionBox,
        landmarks: &Landmarks,
        frame_w: f64,
        frame_h: f64,
    ) -> Option<ReasonCode> {
        let c = &self.config;

        // Comparisons are written so that NaN from a broken detector or a
        // degenerate frame fails the check instead of slipping through.
        let frame_area = frame_w * frame_h;
        let ratio = if frame_area > 0.0 { face.area() / frame_area } else { f64::NAN };
        if !(ratio >= c.min_face_ratio) {
            return Some(ReasonCode::TooFar);
        }
        if ratio > c.max_face_ratio {
            return Some(ReasonCode::TooClose);
        }

        // The preview is mirrored: a face left of centre is told to move right.
        let center = face.center();
        let dx = center.x - frame_w / 2.0;
        if !(dx.abs() <= frame_w * c.horizontal_tolerance) {
            return Some(if dx < 0.0 { ReasonCode::MoveRight } else { ReasonCode::MoveLeft });
        }

        let dy = center.y - frame_h / 2.0;
        if !(dy.abs() <= frame_h * c.vertical_tolerance) {
            return Some(if dy < 0.0 { ReasonCode::MoveDown } else { ReasonCode::MoveUp });
        }

        let nose = landmarks.nose_tip();
        let left = (nose.x - landmarks.left_eye[0].x).abs();
        let right = (nose.x - landmarks.right_eye[3].x).abs();
        let widest = left.max(right);
        if !(widest > 0.0 && (left - right).abs() / widest <= c.max_rotation) {
            return Some(ReasonCode::NotFrontal);
        }

        if !(face.confidence >= c.min_confidence) {
            return Some(ReasonCode::LowConfidence);
        }

        if let Some(min_px) = c.min_eye_distance_px {
            let separation = landmarks.left_eye_center().distance_to(&landmarks.right_eye_center());
            if !(separation >= min_px) {
                return Some(ReasonCode::EyesTooNarrow);
            }
        }

        if let Some(max_asymmetry) = c.max_vertical_asymmetry {
            let eye_y = (landmarks.left_eye_center().y + landmarks.right_eye_center().y) / 2.0;
            let upper = (nose.y - eye_y).abs();
            let lower = (landmarks.mouth_center().y - nose.y).abs();
            let longest = upper.max(lower);
            if !(longest > 0.0 && (upper - lower).abs() / longest <= max_asymmetry) {
                return Some(ReasonCode::HeadTilted);
            }
        }

        None
    }
}
