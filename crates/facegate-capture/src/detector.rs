//! Seam to the external face detector.
//!
//! The detector owns the camera and the neural nets; this crate only sees
//! its per-frame output.

use facegate_core::{Descriptor, DetectionBox, Landmarks};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("frame stream ended")]
    StreamEnded,
}

/// One face as produced by the detector: geometry plus its descriptor.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: DetectionBox,
    pub landmarks: Landmarks,
    pub descriptor: Descriptor,
}

/// Detector output for one camera frame. At most one face.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFrame {
    pub width: u32,
    pub height: u32,
    pub face: Option<Detection>,
}

/// Produces the next frame's detection on demand.
///
/// Each call grabs a fresh frame; calls are strictly sequential within a
/// capture session.
pub trait Detector {
    fn detect(&mut self) -> Result<DetectedFrame, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self) -> Result<DetectedFrame, DetectorError> {
        (**self).detect()
    }
}
