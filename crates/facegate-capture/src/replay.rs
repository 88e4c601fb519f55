//! Replays a recorded frame script in place of a live detector.
//!
//! Script format (JSON):
//!
//! ```text
//! {
//!   "width": 640,
//!   "height": 480,
//!   "frames": [
//!     null,
//!     { "box": {...}, "landmarks": {...}, "descriptor": [0.01, ...] }
//!   ]
//! }
//! ```
//!
//! `null` is a frame without a face. Once the frames run out every call
//! fails with [`DetectorError::StreamEnded`].

use crate::detector::{DetectedFrame, Detection, Detector, DetectorError};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read frame script {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid frame script: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct FrameScript {
    width: u32,
    height: u32,
    frames: Vec<Option<Detection>>,
}

pub struct ReplayDetector {
    width: u32,
    height: u32,
    frames: VecDeque<Option<Detection>>,
    sequence: u32,
}

impl ReplayDetector {
    pub fn new(width: u32, height: u32, frames: Vec<Option<Detection>>) -> Self {
        Self {
            width,
            height,
            frames: frames.into(),
            sequence: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ReplayError> {
        let script: FrameScript = serde_json::from_str(json)?;
        Ok(Self::new(script.width, script.height, script.frames))
    }

    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let detector = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            frames = detector.remaining(),
            width = detector.width,
            height = detector.height,
            "loaded frame script"
        );
        Ok(detector)
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self) -> Result<DetectedFrame, DetectorError> {
        let face = self.frames.pop_front().ok_or(DetectorError::StreamEnded)?;
        self.sequence += 1;
        tracing::trace!(sequence = self.sequence, face = face.is_some(), "replay frame");
        Ok(DetectedFrame {
            width: self.width,
            height: self.height,
            face,
        })
    }
}
