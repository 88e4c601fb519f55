//! facegate-capture — Live capture orchestration.
//!
//! Polls an external face detector, runs each frame through the quality
//! gate and liveness signal, and decides when a descriptor is trustworthy
//! enough to submit for login or enrollment.

pub mod detector;
pub mod engine;
pub mod orchestrator;
pub mod replay;

pub use detector::{DetectedFrame, Detection, Detector, DetectorError};
pub use engine::{spawn_capture, CaptureEvent, CaptureHandle};
pub use orchestrator::{
    CaptureConfig, CaptureError, CaptureMode, CaptureObserver, CaptureOrchestrator,
    CaptureOutcome, CaptureSession, CaptureState, TickOutcome,
};
pub use replay::{ReplayDetector, ReplayError};
