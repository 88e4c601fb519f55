//! Capture state machine.
//!
//! The caller drives it with [`CaptureOrchestrator::tick`], once per poll
//! interval; [`crate::engine`] does so on a tokio timer. Each tick pulls at
//! most one frame from the detector, gates it, and on acceptance hands the
//! descriptor to the observer. While a capture is in flight (including the
//! pause between enrollment captures) ticks are dropped, never queued.
//!
//! ```text
//! Idle -> Polling -> (Accepting -> Polling)* -> Completed | Failed
//! ```

use crate::detector::{Detector, DetectorError};
use facegate_core::{
    Descriptor, LivenessConfig, LivenessFlags, LivenessSignal, QualityGate, QualityVerdict,
    ReasonCode,
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_CAPTURE_PAUSE_MS: u64 = 1500;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("detector failed: {0}")]
    DetectorUnavailable(#[from] DetectorError),
    #[error("required capture count must be at least 1")]
    InvalidRequiredCaptures,
    #[error("a capture session is already running")]
    AlreadyActive,
    #[error("capture cancelled")]
    Cancelled,
    #[error("capture task exited unexpectedly")]
    TaskExited,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Time between frame polls.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Pause after an enrollment capture so the subject can reset pose.
    #[serde(with = "millis")]
    pub capture_pause: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            capture_pause: Duration::from_millis(DEFAULT_CAPTURE_PAUSE_MS),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// What the session is collecting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Collect `required` descriptors for registration.
    Enrollment { required: usize },
    /// A single accepted frame completes the session.
    Login,
}

impl CaptureMode {
    pub fn required(&self) -> usize {
        match self {
            Self::Enrollment { required } => *required,
            Self::Login => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Polling,
    /// A capture is in flight; ticks are dropped until `resume_at`.
    Accepting { resume_at: Instant },
    Completed,
    Failed,
}

impl CaptureState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Polling | Self::Accepting { .. })
    }
}

/// The one authoritative record of an in-progress capture.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    mode: CaptureMode,
    captures: Vec<Descriptor>,
    capturing: bool,
}

impl CaptureSession {
    fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            captures: Vec::with_capacity(mode.required()),
            capturing: false,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn captures(&self) -> &[Descriptor] {
        &self.captures
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }
}

/// Final result of a completed session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub mode: CaptureMode,
    /// Accepted descriptors in capture order: `required` of them for
    /// enrollment, one for login.
    pub descriptors: Vec<Descriptor>,
    /// Advisory liveness indicators seen during the session.
    pub liveness: LivenessFlags,
}

/// Receives the three capture channels.
pub trait CaptureObserver {
    /// Operator guidance; high frequency, advisory.
    fn on_feedback(&mut self, verdict: &QualityVerdict);
    /// One accepted descriptor. `index` is zero-based within the session.
    fn on_capture(&mut self, index: usize, descriptor: &Descriptor);
    /// Terminal failure; the session has already moved to `Failed`.
    fn on_error(&mut self, error: &CaptureError);
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Not polling.
    Inactive,
    /// A capture was in flight; the tick was dropped.
    Skipped,
    NoFace,
    Rejected(ReasonCode),
    /// A descriptor was accepted and more are needed.
    Captured { count: usize },
    Completed(CaptureOutcome),
    Failed(CaptureError),
}

pub struct CaptureOrchestrator {
    config: CaptureConfig,
    gate: QualityGate,
    liveness: LivenessSignal,
    state: CaptureState,
    session: Option<CaptureSession>,
}

impl CaptureOrchestrator {
    pub fn new(config: CaptureConfig, gate: QualityGate, liveness: LivenessConfig) -> Self {
        Self {
            config,
            gate,
            liveness: LivenessSignal::new(liveness),
            state: CaptureState::Idle,
            session: None,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    /// Liveness observed so far in the current (or last finished) session.
    pub fn liveness(&self) -> LivenessFlags {
        self.liveness.flags()
    }

    /// Begin a fresh session. Any previous terminal session is discarded.
    pub fn start(&mut self, mode: CaptureMode) -> Result<(), CaptureError> {
        if self.state.is_active() {
            return Err(CaptureError::AlreadyActive);
        }
        if mode.required() == 0 {
            return Err(CaptureError::InvalidRequiredCaptures);
        }

        self.liveness.reset();
        self.session = Some(CaptureSession::new(mode));
        self.state = CaptureState::Polling;
        tracing::info!(?mode, required = mode.required(), "capture started");
        Ok(())
    }

    /// Return to `Idle`, dropping the session and any partial captures.
    pub fn stop(&mut self) {
        self.session = None;
        self.liveness.reset();
        self.state = CaptureState::Idle;
    }

    /// Abort an active session. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.state.is_active();
        if was_active {
            let captured = self.session.as_ref().map_or(0, |s| s.captures.len());
            tracing::info!(captured, "capture cancelled");
        }
        self.stop();
        was_active
    }

    /// Run one poll step at time `now`.
    pub fn tick<D, O>(&mut self, detector: &mut D, now: Instant, observer: &mut O) -> TickOutcome
    where
        D: Detector + ?Sized,
        O: CaptureObserver + ?Sized,
    {
        match self.state {
            CaptureState::Polling => {}
            CaptureState::Accepting { resume_at } if now >= resume_at => {
                if let Some(session) = self.session.as_mut() {
                    session.capturing = false;
                }
                self.state = CaptureState::Polling;
                tracing::debug!("pause elapsed, polling for next capture");
            }
            CaptureState::Accepting { .. } => return TickOutcome::Skipped,
            CaptureState::Idle | CaptureState::Completed | CaptureState::Failed => {
                return TickOutcome::Inactive
            }
        }

        let Some(session) = self.session.as_mut() else {
            self.state = CaptureState::Idle;
            return TickOutcome::Inactive;
        };

        let frame = match detector.detect() {
            Ok(frame) => frame,
            Err(err) => {
                let err = CaptureError::DetectorUnavailable(err);
                tracing::warn!(error = %err, "capture failed");
                self.session = None;
                self.state = CaptureState::Failed;
                observer.on_error(&err);
                return TickOutcome::Failed(err);
            }
        };

        let Some(face) = frame.face else {
            observer.on_feedback(&QualityVerdict::reject(ReasonCode::NoFace));
            return TickOutcome::NoFace;
        };

        self.liveness.observe(&face.landmarks);

        let verdict = self.gate.evaluate(&face.bbox, &face.landmarks, frame.width, frame.height);
        observer.on_feedback(&verdict);
        if !verdict.accepted {
            return TickOutcome::Rejected(verdict.reason);
        }

        session.capturing = true;
        let index = session.captures.len();
        observer.on_capture(index, &face.descriptor);
        session.captures.push(face.descriptor);
        let count = session.captures.len();
        let required = session.mode.required();
        tracing::info!(count, required, confidence = face.bbox.confidence, "capture accepted");

        if count < required {
            self.state = CaptureState::Accepting {
                resume_at: now + self.config.capture_pause,
            };
            return TickOutcome::Captured { count };
        }

        let outcome = CaptureOutcome {
            mode: session.mode,
            liveness: self.liveness.flags(),
            descriptors: std::mem::take(&mut session.captures),
        };
        self.session = None;
        self.state = CaptureState::Completed;
        tracing::info!(
            captures = outcome.descriptors.len(),
            movement = outcome.liveness.movement,
            blink = outcome.liveness.blink,
            "capture completed"
        );
        TickOutcome::Completed(outcome)
    }
}
