//! Async driver: runs one capture session on a tokio task.
//!
//! The task owns the detector and the orchestrator, ticks on a fixed
//! interval, and forwards observer callbacks to the caller through a
//! bounded channel. Missed timer ticks are skipped, so a slow detector
//! never causes a burst of queued evaluations.

use crate::detector::Detector;
use crate::orchestrator::{
    CaptureError, CaptureMode, CaptureObserver, CaptureOrchestrator, CaptureOutcome, TickOutcome,
};
use facegate_core::{Descriptor, QualityVerdict};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Messages sent from the capture task to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Feedback(QualityVerdict),
    Captured { index: usize, descriptor: Descriptor },
    Error(CaptureError),
}

impl CaptureObserver for Vec<CaptureEvent> {
    fn on_feedback(&mut self, verdict: &QualityVerdict) {
        self.push(CaptureEvent::Feedback(*verdict));
    }

    fn on_capture(&mut self, index: usize, descriptor: &Descriptor) {
        self.push(CaptureEvent::Captured {
            index,
            descriptor: descriptor.clone(),
        });
    }

    fn on_error(&mut self, error: &CaptureError) {
        self.push(CaptureEvent::Error(error.clone()));
    }
}

/// Caller side of a running capture session.
///
/// Dropping the handle cancels the session.
pub struct CaptureHandle {
    events: mpsc::Receiver<CaptureEvent>,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<CaptureOutcome, CaptureError>>,
}

impl CaptureHandle {
    /// Next event from the session; `None` once the task has finished.
    pub async fn next_event(&mut self) -> Option<CaptureEvent> {
        self.events.recv().await
    }

    /// Stop the session at its next await point. No timer is left pending.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the session to end, discarding any unread events.
    pub async fn finish(self) -> Result<CaptureOutcome, CaptureError> {
        let CaptureHandle {
            events,
            cancel: _cancel,
            task,
        } = self;
        drop(events);
        task.await.map_err(|_| CaptureError::TaskExited)?
    }
}

/// Start a capture session on the current tokio runtime.
///
/// The orchestrator is started synchronously so that an invalid mode or a
/// session already in progress fails fast.
pub fn spawn_capture<D>(
    detector: D,
    mut orchestrator: CaptureOrchestrator,
    mode: CaptureMode,
) -> Result<CaptureHandle, CaptureError>
where
    D: Detector + Send + 'static,
{
    orchestrator.start(mode)?;

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(run_capture(detector, orchestrator, event_tx, cancel_rx));

    Ok(CaptureHandle {
        events: event_rx,
        cancel: Some(cancel_tx),
        task,
    })
}

async fn run_capture<D: Detector>(
    mut detector: D,
    mut orchestrator: CaptureOrchestrator,
    events: mpsc::Sender<CaptureEvent>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<CaptureOutcome, CaptureError> {
    let mut interval = tokio::time::interval(orchestrator.config().poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            // Fires on an explicit cancel and when the handle is dropped.
            _ = &mut cancel => {
                orchestrator.cancel();
                return Err(CaptureError::Cancelled);
            }
            _ = interval.tick() => {}
        }

        let mut pending: Vec<CaptureEvent> = Vec::new();
        let outcome = orchestrator.tick(&mut detector, Instant::now().into_std(), &mut pending);
        for event in pending {
            // A full channel must not hide a cancel.
            tokio::select! {
                biased;
                _ = &mut cancel => {
                    orchestrator.cancel();
                    return Err(CaptureError::Cancelled);
                }
                _ = forward(&events, event) => {}
            }
        }

        match outcome {
            TickOutcome::Completed(outcome) => return Ok(outcome),
            TickOutcome::Failed(err) => return Err(err),
            TickOutcome::Inactive => return Err(CaptureError::TaskExited),
            TickOutcome::Skipped
            | TickOutcome::NoFace
            | TickOutcome::Rejected(_)
            | TickOutcome::Captured { .. } => {}
        }
    }
}

/// Feedback is advisory and dropped when the caller falls behind; captures
/// and errors wait for room.
async fn forward(events: &mpsc::Sender<CaptureEvent>, event: CaptureEvent) {
    match event {
        CaptureEvent::Feedback(_) => {
            if let Err(mpsc::error::TrySendError::Full(_)) = events.try_send(event) {
                tracing::trace!("feedback dropped, receiver behind");
            }
        }
        other => {
            let _ = events.send(other).await;
        }
    }
}
