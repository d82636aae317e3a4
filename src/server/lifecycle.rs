use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

/// Lifecycle stages of a long-running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Running,
    StopRequested,
    Stopped,
}

impl Stage {
    fn from_u8(raw: u8) -> Stage {
        match raw {
            0 => Stage::Created,
            1 => Stage::Running,
            2 => Stage::StopRequested,
            _ => Stage::Stopped,
        }
    }
}

/// Start/stop control shared between a service handle and its task.
///
/// The stage only moves forward: Created, Running, StopRequested, Stopped.
/// Stops are signalled through a cancellation token, so a task parked in
/// `select!` observes them without waiting for I/O to complete.
pub struct ServiceState {
    stage: AtomicU8,
    shutdown: CancellationToken,
}

impl ServiceState {
    pub fn new() -> ServiceState {
        ServiceState {
            stage: AtomicU8::new(Stage::Created as u8),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.stage() == Stage::Running
    }

    /// Moves Created to Running. Fails with the observed stage when the
    /// service was already started or stopped.
    pub fn begin_running(&self) -> Result<(), Stage> {
        self.stage
            .compare_exchange(
                Stage::Created as u8,
                Stage::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(Stage::from_u8)
    }

    /// Requests a stop and fires the cancellation token. Only the first
    /// call flips the stage, and it returns the stage it flipped from;
    /// later calls return `None`.
    pub fn request_stop(&self) -> Option<Stage> {
        let mut current = self.stage.load(Ordering::Acquire);
        loop {
            let stage = Stage::from_u8(current);
            if stage == Stage::StopRequested || stage == Stage::Stopped {
                return None;
            }
            match self.stage.compare_exchange(
                current,
                Stage::StopRequested as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.shutdown.cancel();
                    return Some(stage);
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Marks the service fully stopped. Called by the task as it exits.
    pub fn mark_stopped(&self) {
        self.stage.store(Stage::Stopped as u8, Ordering::Release);
    }

    /// Resolves once a stop has been requested.
    pub async fn cancelled(&self) {
        self.shutdown.cancelled().await
    }
}

impl Default for ServiceState {
    fn default() -> ServiceState {
        ServiceState::new()
    }
}
