//! Per-message rendezvous between a blocked caller and a worker.
//!
//! Exactly one rendezvous exists per correlation id for the lifetime of
//! one request/response round trip. The caller parks in [`wait`]
//! (`MessageRendezvous::wait`); the response pipeline hands over the
//! processed message through [`complete`](MessageRendezvous::complete);
//! shutdown releases parked callers through
//! [`abort`](MessageRendezvous::abort). Waiting is a notification with
//! a state re-check, not a poll loop, so completion is observed promptly
//! and no wakeup can be lost.

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::context::Payload;
use crate::errors::LifecycleError;
use crate::message::CommandMessage;

/// Where a round trip currently stands.
#[derive(Debug)]
enum Progress<P: Payload> {
    /// The worker has not delivered a result yet.
    InProgress,
    /// The result is ready for the waiting caller.
    Completed(CommandMessage<P>),
    /// The result was handed to the caller.
    Consumed,
    /// Shutdown released the rendezvous before a result arrived.
    Aborted,
}

/// The rendezvous object a caller blocks on until its message completes.
///
/// Single-consumer: one `receive` call waits per rendezvous, matching
/// the one-in-flight-message-per-correlation-id invariant of the
/// exchange.
#[derive(Debug)]
pub struct MessageRendezvous<P: Payload> {
    progress: Mutex<Progress<P>>,
    notify: Notify,
}

impl<P: Payload> MessageRendezvous<P> {
    /// Creates a rendezvous awaiting its result.
    pub fn new() -> Self {
        Self {
            progress: Mutex::new(Progress::InProgress),
            notify: Notify::new(),
        }
    }

    /// Delivers the processed message and wakes the waiting caller.
    ///
    /// Single-shot and idempotent: only the first delivery counts; any
    /// later call is ignored with a warning.
    pub fn complete(&self, message: CommandMessage<P>) {
        {
            let mut progress = self.progress.lock();
            match &*progress {
                Progress::InProgress => *progress = Progress::Completed(message),
                _ => {
                    warn!(
                        correlation_id = %message.correlation_id(),
                        "rendezvous already settled; duplicate completion ignored"
                    );
                    return;
                }
            }
        }
        self.notify.notify_one();
    }

    /// Releases a parked caller without a result.
    ///
    /// Used only by service shutdown. A rendezvous that already holds a
    /// result keeps it.
    pub fn abort(&self) {
        {
            let mut progress = self.progress.lock();
            if matches!(&*progress, Progress::InProgress) {
                *progress = Progress::Aborted;
            }
        }
        self.notify.notify_one();
    }

    /// Whether a result has been delivered and not yet consumed.
    pub fn is_completed(&self) -> bool {
        matches!(&*self.progress.lock(), Progress::Completed(_))
    }

    /// Parks until the paired worker delivers the result.
    ///
    /// Returns the processed message, or
    /// [`LifecycleError::ShutDownWhilePending`] when shutdown released
    /// the rendezvous first.
    pub async fn wait(&self) -> Result<CommandMessage<P>, LifecycleError> {
        loop {
            {
                let mut progress = self.progress.lock();
                match &*progress {
                    Progress::Completed(_) => {
                        let settled = std::mem::replace(&mut *progress, Progress::Consumed);
                        let Progress::Completed(message) = settled else {
                            unreachable!("progress was just observed as Completed");
                        };
                        return Ok(message);
                    }
                    Progress::Aborted | Progress::Consumed => {
                        return Err(LifecycleError::ShutDownWhilePending);
                    }
                    Progress::InProgress => {}
                }
            }
            self.notify.notified().await;
        }
    }
}

impl<P: Payload> Default for MessageRendezvous<P> {
    fn default() -> Self {
        Self::new()
    }
}
