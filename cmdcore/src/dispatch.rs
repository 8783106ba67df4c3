//! The command dispatch service: an asynchronous, correlation-keyed
//! message exchange.
//!
//! Two independent pipelines (request and response), each pairing an
//! unbounded queue with one background worker. A `send` registers a
//! [`MessageRendezvous`] under the message's correlation id and enqueues
//! the message; the request worker hands each message to the processing
//! pool (one task per message); processed messages land on the response
//! queue, whose worker completes the matching rendezvous and wakes the
//! blocked `receive`.
//!
//! The service's lifecycle is an explicit state, not a pair of ambient
//! flags: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! `send` and `receive` are refused outside `Running` with a
//! [`DispatchError::CannotExecute`] carrying the lifecycle cause.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::context::Payload;
use crate::errors::{DispatchError, DispatchResult};
use crate::executor::ActionExecutor;
use crate::message::CommandMessage;
use crate::rendezvous::MessageRendezvous;
use crate::types::{CommandId, CorrelationId};

/// The lifecycle state of the dispatch service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceLifecycle {
    /// Not initialized; no workers exist.
    Stopped,
    /// `initialize` is wiring the pipelines.
    Starting,
    /// Pipelines are draining; `send`/`receive` are accepted.
    Running,
    /// `shutdown` is tearing the pipelines down.
    Stopping,
}

impl std::fmt::Display for ServiceLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// Configuration for the dispatch service.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long shutdown waits for workers and in-flight processing
    /// tasks before aborting them.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl DispatchConfig {
    /// Sets the shutdown timeout.
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// A queue item: a payload message, or the sentinel that unblocks a
/// worker parked on an empty queue during shutdown.
enum Envelope<P: Payload> {
    Message(CommandMessage<P>),
    Shutdown,
}

/// The asynchronous, correlation-keyed message exchange.
///
/// Public surface: [`initialize`](Self::initialize),
/// [`shutdown`](Self::shutdown), [`send`](Self::send), and
/// [`receive`](Self::receive); nothing else is exposed to callers
/// outside the core.
pub struct CommandDispatchService<P: Payload> {
    config: DispatchConfig,
    lifecycle: Mutex<ServiceLifecycle>,
    request_tx: Mutex<Option<mpsc::UnboundedSender<Envelope<P>>>>,
    response_tx: Mutex<Option<mpsc::UnboundedSender<Envelope<P>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<Mutex<HashMap<CorrelationId, Arc<MessageRendezvous<P>>>>>,
}

impl<P: Payload> CommandDispatchService<P> {
    /// Creates a stopped service with the given configuration.
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            lifecycle: Mutex::new(ServiceLifecycle::Stopped),
            request_tx: Mutex::new(None),
            response_tx: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The current lifecycle state.
    pub fn lifecycle(&self) -> ServiceLifecycle {
        *self.lifecycle.lock()
    }

    /// Wires both pipelines and moves the service to `Running`.
    ///
    /// Initializing a service that is not `Stopped` is a protocol
    /// violation and returns [`DispatchError::AlreadyInitialized`].
    pub fn initialize(&self) -> DispatchResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != ServiceLifecycle::Stopped {
                return Err(DispatchError::AlreadyInitialized(*lifecycle));
            }
            *lifecycle = ServiceLifecycle::Starting;
        }

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let request_worker = tokio::spawn(Self::drain_requests(
            request_rx,
            response_tx.clone(),
            self.config.shutdown_timeout,
        ));
        let response_worker =
            tokio::spawn(Self::drain_responses(response_rx, Arc::clone(&self.in_flight)));

        *self.request_tx.lock() = Some(request_tx);
        *self.response_tx.lock() = Some(response_tx);
        self.workers.lock().extend([request_worker, response_worker]);

        *self.lifecycle.lock() = ServiceLifecycle::Running;
        debug!("dispatch service running");
        Ok(())
    }

    /// Accepts a message for asynchronous execution.
    ///
    /// Registers a rendezvous under the message's correlation id and
    /// enqueues the message on the request pipeline. A duplicate
    /// correlation id is ignored with a warning: exactly one rendezvous
    /// and one execution exist per id. Refused outside `Running`.
    pub fn send(&self, message: CommandMessage<P>) -> DispatchResult<()> {
        self.ensure_running()?;

        let correlation_id = message.correlation_id().clone();
        {
            let mut in_flight = self.in_flight.lock();
            match in_flight.entry(correlation_id.clone()) {
                Entry::Occupied(_) => {
                    warn!(
                        correlation_id = %correlation_id,
                        "message already in flight; duplicate send ignored"
                    );
                    return Ok(());
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(MessageRendezvous::new()));
                }
            }
        }

        let enqueued = self
            .request_tx
            .lock()
            .as_ref()
            .ok_or(DispatchError::PipelineClosed {
                pipeline: "request",
            })?
            .send(Envelope::Message(message))
            .is_ok();
        if !enqueued {
            self.in_flight.lock().remove(&correlation_id);
            return Err(DispatchError::PipelineClosed {
                pipeline: "request",
            });
        }
        debug!(correlation_id = %correlation_id, "message enqueued");
        Ok(())
    }

    /// Blocks until the message sent under `correlation_id` completes,
    /// then returns it.
    ///
    /// `command_id` is trace metadata pairing the wait with the command
    /// whose message was sent. An unknown correlation id (already
    /// consumed, or never sent) returns `Ok(None)` with a warning; it
    /// is a signal, not a protocol error. Refused outside `Running`; a
    /// wait cut short by shutdown surfaces as
    /// [`DispatchError::CannotExecute`].
    pub async fn receive(
        &self,
        command_id: &CommandId,
        correlation_id: &CorrelationId,
    ) -> DispatchResult<Option<CommandMessage<P>>> {
        self.ensure_running()?;

        let rendezvous = self.in_flight.lock().get(correlation_id).cloned();
        let Some(rendezvous) = rendezvous else {
            warn!(
                command = %command_id,
                correlation_id = %correlation_id,
                "no in-flight message for correlation id"
            );
            return Ok(None);
        };

        let message = rendezvous
            .wait()
            .await
            .map_err(|source| DispatchError::CannotExecute { source })?;
        self.in_flight.lock().remove(correlation_id);
        debug!(
            command = %command_id,
            correlation_id = %correlation_id,
            "message received"
        );
        Ok(Some(message))
    }

    /// Tears the pipelines down and moves the service to `Stopped`.
    ///
    /// Pushes one sentinel into each queue to unblock parked workers,
    /// waits for workers (and, transitively, the processing pool) up to
    /// the configured shutdown timeout before aborting them, and
    /// releases every registered rendezvous so blocked receivers return.
    /// Shutting down a service that is not `Running` is a no-op.
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle != ServiceLifecycle::Running {
                warn!(lifecycle = %*lifecycle, "shutdown ignored: service is not running");
                return;
            }
            *lifecycle = ServiceLifecycle::Stopping;
        }

        if let Some(request_tx) = self.request_tx.lock().take() {
            let _ = request_tx.send(Envelope::Shutdown);
        }
        if let Some(response_tx) = self.response_tx.lock().take() {
            let _ = response_tx.send(Envelope::Shutdown);
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for mut worker in workers {
            if tokio::time::timeout(self.config.shutdown_timeout, &mut worker)
                .await
                .is_err()
            {
                warn!("worker did not stop within the shutdown timeout; aborting");
                worker.abort();
            }
        }

        let pending = std::mem::take(&mut *self.in_flight.lock());
        for (correlation_id, rendezvous) in pending {
            debug!(correlation_id = %correlation_id, "releasing pending rendezvous");
            rendezvous.abort();
        }

        *self.lifecycle.lock() = ServiceLifecycle::Stopped;
        debug!("dispatch service stopped");
    }

    fn ensure_running(&self) -> DispatchResult<()> {
        let lifecycle = self.lifecycle();
        if lifecycle == ServiceLifecycle::Running {
            Ok(())
        } else {
            Err(DispatchError::not_running(lifecycle))
        }
    }

    /// Request pipeline worker: submits each message to the processing
    /// pool, one concurrent task per message.
    async fn drain_requests(
        mut request_rx: mpsc::UnboundedReceiver<Envelope<P>>,
        response_tx: mpsc::UnboundedSender<Envelope<P>>,
        shutdown_timeout: Duration,
    ) {
        let mut pool = JoinSet::new();
        while let Some(envelope) = request_rx.recv().await {
            match envelope {
                Envelope::Shutdown => {
                    debug!("request worker received shutdown sentinel");
                    break;
                }
                Envelope::Message(message) => {
                    let response_tx = response_tx.clone();
                    pool.spawn(async move {
                        let processed = ActionExecutor::process_action_command(message).await;
                        if response_tx.send(Envelope::Message(processed)).is_err() {
                            warn!("response pipeline closed; processed message dropped");
                        }
                    });
                }
            }
        }

        let drain = async {
            while pool.join_next().await.is_some() {}
        };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            warn!("processing pool did not drain within the shutdown timeout; aborting");
            pool.abort_all();
        }
    }

    /// Response pipeline worker: completes the rendezvous each processed
    /// message belongs to.
    async fn drain_responses(
        mut response_rx: mpsc::UnboundedReceiver<Envelope<P>>,
        in_flight: Arc<Mutex<HashMap<CorrelationId, Arc<MessageRendezvous<P>>>>>,
    ) {
        while let Some(envelope) = response_rx.recv().await {
            match envelope {
                Envelope::Shutdown => {
                    debug!("response worker received shutdown sentinel");
                    break;
                }
                Envelope::Message(message) => {
                    let rendezvous = in_flight.lock().get(message.correlation_id()).cloned();
                    match rendezvous {
                        Some(rendezvous) => rendezvous.complete(message),
                        None => warn!(
                            correlation_id = %message.correlation_id(),
                            "no rendezvous for processed message; dropped"
                        ),
                    }
                }
            }
        }
    }
}

impl<P: Payload> Default for CommandDispatchService<P> {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}
