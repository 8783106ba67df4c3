//! Error types for `CmdCore`.
//!
//! Errors are split by layer, and the split carries the propagation
//! policy of the whole library:
//!
//! - **`CommandError`**: business and validation failures. These are
//!   *data*: they are captured into the execution context (state `Fail`)
//!   and never unwind the call stack.
//! - **`RepositoryError`**: failures of the persistence collaborator.
//!   Converted into `CommandError::Repository` at the command boundary.
//! - **`DispatchError`**: service and protocol failures (misuse of the
//!   dispatch service, shutdown races). These are *bugs or integration
//!   faults* and are the only errors allowed to propagate to callers.
//! - **`FrameError`**: wire encode/decode failures for message frames.

use crate::context::{ContextState, ParameterKind};
use crate::dispatch::ServiceLifecycle;
use crate::types::{CommandId, CorrelationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for command business logic.
pub type CommandResult<T> = Result<T, CommandError>;

/// Result alias for persistence collaborator operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result alias for dispatch service operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors produced by command business logic and parameter validation.
///
/// A `CommandError` never propagates out of `do_command`/`undo_command`;
/// it is recorded on the execution context and the context transitions to
/// `Fail`. The variants distinguish the failure classes callers care
/// about when inspecting a failed context.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum CommandError {
    /// The command was given no parameter at all.
    #[error("Command parameter is missing")]
    MissingParameter,

    /// The command was given a parameter of the wrong shape.
    #[error("Parameter mismatch: expected {expected} parameter, got {actual}")]
    ParameterMismatch {
        /// The parameter shape the command accepts.
        expected: ParameterKind,
        /// The parameter shape it was given.
        actual: ParameterKind,
    },

    /// A state transition was requested that the context does not allow.
    ///
    /// Recorded on the context without invoking business logic, so that a
    /// protocol violation never causes partial business side effects.
    #[error("Cannot run command '{command}': context is {actual}, requires {required}")]
    IllegalState {
        /// The command whose execution was requested.
        command: CommandId,
        /// The state the context must be in.
        required: ContextState,
        /// The state the context is actually in.
        actual: ContextState,
    },

    /// A domain rule was violated during command execution.
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    /// A referenced entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The persistence collaborator failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// An unexpected internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from the persistence collaborator boundary.
///
/// The core never assumes a storage technology; these variants cover the
/// failure modes any `save`/`find_by_id`/`delete_by_id` backend exposes.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RepositoryError {
    /// No entity is stored under the given id.
    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    /// An entity with the given id already exists.
    #[error("Entity '{0}' already exists")]
    DuplicateEntity(String),

    /// The backing store could not be reached.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

/// The cause a dispatch operation was refused for.
///
/// Carried as the source of [`DispatchError::CannotExecute`] so callers
/// can see why the service refused without parsing display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The service is not in the `Running` lifecycle state.
    #[error("service is not running (lifecycle: {0})")]
    NotRunning(ServiceLifecycle),

    /// The service shut down while a receive was still pending.
    #[error("service shut down while the message was in flight")]
    ShutDownWhilePending,
}

/// Errors raised by the command dispatch service.
///
/// Unlike `CommandError`, these indicate misuse of the service or a
/// shutdown race and are allowed to propagate to the caller.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The service cannot execute the request in its current state.
    #[error("cannot execute command request: {source}")]
    CannotExecute {
        /// The lifecycle condition that caused the refusal.
        #[source]
        source: LifecycleError,
    },

    /// `initialize` was called on a service that is not stopped.
    #[error("service already initialized (lifecycle: {0})")]
    AlreadyInitialized(ServiceLifecycle),

    /// An internal pipeline queue is gone.
    ///
    /// Indicates a worker died outside the shutdown path.
    #[error("{pipeline} pipeline is closed")]
    PipelineClosed {
        /// Which pipeline the failed enqueue targeted.
        pipeline: &'static str,
    },

    /// A message this caller sent has no response rendezvous anymore.
    ///
    /// The executor sends and receives under one correlation id it
    /// minted itself, so a missing rendezvous means the round trip was
    /// consumed elsewhere.
    #[error("no response for correlation id '{correlation_id}'")]
    ResponseLost {
        /// The correlation id whose response vanished.
        correlation_id: CorrelationId,
    },
}

impl DispatchError {
    /// Builds the standard refusal error for a service that is not running.
    pub const fn not_running(lifecycle: ServiceLifecycle) -> Self {
        Self::CannotExecute {
            source: LifecycleError::NotRunning(lifecycle),
        }
    }
}

/// Errors raised when encoding or decoding a message frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The JSON form of the frame could not be produced or parsed.
    ///
    /// A frame whose `direction` field is missing or unrecognized fails
    /// here: a message without a resolvable direction cannot be safely
    /// executed in either mode.
    #[error("invalid message frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The frame names a command this process has not registered.
    #[error("unknown command id '{0}'")]
    UnknownCommand(CommandId),

    /// The frame carries no command context to revive.
    #[error("message frame has no command context")]
    MissingContext,
}
