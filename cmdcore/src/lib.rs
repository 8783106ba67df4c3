//! `CmdCore` - compensating command execution core
//!
//! This library turns every business operation into an execution context
//! carrying redo/undo parameters, runs it through a
//! compensating-transaction state machine, optionally composes several
//! operations into a macro command with partial-failure rollback, and
//! dispatches the actual execution through an asynchronous,
//! correlation-keyed message exchange.
//!
//! The moving parts, leaves first:
//!
//! - [`ExecutionContext`]: the mutable record of one command execution.
//! - [`Command`]: the unit-of-work contract with provided state-machine
//!   methods (`create_context`, `do_command`, `undo_command`).
//! - [`CompositeCommand`]: ordered composition under one umbrella
//!   context, with reverse-order compensation on partial failure.
//! - [`ActionExecutor`]: bridges contexts to the message exchange.
//! - [`CommandDispatchService`]: two queue-and-worker pipelines joined
//!   by correlation ids.
//! - [`MessageRendezvous`]: the per-message rendezvous a caller blocks
//!   on until its result is ready.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod composite;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod message;
pub mod rendezvous;
pub mod repository;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod wire;

pub use command::Command;
pub use composite::{CompositeCommand, MacroParameter, StateChangedListener};
pub use context::{CommandParameter, ContextState, ExecutionContext, ParameterKind, Payload};
pub use dispatch::{CommandDispatchService, DispatchConfig, ServiceLifecycle};
pub use errors::{
    CommandError, CommandResult, DispatchError, DispatchResult, FrameError, LifecycleError,
    RepositoryError, RepositoryResult,
};
pub use executor::ActionExecutor;
pub use message::{ActionContext, CommandAction, CommandMessage, Direction};
pub use rendezvous::MessageRendezvous;
pub use repository::{Entity, Repository};
pub use types::{ActionName, CommandId, CorrelationId, FacadeName, Timestamp};
pub use wire::{CommandRegistry, ContextSnapshot, MessageFrame, ParameterSnapshot};
