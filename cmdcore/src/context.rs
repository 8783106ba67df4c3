//! Execution context: the mutable record of one command invocation.
//!
//! A context is created by [`Command::create_context`](crate::command::Command::create_context)
//! (or [`ExecutionContext::prepare`] when only a trait object is at hand),
//! mutated exclusively by the command that owns it, and discarded once the
//! caller has consumed its result or error. The context carries the full
//! compensating-transaction state machine:
//!
//! ```text
//! Init ──▶ Ready ──▶ Work ──▶ Done ──▶ Work ──▶ Undone
//!   │                 │                  │
//!   └────▶ Fail ◀─────┘                  └─────▶ Fail
//! ```
//!
//! Illegal transition requests never invoke business logic and never
//! panic; they record a descriptive [`CommandError`] instead, isolating
//! callers from partial side effects when the protocol is violated.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::Command;
use crate::composite::MacroParameter;
use crate::errors::{CommandError, CommandResult};
use crate::types::CommandId;

/// Marker trait for application payload types carried through contexts.
///
/// A payload is the opaque value a command consumes and produces: a
/// domain object, an entity id, a snapshot. The bounds exist so payloads
/// can move across worker tasks and cross the wire as JSON.
pub trait Payload:
    Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

impl<T> Payload for T where
    T: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// The lifecycle state of one command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextState {
    /// Freshly created, parameter not yet validated.
    Init,
    /// Parameter validated, ready for forward execution.
    Ready,
    /// Business logic is executing (forward or compensation).
    Work,
    /// Forward execution succeeded; result is present.
    Done,
    /// Execution or validation failed; error is present.
    Fail,
    /// Compensation succeeded.
    Undone,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "Init",
            Self::Ready => "Ready",
            Self::Work => "Work",
            Self::Done => "Done",
            Self::Fail => "Fail",
            Self::Undone => "Undone",
        };
        f.write_str(name)
    }
}

/// The shape of a command parameter, used in mismatch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// A plain payload value.
    Value,
    /// A composite's macro parameter.
    Macro,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => f.write_str("value"),
            Self::Macro => f.write_str("macro"),
        }
    }
}

/// A parameter handed to a command for forward execution or compensation.
///
/// The two variants are the only parameter shapes the framework knows:
/// plain payload values for leaf commands and macro parameters for
/// composites. Commands state which variant they accept in
/// [`Command::accept_parameter`](crate::command::Command::accept_parameter);
/// a wrong shape is a validation failure, never a downcast.
#[derive(Debug, Clone)]
pub enum CommandParameter<P: Payload> {
    /// An opaque application value.
    Value(P),
    /// A composite's root input plus its nested context arena.
    Macro(MacroParameter<P>),
}

impl<P: Payload> CommandParameter<P> {
    /// The shape of this parameter.
    pub const fn kind(&self) -> ParameterKind {
        match self {
            Self::Value(_) => ParameterKind::Value,
            Self::Macro(_) => ParameterKind::Macro,
        }
    }

    /// Borrows the payload value, or fails with a parameter mismatch.
    pub fn as_value(&self) -> CommandResult<&P> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Macro(_) => Err(CommandError::ParameterMismatch {
                expected: ParameterKind::Value,
                actual: ParameterKind::Macro,
            }),
        }
    }

    /// Borrows the macro parameter, or fails with a parameter mismatch.
    pub fn as_macro(&self) -> CommandResult<&MacroParameter<P>> {
        match self {
            Self::Macro(macro_parameter) => Ok(macro_parameter),
            Self::Value(_) => Err(CommandError::ParameterMismatch {
                expected: ParameterKind::Macro,
                actual: ParameterKind::Value,
            }),
        }
    }

    /// Mutably borrows the macro parameter, or fails with a mismatch.
    pub fn as_macro_mut(&mut self) -> CommandResult<&mut MacroParameter<P>> {
        match self {
            Self::Macro(macro_parameter) => Ok(macro_parameter),
            Self::Value(_) => Err(CommandError::ParameterMismatch {
                expected: ParameterKind::Macro,
                actual: ParameterKind::Value,
            }),
        }
    }
}

/// The mutable record of one command execution's lifecycle.
///
/// Holds the state machine position, the redo/undo parameters, and the
/// outcome (`result` xor `error`). The `command` field is a
/// back-reference for lookup only: the context never drives the command,
/// the command drives the context.
pub struct ExecutionContext<P: Payload> {
    command: Arc<dyn Command<P>>,
    state: ContextState,
    redo_parameter: Option<CommandParameter<P>>,
    undo_parameter: Option<CommandParameter<P>>,
    result: Option<P>,
    error: Option<CommandError>,
}

impl<P: Payload> ExecutionContext<P> {
    /// Builds a context for `command`, validating `parameter`.
    ///
    /// Validation runs through the command's `accept_parameter` hook. A
    /// missing or mismatched parameter yields a `Fail` context carrying
    /// the validation error; the command's business logic never runs
    /// for such a context. This method never returns an error itself.
    pub fn prepare(
        command: Arc<dyn Command<P>>,
        parameter: Option<CommandParameter<P>>,
    ) -> Self {
        let mut context = Self {
            command: Arc::clone(&command),
            state: ContextState::Init,
            redo_parameter: None,
            undo_parameter: None,
            result: None,
            error: None,
        };
        match command.accept_parameter(parameter) {
            Ok(accepted) => {
                context.redo_parameter = Some(accepted);
                context.state = ContextState::Ready;
            }
            Err(error) => context.fail(error),
        }
        context
    }

    /// Rebuilds a context from its serialized parts.
    ///
    /// Used by frame revival; no validation runs, the snapshot is
    /// trusted to describe a context this library produced.
    pub(crate) fn restore(
        command: Arc<dyn Command<P>>,
        state: ContextState,
        redo_parameter: Option<CommandParameter<P>>,
        undo_parameter: Option<CommandParameter<P>>,
        result: Option<P>,
        error: Option<CommandError>,
    ) -> Self {
        Self {
            command,
            state,
            redo_parameter,
            undo_parameter,
            result,
            error,
        }
    }

    /// The command this context belongs to.
    pub fn command(&self) -> Arc<dyn Command<P>> {
        Arc::clone(&self.command)
    }

    /// The id of the owning command.
    pub fn command_id(&self) -> CommandId {
        self.command.command_id()
    }

    /// Current state machine position.
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// The forward-execution input, set at creation and immutable after.
    pub const fn redo_parameter(&self) -> Option<&CommandParameter<P>> {
        self.redo_parameter.as_ref()
    }

    /// The compensation input captured during forward execution.
    pub const fn undo_parameter(&self) -> Option<&CommandParameter<P>> {
        self.undo_parameter.as_ref()
    }

    /// Borrows the redo parameter as a plain payload value.
    ///
    /// The accessor leaf commands reach for first in `execute_do`; a
    /// missing or macro-shaped parameter is a validation failure.
    pub fn redo_value(&self) -> CommandResult<&P> {
        self.redo_parameter
            .as_ref()
            .ok_or(CommandError::MissingParameter)?
            .as_value()
    }

    /// Borrows the undo parameter as a plain payload value.
    pub fn undo_value(&self) -> CommandResult<&P> {
        self.undo_parameter
            .as_ref()
            .ok_or(CommandError::MissingParameter)?
            .as_value()
    }

    /// The output value; present only after `Done`.
    pub const fn result(&self) -> Option<&P> {
        self.result.as_ref()
    }

    /// The failure; present only in `Fail`.
    pub const fn error(&self) -> Option<&CommandError> {
        self.error.as_ref()
    }

    /// Whether the context finished an execution attempt successfully.
    pub const fn is_done(&self) -> bool {
        matches!(self.state, ContextState::Done)
    }

    /// Whether the context recorded a failure.
    pub const fn is_failed(&self) -> bool {
        matches!(self.state, ContextState::Fail)
    }

    /// Captures the value compensation will need.
    ///
    /// Only effective while the owning command is executing (`Work`).
    /// Calls in any other state are ignored with a warning so that a
    /// misbehaving command cannot corrupt an already-settled context.
    pub fn set_undo_parameter(&mut self, parameter: CommandParameter<P>) {
        if self.state == ContextState::Work {
            self.undo_parameter = Some(parameter);
        } else {
            warn!(
                command = %self.command_id(),
                state = %self.state,
                "undo parameter ignored outside of Work state"
            );
        }
    }

    /// Enters `Work` from `Ready` (forward) or `Done` (compensation).
    pub(crate) fn begin_work(&mut self) {
        self.state = ContextState::Work;
    }

    /// Settles the forward execution: `Work -> Done` with a result.
    pub(crate) fn succeed(&mut self, result: P) {
        self.result = Some(result);
        self.error = None;
        self.state = ContextState::Done;
    }

    /// Settles the compensation: `Work -> Undone`.
    pub(crate) fn mark_undone(&mut self) {
        self.state = ContextState::Undone;
    }

    /// Records a failure and moves to `Fail`.
    pub(crate) fn fail(&mut self, error: CommandError) {
        self.result = None;
        self.error = Some(error);
        self.state = ContextState::Fail;
    }
}

impl<P: Payload> Clone for ExecutionContext<P> {
    fn clone(&self) -> Self {
        Self {
            command: Arc::clone(&self.command),
            state: self.state,
            redo_parameter: self.redo_parameter.clone(),
            undo_parameter: self.undo_parameter.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

impl<P: Payload> fmt::Debug for ExecutionContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("command", &self.command_id())
            .field("state", &self.state)
            .field("redo_parameter", &self.redo_parameter)
            .field("undo_parameter", &self.undo_parameter)
            .field("result", &self.result)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingCommand, RecordingCommand};

    #[test]
    fn prepare_with_valid_parameter_yields_ready() {
        let command: Arc<dyn Command<String>> = RecordingCommand::arc("cmd-a");
        let context =
            ExecutionContext::prepare(command, Some(CommandParameter::Value("input".to_string())));
        assert_eq!(context.state(), ContextState::Ready);
        assert!(context.error().is_none());
        assert!(context.redo_parameter().is_some());
    }

    #[test]
    fn prepare_without_parameter_yields_fail() {
        let command: Arc<dyn Command<String>> = RecordingCommand::arc("cmd-a");
        let context = ExecutionContext::prepare(command, None);
        assert_eq!(context.state(), ContextState::Fail);
        assert_eq!(context.error(), Some(&CommandError::MissingParameter));
    }

    #[test]
    fn prepare_never_runs_business_logic() {
        let command = FailingCommand::arc("cmd-f");
        let erased: Arc<dyn Command<String>> = command.clone();
        let context = ExecutionContext::prepare(erased, None);
        assert_eq!(context.state(), ContextState::Fail);
        assert_eq!(command.do_calls(), 0);
    }

    #[test]
    fn undo_parameter_is_ignored_outside_work() {
        let command: Arc<dyn Command<String>> = RecordingCommand::arc("cmd-a");
        let mut context =
            ExecutionContext::prepare(command, Some(CommandParameter::Value("x".to_string())));
        context.set_undo_parameter(CommandParameter::Value("snapshot".to_string()));
        assert!(context.undo_parameter().is_none());

        context.begin_work();
        context.set_undo_parameter(CommandParameter::Value("snapshot".to_string()));
        assert!(context.undo_parameter().is_some());
    }

    #[test]
    fn succeed_clears_any_previous_error() {
        let command: Arc<dyn Command<String>> = RecordingCommand::arc("cmd-a");
        let mut context =
            ExecutionContext::prepare(command, Some(CommandParameter::Value("x".to_string())));
        context.begin_work();
        context.fail(CommandError::Internal("boom".to_string()));
        assert!(context.is_failed());

        context.begin_work();
        context.succeed("ok".to_string());
        assert!(context.is_done());
        assert!(context.error().is_none());
        assert_eq!(context.result(), Some(&"ok".to_string()));
    }

    #[test]
    fn parameter_kind_and_accessors_agree() {
        let parameter: CommandParameter<String> = CommandParameter::Value("v".to_string());
        assert_eq!(parameter.kind(), ParameterKind::Value);
        assert!(parameter.as_value().is_ok());
        assert_eq!(
            parameter.as_macro().unwrap_err(),
            CommandError::ParameterMismatch {
                expected: ParameterKind::Macro,
                actual: ParameterKind::Value,
            }
        );
    }
}
