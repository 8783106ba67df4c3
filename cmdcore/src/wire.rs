//! JSON wire format for command messages.
//!
//! For cross-process or serialization scenarios a [`CommandMessage`] is
//! flattened into a [`MessageFrame`]: a JSON object with `correlation-id`,
//! `processing-context`, `command-context`, and `direction` fields. The
//! live command back-reference never crosses the wire; the frame carries
//! the owning command's id, and a [`CommandRegistry`] resolves it when
//! the frame is revived on the receiving side.
//!
//! Decoding is strict where execution safety demands it: a frame whose
//! `direction` is missing or unrecognized fails with an explicit error,
//! because such a message cannot be safely executed in either mode.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::composite::MacroParameter;
use crate::context::{CommandParameter, ContextState, ExecutionContext, Payload};
use crate::errors::{CommandError, FrameError};
use crate::message::{ActionContext, CommandMessage, Direction};
use crate::types::{CommandId, CorrelationId};

/// Resolves command ids to live command instances on frame revival.
///
/// Every command that may appear inside an incoming frame must be
/// registered; an unresolved id fails the revival with
/// [`FrameError::UnknownCommand`].
pub struct CommandRegistry<P: Payload> {
    commands: HashMap<CommandId, Arc<dyn Command<P>>>,
}

impl<P: Payload> CommandRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers a command under its own id, replacing any previous
    /// registration.
    #[must_use]
    pub fn register(mut self, command: Arc<dyn Command<P>>) -> Self {
        self.commands.insert(command.command_id(), command);
        self
    }

    /// Looks up a command by id.
    pub fn resolve(&self, id: &CommandId) -> Option<Arc<dyn Command<P>>> {
        self.commands.get(id).cloned()
    }
}

impl<P: Payload> Default for CommandRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// The serialized form of a command parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum ParameterSnapshot<P> {
    /// A plain payload value.
    Value(P),
    /// A macro parameter with its nested context arena.
    Macro {
        /// The composite's root input.
        input: P,
        /// Snapshots of the nested contexts, in execution order.
        nested: Vec<ContextSnapshot<P>>,
        /// How many leading nested contexts had committed.
        committed: usize,
    },
}

/// The serialized form of an execution context.
///
/// Carries the owning command's id in place of the live back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot<P> {
    /// The id of the owning command.
    #[serde(rename = "command-id")]
    pub command_id: CommandId,
    /// The state machine position.
    pub state: ContextState,
    /// The forward-execution input.
    #[serde(rename = "redo-parameter")]
    pub redo_parameter: Option<ParameterSnapshot<P>>,
    /// The compensation input.
    #[serde(rename = "undo-parameter")]
    pub undo_parameter: Option<ParameterSnapshot<P>>,
    /// The output value.
    pub result: Option<P>,
    /// The recorded failure.
    pub error: Option<CommandError>,
}

/// The JSON frame a message travels as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Payload"))]
pub struct MessageFrame<P> {
    /// The join key between send and receive.
    #[serde(rename = "correlation-id")]
    pub correlation_id: CorrelationId,
    /// Caller trace metadata; may be absent on foreign frames.
    #[serde(rename = "processing-context", default)]
    pub processing_context: Option<ActionContext>,
    /// The carried context; may be absent on foreign frames.
    #[serde(rename = "command-context", default)]
    pub command_context: Option<ContextSnapshot<P>>,
    /// The execution direction. Missing or unrecognized values fail
    /// decoding.
    pub direction: Direction,
}

fn snapshot_parameter<P: Payload>(parameter: &CommandParameter<P>) -> ParameterSnapshot<P> {
    match parameter {
        CommandParameter::Value(value) => ParameterSnapshot::Value(value.clone()),
        CommandParameter::Macro(arena) => ParameterSnapshot::Macro {
            input: arena.input().clone(),
            nested: arena.nested().iter().map(snapshot_context).collect(),
            committed: arena.committed(),
        },
    }
}

fn snapshot_context<P: Payload>(context: &ExecutionContext<P>) -> ContextSnapshot<P> {
    ContextSnapshot {
        command_id: context.command_id(),
        state: context.state(),
        redo_parameter: context.redo_parameter().map(snapshot_parameter),
        undo_parameter: context.undo_parameter().map(snapshot_parameter),
        result: context.result().cloned(),
        error: context.error().cloned(),
    }
}

fn revive_parameter<P: Payload>(
    snapshot: ParameterSnapshot<P>,
    registry: &CommandRegistry<P>,
) -> Result<CommandParameter<P>, FrameError> {
    match snapshot {
        ParameterSnapshot::Value(value) => Ok(CommandParameter::Value(value)),
        ParameterSnapshot::Macro {
            input,
            nested,
            committed,
        } => {
            let nested = nested
                .into_iter()
                .map(|snapshot| revive_context(snapshot, registry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(CommandParameter::Macro(MacroParameter::restore(
                input, nested, committed,
            )))
        }
    }
}

fn revive_context<P: Payload>(
    snapshot: ContextSnapshot<P>,
    registry: &CommandRegistry<P>,
) -> Result<ExecutionContext<P>, FrameError> {
    let command = registry
        .resolve(&snapshot.command_id)
        .ok_or_else(|| FrameError::UnknownCommand(snapshot.command_id.clone()))?;
    let redo_parameter = snapshot
        .redo_parameter
        .map(|parameter| revive_parameter(parameter, registry))
        .transpose()?;
    let undo_parameter = snapshot
        .undo_parameter
        .map(|parameter| revive_parameter(parameter, registry))
        .transpose()?;
    Ok(ExecutionContext::restore(
        command,
        snapshot.state,
        redo_parameter,
        undo_parameter,
        snapshot.result,
        snapshot.error,
    ))
}

impl<P: Payload> MessageFrame<P> {
    /// Flattens a live message into its wire form.
    pub fn from_message(message: &CommandMessage<P>) -> Self {
        Self {
            correlation_id: message.correlation_id().clone(),
            processing_context: Some(message.action_context().clone()),
            command_context: Some(snapshot_context(message.context())),
            direction: message.direction(),
        }
    }

    /// Revives the frame into a live message.
    ///
    /// The carried command ids are resolved through `registry`; a frame
    /// without a command context cannot be executed and fails with
    /// [`FrameError::MissingContext`].
    pub fn into_message(
        self,
        registry: &CommandRegistry<P>,
    ) -> Result<CommandMessage<P>, FrameError> {
        let snapshot = self.command_context.ok_or(FrameError::MissingContext)?;
        let context = revive_context(snapshot, registry)?;
        let action_context = self.processing_context.unwrap_or_else(|| {
            ActionContext::new(
                crate::types::FacadeName::try_new("unknown")
                    .expect("literal facade name is valid"),
                crate::types::ActionName::try_new("unknown")
                    .expect("literal action name is valid"),
            )
        });
        let message = match self.direction {
            Direction::Do => {
                CommandMessage::do_action(self.correlation_id, action_context, context)
            }
            Direction::Undo => {
                CommandMessage::undo_action(self.correlation_id, action_context, context)
            }
        };
        Ok(message)
    }

    /// Encodes the frame as a JSON string.
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a frame from a JSON string.
    ///
    /// Fails with an explicit error when `direction` is missing or
    /// unrecognized.
    pub fn decode(json: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(json)?)
    }
}
