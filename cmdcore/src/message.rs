//! Correlation-tagged messages carrying contexts through the exchange.
//!
//! A [`CommandMessage`] is what crosses the request and response
//! pipelines: a correlation id (the only join key), caller trace
//! metadata, and the context being executed. The execution direction is
//! a tagged union, [`CommandAction`]: a message without a resolvable
//! direction cannot be constructed, so the processing side matches
//! exhaustively with no error arm.

use serde::{Deserialize, Serialize};

use crate::context::{ExecutionContext, Payload};
use crate::types::{ActionName, CorrelationId, FacadeName, Timestamp};

/// Caller-visible trace metadata attached to every message.
///
/// Propagated, never interpreted: the exchange copies it onto the
/// response so a caller can attribute results to the facade and action
/// that initiated them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    facade: FacadeName,
    action: ActionName,
    started_at: Timestamp,
}

impl ActionContext {
    /// Creates trace metadata stamped with the current moment.
    pub fn new(facade: FacadeName, action: ActionName) -> Self {
        Self {
            facade,
            action,
            started_at: Timestamp::now(),
        }
    }

    /// The facade the request entered through.
    pub const fn facade(&self) -> &FacadeName {
        &self.facade
    }

    /// The business action being performed.
    pub const fn action(&self) -> &ActionName {
        &self.action
    }

    /// When the action entered the system.
    pub const fn started_at(&self) -> Timestamp {
        self.started_at
    }
}

/// The execution direction of a message, as it appears on the wire.
///
/// Inside the process the direction is carried structurally by
/// [`CommandAction`]; this enum exists as the wire discriminant and for
/// logging. There is deliberately no unknown variant; an unrecognized
/// direction fails at frame decoding, before a message can exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Forward execution.
    #[serde(rename = "DO")]
    Do,
    /// Compensation.
    #[serde(rename = "UNDO")]
    Undo,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Do => f.write_str("DO"),
            Self::Undo => f.write_str("UNDO"),
        }
    }
}

/// A context paired with its execution direction.
///
/// The processing side consumes this by exhaustive match; the
/// unknown-direction failure mode of a runtime direction field does not
/// exist at this level.
#[derive(Debug, Clone)]
pub enum CommandAction<P: Payload> {
    /// Execute the context's forward path.
    Do(ExecutionContext<P>),
    /// Execute the context's compensation path.
    Undo(ExecutionContext<P>),
}

impl<P: Payload> CommandAction<P> {
    /// The wire discriminant for this action.
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Do(_) => Direction::Do,
            Self::Undo(_) => Direction::Undo,
        }
    }

    /// Borrows the carried context.
    pub const fn context(&self) -> &ExecutionContext<P> {
        match self {
            Self::Do(context) | Self::Undo(context) => context,
        }
    }

    /// Consumes the action, yielding the carried context.
    pub fn into_context(self) -> ExecutionContext<P> {
        match self {
            Self::Do(context) | Self::Undo(context) => context,
        }
    }
}

/// One in-flight unit of the message exchange.
///
/// Exactly one message may be in flight per correlation id at a time;
/// the dispatch service enforces this with an atomic put-if-absent on
/// its correlation map.
#[derive(Debug, Clone)]
pub struct CommandMessage<P: Payload> {
    correlation_id: CorrelationId,
    action_context: ActionContext,
    action: CommandAction<P>,
}

impl<P: Payload> CommandMessage<P> {
    /// Wraps a context in a forward-execution message.
    pub const fn do_action(
        correlation_id: CorrelationId,
        action_context: ActionContext,
        context: ExecutionContext<P>,
    ) -> Self {
        Self {
            correlation_id,
            action_context,
            action: CommandAction::Do(context),
        }
    }

    /// Wraps a context in a compensation message.
    pub const fn undo_action(
        correlation_id: CorrelationId,
        action_context: ActionContext,
        context: ExecutionContext<P>,
    ) -> Self {
        Self {
            correlation_id,
            action_context,
            action: CommandAction::Undo(context),
        }
    }

    /// Reassembles a message from its parts.
    pub const fn from_parts(
        correlation_id: CorrelationId,
        action_context: ActionContext,
        action: CommandAction<P>,
    ) -> Self {
        Self {
            correlation_id,
            action_context,
            action,
        }
    }

    /// The join key between send and receive.
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// The caller's trace metadata.
    pub const fn action_context(&self) -> &ActionContext {
        &self.action_context
    }

    /// The carried action.
    pub const fn action(&self) -> &CommandAction<P> {
        &self.action
    }

    /// The wire discriminant of the carried action.
    pub const fn direction(&self) -> Direction {
        self.action.direction()
    }

    /// Borrows the carried context.
    pub const fn context(&self) -> &ExecutionContext<P> {
        self.action.context()
    }

    /// Decomposes the message for processing.
    pub fn into_parts(self) -> (CorrelationId, ActionContext, CommandAction<P>) {
        (self.correlation_id, self.action_context, self.action)
    }

    /// Consumes the message, yielding the carried context.
    pub fn into_context(self) -> ExecutionContext<P> {
        self.action.into_context()
    }
}
