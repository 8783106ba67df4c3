//! Composite commands: ordered composition under one umbrella context.
//!
//! A [`CompositeCommand`] executes an ordered collection of nested
//! commands as one unit with compensating-transaction semantics: either
//! every nested command commits, or every nested command that did commit
//! is rolled back in reverse order before the failure is surfaced. The
//! nested contexts live in a [`MacroParameter`] arena indexed by
//! execution order, with an explicit committed-up-to marker driving the
//! reverse-order compensation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::command::Command;
use crate::context::{CommandParameter, ContextState, ExecutionContext, Payload};
use crate::errors::{CommandError, CommandResult};
use crate::executor::ActionExecutor;
use crate::message::ActionContext;
use crate::types::{ActionName, CommandId, FacadeName};

/// A composite's root input plus its nested execution arena.
///
/// `nested` holds one prepared context per nested command, in
/// declaration (= execution) order. `committed` is the number of leading
/// contexts whose forward execution succeeded; compensation walks
/// `nested[..committed]` in reverse.
#[derive(Debug, Clone)]
pub struct MacroParameter<P: Payload> {
    input: P,
    nested: Vec<ExecutionContext<P>>,
    committed: usize,
}

impl<P: Payload> MacroParameter<P> {
    /// Creates an arena with nothing committed yet.
    pub const fn new(input: P, nested: Vec<ExecutionContext<P>>) -> Self {
        Self {
            input,
            nested,
            committed: 0,
        }
    }

    /// Restores an arena from its serialized parts.
    pub(crate) fn restore(input: P, nested: Vec<ExecutionContext<P>>, committed: usize) -> Self {
        let committed = committed.min(nested.len());
        Self {
            input,
            nested,
            committed,
        }
    }

    /// The composite's root input.
    pub const fn input(&self) -> &P {
        &self.input
    }

    /// The nested contexts in execution order.
    pub fn nested(&self) -> &[ExecutionContext<P>] {
        &self.nested
    }

    /// How many leading nested contexts committed successfully.
    pub const fn committed(&self) -> usize {
        self.committed
    }
}

/// Observer of nested context transitions inside a composite.
///
/// Used for observability and testing, not for correctness: the
/// composite behaves identically with or without a listener.
pub trait StateChangedListener: Send + Sync {
    /// Called after a nested context moved between states.
    fn state_changed(&self, command: &CommandId, previous: ContextState, current: ContextState);
}

/// A command whose execution is the ordered composition of other
/// commands' executions.
///
/// Nested commands are registered in execution order. The composite's
/// own context carries a [`MacroParameter`]; its nested contexts are
/// built fail-fast at context-creation time and dispatched one by one
/// through the [`ActionExecutor`] during forward execution.
pub struct CompositeCommand<P: Payload> {
    id: CommandId,
    nested: Vec<Arc<dyn Command<P>>>,
    executor: Arc<ActionExecutor<P>>,
    listener: Option<Arc<dyn StateChangedListener>>,
}

impl<P: Payload> CompositeCommand<P> {
    /// Creates an empty composite.
    pub const fn new(id: CommandId, executor: Arc<ActionExecutor<P>>) -> Self {
        Self {
            id,
            nested: Vec::new(),
            executor,
            listener: None,
        }
    }

    /// Appends a nested command; registration order is execution order.
    #[must_use]
    pub fn register(mut self, command: Arc<dyn Command<P>>) -> Self {
        self.nested.push(command);
        self
    }

    /// Attaches a transition listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn StateChangedListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn notify(&self, command: &CommandId, previous: ContextState, current: ContextState) {
        if let Some(listener) = &self.listener {
            listener.state_changed(command, previous, current);
        }
    }

    /// Trace metadata for a nested dispatch, labeled with the composite.
    fn nested_action_context(&self, nested_id: &CommandId) -> ActionContext {
        let facade = FacadeName::try_new(self.id.to_string())
            .expect("a command id is a valid facade name");
        let action = ActionName::try_new(nested_id.to_string())
            .expect("a command id is a valid action name");
        ActionContext::new(facade, action)
    }

    /// Rolls back `arena.nested[..arena.committed]` in reverse order.
    ///
    /// Best-effort: a nested compensation failure is recorded on that
    /// nested context and logged, and the walk continues. Returns the
    /// first compensation failure, if any.
    async fn rollback_committed(&self, arena: &mut MacroParameter<P>) -> Option<CommandError> {
        let mut first_failure = None;
        for index in (0..arena.committed).rev() {
            let nested_context = arena.nested[index].clone();
            let nested_id = nested_context.command_id();
            let previous = nested_context.state();
            match self
                .executor
                .rollback_action(self.nested_action_context(&nested_id), nested_context)
                .await
            {
                Ok(rolled_back) => {
                    self.notify(&nested_id, previous, rolled_back.state());
                    if rolled_back.state() == ContextState::Undone {
                        arena.committed = index;
                    } else {
                        warn!(
                            composite = %self.id,
                            nested = %nested_id,
                            error = ?rolled_back.error(),
                            "nested compensation failed"
                        );
                        if first_failure.is_none() {
                            first_failure = rolled_back.error().cloned();
                        }
                    }
                    arena.nested[index] = rolled_back;
                }
                Err(dispatch_error) => {
                    warn!(
                        composite = %self.id,
                        nested = %nested_id,
                        %dispatch_error,
                        "nested compensation could not be dispatched"
                    );
                    if first_failure.is_none() {
                        first_failure =
                            Some(CommandError::Internal(dispatch_error.to_string()));
                    }
                }
            }
        }
        first_failure
    }
}

#[async_trait]
impl<P: Payload> Command<P> for CompositeCommand<P> {
    fn command_id(&self) -> CommandId {
        self.id.clone()
    }

    /// Builds one prepared sub-context per nested command, fail-fast.
    ///
    /// The first nested context that fails to build aborts the whole
    /// composite with that nested error; remaining nested commands are
    /// not built. First failure wins.
    fn accept_parameter(
        &self,
        parameter: Option<CommandParameter<P>>,
    ) -> CommandResult<CommandParameter<P>> {
        let parameter = parameter.ok_or(CommandError::MissingParameter)?;
        let input = parameter.as_value()?.clone();

        let mut nested_contexts = Vec::with_capacity(self.nested.len());
        for nested_command in &self.nested {
            let nested_context = ExecutionContext::prepare(
                Arc::clone(nested_command),
                Some(CommandParameter::Value(input.clone())),
            );
            if nested_context.is_failed() {
                let error = nested_context.error().cloned().unwrap_or_else(|| {
                    CommandError::Internal("nested context failed to build".to_string())
                });
                warn!(
                    composite = %self.id,
                    nested = %nested_command.command_id(),
                    %error,
                    "nested context build failed; composite aborted"
                );
                return Err(error);
            }
            nested_contexts.push(nested_context);
        }

        Ok(CommandParameter::Macro(MacroParameter::new(
            input,
            nested_contexts,
        )))
    }

    /// Commits every nested context in order; rolls back on first
    /// failure.
    async fn execute_do(&self, context: &mut ExecutionContext<P>) -> CommandResult<P> {
        let parameter = context
            .redo_parameter()
            .ok_or(CommandError::MissingParameter)?;
        let mut arena = parameter.as_macro()?.clone();

        for index in 0..arena.nested.len() {
            let nested_context = arena.nested[index].clone();
            let nested_id = nested_context.command_id();
            let previous = nested_context.state();
            let committed = self
                .executor
                .commit_action(self.nested_action_context(&nested_id), nested_context)
                .await
                .map_err(|dispatch_error| CommandError::Internal(dispatch_error.to_string()))?;
            self.notify(&nested_id, previous, committed.state());

            if committed.is_done() {
                arena.nested[index] = committed;
                arena.committed = index + 1;
                continue;
            }

            let failure = committed.error().cloned().unwrap_or_else(|| {
                CommandError::Internal("nested command did not complete".to_string())
            });
            arena.nested[index] = committed;
            warn!(
                composite = %self.id,
                nested = %nested_id,
                error = %failure,
                "nested command failed; rolling back committed prefix"
            );
            // First failure wins; compensation errors are logged only.
            self.rollback_committed(&mut arena).await;
            context.set_undo_parameter(CommandParameter::Macro(arena));
            return Err(failure);
        }

        debug!(composite = %self.id, nested = arena.nested.len(), "composite committed");
        let result = arena
            .nested
            .last()
            .and_then(|nested| nested.result().cloned())
            .unwrap_or_else(|| arena.input.clone());
        context.set_undo_parameter(CommandParameter::Macro(arena));
        Ok(result)
    }

    /// Compensates the committed prefix in reverse order.
    async fn execute_undo(&self, context: &mut ExecutionContext<P>) -> CommandResult<()> {
        let parameter = context
            .undo_parameter()
            .ok_or(CommandError::MissingParameter)?;
        let mut arena = parameter.as_macro()?.clone();

        let outcome = self.rollback_committed(&mut arena).await;
        context.set_undo_parameter(CommandParameter::Macro(arena));
        match outcome {
            None => Ok(()),
            Some(failure) => Err(failure),
        }
    }
}
