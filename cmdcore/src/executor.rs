//! The action executor: the bridge between contexts and the message
//! exchange.
//!
//! [`commit_action`](ActionExecutor::commit_action) and
//! [`rollback_action`](ActionExecutor::rollback_action) convert
//! `do_command`/`undo_command` invocations into correlation-tagged
//! `Do`/`Undo` messages, send them, and block for the paired response.
//! [`process_action_command`](ActionExecutor::process_action_command) is
//! the single place in the library where a command's state machine is
//! actually entered from the exchange; every worker task funnels through
//! it.

use std::sync::Arc;

use tracing::debug;

#[cfg_attr(not(test), allow(unused_imports))]
use crate::command::Command;
use crate::context::{ExecutionContext, Payload};
use crate::dispatch::CommandDispatchService;
use crate::errors::{DispatchError, DispatchResult};
use crate::message::{ActionContext, CommandAction, CommandMessage};
use crate::types::CorrelationId;

/// Bridges a context to the dispatch service.
///
/// Each call mints a fresh correlation id, so a caller never has to
/// manage the join key; callers that need to serialize re-execution do
/// so naturally because both methods only return once the response has
/// been consumed.
pub struct ActionExecutor<P: Payload> {
    service: Arc<CommandDispatchService<P>>,
}

impl<P: Payload> ActionExecutor<P> {
    /// Creates an executor bound to a dispatch service.
    pub const fn new(service: Arc<CommandDispatchService<P>>) -> Self {
        Self { service }
    }

    /// Executes the context's forward path through the exchange.
    ///
    /// Wraps `context` in a `Do` message, sends it, blocks for the
    /// matching response, and returns the processed context. Business
    /// failures live inside the returned context; only service errors
    /// return `Err`.
    pub async fn commit_action(
        &self,
        action_context: ActionContext,
        context: ExecutionContext<P>,
    ) -> DispatchResult<ExecutionContext<P>> {
        let correlation_id = CorrelationId::generate();
        let command_id = context.command_id();
        debug!(
            command = %command_id,
            correlation_id = %correlation_id,
            "committing action"
        );
        let message = CommandMessage::do_action(correlation_id.clone(), action_context, context);
        self.round_trip(message).await
    }

    /// Executes the context's compensation path through the exchange.
    pub async fn rollback_action(
        &self,
        action_context: ActionContext,
        context: ExecutionContext<P>,
    ) -> DispatchResult<ExecutionContext<P>> {
        let correlation_id = CorrelationId::generate();
        let command_id = context.command_id();
        debug!(
            command = %command_id,
            correlation_id = %correlation_id,
            "rolling back action"
        );
        let message = CommandMessage::undo_action(correlation_id.clone(), action_context, context);
        self.round_trip(message).await
    }

    async fn round_trip(
        &self,
        message: CommandMessage<P>,
    ) -> DispatchResult<ExecutionContext<P>> {
        let correlation_id = message.correlation_id().clone();
        let command_id = message.context().command_id();
        self.service.send(message)?;
        let response = self.service.receive(&command_id, &correlation_id).await?;
        response
            .map(CommandMessage::into_context)
            .ok_or(DispatchError::ResponseLost { correlation_id })
    }

    /// Runs the message's context through its command's state machine.
    ///
    /// The only place `do_command`/`undo_command` are invoked on behalf
    /// of the exchange. The match is exhaustive over the two actions a
    /// message can carry; a message with no resolvable direction cannot
    /// exist in the first place.
    pub async fn process_action_command(message: CommandMessage<P>) -> CommandMessage<P> {
        let (correlation_id, action_context, action) = message.into_parts();
        match action {
            CommandAction::Do(mut context) => {
                let command = context.command();
                command.do_command(&mut context).await;
                CommandMessage::do_action(correlation_id, action_context, context)
            }
            CommandAction::Undo(mut context) => {
                let command = context.command();
                command.undo_command(&mut context).await;
                CommandMessage::undo_action(correlation_id, action_context, context)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CommandParameter, ContextState};
    use crate::dispatch::DispatchConfig;
    use crate::testing::{FailingCommand, RecordingCommand};
    use crate::types::{ActionName, FacadeName};

    fn action_context() -> ActionContext {
        ActionContext::new(
            FacadeName::try_new("students").unwrap(),
            ActionName::try_new("enroll").unwrap(),
        )
    }

    fn running_executor() -> ActionExecutor<String> {
        let service = Arc::new(CommandDispatchService::new(DispatchConfig::default()));
        service.initialize().unwrap();
        ActionExecutor::new(service)
    }

    #[tokio::test]
    async fn commit_action_returns_done_context() {
        let executor = running_executor();
        let command = RecordingCommand::arc("cmd-a");
        let context = Arc::clone(&command)
            .create_context(Some(CommandParameter::Value("input".to_string())));

        let committed = executor
            .commit_action(action_context(), context)
            .await
            .unwrap();

        assert_eq!(committed.state(), ContextState::Done);
        assert_eq!(committed.result(), Some(&"input:done".to_string()));
        assert_eq!(command.do_calls(), 1);
    }

    #[tokio::test]
    async fn commit_action_surfaces_business_failure_in_context() {
        let executor = running_executor();
        let command = FailingCommand::arc("cmd-f");
        let context = Arc::clone(&command)
            .create_context(Some(CommandParameter::Value("input".to_string())));

        let committed = executor
            .commit_action(action_context(), context)
            .await
            .unwrap();

        assert_eq!(committed.state(), ContextState::Fail);
        assert!(committed.error().is_some());
    }

    #[tokio::test]
    async fn rollback_action_compensates_a_done_context() {
        let executor = running_executor();
        let command = RecordingCommand::arc("cmd-a");
        let context = Arc::clone(&command)
            .create_context(Some(CommandParameter::Value("input".to_string())));

        let committed = executor
            .commit_action(action_context(), context)
            .await
            .unwrap();
        let rolled_back = executor
            .rollback_action(action_context(), committed)
            .await
            .unwrap();

        assert_eq!(rolled_back.state(), ContextState::Undone);
        assert_eq!(command.undo_calls(), 1);
    }

    #[tokio::test]
    async fn process_action_command_dispatches_on_direction() {
        let command = RecordingCommand::arc("cmd-a");
        let context = Arc::clone(&command)
            .create_context(Some(CommandParameter::Value("input".to_string())));
        let message = CommandMessage::do_action(
            CorrelationId::generate(),
            action_context(),
            context,
        );

        let processed = ActionExecutor::process_action_command(message).await;
        assert_eq!(processed.context().state(), ContextState::Done);

        let message = CommandMessage::undo_action(
            CorrelationId::generate(),
            action_context(),
            processed.into_context(),
        );
        let processed = ActionExecutor::process_action_command(message).await;
        assert_eq!(processed.context().state(), ContextState::Undone);
        assert_eq!(command.do_calls(), 1);
        assert_eq!(command.undo_calls(), 1);
    }
}
