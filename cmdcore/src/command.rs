//! The command contract.
//!
//! A [`Command`] is a unit of business work with a forward path
//! (`execute_do`) and a compensation path (`execute_undo`). Implementors
//! write only those two methods (plus, rarely, a custom
//! [`Command::accept_parameter`]); the provided `create_context`,
//! `do_command`, and `undo_command` methods drive the context state
//! machine and enforce the error-propagation policy: business failures
//! are captured into the context, never returned to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! struct DeleteCourse {
//!     courses: Arc<dyn Repository<Course>>,
//! }
//!
//! #[async_trait]
//! impl Command<Course> for DeleteCourse {
//!     fn command_id(&self) -> CommandId {
//!         CommandId::try_new("course.delete").unwrap()
//!     }
//!
//!     async fn execute_do(&self, ctx: &mut ExecutionContext<Course>) -> CommandResult<Course> {
//!         let course = ctx.redo_value()?.clone();
//!         let previous = self.courses.find_by_id(course.id()).await?;
//!         // keep the snapshot so the delete can be compensated
//!         ctx.set_undo_parameter(CommandParameter::Value(previous.clone()));
//!         self.courses.delete_by_id(course.id()).await?;
//!         Ok(previous)
//!     }
//!
//!     async fn execute_undo(&self, ctx: &mut ExecutionContext<Course>) -> CommandResult<()> {
//!         let snapshot = ctx.undo_value()?.clone();
//!         self.courses.save(snapshot).await?;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::{CommandParameter, ContextState, ExecutionContext, Payload};
use crate::errors::{CommandError, CommandResult};
use crate::types::CommandId;

/// A unit of business work with forward execution and compensation.
///
/// The trait is object-safe: the dispatch pipeline and composite
/// orchestration hold commands as `Arc<dyn Command<P>>`. The provided
/// methods are the state machine; overriding them forfeits the
/// at-most-one-`Work`-entry guarantee and should never be necessary.
#[async_trait]
pub trait Command<P: Payload>: Send + Sync {
    /// The stable identifier of this command implementation.
    fn command_id(&self) -> CommandId;

    /// Validates the incoming parameter and shapes it into the context's
    /// redo parameter.
    ///
    /// The default accepts exactly a present [`CommandParameter::Value`];
    /// composites override this to build their macro parameter. Errors
    /// returned here are captured into the context as a validation
    /// failure; they are never raised to the caller.
    fn accept_parameter(
        &self,
        parameter: Option<CommandParameter<P>>,
    ) -> CommandResult<CommandParameter<P>> {
        let parameter = parameter.ok_or(CommandError::MissingParameter)?;
        parameter.as_value()?;
        Ok(parameter)
    }

    /// The forward business logic.
    ///
    /// Runs only while the context is in `Work`. Side effects belong
    /// here and nowhere else. A command with a meaningful rollback must
    /// capture its undo parameter via
    /// [`ExecutionContext::set_undo_parameter`] before returning `Ok`.
    async fn execute_do(&self, context: &mut ExecutionContext<P>) -> CommandResult<P>;

    /// The compensation business logic.
    ///
    /// Runs only for a context that completed its forward path (`Done`),
    /// consuming the undo parameter captured there.
    async fn execute_undo(&self, context: &mut ExecutionContext<P>) -> CommandResult<()>;

    /// Builds a context for this command, validating the parameter.
    ///
    /// Never returns an error: a failed validation yields a `Fail`
    /// context carrying the cause.
    fn create_context(
        self: Arc<Self>,
        parameter: Option<CommandParameter<P>>,
    ) -> ExecutionContext<P>
    where
        Self: Sized + 'static,
    {
        ExecutionContext::prepare(self, parameter)
    }

    /// Runs the forward path under the state machine.
    ///
    /// A context that is not `Ready` is left untouched (logged, no-op),
    /// so a repeated or misrouted invocation cannot re-enter the
    /// business logic. Otherwise the context transitions
    /// `Ready -> Work -> Done` on success or `Ready -> Work -> Fail` on
    /// a business error; the error is stored, never thrown.
    async fn do_command(&self, context: &mut ExecutionContext<P>) {
        if context.state() != ContextState::Ready {
            warn!(
                command = %self.command_id(),
                state = %context.state(),
                "do_command ignored: context is not Ready"
            );
            return;
        }
        context.begin_work();
        match self.execute_do(context).await {
            Ok(result) => {
                debug!(command = %self.command_id(), "command executed");
                context.succeed(result);
            }
            Err(error) => {
                warn!(command = %self.command_id(), %error, "command failed");
                context.fail(error);
            }
        }
    }

    /// Runs the compensation path under the state machine.
    ///
    /// Gated on `Done`: any other state records a
    /// [`CommandError::IllegalState`] on the context without invoking
    /// `execute_undo`, guaranteeing the compensation logic can never
    /// observe a context that has nothing to compensate.
    async fn undo_command(&self, context: &mut ExecutionContext<P>) {
        if context.state() != ContextState::Done {
            let error = CommandError::IllegalState {
                command: self.command_id(),
                required: ContextState::Done,
                actual: context.state(),
            };
            warn!(command = %self.command_id(), %error, "undo_command refused");
            context.fail(error);
            return;
        }
        context.begin_work();
        match self.execute_undo(context).await {
            Ok(()) => {
                debug!(command = %self.command_id(), "command compensated");
                context.mark_undone();
            }
            Err(error) => {
                warn!(command = %self.command_id(), %error, "compensation failed");
                context.fail(error);
            }
        }
    }
}
