//! Test fixtures for the `CmdCore` command execution library.
//!
//! Pre-built command implementations that record their invocations, so
//! tests can assert not only on context outcomes but on whether and in
//! what order business logic actually ran. Available to downstream
//! crates behind the `testing` feature.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::command::Command;
use crate::context::{CommandParameter, ExecutionContext};
use crate::errors::{CommandError, CommandResult};
use crate::types::CommandId;

/// A shared journal of business-logic invocations, in call order.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Creates an empty shared journal.
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A command that succeeds and records every business-logic invocation.
///
/// Forward execution captures the redo value as its undo parameter and
/// produces `"<input>:done"`; compensation requires the undo parameter
/// to be present. Entries of the form `"<id>:do"` / `"<id>:undo"` are
/// appended to the journal, which several commands may share to observe
/// relative ordering.
pub struct RecordingCommand {
    id: CommandId,
    journal: Journal,
    do_calls: AtomicUsize,
    undo_calls: AtomicUsize,
}

impl RecordingCommand {
    /// Creates a recording command with a private journal.
    pub fn arc(id: &str) -> Arc<Self> {
        Self::with_journal(id, journal())
    }

    /// Creates a recording command appending to a shared journal.
    pub fn with_journal(id: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            id: CommandId::try_new(id).expect("test command id is valid"),
            journal,
            do_calls: AtomicUsize::new(0),
            undo_calls: AtomicUsize::new(0),
        })
    }

    /// How many times `execute_do` ran.
    pub fn do_calls(&self) -> usize {
        self.do_calls.load(Ordering::SeqCst)
    }

    /// How many times `execute_undo` ran.
    pub fn undo_calls(&self) -> usize {
        self.undo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Command<String> for RecordingCommand {
    fn command_id(&self) -> CommandId {
        self.id.clone()
    }

    async fn execute_do(&self, context: &mut ExecutionContext<String>) -> CommandResult<String> {
        self.do_calls.fetch_add(1, Ordering::SeqCst);
        let input = context.redo_value()?.clone();
        context.set_undo_parameter(CommandParameter::Value(input.clone()));
        self.journal.lock().push(format!("{}:do", self.id));
        Ok(format!("{input}:done"))
    }

    async fn execute_undo(&self, context: &mut ExecutionContext<String>) -> CommandResult<()> {
        self.undo_calls.fetch_add(1, Ordering::SeqCst);
        context.undo_value()?;
        self.journal.lock().push(format!("{}:undo", self.id));
        Ok(())
    }
}

/// A command whose business logic always fails.
///
/// Both paths return [`CommandError::BusinessRule`] after bumping the
/// matching call counter, so tests can distinguish "failed" from "never
/// ran".
pub struct FailingCommand {
    id: CommandId,
    do_calls: AtomicUsize,
    undo_calls: AtomicUsize,
}

impl FailingCommand {
    /// Creates a failing command.
    pub fn arc(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: CommandId::try_new(id).expect("test command id is valid"),
            do_calls: AtomicUsize::new(0),
            undo_calls: AtomicUsize::new(0),
        })
    }

    /// How many times `execute_do` ran.
    pub fn do_calls(&self) -> usize {
        self.do_calls.load(Ordering::SeqCst)
    }

    /// How many times `execute_undo` ran.
    pub fn undo_calls(&self) -> usize {
        self.undo_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Command<String> for FailingCommand {
    fn command_id(&self) -> CommandId {
        self.id.clone()
    }

    async fn execute_do(&self, _context: &mut ExecutionContext<String>) -> CommandResult<String> {
        self.do_calls.fetch_add(1, Ordering::SeqCst);
        Err(CommandError::BusinessRule(format!("{} refused", self.id)))
    }

    async fn execute_undo(&self, _context: &mut ExecutionContext<String>) -> CommandResult<()> {
        self.undo_calls.fetch_add(1, Ordering::SeqCst);
        Err(CommandError::BusinessRule(format!(
            "{} cannot compensate",
            self.id
        )))
    }
}

/// A command that rejects every parameter at validation time.
///
/// Its context build always fails before any business logic, which is
/// exactly what composite fail-fast tests need from a middle command.
pub struct RejectingCommand {
    id: CommandId,
}

impl RejectingCommand {
    /// Creates a rejecting command.
    pub fn arc(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: CommandId::try_new(id).expect("test command id is valid"),
        })
    }
}

#[async_trait]
impl Command<String> for RejectingCommand {
    fn command_id(&self) -> CommandId {
        self.id.clone()
    }

    fn accept_parameter(
        &self,
        _parameter: Option<CommandParameter<String>>,
    ) -> CommandResult<CommandParameter<String>> {
        Err(CommandError::Internal(format!(
            "{} rejects every parameter",
            self.id
        )))
    }

    async fn execute_do(&self, _context: &mut ExecutionContext<String>) -> CommandResult<String> {
        Err(CommandError::Internal("unreachable".to_string()))
    }

    async fn execute_undo(&self, _context: &mut ExecutionContext<String>) -> CommandResult<()> {
        Err(CommandError::Internal("unreachable".to_string()))
    }
}
