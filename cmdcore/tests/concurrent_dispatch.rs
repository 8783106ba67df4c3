//! Concurrency behavior of the dispatch service: many in-flight
//! messages, distinct correlation ids, one execution each.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use cmdcore::{
    ActionContext, ActionName, Command, CommandDispatchService, CommandId, CommandMessage,
    CommandParameter, CommandResult, ContextState, CorrelationId, DispatchConfig,
    ExecutionContext, FacadeName,
};

/// Doubles its input and counts how many times it ran.
struct Doubler {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Command<u64> for Doubler {
    fn command_id(&self) -> CommandId {
        CommandId::try_new("math.double").unwrap()
    }

    async fn execute_do(&self, context: &mut ExecutionContext<u64>) -> CommandResult<u64> {
        let input = *context.redo_value()?;
        context.set_undo_parameter(CommandParameter::Value(input));
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(input * 2)
    }

    async fn execute_undo(&self, context: &mut ExecutionContext<u64>) -> CommandResult<()> {
        context.undo_value()?;
        Ok(())
    }
}

fn action_context() -> ActionContext {
    ActionContext::new(
        FacadeName::try_new("math").unwrap(),
        ActionName::try_new("double").unwrap(),
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_in_flight_messages_each_execute_once() {
    init_tracing();
    let service = Arc::new(CommandDispatchService::new(DispatchConfig::default()));
    service.initialize().unwrap();

    let runs = Arc::new(AtomicUsize::new(0));
    let command = Arc::new(Doubler {
        runs: Arc::clone(&runs),
    });

    let mut receivers = Vec::new();
    for input in 0..40u64 {
        let correlation_id = CorrelationId::try_new(format!("cid-{input}")).unwrap();
        let context = Arc::clone(&command)
            .create_context(Some(CommandParameter::Value(input)));
        let message =
            CommandMessage::do_action(correlation_id.clone(), action_context(), context);
        service.send(message).unwrap();

        let service = Arc::clone(&service);
        let command_id = command.command_id();
        receivers.push(tokio::spawn(async move {
            let received = service
                .receive(&command_id, &correlation_id)
                .await
                .unwrap()
                .expect("every in-flight message completes");
            (input, received)
        }));
    }

    for receiver in receivers {
        let (input, received) = receiver.await.unwrap();
        assert_eq!(received.context().state(), ContextState::Done);
        assert_eq!(received.context().result(), Some(&(input * 2)));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 40);

    service.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn do_then_undo_round_trips_share_nothing() {
    init_tracing();
    let service = Arc::new(CommandDispatchService::new(DispatchConfig::default()));
    service.initialize().unwrap();

    let command = Arc::new(Doubler {
        runs: Arc::new(AtomicUsize::new(0)),
    });

    // Forward round trip under one correlation id.
    let do_id = CorrelationId::try_new("cid-do").unwrap();
    let context = Arc::clone(&command).create_context(Some(CommandParameter::Value(21)));
    service
        .send(CommandMessage::do_action(
            do_id.clone(),
            action_context(),
            context,
        ))
        .unwrap();
    let done = service
        .receive(&command.command_id(), &do_id)
        .await
        .unwrap()
        .unwrap()
        .into_context();
    assert_eq!(done.result(), Some(&42));

    // The caller serializes reuse: the undo is sent only after the
    // forward receive returned, under a fresh correlation id.
    let undo_id = CorrelationId::try_new("cid-undo").unwrap();
    service
        .send(CommandMessage::undo_action(
            undo_id.clone(),
            action_context(),
            done,
        ))
        .unwrap();
    let undone = service
        .receive(&command.command_id(), &undo_id)
        .await
        .unwrap()
        .unwrap()
        .into_context();
    assert_eq!(undone.state(), ContextState::Undone);

    service.shutdown().await;
}
