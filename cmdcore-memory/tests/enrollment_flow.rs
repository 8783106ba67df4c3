//! End-to-end enrollment flow: leaf commands backed by in-memory
//! repositories, composed into a macro command and dispatched through
//! the message exchange.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cmdcore::{
    ActionContext, ActionExecutor, ActionName, Command, CommandDispatchService, CommandError,
    CommandId, CommandParameter, CommandResult, CompositeCommand, ContextState, DispatchConfig,
    Entity, ExecutionContext, FacadeName, Repository,
};
use cmdcore_memory::InMemoryRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Enrollment {
    student_id: String,
    name: String,
    course: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StudentRecord {
    id: String,
    name: String,
}

impl Entity for StudentRecord {
    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProfileRecord {
    id: String,
    course: String,
}

impl Entity for ProfileRecord {
    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

/// Creates the student record; compensation deletes it again.
struct CreateStudent {
    students: InMemoryRepository<StudentRecord>,
}

#[async_trait]
impl Command<Enrollment> for CreateStudent {
    fn command_id(&self) -> CommandId {
        CommandId::try_new("student.create").unwrap()
    }

    async fn execute_do(
        &self,
        context: &mut ExecutionContext<Enrollment>,
    ) -> CommandResult<Enrollment> {
        let enrollment = context.redo_value()?.clone();
        self.students
            .save(StudentRecord {
                id: enrollment.student_id.clone(),
                name: enrollment.name.clone(),
            })
            .await?;
        context.set_undo_parameter(CommandParameter::Value(enrollment.clone()));
        Ok(enrollment)
    }

    async fn execute_undo(
        &self,
        context: &mut ExecutionContext<Enrollment>,
    ) -> CommandResult<()> {
        let enrollment = context.undo_value()?.clone();
        self.students.delete_by_id(&enrollment.student_id).await?;
        Ok(())
    }
}

/// Creates the course profile; refuses a duplicate profile.
struct CreateProfile {
    profiles: InMemoryRepository<ProfileRecord>,
}

#[async_trait]
impl Command<Enrollment> for CreateProfile {
    fn command_id(&self) -> CommandId {
        CommandId::try_new("profile.create").unwrap()
    }

    async fn execute_do(
        &self,
        context: &mut ExecutionContext<Enrollment>,
    ) -> CommandResult<Enrollment> {
        let enrollment = context.redo_value()?.clone();
        if self.profiles.contains(&enrollment.student_id) {
            return Err(CommandError::BusinessRule(format!(
                "profile for '{}' already exists",
                enrollment.student_id
            )));
        }
        self.profiles
            .save(ProfileRecord {
                id: enrollment.student_id.clone(),
                course: enrollment.course.clone(),
            })
            .await?;
        context.set_undo_parameter(CommandParameter::Value(enrollment.clone()));
        Ok(enrollment)
    }

    async fn execute_undo(
        &self,
        context: &mut ExecutionContext<Enrollment>,
    ) -> CommandResult<()> {
        let enrollment = context.undo_value()?.clone();
        self.profiles.delete_by_id(&enrollment.student_id).await?;
        Ok(())
    }
}

struct Backend {
    students: InMemoryRepository<StudentRecord>,
    profiles: InMemoryRepository<ProfileRecord>,
    service: Arc<CommandDispatchService<Enrollment>>,
    enroll: Arc<CompositeCommand<Enrollment>>,
}

fn backend() -> Backend {
    let students = InMemoryRepository::new();
    let profiles = InMemoryRepository::new();

    let service = Arc::new(CommandDispatchService::new(DispatchConfig::default()));
    service.initialize().unwrap();
    let executor = Arc::new(ActionExecutor::new(Arc::clone(&service)));

    let enroll = Arc::new(
        CompositeCommand::new(CommandId::try_new("macro.enroll").unwrap(), executor)
            .register(Arc::new(CreateStudent {
                students: students.clone(),
            }))
            .register(Arc::new(CreateProfile {
                profiles: profiles.clone(),
            })),
    );

    Backend {
        students,
        profiles,
        service,
        enroll,
    }
}

fn enrollment() -> Enrollment {
    Enrollment {
        student_id: "s-1".to_string(),
        name: "Ada".to_string(),
        course: "mathematics".to_string(),
    }
}

#[tokio::test]
async fn enrollment_macro_creates_student_and_profile() {
    let backend = backend();

    let mut context = Arc::clone(&backend.enroll)
        .create_context(Some(CommandParameter::Value(enrollment())));
    backend.enroll.do_command(&mut context).await;

    assert_eq!(context.state(), ContextState::Done);
    assert!(backend.students.contains("s-1"));
    assert!(backend.profiles.contains("s-1"));

    backend.service.shutdown().await;
}

#[tokio::test]
async fn failed_profile_creation_rolls_the_student_back() {
    let backend = backend();
    backend
        .profiles
        .save(ProfileRecord {
            id: "s-1".to_string(),
            course: "history".to_string(),
        })
        .await
        .unwrap();

    let mut context = Arc::clone(&backend.enroll)
        .create_context(Some(CommandParameter::Value(enrollment())));
    backend.enroll.do_command(&mut context).await;

    assert_eq!(context.state(), ContextState::Fail);
    assert!(matches!(
        context.error(),
        Some(CommandError::BusinessRule(_))
    ));
    // The student created by the first nested command was compensated.
    assert!(!backend.students.contains("s-1"));
    // The pre-existing profile is untouched.
    let profile = backend.profiles.find_by_id("s-1").await.unwrap();
    assert_eq!(profile.course, "history");

    backend.service.shutdown().await;
}

#[tokio::test]
async fn undoing_the_macro_removes_both_records() {
    let backend = backend();

    let mut context = Arc::clone(&backend.enroll)
        .create_context(Some(CommandParameter::Value(enrollment())));
    backend.enroll.do_command(&mut context).await;
    assert_eq!(context.state(), ContextState::Done);

    backend.enroll.undo_command(&mut context).await;

    assert_eq!(context.state(), ContextState::Undone);
    assert!(!backend.students.contains("s-1"));
    assert!(!backend.profiles.contains("s-1"));

    backend.service.shutdown().await;
}

#[tokio::test]
async fn leaf_command_round_trips_through_the_exchange() {
    let backend = backend();
    let executor = ActionExecutor::new(Arc::clone(&backend.service));

    let create = Arc::new(CreateStudent {
        students: backend.students.clone(),
    });
    let context = Arc::clone(&create)
        .create_context(Some(CommandParameter::Value(enrollment())));

    let action_context = ActionContext::new(
        FacadeName::try_new("students-rest").unwrap(),
        ActionName::try_new("create-student").unwrap(),
    );
    let committed = executor.commit_action(action_context, context).await.unwrap();

    assert_eq!(committed.state(), ContextState::Done);
    assert!(backend.students.contains("s-1"));

    backend.service.shutdown().await;
}
