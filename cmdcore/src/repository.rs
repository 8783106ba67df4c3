//! The persistence collaborator boundary.
//!
//! Commands call into a [`Repository`] to perform their side effects;
//! the core never assumes a specific storage technology. Implementations
//! live outside this crate (see the `cmdcore-memory` workspace member
//! for the in-memory one used in tests and development).

use async_trait::async_trait;

use crate::errors::RepositoryResult;

/// An entity a repository can store.
///
/// The only requirement the core places on domain objects: each entity
/// can name the id it is stored under.
pub trait Entity: Clone + Send + Sync {
    /// The id this entity is stored under.
    fn entity_id(&self) -> String;
}

/// The storage collaborator commands perform their side effects through.
///
/// Mirrors the `save` / `find-by-id` / `delete-by-id` surface of the
/// excluded persistence layer. `save` is an upsert and returns the
/// stored entity, so commands can capture the previous state for
/// compensation before overwriting it.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Stores the entity, replacing any previous entity under its id.
    async fn save(&self, entity: T) -> RepositoryResult<T>;

    /// Loads the entity stored under `id`.
    async fn find_by_id(&self, id: &str) -> RepositoryResult<T>;

    /// Removes the entity stored under `id`.
    async fn delete_by_id(&self, id: &str) -> RepositoryResult<()>;
}
