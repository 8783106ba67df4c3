//! In-memory adapter for the `CmdCore` command execution core.
//!
//! This crate provides an in-memory implementation of the `Repository`
//! trait from the cmdcore crate, useful for testing and development
//! scenarios where persistence is not required.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cmdcore::errors::{RepositoryError, RepositoryResult};
use cmdcore::repository::{Entity, Repository};

/// Thread-safe in-memory repository for testing.
#[derive(Clone)]
pub struct InMemoryRepository<T>
where
    T: Entity + 'static,
{
    // Maps entity ids to their stored entities
    entities: Arc<RwLock<HashMap<String, T>>>,
}

impl<T> InMemoryRepository<T>
where
    T: Entity + 'static,
{
    /// Create a new empty in-memory repository.
    pub fn new() -> Self {
        Self {
            entities: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.read().expect("RwLock poisoned").len()
    }

    /// Whether the repository holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether an entity is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.entities
            .read()
            .expect("RwLock poisoned")
            .contains_key(id)
    }
}

impl<T> Default for InMemoryRepository<T>
where
    T: Entity + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Entity + 'static,
{
    async fn save(&self, entity: T) -> RepositoryResult<T> {
        let mut entities = self.entities.write().expect("RwLock poisoned");
        entities.insert(entity.entity_id(), entity.clone());
        Ok(entity)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<T> {
        let entities = self.entities.read().expect("RwLock poisoned");
        entities
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::EntityNotFound(id.to_string()))
    }

    async fn delete_by_id(&self, id: &str) -> RepositoryResult<()> {
        let mut entities = self.entities.write().expect("RwLock poisoned");
        entities
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::EntityNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Student {
        id: String,
        name: String,
    }

    impl Entity for Student {
        fn entity_id(&self) -> String {
            self.id.clone()
        }
    }

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn save_then_find_returns_the_entity() {
        let repository = InMemoryRepository::new();
        repository.save(student("s-1", "Ada")).await.unwrap();

        let found = repository.find_by_id("s-1").await.unwrap();
        assert_eq!(found, student("s-1", "Ada"));
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let repository = InMemoryRepository::new();
        repository.save(student("s-1", "Ada")).await.unwrap();
        repository.save(student("s-1", "Grace")).await.unwrap();

        let found = repository.find_by_id("s-1").await.unwrap();
        assert_eq!(found.name, "Grace");
        assert_eq!(repository.len(), 1);
    }

    #[tokio::test]
    async fn find_missing_entity_fails() {
        let repository = InMemoryRepository::<Student>::new();
        let missing = repository.find_by_id("ghost").await.unwrap_err();
        assert_eq!(missing, RepositoryError::EntityNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_the_entity() {
        let repository = InMemoryRepository::new();
        repository.save(student("s-1", "Ada")).await.unwrap();

        repository.delete_by_id("s-1").await.unwrap();
        assert!(!repository.contains("s-1"));
    }

    #[tokio::test]
    async fn delete_missing_entity_fails() {
        let repository = InMemoryRepository::<Student>::new();
        let missing = repository.delete_by_id("ghost").await.unwrap_err();
        assert_eq!(missing, RepositoryError::EntityNotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn clones_share_the_same_store() {
        let repository = InMemoryRepository::new();
        let view = repository.clone();
        repository.save(student("s-1", "Ada")).await.unwrap();

        assert!(view.contains("s-1"));
    }
}
