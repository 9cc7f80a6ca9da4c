// Copyright 2025 Cowboy AI, LLC.

//! In-memory state store

use super::StateStore;
use crate::errors::StoreError;
use crate::identifiers::Subject;
use crate::instance::WorkflowInstance;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// In-memory state store
///
/// Instances are kept as serialized JSON so that every save and load goes
/// through the same encoding a durable backend would use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<Subject, Entry>>>,
}

#[derive(Debug)]
struct Entry {
    bytes: Vec<u8>,
    pending: bool,
}

impl InMemoryStateStore {
    /// Create a new in-memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, subject: &Subject) -> Result<Option<WorkflowInstance>, StoreError> {
        let entries = self.entries.read().await;
        entries
            .get(subject)
            .map(|entry| serde_json::from_slice(&entry.bytes))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(instance)?;
        trace!(subject = %instance.subject, bytes = bytes.len(), "Saving workflow state");
        let entry = Entry {
            bytes,
            pending: !instance.is_terminal(),
        };
        self.entries
            .write()
            .await
            .insert(instance.subject.clone(), entry);
        Ok(())
    }

    async fn remove(&self, subject: &Subject) -> Result<(), StoreError> {
        self.entries.write().await.remove(subject);
        Ok(())
    }

    async fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut subjects: Vec<_> = self.entries.read().await.keys().cloned().collect();
        subjects.sort();
        Ok(subjects)
    }

    async fn pending_subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let mut subjects: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.pending)
            .map(|(subject, _)| subject.clone())
            .collect();
        subjects.sort();
        Ok(subjects)
    }
}
