// Copyright 2025 Cowboy AI, LLC.

//! Workflow state persistence
//!
//! The orchestrator reads and writes one [`WorkflowInstance`] per subject.
//! Stores only need last-writer-wins semantics per key; the orchestrator
//! serializes access to a subject before touching its state.

mod memory;

pub use memory::InMemoryStateStore;

use crate::errors::StoreError;
use crate::identifiers::Subject;
use crate::instance::WorkflowInstance;
use async_trait::async_trait;

/// Key-value store of workflow instances keyed by subject
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the state of `subject`, if any
    async fn load(&self, subject: &Subject) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Insert or replace the state of `instance.subject`
    async fn save(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    /// Delete the state of `subject`; deleting a missing key is not an error
    async fn remove(&self, subject: &Subject) -> Result<(), StoreError>;

    /// All subjects with persisted state
    async fn subjects(&self) -> Result<Vec<Subject>, StoreError>;

    /// Subjects whose persisted state is not terminal yet
    ///
    /// Archived terminal instances are never evicted by the orchestrator;
    /// stores keeping them must prune externally.
    async fn pending_subjects(&self) -> Result<Vec<Subject>, StoreError>;
}
