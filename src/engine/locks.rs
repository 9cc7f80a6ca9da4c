// Copyright 2025 Cowboy AI, LLC.

//! Per-subject critical sections
//!
//! Events for the same subject are processed strictly one at a time; events
//! for different subjects never wait on each other.

use crate::identifiers::Subject;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<Subject, Arc<AsyncMutex<()>>>;

/// Registry of one async lock per active subject
#[derive(Debug, Clone, Default)]
pub struct SubjectLocks {
    table: Arc<Mutex<LockTable>>,
}

impl SubjectLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `subject` is free and hold it until the guard drops
    pub async fn acquire(&self, subject: &Subject) -> SubjectGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(subject.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        SubjectGuard {
            subject: subject.clone(),
            table: self.table.clone(),
            guard: Some(guard),
        }
    }

    /// Number of subjects currently held or awaited
    pub fn active(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Exclusive access to one subject
#[derive(Debug)]
pub struct SubjectGuard {
    subject: Subject,
    table: Arc<Mutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl SubjectGuard {
    /// The subject held by this guard
    pub fn subject(&self) -> &Subject {
        &self.subject
    }
}

impl Drop for SubjectGuard {
    fn drop(&mut self) {
        // release first so the count below only sees waiters
        self.guard.take();
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(&self.subject) {
            if Arc::strong_count(lock) == 1 {
                table.remove(&self.subject);
            }
        }
    }
}
