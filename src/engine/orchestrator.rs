// Copyright 2025 Cowboy AI, LLC.

//! The `process` entry point
//!
//! An [`Orchestrator`] owns one workflow kind. For every inbound event it
//! holds the subject's lock across load → decide → save so that two events
//! for one subject are never evaluated concurrently.

use super::correlation::{CorrelationEngine, EngineSettings, EngineStep};
use super::locks::SubjectLocks;
use super::ExecutionModel;
use crate::broker::EventHandler;
use crate::config::{OrchestratorConfig, RetentionPolicy};
use crate::contracts::OrchestratorContract;
use crate::errors::{ConfigError, OrchestrationResult, StoreError, Violation};
use crate::events::WorkflowEvent;
use crate::identifiers::Subject;
use crate::instance::WorkflowInstance;
use crate::persistence::{InMemoryStateStore, StateStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Event handler driving every instance of one workflow kind
pub struct Orchestrator {
    engine: CorrelationEngine,
    store: Arc<dyn StateStore>,
    locks: SubjectLocks,
    retention: RetentionPolicy,
}

impl Orchestrator {
    /// Start building an orchestrator for `contract`
    pub fn builder(contract: OrchestratorContract) -> OrchestratorBuilder {
        OrchestratorBuilder::new(contract)
    }

    /// The workflow contract
    pub fn contract(&self) -> &OrchestratorContract {
        self.engine.contract()
    }

    /// The state store
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Process one inbound event and return the events to emit
    ///
    /// A [`Violation`] leaves the persisted state untouched; the caller must
    /// not reprocess the event.
    #[tracing::instrument(
        skip_all,
        fields(workflow = %self.contract().name(), kind = %event.kind, subject = %event.subject)
    )]
    pub async fn process(&self, event: &WorkflowEvent) -> OrchestrationResult<Vec<WorkflowEvent>> {
        let _guard = self.locks.acquire(&event.subject).await;

        let prior = self.store.load(&event.subject).await?;
        // an init on existing state is a duplicate whoever owns that state
        if let Some(instance) = prior.as_ref().filter(|_| event.kind != self.engine.init_kind()) {
            self.check_ownership(instance)?;
        }

        let step = self
            .engine
            .on_event(prior, event, Utc::now())
            .inspect_err(|v| error!(code = v.code(), error = %v, "Orchestration violation"))?;

        self.commit(&step).await?;
        let emitted = step.emitted();
        debug!(emitted = emitted.len(), "Event processed");
        Ok(emitted)
    }

    /// Retire every pending instance whose call outlived its deadline
    ///
    /// Only subjects the store reports as pending are loaded.
    #[tracing::instrument(skip_all, fields(workflow = %self.contract().name()))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> OrchestrationResult<Vec<WorkflowEvent>> {
        let mut emitted = Vec::new();
        for subject in self.store.pending_subjects().await? {
            let _guard = self.locks.acquire(&subject).await;
            let Some(instance) = self.store.load(&subject).await? else {
                continue;
            };
            if instance.workflow != self.contract().name() {
                continue;
            }
            if let Some(step) = self.engine.expire(instance, now)? {
                self.commit(&step).await?;
                emitted.extend(step.emitted());
            }
        }
        if !emitted.is_empty() {
            info!(expired = emitted.len(), "Swept expired workflows");
        }
        Ok(emitted)
    }

    /// Current persisted state of `subject`
    pub async fn instance(&self, subject: &Subject) -> OrchestrationResult<Option<WorkflowInstance>> {
        Ok(self.store.load(subject).await?)
    }

    fn check_ownership(&self, instance: &WorkflowInstance) -> Result<(), Violation> {
        if instance.workflow == self.contract().name() {
            return Ok(());
        }
        Err(Violation::CorruptState {
            subject: instance.subject.clone(),
            reason: format!(
                "state belongs to workflow {} not {}",
                instance.workflow,
                self.contract().name()
            ),
        })
    }

    async fn commit(&self, step: &EngineStep) -> Result<(), StoreError> {
        match step {
            EngineStep::Ignored(reason) => {
                debug!(?reason, "Event ignored");
                Ok(())
            }
            EngineStep::Pending { instance, .. } => self.store.save(instance).await,
            EngineStep::Terminal { instance, .. } => match self.retention {
                RetentionPolicy::Archive => self.store.save(instance).await,
                RetentionPolicy::Remove => self.store.remove(&instance.subject).await,
            },
        }
    }
}

#[async_trait]
impl EventHandler for Orchestrator {
    fn source(&self) -> &str {
        self.engine.init_kind()
    }

    async fn execute(&self, event: WorkflowEvent) -> OrchestrationResult<Vec<WorkflowEvent>> {
        self.process(&event).await
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    contract: OrchestratorContract,
    models: Vec<Arc<dyn ExecutionModel>>,
    store: Option<Arc<dyn StateStore>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Create a new builder
    pub fn new(contract: OrchestratorContract) -> Self {
        Self {
            contract,
            models: Vec::new(),
            store: None,
            config: OrchestratorConfig::default(),
        }
    }

    /// Register the model for one contract version
    pub fn model(mut self, model: impl ExecutionModel + 'static) -> Self {
        self.models.push(Arc::new(model));
        self
    }

    /// Register a shared model
    pub fn shared_model(mut self, model: Arc<dyn ExecutionModel>) -> Self {
        self.models.push(model);
        self
    }

    /// Use `store` instead of a private in-memory store
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Apply orchestrator configuration
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Tolerate declared versions without a registered model
    pub fn allow_missing_versions(mut self, allow: bool) -> Self {
        self.config.allow_missing_versions = allow;
        self
    }

    /// Validate the registration and build the orchestrator
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let workflow = self.contract.name().to_string();
        if self.models.is_empty() {
            return Err(ConfigError::InvalidDefinition(format!(
                "workflow {workflow} has no execution model"
            )));
        }

        let mut models: BTreeMap<String, Arc<dyn ExecutionModel>> = BTreeMap::new();
        for model in self.models {
            let version = model.version().to_string();
            if !self.contract.versions().contains(&version) {
                return Err(ConfigError::UndeclaredVersion { workflow, version });
            }
            if models.insert(version.clone(), model).is_some() {
                return Err(ConfigError::InvalidDefinition(format!(
                    "workflow {workflow} registers version {version} twice"
                )));
            }
        }

        for version in self.contract.versions() {
            if models.contains_key(version) {
                continue;
            }
            if !self.config.allow_missing_versions {
                return Err(ConfigError::MissingVersion {
                    workflow,
                    version: version.clone(),
                });
            }
            warn!(
                workflow = %workflow,
                version = %version,
                "Declared version has no model; init events for it will be rejected"
            );
        }

        info!(
            workflow = %workflow,
            versions = ?models.keys().collect::<Vec<_>>(),
            retention = ?self.config.retention,
            "Orchestrator ready"
        );

        let settings = EngineSettings::from(&self.config);
        Ok(Orchestrator {
            engine: CorrelationEngine::new(self.contract, models, settings),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryStateStore::new())),
            locks: SubjectLocks::new(),
            retention: self.config.retention,
        })
    }
}
