// Copyright 2025 Cowboy AI, LLC.

//! Correlation engine
//!
//! Decides, for one instance and one event, what the next persisted state is
//! and what gets emitted. No I/O happens here; the orchestrator wraps this in
//! a load/save critical section.

use super::{compare_versions, ExecutionModel, Reduction, Transition};
use crate::config::{FailurePolicy, OrchestratorConfig};
use crate::contracts::OrchestratorContract;
use crate::errors::{ModelError, Violation};
use crate::events::{ServiceCall, ServiceError, WorkflowEvent, WorkflowOutput};
use crate::identifiers::Subject;
use crate::instance::{OutstandingCall, WorkflowInstance};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Engine settings derived from [`OrchestratorConfig`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineSettings {
    /// Deadline added to every dispatched call
    pub call_timeout: Option<chrono::Duration>,
    /// Effect of recorded errors on success outputs
    pub failure_policy: FailurePolicy,
}

impl From<&OrchestratorConfig> for EngineSettings {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            failure_policy: config.failure_policy,
        }
    }
}

/// Why an event did not change any state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The instance already produced its output
    Terminal,
    /// No declared service answers with this kind
    UnrelatedKind,
}

/// Outcome of correlating one event
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStep {
    /// The instance keeps waiting; calls must be dispatched
    Pending {
        /// State to persist
        instance: WorkflowInstance,
        /// Calls to emit
        calls: Vec<WorkflowEvent>,
    },
    /// The instance retired and emits its terminal event
    Terminal {
        /// Final state
        instance: WorkflowInstance,
        /// Done or system-error event
        event: WorkflowEvent,
    },
    /// Nothing changed
    Ignored(IgnoreReason),
}

impl EngineStep {
    /// Events emitted by this step
    pub fn emitted(&self) -> Vec<WorkflowEvent> {
        match self {
            EngineStep::Pending { calls, .. } => calls.clone(),
            EngineStep::Terminal { event, .. } => vec![event.clone()],
            EngineStep::Ignored(_) => Vec::new(),
        }
    }

    /// The instance to persist, if any
    pub fn instance(&self) -> Option<&WorkflowInstance> {
        match self {
            EngineStep::Pending { instance, .. } | EngineStep::Terminal { instance, .. } => {
                Some(instance)
            }
            EngineStep::Ignored(_) => None,
        }
    }
}

/// Correlates events with instance state for one workflow kind
pub struct CorrelationEngine {
    contract: OrchestratorContract,
    models: BTreeMap<String, Arc<dyn ExecutionModel>>,
    settings: EngineSettings,
    init_kind: String,
}

impl CorrelationEngine {
    /// Create an engine over the given versioned models
    pub fn new(
        contract: OrchestratorContract,
        models: BTreeMap<String, Arc<dyn ExecutionModel>>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            init_kind: contract.init_kind(),
            contract,
            models,
            settings,
        }
    }

    /// The workflow contract
    pub fn contract(&self) -> &OrchestratorContract {
        &self.contract
    }

    /// Kind of initiating events; also the source of emitted events
    pub fn init_kind(&self) -> &str {
        &self.init_kind
    }

    /// Registered versions
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    fn latest_model(&self) -> Option<&Arc<dyn ExecutionModel>> {
        self.models
            .iter()
            .max_by(|a, b| compare_versions(a.0, b.0))
            .map(|(_, model)| model)
    }

    fn model(&self, version: Option<&str>) -> Result<&Arc<dyn ExecutionModel>, Violation> {
        let found = match version {
            Some(v) => self.models.get(v),
            None => self.latest_model(),
        };
        found.ok_or_else(|| Violation::UnsupportedVersion {
            workflow: self.contract.name().to_string(),
            version: version.unwrap_or("<latest>").to_string(),
        })
    }

    /// Correlate `event` with the prior state of its subject
    pub fn on_event(
        &self,
        prior: Option<WorkflowInstance>,
        event: &WorkflowEvent,
        now: DateTime<Utc>,
    ) -> Result<EngineStep, Violation> {
        let is_init = event.kind == self.init_kind;
        match (prior, is_init) {
            (None, false) => Err(Violation::OrphanResponse {
                subject: event.subject.clone(),
                kind: event.kind.clone(),
            }),
            (Some(_), true) => Err(Violation::DuplicateInit {
                subject: event.subject.clone(),
            }),
            (None, true) => self.start(event, now),
            (Some(instance), false) => self.resume(instance, event, now),
        }
    }

    fn start(&self, event: &WorkflowEvent, now: DateTime<Utc>) -> Result<EngineStep, Violation> {
        let model = self.model(event.version.as_deref())?;
        let mut instance = WorkflowInstance::start(event, self.contract.name(), model.version());

        info!(
            subject = %instance.subject,
            workflow = %instance.workflow,
            version = %instance.version,
            parent = ?instance.parent_subject,
            "Starting workflow instance"
        );

        let result = model.reduce(Reduction {
            subject: &instance.subject,
            init: Some(event),
            context: None,
            service: None,
            collected: &instance.collected_events,
            errors: &instance.errors,
        });
        instance.updated_at = now;
        self.apply(model.as_ref(), instance, result, now)
    }

    fn resume(
        &self,
        mut instance: WorkflowInstance,
        event: &WorkflowEvent,
        now: DateTime<Utc>,
    ) -> Result<EngineStep, Violation> {
        if instance.is_terminal() {
            debug!(
                subject = %instance.subject,
                kind = %event.kind,
                status = ?instance.status,
                "Discarding event for terminal workflow"
            );
            return Ok(EngineStep::Ignored(IgnoreReason::Terminal));
        }

        let model = self.model(Some(&instance.version))?;
        let Some(contract) = model.service_for_response(&event.kind) else {
            warn!(
                subject = %instance.subject,
                kind = %event.kind,
                "Ignoring event no declared service emits"
            );
            return Ok(EngineStep::Ignored(IgnoreReason::UnrelatedKind));
        };

        let released = instance.record(event.clone());
        instance.updated_at = now;

        // errors only count when they answer a call still in flight
        if contract.is_error(&event.kind) && released.is_some() {
            let error = event.service_error().unwrap_or_else(|| {
                ServiceError::from_message(format!("{} reported an unreadable error", contract.accepts()))
            });
            warn!(
                subject = %instance.subject,
                service = %contract.accepts(),
                error = %error,
                "Service reported an error"
            );
            instance.errors.push(error);
        }

        debug!(
            subject = %instance.subject,
            kind = %event.kind,
            outstanding = instance.outstanding.len(),
            collected = instance.collected_events.total(),
            "Recorded response"
        );

        let result = model.reduce(Reduction {
            subject: &instance.subject,
            init: None,
            context: Some(&instance.context),
            service: Some(event),
            collected: &instance.collected_events,
            errors: &instance.errors,
        });
        self.apply(model.as_ref(), instance, result, now)
    }

    fn apply(
        &self,
        model: &dyn ExecutionModel,
        mut instance: WorkflowInstance,
        result: Result<Transition, ModelError>,
        now: DateTime<Utc>,
    ) -> Result<EngineStep, Violation> {
        match result {
            Err(ModelError::Violation(violation)) => Err(violation),
            Err(ModelError::Handler(message)) => {
                let error = ServiceError::new("WorkflowError", message);
                warn!(
                    subject = %instance.subject,
                    error = %error,
                    "Workflow handler failed"
                );
                instance.retire(WorkflowOutput::failure(vec![error.clone()]))?;
                let event = self.terminal_event(&instance, self.contract.error_kind(), error.to_value());
                Ok(EngineStep::Terminal { instance, event })
            }
            Ok(Transition::Continue { context, calls }) => {
                instance.context = context;
                let calls = calls
                    .into_iter()
                    .map(|call| self.dispatch(model, &mut instance, call, now))
                    .collect::<Result<Vec<_>, _>>()?;
                debug!(
                    subject = %instance.subject,
                    dispatched = calls.len(),
                    outstanding = instance.outstanding.len(),
                    "Workflow pending"
                );
                Ok(EngineStep::Pending { instance, calls })
            }
            Ok(Transition::Finish { context, output }) => {
                instance.context = context;
                let output = self.enforce_policy(&instance, output);
                self.finish(instance, output)
            }
        }
    }

    fn enforce_policy(&self, instance: &WorkflowInstance, output: WorkflowOutput) -> WorkflowOutput {
        if output.is_success()
            && !instance.errors.is_empty()
            && self.settings.failure_policy == FailurePolicy::AnyFailureFatal
        {
            return WorkflowOutput::failure(instance.errors.clone());
        }
        output
    }

    fn finish(
        &self,
        mut instance: WorkflowInstance,
        output: WorkflowOutput,
    ) -> Result<EngineStep, Violation> {
        let data = output.to_value();
        instance.retire(output)?;
        info!(
            subject = %instance.subject,
            workflow = %instance.workflow,
            status = ?instance.status,
            "Workflow finished"
        );
        let event = self.terminal_event(&instance, self.contract.done_kind(), data);
        Ok(EngineStep::Terminal { instance, event })
    }

    fn terminal_event(
        &self,
        instance: &WorkflowInstance,
        kind: String,
        data: serde_json::Value,
    ) -> WorkflowEvent {
        let subject = instance
            .parent_subject
            .clone()
            .unwrap_or_else(|| instance.subject.clone());
        WorkflowEvent::new(kind, subject, data)
            .with_source(self.init_kind.clone())
            .with_to(instance.initiator.clone())
    }

    fn dispatch(
        &self,
        model: &dyn ExecutionModel,
        instance: &mut WorkflowInstance,
        call: ServiceCall,
        now: DateTime<Utc>,
    ) -> Result<WorkflowEvent, Violation> {
        let contract = model
            .service_for_call(&call.kind)
            .ok_or_else(|| Violation::ContractViolation {
                kind: call.kind.clone(),
                reason: format!("{} does not declare this service", self.contract.name()),
            })?;

        let (subject, parent) = if contract.is_orchestrator() {
            (Subject::new(), Some(instance.subject.clone()))
        } else {
            (instance.subject.clone(), None)
        };

        instance.outstanding.push(OutstandingCall {
            call_kind: call.kind.clone(),
            subject: subject.clone(),
            resolved_by: contract.resolving_kinds(),
            dispatched_at: now,
            deadline: self.settings.call_timeout.map(|t| now + t),
        });

        Ok(WorkflowEvent::new(call.kind, subject, call.data)
            .with_source(self.init_kind.clone())
            .with_parent(parent))
    }

    /// Retire `instance` as errored if one of its calls outlived its deadline
    pub fn expire(
        &self,
        mut instance: WorkflowInstance,
        now: DateTime<Utc>,
    ) -> Result<Option<EngineStep>, Violation> {
        if instance.is_terminal() {
            return Ok(None);
        }
        let Some(expired) = instance.first_expired(now).cloned() else {
            return Ok(None);
        };
        let Some(deadline) = expired.deadline else {
            return Ok(None);
        };

        warn!(
            subject = %instance.subject,
            call = %expired.call_kind,
            deadline = %deadline,
            "Call timed out"
        );
        instance
            .errors
            .push(ServiceError::timeout(&expired.call_kind, deadline));
        instance.updated_at = now;
        let output = WorkflowOutput::failure(instance.errors.clone());
        self.finish(instance, output).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::ServiceContract;
    use crate::instance::WorkflowStatus;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    /// Calls `echo` once, finishes with the echoed value
    struct EchoModel {
        services: Vec<ServiceContract>,
    }

    impl EchoModel {
        fn new() -> Self {
            Self {
                services: vec![ServiceContract::simple("echo")],
            }
        }
    }

    impl ExecutionModel for EchoModel {
        fn version(&self) -> &str {
            "1.0.0"
        }

        fn services(&self) -> &[ServiceContract] {
            &self.services
        }

        fn reduce(&self, r: Reduction<'_>) -> Result<Transition, ModelError> {
            if let Some(init) = r.init {
                return Ok(Transition::Continue {
                    context: init.data.clone(),
                    calls: vec![ServiceCall::new("com.echo", init.data.clone())],
                });
            }
            let context = r.context.cloned().unwrap_or(Value::Null);
            match r.collected.first("evt.echo.success") {
                Some(e) => Ok(Transition::Finish {
                    context,
                    output: WorkflowOutput::success(e.data.clone()),
                }),
                None if !r.errors.is_empty() => Ok(Transition::Finish {
                    context,
                    output: WorkflowOutput::failure(r.errors.to_vec()),
                }),
                None => Ok(Transition::Continue {
                    context,
                    calls: vec![],
                }),
            }
        }
    }

    fn engine(settings: EngineSettings) -> CorrelationEngine {
        let mut models: BTreeMap<String, Arc<dyn ExecutionModel>> = BTreeMap::new();
        models.insert("1.0.0".into(), Arc::new(EchoModel::new()));
        CorrelationEngine::new(OrchestratorContract::new("echo", ["1.0.0"]), models, settings)
    }

    fn init(subject: &str) -> WorkflowEvent {
        WorkflowEvent::new("orc.echo", Subject::from(subject), json!({"v": 1})).with_source("client")
    }

    fn pending(step: EngineStep) -> (WorkflowInstance, Vec<WorkflowEvent>) {
        match step {
            EngineStep::Pending { instance, calls } => (instance, calls),
            other => panic!("expected pending, got {other:?}"),
        }
    }

    #[test]
    fn test_start_dispatches_calls_with_own_subject() {
        let engine = engine(EngineSettings::default());
        let (instance, calls) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].kind, "com.echo");
        assert_eq!(calls[0].subject, Subject::from("S1"));
        assert_eq!(calls[0].source, "orc.echo");
        assert_eq!(instance.outstanding.len(), 1);
        assert_eq!(instance.outstanding[0].deadline, None);
    }

    #[test]
    fn test_response_completes_workflow() {
        let engine = engine(EngineSettings::default());
        let (instance, calls) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());
        let response = calls[0].reply("evt.echo.success", json!("pong"));

        match engine.on_event(Some(instance), &response, Utc::now()).unwrap() {
            EngineStep::Terminal { instance, event } => {
                assert_eq!(instance.status, WorkflowStatus::Complete);
                assert!(instance.all_calls_resolved());
                assert_eq!(event.kind, "orc.echo.done");
                assert_eq!(event.to, "client");
                assert_eq!(event.data, json!({"result": "pong", "errors": null}));
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn test_orphan_and_duplicate_are_violations() {
        let engine = engine(EngineSettings::default());
        let response = WorkflowEvent::new("evt.echo.success", Subject::from("S9"), json!(1));
        assert_eq!(
            engine.on_event(None, &response, Utc::now()).unwrap_err().code(),
            "orphan-response"
        );

        let (instance, _) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());
        assert_eq!(
            engine
                .on_event(Some(instance), &init("S1"), Utc::now())
                .unwrap_err()
                .code(),
            "duplicate-init"
        );
    }

    #[test]
    fn test_unrelated_kind_is_ignored() {
        let engine = engine(EngineSettings::default());
        let (instance, _) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());
        let stray = WorkflowEvent::new("evt.other.success", Subject::from("S1"), json!(1));
        assert_eq!(
            engine.on_event(Some(instance), &stray, Utc::now()).unwrap(),
            EngineStep::Ignored(IgnoreReason::UnrelatedKind)
        );
    }

    #[test]
    fn test_service_error_is_recorded_and_fails() {
        let engine = engine(EngineSettings::default());
        let (instance, calls) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());
        let error = ServiceError::from_message("boom");
        let response = calls[0].reply("sys.com.echo.error", error.to_value());

        match engine.on_event(Some(instance), &response, Utc::now()).unwrap() {
            EngineStep::Terminal { instance, event } => {
                assert_eq!(instance.status, WorkflowStatus::Errored);
                assert_eq!(instance.errors, vec![error.clone()]);
                assert_eq!(event.data["result"], Value::Null);
                assert_eq!(event.data["errors"][0]["errorMessage"], "boom");
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_instance_ignores_redelivery() {
        let engine = engine(EngineSettings::default());
        let (instance, calls) = pending(engine.on_event(None, &init("S1"), Utc::now()).unwrap());
        let response = calls[0].reply("evt.echo.success", json!("pong"));
        let done = match engine.on_event(Some(instance), &response, Utc::now()).unwrap() {
            EngineStep::Terminal { instance, .. } => instance,
            other => panic!("expected terminal, got {other:?}"),
        };

        assert_eq!(
            engine.on_event(Some(done), &response, Utc::now()).unwrap(),
            EngineStep::Ignored(IgnoreReason::Terminal)
        );
    }

    #[test]
    fn test_failure_policy_decides_success_with_errors() {
        let strict = engine(EngineSettings::default());
        let (mut instance, _) = pending(strict.on_event(None, &init("S1"), Utc::now()).unwrap());
        instance.errors.push(ServiceError::from_message("late"));

        let output = strict.enforce_policy(&instance, WorkflowOutput::success(json!(1)));
        assert!(!output.is_success());
        assert_eq!(output.errors(), Some(&instance.errors[..]));

        let lenient = engine(EngineSettings {
            failure_policy: FailurePolicy::Tolerate,
            ..Default::default()
        });
        let output = lenient.enforce_policy(&instance, WorkflowOutput::success(json!(1)));
        assert!(output.is_success());
    }

    #[test]
    fn test_unknown_version_is_violation() {
        let engine = engine(EngineSettings::default());
        let event = init("S1").with_version("9.9.9");
        assert_eq!(
            engine.on_event(None, &event, Utc::now()).unwrap_err().code(),
            "unsupported-version"
        );
    }

    #[test]
    fn test_expire_marks_errored() {
        let engine = engine(EngineSettings {
            call_timeout: Some(chrono::Duration::seconds(5)),
            ..Default::default()
        });
        let start = Utc::now();
        let (instance, _) = pending(engine.on_event(None, &init("S1"), start).unwrap());
        assert!(instance.outstanding[0].deadline.is_some());

        assert!(engine.expire(instance.clone(), start).unwrap().is_none());

        let later = start + chrono::Duration::seconds(6);
        match engine.expire(instance, later).unwrap() {
            Some(EngineStep::Terminal { instance, event }) => {
                assert_eq!(instance.status, WorkflowStatus::Errored);
                assert_eq!(event.data["errors"][0]["errorName"], "TimeoutError");
            }
            other => panic!("expected terminal, got {other:?}"),
        }
    }
}
