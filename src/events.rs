// Copyright 2025 Cowboy AI, LLC.

//! Events exchanged between workflows and services
//!
//! Every message on the router is a [`WorkflowEvent`]. Its `kind` decides
//! dispatch, its `subject` correlates it to exactly one workflow instance and
//! its `to` field addresses the handler that should receive it.

use crate::errors::Violation;
use crate::identifiers::Subject;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Envelope for every event routed between handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowEvent {
    /// Unique event identifier
    pub id: Uuid,
    /// Event kind, e.g. `com.greeting.create` or `orc.greeting.done`
    pub kind: String,
    /// Workflow instance this event belongs to
    pub subject: Subject,
    /// Subject of the workflow that spawned this one (nested init events only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_subject: Option<Subject>,
    /// Handler that emitted the event
    pub source: String,
    /// Handler the event is addressed to
    pub to: String,
    /// Contract version requested by an initiating event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Kind-specific payload
    pub data: Value,
    /// When the event was created
    pub time: DateTime<Utc>,
}

impl WorkflowEvent {
    /// Create an event addressed to the handler named after its kind
    pub fn new(kind: impl Into<String>, subject: Subject, data: Value) -> Self {
        let kind = kind.into();
        Self {
            id: Uuid::new_v4(),
            to: kind.clone(),
            kind,
            subject,
            parent_subject: None,
            source: String::new(),
            version: None,
            data,
            time: Utc::now(),
        }
    }

    /// Set the emitting handler
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Set the target handler
    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    /// Set the parent subject
    pub fn with_parent(mut self, parent: Option<Subject>) -> Self {
        self.parent_subject = parent;
        self
    }

    /// Set the requested contract version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Build the response to this event: same subject, addressed back to the sender
    pub fn reply(&self, kind: impl Into<String>, data: Value) -> Self {
        WorkflowEvent::new(kind, self.subject.clone(), data)
            .with_source(self.to.clone())
            .with_to(self.source.clone())
    }

    /// Decode the payload into its typed form
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, Violation> {
        serde_json::from_value(self.data.clone()).map_err(|e| Violation::contract(&self.kind, e))
    }

    /// Decode the payload as a service error, if it is one
    pub fn service_error(&self) -> Option<ServiceError> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// An outgoing call to a service or nested workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Kind accepted by the target contract
    pub kind: String,
    /// Call payload
    pub data: Value,
}

impl ServiceCall {
    /// Create a call
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}

/// Recoverable failure reported by a called service
///
/// This is data: it is carried in `sys.*.error` events and accumulated into a
/// workflow's error list, never thrown out of the orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[serde(rename_all = "camelCase")]
#[error("{error_name}: {error_message}")]
pub struct ServiceError {
    /// Error class name
    pub error_name: String,
    /// Human-readable message
    pub error_message: String,
    /// Optional diagnostic trace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
}

impl ServiceError {
    /// Create a service error
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_name: name.into(),
            error_message: message.into(),
            error_stack: None,
        }
    }

    /// Create a generic error from a message
    pub fn from_message(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Error recorded when a call outlives its deadline
    pub fn timeout(call_kind: &str, deadline: DateTime<Utc>) -> Self {
        Self::new(
            "TimeoutError",
            format!("No response to {call_kind} before {}", deadline.to_rfc3339()),
        )
    }

    /// Attach a diagnostic trace
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    /// Serialize into an event payload
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Terminal payload of a workflow
///
/// Exactly one of `result` and `errors` is set; `errors` is never empty.
/// Decoding rejects payloads that break this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowOutput")]
pub struct WorkflowOutput {
    result: Option<Value>,
    errors: Option<Vec<ServiceError>>,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

/// Unchecked wire form of [`WorkflowOutput`]
#[derive(Deserialize)]
struct RawWorkflowOutput {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    errors: Option<Vec<ServiceError>>,
    #[serde(flatten)]
    extensions: Map<String, Value>,
}

impl TryFrom<RawWorkflowOutput> for WorkflowOutput {
    type Error = String;

    fn try_from(raw: RawWorkflowOutput) -> Result<Self, Self::Error> {
        match (raw.result, raw.errors) {
            (Some(_), Some(_)) => Err("output carries both a result and errors".to_string()),
            (None, None) => Err("output carries neither a result nor errors".to_string()),
            (None, Some(errors)) if errors.is_empty() => {
                Err("failed output carries an empty error list".to_string())
            }
            (result, errors) => Ok(Self {
                result,
                errors,
                extensions: raw.extensions,
            }),
        }
    }
}

impl WorkflowOutput {
    /// A successful output
    pub fn success(result: impl Into<Value>) -> Self {
        Self {
            result: Some(result.into()),
            errors: None,
            extensions: Map::new(),
        }
    }

    /// A failed output carrying the aggregated errors
    pub fn failure(mut errors: Vec<ServiceError>) -> Self {
        if errors.is_empty() {
            errors.push(ServiceError::new(
                "UnknownError",
                "workflow failed without a reported cause",
            ));
        }
        Self {
            result: None,
            errors: Some(errors),
            extensions: Map::new(),
        }
    }

    /// Attach an extra top-level field
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "result" && key != "errors" {
            self.extensions.insert(key, value.into());
        }
        self
    }

    /// The result, if successful
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// The errors, if failed
    pub fn errors(&self) -> Option<&[ServiceError]> {
        self.errors.as_deref()
    }

    /// An extra field
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// Whether this output is a success
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// Serialize into an event payload
    pub fn to_value(&self) -> Value {
        let mut map = self.extensions.clone();
        map.insert(
            "result".to_string(),
            self.result.clone().unwrap_or(Value::Null),
        );
        map.insert(
            "errors".to_string(),
            match &self.errors {
                Some(errors) => Value::Array(errors.iter().map(ServiceError::to_value).collect()),
                None => Value::Null,
            },
        );
        Value::Object(map)
    }
}
