// Copyright 2025 Cowboy AI, LLC.

//! Contracts: the static vocabulary of event kinds
//!
//! A workflow only understands the kinds declared by the contracts of the
//! services it calls. Everything else addressed to it is ignored.
//!
//! Naming follows a fixed convention so that kinds can be derived from a
//! contract name:
//!
//! | contract | accepts | emits | system error |
//! |---|---|---|---|
//! | service `n` | `com.n` | `evt.n.success` | `sys.com.n.error` |
//! | orchestrator `w` | `orc.w` | `orc.w.done` | `sys.orc.w.error` |

use schemars::schema::RootSchema;
use schemars::JsonSchema;
use serde::Serialize;

/// Kind prefix of orchestrator init events
pub const ORCHESTRATOR_PREFIX: &str = "orc";

/// Build the system error kind for an accepted kind
pub fn system_error_kind(accepts: &str) -> String {
    format!("sys.{accepts}.error")
}

/// Whether a service is a leaf or another orchestration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContractKind {
    /// A leaf service answering with a single response
    Service,
    /// A nested workflow; calls to it open a child instance
    Orchestrator,
}

/// Contract of something a workflow can call
#[derive(Debug, Clone, Serialize)]
pub struct ServiceContract {
    accepts: String,
    emits: Vec<String>,
    system_error: String,
    kind: ContractKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepts_schema: Option<RootSchema>,
}

impl ServiceContract {
    /// A contract with explicit kinds
    pub fn new<I, S>(accepts: impl Into<String>, emits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let accepts = accepts.into();
        Self {
            system_error: system_error_kind(&accepts),
            emits: emits.into_iter().map(Into::into).collect(),
            accepts,
            kind: ContractKind::Service,
            accepts_schema: None,
        }
    }

    /// A request/response contract named `name`
    ///
    /// ```rust
    /// use cim_saga::ServiceContract;
    ///
    /// let add = ServiceContract::simple("calculator.add");
    /// assert_eq!(add.accepts(), "com.calculator.add");
    /// assert_eq!(add.emits(), ["evt.calculator.add.success"]);
    /// assert_eq!(add.system_error(), "sys.com.calculator.add.error");
    /// ```
    pub fn simple(name: &str) -> Self {
        Self::new(format!("com.{name}"), [format!("evt.{name}.success")])
    }

    /// Attach the JSON schema of the accepted payload
    pub fn with_accepts_schema<T: JsonSchema>(mut self) -> Self {
        self.accepts_schema = Some(schemars::schema_for!(T));
        self
    }

    /// Kind this contract accepts
    pub fn accepts(&self) -> &str {
        &self.accepts
    }

    /// Kinds emitted on success
    pub fn emits(&self) -> &[String] {
        &self.emits
    }

    /// Kind emitted when the service fails
    pub fn system_error(&self) -> &str {
        &self.system_error
    }

    /// Leaf service or nested workflow
    pub fn kind(&self) -> ContractKind {
        self.kind
    }

    /// Schema of the accepted payload, if declared
    pub fn accepts_schema(&self) -> Option<&RootSchema> {
        self.accepts_schema.as_ref()
    }

    /// Whether a call to this contract opens a child workflow
    pub fn is_orchestrator(&self) -> bool {
        self.kind == ContractKind::Orchestrator
    }

    /// Whether an event of `kind` answers a call to this contract
    pub fn resolves(&self, kind: &str) -> bool {
        self.is_error(kind) || self.emits.iter().any(|k| k == kind)
    }

    /// Whether `kind` is this contract's system error
    pub fn is_error(&self, kind: &str) -> bool {
        self.system_error == kind
    }

    /// All kinds that answer a call to this contract
    pub fn resolving_kinds(&self) -> Vec<String> {
        let mut kinds = self.emits.clone();
        kinds.push(self.system_error.clone());
        kinds
    }
}

/// Contract of an orchestration (declarative or imperative)
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorContract {
    name: String,
    versions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_schema: Option<RootSchema>,
}

impl OrchestratorContract {
    /// Create a contract for the workflow `name` with its declared versions
    pub fn new<I, S>(name: impl Into<String>, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            versions: versions.into_iter().map(Into::into).collect(),
            init_schema: None,
        }
    }

    /// Attach the JSON schema of the init payload
    pub fn with_init_schema<T: JsonSchema>(mut self) -> Self {
        self.init_schema = Some(schemars::schema_for!(T));
        self
    }

    /// Workflow name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared versions
    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// Kind of the initiating event; also the handler's source name
    pub fn init_kind(&self) -> String {
        format!("{ORCHESTRATOR_PREFIX}.{}", self.name)
    }

    /// Kind of the terminal event
    pub fn done_kind(&self) -> String {
        format!("{ORCHESTRATOR_PREFIX}.{}.done", self.name)
    }

    /// Kind of the system error event
    pub fn error_kind(&self) -> String {
        system_error_kind(&self.init_kind())
    }

    /// View this workflow as a callable service for parent workflows
    pub fn as_service(&self) -> ServiceContract {
        let mut contract = ServiceContract::new(self.init_kind(), [self.done_kind()]);
        contract.kind = ContractKind::Orchestrator;
        contract.accepts_schema = self.init_schema.clone();
        contract
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_contract_resolution() {
        let greet = ServiceContract::simple("greeting.create");
        assert!(greet.resolves("evt.greeting.create.success"));
        assert!(greet.resolves("sys.com.greeting.create.error"));
        assert!(greet.is_error("sys.com.greeting.create.error"));
        assert!(!greet.resolves("evt.calculator.add.success"));
        assert!(!greet.is_orchestrator());
    }

    #[test]
    fn test_orchestrator_kinds() {
        let contract = OrchestratorContract::new("greeting", ["1.0.0"]);
        assert_eq!(contract.init_kind(), "orc.greeting");
        assert_eq!(contract.done_kind(), "orc.greeting.done");
        assert_eq!(contract.error_kind(), "sys.orc.greeting.error");

        let service = contract.as_service();
        assert!(service.is_orchestrator());
        assert_eq!(service.accepts(), "orc.greeting");
        assert_eq!(
            service.resolving_kinds(),
            vec!["orc.greeting.done".to_string(), "sys.orc.greeting.error".to_string()]
        );
    }

    #[test]
    fn test_schema_attachment() {
        #[derive(JsonSchema)]
        #[allow(dead_code)]
        struct Add {
            numbers: Vec<f64>,
        }

        let contract = ServiceContract::simple("calculator.add").with_accepts_schema::<Add>();
        let schema = serde_json::to_value(contract.accepts_schema().unwrap()).unwrap();
        assert!(schema["properties"]["numbers"].is_object());
    }
}
