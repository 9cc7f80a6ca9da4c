// Copyright 2025 Cowboy AI, LLC.

//! The greeting workflows
//!
//! `greeting` is declarative: two parallel regions call the greeting and
//! calculator services. `greeting.resumable` does the same work imperatively
//! and also runs `greeting` as a nested workflow to compare results.

use super::handlers::{add_service, greeting_service, AddResponse, GreetingResponse};
use crate::contracts::{OrchestratorContract, ServiceContract};
use crate::engine::ExecutionModel;
use crate::errors::{ConfigError, ModelError};
use crate::events::{ServiceCall, ServiceError, WorkflowOutput};
use crate::machine::{ParallelMachine, Region};
use crate::resumable::{Resumable, ResumableInput, Resume};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Version of both greeting workflows
pub const GREETING_VERSION: &str = "1.0.0";

/// Init payload of both greeting workflows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GreetingWorkflowInput {
    /// Who to greet
    pub name: String,
    /// Current age
    pub age: f64,
}

/// Context of the declarative greeting machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingContext {
    /// Who to greet
    pub name: String,
    /// Current age
    pub age: f64,
    /// Greeting once received
    pub greeting: Option<String>,
    /// Age plus seven once received
    pub updated_age: Option<f64>,
}

/// Context of the resumable greeting workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumableGreetingContext {
    /// Who to greet
    pub name: String,
    /// Current age
    pub age: f64,
}

/// Contract of the declarative greeting workflow
pub fn greeting_contract() -> OrchestratorContract {
    OrchestratorContract::new("greeting", [GREETING_VERSION]).with_init_schema::<GreetingWorkflowInput>()
}

/// Contract of the resumable greeting workflow
pub fn greeting_resumable_contract() -> OrchestratorContract {
    OrchestratorContract::new("greeting.resumable", [GREETING_VERSION])
        .with_init_schema::<GreetingWorkflowInput>()
}

fn summary(greeting: &str, age: f64) -> String {
    format!("Greeting -> {greeting}, Updated Age -> {age}")
}

/// The declarative greeting machine
pub fn greeting_machine() -> Result<ParallelMachine<GreetingWorkflowInput, GreetingContext>, ConfigError> {
    let greet = Region::new("greet", "com.greeting.create", |ctx: &GreetingContext| {
        json!({ "name": ctx.name })
    })
    .on_success("evt.greeting.create.success", |ctx: &mut GreetingContext, event| {
        ctx.greeting = Some(event.data_as::<GreetingResponse>()?.greeting);
        Ok(())
    })
    .on_error("sys.com.greeting.create.error");

    let add = Region::new("add", "com.calculator.add", |ctx: &GreetingContext| {
        json!({ "numbers": [7.0, ctx.age] })
    })
    .on_success("evt.calculator.add.success", |ctx: &mut GreetingContext, event| {
        ctx.updated_age = Some(event.data_as::<AddResponse>()?.result);
        Ok(())
    })
    .on_error("sys.com.calculator.add.error");

    ParallelMachine::builder(&greeting_contract(), GREETING_VERSION)
        .service(greeting_service().contract().clone())
        .service(add_service().contract().clone())
        .context(|input: GreetingWorkflowInput| {
            Ok(GreetingContext {
                name: input.name,
                age: input.age,
                greeting: None,
                updated_age: None,
            })
        })
        .region(greet)
        .region(add)
        .output(|ctx: &GreetingContext| match (&ctx.greeting, ctx.updated_age) {
            (Some(greeting), Some(age)) => Ok(json!(summary(greeting, age))),
            _ => Err(ModelError::handler("greeting machine finished without both results")),
        })
        .build()
}

fn greeting_resumable_services() -> Vec<ServiceContract> {
    vec![
        add_service().contract().clone(),
        greeting_service().contract().clone(),
        greeting_contract().as_service(),
    ]
}

/// The imperative greeting workflow
pub fn greeting_resumable() -> Result<Resumable<GreetingWorkflowInput, ResumableGreetingContext>, ConfigError> {
    let services = greeting_resumable_services();
    let nested = greeting_contract();
    let (add_kind, greet_kind, nested_kind) = (
        "evt.calculator.add.success",
        "evt.greeting.create.success",
        nested.done_kind(),
    );
    let error_kinds: Vec<String> = services.iter().map(|s| s.system_error().to_string()).collect();

    Resumable::new(
        &greeting_resumable_contract(),
        GREETING_VERSION,
        services,
        move |step: ResumableInput<'_, GreetingWorkflowInput, ResumableGreetingContext>| {
            if let Some(service) = step.service {
                if error_kinds.contains(&service.kind) {
                    // keep the dependency's name and stack, only prefix the message
                    let cause = service
                        .service_error()
                        .unwrap_or_else(|| ServiceError::from_message(service.kind.clone()));
                    return Ok(Resume::Fail(vec![ServiceError {
                        error_message: format!("Service execution failed: {}", cause.error_message),
                        ..cause
                    }]));
                }
                if service.kind == nested_kind {
                    let output: WorkflowOutput = service.data_as()?;
                    if let Some(errors) = output.errors() {
                        return Ok(Resume::Fail(errors.to_vec()));
                    }
                }
            }

            if let Some(input) = step.input {
                let calls = vec![
                    ServiceCall::new("com.calculator.add", json!({ "numbers": [input.age, 7.0] })),
                    ServiceCall::new("com.greeting.create", json!({ "name": input.name })),
                    ServiceCall::new(
                        nested.init_kind(),
                        json!({ "name": input.name, "age": input.age }),
                    ),
                ];
                return Ok(Resume::Continue {
                    context: ResumableGreetingContext {
                        name: input.name,
                        age: input.age,
                    },
                    calls,
                });
            }

            if !step.collected.has_all(&[add_kind, greet_kind, nested_kind.as_str()]) {
                return Ok(Resume::Wait);
            }

            let (Some(added), Some(greeted), Some(done)) = (
                step.collected.first(add_kind),
                step.collected.first(greet_kind),
                step.collected.first(&nested_kind),
            ) else {
                return Ok(Resume::Wait);
            };
            let age = added.data_as::<AddResponse>()?.result;
            let greeting = greeted.data_as::<GreetingResponse>()?.greeting;
            let result = summary(&greeting, age);
            let same = done.data.get("result").and_then(|v| v.as_str()) == Some(result.as_str());

            Ok(Resume::Complete(
                WorkflowOutput::success(result).with_extension("sameResultFromWorkflow", same),
            ))
        },
    )
}

/// Every greeting model, for listing contracts
pub fn greeting_models() -> Result<Vec<Box<dyn ExecutionModel>>, ConfigError> {
    Ok(vec![Box::new(greeting_machine()?), Box::new(greeting_resumable()?)])
}
