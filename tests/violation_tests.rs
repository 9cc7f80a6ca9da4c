// Copyright 2025 Cowboy AI, LLC.

//! Fatal violations versus recoverable errors

use cim_saga::demo::{add_service, demo_system, greeting_contract, greeting_machine, greeting_service};
use cim_saga::{
    ConfigError, Orchestrator, OrchestratorConfig, OrchestratorContract, RetentionPolicy, SagaConfig,
    Subject, WorkflowEvent,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;
use tokio_test::{assert_err, assert_ok};

fn orchestrator(retention: RetentionPolicy) -> Orchestrator {
    Orchestrator::builder(greeting_contract())
        .model(greeting_machine().unwrap())
        .config(OrchestratorConfig {
            retention,
            ..Default::default()
        })
        .build()
        .unwrap()
}

fn init(subject: &str, data: Value) -> WorkflowEvent {
    WorkflowEvent::new("orc.greeting", Subject::from(subject), data).with_source("client")
}

fn code(err: &cim_saga::OrchestrationError) -> Option<&'static str> {
    err.as_violation().map(|v| v.code())
}

#[test_case(json!({"name": "John", "age": 45}) ; "same payload")]
#[test_case(json!({"name": "Someone else", "age": 1}) ; "different payload")]
#[test_case(json!({"garbage": true}) ; "invalid payload")]
#[tokio::test]
async fn second_init_is_duplicate_regardless_of_payload(payload: Value) {
    let orc = orchestrator(RetentionPolicy::Archive);
    assert_ok!(orc.process(&init("S1", json!({"name": "John", "age": 45}))).await);
    let before = orc.instance(&Subject::from("S1")).await.unwrap();

    let err = assert_err!(orc.process(&init("S1", payload)).await);
    assert_eq!(code(&err), Some("duplicate-init"));
    assert!(err.is_violation());
    assert_eq!(orc.instance(&Subject::from("S1")).await.unwrap(), before);
}

#[tokio::test]
async fn init_on_subject_held_by_another_workflow_is_duplicate() {
    let demo = demo_system(&SagaConfig::default()).unwrap();
    let resumable = WorkflowEvent::new(
        "orc.greeting.resumable",
        Subject::from("S1"),
        json!({"name": "John", "age": 45}),
    )
    .with_source("client");
    assert_ok!(demo.resumable.process(&resumable).await);
    let before = demo.resumable.instance(&Subject::from("S1")).await.unwrap();

    let err = assert_err!(demo.greeting.process(&init("S1", json!({"name": "John", "age": 45}))).await);
    assert_eq!(code(&err), Some("duplicate-init"));
    assert_eq!(demo.resumable.instance(&Subject::from("S1")).await.unwrap(), before);
}

#[test_case("evt.greeting.create.success" ; "success kind")]
#[test_case("sys.com.calculator.add.error" ; "error kind")]
#[test_case("evt.unheard.of" ; "unknown kind")]
#[tokio::test]
async fn response_without_state_is_orphan(kind: &str) {
    let orc = orchestrator(RetentionPolicy::Archive);
    let event = WorkflowEvent::new(kind, Subject::from("nobody"), json!({}));

    let err = assert_err!(orc.process(&event).await);
    assert_eq!(code(&err), Some("orphan-response"));
    assert!(orc.instance(&Subject::from("nobody")).await.unwrap().is_none());
}

async fn finish(orc: &Orchestrator) -> Vec<WorkflowEvent> {
    let calls = orc.process(&init("S1", json!({"name": "John", "age": 45}))).await.unwrap();
    let mut responses = Vec::new();
    for call in &calls {
        let response = match call.kind.as_str() {
            "com.greeting.create" => greeting_service().handle(call),
            _ => add_service().handle(call),
        };
        orc.process(&response).await.unwrap();
        responses.push(response);
    }
    responses
}

#[tokio::test]
async fn archived_terminal_instance_ignores_redelivery() {
    let orc = orchestrator(RetentionPolicy::Archive);
    let responses = finish(&orc).await;
    let archived = orc.instance(&Subject::from("S1")).await.unwrap().unwrap();
    assert!(archived.is_terminal());

    for response in &responses {
        assert_eq!(assert_ok!(orc.process(response).await), vec![]);
    }
    assert_eq!(orc.instance(&Subject::from("S1")).await.unwrap(), Some(archived));
}

#[tokio::test]
async fn removed_terminal_instance_rejects_redelivery() {
    let orc = orchestrator(RetentionPolicy::Remove);
    let responses = finish(&orc).await;
    assert!(orc.instance(&Subject::from("S1")).await.unwrap().is_none());

    let err = assert_err!(orc.process(&responses[0]).await);
    assert_eq!(code(&err), Some("orphan-response"));
}

#[tokio::test]
async fn malformed_init_is_contract_violation() {
    let orc = orchestrator(RetentionPolicy::Archive);
    let err = assert_err!(orc.process(&init("S1", json!({"age": "old"}))).await);
    assert_eq!(code(&err), Some("contract-violation"));
    assert!(orc.instance(&Subject::from("S1")).await.unwrap().is_none());
}

#[tokio::test]
async fn malformed_response_is_contract_violation() {
    let orc = orchestrator(RetentionPolicy::Archive);
    let calls = orc.process(&init("S1", json!({"name": "John", "age": 45}))).await.unwrap();
    let add = calls.iter().find(|c| c.kind == "com.calculator.add").unwrap();
    let before = orc.instance(&Subject::from("S1")).await.unwrap();

    let bogus = add.reply("evt.calculator.add.success", json!({"result": "fifty-two"}));
    let err = assert_err!(orc.process(&bogus).await);
    assert_eq!(code(&err), Some("contract-violation"));
    assert_eq!(orc.instance(&Subject::from("S1")).await.unwrap(), before);
}

fn two_version_contract() -> OrchestratorContract {
    OrchestratorContract::new("greeting", ["1.0.0", "2.0.0"])
}

#[test]
fn declared_version_without_model_fails_build() {
    let err = Orchestrator::builder(two_version_contract())
        .model(greeting_machine().unwrap())
        .build()
        .err()
        .unwrap();
    assert_eq!(
        err,
        ConfigError::MissingVersion {
            workflow: "greeting".into(),
            version: "2.0.0".into()
        }
    );
}

#[tokio::test]
async fn unregistered_version_is_unsupported() {
    let orc = Orchestrator::builder(two_version_contract())
        .model(greeting_machine().unwrap())
        .allow_missing_versions(true)
        .build()
        .unwrap();

    let event = init("S1", json!({"name": "John", "age": 45})).with_version("2.0.0");
    let err = assert_err!(orc.process(&event).await);
    assert_eq!(code(&err), Some("unsupported-version"));

    let event = init("S2", json!({"name": "John", "age": 45})).with_version("1.0.0");
    assert_ok!(orc.process(&event).await);
}

#[tokio::test]
async fn broker_surfaces_violations() {
    let demo = demo_system(&SagaConfig::default()).unwrap();
    let orphan = WorkflowEvent::new("evt.greeting.create.success", Subject::from("nobody"), json!({}))
        .with_to("orc.greeting")
        .with_source("client");

    let err = assert_err!(demo.broker.resolve(orphan).await);
    assert_eq!(err.violation().map(|v| v.code()), Some("orphan-response"));
}

#[tokio::test]
async fn service_errors_are_data_not_violations() {
    let demo = demo_system(&SagaConfig::default()).unwrap();
    let call = WorkflowEvent::new("com.calculator.add", Subject::new(), json!({"numbers": []}))
        .with_source("client");

    let answer = assert_ok!(demo.broker.resolve(call).await).unwrap();
    assert_eq!(answer.kind, "sys.com.calculator.add.error");
    assert_eq!(answer.data["errorMessage"], "Numbers array cannot be empty");
}
