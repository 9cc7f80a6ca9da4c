// Copyright 2025 Cowboy AI, LLC.

//! Declarative greeting workflow, driven event by event

use cim_saga::demo::{add_service, demo_system, greeting_contract, greeting_machine, greeting_service};
use cim_saga::{
    EventHandler, Orchestrator, OrchestratorConfig, SagaConfig, ServiceError, Subject, WorkflowEvent,
    WorkflowStatus,
};
use chrono::{Duration, Utc};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;

fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
    Orchestrator::builder(greeting_contract())
        .model(greeting_machine().unwrap())
        .config(config)
        .build()
        .unwrap()
}

fn init(subject: &str, name: &str, age: f64) -> WorkflowEvent {
    WorkflowEvent::new("orc.greeting", Subject::from(subject), json!({"name": name, "age": age}))
        .with_source("client")
}

fn call<'a>(calls: &'a [WorkflowEvent], kind: &str) -> &'a WorkflowEvent {
    calls.iter().find(|c| c.kind == kind).unwrap()
}

#[tokio::test]
async fn init_emits_one_call_per_region() {
    let orc = orchestrator(OrchestratorConfig::default());
    let calls = orc.process(&init("S1", "John", 45.0)).await.unwrap();

    assert_eq!(calls.len(), 2);
    let greet = call(&calls, "com.greeting.create");
    let add = call(&calls, "com.calculator.add");
    assert_eq!(greet.data, json!({"name": "John"}));
    assert_eq!(add.data, json!({"numbers": [7.0, 45.0]}));
    for c in &calls {
        assert_eq!(c.subject, Subject::from("S1"));
        assert_eq!(c.source, "orc.greeting");
        assert!(c.parent_subject.is_none());
    }

    let instance = orc.instance(&Subject::from("S1")).await.unwrap().unwrap();
    assert_eq!(instance.status, WorkflowStatus::Pending);
    assert_eq!(instance.outstanding.len(), 2);
    assert!(instance.collected_events.is_empty());
}

#[test_case(true ; "add first")]
#[test_case(false ; "greeting first")]
#[tokio::test]
async fn completes_in_either_arrival_order(add_first: bool) {
    let orc = orchestrator(OrchestratorConfig::default());
    let calls = orc.process(&init("S1", "John", 45.0)).await.unwrap();

    let added = add_service().handle(call(&calls, "com.calculator.add"));
    let greeted = greeting_service().handle(call(&calls, "com.greeting.create"));
    assert_eq!(added.data, json!({"result": 52.0}));

    let (first, second) = if add_first { (added, greeted) } else { (greeted, added) };
    assert!(orc.process(&first).await.unwrap().is_empty());
    let emitted = orc.process(&second).await.unwrap();

    assert_eq!(emitted.len(), 1);
    let done = &emitted[0];
    assert_eq!(done.kind, "orc.greeting.done");
    assert_eq!(done.to, "client");
    assert_eq!(done.subject, Subject::from("S1"));
    assert_eq!(
        done.data,
        json!({"result": "Greeting -> Hello, John!, Updated Age -> 52", "errors": null})
    );

    let instance = orc.instance(&Subject::from("S1")).await.unwrap().unwrap();
    assert_eq!(instance.status, WorkflowStatus::Complete);
    assert!(instance.all_calls_resolved());
    assert_eq!(instance.collected_events.total(), 2);
}

#[tokio::test]
async fn add_error_fails_with_that_error() {
    let orc = orchestrator(OrchestratorConfig::default());
    let calls = orc.process(&init("S1", "John", 45.0)).await.unwrap();

    let error = ServiceError::from_message("Numbers array cannot be empty");
    let failed = call(&calls, "com.calculator.add").reply("sys.com.calculator.add.error", error.to_value());
    let emitted = orc.process(&failed).await.unwrap();

    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].kind, "orc.greeting.done");
    assert_eq!(emitted[0].data["result"], Value::Null);
    assert_eq!(emitted[0].data["errors"], json!([error.to_value()]));

    // the greeting still in flight no longer matters
    let late = greeting_service().handle(call(&calls, "com.greeting.create"));
    assert!(orc.process(&late).await.unwrap().is_empty());

    let instance = orc.instance(&Subject::from("S1")).await.unwrap().unwrap();
    assert_eq!(instance.status, WorkflowStatus::Errored);
    assert_eq!(instance.errors, vec![error]);
    assert_eq!(instance.collected_events.total(), 1);
}

#[tokio::test]
async fn unrelated_kind_leaves_state_untouched() {
    let orc = orchestrator(OrchestratorConfig::default());
    orc.process(&init("S1", "John", 45.0)).await.unwrap();
    let before = orc.instance(&Subject::from("S1")).await.unwrap();

    let stray = WorkflowEvent::new("evt.fibonacci.series.success", Subject::from("S1"), json!({}));
    assert!(orc.process(&stray).await.unwrap().is_empty());
    assert_eq!(orc.instance(&Subject::from("S1")).await.unwrap(), before);
}

#[tokio::test]
async fn expired_calls_fail_the_workflow() {
    let orc = orchestrator(OrchestratorConfig {
        call_timeout_secs: Some(5),
        ..Default::default()
    });
    let calls = orc.process(&init("S1", "John", 45.0)).await.unwrap();
    orc.process(&greeting_service().handle(call(&calls, "com.greeting.create")))
        .await
        .unwrap();

    assert!(orc.sweep_expired(Utc::now()).await.unwrap().is_empty());

    let emitted = orc.sweep_expired(Utc::now() + Duration::seconds(6)).await.unwrap();
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].kind, "orc.greeting.done");
    assert_eq!(emitted[0].data["errors"][0]["errorName"], "TimeoutError");

    let instance = orc.instance(&Subject::from("S1")).await.unwrap().unwrap();
    assert_eq!(instance.status, WorkflowStatus::Errored);

    // a response after the deadline is discarded
    let late = add_service().handle(call(&calls, "com.calculator.add"));
    assert!(orc.process(&late).await.unwrap().is_empty());
    assert!(orc.sweep_expired(Utc::now() + Duration::seconds(60)).await.unwrap().is_empty());
}

#[tokio::test]
async fn broker_resolves_greeting_end_to_end() {
    let demo = demo_system(&SagaConfig::default()).unwrap();
    assert_eq!(demo.greeting.source(), "orc.greeting");

    let answer = demo.broker.resolve(init("S1", "Jane", 30.0)).await.unwrap().unwrap();
    assert_eq!(answer.kind, "orc.greeting.done");
    assert_eq!(answer.to, "client");
    assert_eq!(answer.data["result"], "Greeting -> Hello, Jane!, Updated Age -> 37");
}

#[tokio::test]
async fn independent_subjects_run_concurrently() {
    let demo = demo_system(&SagaConfig::default()).unwrap();

    let answers = join_all((0..16).map(|i| {
        let broker = &demo.broker;
        async move {
            broker
                .resolve(init(&format!("S{i}"), &format!("N{i}"), f64::from(i)))
                .await
        }
    }))
    .await;

    for (i, answer) in answers.into_iter().enumerate() {
        let answer = answer.unwrap().unwrap();
        assert_eq!(answer.subject, Subject::from(format!("S{i}")));
        assert_eq!(
            answer.data["result"],
            format!("Greeting -> Hello, N{i}!, Updated Age -> {}", i + 7)
        );
    }
    assert_eq!(demo.store.len().await, 16);
}
