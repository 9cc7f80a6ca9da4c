// Copyright 2025 Cowboy AI, LLC.

//! Demo workloads wired into an in-memory broker

mod greeting;
mod handlers;

pub use greeting::{
    greeting_contract, greeting_machine, greeting_models, greeting_resumable,
    greeting_resumable_contract, GreetingContext, GreetingWorkflowInput, ResumableGreetingContext,
    GREETING_VERSION,
};
pub use handlers::{
    add_service, fibonacci_service, greeting_service, AddRequest, AddResponse, FibonacciRequest,
    FibonacciResponse, GreetingRequest, GreetingResponse, MAX_FIBONACCI_LIMIT,
};

use crate::broker::SimpleEventBroker;
use crate::config::SagaConfig;
use crate::engine::Orchestrator;
use crate::errors::ConfigError;
use crate::persistence::{InMemoryStateStore, StateStore};
use std::sync::Arc;

/// Everything the demo registers, with handles for inspection
pub struct DemoSystem {
    /// Broker with every demo handler registered
    pub broker: SimpleEventBroker,
    /// The declarative `greeting` workflow
    pub greeting: Arc<Orchestrator>,
    /// The imperative `greeting.resumable` workflow
    pub resumable: Arc<Orchestrator>,
    /// State store shared by both workflows
    pub store: Arc<InMemoryStateStore>,
}

/// Build the demo system from configuration
pub fn demo_system(config: &SagaConfig) -> Result<DemoSystem, ConfigError> {
    let store = Arc::new(InMemoryStateStore::new());
    let shared: Arc<dyn StateStore> = store.clone();

    let greeting = Arc::new(
        Orchestrator::builder(greeting_contract())
            .model(greeting_machine()?)
            .config(config.orchestrator.clone())
            .store(shared.clone())
            .build()?,
    );
    let resumable = Arc::new(
        Orchestrator::builder(greeting_resumable_contract())
            .model(greeting_resumable()?)
            .config(config.orchestrator.clone())
            .store(shared)
            .build()?,
    );

    let broker = SimpleEventBroker::new(config.broker.clone())
        .with_handler(Arc::new(greeting_service()))
        .and_then(|b| b.with_handler(Arc::new(add_service())))
        .and_then(|b| b.with_handler(Arc::new(fibonacci_service())))
        .and_then(|b| b.with_handler(greeting.clone()))
        .and_then(|b| b.with_handler(resumable.clone()))
        .map_err(|e| ConfigError::InvalidDefinition(e.to_string()))?;

    Ok(DemoSystem {
        broker,
        greeting,
        resumable,
        store,
    })
}
