// Copyright 2025 Cowboy AI, LLC.

//! Leaf services
//!
//! A [`SimpleService`] wraps a typed request/response function. Failures are
//! never thrown: a bad payload or a handler error becomes the contract's
//! `sys.com.*.error` event addressed back to the caller.

use crate::broker::EventHandler;
use crate::contracts::ServiceContract;
use crate::errors::OrchestrationResult;
use crate::events::{ServiceError, WorkflowEvent};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{debug, warn};

type Handler<I, O> = Box<dyn Fn(I) -> Result<O, ServiceError> + Send + Sync>;

/// Typed request/response service
pub struct SimpleService<I, O> {
    contract: ServiceContract,
    handler: Handler<I, O>,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> SimpleService<I, O>
where
    I: DeserializeOwned + JsonSchema,
    O: Serialize,
{
    /// Create the service `name` (accepting `com.<name>`)
    pub fn new<F>(name: &str, handler: F) -> Self
    where
        F: Fn(I) -> Result<O, ServiceError> + Send + Sync + 'static,
    {
        Self {
            contract: ServiceContract::simple(name).with_accepts_schema::<I>(),
            handler: Box::new(handler),
            _types: PhantomData,
        }
    }

    /// The service contract
    pub fn contract(&self) -> &ServiceContract {
        &self.contract
    }

    /// Answer one call
    pub fn handle(&self, event: &WorkflowEvent) -> WorkflowEvent {
        match self.invoke(event) {
            Ok((kind, data)) => {
                debug!(subject = %event.subject, kind = %kind, "Service succeeded");
                event.reply(kind, data)
            }
            Err(error) => {
                warn!(subject = %event.subject, service = %self.contract.accepts(), error = %error, "Service failed");
                event.reply(self.contract.system_error(), error.to_value())
            }
        }
    }

    fn invoke(&self, event: &WorkflowEvent) -> Result<(String, serde_json::Value), ServiceError> {
        let input: I = event
            .data_as()
            .map_err(|v| ServiceError::new("ValidationError", v.to_string()))?;
        let output = (self.handler)(input)?;
        let data = serde_json::to_value(output)
            .map_err(|e| ServiceError::new("SerializationError", e.to_string()))?;
        let kind = self
            .contract
            .emits()
            .first()
            .cloned()
            .unwrap_or_else(|| self.contract.system_error().to_string());
        Ok((kind, data))
    }
}

#[async_trait]
impl<I, O> EventHandler for SimpleService<I, O>
where
    I: DeserializeOwned + JsonSchema,
    O: Serialize,
{
    fn source(&self) -> &str {
        self.contract.accepts()
    }

    async fn execute(&self, event: WorkflowEvent) -> OrchestrationResult<Vec<WorkflowEvent>> {
        Ok(vec![self.handle(&event)])
    }
}
