// Copyright 2025 Cowboy AI, LLC.

//! In-memory event routing
//!
//! [`SimpleEventBroker`] stands in for a real transport in tests and the demo
//! binary. It delivers every event to the handler whose source equals the
//! event's `to` field and keeps going until something answers the caller.

use crate::config::BrokerConfig;
use crate::errors::{BrokerError, OrchestrationResult};
use crate::events::WorkflowEvent;
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Anything the broker can deliver events to
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Routing name; events with a matching `to` are delivered here
    fn source(&self) -> &str;

    /// Handle one event and return the events it emits
    async fn execute(&self, event: WorkflowEvent) -> OrchestrationResult<Vec<WorkflowEvent>>;
}

/// In-memory router between registered handlers
pub struct SimpleEventBroker {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
    config: BrokerConfig,
}

impl SimpleEventBroker {
    /// Create a broker without handlers
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register a handler under its source name
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) -> Result<(), BrokerError> {
        let source = handler.source().to_string();
        if self.handlers.contains_key(&source) {
            return Err(BrokerError::DuplicateHandler(source));
        }
        debug!(source = %source, "Registered handler");
        self.handlers.insert(source, handler);
        Ok(())
    }

    /// Register a handler, builder style
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Result<Self, BrokerError> {
        self.register(handler)?;
        Ok(self)
    }

    /// Registered source names, sorted
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }

    /// Route `event` and everything it causes until an event comes back to
    /// `event.source`
    ///
    /// Returns `None` when the traffic dies out without an answer. Events in
    /// the same wave are handled concurrently.
    #[instrument(skip_all, fields(kind = %event.kind, subject = %event.subject, origin = %event.source))]
    pub async fn resolve(&self, event: WorkflowEvent) -> Result<Option<WorkflowEvent>, BrokerError> {
        let origin = event.source.clone();
        let mut routed = 0usize;
        let mut wave = vec![event];
        let mut first_wave = true;

        while !wave.is_empty() {
            let mut deliveries = Vec::with_capacity(wave.len());
            for event in wave.drain(..) {
                if !first_wave && event.to == origin {
                    debug!(kind = %event.kind, routed, "Resolved");
                    return Ok(Some(event));
                }
                match self.handlers.get(&event.to) {
                    Some(handler) => deliveries.push((handler.clone(), event)),
                    None => warn!(kind = %event.kind, to = %event.to, "No handler for event, dropping"),
                }
            }
            first_wave = false;

            routed += deliveries.len();
            if routed > self.config.max_events {
                return Err(BrokerError::Exhausted(routed));
            }

            let results = join_all(deliveries.into_iter().map(|(handler, event)| async move {
                handler
                    .execute(event)
                    .await
                    .map_err(|source| BrokerError::Handler {
                        handler: handler.source().to_string(),
                        source,
                    })
            }))
            .await;

            for emitted in results {
                wave.extend(emitted?);
            }
        }

        debug!(routed, "Traffic ended without an answer");
        Ok(None)
    }
}

impl Default for SimpleEventBroker {
    fn default() -> Self {
        Self::new(BrokerConfig::default())
    }
}
