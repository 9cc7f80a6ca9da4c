// Copyright 2025 Cowboy AI, LLC.

//! Leaf services of the demo

use crate::events::ServiceError;
use crate::services::SimpleService;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest fibonacci series the service will produce
pub const MAX_FIBONACCI_LIMIT: u32 = 1000;

/// `com.greeting.create` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GreetingRequest {
    /// Who to greet
    pub name: String,
}

/// `evt.greeting.create.success` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GreetingResponse {
    /// The greeting
    pub greeting: String,
}

/// `com.calculator.add` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AddRequest {
    /// Addends
    pub numbers: Vec<f64>,
}

/// `evt.calculator.add.success` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AddResponse {
    /// Sum of the addends
    pub result: f64,
}

/// `com.fibonacci.series` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FibonacciRequest {
    /// Length of the series
    pub limit: u32,
}

/// `evt.fibonacci.series.success` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FibonacciResponse {
    /// The series, starting at 0
    pub series: Vec<f64>,
}

/// Greets by name
pub fn greeting_service() -> SimpleService<GreetingRequest, GreetingResponse> {
    SimpleService::new("greeting.create", |req: GreetingRequest| {
        Ok(GreetingResponse {
            greeting: format!("Hello, {}!", req.name),
        })
    })
}

/// Sums a non-empty list of numbers
pub fn add_service() -> SimpleService<AddRequest, AddResponse> {
    SimpleService::new("calculator.add", |req: AddRequest| {
        if req.numbers.is_empty() {
            return Err(ServiceError::from_message("Numbers array cannot be empty"));
        }
        Ok(AddResponse {
            result: req.numbers.iter().sum(),
        })
    })
}

/// Generates the first `limit` fibonacci numbers
pub fn fibonacci_service() -> SimpleService<FibonacciRequest, FibonacciResponse> {
    SimpleService::new("fibonacci.series", |req: FibonacciRequest| {
        Ok(FibonacciResponse {
            series: fibonacci(req.limit)?,
        })
    })
}

fn fibonacci(limit: u32) -> Result<Vec<f64>, ServiceError> {
    if limit == 0 {
        return Err(ServiceError::from_message("Limit must be greater than 0"));
    }
    if limit > MAX_FIBONACCI_LIMIT {
        return Err(ServiceError::new(
            "ValidationError",
            format!("Limit must not exceed {MAX_FIBONACCI_LIMIT}"),
        ));
    }
    let mut series = Vec::with_capacity(limit as usize);
    let (mut a, mut b) = (0.0_f64, 1.0_f64);
    for _ in 0..limit {
        series.push(a);
        (a, b) = (b, a + b);
    }
    Ok(series)
}
