// Copyright 2025 Cowboy AI, LLC.

//! Runs the demo workflows through the in-memory broker

use anyhow::{Context, Result};
use cim_saga::demo::{demo_system, greeting_contract, greeting_resumable_contract, greeting_service};
use cim_saga::demo::{add_service, fibonacci_service};
use cim_saga::{SagaConfig, Subject, WorkflowEvent};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CLIENT: &str = "cim-saga-demo";

#[derive(Debug, Parser)]
#[command(name = "cim-saga-demo", about = "Run the cim-saga demo workflows")]
struct Args {
    /// Configuration file (CIM_SAGA__* variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the declarative greeting workflow
    Greeting {
        #[arg(long, default_value = "John")]
        name: String,
        #[arg(long, default_value_t = 45.0)]
        age: f64,
    },
    /// Run the resumable greeting workflow (nests the declarative one)
    Resumable {
        #[arg(long, default_value = "John")]
        name: String,
        #[arg(long, default_value_t = 45.0)]
        age: f64,
    },
    /// Call the calculator service directly
    Add {
        #[arg(required = false)]
        numbers: Vec<f64>,
    },
    /// Call the fibonacci service directly
    Fibonacci {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Print every contract with its JSON schema
    Contracts,
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn request(kind: &str, data: Value) -> WorkflowEvent {
    WorkflowEvent::new(kind, Subject::new(), data).with_source(CLIENT)
}

fn print_contracts() -> Result<()> {
    let contracts = json!({
        "orchestrators": [greeting_contract(), greeting_resumable_contract()],
        "services": [
            greeting_service().contract(),
            add_service().contract(),
            fibonacci_service().contract(),
        ],
    });
    println!("{}", serde_json::to_string_pretty(&contracts)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let event = match args.command {
        Command::Contracts => return print_contracts(),
        Command::Greeting { name, age } => request("orc.greeting", json!({"name": name, "age": age})),
        Command::Resumable { name, age } => {
            request("orc.greeting.resumable", json!({"name": name, "age": age}))
        }
        Command::Add { numbers } => request("com.calculator.add", json!({"numbers": numbers})),
        Command::Fibonacci { limit } => request("com.fibonacci.series", json!({"limit": limit})),
    };

    let config = SagaConfig::load(args.config.as_deref()).context("loading configuration")?;
    let demo = demo_system(&config).context("assembling demo handlers")?;

    info!(kind = %event.kind, subject = %event.subject, "Resolving request");
    let answer = demo
        .broker
        .resolve(event)
        .await
        .context("resolving request")?;

    match answer {
        Some(event) => {
            info!(kind = %event.kind, "Received answer");
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        None => println!("no answer"),
    }
    Ok(())
}
