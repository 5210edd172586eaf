//! CLI smoke probe for the interception chain.
//!
//! # Responsibility
//! - Assemble a plugin chain from configuration (or the built-in default).
//! - Run a short statement script through a wrapped SQLite executor.
//! - Keep output deterministic for quick local sanity checks.

mod interceptors;
mod sqlite_executor;

use clap::Parser;
use interceptors::builtin_factories;
use serde_json::{json, Value};
use sqlite_executor::SqliteExecutor;
use sqlweave_core::{build_chain, executor, init_logging, PluginsConfig, Target, TargetExt};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

const DEFAULT_CONFIG: &str = r#"{
    "variables": { "slow_ms": "50" },
    "plugins": [
        { "interceptor": "timing", "properties": { "slow_ms": "${slow_ms}" } },
        { "interceptor": "read_only", "properties": { "allow": "createAccounts,seedAccount" } }
    ]
}"#;

#[derive(Debug, Parser)]
#[command(name = "sqlweave", version, about = "Run a statement script through the plugin chain")]
struct Args {
    /// Plugin configuration file (JSON). Uses a built-in chain when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Log level: trace|debug|info|warn|error.
    #[arg(long, default_value = sqlweave_core::default_log_level())]
    log_level: String,
    /// Absolute directory for rotating log files. Logging stays off when omitted.
    #[arg(long)]
    log_dir: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sqlweave error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    if let Some(log_dir) = &args.log_dir {
        init_logging(&args.log_level, log_dir)?;
    }

    let config = match &args.config {
        Some(path) => PluginsConfig::from_path(path)?,
        None => PluginsConfig::from_json(DEFAULT_CONFIG)?,
    };
    let chain = build_chain(&config, &builtin_factories()?)?;

    println!("sqlweave_core version={}", sqlweave_core::core_version());
    for entry in chain.interceptors() {
        println!(
            "plugin id={} operations={}",
            entry.id(),
            entry.signature_map().len()
        );
    }

    let target: Arc<dyn Target> = Arc::new(SqliteExecutor::open_in_memory()?);
    let wrapped = chain.apply_all(target);

    update(
        &wrapped,
        "createAccounts",
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT, balance INTEGER)",
        Value::Null,
    )?;
    update(
        &wrapped,
        "seedAccount",
        "INSERT INTO accounts (owner, balance) VALUES (?1, ?2)",
        json!(["ada", 120]),
    )?;
    match update(&wrapped, "purgeAccounts", "DELETE FROM accounts", Value::Null) {
        Ok(changed) => println!("purgeAccounts changed={changed}"),
        Err(err) => println!("purgeAccounts rejected: {err}"),
    }

    let rows = wrapped.invoke(
        executor::QUERY,
        vec![
            statement("selectAccounts", "SELECT owner, balance FROM accounts"),
            Value::Null,
            json!({ "offset": 0, "limit": 100 }),
            Value::Null,
        ],
    )?;
    println!("selectAccounts rows={rows}");

    wrapped.invoke(executor::CLOSE, vec![json!(false)])?;
    println!(
        "closed={}",
        wrapped.invoke(executor::IS_CLOSED, vec![])?
    );
    Ok(())
}

fn statement(id: &str, sql: &str) -> Value {
    json!({ "id": id, "sql": sql })
}

fn update(
    target: &Arc<dyn Target>,
    id: &str,
    sql: &str,
    parameter: Value,
) -> Result<Value, sqlweave_core::CallError> {
    let changed = target.invoke(executor::UPDATE, vec![statement(id, sql), parameter])?;
    println!("{id} changed={changed}");
    Ok(changed)
}
