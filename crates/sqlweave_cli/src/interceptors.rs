//! Sample interceptors shipped with the probe.

use log::{info, warn};
use serde_json::Value;
use sqlweave_core::{
    executor, parse_property, CallError, CallResult, InterceptManifest, Interceptor,
    InterceptorFactories, Invocation, KernelError, Properties, PropertyError,
};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub const TIMING: &str = "timing";
pub const READ_ONLY: &str = "read_only";

/// Factories for every sample interceptor, keyed by configuration name.
pub fn builtin_factories() -> Result<InterceptorFactories, KernelError> {
    let mut factories = InterceptorFactories::new();
    factories.register(TIMING, || Box::new(TimingInterceptor::default()))?;
    factories.register(READ_ONLY, || Box::new(ReadOnlyGuard::default()))?;
    Ok(factories)
}

fn statement_id(invocation: &Invocation) -> &str {
    invocation
        .arg(0)
        .and_then(|statement| statement.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}

/// Logs the duration of every query and update; warns above `slow_ms`.
pub struct TimingInterceptor {
    slow_ms: u128,
}

impl Default for TimingInterceptor {
    fn default() -> Self {
        Self { slow_ms: 100 }
    }
}

impl Interceptor for TimingInterceptor {
    fn manifest(&self) -> InterceptManifest {
        InterceptManifest::new("builtin.timing")
            .intercept(executor::QUERY)
            .intercept(executor::UPDATE)
    }

    fn intercept(&self, invocation: &mut Invocation) -> CallResult {
        let started_at = Instant::now();
        let result = invocation.proceed();
        let duration_ms = started_at.elapsed().as_millis();
        let status = if result.is_ok() { "ok" } else { "error" };

        info!(
            "event=statement_timing module=cli status={} operation={} statement={} duration_ms={}",
            status,
            invocation.signature().name,
            statement_id(invocation),
            duration_ms
        );
        if duration_ms > self.slow_ms {
            warn!(
                "event=slow_statement module=cli statement={} duration_ms={} threshold_ms={}",
                statement_id(invocation),
                duration_ms,
                self.slow_ms
            );
        }
        result
    }

    fn configure(&mut self, properties: &Properties) -> Result<(), PropertyError> {
        if let Some(slow_ms) = parse_property::<u128>(properties, "slow_ms")? {
            self.slow_ms = slow_ms;
        }
        Ok(())
    }
}

/// Rejects updates except for explicitly allowed statement ids.
#[derive(Default)]
pub struct ReadOnlyGuard {
    allow: BTreeSet<String>,
    disabled: bool,
}

impl Interceptor for ReadOnlyGuard {
    fn manifest(&self) -> InterceptManifest {
        InterceptManifest::new("builtin.read_only").intercept(executor::UPDATE)
    }

    fn intercept(&self, invocation: &mut Invocation) -> CallResult {
        let statement = statement_id(invocation);
        if self.disabled || self.allow.contains(statement) {
            return invocation.proceed();
        }
        warn!(
            "event=update_vetoed module=cli status=error statement={}",
            statement
        );
        Err(CallError::operation(ReadOnlyViolation {
            statement: statement.to_string(),
        }))
    }

    fn configure(&mut self, properties: &Properties) -> Result<(), PropertyError> {
        if let Some(enabled) = parse_property::<bool>(properties, "enabled")? {
            self.disabled = !enabled;
        }
        if let Some(raw) = properties.get("allow") {
            self.allow = raw
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }
}

/// Update rejected by `ReadOnlyGuard`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOnlyViolation {
    pub statement: String,
}

impl Display for ReadOnlyViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "update `{}` rejected in read-only mode", self.statement)
    }
}

impl Error for ReadOnlyViolation {}
