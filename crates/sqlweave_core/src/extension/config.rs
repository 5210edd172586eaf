//! Declarative plugin configuration.
//!
//! # Responsibility
//! - Parse plugin lists from JSON configuration.
//! - Resolve `${name}` / `${name:default}` placeholders in property values.
//! - Build an `InterceptorChain` from named interceptor factories.
//!
//! # Invariants
//! - Chain order equals configuration order.
//! - Properties are applied before the interceptor is registered.

use crate::extension::kernel::{Interceptor, InterceptorChain, KernelError};
use crate::extension::manifest::is_valid_interceptor_id;
use log::info;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Key/value options handed to `Interceptor::configure`.
pub type Properties = BTreeMap<String, String>;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.\-]+)(?::([^}]*))?\}").expect("valid placeholder regex")
});

/// Root configuration record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Values available to `${name}` placeholders.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Plugins in chain order.
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// One configured plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Factory name registered in `InterceptorFactories`.
    pub interceptor: String,
    #[serde(default)]
    pub properties: Properties,
}

impl PluginsConfig {
    pub fn from_json(raw: &str) -> Result<Self, KernelError> {
        serde_json::from_str(raw).map_err(|err| KernelError::InvalidConfig(err.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, KernelError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            KernelError::InvalidConfig(format!("failed to read `{}`: {err}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Properties of one plugin with placeholders resolved.
    pub fn resolved_properties(&self, plugin: &PluginConfig) -> Properties {
        plugin
            .properties
            .iter()
            .map(|(name, value)| {
                (
                    name.clone(),
                    resolve_placeholders(value, &self.variables),
                )
            })
            .collect()
    }
}

/// Replaces `${name}` with `variables[name]`, falling back to the inline
/// default of `${name:default}`. Unknown names without a default stay as
/// written.
pub fn resolve_placeholders(value: &str, variables: &BTreeMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(value, |caps: &Captures<'_>| {
            if let Some(found) = variables.get(&caps[1]) {
                return found.clone();
            }
            match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Reads one optional typed property.
pub fn parse_property<T: FromStr>(
    properties: &Properties,
    name: &str,
) -> Result<Option<T>, PropertyError> {
    let Some(raw) = properties.get(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| PropertyError::new(name, format!("cannot parse `{raw}`")))
}

/// Rejected interceptor property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyError {
    pub name: String,
    pub reason: String,
}

impl PropertyError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl Display for PropertyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "property `{}`: {}", self.name, self.reason)
    }
}

impl Error for PropertyError {}

type Factory = Box<dyn Fn() -> Box<dyn Interceptor> + Send + Sync>;

/// Named interceptor constructors referenced by configuration.
#[derive(Default)]
pub struct InterceptorFactories {
    factories: BTreeMap<String, Factory>,
}

impl InterceptorFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F) -> Result<(), KernelError>
    where
        F: Fn() -> Box<dyn Interceptor> + Send + Sync + 'static,
    {
        let name = name.trim();
        if !is_valid_interceptor_id(name) {
            return Err(KernelError::InvalidFactoryName(name.to_string()));
        }
        if self.factories.contains_key(name) {
            return Err(KernelError::DuplicateFactory(name.to_string()));
        }
        self.factories.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// Sorted factory names.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    fn create(&self, name: &str) -> Result<Box<dyn Interceptor>, KernelError> {
        self.factories
            .get(name.trim())
            .map(|factory| factory())
            .ok_or_else(|| KernelError::UnknownInterceptor(name.trim().to_string()))
    }
}

/// Builds a chain from configuration: create, configure, register, in order.
pub fn build_chain(
    config: &PluginsConfig,
    factories: &InterceptorFactories,
) -> Result<InterceptorChain, KernelError> {
    let mut chain = InterceptorChain::new();
    for plugin in &config.plugins {
        let mut interceptor = factories.create(&plugin.interceptor)?;
        let properties = config.resolved_properties(plugin);
        interceptor
            .configure(&properties)
            .map_err(|source| KernelError::InvalidProperty {
                interceptor: plugin.interceptor.trim().to_string(),
                source,
            })?;
        chain.register(Arc::from(interceptor))?;
    }
    info!(
        "event=chain_build module=extension status=ok plugins={}",
        chain.len()
    );
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::{parse_property, resolve_placeholders, Properties, PropertyError};
    use std::collections::BTreeMap;

    fn variables() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("slow_ms".to_string(), "250".to_string()),
            ("env".to_string(), "prod".to_string()),
        ])
    }

    #[test]
    fn resolves_known_placeholders() {
        assert_eq!(resolve_placeholders("${slow_ms}", &variables()), "250");
        assert_eq!(
            resolve_placeholders("db-${env}-${env}", &variables()),
            "db-prod-prod"
        );
    }

    #[test]
    fn falls_back_to_inline_default() {
        assert_eq!(resolve_placeholders("${missing:42}", &variables()), "42");
        assert_eq!(resolve_placeholders("${missing:}", &variables()), "");
        assert_eq!(resolve_placeholders("${env:dev}", &variables()), "prod");
    }

    #[test]
    fn leaves_unknown_placeholder_without_default() {
        assert_eq!(
            resolve_placeholders("x=${missing}", &variables()),
            "x=${missing}"
        );
        assert_eq!(resolve_placeholders("plain", &variables()), "plain");
    }

    #[test]
    fn parses_typed_properties() {
        let properties = Properties::from([
            ("threshold_ms".to_string(), " 15 ".to_string()),
            ("enabled".to_string(), "yes".to_string()),
        ]);
        assert_eq!(
            parse_property::<u64>(&properties, "threshold_ms").expect("u64 parse"),
            Some(15)
        );
        assert_eq!(
            parse_property::<u64>(&properties, "absent").expect("absent is fine"),
            None
        );
        let err = parse_property::<bool>(&properties, "enabled").expect_err("bad bool");
        assert_eq!(err, PropertyError::new("enabled", "cannot parse `yes`"));
    }
}
