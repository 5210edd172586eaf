//! Interceptor interest declaration and signature resolution.
//!
//! # Responsibility
//! - Describe which operations an interceptor wants to see.
//! - Resolve declarations into an immutable `SignatureMap` at registration.
//!
//! # Invariants
//! - A manifest with no signature declarations is rejected.
//! - Every declared operation must exist on the named capability with the
//!   exact parameter type list.

use crate::extension::capability::{parse_capability, Capability, CapabilitySet, Signature};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declared interest of one interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptManifest {
    /// Stable interceptor identifier, e.g. `builtin.timing`.
    pub id: String,
    /// Operations this interceptor wants to intercept.
    pub signatures: Vec<SignatureDecl>,
}

impl InterceptManifest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            signatures: Vec::new(),
        }
    }

    /// Adds one declaration resolved from an existing signature constant.
    pub fn intercept(mut self, signature: Signature) -> Self {
        self.signatures.push(SignatureDecl::from(signature));
        self
    }

    /// Adds one raw declaration.
    pub fn declare(mut self, decl: SignatureDecl) -> Self {
        self.signatures.push(decl);
        self
    }

    /// Validates the id and resolves every declaration.
    pub fn resolve(&self) -> Result<SignatureMap, ManifestError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ManifestError::EmptyId);
        }
        if !is_valid_interceptor_id(id) {
            return Err(ManifestError::InvalidId(self.id.clone()));
        }
        if self.signatures.is_empty() {
            return Err(ManifestError::MissingSignatures(id.to_string()));
        }

        let mut entries = BTreeMap::<Capability, BTreeSet<Signature>>::new();
        for decl in &self.signatures {
            let signature = decl.resolve()?;
            entries
                .entry(signature.capability)
                .or_default()
                .insert(signature);
        }
        Ok(SignatureMap { entries })
    }
}

/// One declared operation: capability id, operation name, parameter types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureDecl {
    pub capability: String,
    pub method: String,
    pub args: Vec<String>,
}

impl SignatureDecl {
    pub fn new(capability: impl Into<String>, method: impl Into<String>, args: &[&str]) -> Self {
        Self {
            capability: capability.into(),
            method: method.into(),
            args: args.iter().map(|value| value.to_string()).collect(),
        }
    }

    fn resolve(&self) -> Result<Signature, ManifestError> {
        let capability = parse_capability(&self.capability)
            .map_err(|_| ManifestError::UnknownCapability(self.capability.clone()))?;
        capability
            .resolve(self.method.trim(), self.args.as_slice())
            .ok_or_else(|| ManifestError::UnresolvedSignature {
                capability: capability.as_str().to_string(),
                method: self.method.clone(),
                args: self.args.clone(),
            })
    }
}

impl From<Signature> for SignatureDecl {
    fn from(value: Signature) -> Self {
        Self::new(value.capability.as_str(), value.name, value.param_types)
    }
}

/// Resolved capability -> operation set mapping for one interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMap {
    entries: BTreeMap<Capability, BTreeSet<Signature>>,
}

impl SignatureMap {
    /// Operations registered under one capability.
    pub fn get(&self, capability: Capability) -> Option<&BTreeSet<Signature>> {
        self.entries.get(&capability)
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.entries
            .get(&signature.capability)
            .is_some_and(|operations| operations.contains(signature))
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.entries.keys().copied().collect()
    }

    /// Capabilities from `implemented` that this map also lists.
    pub fn matching_capabilities(&self, implemented: &CapabilitySet) -> CapabilitySet {
        implemented
            .iter()
            .copied()
            .filter(|capability| self.entries.contains_key(capability))
            .collect()
    }

    /// Total number of distinct intercepted operations.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `[a-z0-9]` segments joined by single `.`, `_` or `-` separators.
pub(crate) fn is_valid_interceptor_id(value: &str) -> bool {
    let mut chars = value.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return false,
    };
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return false;
    }

    let mut prev_separator = false;
    for c in chars {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            prev_separator = false;
        } else if matches!(c, '.' | '_' | '-') && !prev_separator {
            prev_separator = true;
        } else {
            return false;
        }
    }
    !prev_separator
}

/// Interest declaration errors. All are configuration errors raised before
/// the interceptor enters a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    EmptyId,
    InvalidId(String),
    MissingSignatures(String),
    UnknownCapability(String),
    UnresolvedSignature {
        capability: String,
        method: String,
        args: Vec<String>,
    },
}

impl Display for ManifestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "interceptor id must not be empty"),
            Self::InvalidId(value) => write!(f, "interceptor id is invalid: {value}"),
            Self::MissingSignatures(id) => {
                write!(f, "interceptor `{id}` declares no intercepted operations")
            }
            Self::UnknownCapability(value) => {
                write!(f, "declared capability is unsupported: {value}")
            }
            Self::UnresolvedSignature {
                capability,
                method,
                args,
            } => write!(
                f,
                "could not find operation `{method}({})` on capability `{capability}`",
                args.join(", ")
            ),
        }
    }
}

impl Error for ManifestError {}

#[cfg(test)]
mod tests {
    use super::{InterceptManifest, ManifestError, SignatureDecl};
    use crate::extension::capability::{executor, parameter_handler, Capability, CapabilitySet};

    fn timing_manifest() -> InterceptManifest {
        InterceptManifest::new("builtin.timing")
            .intercept(executor::QUERY)
            .intercept(executor::UPDATE)
    }

    #[test]
    fn resolves_declarations_grouped_by_capability() {
        let map = timing_manifest()
            .intercept(parameter_handler::SET_PARAMETERS)
            .resolve()
            .expect("manifest should resolve");

        assert_eq!(map.len(), 3);
        assert!(!map.is_empty());
        let expected: CapabilitySet = [Capability::Executor, Capability::ParameterHandler]
            .into_iter()
            .collect();
        assert_eq!(map.capabilities(), expected);
        assert_eq!(map.get(Capability::Executor).map(|ops| ops.len()), Some(2));
        assert!(map.contains(&executor::QUERY));
        assert!(map.contains(&parameter_handler::SET_PARAMETERS));
        assert!(!map.contains(&executor::CLOSE));
    }

    #[test]
    fn duplicate_declarations_collapse_into_one_entry() {
        let map = timing_manifest()
            .intercept(executor::QUERY)
            .resolve()
            .expect("manifest should resolve");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn rejects_manifest_without_signatures() {
        let err = InterceptManifest::new("builtin.noop")
            .resolve()
            .expect_err("empty interest must fail");
        assert_eq!(
            err,
            ManifestError::MissingSignatures("builtin.noop".to_string())
        );
    }

    #[test]
    fn rejects_unknown_capability() {
        let err = InterceptManifest::new("builtin.bad")
            .declare(SignatureDecl::new("connection", "close", &[]))
            .resolve()
            .expect_err("unknown capability must fail");
        assert_eq!(
            err,
            ManifestError::UnknownCapability("connection".to_string())
        );
    }

    #[test]
    fn rejects_operation_with_wrong_parameter_list() {
        let err = InterceptManifest::new("builtin.bad")
            .declare(SignatureDecl::new("executor", "query", &["MappedStatement"]))
            .resolve()
            .expect_err("unresolved operation must fail");
        assert_eq!(
            err,
            ManifestError::UnresolvedSignature {
                capability: "executor".to_string(),
                method: "query".to_string(),
                args: vec!["MappedStatement".to_string()],
            }
        );
        assert!(err.to_string().contains("query(MappedStatement)"));
    }

    #[test]
    fn rejects_invalid_id_format() {
        let err = InterceptManifest::new("Timing Plugin")
            .intercept(executor::QUERY)
            .resolve()
            .expect_err("invalid id must fail");
        assert!(matches!(err, ManifestError::InvalidId(_)));

        let err = InterceptManifest::new("   ")
            .intercept(executor::QUERY)
            .resolve()
            .expect_err("blank id must fail");
        assert_eq!(err, ManifestError::EmptyId);
    }

    #[test]
    fn matching_capabilities_is_an_intersection() {
        let map = timing_manifest().resolve().expect("manifest should resolve");
        let implemented: CapabilitySet = [Capability::Executor, Capability::StatementHandler]
            .into_iter()
            .collect();
        let matched = map.matching_capabilities(&implemented);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains(&Capability::Executor));

        let unrelated: CapabilitySet = [Capability::ResultSetHandler].into_iter().collect();
        assert!(map.matching_capabilities(&unrelated).is_empty());
    }
}
