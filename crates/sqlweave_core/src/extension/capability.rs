//! Interceptable capability declarations.
//!
//! # Responsibility
//! - Define the closed set of capabilities plugins may intercept.
//! - Publish the fixed operation table of every capability.
//! - Describe concrete target types and the capabilities they inherit.
//!
//! # Invariants
//! - Capabilities and their operation tables are predeclared; plugins never
//!   add operations.
//! - `Signature` equality is structural over capability, name and parameter
//!   types.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Interceptable execution interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Executor,
    StatementHandler,
    ParameterHandler,
    ResultSetHandler,
}

/// Set of capabilities, ordered for deterministic logging.
pub type CapabilitySet = BTreeSet<Capability>;

impl Capability {
    /// Stable string id used in declarations and configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executor => CAPABILITY_EXECUTOR,
            Self::StatementHandler => CAPABILITY_STATEMENT_HANDLER,
            Self::ParameterHandler => CAPABILITY_PARAMETER_HANDLER,
            Self::ResultSetHandler => CAPABILITY_RESULT_SET_HANDLER,
        }
    }

    /// Fixed operation table of this capability.
    pub fn operations(self) -> &'static [Signature] {
        match self {
            Self::Executor => EXECUTOR_OPERATIONS,
            Self::StatementHandler => STATEMENT_HANDLER_OPERATIONS,
            Self::ParameterHandler => PARAMETER_HANDLER_OPERATIONS,
            Self::ResultSetHandler => RESULT_SET_HANDLER_OPERATIONS,
        }
    }

    /// Looks up one operation by name and exact parameter type list.
    pub fn resolve<S: AsRef<str>>(self, name: &str, param_types: &[S]) -> Option<Signature> {
        self.operations().iter().copied().find(|signature| {
            signature.name == name
                && signature.param_types.len() == param_types.len()
                && signature
                    .param_types
                    .iter()
                    .zip(param_types)
                    .all(|(declared, requested)| *declared == requested.as_ref())
        })
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration string for the executor capability.
pub const CAPABILITY_EXECUTOR: &str = "executor";
/// Declaration string for the statement handler capability.
pub const CAPABILITY_STATEMENT_HANDLER: &str = "statement_handler";
/// Declaration string for the parameter handler capability.
pub const CAPABILITY_PARAMETER_HANDLER: &str = "parameter_handler";
/// Declaration string for the result set handler capability.
pub const CAPABILITY_RESULT_SET_HANDLER: &str = "result_set_handler";

const SUPPORTED_CAPABILITY_STRINGS: &[&str] = &[
    CAPABILITY_EXECUTOR,
    CAPABILITY_STATEMENT_HANDLER,
    CAPABILITY_PARAMETER_HANDLER,
    CAPABILITY_RESULT_SET_HANDLER,
];

/// Returns supported capability declaration strings.
pub fn supported_capability_strings() -> &'static [&'static str] {
    SUPPORTED_CAPABILITY_STRINGS
}

/// Parses one capability from its declaration string.
pub fn parse_capability(value: &str) -> Result<Capability, CapabilityError> {
    let normalized = value.trim();
    if normalized.is_empty() {
        return Err(CapabilityError::EmptyCapability);
    }

    match normalized {
        CAPABILITY_EXECUTOR => Ok(Capability::Executor),
        CAPABILITY_STATEMENT_HANDLER => Ok(Capability::StatementHandler),
        CAPABILITY_PARAMETER_HANDLER => Ok(Capability::ParameterHandler),
        CAPABILITY_RESULT_SET_HANDLER => Ok(Capability::ResultSetHandler),
        other => Err(CapabilityError::UnsupportedCapability(other.to_string())),
    }
}

/// Capability parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityError {
    EmptyCapability,
    UnsupportedCapability(String),
}

impl Display for CapabilityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCapability => write!(f, "capability value must not be empty"),
            Self::UnsupportedCapability(value) => write!(f, "capability is unsupported: {value}"),
        }
    }
}

impl Error for CapabilityError {}

/// One operation on one capability: the lookup key for interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature {
    pub capability: Capability,
    pub name: &'static str,
    pub param_types: &'static [&'static str],
}

impl Signature {
    pub const fn new(
        capability: Capability,
        name: &'static str,
        param_types: &'static [&'static str],
    ) -> Self {
        Self {
            capability,
            name,
            param_types,
        }
    }

    /// Number of arguments a call of this operation carries.
    pub fn arity(&self) -> usize {
        self.param_types.len()
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}::{}({})",
            self.capability,
            self.name,
            self.param_types.join(", ")
        )
    }
}

/// Executor operations.
pub mod executor {
    use super::{Capability, Signature};

    const C: Capability = Capability::Executor;

    pub const UPDATE: Signature = Signature::new(C, "update", &["MappedStatement", "Parameter"]);
    pub const QUERY: Signature = Signature::new(
        C,
        "query",
        &["MappedStatement", "Parameter", "RowBounds", "ResultHandler"],
    );
    pub const QUERY_WITH_CACHE_KEY: Signature = Signature::new(
        C,
        "query",
        &[
            "MappedStatement",
            "Parameter",
            "RowBounds",
            "ResultHandler",
            "CacheKey",
            "BoundSql",
        ],
    );
    pub const QUERY_CURSOR: Signature = Signature::new(
        C,
        "query_cursor",
        &["MappedStatement", "Parameter", "RowBounds"],
    );
    pub const FLUSH_STATEMENTS: Signature = Signature::new(C, "flush_statements", &[]);
    pub const COMMIT: Signature = Signature::new(C, "commit", &["bool"]);
    pub const ROLLBACK: Signature = Signature::new(C, "rollback", &["bool"]);
    pub const CREATE_CACHE_KEY: Signature = Signature::new(
        C,
        "create_cache_key",
        &["MappedStatement", "Parameter", "RowBounds", "BoundSql"],
    );
    pub const IS_CACHED: Signature =
        Signature::new(C, "is_cached", &["MappedStatement", "CacheKey"]);
    pub const CLEAR_LOCAL_CACHE: Signature = Signature::new(C, "clear_local_cache", &[]);
    pub const CLOSE: Signature = Signature::new(C, "close", &["bool"]);
    pub const IS_CLOSED: Signature = Signature::new(C, "is_closed", &[]);
}

/// Statement handler operations.
pub mod statement_handler {
    use super::{Capability, Signature};

    const C: Capability = Capability::StatementHandler;

    pub const PREPARE: Signature = Signature::new(C, "prepare", &["Connection", "Option<u32>"]);
    pub const PARAMETERIZE: Signature = Signature::new(C, "parameterize", &["Statement"]);
    pub const BATCH: Signature = Signature::new(C, "batch", &["Statement"]);
    pub const UPDATE: Signature = Signature::new(C, "update", &["Statement"]);
    pub const QUERY: Signature = Signature::new(C, "query", &["Statement", "ResultHandler"]);
    pub const QUERY_CURSOR: Signature = Signature::new(C, "query_cursor", &["Statement"]);
    pub const BOUND_SQL: Signature = Signature::new(C, "bound_sql", &[]);
    pub const PARAMETER_HANDLER: Signature = Signature::new(C, "parameter_handler", &[]);
}

/// Parameter handler operations.
pub mod parameter_handler {
    use super::{Capability, Signature};

    const C: Capability = Capability::ParameterHandler;

    pub const PARAMETER_OBJECT: Signature = Signature::new(C, "parameter_object", &[]);
    pub const SET_PARAMETERS: Signature =
        Signature::new(C, "set_parameters", &["PreparedStatement"]);
}

/// Result set handler operations.
pub mod result_set_handler {
    use super::{Capability, Signature};

    const C: Capability = Capability::ResultSetHandler;

    pub const HANDLE_RESULT_SETS: Signature =
        Signature::new(C, "handle_result_sets", &["Statement"]);
    pub const HANDLE_CURSOR_RESULT_SETS: Signature =
        Signature::new(C, "handle_cursor_result_sets", &["Statement"]);
    pub const HANDLE_OUTPUT_PARAMETERS: Signature =
        Signature::new(C, "handle_output_parameters", &["CallableStatement"]);
}

const EXECUTOR_OPERATIONS: &[Signature] = &[
    executor::UPDATE,
    executor::QUERY,
    executor::QUERY_WITH_CACHE_KEY,
    executor::QUERY_CURSOR,
    executor::FLUSH_STATEMENTS,
    executor::COMMIT,
    executor::ROLLBACK,
    executor::CREATE_CACHE_KEY,
    executor::IS_CACHED,
    executor::CLEAR_LOCAL_CACHE,
    executor::CLOSE,
    executor::IS_CLOSED,
];

const STATEMENT_HANDLER_OPERATIONS: &[Signature] = &[
    statement_handler::PREPARE,
    statement_handler::PARAMETERIZE,
    statement_handler::BATCH,
    statement_handler::UPDATE,
    statement_handler::QUERY,
    statement_handler::QUERY_CURSOR,
    statement_handler::BOUND_SQL,
    statement_handler::PARAMETER_HANDLER,
];

const PARAMETER_HANDLER_OPERATIONS: &[Signature] = &[
    parameter_handler::PARAMETER_OBJECT,
    parameter_handler::SET_PARAMETERS,
];

const RESULT_SET_HANDLER_OPERATIONS: &[Signature] = &[
    result_set_handler::HANDLE_RESULT_SETS,
    result_set_handler::HANDLE_CURSOR_RESULT_SETS,
    result_set_handler::HANDLE_OUTPUT_PARAMETERS,
];

/// Static description of one concrete target type.
///
/// `capabilities` lists only what the type declares itself; inherited
/// capabilities come from the `parent` chain.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub capabilities: &'static [Capability],
    pub parent: Option<&'static TypeDescriptor>,
}

impl TypeDescriptor {
    /// Collects declared capabilities across the whole parent chain.
    pub fn all_capabilities(&self) -> CapabilitySet {
        let mut collected = CapabilitySet::new();
        let mut current = Some(self);
        while let Some(descriptor) = current {
            collected.extend(descriptor.capabilities.iter().copied());
            current = descriptor.parent;
        }
        collected
    }

    /// Whether this descriptor or any ancestor declares `capability`.
    pub fn implements(&self, capability: Capability) -> bool {
        let mut current = Some(self);
        while let Some(descriptor) = current {
            if descriptor.capabilities.contains(&capability) {
                return true;
            }
            current = descriptor.parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::{
        executor, parse_capability, statement_handler, supported_capability_strings, Capability,
        CapabilityError, TypeDescriptor,
    };

    #[test]
    fn parses_all_supported_capabilities() {
        for value in supported_capability_strings() {
            let capability = parse_capability(value).expect("supported capability parse");
            assert_eq!(capability.as_str(), *value);
        }
    }

    #[test]
    fn rejects_empty_and_unknown_capabilities() {
        assert_eq!(
            parse_capability("  ").expect_err("empty capability must fail"),
            CapabilityError::EmptyCapability
        );
        assert_eq!(
            parse_capability("Executor").expect_err("capitalized capability must fail"),
            CapabilityError::UnsupportedCapability("Executor".to_string())
        );
    }

    #[test]
    fn resolves_overloads_by_parameter_list() {
        let short = Capability::Executor
            .resolve(
                "query",
                &["MappedStatement", "Parameter", "RowBounds", "ResultHandler"],
            )
            .expect("four-argument query");
        assert_eq!(short, executor::QUERY);

        let long = Capability::Executor
            .resolve(
                "query",
                &[
                    "MappedStatement",
                    "Parameter",
                    "RowBounds",
                    "ResultHandler",
                    "CacheKey",
                    "BoundSql",
                ],
            )
            .expect("six-argument query");
        assert_eq!(long, executor::QUERY_WITH_CACHE_KEY);
        assert_ne!(short, long);
    }

    #[test]
    fn resolve_rejects_wrong_parameters_or_capability() {
        assert!(Capability::Executor
            .resolve("query", &["MappedStatement"])
            .is_none());
        assert!(Capability::ParameterHandler
            .resolve::<&str>("prepare", &[])
            .is_none());
    }

    #[test]
    fn same_operation_name_on_two_capabilities_is_distinct() {
        assert_eq!(executor::UPDATE.name, statement_handler::UPDATE.name);
        assert_ne!(executor::UPDATE, statement_handler::UPDATE);
    }

    #[test]
    fn type_descriptor_walks_parent_chain() {
        static BASE: TypeDescriptor = TypeDescriptor {
            name: "BaseHandler",
            capabilities: &[Capability::StatementHandler],
            parent: None,
        };
        static ROUTING: TypeDescriptor = TypeDescriptor {
            name: "RoutingHandler",
            capabilities: &[Capability::ParameterHandler],
            parent: Some(&BASE),
        };
        static LEAF: TypeDescriptor = TypeDescriptor {
            name: "LeafHandler",
            capabilities: &[],
            parent: Some(&ROUTING),
        };

        let all = LEAF.all_capabilities();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&Capability::StatementHandler));
        assert!(all.contains(&Capability::ParameterHandler));
        assert!(LEAF.implements(Capability::StatementHandler));
        assert!(!LEAF.implements(Capability::Executor));
    }

    #[test]
    fn signature_display_names_capability_and_parameters() {
        assert_eq!(
            executor::UPDATE.to_string(),
            "executor::update(MappedStatement, Parameter)"
        );
    }
}
