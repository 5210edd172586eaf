//! Interceptor contract and ordered interceptor chain.
//!
//! # Responsibility
//! - Define what a plugin author implements.
//! - Resolve each interceptor's declared interest once, at registration.
//! - Apply all registered interceptors to freshly built targets.
//!
//! # Invariants
//! - Registration is append-only and order is preserved.
//! - `apply_all` wraps in registration order, so the last registered
//!   interceptor is the outermost layer and runs first at call time.
//! - An interceptor that fails manifest resolution never enters the chain.

use crate::extension::config::{Properties, PropertyError};
use crate::extension::invocation::{CallResult, Invocation};
use crate::extension::manifest::{InterceptManifest, ManifestError, SignatureMap};
use crate::extension::plugin::Plugin;
use crate::extension::target::Target;
use log::{error, info};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Plugin contract implemented by extension authors.
pub trait Interceptor: Send + Sync {
    /// Declared interest. Read once when the interceptor is registered.
    fn manifest(&self) -> InterceptManifest;

    /// Handles one intercepted call.
    ///
    /// Call `invocation.proceed()` to continue inward; skip it to
    /// short-circuit. Whatever this returns is what the caller sees.
    fn intercept(&self, invocation: &mut Invocation) -> CallResult;

    /// Applies configured properties before registration.
    fn configure(&mut self, _properties: &Properties) -> Result<(), PropertyError> {
        Ok(())
    }

    /// Wraps one target. Override only to narrow wrapping further.
    fn wrap(&self, target: Arc<dyn Target>, binding: &RegisteredInterceptor) -> Arc<dyn Target> {
        Plugin::wrap(target, binding)
    }
}

/// Chain entry: interceptor plus its resolved signature map.
pub struct RegisteredInterceptor {
    id: String,
    registration_id: Uuid,
    interceptor: Arc<dyn Interceptor>,
    signature_map: Arc<SignatureMap>,
}

impl RegisteredInterceptor {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unique per registration, used to correlate log events.
    pub fn registration_id(&self) -> Uuid {
        self.registration_id
    }

    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }

    pub fn signature_map(&self) -> &Arc<SignatureMap> {
        &self.signature_map
    }

    /// Runs this entry's wrap step on one target.
    pub fn wrap(&self, target: Arc<dyn Target>) -> Arc<dyn Target> {
        self.interceptor.wrap(target, self)
    }
}

impl Debug for RegisteredInterceptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredInterceptor")
            .field("id", &self.id)
            .field("registration_id", &self.registration_id)
            .field("signature_map", &self.signature_map)
            .finish_non_exhaustive()
    }
}

/// Ordered, append-only interceptor chain.
#[derive(Debug, Default)]
pub struct InterceptorChain {
    entries: Vec<RegisteredInterceptor>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the interceptor's manifest and appends it to the chain.
    pub fn register(&mut self, interceptor: Arc<dyn Interceptor>) -> Result<(), KernelError> {
        let manifest = interceptor.manifest();
        let signature_map = match manifest.resolve() {
            Ok(map) => map,
            Err(err) => {
                error!(
                    "event=interceptor_register module=extension status=error interceptor={} error={}",
                    manifest.id, err
                );
                return Err(KernelError::InvalidManifest(err));
            }
        };
        let id = manifest.id.trim().to_string();
        if self.get(&id).is_some() {
            return Err(KernelError::DuplicateInterceptorId(id));
        }

        let entry = RegisteredInterceptor {
            id,
            registration_id: Uuid::new_v4(),
            interceptor,
            signature_map: Arc::new(signature_map),
        };
        info!(
            "event=interceptor_register module=extension status=ok interceptor={} registration={} position={} operations={}",
            entry.id,
            entry.registration_id,
            self.entries.len(),
            entry.signature_map.len()
        );
        self.entries.push(entry);
        Ok(())
    }

    /// Wraps `target` with every registered interceptor in registration
    /// order and returns the outermost layer.
    pub fn apply_all(&self, target: Arc<dyn Target>) -> Arc<dyn Target> {
        self.entries
            .iter()
            .fold(target, |current, entry| entry.wrap(current))
    }

    pub fn interceptors(&self) -> &[RegisteredInterceptor] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredInterceptor> {
        let id = id.trim();
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registration and chain assembly errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    InvalidManifest(ManifestError),
    DuplicateInterceptorId(String),
    UnknownInterceptor(String),
    InvalidFactoryName(String),
    DuplicateFactory(String),
    InvalidProperty {
        interceptor: String,
        source: PropertyError,
    },
    InvalidConfig(String),
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidManifest(err) => write!(f, "invalid interceptor manifest: {err}"),
            Self::DuplicateInterceptorId(value) => {
                write!(f, "interceptor id already registered: {value}")
            }
            Self::UnknownInterceptor(value) => {
                write!(f, "no interceptor factory named `{value}`")
            }
            Self::InvalidFactoryName(value) => {
                write!(f, "interceptor factory name is invalid: {value}")
            }
            Self::DuplicateFactory(value) => {
                write!(f, "interceptor factory already registered: {value}")
            }
            Self::InvalidProperty {
                interceptor,
                source,
            } => write!(f, "interceptor `{interceptor}` rejected properties: {source}"),
            Self::InvalidConfig(message) => write!(f, "invalid plugin configuration: {message}"),
        }
    }
}

impl Error for KernelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidManifest(err) => Some(err),
            Self::InvalidProperty { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Interceptor, InterceptorChain, KernelError};
    use crate::extension::capability::{executor, statement_handler};
    use crate::extension::invocation::{CallResult, Invocation};
    use crate::extension::manifest::{InterceptManifest, ManifestError};
    use std::sync::Arc;

    struct Declared(InterceptManifest);

    impl Interceptor for Declared {
        fn manifest(&self) -> InterceptManifest {
            self.0.clone()
        }

        fn intercept(&self, invocation: &mut Invocation) -> CallResult {
            invocation.proceed()
        }
    }

    fn declared(id: &str) -> Arc<dyn Interceptor> {
        Arc::new(Declared(
            InterceptManifest::new(id).intercept(executor::QUERY),
        ))
    }

    #[test]
    fn registers_in_order() {
        let mut chain = InterceptorChain::new();
        chain.register(declared("first")).expect("first registers");
        chain.register(declared("second")).expect("second registers");

        let ids: Vec<&str> = chain.interceptors().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_ne!(
            chain.interceptors()[0].registration_id(),
            chain.interceptors()[1].registration_id()
        );
    }

    #[test]
    fn rejects_empty_interest_at_registration() {
        let mut chain = InterceptorChain::new();
        let err = chain
            .register(Arc::new(Declared(InterceptManifest::new("noop"))))
            .expect_err("empty interest must fail");
        assert_eq!(
            err,
            KernelError::InvalidManifest(ManifestError::MissingSignatures("noop".to_string()))
        );
        assert!(chain.is_empty());
    }

    #[test]
    fn rejects_duplicate_interceptor_id() {
        let mut chain = InterceptorChain::new();
        chain.register(declared("timing")).expect("first registers");
        let err = chain
            .register(declared("timing"))
            .expect_err("duplicate id must fail");
        assert_eq!(err, KernelError::DuplicateInterceptorId("timing".to_string()));
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn caches_resolved_signature_map() {
        let mut chain = InterceptorChain::new();
        chain
            .register(Arc::new(Declared(
                InterceptManifest::new("mixed")
                    .intercept(executor::QUERY)
                    .intercept(statement_handler::PREPARE),
            )))
            .expect("mixed registers");

        let entry = chain.get("mixed").expect("registered entry");
        assert_eq!(entry.signature_map().len(), 2);
        assert!(entry.signature_map().contains(&statement_handler::PREPARE));
    }
}
