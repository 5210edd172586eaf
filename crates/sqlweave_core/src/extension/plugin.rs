//! Interception wrapper around one target.
//!
//! # Responsibility
//! - Wrap a target only when it implements a capability the interceptor
//!   declared interest in.
//! - Route declared operations to the interceptor and forward the rest.
//!
//! # Invariants
//! - No wrapper is created when the capability intersection is empty; the
//!   same `Arc` is returned.
//! - A wrapper exposes exactly the intersected capabilities.
//! - Errors leaving a wrapper never carry a dispatch envelope.

use crate::extension::capability::{CapabilitySet, Signature};
use crate::extension::invocation::{CallError, CallResult, Invocation};
use crate::extension::kernel::{Interceptor, RegisteredInterceptor};
use crate::extension::manifest::SignatureMap;
use crate::extension::target::Target;
use log::{debug, trace};
use serde_json::Value;
use std::sync::Arc;

/// Wrapper binding one interceptor to one delegate.
pub struct Plugin {
    target: Arc<dyn Target>,
    interceptor: Arc<dyn Interceptor>,
    signature_map: Arc<SignatureMap>,
    capabilities: CapabilitySet,
}

impl Plugin {
    /// Wraps `target` for `binding`'s interceptor, or returns it unchanged
    /// when the interceptor has no interest in any of its capabilities.
    pub fn wrap(target: Arc<dyn Target>, binding: &RegisteredInterceptor) -> Arc<dyn Target> {
        let capabilities = binding
            .signature_map()
            .matching_capabilities(&target.capabilities());
        if capabilities.is_empty() {
            trace!(
                "event=plugin_wrap module=extension status=skipped interceptor={} target={}",
                binding.id(),
                target.type_name()
            );
            return target;
        }

        debug!(
            "event=plugin_wrap module=extension status=ok interceptor={} registration={} target={} capabilities={}",
            binding.id(),
            binding.registration_id(),
            target.type_name(),
            join_capabilities(&capabilities)
        );
        Arc::new(Self {
            target,
            interceptor: Arc::clone(binding.interceptor()),
            signature_map: Arc::clone(binding.signature_map()),
            capabilities,
        })
    }
}

impl Target for Plugin {
    fn type_name(&self) -> &str {
        self.target.type_name()
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn call(&self, signature: Signature, args: Vec<Value>) -> CallResult {
        if !self.capabilities.contains(&signature.capability) {
            return Err(CallError::UnsupportedOperation {
                type_name: self.type_name().to_string(),
                signature,
            });
        }

        let result = if self.signature_map.contains(&signature) {
            let mut invocation = Invocation::new(Arc::clone(&self.target), signature, args);
            self.interceptor.intercept(&mut invocation)
        } else {
            self.target.call(signature, args)
        };
        result.map_err(CallError::into_cause)
    }
}

fn join_capabilities(capabilities: &CapabilitySet) -> String {
    capabilities
        .iter()
        .map(|capability| capability.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
