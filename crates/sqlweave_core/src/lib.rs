//! Core interception layer for sqlweave.
//! Plugins observe, veto or rewrite calls on the statement-execution
//! capabilities without the pipeline objects knowing they are wrapped.

pub mod extension;
pub mod logging;

pub use extension::capability::{
    executor, parameter_handler, parse_capability, result_set_handler, statement_handler,
    Capability, CapabilityError, CapabilitySet, Signature, TypeDescriptor,
};
pub use extension::config::{
    build_chain, parse_property, resolve_placeholders, InterceptorFactories, PluginConfig,
    PluginsConfig, Properties, PropertyError,
};
pub use extension::invocation::{BoxError, CallError, CallResult, Invocation};
pub use extension::kernel::{Interceptor, InterceptorChain, KernelError, RegisteredInterceptor};
pub use extension::manifest::{InterceptManifest, ManifestError, SignatureDecl, SignatureMap};
pub use extension::plugin::Plugin;
pub use extension::target::{DispatchTable, Handler, Target, TargetExt};
pub use logging::{default_log_level, init_logging, logging_status};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
