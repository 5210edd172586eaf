//! Interceptable target contract and table-driven dispatch.

use crate::extension::capability::{Capability, CapabilitySet, Signature, TypeDescriptor};
use crate::extension::invocation::{BoxError, CallError, CallResult};
use serde_json::Value;
use std::collections::BTreeMap;

/// Object exposing one or more capabilities through generic dispatch.
///
/// Concrete pipeline objects (executors, statement handlers, ...) and
/// interception wrappers both implement this trait, so a wrapper can be used
/// wherever its target was.
pub trait Target: Send + Sync {
    /// Concrete type name; wrappers report their delegate's name.
    fn type_name(&self) -> &str;

    /// Every capability this object can be called through.
    fn capabilities(&self) -> CapabilitySet;

    /// Generic call entry point.
    ///
    /// Implementations may report failures inside a
    /// `CallError::InvocationTarget` envelope; callers should go through
    /// `TargetExt::invoke`.
    fn call(&self, signature: Signature, args: Vec<Value>) -> CallResult;
}

/// Caller-side helpers available on every target.
pub trait TargetExt {
    /// Calls one operation and reports the original error, never an envelope.
    fn invoke(&self, signature: Signature, args: Vec<Value>) -> CallResult;

    fn implements(&self, capability: Capability) -> bool;
}

impl<T: Target + ?Sized> TargetExt for T {
    fn invoke(&self, signature: Signature, args: Vec<Value>) -> CallResult {
        self.call(signature, args).map_err(CallError::into_cause)
    }

    fn implements(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Operation handler bound to a concrete receiver type.
pub type Handler<T> = fn(&T, &[Value]) -> Result<Value, BoxError>;

/// Signature -> handler table used by concrete targets to implement
/// `Target::call`.
///
/// Handler failures are reported inside the generic
/// `CallError::InvocationTarget` envelope, the same way a reflective call
/// would report them.
pub struct DispatchTable<T> {
    descriptor: &'static TypeDescriptor,
    handlers: BTreeMap<Signature, Handler<T>>,
}

impl<T> DispatchTable<T> {
    pub fn new(descriptor: &'static TypeDescriptor) -> Self {
        Self {
            descriptor,
            handlers: BTreeMap::new(),
        }
    }

    /// Binds one operation. Later bindings for the same signature replace
    /// earlier ones.
    ///
    /// A binding outside the descriptor's capabilities is never dispatched;
    /// calls to it fail with `CallError::UnsupportedOperation`.
    pub fn on(mut self, signature: Signature, handler: Handler<T>) -> Self {
        self.handlers.insert(signature, handler);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.descriptor.all_capabilities()
    }

    /// Whether `signature` is bound and belongs to a declared capability.
    pub fn handles(&self, signature: &Signature) -> bool {
        self.handler(signature).is_some()
    }

    pub fn dispatch(&self, receiver: &T, signature: Signature, args: &[Value]) -> CallResult {
        let Some(handler) = self.handler(&signature) else {
            return Err(CallError::UnsupportedOperation {
                type_name: self.descriptor.name.to_string(),
                signature,
            });
        };
        if args.len() != signature.arity() {
            return Err(CallError::ArgumentMismatch {
                signature,
                expected: signature.arity(),
                actual: args.len(),
            });
        }

        handler(receiver, args)
            .map_err(|err| CallError::InvocationTarget(Box::new(CallError::Operation(err))))
    }

    fn handler(&self, signature: &Signature) -> Option<&Handler<T>> {
        if !self.descriptor.implements(signature.capability) {
            return None;
        }
        self.handlers.get(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchTable, Target, TargetExt};
    use crate::extension::capability::{
        executor, statement_handler, Capability, CapabilitySet, Signature, TypeDescriptor,
    };
    use crate::extension::invocation::{CallError, CallResult};
    use serde_json::{json, Value};

    static COUNTER_EXECUTOR: TypeDescriptor = TypeDescriptor {
        name: "CounterExecutor",
        capabilities: &[Capability::Executor],
        parent: None,
    };

    struct CounterExecutor {
        table: DispatchTable<CounterExecutor>,
        rows: i64,
    }

    impl CounterExecutor {
        fn new(rows: i64) -> Self {
            let table = DispatchTable::new(&COUNTER_EXECUTOR)
                .on(executor::UPDATE, |executor: &CounterExecutor, _args| {
                    Ok(json!(executor.rows))
                })
                .on(executor::COMMIT, |_executor: &CounterExecutor, args| {
                    if args[0] == json!(true) {
                        return Err("commit refused".into());
                    }
                    Ok(Value::Null)
                });
            Self { table, rows }
        }
    }

    impl Target for CounterExecutor {
        fn type_name(&self) -> &str {
            self.table.type_name()
        }

        fn capabilities(&self) -> CapabilitySet {
            self.table.capabilities()
        }

        fn call(&self, signature: Signature, args: Vec<Value>) -> CallResult {
            self.table.dispatch(self, signature, &args)
        }
    }

    #[test]
    fn dispatches_bound_operation() {
        let target = CounterExecutor::new(3);
        let value = target
            .invoke(executor::UPDATE, vec![json!({"id": "insert"}), Value::Null])
            .expect("update should succeed");
        assert_eq!(value, json!(3));
        assert!(target.table.handles(&executor::UPDATE));
        assert!(!target.table.handles(&executor::CLOSE));
        assert!(target.implements(Capability::Executor));
        assert!(!target.implements(Capability::StatementHandler));
    }

    #[test]
    fn handler_failure_is_enveloped_on_call_and_peeled_on_invoke() {
        let target = CounterExecutor::new(0);
        let raw = target
            .call(executor::COMMIT, vec![json!(true)])
            .expect_err("commit should fail");
        assert!(raw.is_envelope());

        let normalized = target
            .invoke(executor::COMMIT, vec![json!(true)])
            .expect_err("commit should fail");
        assert!(!normalized.is_envelope());
        assert_eq!(normalized.to_string(), "commit refused");
    }

    #[test]
    fn binding_outside_declared_capabilities_is_never_dispatched() {
        let table = DispatchTable::new(&COUNTER_EXECUTOR).on(
            statement_handler::BOUND_SQL,
            |_executor: &CounterExecutor, _args| Ok(json!("SELECT 1")),
        );
        assert!(!table.handles(&statement_handler::BOUND_SQL));

        let target = CounterExecutor { table, rows: 0 };
        let err = target
            .invoke(statement_handler::BOUND_SQL, vec![])
            .expect_err("undeclared capability should fail");
        assert!(matches!(
            err,
            CallError::UnsupportedOperation { signature, .. }
                if signature == statement_handler::BOUND_SQL
        ));
    }

    #[test]
    fn rejects_unbound_operation_and_wrong_arity() {
        let target = CounterExecutor::new(0);
        let err = target
            .invoke(executor::CLOSE, vec![json!(false)])
            .expect_err("unbound operation should fail");
        assert!(matches!(err, CallError::UnsupportedOperation { .. }));

        let err = target
            .invoke(executor::UPDATE, vec![])
            .expect_err("missing arguments should fail");
        assert!(matches!(
            err,
            CallError::ArgumentMismatch {
                expected: 2,
                actual: 0,
                ..
            }
        ));
    }
}
