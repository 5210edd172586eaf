//! Intercepted call descriptor and call-time errors.
//!
//! # Responsibility
//! - Carry one in-flight call (delegate, operation, arguments) to an
//!   interceptor.
//! - Normalize generic dispatch failures back to their original cause.
//!
//! # Invariants
//! - `proceed` never surfaces a `CallError::InvocationTarget` envelope.
//! - Argument count is fixed by the operation; interceptors may replace
//!   values but not add or drop them.

use crate::extension::capability::Signature;
use crate::extension::target::Target;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Type-erased error raised by an operation or an interceptor.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

pub type CallResult = Result<Value, CallError>;

/// Error observed by callers of a target or wrapper.
#[derive(Debug)]
pub enum CallError {
    /// Failure raised by the real operation or by interceptor logic.
    Operation(BoxError),
    /// Generic dispatch envelope around the real cause.
    InvocationTarget(Box<CallError>),
    /// Receiver does not implement the requested operation.
    UnsupportedOperation {
        type_name: String,
        signature: Signature,
    },
    ArgumentMismatch {
        signature: Signature,
        expected: usize,
        actual: usize,
    },
}

impl CallError {
    pub fn operation(err: impl Into<BoxError>) -> Self {
        Self::Operation(err.into())
    }

    /// Peels every dispatch envelope and returns the original cause.
    ///
    /// Non-envelope errors are returned unchanged.
    pub fn into_cause(self) -> Self {
        let mut current = self;
        while let Self::InvocationTarget(inner) = current {
            current = *inner;
        }
        current
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self, Self::InvocationTarget(_))
    }

    /// Downcasts an `Operation` cause to its concrete error type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Operation(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operation(err) => write!(f, "{err}"),
            Self::InvocationTarget(inner) => write!(f, "invocation failed: {inner}"),
            Self::UnsupportedOperation {
                type_name,
                signature,
            } => write!(f, "`{type_name}` does not support {signature}"),
            Self::ArgumentMismatch {
                signature,
                expected,
                actual,
            } => write!(
                f,
                "{signature} expects {expected} argument(s), got {actual}"
            ),
        }
    }
}

impl Error for CallError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Operation(err) => Some(&**err),
            Self::InvocationTarget(inner) => Some(&**inner),
            Self::UnsupportedOperation { .. } | Self::ArgumentMismatch { .. } => None,
        }
    }
}

/// One intercepted call handed to `Interceptor::intercept`.
pub struct Invocation {
    target: Arc<dyn Target>,
    signature: Signature,
    args: Vec<Value>,
}

impl Invocation {
    pub fn new(target: Arc<dyn Target>, signature: Signature, args: Vec<Value>) -> Self {
        Self {
            target,
            signature,
            args,
        }
    }

    /// The wrapped delegate: the original target or the next inner wrapper.
    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Mutable view for rewriting arguments before `proceed`.
    pub fn args_mut(&mut self) -> &mut [Value] {
        &mut self.args
    }

    /// Runs the delegate operation with the current arguments.
    ///
    /// May be called any number of times, including zero: the interceptor
    /// decides whether and how often the delegate runs, side effects included.
    pub fn proceed(&self) -> CallResult {
        self.target
            .call(self.signature, self.args.clone())
            .map_err(CallError::into_cause)
    }
}
