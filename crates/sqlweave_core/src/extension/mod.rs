//! Interception wrapping and chaining engine.
//!
//! Interceptors declare which capability operations they care about; the
//! chain wraps every freshly built target with each interested interceptor,
//! in registration order. Uninterested interceptors leave targets untouched.

pub mod capability;
pub mod config;
pub mod invocation;
pub mod kernel;
pub mod manifest;
pub mod plugin;
pub mod target;
