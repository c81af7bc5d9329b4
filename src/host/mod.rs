//! The embedding host: values, functions, promises and the microtask queue
//!
//! This is the JS-like side of the bridge. Everything here is single-threaded
//! and reference counted.

pub mod builtins;
pub mod exception;
pub mod function;
pub mod global;
pub mod jobs;
pub mod promise;
pub mod value;

pub use builtins::Builtin;
pub use exception::{Exception, Tag};
pub use function::{HostFunction, NativeFn};
pub use global::Global;
pub use jobs::JobQueue;
pub use promise::{Promise, PromiseState};
pub use value::{HostObject, HostValue};
