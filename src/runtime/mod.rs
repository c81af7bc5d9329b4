//! WebAssembly runtime implementation
//!
//! This module provides the execution engine for WebAssembly modules: the
//! store and its instances, import resolution, and a resumable stack-machine
//! interpreter whose in-flight state can be parked and resumed.

pub mod control;
pub(crate) mod executor;
pub mod frame;
pub mod imports;
pub mod instance;
pub mod stack;
pub mod store;
pub mod value;

pub use imports::ImportObject;
pub use instance::Instance;
pub use store::{FuncAddr, FunctionInstance, InstanceId, Store};
pub use value::Value;
