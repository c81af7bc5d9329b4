//! Callable host values

use super::{Builtin, HostValue};
use crate::bridge::function::TypedFunction;
use crate::bridge::promising::PromisingFunction;
use crate::engine::Engine;
use crate::error::Error;
use crate::runtime::FuncAddr;
use std::fmt;
use std::rc::Rc;

/// Signature of a native host function
///
/// Natives receive the engine so they can call back into wasm, create
/// promises and enqueue work. Missing arguments are simply absent from the
/// slice; extra arguments are present and may be ignored.
pub type NativeFn = dyn Fn(&mut Engine, &[HostValue]) -> Result<HostValue, Error>;

pub struct NativeFunction {
    name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Every kind of function a host can hold
#[derive(Clone)]
pub enum HostFunction {
    Native(Rc<NativeFunction>),
    /// An exported WebAssembly function
    Wasm(FuncAddr),
    /// A promising wrapper around a WebAssembly export
    Promising(Rc<PromisingFunction>),
    /// A function built by the `WebAssembly.Function` constructor
    Typed(Rc<TypedFunction>),
    Builtin(Builtin),
}

impl HostFunction {
    pub fn native<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Engine, &[HostValue]) -> Result<HostValue, Error> + 'static,
    {
        HostFunction::Native(Rc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    pub fn name(&self) -> String {
        match self {
            HostFunction::Native(native) => native.name.clone(),
            HostFunction::Wasm(addr) => addr.0.to_string(),
            HostFunction::Promising(_) => "promising".to_string(),
            HostFunction::Typed(_) => "WebAssembly.Function".to_string(),
            HostFunction::Builtin(builtin) => builtin.name().to_string(),
        }
    }

    /// Call the function; wasm exports run owner-less and cannot suspend
    pub(crate) fn call(&self, engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
        match self {
            HostFunction::Native(native) => (native.func)(engine, args),
            HostFunction::Wasm(addr) => engine.invoke_wasm(*addr, args),
            HostFunction::Promising(promising) => promising.invoke(engine, args),
            HostFunction::Typed(typed) => typed.invoke(engine, args),
            HostFunction::Builtin(builtin) => builtin.call(engine, args),
        }
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostFunction::Native(a), HostFunction::Native(b)) => Rc::ptr_eq(a, b),
            (HostFunction::Wasm(a), HostFunction::Wasm(b)) => a == b,
            (HostFunction::Promising(a), HostFunction::Promising(b)) => Rc::ptr_eq(a, b),
            (HostFunction::Typed(a), HostFunction::Typed(b)) => Rc::ptr_eq(a, b),
            (HostFunction::Builtin(a), HostFunction::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostFunction::Native(native) => write!(f, "Native({})", native.name),
            HostFunction::Wasm(addr) => write!(f, "Wasm({})", addr.0),
            HostFunction::Promising(promising) => write!(f, "Promising({})", promising.ty()),
            HostFunction::Typed(typed) => write!(f, "Typed({})", typed.func_type),
            HostFunction::Builtin(builtin) => write!(f, "Builtin({})", builtin.name()),
        }
    }
}

impl HostValue {
    /// A native host function
    pub fn function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Engine, &[HostValue]) -> Result<HostValue, Error> + 'static,
    {
        HostValue::Function(HostFunction::native(name, func))
    }
}
