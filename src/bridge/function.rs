//! Low-level wrappers built by the `WebAssembly.Function` constructor
//!
//! ```text
//! new WebAssembly.Function({parameters, results}, callable)
//! new WebAssembly.Function({parameters: ["externref", ..], results}, callable, {suspending: "first"})
//! new WebAssembly.Function({parameters, results: ["externref"]}, export, {promising: "first"})
//! ```
//!
//! With `suspending: "first"` the signature is the wasm-visible one and its
//! first parameter is the suspend-context token, which the callable never
//! sees. With `promising: "first"` the signature is the host-visible one; the
//! export takes the token as an extra leading parameter.

use super::promising::PromisingFunction;
use super::suspending::{self, HostCall, HostImport, SuspendMode};
use crate::config::Completion;
use crate::engine::Engine;
use crate::error::Error;
use crate::host::{HostFunction, HostValue};
use crate::module::{FunctionType, ValueType};
use crate::runtime::executor::Unwind;
use serde::Deserialize;
use std::rc::Rc;

/// Which parameter carries the suspend-context token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    First,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionOptions {
    pub suspending: Option<Position>,
    pub promising: Option<Position>,
    /// Overrides the engine's completion mode for a promising wrapper
    pub completion: Option<Completion>,
}

impl FunctionOptions {
    pub fn suspending() -> Self {
        FunctionOptions {
            suspending: Some(Position::First),
            ..FunctionOptions::default()
        }
    }

    pub fn promising() -> Self {
        FunctionOptions {
            promising: Some(Position::First),
            ..FunctionOptions::default()
        }
    }
}

/// A host callable with an explicit wasm signature
#[derive(Debug)]
pub struct TypedFunction {
    pub(crate) func_type: FunctionType,
    pub(crate) callable: HostValue,
    /// The first parameter is a suspend-context token
    pub(crate) suspending: bool,
}

impl TypedFunction {
    pub fn func_type(&self) -> &FunctionType {
        &self.func_type
    }

    /// Call from the host: arguments and result go through the wasm signature
    pub(crate) fn invoke(&self, engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
        let values = HostValue::to_wasm_args(args, &self.func_type.parameters)?;
        let import = HostImport {
            callable: self.callable.clone(),
            func_type: self.func_type.clone(),
            mode: if self.suspending {
                SuspendMode::Explicit
            } else {
                SuspendMode::Never
            },
        };
        match suspending::dispatch(engine, &import, values, None) {
            Ok(HostCall::Return(values)) => Ok(HostValue::from_wasm_results(values)),
            Ok(HostCall::Suspend(_)) => Err(Error::Runtime("trying to suspend JS frames".to_string())),
            Err(Unwind::Trap(error)) | Err(Unwind::Throw(error)) => Err(error),
        }
    }
}

/// Build a low-level wrapper
///
/// # Errors
/// `TypeError` for contradictory options, a target of the wrong kind, or a
/// signature that does not fit the requested wrapper
pub fn wrap(engine: &Engine, sig: FunctionType, target: HostValue, options: FunctionOptions) -> Result<HostValue, Error> {
    match (options.suspending, options.promising) {
        (Some(_), Some(_)) => Err(Error::Type(
            "WebAssembly.Function(): a function cannot be both suspending and promising".to_string(),
        )),
        (Some(Position::First), None) => {
            if sig.parameters.first() != Some(&ValueType::ExternRef) {
                return Err(Error::Type(
                    "WebAssembly.Function(): a suspending function's first parameter must be externref".to_string(),
                ));
            }
            typed(sig, target, true)
        }
        (None, Some(Position::First)) => {
            let addr = match &target {
                HostValue::Function(HostFunction::Wasm(addr)) => *addr,
                _ => {
                    return Err(Error::Type(
                        "WebAssembly.Function(): Argument 1 must be a WebAssembly exported function".to_string(),
                    ))
                }
            };
            let actual = engine.store.function(addr)?.func_type();
            let mut expected = vec![ValueType::ExternRef];
            expected.extend(&sig.parameters);
            if actual.parameters != expected {
                return Err(Error::Type(format!(
                    "WebAssembly.Function(): the export's parameters must be the signature's with a leading externref, got {actual}"
                )));
            }
            if sig.return_types != [ValueType::ExternRef] {
                return Err(Error::Type(
                    "WebAssembly.Function(): a promising function must return a single externref".to_string(),
                ));
            }
            let completion = options.completion.unwrap_or(engine.config().completion);
            let wrapper = PromisingFunction::new(addr, sig.parameters, true, completion);
            Ok(HostValue::Function(HostFunction::Promising(Rc::new(wrapper))))
        }
        (None, None) => typed(sig, target, false),
    }
}

fn typed(func_type: FunctionType, callable: HostValue, suspending: bool) -> Result<HostValue, Error> {
    if !callable.is_callable() {
        return Err(Error::Type("WebAssembly.Function(): Argument 1 must be a function".to_string()));
    }
    Ok(HostValue::Function(HostFunction::Typed(Rc::new(TypedFunction {
        func_type,
        callable,
        suspending,
    }))))
}

fn descriptor<T: serde::de::DeserializeOwned>(value: &HostValue, what: &str) -> Result<T, Error> {
    serde_json::from_value(value.to_json()?)
        .map_err(|e| Error::Type(format!("WebAssembly.Function(): invalid {what}: {e}")))
}

/// `new WebAssembly.Function(signature, target, options)`
pub(crate) fn construct(engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
    let sig: FunctionType = match args.first() {
        Some(value @ HostValue::Object(_)) => descriptor(value, "signature")?,
        _ => {
            return Err(Error::Type(
                "WebAssembly.Function(): Argument 0 must be a function type".to_string(),
            ))
        }
    };
    let target = args.get(1).cloned().unwrap_or(HostValue::Undefined);
    let options = match args.get(2) {
        None | Some(HostValue::Undefined) | Some(HostValue::Null) => FunctionOptions::default(),
        Some(value) => descriptor(value, "options")?,
    };
    wrap(engine, sig, target, options)
}
