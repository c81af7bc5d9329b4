//! Promising wrapper: WebAssembly exports that return a promise
//!
//! Calling a promising function allocates a continuation and runs the export
//! on it. The body runs synchronously up to its first suspension, so side
//! effects before that point are visible as soon as the call returns.

use super::continuation::{self, ContinuationId, Outcome};
use crate::config::Completion;
use crate::engine::Engine;
use crate::error::Error;
use crate::host::{HostFunction, HostValue, Promise};
use crate::module::{FunctionType, ValueType};
use crate::runtime::{FuncAddr, Value};
use std::rc::Rc;

#[derive(Debug)]
pub struct PromisingFunction {
    target: FuncAddr,
    /// Host-visible signature: the target's parameters without any token,
    /// and a single `externref` result
    visible: FunctionType,
    /// Whether the target takes the suspend-context token as its first
    /// parameter
    explicit: bool,
    completion: Completion,
}

impl PromisingFunction {
    pub(crate) fn new(target: FuncAddr, parameters: Vec<ValueType>, explicit: bool, completion: Completion) -> Self {
        PromisingFunction {
            target,
            visible: FunctionType::new(parameters, vec![ValueType::ExternRef]),
            explicit,
            completion,
        }
    }

    /// The host-visible type of the wrapper
    pub fn ty(&self) -> &FunctionType {
        &self.visible
    }

    pub fn target(&self) -> FuncAddr {
        self.target
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    fn arguments(&self, id: ContinuationId, args: &[HostValue]) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(self.visible.parameters.len() + 1);
        if self.explicit {
            values.push(Value::ExternRef(HostValue::Suspender(id)));
        }
        values.extend(HostValue::to_wasm_args(args, &self.visible.parameters)?);
        Ok(values)
    }

    /// Run the target on a fresh continuation
    ///
    /// Returns the promise of the call. In eager completion mode a call that
    /// finishes without suspending returns its result, or fails, directly.
    pub(crate) fn invoke(&self, engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
        let promise = Promise::pending(engine.jobs());
        let id = engine.continuations.create(promise.clone());

        let outcome = match self.arguments(id, args) {
            Ok(values) => continuation::start(engine, id, self.target, values),
            Err(error) => continuation::abandon(engine, id, error),
        };

        match (self.completion, outcome) {
            (Completion::Eager, Outcome::Completed(value)) => Ok(value),
            (Completion::Eager, Outcome::Failed(error)) => Err(error),
            (_, outcome) => {
                continuation::settle(&promise, outcome);
                Ok(HostValue::Promise(promise))
            }
        }
    }
}

/// `WebAssembly.promising(export)`
///
/// # Errors
/// `TypeError` unless `export` is an exported WebAssembly function
pub fn promising(engine: &Engine, export: &HostValue) -> Result<HostValue, Error> {
    let addr = match export {
        HostValue::Function(HostFunction::Wasm(addr)) => *addr,
        HostValue::Function(_) => {
            return Err(Error::Type(
                "WebAssembly.promising(): Argument 0 must be a WebAssembly exported function".to_string(),
            ))
        }
        _ => {
            return Err(Error::Type(
                "WebAssembly.promising(): Argument 0 must be a function".to_string(),
            ))
        }
    };
    let parameters = engine.store.function(addr)?.func_type().parameters.clone();
    let wrapper = PromisingFunction::new(addr, parameters, false, Completion::Promise);
    Ok(HostValue::Function(HostFunction::Promising(Rc::new(wrapper))))
}
