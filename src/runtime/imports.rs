//! Import resolution for WebAssembly modules
//!
//! An [`ImportObject`] maps `(module, name)` pairs to host values, the way a
//! JS embedder passes `{m: {import: f}}` to instantiation. Resolution decides
//! what kind of function instance each host value becomes:
//!
//! | host value                         | function instance                  |
//! |------------------------------------|------------------------------------|
//! | exported wasm function             | the exporter's own address         |
//! | `Suspending` object                | host import, implicit suspension   |
//! | typed function, `suspending: first`| host import, explicit token        |
//! | any other callable                 | host import, never suspends        |

use super::store::{FuncAddr, FunctionInstance, Store};
use crate::bridge::suspending::{HostImport, SuspendMode};
use crate::error::Error;
use crate::host::{Global, HostFunction, HostValue, Tag};
use crate::module::{FunctionType, GlobalType, Import, TagType};
use std::collections::HashMap;
use std::rc::Rc;

/// Container for imported values that a module can reference
#[derive(Debug, Clone, Default)]
pub struct ImportObject {
    entries: HashMap<(String, String), HostValue>,
}

impl ImportObject {
    /// Create a new empty import object
    pub fn new() -> Self {
        ImportObject::default()
    }

    pub fn add(&mut self, module: impl Into<String>, name: impl Into<String>, value: HostValue) -> &mut Self {
        self.entries.insert((module.into(), name.into()), value);
        self
    }

    /// Builder form of [`ImportObject::add`]
    pub fn with(mut self, module: impl Into<String>, name: impl Into<String>, value: HostValue) -> Self {
        self.add(module, name, value);
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&HostValue> {
        self.entries.get(&(module.to_string(), name.to_string()))
    }
}

fn mismatch(import: &Import, what: &str) -> Error {
    Error::Type(format!("import {}.{}: {what}", import.module, import.name))
}

/// Resolve a function import to an address in the store
///
/// # Errors
/// `TypeError` if the value is not callable, or carries a signature that
/// differs from the one the module expects.
pub(crate) fn resolve_function(
    store: &mut Store,
    value: &HostValue,
    expected: &FunctionType,
    import: &Import,
) -> Result<FuncAddr, Error> {
    let (callable, mode) = match value {
        HostValue::Function(HostFunction::Wasm(addr)) => {
            let actual = store.function(*addr)?.func_type();
            if actual != expected {
                return Err(mismatch(
                    import,
                    &format!("imported function does not match the expected type: {actual} vs {expected}"),
                ));
            }
            return Ok(*addr);
        }
        HostValue::Function(HostFunction::Typed(typed)) => {
            if &typed.func_type != expected {
                return Err(mismatch(
                    import,
                    &format!(
                        "imported function does not match the expected type: {} vs {expected}",
                        typed.func_type
                    ),
                ));
            }
            let mode = if typed.suspending {
                SuspendMode::Explicit
            } else {
                SuspendMode::Never
            };
            (typed.callable.clone(), mode)
        }
        HostValue::Suspending(suspending) => (suspending.callable().clone(), SuspendMode::Implicit),
        other if other.is_callable() => (other.clone(), SuspendMode::Never),
        _ => return Err(mismatch(import, "function import requires a callable")),
    };

    Ok(store.allocate_function(FunctionInstance::Host(Rc::new(HostImport {
        callable,
        func_type: expected.clone(),
        mode,
    }))))
}

/// Resolve a global import
///
/// A `WebAssembly.Global` of the same type is shared; a plain value creates a
/// fresh immutable global, which is only allowed for immutable imports.
pub(crate) fn resolve_global(value: &HostValue, expected: &GlobalType, import: &Import) -> Result<Global, Error> {
    match value {
        HostValue::Global(global) => {
            if global.global_type() != *expected {
                return Err(mismatch(import, "imported global does not match the expected type"));
            }
            Ok(global.clone())
        }
        _ if expected.mutable => Err(mismatch(import, "imported mutable global must be a WebAssembly.Global object")),
        other => Ok(Global::new(*expected, other.to_wasm(expected.value_type)?)),
    }
}

pub(crate) fn resolve_tag(value: &HostValue, expected: &TagType, import: &Import) -> Result<Tag, Error> {
    match value {
        HostValue::Tag(tag) if tag.parameters() == expected.parameters.as_slice() => Ok(tag.clone()),
        HostValue::Tag(_) => Err(mismatch(import, "imported tag does not match the expected type")),
        _ => Err(mismatch(import, "tag import requires a WebAssembly.Tag")),
    }
}
