//! Common test utilities shared between integration tests

#![allow(dead_code)]

use jspi::host::HostValue;
use jspi::module::{FunctionType, ValueType};
use jspi::Engine;
use std::cell::RefCell;
use std::rc::Rc;

pub fn sig(params: &[ValueType], results: &[ValueType]) -> FunctionType {
    FunctionType::new(params.to_vec(), results.to_vec())
}

/// A `{parameters, results}` descriptor for `WebAssembly.Function`
pub fn descriptor(params: &[ValueType], results: &[ValueType]) -> HostValue {
    let names = |types: &[ValueType]| HostValue::array(types.iter().map(|t| HostValue::from(t.to_string().as_str())).collect());
    HostValue::object([("parameters", names(params)), ("results", names(results))])
}

pub fn options(key: &str) -> HostValue {
    HostValue::object([(key, HostValue::from("first"))])
}

pub fn empty_object() -> HostValue {
    HostValue::object(Vec::<(String, HostValue)>::new())
}

/// `new WebAssembly.Suspending(callable)`
pub fn suspending(engine: &mut Engine, callable: HostValue) -> HostValue {
    let constructor = engine.namespace().get("Suspending");
    engine.construct(&constructor, &[callable]).unwrap()
}

/// `WebAssembly.promising(export)`
pub fn promising(engine: &mut Engine, export: HostValue) -> HostValue {
    let promising = engine.namespace().get("promising");
    engine.call(&promising, &[export]).unwrap()
}

/// `new WebAssembly.Function(descriptor, target, options)`
pub fn function(engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, jspi::Error> {
    let constructor = engine.namespace().get("Function");
    engine.construct(&constructor, args)
}

/// A host function returning an already fulfilled promise of `value`
pub fn resolving_to(value: HostValue) -> HostValue {
    HostValue::function("resolving", move |engine, _| {
        Ok(engine.promise_resolve(value.clone()).into())
    })
}

/// Shared log that host functions append to, in call order
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<String>>>);

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    /// A host function that logs `name` followed by its arguments
    pub fn function(&self, name: &'static str) -> HostValue {
        let log = self.clone();
        HostValue::function(name, move |_, args| {
            let mut entry = name.to_string();
            for arg in args {
                entry.push_str(&format!(" {arg}"));
            }
            log.push(entry);
            Ok(HostValue::Undefined)
        })
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}
