//! The promise integration conformance suite
//!
//! Each [`Scenario`] builds its modules in memory, drives them through the
//! `WebAssembly` namespace builtins the way a host script would, and checks
//! the observable results. The `jspi` binary runs them all; the integration
//! tests run them one by one.

use crate::config::{Completion, EngineConfig};
use crate::engine::Engine;
use crate::error::Error;
use crate::host::{Exception, HostFunction, HostValue, Tag};
use crate::module::{BlockType, ExportIndex, FunctionType, GlobalType, Instruction, Module, TagType, ValueType};
use crate::runtime::{ImportObject, InstanceId, Value};
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::debug;

use Instruction::*;
use ValueType::{ExternRef, I32};

#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error(transparent)]
    Engine(#[from] Error),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub run: fn(&EngineConfig) -> Result<(), Failure>,
}

pub fn scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "invalid-wrappers",
            description: "wrapper constructors reject invalid arguments",
            run: invalid_wrappers,
        },
        Scenario {
            name: "runs-until-first-suspension",
            description: "a promising call runs its body synchronously",
            run: runs_until_first_suspension,
        },
        Scenario {
            name: "suspend-once",
            description: "Suspend once",
            run: suspend_once,
        },
        Scenario {
            name: "suspend-resume-loop",
            description: "Suspend/resume in a loop",
            run: suspend_resume_loop,
        },
        Scenario {
            name: "suspending-arity",
            description: "suspending callables with any arity, and forwarding callables",
            run: suspending_arity,
        },
        Scenario {
            name: "actually-suspends",
            description: "Make sure we actually suspend",
            run: actually_suspends,
        },
        Scenario {
            name: "plain-result-does-not-suspend",
            description: "Do not suspend if the import's return value is not a Promise",
            run: plain_result_does_not_suspend,
        },
        Scenario {
            name: "throw-after-first-suspension",
            description: "Throw after the first suspension",
            run: throw_after_first_suspension,
        },
        Scenario {
            name: "rejecting-promise",
            description: "Rejecting promise",
            run: rejecting_promise,
        },
        Scenario {
            name: "nested-with-suspension",
            description: "Test nested suspenders with suspension",
            run: |config| nested_suspenders(config, true),
        },
        Scenario {
            name: "nested-without-suspension",
            description: "Test nested suspenders with no suspension",
            run: |config| nested_suspenders(config, false),
        },
        Scenario {
            name: "invalid-suspender",
            description: "Call import with an invalid suspender",
            run: invalid_suspender,
        },
        Scenario {
            name: "throw-before-suspending",
            description: "an exception before suspending rejects the promise",
            run: throw_before_suspending,
        },
        Scenario {
            name: "throw-after-resume",
            description: "an exception after resuming rejects the promise",
            run: throw_after_resume,
        },
        Scenario {
            name: "rejection-caught-after-resume",
            description: "a rejection is caught by the handler around the suspending call",
            run: rejection_caught_after_resume,
        },
        Scenario {
            name: "no-return",
            description: "a promising function with no result is allowed",
            run: no_return,
        },
        Scenario {
            name: "stack-overflow",
            description: "unbounded recursion rejects with a RangeError",
            run: stack_overflow,
        },
        Scenario {
            name: "suspend-through-host-frames",
            description: "suspending across a host frame traps",
            run: suspend_through_host_frames,
        },
        Scenario {
            name: "cross-instance",
            description: "a continuation suspends inside another instance's function",
            run: cross_instance,
        },
        Scenario {
            name: "low-level-wrappers",
            description: "WebAssembly.Function with suspending and promising options",
            run: low_level_wrappers,
        },
    ]
}

/// Run one scenario by name
pub fn run(name: &str, config: &EngineConfig) -> Option<Result<(), Failure>> {
    scenarios()
        .into_iter()
        .find(|scenario| scenario.name == name)
        .map(|scenario| (scenario.run)(config))
}

pub fn run_all(config: &EngineConfig) -> Vec<(&'static str, Result<(), Failure>)> {
    scenarios()
        .into_iter()
        .map(|scenario| {
            debug!(scenario = scenario.name, "running");
            (scenario.name, (scenario.run)(config))
        })
        .collect()
}

// ============================================================================
// Helpers
// ============================================================================

fn sig(parameters: &[ValueType], results: &[ValueType]) -> FunctionType {
    FunctionType::new(parameters.to_vec(), results.to_vec())
}

fn ensure(condition: bool, message: impl Into<String>) -> Result<(), Failure> {
    if condition {
        Ok(())
    } else {
        Err(Failure::Assertion(message.into()))
    }
}

fn ensure_eq(actual: &HostValue, expected: &HostValue, what: &str) -> Result<(), Failure> {
    ensure(actual == expected, format!("{what}: expected {expected}, got {actual}"))
}

fn ensure_promise(value: &HostValue) -> Result<(), Failure> {
    ensure(value.as_promise().is_some(), format!("expected a promise, got {value}"))
}

/// `error` must be of `kind` with a message matching `pattern`
fn ensure_error(result: Result<HostValue, Error>, kind: &str, pattern: &str) -> Result<(), Failure> {
    let error = match result {
        Ok(value) => return Err(Failure::Assertion(format!("expected {kind}, got {value}"))),
        Err(error) => error,
    };
    let re = Regex::new(pattern).map_err(|e| Failure::Assertion(format!("bad pattern {pattern}: {e}")))?;
    ensure(
        error.kind() == kind && re.is_match(&error.message()),
        format!("expected {kind} matching /{pattern}/, got {error}"),
    )
}

/// `result` must be the tag exception `tag` with an empty payload
fn ensure_tag_exception(result: Result<HostValue, Error>, tag: &Tag) -> Result<(), Failure> {
    match result {
        Err(Error::Exception(exception)) if exception.is(tag) && exception.payload().is_empty() => Ok(()),
        Err(error) => Err(Failure::Assertion(format!("expected the tag's exception, got {error}"))),
        Ok(value) => Err(Failure::Assertion(format!("expected a rejection, got {value}"))),
    }
}

fn suspending(engine: &mut Engine, callable: HostValue) -> Result<HostValue, Error> {
    let constructor = engine.namespace().get("Suspending");
    engine.construct(&constructor, &[callable])
}

fn promising(engine: &mut Engine, export: &HostValue) -> Result<HostValue, Error> {
    let promising = engine.namespace().get("promising");
    engine.call(&promising, &[export.clone()])
}

fn resolving_to(value: HostValue) -> HostValue {
    HostValue::function("import", move |engine, _| Ok(engine.promise_resolve(value.clone()).into()))
}

/// `new WebAssembly.Function({parameters, results}, target, {key: "first"})`
fn low_level(
    engine: &mut Engine,
    signature: &FunctionType,
    target: HostValue,
    key: &str,
) -> Result<HostValue, Error> {
    let names = |types: &[ValueType]| HostValue::array(types.iter().map(|t| HostValue::from(t.to_string().as_str())).collect());
    let descriptor = HostValue::object([
        ("parameters", names(&signature.parameters)),
        ("results", names(&signature.return_types)),
    ]);
    let options = HostValue::object([(key, HostValue::from("first"))]);
    let constructor = engine.namespace().get("Function");
    engine.construct(&constructor, &[descriptor, target, options])
}

fn global_value(engine: &Engine, id: InstanceId, name: &str) -> Result<HostValue, Failure> {
    match engine.export(id, name)? {
        HostValue::Global(global) => Ok(global.value()),
        other => Err(Failure::Assertion(format!("export {name} is not a global: {other}"))),
    }
}

/// `test(x) = import(x)` with a single `i32 -> i32` import
fn forwarding_module() -> Result<Module, Error> {
    let mut module = Module::new("forwarding");
    let import = module.add_import_function("m", "import", sig(&[I32], &[I32]))?;
    let test = module.add_function(sig(&[I32], &[I32]), vec![], vec![LocalGet(0), Call(import)]);
    module.export("test", ExportIndex::Function(test));
    Ok(module)
}

/// `test()` with `[import]` and an imported tag, followed by `body`
fn tagged_module(import: &[ValueType], tag: &[ValueType], body: Vec<Instruction>) -> Result<Module, Error> {
    let mut module = Module::new("tagged");
    module.add_import_function("m", "import", sig(import, &[I32]))?;
    module.add_import_tag("m", "tag", TagType { parameters: tag.to_vec() })?;
    let test = module.add_function(sig(import, &[I32]), vec![], body);
    module.export("test", ExportIndex::Function(test));
    Ok(module)
}

/// Host log of the `A before B` scenarios: wasm calls `setA` after its
/// import returns, the host calls `setB` right after the promising call
fn ordering_scenario(config: &EngineConfig, import42: HostValue, a_before_b: bool) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("ordering");
    let import42_index = module.add_import_function("m", "import42", sig(&[I32], &[I32]))?;
    let set_a_index = module.add_import_function("m", "setA", sig(&[], &[]))?;
    let test = module.add_function(
        sig(&[I32], &[I32]),
        vec![],
        vec![LocalGet(0), Call(import42_index), Call(set_a_index)],
    );
    module.export("test", ExportIndex::Function(test));

    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    let set_a = HostValue::function("setA", move |_, _| {
        sink.borrow_mut().push("A");
        Ok(HostValue::Undefined)
    });
    let import42 = suspending(&mut engine, import42)?;
    let imports = ImportObject::new().with("m", "import42", import42).with("m", "setA", set_a);
    let id = engine.instantiate(&module, &imports)?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    log.borrow_mut().push("B");

    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "result")?;
    let expected = if a_before_b { ["A", "B"] } else { ["B", "A"] };
    let seen = log.borrow().clone();
    ensure(seen == expected, format!("expected log {expected:?}, got {seen:?}"))
}

// ============================================================================
// Scenarios
// ============================================================================

fn invalid_wrappers(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let namespace = engine.namespace();
    let promising_fn = namespace.get("promising");
    let suspending_ctor = namespace.get("Suspending");
    let empty = HostValue::object(Vec::<(String, HostValue)>::new());
    let arrow = HostValue::function("", |_, _| Ok(HostValue::Undefined));
    // A compiled asm.js module's export is a plain host function too
    let asm = HostValue::function("x", |_, args| {
        let v = args.first().cloned().unwrap_or(HostValue::Undefined);
        Ok(HostValue::from(to_i32(&v)?))
    });

    ensure_error(
        engine.call(&promising_fn, &[empty.clone()]),
        "TypeError",
        "Argument 0 must be a function",
    )?;
    ensure_error(
        engine.call(&promising_fn, &[arrow.clone()]),
        "TypeError",
        "Argument 0 must be a WebAssembly exported function",
    )?;
    ensure_error(
        engine.call(&suspending_ctor, &[arrow]),
        "TypeError",
        "WebAssembly.Suspending must be invoked with 'new'",
    )?;
    ensure_error(
        engine.construct(&suspending_ctor, &[empty]),
        "TypeError",
        "Argument 0 must be a function",
    )?;
    ensure_error(
        engine.call(&promising_fn, &[asm]),
        "TypeError",
        "Argument 0 must be a WebAssembly exported function",
    )
}

fn to_i32(value: &HostValue) -> Result<i32, Error> {
    match value.to_wasm(I32)? {
        Value::I32(v) => Ok(v),
        other => Err(Error::Runtime(format!("unexpected {other}"))),
    }
}

fn runs_until_first_suspension(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("sync");
    let g = module.add_global(
        GlobalType {
            value_type: I32,
            mutable: true,
        },
        Value::I32(0),
    );
    module.export("g", ExportIndex::Global(g));
    let test = module.add_function(sig(&[], &[I32]), vec![], vec![I32Const(42), GlobalSet(g), I32Const(0)]);
    module.export("test", ExportIndex::Function(test));
    let id = engine.instantiate(&module, &ImportObject::new())?;

    let export = engine.export(id, "test")?;
    let wrapper = promising(&mut engine, &export)?;
    engine.call(&wrapper, &[])?;
    ensure_eq(&global_value(&engine, id, "g")?, &HostValue::Number(42.0), "g")
}

fn suspend_once(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let import = suspending(&mut engine, resolving_to(HostValue::Number(42.0)))?;
    let id = engine.instantiate(&forwarding_module()?, &ImportObject::new().with("m", "import", import))?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_promise(&promise)?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "result")
}

fn suspend_resume_loop(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("loop");
    let import = module.add_import_function("m", "import", sig(&[I32], &[I32]))?;
    let g = module.add_global(
        GlobalType {
            value_type: I32,
            mutable: true,
        },
        Value::I32(0),
    );
    module.export("g", ExportIndex::Global(g));
    // for (i = 5; i != 0; --i) g = g + await import(x)
    let test = module.add_function(
        sig(&[I32], &[]),
        vec![I32],
        vec![
            I32Const(5),
            LocalSet(1),
            Loop(BlockType::Empty),
            LocalGet(0),
            Call(import),
            GlobalGet(g),
            I32Add,
            GlobalSet(g),
            LocalGet(1),
            I32Const(1),
            I32Sub,
            LocalTee(1),
            BrIf(0),
            End,
        ],
    );
    module.export("test", ExportIndex::Function(test));

    let counter = Rc::new(Cell::new(0_i32));
    let js_import = HostValue::function("import", move |engine, _| {
        counter.set(counter.get() + 1);
        Ok(engine.promise_resolve(HostValue::from(counter.get())).into())
    });
    let import = suspending(&mut engine, js_import)?;
    let id = engine.instantiate(&module, &ImportObject::new().with("m", "import", import))?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_eq(&global_value(&engine, id, "g")?, &HostValue::Number(0.0), "g before resuming")?;
    ensure_promise(&promise)?;
    engine.block_on(&promise)?;
    ensure_eq(&global_value(&engine, id, "g")?, &HostValue::Number(15.0), "g after the loop")
}

fn suspending_arity(config: &EngineConfig) -> Result<(), Failure> {
    let mut module = Module::new("arity");
    let import = module.add_import_function("m", "import", sig(&[], &[I32]))?;
    let test = module.add_function(sig(&[], &[I32]), vec![], vec![Call(import)]);
    module.export("test", ExportIndex::Function(test));

    let target = resolving_to(HostValue::Number(42.0));
    let unused_parameter = HostValue::function("import", |engine, args| {
        let _unused = args.first();
        Ok(engine.promise_resolve(HostValue::Number(42.0)).into())
    });
    let forwarded = target.clone();
    let proxy = HostValue::function("proxy", move |engine, args| engine.call(&forwarded, args));

    for callable in [target, unused_parameter, proxy] {
        let mut engine = Engine::with_config(config.clone());
        let import = suspending(&mut engine, callable)?;
        let id = engine.instantiate(&module, &ImportObject::new().with("m", "import", import))?;
        let export = engine.export(id, "test")?;
        let wrapped = promising(&mut engine, &export)?;
        let promise = engine.call(&wrapped, &[])?;
        ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "result")?;
    }
    Ok(())
}

fn actually_suspends(config: &EngineConfig) -> Result<(), Failure> {
    ordering_scenario(config, resolving_to(HostValue::Number(42.0)), false)
}

fn plain_result_does_not_suspend(config: &EngineConfig) -> Result<(), Failure> {
    let import42 = HostValue::function("import42", |_, _| Ok(HostValue::Number(42.0)));
    ordering_scenario(config, import42, true)
}

fn throw_after_first_suspension(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let tag = Tag::new(vec![]);
    let module = tagged_module(&[I32], &[], vec![LocalGet(0), Call(0), Throw(0)])?;
    let import = suspending(&mut engine, resolving_to(HostValue::Undefined))?;
    let imports = ImportObject::new()
        .with("m", "import", import)
        .with("m", "tag", tag.clone().into());
    let id = engine.instantiate(&module, &imports)?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_promise(&promise)?;
    ensure_tag_exception(engine.block_on(&promise), &tag)
}

fn rejecting_import(tag: &Tag) -> Result<HostValue, Error> {
    let exception = Exception::from_host(tag, &[HostValue::Number(42.0)])?;
    Ok(HostValue::function("import", move |engine, _| {
        Ok(engine.promise_reject(Error::Exception(exception.clone())).into())
    }))
}

fn rejecting_promise(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let tag = Tag::new(vec![I32]);
    let body = vec![Try(BlockType::Value(I32)), LocalGet(0), Call(0), Catch(0), End];
    let module = tagged_module(&[I32], &[I32], body)?;
    let import = suspending(&mut engine, rejecting_import(&tag)?)?;
    let imports = ImportObject::new()
        .with("m", "import", import)
        .with("m", "tag", tag.into());
    let id = engine.instantiate(&module, &imports)?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_promise(&promise)?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "result")
}

/// outer (wasm) -> outer (host) -> inner (wasm) -> inner (host)
///
/// With `suspend`, the inner host function returns a promise that suspends
/// the inner continuation; its promise in turn suspends the outer one.
fn nested_suspenders(config: &EngineConfig, suspend: bool) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("nested");
    let inner_index = module.add_import_function("m", "inner", sig(&[I32], &[I32]))?;
    let outer_index = module.add_import_function("m", "outer", sig(&[I32], &[I32]))?;
    let outer = module.add_function(sig(&[I32], &[I32]), vec![], vec![LocalGet(0), Call(outer_index)]);
    module.export("outer", ExportIndex::Function(outer));
    let inner = module.add_function(sig(&[I32], &[I32]), vec![], vec![LocalGet(0), Call(inner_index)]);
    module.export("inner", ExportIndex::Function(inner));

    let inner_js = HostValue::function("inner", move |engine, _| {
        Ok(if suspend {
            engine.promise_resolve(HostValue::Number(42.0)).into()
        } else {
            HostValue::Number(43.0)
        })
    });
    let export_inner = Rc::new(RefCell::new(HostValue::Undefined));
    let target = Rc::clone(&export_inner);
    let outer_js = HostValue::function("outer", move |engine, _| {
        let export_inner = target.borrow().clone();
        engine.call(&export_inner, &[])
    });

    let imports = ImportObject::new()
        .with("m", "inner", suspending(&mut engine, inner_js)?)
        .with("m", "outer", suspending(&mut engine, outer_js)?);
    let id = engine.instantiate(&module, &imports)?;
    let inner_export = engine.export(id, "inner")?;
    *export_inner.borrow_mut() = promising(&mut engine, &inner_export)?;
    let export = engine.export(id, "outer")?;
    let export_outer = promising(&mut engine, &export)?;

    let result = engine.call(&export_outer, &[])?;
    ensure_promise(&result)?;
    let expected = if suspend { 42.0 } else { 43.0 };
    ensure_eq(&engine.block_on(&result)?, &HostValue::Number(expected), "result")
}

fn invalid_suspender(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = forwarding_module()?;
    let return_suspender = module.add_function(sig(&[I32], &[I32]), vec![], vec![LocalGet(0)]);
    module.export("return_suspender", ExportIndex::Function(return_suspender));
    let import = suspending(&mut engine, resolving_to(HostValue::Number(42.0)))?;
    let id = engine.instantiate(&module, &ImportObject::new().with("m", "import", import))?;

    let export = engine.export(id, "return_suspender")?;
    let suspender = promising(&mut engine, &export)?;
    let suspender = engine.call(&suspender, &[])?;
    let test = engine.export(id, "test")?;
    let empty = HostValue::object(Vec::<(String, HostValue)>::new());
    for s in [suspender, HostValue::Null, HostValue::Undefined, empty] {
        ensure_error(engine.call(&test, &[s]), "RuntimeError", "")?;
    }
    Ok(())
}

fn throw_before_suspending(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let tag = Tag::new(vec![]);
    let mut module = Module::new("throw");
    let tag_index = module.add_import_tag("m", "tag", TagType { parameters: vec![] })?;
    let test = module.add_function(sig(&[], &[I32]), vec![], vec![Throw(tag_index)]);
    module.export("test", ExportIndex::Function(test));
    let id = engine.instantiate(&module, &ImportObject::new().with("m", "tag", tag.clone().into()))?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_promise(&promise)?;
    ensure_tag_exception(engine.block_on(&promise), &tag)
}

fn throw_after_resume(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let tag = Tag::new(vec![]);
    let module = tagged_module(&[], &[], vec![Call(0), Throw(0)])?;
    let import = suspending(&mut engine, resolving_to(HostValue::Number(42.0)))?;
    let imports = ImportObject::new()
        .with("m", "import", import)
        .with("m", "tag", tag.clone().into());
    let id = engine.instantiate(&module, &imports)?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_tag_exception(engine.block_on(&promise), &tag)
}

fn rejection_caught_after_resume(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let tag = Tag::new(vec![I32]);
    let body = vec![Try(BlockType::Value(I32)), Call(0), Catch(0), End];
    let module = tagged_module(&[], &[I32], body)?;
    let import = suspending(&mut engine, rejecting_import(&tag)?)?;
    let imports = ImportObject::new()
        .with("m", "import", import)
        .with("m", "tag", tag.into());
    let id = engine.instantiate(&module, &imports)?;

    let export = engine.export(id, "test")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "result")
}

fn no_return(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("void");
    let export = module.add_function(sig(&[], &[]), vec![], vec![]);
    module.export("export", ExportIndex::Function(export));
    let id = engine.instantiate(&module, &ImportObject::new())?;

    let export = engine.export(id, "export")?;
    let wrapper = promising(&mut engine, &export)?;
    match &wrapper {
        HostValue::Function(HostFunction::Promising(promising)) => {
            ensure(promising.ty().parameters.is_empty(), "wrapper has no parameters")?;
            ensure(promising.ty().return_types == [ExternRef], "wrapper returns externref")?;
        }
        other => return Err(Failure::Assertion(format!("expected a promising function, got {other}"))),
    }
    let promise = engine.call(&wrapper, &[])?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Undefined, "result")
}

fn stack_overflow(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("recursion");
    let test = module.add_function(sig(&[], &[I32]), vec![], vec![Call(0)]);
    module.export("test", ExportIndex::Function(test));
    let id = engine.instantiate(&module, &ImportObject::new())?;

    let export = engine.export(id, "test")?;
    let wrapper = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapper, &[])?;
    ensure_promise(&promise)?;
    ensure_error(engine.block_on(&promise), "RangeError", "Maximum call stack size exceeded")
}

/// export1 (promising) -> import1 (plain host) -> export2 -> import2 (suspending)
fn suspend_through_host_frames(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("frames");
    let import1_index = module.add_import_function("m", "import1", sig(&[], &[I32]))?;
    let import2_index = module.add_import_function("m", "import2", sig(&[], &[I32]))?;
    let export1 = module.add_function(sig(&[], &[I32]), vec![], vec![Call(import1_index)]);
    module.export("export1", ExportIndex::Function(export1));
    let export2 = module.add_function(sig(&[], &[I32]), vec![], vec![Call(import2_index)]);
    module.export("export2", ExportIndex::Function(export2));

    let export2_slot = Rc::new(RefCell::new(HostValue::Undefined));
    let target = Rc::clone(&export2_slot);
    let import1 = HostValue::function("import1", move |engine, _| {
        let export2 = target.borrow().clone();
        engine.call(&export2, &[])?;
        Ok(HostValue::Undefined)
    });
    let import2 = suspending(&mut engine, resolving_to(HostValue::Number(0.0)))?;
    let imports = ImportObject::new().with("m", "import1", import1).with("m", "import2", import2);
    let id = engine.instantiate(&module, &imports)?;
    *export2_slot.borrow_mut() = engine.export(id, "export2")?;

    let export = engine.export(id, "export1")?;
    let wrapper = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapper, &[])?;
    ensure_error(engine.block_on(&promise), "RuntimeError", "trying to suspend JS frames")
}

fn cross_instance(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let body = |import| vec![Call(import), I32Const(1), I32Add];

    let mut module1 = Module::new("one");
    let import = module1.add_import_function("m", "import", sig(&[], &[I32]))?;
    let f = module1.add_function(sig(&[], &[I32]), vec![], body(import));
    module1.export("f", ExportIndex::Function(f));
    let js_import = suspending(&mut engine, resolving_to(HostValue::Number(1.0)))?;
    let instance1 = engine.instantiate(&module1, &ImportObject::new().with("m", "import", js_import))?;

    let mut module2 = Module::new("two");
    let import = module2.add_import_function("m", "import", sig(&[], &[I32]))?;
    let main = module2.add_function(sig(&[], &[I32]), vec![], body(import));
    module2.export("main", ExportIndex::Function(main));
    let f = engine.export(instance1, "f")?;
    let instance2 = engine.instantiate(&module2, &ImportObject::new().with("m", "import", f))?;

    let export = engine.export(instance2, "main")?;
    let wrapped = promising(&mut engine, &export)?;
    let promise = engine.call(&wrapped, &[])?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(3.0), "result")
}

fn low_level_wrappers(config: &EngineConfig) -> Result<(), Failure> {
    let mut engine = Engine::with_config(config.clone());
    let mut module = Module::new("low-level");
    let import = module.add_import_function("m", "import", sig(&[ExternRef, I32], &[I32]))?;
    let answer = module.add_function(sig(&[ExternRef], &[I32]), vec![], vec![I32Const(42)]);
    module.export("answer", ExportIndex::Function(answer));
    let wait = module.add_function(
        sig(&[ExternRef, I32], &[I32]),
        vec![],
        vec![LocalGet(0), LocalGet(1), Call(import)],
    );
    module.export("wait", ExportIndex::Function(wait));

    // The suspender token is stripped before the callable sees its arguments
    let increment = HostValue::function("increment", |engine, args| {
        let x = args.first().cloned().unwrap_or(HostValue::Undefined).to_number()?;
        Ok(engine.promise_resolve(HostValue::Number(x + 1.0)).into())
    });
    let import = low_level(&mut engine, &sig(&[ExternRef, I32], &[I32]), increment, "suspending")?;
    let id = engine.instantiate(&module, &ImportObject::new().with("m", "import", import))?;

    let export = engine.export(id, "answer")?;
    let answer = low_level(&mut engine, &sig(&[], &[ExternRef]), export, "promising")?;
    let result = engine.call(&answer, &[])?;
    match config.completion {
        Completion::Eager => ensure_eq(&result, &HostValue::Number(42.0), "eager result")?,
        Completion::Promise => {
            ensure_promise(&result)?;
            ensure_eq(&engine.block_on(&result)?, &HostValue::Number(42.0), "result")?;
        }
    }

    let export = engine.export(id, "wait")?;
    let wait = low_level(&mut engine, &sig(&[I32], &[ExternRef]), export, "promising")?;
    let promise = engine.call(&wait, &[HostValue::Number(41.0)])?;
    ensure_promise(&promise)?;
    ensure_eq(&engine.block_on(&promise)?, &HostValue::Number(42.0), "suspended result")?;
    ensure(engine.continuations().live() == 0, "every continuation finished")
}
