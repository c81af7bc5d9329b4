//! Integration tests for the suspending and promising wrappers

mod common;

#[cfg(test)]
mod tests {
    use crate::common::*;
    use jspi::host::{Exception, HostValue, PromiseState, Tag};
    use jspi::module::{BlockType, ExportIndex, Instruction, Module};
    use jspi::module::ValueType::{ExternRef, I32};
    use jspi::runtime::ImportObject;
    use jspi::{Completion, Engine, EngineConfig, Error};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rstest::rstest;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use Instruction::*;

    /*
     * Low-level wrappers, suspend-context validation, completion modes and
     * resumption ordering. The high-level API is covered end to end by the
     * conformance scenarios.
     */

    /// `test(token, x) = import(token, x)` with a low-level suspending import
    fn low_level_module() -> Module {
        let mut module = Module::new("low");
        let import = module
            .add_import_function("m", "import", sig(&[ExternRef, I32], &[I32]))
            .unwrap();
        let test = module.add_function(
            sig(&[ExternRef, I32], &[I32]),
            vec![],
            vec![LocalGet(0), LocalGet(1), Call(import)],
        );
        module.export("test", ExportIndex::Function(test));
        module
    }

    /// `test(x) = import(x)` with an `i32 -> i32` import
    fn forwarding_module() -> Module {
        let mut module = Module::new("forwarding");
        let import = module.add_import_function("m", "import", sig(&[I32], &[I32])).unwrap();
        let test = module.add_function(sig(&[I32], &[I32]), vec![], vec![LocalGet(0), Call(import)]);
        module.export("test", ExportIndex::Function(test));
        module
    }

    /// `test() = try (import()) catch_all (7)`
    fn catch_all_module() -> Module {
        let mut module = Module::new("catch_all");
        let import = module.add_import_function("m", "import", sig(&[], &[I32])).unwrap();
        let test = module.add_function(
            sig(&[], &[I32]),
            vec![],
            vec![Try(BlockType::Value(I32)), Call(import), CatchAll, I32Const(7), End],
        );
        module.export("test", ExportIndex::Function(test));
        module
    }

    fn run_promising(engine: &mut Engine, module: &Module, import: HostValue, args: &[HostValue]) -> Result<HostValue, Error> {
        let id = engine.instantiate(module, &ImportObject::new().with("m", "import", import))?;
        let export = engine.export(id, "test")?;
        let wrapped = promising(engine, export);
        let promise = engine.call(&wrapped, args)?;
        assert!(promise.as_promise().is_some(), "promising calls return a promise");
        engine.block_on(&promise)
    }

    // ============================================================================
    // Low-level wrappers
    // ============================================================================

    #[test]
    fn test_low_level_suspend_strips_token() {
        let mut engine = Engine::new();
        let seen = Recorder::new();
        let log = seen.clone();
        let double = HostValue::function("double", move |engine, args| {
            log.push(format!("{} args", args.len()));
            let x = args[0].to_number()?;
            Ok(engine.promise_resolve(HostValue::Number(x * 2.0)).into())
        });
        let import = function(
            &mut engine,
            &[descriptor(&[ExternRef, I32], &[I32]), double, options("suspending")],
        )
        .unwrap();
        let id = engine
            .instantiate(&low_level_module(), &ImportObject::new().with("m", "import", import))
            .unwrap();

        let export = engine.export(id, "test").unwrap();
        let wrapper = function(&mut engine, &[descriptor(&[I32], &[ExternRef]), export, options("promising")]).unwrap();
        let promise = engine.call(&wrapper, &[HostValue::Number(21.0)]).unwrap();

        assert!(promise.as_promise().is_some());
        assert_eq!(engine.block_on(&promise).unwrap(), HostValue::Number(42.0));
        assert_eq!(seen.entries(), vec!["1 args"]);
    }

    #[test]
    fn test_low_level_adopts_thenables() {
        let mut engine = Engine::new();
        let then = HostValue::function("then", |engine, args| {
            let resolve = args[0].clone();
            engine.call(&resolve, &[HostValue::Number(7.0)])
        });
        let thenable = HostValue::object([("then", then)]);
        let callable = HostValue::function("thenable", move |_, _| Ok(thenable.clone()));
        let import = function(
            &mut engine,
            &[descriptor(&[ExternRef, I32], &[I32]), callable, options("suspending")],
        )
        .unwrap();
        let id = engine
            .instantiate(&low_level_module(), &ImportObject::new().with("m", "import", import))
            .unwrap();

        let export = engine.export(id, "test").unwrap();
        let wrapper = function(&mut engine, &[descriptor(&[I32], &[ExternRef]), export, options("promising")]).unwrap();
        let promise = engine.call(&wrapper, &[]).unwrap();
        assert_eq!(engine.continuations().live(), 1, "the thenable suspended the call");
        assert_eq!(engine.block_on(&promise).unwrap(), HostValue::Number(7.0));
    }

    #[test]
    fn test_high_level_does_not_suspend_on_thenables() {
        let mut engine = Engine::new();
        let mut module = Module::new("thenable");
        let import = module
            .add_import_function("m", "import", sig(&[I32], &[ExternRef]))
            .unwrap();
        let test = module.add_function(sig(&[I32], &[ExternRef]), vec![], vec![LocalGet(0), Call(import)]);
        module.export("test", ExportIndex::Function(test));

        let then = HostValue::function("then", |engine, args| {
            let resolve = args[0].clone();
            engine.call(&resolve, &[HostValue::Number(5.0)])
        });
        let thenable = HostValue::object([("then", then)]);
        let callable = HostValue::function("thenable", move |_, _| Ok(thenable.clone()));
        let import = suspending(&mut engine, callable);
        let id = engine
            .instantiate(&module, &ImportObject::new().with("m", "import", import))
            .unwrap();

        let export = engine.export(id, "test").unwrap();
        let wrapped = promising(&mut engine, export);
        let promise = engine.call(&wrapped, &[]).unwrap();
        assert_eq!(engine.continuations().live(), 0, "completed without suspending");
        // The promise of the call adopts the returned thenable
        assert_eq!(engine.block_on(&promise).unwrap(), HostValue::Number(5.0));
    }

    #[test]
    fn test_typed_import_signature_mismatch_fails_instantiation() {
        let mut engine = Engine::new();
        let import = function(
            &mut engine,
            &[descriptor(&[ExternRef], &[I32]), resolving_to(1.into()), options("suspending")],
        )
        .unwrap();
        let err = engine
            .instantiate(&low_level_module(), &ImportObject::new().with("m", "import", import))
            .unwrap_err();
        assert_eq!(err.kind(), "TypeError");
    }

    #[test]
    fn test_promising_option_checks_export_signature() {
        let mut engine = Engine::new();
        let id = engine
            .instantiate(&forwarding_module(), &ImportObject::new().with("m", "import", resolving_to(1.into())))
            .unwrap();
        let export = engine.export(id, "test").unwrap();
        let err = function(&mut engine, &[descriptor(&[I32], &[ExternRef]), export, options("promising")]).unwrap_err();
        assert_eq!(err.kind(), "TypeError");
    }

    // ============================================================================
    // Suspend context validation
    // ============================================================================

    #[derive(Debug, Clone, Copy)]
    enum Token {
        /// The token of a continuation that has completed
        Stale,
        Null,
        Undefined,
        EmptyObject,
        Number,
        /// The token of a live continuation that is suspended, not running
        Inactive,
    }

    #[rstest]
    #[case(Token::Stale)]
    #[case(Token::Null)]
    #[case(Token::Undefined)]
    #[case(Token::EmptyObject)]
    #[case(Token::Number)]
    #[case(Token::Inactive)]
    fn test_invalid_suspend_context_traps(#[case] token: Token) {
        let mut engine = Engine::new();
        let mut module = Module::new("tokens");
        let import = module
            .add_import_function("m", "import", sig(&[ExternRef, I32], &[I32]))
            .unwrap();
        let stash = module.add_import_function("m", "stash", sig(&[ExternRef], &[])).unwrap();
        let wait = module.add_import_function("m", "wait", sig(&[ExternRef], &[I32])).unwrap();
        // test(token, s) = import(s, 0)
        let test = module.add_function(
            sig(&[ExternRef, ExternRef], &[I32]),
            vec![],
            vec![LocalGet(1), I32Const(0), Call(import)],
        );
        module.export("test", ExportIndex::Function(test));
        // leak(token) = token
        let leak = module.add_function(sig(&[ExternRef], &[ExternRef]), vec![], vec![LocalGet(0)]);
        module.export("leak", ExportIndex::Function(leak));
        // hold(token) = stash(token); wait(token)
        let hold = module.add_function(
            sig(&[ExternRef], &[I32]),
            vec![],
            vec![LocalGet(0), Call(stash), LocalGet(0), Call(wait)],
        );
        module.export("hold", ExportIndex::Function(hold));

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let callable = HostValue::function("import", move |engine, _| {
            counter.set(counter.get() + 1);
            Ok(engine.promise_resolve(42.into()).into())
        });
        let stashed = Rc::new(RefCell::new(HostValue::Undefined));
        let slot = Rc::clone(&stashed);
        let stash = HostValue::function("stash", move |_, args| {
            *slot.borrow_mut() = args[0].clone();
            Ok(HostValue::Undefined)
        });
        let never = HostValue::function("wait", |engine, _| Ok(engine.deferred().0.into()));

        let import = function(&mut engine, &[descriptor(&[ExternRef, I32], &[I32]), callable, options("suspending")]).unwrap();
        let wait = function(&mut engine, &[descriptor(&[ExternRef], &[I32]), never, options("suspending")]).unwrap();
        let imports = ImportObject::new()
            .with("m", "import", import)
            .with("m", "stash", stash)
            .with("m", "wait", wait);
        let id = engine.instantiate(&module, &imports).unwrap();

        let wrap = |engine: &mut Engine, name: &str, params: &[jspi::module::ValueType]| {
            let export = engine.export(id, name).unwrap();
            function(engine, &[descriptor(params, &[ExternRef]), export, options("promising")]).unwrap()
        };
        let test = wrap(&mut engine, "test", &[ExternRef]);
        let leak = wrap(&mut engine, "leak", &[]);
        let hold = wrap(&mut engine, "hold", &[]);

        let value = match token {
            Token::Stale => {
                let promise = engine.call(&leak, &[]).unwrap();
                let token = engine.block_on(&promise).unwrap();
                assert!(matches!(token, HostValue::Suspender(_)));
                token
            }
            Token::Null => HostValue::Null,
            Token::Undefined => HostValue::Undefined,
            Token::EmptyObject => empty_object(),
            Token::Number => HostValue::Number(1.0),
            Token::Inactive => {
                let pending = engine.call(&hold, &[]).unwrap();
                engine.run_microtasks();
                assert!(matches!(pending.as_promise().unwrap().state(), PromiseState::Pending));
                let token = stashed.borrow().clone();
                assert!(matches!(token, HostValue::Suspender(_)));
                token
            }
        };

        let promise = engine.call(&test, &[value]).unwrap();
        let err = engine.block_on(&promise).unwrap_err();
        assert_eq!(err.kind(), "RuntimeError");
        assert_eq!(err.message(), "invalid suspender object for suspend");
        assert_eq!(calls.get(), 0, "the callable never runs with an invalid token");
    }

    #[test]
    fn test_suspending_import_outside_promising_traps() {
        let mut engine = Engine::new();
        let import = suspending(&mut engine, resolving_to(42.into()));
        let id = engine
            .instantiate(&forwarding_module(), &ImportObject::new().with("m", "import", import))
            .unwrap();
        let test = engine.export(id, "test").unwrap();
        let err = engine.call(&test, &[1.into()]).unwrap_err();
        assert_eq!(err.kind(), "RuntimeError");
        assert_eq!(err.message(), "trying to suspend without WebAssembly.promising");
    }

    #[test]
    fn test_low_level_import_called_from_host_validates_token() {
        let mut engine = Engine::new();
        let import = function(
            &mut engine,
            &[descriptor(&[ExternRef, I32], &[I32]), resolving_to(1.into()), options("suspending")],
        )
        .unwrap();
        let err = engine.call(&import, &[HostValue::Null, 1.into()]).unwrap_err();
        assert_eq!(err.message(), "invalid suspender object for suspend");
    }

    // ============================================================================
    // Completion modes
    // ============================================================================

    fn eager_module() -> Module {
        let mut module = Module::new("eager");
        let import = module
            .add_import_function("m", "import", sig(&[ExternRef, I32], &[I32]))
            .unwrap();
        let answer = module.add_function(sig(&[ExternRef], &[I32]), vec![], vec![I32Const(42)]);
        module.export("answer", ExportIndex::Function(answer));
        let fail = module.add_function(sig(&[ExternRef], &[I32]), vec![], vec![Unreachable]);
        module.export("fail", ExportIndex::Function(fail));
        let wait = module.add_function(
            sig(&[ExternRef], &[I32]),
            vec![],
            vec![LocalGet(0), I32Const(1), Call(import)],
        );
        module.export("wait", ExportIndex::Function(wait));
        module
    }

    #[test]
    fn test_eager_completion() {
        let mut engine = Engine::with_config(EngineConfig {
            completion: Completion::Eager,
            ..EngineConfig::default()
        });
        let import = function(
            &mut engine,
            &[descriptor(&[ExternRef, I32], &[I32]), resolving_to(3.into()), options("suspending")],
        )
        .unwrap();
        let id = engine
            .instantiate(&eager_module(), &ImportObject::new().with("m", "import", import))
            .unwrap();
        let wrap = |engine: &mut Engine, name: &str, options: HostValue| {
            let export = engine.export(id, name).unwrap();
            function(engine, &[descriptor(&[], &[ExternRef]), export, options]).unwrap()
        };

        let answer = wrap(&mut engine, "answer", options("promising"));
        assert_eq!(engine.call(&answer, &[]).unwrap(), HostValue::Number(42.0));

        let fail = wrap(&mut engine, "fail", options("promising"));
        let err = engine.call(&fail, &[]).unwrap_err();
        assert_eq!(err.to_string(), "RuntimeError: unreachable");

        let wait = wrap(&mut engine, "wait", options("promising"));
        let promise = engine.call(&wait, &[]).unwrap();
        assert!(promise.as_promise().is_some(), "a suspended call still returns a promise");
        assert_eq!(engine.block_on(&promise).unwrap(), HostValue::Number(3.0));

        let per_wrapper = HostValue::object([
            ("promising", HostValue::from("first")),
            ("completion", HostValue::from("promise")),
        ]);
        let answer = wrap(&mut engine, "answer", per_wrapper);
        assert!(engine.call(&answer, &[]).unwrap().as_promise().is_some());

        let export = engine.export(id, "answer").unwrap();
        let high_level = promising(&mut engine, export);
        assert!(engine.call(&high_level, &[]).unwrap().as_promise().is_some());
        assert_eq!(engine.continuations().live(), 0);
    }

    // ============================================================================
    // Errors across suspension
    // ============================================================================

    #[test]
    fn test_rejection_keeps_exception_identity() {
        let mut engine = Engine::new();
        let tag = Tag::new(vec![I32]);
        let exception = Exception::from_host(&tag, &[1.into()]).unwrap();
        let thrown = exception.clone();
        let callable = HostValue::function("import", move |engine, _| {
            Ok(engine.promise_reject(Error::Exception(thrown.clone())).into())
        });
        let import = suspending(&mut engine, callable);
        match run_promising(&mut engine, &forwarding_module(), import, &[]) {
            Err(Error::Exception(e)) => assert!(e.ptr_eq(&exception)),
            other => panic!("expected the exception, got {other:?}"),
        }
    }

    #[test]
    fn test_synchronous_throw_is_catchable() {
        let mut engine = Engine::new();
        let callable = HostValue::function("import", |_, _| Err(Error::Type("boom".to_string())));
        let import = suspending(&mut engine, callable);
        assert_eq!(
            run_promising(&mut engine, &catch_all_module(), import, &[]).unwrap(),
            HostValue::Number(7.0)
        );
    }

    #[test]
    fn test_synchronous_throw_rejects_unchanged() {
        let mut engine = Engine::new();
        let callable = HostValue::function("import", |_, _| Err(Error::Type("boom".to_string())));
        let import = suspending(&mut engine, callable);
        let err = run_promising(&mut engine, &forwarding_module(), import, &[]).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: boom");
    }

    #[test]
    fn test_rejected_host_value_caught_by_catch_all() {
        let mut engine = Engine::new();
        let callable = HostValue::function("import", |engine, _| {
            Ok(engine.promise_reject(Error::Thrown(HostValue::from("nope"))).into())
        });
        let import = suspending(&mut engine, callable);
        assert_eq!(
            run_promising(&mut engine, &catch_all_module(), import, &[]).unwrap(),
            HostValue::Number(7.0)
        );
    }

    // ============================================================================
    // Scheduling
    // ============================================================================

    #[test]
    fn test_resumption_waits_for_microtasks() {
        let mut engine = Engine::new();
        let import = suspending(&mut engine, resolving_to(42.into()));
        let id = engine
            .instantiate(&forwarding_module(), &ImportObject::new().with("m", "import", import))
            .unwrap();
        let export = engine.export(id, "test").unwrap();
        let wrapped = promising(&mut engine, export);

        let promise = engine.call(&wrapped, &[]).unwrap();
        assert!(matches!(promise.as_promise().unwrap().state(), PromiseState::Pending));
        assert_eq!(engine.continuations().live(), 1);
        assert!(!engine.jobs().is_empty(), "the resumption is queued");

        engine.run_microtasks();
        assert!(matches!(promise.as_promise().unwrap().state(), PromiseState::Fulfilled(_)));
        assert_eq!(engine.continuations().live(), 0);
    }

    #[test]
    fn test_resumption_follows_settlement_order() {
        let mut engine = Engine::new();
        let mut module = Module::new("order");
        let wait = module.add_import_function("m", "wait", sig(&[I32], &[I32])).unwrap();
        let done = module.add_import_function("m", "done", sig(&[I32], &[])).unwrap();
        let task = module.add_function(sig(&[I32], &[]), vec![], vec![LocalGet(0), Call(wait), Call(done)]);
        module.export("task", ExportIndex::Function(task));

        let deferred = Rc::new(RefCell::new(Vec::new()));
        let pending = Rc::clone(&deferred);
        let wait = HostValue::function("wait", move |engine, _| {
            let (promise, _, _) = engine.deferred();
            pending.borrow_mut().push(promise.clone());
            Ok(promise.into())
        });
        let log = Recorder::new();
        let wait = suspending(&mut engine, wait);
        let imports = ImportObject::new()
            .with("m", "wait", wait)
            .with("m", "done", log.function("done"));
        let id = engine.instantiate(&module, &imports).unwrap();
        let export = engine.export(id, "task").unwrap();
        let task = promising(&mut engine, export);

        for i in 0..5 {
            engine.call(&task, &[i.into()]).unwrap();
        }
        assert_eq!(engine.continuations().live(), 5);

        let mut order: Vec<i32> = (0..5).collect();
        order.shuffle(&mut StdRng::seed_from_u64(0x5eed));
        for &i in &order {
            deferred.borrow()[i as usize].resolve(i.into());
            engine.run_microtasks();
        }

        let expected: Vec<String> = order.iter().map(|i| format!("done {i}")).collect();
        assert_eq!(log.entries(), expected);
        assert_eq!(engine.continuations().live(), 0);
    }
}
