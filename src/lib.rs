//! Promise integration for a WebAssembly interpreter.
//!
//! jspi lets WebAssembly code wait on host promises without blocking the
//! host. A host function wrapped as *suspending* may return a promise; the
//! wasm computation that called it is suspended, and resumed once the promise
//! settles. A wasm export wrapped as *promising* runs on its own continuation
//! and returns a promise of its result.
//!
//! # Modules
//!
//! - [`module`] -- In-memory module representation and the instruction subset.
//! - [`runtime`] -- Store, instances, import resolution and the resumable interpreter.
//! - [`host`] -- Host values, functions, promises and the microtask queue.
//! - [`bridge`] -- The suspending and promising wrappers, and the continuation manager.
//! - [`engine`] -- The [`Engine`] handle tying it all together.
//! - [`conformance`] -- The conformance scenarios run by the `jspi` binary.
//!
//! # Example
//!
//! Suspend once on a promise that resolves to 42:
//!
//! ```
//! use jspi::host::HostValue;
//! use jspi::module::{ExportIndex, FunctionType, Instruction, Module, ValueType};
//! use jspi::runtime::ImportObject;
//! use jspi::Engine;
//!
//! let i_i = FunctionType::new(vec![ValueType::I32], vec![ValueType::I32]);
//! let mut module = Module::new("example");
//! let import = module.add_import_function("m", "import", i_i.clone()).unwrap();
//! let test = module.add_function(i_i, vec![], vec![Instruction::LocalGet(0), Instruction::Call(import)]);
//! module.export("test", ExportIndex::Function(test));
//!
//! let mut engine = Engine::new();
//! let wasm = engine.namespace();
//! let fetch = HostValue::function("fetch", |engine, _| Ok(engine.promise_resolve(42.into()).into()));
//! let import = engine.construct(&wasm.get("Suspending"), &[fetch]).unwrap();
//! let id = engine.instantiate(&module, &ImportObject::new().with("m", "import", import)).unwrap();
//!
//! let export = engine.export(id, "test").unwrap();
//! let wrapped = engine.call(&wasm.get("promising"), &[export]).unwrap();
//! let promise = engine.call(&wrapped, &[]).unwrap();
//! assert_eq!(engine.block_on(&promise).unwrap(), HostValue::Number(42.0));
//! ```

pub mod bridge;
pub mod config;
pub mod conformance;
pub mod engine;
pub mod error;
pub mod host;
pub mod module;
pub mod runtime;

pub use config::{Completion, EngineConfig};
pub use engine::Engine;
pub use error::Error;
