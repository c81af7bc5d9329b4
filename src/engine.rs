//! The engine: store, continuations and the host job queue behind one handle
//!
//! Everything a host embedding does goes through [`Engine`]: instantiating
//! modules, reading exports, calling host values, and draining the microtask
//! queue that drives suspended continuations forward.

use crate::bridge::continuation::ContinuationManager;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::host::{Builtin, HostFunction, HostValue, JobQueue, Promise, PromiseState};
use crate::module::{ExportIndex, Module};
use crate::runtime::executor::{self, ExecState, Resume, Step};
use crate::runtime::{FuncAddr, ImportObject, Instance, InstanceId, Store};
use tracing::trace;

#[derive(Debug, Default)]
pub struct Engine {
    pub(crate) store: Store,
    pub(crate) continuations: ContinuationManager,
    jobs: JobQueue,
    config: EngineConfig,
    /// Wasm frames held by executions that are waiting on a host call
    host_depth: usize,
    /// Number of host calls currently in progress from wasm
    host_nesting: usize,
}

impl Engine {
    pub fn new() -> Self {
        Engine::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Engine {
            config,
            ..Engine::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    pub fn continuations(&self) -> &ContinuationManager {
        &self.continuations
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn instantiate(&mut self, module: &Module, imports: &ImportObject) -> Result<InstanceId, Error> {
        self.store.create_instance(module, imports)
    }

    pub fn instance(&self, id: InstanceId) -> Result<&Instance, Error> {
        self.store.instance(id)
    }

    /// An export as the host sees it: functions become callable values,
    /// globals and tags keep their identity
    pub fn export(&self, id: InstanceId, name: &str) -> Result<HostValue, Error> {
        let instance = self.store.instance(id)?;
        Ok(match instance.export(name)? {
            ExportIndex::Function(idx) => HostValue::Function(HostFunction::Wasm(instance.function(idx)?)),
            ExportIndex::Global(idx) => HostValue::Global(instance.global(idx)?.clone()),
            ExportIndex::Tag(idx) => HostValue::Tag(instance.tag(idx)?.clone()),
        })
    }

    /// Call a host value as a function
    ///
    /// # Errors
    /// `TypeError` if `callee` is not callable; otherwise whatever the callee
    /// throws
    pub fn call(&mut self, callee: &HostValue, args: &[HostValue]) -> Result<HostValue, Error> {
        match callee {
            HostValue::Function(function) => function.clone().call(self, args),
            other => Err(Error::Type(format!("{} is not a function", other.type_name()))),
        }
    }

    /// Call a host value with `new`
    pub fn construct(&mut self, callee: &HostValue, args: &[HostValue]) -> Result<HostValue, Error> {
        match callee {
            HostValue::Function(HostFunction::Builtin(builtin)) => builtin.construct(self, args),
            other => Err(Error::Type(format!("{other} is not a constructor"))),
        }
    }

    /// The `WebAssembly` namespace additions: `promising`, `Suspending` and
    /// `Function`
    pub fn namespace(&self) -> HostValue {
        HostValue::object([
            ("promising", HostValue::Function(HostFunction::Builtin(Builtin::Promising))),
            ("Suspending", HostValue::Function(HostFunction::Builtin(Builtin::Suspending))),
            ("Function", HostValue::Function(HostFunction::Builtin(Builtin::Function))),
        ])
    }

    /// Run queued jobs until the queue is empty, returning how many ran
    pub fn run_microtasks(&mut self) -> usize {
        let mut count = 0;
        while let Some(job) = self.jobs.pop() {
            job(self);
            count += 1;
        }
        if count > 0 {
            trace!(jobs = count, "microtask queue drained");
        }
        count
    }

    /// Drain the job queue and return the settled value of `value`
    ///
    /// Non-promise values are returned as they are.
    ///
    /// # Errors
    /// The rejection of the promise, or [`Error::Unsettled`] if it is still
    /// pending once no jobs are left
    pub fn block_on(&mut self, value: &HostValue) -> Result<HostValue, Error> {
        let promise = match value {
            HostValue::Promise(promise) => promise.clone(),
            other => return Ok(other.clone()),
        };
        self.run_microtasks();
        match promise.state() {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(error) => Err(error),
            PromiseState::Pending => Err(Error::Unsettled),
        }
    }

    /// `Promise.resolve(value)`
    pub fn promise_resolve(&self, value: HostValue) -> Promise {
        Promise::resolved(&self.jobs, value)
    }

    /// `Promise.reject(error)`
    pub fn promise_reject(&self, error: Error) -> Promise {
        Promise::rejected(&self.jobs, error)
    }

    /// A pending promise together with host functions that settle it
    pub fn deferred(&self) -> (Promise, HostValue, HostValue) {
        let promise = Promise::pending(&self.jobs);
        let (resolve, reject) = promise.resolving_functions();
        (promise, resolve, reject)
    }

    pub(crate) fn call_depth(&self) -> usize {
        self.host_depth
    }

    /// Record a host call made by an execution holding `frames` wasm frames
    pub(crate) fn enter_host(&mut self, frames: usize) -> Result<(), Error> {
        if self.host_nesting >= self.config.max_host_nesting {
            return Err(Error::stack_overflow());
        }
        self.host_nesting += 1;
        self.host_depth += frames;
        Ok(())
    }

    pub(crate) fn leave_host(&mut self, frames: usize) {
        self.host_nesting = self.host_nesting.saturating_sub(1);
        self.host_depth = self.host_depth.saturating_sub(frames);
    }

    /// Call a wasm function directly from the host, outside any continuation
    pub(crate) fn invoke_wasm(&mut self, addr: FuncAddr, args: &[HostValue]) -> Result<HostValue, Error> {
        let parameters = self.store.function(addr)?.func_type().parameters.clone();
        let values = HostValue::to_wasm_args(args, &parameters)?;
        let mut state = ExecState::new(None, addr, values);
        match executor::run(self, &mut state, Resume::Start)? {
            Step::Complete(values) => Ok(HostValue::from_wasm_results(values)),
            Step::Suspended(_) => Err(Error::Runtime("trying to suspend JS frames".to_string())),
        }
    }
}
