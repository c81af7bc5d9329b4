//! Host promises
//!
//! A promise is pending until it is fulfilled with a value or rejected with
//! an [`Error`]. Reactions registered with [`Promise::then`] never run
//! synchronously: settlement enqueues them on the [`JobQueue`], and a
//! reaction added to an already settled promise is enqueued at once.
//!
//! Resolving with another promise or with a thenable adopts its eventual
//! state through a job, so adoption always takes at least one extra turn.

use super::{HostValue, JobQueue};
use crate::engine::Engine;
use crate::error::Error;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

pub type Reaction = Box<dyn FnOnce(&mut Engine, Result<HostValue, Error>)>;

#[derive(Debug, Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(HostValue),
    Rejected(Error),
}

struct Inner {
    state: PromiseState,
    /// Set once `resolve`/`reject` has been called, even while adoption of
    /// another promise is still in flight
    locked: bool,
    reactions: Vec<Reaction>,
    jobs: JobQueue,
}

#[derive(Clone)]
pub struct Promise(Rc<RefCell<Inner>>);

impl Promise {
    pub fn pending(jobs: &JobQueue) -> Self {
        Promise(Rc::new(RefCell::new(Inner {
            state: PromiseState::Pending,
            locked: false,
            reactions: Vec::new(),
            jobs: jobs.clone(),
        })))
    }

    /// `Promise.resolve(value)`: a promise is returned as is
    pub fn resolved(jobs: &JobQueue, value: HostValue) -> Self {
        if let HostValue::Promise(promise) = value {
            return promise;
        }
        let promise = Promise::pending(jobs);
        promise.resolve(value);
        promise
    }

    /// `Promise.reject(error)`
    pub fn rejected(jobs: &JobQueue, error: Error) -> Self {
        let promise = Promise::pending(jobs);
        promise.reject(error);
        promise
    }

    pub fn state(&self) -> PromiseState {
        self.0.borrow().state.clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.0.borrow().state, PromiseState::Pending)
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Resolve the promise; later calls to `resolve` or `reject` are ignored
    pub fn resolve(&self, value: HostValue) {
        if self.lock() {
            self.resolve_unlocked(value);
        }
    }

    /// Reject the promise; later calls to `resolve` or `reject` are ignored
    pub fn reject(&self, error: Error) {
        if self.lock() {
            self.settle(PromiseState::Rejected(error));
        }
    }

    /// Register a reaction to settlement
    pub fn then(&self, reaction: impl FnOnce(&mut Engine, Result<HostValue, Error>) + 'static) {
        let mut inner = self.0.borrow_mut();
        let settled = match &inner.state {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(error) => Some(Err(error.clone())),
        };
        match settled {
            None => inner.reactions.push(Box::new(reaction)),
            Some(result) => inner.jobs.enqueue(move |engine| reaction(engine, result)),
        }
    }

    fn lock(&self) -> bool {
        let mut inner = self.0.borrow_mut();
        !std::mem::replace(&mut inner.locked, true)
    }

    fn jobs(&self) -> JobQueue {
        self.0.borrow().jobs.clone()
    }

    fn resolve_unlocked(&self, value: HostValue) {
        match value {
            HostValue::Promise(other) if other.ptr_eq(self) => self.settle(PromiseState::Rejected(Error::Type(
                "Chaining cycle detected for promise".to_string(),
            ))),
            HostValue::Promise(other) => {
                let this = self.clone();
                self.jobs()
                    .enqueue(move |_| other.then(move |_, result| this.settle_with(result)));
            }
            value => match value.thenable() {
                Some(then) => {
                    let this = self.clone();
                    self.jobs().enqueue(move |engine| {
                        let (resolve, reject) = this.adoption_functions();
                        if let Err(error) = engine.call(&then, &[resolve, reject]) {
                            this.settle(PromiseState::Rejected(error));
                        }
                    });
                }
                None => self.settle(PromiseState::Fulfilled(value)),
            },
        }
    }

    fn settle_with(&self, result: Result<HostValue, Error>) {
        match result {
            Ok(value) => self.resolve_unlocked(value),
            Err(error) => self.settle(PromiseState::Rejected(error)),
        }
    }

    fn settle(&self, state: PromiseState) {
        let (reactions, jobs) = {
            let mut inner = self.0.borrow_mut();
            if !matches!(inner.state, PromiseState::Pending) {
                return;
            }
            inner.state = state.clone();
            (std::mem::take(&mut inner.reactions), inner.jobs.clone())
        };
        let result = match state {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(error) => Err(error),
            PromiseState::Pending => return,
        };
        for reaction in reactions {
            let result = result.clone();
            jobs.enqueue(move |engine| reaction(engine, result));
        }
    }

    /// A fresh `(resolve, reject)` pair, as handed out by the `Promise`
    /// constructor: the first call of either locks the promise, so it is
    /// ignored if the promise was already resolved some other way, and later
    /// `resolve`/`reject` calls are ignored once it has run
    pub fn resolving_functions(&self) -> (HostValue, HostValue) {
        self.resolving_pair(true)
    }

    /// The pair passed to a thenable's `then` while this promise, already
    /// locked, adopts it
    fn adoption_functions(&self) -> (HostValue, HostValue) {
        self.resolving_pair(false)
    }

    fn resolving_pair(&self, claim: bool) -> (HostValue, HostValue) {
        let done = Rc::new(Cell::new(false));

        let this = self.clone();
        let flag = Rc::clone(&done);
        let resolve = HostValue::function("resolve", move |_, args| {
            if !flag.replace(true) && (!claim || this.lock()) {
                this.resolve_unlocked(args.first().cloned().unwrap_or(HostValue::Undefined));
            }
            Ok(HostValue::Undefined)
        });

        let this = self.clone();
        let reject = HostValue::function("reject", move |_, args| {
            if !done.replace(true) && (!claim || this.lock()) {
                let reason = args.first().cloned().unwrap_or(HostValue::Undefined);
                this.settle(PromiseState::Rejected(Error::from_value(reason)));
            }
            Ok(HostValue::Undefined)
        });

        (resolve, reject)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("Promise")
            .field("state", &inner.state)
            .field("reactions", &inner.reactions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&'static str) -> Reaction) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |name: &'static str| -> Reaction {
            let sink = Rc::clone(&sink);
            Box::new(move |_: &mut Engine, result: Result<HostValue, Error>| {
                let entry = match result {
                    Ok(value) => format!("{name}:{value}"),
                    Err(error) => format!("{name}!{}", error.message()),
                };
                sink.borrow_mut().push(entry);
            })
        };
        (log, make)
    }

    #[test]
    fn test_reactions_run_as_jobs_in_order() {
        let mut engine = Engine::new();
        let promise = Promise::pending(engine.jobs());
        let (log, reaction) = recorder();
        promise.then(reaction("a"));
        promise.then(reaction("b"));

        promise.resolve(HostValue::Number(1.0));
        assert!(log.borrow().is_empty(), "reactions never run synchronously");

        engine.run_microtasks();
        assert_eq!(*log.borrow(), vec!["a:1", "b:1"]);
    }

    #[test]
    fn test_first_settlement_wins() {
        let mut engine = Engine::new();
        let promise = Promise::pending(engine.jobs());
        promise.reject(Error::Type("first".to_string()));
        promise.resolve(HostValue::Number(2.0));
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Rejected(Error::Type(_))));
    }

    #[test]
    fn test_then_on_settled_promise_is_async() {
        let mut engine = Engine::new();
        let promise = Promise::resolved(engine.jobs(), HostValue::Number(3.0));
        let (log, reaction) = recorder();
        promise.then(reaction("late"));
        assert!(log.borrow().is_empty());
        engine.run_microtasks();
        assert_eq!(*log.borrow(), vec!["late:3"]);
    }

    #[test]
    fn test_adopts_promise() {
        let mut engine = Engine::new();
        let inner = Promise::pending(engine.jobs());
        let outer = Promise::pending(engine.jobs());
        outer.resolve(HostValue::Promise(inner.clone()));
        engine.run_microtasks();
        assert!(outer.is_pending());

        inner.resolve(HostValue::Number(5.0));
        engine.run_microtasks();
        assert!(matches!(outer.state(), PromiseState::Fulfilled(HostValue::Number(n)) if n == 5.0));
    }

    #[test]
    fn test_adopts_thenable() {
        let mut engine = Engine::new();
        let then = HostValue::function("then", |engine, args| {
            let resolve = args.first().cloned().unwrap_or(HostValue::Undefined);
            engine.call(&resolve, &[HostValue::Number(8.0)])?;
            engine.call(&resolve, &[HostValue::Number(9.0)])
        });
        let promise = Promise::resolved(engine.jobs(), HostValue::object([("then", then)]));
        assert!(promise.is_pending());
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Fulfilled(HostValue::Number(n)) if n == 8.0));
    }

    #[test]
    fn test_throwing_thenable_rejects() {
        let mut engine = Engine::new();
        let then = HostValue::function("then", |_, _| Err(Error::Type("broken then".to_string())));
        let promise = Promise::resolved(engine.jobs(), HostValue::object([("then", then)]));
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Rejected(Error::Type(m)) if m == "broken then"));
    }

    #[test]
    fn test_self_resolution_is_type_error() {
        let engine = Engine::new();
        let promise = Promise::pending(engine.jobs());
        promise.resolve(HostValue::Promise(promise.clone()));
        assert!(matches!(promise.state(), PromiseState::Rejected(Error::Type(_))));
    }

    #[test]
    fn test_resolving_functions_lock_the_promise() {
        let mut engine = Engine::new();
        let promise = Promise::pending(engine.jobs());
        let (resolve, reject) = promise.resolving_functions();
        let inner = Promise::pending(engine.jobs());
        engine.call(&resolve, &[HostValue::Promise(inner.clone())]).unwrap();

        promise.resolve(HostValue::Number(5.0));
        promise.reject(Error::Type("late".to_string()));
        inner.resolve(HostValue::Number(42.0));
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Fulfilled(HostValue::Number(n)) if n == 42.0));

        engine.call(&reject, &[HostValue::Number(1.0)]).unwrap();
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Fulfilled(HostValue::Number(n)) if n == 42.0));
    }

    #[test]
    fn test_resolving_functions_ignored_once_resolved_directly() {
        let mut engine = Engine::new();
        let promise = Promise::pending(engine.jobs());
        let (resolve, _) = promise.resolving_functions();
        let inner = Promise::pending(engine.jobs());
        promise.resolve(HostValue::Promise(inner.clone()));

        engine.call(&resolve, &[HostValue::Number(5.0)]).unwrap();
        engine.run_microtasks();
        assert!(promise.is_pending());

        inner.resolve(HostValue::Number(42.0));
        engine.run_microtasks();
        assert!(matches!(promise.state(), PromiseState::Fulfilled(HostValue::Number(n)) if n == 42.0));
    }
}
