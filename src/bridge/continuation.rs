//! Continuation manager
//!
//! Each promising call runs on its own continuation. The manager owns every
//! live continuation in an arena keyed by [`ContinuationId`], which doubles as
//! the suspend-context token handed to wasm. Ids increase monotonically and
//! are never reused, so a stale token can never name a newer continuation.
//!
//! ```text
//!            start                 promise returned by a suspending import
//!   ──────────────▶ Running ───────────────────────────────▶ Suspended
//!                    │  ▲                                       │
//!                    │  └──────── settlement job (resume) ──────┘
//!         returns /  │
//!         throws     ▼
//!            Completed | Failed   (removed from the arena)
//! ```
//!
//! The active stack records which continuations are executing right now,
//! innermost last. A continuation is pushed while its executor runs and popped
//! when the executor stops, so a nested promising call made from a host
//! function sits above the continuation that made it.

use crate::engine::Engine;
use crate::error::Error;
use crate::host::{HostValue, Promise};
use crate::runtime::executor::{self, ExecState, Resume, Step};
use crate::runtime::{FuncAddr, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Stable identifier of a continuation, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContinuationId(u64);

impl ContinuationId {
    pub(crate) fn new(id: u64) -> Self {
        ContinuationId(id)
    }
}

impl fmt::Display for ContinuationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    Running,
    Suspended,
    Completed,
    Failed,
}

/// One promising call's resumable execution
#[derive(Debug)]
pub struct Continuation {
    id: ContinuationId,
    state: ContinuationState,
    /// The parked execution while suspended
    exec: Option<ExecState>,
    /// Settled when the continuation completes or fails
    promise: Promise,
    suspensions: u32,
}

impl Continuation {
    pub fn id(&self) -> ContinuationId {
        self.id
    }

    pub fn state(&self) -> ContinuationState {
        self.state
    }

    /// Number of times this continuation has suspended so far
    pub fn suspensions(&self) -> u32 {
        self.suspensions
    }
}

#[derive(Debug, Default)]
pub struct ContinuationManager {
    next_id: u64,
    live: HashMap<ContinuationId, Continuation>,
    active: Vec<ContinuationId>,
}

impl ContinuationManager {
    pub fn new() -> Self {
        ContinuationManager::default()
    }

    /// The innermost continuation currently executing
    pub fn active(&self) -> Option<ContinuationId> {
        self.active.last().copied()
    }

    pub fn get(&self, id: ContinuationId) -> Option<&Continuation> {
        self.live.get(&id)
    }

    /// Number of continuations that have not finished
    pub fn live(&self) -> usize {
        self.live.len()
    }

    pub(crate) fn create(&mut self, promise: Promise) -> ContinuationId {
        self.next_id += 1;
        let id = ContinuationId(self.next_id);
        self.live.insert(
            id,
            Continuation {
                id,
                state: ContinuationState::Running,
                exec: None,
                promise,
                suspensions: 0,
            },
        );
        debug!(continuation = %id, "continuation created");
        id
    }

    fn activate(&mut self, id: ContinuationId) {
        if let Some(continuation) = self.live.get_mut(&id) {
            continuation.state = ContinuationState::Running;
        }
        self.active.push(id);
    }

    fn deactivate(&mut self, id: ContinuationId) {
        if let Some(position) = self.active.iter().rposition(|active| *active == id) {
            self.active.remove(position);
        }
    }

    fn park(&mut self, id: ContinuationId, exec: ExecState) -> Result<(), Error> {
        let continuation = self
            .live
            .get_mut(&id)
            .ok_or_else(|| Error::Runtime(format!("continuation {id} is not live")))?;
        continuation.state = ContinuationState::Suspended;
        continuation.suspensions += 1;
        continuation.exec = Some(exec);
        Ok(())
    }

    /// Take the parked execution of a suspended continuation
    fn unpark(&mut self, id: ContinuationId) -> Result<(ExecState, Promise), Error> {
        let continuation = self
            .live
            .get_mut(&id)
            .ok_or_else(|| Error::Runtime(format!("continuation {id} is not live")))?;
        match (continuation.state, continuation.exec.take()) {
            (ContinuationState::Suspended, Some(exec)) => Ok((exec, continuation.promise.clone())),
            (state, exec) => {
                continuation.exec = exec;
                Err(Error::Runtime(format!("continuation {id} cannot resume from {state:?}")))
            }
        }
    }

    fn finish(&mut self, id: ContinuationId, state: ContinuationState) {
        if self.live.remove(&id).is_some() {
            debug!(continuation = %id, state = ?state, "continuation finished");
        }
    }
}

/// How a run of a continuation ended
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(HostValue),
    Failed(Error),
    Suspended,
}

/// Begin running `target` on the fresh continuation `id`
pub(crate) fn start(engine: &mut Engine, id: ContinuationId, target: FuncAddr, args: Vec<Value>) -> Outcome {
    drive(engine, id, ExecState::new(Some(id), target, args), Resume::Start)
}

/// Finish a continuation that never got to run
pub(crate) fn abandon(engine: &mut Engine, id: ContinuationId, error: Error) -> Outcome {
    engine.continuations.finish(id, ContinuationState::Failed);
    Outcome::Failed(error)
}

fn drive(engine: &mut Engine, id: ContinuationId, mut exec: ExecState, input: Resume) -> Outcome {
    engine.continuations.activate(id);
    let step = executor::run(engine, &mut exec, input);
    engine.continuations.deactivate(id);

    match step {
        Ok(Step::Complete(values)) => {
            engine.continuations.finish(id, ContinuationState::Completed);
            Outcome::Completed(HostValue::from_wasm_results(values))
        }
        Ok(Step::Suspended(promise)) => {
            if let Err(error) = engine.continuations.park(id, exec) {
                return Outcome::Failed(error);
            }
            debug!(continuation = %id, "continuation suspended");
            promise.then(move |engine, settled| resume(engine, id, settled));
            Outcome::Suspended
        }
        Err(error) => {
            debug!(continuation = %id, error = %error, "continuation failed");
            engine.continuations.finish(id, ContinuationState::Failed);
            Outcome::Failed(error)
        }
    }
}

/// Settlement reaction: continue a suspended continuation with the awaited
/// promise's result, then settle its own promise if it finished
fn resume(engine: &mut Engine, id: ContinuationId, settled: Result<HostValue, Error>) {
    let (exec, promise) = match engine.continuations.unpark(id) {
        Ok(parked) => parked,
        Err(error) => {
            warn!(continuation = %id, error = %error, "dropping resumption");
            return;
        }
    };
    debug!(continuation = %id, rejected = settled.is_err(), "continuation resumed");
    let input = match settled {
        Ok(value) => Resume::Value(value),
        Err(error) => Resume::Throw(error),
    };
    settle(&promise, drive(engine, id, exec, input));
}

/// Deliver a finished outcome to the continuation's promise
pub(crate) fn settle(promise: &Promise, outcome: Outcome) {
    match outcome {
        Outcome::Completed(value) => promise.resolve(value),
        Outcome::Failed(error) => promise.reject(error),
        Outcome::Suspended => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::JobQueue;

    #[test]
    fn test_ids_are_never_reused() {
        let jobs = JobQueue::new();
        let mut manager = ContinuationManager::new();
        let first = manager.create(Promise::pending(&jobs));
        manager.finish(first, ContinuationState::Completed);
        let second = manager.create(Promise::pending(&jobs));
        assert_ne!(first, second);
        assert!(manager.get(first).is_none());
        assert_eq!(manager.live(), 1);
    }

    #[test]
    fn test_active_stack_nests() {
        let jobs = JobQueue::new();
        let mut manager = ContinuationManager::new();
        let outer = manager.create(Promise::pending(&jobs));
        let inner = manager.create(Promise::pending(&jobs));

        manager.activate(outer);
        manager.activate(inner);
        assert_eq!(manager.active(), Some(inner));
        manager.deactivate(inner);
        assert_eq!(manager.active(), Some(outer));
        manager.deactivate(outer);
        assert_eq!(manager.active(), None);
    }

    #[test]
    fn test_running_continuation_cannot_be_unparked() {
        let jobs = JobQueue::new();
        let mut manager = ContinuationManager::new();
        let id = manager.create(Promise::pending(&jobs));
        assert_eq!(manager.get(id).unwrap().state(), ContinuationState::Running);
        assert!(manager.unpark(id).is_err());
    }
}
