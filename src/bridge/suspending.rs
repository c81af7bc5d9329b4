//! Suspending wrapper: host callables that may suspend their wasm caller
//!
//! A host callable imported into wasm becomes a [`HostImport`]. What happens
//! when its result is a promise depends on the import's [`SuspendMode`]:
//!
//! - `Never`: a plain import; the promise is just a value and is converted
//!   like any other.
//! - `Implicit`: a `WebAssembly.Suspending` import; a nominal promise
//!   suspends the continuation the calling execution runs on.
//! - `Explicit`: a `WebAssembly.Function` with `suspending: "first"`; the
//!   first wasm argument is the suspend-context token, and promises as well as
//!   thenables suspend the continuation it names.

use crate::bridge::continuation::ContinuationId;
use crate::engine::Engine;
use crate::error::Error;
use crate::host::{HostValue, Promise};
use crate::module::FunctionType;
use crate::runtime::executor::Unwind;
use crate::runtime::Value;

/// A `WebAssembly.Suspending` object
#[derive(Debug)]
pub struct Suspending {
    callable: HostValue,
}

impl Suspending {
    /// `new WebAssembly.Suspending(callable)`
    ///
    /// # Errors
    /// `TypeError` if `callable` is not a function
    pub fn new(callable: HostValue) -> Result<Self, Error> {
        if !callable.is_callable() {
            return Err(Error::Type(
                "WebAssembly.Suspending(): Argument 0 must be a function".to_string(),
            ));
        }
        Ok(Suspending { callable })
    }

    pub fn callable(&self) -> &HostValue {
        &self.callable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendMode {
    Never,
    Implicit,
    Explicit,
}

/// A host callable bound to an import slot
#[derive(Debug)]
pub struct HostImport {
    pub(crate) callable: HostValue,
    /// The wasm-visible signature, including the token parameter in
    /// `Explicit` mode
    pub(crate) func_type: FunctionType,
    pub(crate) mode: SuspendMode,
}

impl HostImport {
    pub fn func_type(&self) -> &FunctionType {
        &self.func_type
    }

    pub fn mode(&self) -> SuspendMode {
        self.mode
    }
}

/// What a host call asks of the executor
#[derive(Debug)]
pub(crate) enum HostCall {
    Return(Vec<Value>),
    Suspend(Promise),
}

fn trap(message: &str) -> Unwind {
    Unwind::Trap(Error::Runtime(message.to_string()))
}

/// Check that the execution `owner` may suspend right now
///
/// Only the innermost active continuation may suspend, and only from the
/// execution it started itself: an owner-less execution was entered from a
/// host function, whose frame cannot be captured.
fn check_suspendable(engine: &Engine, owner: Option<ContinuationId>) -> Result<(), Unwind> {
    match (engine.continuations.active(), owner) {
        (None, _) => Err(trap("trying to suspend without WebAssembly.promising")),
        (Some(active), Some(owner)) if active == owner => Ok(()),
        _ => Err(trap("trying to suspend JS frames")),
    }
}

/// Validate an explicit suspend-context token
fn check_token(engine: &Engine, token: Option<&Value>, owner: Option<ContinuationId>) -> Result<(), Unwind> {
    match token {
        Some(Value::ExternRef(HostValue::Suspender(id))) if engine.continuations.active() == Some(*id) => {
            check_suspendable(engine, owner)
        }
        _ => Err(trap("invalid suspender object for suspend")),
    }
}

/// Call `import` from wasm with `args`
///
/// Errors returned by the callable are catchable by the caller's handlers;
/// invalid suspension is a trap.
pub(crate) fn dispatch(
    engine: &mut Engine,
    import: &HostImport,
    args: Vec<Value>,
    owner: Option<ContinuationId>,
) -> Result<HostCall, Unwind> {
    let skip = match import.mode {
        SuspendMode::Explicit => {
            check_token(engine, args.first(), owner)?;
            1
        }
        _ => 0,
    };
    let host_args: Vec<HostValue> = args.iter().skip(skip).map(HostValue::from_wasm).collect();

    let result = engine.call(&import.callable, &host_args).map_err(Unwind::Throw)?;

    let pending = match import.mode {
        SuspendMode::Never => None,
        SuspendMode::Implicit => result.as_promise().cloned(),
        SuspendMode::Explicit => match &result {
            HostValue::Promise(promise) => Some(promise.clone()),
            thenable if thenable.thenable().is_some() => Some(engine.promise_resolve(result.clone())),
            _ => None,
        },
    };

    match pending {
        Some(promise) => {
            check_suspendable(engine, owner)?;
            Ok(HostCall::Suspend(promise))
        }
        None => result
            .to_wasm_results(&import.func_type.return_types)
            .map(HostCall::Return)
            .map_err(Unwind::Throw),
    }
}
