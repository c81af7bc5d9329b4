//! Error taxonomy shared by the engine, the host model and the bridge
//!
//! Every error is cloneable: a rejected promise hands the same error to each of
//! its reactions, and a tagged exception keeps its identity across suspension
//! boundaries because [`Exception`] is reference counted.

use crate::host::{Exception, HostValue};

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Bad argument shapes, signature mismatches, missing `new`.
    #[error("TypeError: {0}")]
    Type(String),
    /// Resource exhaustion, in practice the call stack.
    #[error("RangeError: {0}")]
    Range(String),
    /// A trap: invalid suspend context, suspension across host frames,
    /// `unreachable`, interpreter faults.
    #[error("RuntimeError: {0}")]
    Runtime(String),
    /// A module failed validation when it was first instantiated.
    #[error("CompileError: {0}")]
    Compile(String),
    /// A tagged WebAssembly exception that nothing caught.
    #[error("uncaught exception: {0}")]
    Exception(Exception),
    /// An arbitrary host value thrown by host code.
    #[error("uncaught {0}")]
    Thrown(HostValue),
    #[error("promise is still pending after the job queue drained")]
    Unsettled,
}

impl Error {
    pub(crate) fn stack_overflow() -> Self {
        Error::Range("Maximum call stack size exceeded".to_string())
    }

    /// The JS-style constructor name of this error
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Type(_) => "TypeError",
            Error::Range(_) => "RangeError",
            Error::Runtime(_) => "RuntimeError",
            Error::Compile(_) => "CompileError",
            Error::Exception(_) => "Exception",
            Error::Thrown(_) => "Thrown",
            Error::Unsettled => "Unsettled",
        }
    }

    /// The message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            Error::Type(m) | Error::Range(m) | Error::Runtime(m) | Error::Compile(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Convert the error into the value a host rejection handler observes
    pub fn into_value(self) -> HostValue {
        match self {
            Error::Exception(exception) => HostValue::Exception(exception),
            Error::Thrown(value) => value,
            other => HostValue::Error(std::rc::Rc::new(other)),
        }
    }

    /// Inverse of [`Error::into_value`]; identity of exceptions and error
    /// objects survives the round trip.
    pub fn from_value(value: HostValue) -> Self {
        match value {
            HostValue::Exception(exception) => Error::Exception(exception),
            HostValue::Error(error) => (*error).clone(),
            other => Error::Thrown(other),
        }
    }
}
