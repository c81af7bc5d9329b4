//! The `WebAssembly` namespace functions the bridge adds

use super::HostValue;
use crate::bridge::{function, promising, suspending::Suspending};
use crate::engine::Engine;
use crate::error::Error;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `WebAssembly.promising(export)`, a plain function
    Promising,
    /// `new WebAssembly.Suspending(callable)`, a constructor
    Suspending,
    /// `new WebAssembly.Function(signature, callable, options)`, a constructor
    Function,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Promising => "WebAssembly.promising",
            Builtin::Suspending => "WebAssembly.Suspending",
            Builtin::Function => "WebAssembly.Function",
        }
    }

    fn arg(args: &[HostValue], index: usize) -> &HostValue {
        args.get(index).unwrap_or(&HostValue::Undefined)
    }

    /// Call without `new`
    pub(crate) fn call(&self, engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
        match self {
            Builtin::Promising => promising::promising(engine, Self::arg(args, 0)),
            Builtin::Suspending | Builtin::Function => {
                Err(Error::Type(format!("{} must be invoked with 'new'", self.name())))
            }
        }
    }

    /// Call with `new`
    pub(crate) fn construct(&self, engine: &mut Engine, args: &[HostValue]) -> Result<HostValue, Error> {
        match self {
            Builtin::Promising => Err(Error::Type(format!("{} is not a constructor", self.name()))),
            Builtin::Suspending => {
                let suspending = Suspending::new(Self::arg(args, 0).clone())?;
                Ok(HostValue::Suspending(Rc::new(suspending)))
            }
            Builtin::Function => function::construct(engine, args),
        }
    }
}
