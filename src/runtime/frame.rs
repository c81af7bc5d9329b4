//! WebAssembly call frame
//!
//! Represents the call frame for function execution, containing locals and control flow state

use super::control::LabelStack;
use super::store::InstanceId;
use super::Value;
use crate::module::{ControlMap, FunctionType, Instruction, ValueType};
use std::rc::Rc;

/// Executable code of a defined function, shared by every frame running it
#[derive(Debug)]
pub struct Code {
    pub func_type: FunctionType,
    /// Declared locals, after the parameters
    pub locals: Vec<ValueType>,
    pub body: Rc<Vec<Instruction>>,
    pub control: Rc<ControlMap>,
}

/// Call frame for managing function calls
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<Code>,
    /// Instance whose globals, tags and functions the body refers to
    pub instance: InstanceId,
    /// Instruction pointer in the function body
    pub pc: usize,
    /// Local variables (parameters + declared locals)
    pub locals: Vec<Value>,
    /// Label stack for control flow within this function
    pub labels: LabelStack,
    /// Operand stack height below the frame's own values
    pub stack_base: usize,
}

impl Frame {
    pub fn new(code: Rc<Code>, instance: InstanceId, args: Vec<Value>, stack_base: usize) -> Self {
        let mut locals = args;
        locals.extend(code.locals.iter().map(|ty| Value::default_for(*ty)));
        Frame {
            code,
            instance,
            pc: 0,
            locals,
            labels: LabelStack::new(),
            stack_base,
        }
    }

    pub fn return_arity(&self) -> usize {
        self.code.func_type.return_types.len()
    }
}
