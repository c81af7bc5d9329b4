//! WebAssembly value stack implementation
//!
//! One operand stack is shared by every frame of an execution; each frame
//! remembers the height at which its operands start.

use super::Value;
use crate::error::Error;
use crate::module::ValueType;

#[derive(Debug, Default)]
pub struct Stack {
    values: Vec<Value>,
}

fn underflow() -> Error {
    Error::Runtime("stack underflow".to_string())
}

impl Stack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Stack { values: Vec::new() }
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Push multiple values onto the stack
    pub fn push_all(&mut self, values: impl IntoIterator<Item = Value>) {
        self.values.extend(values);
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.values.pop().ok_or_else(underflow)
    }

    /// Pop a value and check its type
    pub fn pop_typed(&mut self, expected_type: ValueType) -> Result<Value, Error> {
        let value = self.pop()?;
        if value.typ() != expected_type {
            return Err(Error::Runtime(format!(
                "type mismatch: expected {expected_type}, got {}",
                value.typ()
            )));
        }
        Ok(value)
    }

    pub fn pop_i32(&mut self) -> Result<i32, Error> {
        match self.pop_typed(ValueType::I32)? {
            Value::I32(v) => Ok(v),
            _ => Err(underflow()),
        }
    }

    pub fn pop_i64(&mut self) -> Result<i64, Error> {
        match self.pop_typed(ValueType::I64)? {
            Value::I64(v) => Ok(v),
            _ => Err(underflow()),
        }
    }

    /// Pop the top `n` values, returned in push order
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, Error> {
        if n > self.values.len() {
            return Err(underflow());
        }
        Ok(self.values.split_off(self.values.len() - n))
    }

    /// Pop values matching `types`, returned in push order
    pub fn pop_types(&mut self, types: &[ValueType]) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(types.len());
        for ty in types.iter().rev() {
            values.push(self.pop_typed(*ty)?);
        }
        values.reverse();
        Ok(values)
    }

    /// Drop everything above `height`
    pub fn truncate(&mut self, height: usize) {
        self.values.truncate(height);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Peek at the top value without popping
    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }
}
