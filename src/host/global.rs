//! `WebAssembly.Global`: a typed, shared value cell

use super::HostValue;
use crate::error::Error;
use crate::module::GlobalType;
use crate::runtime::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A global shared between its instance, importers and the host
#[derive(Debug, Clone)]
pub struct Global {
    global_type: GlobalType,
    cell: Rc<RefCell<Value>>,
}

impl Global {
    pub fn new(global_type: GlobalType, value: Value) -> Self {
        Global {
            global_type,
            cell: Rc::new(RefCell::new(value)),
        }
    }

    pub fn global_type(&self) -> GlobalType {
        self.global_type
    }

    pub fn get(&self) -> Value {
        self.cell.borrow().clone()
    }

    /// Store a wasm value
    ///
    /// # Errors
    /// `TypeError` for an immutable global or a value of the wrong type
    pub fn set(&self, value: Value) -> Result<(), Error> {
        if !self.global_type.mutable {
            return Err(Error::Type("Can't set the value of an immutable global.".to_string()));
        }
        if value.typ() != self.global_type.value_type {
            return Err(Error::Type(format!(
                "global of type {} cannot hold {}",
                self.global_type.value_type,
                value.typ()
            )));
        }
        *self.cell.borrow_mut() = value;
        Ok(())
    }

    /// The `value` getter
    pub fn value(&self) -> HostValue {
        HostValue::from_wasm(&self.get())
    }

    /// The `value` setter
    pub fn set_value(&self, value: &HostValue) -> Result<(), Error> {
        self.set(value.to_wasm(self.global_type.value_type)?)
    }

    pub fn ptr_eq(&self, other: &Global) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ValueType;

    #[test]
    fn test_value_accessors() {
        let global = Global::new(
            GlobalType {
                value_type: ValueType::I32,
                mutable: true,
            },
            Value::I32(0),
        );
        global.set_value(&HostValue::Number(15.0)).unwrap();
        assert_eq!(global.value(), HostValue::Number(15.0));
        assert!(global.set(Value::I64(1)).is_err());
    }

    #[test]
    fn test_immutable_global_rejects_writes() {
        let global = Global::new(
            GlobalType {
                value_type: ValueType::I32,
                mutable: false,
            },
            Value::I32(3),
        );
        let err = global.set(Value::I32(4)).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
        assert_eq!(global.get(), Value::I32(3));
    }
}
