//! Host values and their conversion to and from WebAssembly values

use super::{Exception, Global, HostFunction, Promise, Tag};
use crate::bridge::continuation::ContinuationId;
use crate::bridge::suspending::Suspending;
use crate::error::Error;
use crate::module::ValueType;
use crate::runtime::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A plain host object: a mutable bag of named properties with identity
#[derive(Clone, Default)]
pub struct HostObject(Rc<RefCell<BTreeMap<String, HostValue>>>);

impl HostObject {
    pub fn new() -> Self {
        HostObject::default()
    }

    pub fn get(&self, name: &str) -> Option<HostValue> {
        self.0.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: HostValue) {
        self.0.borrow_mut().insert(name.into(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.borrow().keys()).finish()
    }
}

/// Any value the embedding host can hold
///
/// Promise detection is a match on this union: a nominal [`Promise`] is
/// recognised without touching the value, and a thenable is an `Object`
/// whose `then` property is callable.
#[derive(Debug, Clone)]
pub enum HostValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Rc<str>),
    Object(HostObject),
    Array(Rc<Vec<HostValue>>),
    Function(HostFunction),
    Promise(Promise),
    Tag(Tag),
    Exception(Exception),
    Global(Global),
    Suspending(Rc<Suspending>),
    /// The suspend context of one continuation
    Suspender(ContinuationId),
    Error(Rc<Error>),
}

impl PartialEq for HostValue {
    /// Primitives compare by value, everything else by identity
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) | (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::BigInt(a), HostValue::BigInt(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.ptr_eq(b),
            (HostValue::Array(a), HostValue::Array(b)) => Rc::ptr_eq(a, b),
            (HostValue::Function(a), HostValue::Function(b)) => a == b,
            (HostValue::Promise(a), HostValue::Promise(b)) => a.ptr_eq(b),
            (HostValue::Tag(a), HostValue::Tag(b)) => a.ptr_eq(b),
            (HostValue::Exception(a), HostValue::Exception(b)) => a.ptr_eq(b),
            (HostValue::Global(a), HostValue::Global(b)) => a.ptr_eq(b),
            (HostValue::Suspending(a), HostValue::Suspending(b)) => Rc::ptr_eq(a, b),
            (HostValue::Suspender(a), HostValue::Suspender(b)) => a == b,
            (HostValue::Error(a), HostValue::Error(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            HostValue::Number(n) if n.is_nan() => write!(f, "NaN"),
            HostValue::Number(n) if n.is_infinite() => {
                write!(f, "{}Infinity", if *n < 0.0 { "-" } else { "" })
            }
            HostValue::Number(n) => write!(f, "{n}"),
            HostValue::BigInt(n) => write!(f, "{n}n"),
            HostValue::String(s) => write!(f, "{s}"),
            HostValue::Object(_) => write!(f, "[object Object]"),
            HostValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
            HostValue::Function(func) => write!(f, "function {}() {{ [native code] }}", func.name()),
            HostValue::Promise(_) => write!(f, "[object Promise]"),
            HostValue::Tag(_) => write!(f, "[object WebAssembly.Tag]"),
            HostValue::Exception(_) => write!(f, "[object WebAssembly.Exception]"),
            HostValue::Global(_) => write!(f, "[object WebAssembly.Global]"),
            HostValue::Suspending(_) => write!(f, "[object WebAssembly.Suspending]"),
            HostValue::Suspender(id) => write!(f, "[suspender {id}]"),
            HostValue::Error(error) => write!(f, "{error}"),
        }
    }
}

/// ToInt32: wrap the truncated number modulo 2^32
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

impl HostValue {
    pub fn string(s: &str) -> Self {
        HostValue::String(Rc::from(s))
    }

    /// A plain object with the given properties
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, HostValue)>,
        K: Into<String>,
    {
        let object = HostObject::new();
        for (name, value) in properties {
            object.set(name, value);
        }
        HostValue::Object(object)
    }

    pub fn array(items: Vec<HostValue>) -> Self {
        HostValue::Array(Rc::new(items))
    }

    /// Type name as `typeof`-style diagnostics print it
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::BigInt(_) => "bigint",
            HostValue::String(_) => "string",
            HostValue::Function(_) => "function",
            _ => "object",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, HostValue::Function(_))
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            HostValue::Promise(promise) => Some(promise),
            _ => None,
        }
    }

    /// The `then` function of an object that exposes one
    pub fn thenable(&self) -> Option<HostValue> {
        match self {
            HostValue::Object(object) => object.get("then").filter(HostValue::is_callable),
            _ => None,
        }
    }

    /// Property lookup on objects; `undefined` for everything else
    pub fn get(&self, name: &str) -> HostValue {
        match self {
            HostValue::Object(object) => object.get(name).unwrap_or(HostValue::Undefined),
            _ => HostValue::Undefined,
        }
    }

    /// ToNumber
    ///
    /// # Errors
    /// `TypeError` for a bigint, which never converts implicitly
    pub fn to_number(&self) -> Result<f64, Error> {
        Ok(match self {
            HostValue::Undefined => f64::NAN,
            HostValue::Null => 0.0,
            HostValue::Bool(b) => f64::from(u8::from(*b)),
            HostValue::Number(n) => *n,
            HostValue::BigInt(_) => {
                return Err(Error::Type("Cannot convert a BigInt value to a number".to_string()))
            }
            HostValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
            _ => f64::NAN,
        })
    }

    fn to_bigint(&self) -> Result<i64, Error> {
        match self {
            HostValue::BigInt(n) => Ok(*n),
            HostValue::Bool(b) => Ok(i64::from(*b)),
            HostValue::String(s) => s
                .trim()
                .parse()
                .map_err(|_| Error::Type(format!("Cannot convert {s} to a BigInt"))),
            other => Err(Error::Type(format!("Cannot convert {other} to a BigInt"))),
        }
    }

    /// Convert to a WebAssembly value of type `ty`
    pub fn to_wasm(&self, ty: ValueType) -> Result<Value, Error> {
        Ok(match ty {
            ValueType::I32 => Value::I32(to_int32(self.to_number()?)),
            ValueType::I64 => Value::I64(self.to_bigint()?),
            ValueType::F32 => Value::F32(self.to_number()? as f32),
            ValueType::F64 => Value::F64(self.to_number()?),
            ValueType::ExternRef => Value::ExternRef(self.clone()),
        })
    }

    pub fn from_wasm(value: &Value) -> Self {
        match value {
            Value::I32(v) => HostValue::Number(f64::from(*v)),
            Value::I64(v) => HostValue::BigInt(*v),
            Value::F32(v) => HostValue::Number(f64::from(*v)),
            Value::F64(v) => HostValue::Number(*v),
            Value::ExternRef(v) => v.clone(),
        }
    }

    /// Convert a host call's return value to the callee's result types
    ///
    /// No results ignore the value, one result converts it, several results
    /// require an array of exactly that length.
    pub fn to_wasm_results(&self, types: &[ValueType]) -> Result<Vec<Value>, Error> {
        match types {
            [] => Ok(Vec::new()),
            [ty] => Ok(vec![self.to_wasm(*ty)?]),
            _ => match self {
                HostValue::Array(items) if items.len() == types.len() => {
                    items.iter().zip(types).map(|(item, ty)| item.to_wasm(*ty)).collect()
                }
                _ => Err(Error::Type(format!(
                    "multi-value return must be an array of {} values",
                    types.len()
                ))),
            },
        }
    }

    /// Inverse of [`HostValue::to_wasm_results`]
    pub fn from_wasm_results(values: Vec<Value>) -> Self {
        match values.as_slice() {
            [] => HostValue::Undefined,
            [value] => HostValue::from_wasm(value),
            values => HostValue::array(values.iter().map(HostValue::from_wasm).collect()),
        }
    }

    /// Convert host arguments to `types`, filling missing ones with `undefined`
    /// and ignoring extras
    pub fn to_wasm_args(args: &[HostValue], types: &[ValueType]) -> Result<Vec<Value>, Error> {
        types
            .iter()
            .enumerate()
            .map(|(i, ty)| args.get(i).unwrap_or(&HostValue::Undefined).to_wasm(*ty))
            .collect()
    }

    /// Plain-data view of the value, for deserialising descriptors such as
    /// function signatures and wrapper options
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        Ok(match self {
            HostValue::Undefined | HostValue::Null => serde_json::Value::Null,
            HostValue::Bool(b) => serde_json::Value::Bool(*b),
            HostValue::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => serde_json::Value::from(*n as i64),
            HostValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            HostValue::String(s) => serde_json::Value::String(s.to_string()),
            HostValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(HostValue::to_json).collect::<Result<_, _>>()?)
            }
            HostValue::Object(object) => {
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    map.insert(key.clone(), object.get(&key).unwrap_or(HostValue::Undefined).to_json()?);
                }
                serde_json::Value::Object(map)
            }
            other => {
                return Err(Error::Type(format!(
                    "{} cannot be used as a plain descriptor value",
                    other.type_name()
                )))
            }
        })
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Number(f64::from(n))
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::string(s)
    }
}

impl From<Promise> for HostValue {
    fn from(promise: Promise) -> Self {
        HostValue::Promise(promise)
    }
}

impl From<Tag> for HostValue {
    fn from(tag: Tag) -> Self {
        HostValue::Tag(tag)
    }
}

impl From<Exception> for HostValue {
    fn from(exception: Exception) -> Self {
        HostValue::Exception(exception)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(HostValue::Undefined, 0)]
    #[case(HostValue::Null, 0)]
    #[case(HostValue::Bool(true), 1)]
    #[case(HostValue::Number(42.9), 42)]
    #[case(HostValue::Number(-1.5), -1)]
    #[case(HostValue::Number(4_294_967_297.0), 1)]
    #[case(HostValue::Number(2_147_483_648.0), i32::MIN)]
    #[case(HostValue::Number(f64::NAN), 0)]
    #[case(HostValue::Number(f64::INFINITY), 0)]
    #[case(HostValue::string(" 12 "), 12)]
    #[case(HostValue::string("twelve"), 0)]
    #[case(HostValue::object(Vec::<(String, HostValue)>::new()), 0)]
    fn test_to_i32(#[case] value: HostValue, #[case] expected: i32) {
        assert_eq!(value.to_wasm(ValueType::I32).unwrap(), Value::I32(expected));
    }

    #[test]
    fn test_bigint_rules() {
        assert!(HostValue::BigInt(1).to_wasm(ValueType::I32).is_err());
        assert_eq!(HostValue::BigInt(-3).to_wasm(ValueType::I64).unwrap(), Value::I64(-3));
        assert!(HostValue::Number(3.0).to_wasm(ValueType::I64).is_err());
        assert!(HostValue::Undefined.to_wasm(ValueType::I64).is_err());
    }

    #[test]
    fn test_externref_carries_identity() {
        let object = HostValue::object([("a", HostValue::Number(1.0))]);
        match object.to_wasm(ValueType::ExternRef).unwrap() {
            Value::ExternRef(inner) => assert_eq!(inner, object),
            other => panic!("unexpected {other:?}"),
        }
        assert_ne!(object, HostValue::object([("a", HostValue::Number(1.0))]));
    }

    #[test]
    fn test_results_conversion() {
        assert_eq!(HostValue::Number(9.0).to_wasm_results(&[]).unwrap(), vec![]);
        assert_eq!(
            HostValue::array(vec![HostValue::Number(1.0), HostValue::BigInt(2)])
                .to_wasm_results(&[ValueType::I32, ValueType::I64])
                .unwrap(),
            vec![Value::I32(1), Value::I64(2)]
        );
        assert!(HostValue::Number(1.0)
            .to_wasm_results(&[ValueType::I32, ValueType::I32])
            .is_err());
        assert_eq!(HostValue::from_wasm_results(vec![]), HostValue::Undefined);
        assert_eq!(HostValue::from_wasm_results(vec![Value::I32(42)]), HostValue::Number(42.0));
    }

    #[test]
    fn test_arguments_tolerate_arity() {
        let types = [ValueType::I32, ValueType::I32];
        assert_eq!(
            HostValue::to_wasm_args(&[HostValue::Number(1.0)], &types).unwrap(),
            vec![Value::I32(1), Value::I32(0)]
        );
        assert_eq!(
            HostValue::to_wasm_args(&[1.into(), 2.into(), 3.into()], &types).unwrap(),
            vec![Value::I32(1), Value::I32(2)]
        );
    }

    #[test]
    fn test_thenable_detection() {
        let then = HostValue::function("then", |_, _| Ok(HostValue::Undefined));
        assert!(HostValue::object([("then", then)]).thenable().is_some());
        assert!(HostValue::object([("then", HostValue::Number(1.0))]).thenable().is_none());
        assert!(HostValue::Number(1.0).thenable().is_none());
    }

    #[test]
    fn test_to_json() {
        let descriptor = HostValue::object([
            ("parameters", HostValue::array(vec!["externref".into(), "i32".into()])),
            ("results", HostValue::array(vec!["i32".into()])),
        ]);
        assert_eq!(
            descriptor.to_json().unwrap(),
            serde_json::json!({"parameters": ["externref", "i32"], "results": ["i32"]})
        );
        assert!(HostValue::Suspender(ContinuationId::new(1)).to_json().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(HostValue::Number(42.0).to_string(), "42");
        assert_eq!(HostValue::Number(0.5).to_string(), "0.5");
        assert_eq!(HostValue::BigInt(7).to_string(), "7n");
        assert_eq!(HostValue::Undefined.to_string(), "undefined");
    }
}
