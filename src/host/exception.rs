//! Exception tags and tagged exceptions
//!
//! Both are reference counted; identity is what `catch` matches on and what
//! a rejected promise preserves.

use super::HostValue;
use crate::error::Error;
use crate::module::ValueType;
use crate::runtime::Value;
use std::fmt;
use std::rc::Rc;

/// A `WebAssembly.Tag`
#[derive(Clone)]
pub struct Tag(Rc<Vec<ValueType>>);

impl Tag {
    pub fn new(parameters: Vec<ValueType>) -> Self {
        Tag(Rc::new(parameters))
    }

    pub fn parameters(&self) -> &[ValueType] {
        &self.0
    }

    pub fn ptr_eq(&self, other: &Tag) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:p}, {:?})", Rc::as_ptr(&self.0), self.0)
    }
}

struct ExceptionInner {
    tag: Tag,
    payload: Vec<Value>,
}

/// A `WebAssembly.Exception`: a tag plus payload values
#[derive(Clone)]
pub struct Exception(Rc<ExceptionInner>);

impl Exception {
    pub fn new(tag: Tag, payload: Vec<Value>) -> Self {
        Exception(Rc::new(ExceptionInner { tag, payload }))
    }

    /// `new WebAssembly.Exception(tag, payload)` from host values
    ///
    /// # Errors
    /// `TypeError` if the payload length differs from the tag's parameters or
    /// a value does not convert
    pub fn from_host(tag: &Tag, payload: &[HostValue]) -> Result<Self, Error> {
        if payload.len() != tag.parameters().len() {
            return Err(Error::Type(format!(
                "WebAssembly.Exception(): Number of exception values ({}) does not match the tag signature ({})",
                payload.len(),
                tag.parameters().len()
            )));
        }
        let values = payload
            .iter()
            .zip(tag.parameters())
            .map(|(value, ty)| value.to_wasm(*ty))
            .collect::<Result<_, _>>()?;
        Ok(Exception::new(tag.clone(), values))
    }

    pub fn tag(&self) -> &Tag {
        &self.0.tag
    }

    pub fn payload(&self) -> &[Value] {
        &self.0.payload
    }

    /// Whether this exception carries `tag`
    pub fn is(&self, tag: &Tag) -> bool {
        self.0.tag.ptr_eq(tag)
    }

    pub fn ptr_eq(&self, other: &Exception) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("tag", &self.0.tag)
            .field("payload", &self.0.payload)
            .finish()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload: Vec<String> = self.0.payload.iter().map(ToString::to_string).collect();
        write!(f, "WebAssembly.Exception [{}]", payload.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_identity() {
        let a = Tag::new(vec![ValueType::I32]);
        let b = Tag::new(vec![ValueType::I32]);
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));

        let exception = Exception::new(a.clone(), vec![Value::I32(1)]);
        assert!(exception.is(&a));
        assert!(!exception.is(&b));
    }

    #[test]
    fn test_from_host_checks_payload() {
        let tag = Tag::new(vec![ValueType::I32]);
        let exception = Exception::from_host(&tag, &[HostValue::Number(42.0)]).unwrap();
        assert_eq!(exception.payload(), &[Value::I32(42)]);
        assert!(Exception::from_host(&tag, &[]).is_err());
    }

    #[test]
    fn test_display() {
        let exception = Exception::new(Tag::new(vec![ValueType::I32]), vec![Value::I32(42)]);
        assert_eq!(exception.to_string(), "WebAssembly.Exception [i32:42]");
    }
}
