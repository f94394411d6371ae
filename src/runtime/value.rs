use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::Literal;
use crate::error::{Error, Result};

/// Runtime value representation
///
/// Lists alias: cloning a `Value::List` clones the handle, not the elements,
/// matching the compiled heap where a list value is a pointer.
#[derive(Debug, Clone)]
pub enum Value {
    /// `None` (the null pointer)
    None,
    /// 32-bit integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// Immutable byte string
    Str(Rc<Vec<u8>>),
    /// Mutable, shared list
    List(Rc<RefCell<Vec<Value>>>),
}

impl Value {
    /// Fresh value for a literal (string literals allocate a new object)
    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Int(n) => Value::Int(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Str(s) => Value::str(s.as_bytes()),
            Literal::None => Value::None,
        }
    }

    /// New string object
    pub fn str(bytes: &[u8]) -> Self {
        Value::Str(Rc::new(bytes.to_vec()))
    }

    /// New list object
    pub fn list(elems: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(elems)))
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Result<i32> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(Error::internal(format!(
                "expected int, found {}",
                other.type_name()
            ))),
        }
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::internal(format!(
                "expected bool, found {}",
                other.type_name()
            ))),
        }
    }

    /// Word the compiled program holds for this value, for `is` on scalars
    fn scalar_word(&self) -> Option<i32> {
        match self {
            Value::None => Some(0),
            Value::Int(n) => Some(*n),
            Value::Bool(b) => Some(i32::from(*b)),
            Value::Str(_) | Value::List(_) => None,
        }
    }

    /// `is`: object identity for heap values, word equality otherwise
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            _ => match (self.scalar_word(), other.scalar_word()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// `==`: by content for strings, by word for scalars
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => self.is(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Str(s) => write!(f, "{}", String::from_utf8_lossy(s)),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_and_equality() {
        let a = Value::str(b"hi");
        let b = Value::str(b"hi");
        assert!(a.equals(&b));
        assert!(!a.is(&b));
        assert!(a.is(&a.clone()));
        assert!(Value::None.is(&Value::None));
        assert!(Value::Int(3).equals(&Value::Int(3)));
    }

    #[test]
    fn test_lists_alias() {
        let a = Value::list(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::List(items) = &b {
            items.borrow_mut()[0] = Value::Int(9);
        }
        assert_eq!(a.to_string(), "[9]");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::from_literal(&Literal::Str("x".into())).to_string(), "x");
        assert_eq!(Value::None.type_name(), "NoneType");
    }
}
