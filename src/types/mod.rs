//! # Source-Level Type System
//!
//! The static types the external type checker attaches to every expression.
//! The back end never infers types; it only needs the subtype lattice to type
//! list displays and list concatenation.
//!
//! ```text
//!              object
//!      /    /    |     \        \
//!   int  bool   str  [T]...    <None>
//!                      |
//!                   <Empty>
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source-level type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// 32-bit signed integer
    Int,
    /// Boolean
    Bool,
    /// Immutable string
    Str,
    /// Type of the `None` literal
    None,
    /// Type of the empty list display `[]`
    Empty,
    /// Top of the lattice
    Object,
    /// Homogeneous list
    List(Box<Type>),
}

impl Type {
    /// Convenience constructor for `[elem]`
    pub fn list(elem: Type) -> Self {
        Type::List(Box::new(elem))
    }

    /// Element type of a list, `None` for non-list types
    pub fn elem_type(&self) -> Option<&Type> {
        match self {
            Type::List(elem) => Some(elem),
            _ => None,
        }
    }

    /// Check if this is a list type
    pub fn is_list(&self) -> bool {
        matches!(self, Type::List(_))
    }

    /// Types whose values are heap pointers (and therefore may be None)
    pub fn is_reference(&self) -> bool {
        !matches!(self, Type::Int | Type::Bool)
    }

    /// `self <: other`
    pub fn is_subtype(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        match (self, other) {
            (Type::Int | Type::Bool | Type::Str | Type::List(_), Type::Object) => true,
            (Type::None | Type::Empty, Type::Object) => true,
            _ => false,
        }
    }

    /// Whether a value of type `self` may be stored where `other` is expected
    pub fn is_assignment_compatible(&self, other: &Type) -> bool {
        if self.is_subtype(other) {
            return true;
        }
        match (self, other) {
            (Type::None, t) => !matches!(t, Type::Int | Type::Bool | Type::Str),
            (Type::Empty, Type::List(_)) => true,
            (Type::List(elem), Type::List(target)) => {
                **elem == Type::None && Type::None.is_assignment_compatible(target)
            }
            _ => false,
        }
    }

    /// Least upper bound of two types
    pub fn join(&self, other: &Type) -> Type {
        if self.is_assignment_compatible(other) {
            other.clone()
        } else if other.is_assignment_compatible(self) {
            self.clone()
        } else {
            Type::Object
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::None => write!(f, "<None>"),
            Type::Empty => write!(f, "<Empty>"),
            Type::Object => write!(f, "object"),
            Type::List(elem) => write!(f, "[{}]", elem),
        }
    }
}
