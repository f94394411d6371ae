//! IR value types

use crate::types::Type;
use serde::Serialize;
use std::fmt;

/// Type carried by every IR value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ValueType {
    /// Plain source-level value
    Ty(Type),
    /// Address of storage holding a `T` (produced by `alloc`, `get_address`, `index_string`)
    MemLoc(Type),
    /// Untyped machine word produced by target ops after lowering
    Reg,
}

impl ValueType {
    /// Source type of a plain value
    pub fn source_type(&self) -> Option<&Type> {
        match self {
            ValueType::Ty(ty) => Some(ty),
            _ => None,
        }
    }

    /// Type stored behind a memory location
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            ValueType::MemLoc(ty) => Some(ty),
            _ => None,
        }
    }

    /// Check if this is a memory location
    pub fn is_memloc(&self) -> bool {
        matches!(self, ValueType::MemLoc(_))
    }
}

impl From<Type> for ValueType {
    fn from(ty: Type) -> Self {
        ValueType::Ty(ty)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Ty(ty) => write!(f, "{}", ty),
            ValueType::MemLoc(ty) => write!(f, "memloc<{}>", ty),
            ValueType::Reg => write!(f, "reg"),
        }
    }
}
