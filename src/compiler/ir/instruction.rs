//! IR operation kinds
//!
//! One closed enum covers every stage: the memory IR produced by the
//! translator, and the target-shaped ops that lowering rewrites it into.
//! Passes match on it exhaustively.

use crate::ast::{BinaryOp, Literal, UnaryOp};
use crate::types::Type;
use serde::Serialize;
use std::fmt;

/// Constant carried by a `literal` op
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LiteralValue {
    /// 32-bit integer
    Int(i32),
    /// Boolean
    Bool(bool),
    /// String (lowered to a heap object)
    Str(String),
    /// The null sentinel
    None,
}

impl LiteralValue {
    /// Source type of the constant
    pub fn ty(&self) -> Type {
        match self {
            LiteralValue::Int(_) => Type::Int,
            LiteralValue::Bool(_) => Type::Bool,
            LiteralValue::Str(_) => Type::Str,
            LiteralValue::None => Type::None,
        }
    }
}

impl From<&Literal> for LiteralValue {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Int(n) => LiteralValue::Int(*n),
            Literal::Bool(b) => LiteralValue::Bool(*b),
            Literal::Str(s) => LiteralValue::Str(s.clone()),
            Literal::None => LiteralValue::None,
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Int(n) => write!(f, "{}", n),
            LiteralValue::Bool(true) => write!(f, "True"),
            LiteralValue::Bool(false) => write!(f, "False"),
            LiteralValue::Str(s) => write!(f, "{:?}", s),
            LiteralValue::None => write!(f, "None"),
        }
    }
}

/// Operation kinds
///
/// Operand and region conventions are listed per variant; `[a, b]` names the
/// operand list in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OpKind {
    // Memory IR
    /// Constant; no operands
    Literal(LiteralValue),
    /// `[operand]`
    UnaryExpr(UnaryOp),
    /// `[lhs, rhs]`; never `and`/`or`
    BinaryExpr(BinaryOp),
    /// `and`/`or`; no operands, regions `[lhs, rhs]`, each ending in `yield`
    EffectfulBinaryExpr(BinaryOp),
    /// `[cond]`, regions `[then, else]`, each ending in `yield`
    IfExpr,
    /// `[cond]`, regions `[then, else]`
    If,
    /// Regions `[cond, body]`; `cond` ends in `yield`
    While,
    /// `[iter, target]` where `target` is a memory location; region `[body]`
    For,
    /// Function; region `[body]` whose arguments are the parameters
    FuncDef {
        /// Symbol name
        name: String,
        /// Declared return type
        return_type: Type,
    },
    /// `[value]`
    Return,
    /// `[value]`; terminates a value-producing region
    Yield,
    /// No-op placeholder for an empty statement block
    Pass,
    /// `[value, target0, target1, ...]`; stores `value` into every target in order
    Assign,
    /// Fresh storage for one `T`; result is a memory location
    Alloc(Type),
    /// `[memloc]`
    Load,
    /// `[memloc, value]`
    Store,
    /// Call by name; operands are the arguments, result is optional
    CallExpr {
        /// Callee symbol
        func: String,
    },
    /// List (or string) display; operands are the elements
    ListExpr,
    /// `[str, index]`; result is the address of one character word
    IndexString,
    /// `[list, index]`; result is the address of one element
    GetAddress,
    /// Reserved for the object model
    ClassDef {
        /// Class name
        name: String,
    },
    /// Reserved for the object model
    MemberExpr {
        /// Attribute name
        member: String,
    },

    // Target
    /// Flat machine-shaped instruction
    Target(TargetOp),
}

impl OpKind {
    /// Snake-case mnemonic used by the IR dump
    pub fn mnemonic(&self) -> &'static str {
        match self {
            OpKind::Literal(_) => "literal",
            OpKind::UnaryExpr(_) => "unary_expr",
            OpKind::BinaryExpr(_) => "binary_expr",
            OpKind::EffectfulBinaryExpr(_) => "effectful_binary_expr",
            OpKind::IfExpr => "if_expr",
            OpKind::If => "if",
            OpKind::While => "while",
            OpKind::For => "for",
            OpKind::FuncDef { .. } => "func_def",
            OpKind::Return => "return",
            OpKind::Yield => "yield",
            OpKind::Pass => "pass",
            OpKind::Assign => "assign",
            OpKind::Alloc(_) => "alloc",
            OpKind::Load => "load",
            OpKind::Store => "store",
            OpKind::CallExpr { .. } => "call_expr",
            OpKind::ListExpr => "list_expr",
            OpKind::IndexString => "index_string",
            OpKind::GetAddress => "get_address",
            OpKind::ClassDef { .. } => "class_def",
            OpKind::MemberExpr { .. } => "member_expr",
            OpKind::Target(op) => op.mnemonic(),
        }
    }

    /// Check if this is a flat target instruction
    pub fn is_target(&self) -> bool {
        matches!(self, OpKind::Target(_))
    }
}

/// Target-shaped instructions produced by lowering
///
/// Registers are still virtual (IR values); the register allocator maps them
/// onto stack slots and scratch registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TargetOp {
    /// Load immediate
    Li(i32),
    /// `[base]` -> word at `base + offset`
    Lw(i32),
    /// `[base, value]`; stores `value` at `base + offset`
    Sw(i32),
    /// `[a, b]`
    Add,
    /// `[a]` -> `a + imm`
    Addi(i32),
    /// `[a, b]`
    Sub,
    /// `[a, b]`
    Mul,
    /// `[a, b]`, truncating
    Div,
    /// `[a, b]`, truncating
    Rem,
    /// `[a, b]` -> `a < b`
    Slt,
    /// `[a, b]`
    And,
    /// `[a, b]`
    Or,
    /// `[a, b]`
    Xor,
    /// `[a]` -> `a == 0`
    Seqz,
    /// `[a]` -> `a != 0`
    Snez,
    /// `[a, b]`
    Beq(String),
    /// `[a, b]`
    Bne(String),
    /// `[a, b]`
    Blt(String),
    /// `[a, b]`
    Bge(String),
    /// Unconditional jump
    J(String),
    /// Jump target
    Label(String),
    /// Call; operands are the arguments
    Call {
        /// Callee symbol
        func: String,
    },
    /// `[value]`
    Return,
    /// One stack word; result is its address
    Alloc,
}

impl TargetOp {
    /// Assembly mnemonic
    pub fn mnemonic(&self) -> &'static str {
        match self {
            TargetOp::Li(_) => "li",
            TargetOp::Lw(_) => "lw",
            TargetOp::Sw(_) => "sw",
            TargetOp::Add => "add",
            TargetOp::Addi(_) => "addi",
            TargetOp::Sub => "sub",
            TargetOp::Mul => "mul",
            TargetOp::Div => "div",
            TargetOp::Rem => "rem",
            TargetOp::Slt => "slt",
            TargetOp::And => "and",
            TargetOp::Or => "or",
            TargetOp::Xor => "xor",
            TargetOp::Seqz => "seqz",
            TargetOp::Snez => "snez",
            TargetOp::Beq(_) => "beq",
            TargetOp::Bne(_) => "bne",
            TargetOp::Blt(_) => "blt",
            TargetOp::Bge(_) => "bge",
            TargetOp::J(_) => "j",
            TargetOp::Label(_) => "label",
            TargetOp::Call { .. } => "call",
            TargetOp::Return => "ret",
            TargetOp::Alloc => "alloc",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        match self {
            OpKind::Literal(value) => write!(f, " {}", value),
            OpKind::UnaryExpr(op) => write!(f, " {}", op),
            OpKind::BinaryExpr(op) | OpKind::EffectfulBinaryExpr(op) => write!(f, " {}", op),
            OpKind::FuncDef { name, .. } => write!(f, " @{}", name),
            OpKind::Alloc(ty) => write!(f, " {}", ty),
            OpKind::CallExpr { func } => write!(f, " @{}", func),
            OpKind::ClassDef { name } => write!(f, " {}", name),
            OpKind::MemberExpr { member } => write!(f, " .{}", member),
            OpKind::Target(op) => match op {
                TargetOp::Li(imm) | TargetOp::Addi(imm) | TargetOp::Lw(imm) | TargetOp::Sw(imm) => {
                    write!(f, " {}", imm)
                }
                TargetOp::Beq(label)
                | TargetOp::Bne(label)
                | TargetOp::Blt(label)
                | TargetOp::Bge(label)
                | TargetOp::J(label)
                | TargetOp::Label(label) => write!(f, " {}", label),
                TargetOp::Call { func } => write!(f, " @{}", func),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(OpKind::Literal(LiteralValue::Int(3)).to_string(), "literal 3");
        assert_eq!(OpKind::BinaryExpr(BinaryOp::FloorDiv).to_string(), "binary_expr //");
        assert_eq!(
            OpKind::CallExpr {
                func: "len".into()
            }
            .to_string(),
            "call_expr @len"
        );
        assert_eq!(OpKind::Target(TargetOp::Lw(8)).to_string(), "lw 8");
        assert_eq!(
            OpKind::Target(TargetOp::Beq(".Lif_else_0".into())).to_string(),
            "beq .Lif_else_0"
        );
    }

    #[test]
    fn test_literal_types() {
        assert_eq!(LiteralValue::from(&Literal::Str("a".into())).ty(), Type::Str);
        assert_eq!(LiteralValue::None.ty(), Type::None);
        assert_eq!(LiteralValue::Bool(true).to_string(), "True");
    }
}
