//! Typed syntax tree consumed by the back end
//!
//! The tree arrives fully name-resolved and type-annotated from the external
//! front end: every [`Expr`] carries its static [`Type`]. It derives serde so
//! that the front end can hand it over as JSON.

use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Complete program: global declarations followed by top-level statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    /// Global variable and function definitions
    pub decls: Vec<Decl>,
    /// Top-level statements, executed in order
    pub stmts: Vec<Stmt>,
}

/// Declarations (at top level or at the head of a function body)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decl {
    /// `x: int = 1`
    Var(VarDef),
    /// `def f(...) -> T: ...`
    Func(FuncDef),
    /// `global x`
    Global(String),
    /// `nonlocal x`
    NonLocal(String),
}

/// Variable definition with a literal initializer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    /// Variable name
    pub name: String,
    /// Declared type
    pub ty: Type,
    /// Initial value
    pub init: Literal,
}

/// Typed parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedVar {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: Type,
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDef {
    /// Function name
    pub name: String,
    /// Parameters in call order
    pub params: Vec<TypedVar>,
    /// Declared return type (`<None>` when omitted)
    pub return_type: Type,
    /// Local declarations
    pub decls: Vec<Decl>,
    /// Function body
    pub body: Vec<Stmt>,
}

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// Expression evaluated for its effect
    Expr(Expr),
    /// Assignment, possibly chained
    Assign(Assign),
    /// `return` with optional value
    Return(Option<Expr>),
    /// `pass`
    Pass,
    /// If statement (`elif` is a nested `If` in `orelse`)
    If {
        /// Condition
        cond: Expr,
        /// Then branch
        then: Vec<Stmt>,
        /// Else branch (possibly empty)
        orelse: Vec<Stmt>,
    },
    /// While loop
    While {
        /// Loop condition
        cond: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
    /// For loop over a list or string
    For {
        /// Loop variable (must already be defined)
        target: String,
        /// Iterated expression
        iter: Expr,
        /// Loop body
        body: Vec<Stmt>,
    },
}

/// Assignment `target = value`, where `value` may itself be an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    /// Assigned location (a name or an index expression)
    pub target: Expr,
    /// Right-hand side
    pub value: AssignValue,
}

/// Right-hand side of an assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignValue {
    /// Plain expression
    Expr(Expr),
    /// `a = b = ...` chain
    Chain(Box<Assign>),
}

/// Typed expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression shape
    pub kind: ExprKind,
    /// Static type assigned by the type checker
    pub ty: Type,
}

/// Expression shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Literal constant
    Literal(Literal),
    /// Identifier reference
    Name(String),
    /// Unary operation
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// `then if cond else orelse`
    IfExpr {
        /// Condition
        cond: Box<Expr>,
        /// Value when true
        then: Box<Expr>,
        /// Value when false
        orelse: Box<Expr>,
    },
    /// List display `[a, b, c]`
    List(Vec<Expr>),
    /// `value[index]`
    Index {
        /// Indexed list or string
        value: Box<Expr>,
        /// Index
        index: Box<Expr>,
    },
    /// Function call (user function or built-in `print`, `len`, `input`)
    Call {
        /// Callee name
        func: String,
        /// Arguments
        args: Vec<Expr>,
    },
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    /// Integer literal
    Int(i32),
    /// Boolean literal
    Bool(bool),
    /// String literal
    Str(String),
    /// `None`
    None,
}

impl Literal {
    /// Static type of the literal
    pub fn ty(&self) -> Type {
        match self {
            Literal::Int(_) => Type::Int,
            Literal::Bool(_) => Type::Bool,
            Literal::Str(_) => Type::Str,
            Literal::None => Type::None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition, list/string concatenation (+)
    Add,
    /// Subtraction (-)
    Sub,
    /// Multiplication (*)
    Mul,
    /// Floored integer division (//)
    FloorDiv,
    /// Floored modulo (%)
    Mod,

    // Comparison
    /// Equality (==)
    Eq,
    /// Inequality (!=)
    NotEq,
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    LtEq,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    GtEq,
    /// Object identity (is)
    Is,

    // Logical (short-circuit)
    /// Logical and
    And,
    /// Logical or
    Or,
}

impl BinaryOp {
    /// Operators whose result is always `bool`
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
                | BinaryOp::Is
        )
    }

    /// Operators that evaluate their right operand conditionally
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Operators that trap on a zero divisor
    pub fn can_trap(&self) -> bool {
        matches!(self, BinaryOp::FloorDiv | BinaryOp::Mod)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Negation (-x)
    Neg,
    /// Logical not
    Not,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::FloorDiv => write!(f, "//"),
            BinaryOp::Mod => write!(f, "%"),
            BinaryOp::Eq => write!(f, "=="),
            BinaryOp::NotEq => write!(f, "!="),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::Is => write!(f, "is"),
            BinaryOp::And => write!(f, "and"),
            BinaryOp::Or => write!(f, "or"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "not"),
        }
    }
}

// =============================================================================
// BUILDERS
// =============================================================================

impl Expr {
    /// Wrap a kind with its type
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    /// Integer literal
    pub fn int(value: i32) -> Self {
        Self::new(ExprKind::Literal(Literal::Int(value)), Type::Int)
    }

    /// Boolean literal
    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Literal(Literal::Bool(value)), Type::Bool)
    }

    /// String literal
    pub fn str(value: &str) -> Self {
        Self::new(ExprKind::Literal(Literal::Str(value.to_string())), Type::Str)
    }

    /// `None` literal
    pub fn none() -> Self {
        Self::new(ExprKind::Literal(Literal::None), Type::None)
    }

    /// Variable reference of the given type
    pub fn name(name: &str, ty: Type) -> Self {
        Self::new(ExprKind::Name(name.to_string()), ty)
    }

    /// Unary expression; the result has the operand's type
    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        let ty = operand.ty.clone();
        Self::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
        )
    }

    /// Binary expression with an explicit result type
    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Self::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            ty,
        )
    }

    /// Conditional expression typed by the join of its arms
    pub fn if_expr(cond: Expr, then: Expr, orelse: Expr) -> Self {
        let ty = then.ty.join(&orelse.ty);
        Self::new(
            ExprKind::IfExpr {
                cond: Box::new(cond),
                then: Box::new(then),
                orelse: Box::new(orelse),
            },
            ty,
        )
    }

    /// List display of the given type
    pub fn list(elems: Vec<Expr>, ty: Type) -> Self {
        Self::new(ExprKind::List(elems), ty)
    }

    /// Index expression of the given element type
    pub fn index(value: Expr, index: Expr, ty: Type) -> Self {
        Self::new(
            ExprKind::Index {
                value: Box::new(value),
                index: Box::new(index),
            },
            ty,
        )
    }

    /// Call expression with the given result type
    pub fn call(func: &str, args: Vec<Expr>, ty: Type) -> Self {
        Self::new(
            ExprKind::Call {
                func: func.to_string(),
                args,
            },
            ty,
        )
    }
}

impl Stmt {
    /// Single-target assignment
    pub fn assign(target: Expr, value: Expr) -> Self {
        Stmt::Assign(Assign {
            target,
            value: AssignValue::Expr(value),
        })
    }

    /// Chained assignment `t0 = t1 = ... = value`
    pub fn assign_chain(targets: Vec<Expr>, value: Expr) -> Self {
        let mut rhs = AssignValue::Expr(value);
        let mut targets = targets;
        while let Some(target) = targets.pop() {
            if targets.is_empty() {
                return Stmt::Assign(Assign { target, value: rhs });
            }
            rhs = AssignValue::Chain(Box::new(Assign { target, value: rhs }));
        }
        // Zero targets degenerates to an expression statement
        match rhs {
            AssignValue::Expr(e) => Stmt::Expr(e),
            AssignValue::Chain(a) => Stmt::Assign(*a),
        }
    }

    /// `print(value)` statement
    pub fn print(value: Expr) -> Self {
        Stmt::Expr(Expr::call("print", vec![value], Type::None))
    }
}

impl Assign {
    /// All targets left to right, and the final right-hand side
    pub fn targets_and_value(&self) -> (Vec<&Expr>, &Expr) {
        let mut targets = vec![&self.target];
        let mut value = &self.value;
        loop {
            match value {
                AssignValue::Expr(e) => return (targets, e),
                AssignValue::Chain(inner) => {
                    targets.push(&inner.target);
                    value = &inner.value;
                }
            }
        }
    }
}

impl VarDef {
    /// Variable definition
    pub fn new(name: &str, ty: Type, init: Literal) -> Self {
        Self {
            name: name.to_string(),
            ty,
            init,
        }
    }
}

impl FuncDef {
    /// Function definition without local declarations
    pub fn new(name: &str, params: Vec<(&str, Type)>, return_type: Type, body: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            params: params
                .into_iter()
                .map(|(name, ty)| TypedVar {
                    name: name.to_string(),
                    ty,
                })
                .collect(),
            return_type,
            decls: Vec::new(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_chain_order() {
        let stmt = Stmt::assign_chain(
            vec![
                Expr::name("a", Type::Int),
                Expr::name("b", Type::Int),
                Expr::name("c", Type::Int),
            ],
            Expr::int(7),
        );
        let Stmt::Assign(assign) = stmt else {
            panic!("expected assignment");
        };
        let (targets, value) = assign.targets_and_value();
        let names: Vec<_> = targets
            .iter()
            .map(|t| match &t.kind {
                ExprKind::Name(n) => n.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(value, &Expr::int(7));
    }

    #[test]
    fn test_json_round_trip() {
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("x", Type::Int, Literal::Int(3)))],
            stmts: vec![Stmt::print(Expr::name("x", Type::Int))],
        };
        let json = serde_json::to_string(&program).unwrap();
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn test_operator_classes() {
        assert!(BinaryOp::Is.is_comparison());
        assert!(BinaryOp::Or.is_short_circuit());
        assert!(BinaryOp::Mod.can_trap());
        assert!(!BinaryOp::Add.can_trap());
        assert_eq!(BinaryOp::FloorDiv.to_string(), "//");
    }
}
