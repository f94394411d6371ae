//! Library-call introduction
//!
//! Rewrites the polymorphic built-ins into runtime entry points chosen by the
//! static type of their operands:
//!
//! | Source | Runtime call |
//! |--------|--------------|
//! | `print(int)` / `print(bool)` / `print(str)` | `_print_int` / `_print_bool` / `_print_str` |
//! | `input()` | `_input` |
//! | `list + list`, `str + str` | `_list_concat` |
//! | `str == str` | `_str_eq` |
//! | `str != str` | `not _str_eq` |
//!
//! `len` is left alone; lowering expands it inline.

use super::ir::{IrModule, OpId, OpKind, ValueType};
use super::runtime::symbols;
use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{Error, Result};
use crate::types::Type;

/// Library-call rewrite pass
#[derive(Debug, Default)]
pub struct LibraryCalls {
    rewritten: usize,
}

impl LibraryCalls {
    /// Create the pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every built-in use in the module; returns the number of rewrites
    pub fn run(&mut self, module: &mut IrModule) -> Result<usize> {
        for id in module.walk() {
            if module.is_live(id) {
                self.rewrite(module, id)?;
            }
        }
        tracing::debug!(rewritten = self.rewritten, "library calls introduced");
        Ok(self.rewritten)
    }

    fn rewrite(&mut self, module: &mut IrModule, id: OpId) -> Result<()> {
        let op = module.op(id)?;
        let kind = op.kind.clone();
        let operand_types: Vec<Type> = op
            .operands()
            .iter()
            .map(|&v| {
                module
                    .value_type(v)
                    .map(|ty| ty.source_type().cloned().unwrap_or(Type::Object))
            })
            .collect::<Result<_>>()?;

        let callee = match (&kind, operand_types.as_slice()) {
            (OpKind::CallExpr { func }, [arg]) if func == "print" => match arg {
                Type::Int => symbols::PRINT_INT,
                Type::Bool => symbols::PRINT_BOOL,
                Type::Str => symbols::PRINT_STR,
                other => {
                    return Err(Error::unimplemented(format!(
                        "print of a value of type {}",
                        other
                    )))
                }
            },
            (OpKind::CallExpr { func }, []) if func == "input" => symbols::INPUT,
            (OpKind::CallExpr { func }, _) if func == "print" || func == "input" => {
                return Err(Error::internal(format!(
                    "{} called with {} argument(s)",
                    func,
                    operand_types.len()
                )))
            }
            (OpKind::BinaryExpr(BinaryOp::Add), [lhs, _]) if is_sequence(lhs) => {
                symbols::LIST_CONCAT
            }
            (OpKind::BinaryExpr(BinaryOp::Eq), [Type::Str, Type::Str]) => symbols::STR_EQ,
            (OpKind::BinaryExpr(BinaryOp::NotEq), [Type::Str, Type::Str]) => {
                return self.rewrite_str_ne(module, id);
            }
            _ => return Ok(()),
        };

        tracing::trace!(from = %kind, to = callee, "library call");
        module.op_mut(id)?.kind = OpKind::CallExpr {
            func: callee.to_string(),
        };
        self.rewritten += 1;
        Ok(())
    }

    /// `a != b` on strings becomes `not _str_eq(a, b)`
    fn rewrite_str_ne(&mut self, module: &mut IrModule, id: OpId) -> Result<()> {
        let operands = module.op(id)?.operands().to_vec();
        let mut ops = Vec::new();
        let eq = module.emit(
            &mut ops,
            OpKind::CallExpr {
                func: symbols::STR_EQ.to_string(),
            },
            operands,
            ValueType::Ty(Type::Bool),
        );
        let ne = module.emit(
            &mut ops,
            OpKind::UnaryExpr(UnaryOp::Not),
            vec![eq],
            ValueType::Ty(Type::Bool),
        );
        module.replace_op(id, ops, vec![ne])?;
        self.rewritten += 1;
        Ok(())
    }
}

/// Heap sequences that `+` concatenates
fn is_sequence(ty: &Type) -> bool {
    matches!(ty, Type::Str | Type::List(_) | Type::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Program, Stmt};
    use crate::compiler::ir::IrGenerator;

    fn callees(module: &IrModule) -> Vec<String> {
        module
            .walk()
            .into_iter()
            .filter_map(|id| match &module.op(id).unwrap().kind {
                OpKind::CallExpr { func } => Some(func.clone()),
                _ => None,
            })
            .collect()
    }

    fn lower(stmts: Vec<Stmt>) -> IrModule {
        let program = Program {
            decls: vec![],
            stmts,
        };
        let mut module = IrGenerator::new().generate(&program).unwrap();
        LibraryCalls::new().run(&mut module).unwrap();
        module.verify().unwrap();
        module
    }

    #[test]
    fn test_print_dispatch_by_static_type() {
        let module = lower(vec![
            Stmt::print(Expr::int(1)),
            Stmt::print(Expr::bool(true)),
            Stmt::print(Expr::str("hi")),
        ]);
        assert_eq!(callees(&module), vec!["_print_int", "_print_bool", "_print_str"]);
    }

    #[test]
    fn test_print_of_list_is_unimplemented() {
        let program = Program {
            decls: vec![],
            stmts: vec![Stmt::print(Expr::list(vec![], Type::Empty))],
        };
        let mut module = IrGenerator::new().generate(&program).unwrap();
        let err = LibraryCalls::new().run(&mut module).unwrap_err();
        assert!(matches!(err, Error::Unimplemented { .. }));
    }

    #[test]
    fn test_string_comparisons() {
        let module = lower(vec![
            Stmt::print(Expr::binary(BinaryOp::Eq, Expr::str("a"), Expr::str("b"), Type::Bool)),
            Stmt::print(Expr::binary(BinaryOp::NotEq, Expr::str("a"), Expr::str("b"), Type::Bool)),
        ]);
        assert_eq!(
            callees(&module),
            vec!["_str_eq", "_print_bool", "_str_eq", "_print_bool"]
        );
        let nots = module
            .walk()
            .into_iter()
            .filter(|&id| matches!(module.op(id).unwrap().kind, OpKind::UnaryExpr(UnaryOp::Not)))
            .count();
        assert_eq!(nots, 1);
    }

    #[test]
    fn test_concatenation() {
        let module = lower(vec![Stmt::print(Expr::binary(
            BinaryOp::Add,
            Expr::str("a"),
            Expr::str("b"),
            Type::Str,
        ))]);
        assert_eq!(callees(&module), vec!["_list_concat", "_print_str"]);
    }

    #[test]
    fn test_int_ops_untouched() {
        let module = lower(vec![Stmt::print(Expr::binary(
            BinaryOp::Eq,
            Expr::int(1),
            Expr::int(2),
            Type::Bool,
        ))]);
        assert_eq!(callees(&module), vec!["_print_bool"]);
    }
}
