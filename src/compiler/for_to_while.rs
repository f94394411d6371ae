//! For-loop desugaring
//!
//! ```text
//! for x in iter: body
//! ```
//! becomes
//! ```text
//! idx = 0
//! while idx < len(iter):
//!     x = iter[idx]
//!     body
//!     idx = idx + 1
//! ```
//! `iter` is the already-evaluated operand of the `for` op, so it is computed
//! exactly once. Iterating a string binds fresh one-character strings.

use super::ir::{IrModule, LiteralValue, OpId, OpKind, Region, ValueId, ValueType};
use crate::ast::BinaryOp;
use crate::error::{Error, Result};
use crate::types::Type;

/// For-to-while rewrite pass
#[derive(Debug, Default)]
pub struct ForToWhile {
    rewritten: usize,
}

impl ForToWhile {
    /// Create the pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every `for` op in the module; returns how many were rewritten
    pub fn run(&mut self, module: &mut IrModule) -> Result<usize> {
        let loops: Vec<OpId> = module
            .walk()
            .into_iter()
            .filter(|&id| matches!(module.get(id).map(|op| &op.kind), Some(OpKind::For)))
            .collect();

        for id in loops {
            self.rewrite(module, id)?;
        }
        tracing::debug!(rewritten = self.rewritten, "for-to-while desugaring done");
        Ok(self.rewritten)
    }

    fn rewrite(&mut self, module: &mut IrModule, for_op: OpId) -> Result<()> {
        let (iter, target) = match module.op(for_op)?.operands() {
            [iter, target] => (*iter, *target),
            other => {
                return Err(Error::internal(format!(
                    "for expects 2 operands, found {}",
                    other.len()
                )))
            }
        };
        let iter_ty = module
            .value_type(iter)?
            .source_type()
            .cloned()
            .ok_or_else(|| Error::internal("for iterates a non-value"))?;
        let int = || ValueType::Ty(Type::Int);

        // idx = 0
        let mut ops = Vec::new();
        let idx = module.emit(
            &mut ops,
            OpKind::Alloc(Type::Int),
            vec![],
            ValueType::MemLoc(Type::Int),
        );
        let zero = module.emit(&mut ops, OpKind::Literal(LiteralValue::Int(0)), vec![], int());
        module.emit_void(&mut ops, OpKind::Store, vec![idx, zero]);

        // idx < len(iter)
        let mut cond = Vec::new();
        let len = module.emit(
            &mut cond,
            OpKind::CallExpr {
                func: "len".to_string(),
            },
            vec![iter],
            int(),
        );
        let current = module.emit(&mut cond, OpKind::Load, vec![idx], int());
        let in_range = module.emit(
            &mut cond,
            OpKind::BinaryExpr(BinaryOp::Lt),
            vec![current, len],
            ValueType::Ty(Type::Bool),
        );
        module.emit_void(&mut cond, OpKind::Yield, vec![in_range]);

        // x = iter[idx]; body; idx = idx + 1
        let mut body = Vec::new();
        let current = module.emit(&mut body, OpKind::Load, vec![idx], int());
        let element = self.element(module, &mut body, iter, &iter_ty, current)?;
        module.emit_void(&mut body, OpKind::Store, vec![target, element]);

        body.extend(module.take_region(for_op, 0)?.ops);

        let current = module.emit(&mut body, OpKind::Load, vec![idx], int());
        let one = module.emit(&mut body, OpKind::Literal(LiteralValue::Int(1)), vec![], int());
        let next = module.emit(
            &mut body,
            OpKind::BinaryExpr(BinaryOp::Add),
            vec![current, one],
            int(),
        );
        module.emit_void(&mut body, OpKind::Store, vec![idx, next]);

        let while_op = module.create_op(
            OpKind::While,
            vec![],
            None,
            vec![Region::with_ops(cond), Region::with_ops(body)],
        );
        ops.push(while_op);

        module.replace_op(for_op, ops, vec![])?;
        self.rewritten += 1;
        tracing::trace!(iter = %iter, "desugared for loop");
        Ok(())
    }

    /// Value of `iter[index]`
    fn element(
        &self,
        module: &mut IrModule,
        block: &mut Vec<OpId>,
        iter: ValueId,
        iter_ty: &Type,
        index: ValueId,
    ) -> Result<ValueId> {
        match iter_ty {
            Type::Str => {
                let addr = module.emit(
                    block,
                    OpKind::IndexString,
                    vec![iter, index],
                    ValueType::MemLoc(Type::Int),
                );
                let ch = module.emit(block, OpKind::Load, vec![addr], ValueType::Ty(Type::Int));
                Ok(module.emit(block, OpKind::ListExpr, vec![ch], ValueType::Ty(Type::Str)))
            }
            Type::List(elem) => {
                let elem = (**elem).clone();
                let addr = module.emit(
                    block,
                    OpKind::GetAddress,
                    vec![iter, index],
                    ValueType::MemLoc(elem.clone()),
                );
                Ok(module.emit(block, OpKind::Load, vec![addr], ValueType::Ty(elem)))
            }
            other => Err(Error::internal(format!("cannot iterate over {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, Expr, Literal, Program, Stmt, VarDef};
    use crate::compiler::ir::IrGenerator;

    fn for_program(iter: Expr, target_ty: Type) -> Program {
        let init = match target_ty {
            Type::Str => Literal::Str(String::new()),
            _ => Literal::Int(0),
        };
        Program {
            decls: vec![Decl::Var(VarDef::new("x", target_ty.clone(), init))],
            stmts: vec![Stmt::For {
                target: "x".to_string(),
                iter,
                body: vec![Stmt::print(Expr::name("x", target_ty))],
            }],
        }
    }

    fn kinds(module: &IrModule) -> Vec<&'static str> {
        module
            .walk()
            .into_iter()
            .map(|id| module.op(id).unwrap().kind.mnemonic())
            .collect()
    }

    #[test]
    fn test_for_over_list_becomes_while() {
        let list = Expr::list(
            vec![Expr::int(1), Expr::int(2), Expr::int(3)],
            Type::list(Type::Int),
        );
        let mut module = IrGenerator::new()
            .generate(&for_program(list, Type::Int))
            .unwrap();
        let n = ForToWhile::new().run(&mut module).unwrap();
        assert_eq!(n, 1);
        module.verify().unwrap();

        let kinds = kinds(&module);
        assert!(!kinds.contains(&"for"));
        assert!(kinds.contains(&"while"));
        assert!(kinds.contains(&"get_address"));
        // The list display is still built exactly once
        assert_eq!(kinds.iter().filter(|k| **k == "list_expr").count(), 1);
    }

    #[test]
    fn test_for_over_string_builds_characters() {
        let mut module = IrGenerator::new()
            .generate(&for_program(Expr::str("ab"), Type::Str))
            .unwrap();
        ForToWhile::new().run(&mut module).unwrap();
        module.verify().unwrap();
        let kinds = kinds(&module);
        assert!(kinds.contains(&"index_string"));
        assert!(kinds.contains(&"list_expr"));
    }

    #[test]
    fn test_nested_for_loops() {
        let inner = Stmt::For {
            target: "x".to_string(),
            iter: Expr::list(vec![Expr::int(1)], Type::list(Type::Int)),
            body: vec![Stmt::Pass],
        };
        let program = Program {
            decls: vec![Decl::Var(VarDef::new("x", Type::Int, Literal::Int(0)))],
            stmts: vec![Stmt::For {
                target: "x".to_string(),
                iter: Expr::list(vec![Expr::int(2)], Type::list(Type::Int)),
                body: vec![inner],
            }],
        };
        let mut module = IrGenerator::new().generate(&program).unwrap();
        assert_eq!(ForToWhile::new().run(&mut module).unwrap(), 2);
        module.verify().unwrap();
        assert_eq!(kinds(&module).iter().filter(|k| **k == "while").count(), 2);
    }

    #[test]
    fn test_idempotent() {
        let list = Expr::list(vec![Expr::int(1)], Type::list(Type::Int));
        let mut module = IrGenerator::new()
            .generate(&for_program(list, Type::Int))
            .unwrap();
        ForToWhile::new().run(&mut module).unwrap();
        let before = module.to_string();
        assert_eq!(ForToWhile::new().run(&mut module).unwrap(), 0);
        assert_eq!(module.to_string(), before);
    }
}
