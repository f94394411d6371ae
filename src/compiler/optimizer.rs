//! # IR Optimizer
//!
//! Two deliberately narrow passes over the memory IR:
//! - Constant folding of `int + int` literal pairs (wrapping at 32 bits)
//! - Backward dead-code elimination of unused pure literal/unary/binary ops
//!
//! Nothing that can trap (`//`, `%`), touch memory, call, or carry regions is
//! ever removed.

use super::ir::{IrModule, LiteralValue, OpId, OpKind, RegionRef, ValueType};
use crate::ast::BinaryOp;
use crate::error::Result;
use crate::types::Type;

/// Optimizer with configurable optimization level
pub struct Optimizer {
    level: u8,
    folded: usize,
    eliminated: usize,
}

impl Optimizer {
    /// Create a new optimizer; level 0 disables every pass
    pub fn new(level: u8) -> Self {
        Self {
            level,
            folded: 0,
            eliminated: 0,
        }
    }

    /// Run all enabled passes
    pub fn optimize(&mut self, module: &mut IrModule) -> Result<()> {
        if self.level >= 1 {
            self.constant_folding(module)?;
            self.dead_code_elimination(module)?;
        }
        tracing::debug!(
            level = self.level,
            folded = self.folded,
            eliminated = self.eliminated,
            "optimization done"
        );
        Ok(())
    }

    /// Number of additions folded so far
    pub fn folded(&self) -> usize {
        self.folded
    }

    /// Number of ops removed so far
    pub fn eliminated(&self) -> usize {
        self.eliminated
    }

    /// Constant folding - `literal int + literal int` becomes one literal
    pub fn constant_folding(&mut self, module: &mut IrModule) -> Result<()> {
        // Pre-order walk visits inner additions first, so chains fold fully
        for id in module.walk() {
            if !module.is_live(id) {
                continue;
            }
            let Some(sum) = self.fold_candidate(module, id)? else {
                continue;
            };
            let literal = module.create_op(
                OpKind::Literal(LiteralValue::Int(sum)),
                vec![],
                Some(ValueType::Ty(Type::Int)),
                vec![],
            );
            let value = module.op(literal)?.result();
            module.replace_op(id, vec![literal], value.into_iter().collect())?;
            self.folded += 1;
            tracing::trace!(sum, "folded constant addition");
        }
        Ok(())
    }

    fn fold_candidate(&self, module: &IrModule, id: OpId) -> Result<Option<i32>> {
        let op = module.op(id)?;
        if op.kind != OpKind::BinaryExpr(BinaryOp::Add) {
            return Ok(None);
        }
        let int_literal = |value| match module.defining_op(value).map(|def| &def.kind) {
            Some(OpKind::Literal(LiteralValue::Int(n))) => Some(*n),
            _ => None,
        };
        match op.operands() {
            [lhs, rhs] => Ok(int_literal(*lhs)
                .zip(int_literal(*rhs))
                .map(|(a, b)| a.wrapping_add(b))),
            _ => Ok(None),
        }
    }

    /// Dead code elimination - scans every region end-to-start so that removing
    /// a user can expose its operands in the same sweep
    pub fn dead_code_elimination(&mut self, module: &mut IrModule) -> Result<()> {
        self.dce_region(module, RegionRef::Module)
    }

    fn dce_region(&mut self, module: &mut IrModule, region: RegionRef) -> Result<()> {
        let ops = module.region(region)?.ops.clone();
        for &id in ops.iter().rev() {
            if !module.is_live(id) {
                continue;
            }
            let regions = module.op(id)?.regions().len();
            for index in 0..regions {
                self.dce_region(module, RegionRef::Op { op: id, index })?;
            }

            let op = module.op(id)?;
            let unused = op.result().is_some_and(|v| !module.has_users(v));
            if unused && is_pure(&op.kind) {
                tracing::trace!(op = %op.kind, "eliminated dead op");
                module.erase(id)?;
                self.eliminated += 1;
            }
        }
        Ok(())
    }
}

/// Ops that may be dropped when their result is unused
fn is_pure(kind: &OpKind) -> bool {
    match kind {
        OpKind::Literal(_) | OpKind::UnaryExpr(_) => true,
        OpKind::BinaryExpr(op) => !op.can_trap(),
        _ => false,
    }
}
