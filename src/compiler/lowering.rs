//! ISA lowering - structured memory IR to flat target ops
//!
//! Every region is lowered innermost first: an op's nested regions are fully
//! flat before the op itself is rewritten, so structured constructs only need
//! to splice already-lowered bodies between branches and labels. Each rewrite
//! goes through [`IrModule::replace_op`], which redirects the users of the
//! old result to the new one.
//!
//! Heap objects (lists and strings) are a 4-byte length header followed by
//! one 4-byte word per element; element `i` lives at `base + 4 + 4 * i`.

use super::ir::{
    IrModule, LiteralValue, OpId, OpKind, RegionRef, TargetOp, ValueId, ValueType,
};
use super::runtime::symbols;
use crate::ast::{BinaryOp, UnaryOp};
use crate::error::{Error, Result};
use crate::types::Type;
use std::collections::HashMap;

/// Consolidated lowering pass
#[derive(Debug, Default)]
pub struct Lowering {
    /// Per-construct label counters
    counters: HashMap<String, usize>,
    lowered: usize,
}

impl Lowering {
    /// Create the pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Lower the whole module; returns the number of rewritten ops
    pub fn run(&mut self, module: &mut IrModule) -> Result<usize> {
        self.lower_region(module, RegionRef::Module)?;
        tracing::debug!(
            lowered = self.lowered,
            instructions = module.target_instruction_count(),
            "ISA lowering done"
        );
        Ok(self.lowered)
    }

    fn lower_region(&mut self, module: &mut IrModule, region: RegionRef) -> Result<()> {
        let worklist = module.region(region)?.ops.clone();
        for id in worklist {
            if !module.is_live(id) {
                continue;
            }
            let op = module.op(id)?;
            // Checked up front: lowering `pass` can legitimately empty a block
            if let Some(index) = op.regions().iter().position(|r| r.is_empty()) {
                return Err(Error::internal(format!(
                    "empty region {} in {}",
                    index,
                    op.kind.mnemonic()
                )));
            }
            let regions = op.regions().len();
            for index in 0..regions {
                self.lower_region(module, RegionRef::Op { op: id, index })?;
            }
            self.lower_op(module, id)?;
        }
        Ok(())
    }

    /// Fresh labels `.L<construct>_<role>_<n>` sharing one counter value
    fn labels<const N: usize>(&mut self, construct: &str, roles: [&str; N]) -> [String; N] {
        let counter = self.counters.entry(construct.to_string()).or_insert(0);
        let n = *counter;
        *counter += 1;
        roles.map(|role| format!(".L{}_{}_{}", construct, role, n))
    }

    fn lower_op(&mut self, module: &mut IrModule, id: OpId) -> Result<()> {
        let op = module.op(id)?;
        let kind = op.kind.clone();
        let operands = op.operands().to_vec();
        let had_result = op.result().is_some();

        let mut b = Vec::new();
        let value = match &kind {
            // Already flat, or consumed by the enclosing construct
            OpKind::Target(_) | OpKind::FuncDef { .. } | OpKind::Yield => return Ok(()),

            OpKind::Literal(lit) => Some(self.lower_literal(module, &mut b, lit)?),

            OpKind::UnaryExpr(op) => {
                let [x] = expect_operands(&kind, &operands)?;
                Some(match op {
                    UnaryOp::Neg => {
                        let zero = reg(module, &mut b, TargetOp::Li(0), vec![]);
                        reg(module, &mut b, TargetOp::Sub, vec![zero, x])
                    }
                    UnaryOp::Not => reg(module, &mut b, TargetOp::Seqz, vec![x]),
                })
            }

            OpKind::BinaryExpr(op) => {
                let [lhs, rhs] = expect_operands(&kind, &operands)?;
                Some(self.lower_binary(module, &mut b, *op, lhs, rhs)?)
            }

            OpKind::EffectfulBinaryExpr(op) => {
                Some(self.lower_short_circuit(module, &mut b, id, *op)?)
            }

            OpKind::IfExpr => {
                let [cond] = expect_operands(&kind, &operands)?;
                Some(self.lower_if_expr(module, &mut b, id, cond)?)
            }

            OpKind::If => {
                let [cond] = expect_operands(&kind, &operands)?;
                self.lower_if(module, &mut b, id, cond)?;
                None
            }

            OpKind::While => {
                self.lower_while(module, &mut b, id)?;
                None
            }

            OpKind::For => {
                return Err(Error::PassOrdering(
                    "for loop reached ISA lowering; run for-to-while first".to_string(),
                ))
            }

            OpKind::Return => {
                let [v] = expect_operands(&kind, &operands)?;
                void(module, &mut b, TargetOp::Return, vec![v]);
                None
            }

            OpKind::Pass => None,

            OpKind::Assign => {
                let (value, targets) = operands
                    .split_first()
                    .ok_or_else(|| Error::internal("assign without a value"))?;
                for &target in targets {
                    void(module, &mut b, TargetOp::Sw(0), vec![target, *value]);
                }
                None
            }

            OpKind::Alloc(_) => Some(reg(module, &mut b, TargetOp::Alloc, vec![])),

            OpKind::Load => {
                let [location] = expect_operands(&kind, &operands)?;
                Some(reg(module, &mut b, TargetOp::Lw(0), vec![location]))
            }

            OpKind::Store => {
                let [location, v] = expect_operands(&kind, &operands)?;
                void(module, &mut b, TargetOp::Sw(0), vec![location, v]);
                None
            }

            OpKind::CallExpr { func } => {
                self.lower_call(module, &mut b, func, &operands, had_result)?
            }

            OpKind::ListExpr => {
                let ptr = self.alloc_object(module, &mut b, operands.len())?;
                for (i, &elem) in operands.iter().enumerate() {
                    void(module, &mut b, TargetOp::Sw(element_offset(i)?), vec![ptr, elem]);
                }
                Some(ptr)
            }

            OpKind::IndexString | OpKind::GetAddress => {
                let [base, index] = expect_operands(&kind, &operands)?;
                Some(self.bounds_checked_address(module, &mut b, base, index))
            }

            OpKind::ClassDef { .. } | OpKind::MemberExpr { .. } => {
                return Err(Error::unimplemented(format!(
                    "{} (object model)",
                    kind.mnemonic()
                )))
            }
        };

        let results = match (had_result, value) {
            (true, Some(v)) => vec![v],
            (true, None) => {
                return Err(Error::internal(format!(
                    "lowering {} produced no value",
                    kind.mnemonic()
                )))
            }
            (false, _) => vec![],
        };
        tracing::trace!(op = %kind, emitted = b.len(), "lowered");
        module.replace_op(id, b, results)?;
        self.lowered += 1;
        Ok(())
    }

    // =========================================================================
    // VALUES
    // =========================================================================

    fn lower_literal(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        lit: &LiteralValue,
    ) -> Result<ValueId> {
        Ok(match lit {
            LiteralValue::Int(n) => reg(module, b, TargetOp::Li(*n), vec![]),
            LiteralValue::Bool(v) => reg(module, b, TargetOp::Li(i32::from(*v)), vec![]),
            LiteralValue::None => reg(module, b, TargetOp::Li(0), vec![]),
            LiteralValue::Str(s) => {
                let ptr = self.alloc_object(module, b, s.len())?;
                for (i, byte) in s.bytes().enumerate() {
                    let ch = reg(module, b, TargetOp::Li(i32::from(byte)), vec![]);
                    void(module, b, TargetOp::Sw(element_offset(i)?), vec![ptr, ch]);
                }
                ptr
            }
        })
    }

    fn lower_binary(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> Result<ValueId> {
        let operand_ty = module.value_type(lhs)?.source_type().cloned();
        if matches!(operand_ty, Some(Type::Str | Type::List(_) | Type::Empty))
            && matches!(op, BinaryOp::Add | BinaryOp::Eq | BinaryOp::NotEq)
        {
            return Err(Error::PassOrdering(format!(
                "'{}' on {} reached ISA lowering; run library-call introduction first",
                op,
                operand_ty.map(|t| t.to_string()).unwrap_or_default()
            )));
        }

        let simple = |module: &mut IrModule, b: &mut Vec<OpId>, t: TargetOp, x, y| {
            reg(module, b, t, vec![x, y])
        };

        Ok(match op {
            BinaryOp::Add => simple(module, b, TargetOp::Add, lhs, rhs),
            BinaryOp::Sub => simple(module, b, TargetOp::Sub, lhs, rhs),
            BinaryOp::Mul => simple(module, b, TargetOp::Mul, lhs, rhs),
            BinaryOp::FloorDiv | BinaryOp::Mod => {
                self.lower_floor_division(module, b, op, lhs, rhs)
            }
            BinaryOp::Lt => simple(module, b, TargetOp::Slt, lhs, rhs),
            BinaryOp::Gt => simple(module, b, TargetOp::Slt, rhs, lhs),
            BinaryOp::LtEq => {
                let gt = simple(module, b, TargetOp::Slt, rhs, lhs);
                reg(module, b, TargetOp::Seqz, vec![gt])
            }
            BinaryOp::GtEq => {
                let lt = simple(module, b, TargetOp::Slt, lhs, rhs);
                reg(module, b, TargetOp::Seqz, vec![lt])
            }
            BinaryOp::Eq | BinaryOp::Is => {
                let diff = simple(module, b, TargetOp::Sub, lhs, rhs);
                reg(module, b, TargetOp::Seqz, vec![diff])
            }
            BinaryOp::NotEq => {
                let diff = simple(module, b, TargetOp::Sub, lhs, rhs);
                reg(module, b, TargetOp::Snez, vec![diff])
            }
            BinaryOp::And | BinaryOp::Or => {
                return Err(Error::internal(format!(
                    "'{}' must be an effectful binary expression",
                    op
                )))
            }
        })
    }

    /// Floored `//` and `%` with a zero-divisor trap
    ///
    /// `div`/`rem` truncate; when the remainder is non-zero and its sign differs
    /// from the divisor's, the quotient is one too large and the remainder is
    /// short by one divisor.
    fn lower_floor_division(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        op: BinaryOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> ValueId {
        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(
            module,
            b,
            TargetOp::Beq(symbols::ERROR_DIV_ZERO.to_string()),
            vec![rhs, zero],
        );
        let quotient = reg(module, b, TargetOp::Div, vec![lhs, rhs]);
        let remainder = reg(module, b, TargetOp::Rem, vec![lhs, rhs]);
        let signs = reg(module, b, TargetOp::Xor, vec![remainder, rhs]);
        let differ = reg(module, b, TargetOp::Slt, vec![signs, zero]);
        let nonzero = reg(module, b, TargetOp::Snez, vec![remainder]);
        let adjust = reg(module, b, TargetOp::And, vec![differ, nonzero]);
        if op == BinaryOp::FloorDiv {
            reg(module, b, TargetOp::Sub, vec![quotient, adjust])
        } else {
            let correction = reg(module, b, TargetOp::Mul, vec![rhs, adjust]);
            reg(module, b, TargetOp::Add, vec![remainder, correction])
        }
    }

    fn lower_call(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        func: &str,
        args: &[ValueId],
        has_result: bool,
    ) -> Result<Option<ValueId>> {
        match func {
            "len" => {
                let [x] = expect_operands(&OpKind::CallExpr { func: func.to_string() }, args)?;
                let zero = reg(module, b, TargetOp::Li(0), vec![]);
                void(
                    module,
                    b,
                    TargetOp::Beq(symbols::ERROR_LEN_NONE.to_string()),
                    vec![x, zero],
                );
                Ok(Some(reg(module, b, TargetOp::Lw(0), vec![x])))
            }
            "print" | "input" => Err(Error::PassOrdering(format!(
                "built-in {} reached ISA lowering; run library-call introduction first",
                func
            ))),
            _ => {
                let call = OpKind::Target(TargetOp::Call {
                    func: func.to_string(),
                });
                if has_result {
                    Ok(Some(module.emit(b, call, args.to_vec(), ValueType::Reg)))
                } else {
                    module.emit_void(b, call, args.to_vec());
                    Ok(None)
                }
            }
        }
    }

    /// `_malloc(4 + 4n)` with the length header stored
    fn alloc_object(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        len: usize,
    ) -> Result<ValueId> {
        let size = element_offset(len)?;
        let length = i32::try_from(len).map_err(|_| Error::unimplemented("heap object too large"))?;
        let size = reg(module, b, TargetOp::Li(size), vec![]);
        let ptr = reg(
            module,
            b,
            TargetOp::Call {
                func: symbols::MALLOC.to_string(),
            },
            vec![size],
        );
        let length = reg(module, b, TargetOp::Li(length), vec![]);
        void(module, b, TargetOp::Sw(0), vec![ptr, length]);
        Ok(ptr)
    }

    /// Address of element `index`, trapping on a null base or an index
    /// outside `0..len`
    fn bounds_checked_address(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        base: ValueId,
        index: ValueId,
    ) -> ValueId {
        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(
            module,
            b,
            TargetOp::Beq(symbols::ERROR_INDEX_NONE.to_string()),
            vec![base, zero],
        );
        let len = reg(module, b, TargetOp::Lw(0), vec![base]);
        void(
            module,
            b,
            TargetOp::Blt(symbols::ERROR_INDEX_OOB.to_string()),
            vec![index, zero],
        );
        void(
            module,
            b,
            TargetOp::Bge(symbols::ERROR_INDEX_OOB.to_string()),
            vec![index, len],
        );
        let slot = reg(module, b, TargetOp::Addi(1), vec![index]);
        let four = reg(module, b, TargetOp::Li(4), vec![]);
        let offset = reg(module, b, TargetOp::Mul, vec![slot, four]);
        reg(module, b, TargetOp::Add, vec![base, offset])
    }

    // =========================================================================
    // CONTROL FLOW
    // =========================================================================

    fn take_block(&self, module: &mut IrModule, op: OpId, index: usize) -> Result<Vec<OpId>> {
        Ok(module.take_region(op, index)?.ops)
    }

    /// Value region `index` of `op` without its trailing `yield`, and the yielded value
    fn take_yielding(
        &self,
        module: &mut IrModule,
        op: OpId,
        index: usize,
    ) -> Result<(Vec<OpId>, ValueId)> {
        let mut ops = self.take_block(module, op, index)?;
        let yielded = match ops.last().map(|&last| module.op(last)).transpose()? {
            Some(op) if op.kind == OpKind::Yield && op.operands().len() == 1 => op.operands()[0],
            _ => {
                return Err(Error::internal(format!(
                    "region {} of {} does not end in yield",
                    index,
                    module.op(op)?.kind.mnemonic()
                )))
            }
        };
        if let Some(last) = ops.pop() {
            module.erase(last)?;
        }
        Ok((ops, yielded))
    }

    fn lower_short_circuit(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        id: OpId,
        op: BinaryOp,
    ) -> Result<ValueId> {
        let (lhs_ops, lhs) = self.take_yielding(module, id, 0)?;
        let (rhs_ops, rhs) = self.take_yielding(module, id, 1)?;
        let (construct, skip) = match op {
            // `False and _` is False, `True or _` is True
            BinaryOp::And => ("and", TargetOp::Beq as fn(String) -> TargetOp),
            BinaryOp::Or => ("or", TargetOp::Bne as fn(String) -> TargetOp),
            other => {
                return Err(Error::internal(format!(
                    "'{}' is not a short-circuit operator",
                    other
                )))
            }
        };
        let [rhs_label, after_label] = self.labels(construct, ["rhs", "after"]);

        let slot = reg(module, b, TargetOp::Alloc, vec![]);
        b.extend(lhs_ops);
        void(module, b, TargetOp::Sw(0), vec![slot, lhs]);
        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(module, b, skip(after_label.clone()), vec![lhs, zero]);
        void(module, b, TargetOp::Label(rhs_label), vec![]);
        b.extend(rhs_ops);
        void(module, b, TargetOp::Sw(0), vec![slot, rhs]);
        void(module, b, TargetOp::Label(after_label), vec![]);
        Ok(reg(module, b, TargetOp::Lw(0), vec![slot]))
    }

    fn lower_if_expr(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        id: OpId,
        cond: ValueId,
    ) -> Result<ValueId> {
        let (then_ops, then_value) = self.take_yielding(module, id, 0)?;
        let (else_ops, else_value) = self.take_yielding(module, id, 1)?;
        let [then_label, else_label, after_label] =
            self.labels("ifexpr", ["then", "else", "after"]);

        let slot = reg(module, b, TargetOp::Alloc, vec![]);
        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(module, b, TargetOp::Beq(else_label.clone()), vec![cond, zero]);
        void(module, b, TargetOp::Label(then_label), vec![]);
        b.extend(then_ops);
        void(module, b, TargetOp::Sw(0), vec![slot, then_value]);
        void(module, b, TargetOp::J(after_label.clone()), vec![]);
        void(module, b, TargetOp::Label(else_label), vec![]);
        b.extend(else_ops);
        void(module, b, TargetOp::Sw(0), vec![slot, else_value]);
        void(module, b, TargetOp::Label(after_label), vec![]);
        Ok(reg(module, b, TargetOp::Lw(0), vec![slot]))
    }

    fn lower_if(
        &mut self,
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        id: OpId,
        cond: ValueId,
    ) -> Result<()> {
        let then_ops = self.take_block(module, id, 0)?;
        let else_ops = self.take_block(module, id, 1)?;
        let [then_label, else_label, after_label] = self.labels("if", ["then", "else", "after"]);

        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(module, b, TargetOp::Beq(else_label.clone()), vec![cond, zero]);
        void(module, b, TargetOp::Label(then_label), vec![]);
        b.extend(then_ops);
        void(module, b, TargetOp::J(after_label.clone()), vec![]);
        void(module, b, TargetOp::Label(else_label), vec![]);
        b.extend(else_ops);
        void(module, b, TargetOp::Label(after_label), vec![]);
        Ok(())
    }

    fn lower_while(&mut self, module: &mut IrModule, b: &mut Vec<OpId>, id: OpId) -> Result<()> {
        let (cond_ops, cond) = self.take_yielding(module, id, 0)?;
        let body_ops = self.take_block(module, id, 1)?;
        let [cond_label, body_label, after_label] = self.labels("while", ["cond", "body", "after"]);

        void(module, b, TargetOp::Label(cond_label.clone()), vec![]);
        b.extend(cond_ops);
        let zero = reg(module, b, TargetOp::Li(0), vec![]);
        void(module, b, TargetOp::Beq(after_label.clone()), vec![cond, zero]);
        void(module, b, TargetOp::Label(body_label), vec![]);
        b.extend(body_ops);
        void(module, b, TargetOp::J(cond_label), vec![]);
        void(module, b, TargetOp::Label(after_label), vec![]);
        Ok(())
    }
}

fn reg(module: &mut IrModule, b: &mut Vec<OpId>, op: TargetOp, operands: Vec<ValueId>) -> ValueId {
    module.emit(b, OpKind::Target(op), operands, ValueType::Reg)
}

fn void(module: &mut IrModule, b: &mut Vec<OpId>, op: TargetOp, operands: Vec<ValueId>) {
    module.emit_void(b, OpKind::Target(op), operands);
}

/// Byte offset of element `index` from the object base
fn element_offset(index: usize) -> Result<i32> {
    index
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| Error::unimplemented("heap object too large"))
}

fn expect_operands<const N: usize>(kind: &OpKind, operands: &[ValueId]) -> Result<[ValueId; N]> {
    <[ValueId; N]>::try_from(operands).map_err(|_| {
        Error::internal(format!(
            "{} expects {} operand(s), found {}",
            kind.mnemonic(),
            N,
            operands.len()
        ))
    })
}
