//! IR module: a generational arena of operations plus a value table
//!
//! Operations refer to values by [`ValueId`] and nested regions hold
//! [`OpId`]s. A reverse multimap from each value to the operations that use
//! it makes "replace all uses" a bookkeeping update instead of a graph walk.

use super::instruction::OpKind;
use super::types::ValueType;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Generational handle to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OpId {
    index: u32,
    generation: u32,
}

/// Handle to an SSA value (op result or region argument)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValueId(u32);

impl ValueId {
    /// Dense index, stable for the lifetime of the module
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Where a region lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionRef {
    /// The module's top-level function list
    Module,
    /// Region `index` of operation `op`
    Op {
        /// Owning operation
        op: OpId,
        /// Region index within the owner
        index: usize,
    },
}

/// Definition site of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Result of an operation
    Op(OpId),
    /// Region argument; `owner` is set once the region is attached to an op
    Arg {
        /// Operation owning the region
        owner: Option<OpId>,
        /// Argument position
        index: usize,
    },
}

#[derive(Debug, Clone)]
struct ValueData {
    ty: ValueType,
    def: ValueDef,
}

/// Ordered list of operations, with optional block arguments
#[derive(Debug, Clone, Default)]
pub struct Region {
    /// Block arguments (function parameters)
    pub args: Vec<ValueId>,
    /// Operations in program order
    pub ops: Vec<OpId>,
}

impl Region {
    /// Empty region
    pub fn new() -> Self {
        Self::default()
    }

    /// Region without arguments holding `ops`
    pub fn with_ops(ops: Vec<OpId>) -> Self {
        Self {
            args: Vec::new(),
            ops,
        }
    }

    /// Check if the region has no operations
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// One IR operation
#[derive(Debug, Clone)]
pub struct Operation {
    /// What the operation computes
    pub kind: OpKind,
    operands: Vec<ValueId>,
    result: Option<ValueId>,
    regions: Vec<Region>,
    parent: Option<RegionRef>,
}

impl Operation {
    /// Operand values in order
    pub fn operands(&self) -> &[ValueId] {
        &self.operands
    }

    /// Result value, if any
    pub fn result(&self) -> Option<ValueId> {
        self.result
    }

    /// Nested regions
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Containing region (None while detached)
    pub fn parent(&self) -> Option<RegionRef> {
        self.parent
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    op: Option<Operation>,
}

/// Whole-program IR
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    slots: Vec<Slot>,
    free: Vec<u32>,
    values: Vec<ValueData>,
    users: HashMap<ValueId, Vec<OpId>>,
    body: Region,
}

impl IrModule {
    /// Create an empty module
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    fn new_value(&mut self, ty: ValueType, def: ValueDef) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData { ty, def });
        id
    }

    /// Append a block argument of type `ty` to `region`
    pub fn add_region_arg(&mut self, region: &mut Region, ty: ValueType) -> ValueId {
        let index = region.args.len();
        let value = self.new_value(ty, ValueDef::Arg { owner: None, index });
        region.args.push(value);
        value
    }

    /// Create a detached operation
    ///
    /// Operations already listed in `regions` become children of the new op.
    pub fn create_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result: Option<ValueType>,
        regions: Vec<Region>,
    ) -> OpId {
        let id = self.reserve_slot();
        let result = result.map(|ty| self.new_value(ty, ValueDef::Op(id)));
        self.fill_slot(id, kind, operands, result, regions);
        id
    }

    /// Create an op with a result and append it to `block`
    pub fn emit(
        &mut self,
        block: &mut Vec<OpId>,
        kind: OpKind,
        operands: Vec<ValueId>,
        ty: ValueType,
    ) -> ValueId {
        let id = self.reserve_slot();
        let result = self.new_value(ty, ValueDef::Op(id));
        self.fill_slot(id, kind, operands, Some(result), Vec::new());
        block.push(id);
        result
    }

    /// Create an op without a result and append it to `block`
    pub fn emit_void(
        &mut self,
        block: &mut Vec<OpId>,
        kind: OpKind,
        operands: Vec<ValueId>,
    ) -> OpId {
        let id = self.create_op(kind, operands, None, Vec::new());
        block.push(id);
        id
    }

    /// Id for a new op, reusing an erased slot when one is free
    fn reserve_slot(&mut self) -> OpId {
        match self.free.pop() {
            Some(index) => OpId {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    op: None,
                });
                OpId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn fill_slot(
        &mut self,
        id: OpId,
        kind: OpKind,
        operands: Vec<ValueId>,
        result: Option<ValueId>,
        regions: Vec<Region>,
    ) {
        for &operand in &operands {
            self.users.entry(operand).or_default().push(id);
        }

        for (index, region) in regions.iter().enumerate() {
            for &child in &region.ops {
                if let Some(op) = self.slot_mut(child) {
                    op.parent = Some(RegionRef::Op { op: id, index });
                }
            }
            for &arg in &region.args {
                if let ValueDef::Arg { owner, .. } = &mut self.values[arg.index()].def {
                    *owner = Some(id);
                }
            }
        }

        self.slots[id.index as usize].op = Some(Operation {
            kind,
            operands,
            result,
            regions,
            parent: None,
        });
    }

    /// Append a top-level operation (a function) to the module
    pub fn push_function(&mut self, op: OpId) -> Result<()> {
        self.op_mut(op)?.parent = Some(RegionRef::Module);
        self.body.ops.push(op);
        Ok(())
    }

    // =========================================================================
    // Access
    // =========================================================================

    fn slot_mut(&mut self, id: OpId) -> Option<&mut Operation> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.op.as_mut())
    }

    /// Operation behind `id`, or None if it was erased
    pub fn get(&self, id: OpId) -> Option<&Operation> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.op.as_ref())
    }

    /// Operation behind `id`; a stale handle is an internal error
    pub fn op(&self, id: OpId) -> Result<&Operation> {
        self.get(id)
            .ok_or_else(|| Error::internal(format!("stale operation handle {:?}", id)))
    }

    /// Mutable access to an operation's fields other than operands and regions
    pub fn op_mut(&mut self, id: OpId) -> Result<&mut Operation> {
        self.slot_mut(id)
            .ok_or_else(|| Error::internal(format!("stale operation handle {:?}", id)))
    }

    /// Check if `id` refers to a live operation
    pub fn is_live(&self, id: OpId) -> bool {
        self.get(id).is_some()
    }

    /// Top-level region (the function list)
    pub fn body(&self) -> &Region {
        &self.body
    }

    /// Top-level function ops in order
    pub fn functions(&self) -> Vec<OpId> {
        self.body.ops.clone()
    }

    /// Region addressed by `r`
    pub fn region(&self, r: RegionRef) -> Result<&Region> {
        match r {
            RegionRef::Module => Ok(&self.body),
            RegionRef::Op { op, index } => self
                .op(op)?
                .regions
                .get(index)
                .ok_or_else(|| Error::internal(format!("operation has no region {}", index))),
        }
    }

    fn region_mut(&mut self, r: RegionRef) -> Result<&mut Region> {
        match r {
            RegionRef::Module => Ok(&mut self.body),
            RegionRef::Op { op, index } => self
                .op_mut(op)?
                .regions
                .get_mut(index)
                .ok_or_else(|| Error::internal(format!("operation has no region {}", index))),
        }
    }

    /// Type of a value
    pub fn value_type(&self, value: ValueId) -> Result<&ValueType> {
        self.values
            .get(value.index())
            .map(|data| &data.ty)
            .ok_or_else(|| Error::internal(format!("unknown value {}", value)))
    }

    /// Definition site of a value
    pub fn value_def(&self, value: ValueId) -> Result<ValueDef> {
        self.values
            .get(value.index())
            .map(|data| data.def)
            .ok_or_else(|| Error::internal(format!("unknown value {}", value)))
    }

    /// Operation defining `value`, if it is an op result
    pub fn defining_op(&self, value: ValueId) -> Option<&Operation> {
        match self.values.get(value.index())?.def {
            ValueDef::Op(id) => self.get(id),
            ValueDef::Arg { .. } => None,
        }
    }

    /// Operations using `value` (one entry per operand occurrence)
    pub fn users(&self, value: ValueId) -> &[OpId] {
        self.users.get(&value).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check if any operation uses `value`
    pub fn has_users(&self, value: ValueId) -> bool {
        !self.users(value).is_empty()
    }

    /// Number of live operations
    pub fn op_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.op.is_some()).count()
    }

    /// Top-level function enclosing `id` (the op itself if it is top-level)
    pub fn enclosing_function(&self, id: OpId) -> Option<OpId> {
        let mut current = id;
        loop {
            match self.get(current)?.parent? {
                RegionRef::Module => return Some(current),
                RegionRef::Op { op, .. } => current = op,
            }
        }
    }

    /// Function a value belongs to
    pub fn function_of_value(&self, value: ValueId) -> Option<OpId> {
        match self.value_def(value).ok()? {
            ValueDef::Op(id) => self.enclosing_function(id),
            ValueDef::Arg { owner, .. } => self.enclosing_function(owner?),
        }
    }

    /// All live attached ops in pre-order (parents before their region contents)
    pub fn walk(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        self.walk_into(&self.body, &mut out);
        out
    }

    fn walk_into(&self, region: &Region, out: &mut Vec<OpId>) {
        for &id in &region.ops {
            if let Some(op) = self.get(id) {
                out.push(id);
                for nested in &op.regions {
                    self.walk_into(nested, out);
                }
            }
        }
    }

    // =========================================================================
    // Rewriting
    // =========================================================================

    /// Rewrite every use of `old` to use `new` instead
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users = self.users.remove(&old).unwrap_or_default();
        for &user in &users {
            if let Some(op) = self.slot_mut(user) {
                for operand in op.operands.iter_mut().filter(|v| **v == old) {
                    *operand = new;
                }
            }
        }
        // Users list holds one entry per occurrence, so moving it keeps counts exact
        self.users.entry(new).or_default().extend(users);
    }

    /// Replace `old` in its region with `new_ops`, redirecting users of its
    /// result to `new_results`, then erase it
    pub fn replace_op(
        &mut self,
        old: OpId,
        new_ops: Vec<OpId>,
        new_results: Vec<ValueId>,
    ) -> Result<()> {
        let (result, parent) = {
            let op = self.op(old)?;
            (op.result, op.parent)
        };
        let expected = usize::from(result.is_some());
        if new_results.len() != expected {
            return Err(Error::internal(format!(
                "replacement for {} yields {} results, expected {}",
                self.op(old)?.kind.mnemonic(),
                new_results.len(),
                expected
            )));
        }
        let parent = parent.ok_or_else(|| Error::internal("cannot replace a detached operation"))?;

        let region = self.region_mut(parent)?;
        let pos = region
            .ops
            .iter()
            .position(|&id| id == old)
            .ok_or_else(|| Error::internal("operation missing from its parent region"))?;
        region.ops.splice(pos..=pos, new_ops.iter().copied());
        for &id in &new_ops {
            self.op_mut(id)?.parent = Some(parent);
        }
        self.op_mut(old)?.parent = None;

        if let (Some(result), Some(&new)) = (result, new_results.first()) {
            self.replace_all_uses(result, new);
        }
        self.erase(old)
    }

    /// Move region `index` out of `op`, leaving an empty region behind
    ///
    /// The moved ops become detached until they are spliced elsewhere.
    pub fn take_region(&mut self, op: OpId, index: usize) -> Result<Region> {
        let region = std::mem::take(self.region_mut(RegionRef::Op { op, index })?);
        for &child in &region.ops {
            self.op_mut(child)?.parent = None;
        }
        Ok(region)
    }

    /// Remove an operation (and anything still nested in it)
    ///
    /// Fails if its result is still in use.
    pub fn erase(&mut self, id: OpId) -> Result<()> {
        let op = self.op(id)?;
        if let Some(result) = op.result {
            if self.has_users(result) {
                return Err(Error::internal(format!(
                    "erasing {} whose result {} still has {} user(s)",
                    op.kind.mnemonic(),
                    result,
                    self.users(result).len()
                )));
            }
        }

        if let Some(parent) = op.parent {
            self.region_mut(parent)?.ops.retain(|&other| other != id);
        }

        let nested: Vec<OpId> = self
            .op(id)?
            .regions
            .iter()
            .flat_map(|r| r.ops.iter().rev().copied())
            .collect();
        for child in nested {
            if self.is_live(child) {
                self.op_mut(child)?.parent = None;
                self.erase(child)?;
            }
        }

        let slot = &mut self.slots[id.index as usize];
        let op = slot
            .op
            .take()
            .ok_or_else(|| Error::internal("operation vanished during erase"))?;
        slot.generation += 1;
        self.free.push(id.index);

        for operand in op.operands {
            if let Some(list) = self.users.get_mut(&operand) {
                if let Some(pos) = list.iter().position(|&u| u == id) {
                    list.swap_remove(pos);
                }
                if list.is_empty() {
                    self.users.remove(&operand);
                }
            }
        }
        if let Some(result) = op.result {
            self.users.remove(&result);
        }
        Ok(())
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Structural check of the whole module
    ///
    /// - operands refer to values defined earlier (no forward references)
    /// - the users map agrees with the operand lists
    /// - `yield` only appears as the last op of a nested region
    /// - region arguments are only used inside the op that owns them
    pub fn verify(&self) -> Result<()> {
        let mut visible = HashSet::new();
        self.verify_region(RegionRef::Module, &self.body, &mut visible)?;
        self.verify_users()
    }

    fn invalid(message: String) -> Error {
        Error::InvalidIr {
            context: "verify".to_string(),
            message,
        }
    }

    fn verify_region(
        &self,
        at: RegionRef,
        region: &Region,
        visible: &mut HashSet<ValueId>,
    ) -> Result<()> {
        let mut introduced: Vec<ValueId> = region.args.clone();
        visible.extend(region.args.iter().copied());

        for (pos, &id) in region.ops.iter().enumerate() {
            let op = self
                .get(id)
                .ok_or_else(|| Self::invalid(format!("region lists erased op {:?}", id)))?;
            if op.parent != Some(at) {
                return Err(Self::invalid(format!(
                    "{} has a stale parent link",
                    op.kind.mnemonic()
                )));
            }

            for &operand in &op.operands {
                self.verify_operand(id, operand, visible)?;
            }

            if matches!(op.kind, OpKind::Yield) {
                if at == RegionRef::Module {
                    return Err(Self::invalid("yield at module level".to_string()));
                }
                if pos + 1 != region.ops.len() {
                    return Err(Self::invalid("yield is not the last op of its region".to_string()));
                }
            }

            for (index, nested) in op.regions.iter().enumerate() {
                self.verify_region(RegionRef::Op { op: id, index }, nested, visible)?;
            }

            if let Some(result) = op.result {
                visible.insert(result);
                introduced.push(result);
            }
        }

        for value in introduced {
            visible.remove(&value);
        }
        Ok(())
    }

    fn verify_operand(
        &self,
        user: OpId,
        operand: ValueId,
        visible: &HashSet<ValueId>,
    ) -> Result<()> {
        if visible.contains(&operand) {
            return Ok(());
        }
        match self.value_def(operand)? {
            ValueDef::Op(def) => {
                if !self.is_live(def) {
                    return Err(Self::invalid(format!("{} is defined by an erased op", operand)));
                }
                if self.enclosing_function(def) == self.enclosing_function(user) {
                    return Err(Self::invalid(format!("{} used before its definition", operand)));
                }
                Ok(())
            }
            ValueDef::Arg { owner, .. } => {
                let owner = owner.ok_or_else(|| {
                    Self::invalid(format!("{} belongs to a detached region", operand))
                })?;
                Err(Self::invalid(format!(
                    "argument {} used outside {}",
                    operand,
                    self.op(owner)?.kind.mnemonic()
                )))
            }
        }
    }

    fn verify_users(&self) -> Result<()> {
        let mut expected: HashMap<ValueId, Vec<OpId>> = HashMap::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(op) = &slot.op {
                let id = OpId {
                    index: index as u32,
                    generation: slot.generation,
                };
                for &operand in &op.operands {
                    expected.entry(operand).or_default().push(id);
                }
            }
        }
        for list in expected.values_mut() {
            list.sort();
        }

        let mut actual: HashMap<ValueId, Vec<OpId>> = HashMap::new();
        for (&value, list) in &self.users {
            if !list.is_empty() {
                let mut list = list.clone();
                list.sort();
                actual.insert(value, list);
            }
        }

        if expected != actual {
            return Err(Self::invalid("users map disagrees with operand lists".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::compiler::ir::instruction::LiteralValue;
    use crate::types::Type;

    fn int() -> ValueType {
        ValueType::Ty(Type::Int)
    }

    /// `func_def @f { %a = 1; %b = 2; %c = %a + %b; return %c }`
    fn sample() -> (IrModule, OpId, [ValueId; 3]) {
        let mut m = IrModule::new();
        let mut body = Vec::new();
        let a = m.emit(&mut body, OpKind::Literal(LiteralValue::Int(1)), vec![], int());
        let b = m.emit(&mut body, OpKind::Literal(LiteralValue::Int(2)), vec![], int());
        let c = m.emit(&mut body, OpKind::BinaryExpr(BinaryOp::Add), vec![a, b], int());
        m.emit_void(&mut body, OpKind::Return, vec![c]);
        let func = m.create_op(
            OpKind::FuncDef {
                name: "f".into(),
                return_type: Type::Int,
            },
            vec![],
            None,
            vec![Region::with_ops(body)],
        );
        m.push_function(func).unwrap();
        (m, func, [a, b, c])
    }

    #[test]
    fn test_build_and_verify() {
        let (m, func, [a, _, c]) = sample();
        m.verify().unwrap();
        assert_eq!(m.op_count(), 5);
        assert_eq!(m.users(a).len(), 1);
        assert_eq!(m.users(c).len(), 1);
        assert_eq!(m.function_of_value(a), Some(func));
    }

    #[test]
    fn test_replace_op_redirects_users() {
        let (mut m, _, [a, b, c]) = sample();
        let ValueDef::Op(add) = m.value_def(c).unwrap() else {
            panic!("expected op result");
        };
        assert!(m.defining_op(c).is_some());

        let folded = m.create_op(
            OpKind::Literal(LiteralValue::Int(3)),
            vec![],
            Some(int()),
            vec![],
        );
        let folded_value = m.op(folded).unwrap().result().unwrap();
        m.replace_op(add, vec![folded], vec![folded_value]).unwrap();

        assert!(!m.is_live(add));
        assert!(!m.has_users(a));
        assert!(!m.has_users(b));
        assert_eq!(m.users(folded_value).len(), 1);
        m.verify().unwrap();
    }

    #[test]
    fn test_replace_op_result_count_mismatch() {
        let (mut m, _, [_, _, c]) = sample();
        let ValueDef::Op(add) = m.value_def(c).unwrap() else {
            panic!("expected op result");
        };
        let err = m.replace_op(add, vec![], vec![]).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_erase_with_users_fails() {
        let (mut m, _, [a, _, _]) = sample();
        let ValueDef::Op(lit) = m.value_def(a).unwrap() else {
            panic!("expected op result");
        };
        assert!(m.erase(lit).is_err());
    }

    #[test]
    fn test_stale_handle_after_erase() {
        let mut m = IrModule::new();
        let mut block = Vec::new();
        let v = m.emit(&mut block, OpKind::Literal(LiteralValue::Int(1)), vec![], int());
        let ValueDef::Op(id) = m.value_def(v).unwrap() else {
            panic!("expected op result");
        };
        m.erase(id).unwrap();
        assert!(m.op(id).is_err());

        // The slot is reused under a new generation
        let reused = m.create_op(OpKind::Pass, vec![], None, vec![]);
        assert_ne!(reused, id);
        assert!(m.is_live(reused));
        assert!(!m.is_live(id));
    }

    #[test]
    fn test_emit_result_belongs_to_its_op_in_a_reused_slot() {
        let mut m = IrModule::new();
        let mut block = Vec::new();
        let first = m.emit(&mut block, OpKind::Literal(LiteralValue::Int(1)), vec![], int());
        let ValueDef::Op(first_op) = m.value_def(first).unwrap() else {
            panic!("expected op result");
        };
        m.erase(first_op).unwrap();

        // A region argument created in between must not be mistaken for the result
        let mut region = Region::default();
        let arg = m.add_region_arg(&mut region, int());

        let second = m.emit(&mut block, OpKind::Literal(LiteralValue::Int(2)), vec![], int());
        let ValueDef::Op(second_op) = m.value_def(second).unwrap() else {
            panic!("expected op result");
        };
        assert_eq!(second_op.index, first_op.index);
        assert_ne!(second, arg);
        assert_eq!(m.op(second_op).unwrap().result(), Some(second));
        assert_eq!(
            m.defining_op(second).map(|op| op.kind.clone()),
            Some(OpKind::Literal(LiteralValue::Int(2)))
        );
    }

    #[test]
    fn test_verify_rejects_forward_reference() {
        let mut m = IrModule::new();
        let mut body = Vec::new();
        let a = m.emit(&mut body, OpKind::Literal(LiteralValue::Int(1)), vec![], int());
        let b = m.emit(&mut body, OpKind::Literal(LiteralValue::Int(2)), vec![], int());
        m.emit(&mut body, OpKind::BinaryExpr(BinaryOp::Add), vec![a, b], int());
        body.swap(0, 2);
        let func = m.create_op(
            OpKind::FuncDef {
                name: "f".into(),
                return_type: Type::None,
            },
            vec![],
            None,
            vec![Region::with_ops(body)],
        );
        m.push_function(func).unwrap();
        assert!(matches!(m.verify(), Err(Error::InvalidIr { .. })));
    }

    #[test]
    fn test_verify_rejects_misplaced_yield() {
        let mut m = IrModule::new();
        let mut inner = Vec::new();
        let one = m.emit(
            &mut inner,
            OpKind::Literal(LiteralValue::Bool(true)),
            vec![],
            ValueType::Ty(Type::Bool),
        );
        m.emit_void(&mut inner, OpKind::Yield, vec![one]);
        m.emit_void(&mut inner, OpKind::Pass, vec![]);
        let mut body = Vec::new();
        let w = m.create_op(
            OpKind::While,
            vec![],
            None,
            vec![Region::with_ops(inner), Region::new()],
        );
        body.push(w);
        let func = m.create_op(
            OpKind::FuncDef {
                name: "f".into(),
                return_type: Type::None,
            },
            vec![],
            None,
            vec![Region::with_ops(body)],
        );
        m.push_function(func).unwrap();
        assert!(m.verify().is_err());
    }

    #[test]
    fn test_verify_rejects_argument_escape() {
        let mut m = IrModule::new();
        let mut region = Region::new();
        let param = m.add_region_arg(&mut region, int());
        region.ops.push(m.create_op(OpKind::Pass, vec![], None, vec![]));
        let f = m.create_op(
            OpKind::FuncDef {
                name: "f".into(),
                return_type: Type::None,
            },
            vec![],
            None,
            vec![region],
        );
        m.push_function(f).unwrap();

        let mut body = Vec::new();
        m.emit_void(&mut body, OpKind::Return, vec![param]);
        let g = m.create_op(
            OpKind::FuncDef {
                name: "g".into(),
                return_type: Type::Int,
            },
            vec![],
            None,
            vec![Region::with_ops(body)],
        );
        m.push_function(g).unwrap();
        assert!(m.verify().is_err());
    }

    #[test]
    fn test_take_region_detaches_children() {
        let mut m = IrModule::new();
        let mut then_ops = Vec::new();
        let pass = m.emit_void(&mut then_ops, OpKind::Pass, vec![]);
        let mut body = Vec::new();
        let c = m.emit(
            &mut body,
            OpKind::Literal(LiteralValue::Bool(true)),
            vec![],
            ValueType::Ty(Type::Bool),
        );
        let if_op = m.create_op(
            OpKind::If,
            vec![c],
            None,
            vec![Region::with_ops(then_ops), Region::new()],
        );
        body.push(if_op);
        assert_eq!(
            m.op(pass).unwrap().parent(),
            Some(RegionRef::Op { op: if_op, index: 0 })
        );
        let taken = m.take_region(if_op, 0).unwrap();
        assert_eq!(taken.ops, vec![pass]);
        assert_eq!(m.op(pass).unwrap().parent(), None);
        assert!(m.region(RegionRef::Op { op: if_op, index: 0 }).unwrap().is_empty());
    }
}
