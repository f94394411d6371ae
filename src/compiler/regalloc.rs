//! Stack-slot register allocation
//!
//! Every virtual register gets its own word in the function's frame. Each
//! flat target op is rewritten to load its operands into fixed scratch
//! registers, compute into `t0`, and store the result back to its slot:
//!
//! | Role | Register |
//! |------|----------|
//! | first operand | `t1` |
//! | second operand | `t2` |
//! | result | `t0` |
//! | large offsets | `t3` |
//! | `_main` frame | `tp` |
//!
//! Frame layout, from `sp` upward:
//!
//! ```text
//! +------------------+ <- sp
//! | value slot 0     |  block arguments first, then op results
//! | ...              |
//! | alloc storage 0  |  one word per `alloc`
//! | ...              |
//! | saved ra         |  topmost word
//! +------------------+ <- sp + frame size
//! ```

use super::ir::{IrModule, OpId, OpKind, TargetOp, ValueId, ENTRY_FUNCTION};
use super::riscv::{AsmProgram, Instruction, Opcode, Reg};
use super::runtime::{self, symbols};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Largest offset a 12-bit signed immediate can hold
const MAX_IMMEDIATE: i32 = 2047;

/// Frame of one function
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    slots: HashMap<ValueId, i32>,
    allocs: HashMap<OpId, i32>,
    size: i32,
}

impl StackFrame {
    /// Lay out the frame of a flat function
    pub fn layout(module: &IrModule, func: OpId) -> Result<Self> {
        let op = module.op(func)?;
        let body = op
            .regions()
            .first()
            .ok_or_else(|| Error::internal("function without a body"))?;

        let mut values: Vec<ValueId> = body.args.clone();
        let mut allocs = Vec::new();
        for &id in &body.ops {
            let op = module.op(id)?;
            if let Some(result) = op.result() {
                values.push(result);
            }
            if op.kind == OpKind::Target(TargetOp::Alloc) {
                allocs.push(id);
            }
        }

        let mut frame = StackFrame::default();
        for (i, value) in values.iter().enumerate() {
            frame.slots.insert(*value, word_offset(i)?);
        }
        for (i, id) in allocs.iter().enumerate() {
            frame.allocs.insert(*id, word_offset(values.len() + i)?);
        }
        // One more word for ra
        frame.size = word_offset(values.len() + allocs.len() + 1)?;
        Ok(frame)
    }

    /// Frame size in bytes
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Offset of the saved return address
    pub fn ra_offset(&self) -> i32 {
        self.size - 4
    }

    /// Slot offset of `value`, if it lives in this frame
    pub fn slot(&self, value: ValueId) -> Option<i32> {
        self.slots.get(&value).copied()
    }

    /// Storage offset of an `alloc` op
    pub fn alloc_offset(&self, id: OpId) -> Option<i32> {
        self.allocs.get(&id).copied()
    }
}

fn word_offset(index: usize) -> Result<i32> {
    index
        .checked_mul(4)
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| Error::unimplemented("stack frame larger than 2 GiB"))
}

/// Stack-based register allocator and program assembler
#[derive(Debug, Default)]
pub struct RegisterAllocator {
    heap_size: u32,
    main: Option<OpId>,
    /// Frame of `_main`, reachable from every function through `tp`
    global: StackFrame,
}

impl RegisterAllocator {
    /// Create an allocator producing programs with a heap of `heap_size` bytes
    pub fn new(heap_size: u32) -> Self {
        Self {
            heap_size,
            main: None,
            global: StackFrame::default(),
        }
    }

    /// Assemble the whole program: entry, `_main`, user functions, runtime
    pub fn allocate(&mut self, module: &IrModule) -> Result<AsmProgram> {
        let functions = module.functions();
        let main = functions
            .iter()
            .copied()
            .find(|&f| function_name(module, f).ok() == Some(ENTRY_FUNCTION))
            .ok_or_else(|| Error::internal("module has no _main function"))?;
        self.main = Some(main);
        self.global = StackFrame::layout(module, main)?;

        let mut program = AsmProgram::new(self.heap_size);
        program.text.extend(runtime::entry(ENTRY_FUNCTION));

        let order = std::iter::once(main).chain(functions.iter().copied().filter(|&f| f != main));
        for func in order {
            let name = function_name(module, func)?;
            if is_reserved(name) {
                return Err(Error::DuplicateDefinition {
                    name: name.to_string(),
                });
            }
            let code = self.function(module, func)?;
            tracing::debug!(function = name, instructions = code.len(), "allocated");
            program.text.extend(code);
        }

        runtime::append_library(&mut program);
        tracing::debug!(
            instructions = program.instruction_count(),
            global_frame = self.global.size(),
            "register allocation done"
        );
        Ok(program)
    }

    fn function(&self, module: &IrModule, func: OpId) -> Result<Vec<Instruction>> {
        let op = module.op(func)?;
        let name = function_name(module, func)?;
        let body = op
            .regions()
            .first()
            .ok_or_else(|| Error::internal("function without a body"))?;
        if body.args.len() > Reg::ARGS.len() {
            return Err(Error::unimplemented(format!(
                "function {} with {} parameters (at most {})",
                name,
                body.args.len(),
                Reg::ARGS.len()
            )));
        }

        let frame = if Some(func) == self.main {
            self.global.clone()
        } else {
            StackFrame::layout(module, func)?
        };
        let mut emitter = FunctionEmitter {
            module,
            func,
            name,
            frame: &frame,
            global: &self.global,
            is_main: name == ENTRY_FUNCTION,
            out: Vec::new(),
        };

        emitter.prologue(&body.args)?;
        for &id in &body.ops {
            emitter.op(id)?;
        }
        emitter.epilogue();
        Ok(emitter.out)
    }
}

fn function_name(module: &IrModule, func: OpId) -> Result<&str> {
    match &module.op(func)?.kind {
        OpKind::FuncDef { name, .. } => Ok(name),
        other => Err(Error::internal(format!(
            "{} at module level",
            other.mnemonic()
        ))),
    }
}

/// Labels the entry code and runtime library define
fn is_reserved(name: &str) -> bool {
    name != ENTRY_FUNCTION
        && (name == symbols::START
            || name == symbols::MALLOC
            || name == symbols::PRINT_INT
            || name == symbols::PRINT_BOOL
            || name == symbols::PRINT_STR
            || name == symbols::INPUT
            || name == symbols::LIST_CONCAT
            || name == symbols::STR_EQ
            || name == symbols::ERROR_EXIT
            || runtime::ERROR_ROUTINES.iter().any(|(label, _)| *label == name))
}

/// Label of a function's single epilogue
pub fn return_label(function: &str) -> String {
    format!("_{}_return", function)
}

struct FunctionEmitter<'a> {
    module: &'a IrModule,
    func: OpId,
    name: &'a str,
    frame: &'a StackFrame,
    global: &'a StackFrame,
    is_main: bool,
    out: Vec<Instruction>,
}

impl FunctionEmitter<'_> {
    fn prologue(&mut self, args: &[ValueId]) -> Result<()> {
        self.out.push(Instruction::label(self.name));
        self.adjust_sp(-self.frame.size());
        self.store(Reg::Ra, Reg::Sp, self.frame.ra_offset());
        for (&arg, &reg) in args.iter().zip(Reg::ARGS.iter()) {
            let offset = self.local_slot(arg)?;
            self.store(reg, Reg::Sp, offset);
        }
        if self.is_main {
            self.out
                .push(Instruction::mv(Reg::Tp, Reg::Sp).with_comment("global frame"));
        }
        Ok(())
    }

    fn epilogue(&mut self) {
        self.out.push(Instruction::label(&return_label(self.name)));
        self.load(Reg::Ra, Reg::Sp, self.frame.ra_offset());
        self.adjust_sp(self.frame.size());
        self.out.push(Instruction::ret());
    }

    fn op(&mut self, id: OpId) -> Result<()> {
        let module = self.module;
        let op = module.op(id)?;
        let target = match &op.kind {
            OpKind::Target(target) => target,
            other => {
                return Err(Error::PassOrdering(format!(
                    "{} reached register allocation; run ISA lowering first",
                    other.mnemonic()
                )))
            }
        };
        let operands = op.operands();
        let result = op.result();
        let start = self.out.len();

        match target {
            TargetOp::Label(name) => self.out.push(Instruction::label(name)),
            TargetOp::J(label) => self.out.push(Instruction::j(label)),
            TargetOp::Li(n) => {
                self.out.push(Instruction::li(Reg::T0, *n));
                self.store_result(result)?;
            }
            TargetOp::Lw(offset) => {
                let [base] = self.operands(operands)?;
                self.load_value(Reg::T1, base)?;
                self.out.push(Instruction::lw(Reg::T0, *offset, Reg::T1));
                self.store_result(result)?;
            }
            TargetOp::Sw(offset) => {
                let [base, value] = self.operands(operands)?;
                self.load_value(Reg::T1, base)?;
                self.load_value(Reg::T2, value)?;
                self.out.push(Instruction::sw(Reg::T2, *offset, Reg::T1));
            }
            TargetOp::Add
            | TargetOp::Sub
            | TargetOp::Mul
            | TargetOp::Div
            | TargetOp::Rem
            | TargetOp::Slt
            | TargetOp::And
            | TargetOp::Or
            | TargetOp::Xor => {
                let [lhs, rhs] = self.operands(operands)?;
                self.load_value(Reg::T1, lhs)?;
                self.load_value(Reg::T2, rhs)?;
                self.out
                    .push(Instruction::rtype(alu_opcode(target)?, Reg::T0, Reg::T1, Reg::T2));
                self.store_result(result)?;
            }
            TargetOp::Addi(n) => {
                let [x] = self.operands(operands)?;
                self.load_value(Reg::T1, x)?;
                self.out.push(Instruction::addi(Reg::T0, Reg::T1, *n));
                self.store_result(result)?;
            }
            TargetOp::Seqz | TargetOp::Snez => {
                let [x] = self.operands(operands)?;
                self.load_value(Reg::T1, x)?;
                let opcode = if *target == TargetOp::Seqz {
                    Opcode::Seqz
                } else {
                    Opcode::Snez
                };
                self.out.push(Instruction::unary(opcode, Reg::T0, Reg::T1));
                self.store_result(result)?;
            }
            TargetOp::Beq(label)
            | TargetOp::Bne(label)
            | TargetOp::Blt(label)
            | TargetOp::Bge(label) => {
                let [lhs, rhs] = self.operands(operands)?;
                self.load_value(Reg::T1, lhs)?;
                self.load_value(Reg::T2, rhs)?;
                let opcode = match target {
                    TargetOp::Beq(_) => Opcode::Beq,
                    TargetOp::Bne(_) => Opcode::Bne,
                    TargetOp::Blt(_) => Opcode::Blt,
                    _ => Opcode::Bge,
                };
                self.out
                    .push(Instruction::branch(opcode, Reg::T1, Reg::T2, label));
            }
            TargetOp::Call { func } => {
                if operands.len() > Reg::ARGS.len() {
                    return Err(Error::unimplemented(format!(
                        "call to {} with {} arguments (at most {})",
                        func,
                        operands.len(),
                        Reg::ARGS.len()
                    )));
                }
                for (&arg, &reg) in operands.iter().zip(Reg::ARGS.iter()) {
                    self.load_value(reg, arg)?;
                }
                self.out.push(Instruction::jal(func));
                if result.is_some() {
                    self.store_value(Reg::A0, result)?;
                }
            }
            TargetOp::Return => {
                let [value] = self.operands(operands)?;
                self.load_value(Reg::A0, value)?;
                self.out.push(Instruction::j(&return_label(self.name)));
            }
            TargetOp::Alloc => {
                let offset = self
                    .frame
                    .alloc_offset(id)
                    .ok_or_else(|| Error::internal("alloc without frame storage"))?;
                self.address(Reg::T0, Reg::Sp, offset);
                self.store_result(result)?;
            }
        }

        if !matches!(target, TargetOp::Label(_)) {
            if let Some(first) = self.out.get_mut(start) {
                first.comment = Some(module.op_to_string(id));
            }
        }
        Ok(())
    }

    fn operands<const N: usize>(&self, operands: &[ValueId]) -> Result<[ValueId; N]> {
        <[ValueId; N]>::try_from(operands).map_err(|_| {
            Error::internal(format!(
                "target op in {} expects {} operand(s), found {}",
                self.name,
                N,
                operands.len()
            ))
        })
    }

    fn local_slot(&self, value: ValueId) -> Result<i32> {
        self.frame
            .slot(value)
            .ok_or_else(|| Error::internal(format!("{} has no slot in {}", value, self.name)))
    }

    /// Base register and offset of `value`'s slot
    fn locate(&self, value: ValueId) -> Result<(Reg, i32)> {
        if let Some(offset) = self.frame.slot(value) {
            return Ok((Reg::Sp, offset));
        }
        let owner = self.module.function_of_value(value);
        if owner != Some(self.func) {
            if let Some(offset) = self.global.slot(value) {
                return Ok((Reg::Tp, offset));
            }
        }
        Err(Error::unimplemented(format!(
            "{} in {} refers to a value of an enclosing function",
            value, self.name
        )))
    }

    fn load_value(&mut self, reg: Reg, value: ValueId) -> Result<()> {
        let (base, offset) = self.locate(value)?;
        self.load(reg, base, offset);
        Ok(())
    }

    fn store_value(&mut self, reg: Reg, value: Option<ValueId>) -> Result<()> {
        let value = value.ok_or_else(|| Error::internal("target op result missing"))?;
        let (base, offset) = self.locate(value)?;
        self.store(reg, base, offset);
        Ok(())
    }

    fn store_result(&mut self, result: Option<ValueId>) -> Result<()> {
        self.store_value(Reg::T0, result)
    }

    fn load(&mut self, reg: Reg, base: Reg, offset: i32) {
        if offset <= MAX_IMMEDIATE {
            self.out.push(Instruction::lw(reg, offset, base));
        } else {
            self.address(Reg::T3, base, offset);
            self.out.push(Instruction::lw(reg, 0, Reg::T3));
        }
    }

    fn store(&mut self, reg: Reg, base: Reg, offset: i32) {
        if offset <= MAX_IMMEDIATE {
            self.out.push(Instruction::sw(reg, offset, base));
        } else {
            self.address(Reg::T3, base, offset);
            self.out.push(Instruction::sw(reg, 0, Reg::T3));
        }
    }

    /// `rd = base + offset`
    fn address(&mut self, rd: Reg, base: Reg, offset: i32) {
        if (-MAX_IMMEDIATE - 1..=MAX_IMMEDIATE).contains(&offset) {
            self.out.push(Instruction::addi(rd, base, offset));
        } else {
            self.out.push(Instruction::li(Reg::T3, offset));
            self.out
                .push(Instruction::rtype(Opcode::Add, rd, base, Reg::T3));
        }
    }

    fn adjust_sp(&mut self, delta: i32) {
        self.address(Reg::Sp, Reg::Sp, delta);
    }
}

fn alu_opcode(op: &TargetOp) -> Result<Opcode> {
    Ok(match op {
        TargetOp::Add => Opcode::Add,
        TargetOp::Sub => Opcode::Sub,
        TargetOp::Mul => Opcode::Mul,
        TargetOp::Div => Opcode::Div,
        TargetOp::Rem => Opcode::Rem,
        TargetOp::Slt => Opcode::Slt,
        TargetOp::And => Opcode::And,
        TargetOp::Or => Opcode::Or,
        TargetOp::Xor => Opcode::Xor,
        other => {
            return Err(Error::internal(format!(
                "{} is not a register-register op",
                other.mnemonic()
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{Region, ValueType};
    use crate::compiler::riscv::DEFAULT_HEAP_SIZE;
    use crate::types::Type;

    fn target(
        module: &mut IrModule,
        b: &mut Vec<OpId>,
        op: TargetOp,
        operands: Vec<ValueId>,
    ) -> ValueId {
        module.emit(b, OpKind::Target(op), operands, ValueType::Reg)
    }

    fn function(
        module: &mut IrModule,
        name: &str,
        params: usize,
        build: impl FnOnce(&mut IrModule, &[ValueId], &mut Vec<OpId>),
    ) -> OpId {
        let mut region = Region::new();
        let args: Vec<ValueId> = (0..params)
            .map(|_| module.add_region_arg(&mut region, ValueType::Ty(Type::Int)))
            .collect();
        let mut body = Vec::new();
        build(module, &args, &mut body);
        region.ops = body;
        let f = module.create_op(
            OpKind::FuncDef {
                name: name.into(),
                return_type: Type::Int,
            },
            vec![],
            None,
            vec![region],
        );
        module.push_function(f).unwrap();
        f
    }

    fn ret_zero(module: &mut IrModule, b: &mut Vec<OpId>) {
        let zero = target(module, b, TargetOp::Li(0), vec![]);
        module.emit_void(b, OpKind::Target(TargetOp::Return), vec![zero]);
    }

    #[test]
    fn test_frame_layout() {
        let mut module = IrModule::new();
        let f = function(&mut module, "_main", 0, |m, _, b| {
            target(m, b, TargetOp::Alloc, vec![]);
            ret_zero(m, b);
        });
        let alloc = module
            .walk()
            .into_iter()
            .find(|&id| module.op(id).unwrap().kind == OpKind::Target(TargetOp::Alloc))
            .unwrap();
        let frame = StackFrame::layout(&module, f).unwrap();
        // alloc result + li result, one alloc word, ra
        assert_eq!(frame.size(), 16);
        assert_eq!(frame.ra_offset(), 12);
        assert_eq!(frame.alloc_offset(alloc), Some(8));
        assert_eq!(frame.alloc_offset(f), None);
    }

    #[test]
    fn test_program_order_and_comments() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| ret_zero(m, b));
        function(&mut module, "f", 1, |m, args, b| {
            module_return(m, b, args[0]);
        });
        let program = RegisterAllocator::new(DEFAULT_HEAP_SIZE)
            .allocate(&module)
            .unwrap();
        let labels: Vec<&str> = program.text.iter().filter_map(|i| i.label_name()).collect();
        let pos = |l: &str| labels.iter().position(|x| *x == l).unwrap();
        assert!(pos("_start") < pos("_main"));
        assert!(pos("_main") < pos("f"));
        assert!(pos("f") < pos("_malloc"));
        assert!(program.has_label("_f_return"));

        let text = program.to_string();
        assert!(text.contains("mv tp, sp"));
        assert!(text.contains("# %"));
        assert!(text.contains("sw a0, 0(sp)"));
    }

    fn module_return(m: &mut IrModule, b: &mut Vec<OpId>, value: ValueId) {
        m.emit_void(b, OpKind::Target(TargetOp::Return), vec![value]);
    }

    #[test]
    fn test_global_values_through_tp() {
        let mut module = IrModule::new();
        let mut global = None;
        function(&mut module, "_main", 0, |m, _, b| {
            global = Some(target(m, b, TargetOp::Alloc, vec![]));
            ret_zero(m, b);
        });
        let global = global.unwrap();
        function(&mut module, "g", 0, |m, _, b| {
            let v = target(m, b, TargetOp::Lw(0), vec![global]);
            module_return(m, b, v);
        });
        let text = RegisterAllocator::new(DEFAULT_HEAP_SIZE)
            .allocate(&module)
            .unwrap()
            .to_string();
        assert!(text.contains("lw t1, 0(tp)"));
    }

    #[test]
    fn test_too_many_arguments() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| {
            let args: Vec<ValueId> =
                (0..9).map(|i| target(m, b, TargetOp::Li(i), vec![])).collect();
            m.emit_void(b, OpKind::Target(TargetOp::Call { func: "h".into() }), args);
            ret_zero(m, b);
        });
        let err = RegisterAllocator::new(DEFAULT_HEAP_SIZE)
            .allocate(&module)
            .unwrap_err();
        assert!(matches!(err, Error::Unimplemented { .. }));
    }

    #[test]
    fn test_too_many_parameters() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| ret_zero(m, b));
        function(&mut module, "wide", 9, |m, _, b| ret_zero(m, b));
        assert!(matches!(
            RegisterAllocator::new(DEFAULT_HEAP_SIZE).allocate(&module),
            Err(Error::Unimplemented { .. })
        ));
    }

    #[test]
    fn test_large_frame_uses_scratch_register() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| {
            for i in 0..600 {
                target(m, b, TargetOp::Li(i), vec![]);
            }
            ret_zero(m, b);
        });
        let text = RegisterAllocator::new(DEFAULT_HEAP_SIZE)
            .allocate(&module)
            .unwrap()
            .to_string();
        assert!(text.contains("li t3, -2408"));
        assert!(text.contains("sw t0, 0(t3)"));
    }

    #[test]
    fn test_unlowered_op_is_pass_ordering_error() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| {
            m.emit_void(b, OpKind::Pass, vec![]);
        });
        assert!(matches!(
            RegisterAllocator::new(DEFAULT_HEAP_SIZE).allocate(&module),
            Err(Error::PassOrdering(_))
        ));
    }

    #[test]
    fn test_runtime_name_clash() {
        let mut module = IrModule::new();
        function(&mut module, "_main", 0, |m, _, b| ret_zero(m, b));
        function(&mut module, "_malloc", 0, |m, _, b| ret_zero(m, b));
        assert!(matches!(
            RegisterAllocator::new(DEFAULT_HEAP_SIZE).allocate(&module),
            Err(Error::DuplicateDefinition { .. })
        ));
    }
}
