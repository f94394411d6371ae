//! RISC-V (RV32IM) target model
//!
//! Physical registers, the instruction record produced by the register
//! allocator and the runtime library, and the final [`AsmProgram`] with its
//! assembly printer.

use serde::Serialize;
use std::fmt;

/// Default heap size in bytes
pub const DEFAULT_HEAP_SIZE: u32 = 102_400;

/// Label of the heap storage
pub const HEAP_LABEL: &str = "_heap";

/// Label of the bump-pointer cell
pub const HEAP_PTR_LABEL: &str = "_heap_ptr";

/// Physical registers, by ABI name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Reg {
    /// Hard-wired zero
    Zero = 0,
    /// Return address
    Ra = 1,
    /// Stack pointer
    Sp = 2,
    /// Global pointer (unused)
    Gp = 3,
    /// Thread pointer; holds `_main`'s frame base (global variables)
    Tp = 4,
    /// Scratch: instruction result
    T0 = 5,
    /// Scratch: first operand
    T1 = 6,
    /// Scratch: second operand
    T2 = 7,
    /// Saved
    S0 = 8,
    /// Saved
    S1 = 9,
    /// Argument 0 / return value
    A0 = 10,
    /// Argument 1
    A1 = 11,
    /// Argument 2
    A2 = 12,
    /// Argument 3
    A3 = 13,
    /// Argument 4
    A4 = 14,
    /// Argument 5
    A5 = 15,
    /// Argument 6
    A6 = 16,
    /// Argument 7 / syscall number
    A7 = 17,
    /// Saved
    S2 = 18,
    /// Saved
    S3 = 19,
    /// Saved
    S4 = 20,
    /// Saved
    S5 = 21,
    /// Saved
    S6 = 22,
    /// Saved
    S7 = 23,
    /// Saved
    S8 = 24,
    /// Saved
    S9 = 25,
    /// Saved
    S10 = 26,
    /// Saved
    S11 = 27,
    /// Scratch: large frame offsets
    T3 = 28,
    /// Temporary
    T4 = 29,
    /// Temporary
    T5 = 30,
    /// Temporary
    T6 = 31,
}

impl Reg {
    /// Argument registers in call order
    pub const ARGS: [Reg; 8] = [
        Reg::A0,
        Reg::A1,
        Reg::A2,
        Reg::A3,
        Reg::A4,
        Reg::A5,
        Reg::A6,
        Reg::A7,
    ];

    /// Architectural register number
    pub fn index(self) -> usize {
        self as usize
    }

    /// ABI name
    pub fn name(self) -> &'static str {
        match self {
            Reg::Zero => "zero",
            Reg::Ra => "ra",
            Reg::Sp => "sp",
            Reg::Gp => "gp",
            Reg::Tp => "tp",
            Reg::T0 => "t0",
            Reg::T1 => "t1",
            Reg::T2 => "t2",
            Reg::S0 => "s0",
            Reg::S1 => "s1",
            Reg::A0 => "a0",
            Reg::A1 => "a1",
            Reg::A2 => "a2",
            Reg::A3 => "a3",
            Reg::A4 => "a4",
            Reg::A5 => "a5",
            Reg::A6 => "a6",
            Reg::A7 => "a7",
            Reg::S2 => "s2",
            Reg::S3 => "s3",
            Reg::S4 => "s4",
            Reg::S5 => "s5",
            Reg::S6 => "s6",
            Reg::S7 => "s7",
            Reg::S8 => "s8",
            Reg::S9 => "s9",
            Reg::S10 => "s10",
            Reg::S11 => "s11",
            Reg::T3 => "t3",
            Reg::T4 => "t4",
            Reg::T5 => "t5",
            Reg::T6 => "t6",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Opcodes (base instructions plus the usual assembler pseudo-instructions)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    /// `li rd, imm`
    Li,
    /// `la rd, label`
    La,
    /// `lw rd, imm(rs1)`
    Lw,
    /// `sw rs2, imm(rs1)`
    Sw,
    /// `lbu rd, imm(rs1)`
    Lbu,
    /// `sb rs2, imm(rs1)`
    Sb,
    /// `add rd, rs1, rs2`
    Add,
    /// `addi rd, rs1, imm`
    Addi,
    /// `sub rd, rs1, rs2`
    Sub,
    /// `mul rd, rs1, rs2`
    Mul,
    /// `div rd, rs1, rs2`
    Div,
    /// `rem rd, rs1, rs2`
    Rem,
    /// `slt rd, rs1, rs2`
    Slt,
    /// `and rd, rs1, rs2`
    And,
    /// `andi rd, rs1, imm`
    Andi,
    /// `or rd, rs1, rs2`
    Or,
    /// `xor rd, rs1, rs2`
    Xor,
    /// `slli rd, rs1, imm`
    Slli,
    /// `seqz rd, rs1`
    Seqz,
    /// `snez rd, rs1`
    Snez,
    /// `mv rd, rs1`
    Mv,
    /// `beq rs1, rs2, label`
    Beq,
    /// `bne rs1, rs2, label`
    Bne,
    /// `blt rs1, rs2, label`
    Blt,
    /// `bge rs1, rs2, label`
    Bge,
    /// `j label`
    J,
    /// `jal label` (link in `ra`)
    Jal,
    /// `ret`
    Ret,
    /// `ecall`
    Ecall,
    /// `label:`
    Label,
}

impl Opcode {
    /// Assembly mnemonic
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Li => "li",
            Opcode::La => "la",
            Opcode::Lw => "lw",
            Opcode::Sw => "sw",
            Opcode::Lbu => "lbu",
            Opcode::Sb => "sb",
            Opcode::Add => "add",
            Opcode::Addi => "addi",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Rem => "rem",
            Opcode::Slt => "slt",
            Opcode::And => "and",
            Opcode::Andi => "andi",
            Opcode::Or => "or",
            Opcode::Xor => "xor",
            Opcode::Slli => "slli",
            Opcode::Seqz => "seqz",
            Opcode::Snez => "snez",
            Opcode::Mv => "mv",
            Opcode::Beq => "beq",
            Opcode::Bne => "bne",
            Opcode::Blt => "blt",
            Opcode::Bge => "bge",
            Opcode::J => "j",
            Opcode::Jal => "jal",
            Opcode::Ret => "ret",
            Opcode::Ecall => "ecall",
            Opcode::Label => "label",
        }
    }
}

/// Immediate operand: a number or a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Immediate {
    /// Numeric immediate or memory offset
    Int(i32),
    /// Branch/jump target or data symbol
    Label(String),
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int(n) => write!(f, "{}", n),
            Immediate::Label(label) => f.write_str(label),
        }
    }
}

/// One assembly instruction (or label)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instruction {
    /// Operation
    pub opcode: Opcode,
    /// Destination register
    pub rd: Option<Reg>,
    /// First source register (base register for memory ops)
    pub rs1: Option<Reg>,
    /// Second source register (stored value for stores)
    pub rs2: Option<Reg>,
    /// Immediate, offset or label
    pub imm: Option<Immediate>,
    /// Trailing `# ...` comment
    pub comment: Option<String>,
}

impl Instruction {
    fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            rd: None,
            rs1: None,
            rs2: None,
            imm: None,
            comment: None,
        }
    }

    /// `li rd, imm`
    pub fn li(rd: Reg, imm: i32) -> Self {
        Self {
            rd: Some(rd),
            imm: Some(Immediate::Int(imm)),
            ..Self::new(Opcode::Li)
        }
    }

    /// `la rd, symbol`
    pub fn la(rd: Reg, symbol: &str) -> Self {
        Self {
            rd: Some(rd),
            imm: Some(Immediate::Label(symbol.to_string())),
            ..Self::new(Opcode::La)
        }
    }

    /// `lw rd, offset(base)`
    pub fn lw(rd: Reg, offset: i32, base: Reg) -> Self {
        Self::load(Opcode::Lw, rd, offset, base)
    }

    /// `lbu rd, offset(base)`
    pub fn lbu(rd: Reg, offset: i32, base: Reg) -> Self {
        Self::load(Opcode::Lbu, rd, offset, base)
    }

    fn load(opcode: Opcode, rd: Reg, offset: i32, base: Reg) -> Self {
        Self {
            rd: Some(rd),
            rs1: Some(base),
            imm: Some(Immediate::Int(offset)),
            ..Self::new(opcode)
        }
    }

    /// `sw src, offset(base)`
    pub fn sw(src: Reg, offset: i32, base: Reg) -> Self {
        Self::store(Opcode::Sw, src, offset, base)
    }

    /// `sb src, offset(base)`
    pub fn sb(src: Reg, offset: i32, base: Reg) -> Self {
        Self::store(Opcode::Sb, src, offset, base)
    }

    fn store(opcode: Opcode, src: Reg, offset: i32, base: Reg) -> Self {
        Self {
            rs1: Some(base),
            rs2: Some(src),
            imm: Some(Immediate::Int(offset)),
            ..Self::new(opcode)
        }
    }

    /// Register-register ALU op
    pub fn rtype(opcode: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> Self {
        Self {
            rd: Some(rd),
            rs1: Some(rs1),
            rs2: Some(rs2),
            ..Self::new(opcode)
        }
    }

    /// Register-immediate ALU op
    pub fn itype(opcode: Opcode, rd: Reg, rs1: Reg, imm: i32) -> Self {
        Self {
            rd: Some(rd),
            rs1: Some(rs1),
            imm: Some(Immediate::Int(imm)),
            ..Self::new(opcode)
        }
    }

    /// `addi rd, rs1, imm`
    pub fn addi(rd: Reg, rs1: Reg, imm: i32) -> Self {
        Self::itype(Opcode::Addi, rd, rs1, imm)
    }

    /// Single-source op (`seqz`, `snez`, `mv`)
    pub fn unary(opcode: Opcode, rd: Reg, rs1: Reg) -> Self {
        Self {
            rd: Some(rd),
            rs1: Some(rs1),
            ..Self::new(opcode)
        }
    }

    /// `mv rd, rs1`
    pub fn mv(rd: Reg, rs1: Reg) -> Self {
        Self::unary(Opcode::Mv, rd, rs1)
    }

    /// Conditional branch
    pub fn branch(opcode: Opcode, rs1: Reg, rs2: Reg, target: &str) -> Self {
        Self {
            rs1: Some(rs1),
            rs2: Some(rs2),
            imm: Some(Immediate::Label(target.to_string())),
            ..Self::new(opcode)
        }
    }

    /// `j target`
    pub fn j(target: &str) -> Self {
        Self {
            imm: Some(Immediate::Label(target.to_string())),
            ..Self::new(Opcode::J)
        }
    }

    /// `jal target`
    pub fn jal(target: &str) -> Self {
        Self {
            rd: Some(Reg::Ra),
            imm: Some(Immediate::Label(target.to_string())),
            ..Self::new(Opcode::Jal)
        }
    }

    /// `ret`
    pub fn ret() -> Self {
        Self::new(Opcode::Ret)
    }

    /// `ecall`
    pub fn ecall() -> Self {
        Self::new(Opcode::Ecall)
    }

    /// `name:`
    pub fn label(name: &str) -> Self {
        Self {
            imm: Some(Immediate::Label(name.to_string())),
            ..Self::new(Opcode::Label)
        }
    }

    /// Attach a trailing comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Label name if this is a label
    pub fn label_name(&self) -> Option<&str> {
        match (&self.opcode, &self.imm) {
            (Opcode::Label, Some(Immediate::Label(name))) => Some(name),
            _ => None,
        }
    }

    /// Symbol referenced by a branch, jump, call or `la`
    pub fn target(&self) -> Option<&str> {
        match (&self.opcode, &self.imm) {
            (Opcode::Label, _) => None,
            (_, Some(Immediate::Label(name))) => Some(name),
            _ => None,
        }
    }

    /// Immediate as an integer (0 when absent)
    pub fn imm_int(&self) -> i32 {
        match self.imm {
            Some(Immediate::Int(n)) => n,
            _ => 0,
        }
    }

    fn reg(reg: Option<Reg>) -> &'static str {
        reg.map(Reg::name).unwrap_or("?")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode.mnemonic();
        let rd = Self::reg(self.rd);
        let rs1 = Self::reg(self.rs1);
        let rs2 = Self::reg(self.rs2);
        let imm = self.imm.as_ref().map(ToString::to_string).unwrap_or_default();

        let text = match self.opcode {
            Opcode::Label => format!("{}:", imm),
            Opcode::Li | Opcode::La => format!("    {} {}, {}", op, rd, imm),
            Opcode::Lw | Opcode::Lbu => format!("    {} {}, {}({})", op, rd, imm, rs1),
            Opcode::Sw | Opcode::Sb => format!("    {} {}, {}({})", op, rs2, imm, rs1),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::Slt
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => format!("    {} {}, {}, {}", op, rd, rs1, rs2),
            Opcode::Addi | Opcode::Andi | Opcode::Slli => {
                format!("    {} {}, {}, {}", op, rd, rs1, imm)
            }
            Opcode::Seqz | Opcode::Snez | Opcode::Mv => format!("    {} {}, {}", op, rd, rs1),
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bge => {
                format!("    {} {}, {}, {}", op, rs1, rs2, imm)
            }
            Opcode::J | Opcode::Jal => format!("    {} {}", op, imm),
            Opcode::Ret | Opcode::Ecall => format!("    {}", op),
        };

        match &self.comment {
            Some(comment) => write!(f, "{:<32} # {}", text, comment),
            None => f.write_str(&text),
        }
    }
}

/// Entry in the `.data` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DataKind {
    /// `.space n`
    Space(u32),
    /// `.word n`
    Word(i32),
    /// `.ascii "..."`
    Ascii(String),
}

/// Labelled `.data` item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataItem {
    /// Symbol
    pub label: String,
    /// Contents
    pub kind: DataKind,
}

impl DataItem {
    /// Size in bytes
    pub fn size(&self) -> u32 {
        match &self.kind {
            DataKind::Space(n) => *n,
            DataKind::Word(_) => 4,
            DataKind::Ascii(s) => s.len() as u32,
        }
    }
}

/// Final program: data section plus instruction stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AsmProgram {
    /// Data items in layout order
    pub data: Vec<DataItem>,
    /// Instructions and labels in order
    pub text: Vec<Instruction>,
    /// Heap size in bytes
    pub heap_size: u32,
}

impl AsmProgram {
    /// Program with the heap and heap-pointer cells and an empty text section
    pub fn new(heap_size: u32) -> Self {
        Self {
            data: vec![
                DataItem {
                    label: HEAP_LABEL.to_string(),
                    kind: DataKind::Space(heap_size),
                },
                DataItem {
                    label: HEAP_PTR_LABEL.to_string(),
                    kind: DataKind::Word(0),
                },
            ],
            text: Vec::new(),
            heap_size,
        }
    }

    /// Number of real instructions (labels excluded)
    pub fn instruction_count(&self) -> usize {
        self.text
            .iter()
            .filter(|inst| inst.opcode != Opcode::Label)
            .count()
    }

    /// Check if a label is defined in the text section
    pub fn has_label(&self, name: &str) -> bool {
        self.text.iter().any(|inst| inst.label_name() == Some(name))
    }

    /// Instruction stream as JSON
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for AsmProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, ".data")?;
        for item in &self.data {
            match &item.kind {
                DataKind::Space(n) => writeln!(f, "{}: .space {}", item.label, n)?,
                DataKind::Word(n) => writeln!(f, "{}: .word {}", item.label, n)?,
                DataKind::Ascii(s) => writeln!(f, "{}: .ascii {:?}", item.label, s)?,
            }
        }
        writeln!(f)?;
        writeln!(f, ".text")?;
        writeln!(f, ".globl _start")?;
        for inst in &self.text {
            writeln!(f, "{}", inst)?;
        }
        Ok(())
    }
}
