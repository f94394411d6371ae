//! RV32IM emulator for assembled programs
//!
//! Runs an [`AsmProgram`] directly from its instruction list: the program
//! counter is an index into `text`, and `jal` stores the index of the next
//! instruction in `ra`. Memory is a flat little-endian byte array:
//!
//! ```text
//! 0x0000 .. 0x1000   unmapped (null dereferences fault)
//! 0x1000 ..          .data items, each 4-byte aligned (the heap lives here)
//!        .. top      stack, growing down from the top of memory
//! ```
//!
//! Supported system calls: `read` (63) returns one line of the supplied
//! stdin, `write` (64) appends to the captured stdout, `exit` (93) stops.

use super::riscv::{AsmProgram, DataKind, Instruction, Opcode, Reg};
use super::runtime::{syscall, STDIN, STDOUT};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Result of running a program to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Everything written to stdout
    pub stdout: String,
    /// Process exit code
    pub exit_code: i32,
}

/// First mapped address
const DATA_BASE: u32 = 0x1000;

/// Stack size in bytes
const STACK_SIZE: u32 = 1 << 20;

/// Program emulator
#[derive(Debug, Clone)]
pub struct Emulator {
    stdin: Vec<u8>,
    max_steps: u64,
}

impl Emulator {
    /// Default step budget
    pub const DEFAULT_MAX_STEPS: u64 = 50_000_000;

    /// Emulator with empty stdin and the default step budget
    pub fn new() -> Self {
        Self {
            stdin: Vec::new(),
            max_steps: Self::DEFAULT_MAX_STEPS,
        }
    }

    /// Supply the bytes the program reads from stdin
    pub fn with_stdin(mut self, input: &str) -> Self {
        self.stdin = input.as_bytes().to_vec();
        self
    }

    /// Limit the number of executed instructions
    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Run `program` from `_start` until it exits
    pub fn run(&self, program: &AsmProgram) -> Result<Outcome> {
        let mut machine = Machine::load(program, &self.stdin)?;
        let outcome = machine.run(self.max_steps)?;
        tracing::debug!(
            steps = machine.steps,
            exit_code = outcome.exit_code,
            "emulation finished"
        );
        Ok(outcome)
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

struct Machine<'a> {
    text: &'a [Instruction],
    labels: HashMap<&'a str, usize>,
    symbols: HashMap<&'a str, u32>,
    regs: [i32; 32],
    memory: Vec<u8>,
    pc: usize,
    steps: u64,
    stdin: &'a [u8],
    stdin_pos: usize,
    stdout: Vec<u8>,
}

enum Step {
    Continue,
    Exit(i32),
}

impl<'a> Machine<'a> {
    fn load(program: &'a AsmProgram, stdin: &'a [u8]) -> Result<Self> {
        let mut labels = HashMap::new();
        for (index, inst) in program.text.iter().enumerate() {
            if let Some(name) = inst.label_name() {
                if labels.insert(name, index).is_some() {
                    return Err(Error::emulation(index, format!("duplicate label {}", name)));
                }
            }
        }

        let mut symbols = HashMap::new();
        let mut cursor = DATA_BASE;
        let mut image: Vec<(u32, &DataKind)> = Vec::new();
        for item in &program.data {
            cursor = align4(cursor);
            symbols.insert(item.label.as_str(), cursor);
            image.push((cursor, &item.kind));
            cursor = cursor
                .checked_add(item.size())
                .ok_or_else(|| Error::emulation(0, "data section too large"))?;
        }
        let top = align4(cursor)
            .checked_add(STACK_SIZE)
            .ok_or_else(|| Error::emulation(0, "data section too large"))?;

        let mut memory = vec![0u8; top as usize];
        for (address, kind) in image {
            let at = address as usize;
            match kind {
                DataKind::Space(_) => {}
                DataKind::Word(n) => memory[at..at + 4].copy_from_slice(&n.to_le_bytes()),
                DataKind::Ascii(s) => memory[at..at + s.len()].copy_from_slice(s.as_bytes()),
            }
        }

        let start = *labels
            .get(super::runtime::symbols::START)
            .ok_or_else(|| Error::emulation(0, "program has no _start"))?;
        let mut regs = [0; 32];
        regs[Reg::Sp.index()] = top as i32;

        Ok(Self {
            text: &program.text,
            labels,
            symbols,
            regs,
            memory,
            pc: start,
            steps: 0,
            stdin,
            stdin_pos: 0,
            stdout: Vec::new(),
        })
    }

    fn run(&mut self, max_steps: u64) -> Result<Outcome> {
        loop {
            if self.steps >= max_steps {
                return Err(Error::ExecutionLimitExceeded { limit: max_steps });
            }
            self.steps += 1;
            if let Step::Exit(exit_code) = self.step()? {
                return Ok(Outcome {
                    stdout: String::from_utf8_lossy(&self.stdout).into_owned(),
                    exit_code,
                });
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        let pc = self.pc;
        let text = self.text;
        let inst = text
            .get(pc)
            .ok_or_else(|| Error::emulation(pc, "execution ran past the end of the program"))?;
        self.pc += 1;

        let rs1 = self.read(inst.rs1);
        let rs2 = self.read(inst.rs2);
        let imm = inst.imm_int();

        match inst.opcode {
            Opcode::Label => {}
            Opcode::Li => self.write(inst.rd, imm),
            Opcode::La => {
                let symbol = self.symbol(inst)?;
                self.write(inst.rd, symbol as i32);
            }
            Opcode::Lw => {
                let address = self.address(rs1, imm)?;
                let bytes = self.bytes(address, 4)?;
                let value = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                self.write(inst.rd, value);
            }
            Opcode::Lbu => {
                let address = self.address(rs1, imm)?;
                let byte = self.bytes(address, 1)?[0];
                self.write(inst.rd, i32::from(byte));
            }
            Opcode::Sw => {
                let address = self.address(rs1, imm)?;
                self.bytes_mut(address, 4)?.copy_from_slice(&rs2.to_le_bytes());
            }
            Opcode::Sb => {
                let address = self.address(rs1, imm)?;
                // Truncation to the low byte is the instruction's semantics
                self.bytes_mut(address, 1)?[0] = rs2 as u8;
            }
            Opcode::Add => self.write(inst.rd, rs1.wrapping_add(rs2)),
            Opcode::Addi => self.write(inst.rd, rs1.wrapping_add(imm)),
            Opcode::Sub => self.write(inst.rd, rs1.wrapping_sub(rs2)),
            Opcode::Mul => self.write(inst.rd, rs1.wrapping_mul(rs2)),
            Opcode::Div => self.write(inst.rd, div(rs1, rs2)),
            Opcode::Rem => self.write(inst.rd, rem(rs1, rs2)),
            Opcode::Slt => self.write(inst.rd, i32::from(rs1 < rs2)),
            Opcode::And => self.write(inst.rd, rs1 & rs2),
            Opcode::Andi => self.write(inst.rd, rs1 & imm),
            Opcode::Or => self.write(inst.rd, rs1 | rs2),
            Opcode::Xor => self.write(inst.rd, rs1 ^ rs2),
            Opcode::Slli => self.write(inst.rd, rs1.wrapping_shl(imm as u32)),
            Opcode::Seqz => self.write(inst.rd, i32::from(rs1 == 0)),
            Opcode::Snez => self.write(inst.rd, i32::from(rs1 != 0)),
            Opcode::Mv => self.write(inst.rd, rs1),
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bge => {
                let taken = match inst.opcode {
                    Opcode::Beq => rs1 == rs2,
                    Opcode::Bne => rs1 != rs2,
                    Opcode::Blt => rs1 < rs2,
                    _ => rs1 >= rs2,
                };
                if taken {
                    self.pc = self.label(inst)?;
                }
            }
            Opcode::J => self.pc = self.label(inst)?,
            Opcode::Jal => {
                let target = self.label(inst)?;
                self.write(inst.rd, self.pc as i32);
                self.pc = target;
            }
            Opcode::Ret => {
                let ra = self.regs[Reg::Ra.index()];
                self.pc = usize::try_from(ra)
                    .map_err(|_| Error::emulation(pc, format!("return to bad address {}", ra)))?;
            }
            Opcode::Ecall => return self.ecall(pc),
        }
        Ok(Step::Continue)
    }

    fn ecall(&mut self, pc: usize) -> Result<Step> {
        let number = self.regs[Reg::A7.index()];
        let a0 = self.regs[Reg::A0.index()];
        let a1 = self.regs[Reg::A1.index()];
        let a2 = self.regs[Reg::A2.index()];
        match number {
            syscall::EXIT => return Ok(Step::Exit(a0)),
            syscall::WRITE => {
                if a0 != STDOUT {
                    return Err(Error::emulation(pc, format!("write to fd {}", a0)));
                }
                let address = self.address(a1, 0)?;
                let len = usize::try_from(a2)
                    .map_err(|_| Error::emulation(pc, "negative write length"))?;
                let bytes = self.bytes(address, len)?.to_vec();
                self.stdout.extend_from_slice(&bytes);
                self.regs[Reg::A0.index()] = a2;
            }
            syscall::READ => {
                if a0 != STDIN {
                    return Err(Error::emulation(pc, format!("read from fd {}", a0)));
                }
                let address = self.address(a1, 0)?;
                let limit = usize::try_from(a2)
                    .map_err(|_| Error::emulation(pc, "negative read length"))?;
                let stdin = self.stdin;
                let rest = &stdin[self.stdin_pos..];
                // One line per read, like a terminal
                let line_len = rest
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(rest.len(), |i| i + 1);
                let n = line_len.min(limit);
                let line = rest[..n].to_vec();
                self.stdin_pos += n;
                self.bytes_mut(address, n)?.copy_from_slice(&line);
                self.regs[Reg::A0.index()] = n as i32;
            }
            other => return Err(Error::emulation(pc, format!("unknown system call {}", other))),
        }
        Ok(Step::Continue)
    }

    fn read(&self, reg: Option<Reg>) -> i32 {
        reg.map_or(0, |r| self.regs[r.index()])
    }

    fn write(&mut self, reg: Option<Reg>, value: i32) {
        if let Some(r) = reg {
            if r != Reg::Zero {
                self.regs[r.index()] = value;
            }
        }
    }

    fn label(&self, inst: &Instruction) -> Result<usize> {
        let name = inst
            .target()
            .ok_or_else(|| Error::emulation(self.pc - 1, "branch without a target"))?;
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::emulation(self.pc - 1, format!("undefined label {}", name)))
    }

    fn symbol(&self, inst: &Instruction) -> Result<u32> {
        let name = inst
            .target()
            .ok_or_else(|| Error::emulation(self.pc - 1, "la without a symbol"))?;
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| Error::emulation(self.pc - 1, format!("undefined symbol {}", name)))
    }

    fn address(&self, base: i32, offset: i32) -> Result<usize> {
        let address = base.wrapping_add(offset) as u32;
        if address < DATA_BASE {
            return Err(Error::emulation(
                self.pc - 1,
                format!("access to unmapped address {:#x}", address),
            ));
        }
        Ok(address as usize)
    }

    fn bytes(&self, address: usize, len: usize) -> Result<&[u8]> {
        let pc = self.pc - 1;
        address
            .checked_add(len)
            .and_then(|end| self.memory.get(address..end))
            .ok_or_else(|| {
                Error::emulation(pc, format!("access past end of memory at {:#x}", address))
            })
    }

    fn bytes_mut(&mut self, address: usize, len: usize) -> Result<&mut [u8]> {
        let pc = self.pc - 1;
        address
            .checked_add(len)
            .and_then(|end| self.memory.get_mut(address..end))
            .ok_or_else(|| {
                Error::emulation(pc, format!("access past end of memory at {:#x}", address))
            })
    }
}

fn align4(address: u32) -> u32 {
    (address + 3) & !3
}

/// RISC-V `div`: truncating, with defined results for zero and overflow
fn div(a: i32, b: i32) -> i32 {
    if b == 0 {
        -1
    } else {
        a.wrapping_div(b)
    }
}

/// RISC-V `rem`: sign follows the dividend
fn rem(a: i32, b: i32) -> i32 {
    if b == 0 {
        a
    } else {
        a.wrapping_rem(b)
    }
}
