//! # Runtime Library for Compiled ChocoPy Programs
//!
//! Hand-written routines appended to every program: program entry, the bump
//! allocator, printing, input, list concatenation, string equality and the
//! error traps.
//!
//! Calling convention for all routines: arguments in `a0`/`a1`, result in
//! `a0`. Routines clobber `t0`-`t6` and `a0`-`a7` freely; `sp`, `tp` and the
//! caller's `ra` are preserved.
//!
//! Heap objects are laid out as
//!
//! ```text
//! +--------+--------+--------+-----
//! | length | elem 0 | elem 1 | ...
//! +--------+--------+--------+-----
//!   0        4        8
//! ```
//!
//! Strings use the same layout with one character code per word.

use super::riscv::{
    AsmProgram, DataItem, DataKind, Instruction, Opcode, Reg, HEAP_LABEL, HEAP_PTR_LABEL,
};

/// Routine labels
pub mod symbols {
    /// Program entry point
    pub const START: &str = "_start";
    /// Bump allocator: `a0` bytes in, pointer out
    pub const MALLOC: &str = "_malloc";
    /// Print an int and a newline
    pub const PRINT_INT: &str = "_print_int";
    /// Print `True`/`False` and a newline
    pub const PRINT_BOOL: &str = "_print_bool";
    /// Print a string object and a newline
    pub const PRINT_STR: &str = "_print_str";
    /// Read one line from stdin into a new string object
    pub const INPUT: &str = "_input";
    /// Concatenate two lists (or strings) into a new object
    pub const LIST_CONCAT: &str = "_list_concat";
    /// String equality: 1 or 0
    pub const STR_EQ: &str = "_str_eq";
    /// `len(None)`
    pub const ERROR_LEN_NONE: &str = "_error_len_none";
    /// Index outside `0..len`
    pub const ERROR_INDEX_OOB: &str = "_error_index_oob";
    /// Indexing `None`
    pub const ERROR_INDEX_NONE: &str = "_error_index_none";
    /// `//` or `%` by zero
    pub const ERROR_DIV_ZERO: &str = "_error_div_zero";
    /// Shared tail of the error routines: write `a1`/`a2`, exit 1
    pub const ERROR_EXIT: &str = "_error_exit";
}

/// Diagnostics printed by the error routines (a newline follows each)
pub mod messages {
    /// `len(None)`
    pub const LEN_NONE: &str = "TypeError: object of type 'NoneType' has no len()";
    /// Index out of range
    pub const INDEX_OOB: &str = "IndexError: list index out of range";
    /// Indexing `None`
    pub const INDEX_NONE: &str = "TypeError: 'NoneType' object is not subscriptable";
    /// Division by zero
    pub const DIV_ZERO: &str = "DivByZero: Division by zero";
}

/// Linux-style system call numbers (in `a7`)
pub mod syscall {
    /// `read(fd, buf, len)`
    pub const READ: i32 = 63;
    /// `write(fd, buf, len)`
    pub const WRITE: i32 = 64;
    /// `exit(code)`
    pub const EXIT: i32 = 93;
}

/// Standard input file descriptor
pub const STDIN: i32 = 0;

/// Standard output file descriptor
pub const STDOUT: i32 = 1;

/// Maximum number of bytes `_input` reads
pub const INPUT_LIMIT: i32 = 1020;

/// Exit code of the error routines
pub const ERROR_EXIT_CODE: i32 = 1;

/// Error routine labels with their diagnostics
pub const ERROR_ROUTINES: [(&str, &str); 4] = [
    (symbols::ERROR_LEN_NONE, messages::LEN_NONE),
    (symbols::ERROR_INDEX_OOB, messages::INDEX_OOB),
    (symbols::ERROR_INDEX_NONE, messages::INDEX_NONE),
    (symbols::ERROR_DIV_ZERO, messages::DIV_ZERO),
];

const TRUE_TEXT: &str = "_true_text";
const FALSE_TEXT: &str = "_false_text";

/// `_start`: set up the heap pointer, run `_main`, exit 0
pub fn entry(main: &str) -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::START),
        Instruction::la(Reg::T0, HEAP_LABEL).with_comment("initialise the heap pointer"),
        Instruction::la(Reg::T1, HEAP_PTR_LABEL),
        Instruction::sw(Reg::T0, 0, Reg::T1),
        Instruction::jal(main),
        Instruction::li(Reg::A0, 0).with_comment("exit program"),
        Instruction::li(Reg::A7, syscall::EXIT),
        Instruction::ecall(),
    ]
}

/// Append every routine and the data it needs to `program`
pub fn append_library(program: &mut AsmProgram) {
    let routines = [
        malloc(),
        print_int(),
        print_bool(),
        print_str(),
        input(),
        list_concat(),
        str_eq(),
        error_routines(),
    ];
    for routine in routines {
        program.text.extend(routine);
    }

    program.data.push(ascii(TRUE_TEXT, "True\n"));
    program.data.push(ascii(FALSE_TEXT, "False\n"));
    for (label, message) in ERROR_ROUTINES {
        program
            .data
            .push(ascii(&message_label(label), &format!("{}\n", message)));
    }
    tracing::debug!(
        instructions = program.instruction_count(),
        "runtime library appended"
    );
}

fn ascii(label: &str, text: &str) -> DataItem {
    DataItem {
        label: label.to_string(),
        kind: DataKind::Ascii(text.to_string()),
    }
}

fn message_label(routine: &str) -> String {
    format!("{}_msg", routine)
}

fn rr(opcode: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> Instruction {
    Instruction::rtype(opcode, rd, rs1, rs2)
}

fn malloc() -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::MALLOC),
        Instruction::la(Reg::T0, HEAP_PTR_LABEL),
        Instruction::lw(Reg::T1, 0, Reg::T0).with_comment("current heap top"),
        rr(Opcode::Add, Reg::T2, Reg::T1, Reg::A0),
        Instruction::sw(Reg::T2, 0, Reg::T0).with_comment("bump; memory is never reclaimed"),
        Instruction::mv(Reg::A0, Reg::T1),
        Instruction::ret(),
    ]
}

/// Digits are produced from the non-positive magnitude so `i32::MIN` needs
/// no special case.
fn print_int() -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::PRINT_INT),
        Instruction::addi(Reg::Sp, Reg::Sp, -16).with_comment("text buffer"),
        Instruction::li(Reg::T0, i32::from(b'\n')),
        Instruction::sb(Reg::T0, 15, Reg::Sp),
        Instruction::addi(Reg::T1, Reg::Sp, 15).with_comment("start of text"),
        Instruction::mv(Reg::T2, Reg::A0),
        rr(Opcode::Slt, Reg::T3, Reg::T2, Reg::Zero).with_comment("sign flag"),
        Instruction::branch(Opcode::Bne, Reg::T3, Reg::Zero, ".Lprint_int_digit"),
        rr(Opcode::Sub, Reg::T2, Reg::Zero, Reg::T2),
        Instruction::label(".Lprint_int_digit"),
        Instruction::li(Reg::T4, 10),
        rr(Opcode::Rem, Reg::T5, Reg::T2, Reg::T4).with_comment("in -9..=0"),
        rr(Opcode::Div, Reg::T2, Reg::T2, Reg::T4),
        Instruction::li(Reg::T6, i32::from(b'0')),
        rr(Opcode::Sub, Reg::T5, Reg::T6, Reg::T5),
        Instruction::addi(Reg::T1, Reg::T1, -1),
        Instruction::sb(Reg::T5, 0, Reg::T1),
        Instruction::branch(Opcode::Bne, Reg::T2, Reg::Zero, ".Lprint_int_digit"),
        Instruction::branch(Opcode::Beq, Reg::T3, Reg::Zero, ".Lprint_int_write"),
        Instruction::li(Reg::T5, i32::from(b'-')),
        Instruction::addi(Reg::T1, Reg::T1, -1),
        Instruction::sb(Reg::T5, 0, Reg::T1),
        Instruction::label(".Lprint_int_write"),
        Instruction::li(Reg::A0, STDOUT),
        Instruction::mv(Reg::A1, Reg::T1),
        Instruction::addi(Reg::T2, Reg::Sp, 16),
        rr(Opcode::Sub, Reg::A2, Reg::T2, Reg::T1),
        Instruction::li(Reg::A7, syscall::WRITE),
        Instruction::ecall(),
        Instruction::addi(Reg::Sp, Reg::Sp, 16),
        Instruction::ret(),
    ]
}

fn print_bool() -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::PRINT_BOOL),
        Instruction::branch(Opcode::Beq, Reg::A0, Reg::Zero, ".Lprint_bool_false"),
        Instruction::la(Reg::A1, TRUE_TEXT),
        Instruction::li(Reg::A2, 5),
        Instruction::j(".Lprint_bool_write"),
        Instruction::label(".Lprint_bool_false"),
        Instruction::la(Reg::A1, FALSE_TEXT),
        Instruction::li(Reg::A2, 6),
        Instruction::label(".Lprint_bool_write"),
        Instruction::li(Reg::A0, STDOUT),
        Instruction::li(Reg::A7, syscall::WRITE),
        Instruction::ecall(),
        Instruction::ret(),
    ]
}

/// Copies one byte per word onto the stack, then writes it with a newline
fn print_str() -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::PRINT_STR),
        Instruction::lw(Reg::T0, 0, Reg::A0).with_comment("length"),
        Instruction::addi(Reg::T1, Reg::T0, 4),
        Instruction::itype(Opcode::Andi, Reg::T1, Reg::T1, -4)
            .with_comment("buffer size, room for the newline"),
        rr(Opcode::Sub, Reg::Sp, Reg::Sp, Reg::T1),
        Instruction::li(Reg::T2, 0),
        Instruction::addi(Reg::T3, Reg::A0, 4),
        Instruction::label(".Lprint_str_copy"),
        Instruction::branch(Opcode::Bge, Reg::T2, Reg::T0, ".Lprint_str_write"),
        Instruction::lw(Reg::T4, 0, Reg::T3),
        rr(Opcode::Add, Reg::T5, Reg::Sp, Reg::T2),
        Instruction::sb(Reg::T4, 0, Reg::T5),
        Instruction::addi(Reg::T3, Reg::T3, 4),
        Instruction::addi(Reg::T2, Reg::T2, 1),
        Instruction::j(".Lprint_str_copy"),
        Instruction::label(".Lprint_str_write"),
        rr(Opcode::Add, Reg::T5, Reg::Sp, Reg::T0),
        Instruction::li(Reg::T4, i32::from(b'\n')),
        Instruction::sb(Reg::T4, 0, Reg::T5),
        Instruction::li(Reg::A0, STDOUT),
        Instruction::mv(Reg::A1, Reg::Sp),
        Instruction::addi(Reg::A2, Reg::T0, 1),
        Instruction::li(Reg::A7, syscall::WRITE),
        Instruction::ecall(),
        rr(Opcode::Add, Reg::Sp, Reg::Sp, Reg::T1),
        Instruction::ret(),
    ]
}

/// Frame: read buffer at `0..1020`, saved length at 1024, `ra` at 1028
fn input() -> Vec<Instruction> {
    const FRAME: i32 = 1032;
    const LENGTH: i32 = 1024;
    const RA: i32 = 1028;
    vec![
        Instruction::label(symbols::INPUT),
        Instruction::addi(Reg::Sp, Reg::Sp, -FRAME),
        Instruction::sw(Reg::Ra, RA, Reg::Sp),
        Instruction::li(Reg::A0, STDIN),
        Instruction::mv(Reg::A1, Reg::Sp),
        Instruction::li(Reg::A2, INPUT_LIMIT),
        Instruction::li(Reg::A7, syscall::READ),
        Instruction::ecall().with_comment("a0 = bytes read, 0 at end of input"),
        Instruction::branch(Opcode::Bge, Reg::A0, Reg::Zero, ".Linput_strip"),
        Instruction::li(Reg::A0, 0),
        Instruction::label(".Linput_strip"),
        Instruction::mv(Reg::T0, Reg::A0),
        Instruction::branch(Opcode::Beq, Reg::T0, Reg::Zero, ".Linput_alloc"),
        rr(Opcode::Add, Reg::T1, Reg::Sp, Reg::T0),
        Instruction::lbu(Reg::T2, -1, Reg::T1),
        Instruction::li(Reg::T3, i32::from(b'\n')),
        Instruction::branch(Opcode::Bne, Reg::T2, Reg::T3, ".Linput_alloc"),
        Instruction::addi(Reg::T0, Reg::T0, -1).with_comment("drop the newline"),
        Instruction::label(".Linput_alloc"),
        Instruction::sw(Reg::T0, LENGTH, Reg::Sp),
        Instruction::itype(Opcode::Slli, Reg::A0, Reg::T0, 2),
        Instruction::addi(Reg::A0, Reg::A0, 4),
        Instruction::jal(symbols::MALLOC),
        Instruction::lw(Reg::T0, LENGTH, Reg::Sp),
        Instruction::sw(Reg::T0, 0, Reg::A0),
        Instruction::li(Reg::T1, 0),
        Instruction::addi(Reg::T2, Reg::A0, 4),
        Instruction::label(".Linput_copy"),
        Instruction::branch(Opcode::Bge, Reg::T1, Reg::T0, ".Linput_done"),
        rr(Opcode::Add, Reg::T3, Reg::Sp, Reg::T1),
        Instruction::lbu(Reg::T4, 0, Reg::T3),
        Instruction::sw(Reg::T4, 0, Reg::T2),
        Instruction::addi(Reg::T2, Reg::T2, 4),
        Instruction::addi(Reg::T1, Reg::T1, 1),
        Instruction::j(".Linput_copy"),
        Instruction::label(".Linput_done"),
        Instruction::lw(Reg::Ra, RA, Reg::Sp),
        Instruction::addi(Reg::Sp, Reg::Sp, FRAME),
        Instruction::ret(),
    ]
}

fn list_concat() -> Vec<Instruction> {
    let mut ops = vec![
        Instruction::label(symbols::LIST_CONCAT),
        Instruction::addi(Reg::Sp, Reg::Sp, -16),
        Instruction::sw(Reg::Ra, 12, Reg::Sp),
        Instruction::sw(Reg::A0, 8, Reg::Sp),
        Instruction::sw(Reg::A1, 4, Reg::Sp),
        Instruction::lw(Reg::T0, 0, Reg::A0),
        Instruction::lw(Reg::T1, 0, Reg::A1),
        rr(Opcode::Add, Reg::T0, Reg::T0, Reg::T1).with_comment("combined length"),
        Instruction::sw(Reg::T0, 0, Reg::Sp),
        Instruction::itype(Opcode::Slli, Reg::A0, Reg::T0, 2),
        Instruction::addi(Reg::A0, Reg::A0, 4),
        Instruction::jal(symbols::MALLOC),
        Instruction::lw(Reg::T0, 0, Reg::Sp),
        Instruction::sw(Reg::T0, 0, Reg::A0),
        Instruction::addi(Reg::T2, Reg::A0, 4).with_comment("destination cursor"),
    ];
    for (slot, part) in [(8, "first"), (4, "second")] {
        let copy = format!(".Llist_concat_{}", part);
        let done = format!(".Llist_concat_{}_done", part);
        ops.extend([
            Instruction::lw(Reg::T3, slot, Reg::Sp),
            Instruction::lw(Reg::T4, 0, Reg::T3),
            Instruction::addi(Reg::T3, Reg::T3, 4),
            Instruction::label(&copy),
            Instruction::branch(Opcode::Beq, Reg::T4, Reg::Zero, &done),
            Instruction::lw(Reg::T5, 0, Reg::T3),
            Instruction::sw(Reg::T5, 0, Reg::T2),
            Instruction::addi(Reg::T3, Reg::T3, 4),
            Instruction::addi(Reg::T2, Reg::T2, 4),
            Instruction::addi(Reg::T4, Reg::T4, -1),
            Instruction::j(&copy),
            Instruction::label(&done),
        ]);
    }
    ops.extend([
        Instruction::lw(Reg::Ra, 12, Reg::Sp),
        Instruction::addi(Reg::Sp, Reg::Sp, 16),
        Instruction::ret(),
    ]);
    ops
}

fn str_eq() -> Vec<Instruction> {
    vec![
        Instruction::label(symbols::STR_EQ),
        Instruction::lw(Reg::T0, 0, Reg::A0),
        Instruction::lw(Reg::T1, 0, Reg::A1),
        Instruction::branch(Opcode::Bne, Reg::T0, Reg::T1, ".Lstr_eq_false")
            .with_comment("lengths differ"),
        Instruction::addi(Reg::T2, Reg::A0, 4),
        Instruction::addi(Reg::T3, Reg::A1, 4),
        Instruction::label(".Lstr_eq_loop"),
        Instruction::branch(Opcode::Beq, Reg::T0, Reg::Zero, ".Lstr_eq_true"),
        Instruction::lw(Reg::T4, 0, Reg::T2),
        Instruction::lw(Reg::T5, 0, Reg::T3),
        Instruction::branch(Opcode::Bne, Reg::T4, Reg::T5, ".Lstr_eq_false"),
        Instruction::addi(Reg::T2, Reg::T2, 4),
        Instruction::addi(Reg::T3, Reg::T3, 4),
        Instruction::addi(Reg::T0, Reg::T0, -1),
        Instruction::j(".Lstr_eq_loop"),
        Instruction::label(".Lstr_eq_true"),
        Instruction::li(Reg::A0, 1),
        Instruction::ret(),
        Instruction::label(".Lstr_eq_false"),
        Instruction::li(Reg::A0, 0),
        Instruction::ret(),
    ]
}

/// Error traps: control-flow sinks that never return
fn error_routines() -> Vec<Instruction> {
    let mut ops = Vec::new();
    for (label, message) in ERROR_ROUTINES {
        let len = message.len() as i32 + 1;
        ops.extend([
            Instruction::label(label),
            Instruction::la(Reg::A1, &message_label(label)),
            Instruction::li(Reg::A2, len),
            Instruction::j(symbols::ERROR_EXIT),
        ]);
    }
    ops.extend([
        Instruction::label(symbols::ERROR_EXIT),
        Instruction::li(Reg::A0, STDOUT),
        Instruction::li(Reg::A7, syscall::WRITE),
        Instruction::ecall(),
        Instruction::li(Reg::A0, ERROR_EXIT_CODE),
        Instruction::li(Reg::A7, syscall::EXIT),
        Instruction::ecall(),
    ]);
    ops
}
