//! # ChocoPy Compiler Back End - typed tree to RISC-V assembly
//!
//! Compiles a type-checked program to a RISC-V assembly listing that runs
//! against the bundled runtime library.
//!
//! ## Architecture
//!
//! ```text
//! typed AST → memory IR → for→while → library calls → fold/DCE
//!           → ISA lowering → stack-slot allocation → AsmProgram
//! ```
//!
//! Every stage after translation rewrites the same [`IrModule`] in place.
//!
//! ## Usage
//!
//! ```ignore
//! use chococ::compiler::{Compiler, CompileOptions};
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&program)?;
//! println!("{}", result.asm);
//! ```

pub mod emulator;
pub mod for_to_while;
pub mod ir;
pub mod library_calls;
pub mod lowering;
pub mod optimizer;
pub mod regalloc;
pub mod riscv;
pub mod runtime;
pub mod scope;

pub use emulator::{Emulator, Outcome};
pub use for_to_while::ForToWhile;
pub use ir::{IrGenerator, IrModule, OpKind, TargetOp, ValueType};
pub use library_calls::LibraryCalls;
pub use lowering::Lowering;
pub use optimizer::Optimizer;
pub use regalloc::{RegisterAllocator, StackFrame};
pub use riscv::{AsmProgram, Instruction, Opcode, Reg, DEFAULT_HEAP_SIZE};

use crate::ast::Program;
use crate::error::Result;

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Optimization level (0 disables folding and DCE)
    pub opt_level: u8,
    /// Size of the `_heap` region in bytes
    pub heap_size: u32,
    /// Keep a text dump of the IR after every pass
    pub print_between_passes: bool,
    /// Run structural verification after every pass
    pub verify_ir: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: 1,
            heap_size: DEFAULT_HEAP_SIZE,
            print_between_passes: false,
            verify_ir: true,
        }
    }
}

/// Compilation result with metadata
#[derive(Debug)]
pub struct CompileResult {
    /// Final program, runtime library included
    pub asm: AsmProgram,
    /// `(pass, IR text)` after each pass, when requested
    pub ir_dumps: Vec<(String, String)>,
    /// Number of ops straight out of the translator
    pub ir_op_count: usize,
    /// `for` loops rewritten
    pub loops_rewritten: usize,
    /// Built-in calls rewritten to runtime calls
    pub calls_rewritten: usize,
    /// Additions folded
    pub folded: usize,
    /// Ops removed by DCE
    pub eliminated: usize,
    /// Target ops after lowering
    pub target_op_count: usize,
}

/// Typed-tree to RISC-V compiler
pub struct Compiler {
    options: CompileOptions,
}

impl Compiler {
    /// Create a new compiler with options
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }

    /// Options in effect
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile a typed program
    pub fn compile(&self, program: &Program) -> Result<CompileResult> {
        tracing::info!(
            decls = program.decls.len(),
            stmts = program.stmts.len(),
            opt_level = self.options.opt_level,
            "compilation started"
        );
        let mut dumps = Vec::new();

        // Phase 1: Translate
        let mut module = IrGenerator::new().generate(program)?;
        let ir_op_count = module.op_count();
        tracing::debug!(ops = ir_op_count, "translated to memory IR");
        self.checkpoint(&module, "translate", &mut dumps)?;

        // Phase 2: Desugar `for`
        let loops_rewritten = ForToWhile::new().run(&mut module)?;
        self.checkpoint(&module, "for-to-while", &mut dumps)?;

        // Phase 3: Built-ins and overloaded operators to runtime calls
        let calls_rewritten = LibraryCalls::new().run(&mut module)?;
        self.checkpoint(&module, "library-calls", &mut dumps)?;

        // Phase 4: Optimize
        let mut optimizer = Optimizer::new(self.options.opt_level);
        optimizer.optimize(&mut module)?;
        self.checkpoint(&module, "optimize", &mut dumps)?;

        // Phase 5: Lower to target ops
        Lowering::new().run(&mut module)?;
        let target_op_count = module.target_instruction_count();
        self.checkpoint(&module, "lowering", &mut dumps)?;

        // Phase 6: Stack slots and runtime library
        let asm = RegisterAllocator::new(self.options.heap_size).allocate(&module)?;

        tracing::info!(
            instructions = asm.instruction_count(),
            "compilation finished"
        );
        Ok(CompileResult {
            asm,
            ir_dumps: dumps,
            ir_op_count,
            loops_rewritten,
            calls_rewritten,
            folded: optimizer.folded(),
            eliminated: optimizer.eliminated(),
            target_op_count,
        })
    }

    /// Compile a program handed over as JSON by the front end
    pub fn compile_json(&self, json: &str) -> Result<CompileResult> {
        let program: Program = serde_json::from_str(json)?;
        self.compile(&program)
    }

    fn checkpoint(
        &self,
        module: &IrModule,
        pass: &str,
        dumps: &mut Vec<(String, String)>,
    ) -> Result<()> {
        if self.options.verify_ir {
            module.verify()?;
        }
        tracing::debug!(pass, ops = module.op_count(), "pass finished");
        if self.options.print_between_passes {
            dumps.push((pass.to_string(), module.to_string()));
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};
    use crate::error::Error;
    use crate::types::Type;

    fn hello() -> Program {
        Program {
            decls: vec![],
            stmts: vec![Stmt::print(Expr::binary(
                crate::ast::BinaryOp::Add,
                Expr::int(1),
                Expr::int(2),
                Type::Int,
            ))],
        }
    }

    #[test]
    fn test_compile_folds_and_runs() {
        let result = Compiler::default().compile(&hello()).unwrap();
        assert_eq!(result.folded, 1);
        assert!(result.asm.has_label("_main"));
        let outcome = Emulator::new().run(&result.asm).unwrap();
        assert_eq!(outcome.stdout, "3\n");
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn test_opt_level_zero_keeps_addition() {
        let options = CompileOptions {
            opt_level: 0,
            ..CompileOptions::default()
        };
        let result = Compiler::new(options).compile(&hello()).unwrap();
        assert_eq!(result.folded, 0);
        assert_eq!(result.eliminated, 0);
    }

    #[test]
    fn test_dumps_after_every_pass() {
        let options = CompileOptions {
            print_between_passes: true,
            ..CompileOptions::default()
        };
        let result = Compiler::new(options).compile(&hello()).unwrap();
        let passes: Vec<&str> = result.ir_dumps.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(
            passes,
            vec!["translate", "for-to-while", "library-calls", "optimize", "lowering"]
        );
    }

    #[test]
    fn test_compile_json() {
        let json = serde_json::to_string(&hello()).unwrap();
        let result = Compiler::default().compile_json(&json).unwrap();
        assert_eq!(result.calls_rewritten, 1);
        assert!(matches!(
            Compiler::default().compile_json("{"),
            Err(Error::Json(_))
        ));
    }
}
