//! # chococ - ChocoPy compiler back end
//!
//! Takes a type-checked ChocoPy program and produces RISC-V assembly that
//! runs against a small hand-written runtime library.
//!
//! ## Quick Start
//!
//! ```rust
//! use chococ::ast::{BinaryOp, Expr, Program, Stmt};
//! use chococ::types::Type;
//! use chococ::{Compiler, CompileOptions, Emulator};
//!
//! # fn main() -> chococ::Result<()> {
//! let program = Program {
//!     decls: vec![],
//!     stmts: vec![Stmt::print(Expr::binary(
//!         BinaryOp::Mul,
//!         Expr::int(6),
//!         Expr::int(7),
//!         Type::Int,
//!     ))],
//! };
//!
//! let result = Compiler::new(CompileOptions::default()).compile(&program)?;
//! let outcome = Emulator::new().run(&result.asm)?;
//! assert_eq!(outcome.stdout, "42\n");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────────┐   ┌──────────┐   ┌──────────┐
//! │ typed AST  │ → │ memory IR │ → │ IR rewrites  │ → │ lowering │ → │ regalloc │
//! └────────────┘   └───────────┘   └──────────────┘   └──────────┘   └──────────┘
//!                                  for→while, library
//!                                  calls, fold, DCE
//! ```
//!
//! - [`ast`] - typed input tree, built by an external front end
//! - [`compiler`] - the pipeline, the RISC-V model, the runtime library and
//!   an emulator for the output
//! - [`runtime`] - reference interpreter over the typed tree
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], whose error type
//! distinguishes internal compiler faults, unsupported features and failures
//! of the program being run.

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ast;
pub mod compiler;
pub mod error;
pub mod runtime;
pub mod types;

// Re-export main types
pub use ast::Program;
pub use compiler::{CompileOptions, CompileResult, Compiler, Emulator, Outcome};
pub use error::{Error, ErrorSeverity, Result};
pub use runtime::{Interpreter, Value};
pub use types::Type;
