//! # Intermediate Representation (IR)
//!
//! A single region-based IR carries the program from translation down to
//! register allocation. The translator emits memory IR (explicit `alloc`,
//! `load`, `store`, structured control flow with nested regions); lowering
//! rewrites it in place into flat target ops.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── types.rs        # ValueType (plain value, memory location, register)
//! ├── instruction.rs  # OpKind, TargetOp, LiteralValue
//! ├── program.rs      # IrModule arena, users map, rewriting, verification
//! ├── printer.rs      # Text and JSON dumps
//! └── generator.rs    # IrGenerator (typed tree -> memory IR)
//! ```
//!
//! ## Key Types
//!
//! - [`IrModule`] - Generational arena of operations plus the value table
//! - [`OpKind`] - Closed enum over every operation kind
//! - [`ValueId`] / [`OpId`] - Handles into the module
//! - [`IrGenerator`] - AST-to-IR translator

mod generator;
mod instruction;
mod printer;
mod program;
mod types;

pub use generator::{IrGenerator, ENTRY_FUNCTION};
pub use instruction::{LiteralValue, OpKind, TargetOp};
pub use program::{IrModule, OpId, Operation, Region, RegionRef, ValueDef, ValueId};
pub use types::ValueType;
