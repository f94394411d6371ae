//! Reference interpreter for typed ChocoPy programs
//!
//! Evaluates the same tree the compiler consumes and reports the same
//! [`Outcome`](crate::compiler::emulator::Outcome), so compiled programs can
//! be checked against it.

mod environment;
mod interpreter;
mod value;

pub use environment::Environment;
pub use interpreter::{floor_div, floor_mod, Interpreter};
pub use value::Value;
