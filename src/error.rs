//! Error types for the chococ compiler back end

use thiserror::Error;

/// Compiler, emulator and reference-interpreter errors
#[derive(Error, Debug)]
pub enum Error {
    // Compile-time internal errors
    /// An operation shape a pass cannot handle
    ///
    /// **Triggered by:** invalid IR produced by an earlier stage (missing yield, empty region,
    /// operand of the wrong type)
    #[error("Internal compiler error: {0}")]
    Internal(String),

    /// IR failed structural verification
    #[error("Invalid IR in {context}: {message}")]
    InvalidIr {
        /// Pass or phase that produced the IR
        context: String,
        /// What is wrong with it
        message: String,
    },

    /// A construct reached a pass that should have run after its eliminating pass
    ///
    /// **Example:** a `for` op reaching ISA lowering without for-to-while desugaring
    #[error("Pass ordering error: {0}")]
    PassOrdering(String),

    /// Feature that the back end deliberately does not support
    ///
    /// **Example:** a call with more arguments than argument registers
    #[error("Unimplemented: {feature}")]
    Unimplemented {
        /// Feature description
        feature: String,
    },

    // Scoping
    /// Name inserted twice into the same scope
    #[error("Duplicate definition: {name}")]
    DuplicateDefinition {
        /// Identifier
        name: String,
    },

    /// Name that no enclosing scope defines
    #[error("Undefined name: {name}")]
    UndefinedName {
        /// Identifier
        name: String,
    },

    // Execution (emulator / reference interpreter)
    /// Program-level runtime error raised by the reference interpreter
    ///
    /// The message is the exact diagnostic the compiled runtime prints.
    #[error("{0}")]
    ProgramError(String),

    /// Emulator failure (bad address, unknown label, step limit)
    #[error("Emulation error at pc {pc}: {message}")]
    Emulation {
        /// Instruction index
        pc: usize,
        /// Error description
        message: String,
    },

    /// Execution limit exceeded
    #[error("Execution limit exceeded (max: {limit} steps)")]
    ExecutionLimitExceeded {
        /// Maximum allowed steps
        limit: u64,
    },

    /// Call nesting deeper than the interpreter allows
    #[error("Call depth exceeded (max: {limit} frames)")]
    CallDepthExceeded {
        /// Maximum allowed nesting
        limit: usize,
    },

    // External
    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error severity classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Compiler defect or invalid input tree; compilation stops with no output
    Fatal,
    /// Input uses something the back end does not support
    Unsupported,
    /// Failure of the compiled (or interpreted) program, not of the compiler
    Program,
}

impl Error {
    /// Create an internal compiler error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Create an unimplemented-feature error
    pub fn unimplemented(feature: impl Into<String>) -> Self {
        Error::Unimplemented {
            feature: feature.into(),
        }
    }

    /// Create an emulator error
    pub fn emulation(pc: usize, message: impl Into<String>) -> Self {
        Error::Emulation {
            pc,
            message: message.into(),
        }
    }

    /// Classify error severity
    pub fn classify(&self) -> ErrorSeverity {
        match self {
            Error::Internal(_)
            | Error::InvalidIr { .. }
            | Error::PassOrdering(_)
            | Error::DuplicateDefinition { .. }
            | Error::UndefinedName { .. }
            | Error::Json(_) => ErrorSeverity::Fatal,

            Error::Unimplemented { .. } => ErrorSeverity::Unsupported,

            Error::ProgramError(_)
            | Error::Emulation { .. }
            | Error::ExecutionLimitExceeded { .. }
            | Error::CallDepthExceeded { .. } => ErrorSeverity::Program,
        }
    }
}

/// Result type for chococ operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Error::internal("x").classify(), ErrorSeverity::Fatal);
        assert_eq!(
            Error::unimplemented("9 arguments").classify(),
            ErrorSeverity::Unsupported
        );
        assert_eq!(
            Error::ProgramError("IndexError: list index out of range".into()).classify(),
            ErrorSeverity::Program
        );
        assert_eq!(
            Error::CallDepthExceeded { limit: 100 }.classify(),
            ErrorSeverity::Program
        );
    }

    #[test]
    fn test_messages() {
        let err = Error::DuplicateDefinition { name: "x".into() };
        assert_eq!(err.to_string(), "Duplicate definition: x");
        let err = Error::unimplemented("nested closures");
        assert_eq!(err.to_string(), "Unimplemented: nested closures");
    }
}
