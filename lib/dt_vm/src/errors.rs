//! Interpreter errors definitions.
//!
//! Fatal errors abort the current emulation and carry enough context
//! (method, pc, disassembly) for the host report. Recoverable gaps never
//! surface here; they are logged and execution continues with neutral
//! defaults.

use thiserror::Error;

/// An alias for result that can be a [`VmError`].
pub type VmResult<T> = Result<T, VmError>;

/// The interpreter error type.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("unknown opcode 0x{opcode:02x} in {method} at pc {pc}")]
    UnknownOpcode {
        opcode: u8,
        pc: usize,
        method: String,
    },

    #[error("pc {pc} escapes the bytecode of {method}")]
    PcOutOfRange { pc: usize, method: String },

    #[error("register v{reg} out of bounds in {method} at pc {pc}")]
    RegisterOutOfBounds {
        reg: usize,
        pc: usize,
        method: String,
    },

    #[error("string index {index} cannot be resolved")]
    StringNotFound { index: usize },

    #[error("array index {index} out of bounds (length {len}) in {method} at pc {pc}")]
    ArrayIndexOutOfBounds {
        index: i64,
        len: usize,
        pc: usize,
        method: String,
    },

    #[error("negative array length {len} in {method} at pc {pc}")]
    NegativeArrayLength { len: i32, pc: usize, method: String },

    #[error("division by zero in {method} at pc {pc}")]
    DivisionByZero { pc: usize, method: String },

    #[error("malformed {what} payload in {method} at pc {pc}")]
    MalformedPayload {
        what: &'static str,
        pc: usize,
        method: String,
    },

    #[error("throw reached in {method} at pc {pc}: {instr}")]
    Thrown {
        pc: usize,
        method: String,
        instr: String,
    },

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("{method} exceeded the step limit of {limit}")]
    StepLimit { method: String, limit: usize },

    #[error("call depth limit reached while invoking {0}")]
    CallDepthExceeded(String),

    #[error("dex error: {0}")]
    Dex(#[from] dt_dex::errors::DexError),
}
