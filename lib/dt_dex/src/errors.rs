//! Dex errors definitions.

use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DexError`].
pub type DexResult<T> = Result<T, DexError>;

/// The Dex error type.
#[derive(Debug, Error)]
pub enum DexError {
    /// Error that can be returned when doing [std::io](I/O) operations.
    #[error("IO error: {0}")]
    IO(#[from] io::Error),

    /// Error that can be returned at parsing.
    #[error("parsing error")]
    Parsing(Vec<u8>, nom::error::ErrorKind),

    /// Invalid MUTF-8 string.
    #[error("invalid MUTF-8: {0}")]
    InvalidMutf8(String),

    #[error("dex structure is invalid: {0}")]
    Structure(String),

    #[error("dex {0} has invalid offset")]
    InvalidOffset(String),

    #[error("resource not found in dex tables: {0}")]
    ResNotFound(String),

    #[error("string index out of range: {0}")]
    StringNotFound(usize),

    #[error("type index out of range: {0}")]
    TypeNotFound(usize),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("unknown opcode 0x{opcode:02x} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },

    #[error("instruction at pc {0} runs past the end of the method")]
    TruncatedInstruction(usize),
}

impl nom::error::ParseError<&[u8]> for DexError {
    fn from_error_kind(input: &[u8], kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.iter().take(16).copied().collect(), kind)
    }

    fn append(_: &[u8], _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<DexError>> for DexError {
    fn from(err: nom::Err<DexError>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
            nom::Err::Incomplete(_) => Self::Structure("truncated input".to_string()),
        }
    }
}
