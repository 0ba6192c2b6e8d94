//! Global error handling.
//!
//! Each sub-crate of the project defines its own error type. Their types
//! can be unified, for example in a main function, when winding results at
//! the top-level.

use dt_analysis::errors::AnalysisError;
use dt_dex::errors::DexError;
use dt_vm::errors::VmError;
use std::io;
use thiserror::Error;

/// An alias for result that can be a [`DtError`].
pub type DtResult<T> = Result<T, DtError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrappers over error types that are
/// defined in the sub-crates.
#[derive(Debug, Error)]
pub enum DtError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned when reading an application archive.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Error that can be returned from [`dt_dex`] functions.
    #[error(transparent)]
    Dex(#[from] DexError),

    /// Error that can be returned from [`dt_vm`] functions.
    #[error(transparent)]
    Vm(#[from] VmError),

    /// Error that can be returned from [`dt_analysis`] functions.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    /// Error that can be returned when serializing the report.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
