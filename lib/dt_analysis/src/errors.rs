//! Analysis errors definition.

use dt_dex::errors::DexError;
use dt_vm::errors::VmError;
use regex::Error as RegexError;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("dex error: {0}")]
    Dex(#[from] DexError),

    #[error("vm error: {0}")]
    Vm(#[from] VmError),

    #[error("regex error: {0}")]
    Regex(#[from] RegexError),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("the method has no implementation: {0}")]
    NoCode(String),
}
