//! Static analysis for the `DexTract` emulator.
//!
//! Everything here operates on the textual trace maps produced by
//! `dt_dex`: backward register tracing to recover invoke arguments,
//! forward scanning to enrich allocations, register-dependency slicing for
//! partial execution, and whole-method dependency enumeration.

pub mod backward;
pub mod callsites;
pub mod deps;
pub mod errors;
pub mod forward;
mod lines;

pub use crate::backward::{ArgInfo, ArgSource, MethodView};
pub use crate::callsites::ResolvedSite;
pub use crate::deps::{DependencyAnalyzer, MethodDependencies};
pub use crate::errors::{AnalysisError, AnalysisResult};
