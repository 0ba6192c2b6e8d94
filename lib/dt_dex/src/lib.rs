//! Android Dex data structures for the `DexTract` emulator.
//!
//! This crate parses the subset of the dex format the emulator consumes
//! (string, type, proto, field and method pools, class definitions and code
//! items), disassembles bytecode into per-method trace maps, and exposes a
//! unified [`DexIndex`] over the `classes*.dex` containers of an archive.

mod mutf8;

pub mod container;
pub mod disas;
pub mod errors;
pub mod index;
pub mod opcodes;

pub use crate::container::{AccessFlags, DexContainer, EncodedLit};
pub use crate::index::{CallSite, DexIndex, MethodSite, TraceMap};
