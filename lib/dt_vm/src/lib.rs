//! Register-based Dalvik bytecode interpreter with a mocked Android runtime.
//!
//! The interpreter executes one method per [`Frame`](interp::Frame) under a
//! [`Vm`](interp::Vm) that owns the emulation [`Session`](session::Session)
//! (static fields, initialized classes, mock configuration) and the
//! [hook registries](mocks). Framework and `java.*` calls the archive does
//! not define are served by the mock layer; everything else is resolved
//! through the dex index and run in a nested frame.

pub mod errors;
pub mod interp;
pub mod loader;
pub mod mocks;
pub mod opcodes;
pub mod session;
pub mod store;
pub mod value;

#[cfg(test)]
pub(crate) mod testdex;

pub use crate::errors::{VmError, VmResult};
pub use crate::interp::{Frame, Vm};
pub use crate::session::{MockConfig, Session};
pub use crate::value::{format_value, ArrayObj, HostValue, Instance, Value};
