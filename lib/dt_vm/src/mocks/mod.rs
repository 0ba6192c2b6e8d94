//! Mocked Android framework and Java runtime surface.
//!
//! Four registries back the invoke dispatch: static-method hooks,
//! virtual-method hooks (also consulted for interface and super calls),
//! constructor hooks for `invoke-direct`, and static-field overrides.
//! Factories produce pre-shaped instances of the well-known framework
//! classes. Unknown inputs return neutral defaults so that execution keeps
//! progressing on incomplete coverage.

pub mod context;
pub mod dispatch;
pub mod factories;
pub mod reflection;
pub mod util;

pub use dispatch::{HookFn, HookRegistry};
