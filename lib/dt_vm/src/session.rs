//! The emulation session.
//!
//! All state that outlives one frame lives here: the static-field store,
//! the set of classes whose `<clinit>` already ran, and the mock
//! configuration. Independent emulations either call [`Session::reset`] or
//! simply start from a fresh session; nothing is process-wide.

use crate::store::StaticFieldStore;
use std::collections::HashSet;

/// Values the mock layer hands out for the app-identity surface.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Returned by `Context.getPackageName()` and `PackageInfo.packageName`.
    pub package_name: String,
    /// Payload of `Signature.toByteArray()`; hex of it for `toCharsString()`.
    pub signature_bytes: Vec<u8>,
    /// Value of `Build.VERSION.SDK_INT`.
    pub sdk_int: i32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            package_name: "com.example.app".to_string(),
            signature_bytes: [0xab, 0xcd].repeat(128),
            sdk_int: 30,
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    pub statics: StaticFieldStore,
    pub initialized: HashSet<String>,
    pub config: MockConfig,
}

impl Session {
    #[must_use]
    pub fn new(config: MockConfig) -> Self {
        Self {
            statics: StaticFieldStore::new(),
            initialized: HashSet::new(),
            config,
        }
    }

    /// Drops all per-emulation state, keeping the configuration.
    pub fn reset(&mut self) {
        self.statics.reset();
        self.initialized.clear();
    }
}
