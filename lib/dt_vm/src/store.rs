//! The static-field store.
//!
//! A session-wide mapping from `(class, field)` to values, shared by every
//! frame of one emulation so that mutations made by `<clinit>` or by an
//! earlier call are observed by later ones. Field opcodes address it
//! through the rendered field signature of their trace line.

use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StaticFieldStore {
    fields: HashMap<(String, String), Value>,
}

impl StaticFieldStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, class: &str, field: &str) -> Option<&Value> {
        self.fields.get(&(class.to_string(), field.to_string()))
    }

    pub fn set(&mut self, class: impl Into<String>, field: impl Into<String>, value: Value) {
        self.fields.insert((class.into(), field.into()), value);
    }

    #[must_use]
    pub fn has(&self, class: &str, field: &str) -> bool {
        self.fields
            .contains_key(&(class.to_string(), field.to_string()))
    }

    pub fn reset(&mut self) {
        self.fields.clear();
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(String, String), &Value)> {
        self.fields.iter()
    }
}

/// Extracts `(class, field)` from a rendered field access line such as
/// `sget v0, LT;->sKey:I` or `iput v0, v1, LT;->f:I`.
#[must_use]
pub fn field_from_trace(trace: &str) -> Option<(&str, &str)> {
    let arrow = trace.find(";->")?;
    let class_start = trace[..arrow]
        .rfind(|c: char| c.is_whitespace() || c == ',')
        .map_or(0, |i| i + 1);
    let class = &trace[class_start..=arrow];
    if !class.starts_with('L') {
        return None;
    }
    let rest = &trace[arrow + 3..];
    let end = rest
        .find(|c: char| c == ':' || c.is_whitespace() || c == ',')
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some((class, &rest[..end]))
}
