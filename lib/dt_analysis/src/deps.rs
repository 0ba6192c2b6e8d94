//! Whole-method dependency enumeration.
//!
//! One pass over a method's trace map yields the static fields it touches,
//! the classes whose `<clinit>` must run before it, and the methods it
//! calls; the transitive closure follows callees that have bodies in the
//! index, bounded by a seen-set and a depth limit.

use crate::errors::AnalysisResult;
use dt_dex::index::split_method_ref;
use dt_dex::{DexIndex, MethodSite};
use dt_vm::store::field_from_trace;
use std::collections::{BTreeSet, HashSet};

const MAX_RECURSION_DEPTH: usize = 3;

/// Dependencies discovered for a method.
#[derive(Debug, Default, Clone)]
pub struct MethodDependencies {
    /// `LClass;->field` references read or written.
    pub static_fields: BTreeSet<String>,
    /// Classes that must be initialized before execution.
    pub classes_needing_init: BTreeSet<String>,
    /// `LClass;->name` references invoked.
    pub methods_called: BTreeSet<String>,
}

impl MethodDependencies {
    pub fn merge(&mut self, other: MethodDependencies) {
        self.static_fields.extend(other.static_fields);
        self.classes_needing_init.extend(other.classes_needing_init);
        self.methods_called.extend(other.methods_called);
    }
}

/// Enumerates dependencies without executing anything.
pub struct DependencyAnalyzer<'a> {
    index: &'a DexIndex,
    seen: HashSet<String>,
}

impl<'a> DependencyAnalyzer<'a> {
    #[must_use]
    pub fn new(index: &'a DexIndex) -> Self {
        Self {
            index,
            seen: HashSet::new(),
        }
    }

    pub fn analyze_method(
        &mut self,
        site: &MethodSite,
        recursive: bool,
    ) -> AnalysisResult<MethodDependencies> {
        self.analyze_at(site, recursive, 0)
    }

    fn analyze_at(
        &mut self,
        site: &MethodSite,
        recursive: bool,
        depth: usize,
    ) -> AnalysisResult<MethodDependencies> {
        let mut deps = MethodDependencies::default();
        let sig = site.sig();
        if !self.seen.insert(sig) {
            return Ok(deps);
        }
        if site.code.is_none() {
            return Ok(deps);
        }

        deps.classes_needing_init.insert(site.class.clone());

        let trace = self.index.trace_map(site)?;
        for (_, (line, _)) in trace.iter() {
            scan_line(line, &mut deps);
        }

        if recursive && depth < MAX_RECURSION_DEPTH {
            for called in deps.methods_called.clone() {
                let Some((class, name)) = called.split_once("->") else {
                    continue;
                };
                if let Some(callee) = self.index.find_method(class, name) {
                    let child = self.analyze_at(callee, recursive, depth + 1)?;
                    deps.merge(child);
                }
            }
        }

        Ok(deps)
    }
}

fn scan_line(line: &str, deps: &mut MethodDependencies) {
    if line.starts_with("sget") || line.starts_with("sput") {
        if let Some((class, field)) = field_from_trace(line) {
            deps.static_fields.insert(format!("{class}->{field}"));
            deps.classes_needing_init.insert(class.to_string());
        }
    } else if line.starts_with("invoke") {
        if let Some((class, name, _)) = split_method_ref(line) {
            deps.methods_called.insert(format!("{class}->{name}"));
            deps.classes_needing_init.insert(class.to_string());
        }
    } else if line.starts_with("new-instance") {
        if let Some(class) = line.rsplit(", ").next() {
            if class.starts_with('L') && class.ends_with(';') {
                deps.classes_needing_init.insert(class.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_scanning() {
        let mut deps = MethodDependencies::default();
        scan_line("sget v0, LT;->sKey:I", &mut deps);
        scan_line("invoke-static {v0}, LU;->dec(I)Ljava/lang/String;", &mut deps);
        scan_line("new-instance v1, Ljava/lang/StringBuilder;", &mut deps);
        assert!(deps.static_fields.contains("LT;->sKey"));
        assert!(deps.methods_called.contains("LU;->dec"));
        assert!(deps.classes_needing_init.contains("LT;"));
        assert!(deps.classes_needing_init.contains("LU;"));
        assert!(deps
            .classes_needing_init
            .contains("Ljava/lang/StringBuilder;"));
    }

    #[test]
    fn merge_is_union() {
        let mut a = MethodDependencies::default();
        a.static_fields.insert("LT;->a".to_string());
        let mut b = MethodDependencies::default();
        b.static_fields.insert("LT;->b".to_string());
        b.methods_called.insert("LT;->m".to_string());
        a.merge(b);
        assert_eq!(a.static_fields.len(), 2);
        assert_eq!(a.methods_called.len(), 1);
    }
}
