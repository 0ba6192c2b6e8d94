//! Unified view over the dex containers of one archive.
//!
//! Multi-dex archives ship `classes.dex`, `classes2.dex`, … with disjoint
//! constant pools. The index concatenates the per-container string pools
//! behind per-container base offsets, collects every defined method under
//! its canonical signature, caches per-method trace maps, and enumerates
//! call sites by scanning the disassembly.

use crate::container::{AccessFlags, CodeItem, DexContainer, EncodedLit};
use crate::disas;
use crate::errors::{DexError, DexResult};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub use crate::disas::TraceMap;

/// A method defined in one of the containers.
#[derive(Debug, Clone)]
pub struct MethodSite {
    pub class: String,
    pub name: String,
    /// `(params)return` descriptor.
    pub descriptor: String,
    pub container: usize,
    pub access_flags: AccessFlags,
    /// `None` for abstract and native methods.
    pub code: Option<CodeItem>,
}

impl MethodSite {
    /// Canonical signature: `Lpkg/Cls;->name(II)I`.
    #[must_use]
    pub fn sig(&self) -> String {
        format!("{}->{}{}", self.class, self.name, self.descriptor)
    }

    #[inline]
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }
}

/// One `pc` in a caller at which a target method is invoked.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub caller: String,
    pub pc: usize,
    pub instr: String,
}

#[derive(Debug)]
pub struct DexIndex {
    containers: Vec<DexContainer>,
    string_bases: Vec<usize>,
    methods: Vec<MethodSite>,
    by_sig: HashMap<String, usize>,
    by_name: HashMap<String, Vec<usize>>,
    trace_cache: RwLock<HashMap<String, Arc<TraceMap>>>,
}

impl DexIndex {
    /// Builds the index from raw `classes*.dex` buffers.
    pub fn from_buffers(buffers: Vec<(String, Vec<u8>)>) -> DexResult<Self> {
        let mut containers = Vec::with_capacity(buffers.len());
        for (name, data) in buffers {
            log::debug!("parsing container {name} ({} bytes)", data.len());
            containers.push(DexContainer::parse(name, data)?);
        }
        Self::from_containers(containers)
    }

    pub(crate) fn from_containers(containers: Vec<DexContainer>) -> DexResult<Self> {
        let mut string_bases = Vec::with_capacity(containers.len());
        let mut base = 0;
        for container in &containers {
            string_bases.push(base);
            base += container.strings_count();
        }

        let mut methods = Vec::new();
        let mut by_sig = HashMap::new();
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (ci, container) in containers.iter().enumerate() {
            for class_def in container.iter_class_defs() {
                if class_def.class_data_off == 0 {
                    continue;
                }
                let class_data = container.class_data(class_def.class_data_off)?;
                for encoded in class_data
                    .direct_methods
                    .iter()
                    .chain(class_data.virtual_methods.iter())
                {
                    let id = container.method_id(encoded.method_idx)?;
                    let proto_descriptor = container.method_sig(encoded.method_idx)?;
                    let descriptor = proto_descriptor
                        .split_once("->")
                        .and_then(|(_, rest)| rest.find('(').map(|i| rest[i..].to_string()))
                        .ok_or_else(|| {
                            DexError::Structure(format!("bad method id {proto_descriptor}"))
                        })?;
                    let code = if encoded.code_off == 0 {
                        None
                    } else {
                        Some(container.code_item(encoded.code_off)?)
                    };
                    let site = MethodSite {
                        class: id.class.clone(),
                        name: id.name.clone(),
                        descriptor,
                        container: ci,
                        access_flags: encoded.access_flags,
                        code,
                    };
                    let sig = site.sig();
                    let name_key = format!("{}->{}", site.class, site.name);
                    let idx = methods.len();
                    if by_sig.insert(sig.clone(), idx).is_some() {
                        log::warn!("method '{sig}' defined in more than one container");
                    }
                    by_name.entry(name_key).or_default().push(idx);
                    methods.push(site);
                }
            }
        }
        log::info!(
            "indexed {} containers, {} strings, {} methods",
            containers.len(),
            base,
            methods.len()
        );

        Ok(Self {
            containers,
            string_bases,
            methods,
            by_sig,
            by_name,
            trace_cache: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    #[must_use]
    pub fn containers_count(&self) -> usize {
        self.containers.len()
    }

    pub fn container(&self, idx: usize) -> DexResult<&DexContainer> {
        self.containers
            .get(idx)
            .ok_or_else(|| DexError::ResNotFound(format!("container {idx}")))
    }

    /// Translates a per-container string index to the unified pool index.
    pub fn global_string_index(&self, container: usize, local: usize) -> DexResult<usize> {
        let base = self
            .string_bases
            .get(container)
            .ok_or_else(|| DexError::ResNotFound(format!("container {container}")))?;
        Ok(base + local)
    }

    /// Looks a string up in the unified pool.
    pub fn string(&self, global: usize) -> DexResult<&str> {
        let slot = match self.string_bases.binary_search(&global) {
            Ok(i) => i,
            Err(0) => return Err(DexError::StringNotFound(global)),
            Err(i) => i - 1,
        };
        self.containers[slot].string(global - self.string_bases[slot])
    }

    #[inline]
    pub fn iter_methods(&self) -> impl Iterator<Item = &MethodSite> {
        self.methods.iter()
    }

    /// Looks a method up by canonical signature (`Lpkg/Cls;->name(II)I`).
    #[must_use]
    pub fn method(&self, sig: &str) -> Option<&MethodSite> {
        self.by_sig.get(sig).map(|&i| &self.methods[i])
    }

    /// Looks a method up by class and name only.
    ///
    /// Ambiguous when the method is overloaded; the first definition wins
    /// and a warning is logged. Callers that have a trace line should prefer
    /// [`Self::method_by_trace`].
    #[must_use]
    pub fn find_method(&self, class: &str, name: &str) -> Option<&MethodSite> {
        let candidates = self.by_name.get(&format!("{class}->{name}"))?;
        if candidates.len() > 1 {
            log::warn!(
                "method {class}->{name} is overloaded ({} definitions), taking the first",
                candidates.len()
            );
        }
        candidates.first().map(|&i| &self.methods[i])
    }

    /// Extracts the `Lpkg/Cls;->name(params)ret` reference from a trace
    /// line and resolves it against the method table.
    ///
    /// The trace form is the authoritative key: it is a pure byte-to-text
    /// rendering on both the producing and the consuming side, so it
    /// survives identifiers that do not round-trip through signature
    /// normalization.
    #[must_use]
    pub fn method_by_trace(&self, trace: &str) -> Option<&MethodSite> {
        let (class, name, descriptor) = split_method_ref(trace)?;
        self.method(&format!("{class}->{name}{descriptor}"))
            .or_else(|| self.find_method(class, name))
    }

    /// Resolves a method pool index of a given container to a defined
    /// method, when the referenced method has a body in the archive.
    #[must_use]
    pub fn method_by_pool_idx(&self, container: usize, method_idx: usize) -> Option<&MethodSite> {
        let sig = self.containers.get(container)?.method_sig(method_idx).ok()?;
        self.method(&sig)
    }

    /// Returns the (cached) trace map of a method.
    pub fn trace_map(&self, site: &MethodSite) -> DexResult<Arc<TraceMap>> {
        let sig = site.sig();
        if let Some(map) = self.trace_cache.read().unwrap().get(&sig) {
            return Ok(Arc::clone(map));
        }
        let code = site
            .code
            .as_ref()
            .ok_or_else(|| DexError::MethodNotFound(format!("{sig} has no code")))?;
        let base = self.string_bases[site.container];
        let map = Arc::new(disas::build_trace_map(
            &self.containers[site.container],
            base,
            &code.insns,
        )?);
        self.trace_cache
            .write()
            .unwrap()
            .insert(sig, Arc::clone(&map));
        Ok(map)
    }

    /// Finds every call site of `class->name` by scanning the disassembly
    /// of all defined methods.
    pub fn call_sites(&self, class: &str, name: &str) -> DexResult<Vec<CallSite>> {
        let needle = format!("{class}->{name}(");
        let mut sites = Vec::new();
        for site in self.methods.iter().filter(|m| m.code.is_some()) {
            let trace = self.trace_map(site)?;
            for (pc, (text, _)) in trace.iter() {
                if text.starts_with("invoke") && text.contains(&needle) {
                    sites.push(CallSite {
                        caller: site.sig(),
                        pc: *pc,
                        instr: text.clone(),
                    });
                }
            }
        }
        sites.sort_by(|a, b| (&a.caller, a.pc).cmp(&(&b.caller, b.pc)));
        Ok(sites)
    }

    /// Returns whether any container defines the class.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.containers
            .iter()
            .any(|c| c.class_def(class).is_some())
    }

    /// Returns the class-definition `static_values` literals, paired with
    /// their field names in declaration order, together with the container
    /// the class is defined in (string and type indices in the literals
    /// are local to that container).
    pub fn static_values(&self, class: &str) -> DexResult<(usize, Vec<(String, EncodedLit)>)> {
        for (ci, container) in self.containers.iter().enumerate() {
            let Some(class_def) = container.class_def(class) else {
                continue;
            };
            if class_def.static_values_off == 0 || class_def.class_data_off == 0 {
                return Ok((ci, Vec::new()));
            }
            let class_data = container.class_data(class_def.class_data_off)?;
            let values = container.encoded_array(class_def.static_values_off)?;
            let mut out = Vec::with_capacity(values.len());
            for (field, value) in class_data.static_fields.iter().zip(values) {
                let name = container.field_id(field.field_idx)?.name.clone();
                out.push((name, value));
            }
            return Ok((ci, out));
        }
        Err(DexError::ClassNotFound(class.to_string()))
    }
}

/// Splits a `Lpkg/Cls;->name(params)ret` reference out of a trace line.
///
/// Returns `(class, name, descriptor)` where `descriptor` is the
/// `(params)ret` tail.
#[must_use]
pub fn split_method_ref(trace: &str) -> Option<(&str, &str, &str)> {
    let arrow = trace.find(";->")?;
    let class_start = trace[..arrow].rfind(|c: char| {
        c.is_whitespace() || c == ',' || c == '{' || c == '}'
    });
    let class_start = class_start.map_or(0, |i| i + 1);
    let class = &trace[class_start..=arrow];
    if !class.starts_with('L') && !class.starts_with('[') {
        return None;
    }
    let rest = &trace[arrow + 3..];
    let paren = rest.find('(')?;
    let name = &rest[..paren];
    let close = rest.find(')')?;
    let end = rest[close + 1..]
        .find(|c: char| c.is_whitespace() || c == ',')
        .map_or(rest.len(), |i| close + 1 + i);
    Some((class, name, &rest[paren..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FieldId, MethodId, Proto};

    fn container_with(
        name: &str,
        strings: Vec<&str>,
        methods: Vec<MethodId>,
        protos: Vec<Proto>,
    ) -> DexContainer {
        DexContainer {
            name: name.to_string(),
            data: Vec::new(),
            strings: strings.into_iter().map(String::from).collect(),
            types: vec!["I".to_string(), "LT;".to_string()],
            protos,
            fields: vec![FieldId {
                class: "LT;".to_string(),
                name: "sKey".to_string(),
                type_desc: "I".to_string(),
            }],
            methods,
            class_defs: Vec::new(),
        }
    }

    fn two_container_index() -> DexIndex {
        let proto = Proto {
            return_type: "I".to_string(),
            params: vec!["I".to_string(), "I".to_string()],
        };
        let c1 = container_with(
            "classes.dex",
            vec!["alpha", "beta"],
            vec![MethodId {
                class: "LT;".to_string(),
                name: "add".to_string(),
                proto: 0,
            }],
            vec![proto.clone()],
        );
        let c2 = container_with(
            "classes2.dex",
            vec!["gamma"],
            vec![MethodId {
                class: "LU;".to_string(),
                name: "sub".to_string(),
                proto: 0,
            }],
            vec![proto],
        );
        DexIndex::from_containers(vec![c1, c2]).unwrap()
    }

    #[test]
    fn unified_string_pool() {
        let index = two_container_index();
        assert_eq!(index.string(0).unwrap(), "alpha");
        assert_eq!(index.string(1).unwrap(), "beta");
        assert_eq!(index.string(2).unwrap(), "gamma");
        assert!(index.string(3).is_err());
        assert_eq!(index.global_string_index(1, 0).unwrap(), 2);
    }

    #[test]
    fn split_method_ref_forms() {
        assert_eq!(
            split_method_ref("invoke-static {v0, v1}, LT;->add(II)I"),
            Some(("LT;", "add", "(II)I"))
        );
        assert_eq!(
            split_method_ref("invoke-virtual {v3}, Lcom/a/B$C;->decrypt(Ljava/lang/String;)Ljava/lang/String;"),
            Some(("Lcom/a/B$C;", "decrypt", "(Ljava/lang/String;)Ljava/lang/String;"))
        );
        assert_eq!(split_method_ref("const/4 v0, 5"), None);
    }

    #[test]
    fn method_site_lookup() {
        let proto = Proto {
            return_type: "I".to_string(),
            params: vec!["I".to_string(), "I".to_string()],
        };
        let container = container_with(
            "classes.dex",
            vec![],
            vec![MethodId {
                class: "LT;".to_string(),
                name: "add".to_string(),
                proto: 0,
            }],
            vec![proto],
        );
        let mut index = DexIndex::from_containers(vec![container]).unwrap();
        // from_containers found no class defs, so register the site by hand
        index.methods.push(MethodSite {
            class: "LT;".to_string(),
            name: "add".to_string(),
            descriptor: "(II)I".to_string(),
            container: 0,
            access_flags: AccessFlags::PUBLIC | AccessFlags::STATIC,
            code: Some(CodeItem {
                registers_size: 3,
                ins_size: 2,
                insns: vec![0x90, 0x00, 0x01, 0x02, 0x0f, 0x00],
            }),
        });
        index.by_sig.insert("LT;->add(II)I".to_string(), 0);
        index
            .by_name
            .insert("LT;->add".to_string(), vec![0]);

        let site = index.method("LT;->add(II)I").unwrap();
        assert!(site.is_static());
        assert_eq!(index.find_method("LT;", "add").unwrap().sig(), site.sig());
        assert!(index
            .method_by_trace("invoke-static {v0, v1}, LT;->add(II)I")
            .is_some());

        let trace = index.trace_map(site).unwrap();
        assert_eq!(trace[&0].0, "add-int v0, v1, v2");
        assert_eq!(trace[&4].0, "return v0");
    }
}
