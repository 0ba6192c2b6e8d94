//! Lazy method resolution, `<clinit>` orchestration and nested execution.

use crate::errors::{VmError, VmResult};
use crate::interp::{Frame, Vm, CLINIT_STEP_LIMIT, MAX_CALL_DEPTH, NESTED_STEP_LIMIT};
use crate::opcodes::invoke::InvokeKind;
use crate::value::Value;
use dt_dex::container::EncodedLit;
use dt_dex::{MethodSite, TraceMap};
use std::sync::Arc;

// Classes that live in the Android runtime rather than the archive; their
// initializers cannot be found in the index and are served by mocks.
const EXTERNAL_PREFIXES: &[&str] = &[
    "Ljava/",
    "Ljavax/",
    "Landroid/",
    "Ldalvik/",
    "Lsun/",
    "Lorg/apache/",
    "Lorg/xml/",
    "Lorg/w3c/",
    "Lorg/json/",
    "Ljunit/",
];

/// Whether the class belongs to the framework or the Java runtime.
#[must_use]
pub fn is_external_class(class: &str) -> bool {
    EXTERNAL_PREFIXES.iter().any(|p| class.starts_with(p))
}

impl<'a> Vm<'a> {
    /// Looks a method up by class and name; ambiguous for overloads.
    #[must_use]
    pub fn find_method(&self, class: &str, name: &str) -> Option<&'a MethodSite> {
        self.index.and_then(|index| index.find_method(class, name))
    }

    /// Exact lookup through the disassembly key of an invoke line.
    #[must_use]
    pub fn find_method_by_trace(&self, trace: &str) -> Option<&'a MethodSite> {
        self.index.and_then(|index| index.method_by_trace(trace))
    }

    /// Runs the static initializer of `class` at most once per session.
    ///
    /// The class is marked initialized before `<clinit>` executes, which
    /// breaks initializer cycles: re-entry observes the partially
    /// initialized state instead of recursing.
    pub fn run_clinit(&mut self, class: &str) -> VmResult<()> {
        if self.session.initialized.contains(class) {
            return Ok(());
        }
        self.session.initialized.insert(class.to_string());
        if is_external_class(class) {
            return Ok(());
        }
        let Some(index) = self.index else {
            return Ok(());
        };

        self.load_static_values(class);

        let Some(site) = index.find_method(class, "<clinit>") else {
            return Ok(());
        };
        log::debug!("running <clinit> of {class}");
        match self.execute_site(site, Vec::new(), CLINIT_STEP_LIMIT) {
            Ok(_) => {}
            Err(err) => {
                // a broken initializer leaves the store partially filled;
                // later reads fall back to defaults
                log::warn!("<clinit> of {class} failed: {err}");
            }
        }
        Ok(())
    }

    // Class-definition static_values: initial field values encoded in the
    // class definition rather than assigned in <clinit>.
    fn load_static_values(&mut self, class: &str) {
        let Some(index) = self.index else {
            return;
        };
        if !index.has_class(class) {
            return;
        }
        let (container, values) = match index.static_values(class) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("static values of {class}: {err}");
                return;
            }
        };
        for (field, lit) in values {
            let value = self.lit_to_value(container, &lit);
            log::trace!("field init {class}->{field} = {value}");
            self.session.statics.set(class, field, value);
        }
    }

    fn lit_to_value(&self, container: usize, lit: &EncodedLit) -> Value {
        match lit {
            EncodedLit::Byte(v) => Value::Int(i32::from(*v)),
            EncodedLit::Short(v) => Value::Int(i32::from(*v)),
            EncodedLit::Char(v) => Value::Char(*v),
            EncodedLit::Int(v) => Value::Int(*v),
            EncodedLit::Long(v) => Value::Long(*v),
            EncodedLit::Float(v) => Value::Float(*v),
            EncodedLit::Double(v) => Value::Double(*v),
            EncodedLit::Str(idx) => match self.lookup_string(container, *idx) {
                Ok(s) => Value::string(s),
                Err(_) => Value::Null,
            },
            EncodedLit::Type(idx) => Value::Class(
                self.type_desc(container, *idx)
                    .unwrap_or_else(|| format!("type@{idx}")),
            ),
            EncodedLit::Null => Value::Null,
            EncodedLit::Bool(b) => Value::Bool(*b),
        }
    }

    /// Executes a method in a child frame and returns its result
    /// (`None` for void).
    pub fn execute_site(
        &mut self,
        site: &MethodSite,
        args: Vec<Value>,
        max_steps: usize,
    ) -> VmResult<Option<Value>> {
        let sig = site.sig();
        if self.depth >= MAX_CALL_DEPTH {
            return Err(VmError::CallDepthExceeded(sig));
        }
        let code = site
            .code
            .as_ref()
            .ok_or_else(|| VmError::MethodNotFound(format!("{sig} has no body")))?;
        let trace = match self.index {
            Some(index) => index.trace_map(site)?,
            None => Arc::new(TraceMap::new()),
        };
        let mut frame = Frame::new(
            sig,
            site.container,
            code.insns.clone(),
            trace,
            code.registers_size,
            code.ins_size,
        );
        frame.load_args(&args)?;

        self.depth += 1;
        let result = self.run(&mut frame, max_steps);
        self.depth -= 1;
        result
    }

    /// The invoke dispatch chain (see `opcodes::invoke`).
    pub(crate) fn dispatch_invoke(
        &mut self,
        kind: InvokeKind,
        container: usize,
        method_idx: usize,
        args: &[Value],
        trace: &str,
    ) -> VmResult<Option<Value>> {
        // 1. hook registries
        let hook = match kind {
            InvokeKind::Static => self.hooks.static_hook(trace),
            InvokeKind::Direct => self.hooks.direct_hook(trace),
            _ => self.hooks.virtual_hook(trace),
        };
        if let Some(hook) = hook {
            return hook(self, args, trace);
        }

        // 2. resolution through the index
        if let Some(index) = self.index {
            let site = index
                .method_by_trace(trace)
                .or_else(|| index.method_by_pool_idx(container, method_idx));
            if let Some(site) = site {
                if site.code.is_some() {
                    let owner = site.class.clone();
                    self.run_clinit(&owner)?;
                    return self.execute_site(site, args.to_vec(), NESTED_STEP_LIMIT);
                }
            }
        }

        // 3. constructor of an unmocked class: the receiver already exists
        // as a bare instance
        if trace.contains(";-><init>(") {
            return Ok(None);
        }

        // 4. mocks are expected to be incomplete
        log::warn!("no mock for {trace}");
        Ok(Some(Value::Null))
    }

    /// Resolves and calls a method from its trace line alone; used by the
    /// backward analyzer to fold invoke results.
    pub fn call_by_trace(
        &mut self,
        is_static: bool,
        trace: &str,
        args: &[Value],
    ) -> VmResult<Option<Value>> {
        let hook = if is_static {
            self.hooks.static_hook(trace)
        } else {
            self.hooks.virtual_hook(trace).or_else(|| self.hooks.direct_hook(trace))
        };
        if let Some(hook) = hook {
            return hook(self, args, trace);
        }
        let Some(site) = self.find_method_by_trace(trace) else {
            return Err(VmError::MethodNotFound(trace.to_string()));
        };
        let owner = site.class.clone();
        self.run_clinit(&owner)?;
        self.execute_site(site, args.to_vec(), NESTED_STEP_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::TOP_STEP_LIMIT;
    use crate::session::{MockConfig, Session};
    use crate::testdex::{TestClass, TestDex, TestMethod};
    use dt_dex::DexIndex;

    #[test]
    fn external_class_prefixes() {
        assert!(is_external_class("Ljava/lang/String;"));
        assert!(is_external_class("Landroid/util/Base64;"));
        assert!(!is_external_class("Lcom/example/Obf;"));
    }

    #[test]
    fn clinit_is_idempotent_without_index() {
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        vm.run_clinit("LT;").unwrap();
        assert!(vm.session.initialized.contains("LT;"));
        vm.run_clinit("LT;").unwrap();
        assert_eq!(
            vm.session.initialized.iter().filter(|c| *c == "LT;").count(),
            1
        );
    }

    // One class LT; with:
    //   static sKey:I
    //   static <clinit>()V  { sKey = 7; }
    //   static k()I         { return sKey; }
    //   static m()I         { return k(); }
    // plus LU; with sVal:I preset to 42 through static_values.
    fn sample_index() -> DexIndex {
        let strings = ["()I", "()V", "<clinit>", "I", "LT;", "LU;", "V", "k", "m", "sKey", "sVal"];
        let s = |name: &str| strings.iter().position(|x| *x == name).unwrap();
        let mut dex = TestDex {
            strings: strings.iter().map(|x| x.to_string()).collect(),
            ..TestDex::default()
        };
        dex.types = vec![s("I"), s("LT;"), s("LU;"), s("V")];
        // type indices: I=0, LT;=1, LU;=2, V=3
        dex.protos = vec![(s("I"), 0, vec![]), (s("V"), 3, vec![])];
        dex.fields = vec![(1, 0, s("sKey")), (2, 0, s("sVal"))];
        dex.methods = vec![
            (1, 1, s("<clinit>")),
            (1, 0, s("k")),
            (1, 0, s("m")),
        ];
        dex.classes = vec![
            TestClass {
                class_type: 1,
                static_fields: vec![0],
                direct: vec![
                    TestMethod {
                        method_idx: 0,
                        access: 0x1_0008, // constructor | static
                        regs: 1,
                        ins: 0,
                        code: vec![
                            0x13, 0x00, 0x07, 0x00, // const/16 v0, 7
                            0x67, 0x00, 0x00, 0x00, // sput v0, field@0
                            0x0e, 0x00, // return-void
                        ],
                    },
                    TestMethod {
                        method_idx: 1,
                        access: 0x9, // public static
                        regs: 1,
                        ins: 0,
                        code: vec![
                            0x60, 0x00, 0x00, 0x00, // sget v0, field@0
                            0x0f, 0x00, // return v0
                        ],
                    },
                    TestMethod {
                        method_idx: 2,
                        access: 0x9,
                        regs: 1,
                        ins: 0,
                        code: vec![
                            0x71, 0x00, 0x01, 0x00, 0x00, 0x00, // invoke-static {} k
                            0x0a, 0x00, // move-result v0
                            0x0f, 0x00, // return v0
                        ],
                    },
                ],
                virtual_: vec![],
                static_values: vec![],
            },
            TestClass {
                class_type: 2,
                static_fields: vec![1],
                direct: vec![],
                virtual_: vec![],
                // one entry: VALUE_INT, single byte, 42
                static_values: vec![0x01, 0x04, 0x2a],
            },
        ];
        DexIndex::from_buffers(vec![("classes.dex".to_string(), dex.build())]).unwrap()
    }

    #[test]
    fn clinit_runs_once_and_fills_the_store() {
        let index = sample_index();
        let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
        vm.run_clinit("LT;").unwrap();
        assert_eq!(vm.session.statics.get("LT;", "sKey").unwrap().as_int(), 7);

        // a second run must not re-execute <clinit>
        vm.session.statics.set("LT;", "sKey", crate::value::Value::Int(99));
        vm.run_clinit("LT;").unwrap();
        assert_eq!(vm.session.statics.get("LT;", "sKey").unwrap().as_int(), 99);
    }

    #[test]
    fn sget_triggers_clinit_on_demand() {
        let index = sample_index();
        let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
        let site = index.method("LT;->k()I").unwrap();
        let out = vm.execute_site(site, Vec::new(), TOP_STEP_LIMIT).unwrap();
        assert_eq!(out.unwrap().as_int(), 7);
        assert!(vm.session.initialized.contains("LT;"));
    }

    #[test]
    fn nested_invoke_through_the_index() {
        let index = sample_index();
        let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
        let site = index.method("LT;->m()I").unwrap();
        let out = vm.execute_site(site, Vec::new(), TOP_STEP_LIMIT).unwrap();
        assert_eq!(out.unwrap().as_int(), 7);
    }

    #[test]
    fn static_values_preload_the_store() {
        let index = sample_index();
        let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
        vm.run_clinit("LU;").unwrap();
        assert_eq!(vm.session.statics.get("LU;", "sVal").unwrap().as_int(), 42);
    }

    #[test]
    fn call_sites_found_by_scanning() {
        let index = sample_index();
        let sites = index.call_sites("LT;", "k").unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].caller, "LT;->m()I");
        assert_eq!(sites[0].pc, 0);
        assert!(sites[0].instr.contains("invoke-static"));
    }

    #[test]
    fn call_by_trace_folds_constants() {
        let index = sample_index();
        let mut vm = Vm::new(&index, Session::new(MockConfig::default()));
        let out = vm
            .call_by_trace(true, "invoke-static {}, LT;->k()I", &[])
            .unwrap();
        assert_eq!(out.unwrap().as_int(), 7);
    }
}
