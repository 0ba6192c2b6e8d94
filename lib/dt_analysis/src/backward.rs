//! Backward register tracing.
//!
//! Walks a method's trace map in decreasing pc order from an invoke site
//! to reconstruct the value each argument register holds at that site.
//! Moves chain to their source, const families resolve immediately, static
//! fields consult the session store, invoke results fold through bounded
//! re-execution, and allocations hand off to the forward analyzer.

use crate::forward;
use crate::lines;
use dt_dex::TraceMap;
use dt_vm::value::Value;
use dt_vm::Vm;

/// Upper bound on invoke-result sub-resolution re-entry.
pub const MAX_RESOLVE_DEPTH: usize = 4;

/// Where a traced register got its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSource {
    Const,
    ConstString,
    MoveChain,
    StaticField,
    InvokeResult,
    Parameter,
    Allocation,
    Unknown,
}

/// The reconstruction result for one argument register.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub register: u16,
    pub value: Option<Value>,
    pub source: ArgSource,
    pub detail: String,
    pub resolved: bool,
}

impl ArgInfo {
    fn unresolved(register: u16, source: ArgSource, detail: impl Into<String>) -> Self {
        Self {
            register,
            value: None,
            source,
            detail: detail.into(),
            resolved: false,
        }
    }

    fn resolved(register: u16, source: ArgSource, detail: impl Into<String>, value: Value) -> Self {
        Self {
            register,
            value: Some(value),
            source,
            detail: detail.into(),
            resolved: true,
        }
    }
}

/// A borrowed view of one method body, shared by the analyzers.
#[derive(Debug, Clone, Copy)]
pub struct MethodView<'a> {
    pub trace: &'a TraceMap,
    pub bytecode: &'a [u8],
    pub regs_size: usize,
    pub ins_size: usize,
}

impl<'a> MethodView<'a> {
    #[must_use]
    pub fn line(&self, pc: usize) -> &'a str {
        self.trace.get(&pc).map_or("", |(text, _)| text.as_str())
    }

    /// Whether `reg` is one of the incoming parameter slots.
    #[must_use]
    pub fn is_param_reg(&self, reg: u16) -> bool {
        (reg as usize) >= self.regs_size.saturating_sub(self.ins_size)
    }

    #[must_use]
    pub fn param_index(&self, reg: u16) -> usize {
        (reg as usize).saturating_sub(self.regs_size - self.ins_size)
    }
}

/// Reconstructs the arguments of the invoke at `call_pc`.
pub fn extract_args(view: &MethodView, call_pc: usize, vm: &mut Vm) -> Vec<ArgInfo> {
    let line = view.line(call_pc);
    lines::invoke_arg_regs(line)
        .into_iter()
        .map(|reg| trace_register(view, call_pc, reg, vm, 0))
        .collect()
}

/// Reconstructs the value `reg` holds at `pc` by scanning backwards for
/// its producing instruction.
pub fn trace_register(
    view: &MethodView,
    pc: usize,
    reg: u16,
    vm: &mut Vm,
    depth: usize,
) -> ArgInfo {
    for (&write_pc, (line, _)) in view.trace.range(..pc).rev() {
        if lines::written_reg(line) != Some(reg) {
            continue;
        }
        let m = lines::mnemonic(line);

        // the register keeps its value through a cast; the producer is
        // further up
        if m == "check-cast" {
            continue;
        }
        if m == "const-string" || m == "const-string/jumbo" {
            return resolve_const_string(reg, line, vm);
        }
        if m == "const-class" {
            let desc = lines::last_operand(line).unwrap_or("?").to_string();
            return ArgInfo::resolved(reg, ArgSource::Const, desc.clone(), Value::Class(desc));
        }
        if m.starts_with("const") {
            return match lines::literal(line) {
                Some(v) if m.contains("wide") => {
                    ArgInfo::resolved(reg, ArgSource::Const, v.to_string(), Value::Long(v))
                }
                Some(v) => {
                    ArgInfo::resolved(reg, ArgSource::Const, v.to_string(), Value::Int(v as i32))
                }
                None => ArgInfo::unresolved(reg, ArgSource::Const, line),
            };
        }
        if m.starts_with("move-result") {
            return resolve_invoke_result(view, write_pc, reg, vm, depth);
        }
        if m.starts_with("move") {
            // chase the chain into the source register, earlier in the body
            let regs = lines::all_regs(line);
            return match regs.get(1) {
                Some(&src) => {
                    let mut info = trace_register(view, write_pc, src, vm, depth);
                    info.register = reg;
                    if info.resolved && info.source == ArgSource::Const {
                        info.source = ArgSource::MoveChain;
                    }
                    info
                }
                None => ArgInfo::unresolved(reg, ArgSource::MoveChain, line),
            };
        }
        if m.starts_with("sget") {
            return resolve_static_field(reg, line, vm);
        }
        if m == "new-instance" || m == "new-array" {
            let detail = lines::last_operand(line).unwrap_or("?").to_string();
            return match forward::enrich_allocation(view, write_pc, reg, vm) {
                Some(value) => ArgInfo::resolved(reg, ArgSource::Allocation, detail, value),
                None => ArgInfo::unresolved(reg, ArgSource::Allocation, detail),
            };
        }

        // arithmetic, array or instance-field producers: leave them to the
        // execution fallback
        return ArgInfo::unresolved(reg, ArgSource::Unknown, m.to_string());
    }

    if view.is_param_reg(reg) {
        return ArgInfo::unresolved(
            reg,
            ArgSource::Parameter,
            format!("p{}", view.param_index(reg)),
        );
    }
    ArgInfo::unresolved(reg, ArgSource::Unknown, "no producing instruction")
}

fn resolve_const_string(reg: u16, line: &str, vm: &Vm) -> ArgInfo {
    // the pool index is authoritative; the quoted text is a fallback for
    // trace maps that were built without one
    if let (Some(global), Some(index)) = (lines::string_pool_index(line), vm.index()) {
        if let Ok(s) = index.string(global) {
            return ArgInfo::resolved(
                reg,
                ArgSource::ConstString,
                format!("string@{global}"),
                Value::string(s),
            );
        }
    }
    match lines::quoted_text(line) {
        Some(s) => ArgInfo::resolved(reg, ArgSource::ConstString, "quoted", Value::string(s)),
        None => ArgInfo::unresolved(reg, ArgSource::ConstString, line),
    }
}

fn resolve_static_field(reg: u16, line: &str, vm: &Vm) -> ArgInfo {
    let Some((class, field)) = dt_vm::store::field_from_trace(line) else {
        return ArgInfo::unresolved(reg, ArgSource::StaticField, line);
    };
    let detail = format!("{class}->{field}");
    if let Some(value) = vm.session.statics.get(class, field) {
        return ArgInfo::resolved(reg, ArgSource::StaticField, detail, value.clone());
    }
    if let Some(value) = vm.hooks.static_field(&detail) {
        return ArgInfo::resolved(reg, ArgSource::StaticField, detail, value);
    }
    ArgInfo::unresolved(reg, ArgSource::StaticField, detail)
}

// move-result*: find the producing invoke (or filled-new-array) right
// before it and fold it when its own inputs resolve.
fn resolve_invoke_result(
    view: &MethodView,
    move_pc: usize,
    reg: u16,
    vm: &mut Vm,
    depth: usize,
) -> ArgInfo {
    let Some((&inv_pc, (inv_line, _))) = view
        .trace
        .range(..move_pc)
        .rev()
        .find(|(_, (line, _))| {
            let m = lines::mnemonic(line);
            m.starts_with("invoke") || m.starts_with("filled-new-array")
        })
    else {
        return ArgInfo::unresolved(reg, ArgSource::InvokeResult, "no producing invoke");
    };
    let inv_line = inv_line.clone();
    let m = lines::mnemonic(&inv_line).to_string();
    let detail = inv_line
        .split(", ")
        .last()
        .unwrap_or(&inv_line)
        .split('(')
        .next()
        .unwrap_or("")
        .to_string();

    if depth >= MAX_RESOLVE_DEPTH {
        return ArgInfo::unresolved(reg, ArgSource::InvokeResult, detail);
    }

    let mut args = Vec::new();
    for arg_reg in lines::invoke_arg_regs(&inv_line) {
        let info = trace_register(view, inv_pc, arg_reg, vm, depth + 1);
        match info.value {
            Some(value) if info.resolved => args.push(value),
            _ => return ArgInfo::unresolved(reg, ArgSource::InvokeResult, detail),
        }
    }

    if m.starts_with("filled-new-array") {
        let elem = lines::last_operand(&inv_line)
            .and_then(|d| d.strip_prefix('['))
            .unwrap_or("I");
        let arr = dt_vm::value::ArrayObj {
            elem_type: elem.to_string(),
            data: args,
        };
        return ArgInfo::resolved(reg, ArgSource::Allocation, detail, Value::array(arr));
    }

    let is_static = m.starts_with("invoke-static");
    match vm.call_by_trace(is_static, &inv_line, &args) {
        Ok(Some(value)) => ArgInfo::resolved(reg, ArgSource::InvokeResult, detail, value),
        Ok(None) => ArgInfo::resolved(reg, ArgSource::InvokeResult, detail, Value::Null),
        Err(err) => {
            log::debug!("invoke-result fold failed for {detail}: {err}");
            ArgInfo::unresolved(reg, ArgSource::InvokeResult, detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_vm::{MockConfig, Session};

    fn view_of(trace: &TraceMap, regs_size: usize, ins_size: usize) -> MethodView<'_> {
        MethodView {
            trace,
            bytecode: &[],
            regs_size,
            ins_size,
        }
    }

    fn tm(entries: &[(usize, &str)]) -> TraceMap {
        entries
            .iter()
            .map(|(pc, line)| (*pc, ((*line).to_string(), 1)))
            .collect()
    }

    #[test]
    fn const_resolves_immediately() {
        let trace = tm(&[
            (0, "const/16 v0, 77"),
            (4, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 4, &mut vm);
        assert_eq!(args.len(), 1);
        assert!(args[0].resolved);
        assert_eq!(args[0].source, ArgSource::Const);
        assert_eq!(args[0].value.as_ref().unwrap().as_int(), 77);
    }

    #[test]
    fn intervening_write_shadows_earlier_const() {
        let trace = tm(&[
            (0, "const/16 v0, 1"),
            (4, "const/16 v0, 2"),
            (8, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 8, &mut vm);
        assert_eq!(args[0].value.as_ref().unwrap().as_int(), 2);
    }

    #[test]
    fn move_chain_resolves_to_origin() {
        let trace = tm(&[
            (0, "const/4 v3, 5"),
            (2, "move v1, v3"),
            (4, "invoke-static {v1}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 4, &mut vm);
        assert!(args[0].resolved);
        assert_eq!(args[0].source, ArgSource::MoveChain);
        assert_eq!(args[0].value.as_ref().unwrap().as_int(), 5);
        assert_eq!(args[0].register, 1);
    }

    #[test]
    fn const_string_falls_back_to_quoted_text() {
        let trace = tm(&[
            (0, "const-string v0, \"secret\" // string@9"),
            (4, "invoke-static {v0}, LT;->dec(Ljava/lang/String;)Ljava/lang/String;"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 4, &mut vm);
        assert!(args[0].resolved);
        assert_eq!(args[0].source, ArgSource::ConstString);
        assert_eq!(
            args[0].value.as_ref().unwrap().host_str().as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn static_field_resolves_through_the_store() {
        let trace = tm(&[
            (0, "sget v0, LT;->sKey:I"),
            (4, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);

        let args = extract_args(&view, 4, &mut vm);
        assert!(!args[0].resolved);
        assert_eq!(args[0].source, ArgSource::StaticField);

        vm.session.statics.set("LT;", "sKey", Value::Int(7));
        let args = extract_args(&view, 4, &mut vm);
        assert!(args[0].resolved);
        assert_eq!(args[0].value.as_ref().unwrap().as_int(), 7);
    }

    #[test]
    fn parameter_window_detection() {
        let trace = tm(&[(0, "invoke-static {v3, v0}, LT;->f(II)I")]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        // regs_size 4, ins_size 2: parameter window is v2..v3
        let view = view_of(&trace, 4, 2);
        let args = extract_args(&view, 0, &mut vm);
        assert_eq!(args[0].source, ArgSource::Parameter);
        assert_eq!(args[0].detail, "p1");
        assert_eq!(args[1].source, ArgSource::Unknown);
    }

    #[test]
    fn invoke_result_folds_through_hooks() {
        let trace = tm(&[
            (0, "const-string v1, \"21\" // string@0"),
            (4, "invoke-static {v1}, Ljava/lang/Integer;->parseInt(Ljava/lang/String;)I"),
            (10, "move-result v0"),
            (12, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 12, &mut vm);
        assert!(args[0].resolved);
        assert_eq!(args[0].source, ArgSource::InvokeResult);
        assert_eq!(args[0].value.as_ref().unwrap().as_int(), 21);
    }

    #[test]
    fn unresolvable_invoke_result_stays_unresolved() {
        let trace = tm(&[
            (0, "invoke-static {}, Lcom/app/Gone;->mystery()I"),
            (6, "move-result v0"),
            (8, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 8, &mut vm);
        assert!(!args[0].resolved);
        assert_eq!(args[0].source, ArgSource::InvokeResult);
    }

    #[test]
    fn filled_new_array_materializes_from_consts() {
        let trace = tm(&[
            (0, "const/4 v1, 1"),
            (2, "const/4 v2, 2"),
            (4, "filled-new-array {v1, v2}, [I"),
            (10, "move-result-object v0"),
            (12, "invoke-static {v0}, LT;->sum([I)I"),
        ]);
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let view = view_of(&trace, 4, 0);
        let args = extract_args(&view, 12, &mut vm);
        assert!(args[0].resolved);
        let Some(Value::Array(arr)) = &args[0].value else {
            panic!("expected an array");
        };
        let data: Vec<i32> = arr.borrow().data.iter().map(Value::as_int).collect();
        assert_eq!(data, vec![1, 2]);
    }
}
