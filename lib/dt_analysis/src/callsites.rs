//! Call-site argument recovery.
//!
//! Static backward tracing first; when some arguments stay unresolved, the
//! caller is partially executed over the register-dependency slice and the
//! argument registers are read back. Context-typed parameters of the
//! caller (and of the target) are filled with mock instances so identity
//! lookups keep working.

use crate::backward::{self, ArgInfo, MethodView};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::forward;
use crate::lines;
use dt_dex::{CallSite, DexIndex, MethodSite};
use dt_vm::interp::Frame;
use dt_vm::mocks::factories;
use dt_vm::value::Value;
use dt_vm::{Session, Vm};

// Bail out of noisy slices instead of flooding the log.
const MAX_LOGGED_ERRORS: usize = 5;

/// A call site with its recovered arguments.
#[derive(Debug)]
pub struct ResolvedSite {
    pub caller: String,
    pub pc: usize,
    pub instr: String,
    /// Per-register reconstruction detail, parallel to `values`.
    pub args: Vec<ArgInfo>,
    /// Best-effort concrete argument values.
    pub values: Vec<Value>,
}

/// Enumerates the call sites of `class->name`, capped at `limit` when
/// nonzero.
pub fn find_call_sites(
    index: &DexIndex,
    class: &str,
    name: &str,
    limit: usize,
) -> AnalysisResult<Vec<CallSite>> {
    let mut sites = index.call_sites(class, name)?;
    if limit > 0 {
        sites.truncate(limit);
    }
    Ok(sites)
}

/// Recovers the arguments of one call site.
///
/// The session is reset first: argument recovery runs the caller's class
/// initializer and possibly slices of the caller itself, and none of that
/// may leak into the target emulation that follows.
pub fn recover_args(
    index: &DexIndex,
    session_template: &dt_vm::MockConfig,
    site: &CallSite,
) -> AnalysisResult<ResolvedSite> {
    let caller = index
        .method(&site.caller)
        .ok_or_else(|| AnalysisError::MethodNotFound(site.caller.clone()))?;
    let code = caller
        .code
        .as_ref()
        .ok_or_else(|| AnalysisError::NoCode(site.caller.clone()))?;
    let trace = index.trace_map(caller)?;
    let view = MethodView {
        trace: &trace,
        bytecode: &code.insns,
        regs_size: code.registers_size,
        ins_size: code.ins_size,
    };

    let mut vm = Vm::new(index, Session::new(session_template.clone()));
    vm.run_clinit(&caller.class)?;

    let args = backward::extract_args(&view, site.pc, &mut vm);
    let values = if args.iter().all(|a| a.resolved) {
        args.iter()
            .map(|a| a.value.clone().unwrap_or(Value::Null))
            .collect()
    } else {
        log::info!(
            "{} @ pc {}: {} of {} arguments unresolved statically, executing the slice",
            site.caller,
            site.pc,
            args.iter().filter(|a| !a.resolved).count(),
            args.len()
        );
        resolve_args_by_execution(&mut vm, caller, &view, site.pc, &args)
    };

    Ok(ResolvedSite {
        caller: site.caller.clone(),
        pc: site.pc,
        instr: site.instr.clone(),
        args,
        values,
    })
}

/// Executes only the instructions the arguments depend on, then reads the
/// argument registers out of the caller frame.
pub fn resolve_args_by_execution(
    vm: &mut Vm,
    caller: &MethodSite,
    view: &MethodView,
    call_pc: usize,
    arg_infos: &[ArgInfo],
) -> Vec<Value> {
    let invoke_line = view.line(call_pc).to_string();
    let arg_regs = lines::invoke_arg_regs(&invoke_line);
    let deps = forward::register_dependencies(view, call_pc, &arg_regs);
    log::debug!(
        "executing {} of {} instructions before pc {call_pc}",
        deps.len(),
        view.trace.range(..call_pc).count()
    );

    let mut frame = Frame::new(
        caller.sig(),
        caller.container,
        view.bytecode.to_vec(),
        std::sync::Arc::new(view.trace.clone()),
        view.regs_size,
        view.ins_size,
    );
    inject_param_mocks(vm, caller, view, &mut frame);

    let mut errors = 0;
    for &dep_pc in deps.iter().take_while(|&&pc| pc < call_pc) {
        frame.pc = dep_pc;
        if let Err(err) = vm.step(&mut frame) {
            errors += 1;
            if errors <= MAX_LOGGED_ERRORS {
                // likely dead or obfuscated code on an unreached path
                log::warn!("skipping pc {dep_pc}: {err}");
            }
        }
    }
    if errors > MAX_LOGGED_ERRORS {
        log::warn!("{} further slice errors suppressed", errors - MAX_LOGGED_ERRORS);
    }

    // parameter descriptors of the target, for mock injection of still
    // unresolved arguments; instance invokes carry the receiver in slot 0
    let target_params = descriptor_params(&invoke_line);
    let receiver_slots = usize::from(!invoke_line.starts_with("invoke-static"));

    arg_regs
        .iter()
        .enumerate()
        .map(|(i, &reg)| {
            match frame.reg(reg as usize) {
                Ok(value) if !value.is_null() => value.clone(),
                _ => match arg_infos.get(i).and_then(|a| a.value.clone()) {
                    Some(value) => value,
                    None => {
                        let ty = i
                            .checked_sub(receiver_slots)
                            .and_then(|p| target_params.get(p))
                            .map(String::as_str);
                        default_for_param(vm, ty)
                    }
                },
            }
        })
        .collect()
}

// Context-typed caller parameters get mock instances before the slice
// runs, the way a real activity would have handed them in.
fn inject_param_mocks(vm: &Vm, caller: &MethodSite, view: &MethodView, frame: &mut Frame) {
    let param_types = descriptor_params(&caller.descriptor);
    let mut reg = view.regs_size - view.ins_size;
    if !caller.is_static() {
        // the receiver occupies the first slot of the parameter window
        reg += 1;
    }
    for ty in param_types {
        let wide = ty == "J" || ty == "D";
        if factories::is_mock_class(&ty) {
            if let Some(mock) = factories::mock_for_class(&ty, &vm.session.config) {
                log::info!("mock injected for caller parameter {ty} (v{reg})");
                let _ = frame.set_reg(reg, mock);
            }
        }
        reg += if wide { 2 } else { 1 };
    }
}

fn default_for_param(vm: &Vm, param_type: Option<&str>) -> Value {
    match param_type {
        Some(ty) if factories::is_mock_class(ty) => {
            factories::mock_for_class(ty, &vm.session.config).unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

/// Parameter descriptors of the `(params)ret` part of a method reference
/// or descriptor.
#[must_use]
pub fn descriptor_params(reference: &str) -> Vec<String> {
    let Some(open) = reference.find('(') else {
        return Vec::new();
    };
    let Some(close) = reference[open..].find(')') else {
        return Vec::new();
    };
    let inner = &reference[open + 1..open + close];
    let bytes = inner.as_bytes();
    let mut params = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        // array prefixes ride with their element type
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        if bytes[i] == b'L' {
            match inner[i..].find(';') {
                Some(semi) => i += semi + 1,
                None => break,
            }
        } else {
            i += 1;
        }
        params.push(inner[start..i].to_string());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_param_splitting() {
        assert_eq!(descriptor_params("(II)I"), vec!["I", "I"]);
        assert_eq!(
            descriptor_params("(Ljava/lang/String;I[B)V"),
            vec!["Ljava/lang/String;", "I", "[B"]
        );
        assert_eq!(
            descriptor_params("([[I[Ljava/lang/String;JD)V"),
            vec!["[[I", "[Ljava/lang/String;", "J", "D"]
        );
        assert_eq!(descriptor_params("()V"), Vec::<String>::new());
        assert_eq!(
            descriptor_params("invoke-static {v0}, LT;->f(Landroid/content/Context;)I"),
            vec!["Landroid/content/Context;"]
        );
    }
}
