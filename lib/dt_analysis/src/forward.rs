//! Forward allocation enrichment and register-dependency slicing.
//!
//! The backward pass stops at an allocation; the value's contents come
//! from instructions after it (`<init>` calls, `fill-array-data`, field
//! stores). The forward scan collects those within the allocation's basic
//! block: it stops at the first unconditional control transfer, at a
//! reassignment of the register, or at the end of the method.

use crate::backward::{self, MethodView};
use crate::lines;
use dt_vm::value::{ArrayObj, Value};
use dt_vm::Vm;
use std::collections::BTreeSet;

fn block_exit(m: &str) -> bool {
    m.starts_with("goto") || m.starts_with("return") || m == "throw"
}

/// Produces a concrete value for the allocation at `alloc_pc`, or `None`
/// when its initialization cannot be reconstructed statically.
pub fn enrich_allocation(
    view: &MethodView,
    alloc_pc: usize,
    reg: u16,
    vm: &mut Vm,
) -> Option<Value> {
    let line = view.line(alloc_pc);
    match lines::mnemonic(line) {
        "new-array" => enrich_array(view, alloc_pc, reg, line),
        "new-instance" => enrich_instance(view, alloc_pc, reg, line, vm),
        _ => None,
    }
}

// new-array + fill-array-data: the payload carries both the length and
// the contents, so the size register never needs resolving.
fn enrich_array(view: &MethodView, alloc_pc: usize, reg: u16, alloc_line: &str) -> Option<Value> {
    let elem = lines::last_operand(alloc_line)?
        .strip_prefix('[')?
        .to_string();
    for (&pc, (line, _)) in view.trace.range(alloc_pc + 2..) {
        let m = lines::mnemonic(line);
        if m == "fill-array-data" && lines::all_regs(line).first() == Some(&reg) {
            return read_fill_payload(view, pc, &elem);
        }
        if lines::written_reg(line) == Some(reg) || block_exit(m) {
            return None;
        }
    }
    None
}

fn read_fill_payload(view: &MethodView, fill_pc: usize, elem: &str) -> Option<Value> {
    let code = view.bytecode;
    let off = i32::from_le_bytes(code.get(fill_pc + 2..fill_pc + 6)?.try_into().ok()?);
    let payload = (fill_pc as i64 + i64::from(off) * 2) as usize;
    let ident = u16::from_le_bytes(code.get(payload..payload + 2)?.try_into().ok()?);
    if ident != 0x0300 {
        return None;
    }
    let width = u16::from_le_bytes(code.get(payload + 2..payload + 4)?.try_into().ok()?) as usize;
    let size =
        u32::from_le_bytes(code.get(payload + 4..payload + 8)?.try_into().ok()?) as usize;
    let start = payload + 8;
    let mut data = Vec::with_capacity(size);
    for i in 0..size {
        let value = match width {
            1 => Value::Int(i32::from(*code.get(start + i)? as i8)),
            2 => {
                let raw = u16::from_le_bytes(code.get(start + i * 2..start + i * 2 + 2)?.try_into().ok()?);
                if elem == "C" {
                    Value::Int(i32::from(raw))
                } else {
                    Value::Int(i32::from(raw as i16))
                }
            }
            4 => {
                let raw =
                    u32::from_le_bytes(code.get(start + i * 4..start + i * 4 + 4)?.try_into().ok()?);
                if elem == "F" {
                    Value::Float(f32::from_bits(raw))
                } else {
                    Value::Int(raw as i32)
                }
            }
            8 => {
                let raw =
                    u64::from_le_bytes(code.get(start + i * 8..start + i * 8 + 8)?.try_into().ok()?);
                if elem == "D" {
                    Value::Double(f64::from_bits(raw))
                } else {
                    Value::Long(raw as i64)
                }
            }
            _ => return None,
        };
        data.push(value);
    }
    Some(Value::array(ArrayObj {
        elem_type: elem.to_string(),
        data,
    }))
}

// new-instance: capture the constructor call whose receiver is `reg`
// (arguments resolved backward at that pc) plus any following iputs.
fn enrich_instance(
    view: &MethodView,
    alloc_pc: usize,
    reg: u16,
    alloc_line: &str,
    vm: &mut Vm,
) -> Option<Value> {
    let class = lines::last_operand(alloc_line)?.to_string();
    let instance = Value::object(class);
    let mut initialized = false;

    for (&pc, (line, _)) in view.trace.range(alloc_pc + 2..) {
        let m = lines::mnemonic(line);
        if m == "invoke-direct" && line.contains(";-><init>(") {
            let regs = lines::invoke_arg_regs(line);
            if regs.first() == Some(&reg) {
                let mut args = vec![instance.clone()];
                for &arg_reg in &regs[1..] {
                    let info = backward::trace_register(view, pc, arg_reg, vm, 1);
                    match info.value {
                        Some(value) if info.resolved => args.push(value),
                        _ => return None,
                    }
                }
                let line = line.clone();
                if let Err(err) = vm.call_by_trace(false, &line, &args) {
                    log::debug!("constructor fold failed at pc {pc}: {err}");
                }
                initialized = true;
                continue;
            }
        }
        if m.starts_with("iput") {
            let regs = lines::all_regs(line);
            if regs.get(1) == Some(&reg) {
                if let (Some(&src), Some((_, field))) = (
                    regs.first(),
                    dt_vm::store::field_from_trace(line),
                ) {
                    let field = field.to_string();
                    let info = backward::trace_register(view, pc, src, vm, 1);
                    if let (true, Some(value), Value::Object(obj)) =
                        (info.resolved, info.value, &instance)
                    {
                        obj.borrow_mut().fields.insert(field, value);
                    }
                }
                continue;
            }
        }
        if lines::written_reg(line) == Some(reg) || block_exit(m) {
            break;
        }
    }

    initialized.then_some(instance)
}

/// Collects the pcs whose instructions contribute to the values of
/// `arg_regs` at `target_pc` (a backward slice with forward lookups for
/// constructor calls and array fills).
///
/// Executing exactly this set, in pc order, reconstructs the argument
/// registers without running unrelated code.
pub fn register_dependencies(
    view: &MethodView,
    target_pc: usize,
    arg_regs: &[u16],
) -> BTreeSet<usize> {
    let mut needed: BTreeSet<u16> = arg_regs.iter().copied().collect();
    let mut deps = BTreeSet::new();

    for (&pc, (line, _)) in view.trace.range(..target_pc).rev() {
        let m = lines::mnemonic(line);

        // setter-style calls mutate a value we are reconstructing without
        // writing any register (append, setKey, arraycopy); they belong
        // to the slice whenever they touch a needed register
        if m.starts_with("invoke") {
            let regs = lines::invoke_arg_regs(line);
            if regs.iter().any(|r| needed.contains(r)) {
                deps.insert(pc);
                needed.extend(regs);
            }
            continue;
        }

        let written = lines::written_reg(line);
        let Some(written) = written else {
            continue;
        };
        if !needed.contains(&written) {
            continue;
        }

        deps.insert(pc);
        needed.remove(&written);

        let regs = lines::all_regs(line);
        match m {
            m if m.starts_with("const") => {}
            m if m.starts_with("move-result") => {
                // the producing invoke and its inputs come along
                if let Some((&inv_pc, (inv_line, _))) =
                    view.trace.range(..pc).rev().find(|(_, (l, _))| {
                        let m = lines::mnemonic(l);
                        m.starts_with("invoke") || m.starts_with("filled-new-array")
                    })
                {
                    deps.insert(inv_pc);
                    needed.extend(lines::invoke_arg_regs(inv_line));
                }
            }
            "new-array" => {
                needed.extend(regs.get(1).copied());
                for (&fwd_pc, (fwd_line, _)) in view.trace.range(pc + 2..target_pc) {
                    if lines::mnemonic(fwd_line) == "fill-array-data"
                        && lines::all_regs(fwd_line).first() == Some(&written)
                    {
                        deps.insert(fwd_pc);
                        break;
                    }
                }
            }
            // the constructor call that initializes a new-instance is an
            // invoke on the (still needed) receiver, so the invoke rule
            // above already pulled it in
            "new-instance" => {}
            m if m.starts_with("sget") => {}
            // in-place cast: the same register is also the input
            "check-cast" => {
                needed.insert(written);
            }
            // moves, arithmetic, array and field reads: everything else
            // the line mentions feeds the result
            _ => {
                needed.extend(regs.into_iter().skip(1));
            }
        }
    }

    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use dt_dex::TraceMap;
    use dt_vm::{MockConfig, Session};

    fn tm(entries: &[(usize, &str)]) -> TraceMap {
        entries
            .iter()
            .map(|(pc, line)| (*pc, ((*line).to_string(), 1)))
            .collect()
    }

    #[test]
    fn array_filled_from_payload() {
        // new-array v0 at pc 0, fill-array-data at pc 4, payload at pc 12
        let trace = tm(&[
            (0, "new-array v0, v1, [B"),
            (4, "fill-array-data v0, +4"),
            (10, "return-object v0"),
            (12, "array-data-payload"),
        ]);
        let mut code = vec![0u8; 12];
        code[4] = 0x26;
        code[6..10].copy_from_slice(&4i32.to_le_bytes());
        code.extend_from_slice(&[0x00, 0x03, 0x01, 0x00]); // ident, width 1
        code.extend_from_slice(&3u32.to_le_bytes());
        code.extend_from_slice(&[0x0a, 0x14, 0x1e, 0x00]);
        let view = MethodView {
            trace: &trace,
            bytecode: &code,
            regs_size: 2,
            ins_size: 0,
        };
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let out = enrich_allocation(&view, 0, 0, &mut vm).unwrap();
        let Value::Array(arr) = out else { panic!("expected array") };
        let data: Vec<i32> = arr.borrow().data.iter().map(Value::as_int).collect();
        assert_eq!(data, vec![10, 20, 30]);
    }

    #[test]
    fn scan_stops_at_reassignment() {
        let trace = tm(&[
            (0, "new-array v0, v1, [B"),
            (4, "const/4 v0, 0"),
            (6, "fill-array-data v0, +4"),
        ]);
        let view = MethodView {
            trace: &trace,
            bytecode: &[],
            regs_size: 2,
            ins_size: 0,
        };
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        assert!(enrich_allocation(&view, 0, 0, &mut vm).is_none());
    }

    #[test]
    fn instance_captures_constructor_and_iputs() {
        let trace = tm(&[
            (0, "new-instance v0, Ljava/lang/String;"),
            (4, "const-string v1, \"hi\" // string@0"),
            (8, "invoke-direct {v0, v1}, Ljava/lang/String;-><init>(Ljava/lang/String;)V"),
            (14, "const/16 v2, 9"),
            (18, "iput v2, v0, Lcom/a/B;->len:I"),
            (22, "return-object v0"),
        ]);
        let view = MethodView {
            trace: &trace,
            bytecode: &[],
            regs_size: 4,
            ins_size: 0,
        };
        let mut vm = Vm::detached(Session::new(MockConfig::default()));
        let out = enrich_allocation(&view, 0, 0, &mut vm).unwrap();
        assert_eq!(out.host_str().as_deref(), Some("hi"));
        let Value::Object(obj) = &out else { unreachable!() };
        assert_eq!(obj.borrow().fields.get("len").unwrap().as_int(), 9);
    }

    #[test]
    fn dependency_slice_is_minimal() {
        let trace = tm(&[
            (0, "const/16 v5, 1"), // unrelated
            (4, "const/16 v0, 2"),
            (8, "move v1, v0"),
            (10, "const/16 v5, 3"), // unrelated rewrite
            (14, "invoke-static {v1}, LT;->f(I)I"),
        ]);
        let view = MethodView {
            trace: &trace,
            bytecode: &[],
            regs_size: 6,
            ins_size: 0,
        };
        let deps = register_dependencies(&view, 14, &[1]);
        assert_eq!(deps, BTreeSet::from([4, 8]));
    }

    #[test]
    fn dependency_slice_follows_setter_chains() {
        let trace = tm(&[
            (0, "new-instance v0, Ljava/lang/StringBuilder;"),
            (4, "invoke-direct {v0}, Ljava/lang/StringBuilder;-><init>()V"),
            (10, "const-string v1, \"a\" // string@0"),
            (14, "invoke-virtual {v0, v1}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;"),
            (20, "invoke-virtual {v0}, Ljava/lang/StringBuilder;->toString()Ljava/lang/String;"),
            (26, "move-result-object v2"),
            (28, "invoke-static {v2}, LT;->dec(Ljava/lang/String;)Ljava/lang/String;"),
        ]);
        let view = MethodView {
            trace: &trace,
            bytecode: &[],
            regs_size: 4,
            ins_size: 0,
        };
        let deps = register_dependencies(&view, 28, &[2]);
        assert_eq!(deps, BTreeSet::from([0, 4, 10, 14, 20, 26]));
    }

    #[test]
    fn dependency_slice_includes_producing_invoke() {
        let trace = tm(&[
            (0, "const/16 v2, 40"),
            (4, "invoke-static {v2}, LT;->g(I)I"),
            (10, "move-result v0"),
            (12, "invoke-static {v0}, LT;->f(I)I"),
        ]);
        let view = MethodView {
            trace: &trace,
            bytecode: &[],
            regs_size: 4,
            ins_size: 0,
        };
        let deps = register_dependencies(&view, 12, &[0]);
        assert_eq!(deps, BTreeSet::from([0, 4, 10]));
    }
}
