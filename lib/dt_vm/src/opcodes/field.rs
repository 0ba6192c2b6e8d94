//! Field handlers.
//!
//! Instance fields live on the instance, keyed by name; static fields go
//! through the session store. Field names come from the rendered trace
//! line, which is the same text the analyzers and the store key off.

use crate::errors::VmResult;
use crate::interp::{Frame, Vm};
use crate::store::field_from_trace;
use crate::value::Value;

fn default_for(opcode_kind: u8) -> Value {
    match opcode_kind {
        // -wide
        1 => Value::Long(0),
        // -object
        2 => Value::Null,
        _ => Value::Int(0),
    }
}

// 0 = single, 1 = wide, 2 = object
fn kind(opcode: u8, base: u8) -> u8 {
    match opcode - base {
        1 => 1,
        2 => 2,
        _ => 0,
    }
}

/// `iget*` (22c): demand-allocated fields; absent reads the type default.
pub(crate) fn iget(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let dst = (b & 0xf) as usize;
    let obj_reg = (b >> 4) as usize;
    let k = kind(opcode, 0x52);

    let field = field_from_trace(frame.trace_text(pc)).map(|(_, f)| f.to_string());
    let value = match (frame.reg(obj_reg)?, &field) {
        (Value::Object(obj), Some(name)) => obj
            .borrow()
            .fields
            .get(name)
            .cloned()
            .unwrap_or_else(|| default_for(k)),
        _ => {
            log::debug!("iget on a non-object receiver in {} at pc {pc}", frame.method);
            default_for(k)
        }
    };
    if k == 1 {
        frame.set_wide(dst, value)?;
    } else {
        frame.set_reg(dst, value)?;
    }
    frame.pc += 4;
    Ok(())
}

/// `iput*` (22c): fields appear on first assignment.
pub(crate) fn iput(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let src = (b & 0xf) as usize;
    let obj_reg = (b >> 4) as usize;

    let value = if kind(opcode, 0x59) == 1 {
        Value::Long(frame.long(src)?)
    } else {
        frame.reg(src)?.clone()
    };
    if let (Value::Object(obj), Some((_, name))) = (
        frame.reg(obj_reg)?.clone(),
        field_from_trace(frame.trace_text(pc)),
    ) {
        obj.borrow_mut().fields.insert(name.to_string(), value);
    } else {
        log::debug!("iput on a non-object receiver in {} at pc {pc}", frame.method);
    }
    frame.pc += 4;
    Ok(())
}

/// `sget*` (21c).
///
/// Mock static-field overrides win, then the session store; reading a
/// field of a class whose `<clinit>` has not run yet triggers it first. An
/// absent field is a recoverable gap and reads the type default.
pub(crate) fn sget(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let dst = frame.u8_at(pc + 1)? as usize;
    let k = kind(opcode, 0x60);
    let trace = frame.trace_text(pc).to_string();

    let value = match field_from_trace(&trace) {
        Some((class, name)) => {
            let sig = format!("{class}->{name}");
            if let Some(mock) = vm.hooks.static_field(&sig) {
                Some(mock)
            } else {
                if !vm.session.initialized.contains(class) {
                    vm.run_clinit(class)?;
                }
                vm.session.statics.get(class, name).cloned()
            }
        }
        None => None,
    };
    let value = value.unwrap_or_else(|| {
        log::debug!("unresolved static field in {} at pc {pc}: {trace}", frame.method);
        default_for(k)
    });
    if k == 1 {
        frame.set_wide(dst, value)?;
    } else {
        frame.set_reg(dst, value)?;
    }
    frame.pc += 4;
    Ok(())
}

/// `sput*` (21c).
pub(crate) fn sput(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let src = frame.u8_at(pc + 1)? as usize;
    let value = if kind(opcode, 0x67) == 1 {
        Value::Long(frame.long(src)?)
    } else {
        frame.reg(src)?.clone()
    };
    match field_from_trace(frame.trace_text(pc)) {
        Some((class, name)) => {
            vm.session.statics.set(class, name, value);
        }
        None => {
            log::warn!(
                "sput without a resolvable field in {} at pc {pc}",
                frame.method
            );
        }
    }
    frame.pc += 4;
    Ok(())
}
