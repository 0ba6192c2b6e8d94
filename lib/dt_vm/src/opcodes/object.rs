//! Object handlers: allocation, casts, monitors, throw.

use crate::errors::{VmError, VmResult};
use crate::interp::{Frame, Vm};
use crate::mocks::factories;
use crate::value::Value;

/// `monitor-enter` / `monitor-exit`: no-ops, execution is single-threaded.
pub(crate) fn monitor_op(frame: &mut Frame) -> VmResult<()> {
    frame.pc += 2;
    Ok(())
}

/// `check-cast vAA, type@BBBB` (21c).
///
/// Nominal only: without a class hierarchy the cast cannot be verified, so
/// the value is left untouched.
pub(crate) fn check_cast(frame: &mut Frame) -> VmResult<()> {
    frame.pc += 4;
    Ok(())
}

/// `instance-of vA, vB, type@CCCC` (22c): class-name string match.
pub(crate) fn instance_of(vm: &mut Vm, frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let dst = (b & 0xf) as usize;
    let src = (b >> 4) as usize;
    let type_idx = frame.u16_at(pc + 2)? as usize;

    let result = match (frame.reg(src)?, vm.type_desc(frame.container, type_idx)) {
        (Value::Null, _) => 0,
        (_, None) => 1,
        (Value::Object(obj), Some(desc)) => i32::from(obj.borrow().class_name == desc),
        (Value::Array(arr), Some(desc)) => {
            i32::from(format!("[{}", arr.borrow().elem_type) == desc)
        }
        (Value::Class(_), Some(desc)) => i32::from(desc == "Ljava/lang/Class;"),
        _ => 0,
    };
    frame.set_reg(dst, Value::Int(result))?;
    frame.pc += 4;
    Ok(())
}

/// `new-instance vAA, type@BBBB` (21c).
///
/// Fields stay empty until written; well-known framework classes come out
/// of the mock factories pre-shaped.
pub(crate) fn new_instance(vm: &mut Vm, frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let reg = frame.u8_at(pc + 1)? as usize;
    let type_idx = frame.u16_at(pc + 2)? as usize;
    let desc = vm
        .type_desc(frame.container, type_idx)
        .or_else(|| {
            frame
                .trace_text(pc)
                .rsplit(", ")
                .next()
                .filter(|t| t.starts_with('L'))
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("type@{type_idx}"));
    let value = factories::mock_for_class(&desc, &vm.session.config)
        .unwrap_or_else(|| Value::object(desc));
    frame.set_reg(reg, value)?;
    frame.pc += 4;
    Ok(())
}

/// `throw vAA` (11x): fatal, handlers are not honored.
pub(crate) fn throw_op(frame: &mut Frame) -> VmResult<()> {
    Err(VmError::Thrown {
        pc: frame.pc,
        method: frame.method.clone(),
        instr: frame.trace_text(frame.pc).to_string(),
    })
}
