//! Control flow handlers: gotos, conditional branches, switches.
//!
//! Branch offsets are in code units, relative to the instruction start.

use crate::errors::{VmError, VmResult};
use crate::interp::Frame;
use crate::value::Value;

fn branch_to(frame: &mut Frame, offset: i64) {
    frame.pc = (frame.pc as i64 + offset * 2) as usize;
}

/// `goto`, `goto/16`, `goto/32`.
pub(crate) fn goto_op(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let offset = match opcode {
        0x28 => i64::from(frame.u8_at(pc + 1)? as i8),
        0x29 => i64::from(frame.i16_at(pc + 2)?),
        _ => i64::from(frame.i32_at(pc + 2)?),
    };
    branch_to(frame, offset);
    Ok(())
}

// Comparison operand of the zero-test branches. Object references compare
// as non-zero, null as zero.
fn branch_operand(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Object(_) | Value::Array(_) | Value::Class(_) => 1,
        other => other.as_long(),
    }
}

/// `if-eq` .. `if-le` (22t).
pub(crate) fn if_test(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let a = branch_operand(frame.reg((b & 0xf) as usize)?);
    let c = branch_operand(frame.reg((b >> 4) as usize)?);
    let offset = i64::from(frame.i16_at(pc + 2)?);
    let taken = match opcode {
        0x32 => a == c,
        0x33 => a != c,
        0x34 => a < c,
        0x35 => a >= c,
        0x36 => a > c,
        _ => a <= c,
    };
    if taken {
        branch_to(frame, offset);
    } else {
        frame.pc += 4;
    }
    Ok(())
}

/// `if-eqz` .. `if-lez` (21t).
pub(crate) fn if_test_z(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let reg = frame.u8_at(pc + 1)? as usize;
    let v = branch_operand(frame.reg(reg)?);
    let offset = i64::from(frame.i16_at(pc + 2)?);
    let taken = match opcode {
        0x38 => v == 0,
        0x39 => v != 0,
        0x3a => v < 0,
        0x3b => v >= 0,
        0x3c => v > 0,
        _ => v <= 0,
    };
    if taken {
        branch_to(frame, offset);
    } else {
        frame.pc += 4;
    }
    Ok(())
}

fn malformed(frame: &Frame, what: &'static str) -> VmError {
    VmError::MalformedPayload {
        what,
        pc: frame.pc,
        method: frame.method.clone(),
    }
}

/// `packed-switch` (31t): the payload maps `key - first_key` to a branch
/// target table index; out-of-range keys fall through.
pub(crate) fn packed_switch(frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let reg = frame.u8_at(pc + 1)? as usize;
    let offset = frame.i32_at(pc + 2)?;
    let key = frame.int(reg)?;

    let payload = (pc as i64 + i64::from(offset) * 2) as usize;
    if frame.u16_at(payload)? != 0x0100 {
        return Err(malformed(frame, "packed-switch"));
    }
    let size = frame.u16_at(payload + 2)? as usize;
    let first_key = frame.i32_at(payload + 4)?;

    let idx = i64::from(key) - i64::from(first_key);
    if idx >= 0 && (idx as usize) < size {
        let target = frame.i32_at(payload + 8 + idx as usize * 4)?;
        branch_to(frame, i64::from(target));
    } else {
        frame.pc += 6;
    }
    Ok(())
}

/// `sparse-switch` (31t): binary search over the sorted key table.
pub(crate) fn sparse_switch(frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let reg = frame.u8_at(pc + 1)? as usize;
    let offset = frame.i32_at(pc + 2)?;
    let key = frame.int(reg)?;

    let payload = (pc as i64 + i64::from(offset) * 2) as usize;
    if frame.u16_at(payload)? != 0x0200 {
        return Err(malformed(frame, "sparse-switch"));
    }
    let size = frame.u16_at(payload + 2)? as usize;
    let mut keys = Vec::with_capacity(size);
    for i in 0..size {
        keys.push(frame.i32_at(payload + 4 + i * 4)?);
    }
    if let Ok(idx) = keys.binary_search(&key) {
        let target = frame.i32_at(payload + 4 + size * 4 + idx * 4)?;
        branch_to(frame, i64::from(target));
    } else {
        frame.pc += 6;
    }
    Ok(())
}
