//! Move family handlers.
//!
//! `-object` variants are identical to the plain moves at this level; the
//! `-wide` variants copy a register pair.

use crate::errors::VmResult;
use crate::interp::Frame;
use crate::value::Value;

/// `move*` opcodes 0x01..=0x09 (12x, 22x, 32x).
pub(crate) fn move_op(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let (dst, src, units) = match opcode {
        0x01 | 0x04 | 0x07 => {
            let b = frame.u8_at(pc + 1)?;
            ((b & 0xf) as usize, (b >> 4) as usize, 1)
        }
        0x02 | 0x05 | 0x08 => (
            frame.u8_at(pc + 1)? as usize,
            frame.u16_at(pc + 2)? as usize,
            2,
        ),
        _ => (
            frame.u16_at(pc + 2)? as usize,
            frame.u16_at(pc + 4)? as usize,
            3,
        ),
    };
    let wide = matches!(opcode, 0x04..=0x06);
    if wide {
        // read both halves before writing so overlapping pairs stay intact
        let low = frame.reg(src)?.clone();
        let high = frame.reg(src + 1)?.clone();
        frame.set_reg(dst, low)?;
        frame.set_reg(dst + 1, high)?;
    } else {
        let value = frame.reg(src)?.clone();
        frame.set_reg(dst, value)?;
    }
    frame.pc += units * 2;
    Ok(())
}

/// `move-result`, `move-result-wide`, `move-result-object` (11x).
///
/// Consumes the last-result slot; it is only valid immediately after an
/// invoke (or `filled-new-array`).
pub(crate) fn move_result(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let dst = frame.u8_at(frame.pc + 1)? as usize;
    let value = frame.last_result.take().unwrap_or(Value::Null);
    if opcode == 0x0b {
        frame.set_wide(dst, value)?;
    } else {
        frame.set_reg(dst, value)?;
    }
    frame.pc += 2;
    Ok(())
}

/// `move-exception` (11x). There is no exception unwinding, so the handler
/// slot reads as null.
pub(crate) fn move_exception(frame: &mut Frame) -> VmResult<()> {
    let dst = frame.u8_at(frame.pc + 1)? as usize;
    frame.set_reg(dst, Value::Null)?;
    frame.pc += 2;
    Ok(())
}
