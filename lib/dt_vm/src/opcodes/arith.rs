//! Arithmetic, comparison and conversion handlers.
//!
//! Integer arithmetic is two's-complement wrapping at the declared width,
//! shift counts are masked to 5 (int) or 6 (long) bits, `ushr` is logical
//! while `shr` is arithmetic. Floating point follows IEEE-754 with quiet
//! NaN propagation; only integer division and remainder by zero are fatal.

use crate::errors::{VmError, VmResult};
use crate::interp::Frame;
use crate::value::Value;

fn div_zero(frame: &Frame) -> VmError {
    VmError::DivisionByZero {
        pc: frame.pc,
        method: frame.method.clone(),
    }
}

fn int_binop(frame: &Frame, sel: u8, a: i32, b: i32) -> VmResult<i32> {
    Ok(match sel {
        0 => a.wrapping_add(b),
        1 => a.wrapping_sub(b),
        2 => a.wrapping_mul(b),
        3 => {
            if b == 0 {
                return Err(div_zero(frame));
            }
            a.wrapping_div(b)
        }
        4 => {
            if b == 0 {
                return Err(div_zero(frame));
            }
            a.wrapping_rem(b)
        }
        5 => a & b,
        6 => a | b,
        7 => a ^ b,
        8 => a.wrapping_shl(b as u32 & 0x1f),
        9 => a.wrapping_shr(b as u32 & 0x1f),
        _ => ((a as u32).wrapping_shr(b as u32 & 0x1f)) as i32,
    })
}

fn long_binop(frame: &Frame, sel: u8, a: i64, b: i64) -> VmResult<i64> {
    Ok(match sel {
        0 => a.wrapping_add(b),
        1 => a.wrapping_sub(b),
        2 => a.wrapping_mul(b),
        3 => {
            if b == 0 {
                return Err(div_zero(frame));
            }
            a.wrapping_div(b)
        }
        4 => {
            if b == 0 {
                return Err(div_zero(frame));
            }
            a.wrapping_rem(b)
        }
        5 => a & b,
        6 => a | b,
        7 => a ^ b,
        8 => a.wrapping_shl(b as u32 & 0x3f),
        9 => a.wrapping_shr(b as u32 & 0x3f),
        _ => ((a as u64).wrapping_shr(b as u32 & 0x3f)) as i64,
    })
}

fn float_binop(sel: u8, a: f32, b: f32) -> f32 {
    match sel {
        0 => a + b,
        1 => a - b,
        2 => a * b,
        3 => a / b,
        _ => a % b,
    }
}

fn double_binop(sel: u8, a: f64, b: f64) -> f64 {
    match sel {
        0 => a + b,
        1 => a - b,
        2 => a * b,
        3 => a / b,
        _ => a % b,
    }
}

// Applies the 23x/2addr family operation selected by `family` (an opcode
// in 0x90..=0xaf) to the values of `src1`/`src2`, storing into `dst`.
fn binop_core(
    frame: &mut Frame,
    family: u8,
    dst: usize,
    src1: usize,
    src2: usize,
) -> VmResult<()> {
    match family {
        0x90..=0x9a => {
            let r = int_binop(frame, family - 0x90, frame.int(src1)?, frame.int(src2)?)?;
            frame.set_reg(dst, Value::Int(r))
        }
        0x9b..=0xa5 => {
            let r = long_binop(frame, family - 0x9b, frame.long(src1)?, frame.long(src2)?)?;
            frame.set_wide(dst, Value::Long(r))
        }
        0xa6..=0xaa => {
            let r = float_binop(family - 0xa6, frame.float(src1)?, frame.float(src2)?);
            frame.set_reg(dst, Value::Float(r))
        }
        _ => {
            let r = double_binop(family - 0xab, frame.double(src1)?, frame.double(src2)?);
            frame.set_wide(dst, Value::Double(r))
        }
    }
}

/// `binop vAA, vBB, vCC` (23x).
pub(crate) fn binop(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let dst = frame.u8_at(pc + 1)? as usize;
    let src1 = frame.u8_at(pc + 2)? as usize;
    let src2 = frame.u8_at(pc + 3)? as usize;
    binop_core(frame, opcode, dst, src1, src2)?;
    frame.pc += 4;
    Ok(())
}

/// `binop/2addr vA, vB` (12x).
pub(crate) fn binop_2addr(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let b = frame.u8_at(frame.pc + 1)?;
    let dst = (b & 0xf) as usize;
    let src = (b >> 4) as usize;
    binop_core(frame, opcode - 0xb0 + 0x90, dst, dst, src)?;
    frame.pc += 2;
    Ok(())
}

/// `binop/lit16 vA, vB, #+CCCC` (22s). `rsub-int` reverses the operands.
pub(crate) fn binop_lit16(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let dst = (b & 0xf) as usize;
    let src = (b >> 4) as usize;
    let lit = i32::from(frame.i16_at(pc + 2)?);
    let v = frame.int(src)?;
    // lit16 family order matches the 23x int family except at index 1,
    // where rsub replaces sub and the operands swap
    let sel = opcode - 0xd0;
    let r = if sel == 1 {
        int_binop(frame, 1, lit, v)?
    } else {
        int_binop(frame, sel, v, lit)?
    };
    frame.set_reg(dst, Value::Int(r))?;
    frame.pc += 4;
    Ok(())
}

/// `binop/lit8 vAA, vBB, #+CC` (22b). `rsub-int/lit8` reverses the operands.
pub(crate) fn binop_lit8(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let dst = frame.u8_at(pc + 1)? as usize;
    let src = frame.u8_at(pc + 2)? as usize;
    let lit = i32::from(frame.u8_at(pc + 3)? as i8);
    let v = frame.int(src)?;
    // same layout as the 23x int family except rsub at index 1
    let sel = opcode - 0xd8;
    let r = if sel == 1 {
        int_binop(frame, 1, lit, v)?
    } else {
        int_binop(frame, sel, v, lit)?
    };
    frame.set_reg(dst, Value::Int(r))?;
    frame.pc += 4;
    Ok(())
}

/// Unary and conversion handlers (12x), opcodes 0x7b..=0x8f.
pub(crate) fn unop(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let b = frame.u8_at(frame.pc + 1)?;
    let dst = (b & 0xf) as usize;
    let src = (b >> 4) as usize;
    match opcode {
        0x7b => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Int(v.wrapping_neg()))?;
        }
        0x7c => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Int(!v))?;
        }
        0x7d => {
            let v = frame.long(src)?;
            frame.set_wide(dst, Value::Long(v.wrapping_neg()))?;
        }
        0x7e => {
            let v = frame.long(src)?;
            frame.set_wide(dst, Value::Long(!v))?;
        }
        0x7f => {
            let v = frame.float(src)?;
            frame.set_reg(dst, Value::Float(-v))?;
        }
        0x80 => {
            let v = frame.double(src)?;
            frame.set_wide(dst, Value::Double(-v))?;
        }
        0x81 => {
            let v = frame.int(src)?;
            frame.set_wide(dst, Value::Long(i64::from(v)))?;
        }
        0x82 => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Float(v as f32))?;
        }
        0x83 => {
            let v = frame.int(src)?;
            frame.set_wide(dst, Value::Double(f64::from(v)))?;
        }
        0x84 => {
            let v = frame.long(src)?;
            frame.set_reg(dst, Value::Int(v as i32))?;
        }
        0x85 => {
            let v = frame.long(src)?;
            frame.set_reg(dst, Value::Float(v as f32))?;
        }
        0x86 => {
            let v = frame.long(src)?;
            frame.set_wide(dst, Value::Double(v as f64))?;
        }
        // float/double to integral conversions truncate toward zero and
        // saturate on overflow and NaN, which is exactly `as` in Rust
        0x87 => {
            let v = frame.float(src)?;
            frame.set_reg(dst, Value::Int(v as i32))?;
        }
        0x88 => {
            let v = frame.float(src)?;
            frame.set_wide(dst, Value::Long(v as i64))?;
        }
        0x89 => {
            let v = frame.float(src)?;
            frame.set_wide(dst, Value::Double(f64::from(v)))?;
        }
        0x8a => {
            let v = frame.double(src)?;
            frame.set_reg(dst, Value::Int(v as i32))?;
        }
        0x8b => {
            let v = frame.double(src)?;
            frame.set_wide(dst, Value::Long(v as i64))?;
        }
        0x8c => {
            let v = frame.double(src)?;
            frame.set_reg(dst, Value::Float(v as f32))?;
        }
        0x8d => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Int(i32::from(v as i8)))?;
        }
        0x8e => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Char(v as u16))?;
        }
        _ => {
            let v = frame.int(src)?;
            frame.set_reg(dst, Value::Int(i32::from(v as i16)))?;
        }
    }
    frame.pc += 2;
    Ok(())
}

/// `cmpl`/`cmpg`/`cmp-long` (23x), opcodes 0x2d..=0x31.
///
/// The `l`/`g` suffix picks the result when either operand is NaN: `cmpl`
/// yields -1, `cmpg` yields +1.
pub(crate) fn cmp_op(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let dst = frame.u8_at(pc + 1)? as usize;
    let src1 = frame.u8_at(pc + 2)? as usize;
    let src2 = frame.u8_at(pc + 3)? as usize;
    let result = match opcode {
        0x2d | 0x2e => {
            let (a, b) = (frame.float(src1)?, frame.float(src2)?);
            if a.is_nan() || b.is_nan() {
                if opcode == 0x2d {
                    -1
                } else {
                    1
                }
            } else if a < b {
                -1
            } else {
                i32::from(a > b)
            }
        }
        0x2f | 0x30 => {
            let (a, b) = (frame.double(src1)?, frame.double(src2)?);
            if a.is_nan() || b.is_nan() {
                if opcode == 0x2f {
                    -1
                } else {
                    1
                }
            } else if a < b {
                -1
            } else {
                i32::from(a > b)
            }
        }
        _ => {
            let (a, b) = (frame.long(src1)?, frame.long(src2)?);
            match a.cmp(&b) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }
        }
    };
    frame.set_reg(dst, Value::Int(result))?;
    frame.pc += 4;
    Ok(())
}
