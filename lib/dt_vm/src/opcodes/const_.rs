//! Const family handlers.
//!
//! Literals are sign-extended to the register width; `/high16` variants
//! shift into the upper bits. `const-string` resolves the unified string
//! pool and boxes the text; an unresolvable index is fatal.

use crate::errors::VmResult;
use crate::interp::{Frame, Vm};
use crate::value::Value;

pub(crate) fn const_op(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    match opcode {
        0x12 => {
            let b = frame.u8_at(pc + 1)?;
            let lit = i32::from((b as i8) >> 4);
            frame.set_reg((b & 0xf) as usize, Value::Int(lit))?;
            frame.pc += 2;
        }
        0x13 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = i32::from(frame.i16_at(pc + 2)?);
            frame.set_reg(reg, Value::Int(lit))?;
            frame.pc += 4;
        }
        0x14 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = frame.i32_at(pc + 2)?;
            frame.set_reg(reg, Value::Int(lit))?;
            frame.pc += 6;
        }
        0x15 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = i32::from(frame.i16_at(pc + 2)?) << 16;
            frame.set_reg(reg, Value::Int(lit))?;
            frame.pc += 4;
        }
        0x16 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = i64::from(frame.i16_at(pc + 2)?);
            frame.set_wide(reg, Value::Long(lit))?;
            frame.pc += 4;
        }
        0x17 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = i64::from(frame.i32_at(pc + 2)?);
            frame.set_wide(reg, Value::Long(lit))?;
            frame.pc += 6;
        }
        0x18 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = frame.i64_at(pc + 2)?;
            frame.set_wide(reg, Value::Long(lit))?;
            frame.pc += 10;
        }
        0x19 => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let lit = i64::from(frame.i16_at(pc + 2)?) << 48;
            frame.set_wide(reg, Value::Long(lit))?;
            frame.pc += 4;
        }
        0x1a => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let idx = frame.u16_at(pc + 2)? as usize;
            let s = vm.lookup_string(frame.container, idx)?;
            frame.set_reg(reg, Value::string(s))?;
            frame.pc += 4;
        }
        0x1b => {
            let reg = frame.u8_at(pc + 1)? as usize;
            let idx = frame.u32_at(pc + 2)? as usize;
            let s = vm.lookup_string(frame.container, idx)?;
            frame.set_reg(reg, Value::string(s))?;
            frame.pc += 6;
        }
        _ => {
            // const-class
            let reg = frame.u8_at(pc + 1)? as usize;
            let idx = frame.u16_at(pc + 2)? as usize;
            let desc = vm
                .type_desc(frame.container, idx)
                .unwrap_or_else(|| format!("type@{idx}"));
            frame.set_reg(reg, Value::Class(desc))?;
            frame.pc += 4;
        }
    }
    Ok(())
}
