//! Array handlers: allocation, literal fills, element access.

use crate::errors::{VmError, VmResult};
use crate::interp::{Frame, Vm};
use crate::value::{elem_default, ArrayObj, Value};

// Element descriptor of an allocation, from the type pool when an index is
// attached, from the trace text otherwise.
fn alloc_type(vm: &Vm, frame: &Frame, type_idx: usize) -> String {
    vm.type_desc(frame.container, type_idx)
        .or_else(|| {
            frame
                .trace_text(frame.pc)
                .rsplit(", ")
                .next()
                .filter(|t| t.starts_with('[') || t.starts_with('L'))
                .map(str::to_string)
        })
        .unwrap_or_else(|| "[Ljava/lang/Object;".to_string())
}

/// `array-length vA, vB` (12x). Null reads as length zero.
pub(crate) fn array_length(frame: &mut Frame) -> VmResult<()> {
    let b = frame.u8_at(frame.pc + 1)?;
    let dst = (b & 0xf) as usize;
    let src = (b >> 4) as usize;
    let len = match frame.reg(src)? {
        Value::Array(arr) => arr.borrow().len() as i32,
        _ => 0,
    };
    frame.set_reg(dst, Value::Int(len))?;
    frame.pc += 2;
    Ok(())
}

/// `new-array vA, vB, type@CCCC` (22c). Negative lengths are fatal.
pub(crate) fn new_array(vm: &mut Vm, frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let b = frame.u8_at(pc + 1)?;
    let dst = (b & 0xf) as usize;
    let len = frame.int((b >> 4) as usize)?;
    let type_idx = frame.u16_at(pc + 2)? as usize;
    if len < 0 {
        return Err(VmError::NegativeArrayLength {
            len,
            pc,
            method: frame.method.clone(),
        });
    }
    let desc = alloc_type(vm, frame, type_idx);
    let elem = desc.strip_prefix('[').unwrap_or("Ljava/lang/Object;");
    let arr = ArrayObj {
        elem_type: elem.to_string(),
        data: vec![elem_default(elem); len as usize],
    };
    frame.set_reg(dst, Value::array(arr))?;
    frame.pc += 4;
    Ok(())
}

/// `filled-new-array` / `filled-new-array/range`: materializes a small
/// array from the argument registers; the result lands in the last-result
/// slot for the following `move-result-object`.
pub(crate) fn filled_new_array(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let (regs, type_idx) = if opcode == 0x24 {
        let b1 = frame.u8_at(pc + 1)?;
        let count = (b1 >> 4) as usize;
        let g = (b1 & 0xf) as usize;
        let idx = frame.u16_at(pc + 2)? as usize;
        let dc = frame.u8_at(pc + 4)?;
        let fe = frame.u8_at(pc + 5)?;
        let all = [
            (dc & 0xf) as usize,
            (dc >> 4) as usize,
            (fe & 0xf) as usize,
            (fe >> 4) as usize,
            g,
        ];
        (all[..count.min(5)].to_vec(), idx)
    } else {
        let count = frame.u8_at(pc + 1)? as usize;
        let idx = frame.u16_at(pc + 2)? as usize;
        let first = frame.u16_at(pc + 4)? as usize;
        ((first..first + count).collect(), idx)
    };

    let desc = alloc_type(vm, frame, type_idx);
    let elem = desc.strip_prefix('[').unwrap_or("I");
    let mut data = Vec::with_capacity(regs.len());
    for reg in regs {
        data.push(frame.reg(reg)?.clone());
    }
    frame.last_result = Some(Value::array(ArrayObj {
        elem_type: elem.to_string(),
        data,
    }));
    frame.pc += 6;
    Ok(())
}

/// `fill-array-data vAA, +BBBBBBBB` (31t): populates the array from the
/// packed literal payload.
pub(crate) fn fill_array_data(frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let reg = frame.u8_at(pc + 1)? as usize;
    let offset = frame.i32_at(pc + 2)?;

    let Value::Array(arr) = frame.reg(reg)?.clone() else {
        frame.pc += 6;
        return Ok(());
    };

    let payload = (pc as i64 + i64::from(offset) * 2) as usize;
    if frame.u16_at(payload)? != 0x0300 {
        return Err(VmError::MalformedPayload {
            what: "fill-array-data",
            pc,
            method: frame.method.clone(),
        });
    }
    let width = frame.u16_at(payload + 2)? as usize;
    let size = frame.u32_at(payload + 4)? as usize;
    let data_start = payload + 8;

    let mut arr = arr.borrow_mut();
    let elem_type = arr.elem_type.clone();
    let count = size.min(arr.len());
    for i in 0..count {
        let value = match width {
            1 => Value::Int(i32::from(frame.u8_at(data_start + i)? as i8)),
            2 => {
                let raw = frame.u16_at(data_start + i * 2)?;
                if elem_type == "C" {
                    Value::Int(i32::from(raw))
                } else {
                    Value::Int(i32::from(raw as i16))
                }
            }
            4 => {
                let raw = frame.u32_at(data_start + i * 4)?;
                if elem_type == "F" {
                    Value::Float(f32::from_bits(raw))
                } else {
                    Value::Int(raw as i32)
                }
            }
            8 => {
                let raw = frame.i64_at(data_start + i * 8)?;
                if elem_type == "D" {
                    Value::Double(f64::from_bits(raw as u64))
                } else {
                    Value::Long(raw)
                }
            }
            _ => {
                return Err(VmError::MalformedPayload {
                    what: "fill-array-data",
                    pc,
                    method: frame.method.clone(),
                })
            }
        };
        arr.data[i] = value;
    }
    drop(arr);
    frame.pc += 6;
    Ok(())
}

fn array_at(frame: &Frame, reg: usize, idx_reg: usize) -> VmResult<(crate::value::ArrRef, usize)> {
    let idx = i64::from(frame.int(idx_reg)?);
    match frame.reg(reg)? {
        Value::Array(arr) => {
            let len = arr.borrow().len();
            if idx < 0 || idx as usize >= len {
                return Err(VmError::ArrayIndexOutOfBounds {
                    index: idx,
                    len,
                    pc: frame.pc,
                    method: frame.method.clone(),
                });
            }
            Ok((arr.clone(), idx as usize))
        }
        _ => Err(VmError::ArrayIndexOutOfBounds {
            index: idx,
            len: 0,
            pc: frame.pc,
            method: frame.method.clone(),
        }),
    }
}

/// `aget*` (23x). The `-wide` variant writes a pair; the others differ
/// only in declared width, which the array already carries.
pub(crate) fn aget(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let dst = frame.u8_at(pc + 1)? as usize;
    let arr_reg = frame.u8_at(pc + 2)? as usize;
    let idx_reg = frame.u8_at(pc + 3)? as usize;
    let (arr, idx) = array_at(frame, arr_reg, idx_reg)?;
    let value = arr.borrow().data[idx].clone();
    if opcode == 0x45 {
        frame.set_wide(dst, value)?;
    } else {
        frame.set_reg(dst, value)?;
    }
    frame.pc += 4;
    Ok(())
}

/// `aput*` (23x). Narrowing variants mask to their element width.
pub(crate) fn aput(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let pc = frame.pc;
    let src = frame.u8_at(pc + 1)? as usize;
    let arr_reg = frame.u8_at(pc + 2)? as usize;
    let idx_reg = frame.u8_at(pc + 3)? as usize;
    let (arr, idx) = array_at(frame, arr_reg, idx_reg)?;
    let value = match opcode {
        0x4c => Value::Long(frame.long(src)?),
        0x4e => Value::Int(frame.int(src)? & 1),
        0x4f => Value::Int(i32::from(frame.int(src)? as i8)),
        0x50 => Value::Int(frame.int(src)? & 0xffff),
        0x51 => Value::Int(i32::from(frame.int(src)? as i16)),
        _ => frame.reg(src)?.clone(),
    };
    arr.borrow_mut().data[idx] = value;
    frame.pc += 4;
    Ok(())
}
