//! Invoke handlers (35c and 3rc forms).
//!
//! Dispatch order per kind: hook registries first, then resolution through
//! the dex index with `<clinit>` orchestration, then the constructor
//! no-op, then a logged null. A fatal error inside a callee is the
//! callee's problem: the caller observes a null last-result and proceeds,
//! which maximizes the yield on imperfect mock coverage.

use crate::errors::VmResult;
use crate::interp::{Frame, Vm};
use crate::value::Value;

/// Which resolution path an invoke takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl InvokeKind {
    fn from_opcode(opcode: u8) -> Self {
        match opcode {
            0x6f | 0x75 => Self::Super,
            0x70 | 0x76 => Self::Direct,
            0x71 | 0x77 => Self::Static,
            0x72 | 0x78 => Self::Interface,
            _ => Self::Virtual,
        }
    }
}

fn decode_35c(frame: &Frame) -> VmResult<(Vec<usize>, usize)> {
    let pc = frame.pc;
    let b1 = frame.u8_at(pc + 1)?;
    let count = (b1 >> 4) as usize;
    let g = (b1 & 0xf) as usize;
    let method_idx = frame.u16_at(pc + 2)? as usize;
    let dc = frame.u8_at(pc + 4)?;
    let fe = frame.u8_at(pc + 5)?;
    let all = [
        (dc & 0xf) as usize,
        (dc >> 4) as usize,
        (fe & 0xf) as usize,
        (fe >> 4) as usize,
        g,
    ];
    Ok((all[..count.min(5)].to_vec(), method_idx))
}

fn decode_3rc(frame: &Frame) -> VmResult<(Vec<usize>, usize)> {
    let pc = frame.pc;
    let count = frame.u8_at(pc + 1)? as usize;
    let method_idx = frame.u16_at(pc + 2)? as usize;
    let first = frame.u16_at(pc + 4)? as usize;
    Ok(((first..first + count).collect(), method_idx))
}

/// All `invoke-kind` and `invoke-kind/range` opcodes.
pub(crate) fn invoke_op(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    let kind = InvokeKind::from_opcode(opcode);
    let (regs, method_idx) = if (0x74..=0x78).contains(&opcode) {
        decode_3rc(frame)?
    } else {
        decode_35c(frame)?
    };

    // a wide argument arrives as two consecutive registers; copying the
    // slots verbatim keeps the callee's parameter window aligned
    let mut args = Vec::with_capacity(regs.len());
    for reg in regs {
        args.push(frame.reg(reg)?.clone());
    }
    let trace = frame.trace_text(frame.pc).to_string();

    match vm.dispatch_invoke(kind, frame.container, method_idx, &args, &trace) {
        Ok(result) => frame.last_result = result,
        Err(err) => {
            log::warn!("call failed in {} at pc {}: {err}", frame.method, frame.pc);
            frame.last_result = Some(Value::Null);
        }
    }
    frame.pc += 6;
    Ok(())
}
