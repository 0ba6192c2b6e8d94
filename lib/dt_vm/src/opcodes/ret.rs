//! Return family handlers.

use crate::errors::VmResult;
use crate::interp::Frame;

/// `return-void`, `return`, `return-wide`, `return-object`.
pub(crate) fn return_op(frame: &mut Frame, opcode: u8) -> VmResult<()> {
    if opcode == 0x0e {
        frame.last_result = None;
    } else {
        let reg = frame.u8_at(frame.pc + 1)? as usize;
        frame.last_result = Some(frame.reg(reg)?.clone());
    }
    frame.finished = true;
    frame.pc += 2;
    Ok(())
}
