//! Interpreter core: the register frame and the fetch–dispatch loop.

use crate::errors::{VmError, VmResult};
use crate::mocks::dispatch::HookRegistry;
use crate::session::Session;
use crate::value::Value;
use dt_dex::{DexIndex, TraceMap};
use std::sync::Arc;

/// Step budget of a top-level frame.
pub const TOP_STEP_LIMIT: usize = 10_000;
/// Step budget of a nested invocation.
pub const NESTED_STEP_LIMIT: usize = 5_000;
/// Step budget of a `<clinit>` run.
pub const CLINIT_STEP_LIMIT: usize = 500;
/// Frames of nested invocation before giving up on mutual recursion.
pub const MAX_CALL_DEPTH: usize = 256;

/// One method activation: register file, pc, last-result slot.
#[derive(Debug)]
pub struct Frame {
    /// Signature of the running method, for diagnostics.
    pub method: String,
    /// Container the method was defined in (for constant pool access).
    pub container: usize,
    pub bytecode: Vec<u8>,
    pub trace: Arc<TraceMap>,
    pub regs: Vec<Value>,
    /// Number of incoming parameter slots (the last `ins_size` registers).
    pub ins_size: usize,
    pub pc: usize,
    /// Result of the most recent invoke; `None` means void. Only valid
    /// until the next instruction that is not a `move-result*`.
    pub last_result: Option<Value>,
    pub finished: bool,
}

impl Frame {
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        container: usize,
        bytecode: Vec<u8>,
        trace: Arc<TraceMap>,
        regs_count: usize,
        ins_size: usize,
    ) -> Self {
        Self {
            method: method.into(),
            container,
            bytecode,
            trace,
            regs: vec![Value::Null; regs_count],
            ins_size,
            pc: 0,
            last_result: None,
            finished: false,
        }
    }

    /// Loads arguments into the parameter window (the trailing registers).
    pub fn load_args(&mut self, args: &[Value]) -> VmResult<()> {
        let count = args.len();
        let start = self
            .regs
            .len()
            .checked_sub(count)
            .ok_or_else(|| VmError::RegisterOutOfBounds {
                reg: count,
                pc: 0,
                method: self.method.clone(),
            })?;
        for (i, arg) in args.iter().enumerate() {
            self.regs[start + i] = arg.clone();
        }
        Ok(())
    }

    /// The trace line of the instruction at `pc`, empty when unmapped.
    #[must_use]
    pub fn trace_text(&self, pc: usize) -> &str {
        self.trace.get(&pc).map_or("", |(text, _)| text.as_str())
    }

    pub fn reg(&self, reg: usize) -> VmResult<&Value> {
        self.regs.get(reg).ok_or_else(|| VmError::RegisterOutOfBounds {
            reg,
            pc: self.pc,
            method: self.method.clone(),
        })
    }

    pub fn set_reg(&mut self, reg: usize, value: Value) -> VmResult<()> {
        if reg >= self.regs.len() {
            return Err(VmError::RegisterOutOfBounds {
                reg,
                pc: self.pc,
                method: self.method.clone(),
            });
        }
        self.regs[reg] = value;
        Ok(())
    }

    /// Writes a wide value: the pair occupies `reg` and `reg + 1`, and the
    /// high half is invalidated so no stale wide half survives.
    pub fn set_wide(&mut self, reg: usize, value: Value) -> VmResult<()> {
        self.set_reg(reg, value)?;
        self.set_reg(reg + 1, Value::Null)
    }

    pub fn int(&self, reg: usize) -> VmResult<i32> {
        Ok(self.reg(reg)?.as_int())
    }

    pub fn long(&self, reg: usize) -> VmResult<i64> {
        Ok(self.reg(reg)?.as_long())
    }

    pub fn float(&self, reg: usize) -> VmResult<f32> {
        Ok(self.reg(reg)?.as_float())
    }

    pub fn double(&self, reg: usize) -> VmResult<f64> {
        Ok(self.reg(reg)?.as_double())
    }

    fn oob(&self, off: usize) -> VmError {
        VmError::PcOutOfRange {
            pc: off,
            method: self.method.clone(),
        }
    }

    pub fn u8_at(&self, off: usize) -> VmResult<u8> {
        self.bytecode.get(off).copied().ok_or_else(|| self.oob(off))
    }

    pub fn u16_at(&self, off: usize) -> VmResult<u16> {
        let b = self.bytecode.get(off..off + 2).ok_or_else(|| self.oob(off))?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn i16_at(&self, off: usize) -> VmResult<i16> {
        Ok(self.u16_at(off)? as i16)
    }

    pub fn u32_at(&self, off: usize) -> VmResult<u32> {
        let b = self.bytecode.get(off..off + 4).ok_or_else(|| self.oob(off))?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i32_at(&self, off: usize) -> VmResult<i32> {
        Ok(self.u32_at(off)? as i32)
    }

    pub fn i64_at(&self, off: usize) -> VmResult<i64> {
        let b = self.bytecode.get(off..off + 8).ok_or_else(|| self.oob(off))?;
        Ok(i64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

/// The emulation engine: owns the session and the hook registries, borrows
/// the dex index, and executes frames.
pub struct Vm<'a> {
    pub(crate) index: Option<&'a DexIndex>,
    pub session: Session,
    pub hooks: HookRegistry,
    pub(crate) depth: usize,
    /// String table used when no index is attached (raw bytecode runs).
    pub(crate) inline_strings: Vec<String>,
}

impl<'a> Vm<'a> {
    /// An engine over a parsed archive.
    #[must_use]
    pub fn new(index: &'a DexIndex, session: Session) -> Self {
        let hooks = HookRegistry::new(&session.config);
        Self {
            index: Some(index),
            session,
            hooks,
            depth: 0,
            inline_strings: Vec::new(),
        }
    }

    /// An engine without an archive behind it: only hooks and raw bytecode.
    #[must_use]
    pub fn detached(session: Session) -> Self {
        let hooks = HookRegistry::new(&session.config);
        Self {
            index: None,
            session,
            hooks,
            depth: 0,
            inline_strings: Vec::new(),
        }
    }

    /// Supplies the string table used by `const-string` in detached runs.
    #[must_use]
    pub fn with_strings(mut self, strings: Vec<String>) -> Self {
        self.inline_strings = strings;
        self
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<&'a DexIndex> {
        self.index
    }

    /// Resolves a container-local string pool index.
    pub(crate) fn lookup_string(&self, container: usize, local: usize) -> VmResult<String> {
        if let Some(index) = self.index {
            let global = index.global_string_index(container, local)?;
            return Ok(index.string(global)?.to_string());
        }
        self.inline_strings
            .get(local)
            .cloned()
            .ok_or(VmError::StringNotFound { index: local })
    }

    /// Resolves a container-local type pool index, when an index is
    /// attached.
    pub(crate) fn type_desc(&self, container: usize, idx: usize) -> Option<String> {
        let index = self.index?;
        let c = index.container(container).ok()?;
        c.type_desc(idx).ok().map(str::to_string)
    }

    /// Executes one instruction.
    pub fn step(&mut self, frame: &mut Frame) -> VmResult<()> {
        let opcode = frame.u8_at(frame.pc)?;
        crate::opcodes::execute(self, frame, opcode)
    }

    /// Runs the frame to completion under a step budget.
    pub fn run(&mut self, frame: &mut Frame, max_steps: usize) -> VmResult<Option<Value>> {
        for _ in 0..max_steps {
            if frame.finished {
                return Ok(frame.last_result.clone());
            }
            if frame.pc >= frame.bytecode.len() {
                // falling off the end of the method body
                return Err(VmError::PcOutOfRange {
                    pc: frame.pc,
                    method: frame.method.clone(),
                });
            }
            self.step(frame)?;
        }
        if frame.finished {
            return Ok(frame.last_result.clone());
        }
        Err(VmError::StepLimit {
            method: frame.method.clone(),
            limit: max_steps,
        })
    }
}
