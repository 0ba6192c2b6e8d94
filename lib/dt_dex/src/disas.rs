//! Bytecode to text.
//!
//! The textual form produced here is load-bearing: analyzers parse it to
//! find register writes, the static-field store keys off the rendered field
//! signatures, and method lookup falls back to the rendered invoke target
//! when signature normalization loses information. Every consumer and this
//! renderer therefore share one format:
//!
//! - registers as `v0`, register lists as `{v0, v1}`, ranges as `{v0 .. v4}`
//! - literals in decimal, with `/high16` literals already shifted
//! - branch offsets as `+N`/`-N` in code units, relative to the instruction
//! - fields as `Lpkg/Cls;->name:I`, methods as `Lpkg/Cls;->name(II)I`
//! - strings as quoted escaped text followed by ` // string@N` where `N` is
//!   the container-transposed (global) string pool index

use crate::container::DexContainer;
use crate::errors::{DexError, DexResult};
use crate::opcodes::{
    op_info, Format, PoolRef, FILL_ARRAY_DATA_PAYLOAD, PACKED_SWITCH_PAYLOAD,
    SPARSE_SWITCH_PAYLOAD,
};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Per-method map from instruction start (byte offset) to the rendered text
/// and the instruction length in code units.
pub type TraceMap = BTreeMap<usize, (String, usize)>;

fn u8_at(code: &[u8], off: usize, pc: usize) -> DexResult<u8> {
    code.get(off)
        .copied()
        .ok_or(DexError::TruncatedInstruction(pc))
}

fn u16_at(code: &[u8], off: usize, pc: usize) -> DexResult<u16> {
    let b = code
        .get(off..off + 2)
        .ok_or(DexError::TruncatedInstruction(pc))?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

fn i16_at(code: &[u8], off: usize, pc: usize) -> DexResult<i16> {
    Ok(u16_at(code, off, pc)? as i16)
}

fn u32_at(code: &[u8], off: usize, pc: usize) -> DexResult<u32> {
    let b = code
        .get(off..off + 4)
        .ok_or(DexError::TruncatedInstruction(pc))?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn i32_at(code: &[u8], off: usize, pc: usize) -> DexResult<i32> {
    Ok(u32_at(code, off, pc)? as i32)
}

fn i64_at(code: &[u8], off: usize, pc: usize) -> DexResult<i64> {
    let b = code
        .get(off..off + 8)
        .ok_or(DexError::TruncatedInstruction(pc))?;
    Ok(i64::from_le_bytes([
        b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
    ]))
}

/// Length in code units of the payload pseudo-instruction at `pc`, or
/// `None` when the `nop` is a plain one.
fn payload_units(code: &[u8], pc: usize) -> DexResult<Option<(&'static str, usize)>> {
    match u8_at(code, pc + 1, pc)? {
        PACKED_SWITCH_PAYLOAD => {
            let size = u16_at(code, pc + 2, pc)? as usize;
            Ok(Some(("packed-switch-payload", size * 2 + 4)))
        }
        SPARSE_SWITCH_PAYLOAD => {
            let size = u16_at(code, pc + 2, pc)? as usize;
            Ok(Some(("sparse-switch-payload", size * 4 + 2)))
        }
        FILL_ARRAY_DATA_PAYLOAD => {
            let width = u16_at(code, pc + 2, pc)? as usize;
            let size = u32_at(code, pc + 4, pc)? as usize;
            Ok(Some(("array-data-payload", (size * width + 1) / 2 + 4)))
        }
        _ => Ok(None),
    }
}

fn pool_text(
    container: &DexContainer,
    string_base: usize,
    pool: PoolRef,
    idx: usize,
) -> DexResult<String> {
    Ok(match pool {
        PoolRef::String => {
            let s = container.string(idx)?;
            format!(
                "\"{}\" // string@{}",
                s.escape_default(),
                string_base + idx
            )
        }
        PoolRef::Type => container.type_desc(idx)?.to_string(),
        PoolRef::Field => container.field_sig(idx)?,
        PoolRef::Method => container.method_sig(idx)?,
        PoolRef::CallSite => format!("call_site@{idx}"),
        PoolRef::MethodHandle => format!("method_handle@{idx}"),
        PoolRef::Proto => format!("proto@{idx}"),
        PoolRef::None => String::new(),
    })
}

/// Renders the instruction at byte offset `pc` and returns its text and
/// length in code units.
#[allow(clippy::too_many_lines)]
pub fn render_instruction(
    container: &DexContainer,
    string_base: usize,
    code: &[u8],
    pc: usize,
) -> DexResult<(String, usize)> {
    let opcode = u8_at(code, pc, pc)?;

    if opcode == 0x00 {
        if let Some((name, units)) = payload_units(code, pc)? {
            return Ok((name.to_string(), units));
        }
        return Ok(("nop".to_string(), 1));
    }

    let info = op_info(opcode).ok_or(DexError::UnknownOpcode { opcode, pc })?;
    let m = info.mnemonic;
    let units = info.format.units();

    let text = match info.format {
        Format::F10x => m.to_string(),
        Format::F12x => {
            let b = u8_at(code, pc + 1, pc)?;
            format!("{m} v{}, v{}", b & 0xf, b >> 4)
        }
        Format::F11n => {
            let b = u8_at(code, pc + 1, pc)?;
            let lit = (b as i8) >> 4;
            format!("{m} v{}, {lit}", b & 0xf)
        }
        Format::F11x => format!("{m} v{}", u8_at(code, pc + 1, pc)?),
        Format::F10t => {
            let off = u8_at(code, pc + 1, pc)? as i8;
            format!("{m} {off:+}")
        }
        Format::F20t => format!("{m} {:+}", i16_at(code, pc + 2, pc)?),
        Format::F30t => format!("{m} {:+}", i32_at(code, pc + 2, pc)?),
        Format::F22x => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, v{}", u16_at(code, pc + 2, pc)?)
        }
        Format::F32x => {
            let a = u16_at(code, pc + 2, pc)?;
            format!("{m} v{a}, v{}", u16_at(code, pc + 4, pc)?)
        }
        Format::F21t => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, {:+}", i16_at(code, pc + 2, pc)?)
        }
        Format::F21s => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, {}", i16_at(code, pc + 2, pc)?)
        }
        Format::F21h => {
            let a = u8_at(code, pc + 1, pc)?;
            let lit = i16_at(code, pc + 2, pc)?;
            // render the effective value so analyzers parse it directly
            if m == "const/high16" {
                format!("{m} v{a}, {}", i64::from(lit) << 16)
            } else {
                format!("{m} v{a}, {}", i64::from(lit) << 48)
            }
        }
        Format::F21c => {
            let a = u8_at(code, pc + 1, pc)?;
            let idx = u16_at(code, pc + 2, pc)? as usize;
            format!(
                "{m} v{a}, {}",
                pool_text(container, string_base, info.pool, idx)?
            )
        }
        Format::F23x => {
            let a = u8_at(code, pc + 1, pc)?;
            let b = u8_at(code, pc + 2, pc)?;
            let c = u8_at(code, pc + 3, pc)?;
            format!("{m} v{a}, v{b}, v{c}")
        }
        Format::F22b => {
            let a = u8_at(code, pc + 1, pc)?;
            let b = u8_at(code, pc + 2, pc)?;
            let lit = u8_at(code, pc + 3, pc)? as i8;
            format!("{m} v{a}, v{b}, {lit}")
        }
        Format::F22t => {
            let b = u8_at(code, pc + 1, pc)?;
            format!(
                "{m} v{}, v{}, {:+}",
                b & 0xf,
                b >> 4,
                i16_at(code, pc + 2, pc)?
            )
        }
        Format::F22s => {
            let b = u8_at(code, pc + 1, pc)?;
            format!(
                "{m} v{}, v{}, {}",
                b & 0xf,
                b >> 4,
                i16_at(code, pc + 2, pc)?
            )
        }
        Format::F22c => {
            let b = u8_at(code, pc + 1, pc)?;
            let idx = u16_at(code, pc + 2, pc)? as usize;
            format!(
                "{m} v{}, v{}, {}",
                b & 0xf,
                b >> 4,
                pool_text(container, string_base, info.pool, idx)?
            )
        }
        Format::F31t => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, {:+}", i32_at(code, pc + 2, pc)?)
        }
        Format::F31i => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, {}", i32_at(code, pc + 2, pc)?)
        }
        Format::F31c => {
            let a = u8_at(code, pc + 1, pc)?;
            let idx = u32_at(code, pc + 2, pc)? as usize;
            format!(
                "{m} v{a}, {}",
                pool_text(container, string_base, info.pool, idx)?
            )
        }
        Format::F35c => {
            let b1 = u8_at(code, pc + 1, pc)?;
            let count = (b1 >> 4) as usize;
            let g = b1 & 0xf;
            let idx = u16_at(code, pc + 2, pc)? as usize;
            let dc = u8_at(code, pc + 4, pc)?;
            let fe = u8_at(code, pc + 5, pc)?;
            let regs = [dc & 0xf, dc >> 4, fe & 0xf, fe >> 4, g];
            let mut list = String::new();
            for (i, reg) in regs.iter().take(count.min(5)).enumerate() {
                if i > 0 {
                    list.push_str(", ");
                }
                let _ = write!(list, "v{reg}");
            }
            format!(
                "{m} {{{list}}}, {}",
                pool_text(container, string_base, info.pool, idx)?
            )
        }
        Format::F3rc => {
            let count = u8_at(code, pc + 1, pc)? as usize;
            let idx = u16_at(code, pc + 2, pc)? as usize;
            let first = u16_at(code, pc + 4, pc)? as usize;
            let list = if count == 0 {
                String::new()
            } else {
                format!("v{first} .. v{}", first + count - 1)
            };
            format!(
                "{m} {{{list}}}, {}",
                pool_text(container, string_base, info.pool, idx)?
            )
        }
        Format::F45cc | Format::F4rcc => {
            // method-handle invokes are out of the emulated subset; the
            // mnemonic and a correct length keep the trace map aligned
            let idx = u16_at(code, pc + 2, pc)? as usize;
            format!("{m} method@{idx}")
        }
        Format::F51l => {
            let a = u8_at(code, pc + 1, pc)?;
            format!("{m} v{a}, {}", i64_at(code, pc + 2, pc)?)
        }
    };

    Ok((text, units))
}

/// Builds the `pc -> (text, units)` trace map of a method body.
///
/// Every byte offset the interpreter can fetch from appears as a key,
/// payload pseudo-instructions included.
pub fn build_trace_map(
    container: &DexContainer,
    string_base: usize,
    code: &[u8],
) -> DexResult<TraceMap> {
    let mut map = TraceMap::new();
    let mut pc = 0;
    while pc < code.len() {
        let (text, units) = render_instruction(container, string_base, code, pc)?;
        map.insert(pc, (text, units));
        pc += units * 2;
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FieldId, MethodId, Proto};

    fn test_container() -> DexContainer {
        DexContainer {
            name: "classes.dex".to_string(),
            data: Vec::new(),
            strings: vec!["hello".to_string(), "sKey".to_string()],
            types: vec!["I".to_string(), "LT;".to_string(), "[B".to_string()],
            protos: vec![Proto {
                return_type: "I".to_string(),
                params: vec!["I".to_string(), "I".to_string()],
            }],
            fields: vec![FieldId {
                class: "LT;".to_string(),
                name: "sKey".to_string(),
                type_desc: "I".to_string(),
            }],
            methods: vec![MethodId {
                class: "LT;".to_string(),
                name: "add".to_string(),
                proto: 0,
            }],
            class_defs: Vec::new(),
        }
    }

    #[test]
    fn renders_arith_and_moves() {
        let c = test_container();
        // add-int v0, v1, v2
        let (text, units) = render_instruction(&c, 0, &[0x90, 0x00, 0x01, 0x02], 0).unwrap();
        assert_eq!(text, "add-int v0, v1, v2");
        assert_eq!(units, 2);
        // move v0, v1
        let (text, units) = render_instruction(&c, 0, &[0x01, 0x10], 0).unwrap();
        assert_eq!(text, "move v0, v1");
        assert_eq!(units, 1);
    }

    #[test]
    fn renders_const_literals() {
        let c = test_container();
        // const/4 v0, -3
        let (text, _) = render_instruction(&c, 0, &[0x12, 0xd0], 0).unwrap();
        assert_eq!(text, "const/4 v0, -3");
        // const/16 v0, 1000
        let (text, _) = render_instruction(&c, 0, &[0x13, 0x00, 0xe8, 0x03], 0).unwrap();
        assert_eq!(text, "const/16 v0, 1000");
        // const/high16 v0, 0x10000 rendered as its effective value
        let (text, _) = render_instruction(&c, 0, &[0x15, 0x00, 0x01, 0x00], 0).unwrap();
        assert_eq!(text, "const/high16 v0, 65536");
    }

    #[test]
    fn renders_pool_references() {
        let c = test_container();
        // const-string v0, string@0, with a container base of 10
        let (text, _) = render_instruction(&c, 10, &[0x1a, 0x00, 0x00, 0x00], 0).unwrap();
        assert_eq!(text, "const-string v0, \"hello\" // string@10");
        // sget v0, field@0
        let (text, _) = render_instruction(&c, 0, &[0x60, 0x00, 0x00, 0x00], 0).unwrap();
        assert_eq!(text, "sget v0, LT;->sKey:I");
        // invoke-static {v0, v1}, method@0
        let (text, units) =
            render_instruction(&c, 0, &[0x71, 0x20, 0x00, 0x00, 0x10, 0x00], 0).unwrap();
        assert_eq!(text, "invoke-static {v0, v1}, LT;->add(II)I");
        assert_eq!(units, 3);
        // invoke-static/range {v4 .. v6}, method@0
        let (text, _) =
            render_instruction(&c, 0, &[0x77, 0x03, 0x00, 0x00, 0x04, 0x00], 0).unwrap();
        assert_eq!(text, "invoke-static/range {v4 .. v6}, LT;->add(II)I");
    }

    #[test]
    fn trace_map_covers_payloads() {
        let c = test_container();
        // packed-switch v0, +3 followed by a 1-entry payload
        let code = [
            0x2b, 0x00, 0x03, 0x00, 0x00, 0x00, // packed-switch v0, +3
            0x00, 0x01, 0x01, 0x00, // payload header: ident, size=1
            0x00, 0x00, 0x00, 0x00, // first key
            0x05, 0x00, 0x00, 0x00, // target
        ];
        let map = build_trace_map(&c, 0, &code).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&0].0, "packed-switch v0, +3");
        assert_eq!(map[&6], ("packed-switch-payload".to_string(), 6));
    }

    #[test]
    fn trace_map_pcs_are_contiguous() {
        let c = test_container();
        let code = [
            0x12, 0x50, // const/4 v0, 5
            0x90, 0x00, 0x01, 0x02, // add-int v0, v1, v2
            0x0f, 0x00, // return v0
        ];
        let map = build_trace_map(&c, 0, &code).unwrap();
        let mut pc = 0;
        for (k, (_, units)) in &map {
            assert_eq!(*k, pc);
            pc += units * 2;
        }
        assert_eq!(pc, code.len());
    }
}
