//! Opcode handlers, one module per instruction family.
//!
//! The dispatch is a statically-known match on the opcode byte; handlers
//! read their operands from the byte stream at `frame.pc` and either
//! advance the pc by the instruction length (two bytes per code unit) or
//! branch.

mod arith;
mod array;
mod const_;
mod control;
mod field;
pub(crate) mod invoke;
mod moves;
mod object;
mod ret;

use crate::errors::{VmError, VmResult};
use crate::interp::{Frame, Vm};

pub(crate) fn execute(vm: &mut Vm, frame: &mut Frame, opcode: u8) -> VmResult<()> {
    match opcode {
        0x00 => nop(frame),
        0x01..=0x09 => moves::move_op(frame, opcode),
        0x0a..=0x0c => moves::move_result(frame, opcode),
        0x0d => moves::move_exception(frame),
        0x0e..=0x11 => ret::return_op(frame, opcode),
        0x12..=0x1c => const_::const_op(vm, frame, opcode),
        0x1d | 0x1e => object::monitor_op(frame),
        0x1f => object::check_cast(frame),
        0x20 => object::instance_of(vm, frame),
        0x21 => array::array_length(frame),
        0x22 => object::new_instance(vm, frame),
        0x23 => array::new_array(vm, frame),
        0x24 | 0x25 => array::filled_new_array(vm, frame, opcode),
        0x26 => array::fill_array_data(frame),
        0x27 => object::throw_op(frame),
        0x28..=0x2a => control::goto_op(frame, opcode),
        0x2b => control::packed_switch(frame),
        0x2c => control::sparse_switch(frame),
        0x2d..=0x31 => arith::cmp_op(frame, opcode),
        0x32..=0x37 => control::if_test(frame, opcode),
        0x38..=0x3d => control::if_test_z(frame, opcode),
        0x44..=0x4a => array::aget(frame, opcode),
        0x4b..=0x51 => array::aput(frame, opcode),
        0x52..=0x58 => field::iget(frame, opcode),
        0x59..=0x5f => field::iput(frame, opcode),
        0x60..=0x66 => field::sget(vm, frame, opcode),
        0x67..=0x6d => field::sput(vm, frame, opcode),
        0x6e..=0x72 | 0x74..=0x78 => invoke::invoke_op(vm, frame, opcode),
        0x7b..=0x8f => arith::unop(frame, opcode),
        0x90..=0xaf => arith::binop(frame, opcode),
        0xb0..=0xcf => arith::binop_2addr(frame, opcode),
        0xd0..=0xd7 => arith::binop_lit16(frame, opcode),
        0xd8..=0xe2 => arith::binop_lit8(frame, opcode),
        _ => Err(VmError::UnknownOpcode {
            opcode,
            pc: frame.pc,
            method: frame.method.clone(),
        }),
    }
}

// nop, or one of the payload pseudo-instructions when control falls
// through onto it (branches normally jump around payloads).
fn nop(frame: &mut Frame) -> VmResult<()> {
    let pc = frame.pc;
    let units = match frame.u8_at(pc + 1) {
        Ok(0x01) => frame.u16_at(pc + 2)? as usize * 2 + 4,
        Ok(0x02) => frame.u16_at(pc + 2)? as usize * 4 + 2,
        Ok(0x03) => {
            let width = frame.u16_at(pc + 2)? as usize;
            let size = frame.u32_at(pc + 4)? as usize;
            (size * width + 1) / 2 + 4
        }
        _ => 1,
    };
    frame.pc += units * 2;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::errors::VmError;
    use crate::interp::{Frame, Vm};
    use crate::session::{MockConfig, Session};
    use crate::value::Value;
    use dt_dex::TraceMap;
    use std::sync::Arc;

    fn vm() -> Vm<'static> {
        Vm::detached(Session::new(MockConfig::default()))
    }

    fn frame(bytecode: &[u8], regs: usize, ins: usize) -> Frame {
        Frame::new(
            "Ltest;->m",
            0,
            bytecode.to_vec(),
            Arc::new(TraceMap::new()),
            regs,
            ins,
        )
    }

    fn run_with_args(bytecode: &[u8], regs: usize, args: &[Value]) -> Option<Value> {
        let mut vm = vm();
        let mut f = frame(bytecode, regs, args.len());
        f.load_args(args).unwrap();
        vm.run(&mut f, 1_000).unwrap()
    }

    #[test]
    fn add_two_args() {
        // add-int v0, v1, v2; return v0
        let code = [0x90, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let out = run_with_args(&code, 3, &[Value::Int(2), Value::Int(3)]);
        assert_eq!(out.unwrap().as_int(), 5);
    }

    #[test]
    fn int_add_wraps() {
        let code = [0x90, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let out = run_with_args(&code, 3, &[Value::Int(i32::MAX), Value::Int(1)]);
        assert_eq!(out.unwrap().as_int(), i32::MIN);
    }

    #[test]
    fn shift_count_is_masked() {
        // shl-int v0, v1, v2; return v0
        let code = [0x98, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let masked = run_with_args(&code, 3, &[Value::Int(1), Value::Int(33)]);
        let direct = run_with_args(&code, 3, &[Value::Int(1), Value::Int(1)]);
        assert_eq!(masked.unwrap().as_int(), direct.unwrap().as_int());
    }

    #[test]
    fn shr_is_arithmetic_ushr_is_logical() {
        let shr = [0x99, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let ushr = [0x9a, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let args = [Value::Int(-8), Value::Int(1)];
        assert_eq!(run_with_args(&shr, 3, &args).unwrap().as_int(), -4);
        assert_eq!(
            run_with_args(&ushr, 3, &args).unwrap().as_int(),
            0x7fff_fffc
        );
    }

    #[test]
    fn div_by_zero_is_fatal() {
        let code = [0x93, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let mut vm = vm();
        let mut f = frame(&code, 3, 2);
        f.load_args(&[Value::Int(10), Value::Int(0)]).unwrap();
        assert!(matches!(
            vm.run(&mut f, 1_000),
            Err(VmError::DivisionByZero { .. })
        ));
    }

    #[test]
    fn long_add_wraps_at_64_bits() {
        // const-wide v0, i64::MAX; const-wide/16 v2, 1;
        // add-long v0, v0, v2; return-wide v0
        let mut code = vec![0x18, 0x00];
        code.extend_from_slice(&i64::MAX.to_le_bytes());
        code.extend_from_slice(&[0x16, 0x02, 0x01, 0x00]);
        code.extend_from_slice(&[0x9b, 0x00, 0x00, 0x02]);
        code.extend_from_slice(&[0x10, 0x00]);
        let out = run_with_args(&code, 4, &[]);
        assert_eq!(out.unwrap().as_long(), i64::MIN);
    }

    #[test]
    fn lit8_rsub_reverses_operands() {
        // const/4 v1, 5; rsub-int/lit8 v0, v1, 3; return v0
        let code = [0x12, 0x51, 0xd9, 0x00, 0x01, 0x03, 0x0f, 0x00];
        assert_eq!(run_with_args(&code, 2, &[]).unwrap().as_int(), -2);
    }

    #[test]
    fn move_chain_copies_values() {
        // const/4 v0, 5; move v1, v0; add-int/lit8 v2, v1, 3; return v2
        let code = [0x12, 0x50, 0x01, 0x01, 0xd8, 0x02, 0x01, 0x03, 0x0f, 0x02];
        assert_eq!(run_with_args(&code, 3, &[]).unwrap().as_int(), 8);
    }

    #[test]
    fn cmp_nan_bias() {
        // cmpl-float v0, v1, v2; return v0 / cmpg variant
        let cmpl = [0x2d, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let cmpg = [0x2e, 0x00, 0x01, 0x02, 0x0f, 0x00];
        let args = [Value::Float(f32::NAN), Value::Float(1.0)];
        assert_eq!(run_with_args(&cmpl, 3, &args).unwrap().as_int(), -1);
        assert_eq!(run_with_args(&cmpg, 3, &args).unwrap().as_int(), 1);
    }

    #[test]
    fn float_to_int_saturates() {
        // float-to-int v0, v1; return v0
        let code = [0x87, 0x10, 0x0f, 0x00];
        let out = run_with_args(&code, 2, &[Value::Float(1e20)]);
        assert_eq!(out.unwrap().as_int(), i32::MAX);
        let out = run_with_args(&code, 2, &[Value::Float(f32::NAN)]);
        assert_eq!(out.unwrap().as_int(), 0);
    }

    #[test]
    fn const_string_resolves_the_pool() {
        // const-string v0, string@0; return-object v0
        let code = [0x1a, 0x00, 0x00, 0x00, 0x11, 0x00];
        let mut vm = vm().with_strings(vec!["hello".to_string()]);
        let mut f = frame(&code, 1, 0);
        let out = vm.run(&mut f, 100).unwrap().unwrap();
        assert_eq!(out.host_str().as_deref(), Some("hello"));
    }

    #[test]
    fn const_string_bad_index_is_fatal() {
        let code = [0x1a, 0x00, 0x07, 0x00, 0x11, 0x00];
        let mut vm = vm();
        let mut f = frame(&code, 1, 0);
        assert!(matches!(
            vm.run(&mut f, 100),
            Err(VmError::StringNotFound { index: 7 })
        ));
    }

    #[test]
    fn packed_switch_selects_and_defaults() {
        let mut code = vec![0x2b, 0x01, 0x0f, 0x00, 0x00, 0x00]; // packed-switch v1, +15
        code.extend_from_slice(&[0x13, 0x00, 0x63, 0x00, 0x0f, 0x00]); // default: 99
        code.extend_from_slice(&[0x13, 0x00, 0x0a, 0x00, 0x0f, 0x00]); // case 0: 10
        code.extend_from_slice(&[0x13, 0x00, 0x14, 0x00, 0x0f, 0x00]); // case 1: 20
        code.extend_from_slice(&[0x13, 0x00, 0x1e, 0x00, 0x0f, 0x00]); // case 2: 30
        code.extend_from_slice(&[0x00, 0x01, 0x03, 0x00]); // payload, 3 entries
        code.extend_from_slice(&0i32.to_le_bytes()); // first key
        for target in [6i32, 9, 12] {
            code.extend_from_slice(&target.to_le_bytes());
        }
        let out = run_with_args(&code, 2, &[Value::Int(1)]);
        assert_eq!(out.unwrap().as_int(), 20);
        let out = run_with_args(&code, 2, &[Value::Int(5)]);
        assert_eq!(out.unwrap().as_int(), 99);
    }

    #[test]
    fn sparse_switch_binary_searches() {
        let mut code = vec![0x2c, 0x01, 0x08, 0x00, 0x00, 0x00]; // sparse-switch v1, +8
        code.extend_from_slice(&[0x13, 0x00, 0x63, 0x00, 0x0f, 0x00]); // default: 99
        code.extend_from_slice(&[0x12, 0x70, 0x0f, 0x00]); // match: 7
        code.extend_from_slice(&[0x00, 0x02, 0x02, 0x00]); // payload, 2 keys
        for key in [-100i32, 1000] {
            code.extend_from_slice(&key.to_le_bytes());
        }
        // both keys branch to the matching handler at +6
        for target in [6i32, 6] {
            code.extend_from_slice(&target.to_le_bytes());
        }
        let out = run_with_args(&code, 2, &[Value::Int(1000)]);
        assert_eq!(out.unwrap().as_int(), 7);
        let out = run_with_args(&code, 2, &[Value::Int(-100)]);
        assert_eq!(out.unwrap().as_int(), 7);
        let out = run_with_args(&code, 2, &[Value::Int(3)]);
        assert_eq!(out.unwrap().as_int(), 99);
    }

    #[test]
    fn filled_new_array_then_sum() {
        let mut code = vec![
            0x12, 0x11, // const/4 v1, 1
            0x12, 0x22, // const/4 v2, 2
            0x12, 0x33, // const/4 v3, 3
            0x12, 0x44, // const/4 v4, 4
            0x12, 0x55, // const/4 v5, 5
            0x24, 0x55, 0x00, 0x00, 0x21, 0x43, // filled-new-array {v1..v5}
            0x0c, 0x00, // move-result-object v0
            0x12, 0x06, // const/4 v6, 0 (acc)
        ];
        for idx in 0u8..5 {
            code.extend_from_slice(&[0x12, (idx << 4) | 0x07]); // const/4 v7, idx
            code.extend_from_slice(&[0x44, 0x01, 0x00, 0x07]); // aget v1, v0, v7
            code.extend_from_slice(&[0x90, 0x06, 0x06, 0x01]); // add-int v6, v6, v1
        }
        code.extend_from_slice(&[0x0f, 0x06]); // return v6
        let out = run_with_args(&code, 8, &[]);
        assert_eq!(out.unwrap().as_int(), 15);
    }

    #[test]
    fn fill_array_data_populates() {
        let code = [
            0x12, 0x31, // const/4 v1, 3
            0x23, 0x10, 0x00, 0x00, // new-array v0, v1, type@0
            0x26, 0x00, 0x07, 0x00, 0x00, 0x00, // fill-array-data v0, +7
            0x12, 0x11, // const/4 v1, 1
            0x44, 0x00, 0x00, 0x01, // aget v0, v0, v1
            0x0f, 0x00, // return v0
            0x00, 0x03, 0x01, 0x00, // payload ident, width 1
            0x03, 0x00, 0x00, 0x00, // size 3
            0x07, 0x08, 0x09, 0x00, // data + padding
        ];
        let out = run_with_args(&code, 2, &[]);
        assert_eq!(out.unwrap().as_int(), 8);
    }

    #[test]
    fn negative_array_length_is_fatal() {
        // const/4 v1, -1; new-array v0, v1, type@0
        let code = [0x12, 0xf1, 0x23, 0x10, 0x00, 0x00];
        let mut vm = vm();
        let mut f = frame(&code, 2, 0);
        assert!(matches!(
            vm.run(&mut f, 100),
            Err(VmError::NegativeArrayLength { len: -1, .. })
        ));
    }

    #[test]
    fn array_bounds_are_fatal() {
        let code = [
            0x12, 0x21, // const/4 v1, 2
            0x23, 0x10, 0x00, 0x00, // new-array v0, v1, type@0
            0x12, 0x51, // const/4 v1, 5
            0x44, 0x02, 0x00, 0x01, // aget v2, v0, v1
        ];
        let mut vm = vm();
        let mut f = frame(&code, 3, 0);
        assert!(matches!(
            vm.run(&mut f, 100),
            Err(VmError::ArrayIndexOutOfBounds { index: 5, len: 2, .. })
        ));
    }

    #[test]
    fn throw_traps() {
        let code = [0x27, 0x00];
        let mut vm = vm();
        let mut f = frame(&code, 1, 0);
        assert!(matches!(vm.run(&mut f, 100), Err(VmError::Thrown { .. })));
    }

    #[test]
    fn pc_advances_by_instruction_length() {
        let mut vm = vm();
        // const/16 v0, 1000 is two code units
        let mut f = frame(&[0x13, 0x00, 0xe8, 0x03, 0x0e, 0x00], 1, 0);
        vm.step(&mut f).unwrap();
        assert_eq!(f.pc, 4);
    }

    #[test]
    fn static_round_trip_through_store() {
        let code = [
            0x13, 0x00, 0x07, 0x00, // const/16 v0, 7
            0x67, 0x00, 0x00, 0x00, // sput v0, field@0
            0x60, 0x01, 0x00, 0x00, // sget v1, field@0
            0x0f, 0x01, // return v1
        ];
        let mut trace = TraceMap::new();
        trace.insert(4, ("sput v0, LT;->sKey:I".to_string(), 2));
        trace.insert(8, ("sget v1, LT;->sKey:I".to_string(), 2));
        let mut vm = vm();
        let mut f = Frame::new("LT;->set", 0, code.to_vec(), Arc::new(trace), 2, 0);
        let out = vm.run(&mut f, 100).unwrap();
        assert_eq!(out.unwrap().as_int(), 7);
        assert!(vm.session.statics.has("LT;", "sKey"));
    }

    #[test]
    fn base64_mock_through_invoke() {
        // v0 = "aGk="; const/4 v1, 0; invoke-static {v0, v1}, Base64.decode;
        // move-result-object v0; return-object v0
        let code = [
            0x12, 0x01, // const/4 v1, 0
            0x71, 0x20, 0x00, 0x00, 0x10, 0x00, // invoke-static {v0, v1}
            0x0c, 0x00, // move-result-object v0
            0x11, 0x00, // return-object v0
        ];
        let mut trace = TraceMap::new();
        trace.insert(
            2,
            (
                "invoke-static {v0, v1}, Landroid/util/Base64;->decode(Ljava/lang/String;I)[B"
                    .to_string(),
                3,
            ),
        );
        let mut vm = vm();
        let mut f = Frame::new("LT;->dec", 0, code.to_vec(), Arc::new(trace), 2, 0);
        f.set_reg(0, Value::string("aGk=")).unwrap();
        let out = vm.run(&mut f, 100).unwrap().unwrap();
        let Value::Array(arr) = out else { panic!("expected a byte array") };
        assert_eq!(arr.borrow().to_bytes(), vec![0x68, 0x69]);
    }

    #[test]
    fn unmocked_invoke_yields_null_and_continues() {
        let code = [
            0x71, 0x10, 0x00, 0x00, 0x00, 0x00, // invoke-static {v0}
            0x0c, 0x00, // move-result-object v0
            0x11, 0x00, // return-object v0
        ];
        let mut trace = TraceMap::new();
        trace.insert(
            0,
            (
                "invoke-static {v0}, Lcom/app/Gone;->vanish(I)Ljava/lang/String;".to_string(),
                3,
            ),
        );
        let mut vm = vm();
        let mut f = Frame::new("LT;->m", 0, code.to_vec(), Arc::new(trace), 1, 0);
        let out = vm.run(&mut f, 100).unwrap();
        assert!(out.unwrap().is_null());
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let mut vm = vm();
        let mut f = frame(&[0x3e, 0x00], 1, 0);
        assert!(matches!(
            vm.run(&mut f, 100),
            Err(VmError::UnknownOpcode { opcode: 0x3e, .. })
        ));
    }

    #[test]
    fn string_builder_round_trip() {
        // new StringBuilder; init; append "hi"; toString; return
        let code = [
            0x22, 0x00, 0x00, 0x00, // new-instance v0, type@0
            0x70, 0x10, 0x00, 0x00, 0x00, 0x00, // invoke-direct {v0} <init>
            0x6e, 0x20, 0x01, 0x00, 0x20, 0x00, // invoke-virtual {v0, v2} append
            0x6e, 0x10, 0x02, 0x00, 0x00, 0x00, // invoke-virtual {v0} toString
            0x0c, 0x01, // move-result-object v1
            0x11, 0x01, // return-object v1
        ];
        let mut trace = TraceMap::new();
        trace.insert(0, ("new-instance v0, Ljava/lang/StringBuilder;".to_string(), 2));
        trace.insert(
            4,
            (
                "invoke-direct {v0}, Ljava/lang/StringBuilder;-><init>()V".to_string(),
                3,
            ),
        );
        trace.insert(
            10,
            (
                "invoke-virtual {v0, v2}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;"
                    .to_string(),
                3,
            ),
        );
        trace.insert(
            16,
            (
                "invoke-virtual {v0}, Ljava/lang/StringBuilder;->toString()Ljava/lang/String;"
                    .to_string(),
                3,
            ),
        );
        let mut vm = vm();
        let mut f = Frame::new("LT;->sb", 0, code.to_vec(), Arc::new(trace), 3, 0);
        f.set_reg(2, Value::string("hi")).unwrap();
        let out = vm.run(&mut f, 100).unwrap().unwrap();
        assert_eq!(out.host_str().as_deref(), Some("hi"));
    }
}
