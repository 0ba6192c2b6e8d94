//! Hooks for the `java.lang` / `java.util` surface the decryptors lean on.

use crate::errors::VmResult;
use crate::interp::Vm;
use crate::value::{elem_default, ArrayObj, HostValue, Instance, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn boxed(class: &str, payload: HostValue) -> Value {
    Value::Object(Rc::new(RefCell::new(Instance::with_payload(class, payload))))
}

// Text a value contributes when appended or stringified. `char_mode` is
// set when the call descriptor says the argument is a char.
fn text_of(value: &Value, char_mode: bool) -> String {
    if char_mode {
        let code = value.as_int();
        return match char::from_u32(code as u32) {
            Some(c) => c.to_string(),
            None => '\u{fffd}'.to_string(),
        };
    }
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => char::from_u32(u32::from(*c))
            .unwrap_or('\u{fffd}')
            .to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        other => other
            .host_str()
            .unwrap_or_else(|| crate::value::format_value(other)),
    }
}

/// `StringBuilder.append(..)`: mutates the backing host string and returns
/// the receiver.
pub(crate) fn sb_append(_vm: &mut Vm<'_>, args: &[Value], trace: &str) -> VmResult<Option<Value>> {
    let Some(Value::Object(sb)) = args.first() else {
        return Ok(Some(Value::Null));
    };
    let char_mode = trace.contains("(C)");
    let appended = args.get(1).map_or(String::new(), |v| text_of(v, char_mode));
    let mut sb_mut = sb.borrow_mut();
    let current = match &sb_mut.payload {
        Some(HostValue::Str(s)) => s.clone(),
        _ => String::new(),
    };
    sb_mut.payload = Some(HostValue::Str(current + &appended));
    drop(sb_mut);
    Ok(Some(args[0].clone()))
}

/// `toString()` over anything carrying a host string.
pub(crate) fn to_string(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    match args.first() {
        Some(receiver) => match receiver.host_str() {
            Some(s) => Ok(Some(Value::string(s))),
            None => Ok(Some(receiver.clone())),
        },
        None => Ok(Some(Value::Null)),
    }
}

/// `String.length()` in UTF-16 code units.
pub(crate) fn string_length(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let len = args
        .first()
        .and_then(Value::host_str)
        .map_or(0, |s| s.encode_utf16().count());
    Ok(Some(Value::Int(len as i32)))
}

/// `String.charAt(int)`.
pub(crate) fn char_at(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let idx = args.get(1).map_or(0, Value::as_int);
    let unit = args
        .first()
        .and_then(Value::host_str)
        .and_then(|s| s.encode_utf16().nth(idx.max(0) as usize));
    Ok(Some(Value::Char(unit.unwrap_or(0))))
}

/// `String.toCharArray()`.
pub(crate) fn to_char_array(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let s = args.first().and_then(Value::host_str).unwrap_or_default();
    let data = s.encode_utf16().map(Value::Char).collect();
    Ok(Some(Value::array(ArrayObj {
        elem_type: "C".to_string(),
        data,
    })))
}

/// `String.getBytes()`: UTF-16LE payload.
pub(crate) fn get_bytes(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let s = args.first().and_then(Value::host_str).unwrap_or_default();
    let bytes: Vec<u8> = s.encode_utf16().flat_map(u16::to_le_bytes).collect();
    Ok(Some(Value::array(ArrayObj::from_bytes(&bytes))))
}

/// `String.intern()`: identity under emulation.
pub(crate) fn intern(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    Ok(Some(args.first().cloned().unwrap_or(Value::Null)))
}

/// `clone()` on arrays and instances.
pub(crate) fn clone_value(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    Ok(Some(match args.first() {
        Some(Value::Array(arr)) => Value::array(arr.borrow().clone()),
        Some(Value::Object(obj)) => {
            Value::Object(Rc::new(RefCell::new(obj.borrow().clone())))
        }
        _ => Value::Null,
    }))
}

/// `PrintStream.println(..)`: routed to the log, execution side effects
/// only.
pub(crate) fn println(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    if let Some(arg) = args.get(1) {
        log::debug!("stdout: {}", text_of(arg, false));
    }
    Ok(None)
}

pub(crate) fn int_value(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let v = args.first().map(Value::unboxed).unwrap_or(Value::Null);
    Ok(Some(Value::Int(v.as_int())))
}

pub(crate) fn long_value(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let v = args.first().map(Value::unboxed).unwrap_or(Value::Null);
    Ok(Some(Value::Long(v.as_long())))
}

pub(crate) fn boolean_value(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let v = args.first().map(Value::unboxed).unwrap_or(Value::Null);
    let b = match v {
        Value::Bool(b) => b,
        other => other.as_int() != 0,
    };
    Ok(Some(Value::Bool(b)))
}

/// `String.valueOf(..)` in its common overloads.
pub(crate) fn string_value_of(
    _vm: &mut Vm<'_>,
    args: &[Value],
    trace: &str,
) -> VmResult<Option<Value>> {
    let Some(arg) = args.first() else {
        return Ok(Some(Value::string("null")));
    };
    let text = match arg {
        Value::Array(arr) if arr.borrow().elem_type == "C" => arr
            .borrow()
            .data
            .iter()
            .map(|v| text_of(v, true))
            .collect::<String>(),
        other => text_of(other, trace.contains("(C)")),
    };
    Ok(Some(Value::string(text)))
}

fn parse_radix(args: &[Value]) -> u32 {
    match args.get(1) {
        Some(Value::Int(r)) if (2..=36).contains(r) => *r as u32,
        _ => 10,
    }
}

/// `Integer.parseInt(String[, int])`; unparsable input reads as zero.
pub(crate) fn parse_int(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let v = args
        .first()
        .and_then(Value::host_str)
        .and_then(|s| i32::from_str_radix(s.trim(), parse_radix(args)).ok())
        .unwrap_or(0);
    Ok(Some(Value::Int(v)))
}

/// `Long.parseLong(String[, int])`.
pub(crate) fn parse_long(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let v = args
        .first()
        .and_then(Value::host_str)
        .and_then(|s| i64::from_str_radix(s.trim(), parse_radix(args)).ok())
        .unwrap_or(0);
    Ok(Some(Value::Long(v)))
}

pub(crate) fn box_int(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let v = args.first().map_or(0, Value::as_int);
    Ok(Some(boxed(
        "Ljava/lang/Integer;",
        HostValue::Int(i64::from(v)),
    )))
}

pub(crate) fn box_long(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let v = args.first().map_or(0, Value::as_long);
    Ok(Some(boxed("Ljava/lang/Long;", HostValue::Int(v))))
}

pub(crate) fn box_boolean(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let b = match args.first() {
        Some(Value::Bool(b)) => *b,
        Some(other) => other.unboxed().as_int() != 0,
        None => false,
    };
    Ok(Some(boxed("Ljava/lang/Boolean;", HostValue::Bool(b))))
}

pub(crate) fn math_abs(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    Ok(Some(match args.first() {
        Some(Value::Long(v)) => Value::Long(v.wrapping_abs()),
        Some(Value::Float(v)) => Value::Float(v.abs()),
        Some(Value::Double(v)) => Value::Double(v.abs()),
        Some(other) => Value::Int(other.as_int().wrapping_abs()),
        None => Value::Int(0),
    }))
}

pub(crate) fn math_max(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    Ok(Some(minmax(args, true)))
}

pub(crate) fn math_min(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    Ok(Some(minmax(args, false)))
}

fn minmax(args: &[Value], want_max: bool) -> Value {
    match (args.first(), args.get(1)) {
        (Some(Value::Double(a)), Some(b)) | (Some(b), Some(Value::Double(a))) => {
            let b = b.as_double();
            Value::Double(if want_max { a.max(b) } else { a.min(b) })
        }
        (Some(Value::Float(a)), Some(b)) | (Some(b), Some(Value::Float(a))) => {
            let b = b.as_float();
            Value::Float(if want_max { a.max(b) } else { a.min(b) })
        }
        (Some(Value::Long(a)), Some(b)) | (Some(b), Some(Value::Long(a))) => {
            let b = b.as_long();
            Value::Long(if want_max { (*a).max(b) } else { (*a).min(b) })
        }
        (Some(a), Some(b)) => {
            let (a, b) = (a.as_int(), b.as_int());
            Value::Int(if want_max { a.max(b) } else { a.min(b) })
        }
        _ => Value::Int(0),
    }
}

/// `Arrays.copyOf(array, newLength)`.
pub(crate) fn arrays_copy_of(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let Some(Value::Array(src)) = args.first() else {
        return Ok(Some(Value::Null));
    };
    let new_len = args.get(1).map_or(0, Value::as_int).max(0) as usize;
    let src = src.borrow();
    let mut data: Vec<Value> = src.data.iter().take(new_len).cloned().collect();
    data.resize(new_len, elem_default(&src.elem_type));
    Ok(Some(Value::array(ArrayObj {
        elem_type: src.elem_type.clone(),
        data,
    })))
}

/// `System.arraycopy(src, srcPos, dest, destPos, length)`: void.
pub(crate) fn system_arraycopy(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let (Some(Value::Array(src)), Some(Value::Array(dest))) = (args.first(), args.get(2)) else {
        return Ok(None);
    };
    let src_pos = args.get(1).map_or(0, Value::as_int).max(0) as usize;
    let dest_pos = args.get(3).map_or(0, Value::as_int).max(0) as usize;
    let length = args.get(4).map_or(0, Value::as_int).max(0) as usize;

    // copy out first so that src == dest keeps working
    let items: Vec<Value> = {
        let src = src.borrow();
        src.data
            .iter()
            .skip(src_pos)
            .take(length)
            .cloned()
            .collect()
    };
    let mut dest = dest.borrow_mut();
    for (i, item) in items.into_iter().enumerate() {
        if let Some(slot) = dest.data.get_mut(dest_pos + i) {
            *slot = item;
        }
    }
    Ok(None)
}

/// `TextUtils.isEmpty(CharSequence)`.
pub(crate) fn text_utils_is_empty(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let empty = match args.first() {
        Some(v) => v.host_str().map_or(true, |s| s.is_empty()),
        None => true,
    };
    Ok(Some(Value::Bool(empty)))
}

/// `android.util.Base64.decode(String, int)`; the flags argument is
/// accepted and ignored. Undecodable input yields an empty array.
pub(crate) fn base64_decode(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let input = match args.first() {
        Some(Value::Array(arr)) => String::from_utf8_lossy(&arr.borrow().to_bytes()).into_owned(),
        Some(other) => other.host_str().unwrap_or_default(),
        None => String::new(),
    };
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::decode(&cleaned).unwrap_or_else(|err| {
        log::warn!("Base64.decode rejected input: {err}");
        Vec::new()
    });
    Ok(Some(Value::array(ArrayObj::from_bytes(&bytes))))
}

/// `String.<init>(..)`: fills the receiver from a char array, byte array
/// or another string.
pub(crate) fn string_init(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let Some(Value::Object(receiver)) = args.first() else {
        return Ok(None);
    };
    let text = match args.get(1) {
        Some(Value::Array(arr)) => {
            let arr = arr.borrow();
            if arr.elem_type == "B" {
                String::from_utf8_lossy(&arr.to_bytes()).into_owned()
            } else {
                let units: Vec<u16> = arr.data.iter().map(|v| v.as_int() as u16).collect();
                String::from_utf16_lossy(&units)
            }
        }
        Some(other) => other.host_str().unwrap_or_default(),
        None => String::new(),
    };
    receiver.borrow_mut().payload = Some(HostValue::Str(text));
    Ok(None)
}

/// `StringBuilder.<init>(..)`.
pub(crate) fn sb_init(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let Some(Value::Object(receiver)) = args.first() else {
        return Ok(None);
    };
    let initial = args
        .get(1)
        .and_then(Value::host_str)
        .unwrap_or_default();
    receiver.borrow_mut().payload = Some(HostValue::Str(initial));
    Ok(None)
}

fn receiver_items(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Object(obj)) => match &obj.borrow().payload {
            Some(HostValue::List(items)) => items.clone(),
            Some(HostValue::Iter { items, .. }) => items.clone(),
            _ => Vec::new(),
        },
        Some(Value::Array(arr)) => arr.borrow().data.clone(),
        _ => Vec::new(),
    }
}

/// `List.iterator()`.
pub(crate) fn list_iterator(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let items = receiver_items(args.first());
    Ok(Some(boxed(
        "Ljava/util/Iterator;",
        HostValue::Iter { items, pos: 0 },
    )))
}

/// `List.size()`.
pub(crate) fn list_size(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    Ok(Some(Value::Int(receiver_items(args.first()).len() as i32)))
}

/// `List.get(int)`.
pub(crate) fn list_get(_vm: &mut Vm<'_>, args: &[Value], _trace: &str) -> VmResult<Option<Value>> {
    let idx = args.get(1).map_or(0, Value::as_int).max(0) as usize;
    Ok(Some(
        receiver_items(args.first())
            .get(idx)
            .cloned()
            .unwrap_or(Value::Null),
    ))
}

/// `Iterator.hasNext()`.
pub(crate) fn iter_has_next(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let has = match args.first() {
        Some(Value::Object(obj)) => match &obj.borrow().payload {
            Some(HostValue::Iter { items, pos }) => *pos < items.len(),
            _ => false,
        },
        _ => false,
    };
    Ok(Some(Value::Bool(has)))
}

/// `Iterator.next()`: advances the cursor.
pub(crate) fn iter_next(
    _vm: &mut Vm<'_>,
    args: &[Value],
    _trace: &str,
) -> VmResult<Option<Value>> {
    let Some(Value::Object(obj)) = args.first() else {
        return Ok(Some(Value::Null));
    };
    let mut obj = obj.borrow_mut();
    let result = match &mut obj.payload {
        Some(HostValue::Iter { items, pos }) => {
            let item = items.get(*pos).cloned();
            if item.is_some() {
                *pos += 1;
            }
            item.unwrap_or(Value::Null)
        }
        _ => Value::Null,
    };
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockConfig, Session};

    fn vm() -> Vm<'static> {
        Vm::detached(Session::new(MockConfig::default()))
    }

    #[test]
    fn base64_decodes_hi() {
        let mut vm = vm();
        let out = base64_decode(&mut vm, &[Value::string("aGk=")], "")
            .unwrap()
            .unwrap();
        let Value::Array(arr) = out else { panic!("not an array") };
        assert_eq!(arr.borrow().to_bytes(), vec![0x68, 0x69]);
    }

    #[test]
    fn base64_rejects_garbage() {
        let mut vm = vm();
        let out = base64_decode(&mut vm, &[Value::string("!!!")], "")
            .unwrap()
            .unwrap();
        let Value::Array(arr) = out else { panic!("not an array") };
        assert!(arr.borrow().is_empty());
    }

    #[test]
    fn builder_append_chain() {
        let mut vm = vm();
        let sb = boxed("Ljava/lang/StringBuilder;", HostValue::Str(String::new()));
        sb_append(
            &mut vm,
            &[sb.clone(), Value::string("ab")],
            "invoke-virtual {v0, v1}, Ljava/lang/StringBuilder;->append(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        )
        .unwrap();
        sb_append(
            &mut vm,
            &[sb.clone(), Value::Int(99)],
            "invoke-virtual {v0, v1}, Ljava/lang/StringBuilder;->append(C)Ljava/lang/StringBuilder;",
        )
        .unwrap();
        let out = to_string(&mut vm, &[sb], "").unwrap().unwrap();
        assert_eq!(out.host_str().as_deref(), Some("abc"));
    }

    #[test]
    fn get_bytes_is_utf16_le() {
        let mut vm = vm();
        let out = get_bytes(&mut vm, &[Value::string("hi")], "").unwrap().unwrap();
        let Value::Array(arr) = out else { panic!("not an array") };
        assert_eq!(arr.borrow().to_bytes(), vec![0x68, 0x00, 0x69, 0x00]);
    }

    #[test]
    fn arraycopy_within_same_array() {
        let mut vm = vm();
        let arr = Value::array(ArrayObj {
            elem_type: "I".to_string(),
            data: vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(0)],
        });
        system_arraycopy(
            &mut vm,
            &[
                arr.clone(),
                Value::Int(0),
                arr.clone(),
                Value::Int(1),
                Value::Int(3),
            ],
            "",
        )
        .unwrap();
        let Value::Array(arr) = arr else { unreachable!() };
        let data: Vec<i32> = arr.borrow().data.iter().map(Value::as_int).collect();
        assert_eq!(data, vec![1, 1, 2, 3]);
    }

    #[test]
    fn copy_of_pads_with_zero() {
        let mut vm = vm();
        let arr = Value::array(ArrayObj {
            elem_type: "B".to_string(),
            data: vec![Value::Int(9)],
        });
        let out = arrays_copy_of(&mut vm, &[arr, Value::Int(3)], "").unwrap().unwrap();
        let Value::Array(out) = out else { panic!("not an array") };
        let data: Vec<i32> = out.borrow().data.iter().map(Value::as_int).collect();
        assert_eq!(data, vec![9, 0, 0]);
    }

    #[test]
    fn parse_int_handles_radix_and_garbage() {
        let mut vm = vm();
        let v = parse_int(&mut vm, &[Value::string("42")], "").unwrap().unwrap();
        assert_eq!(v.as_int(), 42);
        let v = parse_int(&mut vm, &[Value::string("ff"), Value::Int(16)], "")
            .unwrap()
            .unwrap();
        assert_eq!(v.as_int(), 255);
        let v = parse_int(&mut vm, &[Value::string("nope")], "").unwrap().unwrap();
        assert_eq!(v.as_int(), 0);
    }

    #[test]
    fn iterator_protocol() {
        let mut vm = vm();
        let list = boxed(
            "Ljava/util/ArrayList;",
            HostValue::List(vec![Value::Int(1), Value::Int(2)]),
        );
        let it = list_iterator(&mut vm, &[list], "").unwrap().unwrap();
        assert!(matches!(
            iter_has_next(&mut vm, &[it.clone()], "").unwrap().unwrap(),
            Value::Bool(true)
        ));
        assert_eq!(iter_next(&mut vm, &[it.clone()], "").unwrap().unwrap().as_int(), 1);
        assert_eq!(iter_next(&mut vm, &[it.clone()], "").unwrap().unwrap().as_int(), 2);
        assert!(matches!(
            iter_has_next(&mut vm, &[it], "").unwrap().unwrap(),
            Value::Bool(false)
        ));
    }

    #[test]
    fn string_init_from_char_array() {
        let mut vm = vm();
        let s = Value::object("Ljava/lang/String;");
        let chars = Value::array(ArrayObj {
            elem_type: "C".to_string(),
            data: vec![Value::Char(104), Value::Char(105)],
        });
        string_init(&mut vm, &[s.clone(), chars], "").unwrap();
        assert_eq!(s.host_str().as_deref(), Some("hi"));
    }
}
