//! The emulated value domain.
//!
//! Registers and the heap hold [`Value`]s. Object instances carry their
//! declared class descriptor, a name-keyed field map, and an optional
//! host-side payload that the mock layer uses for concrete state (the text
//! behind a `Ljava/lang/String;`, the buffer behind a builder, the items
//! behind a list). Instances and arrays are reference values: registers
//! share them through `Rc<RefCell<..>>`, which matches Dalvik aliasing in
//! this single-threaded setting.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type ObjRef = Rc<RefCell<Instance>>;
pub type ArrRef = Rc<RefCell<ArrayObj>>;

/// A tagged runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
    Char(u16),
    Object(ObjRef),
    Array(ArrRef),
    /// A `const-class` result: the class descriptor.
    Class(String),
}

/// Host-side state attached to an instance by the mock layer.
#[derive(Debug, Clone)]
pub enum HostValue {
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Iter { items: Vec<Value>, pos: usize },
    Bool(bool),
    Int(i64),
}

/// An object instance: declared class, dynamic fields, optional payload.
#[derive(Debug, Clone)]
pub struct Instance {
    pub class_name: String,
    pub fields: HashMap<String, Value>,
    pub payload: Option<HostValue>,
}

impl Instance {
    #[must_use]
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: HashMap::new(),
            payload: None,
        }
    }

    #[must_use]
    pub fn with_payload(class_name: impl Into<String>, payload: HostValue) -> Self {
        Self {
            class_name: class_name.into(),
            fields: HashMap::new(),
            payload: Some(payload),
        }
    }
}

/// A typed array: element descriptor plus the element values.
#[derive(Debug, Clone)]
pub struct ArrayObj {
    pub elem_type: String,
    pub data: Vec<Value>,
}

impl ArrayObj {
    #[must_use]
    pub fn new(elem_type: impl Into<String>, len: usize) -> Self {
        Self {
            elem_type: elem_type.into(),
            data: vec![Value::Null; len],
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            elem_type: "B".to_string(),
            data: bytes.iter().map(|b| Value::Int(i32::from(*b as i8))).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Collects the elements back into host bytes (low 8 bits of each).
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.iter().map(|v| v.as_int() as u8).collect()
    }
}

/// The zero value of an array element descriptor.
#[must_use]
pub fn elem_default(elem: &str) -> Value {
    match elem {
        "J" => Value::Long(0),
        "F" => Value::Float(0.0),
        "D" => Value::Double(0.0),
        "Z" | "B" | "S" | "C" | "I" => Value::Int(0),
        _ => Value::Null,
    }
}

impl Value {
    /// Allocates a boxed `java.lang.String` instance.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Object(Rc::new(RefCell::new(Instance::with_payload(
            "Ljava/lang/String;",
            HostValue::Str(s.into()),
        ))))
    }

    /// Allocates a bare instance of the given class.
    #[must_use]
    pub fn object(class_name: impl Into<String>) -> Self {
        Self::Object(Rc::new(RefCell::new(Instance::new(class_name))))
    }

    #[must_use]
    pub fn array(arr: ArrayObj) -> Self {
        Self::Array(Rc::new(RefCell::new(arr)))
    }

    #[inline]
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Reads the value as a 32-bit integer, coercing the way the
    /// interpreter's integer opcodes do: unset and non-numeric values read
    /// as zero.
    #[must_use]
    pub fn as_int(&self) -> i32 {
        match self {
            Self::Int(v) => *v,
            Self::Long(v) => *v as i32,
            Self::Bool(b) => i32::from(*b),
            Self::Char(c) => i32::from(*c),
            Self::Float(f) => *f as i32,
            Self::Double(d) => *d as i32,
            _ => 0,
        }
    }

    /// Reads the value as a 64-bit integer (see [`Self::as_int`]).
    #[must_use]
    pub fn as_long(&self) -> i64 {
        match self {
            Self::Long(v) => *v,
            Self::Int(v) => i64::from(*v),
            Self::Bool(b) => i64::from(*b),
            Self::Char(c) => i64::from(*c),
            Self::Float(f) => *f as i64,
            Self::Double(d) => *d as i64,
            _ => 0,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> f32 {
        match self {
            Self::Float(f) => *f,
            Self::Double(d) => *d as f32,
            Self::Int(v) => *v as f32,
            Self::Long(v) => *v as f32,
            Self::Char(c) => f32::from(*c),
            Self::Bool(b) => f32::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn as_double(&self) -> f64 {
        match self {
            Self::Double(d) => *d,
            Self::Float(f) => f64::from(*f),
            Self::Int(v) => f64::from(*v),
            Self::Long(v) => *v as f64,
            Self::Char(c) => f64::from(*c),
            Self::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        }
    }

    /// The text behind a boxed string, builder or other `Str`-payload
    /// instance.
    #[must_use]
    pub fn host_str(&self) -> Option<String> {
        match self {
            Self::Object(obj) => match &obj.borrow().payload {
                Some(HostValue::Str(s)) => Some(s.clone()),
                Some(HostValue::Int(v)) => Some(v.to_string()),
                Some(HostValue::Bool(b)) => Some(b.to_string()),
                _ => None,
            },
            _ => None,
        }
    }

    /// The primitive behind a boxed numeric, or the value itself.
    #[must_use]
    pub fn unboxed(&self) -> Value {
        match self {
            Self::Object(obj) => match &obj.borrow().payload {
                Some(HostValue::Int(v)) => Self::Long(*v),
                Some(HostValue::Bool(b)) => Self::Bool(*b),
                _ => self.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&format_value(self))
    }
}

/// Formats a value for host display.
///
/// Strings are quoted, bare objects render as `<Lpkg/Cls;>`, arrays as
/// `<C[5]>`, and printable char-range integers as `'A' (65)`.
#[must_use]
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Int(v) => {
            if *v > 127 && *v < 65536 {
                match char::from_u32(*v as u32) {
                    Some(c) if !c.is_control() => format!("'{c}' ({v})"),
                    _ => format!("'\\u{v:04x}' ({v})"),
                }
            } else {
                v.to_string()
            }
        }
        Value::Long(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Char(c) => match char::from_u32(u32::from(*c)) {
            Some(ch) if !ch.is_control() => format!("'{ch}' ({c})"),
            _ => format!("'\\u{c:04x}' ({c})"),
        },
        Value::Object(obj) => {
            let obj = obj.borrow();
            match &obj.payload {
                Some(HostValue::Str(s)) => format!("\"{s}\""),
                Some(HostValue::Int(v)) => format!("<{} {v}>", obj.class_name),
                Some(HostValue::Bool(b)) => format!("<{} {b}>", obj.class_name),
                _ => format!("<{}>", obj.class_name),
            }
        }
        Value::Array(arr) => {
            let arr = arr.borrow();
            format!("<{}[{}]>", arr.elem_type, arr.len())
        }
        Value::Class(desc) => format!("class {desc}"),
    }
}
