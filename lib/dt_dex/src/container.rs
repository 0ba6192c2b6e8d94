//! Single dex container parsing.
//!
//! Only the tables the emulator consumes are materialized: string, type,
//! proto, field and method pools, class definitions, class data and code
//! items. Offsets come straight from the header; the map list is not needed
//! for read-only consumption.

use crate::errors::{DexError, DexResult};
use crate::mutf8;
use bitflags::bitflags;
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32};
use nom::IResult;
use dt_utils::leb::read_uleb128;

bitflags! {
    /// Method and field access flags, as defined by the dex format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x1;
        const PRIVATE = 0x2;
        const PROTECTED = 0x4;
        const STATIC = 0x8;
        const FINAL = 0x10;
        const SYNCHRONIZED = 0x20;
        const VARARGS = 0x80;
        const NATIVE = 0x100;
        const INTERFACE = 0x200;
        const ABSTRACT = 0x400;
        const SYNTHETIC = 0x1000;
        const CONSTRUCTOR = 0x1_0000;
    }
}

#[derive(Debug)]
pub(crate) struct Header {
    pub(crate) string_ids_size: usize,
    pub(crate) string_ids_off: usize,
    pub(crate) type_ids_size: usize,
    pub(crate) type_ids_off: usize,
    pub(crate) proto_ids_size: usize,
    pub(crate) proto_ids_off: usize,
    pub(crate) field_ids_size: usize,
    pub(crate) field_ids_off: usize,
    pub(crate) method_ids_size: usize,
    pub(crate) method_ids_off: usize,
    pub(crate) class_defs_size: usize,
    pub(crate) class_defs_off: usize,
}

/// A method prototype: shorty, return type and parameter descriptors.
#[derive(Debug, Clone)]
pub struct Proto {
    pub return_type: String,
    pub params: Vec<String>,
}

impl Proto {
    /// The `(params)return` descriptor form used in signatures.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("({}){}", self.params.concat(), self.return_type)
    }
}

/// An entry of the `field_ids` pool, with names resolved.
#[derive(Debug, Clone)]
pub struct FieldId {
    pub class: String,
    pub name: String,
    pub type_desc: String,
}

/// An entry of the `method_ids` pool, with names resolved.
#[derive(Debug, Clone)]
pub struct MethodId {
    pub class: String,
    pub name: String,
    pub proto: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub class: String,
    pub access_flags: u32,
    pub class_data_off: usize,
    pub static_values_off: usize,
}

#[derive(Debug, Clone)]
pub struct EncodedMethodRef {
    pub method_idx: usize,
    pub access_flags: AccessFlags,
    pub code_off: usize,
}

#[derive(Debug, Clone)]
pub struct EncodedFieldRef {
    pub field_idx: usize,
    pub access_flags: AccessFlags,
}

#[derive(Debug)]
pub struct ClassData {
    pub static_fields: Vec<EncodedFieldRef>,
    pub instance_fields: Vec<EncodedFieldRef>,
    pub direct_methods: Vec<EncodedMethodRef>,
    pub virtual_methods: Vec<EncodedMethodRef>,
}

/// A parsed `code_item`: the register frame shape plus the raw instruction
/// stream (in bytes; two bytes per code unit).
#[derive(Debug, Clone)]
pub struct CodeItem {
    pub registers_size: usize,
    pub ins_size: usize,
    pub insns: Vec<u8>,
}

/// A literal from an `encoded_value` (class definition `static_values`).
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedLit {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(usize),
    Type(usize),
    Null,
    Bool(bool),
}

/// One `classesN.dex` member of an archive, parsed.
#[derive(Debug)]
pub struct DexContainer {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) strings: Vec<String>,
    pub(crate) types: Vec<String>,
    pub(crate) protos: Vec<Proto>,
    pub(crate) fields: Vec<FieldId>,
    pub(crate) methods: Vec<MethodId>,
    pub(crate) class_defs: Vec<ClassDef>,
}

fn le_u32_at(data: &[u8], off: usize) -> DexResult<u32> {
    let slice = data
        .get(off..off + 4)
        .ok_or_else(|| DexError::InvalidOffset(format!("u32 at {off}")))?;
    let (_, v) = le_u32::<_, DexError>(slice)?;
    Ok(v)
}

fn le_u16_at(data: &[u8], off: usize) -> DexResult<u16> {
    let slice = data
        .get(off..off + 2)
        .ok_or_else(|| DexError::InvalidOffset(format!("u16 at {off}")))?;
    let (_, v) = le_u16::<_, DexError>(slice)?;
    Ok(v)
}

fn uleb_at(data: &[u8], off: usize) -> DexResult<(u32, usize)> {
    read_uleb128(data, off).ok_or_else(|| DexError::InvalidOffset(format!("uleb128 at {off}")))
}

fn header(input: &[u8]) -> IResult<&[u8], Header, DexError> {
    let (input, _magic) = take(8usize)(input)?;
    let (input, _checksum) = le_u32(input)?;
    let (input, _signature) = take(20usize)(input)?;
    let (input, _file_size) = le_u32(input)?;
    let (input, _header_size) = le_u32(input)?;
    let (input, _endian_tag) = le_u32(input)?;
    let (input, _link_size) = le_u32(input)?;
    let (input, _link_off) = le_u32(input)?;
    let (input, _map_off) = le_u32(input)?;
    let (input, string_ids_size) = le_u32(input)?;
    let (input, string_ids_off) = le_u32(input)?;
    let (input, type_ids_size) = le_u32(input)?;
    let (input, type_ids_off) = le_u32(input)?;
    let (input, proto_ids_size) = le_u32(input)?;
    let (input, proto_ids_off) = le_u32(input)?;
    let (input, field_ids_size) = le_u32(input)?;
    let (input, field_ids_off) = le_u32(input)?;
    let (input, method_ids_size) = le_u32(input)?;
    let (input, method_ids_off) = le_u32(input)?;
    let (input, class_defs_size) = le_u32(input)?;
    let (input, class_defs_off) = le_u32(input)?;
    Ok((
        input,
        Header {
            string_ids_size: string_ids_size as usize,
            string_ids_off: string_ids_off as usize,
            type_ids_size: type_ids_size as usize,
            type_ids_off: type_ids_off as usize,
            proto_ids_size: proto_ids_size as usize,
            proto_ids_off: proto_ids_off as usize,
            field_ids_size: field_ids_size as usize,
            field_ids_off: field_ids_off as usize,
            method_ids_size: method_ids_size as usize,
            method_ids_off: method_ids_off as usize,
            class_defs_size: class_defs_size as usize,
            class_defs_off: class_defs_off as usize,
        },
    ))
}

impl DexContainer {
    /// Parses a dex buffer.
    pub fn parse(name: impl Into<String>, data: Vec<u8>) -> DexResult<Self> {
        let name = name.into();
        if data.len() < 0x70 {
            return Err(DexError::Structure(format!("{name}: truncated header")));
        }
        if !data.starts_with(b"dex\n") {
            return Err(DexError::Structure(format!("{name}: bad magic")));
        }
        let (_, hdr) = header(&data)?;

        let strings = parse_strings(&data, &hdr)?;
        let types = parse_types(&data, &hdr, &strings)?;
        let protos = parse_protos(&data, &hdr, &strings, &types)?;
        let fields = parse_fields(&data, &hdr, &strings, &types)?;
        let methods = parse_methods(&data, &hdr, &strings, &types)?;
        let class_defs = parse_class_defs(&data, &hdr, &types)?;

        Ok(Self {
            name,
            data,
            strings,
            types,
            protos,
            fields,
            methods,
            class_defs,
        })
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn strings_count(&self) -> usize {
        self.strings.len()
    }

    pub fn string(&self, idx: usize) -> DexResult<&str> {
        self.strings
            .get(idx)
            .map(String::as_str)
            .ok_or(DexError::StringNotFound(idx))
    }

    pub fn type_desc(&self, idx: usize) -> DexResult<&str> {
        self.types
            .get(idx)
            .map(String::as_str)
            .ok_or(DexError::TypeNotFound(idx))
    }

    pub fn field_id(&self, idx: usize) -> DexResult<&FieldId> {
        self.fields
            .get(idx)
            .ok_or_else(|| DexError::ResNotFound(format!("field@{idx}")))
    }

    pub fn method_id(&self, idx: usize) -> DexResult<&MethodId> {
        self.methods
            .get(idx)
            .ok_or_else(|| DexError::ResNotFound(format!("method@{idx}")))
    }

    /// Renders a `field_ids` entry as `Lpkg/Cls;->name:I`.
    pub fn field_sig(&self, idx: usize) -> DexResult<String> {
        let f = self.field_id(idx)?;
        Ok(format!("{}->{}:{}", f.class, f.name, f.type_desc))
    }

    /// Renders a `method_ids` entry as `Lpkg/Cls;->name(II)I`.
    pub fn method_sig(&self, idx: usize) -> DexResult<String> {
        let m = self.method_id(idx)?;
        let proto = self
            .protos
            .get(m.proto)
            .ok_or_else(|| DexError::ResNotFound(format!("proto@{}", m.proto)))?;
        Ok(format!("{}->{}{}", m.class, m.name, proto.descriptor()))
    }

    #[inline]
    pub fn iter_class_defs(&self) -> impl Iterator<Item = &ClassDef> {
        self.class_defs.iter()
    }

    pub(crate) fn class_def(&self, class: &str) -> Option<&ClassDef> {
        self.class_defs.iter().find(|c| c.class == class)
    }

    pub(crate) fn class_data(&self, off: usize) -> DexResult<ClassData> {
        let data = &self.data;
        let mut pos = off;
        let (static_fields_size, n) = uleb_at(data, pos)?;
        pos += n;
        let (instance_fields_size, n) = uleb_at(data, pos)?;
        pos += n;
        let (direct_methods_size, n) = uleb_at(data, pos)?;
        pos += n;
        let (virtual_methods_size, n) = uleb_at(data, pos)?;
        pos += n;

        let mut read_fields = |pos: &mut usize, count: u32| -> DexResult<Vec<EncodedFieldRef>> {
            let mut out = Vec::with_capacity(count as usize);
            let mut prev_idx = 0;
            for _ in 0..count {
                let (idx_diff, n) = uleb_at(data, *pos)?;
                *pos += n;
                let (access, n) = uleb_at(data, *pos)?;
                *pos += n;
                prev_idx += idx_diff as usize;
                out.push(EncodedFieldRef {
                    field_idx: prev_idx,
                    access_flags: AccessFlags::from_bits_truncate(access),
                });
            }
            Ok(out)
        };
        let static_fields = read_fields(&mut pos, static_fields_size)?;
        let instance_fields = read_fields(&mut pos, instance_fields_size)?;

        let mut read_methods = |pos: &mut usize, count: u32| -> DexResult<Vec<EncodedMethodRef>> {
            let mut out = Vec::with_capacity(count as usize);
            let mut prev_idx = 0;
            for _ in 0..count {
                let (idx_diff, n) = uleb_at(data, *pos)?;
                *pos += n;
                let (access, n) = uleb_at(data, *pos)?;
                *pos += n;
                let (code_off, n) = uleb_at(data, *pos)?;
                *pos += n;
                prev_idx += idx_diff as usize;
                out.push(EncodedMethodRef {
                    method_idx: prev_idx,
                    access_flags: AccessFlags::from_bits_truncate(access),
                    code_off: code_off as usize,
                });
            }
            Ok(out)
        };
        let direct_methods = read_methods(&mut pos, direct_methods_size)?;
        let virtual_methods = read_methods(&mut pos, virtual_methods_size)?;

        Ok(ClassData {
            static_fields,
            instance_fields,
            direct_methods,
            virtual_methods,
        })
    }

    pub(crate) fn code_item(&self, off: usize) -> DexResult<CodeItem> {
        let registers_size = le_u16_at(&self.data, off)? as usize;
        let ins_size = le_u16_at(&self.data, off + 2)? as usize;
        // outs_size (u16), tries_size (u16) and debug_info_off (u32) are
        // skipped: the emulator neither allocates out slots nor honors
        // exception handlers.
        let insns_size = le_u32_at(&self.data, off + 12)? as usize;
        let start = off + 16;
        let len = insns_size * 2;
        let insns = self
            .data
            .get(start..start + len)
            .ok_or_else(|| DexError::InvalidOffset(format!("code item at {off}")))?
            .to_vec();
        Ok(CodeItem {
            registers_size,
            ins_size,
            insns,
        })
    }

    /// Parses a `static_values` encoded array.
    pub(crate) fn encoded_array(&self, off: usize) -> DexResult<Vec<EncodedLit>> {
        let data = &self.data;
        let mut pos = off;
        let (count, n) = uleb_at(data, pos)?;
        pos += n;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (lit, n) = encoded_value(data, pos)?;
            pos += n;
            out.push(lit);
        }
        Ok(out)
    }
}

fn parse_strings(data: &[u8], hdr: &Header) -> DexResult<Vec<String>> {
    let mut strings = Vec::with_capacity(hdr.string_ids_size);
    for i in 0..hdr.string_ids_size {
        let id_off = hdr.string_ids_off + i * 4;
        let data_off = le_u32_at(data, id_off)? as usize;
        // utf16_size prefix, then MUTF-8 bytes up to the null terminator
        let (_utf16_size, n) = uleb_at(data, data_off)?;
        let start = data_off + n;
        let end = start
            + data[start..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| DexError::InvalidOffset(format!("string@{i}")))?;
        strings.push(mutf8::decode_lossy(&data[start..end])?);
    }
    Ok(strings)
}

fn parse_types(data: &[u8], hdr: &Header, strings: &[String]) -> DexResult<Vec<String>> {
    let mut types = Vec::with_capacity(hdr.type_ids_size);
    for i in 0..hdr.type_ids_size {
        let desc_idx = le_u32_at(data, hdr.type_ids_off + i * 4)? as usize;
        let desc = strings
            .get(desc_idx)
            .ok_or(DexError::StringNotFound(desc_idx))?;
        types.push(desc.clone());
    }
    Ok(types)
}

fn parse_protos(
    data: &[u8],
    hdr: &Header,
    strings: &[String],
    types: &[String],
) -> DexResult<Vec<Proto>> {
    let mut protos = Vec::with_capacity(hdr.proto_ids_size);
    for i in 0..hdr.proto_ids_size {
        let off = hdr.proto_ids_off + i * 12;
        let shorty_idx = le_u32_at(data, off)? as usize;
        let return_type_idx = le_u32_at(data, off + 4)? as usize;
        let params_off = le_u32_at(data, off + 8)? as usize;
        let _shorty = strings
            .get(shorty_idx)
            .ok_or(DexError::StringNotFound(shorty_idx))?;
        let return_type = types
            .get(return_type_idx)
            .ok_or(DexError::TypeNotFound(return_type_idx))?
            .clone();
        let params = if params_off == 0 {
            Vec::new()
        } else {
            let count = le_u32_at(data, params_off)? as usize;
            let mut params = Vec::with_capacity(count);
            for j in 0..count {
                let type_idx = le_u16_at(data, params_off + 4 + j * 2)? as usize;
                params.push(
                    types
                        .get(type_idx)
                        .ok_or(DexError::TypeNotFound(type_idx))?
                        .clone(),
                );
            }
            params
        };
        protos.push(Proto {
            return_type,
            params,
        });
    }
    Ok(protos)
}

fn parse_fields(
    data: &[u8],
    hdr: &Header,
    strings: &[String],
    types: &[String],
) -> DexResult<Vec<FieldId>> {
    let mut fields = Vec::with_capacity(hdr.field_ids_size);
    for i in 0..hdr.field_ids_size {
        let off = hdr.field_ids_off + i * 8;
        let class_idx = le_u16_at(data, off)? as usize;
        let type_idx = le_u16_at(data, off + 2)? as usize;
        let name_idx = le_u32_at(data, off + 4)? as usize;
        fields.push(FieldId {
            class: types
                .get(class_idx)
                .ok_or(DexError::TypeNotFound(class_idx))?
                .clone(),
            type_desc: types
                .get(type_idx)
                .ok_or(DexError::TypeNotFound(type_idx))?
                .clone(),
            name: strings
                .get(name_idx)
                .ok_or(DexError::StringNotFound(name_idx))?
                .clone(),
        });
    }
    Ok(fields)
}

fn parse_methods(
    data: &[u8],
    hdr: &Header,
    strings: &[String],
    types: &[String],
) -> DexResult<Vec<MethodId>> {
    let mut methods = Vec::with_capacity(hdr.method_ids_size);
    for i in 0..hdr.method_ids_size {
        let off = hdr.method_ids_off + i * 8;
        let class_idx = le_u16_at(data, off)? as usize;
        let proto_idx = le_u16_at(data, off + 2)? as usize;
        let name_idx = le_u32_at(data, off + 4)? as usize;
        methods.push(MethodId {
            class: types
                .get(class_idx)
                .ok_or(DexError::TypeNotFound(class_idx))?
                .clone(),
            name: strings
                .get(name_idx)
                .ok_or(DexError::StringNotFound(name_idx))?
                .clone(),
            proto: proto_idx,
        });
    }
    Ok(methods)
}

fn parse_class_defs(data: &[u8], hdr: &Header, types: &[String]) -> DexResult<Vec<ClassDef>> {
    let mut class_defs = Vec::with_capacity(hdr.class_defs_size);
    for i in 0..hdr.class_defs_size {
        let off = hdr.class_defs_off + i * 32;
        let class_idx = le_u32_at(data, off)? as usize;
        let access_flags = le_u32_at(data, off + 4)?;
        let class_data_off = le_u32_at(data, off + 24)? as usize;
        let static_values_off = le_u32_at(data, off + 28)? as usize;
        class_defs.push(ClassDef {
            class: types
                .get(class_idx)
                .ok_or(DexError::TypeNotFound(class_idx))?
                .clone(),
            access_flags,
            class_data_off,
            static_values_off,
        });
    }
    Ok(class_defs)
}

// encoded_value: a (value_arg << 5 | value_type) byte followed by up to
// eight payload bytes. Integral payloads are sign-extended, floating point
// payloads are zero-extended to the right.
fn encoded_value(data: &[u8], off: usize) -> DexResult<(EncodedLit, usize)> {
    let tag = *data
        .get(off)
        .ok_or_else(|| DexError::InvalidOffset(format!("encoded value at {off}")))?;
    let value_type = tag & 0x1f;
    let value_arg = (tag >> 5) as usize;
    let size = value_arg + 1;
    let payload = |sz: usize| -> DexResult<&[u8]> {
        data.get(off + 1..off + 1 + sz)
            .ok_or_else(|| DexError::InvalidOffset(format!("encoded value at {off}")))
    };
    let sext = |bytes: &[u8]| -> i64 {
        let mut v: i64 = 0;
        for (i, b) in bytes.iter().enumerate() {
            v |= i64::from(*b) << (8 * i);
        }
        let shift = 64 - 8 * bytes.len();
        (v << shift) >> shift
    };
    let zext = |bytes: &[u8]| -> u64 {
        let mut v: u64 = 0;
        for (i, b) in bytes.iter().enumerate() {
            v |= u64::from(*b) << (8 * i);
        }
        v
    };
    let lit = match value_type {
        0x00 => (EncodedLit::Byte(sext(payload(1)?) as i8), 2),
        0x02 => (EncodedLit::Short(sext(payload(size)?) as i16), 1 + size),
        0x03 => (EncodedLit::Char(zext(payload(size)?) as u16), 1 + size),
        0x04 => (EncodedLit::Int(sext(payload(size)?) as i32), 1 + size),
        0x06 => (EncodedLit::Long(sext(payload(size)?)), 1 + size),
        0x10 => {
            let bits = (zext(payload(size)?) as u32) << (32 - 8 * size);
            (EncodedLit::Float(f32::from_bits(bits)), 1 + size)
        }
        0x11 => {
            let bits = zext(payload(size)?) << (64 - 8 * size);
            (EncodedLit::Double(f64::from_bits(bits)), 1 + size)
        }
        0x17 | 0x18 | 0x19 | 0x1a | 0x1b => {
            let idx = zext(payload(size)?) as usize;
            let lit = if value_type == 0x17 {
                EncodedLit::Str(idx)
            } else {
                EncodedLit::Type(idx)
            };
            (lit, 1 + size)
        }
        0x1e => (EncodedLit::Null, 1),
        0x1f => (EncodedLit::Bool(value_arg != 0), 1),
        other => {
            return Err(DexError::Structure(format!(
                "unsupported encoded value type 0x{other:02x}"
            )))
        }
    };
    Ok(lit)
}
