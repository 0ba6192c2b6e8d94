//! Test support: assembles a minimal in-memory dex container so that
//! loader and end-to-end tests exercise the real parsing path instead of
//! hand-wired fixtures.

use std::collections::BTreeMap;

pub(crate) struct TestMethod {
    pub method_idx: usize,
    pub access: u32,
    pub regs: u16,
    pub ins: u16,
    pub code: Vec<u8>,
}

pub(crate) struct TestClass {
    pub class_type: usize,
    pub static_fields: Vec<usize>,
    pub direct: Vec<TestMethod>,
    pub virtual_: Vec<TestMethod>,
    /// Raw `encoded_array` bytes, empty for none.
    pub static_values: Vec<u8>,
}

#[derive(Default)]
pub(crate) struct TestDex {
    pub strings: Vec<String>,
    /// String pool index per type.
    pub types: Vec<usize>,
    /// (shorty string, return type, param types).
    pub protos: Vec<(usize, usize, Vec<usize>)>,
    /// (class type, field type, name string).
    pub fields: Vec<(usize, usize, usize)>,
    /// (class type, proto, name string).
    pub methods: Vec<(usize, usize, usize)>,
    pub classes: Vec<TestClass>,
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_uleb(buf: &mut Vec<u8>, mut v: u32) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

impl TestDex {
    pub fn build(&self) -> Vec<u8> {
        let header_size = 0x70;
        let string_ids_off = header_size;
        let type_ids_off = string_ids_off + 4 * self.strings.len();
        let proto_ids_off = type_ids_off + 4 * self.types.len();
        let field_ids_off = proto_ids_off + 12 * self.protos.len();
        let method_ids_off = field_ids_off + 8 * self.fields.len();
        let class_defs_off = method_ids_off + 8 * self.methods.len();
        let data_off = class_defs_off + 32 * self.classes.len();

        // data section: type lists, string data, code items, class data,
        // static values; offsets recorded as the buffer grows
        let mut data = Vec::new();

        let mut param_list_offs = BTreeMap::new();
        for (i, (_, _, params)) in self.protos.iter().enumerate() {
            if params.is_empty() {
                continue;
            }
            param_list_offs.insert(i, data_off + data.len());
            push_u32(&mut data, params.len() as u32);
            for p in params {
                push_u16(&mut data, *p as u16);
            }
        }

        let mut string_data_offs = Vec::new();
        for s in &self.strings {
            string_data_offs.push(data_off + data.len());
            push_uleb(&mut data, s.chars().count() as u32);
            // test strings are plain ASCII, so MUTF-8 is the identity
            data.extend_from_slice(s.as_bytes());
            data.push(0);
        }

        let mut code_offs: BTreeMap<usize, usize> = BTreeMap::new();
        for class in &self.classes {
            for m in class.direct.iter().chain(class.virtual_.iter()) {
                code_offs.insert(m.method_idx, data_off + data.len());
                push_u16(&mut data, m.regs);
                push_u16(&mut data, m.ins);
                push_u16(&mut data, 0); // outs
                push_u16(&mut data, 0); // tries
                push_u32(&mut data, 0); // debug info
                push_u32(&mut data, (m.code.len() / 2) as u32);
                data.extend_from_slice(&m.code);
            }
        }

        let mut class_data_offs = Vec::new();
        let mut static_values_offs = Vec::new();
        for class in &self.classes {
            class_data_offs.push(data_off + data.len());
            push_uleb(&mut data, class.static_fields.len() as u32);
            push_uleb(&mut data, 0); // instance fields
            push_uleb(&mut data, class.direct.len() as u32);
            push_uleb(&mut data, class.virtual_.len() as u32);
            let mut prev = 0;
            for f in &class.static_fields {
                push_uleb(&mut data, (*f - prev) as u32);
                push_uleb(&mut data, 0x9); // public static
                prev = *f;
            }
            for group in [&class.direct, &class.virtual_] {
                let mut prev = 0;
                for m in group {
                    push_uleb(&mut data, (m.method_idx - prev) as u32);
                    push_uleb(&mut data, m.access);
                    push_uleb(&mut data, code_offs[&m.method_idx] as u32);
                    prev = m.method_idx;
                }
            }
            if class.static_values.is_empty() {
                static_values_offs.push(0);
            } else {
                static_values_offs.push(data_off + data.len());
                data.extend_from_slice(&class.static_values);
            }
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(b"dex\n035\0");
        push_u32(&mut buf, 0); // checksum
        buf.extend_from_slice(&[0u8; 20]); // signature
        push_u32(&mut buf, (data_off + data.len()) as u32); // file size
        push_u32(&mut buf, header_size as u32);
        push_u32(&mut buf, 0x1234_5678); // endian tag
        push_u32(&mut buf, 0); // link size
        push_u32(&mut buf, 0); // link off
        push_u32(&mut buf, 0); // map off
        push_u32(&mut buf, self.strings.len() as u32);
        push_u32(&mut buf, string_ids_off as u32);
        push_u32(&mut buf, self.types.len() as u32);
        push_u32(&mut buf, type_ids_off as u32);
        push_u32(&mut buf, self.protos.len() as u32);
        push_u32(&mut buf, proto_ids_off as u32);
        push_u32(&mut buf, self.fields.len() as u32);
        push_u32(&mut buf, field_ids_off as u32);
        push_u32(&mut buf, self.methods.len() as u32);
        push_u32(&mut buf, method_ids_off as u32);
        push_u32(&mut buf, self.classes.len() as u32);
        push_u32(&mut buf, class_defs_off as u32);
        push_u32(&mut buf, data.len() as u32);
        push_u32(&mut buf, data_off as u32);
        assert_eq!(buf.len(), header_size);

        for off in string_data_offs {
            push_u32(&mut buf, off as u32);
        }
        for t in &self.types {
            push_u32(&mut buf, *t as u32);
        }
        for (i, (shorty, ret, _)) in self.protos.iter().enumerate() {
            push_u32(&mut buf, *shorty as u32);
            push_u32(&mut buf, *ret as u32);
            push_u32(&mut buf, param_list_offs.get(&i).copied().unwrap_or(0) as u32);
        }
        for (class, ty, name) in &self.fields {
            push_u16(&mut buf, *class as u16);
            push_u16(&mut buf, *ty as u16);
            push_u32(&mut buf, *name as u32);
        }
        for (class, proto, name) in &self.methods {
            push_u16(&mut buf, *class as u16);
            push_u16(&mut buf, *proto as u16);
            push_u32(&mut buf, *name as u32);
        }
        for (i, class) in self.classes.iter().enumerate() {
            push_u32(&mut buf, class.class_type as u32);
            push_u32(&mut buf, 0x1); // access flags
            push_u32(&mut buf, u32::MAX); // superclass
            push_u32(&mut buf, 0); // interfaces
            push_u32(&mut buf, u32::MAX); // source file
            push_u32(&mut buf, 0); // annotations
            push_u32(&mut buf, class_data_offs[i] as u32);
            push_u32(&mut buf, static_values_offs[i] as u32);
        }
        buf.extend_from_slice(&data);
        buf
    }
}
