//! Dalvik opcode table.
//!
//! Maps every defined opcode byte to its mnemonic, its instruction format
//! and the constant pool its index operand refers to. The format alone
//! determines the instruction length in code units, which is what the trace
//! map builder and the interpreter fetch loop rely on.

/// Dalvik instruction formats (as named by the bytecode specification).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    F10x,
    F12x,
    F11n,
    F11x,
    F10t,
    F20t,
    F22x,
    F21t,
    F21s,
    F21h,
    F21c,
    F23x,
    F22b,
    F22t,
    F22s,
    F22c,
    F32x,
    F30t,
    F31t,
    F31i,
    F31c,
    F35c,
    F3rc,
    F45cc,
    F4rcc,
    F51l,
}

impl Format {
    /// Instruction length in 16-bit code units.
    #[must_use]
    pub const fn units(self) -> usize {
        match self {
            Self::F10x | Self::F12x | Self::F11n | Self::F11x | Self::F10t => 1,
            Self::F20t
            | Self::F22x
            | Self::F21t
            | Self::F21s
            | Self::F21h
            | Self::F21c
            | Self::F23x
            | Self::F22b
            | Self::F22t
            | Self::F22s
            | Self::F22c => 2,
            Self::F32x | Self::F30t | Self::F31t | Self::F31i | Self::F31c | Self::F35c
            | Self::F3rc => 3,
            Self::F45cc | Self::F4rcc => 4,
            Self::F51l => 5,
        }
    }
}

/// The constant pool referenced by an instruction's index operand, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolRef {
    None,
    String,
    Type,
    Field,
    Method,
    CallSite,
    MethodHandle,
    Proto,
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub mnemonic: &'static str,
    pub format: Format,
    pub pool: PoolRef,
}

const fn op(mnemonic: &'static str, format: Format) -> OpInfo {
    OpInfo {
        mnemonic,
        format,
        pool: PoolRef::None,
    }
}

const fn op_ref(mnemonic: &'static str, format: Format, pool: PoolRef) -> OpInfo {
    OpInfo {
        mnemonic,
        format,
        pool,
    }
}

/// Returns the description of the given opcode byte, or `None` for the
/// unused gaps of the opcode space.
#[must_use]
#[allow(clippy::too_many_lines)]
pub const fn op_info(opcode: u8) -> Option<OpInfo> {
    use Format::*;
    use PoolRef::*;
    Some(match opcode {
        0x00 => op("nop", F10x),
        0x01 => op("move", F12x),
        0x02 => op("move/from16", F22x),
        0x03 => op("move/16", F32x),
        0x04 => op("move-wide", F12x),
        0x05 => op("move-wide/from16", F22x),
        0x06 => op("move-wide/16", F32x),
        0x07 => op("move-object", F12x),
        0x08 => op("move-object/from16", F22x),
        0x09 => op("move-object/16", F32x),
        0x0a => op("move-result", F11x),
        0x0b => op("move-result-wide", F11x),
        0x0c => op("move-result-object", F11x),
        0x0d => op("move-exception", F11x),
        0x0e => op("return-void", F10x),
        0x0f => op("return", F11x),
        0x10 => op("return-wide", F11x),
        0x11 => op("return-object", F11x),
        0x12 => op("const/4", F11n),
        0x13 => op("const/16", F21s),
        0x14 => op("const", F31i),
        0x15 => op("const/high16", F21h),
        0x16 => op("const-wide/16", F21s),
        0x17 => op("const-wide/32", F31i),
        0x18 => op("const-wide", F51l),
        0x19 => op("const-wide/high16", F21h),
        0x1a => op_ref("const-string", F21c, String),
        0x1b => op_ref("const-string/jumbo", F31c, String),
        0x1c => op_ref("const-class", F21c, Type),
        0x1d => op("monitor-enter", F11x),
        0x1e => op("monitor-exit", F11x),
        0x1f => op_ref("check-cast", F21c, Type),
        0x20 => op_ref("instance-of", F22c, Type),
        0x21 => op("array-length", F12x),
        0x22 => op_ref("new-instance", F21c, Type),
        0x23 => op_ref("new-array", F22c, Type),
        0x24 => op_ref("filled-new-array", F35c, Type),
        0x25 => op_ref("filled-new-array/range", F3rc, Type),
        0x26 => op("fill-array-data", F31t),
        0x27 => op("throw", F11x),
        0x28 => op("goto", F10t),
        0x29 => op("goto/16", F20t),
        0x2a => op("goto/32", F30t),
        0x2b => op("packed-switch", F31t),
        0x2c => op("sparse-switch", F31t),
        0x2d => op("cmpl-float", F23x),
        0x2e => op("cmpg-float", F23x),
        0x2f => op("cmpl-double", F23x),
        0x30 => op("cmpg-double", F23x),
        0x31 => op("cmp-long", F23x),
        0x32 => op("if-eq", F22t),
        0x33 => op("if-ne", F22t),
        0x34 => op("if-lt", F22t),
        0x35 => op("if-ge", F22t),
        0x36 => op("if-gt", F22t),
        0x37 => op("if-le", F22t),
        0x38 => op("if-eqz", F21t),
        0x39 => op("if-nez", F21t),
        0x3a => op("if-ltz", F21t),
        0x3b => op("if-gez", F21t),
        0x3c => op("if-gtz", F21t),
        0x3d => op("if-lez", F21t),
        0x44 => op("aget", F23x),
        0x45 => op("aget-wide", F23x),
        0x46 => op("aget-object", F23x),
        0x47 => op("aget-boolean", F23x),
        0x48 => op("aget-byte", F23x),
        0x49 => op("aget-char", F23x),
        0x4a => op("aget-short", F23x),
        0x4b => op("aput", F23x),
        0x4c => op("aput-wide", F23x),
        0x4d => op("aput-object", F23x),
        0x4e => op("aput-boolean", F23x),
        0x4f => op("aput-byte", F23x),
        0x50 => op("aput-char", F23x),
        0x51 => op("aput-short", F23x),
        0x52 => op_ref("iget", F22c, Field),
        0x53 => op_ref("iget-wide", F22c, Field),
        0x54 => op_ref("iget-object", F22c, Field),
        0x55 => op_ref("iget-boolean", F22c, Field),
        0x56 => op_ref("iget-byte", F22c, Field),
        0x57 => op_ref("iget-char", F22c, Field),
        0x58 => op_ref("iget-short", F22c, Field),
        0x59 => op_ref("iput", F22c, Field),
        0x5a => op_ref("iput-wide", F22c, Field),
        0x5b => op_ref("iput-object", F22c, Field),
        0x5c => op_ref("iput-boolean", F22c, Field),
        0x5d => op_ref("iput-byte", F22c, Field),
        0x5e => op_ref("iput-char", F22c, Field),
        0x5f => op_ref("iput-short", F22c, Field),
        0x60 => op_ref("sget", F21c, Field),
        0x61 => op_ref("sget-wide", F21c, Field),
        0x62 => op_ref("sget-object", F21c, Field),
        0x63 => op_ref("sget-boolean", F21c, Field),
        0x64 => op_ref("sget-byte", F21c, Field),
        0x65 => op_ref("sget-char", F21c, Field),
        0x66 => op_ref("sget-short", F21c, Field),
        0x67 => op_ref("sput", F21c, Field),
        0x68 => op_ref("sput-wide", F21c, Field),
        0x69 => op_ref("sput-object", F21c, Field),
        0x6a => op_ref("sput-boolean", F21c, Field),
        0x6b => op_ref("sput-byte", F21c, Field),
        0x6c => op_ref("sput-char", F21c, Field),
        0x6d => op_ref("sput-short", F21c, Field),
        0x6e => op_ref("invoke-virtual", F35c, Method),
        0x6f => op_ref("invoke-super", F35c, Method),
        0x70 => op_ref("invoke-direct", F35c, Method),
        0x71 => op_ref("invoke-static", F35c, Method),
        0x72 => op_ref("invoke-interface", F35c, Method),
        0x74 => op_ref("invoke-virtual/range", F3rc, Method),
        0x75 => op_ref("invoke-super/range", F3rc, Method),
        0x76 => op_ref("invoke-direct/range", F3rc, Method),
        0x77 => op_ref("invoke-static/range", F3rc, Method),
        0x78 => op_ref("invoke-interface/range", F3rc, Method),
        0x7b => op("neg-int", F12x),
        0x7c => op("not-int", F12x),
        0x7d => op("neg-long", F12x),
        0x7e => op("not-long", F12x),
        0x7f => op("neg-float", F12x),
        0x80 => op("neg-double", F12x),
        0x81 => op("int-to-long", F12x),
        0x82 => op("int-to-float", F12x),
        0x83 => op("int-to-double", F12x),
        0x84 => op("long-to-int", F12x),
        0x85 => op("long-to-float", F12x),
        0x86 => op("long-to-double", F12x),
        0x87 => op("float-to-int", F12x),
        0x88 => op("float-to-long", F12x),
        0x89 => op("float-to-double", F12x),
        0x8a => op("double-to-int", F12x),
        0x8b => op("double-to-long", F12x),
        0x8c => op("double-to-float", F12x),
        0x8d => op("int-to-byte", F12x),
        0x8e => op("int-to-char", F12x),
        0x8f => op("int-to-short", F12x),
        0x90 => op("add-int", F23x),
        0x91 => op("sub-int", F23x),
        0x92 => op("mul-int", F23x),
        0x93 => op("div-int", F23x),
        0x94 => op("rem-int", F23x),
        0x95 => op("and-int", F23x),
        0x96 => op("or-int", F23x),
        0x97 => op("xor-int", F23x),
        0x98 => op("shl-int", F23x),
        0x99 => op("shr-int", F23x),
        0x9a => op("ushr-int", F23x),
        0x9b => op("add-long", F23x),
        0x9c => op("sub-long", F23x),
        0x9d => op("mul-long", F23x),
        0x9e => op("div-long", F23x),
        0x9f => op("rem-long", F23x),
        0xa0 => op("and-long", F23x),
        0xa1 => op("or-long", F23x),
        0xa2 => op("xor-long", F23x),
        0xa3 => op("shl-long", F23x),
        0xa4 => op("shr-long", F23x),
        0xa5 => op("ushr-long", F23x),
        0xa6 => op("add-float", F23x),
        0xa7 => op("sub-float", F23x),
        0xa8 => op("mul-float", F23x),
        0xa9 => op("div-float", F23x),
        0xaa => op("rem-float", F23x),
        0xab => op("add-double", F23x),
        0xac => op("sub-double", F23x),
        0xad => op("mul-double", F23x),
        0xae => op("div-double", F23x),
        0xaf => op("rem-double", F23x),
        0xb0 => op("add-int/2addr", F12x),
        0xb1 => op("sub-int/2addr", F12x),
        0xb2 => op("mul-int/2addr", F12x),
        0xb3 => op("div-int/2addr", F12x),
        0xb4 => op("rem-int/2addr", F12x),
        0xb5 => op("and-int/2addr", F12x),
        0xb6 => op("or-int/2addr", F12x),
        0xb7 => op("xor-int/2addr", F12x),
        0xb8 => op("shl-int/2addr", F12x),
        0xb9 => op("shr-int/2addr", F12x),
        0xba => op("ushr-int/2addr", F12x),
        0xbb => op("add-long/2addr", F12x),
        0xbc => op("sub-long/2addr", F12x),
        0xbd => op("mul-long/2addr", F12x),
        0xbe => op("div-long/2addr", F12x),
        0xbf => op("rem-long/2addr", F12x),
        0xc0 => op("and-long/2addr", F12x),
        0xc1 => op("or-long/2addr", F12x),
        0xc2 => op("xor-long/2addr", F12x),
        0xc3 => op("shl-long/2addr", F12x),
        0xc4 => op("shr-long/2addr", F12x),
        0xc5 => op("ushr-long/2addr", F12x),
        0xc6 => op("add-float/2addr", F12x),
        0xc7 => op("sub-float/2addr", F12x),
        0xc8 => op("mul-float/2addr", F12x),
        0xc9 => op("div-float/2addr", F12x),
        0xca => op("rem-float/2addr", F12x),
        0xcb => op("add-double/2addr", F12x),
        0xcc => op("sub-double/2addr", F12x),
        0xcd => op("mul-double/2addr", F12x),
        0xce => op("div-double/2addr", F12x),
        0xcf => op("rem-double/2addr", F12x),
        0xd0 => op("add-int/lit16", F22s),
        0xd1 => op("rsub-int", F22s),
        0xd2 => op("mul-int/lit16", F22s),
        0xd3 => op("div-int/lit16", F22s),
        0xd4 => op("rem-int/lit16", F22s),
        0xd5 => op("and-int/lit16", F22s),
        0xd6 => op("or-int/lit16", F22s),
        0xd7 => op("xor-int/lit16", F22s),
        0xd8 => op("add-int/lit8", F22b),
        0xd9 => op("rsub-int/lit8", F22b),
        0xda => op("mul-int/lit8", F22b),
        0xdb => op("div-int/lit8", F22b),
        0xdc => op("rem-int/lit8", F22b),
        0xdd => op("and-int/lit8", F22b),
        0xde => op("or-int/lit8", F22b),
        0xdf => op("xor-int/lit8", F22b),
        0xe0 => op("shl-int/lit8", F22b),
        0xe1 => op("shr-int/lit8", F22b),
        0xe2 => op("ushr-int/lit8", F22b),
        0xfa => op_ref("invoke-polymorphic", F45cc, Method),
        0xfb => op_ref("invoke-polymorphic/range", F4rcc, Method),
        0xfc => op_ref("invoke-custom", F35c, CallSite),
        0xfd => op_ref("invoke-custom/range", F3rc, CallSite),
        0xfe => op_ref("const-method-handle", F21c, MethodHandle),
        0xff => op_ref("const-method-type", F21c, Proto),
        _ => return Option::None,
    })
}

/// Payload pseudo-instruction identifiers (second byte of a `nop`-coded
/// payload opcode).
pub const PACKED_SWITCH_PAYLOAD: u8 = 0x01;
pub const SPARSE_SWITCH_PAYLOAD: u8 = 0x02;
pub const FILL_ARRAY_DATA_PAYLOAD: u8 = 0x03;
