//! LEB128 readers.
//!
//! Dex class data, string data and encoded values store their counters and
//! offsets as unsigned (and occasionally signed) LEB128. The readers below
//! return the decoded value together with the number of bytes consumed so
//! that callers can advance their cursor.

/// Reads an unsigned LEB128 value from `data` starting at `offset`.
///
/// Returns `(value, consumed_bytes)`, or `None` if the buffer ends in the
/// middle of the encoding.
#[must_use]
pub fn read_uleb128(data: &[u8], offset: usize) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;
    let mut count = 0;
    loop {
        let byte = *data.get(offset + count)?;
        result |= u32::from(byte & 0x7f) << shift;
        count += 1;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return None;
        }
    }
    Some((result, count))
}

/// Reads a signed LEB128 value from `data` starting at `offset`.
///
/// Returns `(value, consumed_bytes)`, or `None` if the buffer ends in the
/// middle of the encoding.
#[must_use]
pub fn read_sleb128(data: &[u8], offset: usize) -> Option<(i32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;
    let mut count = 0;
    let mut byte;
    loop {
        byte = *data.get(offset + count)?;
        result |= u32::from(byte & 0x7f) << shift;
        count += 1;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
        if shift >= 35 {
            return None;
        }
    }
    if shift < 32 && byte & 0x40 != 0 {
        result |= u32::MAX << shift;
    }
    Some((result as i32, count))
}
