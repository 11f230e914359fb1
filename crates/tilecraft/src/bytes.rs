//! Low-level byte access and integer/text conversion for byte slices.
//!
//! Every read goes through [`slice_at`], which checks the range before slicing.

use crate::errors::BoundsError;

/// Byte order of a multi-byte integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Returns `data[offset..offset + len]`, or a [`BoundsError`] naming `what`.
pub fn slice_at<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    what: &str,
) -> Result<&'a [u8], BoundsError> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(&data[offset..end]),
        _ => Err(BoundsError {
            what: what.to_string(),
            offset,
            len,
            available: data.len(),
        }),
    }
}

/// Reads up to 8 bytes as an unsigned integer.
pub fn read_uint(bytes: &[u8], endian: Endian) -> u64 {
    debug_assert!(bytes.len() <= 8);

    let fold = |acc: u64, b: &u8| (acc << 8) | *b as u64;
    match endian {
        Endian::Big => bytes.iter().fold(0, fold),
        Endian::Little => bytes.iter().rev().fold(0, fold),
    }
}

/// Writes the low `width` bytes of `value`.
pub fn write_uint(value: u64, width: usize, endian: Endian) -> Vec<u8> {
    let le = value.to_le_bytes();
    let mut out = le[..width].to_vec();
    if endian == Endian::Big {
        out.reverse();
    }

    out
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// One character per byte (Latin-1). Never fails.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of [`latin1_to_string`]. Characters above U+00FF have no byte of
/// their own and are written as `\uXXXX` per UTF-16 unit, which does not
/// decode back to the original character.
pub fn string_to_latin1(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    let mut units = [0u16; 2];

    for c in s.chars() {
        let code = c as u32;
        if code <= 0xFF {
            out.push(code as u8);
            continue;
        }

        for unit in c.encode_utf16(&mut units) {
            out.extend_from_slice(format!("\\u{:04x}", unit).as_bytes());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_at() {
        let data = [1, 2, 3, 4];
        assert_eq!(slice_at(&data, 1, 2, "x").unwrap(), &[2, 3]);
        assert_eq!(slice_at(&data, 4, 0, "x").unwrap(), &[] as &[u8]);
    }

    #[test]
    fn test_slice_at_out_of_bounds() {
        let data = [1, 2, 3, 4];
        assert_eq!(
            slice_at(&data, 3, 2, "tail").unwrap_err(),
            BoundsError {
                what: "tail".to_string(),
                offset: 3,
                len: 2,
                available: 4,
            }
        );
    }

    #[test]
    fn test_slice_at_overflow() {
        let data = [0u8; 4];
        assert!(slice_at(&data, usize::MAX, 2, "x").is_err());
    }

    #[test]
    fn test_read_uint() {
        assert_eq!(read_uint(&[0x01, 0x02], Endian::Little), 0x0201);
        assert_eq!(read_uint(&[0x01, 0x02], Endian::Big), 0x0102);
        assert_eq!(read_uint(&[0xFF; 8], Endian::Big), u64::MAX);
    }

    #[test]
    fn test_write_uint() {
        assert_eq!(write_uint(0x0102, 2, Endian::Little), vec![0x02, 0x01]);
        assert_eq!(write_uint(0x0102, 4, Endian::Big), vec![0, 0, 0x01, 0x02]);
    }

    #[test]
    fn test_sign_extend() {
        assert_eq!(sign_extend(0b11111111, 8), -1);
        assert_eq!(sign_extend(0x7F, 8), 127);
    }

    #[test]
    fn test_latin1() {
        assert_eq!(latin1_to_string(b"BIN\0"), "BIN\0");
        assert_eq!(latin1_to_string(&[0x89, b'P']), "\u{89}P");
        assert_eq!(string_to_latin1("\u{89}P"), vec![0x89, b'P']);
    }

    #[test]
    fn test_latin1_escape() {
        assert_eq!(string_to_latin1("a\u{4e2d}"), b"a\\u4e2d".to_vec());
        assert_eq!(string_to_latin1("\u{1F600}"), b"\\ud83d\\ude00".to_vec());
    }
}
