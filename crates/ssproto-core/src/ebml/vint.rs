//! EBML variable-length integers.
//!
//! Element IDs keep their length marker in the numeric value (`0x1A45DFA3`
//! is the 4-byte EBML header ID). Sizes strip the marker; a size whose data
//! bits are all ones means "unknown" and decodes to [`UNKNOWN_SIZE`].

use super::error::CodecError;

/// Longest element ID this format allows (`EBMLMaxIDLength`).
pub const MAX_ID_LENGTH: usize = 4;

/// Longest size descriptor this format allows (`EBMLMaxSizeLength`).
pub const MAX_SIZE_LENGTH: usize = 8;

/// Sentinel for an unbounded element: all data bits of an 8-byte vint set.
pub const UNKNOWN_SIZE: u64 = (1 << 56) - 1;

/// Length in bytes announced by the leading byte of a vint (9 for `0x00`).
fn announced_length(first: u8) -> usize {
    first.leading_zeros() as usize + 1
}

/// Largest value representable in `width` bytes, which is reserved for "unknown".
fn reserved_value(width: usize) -> u64 {
    (1u64 << (7 * width)) - 1
}

/// Decode an element ID from the start of `buf`.
pub fn decode_id(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let first = *buf.first().ok_or(CodecError::TruncatedStream {
        offset: 0,
        needed: 1,
        available: 0,
    })?;
    let len = announced_length(first);
    if len > MAX_ID_LENGTH {
        return Err(CodecError::InvalidVarint {
            offset: 0,
            byte: first,
        });
    }
    if buf.len() < len {
        return Err(CodecError::TruncatedStream {
            offset: 0,
            needed: len as u64,
            available: buf.len(),
        });
    }
    let id = buf[..len]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
    Ok((id, len))
}

/// Decode a size descriptor from the start of `buf`.
pub fn decode_size(buf: &[u8]) -> Result<(u64, usize), CodecError> {
    let first = *buf.first().ok_or(CodecError::TruncatedStream {
        offset: 0,
        needed: 1,
        available: 0,
    })?;
    let len = announced_length(first);
    if len > MAX_SIZE_LENGTH {
        return Err(CodecError::InvalidVarint {
            offset: 0,
            byte: first,
        });
    }
    if buf.len() < len {
        return Err(CodecError::TruncatedStream {
            offset: 0,
            needed: len as u64,
            available: buf.len(),
        });
    }
    let mut value = u64::from(first) & (0xFF >> len);
    for &b in &buf[1..len] {
        value = (value << 8) | u64::from(b);
    }
    if value == reserved_value(len) {
        return Ok((UNKNOWN_SIZE, len));
    }
    Ok((value, len))
}

/// Number of bytes an ID occupies on the wire.
pub fn id_width(id: u32) -> usize {
    (((32 - id.leading_zeros()) as usize) + 7) / 8
}

/// Whether the marker bits of `id` agree with its byte width.
pub fn is_valid_id(id: u32) -> bool {
    let width = id_width(id);
    if width == 0 || width > MAX_ID_LENGTH {
        return false;
    }
    let first = (id >> (8 * (width - 1))) as u8;
    announced_length(first) == width
}

/// Encode an element ID.
pub fn encode_id(id: u32) -> Vec<u8> {
    let width = id_width(id).max(1);
    id.to_be_bytes()[4 - width..].to_vec()
}

/// Encode a size using the narrowest vint that can carry it.
pub fn encode_size(size: u64) -> Result<Vec<u8>, CodecError> {
    if size == UNKNOWN_SIZE {
        return encode_size_width(size, MAX_SIZE_LENGTH);
    }
    let width = (1..=MAX_SIZE_LENGTH)
        .find(|&w| size < reserved_value(w))
        .ok_or(CodecError::SizeTooLarge(size))?;
    encode_size_width(size, width)
}

/// Encode a size using exactly `width` bytes.
pub fn encode_size_width(size: u64, width: usize) -> Result<Vec<u8>, CodecError> {
    if width == 0 || width > MAX_SIZE_LENGTH {
        return Err(CodecError::SizeTooLarge(size));
    }
    let fits = size < reserved_value(width) || (size == UNKNOWN_SIZE && width == MAX_SIZE_LENGTH);
    if !fits {
        return Err(CodecError::SizeTooLarge(size));
    }
    let marked = size | (1u64 << (7 * width));
    Ok(marked.to_be_bytes()[8 - width..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_boundaries() {
        for n in [0u64, 1, 127, 128, (1 << 56) - 1] {
            let bytes = encode_size(n).unwrap();
            let (decoded, used) = decode_size(&bytes).unwrap();
            assert_eq!(decoded, n);
            assert_eq!(used, bytes.len());
        }
    }

    #[test]
    fn test_minimal_widths() {
        assert_eq!(encode_size(0).unwrap(), vec![0x80]);
        assert_eq!(encode_size(126).unwrap(), vec![0xFE]);
        // 127 is the reserved 1-byte pattern, so it needs two bytes.
        assert_eq!(encode_size(127).unwrap(), vec![0x40, 0x7F]);
        assert_eq!(encode_size(128).unwrap(), vec![0x40, 0x80]);
    }

    #[test]
    fn test_all_ones_is_unknown() {
        let max = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(decode_size(&max).unwrap(), (UNKNOWN_SIZE, 8));
        assert_eq!(decode_size(&[0xFF]).unwrap(), (UNKNOWN_SIZE, 1));
        assert_eq!(encode_size(UNKNOWN_SIZE).unwrap(), max.to_vec());
    }

    #[test]
    fn test_forced_width() {
        let bytes = encode_size_width(5, 4).unwrap();
        assert_eq!(bytes, vec![0x10, 0x00, 0x00, 0x05]);
        assert_eq!(decode_size(&bytes).unwrap(), (5, 4));
        assert!(encode_size_width(200, 1).is_err());
    }

    #[test]
    fn test_ids() {
        assert_eq!(decode_id(&[0x72, 0x74]).unwrap(), (0x7274, 2));
        assert_eq!(decode_id(&[0x1A, 0x45, 0xDF, 0xA3]).unwrap(), (0x1A45DFA3, 4));
        assert_eq!(encode_id(0x80), vec![0x80]);
        assert_eq!(encode_id(0x1A45DFA3), vec![0x1A, 0x45, 0xDF, 0xA3]);
        assert!(is_valid_id(0x7274));
        assert!(is_valid_id(0xEC));
        assert!(!is_valid_id(0x7F));
        assert!(!is_valid_id(0x0000_4286 | 0x0100_0000));
    }

    #[test]
    fn test_truncated_and_invalid() {
        assert!(matches!(
            decode_size(&[0x40]),
            Err(CodecError::TruncatedStream { needed: 2, .. })
        ));
        assert!(matches!(
            decode_size(&[0x00, 0x01]),
            Err(CodecError::InvalidVarint { byte: 0x00, .. })
        ));
        assert!(matches!(
            decode_id(&[0x08, 0, 0, 0, 0]),
            Err(CodecError::InvalidVarint { byte: 0x08, .. })
        ));
        assert!(decode_id(&[]).is_err());
    }
}
