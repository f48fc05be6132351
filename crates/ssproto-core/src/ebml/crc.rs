//! CRC-32 guard for master elements.
//!
//! A master whose first child is `CRC-32` carries the IEEE CRC-32 of the
//! encoded bytes of all its remaining children, stored little-endian.

use serde::{Deserialize, Serialize};

use super::error::{CodecError, CrcMismatch};
use super::node::{ElementNode, Value};
use crate::schema::{CRC32_ID, Registry};

/// Width of the stored checksum.
pub const CRC32_LEN: usize = 4;

/// What decode does with a checksum that does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrcPolicy {
    /// Record the mismatch in the decode report and keep going.
    #[default]
    Report,
    /// Fail the decode.
    Reject,
}

pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Compare a stored checksum against the bytes it covers.
pub fn verify(element_id: u32, stored: &[u8], covered: &[u8]) -> Result<(), CrcMismatch> {
    let computed = checksum(covered);
    let stored = match <[u8; CRC32_LEN]>::try_from(stored) {
        Ok(bytes) => u32::from_le_bytes(bytes),
        // A malformed stored value never matches.
        Err(_) => !computed,
    };
    if stored == computed {
        Ok(())
    } else {
        Err(CrcMismatch {
            element_id,
            stored,
            computed,
        })
    }
}

/// A `CRC-32` child whose value the encoder fills in.
pub fn placeholder(registry: &Registry) -> Result<ElementNode<'_>, CodecError> {
    let descriptor = registry.lookup(None, "CRC-32")?;
    Ok(ElementNode::new(
        descriptor,
        Value::Binary(vec![0; CRC32_LEN]),
    ))
}

/// Whether `children` opens with a checksum element.
pub fn is_guarded(children: &[ElementNode<'_>]) -> bool {
    children.first().is_some_and(|c| c.id == CRC32_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // IEEE CRC-32 of "123456789".
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_verify() {
        let data = b"payload";
        let stored = checksum(data).to_le_bytes();
        assert!(verify(0x80, &stored, data).is_ok());

        let err = verify(0x80, &stored, b"payloaD").unwrap_err();
        assert_eq!(err.stored, checksum(data));
        assert!(verify(0x80, &stored[..3], data).is_err());
    }
}
