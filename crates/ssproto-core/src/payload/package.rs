//! Firmware update package reader/writer.
//!
//! Layout: EBML header (`DocType = "mide.ss.fwpkg"`), one `UpdatePkg` master,
//! then exactly `PayloadLen` raw payload bytes. The payload is not EBML.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::segment::{Segment, parse_segments};
use crate::ebml::{CodecError, DecodeOptions, ElementNode, Value, decode_element, encode_all};
use crate::schema::package::DOC_TYPE;
use crate::schema::{EbmlHeader, Registry};

/// `KeySlot` value of a package whose payload is not encrypted.
pub const UNENCRYPTED: i64 = -1;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Not an update package: DocType is {found:?}, expected {expected:?}")]
    WrongDocType { expected: &'static str, found: String },
    #[error("Expected UpdatePkg header, found {0}")]
    MissingHeader(String),
    #[error("PayloadLen is {declared} but the payload has {actual} bytes")]
    PayloadLength { declared: u64, actual: usize },
    #[error("Bad segment at payload offset {offset}: {reason}")]
    Segment { offset: usize, reason: String },
    #[error("Payload is encrypted with key slot {key_slot} and no decryptor was given")]
    Encrypted { key_slot: i64 },
    #[error("Decryption failed: {0}")]
    Decrypt(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Contents of the `UpdatePkg` master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePackageHeader {
    pub min_hw_rev: u64,
    pub fw_rev: u64,
    pub min_fw_rev: Option<u64>,
    /// Encryption key slot; [`UNENCRYPTED`] for plaintext payloads.
    pub key_slot: i64,
    pub payload_len: u64,
}

impl UpdatePackageHeader {
    pub fn is_encrypted(&self) -> bool {
        self.key_slot != UNENCRYPTED
    }

    pub fn to_node<'r>(&self, registry: &'r Registry) -> Result<ElementNode<'r>, CodecError> {
        let pkg = registry.lookup(None, "UpdatePkg")?;
        let field = |name: &str, value: Value<'r>| -> Result<ElementNode<'r>, CodecError> {
            Ok(ElementNode::new(registry.lookup(Some(pkg), name)?, value))
        };
        let mut children = vec![
            field("MinHWRev", Value::UInteger(self.min_hw_rev))?,
            field("FWRev", Value::UInteger(self.fw_rev))?,
        ];
        if let Some(min_fw) = self.min_fw_rev {
            children.push(field("MinFWRev", Value::UInteger(min_fw))?);
        }
        children.push(field("KeySlot", Value::Integer(self.key_slot))?);
        children.push(field("PayloadLen", Value::UInteger(self.payload_len))?);
        Ok(ElementNode::master(pkg, children))
    }

    pub fn from_node(node: &ElementNode<'_>) -> Result<Self, PackageError> {
        if node.name() != "UpdatePkg" {
            return Err(PackageError::MissingHeader(node.name().to_string()));
        }
        let missing = |name: &str| {
            PackageError::Codec(CodecError::InvalidPayload {
                element: "UpdatePkg".into(),
                reason: format!("missing {name}"),
            })
        };
        let uint = |name: &str| node.child(name).and_then(ElementNode::as_uint);
        Ok(Self {
            min_hw_rev: uint("MinHWRev").ok_or_else(|| missing("MinHWRev"))?,
            fw_rev: uint("FWRev").ok_or_else(|| missing("FWRev"))?,
            min_fw_rev: uint("MinFWRev"),
            key_slot: node
                .child("KeySlot")
                .and_then(ElementNode::as_int)
                .ok_or_else(|| missing("KeySlot"))?,
            payload_len: uint("PayloadLen").ok_or_else(|| missing("PayloadLen"))?,
        })
    }
}

impl fmt::Display for UpdatePackageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MinHWRev:   {}", self.min_hw_rev)?;
        writeln!(f, "FWRev:      {}", self.fw_rev)?;
        match self.min_fw_rev {
            Some(v) => writeln!(f, "MinFWRev:   {v}")?,
            None => writeln!(f, "MinFWRev:   -")?,
        }
        if self.is_encrypted() {
            writeln!(f, "KeySlot:    {}", self.key_slot)?;
        } else {
            writeln!(f, "KeySlot:    {} (unencrypted)", self.key_slot)?;
        }
        write!(f, "PayloadLen: {}", self.payload_len)
    }
}

/// External service that turns an encrypted payload into plaintext.
pub trait PayloadDecryptor {
    fn decrypt(&self, key_slot: i64, payload: &[u8]) -> Result<Vec<u8>, PackageError>;
}

/// Serialize a package. `header.payload_len` must match `payload`.
pub fn write_package(header: &UpdatePackageHeader, payload: &[u8]) -> Result<Vec<u8>, PackageError> {
    if header.payload_len != payload.len() as u64 {
        return Err(PackageError::PayloadLength {
            declared: header.payload_len,
            actual: payload.len(),
        });
    }
    let registry = Registry::package().map_err(|e| CodecError::InvalidPayload {
        element: "UpdatePkg".into(),
        reason: e.to_string(),
    })?;
    let ebml = EbmlHeader::for_registry(registry).to_node(registry)?;
    let mut out = encode_all(&[ebml, header.to_node(registry)?], registry)?;
    out.extend_from_slice(payload);
    debug!(len = out.len(), fw_rev = header.fw_rev, "Package written");
    Ok(out)
}

/// Parse a package into its header and exactly `PayloadLen` payload bytes.
pub fn read_package(bytes: &[u8]) -> Result<(UpdatePackageHeader, Vec<u8>), PackageError> {
    let registry = Registry::package().map_err(|e| CodecError::InvalidPayload {
        element: "UpdatePkg".into(),
        reason: e.to_string(),
    })?;
    let options = DecodeOptions::strict();

    let ebml = decode_element(bytes, registry, None, options)?;
    let first = ebml
        .first()
        .ok_or_else(|| PackageError::MissingHeader("nothing".into()))?;
    let doc = EbmlHeader::from_node(first).map_err(|_| PackageError::WrongDocType {
        expected: DOC_TYPE,
        found: first.name().to_string(),
    })?;
    if doc.doc_type != DOC_TYPE {
        return Err(PackageError::WrongDocType {
            expected: DOC_TYPE,
            found: doc.doc_type,
        });
    }

    let start = ebml.consumed;
    let pkg = decode_element(&bytes[start..], registry, None, options)?;
    let node = pkg
        .first()
        .ok_or_else(|| PackageError::MissingHeader("nothing".into()))?;
    let header = UpdatePackageHeader::from_node(node)?;

    let payload_start = start + pkg.consumed;
    let available = bytes.len() - payload_start;
    let wanted = usize::try_from(header.payload_len)
        .ok()
        .filter(|&n| n <= available)
        .ok_or(CodecError::TruncatedStream {
            offset: payload_start,
            needed: header.payload_len,
            available,
        })?;
    if available > wanted {
        warn!(
            trailing = available - wanted,
            "Ignoring bytes after package payload"
        );
    }
    let payload = bytes[payload_start..payload_start + wanted].to_vec();
    Ok((header, payload))
}

/// The plaintext payload, decrypting through `decryptor` when needed.
pub fn plaintext<'a>(
    header: &UpdatePackageHeader,
    payload: &'a [u8],
    decryptor: Option<&dyn PayloadDecryptor>,
) -> Result<Cow<'a, [u8]>, PackageError> {
    if !header.is_encrypted() {
        return Ok(Cow::Borrowed(payload));
    }
    let decryptor = decryptor.ok_or(PackageError::Encrypted {
        key_slot: header.key_slot,
    })?;
    Ok(Cow::Owned(decryptor.decrypt(header.key_slot, payload)?))
}

/// Segments of the plaintext payload.
pub fn payload_segments(
    header: &UpdatePackageHeader,
    payload: &[u8],
    decryptor: Option<&dyn PayloadDecryptor>,
) -> Result<Vec<Segment>, PackageError> {
    parse_segments(&plaintext(header, payload, decryptor)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::segment::write_segments;

    fn header(payload_len: u64) -> UpdatePackageHeader {
        UpdatePackageHeader {
            min_hw_rev: 3,
            fw_rev: 42,
            min_fw_rev: None,
            key_slot: UNENCRYPTED,
            payload_len,
        }
    }

    #[test]
    fn test_package_round_trip() {
        let payload = [0, 1, 2, 3, 4, 5, 6, 7];
        let bytes = write_package(&header(8), &payload).unwrap();
        let (parsed, body) = read_package(&bytes).unwrap();
        assert_eq!(parsed, header(8));
        assert_eq!(body, payload);
        assert!(!parsed.is_encrypted());
        assert!(bytes.ends_with(&payload));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut bytes = write_package(&header(2), &[0xAA, 0xBB]).unwrap();
        bytes.extend_from_slice(&[0xCC, 0xDD]);
        let (_, body) = read_package(&bytes).unwrap();
        assert_eq!(body, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_short_payload_is_truncation() {
        let bytes = write_package(&header(4), &[1, 2, 3, 4]).unwrap();
        match read_package(&bytes[..bytes.len() - 1]) {
            Err(PackageError::Codec(err)) => assert!(err.is_truncation()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_length_mismatch_on_write() {
        assert!(matches!(
            write_package(&header(3), &[1, 2]),
            Err(PackageError::PayloadLength {
                declared: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_wrong_doc_type() {
        let cmd = Registry::command().unwrap();
        let ebml = EbmlHeader::for_registry(cmd).to_node(cmd).unwrap();
        let bytes = encode_all(&[ebml], cmd).unwrap();
        assert!(matches!(
            read_package(&bytes),
            Err(PackageError::WrongDocType { .. })
        ));
    }

    #[test]
    fn test_fixed_width_header_fields() {
        let mut with_min = header(0);
        with_min.min_fw_rev = Some(1);
        let small = write_package(&with_min, &[]).unwrap();
        with_min.fw_rev = 0xFFFF_FFFF;
        with_min.min_fw_rev = Some(0x0100_0000);
        let large = write_package(&with_min, &[]).unwrap();
        // Field widths do not depend on the values.
        assert_eq!(small.len(), large.len());
    }

    struct XorDecryptor(u8);

    impl PayloadDecryptor for XorDecryptor {
        fn decrypt(&self, _key_slot: i64, payload: &[u8]) -> Result<Vec<u8>, PackageError> {
            Ok(payload.iter().map(|b| b ^ self.0).collect())
        }
    }

    #[test]
    fn test_encrypted_segments_need_decryptor() {
        let plain = write_segments(&[Segment::new(0x40, &[9, 9])]).unwrap();
        let cipher: Vec<u8> = plain.iter().map(|b| b ^ 0x5A).collect();
        let mut hdr = header(cipher.len() as u64);
        hdr.key_slot = 2;

        assert!(matches!(
            payload_segments(&hdr, &cipher, None),
            Err(PackageError::Encrypted { key_slot: 2 })
        ));
        let segments = payload_segments(&hdr, &cipher, Some(&XorDecryptor(0x5A))).unwrap();
        assert_eq!(segments, vec![Segment::new(0x40, &[9, 9])]);
    }
}
