//! Schema-checked EBML encoder.
//!
//! The whole tree is validated before any byte is produced. Output is
//! deterministic: encoding the same tree twice gives identical bytes.

use byteorder::{BigEndian, ByteOrder};

use super::crc;
use super::error::{CodecError, Violation};
use super::node::{ElementNode, Value};
use super::validate;
use super::vint;
use crate::schema::{CRC32_ID, ElementType, Registry};

/// Encode one element (and its subtree).
pub fn encode(node: &ElementNode<'_>, registry: &Registry) -> Result<Vec<u8>, CodecError> {
    validate_tree(node, registry)?;
    let mut out = Vec::new();
    write(node, &mut out)?;
    Ok(out)
}

/// Encode a sequence of top-level elements back to back.
pub fn encode_all(nodes: &[ElementNode<'_>], registry: &Registry) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for node in nodes {
        validate_tree(node, registry)?;
        write(node, &mut out)?;
    }
    Ok(out)
}

fn validate_tree(node: &ElementNode<'_>, registry: &Registry) -> Result<(), CodecError> {
    let mut violations = Vec::new();
    check_node(node, registry, &mut violations)?;
    let at_root = node.is_opaque()
        || registry
            .resolve(None, node.id)
            .is_ok_and(|d| d.slot == node.descriptor.slot);
    if !at_root {
        violations.push(Violation::IllegalChild {
            parent: "root".into(),
            child: node.name().to_string(),
        });
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(CodecError::StructureViolation(violations))
    }
}

fn check_node(
    node: &ElementNode<'_>,
    registry: &Registry,
    violations: &mut Vec<Violation>,
) -> Result<(), CodecError> {
    let expected = if node.is_opaque() {
        ElementType::Binary
    } else {
        node.descriptor.kind
    };
    if node.value.kind() != expected {
        return Err(CodecError::ValueMismatch {
            element: node.name().to_string(),
            expected: expected.to_string(),
        });
    }
    if let Value::Master(children) = &node.value {
        violations.extend(validate::check_legality(registry, node.descriptor, children));
        violations.extend(validate::check_children(registry, node.descriptor, children));
        for child in children {
            check_node(child, registry, violations)?;
        }
    }
    Ok(())
}

fn write(node: &ElementNode<'_>, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.extend_from_slice(&vint::encode_id(node.id));
    let payload = match &node.value {
        Value::Master(children) => {
            if node.descriptor.legacy && children.is_empty() {
                return Ok(());
            }
            master_payload(children)?
        }
        _ => scalar_payload(node)?,
    };
    out.extend_from_slice(&vint::encode_size(payload.len() as u64)?);
    out.extend_from_slice(&payload);
    Ok(())
}

/// Children bytes; a leading `CRC-32` child is filled in last.
fn master_payload(children: &[ElementNode<'_>]) -> Result<Vec<u8>, CodecError> {
    let guarded = crc::is_guarded(children);
    let rest = if guarded { &children[1..] } else { children };
    let mut body = Vec::new();
    for child in rest {
        write(child, &mut body)?;
    }
    if !guarded {
        return Ok(body);
    }

    let checksum = crc::checksum(&body);
    let mut payload = vint::encode_id(CRC32_ID);
    payload.extend_from_slice(&vint::encode_size(crc::CRC32_LEN as u64)?);
    payload.extend_from_slice(&checksum.to_le_bytes());
    payload.extend_from_slice(&body);
    Ok(payload)
}

fn scalar_payload(node: &ElementNode<'_>) -> Result<Vec<u8>, CodecError> {
    let fixed = node.descriptor.width.map(usize::from);
    let out_of_range = |value: String| CodecError::InvalidPayload {
        element: node.name().to_string(),
        reason: format!("{value} does not fit in {} bytes", fixed.unwrap_or(8)),
    };
    let bytes = match &node.value {
        Value::UInteger(v) => {
            let needed = uint_width(*v);
            let width = fixed.unwrap_or(needed);
            if needed > width {
                return Err(out_of_range(v.to_string()));
            }
            let mut buf = vec![0; width];
            BigEndian::write_uint(&mut buf, *v, width);
            buf
        }
        Value::Integer(v) => {
            let needed = int_width(*v);
            let width = fixed.unwrap_or(needed);
            if needed > width {
                return Err(out_of_range(v.to_string()));
            }
            let mut buf = vec![0; width];
            BigEndian::write_int(&mut buf, *v, width);
            buf
        }
        Value::Float(v) => {
            let mut buf = vec![0; 8];
            BigEndian::write_f64(&mut buf, *v);
            buf
        }
        Value::Date(v) => {
            let mut buf = vec![0; 8];
            BigEndian::write_i64(&mut buf, *v);
            buf
        }
        Value::String(s) => {
            if !s.is_ascii() {
                return Err(CodecError::InvalidPayload {
                    element: node.name().to_string(),
                    reason: "string is not ASCII".into(),
                });
            }
            s.as_bytes().to_vec()
        }
        Value::Unicode(s) => s.as_bytes().to_vec(),
        Value::Binary(b) => b.clone(),
        Value::Master(_) => {
            return Err(CodecError::ValueMismatch {
                element: node.name().to_string(),
                expected: node.descriptor.kind.to_string(),
            });
        }
    };
    Ok(bytes)
}

/// Narrowest big-endian width for an unsigned value (at least one byte).
fn uint_width(v: u64) -> usize {
    (8 - v.leading_zeros() as usize / 8).max(1)
}

/// Narrowest two's-complement width for a signed value.
fn int_width(v: i64) -> usize {
    (1..=8)
        .find(|&w| {
            let bits = 8 * w as u32 - 1;
            w == 8 || (-(1i64 << bits)..(1i64 << bits)).contains(&v)
        })
        .unwrap_or(8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::decode::{DecodeOptions, decode};

    fn command_registry() -> &'static Registry {
        Registry::command().unwrap()
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(uint_width(0), 1);
        assert_eq!(uint_width(0xFF), 1);
        assert_eq!(uint_width(0x100), 2);
        assert_eq!(uint_width(u64::MAX), 8);
        assert_eq!(int_width(-1), 1);
        assert_eq!(int_width(127), 1);
        assert_eq!(int_width(128), 2);
        assert_eq!(int_width(-129), 2);
        assert_eq!(int_width(i64::MIN), 8);
    }

    #[test]
    fn test_missing_mandatory_fails_fast() {
        let reg = command_registry();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let idx = reg.lookup(Some(resp), "ResponseIdx").unwrap();
        let node = ElementNode::master(resp, vec![ElementNode::new(idx, Value::UInteger(1))]);
        match encode(&node, reg) {
            Err(CodecError::StructureViolation(v)) => {
                assert_eq!(
                    v,
                    vec![Violation::MissingMandatory {
                        parent: "EBMLResponse".into(),
                        child: "CMDQueueDepth".into(),
                    }]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_illegal_child_and_value_mismatch() {
        let reg = command_registry();
        let cmd = reg.lookup(None, "EBMLCommand").unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let idx = reg.lookup(Some(resp), "ResponseIdx").unwrap();
        let node = ElementNode::master(cmd, vec![ElementNode::new(idx, Value::UInteger(1))]);
        assert!(matches!(
            encode(&node, reg),
            Err(CodecError::StructureViolation(_))
        ));

        let bad = ElementNode::new(idx, Value::Unicode("five".into()));
        assert!(matches!(
            encode(&bad, reg),
            Err(CodecError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn test_crc_fill_is_deterministic() {
        let reg = command_registry();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let node = ElementNode::master(
            resp,
            vec![
                crc::placeholder(reg).unwrap(),
                ElementNode::new(reg.lookup(Some(resp), "ResponseIdx").unwrap(), Value::UInteger(9)),
                ElementNode::new(reg.lookup(Some(resp), "CMDQueueDepth").unwrap(), Value::UInteger(4)),
            ],
        );
        let first = encode(&node, reg).unwrap();
        let second = encode(&node, reg).unwrap();
        assert_eq!(first, second);

        // Stored CRC covers everything after the CRC element.
        let decoded = decode(&first, reg, DecodeOptions::strict()).unwrap();
        let stored = decoded.first().unwrap().children()[0].as_bytes().unwrap().to_vec();
        let header_len = 1 + 1; // 0x86 + 1-byte size
        let crc_len = 1 + 1 + 4;
        let covered = &first[header_len + crc_len..];
        assert_eq!(stored, crc::checksum(covered).to_le_bytes().to_vec());
    }

    #[test]
    fn test_round_trip_nested_tree() {
        let reg = command_registry();
        let cmd = reg.lookup(None, "EBMLCommand").unwrap();
        let set = reg.lookup(Some(cmd), "SetWiFi").unwrap();
        let ap = reg.lookup(Some(set), "AP").unwrap();
        let make_ap = |ssid: &str, password: Option<&str>, selected: u64| {
            let mut children = vec![ElementNode::new(
                reg.lookup(Some(ap), "SSID").unwrap(),
                Value::Unicode(ssid.into()),
            )];
            if let Some(pw) = password {
                children.push(ElementNode::new(
                    reg.lookup(Some(ap), "Password").unwrap(),
                    Value::Unicode(pw.into()),
                ));
            }
            children.push(ElementNode::new(
                reg.lookup(Some(ap), "Selected").unwrap(),
                Value::UInteger(selected),
            ));
            ElementNode::master(ap, children)
        };
        let tree = ElementNode::master(
            cmd,
            vec![ElementNode::master(
                set,
                vec![make_ap("office", Some("pass123"), 1), make_ap("café", None, 0)],
            )],
        );
        let bytes = encode(&tree, reg).unwrap();
        let decoded = decode(&bytes, reg, DecodeOptions::strict()).unwrap();
        assert_eq!(decoded.consumed, bytes.len());
        assert_eq!(decoded.nodes, vec![tree]);
    }

    #[test]
    fn test_fixed_width_overflow() {
        let reg = Registry::package().unwrap();
        let pkg = reg.lookup(None, "UpdatePkg").unwrap();
        let slot = reg.lookup(Some(pkg), "KeySlot").unwrap();
        let ok = ElementNode::new(slot, Value::Integer(-1));
        assert_eq!(scalar_payload(&ok).unwrap(), vec![0xFF; usize::from(slot.width.unwrap())]);
        let too_big = ElementNode::new(slot, Value::Integer(i64::MAX));
        assert!(matches!(
            scalar_payload(&too_big),
            Err(CodecError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_child_element_rejected_at_root() {
        let reg = Registry::package().unwrap();
        let pkg = reg.lookup(None, "UpdatePkg").unwrap();
        let slot = reg.lookup(Some(pkg), "KeySlot").unwrap();
        let stray = ElementNode::new(slot, Value::Integer(-1));
        match encode(&stray, reg) {
            Err(CodecError::StructureViolation(v)) => assert_eq!(
                v,
                vec![Violation::IllegalChild {
                    parent: "root".into(),
                    child: "KeySlot".into(),
                }]
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            encode_all(&[stray], reg),
            Err(CodecError::StructureViolation(_))
        ));
    }
}
