//! Schema-driven EBML decoder.
//!
//! Walks the byte buffer and the registry in lock-step. Elements the schema
//! does not know become opaque binary nodes; structure and checksum problems
//! are collected in a [`DecodeReport`] instead of aborting the decode.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::crc::{self, CrcPolicy};
use super::error::{CodecError, CrcMismatch, Violation};
use super::node::{ElementNode, Value};
use super::validate;
use super::vint::{self, UNKNOWN_SIZE};
use crate::schema::{CRC32_ID, ElementDescriptor, ElementType, Registry};

/// Decoder limits and policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeOptions {
    /// Maximum master nesting depth.
    pub max_depth: usize,
    /// Foreign elements probed past inside an unknown-size master before
    /// declaring the master finished.
    pub unknown_size_lookahead: usize,
    pub crc_policy: CrcPolicy,
    /// Fail on structure violations instead of reporting them.
    pub strict: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_depth: 16,
            unknown_size_lookahead: 2,
            crc_policy: CrcPolicy::Report,
            strict: false,
        }
    }
}

impl DecodeOptions {
    /// Reject structure violations and checksum mismatches.
    pub fn strict() -> Self {
        Self {
            crc_policy: CrcPolicy::Reject,
            strict: true,
            ..Self::default()
        }
    }
}

/// Non-fatal findings of a decode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeReport {
    pub violations: Vec<Violation>,
    pub crc_mismatches: Vec<CrcMismatch>,
    /// Wire IDs decoded as opaque pass-through.
    pub unknown_ids: Vec<u32>,
}

impl DecodeReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty() && self.crc_mismatches.is_empty()
    }
}

/// Decoded elements plus the bytes they occupied.
#[derive(Debug, Clone)]
pub struct Decoded<'r> {
    pub nodes: Vec<ElementNode<'r>>,
    pub consumed: usize,
    pub report: DecodeReport,
}

impl<'r> Decoded<'r> {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid()
    }

    /// The nodes, or the first problem the report recorded.
    pub fn into_valid(self) -> Result<Vec<ElementNode<'r>>, CodecError> {
        if !self.report.violations.is_empty() {
            return Err(CodecError::StructureViolation(self.report.violations));
        }
        if let Some(mismatch) = self.report.crc_mismatches.first() {
            return Err(CodecError::CrcMismatch(*mismatch));
        }
        Ok(self.nodes)
    }

    pub fn first(&self) -> Option<&ElementNode<'r>> {
        self.nodes.first()
    }
}

/// Decode every top-level element in `buf`.
pub fn decode<'r>(
    buf: &[u8],
    registry: &'r Registry,
    options: DecodeOptions,
) -> Result<Decoded<'r>, CodecError> {
    let mut decoder = Decoder::new(buf, registry, options);
    let mut parents = Vec::new();
    let mut nodes = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (node, next) = decoder.element(pos, buf.len(), &mut parents)?;
        nodes.push(node);
        pos = next;
    }
    decoder.finish(nodes, pos)
}

/// Decode the single element at the start of `buf` under `parent`.
///
/// Bytes after the element are left alone; `consumed` says where it ended.
pub fn decode_element<'r>(
    buf: &[u8],
    registry: &'r Registry,
    parent: Option<&'r ElementDescriptor>,
    options: DecodeOptions,
) -> Result<Decoded<'r>, CodecError> {
    let mut decoder = Decoder::new(buf, registry, options);
    let mut parents: Vec<&'r ElementDescriptor> = parent.into_iter().collect();
    let (node, next) = decoder.element(0, buf.len(), &mut parents)?;
    decoder.finish(vec![node], next)
}

struct Decoder<'r, 'b> {
    buf: &'b [u8],
    registry: &'r Registry,
    options: DecodeOptions,
    report: DecodeReport,
}

impl<'r, 'b> Decoder<'r, 'b> {
    fn new(buf: &'b [u8], registry: &'r Registry, options: DecodeOptions) -> Self {
        Self {
            buf,
            registry,
            options,
            report: DecodeReport::default(),
        }
    }

    fn finish(self, nodes: Vec<ElementNode<'r>>, consumed: usize) -> Result<Decoded<'r>, CodecError> {
        if self.options.strict && !self.report.violations.is_empty() {
            return Err(CodecError::StructureViolation(self.report.violations));
        }
        Ok(Decoded {
            nodes,
            consumed,
            report: self.report,
        })
    }

    fn read_id(&self, pos: usize, end: usize) -> Result<(u32, usize), CodecError> {
        vint::decode_id(&self.buf[pos..end]).map_err(|e| e.at(pos))
    }

    fn read_size(&self, pos: usize, end: usize) -> Result<(u64, usize), CodecError> {
        vint::decode_size(&self.buf[pos..end]).map_err(|e| e.at(pos))
    }

    /// Decode one element starting at `pos`; returns it and the position after it.
    fn element(
        &mut self,
        pos: usize,
        end: usize,
        parents: &mut Vec<&'r ElementDescriptor>,
    ) -> Result<(ElementNode<'r>, usize), CodecError> {
        let parent = parents.last().copied();
        let (id, id_len) = self.read_id(pos, end)?;
        let after_id = pos + id_len;
        let descriptor = self.registry.resolve(parent, id).ok();

        // Legacy commands are written as a bare two-byte tag. One that
        // declares no children is always bare; one that does is bare when
        // nothing that fits as its size follows.
        if let Some(desc) = descriptor
            && desc.legacy
            && parent.is_none()
            && (after_id == end
                || self.registry.children(Some(desc)).next().is_none()
                || !self.sized_payload_fits(after_id, end))
        {
            let mut node = ElementNode::master(desc, Vec::new());
            node.raw_size = Some(0);
            return Ok((node, after_id));
        }

        let (size, size_len) = self.read_size(after_id, end)?;
        let data_start = after_id + size_len;
        let unbounded = size == UNKNOWN_SIZE;
        let data_end = if unbounded {
            end
        } else {
            let available = end - data_start;
            if size > available as u64 {
                return Err(CodecError::TruncatedStream {
                    offset: data_start,
                    needed: size,
                    available,
                });
            }
            data_start + size as usize
        };

        let Some(descriptor) = descriptor else {
            debug!(
                id = format!("0x{id:X}"),
                size = data_end - data_start,
                "Passing through unknown element"
            );
            self.report.unknown_ids.push(id);
            let mut node = ElementNode::opaque(
                self.registry.unknown(),
                id,
                self.buf[data_start..data_end].to_vec(),
            );
            node.raw_size = Some((data_end - data_start) as u64);
            return Ok((node, data_end));
        };

        if descriptor.kind != ElementType::Master {
            if unbounded {
                return Err(CodecError::InvalidPayload {
                    element: descriptor.name.to_string(),
                    reason: "unknown size on a non-master element".into(),
                });
            }
            let payload = &self.buf[data_start..data_end];
            let value = parse_scalar(descriptor, payload)?;
            if descriptor.kind == ElementType::String && !payload.is_ascii() {
                self.report.violations.push(Violation::NotAscii {
                    element: descriptor.name.to_string(),
                });
            }
            let mut node = ElementNode::new(descriptor, value);
            node.raw_size = Some((data_end - data_start) as u64);
            return Ok((node, data_end));
        }

        if parents.len() >= self.options.max_depth {
            return Err(CodecError::DepthExceeded {
                limit: self.options.max_depth,
            });
        }
        parents.push(descriptor);
        let children = self.children(data_start, data_end, unbounded, parents);
        parents.pop();
        let (children, first_end, master_end) = children?;

        self.report
            .violations
            .extend(validate::check_children(self.registry, descriptor, &children));

        if crc::is_guarded(&children) {
            let stored = children[0].as_bytes().unwrap_or_default();
            if let Err(mismatch) = crc::verify(id, stored, &self.buf[first_end..master_end]) {
                warn!(element = descriptor.name, %mismatch, "CRC mismatch");
                if self.options.crc_policy == CrcPolicy::Reject {
                    return Err(CodecError::CrcMismatch(mismatch));
                }
                self.report.crc_mismatches.push(mismatch);
            }
        }

        let mut node = ElementNode::master(descriptor, children);
        node.raw_size = Some((master_end - data_start) as u64);
        Ok((node, master_end))
    }

    /// Decode the children of a master. Returns them, the end of the first
    /// child, and where the master ended.
    fn children(
        &mut self,
        start: usize,
        end: usize,
        unbounded: bool,
        parents: &mut Vec<&'r ElementDescriptor>,
    ) -> Result<(Vec<ElementNode<'r>>, usize, usize), CodecError> {
        let mut children = Vec::new();
        let mut first_end = start;
        let mut pos = start;
        while pos < end {
            if unbounded {
                let (id, _) = self.read_id(pos, end)?;
                if !self.belongs(parents, id, pos, end) {
                    debug!(
                        id = format!("0x{id:X}"),
                        offset = pos,
                        "Unknown-size master ends"
                    );
                    break;
                }
            }
            let (child, next) = self.element(pos, end, parents)?;
            if children.is_empty() {
                first_end = next;
            }
            children.push(child);
            pos = next;
        }
        Ok((children, first_end, pos))
    }

    /// Whether the element at `pos` continues the unknown-size master on top
    /// of `parents`.
    fn belongs(&self, parents: &[&'r ElementDescriptor], id: u32, pos: usize, end: usize) -> bool {
        let parent = parents.last().copied();
        if self.registry.resolve(parent, id).is_ok() {
            return true;
        }
        if self.is_ancestor_level(parents, id) {
            return false;
        }

        // Foreign element: tolerate it only if a legal child follows soon.
        let mut probe = pos;
        for _ in 0..self.options.unknown_size_lookahead {
            let Some(next) = self.skip(probe, end) else {
                return false;
            };
            if next >= end {
                return false;
            }
            let Ok((next_id, _)) = self.read_id(next, end) else {
                return false;
            };
            if self.registry.is_scoped_child(parent, next_id) {
                return true;
            }
            if self.is_ancestor_level(parents, next_id) {
                return false;
            }
            probe = next;
        }
        false
    }

    /// Whether `id` is a declared child of any ancestor above the top of
    /// `parents`, including the document root.
    fn is_ancestor_level(&self, parents: &[&'r ElementDescriptor], id: u32) -> bool {
        let ancestors = &parents[..parents.len().saturating_sub(1)];
        self.registry.is_scoped_child(None, id)
            || ancestors
                .iter()
                .any(|&a| self.registry.is_scoped_child(Some(a), id))
    }

    /// Whether a size vint at `pos` announces a payload that fits before `end`.
    fn sized_payload_fits(&self, pos: usize, end: usize) -> bool {
        match self.read_size(pos, end) {
            Ok((size, size_len)) => size != UNKNOWN_SIZE && size <= (end - pos - size_len) as u64,
            Err(_) => false,
        }
    }

    /// Position after the element at `pos`, if it has a usable known size.
    fn skip(&self, pos: usize, end: usize) -> Option<usize> {
        let (_, id_len) = self.read_id(pos, end).ok()?;
        let (size, size_len) = self.read_size(pos + id_len, end).ok()?;
        if size == UNKNOWN_SIZE {
            return None;
        }
        let next = (pos + id_len + size_len).checked_add(usize::try_from(size).ok()?)?;
        (next <= end).then_some(next)
    }
}

/// Parse a non-master payload according to its descriptor type.
pub(crate) fn parse_scalar<'r>(
    descriptor: &ElementDescriptor,
    bytes: &[u8],
) -> Result<Value<'r>, CodecError> {
    let invalid = |reason: String| CodecError::InvalidPayload {
        element: descriptor.name.to_string(),
        reason,
    };
    let len = bytes.len();
    let value = match descriptor.kind {
        ElementType::UInteger => match len {
            0 => Value::UInteger(0),
            1..=8 => Value::UInteger(BigEndian::read_uint(bytes, len)),
            _ => return Err(invalid(format!("{len}-byte unsigned integer"))),
        },
        ElementType::Integer => match len {
            0 => Value::Integer(0),
            1..=8 => Value::Integer(BigEndian::read_int(bytes, len)),
            _ => return Err(invalid(format!("{len}-byte integer"))),
        },
        ElementType::Float => match len {
            0 => Value::Float(0.0),
            4 => Value::Float(f64::from(BigEndian::read_f32(bytes))),
            8 => Value::Float(BigEndian::read_f64(bytes)),
            _ => return Err(invalid(format!("{len}-byte float"))),
        },
        ElementType::Date => match len {
            0 => Value::Date(0),
            8 => Value::Date(BigEndian::read_i64(bytes)),
            _ => return Err(invalid(format!("{len}-byte date"))),
        },
        ElementType::String => Value::String(
            trim_nul(bytes)
                .iter()
                .map(|&b| if b.is_ascii() { b as char } else { char::REPLACEMENT_CHARACTER })
                .collect(),
        ),
        ElementType::Unicode => Value::Unicode(
            String::from_utf8(trim_nul(bytes).to_vec()).map_err(|e| invalid(e.to_string()))?,
        ),
        ElementType::Binary => Value::Binary(bytes.to_vec()),
        ElementType::Master => return Err(invalid("master parsed as scalar".into())),
    };
    Ok(value)
}

fn trim_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}
