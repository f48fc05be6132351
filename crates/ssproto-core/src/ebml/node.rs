//! Element trees: typed values attached to schema descriptors.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::schema::{ElementDescriptor, ElementType};

/// Seconds between the Unix epoch and the EBML date epoch (2001-01-01T00:00:00Z).
pub const DATE_EPOCH_UNIX_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert an EBML date (nanoseconds since 2001-01-01) to UTC.
pub fn date_to_utc(nanos: i64) -> Option<DateTime<Utc>> {
    let unix = nanos.checked_add(DATE_EPOCH_UNIX_SECS * NANOS_PER_SEC)?;
    Some(DateTime::from_timestamp_nanos(unix))
}

/// Convert a UTC timestamp to an EBML date.
pub fn utc_to_date(time: DateTime<Utc>) -> Option<i64> {
    time.timestamp_nanos_opt()?
        .checked_sub(DATE_EPOCH_UNIX_SECS * NANOS_PER_SEC)
}

/// Element payload, one variant per element type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'r> {
    Master(Vec<ElementNode<'r>>),
    UInteger(u64),
    Integer(i64),
    Float(f64),
    String(String),
    Unicode(String),
    Binary(Vec<u8>),
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    Date(i64),
}

impl Value<'_> {
    pub fn kind(&self) -> ElementType {
        match self {
            Value::Master(_) => ElementType::Master,
            Value::UInteger(_) => ElementType::UInteger,
            Value::Integer(_) => ElementType::Integer,
            Value::Float(_) => ElementType::Float,
            Value::String(_) => ElementType::String,
            Value::Unicode(_) => ElementType::Unicode,
            Value::Binary(_) => ElementType::Binary,
            Value::Date(_) => ElementType::Date,
        }
    }
}

/// One decoded (or to-be-encoded) element.
///
/// `id` is the wire ID. It equals `descriptor.id` except for opaque nodes,
/// which carry the registry's shared unknown descriptor.
#[derive(Debug, Clone)]
pub struct ElementNode<'r> {
    pub descriptor: &'r ElementDescriptor,
    pub id: u32,
    pub value: Value<'r>,
    /// Payload length as read from the stream; `None` for built trees.
    pub raw_size: Option<u64>,
}

/// Structural equality: `raw_size` is bookkeeping and does not take part.
impl PartialEq for ElementNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.descriptor.name == other.descriptor.name
            && self.value == other.value
    }
}

impl<'r> ElementNode<'r> {
    pub fn new(descriptor: &'r ElementDescriptor, value: Value<'r>) -> Self {
        Self {
            descriptor,
            id: descriptor.id,
            value,
            raw_size: None,
        }
    }

    pub fn master(descriptor: &'r ElementDescriptor, children: Vec<ElementNode<'r>>) -> Self {
        Self::new(descriptor, Value::Master(children))
    }

    /// Wrap bytes of an element the schema does not describe.
    pub fn opaque(unknown: &'r ElementDescriptor, id: u32, bytes: Vec<u8>) -> Self {
        Self {
            descriptor: unknown,
            id,
            value: Value::Binary(bytes),
            raw_size: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// True for pass-through nodes with no schema entry.
    pub fn is_opaque(&self) -> bool {
        self.id != self.descriptor.id
    }

    pub fn children(&self) -> &[ElementNode<'r>] {
        match &self.value {
            Value::Master(children) => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ElementNode<'r>>> {
        match &mut self.value {
            Value::Master(children) => Some(children),
            _ => None,
        }
    }

    /// Append a child; no-op on non-master nodes.
    pub fn push(&mut self, child: ElementNode<'r>) {
        if let Some(children) = self.children_mut() {
            children.push(child);
        }
    }

    pub fn child(&self, name: &str) -> Option<&ElementNode<'r>> {
        self.children().iter().find(|c| c.name() == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ElementNode<'r>> {
        self.children().iter().filter(move |c| c.name() == name)
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self.value {
            Value::UInteger(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Integer(v) => Some(v),
            Value::UInteger(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.value {
            Value::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) | Value::Unicode(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self.value {
            Value::Date(nanos) => date_to_utc(nanos),
            _ => None,
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        if self.is_opaque() {
            return writeln!(
                f,
                "{indent}[0x{:X}] <{} opaque bytes>",
                self.id,
                self.as_bytes().map_or(0, <[u8]>::len)
            );
        }
        match &self.value {
            Value::Master(children) => {
                writeln!(f, "{indent}{}", self.name())?;
                for child in children {
                    child.fmt_tree(f, depth + 1)?;
                }
                Ok(())
            }
            Value::UInteger(v) => writeln!(f, "{indent}{}: {v}", self.name()),
            Value::Integer(v) => writeln!(f, "{indent}{}: {v}", self.name()),
            Value::Float(v) => writeln!(f, "{indent}{}: {v}", self.name()),
            Value::String(s) | Value::Unicode(s) => writeln!(f, "{indent}{}: {s:?}", self.name()),
            Value::Binary(b) => {
                let hex: String = b.iter().take(16).map(|x| format!("{x:02X}")).collect();
                let more = if b.len() > 16 { ".." } else { "" };
                writeln!(f, "{indent}{}: [{}] {hex}{more}", self.name(), b.len())
            }
            Value::Date(nanos) => match date_to_utc(*nanos) {
                Some(t) => writeln!(f, "{indent}{}: {}", self.name(), t.to_rfc3339()),
                None => writeln!(f, "{indent}{}: {nanos}ns", self.name()),
            },
        }
    }
}

impl fmt::Display for ElementNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}
