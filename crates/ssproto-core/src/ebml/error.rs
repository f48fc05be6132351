//! Error types for the EBML codec.

use std::fmt;
use thiserror::Error;

/// A constraint broken by a tree, found while decoding or before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A mandatory child is absent from a fully decoded master.
    MissingMandatory { parent: String, child: String },
    /// A child that may appear once showed up more than once.
    Repeated { parent: String, child: String, count: usize },
    /// A child whose descriptor is not legal under its parent.
    IllegalChild { parent: String, child: String },
    /// A `String` payload held bytes outside ASCII; they decode as U+FFFD.
    NotAscii { element: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingMandatory { parent, child } => {
                write!(f, "{parent}: mandatory child {child} missing")
            }
            Violation::Repeated {
                parent,
                child,
                count,
            } => write!(f, "{parent}: {child} appears {count} times"),
            Violation::IllegalChild { parent, child } => {
                write!(f, "{parent}: {child} is not a legal child")
            }
            Violation::NotAscii { element } => write!(f, "{element}: string is not ASCII"),
        }
    }
}

/// Stored and computed checksums of a master guarded by a `CRC-32` child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrcMismatch {
    pub element_id: u32,
    pub stored: u32,
    pub computed: u32,
}

impl fmt::Display for CrcMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "element 0x{:X}: stored CRC 0x{:08X}, computed 0x{:08X}",
            self.element_id, self.stored, self.computed
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Truncated stream at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedStream {
        offset: usize,
        needed: u64,
        available: usize,
    },

    #[error("Invalid vint at offset {offset}: leading byte 0x{byte:02X}")]
    InvalidVarint { offset: usize, byte: u8 },

    #[error("Unknown element 0x{id:X} under {parent}")]
    UnknownElement { id: u32, parent: String },

    #[error("No element named {name} under {parent}")]
    UnknownName { name: String, parent: String },

    #[error("Structure violation: {}", join(.0))]
    StructureViolation(Vec<Violation>),

    #[error("CRC mismatch: {0}")]
    CrcMismatch(CrcMismatch),

    #[error("Invalid payload for {element}: {reason}")]
    InvalidPayload { element: String, reason: String },

    #[error("Nesting deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("Size {0} cannot be encoded as a vint")]
    SizeTooLarge(u64),

    #[error("Value for {element} does not match its {expected} type")]
    ValueMismatch { element: String, expected: String },
}

fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl CodecError {
    /// Rebase offsets reported by a sub-slice decode onto the enclosing buffer.
    pub(crate) fn at(self, base: usize) -> Self {
        match self {
            CodecError::TruncatedStream {
                offset,
                needed,
                available,
            } => CodecError::TruncatedStream {
                offset: offset + base,
                needed,
                available,
            },
            CodecError::InvalidVarint { offset, byte } => CodecError::InvalidVarint {
                offset: offset + base,
                byte,
            },
            other => other,
        }
    }

    /// Whether the stream ended before the element did.
    pub fn is_truncation(&self) -> bool {
        matches!(self, CodecError::TruncatedStream { .. })
    }
}
