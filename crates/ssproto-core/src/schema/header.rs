//! Elements shared by every schema: the EBML header and the global
//! `Void` / `CRC-32` elements.

use super::descriptor::{DefaultValue, ElementDef};
use super::registry::Registry;
use crate::ebml::error::CodecError;
use crate::ebml::node::{ElementNode, Value};
use crate::ebml::vint::{MAX_ID_LENGTH, MAX_SIZE_LENGTH};

pub const EBML_ID: u32 = 0x1A45_DFA3;
pub const EBML_VERSION_ID: u32 = 0x4286;
pub const EBML_READ_VERSION_ID: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH_ID: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH_ID: u32 = 0x42F3;
pub const DOC_TYPE_ID: u32 = 0x4282;
pub const DOC_TYPE_VERSION_ID: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION_ID: u32 = 0x4285;
pub const VOID_ID: u32 = 0xEC;
pub const CRC32_ID: u32 = 0xBF;

const HEADER_CHILDREN: &[ElementDef] = &[
    ElementDef::uint("EBMLVersion", EBML_VERSION_ID)
        .mandatory()
        .default(DefaultValue::UInteger(1)),
    ElementDef::uint("EBMLReadVersion", EBML_READ_VERSION_ID)
        .mandatory()
        .default(DefaultValue::UInteger(1)),
    ElementDef::uint("EBMLMaxIDLength", EBML_MAX_ID_LENGTH_ID)
        .mandatory()
        .default(DefaultValue::UInteger(MAX_ID_LENGTH as u64)),
    ElementDef::uint("EBMLMaxSizeLength", EBML_MAX_SIZE_LENGTH_ID)
        .mandatory()
        .default(DefaultValue::UInteger(MAX_SIZE_LENGTH as u64)),
    ElementDef::string("DocType", DOC_TYPE_ID).mandatory(),
    ElementDef::uint("DocTypeVersion", DOC_TYPE_VERSION_ID)
        .mandatory()
        .default(DefaultValue::UInteger(1)),
    ElementDef::uint("DocTypeReadVersion", DOC_TYPE_READ_VERSION_ID)
        .mandatory()
        .default(DefaultValue::UInteger(1)),
];

pub const EBML_HEADER: ElementDef = ElementDef::master("EBML", EBML_ID, HEADER_CHILDREN);

/// Filler for reserved or damaged space; legal under any parent.
pub const VOID: ElementDef = ElementDef::binary("Void", VOID_ID).global();

pub const CRC32: ElementDef = ElementDef::binary("CRC-32", CRC32_ID).global();

/// Typed view of the EBML header that opens a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EbmlHeader {
    pub version: u64,
    pub read_version: u64,
    pub max_id_length: u64,
    pub max_size_length: u64,
    pub doc_type: String,
    pub doc_type_version: u64,
    pub doc_type_read_version: u64,
}

impl EbmlHeader {
    /// Header announcing `registry`'s document type.
    pub fn for_registry(registry: &Registry) -> Self {
        Self {
            version: 1,
            read_version: 1,
            max_id_length: MAX_ID_LENGTH as u64,
            max_size_length: MAX_SIZE_LENGTH as u64,
            doc_type: registry.doc_type().to_string(),
            doc_type_version: registry.version(),
            doc_type_read_version: registry.read_version(),
        }
    }

    pub fn to_node<'r>(&self, registry: &'r Registry) -> Result<ElementNode<'r>, CodecError> {
        let header = registry.lookup(None, "EBML")?;
        let uint = |name: &str, v: u64| -> Result<ElementNode<'r>, CodecError> {
            Ok(ElementNode::new(
                registry.lookup(Some(header), name)?,
                Value::UInteger(v),
            ))
        };
        Ok(ElementNode::master(
            header,
            vec![
                uint("EBMLVersion", self.version)?,
                uint("EBMLReadVersion", self.read_version)?,
                uint("EBMLMaxIDLength", self.max_id_length)?,
                uint("EBMLMaxSizeLength", self.max_size_length)?,
                ElementNode::new(
                    registry.lookup(Some(header), "DocType")?,
                    Value::String(self.doc_type.clone()),
                ),
                uint("DocTypeVersion", self.doc_type_version)?,
                uint("DocTypeReadVersion", self.doc_type_read_version)?,
            ],
        ))
    }

    /// Read a decoded `EBML` node, applying schema defaults for absent fields.
    pub fn from_node(node: &ElementNode<'_>) -> Result<Self, CodecError> {
        if node.id != EBML_ID {
            return Err(CodecError::UnknownName {
                name: "EBML".into(),
                parent: node.name().to_string(),
            });
        }
        let uint = |name: &str, default: u64| {
            node.child(name)
                .and_then(ElementNode::as_uint)
                .unwrap_or(default)
        };
        let doc_type = node
            .child("DocType")
            .and_then(ElementNode::as_str)
            .ok_or_else(|| CodecError::UnknownName {
                name: "DocType".into(),
                parent: "EBML".into(),
            })?;
        Ok(Self {
            version: uint("EBMLVersion", 1),
            read_version: uint("EBMLReadVersion", 1),
            max_id_length: uint("EBMLMaxIDLength", MAX_ID_LENGTH as u64),
            max_size_length: uint("EBMLMaxSizeLength", MAX_SIZE_LENGTH as u64),
            doc_type: doc_type.to_string(),
            doc_type_version: uint("DocTypeVersion", 1),
            doc_type_read_version: uint("DocTypeReadVersion", 1),
        })
    }

    /// Whether a reader for `registry` can handle this document.
    pub fn is_readable_by(&self, registry: &Registry) -> bool {
        self.doc_type == registry.doc_type() && self.doc_type_read_version <= registry.version()
    }
}
