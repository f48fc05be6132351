//! Element descriptors and the constant tables they are loaded from.

use std::fmt;

/// Semantic type of an element payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Master,
    UInteger,
    Integer,
    Float,
    String,
    Unicode,
    Binary,
    Date,
}

impl ElementType {
    /// Whether the payload is a big-endian integer of variable width.
    pub fn is_integer(&self) -> bool {
        matches!(self, ElementType::UInteger | ElementType::Integer)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Master => "master",
            ElementType::UInteger => "uinteger",
            ElementType::Integer => "integer",
            ElementType::Float => "float",
            ElementType::String => "string",
            ElementType::Unicode => "utf-8",
            ElementType::Binary => "binary",
            ElementType::Date => "date",
        };
        write!(f, "{name}")
    }
}

/// Schema default for an element that may be omitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    UInteger(u64),
    Integer(i64),
    Float(f64),
    Str(&'static str),
}

/// One element of a constant schema table.
///
/// Tables are written as nested `const` data; `Registry::load` validates them
/// and flattens them into descriptors.
#[derive(Debug, Clone, Copy)]
pub struct ElementDef {
    pub name: &'static str,
    pub id: u32,
    pub kind: ElementType,
    pub mandatory: bool,
    pub multiple: bool,
    pub global: bool,
    pub legacy: bool,
    pub width: Option<u8>,
    pub min_version: Option<u64>,
    pub default: Option<DefaultValue>,
    pub children: &'static [ElementDef],
}

impl ElementDef {
    const fn new(name: &'static str, id: u32, kind: ElementType) -> Self {
        Self {
            name,
            id,
            kind,
            mandatory: false,
            multiple: false,
            global: false,
            legacy: false,
            width: None,
            min_version: None,
            default: None,
            children: &[],
        }
    }

    pub const fn master(name: &'static str, id: u32, children: &'static [ElementDef]) -> Self {
        let mut def = Self::new(name, id, ElementType::Master);
        def.children = children;
        def
    }

    pub const fn uint(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::UInteger)
    }

    pub const fn int(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::Integer)
    }

    pub const fn float(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::Float)
    }

    pub const fn string(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::String)
    }

    pub const fn unicode(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::Unicode)
    }

    pub const fn binary(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::Binary)
    }

    pub const fn date(name: &'static str, id: u32) -> Self {
        Self::new(name, id, ElementType::Date)
    }

    /// A two-byte ASCII command that the device accepts without a size.
    pub const fn legacy(name: &'static str, tag: [u8; 2], children: &'static [ElementDef]) -> Self {
        let mut def = Self::master(name, ((tag[0] as u32) << 8) | tag[1] as u32, children);
        def.legacy = true;
        def
    }

    pub const fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub const fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub const fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub const fn width(mut self, width: u8) -> Self {
        self.width = Some(width);
        self
    }

    pub const fn min_version(mut self, version: u64) -> Self {
        self.min_version = Some(version);
        self
    }

    pub const fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }
}

/// A complete schema: document type plus its root-level element tables.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDef {
    pub doc_type: &'static str,
    pub version: u64,
    pub read_version: u64,
    pub elements: &'static [ElementDef],
}

/// Immutable schema record for one element, owned by a `Registry`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDescriptor {
    pub name: &'static str,
    pub id: u32,
    pub kind: ElementType,
    pub mandatory: bool,
    pub multiple: bool,
    pub global: bool,
    pub legacy: bool,
    pub width: Option<u8>,
    pub min_version: Option<u64>,
    pub default: Option<DefaultValue>,
    /// Position in the owning registry; identifies the parent scope of children.
    pub(crate) slot: usize,
}

impl ElementDescriptor {
    pub(crate) fn from_def(def: &ElementDef, slot: usize) -> Self {
        Self {
            name: def.name,
            id: def.id,
            kind: def.kind,
            mandatory: def.mandatory,
            multiple: def.multiple,
            global: def.global,
            legacy: def.legacy,
            width: def.width,
            min_version: def.min_version,
            default: def.default,
            slot,
        }
    }

    pub fn is_master(&self) -> bool {
        self.kind == ElementType::Master
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:X})", self.name, self.id)
    }
}
