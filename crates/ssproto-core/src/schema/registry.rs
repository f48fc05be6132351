//! Schema registry: resolves element IDs within a parent context.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use super::descriptor::{ElementDef, ElementDescriptor, ElementType, SchemaDef};
use crate::ebml::error::CodecError;
use crate::ebml::vint;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate ID 0x{id:X} ({name}) under {parent}")]
    DuplicateId {
        id: u32,
        name: &'static str,
        parent: String,
    },
    #[error("Single-occurrence element {name} defined twice under {parent}")]
    RepeatedDefinition { name: &'static str, parent: String },
    #[error("Malformed ID 0x{id:X} for {name}")]
    MalformedId { name: &'static str, id: u32 },
    #[error("Malformed width {width} for {name}")]
    MalformedWidth { name: &'static str, width: u8 },
    #[error("Global element {name} (0x{id:X}) collides with a scoped element")]
    GlobalCollision { name: &'static str, id: u32 },
    #[error("Legacy command {legacy} shares ID 0x{id:X} with {other}")]
    LegacyCollision {
        legacy: &'static str,
        other: &'static str,
        id: u32,
    },
}

/// Parent scope key: `None` is the document root.
type Scope = Option<usize>;

/// Immutable element registry for one schema.
///
/// Built once with [`Registry::load`]; all lookups take `&self`, so a single
/// instance can be shared between threads.
#[derive(Debug)]
pub struct Registry {
    doc_type: &'static str,
    version: u64,
    read_version: u64,
    descriptors: Vec<ElementDescriptor>,
    scoped: HashMap<(Scope, u32), usize>,
    names: HashMap<Scope, HashMap<&'static str, usize>>,
    children: HashMap<Scope, Vec<usize>>,
    globals: HashMap<u32, usize>,
    unknown: ElementDescriptor,
}

impl Registry {
    /// Validate a schema table and build its registry.
    pub fn load(schema: &SchemaDef) -> Result<Self, SchemaError> {
        let mut registry = Self {
            doc_type: schema.doc_type,
            version: schema.version,
            read_version: schema.read_version,
            descriptors: Vec::new(),
            scoped: HashMap::new(),
            names: HashMap::new(),
            children: HashMap::new(),
            globals: HashMap::new(),
            unknown: ElementDescriptor::from_def(
                &ElementDef::binary("Unknown", 0),
                usize::MAX,
            ),
        };

        for def in schema.elements {
            registry.insert(def, None)?;
        }
        registry.check_globals()?;
        registry.check_legacy(schema.elements)?;

        debug!(
            doc_type = registry.doc_type,
            elements = registry.descriptors.len(),
            "Schema loaded"
        );
        Ok(registry)
    }

    fn insert(&mut self, def: &ElementDef, parent: Scope) -> Result<(), SchemaError> {
        if !vint::is_valid_id(def.id) {
            return Err(SchemaError::MalformedId {
                name: def.name,
                id: def.id,
            });
        }
        if let Some(width) = def.width
            && (!(1..=8).contains(&width) || !(def.kind.is_integer() || def.kind == ElementType::Date))
        {
            return Err(SchemaError::MalformedWidth {
                name: def.name,
                width,
            });
        }

        let slot = self.descriptors.len();
        if def.global {
            if self.globals.contains_key(&def.id) {
                return Err(SchemaError::DuplicateId {
                    id: def.id,
                    name: def.name,
                    parent: "global scope".into(),
                });
            }
            self.globals.insert(def.id, slot);
        } else {
            if self.scoped.contains_key(&(parent, def.id)) {
                return Err(SchemaError::DuplicateId {
                    id: def.id,
                    name: def.name,
                    parent: self.scope_name(parent),
                });
            }
            if let Some(&existing) = self.names.get(&parent).and_then(|n| n.get(def.name))
                && (!def.multiple || !self.descriptors[existing].multiple)
            {
                return Err(SchemaError::RepeatedDefinition {
                    name: def.name,
                    parent: self.scope_name(parent),
                });
            }
            self.scoped.insert((parent, def.id), slot);
            self.children.entry(parent).or_default().push(slot);
        }
        self.names
            .entry(parent)
            .or_default()
            .entry(def.name)
            .or_insert(slot);
        self.descriptors.push(ElementDescriptor::from_def(def, slot));

        for child in def.children {
            self.insert(child, Some(slot))?;
        }
        Ok(())
    }

    fn check_globals(&self) -> Result<(), SchemaError> {
        for &(_, id) in self.scoped.keys() {
            if let Some(&slot) = self.globals.get(&id) {
                let global = &self.descriptors[slot];
                return Err(SchemaError::GlobalCollision {
                    name: global.name,
                    id,
                });
            }
        }
        Ok(())
    }

    /// Legacy commands share the top-level byte space with structured trees,
    /// so their IDs must not appear anywhere inside those trees.
    fn check_legacy(&self, roots: &[ElementDef]) -> Result<(), SchemaError> {
        let legacy: Vec<&ElementDef> = roots.iter().filter(|d| d.legacy).collect();
        if legacy.is_empty() {
            return Ok(());
        }
        for root in roots.iter().filter(|d| !d.legacy && !d.global) {
            let mut ids = HashSet::new();
            collect_ids(root.children, &mut ids);
            for cmd in &legacy {
                if ids.contains(&cmd.id) {
                    return Err(SchemaError::LegacyCollision {
                        legacy: cmd.name,
                        other: root.name,
                        id: cmd.id,
                    });
                }
            }
        }
        Ok(())
    }

    fn scope_name(&self, scope: Scope) -> String {
        match scope.and_then(|slot| self.descriptors.get(slot)) {
            Some(desc) => desc.name.to_string(),
            None if scope.is_some() => "unknown element".to_string(),
            None => "root".to_string(),
        }
    }

    fn scope_of(parent: Option<&ElementDescriptor>) -> Scope {
        parent.map(|d| d.slot)
    }

    /// Resolve `id` under `parent` (`None` for the document root), falling back
    /// to global elements.
    pub fn resolve(
        &self,
        parent: Option<&ElementDescriptor>,
        id: u32,
    ) -> Result<&ElementDescriptor, CodecError> {
        self.scoped
            .get(&(Self::scope_of(parent), id))
            .or_else(|| self.globals.get(&id))
            .map(|&slot| &self.descriptors[slot])
            .ok_or_else(|| CodecError::UnknownElement {
                id,
                parent: self.scope_name(Self::scope_of(parent)),
            })
    }

    /// Whether `id` names a non-global child of `parent`.
    pub fn is_scoped_child(&self, parent: Option<&ElementDescriptor>, id: u32) -> bool {
        self.scoped.contains_key(&(Self::scope_of(parent), id))
    }

    /// Find a descriptor by name under `parent`, falling back to globals.
    pub fn lookup(
        &self,
        parent: Option<&ElementDescriptor>,
        name: &str,
    ) -> Result<&ElementDescriptor, CodecError> {
        let scope = Self::scope_of(parent);
        self.names
            .get(&scope)
            .and_then(|n| n.get(name))
            .copied()
            .or_else(|| {
                self.globals
                    .values()
                    .copied()
                    .find(|&slot| self.descriptors[slot].name == name)
            })
            .map(|slot| &self.descriptors[slot])
            .ok_or_else(|| CodecError::UnknownName {
                name: name.to_string(),
                parent: self.scope_name(scope),
            })
    }

    /// Descriptors declared directly under `parent`, in schema order.
    pub fn children(
        &self,
        parent: Option<&ElementDescriptor>,
    ) -> impl Iterator<Item = &ElementDescriptor> {
        self.children
            .get(&Self::scope_of(parent))
            .into_iter()
            .flatten()
            .map(|&slot| &self.descriptors[slot])
    }

    /// Shared descriptor for elements no schema entry describes.
    pub fn unknown(&self) -> &ElementDescriptor {
        &self.unknown
    }

    pub fn doc_type(&self) -> &'static str {
        self.doc_type
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn read_version(&self) -> u64 {
        self.read_version
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn collect_ids(defs: &[ElementDef], ids: &mut HashSet<u32>) {
    for def in defs {
        ids.insert(def.id);
        collect_ids(def.children, ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CRC32_ID, VOID_ID};

    const LEAVES: &[ElementDef] = &[
        ElementDef::uint("Count", 0x4101).mandatory(),
        ElementDef::unicode("Label", 0x4102),
    ];

    fn schema(elements: &'static [ElementDef]) -> SchemaDef {
        SchemaDef {
            doc_type: "test",
            version: 1,
            read_version: 1,
            elements,
        }
    }

    #[test]
    fn test_builtin_registries_load() {
        let cmd = Registry::command().unwrap();
        assert_eq!(cmd.doc_type(), "mide.ss.cmd");
        let pkg = Registry::package().unwrap();
        assert_eq!(pkg.doc_type(), "mide.ss.fwpkg");
        assert!(!cmd.is_empty());
    }

    #[test]
    fn test_resolve_scoped_then_global() {
        const ELEMENTS: &[ElementDef] = &[
            ElementDef::binary("Void", VOID_ID).global(),
            ElementDef::master("Root", 0x4100, LEAVES),
        ];
        let reg = Registry::load(&schema(ELEMENTS)).unwrap();
        let root = reg.resolve(None, 0x4100).unwrap();
        assert_eq!(reg.resolve(Some(root), 0x4101).unwrap().name, "Count");
        assert_eq!(reg.resolve(Some(root), VOID_ID).unwrap().name, "Void");
        assert!(matches!(
            reg.resolve(Some(root), 0x4199),
            Err(CodecError::UnknownElement { id: 0x4199, .. })
        ));
        // Children are scoped: Count is not legal at the root.
        assert!(reg.resolve(None, 0x4101).is_err());
        assert_eq!(reg.lookup(Some(root), "Label").unwrap().id, 0x4102);
        assert_eq!(reg.children(Some(root)).count(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        const DUP: &[ElementDef] = &[
            ElementDef::uint("A", 0x4101),
            ElementDef::uint("B", 0x4101),
        ];
        const ELEMENTS: &[ElementDef] = &[ElementDef::master("Root", 0x4100, DUP)];
        assert!(matches!(
            Registry::load(&schema(ELEMENTS)),
            Err(SchemaError::DuplicateId { id: 0x4101, .. })
        ));
    }

    #[test]
    fn test_repeated_single_definition_rejected() {
        const DUP: &[ElementDef] = &[
            ElementDef::uint("A", 0x4101),
            ElementDef::uint("A", 0x4102),
        ];
        const ELEMENTS: &[ElementDef] = &[ElementDef::master("Root", 0x4100, DUP)];
        assert!(matches!(
            Registry::load(&schema(ELEMENTS)),
            Err(SchemaError::RepeatedDefinition { name: "A", .. })
        ));
    }

    #[test]
    fn test_malformed_fields_rejected() {
        const BAD_ID: &[ElementDef] = &[ElementDef::uint("Bad", 0x7F)];
        assert!(matches!(
            Registry::load(&schema(BAD_ID)),
            Err(SchemaError::MalformedId { id: 0x7F, .. })
        ));
        const BAD_WIDTH: &[ElementDef] = &[ElementDef::string("Bad", 0x4101).width(4)];
        assert!(matches!(
            Registry::load(&schema(BAD_WIDTH)),
            Err(SchemaError::MalformedWidth { width: 4, .. })
        ));
    }

    #[test]
    fn test_global_collision_rejected() {
        const INNER: &[ElementDef] = &[ElementDef::binary("NotCrc", CRC32_ID)];
        const ELEMENTS: &[ElementDef] = &[
            ElementDef::binary("CRC-32", CRC32_ID).global(),
            ElementDef::master("Root", 0x4100, INNER),
        ];
        assert!(matches!(
            Registry::load(&schema(ELEMENTS)),
            Err(SchemaError::GlobalCollision { id: CRC32_ID, .. })
        ));
    }

    #[test]
    fn test_legacy_collision_rejected() {
        const INNER: &[ElementDef] = &[ElementDef::master("Sneaky", 0x7274, &[])];
        const ELEMENTS: &[ElementDef] = &[
            ElementDef::legacy("Reset", *b"rt", &[]),
            ElementDef::master("EBMLCommand", 0x80, INNER),
        ];
        assert!(matches!(
            Registry::load(&schema(ELEMENTS)),
            Err(SchemaError::LegacyCollision { id: 0x7274, .. })
        ));
    }
}
