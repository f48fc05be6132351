//! Element schemas and the registries built from them.
//!
//! Schemas are constant tables. Each is validated and loaded once, on first
//! use, into a process-wide read-only [`Registry`].

pub mod command;
pub mod descriptor;
pub mod header;
pub mod package;
pub mod registry;

use std::sync::LazyLock;

pub use descriptor::{DefaultValue, ElementDef, ElementDescriptor, ElementType, SchemaDef};
pub use header::{CRC32_ID, EBML_ID, EbmlHeader, VOID_ID};
pub use registry::{Registry, SchemaError};

static COMMAND: LazyLock<Result<Registry, SchemaError>> =
    LazyLock::new(|| Registry::load(&command::COMMAND_SCHEMA));

static PACKAGE: LazyLock<Result<Registry, SchemaError>> =
    LazyLock::new(|| Registry::load(&package::PACKAGE_SCHEMA));

impl Registry {
    /// Registry for `mide.ss.cmd`.
    pub fn command() -> Result<&'static Registry, SchemaError> {
        COMMAND.as_ref().map_err(Clone::clone)
    }

    /// Registry for `mide.ss.fwpkg`.
    pub fn package() -> Result<&'static Registry, SchemaError> {
        PACKAGE.as_ref().map_err(Clone::clone)
    }
}
