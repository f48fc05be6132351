//! Mandatory and multiplicity checks shared by decode and encode.

use super::error::Violation;
use super::node::ElementNode;
use crate::schema::{ElementDescriptor, Registry};

/// Check the children of `parent` against its schema entries.
///
/// Mandatory children with a schema default may be omitted.
pub(crate) fn check_children(
    registry: &Registry,
    parent: &ElementDescriptor,
    children: &[ElementNode<'_>],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for expected in registry.children(Some(parent)) {
        let count = children
            .iter()
            .filter(|c| !c.is_opaque() && c.id == expected.id)
            .count();
        if count == 0 && expected.mandatory && expected.default.is_none() {
            violations.push(Violation::MissingMandatory {
                parent: parent.name.to_string(),
                child: expected.name.to_string(),
            });
        }
        if count > 1 && !expected.multiple {
            violations.push(Violation::Repeated {
                parent: parent.name.to_string(),
                child: expected.name.to_string(),
                count,
            });
        }
    }
    violations
}

/// Check that every non-opaque child is declared under `parent`.
pub(crate) fn check_legality(
    registry: &Registry,
    parent: &ElementDescriptor,
    children: &[ElementNode<'_>],
) -> Vec<Violation> {
    children
        .iter()
        .filter(|c| !c.is_opaque())
        .filter(|c| {
            registry
                .resolve(Some(parent), c.id)
                .map_or(true, |d| d.slot != c.descriptor.slot)
        })
        .map(|c| Violation::IllegalChild {
            parent: parent.name.to_string(),
            child: c.name().to_string(),
        })
        .collect()
}
