//! Payload handling module.
//!
//! Provides the update package container and the segment layout of its payload.

pub mod package;
pub mod segment;

pub use package::{
    PackageError, PayloadDecryptor, UNENCRYPTED, UpdatePackageHeader, payload_segments, plaintext,
    read_package, write_package,
};
pub use segment::{Segment, parse_segments, write_segments};
