//! SSProto-Core: EBML command protocol and update packages for enDAQ-style
//! data recorders.
//!
//! This crate implements the `mide.ss.cmd` command/response exchange used to
//! control a recorder through its file mailbox, and the `mide.ss.fwpkg`
//! firmware update package container.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **EBML**: Variable-length integers, element trees, CRC-32, encode/decode
//! - **Schema**: Element descriptors and the command/package registries
//! - **Protocol**: Typed commands, legacy two-byte commands, device responses
//! - **State**: Command/response framer and `ResponseIdx` tracking
//! - **Payload**: Update package reader/writer and payload segments
//! - **Transport**: Device mailbox abstraction (file, mock)
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level command orchestrator
//!
//! # Example
//!
//! ```no_run
//! use ssproto_core::session::{DeviceSession, SessionConfig};
//! use ssproto_core::transport::FileTransport;
//!
//! let transport = FileTransport::open("/media/W8").expect("no recorder");
//! let mut session = DeviceSession::new(transport, SessionConfig::default()).unwrap();
//! for ap in session.scan_wifi().expect("scan failed") {
//!     println!("{} ({} dBm)", ap.ssid, ap.rssi);
//! }
//! ```

pub mod ebml;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod schema;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use ebml::{CodecError, DecodeOptions, ElementNode, Value, decode, encode};
pub use events::{LogLevel, SessionEvent, SessionObserver, TracingObserver};
pub use payload::{PackageError, UpdatePackageHeader, read_package, write_package};
pub use protocol::{Command, DeviceResponse, LegacyCommand};
pub use schema::{Registry, SchemaError};
pub use session::{DeviceSession, SessionConfig, SessionError};
pub use state::{Framer, FramerError, ResponseEnvelope};
pub use transport::{DeviceTransport, FileTransport, MockTransport, TransportError};
