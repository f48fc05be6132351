//! Transport layer module.

pub mod file;
pub mod mock;
pub mod traits;

pub use file::FileTransport;
pub use mock::MockTransport;
pub use traits::{DeviceTransport, TransportError};
