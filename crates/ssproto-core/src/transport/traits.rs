//! Device transport abstraction.
//!
//! Defines the `DeviceTransport` trait for the recorder's command mailbox,
//! allowing different implementations (file mailbox, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found at {0}")]
    NotFound(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract command channel to a recorder.
///
/// The device keeps its latest response in place until it answers the next
/// command, so `read_response` may return the same bytes many times.
pub trait DeviceTransport: Send + Sync {
    /// Deliver an encoded command to the device.
    fn write_command(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Current contents of the response channel; `None` if there is none yet.
    fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError>;

    /// Place an update package where the device's updater looks for it.
    fn stage_update_package(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Check if the device is still reachable.
    fn is_connected(&self) -> bool;

    /// Human-readable location of the device.
    fn describe(&self) -> String;
}
