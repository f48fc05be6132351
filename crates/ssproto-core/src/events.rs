//! Event system for UI decoupling.
//!
//! Allows a CLI or other front end to follow a device session without tight
//! coupling to the core logic.

use std::fmt;

use crate::state::ResponseDisposition;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// What a session is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// Waiting for the device to report room in its command queue.
    WaitingForQueue,
    AwaitingResponse,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::WaitingForQueue => write!(f, "Waiting for Queue"),
            SessionPhase::AwaitingResponse => write!(f, "Awaiting Response"),
        }
    }
}

/// Events emitted by a device session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    CommandSent { command: String, transaction: u64 },
    ResponseReceived {
        response_idx: u64,
        queue_depth: u64,
        disposition: ResponseDisposition,
    },
    /// `ResponseIdx` fell to 0.
    DeviceSessionReset { previous: Option<u64>, session: u64 },
    TransactionAborted { transaction: u64, reason: String },
    PackageStaged { length: usize },
    /// Raw bytes moved over the transport.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    Log { level: LogLevel, message: String },
    Error { message: String },
}

/// Packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> Device
    Rx, // Device -> Host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SessionObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SessionEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SessionObserver for NullObserver {
    fn on_event(&self, _event: &SessionEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            SessionEvent::CommandSent {
                command,
                transaction,
            } => {
                tracing::info!(command = %command, transaction, "Command sent");
            }
            SessionEvent::ResponseReceived {
                response_idx,
                queue_depth,
                disposition,
            } => {
                tracing::debug!(
                    response_idx,
                    queue_depth,
                    disposition = %disposition,
                    "Response received"
                );
            }
            SessionEvent::DeviceSessionReset { previous, session } => {
                tracing::warn!(previous = ?previous, session, "Device session reset");
            }
            SessionEvent::TransactionAborted {
                transaction,
                reason,
            } => {
                tracing::warn!(transaction, reason = %reason, "Transaction aborted");
            }
            SessionEvent::PackageStaged { length } => {
                tracing::info!(length, "Update package staged");
            }
            SessionEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "Packet");
            }
            SessionEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            SessionEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
        }
    }
}
