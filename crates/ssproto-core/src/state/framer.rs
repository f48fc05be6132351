//! Command/response framer.
//!
//! Turns [`Command`]s into wire bytes and device responses into
//! [`ResponseEnvelope`]s, tracking `ResponseIdx` and `CMDQueueDepth` across
//! a device session. The framer does no I/O; the session drives it.

use thiserror::Error;
use tracing::{debug, warn};

use super::machine::{FramerContext, FramerState, ResponseDisposition, TransactionHandle, classify};
use crate::ebml::{CodecError, DecodeOptions, DecodeReport, ElementNode, decode_element, encode};
use crate::protocol::{Command, DeviceResponse, QUEUE_FULL};
use crate::schema::Registry;

#[derive(Error, Debug)]
pub enum FramerError {
    #[error("{outstanding} transaction(s) already in flight")]
    Busy { outstanding: usize },
    #[error("Device command queue is full")]
    Backpressure,
    #[error("Expected EBMLResponse, got {0}")]
    NotAResponse(String),
    #[error("Response is missing {0}")]
    MissingField(&'static str),
    #[error("ResponseIdx went from {previous} to {received}")]
    OutOfOrder { previous: u64, received: u64 },
    #[error("No transaction in flight")]
    NoTransaction,
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Framer limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerOptions {
    pub max_outstanding: usize,
    /// Counter range of `ResponseIdx`; `None` never wraps.
    pub response_idx_modulus: Option<u64>,
    pub decode: DecodeOptions,
}

impl Default for FramerOptions {
    fn default() -> Self {
        Self {
            max_outstanding: 1,
            response_idx_modulus: None,
            decode: DecodeOptions::default(),
        }
    }
}

/// A decoded response and what it means for the session.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub tree: ElementNode<'static>,
    pub response: DeviceResponse,
    pub report: DecodeReport,
    pub disposition: ResponseDisposition,
    /// The transaction this response completed, if any.
    pub transaction: Option<TransactionHandle>,
}

pub struct Framer {
    registry: &'static Registry,
    options: FramerOptions,
    ctx: FramerContext,
}

impl Framer {
    pub fn new(registry: &'static Registry, options: FramerOptions) -> Self {
        Self {
            registry,
            options,
            ctx: FramerContext::new(),
        }
    }

    pub fn state(&self) -> FramerState {
        self.ctx.state
    }

    pub fn options(&self) -> &FramerOptions {
        &self.options
    }

    pub fn outstanding(&self) -> usize {
        self.ctx.outstanding.len()
    }

    pub fn last_response_idx(&self) -> Option<u64> {
        self.ctx.last_response_idx
    }

    pub fn last_queue_depth(&self) -> Option<u64> {
        self.ctx.last_queue_depth
    }

    /// Number of device session resets observed.
    pub fn device_session(&self) -> u64 {
        self.ctx.device_session
    }

    /// Whether the last response reported a full command queue.
    pub fn is_backpressured(&self) -> bool {
        self.ctx.last_queue_depth == Some(QUEUE_FULL)
    }

    /// Encode `command` and open a transaction for it.
    ///
    /// Legacy commands get a handle but never occupy a response slot.
    pub fn send_command(&mut self, command: &Command) -> Result<(TransactionHandle, Vec<u8>), FramerError> {
        let expects_response = command.expects_response();
        if expects_response && self.ctx.outstanding.len() >= self.options.max_outstanding {
            return Err(FramerError::Busy {
                outstanding: self.ctx.outstanding.len(),
            });
        }
        if self.is_backpressured() {
            return Err(FramerError::Backpressure);
        }

        let node = command.to_node(self.registry)?;
        let bytes = encode(&node, self.registry)?;
        let handle = self.ctx.next_handle(command.name(), expects_response);
        debug!(transaction = %handle, len = bytes.len(), "Command encoded");

        if expects_response {
            self.ctx.outstanding.push_back(handle.clone());
            self.ctx.goto_state(FramerState::AwaitingResponse);
        }
        Ok((handle, bytes))
    }

    /// Decode the contents of the response channel.
    ///
    /// A fresh response completes the oldest outstanding transaction; a stale
    /// one only refreshes the queue depth.
    pub fn receive_response(&mut self, bytes: &[u8]) -> Result<ResponseEnvelope, FramerError> {
        let decoded = decode_element(bytes, self.registry, None, self.options.decode)?;
        if decoded.consumed < bytes.len() {
            debug!(
                trailing = bytes.len() - decoded.consumed,
                "Ignoring bytes after response"
            );
        }
        let report = decoded.report;
        let tree = decoded
            .nodes
            .into_iter()
            .next()
            .ok_or_else(|| FramerError::NotAResponse("nothing".into()))?;
        if tree.name() != "EBMLResponse" {
            return Err(FramerError::NotAResponse(tree.name().to_string()));
        }
        for field in ["ResponseIdx", "CMDQueueDepth"] {
            if tree.child(field).is_none() {
                return Err(FramerError::MissingField(field));
            }
        }
        let response = DeviceResponse::from_node(&tree)?;
        let received = response.response_idx;

        let disposition = classify(
            self.ctx.last_response_idx,
            received,
            self.options.response_idx_modulus,
        )
        .ok_or(FramerError::OutOfOrder {
            previous: self.ctx.last_response_idx.unwrap_or_default(),
            received,
        })?;

        match disposition {
            ResponseDisposition::SessionReset => {
                self.ctx.device_session += 1;
                warn!(
                    previous = ?self.ctx.last_response_idx,
                    session = self.ctx.device_session,
                    "Device session reset"
                );
            }
            ResponseDisposition::Wrapped => debug!(received, "ResponseIdx wrapped"),
            _ => {}
        }

        self.ctx.last_response_idx = Some(received);
        self.ctx.last_queue_depth = Some(response.queue_depth);

        let transaction = if disposition.is_fresh() {
            self.ctx.complete_oldest()
        } else {
            None
        };
        if let Some(handle) = &transaction {
            debug!(transaction = %handle, received, "Transaction complete");
        }

        Ok(ResponseEnvelope {
            tree,
            response,
            report,
            disposition,
            transaction,
        })
    }

    /// Fail the oldest in-flight transaction after a transport failure.
    ///
    /// The framer stays usable; only that transaction is lost.
    pub fn abort(&mut self, reason: &str) -> Result<TransactionHandle, FramerError> {
        let handle = self.ctx.complete_oldest().ok_or(FramerError::NoTransaction)?;
        warn!(transaction = %handle, reason, "Transaction aborted");
        Ok(handle)
    }

    /// Forget everything learned about the device session.
    pub fn reset(&mut self) {
        self.ctx = FramerContext::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::Value;
    use crate::protocol::LegacyCommand;

    fn framer() -> Framer {
        Framer::new(Registry::command().unwrap(), FramerOptions::default())
    }

    fn response_bytes(idx: u64, depth: u64) -> Vec<u8> {
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let node = ElementNode::master(
            resp,
            vec![
                ElementNode::new(reg.lookup(Some(resp), "ResponseIdx").unwrap(), Value::UInteger(idx)),
                ElementNode::new(reg.lookup(Some(resp), "CMDQueueDepth").unwrap(), Value::UInteger(depth)),
            ],
        );
        encode(&node, reg).unwrap()
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut framer = framer();
        assert_eq!(framer.state(), FramerState::Idle);

        let (handle, bytes) = framer.send_command(&Command::GetBattery).unwrap();
        assert!(handle.expects_response);
        assert_eq!(bytes[0], 0x80);
        assert_eq!(framer.state(), FramerState::AwaitingResponse);

        let env = framer.receive_response(&response_bytes(4, 2)).unwrap();
        assert_eq!(env.disposition, ResponseDisposition::First);
        assert_eq!(env.transaction, Some(handle));
        assert_eq!(framer.state(), FramerState::Idle);
    }

    #[test]
    fn test_busy_and_legacy() {
        let mut framer = framer();
        framer.send_command(&Command::GetClock).unwrap();
        assert!(matches!(
            framer.send_command(&Command::GetBattery),
            Err(FramerError::Busy { outstanding: 1 })
        ));
        // Fire-and-forget commands do not need a response slot.
        let (handle, bytes) = framer
            .send_command(&Command::Legacy(LegacyCommand::Reset))
            .unwrap();
        assert!(!handle.expects_response);
        assert_eq!(bytes, b"rt");
        assert_eq!(framer.outstanding(), 1);
    }

    #[test]
    fn test_backpressure() {
        let mut framer = framer();
        framer.receive_response(&response_bytes(1, 0)).unwrap();
        assert!(matches!(
            framer.send_command(&Command::GetClock),
            Err(FramerError::Backpressure)
        ));
        // Depth observed above zero releases the queue.
        framer.receive_response(&response_bytes(1, 1)).unwrap();
        assert!(framer.send_command(&Command::GetClock).is_ok());
    }

    #[test]
    fn test_stale_response_keeps_transaction_open() {
        let mut framer = framer();
        framer.receive_response(&response_bytes(7, 1)).unwrap();
        framer.send_command(&Command::QueryWiFi).unwrap();
        let env = framer.receive_response(&response_bytes(7, 1)).unwrap();
        assert_eq!(env.disposition, ResponseDisposition::Stale);
        assert!(env.transaction.is_none());
        assert_eq!(framer.state(), FramerState::AwaitingResponse);

        let env = framer.receive_response(&response_bytes(8, 1)).unwrap();
        assert_eq!(env.disposition, ResponseDisposition::New);
        assert!(env.transaction.is_some());
    }

    #[test]
    fn test_session_reset_is_not_an_error() {
        let mut framer = framer();
        let mut dispositions = Vec::new();
        for idx in [118, 119, 0, 1] {
            let env = framer.receive_response(&response_bytes(idx, 1)).unwrap();
            dispositions.push(env.disposition);
        }
        assert_eq!(dispositions[2], ResponseDisposition::SessionReset);
        assert_eq!(dispositions[3], ResponseDisposition::New);
        assert_eq!(framer.device_session(), 1);

        assert!(matches!(
            framer.receive_response(&response_bytes(5, 1)),
            Ok(ResponseEnvelope {
                disposition: ResponseDisposition::New,
                ..
            })
        ));
        assert!(matches!(
            framer.receive_response(&response_bytes(3, 1)),
            Err(FramerError::OutOfOrder {
                previous: 5,
                received: 3
            })
        ));
    }

    #[test]
    fn test_not_a_response() {
        let mut framer = framer();
        assert!(matches!(
            framer.receive_response(b"rt"),
            Err(FramerError::NotAResponse(_))
        ));
        // ResponseIdx alone is decodable but incomplete.
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let idx = reg.lookup(Some(resp), "ResponseIdx").unwrap();
        // EBMLResponse { ResponseIdx = 1 }, size 4
        let mut bytes = vec![0x86, 0x84];
        bytes.extend(crate::ebml::vint::encode_id(idx.id));
        bytes.extend([0x81, 0x01]);
        assert!(matches!(
            framer.receive_response(&bytes),
            Err(FramerError::MissingField("CMDQueueDepth"))
        ));
    }

    #[test]
    fn test_abort() {
        let mut framer = framer();
        assert!(matches!(framer.abort("gone"), Err(FramerError::NoTransaction)));
        let (handle, _) = framer.send_command(&Command::NetworkStatus).unwrap();
        assert_eq!(framer.abort("device unplugged").unwrap(), handle);
        assert_eq!(framer.state(), FramerState::Idle);
        assert!(framer.send_command(&Command::NetworkStatus).is_ok());
    }
}
