//! Device session - drives the framer over a transport.
//!
//! One command at a time: wait for room in the device queue, write the
//! command, then poll the response channel until a fresh `ResponseIdx` shows
//! up or the deadline passes.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::ebml::{CodecError, CrcPolicy, DecodeOptions};
use crate::events::{LogLevel, PacketDirection, SessionEvent, SessionObserver, SessionPhase, TracingObserver};
use crate::payload::{PackageError, UpdatePackageHeader, read_package};
use crate::protocol::{
    AccessPoint, Command, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS, DeviceResponse,
    LegacyCommand, NetworkStatus, WiFiCredentials, WiFiQueryResult,
};
use crate::schema::command::CLOCK_LEN;
use crate::schema::{Registry, SchemaError};
use crate::state::{Framer, FramerError, FramerOptions, ResponseDisposition, ResponseEnvelope};
use crate::transport::{DeviceTransport, TransportError};

/// `QueryWiFi` answers slowly; its poll interval is stretched by this factor.
const QUERY_WIFI_INTERVAL_FACTOR: u32 = 5;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Timed out after {timeout_ms}ms {waiting_for}")]
    Timeout {
        timeout_ms: u64,
        waiting_for: &'static str,
    },
    #[error("Wait for response cancelled")]
    Cancelled,
    #[error("Device sent no {0}")]
    MissingResponse(&'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Framer(#[from] FramerError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Package(#[from] PackageError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Configuration for a device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for one command, queue wait included.
    pub timeout_ms: u64,
    /// Time between response polls.
    pub poll_interval_ms: u64,
    /// Wait for room in the device queue before writing.
    pub wait_for_queue: bool,
    pub max_outstanding: usize,
    /// Counter range of `ResponseIdx`, if the firmware wraps it.
    pub response_idx_modulus: Option<u64>,
    /// Fail responses whose CRC-32 does not match.
    pub strict_crc: bool,
    pub max_depth: usize,
    pub unknown_size_lookahead: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let decode = DecodeOptions::default();
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_for_queue: true,
            max_outstanding: 1,
            response_idx_modulus: None,
            strict_crc: false,
            max_depth: decode.max_depth,
            unknown_size_lookahead: decode.unknown_size_lookahead,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn framer_options(&self) -> FramerOptions {
        FramerOptions {
            max_outstanding: self.max_outstanding.max(1),
            response_idx_modulus: self.response_idx_modulus,
            decode: DecodeOptions {
                max_depth: self.max_depth,
                unknown_size_lookahead: self.unknown_size_lookahead,
                crc_policy: if self.strict_crc {
                    CrcPolicy::Reject
                } else {
                    CrcPolicy::Report
                },
                strict: false,
            },
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A session with one recorder.
pub struct DeviceSession<T: DeviceTransport, O: SessionObserver = TracingObserver> {
    transport: T,
    config: SessionConfig,
    framer: Framer,
    observer: Arc<O>,
    phase: SessionPhase,
}

impl<T: DeviceTransport> DeviceSession<T, TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self, SessionError> {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }
}

impl<T: DeviceTransport, O: SessionObserver> DeviceSession<T, O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: T,
        config: SessionConfig,
        observer: Arc<O>,
    ) -> Result<Self, SessionError> {
        let framer = Framer::new(Registry::command()?, config.framer_options());
        Ok(Self {
            transport,
            config,
            framer,
            observer,
            phase: SessionPhase::Idle,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    fn set_phase(&mut self, to: SessionPhase) {
        if self.phase != to {
            self.observer.on_event(&SessionEvent::PhaseChanged {
                from: self.phase,
                to,
            });
            self.phase = to;
        }
    }

    /// Send `command`, returning the device's answer.
    ///
    /// Legacy commands are written and forgotten, giving `Ok(None)`.
    pub fn send_command(&mut self, command: &Command) -> Result<Option<ResponseEnvelope>, SessionError> {
        let interval = self.config.interval();
        self.send_command_with(command, interval, || false)
    }

    /// Send `command`, polling every `interval`.
    ///
    /// `cancel` is checked before each poll; returning `true` abandons the
    /// transaction with [`SessionError::Cancelled`].
    #[instrument(level = "info", skip(self, interval, cancel), fields(command = command.name()))]
    pub fn send_command_with(
        &mut self,
        command: &Command,
        interval: Duration,
        mut cancel: impl FnMut() -> bool,
    ) -> Result<Option<ResponseEnvelope>, SessionError> {
        let result = self.transact(command, interval, &mut cancel);
        if let Err(e) = &result {
            self.observer.on_event(&SessionEvent::Error {
                message: format!("{}: {e}", command.name()),
            });
        }
        self.set_phase(SessionPhase::Idle);
        result
    }

    fn transact(
        &mut self,
        command: &Command,
        interval: Duration,
        cancel: &mut impl FnMut() -> bool,
    ) -> Result<Option<ResponseEnvelope>, SessionError> {
        let deadline = Instant::now() + self.config.timeout();
        self.wait_for_queue(deadline, interval)?;
        if !self.write(command)? {
            return Ok(None);
        }
        self.await_response(deadline, interval, cancel).map(Some)
    }

    /// Poll the response channel until the device reports room in its queue.
    ///
    /// Also primes the framer with the current `ResponseIdx`, so an old
    /// response is not mistaken for the answer to the next command.
    fn wait_for_queue(&mut self, deadline: Instant, interval: Duration) -> Result<(), SessionError> {
        self.set_phase(SessionPhase::WaitingForQueue);
        let mut waited = false;
        loop {
            self.poll()?;
            if !self.config.wait_for_queue || !self.framer.is_backpressured() {
                return Ok(());
            }
            if Instant::now() > deadline {
                return Err(SessionError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                    waiting_for: "for the device queue to drain",
                });
            }
            debug!(depth = ?self.framer.last_queue_depth(), "Device queue full, waiting");
            if !waited {
                self.observer.on_event(&SessionEvent::Log {
                    level: LogLevel::Info,
                    message: "Device queue full, waiting for room".to_string(),
                });
                waited = true;
            }
            thread::sleep(interval);
        }
    }

    fn write(&mut self, command: &Command) -> Result<bool, SessionError> {
        let (handle, bytes) = self.framer.send_command(command)?;
        if let Err(e) = self.transport.write_command(&bytes) {
            if handle.expects_response {
                self.abort(&e.to_string());
            }
            return Err(e.into());
        }
        self.observer.on_event(&SessionEvent::Packet {
            direction: PacketDirection::Tx,
            length: bytes.len(),
            data: Some(bytes.iter().take(32).copied().collect()),
        });
        self.observer.on_event(&SessionEvent::CommandSent {
            command: handle.command.to_string(),
            transaction: handle.id,
        });
        Ok(handle.expects_response)
    }

    fn await_response(
        &mut self,
        deadline: Instant,
        interval: Duration,
        cancel: &mut impl FnMut() -> bool,
    ) -> Result<ResponseEnvelope, SessionError> {
        self.set_phase(SessionPhase::AwaitingResponse);
        while Instant::now() <= deadline {
            if cancel() {
                self.abort("cancelled");
                return Err(SessionError::Cancelled);
            }
            thread::sleep(interval);
            match self.poll() {
                Ok(Some(envelope)) if envelope.disposition.is_fresh() => {
                    info!(
                        response_idx = envelope.response.response_idx,
                        queue_depth = envelope.response.queue_depth,
                        "Response received"
                    );
                    return Ok(envelope);
                }
                Ok(_) => {}
                Err(e) => {
                    self.abort(&e.to_string());
                    return Err(e);
                }
            }
        }
        self.abort("timeout");
        Err(SessionError::Timeout {
            timeout_ms: self.config.timeout_ms,
            waiting_for: "for a command response",
        })
    }

    /// Read and frame the response channel once.
    ///
    /// A response cut short by an in-progress write is treated as absent.
    fn poll(&mut self) -> Result<Option<ResponseEnvelope>, SessionError> {
        let Some(bytes) = self.transport.read_response()? else {
            return Ok(None);
        };
        self.observer.on_event(&SessionEvent::Packet {
            direction: PacketDirection::Rx,
            length: bytes.len(),
            data: Some(bytes.iter().take(32).copied().collect()),
        });
        let previous = self.framer.last_response_idx();
        let envelope = match self.framer.receive_response(&bytes) {
            Ok(envelope) => envelope,
            Err(FramerError::Codec(e)) if e.is_truncation() => {
                debug!(len = bytes.len(), "Response incomplete, polling again");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if !envelope.report.is_valid() {
            warn!(report = ?envelope.report, "Response has structure problems");
        }
        if envelope.disposition == ResponseDisposition::SessionReset {
            self.observer.on_event(&SessionEvent::DeviceSessionReset {
                previous,
                session: self.framer.device_session(),
            });
        }
        self.observer.on_event(&SessionEvent::ResponseReceived {
            response_idx: envelope.response.response_idx,
            queue_depth: envelope.response.queue_depth,
            disposition: envelope.disposition,
        });
        Ok(Some(envelope))
    }

    fn abort(&mut self, reason: &str) {
        if let Ok(handle) = self.framer.abort(reason) {
            self.observer.on_event(&SessionEvent::TransactionAborted {
                transaction: handle.id,
                reason: reason.to_string(),
            });
        }
    }

    fn expect_response(&mut self, command: &Command) -> Result<DeviceResponse, SessionError> {
        let envelope = self
            .send_command(command)?
            .ok_or(SessionError::MissingResponse("response"))?;
        Ok(envelope.response)
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Start a recording.
    #[instrument(skip(self))]
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        self.send_command(&Command::Legacy(LegacyCommand::RecStart))?;
        Ok(())
    }

    /// Reset the device.
    #[instrument(skip(self))]
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.send_command(&Command::Legacy(LegacyCommand::Reset))?;
        Ok(())
    }

    /// Scan for access points.
    #[instrument(skip(self))]
    pub fn scan_wifi(&mut self) -> Result<Vec<AccessPoint>, SessionError> {
        let response = self.expect_response(&Command::WiFiScan)?;
        Ok(response.access_points().to_vec())
    }

    /// Store WiFi credentials on the device.
    #[instrument(skip(self, networks), fields(count = networks.len()))]
    pub fn set_wifi(&mut self, networks: Vec<WiFiCredentials>) -> Result<(), SessionError> {
        self.expect_response(&Command::SetWiFi(networks))?;
        Ok(())
    }

    /// Ask for the state of the WiFi connection.
    #[instrument(skip(self))]
    pub fn query_wifi(&mut self) -> Result<WiFiQueryResult, SessionError> {
        let interval = self.config.interval() * QUERY_WIFI_INTERVAL_FACTOR;
        let envelope = self
            .send_command_with(&Command::QueryWiFi, interval, || false)?
            .ok_or(SessionError::MissingResponse("response"))?;
        envelope
            .response
            .wifi_query
            .ok_or(SessionError::MissingResponse("QueryWiFiResponse"))
    }

    #[instrument(skip(self))]
    pub fn network_status(&mut self) -> Result<NetworkStatus, SessionError> {
        self.expect_response(&Command::NetworkStatus)?
            .network_status
            .ok_or(SessionError::MissingResponse("NetworkStatusResponse"))
    }

    /// Send an echo payload; returns what came back.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn ping(&mut self, payload: &[u8]) -> Result<Vec<u8>, SessionError> {
        self.expect_response(&Command::SendPing(payload.to_vec()))?
            .ping_reply
            .ok_or(SessionError::MissingResponse("PingReply"))
    }

    #[instrument(skip(self))]
    pub fn get_clock(&mut self) -> Result<Vec<u8>, SessionError> {
        self.expect_response(&Command::GetClock)?
            .clock_time
            .ok_or(SessionError::MissingResponse("ClockTime"))
    }

    #[instrument(skip(self, time))]
    pub fn set_clock(&mut self, time: [u8; CLOCK_LEN]) -> Result<(), SessionError> {
        self.expect_response(&Command::SetClock(time))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn battery(&mut self) -> Result<u64, SessionError> {
        self.expect_response(&Command::GetBattery)?
            .battery_state
            .ok_or(SessionError::MissingResponse("BatteryState"))
    }

    /// Ask the device to apply a package already on its filesystem.
    #[instrument(skip(self))]
    pub fn apply_package(&mut self, path: &str, reboot_after: bool) -> Result<(), SessionError> {
        self.expect_response(&Command::ApplyPackage {
            path: path.to_string(),
            reboot_after,
        })?;
        Ok(())
    }

    /// Check an update package, stage it on the device and start the update.
    ///
    /// Encrypted packages go through the secure updater.
    #[instrument(skip(self, package), fields(len = package.len()))]
    pub fn stage_update_package(&mut self, package: &[u8]) -> Result<UpdatePackageHeader, SessionError> {
        let (header, _) = read_package(package)?;
        info!(header = %header, "Staging update package");
        self.transport.stage_update_package(package)?;
        self.observer.on_event(&SessionEvent::PackageStaged {
            length: package.len(),
        });
        let trigger = if header.is_encrypted() {
            LegacyCommand::SecureUpdateAll
        } else {
            LegacyCommand::FlashPackage
        };
        self.send_command(&Command::Legacy(trigger))?;
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebml::{ElementNode, Value, encode};
    use crate::events::NullObserver;
    use crate::payload::write_package;
    use crate::protocol::{QUEUE_FULL, WiFiConnectionStatus};
    use crate::transport::MockTransport;

    fn config() -> SessionConfig {
        SessionConfig {
            timeout_ms: 200,
            poll_interval_ms: 1,
            ..SessionConfig::default()
        }
    }

    fn session(mock: &MockTransport) -> DeviceSession<MockTransport, NullObserver> {
        DeviceSession::with_observer(mock.clone(), config(), Arc::new(NullObserver)).unwrap()
    }

    fn response(idx: u64, depth: u64, extra: impl FnOnce(&'static Registry) -> Vec<ElementNode<'static>>) -> Vec<u8> {
        let reg = Registry::command().unwrap();
        let resp = reg.lookup(None, "EBMLResponse").unwrap();
        let mut children = vec![
            ElementNode::new(reg.lookup(Some(resp), "ResponseIdx").unwrap(), Value::UInteger(idx)),
            ElementNode::new(reg.lookup(Some(resp), "CMDQueueDepth").unwrap(), Value::UInteger(depth)),
        ];
        children.extend(extra(reg));
        encode(&ElementNode::master(resp, children), reg).unwrap()
    }

    fn plain(idx: u64, depth: u64) -> Vec<u8> {
        response(idx, depth, |_| Vec::new())
    }

    #[test]
    fn test_config_toml_round_trip() {
        let dir = std::env::temp_dir().join(format!("ssproto-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.toml");

        let config = SessionConfig {
            response_idx_modulus: Some(256),
            strict_crc: true,
            ..SessionConfig::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(SessionConfig::load_from_file(&path).unwrap(), config);

        std::fs::write(&path, "timeout_ms = 500\n").unwrap();
        let partial = SessionConfig::load_from_file(&path).unwrap();
        assert_eq!(partial.timeout_ms, 500);
        assert_eq!(partial.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(partial.framer_options().decode.crc_policy, CrcPolicy::Report);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_reset_is_fire_and_forget() {
        let mock = MockTransport::new();
        let mut session = session(&mock);
        session.reset().unwrap();
        assert_eq!(mock.get_writes(), vec![b"rt".to_vec()]);
        assert_eq!(session.framer().outstanding(), 0);
    }

    #[test]
    fn test_old_response_is_not_the_answer() {
        let mock = MockTransport::new().with_reply_delay(3);
        mock.set_response(&plain(7, 2));
        mock.queue_reply(&response(8, 2, |reg| {
            let resp = reg.lookup(None, "EBMLResponse").unwrap();
            vec![ElementNode::new(reg.lookup(Some(resp), "BatteryState").unwrap(), Value::UInteger(87))]
        }));

        let mut session = session(&mock);
        assert_eq!(session.battery().unwrap(), 87);
        assert_eq!(session.framer().last_response_idx(), Some(8));
        assert_eq!(mock.get_writes().len(), 1);
    }

    #[test]
    fn test_query_wifi() {
        let mock = MockTransport::new();
        mock.set_response(&plain(4, 3));
        mock.queue_reply(&response(5, 3, |reg| {
            let resp = reg.lookup(None, "EBMLResponse").unwrap();
            let query = reg.lookup(Some(resp), "QueryWiFiResponse").unwrap();
            vec![ElementNode::master(
                query,
                vec![
                    ElementNode::new(reg.lookup(Some(query), "SSID").unwrap(), Value::Unicode("Lab5G".into())),
                    ElementNode::new(
                        reg.lookup(Some(query), "WiFiConnectionStatus").unwrap(),
                        Value::UInteger(2),
                    ),
                    ElementNode::new(reg.lookup(Some(query), "RSSI").unwrap(), Value::Integer(80)),
                ],
            )]
        }));

        let mut session = session(&mock);
        let result = session.query_wifi().unwrap();
        assert_eq!(result.ssid.as_deref(), Some("Lab5G"));
        assert_eq!(result.status, WiFiConnectionStatus::Connected);
        assert_eq!(result.rssi, Some(80));
        assert_eq!(session.framer().last_queue_depth(), Some(3));
    }

    #[test]
    fn test_device_session_reset_completes_command() {
        let mock = MockTransport::new();
        mock.set_response(&plain(119, 1));
        mock.queue_reply(&plain(0, 1));

        let mut session = session(&mock);
        session.expect_response(&Command::GetBattery).unwrap();
        assert_eq!(session.framer().device_session(), 1);
        assert_eq!(session.framer().last_response_idx(), Some(0));
    }

    #[test]
    fn test_timeout_aborts_transaction() {
        let mock = MockTransport::new();
        mock.set_response(&plain(3, 1));

        let mut session = session(&mock);
        let err = session.battery().unwrap_err();
        assert!(matches!(err, SessionError::Timeout { .. }));
        assert_eq!(session.framer().outstanding(), 0);

        // The session survives a lost transaction.
        mock.queue_reply(&plain(4, 1));
        session.send_command(&Command::GetClock).unwrap();
    }

    #[test]
    fn test_full_queue() {
        let mock = MockTransport::new();
        mock.set_response(&plain(3, QUEUE_FULL));

        let mut session = session(&mock);
        assert!(matches!(
            session.battery(),
            Err(SessionError::Timeout { waiting_for, .. }) if waiting_for.contains("queue")
        ));
        assert!(mock.get_writes().is_empty());

        let mut impatient = DeviceSession::with_observer(
            mock.clone(),
            SessionConfig {
                wait_for_queue: false,
                ..config()
            },
            Arc::new(NullObserver),
        )
        .unwrap();
        assert!(matches!(
            impatient.battery(),
            Err(SessionError::Framer(FramerError::Backpressure))
        ));
    }

    #[derive(Default)]
    struct Recorder(std::sync::Mutex<Vec<SessionEvent>>);

    impl SessionObserver for Recorder {
        fn on_event(&self, event: &SessionEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_failures_reach_observer() {
        let mock = MockTransport::new();
        mock.set_response(&plain(3, QUEUE_FULL));
        let recorder = Arc::new(Recorder::default());
        let mut session = DeviceSession::with_observer(mock.clone(), config(), recorder.clone()).unwrap();
        assert!(session.battery().is_err());

        let events = recorder.0.lock().unwrap();
        let logs: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Log { level, message } => Some((*level, message.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].0, LogLevel::Info);
        assert!(logs[0].1.contains("queue full"));
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::Error { message } if message.starts_with("GetBattery") && message.contains("queue")
        )));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::PhaseChanged { to: SessionPhase::Idle, .. })
        ));
    }

    #[test]
    fn test_cancel_reaches_observer() {
        let mock = MockTransport::new();
        let recorder = Arc::new(Recorder::default());
        let mut session = DeviceSession::with_observer(mock, config(), recorder.clone()).unwrap();
        session
            .send_command_with(&Command::GetBattery, Duration::from_millis(1), || true)
            .unwrap_err();

        let events = recorder.0.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::TransactionAborted { .. })));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
        assert!(!events.iter().any(|e| matches!(e, SessionEvent::Log { .. })));
    }

    #[test]
    fn test_cancel() {
        let mock = MockTransport::new();
        let mut session = session(&mock);
        let err = session
            .send_command_with(&Command::GetBattery, Duration::from_millis(1), || true)
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
        assert_eq!(session.framer().outstanding(), 0);
    }

    #[test]
    fn test_disconnect_aborts() {
        let mock = MockTransport::new();
        mock.disconnect();
        let mut session = session(&mock);
        assert!(matches!(
            session.battery(),
            Err(SessionError::Transport(TransportError::Disconnected))
        ));
        assert_eq!(session.framer().outstanding(), 0);
    }

    #[test]
    fn test_stage_update_package() {
        let header = UpdatePackageHeader {
            min_hw_rev: 3,
            fw_rev: 42,
            min_fw_rev: None,
            key_slot: crate::payload::UNENCRYPTED,
            payload_len: 8,
        };
        let package = write_package(&header, &[0, 0, 4, 0, 1, 2, 3, 4]).unwrap();

        let mock = MockTransport::new();
        let mut session = session(&mock);
        assert_eq!(session.stage_update_package(&package).unwrap(), header);
        assert_eq!(mock.get_staged(), vec![package]);
        assert_eq!(mock.get_writes(), vec![b"pk".to_vec()]);

        mock.clear_writes();
        let secure = UpdatePackageHeader { key_slot: 2, ..header };
        let package = write_package(&secure, &[0; 8]).unwrap();
        session.stage_update_package(&package).unwrap();
        assert_eq!(mock.get_writes(), vec![b"sa".to_vec()]);

        assert!(matches!(
            session.stage_update_package(b"junk"),
            Err(SessionError::Package(_))
        ));
    }
}
