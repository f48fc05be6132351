//! Mock device transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{DeviceTransport, TransportError};

#[derive(Default)]
struct MockState {
    /// What the response channel holds right now.
    current: Option<Vec<u8>>,
    /// Replies handed out one per written command.
    replies: VecDeque<Vec<u8>>,
    /// Reply to the last command and the reads left before it shows up.
    pending: Option<(Vec<u8>, usize)>,
    writes: Vec<Vec<u8>>,
    staged: Vec<Vec<u8>>,
    connected: bool,
}

/// Mock transport for unit testing session logic.
///
/// Models a device whose response file changes only after a command is
/// written, optionally a few polls later.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    reply_delay: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
            reply_delay: 0,
        }
    }

    /// Number of polls that still see the old response after each write.
    pub fn with_reply_delay(mut self, reads: usize) -> Self {
        self.reply_delay = reads;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the response channel contents immediately.
    pub fn set_response(&self, bytes: &[u8]) {
        self.lock().current = Some(bytes.to_vec());
    }

    /// Queue the reply to a future command.
    pub fn queue_reply(&self, bytes: &[u8]) {
        self.lock().replies.push_back(bytes.to_vec());
    }

    /// Get all captured command writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Get all staged update packages.
    pub fn get_staged(&self) -> Vec<Vec<u8>> {
        self.lock().staged.clone()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.lock().connected = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.lock().connected = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockTransport {
    fn write_command(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.writes.push(data.to_vec());
        if let Some(reply) = state.replies.pop_front() {
            state.pending = Some((reply, self.reply_delay));
        }
        Ok(data.len())
    }

    fn read_response(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        match state.pending.take() {
            Some((reply, 0)) => state.current = Some(reply),
            Some((reply, n)) => state.pending = Some((reply, n - 1)),
            None => {}
        }
        Ok(state.current.clone())
    }

    fn stage_update_package(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::Disconnected);
        }
        state.staged.push(data.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    fn describe(&self) -> String {
        "mock device".into()
    }
}
