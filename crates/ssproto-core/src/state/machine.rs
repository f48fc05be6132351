//! Transaction state for the command/response framer.

use std::collections::VecDeque;
use std::fmt;

/// Framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramerState {
    /// No response outstanding.
    #[default]
    Idle,
    /// At least one sent command is waiting for its response.
    AwaitingResponse,
}

impl fmt::Display for FramerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerState::Idle => write!(f, "IDLE"),
            FramerState::AwaitingResponse => write!(f, "AWAITING_RESPONSE"),
        }
    }
}

/// Identifies one sent command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    /// Sequence number, unique per framer.
    pub id: u64,
    /// Element name of the command.
    pub command: &'static str,
    pub expects_response: bool,
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.command)
    }
}

/// How a response's `ResponseIdx` relates to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// First response seen by this framer.
    First,
    /// Index advanced.
    New,
    /// Same index as before: the device has not answered yet.
    Stale,
    /// Index rolled over the configured modulus.
    Wrapped,
    /// Index fell to 0: the device restarted its session.
    SessionReset,
}

impl ResponseDisposition {
    /// Whether this response answers an outstanding command.
    pub fn is_fresh(&self) -> bool {
        !matches!(self, ResponseDisposition::Stale)
    }
}

impl fmt::Display for ResponseDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseDisposition::First => write!(f, "first"),
            ResponseDisposition::New => write!(f, "new"),
            ResponseDisposition::Stale => write!(f, "stale"),
            ResponseDisposition::Wrapped => write!(f, "wrapped"),
            ResponseDisposition::SessionReset => write!(f, "session reset"),
        }
    }
}

/// Classify `received` against the previous index. `None` means the step is
/// a decrease that is neither a wrap nor a reset.
pub fn classify(
    previous: Option<u64>,
    received: u64,
    modulus: Option<u64>,
) -> Option<ResponseDisposition> {
    let Some(previous) = previous else {
        return Some(ResponseDisposition::First);
    };
    if received == previous {
        return Some(ResponseDisposition::Stale);
    }
    if received > previous {
        return Some(ResponseDisposition::New);
    }
    // Decrease: a wrap only if the old index was in the top half and the new
    // one in the bottom half of the counter range.
    if let Some(m) = modulus
        && m > 1
        && previous < m
        && previous >= m / 2
        && received < m / 2
    {
        return Some(ResponseDisposition::Wrapped);
    }
    if received == 0 {
        return Some(ResponseDisposition::SessionReset);
    }
    None
}

/// Runtime state of a framer.
#[derive(Debug, Default)]
pub struct FramerContext {
    pub state: FramerState,
    /// Sent commands awaiting responses, oldest first.
    pub outstanding: VecDeque<TransactionHandle>,
    pub last_response_idx: Option<u64>,
    pub last_queue_depth: Option<u64>,
    /// Device sessions observed (incremented on every reset).
    pub device_session: u64,
    next_id: u64,
}

impl FramerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, new_state: FramerState) {
        if self.state != new_state {
            tracing::debug!(from = %self.state, to = %new_state, "State transition");
            self.state = new_state;
        }
    }

    pub fn next_handle(&mut self, command: &'static str, expects_response: bool) -> TransactionHandle {
        self.next_id += 1;
        TransactionHandle {
            id: self.next_id,
            command,
            expects_response,
        }
    }

    /// Remove the oldest outstanding transaction and settle the state.
    pub fn complete_oldest(&mut self) -> Option<TransactionHandle> {
        let done = self.outstanding.pop_front();
        if self.outstanding.is_empty() {
            self.goto_state(FramerState::Idle);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_monotonic() {
        assert_eq!(classify(None, 7, None), Some(ResponseDisposition::First));
        assert_eq!(classify(Some(7), 7, None), Some(ResponseDisposition::Stale));
        assert_eq!(classify(Some(7), 9, None), Some(ResponseDisposition::New));
        assert_eq!(classify(Some(7), 3, None), None);
    }

    #[test]
    fn test_classify_reset_sequence() {
        let mut prev = None;
        let mut seen = Vec::new();
        for idx in [117, 118, 119, 0, 1] {
            seen.push(classify(prev, idx, None).unwrap());
            prev = Some(idx);
        }
        assert_eq!(
            seen,
            vec![
                ResponseDisposition::First,
                ResponseDisposition::New,
                ResponseDisposition::New,
                ResponseDisposition::SessionReset,
                ResponseDisposition::New,
            ]
        );
    }

    #[test]
    fn test_classify_wrap() {
        assert_eq!(classify(Some(255), 0, Some(256)), Some(ResponseDisposition::Wrapped));
        assert_eq!(classify(Some(250), 3, Some(256)), Some(ResponseDisposition::Wrapped));
        // A drop from the bottom half is not a wrap.
        assert_eq!(classify(Some(40), 0, Some(256)), Some(ResponseDisposition::SessionReset));
        assert_eq!(classify(Some(40), 3, Some(256)), None);
    }

    #[test]
    fn test_complete_oldest_returns_to_idle() {
        let mut ctx = FramerContext::new();
        let a = ctx.next_handle("GetClock", true);
        let b = ctx.next_handle("GetBattery", true);
        ctx.outstanding.extend([a.clone(), b.clone()]);
        ctx.goto_state(FramerState::AwaitingResponse);

        assert_eq!(ctx.complete_oldest(), Some(a));
        assert_eq!(ctx.state, FramerState::AwaitingResponse);
        assert_eq!(ctx.complete_oldest(), Some(b));
        assert_eq!(ctx.state, FramerState::Idle);
        assert_eq!(ctx.complete_oldest(), None);
    }
}
