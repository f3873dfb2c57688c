//! Per-connection session state.

use std::time::{Duration, Instant};

/// State owned by one socket's read loop.
#[derive(Debug)]
pub struct SessionState {
    pub user_id: i64,
    pub session_id: String,
    sequence: u64,
    last_heartbeat: Instant,
}

impl SessionState {
    pub fn new(session_id: String, user_id: i64) -> Self {
        Self {
            user_id,
            session_id,
            sequence: 0,
            last_heartbeat: Instant::now(),
        }
    }

    /// Sequence number for the next dispatch (starts at 1).
    pub fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() < timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_increments() {
        let mut state = SessionState::new("s".into(), 1);
        assert_eq!(state.next_sequence(), 1);
        assert_eq!(state.next_sequence(), 2);
    }

    #[test]
    fn test_liveness() {
        let mut state = SessionState::new("s".into(), 1);
        state.heartbeat();
        assert!(state.is_alive(Duration::from_secs(60)));
        assert!(!state.is_alive(Duration::ZERO));
    }
}
