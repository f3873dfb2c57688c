//! Snowflake ID Generator
//!
//! Time-ordered 64-bit identifiers for every marketplace record.
//!
//! Layout: 41 bits of milliseconds since the configured epoch, 5 bits machine,
//! 5 bits node, 12 bits sequence.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::error::AppError;

/// KoiHire epoch (2024-01-01T00:00:00.000Z)
pub const KOIHIRE_EPOCH: u64 = 1_704_067_200_000;

const SEQUENCE_MASK: u64 = 0xFFF;

struct GeneratorState {
    last_timestamp: u64,
    sequence: u64,
}

/// Snowflake ID generator
pub struct SnowflakeGenerator {
    epoch: u64,
    machine_id: u64,
    node_id: u64,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    /// Create a generator using the default epoch
    pub fn new(machine_id: u64, node_id: u64) -> Self {
        Self::with_epoch(KOIHIRE_EPOCH, machine_id, node_id)
    }

    /// Create a generator with a custom epoch in milliseconds
    pub fn with_epoch(epoch: u64, machine_id: u64, node_id: u64) -> Self {
        Self {
            epoch,
            machine_id: machine_id & 0x1F,
            node_id: node_id & 0x1F,
            state: Mutex::new(GeneratorState {
                last_timestamp: 0,
                sequence: 0,
            }),
        }
    }

    /// Generate a new snowflake ID
    pub fn generate(&self) -> i64 {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut timestamp = current_millis().max(state.last_timestamp);
        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond
                while timestamp <= state.last_timestamp {
                    timestamp = current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = timestamp;

        let id = (timestamp.saturating_sub(self.epoch) << 22)
            | (self.machine_id << 17)
            | (self.node_id << 12)
            | state.sequence;

        id as i64
    }

    /// Extract the creation timestamp (Unix millis) from an ID
    pub fn timestamp_of(&self, snowflake: i64) -> u64 {
        ((snowflake as u64) >> 22) + self.epoch
    }
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Parse a snowflake from its string form (path segments, JSON fields)
pub fn parse_id(s: &str, what: &str) -> Result<i64, AppError> {
    s.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::BadRequest(format!("Invalid {} ID", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_unique_and_ordered() {
        let gen = SnowflakeGenerator::new(1, 1);
        let ids: Vec<i64> = (0..5000).map(|_| gen.generate()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_extract_timestamp() {
        let gen = SnowflakeGenerator::new(1, 1);
        let id = gen.generate();
        let ts = gen.timestamp_of(id);
        let now = current_millis();
        assert!(ts <= now);
        assert!(ts > now - 1000);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "project").unwrap(), 42);
        assert!(parse_id("abc", "project").is_err());
        assert!(parse_id("-3", "project").is_err());
    }
}
