use crate::error::{Error, Result};
use crate::protocol::{Direction, END_OF_TRANSMISSION};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest chunk streamed for prompt replies.
pub const DEFAULT_RELEASE_CHUNK_SIZE: usize = 8192;
/// Largest chunk streamed for keyboard reads.
pub const DEFAULT_KEYBOARD_CHUNK_SIZE: usize = 2047;
/// Bound on waits for a continuation chunk.
pub const DEFAULT_CONTINUATION_TIMEOUT_MS: u64 = 10_000;

/// Tunables shared by both ends of one bridge.
///
/// Both sides must be built from the same value: a chunk of exactly
/// `release_chunk_size` (or `keyboard_chunk_size`) bytes is how the worker
/// learns that more data may follow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub release_chunk_size: usize,
    pub keyboard_chunk_size: usize,
    pub continuation_timeout_ms: u64,
    pub end_of_transmission: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            release_chunk_size: DEFAULT_RELEASE_CHUNK_SIZE,
            keyboard_chunk_size: DEFAULT_KEYBOARD_CHUNK_SIZE,
            continuation_timeout_ms: DEFAULT_CONTINUATION_TIMEOUT_MS,
            end_of_transmission: END_OF_TRANSMISSION,
        }
    }
}

impl BridgeConfig {
    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: BridgeConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.release_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "release_chunk_size must be at least 1".into(),
            ));
        }
        if self.keyboard_chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "keyboard_chunk_size must be at least 1".into(),
            ));
        }
        if self.keyboard_chunk_size >= self.release_chunk_size {
            return Err(Error::InvalidConfig(format!(
                "keyboard_chunk_size ({}) must be smaller than release_chunk_size ({})",
                self.keyboard_chunk_size, self.release_chunk_size
            )));
        }
        if self.release_chunk_size >= u32::MAX as usize {
            return Err(Error::InvalidConfig(
                "release_chunk_size does not fit the status cell".into(),
            ));
        }
        if self.continuation_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "continuation_timeout_ms must be nonzero".into(),
            ));
        }
        Ok(())
    }

    pub fn chunk_size(&self, direction: Direction) -> usize {
        match direction {
            Direction::Prompt => self.release_chunk_size,
            Direction::Keyboard => self.keyboard_chunk_size,
        }
    }

    /// Payload bytes the shared channel must hold.
    pub fn channel_capacity(&self) -> usize {
        self.release_chunk_size.max(self.keyboard_chunk_size)
    }

    pub fn continuation_timeout(&self) -> Duration {
        Duration::from_millis(self.continuation_timeout_ms)
    }
}
