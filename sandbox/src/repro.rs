//! Replayable transfer cases.
//!
//! A [`ReproCase`] is one payload and one chunk size. [`run_case`] streams the
//! payload through a real [`SharedChannel`] between a host thread and the
//! blocking shim and checks the transfer invariants. Property tests save the
//! last failing case as JSON so it can be replayed with `transfer_replay`.

use crate::shim::BlockingShim;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use wasibridge_sdk::{codec, request_channel, BridgeConfig, ChunkChannel, Request, SharedChannel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproCase {
    /// Payload bytes, base64 in the JSON form.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Prompt chunk size. Must be at least 2 so a smaller keyboard chunk fits.
    pub chunk_size: usize,
}

impl ReproCase {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Where failing cases are stored, relative to the sandbox crate.
pub fn default_artifact_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("proptest-artifacts")
        .join("transfer")
        .join("last_failure.json")
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Streams the case payload from a host thread to the shim and checks that:
/// - the worker reassembles the payload byte for byte;
/// - exactly `ceil(len / chunk_size)` chunks carry data;
/// - no published chunk exceeds the chunk size;
/// - the worker asks for a next chunk exactly `len / chunk_size` times.
pub fn run_case(case: &ReproCase) -> Result<(), String> {
    if case.chunk_size < 2 {
        return Err(format!("chunk_size {} is below 2", case.chunk_size));
    }
    let config = BridgeConfig {
        release_chunk_size: case.chunk_size,
        keyboard_chunk_size: case.chunk_size - 1,
        ..Default::default()
    };
    config.validate().map_err(|e| e.to_string())?;

    let channel = Arc::new(SharedChannel::new(config.channel_capacity()));
    let (tx, mut rx) = request_channel();
    let shim = BlockingShim::new(Arc::clone(&channel), tx, config);

    let payload = case.payload.clone();
    let chunk_size = case.chunk_size;
    let host_channel = Arc::clone(&channel);
    let host = thread::spawn(move || -> Result<(usize, usize), String> {
        let mut offset = 0;
        let mut data_chunks = 0;
        let mut next_chunks = 0;
        while let Some(request) = rx.blocking_recv() {
            match request {
                Request::Terminated { .. } => break,
                Request::NextChunk => next_chunks += 1,
                Request::Prompt { .. } => offset = 0,
                other => return Err(format!("unexpected {} request", other.kind())),
            }
            let (words, n) = codec::encode(&payload, offset, chunk_size);
            if n > chunk_size {
                return Err(format!("chunk of {n} bytes exceeds {chunk_size}"));
            }
            offset += n;
            if n > 0 {
                data_chunks += 1;
            }
            host_channel.publish(&words, n).map_err(|e| e.to_string())?;
        }
        Ok((data_chunks, next_chunks))
    });

    let received = shim.prompt_read("replay").map_err(|e| e.to_string());
    let reported = shim.terminated(0, "").map_err(|e| e.to_string());
    let (data_chunks, next_chunks) = host
        .join()
        .map_err(|_| "host thread panicked".to_string())??;
    let received = received?;
    reported?;

    if received.truncated {
        return Err("transfer was truncated".into());
    }
    if received.bytes != case.payload {
        return Err(format!(
            "reassembled {} bytes, expected {}; first difference at byte {}",
            received.bytes.len(),
            case.payload.len(),
            received
                .bytes
                .iter()
                .zip(&case.payload)
                .position(|(a, b)| a != b)
                .unwrap_or(received.bytes.len().min(case.payload.len()))
        ));
    }
    let expected_chunks = case.payload.len().div_ceil(chunk_size);
    if data_chunks != expected_chunks {
        return Err(format!(
            "{data_chunks} data chunks for {} bytes, expected {expected_chunks}",
            case.payload.len()
        ));
    }
    let expected_next = case.payload.len() / chunk_size;
    if next_chunks != expected_next {
        return Err(format!(
            "{next_chunks} next-chunk requests, expected {expected_next}"
        ));
    }
    if channel.status() as usize > chunk_size + 1 {
        return Err(format!("status cell holds {}", channel.status()));
    }
    Ok(())
}
