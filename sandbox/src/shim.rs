//! Worker-side blocking shim.
//!
//! Every read follows the same cycle: empty the status cell, post a request
//! to the host, park on the cell until the host publishes a chunk, decode it.
//! A chunk that fills the direction's chunk size means more may follow, so
//! the shim asks for the next one and parks again.
//!
//! The first wait of a read is unbounded: the worker may legitimately sit
//! on user input forever. Continuation waits are bounded by the configured
//! timeout so a lost wakeup cannot hang the worker mid-transfer.
//!
//! A timed-out continuation leaves the host holding an unanswered
//! `NextChunk`; its reply may still land in the channel later. After that
//! the shim refuses every further transfer with [`Error::OutOfSync`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};
use wasibridge_sdk::{
    codec, BridgeConfig, ChunkChannel, Direction, Error, Request, RequestSender, Result,
    SharedChannel, WaitOutcome,
};

/// Bytes gathered by one blocking read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Received {
    pub bytes: Vec<u8>,
    /// A continuation chunk never arrived; `bytes` holds what came before.
    pub truncated: bool,
}

pub struct BlockingShim<C = SharedChannel> {
    channel: Arc<C>,
    requests: RequestSender,
    config: BridgeConfig,
    out_of_sync: AtomicBool,
}

impl<C: ChunkChannel> BlockingShim<C> {
    pub fn new(channel: Arc<C>, requests: RequestSender, config: BridgeConfig) -> Self {
        Self {
            channel,
            requests,
            config,
            out_of_sync: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Whether an earlier transfer was truncated.
    pub fn is_out_of_sync(&self) -> bool {
        self.out_of_sync.load(Ordering::Acquire)
    }

    /// Asks the host to perform the read described by `text` and blocks
    /// until the whole reply has arrived.
    pub fn prompt_read(&self, text: &str) -> Result<Received> {
        self.transfer(
            Request::Prompt {
                text: text.to_string(),
            },
            Direction::Prompt,
            usize::MAX,
        )
    }

    /// Reads up to `length` bytes of keyboard input.
    ///
    /// Stops right after an end-of-transmission byte even if the chunk
    /// carried more. Never returns more than `length` bytes.
    pub fn keyboard_read(&self, length: usize) -> Result<Received> {
        if length == 0 {
            return Ok(Received::default());
        }
        self.transfer(
            Request::KeyboardRead { length },
            Direction::Keyboard,
            length,
        )
    }

    /// Reports the end of the program. Nothing is read back.
    pub fn terminated(&self, code: i32, message: &str) -> Result<()> {
        self.send(Request::Terminated {
            code,
            message: message.to_string(),
        })
    }

    fn transfer(&self, request: Request, direction: Direction, limit: usize) -> Result<Received> {
        if self.is_out_of_sync() {
            return Err(Error::OutOfSync);
        }
        let chunk_size = self.config.chunk_size(direction);
        let eot = self.config.end_of_transmission;
        let mut received = Received::default();
        let mut timeout = None;

        self.channel.reset();
        self.send(request)?;
        loop {
            let len = match self.channel.wait(timeout) {
                WaitOutcome::Ready(len) => len,
                WaitOutcome::TimedOut => {
                    warn!(
                        ?direction,
                        received = received.bytes.len(),
                        "continuation chunk timed out, transfer truncated"
                    );
                    received.truncated = true;
                    self.out_of_sync.store(true, Ordering::Release);
                    break;
                }
            };
            let mut chunk = codec::decode(&self.channel.read_words(len), len);
            trace!(?direction, len, "chunk received");

            let mut done = len < chunk_size;
            if direction == Direction::Keyboard {
                if let Some(pos) = chunk.iter().position(|&b| b == eot) {
                    chunk.truncate(pos + 1);
                    done = true;
                }
            }
            let room = limit - received.bytes.len();
            if chunk.len() >= room {
                chunk.truncate(room);
                done = true;
            }
            received.bytes.extend_from_slice(&chunk);
            if done {
                break;
            }

            self.channel.reset();
            self.send(Request::NextChunk)?;
            timeout = Some(self.config.continuation_timeout());
        }
        Ok(received)
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| Error::Disconnected)
    }
}
