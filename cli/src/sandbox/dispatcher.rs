//! Host-side dispatcher.
//!
//! Handles the worker's requests one at a time, in the order they were sent.
//! Every answer ends with a single publish on the shared channel; the
//! dispatcher never waits on the channel itself.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use wasibridge_sdk::{
    codec, BridgeConfig, ChunkChannel, HostIo, Request, RequestReceiver, Result, SharedChannel,
    Termination,
};

/// Input from the terminal layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyboardEvent {
    Input(Vec<u8>),
    /// No more input will arrive.
    Closed,
}

pub type KeyboardSender = mpsc::UnboundedSender<KeyboardEvent>;
pub type KeyboardReceiver = mpsc::UnboundedReceiver<KeyboardEvent>;

pub fn keyboard_channel() -> (KeyboardSender, KeyboardReceiver) {
    mpsc::unbounded_channel()
}

/// Remainder of a reply the worker has not received yet.
#[derive(Debug)]
enum Pending {
    Prompt { data: Vec<u8>, offset: usize },
    /// Bytes the worker may still take from the keyboard accumulator.
    Keyboard { remaining: usize },
}

pub struct Dispatcher<H, C = SharedChannel> {
    host: H,
    channel: Arc<C>,
    config: BridgeConfig,
    pending: Option<Pending>,
    keyboard: VecDeque<u8>,
    /// Length of a keyboard read waiting for input.
    parked: Option<usize>,
    input_closed: bool,
}

impl<H: HostIo, C: ChunkChannel> Dispatcher<H, C> {
    pub fn new(host: H, channel: Arc<C>, config: BridgeConfig) -> Self {
        Self {
            host,
            channel,
            config,
            pending: None,
            keyboard: VecDeque::new(),
            parked: None,
            input_closed: false,
        }
    }

    /// Serves requests until the worker reports its termination.
    ///
    /// Returns as soon as `Terminated` is handled, so nothing is published
    /// afterwards. A request queue that closes first yields
    /// [`Termination::worker_lost`].
    pub async fn run(
        mut self,
        mut requests: RequestReceiver,
        mut keyboard: KeyboardReceiver,
    ) -> Termination {
        loop {
            let step = tokio::select! {
                biased;
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => {
                        warn!("request queue closed without a termination");
                        return Termination::worker_lost();
                    }
                },
                event = keyboard.recv(), if !self.input_closed => match event {
                    Some(KeyboardEvent::Input(bytes)) => self.on_input(bytes).map(|()| None),
                    Some(KeyboardEvent::Closed) | None => self.on_input_closed().map(|()| None),
                },
            };
            match step {
                Ok(Some(termination)) => return termination,
                Ok(None) => {}
                Err(err) => {
                    error!(%err, "could not publish chunk");
                    return Termination::new(1, format!("bridge: {err}"));
                }
            }
        }
    }

    async fn handle(&mut self, request: Request) -> Result<Option<Termination>> {
        debug!(kind = request.kind(), "request");
        match request {
            Request::Prompt { text } => {
                self.channel.reset();
                self.pending = None;
                let data = match self.host.prompt(&text).await {
                    Ok(data) => data,
                    Err(err) => {
                        warn!(error = %err, "host read failed, replying with end of input");
                        Vec::new()
                    }
                };
                self.pending = Some(Pending::Prompt { data, offset: 0 });
                self.send_next()?;
            }
            Request::KeyboardRead { length } => {
                self.channel.reset();
                self.pending = None;
                if self.keyboard.is_empty() && !self.input_closed {
                    debug!(length, "keyboard read parked until input arrives");
                    self.parked = Some(length);
                } else {
                    self.pending = Some(Pending::Keyboard { remaining: length });
                    self.send_next()?;
                }
            }
            Request::NextChunk => self.send_next()?,
            Request::Terminated { code, message } => {
                debug!(code, "worker terminated");
                return Ok(Some(Termination::new(code, message)));
            }
        }
        Ok(None)
    }

    fn on_input(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.keyboard.extend(bytes);
        if let Some(length) = self.parked.take() {
            self.pending = Some(Pending::Keyboard { remaining: length });
            self.send_next()?;
        }
        Ok(())
    }

    fn on_input_closed(&mut self) -> Result<()> {
        self.input_closed = true;
        if self.parked.take().is_some() {
            self.pending = None;
            self.send_next()?;
        }
        Ok(())
    }

    /// Publishes the next slice of the pending reply. With nothing pending
    /// the chunk is empty, which ends the worker's transfer.
    fn send_next(&mut self) -> Result<()> {
        let mut finished = true;
        let (words, len) = match &mut self.pending {
            Some(Pending::Prompt { data, offset }) => {
                let (words, n) = codec::encode(data, *offset, self.config.release_chunk_size);
                *offset += n;
                finished = *offset >= data.len();
                (words, n)
            }
            Some(Pending::Keyboard { remaining }) => {
                let eot = self.config.end_of_transmission;
                let mut n = (*remaining)
                    .min(self.config.keyboard_chunk_size)
                    .min(self.keyboard.len());
                let terminated = match self.keyboard.iter().take(n).position(|&b| b == eot) {
                    Some(pos) => {
                        n = pos + 1;
                        true
                    }
                    None => false,
                };
                *remaining -= n;
                finished = terminated || n == 0 || *remaining == 0;
                let chunk: Vec<u8> = self.keyboard.drain(..n).collect();
                codec::encode(&chunk, 0, n)
            }
            None => (Vec::new(), 0),
        };
        if finished {
            self.pending = None;
        }
        debug!(len, "chunk written");
        self.channel.publish(&words, len)
    }
}
