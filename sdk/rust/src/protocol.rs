//! Messages the worker posts to the host.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Byte that ends a keyboard transfer (`^D`).
pub const END_OF_TRANSMISSION: u8 = 0x04;

/// Which read path a transfer belongs to. Each direction has its own chunk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Prompt,
    Keyboard,
}

/// Asynchronous request from the worker. Consumed exactly once by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Generic blocking read; the host performs a privileged operation
    /// described by `text` and streams back its result.
    Prompt { text: String },
    /// Read up to `length` bytes of keyboard input.
    KeyboardRead { length: usize },
    /// The worker consumed a full chunk and wants the next one.
    NextChunk,
    /// The program finished.
    Terminated { code: i32, message: String },
}

impl Request {
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Prompt { .. } => "prompt",
            Request::KeyboardRead { .. } => "keyboard",
            Request::NextChunk => "next_chunk",
            Request::Terminated { .. } => "terminated",
        }
    }
}

pub type RequestSender = mpsc::UnboundedSender<Request>;
pub type RequestReceiver = mpsc::UnboundedReceiver<Request>;

/// Creates the ordered request queue of one invocation. Sending never blocks.
pub fn request_channel() -> (RequestSender, RequestReceiver) {
    mpsc::unbounded_channel()
}

/// Final status of an invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Termination {
    pub code: i32,
    pub message: String,
}

impl Termination {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Reported when the request queue closes without a `Terminated` request.
    pub fn worker_lost() -> Self {
        Self::new(1, "worker exited without reporting a status")
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A system call carried through the prompt channel.
///
/// The prompt text is `libc\n<call>\n<arg>...`. Payload bytes are base64 so
/// the text stays safe for hosts that cannot carry arbitrary bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// Write `data` to descriptor `fd`. The reply is the decimal byte count.
    Write { fd: u32, data: Vec<u8> },
    /// Ask whether descriptor `fd` is a terminal. The reply is `1` or `0`.
    Isatty { fd: u32 },
}

impl HostCall {
    pub const PREFIX: &'static str = "libc";

    pub fn name(&self) -> &'static str {
        match self {
            HostCall::Write { .. } => "write",
            HostCall::Isatty { .. } => "isatty",
        }
    }

    pub fn encode(&self) -> String {
        match self {
            HostCall::Write { fd, data } => {
                format!("{}\nwrite\n{}\n{}", Self::PREFIX, fd, STANDARD.encode(data))
            }
            HostCall::Isatty { fd } => format!("{}\nisatty\n{}", Self::PREFIX, fd),
        }
    }

    /// Parses prompt text. Returns `None` for anything that is not a
    /// well-formed host call.
    pub fn parse(text: &str) -> Option<HostCall> {
        let mut lines = text.split('\n');
        if lines.next()? != Self::PREFIX {
            return None;
        }
        let call = match lines.next()? {
            "write" => {
                let fd = lines.next()?.parse().ok()?;
                let data = STANDARD.decode(lines.next().unwrap_or("")).ok()?;
                HostCall::Write { fd, data }
            }
            "isatty" => HostCall::Isatty {
                fd: lines.next()?.parse().ok()?,
            },
            _ => return None,
        };
        match lines.next() {
            None => Some(call),
            Some(_) => None,
        }
    }
}
