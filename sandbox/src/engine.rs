//! The seam between the bridge and the engine that runs a program.
//!
//! Programs never see the shared channel. They get a [`GuestIo`], whose
//! calls block the worker thread through the [`BlockingShim`].

use crate::shim::{BlockingShim, Received};
use thiserror::Error;
use tracing::debug;
use wasibridge_sdk::{
    ChunkChannel, Error, ExecutionEnvironment, HostCall, Result, SharedChannel, Termination,
};

/// I/O capabilities available to a running program.
pub trait GuestIo {
    /// Reads keyboard input into `buf`. Blocks until at least one byte is
    /// available; returns 0 at end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Writes `data` to descriptor `fd` on the host.
    fn write(&mut self, fd: u32, data: &[u8]) -> Result<usize>;

    fn isatty(&mut self, fd: u32) -> bool;

    /// Raw prompt round trip.
    fn prompt(&mut self, text: &str) -> Result<Vec<u8>>;
}

/// Why a program stopped other than by returning normally.
#[derive(Debug, Error)]
pub enum EngineFault {
    /// The program asked to exit with a status.
    #[error("exited with status {code}")]
    Exit { code: i32, message: String },
    /// The engine itself failed.
    #[error("wasm: {0}")]
    Trap(String),
}

impl EngineFault {
    pub fn trap(message: impl Into<String>) -> Self {
        EngineFault::Trap(message.into())
    }

    /// Maps the fault to the status reported to the host. An exit keeps its
    /// message only when the status signals failure.
    pub fn into_termination(self) -> Termination {
        match self {
            EngineFault::Exit { code, message } if code > 0 => Termination::new(code, message),
            EngineFault::Exit { code, .. } => Termination::new(code, ""),
            trap @ EngineFault::Trap(_) => Termination::new(1, trap.to_string()),
        }
    }
}

impl From<Error> for EngineFault {
    fn from(err: Error) -> Self {
        EngineFault::Trap(err.to_string())
    }
}

/// Exit status of a program, or the fault that stopped it.
pub type RunResult = std::result::Result<i32, EngineFault>;

/// Runs a program to completion on the worker thread.
pub trait ExecutionEngine: Send + 'static {
    fn run(&mut self, env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult;
}

impl<F> ExecutionEngine for F
where
    F: FnMut(&ExecutionEnvironment, &mut dyn GuestIo) -> RunResult + Send + 'static,
{
    fn run(&mut self, env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult {
        self(env, io)
    }
}

/// [`GuestIo`] backed by the blocking shim.
pub struct BridgeIo<C = SharedChannel> {
    shim: BlockingShim<C>,
    tty: bool,
    eof_pending: bool,
}

impl<C: ChunkChannel> BridgeIo<C> {
    pub fn new(shim: BlockingShim<C>, env: &ExecutionEnvironment) -> Self {
        Self {
            shim,
            tty: env.tty(),
            eof_pending: false,
        }
    }

    pub fn shim(&self) -> &BlockingShim<C> {
        &self.shim
    }

    fn host_call(&self, call: &HostCall) -> Result<Vec<u8>> {
        complete(self.shim.prompt_read(&call.encode())?)
    }
}

/// A truncated reply is never handed to the program as if it were whole.
fn complete(received: Received) -> Result<Vec<u8>> {
    if received.truncated {
        return Err(Error::Truncated {
            received: received.bytes.len(),
        });
    }
    Ok(received.bytes)
}

impl<C: ChunkChannel> GuestIo for BridgeIo<C> {
    /// An end-of-transmission byte ends the input. Bytes typed before it are
    /// delivered first; the following read then reports end of input without
    /// another round trip.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.eof_pending {
            self.eof_pending = false;
            return Ok(0);
        }
        let eot = self.shim.config().end_of_transmission;
        let mut received = complete(self.shim.keyboard_read(buf.len())?)?;
        if let Some(pos) = received.iter().position(|&b| b == eot) {
            received.truncate(pos);
            self.eof_pending = !received.is_empty();
        }
        let n = received.len().min(buf.len());
        buf[..n].copy_from_slice(&received[..n]);
        Ok(n)
    }

    fn write(&mut self, fd: u32, data: &[u8]) -> Result<usize> {
        let call = HostCall::Write {
            fd,
            data: data.to_vec(),
        };
        let reply = self.host_call(&call)?;
        std::str::from_utf8(&reply)
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .ok_or_else(|| Error::HostCall {
                call: call.name(),
                reason: format!("unexpected reply {:?}", String::from_utf8_lossy(&reply)),
            })
    }

    fn isatty(&mut self, fd: u32) -> bool {
        if !self.tty {
            return false;
        }
        match self.host_call(&HostCall::Isatty { fd }) {
            Ok(reply) => reply == b"1",
            Err(err) => {
                debug!(fd, %err, "isatty host call failed");
                false
            }
        }
    }

    fn prompt(&mut self, text: &str) -> Result<Vec<u8>> {
        complete(self.shim.prompt_read(text)?)
    }
}
