//! Building blocks of the synchronous host/worker I/O bridge.
//!
//! A sandboxed program runs on a worker thread that may not perform blocking
//! I/O of its own. Whenever it needs input it posts a [`Request`] to the host
//! and parks on the status cell of a [`SharedChannel`]; the host performs the
//! real read and streams the answer back in bounded chunks.
//!
//! This crate holds everything both sides agree on: the channel and its wire
//! format, the chunk codec, the request protocol, configuration and the
//! execution environment handed to the worker at spawn time.

pub mod channel;
pub mod codec;
pub mod config;
pub mod env;
pub mod error;
pub mod host;
pub mod protocol;

pub use channel::{ChunkChannel, SharedChannel, WaitOutcome};
pub use config::BridgeConfig;
pub use env::{ExecutionEnvironment, ExecutionEnvironmentBuilder};
pub use error::{Error, Result};
pub use host::HostIo;
pub use protocol::{
    request_channel, Direction, HostCall, Request, RequestReceiver, RequestSender, Termination,
    END_OF_TRANSMISSION,
};
