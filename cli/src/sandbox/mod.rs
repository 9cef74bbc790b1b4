//! Host side of a sandboxed run.
//!
//! - `dispatcher`: answers the worker's requests through the shared channel
//! - `invocation`: wires a worker, a channel and a dispatcher together

pub mod dispatcher;
pub mod invocation;

pub use dispatcher::{keyboard_channel, Dispatcher, KeyboardEvent, KeyboardSender};
pub use invocation::{spawn_invocation, Invocation};
