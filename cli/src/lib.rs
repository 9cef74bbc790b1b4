//! Command-line host for sandboxed programs.
//!
//! The host owns the terminal. Programs run on a worker thread and reach
//! the terminal only through the chunked request/response bridge.

pub mod config;
pub mod host;
pub mod sandbox;

pub use config::{ConfigArgs, RunArgs, TtyMode};
pub use host::TerminalHost;
pub use sandbox::{spawn_invocation, Invocation, KeyboardEvent};
