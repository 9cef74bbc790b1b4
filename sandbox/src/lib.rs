//! Worker side of the bridge.
//!
//! [`worker::spawn_worker`] starts a program on its own thread. The program
//! talks to the host only through [`engine::GuestIo`], which the
//! [`shim::BlockingShim`] implements by posting requests and parking on the
//! shared channel until the reply has arrived.

pub mod builtin;
pub mod engine;
pub mod repro;
pub mod shim;
pub mod worker;

pub use builtin::BuiltinEngine;
pub use engine::{BridgeIo, EngineFault, ExecutionEngine, GuestIo, RunResult};
pub use shim::{BlockingShim, Received};
pub use worker::{spawn_worker, WorkerHandle};
