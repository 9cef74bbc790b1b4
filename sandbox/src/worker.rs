//! Worker thread runner.
//!
//! One OS thread per invocation. It builds the shim, runs the engine and,
//! whatever happens, reports exactly one `Terminated` request as its final
//! act, so the host sees the status only after every earlier transfer.
//! The thread runs inside the span that was current when it was spawned.

use crate::engine::{BridgeIo, EngineFault, ExecutionEngine};
use crate::shim::BlockingShim;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};
use wasibridge_sdk::{
    BridgeConfig, ChunkChannel, Error, ExecutionEnvironment, RequestSender, Result, Termination,
};

pub struct WorkerHandle {
    thread: thread::JoinHandle<Termination>,
}

impl WorkerHandle {
    /// Waits for the worker thread and returns the status it reported.
    pub fn join(self) -> Termination {
        self.thread
            .join()
            .unwrap_or_else(|payload| Termination::new(1, panic_message(payload.as_ref())))
    }
}

pub fn spawn_worker<E, C>(
    mut engine: E,
    env: ExecutionEnvironment,
    channel: Arc<C>,
    requests: RequestSender,
    config: BridgeConfig,
) -> Result<WorkerHandle>
where
    E: ExecutionEngine,
    C: ChunkChannel + 'static,
{
    let span = tracing::Span::current();
    let thread = thread::Builder::new()
        .name("wasibridge-worker".into())
        .spawn(move || {
            let _entered = span.enter();
            let shim = BlockingShim::new(channel, requests, config);
            let mut io = BridgeIo::new(shim, &env);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| engine.run(&env, &mut io)));
            let termination = match outcome {
                Ok(Ok(code)) => Termination::new(code, ""),
                Ok(Err(fault)) => fault.into_termination(),
                Err(payload) => {
                    EngineFault::trap(panic_message(payload.as_ref())).into_termination()
                }
            };
            debug!(code = termination.code, "program finished");

            if let Err(err) = io
                .shim()
                .terminated(termination.code, &termination.message)
            {
                warn!(%err, "could not report termination to host");
            }
            termination
        })
        .map_err(Error::Spawn)?;

    Ok(WorkerHandle { thread })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GuestIo, RunResult};
    use crate::shim::tests::scripted_host;
    use wasibridge_sdk::{request_channel, Request, SharedChannel};

    fn env() -> ExecutionEnvironment {
        ExecutionEnvironment::builder(b"prog".to_vec())
            .arg("prog")
            .cwd(std::env::temp_dir())
            .build()
            .unwrap()
    }

    fn run<E: ExecutionEngine>(engine: E) -> (Termination, Vec<Request>) {
        let config = BridgeConfig::default();
        let channel = Arc::new(SharedChannel::new(config.channel_capacity()));
        let (tx, rx) = request_channel();
        let host = scripted_host(Arc::clone(&channel), rx, config.clone(), |_| b"ok".to_vec());
        let worker = spawn_worker(engine, env(), channel, tx, config).unwrap();
        let termination = worker.join();
        (termination, host.join().unwrap())
    }

    #[test]
    fn test_clean_exit_reports_once() {
        let (termination, seen) =
            run(|_: &ExecutionEnvironment, _: &mut dyn GuestIo| -> RunResult { Ok(0) });
        assert_eq!(termination, Termination::new(0, ""));
        assert_eq!(
            seen,
            vec![Request::Terminated {
                code: 0,
                message: String::new()
            }]
        );
    }

    #[test]
    fn test_terminated_follows_last_transfer() {
        let (termination, seen) = run(|_: &ExecutionEnvironment, io: &mut dyn GuestIo| -> RunResult {
            let reply = io.prompt("first")?;
            assert_eq!(reply, b"ok");
            Ok(7)
        });
        assert_eq!(termination.code, 7);
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], Request::Prompt { .. }));
        assert!(matches!(seen[1], Request::Terminated { code: 7, .. }));
    }

    #[test]
    fn test_trap_maps_to_status_one() {
        let (termination, seen) = run(|_: &ExecutionEnvironment, _: &mut dyn GuestIo| -> RunResult {
            Err(EngineFault::trap("out of bounds memory access"))
        });
        assert_eq!(
            termination,
            Termination::new(1, "wasm: out of bounds memory access")
        );
        assert_eq!(
            seen,
            vec![Request::Terminated {
                code: 1,
                message: "wasm: out of bounds memory access".into()
            }]
        );
    }

    #[test]
    fn test_panic_is_reported_not_lost() {
        let (termination, seen) = run(|_: &ExecutionEnvironment, _: &mut dyn GuestIo| -> RunResult {
            panic!("engine blew up")
        });
        assert_eq!(termination, Termination::new(1, "wasm: engine blew up"));
        assert_eq!(seen.len(), 1);
    }
}
