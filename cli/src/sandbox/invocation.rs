//! One sandboxed run: a fresh channel, a worker thread and a dispatcher task.

use super::dispatcher::{keyboard_channel, Dispatcher, KeyboardEvent, KeyboardSender};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;
use wasibridge_sandbox::{spawn_worker, ExecutionEngine, WorkerHandle};
use wasibridge_sdk::{
    request_channel, BridgeConfig, Error, ExecutionEnvironment, HostIo, Result, SharedChannel,
    Termination,
};

/// Handle to a running invocation.
pub struct Invocation {
    id: Uuid,
    keyboard: KeyboardSender,
    worker: WorkerHandle,
    done: oneshot::Receiver<Termination>,
    join_timeout: Duration,
}

/// Starts `engine` on a worker thread with its own shared channel and
/// spawns the dispatcher that serves it. Must be called inside a Tokio
/// runtime.
///
/// `on_terminated` runs exactly once, after the dispatcher has consumed the
/// worker's termination, and so after every earlier chunk was delivered.
/// If the dispatcher itself panics, it still runs once with exit code 1.
pub fn spawn_invocation<E, H, F>(
    engine: E,
    env: ExecutionEnvironment,
    host: H,
    config: BridgeConfig,
    on_terminated: F,
) -> Result<Invocation>
where
    E: ExecutionEngine,
    H: HostIo + 'static,
    F: FnOnce(&Termination) + Send + 'static,
{
    config.validate()?;

    let id = Uuid::new_v4();
    let span = info_span!("invocation", invocation = %id);
    let channel = Arc::new(SharedChannel::new(config.channel_capacity()));
    let (requests_tx, requests_rx) = request_channel();
    let (keyboard, keyboard_rx) = keyboard_channel();

    let worker = span.in_scope(|| {
        info!(args = ?env.args(), tty = env.tty(), "starting invocation");
        spawn_worker(
            engine,
            env,
            Arc::clone(&channel),
            requests_tx,
            config.clone(),
        )
    })?;

    let join_timeout = config.continuation_timeout();
    let dispatcher = Dispatcher::new(host, channel, config);
    let (done_tx, done) = oneshot::channel();
    let serving = tokio::spawn(
        dispatcher
            .run(requests_rx, keyboard_rx)
            .instrument(span.clone()),
    );
    tokio::spawn(
        async move {
            let termination = match serving.await {
                Ok(termination) => termination,
                Err(err) => {
                    error!(%err, "dispatcher failed");
                    Termination::new(1, format!("bridge: dispatcher failed: {err}"))
                }
            };
            info!(code = termination.code, "invocation terminated");
            on_terminated(&termination);
            let _ = done_tx.send(termination);
        }
        .instrument(span),
    );

    Ok(Invocation {
        id,
        keyboard,
        worker,
        done,
        join_timeout,
    })
}

impl Invocation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Appends text to the keyboard accumulator.
    pub fn submit_keyboard_input(&self, text: impl Into<Vec<u8>>) -> Result<()> {
        self.keyboard
            .send(KeyboardEvent::Input(text.into()))
            .map_err(|_| Error::Disconnected)
    }

    /// Signals that no more keyboard input will arrive.
    pub fn close_keyboard_input(&self) -> Result<()> {
        self.keyboard
            .send(KeyboardEvent::Closed)
            .map_err(|_| Error::Disconnected)
    }

    /// Sender for feeding keyboard input from another thread.
    pub fn keyboard_sender(&self) -> KeyboardSender {
        self.keyboard.clone()
    }

    /// Waits for the termination consumed by the dispatcher, then reaps the
    /// worker thread.
    ///
    /// A worker still blocked on the channel cannot be interrupted; after
    /// the join timeout it is left behind.
    pub async fn wait(self) -> Termination {
        let termination = self
            .done
            .await
            .unwrap_or_else(|_| Termination::worker_lost());

        let worker = self.worker;
        let join = tokio::task::spawn_blocking(move || worker.join());
        match tokio::time::timeout(self.join_timeout, join).await {
            Ok(Ok(reported)) => {
                debug!(invocation = %self.id, code = reported.code, "worker joined")
            }
            Ok(Err(err)) => warn!(invocation = %self.id, %err, "worker join failed"),
            Err(_) => warn!(invocation = %self.id, "worker did not exit, leaving it behind"),
        }
        termination
    }
}
