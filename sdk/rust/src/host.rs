use async_trait::async_trait;

/// The privileged side of a prompt request.
///
/// Implementations perform the real, possibly slow, read that a prompt asks
/// for: answering a host call, waiting on the user, querying the process
/// environment. The worker stays frozen until the call returns.
///
/// An error is not propagated to the worker. The dispatcher answers with an
/// empty reply, which the worker cannot tell apart from an empty read.
#[async_trait]
pub trait HostIo: Send {
    async fn prompt(&mut self, text: &str) -> anyhow::Result<Vec<u8>>;
}
