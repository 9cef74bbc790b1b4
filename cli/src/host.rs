//! Host calls served against the real process streams.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;
use wasibridge_sdk::{HostCall, HostIo};

/// Answers write and isatty host calls. Descriptor 1 goes to `out`, every
/// other descriptor to `err`.
pub struct TerminalHost<O = tokio::io::Stdout, E = tokio::io::Stderr> {
    out: O,
    err: E,
}

impl TerminalHost {
    pub fn new() -> Self {
        Self::with_writers(tokio::io::stdout(), tokio::io::stderr())
    }
}

impl Default for TerminalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl<O, E> TerminalHost<O, E> {
    pub fn with_writers(out: O, err: E) -> Self {
        Self { out, err }
    }

    #[cfg(test)]
    fn into_writers(self) -> (O, E) {
        (self.out, self.err)
    }
}

#[async_trait]
impl<O, E> HostIo for TerminalHost<O, E>
where
    O: AsyncWrite + Unpin + Send,
    E: AsyncWrite + Unpin + Send,
{
    async fn prompt(&mut self, text: &str) -> anyhow::Result<Vec<u8>> {
        match HostCall::parse(text) {
            Some(HostCall::Write { fd, data }) => {
                debug!(fd, len = data.len(), "write");
                if fd == 1 {
                    self.out.write_all(&data).await?;
                    self.out.flush().await?;
                } else {
                    self.err.write_all(&data).await?;
                    self.err.flush().await?;
                }
                Ok(data.len().to_string().into_bytes())
            }
            Some(HostCall::Isatty { fd }) => {
                let reply: &[u8] = if is_terminal(fd) { b"1" } else { b"0" };
                Ok(reply.to_vec())
            }
            None => anyhow::bail!(
                "unsupported prompt {:?}",
                text.lines().next().unwrap_or_default()
            ),
        }
    }
}

#[cfg(unix)]
pub fn is_terminal(fd: u32) -> bool {
    let Ok(fd) = libc::c_int::try_from(fd) else {
        return false;
    };
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(fd) == 1 }
}

#[cfg(not(unix))]
pub fn is_terminal(_fd: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_host() -> TerminalHost<Vec<u8>, Vec<u8>> {
        TerminalHost::with_writers(Vec::new(), Vec::new())
    }

    #[tokio::test]
    async fn test_write_routes_by_descriptor() -> anyhow::Result<()> {
        let mut host = memory_host();
        let out = HostCall::Write {
            fd: 1,
            data: "héllo\n".as_bytes().to_vec(),
        };
        let err = HostCall::Write {
            fd: 2,
            data: b"oops\n".to_vec(),
        };
        let odd = HostCall::Write {
            fd: 7,
            data: b"!".to_vec(),
        };

        assert_eq!(host.prompt(&out.encode()).await?, b"7");
        assert_eq!(host.prompt(&err.encode()).await?, b"5");
        assert_eq!(host.prompt(&odd.encode()).await?, b"1");

        let (stdout, stderr) = host.into_writers();
        assert_eq!(stdout, "héllo\n".as_bytes());
        assert_eq!(stderr, b"oops\n!");
        Ok(())
    }

    #[tokio::test]
    async fn test_isatty_on_unknown_descriptor() -> anyhow::Result<()> {
        let mut host = memory_host();
        let reply = host
            .prompt(&HostCall::Isatty { fd: 9_999 }.encode())
            .await?;
        assert_eq!(reply, b"0");
        Ok(())
    }

    #[tokio::test]
    async fn test_plain_prompt_is_rejected() {
        let mut host = memory_host();
        assert!(host.prompt("ls\n").await.is_err());
    }
}
