//! Execution environment handed to the worker at spawn time.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Immutable snapshot of everything a sandboxed program starts with.
#[derive(Debug, Clone)]
pub struct ExecutionEnvironment {
    program: Arc<[u8]>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: PathBuf,
    tty: bool,
    preopens: BTreeMap<String, PathBuf>,
}

impl ExecutionEnvironment {
    pub fn builder(program: impl Into<Vec<u8>>) -> ExecutionEnvironmentBuilder {
        ExecutionEnvironmentBuilder::new(program)
    }

    pub fn program(&self) -> &[u8] {
        &self.program
    }

    /// Positional arguments, `argv[0]` included.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Whether the program should see its standard streams as a terminal.
    pub fn tty(&self) -> bool {
        self.tty
    }

    /// Guest path -> host directory the program may access.
    pub fn preopens(&self) -> &BTreeMap<String, PathBuf> {
        &self.preopens
    }
}

/// Collects the pieces of an [`ExecutionEnvironment`] and validates them once.
#[derive(Debug, Clone)]
pub struct ExecutionEnvironmentBuilder {
    program: Vec<u8>,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    tty: bool,
    preopens: Vec<(String, PathBuf)>,
}

impl ExecutionEnvironmentBuilder {
    pub fn new(program: impl Into<Vec<u8>>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            tty: false,
            preopens: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Grants the program access to `host` under the guest path `guest`.
    pub fn preopen(mut self, guest: impl Into<String>, host: impl Into<PathBuf>) -> Self {
        self.preopens.push((guest.into(), host.into()));
        self
    }

    /// Validates the working directory and preopens.
    ///
    /// Without explicit preopens the program gets `.` mapped to the working
    /// directory and `/` mapped to the host root.
    pub fn build(self) -> Result<ExecutionEnvironment> {
        let requested = match self.cwd {
            Some(cwd) => cwd,
            None => std::env::current_dir().map_err(|e| Error::InvalidWorkingDirectory {
                path: PathBuf::from("."),
                reason: e.to_string(),
            })?,
        };
        let cwd = requested
            .canonicalize()
            .map_err(|e| Error::InvalidWorkingDirectory {
                path: requested.clone(),
                reason: e.to_string(),
            })?;
        if !cwd.is_dir() {
            return Err(Error::InvalidWorkingDirectory {
                path: requested,
                reason: "not a directory".into(),
            });
        }

        let requested_preopens = if self.preopens.is_empty() {
            vec![(".".to_string(), cwd.clone()), ("/".to_string(), PathBuf::from("/"))]
        } else {
            self.preopens
        };

        let mut preopens = BTreeMap::new();
        for (guest, host) in requested_preopens {
            if guest.is_empty() {
                return Err(Error::InvalidPreopen {
                    guest,
                    host,
                    reason: "guest path is empty".into(),
                });
            }
            let host = if host.is_relative() {
                cwd.join(&host)
            } else {
                host
            };
            if !host.is_dir() {
                return Err(Error::InvalidPreopen {
                    guest,
                    host,
                    reason: "not a directory".into(),
                });
            }
            preopens.insert(guest, host);
        }

        Ok(ExecutionEnvironment {
            program: self.program.into(),
            args: self.args,
            env: self.env,
            cwd,
            tty: self.tty,
            preopens,
        })
    }
}
