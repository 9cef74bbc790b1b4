//! Command-line configuration.
//!
//! Bridge settings come from defaults, then an optional JSON file, then
//! flags, each layer overriding the previous one.

use crate::host::is_terminal;
use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use wasibridge_sdk::{BridgeConfig, ExecutionEnvironment};

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// JSON file with bridge settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Largest chunk streamed for prompt replies, in bytes
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Largest chunk streamed for keyboard reads, in bytes
    #[arg(long, value_name = "BYTES")]
    pub keyboard_chunk_size: Option<usize>,

    /// How long the worker waits for a continuation chunk
    #[arg(long, value_name = "MS")]
    pub continuation_timeout_ms: Option<u64>,
}

impl ConfigArgs {
    pub fn bridge_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(size) = self.chunk_size {
            config.release_chunk_size = size;
        }
        if let Some(size) = self.keyboard_chunk_size {
            config.keyboard_chunk_size = size;
        }
        if let Some(ms) = self.continuation_timeout_ms {
            config.continuation_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum TtyMode {
    /// Terminal when stdout is one
    #[default]
    Auto,
    Always,
    Never,
}

impl TtyMode {
    pub fn resolve(self) -> bool {
        match self {
            TtyMode::Auto => is_terminal(1),
            TtyMode::Always => true,
            TtyMode::Never => false,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub bridge: ConfigArgs,

    /// Working directory of the program (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Whether the program sees a terminal
    #[arg(long, value_enum, default_value_t = TtyMode::Auto)]
    pub tty: TtyMode,

    /// Environment variable for the program (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Directory the program may access (repeatable)
    #[arg(long = "dir", value_name = "GUEST=HOST", value_parser = parse_preopen)]
    pub dirs: Vec<(String, PathBuf)>,

    /// Built-in program to run
    pub program: String,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl RunArgs {
    /// Builds the program's environment. `argv[0]` is the program name.
    pub fn environment(&self) -> wasibridge_sdk::Result<ExecutionEnvironment> {
        let mut builder = ExecutionEnvironment::builder(self.program.as_bytes().to_vec())
            .arg(self.program.clone())
            .args(self.args.iter().cloned())
            .envs(self.env.iter().cloned())
            .tty(self.tty.resolve());
        if let Some(cwd) = &self.cwd {
            builder = builder.cwd(cwd);
        }
        for (guest, host) in &self.dirs {
            builder = builder.preopen(guest.clone(), host);
        }
        builder.build()
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, _)) if key.is_empty() => Err(format!("empty variable name in '{s}'")),
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn parse_preopen(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((guest, host)) if !guest.is_empty() && !host.is_empty() => {
            Ok((guest.to_string(), PathBuf::from(host)))
        }
        _ => Err(format!("expected GUEST=HOST, got '{s}'")),
    }
}
