use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Read;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wasibridge::sandbox::KeyboardSender;
use wasibridge::{spawn_invocation, ConfigArgs, KeyboardEvent, RunArgs, TerminalHost};
use wasibridge_sandbox::{builtin, BuiltinEngine};

/// Run sandboxed programs through a synchronous I/O bridge
#[derive(Parser, Debug)]
#[command(name = "wasibridge")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a built-in program
    Run(RunArgs),
    /// Print the effective bridge configuration as JSON
    Config(ConfigArgs),
    /// List the built-in programs
    Programs,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let code = run(args).await?;
            std::process::exit(code);
        }
        Command::Config(args) => {
            let config = args.bridge_config()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Programs => {
            for name in builtin::PROGRAMS {
                println!("{name}");
            }
        }
    }
    Ok(())
}

async fn run(args: RunArgs) -> Result<i32> {
    let config = args.bridge.bridge_config()?;
    let env = args.environment()?;

    let invocation = spawn_invocation(
        BuiltinEngine,
        env,
        TerminalHost::new(),
        config,
        |termination| debug!(code = termination.code, "termination delivered"),
    )?;
    spawn_stdin_reader(invocation.keyboard_sender())?;

    let termination = invocation.wait().await;
    if !termination.message.is_empty() {
        eprintln!("{}", termination.message);
    }
    Ok(termination.code)
}

/// Feeds stdin into the keyboard accumulator until end of input.
fn spawn_stdin_reader(keyboard: KeyboardSender) -> Result<()> {
    std::thread::Builder::new()
        .name("wasibridge-stdin".into())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 4096];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if keyboard.send(KeyboardEvent::Input(buf[..n].to_vec())).is_err() {
                            return;
                        }
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(%err, "stdin read failed");
                        break;
                    }
                }
            }
            let _ = keyboard.send(KeyboardEvent::Closed);
        })?;
    Ok(())
}
