//! Small programs compiled into the runner.
//!
//! They stand in for a bytecode engine when exercising the bridge end to end:
//! the program bytes are the program's name.

use crate::engine::{EngineFault, ExecutionEngine, GuestIo, RunResult};
use wasibridge_sdk::ExecutionEnvironment;

const STDIN: u32 = 0;
const STDOUT: u32 = 1;
const STDERR: u32 = 2;

/// Size of each keyboard read issued by `cat`.
const READ_SIZE: usize = 4096;

pub const PROGRAMS: &[&str] = &["cat", "echo", "env", "false", "pwd", "tty"];

#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinEngine;

impl ExecutionEngine for BuiltinEngine {
    fn run(&mut self, env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult {
        let name = std::str::from_utf8(env.program())
            .map_err(|_| EngineFault::trap("program name is not valid UTF-8"))?;
        match name {
            "cat" => cat(io),
            "echo" => echo(env, io),
            "env" => print_env(env, io),
            "false" => Err(EngineFault::Exit {
                code: 1,
                message: String::new(),
            }),
            "pwd" => pwd(env, io),
            "tty" => tty(io),
            other => Err(EngineFault::trap(format!("unknown builtin program '{other}'"))),
        }
    }
}

fn write_all(io: &mut dyn GuestIo, fd: u32, mut data: &[u8]) -> Result<(), EngineFault> {
    while !data.is_empty() {
        let n = io.write(fd, data)?;
        if n == 0 {
            return Err(EngineFault::Exit {
                code: 1,
                message: "write returned zero bytes".into(),
            });
        }
        data = &data[n.min(data.len())..];
    }
    Ok(())
}

fn cat(io: &mut dyn GuestIo) -> RunResult {
    let mut buf = vec![0u8; READ_SIZE];
    loop {
        let n = io.read(&mut buf)?;
        if n == 0 {
            return Ok(0);
        }
        write_all(io, STDOUT, &buf[..n])?;
    }
}

fn echo(env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult {
    let mut line = env.args().iter().skip(1).cloned().collect::<Vec<_>>().join(" ");
    line.push('\n');
    write_all(io, STDOUT, line.as_bytes())?;
    Ok(0)
}

fn print_env(env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult {
    let mut out = String::new();
    for (key, value) in env.env() {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    write_all(io, STDOUT, out.as_bytes())?;
    Ok(0)
}

fn pwd(env: &ExecutionEnvironment, io: &mut dyn GuestIo) -> RunResult {
    let line = format!("{}\n", env.cwd().display());
    write_all(io, STDOUT, line.as_bytes())?;
    Ok(0)
}

fn tty(io: &mut dyn GuestIo) -> RunResult {
    let stdin = io.isatty(STDIN);
    let stdout = io.isatty(STDOUT);
    write_all(io, STDOUT, format!("stdin: {stdin}\nstdout: {stdout}\n").as_bytes())?;
    if stdin {
        Ok(0)
    } else {
        write_all(io, STDERR, b"not a tty\n")?;
        Err(EngineFault::Exit {
            code: 1,
            message: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasibridge_sdk::{Error, Result};

    /// In-memory stand-in for the bridge.
    #[derive(Default)]
    struct FakeIo {
        input: Vec<u8>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        tty: bool,
    }

    impl GuestIo for FakeIo {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let n = buf.len().min(self.input.len());
            buf[..n].copy_from_slice(&self.input[..n]);
            self.input.drain(..n);
            Ok(n)
        }

        fn write(&mut self, fd: u32, data: &[u8]) -> Result<usize> {
            match fd {
                STDOUT => self.stdout.extend_from_slice(data),
                STDERR => self.stderr.extend_from_slice(data),
                _ => {
                    return Err(Error::HostCall {
                        call: "write",
                        reason: "bad fd".into(),
                    })
                }
            }
            Ok(data.len())
        }

        fn isatty(&mut self, _fd: u32) -> bool {
            self.tty
        }

        fn prompt(&mut self, _text: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn env(program: &str, args: &[&str]) -> ExecutionEnvironment {
        ExecutionEnvironment::builder(program.as_bytes().to_vec())
            .args(args.iter().copied())
            .env("B", "2")
            .env("A", "1")
            .cwd(std::env::temp_dir())
            .build()
            .unwrap()
    }

    #[test]
    fn test_cat_copies_input() {
        let mut io = FakeIo {
            input: "ünïcödé\n".repeat(1000).into_bytes(),
            ..Default::default()
        };
        let expected = io.input.clone();
        assert_eq!(BuiltinEngine.run(&env("cat", &["cat"]), &mut io).unwrap(), 0);
        assert_eq!(io.stdout, expected);
    }

    #[test]
    fn test_echo_joins_arguments() {
        let mut io = FakeIo::default();
        BuiltinEngine
            .run(&env("echo", &["echo", "hello", "world"]), &mut io)
            .unwrap();
        assert_eq!(io.stdout, b"hello world\n");
    }

    #[test]
    fn test_env_is_sorted() {
        let mut io = FakeIo::default();
        BuiltinEngine.run(&env("env", &["env"]), &mut io).unwrap();
        assert_eq!(io.stdout, b"A=1\nB=2\n");
    }

    #[test]
    fn test_pwd_prints_cwd() {
        let mut io = FakeIo::default();
        let env = env("pwd", &["pwd"]);
        BuiltinEngine.run(&env, &mut io).unwrap();
        assert_eq!(io.stdout, format!("{}\n", env.cwd().display()).into_bytes());
    }

    #[test]
    fn test_tty_reports_terminal() {
        let mut io = FakeIo {
            tty: true,
            ..Default::default()
        };
        assert_eq!(BuiltinEngine.run(&env("tty", &["tty"]), &mut io).unwrap(), 0);
        assert_eq!(io.stdout, b"stdin: true\nstdout: true\n");

        let mut io = FakeIo::default();
        let fault = BuiltinEngine.run(&env("tty", &["tty"]), &mut io).unwrap_err();
        assert_eq!(fault.into_termination().code, 1);
        assert_eq!(io.stderr, b"not a tty\n");
    }

    #[test]
    fn test_false_and_unknown() {
        let mut io = FakeIo::default();
        let fault = BuiltinEngine.run(&env("false", &[]), &mut io).unwrap_err();
        assert_eq!(fault.into_termination().code, 1);

        let fault = BuiltinEngine.run(&env("ls", &[]), &mut io).unwrap_err();
        let termination = fault.into_termination();
        assert_eq!(termination.code, 1);
        assert_eq!(termination.message, "wasm: unknown builtin program 'ls'");
    }

    #[test]
    fn test_every_listed_program_runs() {
        for &name in PROGRAMS {
            let mut io = FakeIo {
                tty: true,
                ..Default::default()
            };
            let result = BuiltinEngine.run(&env(name, &[name]), &mut io);
            if let Err(EngineFault::Trap(msg)) = result {
                panic!("{name} trapped: {msg}");
            }
        }
    }
}
