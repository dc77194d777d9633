//! Subprocess execution
//!
//! Every external program the manager touches (`docker`, `docker-compose`,
//! `tar`) goes through the [`Runner`] trait so command sequences can be
//! exercised against a scripted runner in tests.

use std::{
    fmt,
    io::{self, Write},
    path::PathBuf,
    process::{self, Command, Stdio},
    sync::{
        Mutex, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, trace, warn};

/// A program invocation: program, arguments and working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
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

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Exit code and captured streams of a finished process.
///
/// Attached runs leave `stdout` and `stderr` empty since they went to the
/// terminal. `code` is `None` when the process was killed by a signal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Non-empty trimmed stdout lines
    pub fn stdout_lines(&self) -> Vec<String> {
        self.stdout_text()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Turn a non-zero exit into [`CommandError::Failed`]
    pub fn checked(self, cmd: &CommandSpec) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                command: cmd.to_string(),
                code: self.code,
                stderr: self.stderr_text().trim().to_string(),
            })
        }
    }
}

/// Failures at the process boundary
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command not found: {program} (make sure Docker and Docker Compose are installed)")]
    NotFound { program: String },

    #[error("failed to run `{command}`")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed with {}{}", exit_label(.code), stderr_suffix(.stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "a signal".to_string(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Executes [`CommandSpec`]s
pub trait Runner {
    /// Run attached to the terminal (inherited stdio).
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Run with stdout and stderr captured.
    fn capture(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Run with stdout and stderr captured, feeding `input` on stdin.
    fn capture_with_input(
        &self,
        cmd: &CommandSpec,
        input: &[u8],
    ) -> Result<CommandOutput, CommandError>;
}

/// Exit code when Ctrl-C arrives with no attached child
const INTERRUPTED_EXIT: i32 = 130;

/// Ctrl-C arriving this soon after an attached child exits still belongs to it
const DETACH_GRACE: Duration = Duration::from_millis(500);

static ATTACHED: AtomicBool = AtomicBool::new(false);
static DETACHED_AT: Mutex<Option<Instant>> = Mutex::new(None);
static INTERRUPT_HANDLER: Once = Once::new();

fn recently_detached() -> bool {
    match DETACHED_AT.lock() {
        Ok(at) => at.is_some_and(|at| at.elapsed() < DETACH_GRACE),
        Err(_) => false,
    }
}

/// Install the SIGINT handler once per process.
///
/// An attached child shares the terminal's process group, so it receives
/// Ctrl-C itself and reports it through its exit code. Without one the
/// manager exits the way the default handler would.
fn install_interrupt_handler() {
    INTERRUPT_HANDLER.call_once(|| {
        let result = ctrlc::set_handler(|| {
            if ATTACHED.load(Ordering::SeqCst) || recently_detached() {
                debug!("interrupt left to the attached command");
                return;
            }
            process::exit(INTERRUPTED_EXIT);
        });
        if let Err(e) = result {
            warn!(error = %e, "could not install Ctrl-C handler");
        }
    });
}

/// Marks an attached child as running until dropped
struct AttachedGuard;

impl AttachedGuard {
    fn enter() -> Self {
        install_interrupt_handler();
        ATTACHED.store(true, Ordering::SeqCst);
        Self
    }
}

impl Drop for AttachedGuard {
    fn drop(&mut self) {
        if let Ok(mut at) = DETACHED_AT.lock() {
            *at = Some(Instant::now());
        }
        ATTACHED.store(false, Ordering::SeqCst);
    }
}

/// [`Runner`] backed by `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn spawn_error(cmd: &CommandSpec, source: io::Error) -> CommandError {
        if source.kind() == io::ErrorKind::NotFound {
            CommandError::NotFound {
                program: cmd.program.clone(),
            }
        } else {
            CommandError::Io {
                command: cmd.to_string(),
                source,
            }
        }
    }
}

impl Runner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %cmd, cwd = ?cmd.cwd, "running attached");
        let _attached = AttachedGuard::enter();
        let status = cmd
            .to_command()
            .status()
            .map_err(|e| Self::spawn_error(cmd, e))?;
        debug!(code = ?status.code(), "command finished");

        Ok(CommandOutput {
            code: status.code(),
            ..Default::default()
        })
    }

    fn capture(&self, cmd: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %cmd, cwd = ?cmd.cwd, "running captured");
        let output = cmd
            .to_command()
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Self::spawn_error(cmd, e))?;
        debug!(code = ?output.status.code(), "command finished");
        trace!(stderr = %String::from_utf8_lossy(&output.stderr), "captured stderr");

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn capture_with_input(
        &self,
        cmd: &CommandSpec,
        input: &[u8],
    ) -> Result<CommandOutput, CommandError> {
        debug!(command = %cmd, bytes = input.len(), "running with stdin input");
        let mut child = cmd
            .to_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::spawn_error(cmd, e))?;

        // Feed stdin from a separate thread so a chatty child cannot fill
        // its stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            let data = input.to_vec();
            thread::spawn(move || stdin.write_all(&data))
        });

        let output = child.wait_with_output().map_err(|source| CommandError::Io {
            command: cmd.to_string(),
            source,
        })?;

        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                // The child may exit before consuming everything; its exit
                // code carries the real failure.
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(source)) => {
                    return Err(CommandError::Io {
                        command: cmd.to_string(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(CommandError::Io {
                        command: cmd.to_string(),
                        source: io::Error::other("stdin writer thread panicked"),
                    });
                }
            }
        }
        debug!(code = ?output.status.code(), "command finished");

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{fail, ok};
    use super::*;

    #[test]
    fn test_display_quotes_whitespace_args() {
        let cmd = CommandSpec::new("docker")
            .args(["compose", "exec", "-T", "postgres", "psql", "-c"])
            .arg("SELECT 1;");

        assert_eq!(
            cmd.to_string(),
            "docker compose exec -T postgres psql -c 'SELECT 1;'"
        );
    }

    #[test]
    fn test_checked_failure_carries_stderr() {
        let cmd = CommandSpec::new("docker").arg("info");
        let err = fail(1, "Cannot connect to the Docker daemon\n")
            .checked(&cmd)
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("docker info"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Cannot connect to the Docker daemon"));
    }

    #[test]
    fn test_stdout_lines_skips_blanks() {
        let output = ok("postgres\n\n  odoo  \n");
        assert_eq!(output.stdout_lines(), vec!["postgres", "odoo"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_attached_run_survives_interrupt() {
        // The child interrupts this test process the way a terminal Ctrl-C would
        let cmd = CommandSpec::new("sh").args(["-c", "kill -INT $PPID; sleep 1; exit 130"]);

        let output = SystemRunner.run(&cmd).unwrap();

        assert_eq!(output.code, Some(130));
    }

    #[test]
    fn test_system_runner_reports_missing_program() {
        let cmd = CommandSpec::new("odm-definitely-not-a-real-program");
        let err = SystemRunner.capture(&cmd).unwrap_err();
        assert!(matches!(err, CommandError::NotFound { .. }));
    }
}
