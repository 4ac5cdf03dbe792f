use std::fs::File;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// How long to watch a freshly spawned pipe process for an immediate
/// failure, and how often to poll while watching.
const STARTUP_WINDOW: Duration = Duration::from_millis(200);
const STARTUP_POLL: Duration = Duration::from_millis(10);

/// Where the pipe process's own stdout should go.
///
/// Normally it inherits the interpreter's stdout, but when a pipe statement
/// runs inside an outer redirection the process must write to the outer
/// target instead.
pub enum PipeDestination {
    Inherit,
    File(File),
    Pipe(os_pipe::PipeWriter),
    Capture(Arc<Mutex<Vec<u8>>>),
}

/// A spawned shell process consuming redirected command output through an OS
/// pipe.
///
/// The process runs in its own process group so an interrupt can be
/// forwarded to it (and anything it spawned) without also hitting the
/// interpreter.
#[derive(Debug)]
pub struct PipeProcessReader {
    child: Child,
    forwarder: Option<JoinHandle<()>>,
}

fn shell_command(pipe_to: &str) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(pipe_to);
        command
    }
    #[cfg(not(unix))]
    {
        let mut command = Command::new("cmd");
        command.args(["/C", pipe_to]);
        command
    }
}

impl PipeProcessReader {
    /// Spawn `pipe_to` as a shell command reading from `stdin`, with its
    /// stdout wired to `destination`.
    pub fn spawn(
        pipe_to: &str,
        stdin: os_pipe::PipeReader,
        destination: PipeDestination,
    ) -> Result<PipeProcessReader> {
        let mut command = shell_command(pipe_to);
        command.stdin(stdin);

        let mut capture = None;
        match destination {
            PipeDestination::Inherit => {}
            PipeDestination::File(file) => {
                command.stdout(file);
            }
            PipeDestination::Pipe(writer) => {
                command.stdout(writer);
            }
            PipeDestination::Capture(buffer) => {
                command.stdout(Stdio::piped());
                capture = Some(buffer);
            }
        }

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Redirection(format!("failed to spawn pipe process: {e}")))?;

        // Drain captured stdout on a thread so the child never blocks on a
        // full pipe buffer.
        let forwarder = match (capture, child.stdout.take()) {
            (Some(buffer), Some(mut stdout)) => Some(thread::spawn(move || {
                let mut chunk = [0u8; 8192];
                loop {
                    match stdout.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let mut guard = match buffer.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            guard.extend_from_slice(&chunk[..n]);
                        }
                    }
                }
            })),
            _ => None,
        };

        Ok(PipeProcessReader { child, forwarder })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Watch the process briefly after spawn. A command that fails to start
    /// (`sh` reports command-not-found by exiting non-zero) is caught here,
    /// before the interpreter runs the left side of the pipe for nothing. A
    /// process that exits cleanly inside the window is not an error.
    pub fn wait_for_startup(&mut self) -> Result<()> {
        let deadline = Instant::now() + STARTUP_WINDOW;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        return Ok(());
                    }
                    return Err(Error::Redirection(format!(
                        "pipe process exited before reading any input ({status})"
                    )));
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return Ok(());
                    }
                    thread::sleep(STARTUP_POLL);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Wait for the process to exit and for any capture forwarder to finish.
    /// The caller must drop the write end of the pipe first or this blocks
    /// forever.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().map_err(Error::Io)?;
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.join();
        }
        Ok(status)
    }
}
