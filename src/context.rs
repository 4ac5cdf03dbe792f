use std::fs::File;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// Where command output currently goes.
///
/// Commands never write to stdout directly; they write through the
/// [`ExecutionContext`], which holds one of these. Redirection swaps the
/// stream and restores it afterwards.
#[derive(Debug)]
pub enum OutputStream {
    /// The process's own stdout.
    Stdout,
    /// An open file (`>` or `>>` with a target).
    File(File),
    /// The write end of an OS pipe feeding a shell command.
    Pipe(os_pipe::PipeWriter),
    /// An in-memory buffer, used for clipboard redirection and tests.
    Capture(Arc<Mutex<Vec<u8>>>),
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Stdout => io::stdout().write(buf),
            OutputStream::File(f) => f.write(buf),
            OutputStream::Pipe(w) => w.write(buf),
            OutputStream::Capture(buffer) => {
                let mut guard = match buffer.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                guard.extend_from_slice(buf);
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Stdout => io::stdout().flush(),
            OutputStream::File(f) => f.flush(),
            OutputStream::Pipe(w) => w.flush(),
            OutputStream::Capture(_) => Ok(()),
        }
    }
}

/// Shared interrupt state, safe to touch from a signal handler thread.
///
/// When a pipe child process is registered, an interrupt is forwarded to that
/// child's process group instead of being recorded locally, so Ctrl-C stops
/// the pipeline rather than the interpreter. The protection counter lets
/// critical sections (redirection setup and teardown) defer interrupts.
pub struct InterruptState {
    pending: AtomicBool,
    protection: AtomicUsize,
    /// Process id of the most recent pipe child, or 0 when none is running.
    pipe_child: AtomicI64,
}

impl InterruptState {
    pub fn new() -> Arc<InterruptState> {
        Arc::new(InterruptState {
            pending: AtomicBool::new(false),
            protection: AtomicUsize::new(0),
            pipe_child: AtomicI64::new(0),
        })
    }

    /// Record an interrupt. Called from the Ctrl-C handler thread.
    pub fn handle_interrupt(&self) {
        let pid = self.pipe_child.load(Ordering::SeqCst);
        if pid > 0 {
            #[cfg(unix)]
            // The child was spawned in its own process group; signal the
            // whole group.
            unsafe {
                libc::kill(-(pid as libc::pid_t), libc::SIGINT);
            }
            return;
        }
        if self.protection.load(Ordering::SeqCst) == 0 {
            self.pending.store(true, Ordering::SeqCst);
        }
    }

    /// Consume a pending interrupt, returning whether one had arrived.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Register or clear the pipe child that interrupts should be forwarded
    /// to. Only the most recently registered child receives the signal.
    pub fn set_pipe_child(&self, pid: Option<u32>) {
        self.pipe_child
            .store(pid.map_or(0, i64::from), Ordering::SeqCst);
    }

    /// Defer interrupts for the lifetime of the returned guard.
    pub fn protect(self: &Arc<InterruptState>) -> InterruptGuard {
        self.protection.fetch_add(1, Ordering::SeqCst);
        InterruptGuard {
            state: Arc::clone(self),
        }
    }
}

/// RAII handle from [`InterruptState::protect`]. While any guard is alive,
/// interrupts are dropped instead of recorded.
pub struct InterruptGuard {
    state: Arc<InterruptState>,
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.state.protection.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-interpreter execution state handed to every command handler.
///
/// Holds the current output stream, the redirection bookkeeping flags, and
/// the shared interrupt state.
pub struct ExecutionContext {
    pub(crate) output: OutputStream,
    /// When false, statements carrying pipes or redirection are rejected.
    pub allow_redirection: bool,
    /// True while output is redirected away from stdout.
    pub(crate) redirecting: bool,
    /// Reader side of the active pipe child, if any.
    pub(crate) pipe_reader: Option<crate::pipes::PipeProcessReader>,
    broken_pipe_warned: bool,
    interrupts: Arc<InterruptState>,
}

impl ExecutionContext {
    pub fn new(interrupts: Arc<InterruptState>) -> Self {
        ExecutionContext {
            output: OutputStream::Stdout,
            allow_redirection: true,
            redirecting: false,
            pipe_reader: None,
            broken_pipe_warned: false,
            interrupts,
        }
    }

    /// Context whose output lands in a shared buffer. Used by tests and by
    /// embedders that want to capture command output.
    pub fn capturing(interrupts: Arc<InterruptState>) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ExecutionContext::new(interrupts);
        ctx.output = OutputStream::Capture(Arc::clone(&buffer));
        (ctx, buffer)
    }

    pub fn interrupts(&self) -> &Arc<InterruptState> {
        &self.interrupts
    }

    pub fn is_redirecting(&self) -> bool {
        self.redirecting
    }

    /// Write text to the current output stream.
    ///
    /// A broken pipe means the pipe process exited before reading everything;
    /// that is normal (`head`, for instance) and further output is silently
    /// discarded after a single warning.
    pub fn write(&mut self, text: &str) -> Result<()> {
        if let Err(e) = self.output.write_all(text.as_bytes()) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                if !self.broken_pipe_warned {
                    self.broken_pipe_warned = true;
                    tracing::warn!("pipe process closed its input; discarding further output");
                }
                return Ok(());
            }
            return Err(Error::Io(e));
        }
        Ok(())
    }

    pub fn writeln(&mut self, text: &str) -> Result<()> {
        self.write(text)?;
        self.write("\n")
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.output.flush() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Write an error message. Errors always go to stderr, never into a
    /// redirection target.
    pub fn error(&mut self, text: &str) {
        eprintln!("{text}");
    }

    /// Fail with [`Error::Interrupted`] if an interrupt arrived. Long-running
    /// handlers call this between units of work.
    pub fn check_interrupt(&self) -> Result<()> {
        if self.interrupts.take_pending() {
            return Err(Error::Interrupted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn capture_stream_collects_writes() {
        let (mut ctx, buffer) = ExecutionContext::capturing(InterruptState::new());
        ctx.write("hello ").unwrap();
        ctx.writeln("world").unwrap();
        assert_eq!(captured(&buffer), "hello world\n");
    }

    #[cfg(unix)]
    #[test]
    fn broken_pipe_writes_are_recovered_silently() {
        let (reader, writer) = os_pipe::pipe().unwrap();
        drop(reader);

        let mut ctx = ExecutionContext::new(InterruptState::new());
        ctx.output = OutputStream::Pipe(writer);

        assert!(ctx.writeln("into the void").is_ok());
        assert!(ctx.writeln("still fine").is_ok());
        assert!(ctx.flush().is_ok());
    }

    #[test]
    fn interrupt_is_recorded_and_consumed_once() {
        let state = InterruptState::new();
        assert!(!state.take_pending());
        state.handle_interrupt();
        assert!(state.is_pending());
        assert!(state.take_pending());
        assert!(!state.take_pending());
    }

    #[test]
    fn protection_defers_interrupts() {
        let state = InterruptState::new();
        {
            let _guard = state.protect();
            state.handle_interrupt();
            assert!(!state.is_pending());
        }
        state.handle_interrupt();
        assert!(state.is_pending());
    }

    #[test]
    fn nested_protection_counts() {
        let state = InterruptState::new();
        let outer = state.protect();
        {
            let _inner = state.protect();
        }
        state.handle_interrupt();
        assert!(!state.is_pending());
        drop(outer);
        state.handle_interrupt();
        assert!(state.is_pending());
    }

    #[test]
    fn check_interrupt_surfaces_pending_signal() {
        let (ctx, _buffer) = ExecutionContext::capturing(InterruptState::new());
        assert!(ctx.check_interrupt().is_ok());
        ctx.interrupts().handle_interrupt();
        assert!(matches!(ctx.check_interrupt(), Err(Error::Interrupted)));
        assert!(ctx.check_interrupt().is_ok());
    }
}
