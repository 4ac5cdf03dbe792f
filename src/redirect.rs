use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::mem;

use crate::clipboard;
use crate::context::{ExecutionContext, OutputStream};
use crate::error::{Error, Result};
use crate::pipes::{PipeDestination, PipeProcessReader};
use crate::statement::{RedirectMode, Statement};
use crate::tokenizer::strip_quotes;

/// Everything needed to undo one statement's redirection.
///
/// The previous pipe reader is captured unconditionally and put back by
/// [`end`], so an outer pipe survives an inner command's redirection
/// teardown. The previous output stream is only captured when this statement
/// actually redirected.
#[derive(Debug)]
pub struct RedirectionSavedState {
    output: Option<OutputStream>,
    pipe_reader: Option<PipeProcessReader>,
    redirecting: bool,
    /// Readable handle on the temp file backing a clipboard redirection.
    clipboard_buffer: Option<File>,
}

/// Pick where a new pipe process's stdout should go, based on the stream the
/// interpreter is currently writing to.
fn pipe_destination(current: &OutputStream) -> Result<PipeDestination> {
    match current {
        OutputStream::Stdout => Ok(PipeDestination::Inherit),
        OutputStream::File(file) => {
            let clone = file
                .try_clone()
                .map_err(|e| Error::Redirection(format!("failed to clone output file: {e}")))?;
            Ok(PipeDestination::File(clone))
        }
        OutputStream::Pipe(writer) => {
            let clone = writer
                .try_clone()
                .map_err(|e| Error::Redirection(format!("failed to clone pipe writer: {e}")))?;
            Ok(PipeDestination::Pipe(clone))
        }
        OutputStream::Capture(buffer) => Ok(PipeDestination::Capture(buffer.clone())),
    }
}

/// Apply a statement's pipe or output redirection to the context.
///
/// Returns the state [`end`] needs to restore everything. Statements with no
/// pipe and no redirection, and contexts with redirection disabled, produce
/// a saved state whose restoration is a no-op.
pub fn begin(ctx: &mut ExecutionContext, statement: &Statement) -> Result<RedirectionSavedState> {
    let mut saved = RedirectionSavedState {
        output: None,
        pipe_reader: ctx.pipe_reader.take(),
        redirecting: ctx.is_redirecting(),
        clipboard_buffer: None,
    };

    if !ctx.allow_redirection {
        return Ok(saved);
    }

    let outcome = if !statement.pipe_to.is_empty() {
        begin_pipe(ctx, statement, &mut saved)
    } else if statement.output != RedirectMode::None {
        if statement.output_to.is_empty() {
            begin_clipboard(ctx, statement, &mut saved)
        } else {
            begin_file(ctx, statement, &mut saved)
        }
    } else {
        Ok(())
    };

    match outcome {
        Ok(()) => Ok(saved),
        Err(e) => {
            // Leave the context exactly as we found it.
            ctx.pipe_reader = saved.pipe_reader.take();
            Err(e)
        }
    }
}

fn begin_pipe(
    ctx: &mut ExecutionContext,
    statement: &Statement,
    saved: &mut RedirectionSavedState,
) -> Result<()> {
    let (reader, writer) =
        os_pipe::pipe().map_err(|e| Error::Redirection(format!("failed to create pipe: {e}")))?;

    let destination = pipe_destination(&ctx.output)?;
    let mut process = PipeProcessReader::spawn(&statement.pipe_to, reader, destination)?;

    if let Err(e) = process.wait_for_startup() {
        // Reap the dead child before reporting the failure.
        drop(writer);
        let _ = process.wait();
        return Err(e);
    }

    tracing::debug!(pipe_to = %statement.pipe_to, pid = process.pid(), "pipe process started");
    ctx.interrupts().set_pipe_child(Some(process.pid()));
    saved.output = Some(mem::replace(&mut ctx.output, OutputStream::Pipe(writer)));
    ctx.pipe_reader = Some(process);
    ctx.redirecting = true;
    Ok(())
}

fn begin_file(
    ctx: &mut ExecutionContext,
    statement: &Statement,
    saved: &mut RedirectionSavedState,
) -> Result<()> {
    let target = strip_quotes(&statement.output_to);
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(statement.output == RedirectMode::Truncate)
        .append(statement.output == RedirectMode::Append)
        .open(&target)
        .map_err(|e| Error::Redirection(format!("failed to redirect to '{target}': {e}")))?;

    tracing::debug!(target = %target, mode = ?statement.output, "output redirected to file");
    saved.output = Some(mem::replace(&mut ctx.output, OutputStream::File(file)));
    ctx.redirecting = true;
    Ok(())
}

fn begin_clipboard(
    ctx: &mut ExecutionContext,
    statement: &Statement,
    saved: &mut RedirectionSavedState,
) -> Result<()> {
    if !clipboard::available() {
        return Err(Error::Clipboard(
            "cannot redirect to the clipboard: no clipboard is available in this session"
                .to_string(),
        ));
    }

    let mut file = tempfile::tempfile()
        .map_err(|e| Error::Redirection(format!("failed to create clipboard buffer: {e}")))?;
    if statement.output == RedirectMode::Append {
        file.write_all(clipboard::read()?.as_bytes())
            .map_err(Error::Io)?;
    }
    let readable = file
        .try_clone()
        .map_err(|e| Error::Redirection(format!("failed to clone clipboard buffer: {e}")))?;

    saved.clipboard_buffer = Some(readable);
    saved.output = Some(mem::replace(&mut ctx.output, OutputStream::File(file)));
    ctx.redirecting = true;
    Ok(())
}

/// Undo [`begin`]: flush and close the redirected stream, wait for any pipe
/// process this statement started, publish a clipboard buffer, and restore
/// the previous stream and pipe reader.
pub fn end(ctx: &mut ExecutionContext, mut saved: RedirectionSavedState) -> Result<()> {
    let mut result = Ok(());

    if let Some(previous) = saved.output.take() {
        // Flush before the stream is dropped; dropping the pipe write end is
        // what lets the pipe process see end-of-input and exit.
        let _ = ctx.flush();
        let redirected = mem::replace(&mut ctx.output, previous);
        drop(redirected);

        if let Some(mut process) = ctx.pipe_reader.take() {
            match process.wait() {
                Ok(status) => {
                    tracing::debug!(?status, "pipe process finished");
                }
                Err(e) => result = Err(e),
            }
        }

        if let Some(mut buffer) = saved.clipboard_buffer.take() {
            let publish = (|| -> Result<()> {
                buffer.seek(SeekFrom::Start(0)).map_err(Error::Io)?;
                let mut text = String::new();
                buffer.read_to_string(&mut text).map_err(Error::Io)?;
                clipboard::write(&text)
            })();
            if result.is_ok() {
                result = publish;
            }
        }
    }

    ctx.pipe_reader = saved.pipe_reader.take();
    ctx.redirecting = saved.redirecting;
    // Interrupt forwarding falls back to the enclosing pipe, if any.
    ctx.interrupts()
        .set_pipe_child(ctx.pipe_reader.as_ref().map(|p| p.pid()));
    result
}
