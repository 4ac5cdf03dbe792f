use thiserror::Error;

/// Error type covering parsing, macro, and redirection failures.
///
/// Parsing and redirection errors are reported to the user at the interpreter
/// boundary and never unwind into command handlers. [`Error::Interrupted`] is
/// the one fatal variant, and only when the interpreter is configured to quit
/// on interrupt.
#[derive(Error, Debug)]
pub enum Error {
    /// A quote was opened but never closed. For multiline commands the
    /// continuation loop treats this as "more input needed" rather than a
    /// hard failure.
    #[error("unclosed quotation mark")]
    UnclosedQuote,

    /// Malformed statement syntax, e.g. a pipe with no target.
    #[error("invalid syntax: {0}")]
    Syntax(String),

    /// A command, alias, or macro name that the parser cannot accept.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Dispatch found no handler, alias, or macro under this name.
    #[error("{0} is not a recognized command, alias, or macro")]
    UnknownCommand(String),

    /// A macro was invoked with fewer arguments than its highest placeholder.
    #[error("the macro '{name}' expects at least {required} argument(s)")]
    InsufficientArguments { name: String, required: usize },

    /// Macro creation with non-positive or non-contiguous placeholder numbers.
    #[error("invalid macro argument numbering: {0}")]
    ArgumentNumbering(String),

    /// Output redirection could not be established; the command body did not run.
    #[error("failed to redirect: {0}")]
    Redirection(String),

    /// The system clipboard is unavailable or rejected the operation.
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// An interrupt signal arrived while reading input.
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
