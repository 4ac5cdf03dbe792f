//! Command-interpreter core: a shell-like tokenizer, statement parser,
//! alias/shortcut/macro resolver, multiline continuation loop, and output
//! redirection (file, clipboard, and OS pipe) behind a pluggable command
//! registry.

pub mod clipboard;
pub mod context;
pub mod continuation;
pub mod error;
pub mod interpreter;
pub mod macros;
pub mod parser;
pub mod pipes;
pub mod redirect;
pub mod registry;
pub mod statement;
pub mod tokenizer;

pub use context::{ExecutionContext, InterruptState, OutputStream};
pub use continuation::{Collected, ContinuationController, InputSource, QueuedInput, ReadLine, StdinSource};
pub use error::{Error, Result};
pub use interpreter::Interpreter;
pub use macros::Macro;
pub use parser::StatementParser;
pub use registry::{CommandRegistry, Handler};
pub use statement::{ParseOutcome, RedirectMode, Statement};
