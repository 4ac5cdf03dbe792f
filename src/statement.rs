use crate::tokenizer::strip_quotes;

/// Which output redirection operator a statement used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectMode {
    /// No output redirection.
    #[default]
    None,
    /// `>` — overwrite the destination.
    Truncate,
    /// `>>` — append to the destination.
    Append,
}

impl RedirectMode {
    /// The operator text, for reconstructing a command line.
    pub fn operator(self) -> &'static str {
        match self {
            RedirectMode::None => "",
            RedirectMode::Truncate => ">",
            RedirectMode::Append => ">>",
        }
    }
}

/// The immutable result of parsing one logical command line.
///
/// At most one of `pipe_to` and `output` is ever set; the parser enforces
/// this by construction (the first operator encountered consumes the rest of
/// the line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    /// The original input exactly as typed, before any shortcut, alias, or
    /// macro expansion.
    pub raw: String,
    /// The resolved command name. Never empty for a parsed statement.
    pub command: String,
    /// Everything after the command name as typed, quotes still present.
    pub args: String,
    /// Individual argument tokens with quotes preserved.
    pub arg_list: Vec<String>,
    /// Set to `command` when the command accepts multi-line bodies.
    pub multiline_command: String,
    /// The character that terminated the statement, or empty.
    pub terminator: String,
    /// Text after the terminator on the same line, before any operator.
    pub suffix: String,
    /// Shell command the output should be piped to, or empty.
    pub pipe_to: String,
    /// Redirection operator, if any.
    pub output: RedirectMode,
    /// Redirection destination; empty with `output` set means the clipboard.
    pub output_to: String,
}

impl Statement {
    /// Argument vector in unquoted form, with the command at index 0.
    ///
    /// Macro placeholder `{n}` substitutes `argv()[n]`, so the 1-based
    /// placeholder numbers line up with this layout.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.clone())
            .chain(self.arg_list.iter().map(|arg| strip_quotes(arg)))
            .collect()
    }

    /// True when this command was declared multiline-capable.
    pub fn is_multiline(&self) -> bool {
        !self.multiline_command.is_empty()
    }

    /// Reconstruct the trailing portion of the line: terminator, suffix, and
    /// pipe or redirection. Used to carry a macro invocation's trailing
    /// tokens onto the resolved command line.
    pub fn post_command(&self) -> String {
        let mut post = String::new();
        if !self.terminator.is_empty() {
            post.push_str(&self.terminator);
        }
        if !self.suffix.is_empty() {
            post.push(' ');
            post.push_str(&self.suffix);
        }
        if !self.pipe_to.is_empty() {
            post.push_str(" | ");
            post.push_str(&self.pipe_to);
        } else if self.output != RedirectMode::None {
            post.push(' ');
            post.push_str(self.output.operator());
            if !self.output_to.is_empty() {
                post.push(' ');
                post.push_str(&self.output_to);
            }
        }
        post
    }
}

/// The result of parsing one line: either a statement or the distinguished
/// empty outcome (blank input, a bare terminator, or a comment-only line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Statement(Statement),
    Empty,
}
