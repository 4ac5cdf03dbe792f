use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;

use crate::context::InterruptState;
use crate::error::{Error, Result};
use crate::parser::StatementParser;
use crate::statement::{ParseOutcome, Statement};

/// One read from an input front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A line of text, without its trailing newline.
    Line(String),
    /// End of input.
    Eof,
    /// An interrupt signal arrived while waiting for input.
    Interrupted,
}

/// Source of raw input lines: an interactive prompt, a script file, or an
/// in-memory harness. The core treats all of them uniformly.
pub trait InputSource {
    fn next_line(&mut self, prompt: &str) -> io::Result<ReadLine>;
}

/// The result of collecting one complete statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collected {
    Statement(Statement),
    /// Blank input, or a statement discarded by an interrupt.
    Empty,
}

/// Drives the "keep reading lines until the statement is complete" loop.
///
/// A multiline command keeps collecting until a terminator appears and all
/// quotes are balanced. The accumulated text is retained newline-joined so a
/// completion subsystem can reconstruct what has been typed so far.
pub struct ContinuationController {
    quit_on_interrupt: bool,
    in_progress: Option<String>,
}

impl ContinuationController {
    pub fn new(quit_on_interrupt: bool) -> Self {
        ContinuationController {
            quit_on_interrupt,
            in_progress: None,
        }
    }

    /// The text accumulated so far for an incomplete statement, or `None`
    /// when no continuation is in progress.
    pub fn in_progress(&self) -> Option<&str> {
        self.in_progress.as_deref()
    }

    pub fn set_quit_on_interrupt(&mut self, quit: bool) {
        self.quit_on_interrupt = quit;
    }

    pub fn quit_on_interrupt(&self) -> bool {
        self.quit_on_interrupt
    }

    /// Collect one complete statement starting from `first_line`, requesting
    /// continuation lines from `source` as needed.
    pub fn collect(
        &mut self,
        parser: &StatementParser,
        source: &mut dyn InputSource,
        first_line: &str,
        prompt: &str,
    ) -> Result<Collected> {
        let mut line = first_line.to_string();
        let mut saw_eof = false;

        loop {
            match parser.parse(&line) {
                Ok(ParseOutcome::Empty) => {
                    self.in_progress = None;
                    return Ok(Collected::Empty);
                }
                Ok(ParseOutcome::Statement(statement)) => {
                    if !statement.is_multiline() || !statement.terminator.is_empty() {
                        self.in_progress = None;
                        return Ok(Collected::Statement(statement));
                    }
                    // A multiline command with no terminator yet.
                }
                Err(Error::UnclosedQuote) => {
                    // Unclosed quotes keep a multiline command collecting;
                    // anything else is a hard parse failure.
                    if !parser.parse_command_only(&line).is_multiline() {
                        self.in_progress = None;
                        return Err(Error::UnclosedQuote);
                    }
                }
                Err(err) => {
                    self.in_progress = None;
                    return Err(err);
                }
            }

            self.in_progress = Some(format!("{line}\n"));

            match source.next_line(prompt)? {
                ReadLine::Line(next) => {
                    saw_eof = false;
                    line = format!("{line}\n{next}");
                }
                ReadLine::Eof => {
                    if saw_eof {
                        // Input is exhausted and the statement still cannot
                        // complete: an unclosed quote with nothing left to
                        // close it.
                        self.in_progress = None;
                        return Err(Error::UnclosedQuote);
                    }
                    saw_eof = true;
                    // End of input acts as an implicit blank line, which can
                    // terminate a quote-balanced statement.
                    line.push('\n');
                }
                ReadLine::Interrupted => {
                    self.in_progress = None;
                    if self.quit_on_interrupt {
                        return Err(Error::Interrupted);
                    }
                    return Ok(Collected::Empty);
                }
            }
        }
    }
}

/// Interactive input source reading from stdin, printing the prompt to
/// stdout. Reports a pending interrupt as [`ReadLine::Interrupted`].
pub struct StdinSource {
    interrupts: Arc<InterruptState>,
}

impl StdinSource {
    pub fn new(interrupts: Arc<InterruptState>) -> Self {
        StdinSource { interrupts }
    }
}

impl InputSource for StdinSource {
    fn next_line(&mut self, prompt: &str) -> io::Result<ReadLine> {
        print!("{prompt}");
        io::stdout().flush()?;

        let mut buf = String::new();
        // read_line retries EINTR internally, so a Ctrl-C at the prompt is
        // observed through the pending flag once the read returns (after
        // Enter), not as an I/O error. The Err(Interrupted) arm stays for
        // readers that do surface it.
        match io::stdin().read_line(&mut buf) {
            Ok(0) => Ok(ReadLine::Eof),
            Ok(_) => {
                if self.interrupts.take_pending() {
                    return Ok(ReadLine::Interrupted);
                }
                while buf.ends_with('\n') || buf.ends_with('\r') {
                    buf.pop();
                }
                Ok(ReadLine::Line(buf))
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(ReadLine::Interrupted),
            Err(e) => Err(e),
        }
    }
}

/// In-memory input source for scripts and test harnesses: yields queued
/// reads in order, then end-of-input.
#[derive(Default)]
pub struct QueuedInput {
    reads: VecDeque<ReadLine>,
}

impl QueuedInput {
    pub fn new() -> Self {
        QueuedInput::default()
    }

    pub fn from_lines(lines: &[&str]) -> Self {
        QueuedInput {
            reads: lines
                .iter()
                .map(|l| ReadLine::Line(l.to_string()))
                .collect(),
        }
    }

    pub fn push(&mut self, read: ReadLine) {
        self.reads.push_back(read);
    }
}

impl InputSource for QueuedInput {
    fn next_line(&mut self, _prompt: &str) -> io::Result<ReadLine> {
        Ok(self.reads.pop_front().unwrap_or(ReadLine::Eof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> StatementParser {
        StatementParser::new(vec![';'], vec!["orate".to_string()], Vec::new())
    }

    #[test]
    fn single_line_statement_completes_immediately() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        let collected = controller
            .collect(&parser(), &mut input, "print hi", "> ")
            .unwrap();
        match collected {
            Collected::Statement(st) => assert_eq!(st.command, "print"),
            Collected::Empty => panic!("expected statement"),
        }
        assert!(controller.in_progress().is_none());
    }

    #[test]
    fn multiline_collects_until_terminator() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::from_lines(&["second line", "third;"]);
        let collected = controller
            .collect(&parser(), &mut input, "orate first", "> ")
            .unwrap();
        match collected {
            Collected::Statement(st) => {
                assert_eq!(st.command, "orate");
                assert_eq!(st.terminator, ";");
                assert_eq!(st.args, "first second line third");
                assert_eq!(st.raw, "orate first\nsecond line\nthird;");
            }
            Collected::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn unclosed_quote_on_multiline_keeps_collecting() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::from_lines(&["still open", r#"closed";"#]);
        let collected = controller
            .collect(&parser(), &mut input, r#"orate "spans"#, "> ")
            .unwrap();
        match collected {
            Collected::Statement(st) => {
                assert_eq!(st.command, "orate");
                assert_eq!(st.terminator, ";");
                assert!(st.args.contains("spans\nstill open\nclosed"));
            }
            Collected::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn unclosed_quote_on_single_line_command_is_an_error() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        let err = controller
            .collect(&parser(), &mut input, r#"help "open"#, "> ")
            .unwrap_err();
        assert!(matches!(err, Error::UnclosedQuote));
    }

    #[test]
    fn eof_terminates_quote_balanced_multiline() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        let collected = controller
            .collect(&parser(), &mut input, "orate no terminator", "> ")
            .unwrap();
        match collected {
            Collected::Statement(st) => {
                assert_eq!(st.command, "orate");
                assert_eq!(st.terminator, "\n");
            }
            Collected::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn eof_with_unclosed_quote_is_an_error() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        let err = controller
            .collect(&parser(), &mut input, r#"orate "never closed"#, "> ")
            .unwrap_err();
        assert!(matches!(err, Error::UnclosedQuote));
    }

    #[test]
    fn interrupt_discards_partial_statement() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        input.push(ReadLine::Interrupted);
        let collected = controller
            .collect(&parser(), &mut input, "orate half typed", "> ")
            .unwrap();
        assert_eq!(collected, Collected::Empty);
        assert!(controller.in_progress().is_none());
    }

    #[test]
    fn interrupt_is_fatal_when_configured() {
        let mut controller = ContinuationController::new(true);
        let mut input = QueuedInput::new();
        input.push(ReadLine::Interrupted);
        let err = controller
            .collect(&parser(), &mut input, "orate half typed", "> ")
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }

    #[test]
    fn continuation_prompt_is_used_for_followup_lines() {
        struct Recording {
            inner: QueuedInput,
            prompts: Vec<String>,
        }

        impl InputSource for Recording {
            fn next_line(&mut self, prompt: &str) -> io::Result<ReadLine> {
                self.prompts.push(prompt.to_string());
                self.inner.next_line(prompt)
            }
        }

        let mut controller = ContinuationController::new(false);
        let mut input = Recording {
            inner: QueuedInput::from_lines(&["more", "done;"]),
            prompts: Vec::new(),
        };
        let collected = controller
            .collect(&parser(), &mut input, "orate start", "... ")
            .unwrap();
        assert!(matches!(collected, Collected::Statement(_)));
        assert_eq!(input.prompts, vec!["... ", "... "]);
        assert!(controller.in_progress().is_none());
    }

    #[test]
    fn blank_first_line_is_empty() {
        let mut controller = ContinuationController::new(false);
        let mut input = QueuedInput::new();
        let collected = controller.collect(&parser(), &mut input, "", "> ").unwrap();
        assert_eq!(collected, Collected::Empty);
    }
}
