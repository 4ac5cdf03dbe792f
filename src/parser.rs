use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::statement::{ParseOutcome, RedirectMode, Statement};
use crate::tokenizer::{strip_quotes, Tokenizer, COMMENT_CHAR, QUOTES};

/// The pipe operator.
pub const PIPE_CHAR: char = '|';
/// The redirection operator character; doubled for append.
pub const REDIRECT_CHAR: char = '>';
/// Default statement terminator.
pub const DEFAULT_TERMINATOR: char = ';';

fn is_operator(token: &str) -> bool {
    token == "|" || token == ">" || token == ">>"
}

/// Parses one logical command line into a [`Statement`].
///
/// Holds the fixed special syntax (quotes, terminators, comment marker,
/// redirection operators), the shortcut table, and the alias table. Aliases
/// and shortcuts are resolved during parsing, before tokenization.
pub struct StatementParser {
    terminators: Vec<char>,
    multiline_commands: Vec<String>,
    /// Longest-prefix-first `(prefix, expansion)` pairs.
    shortcuts: Vec<(String, String)>,
    aliases: BTreeMap<String, String>,
    tokenizer: Tokenizer,
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(vec![DEFAULT_TERMINATOR], Vec::new(), Vec::new())
    }
}

impl StatementParser {
    /// Create a parser with the given terminators, multiline-capable command
    /// names, and shortcut table.
    pub fn new(
        terminators: Vec<char>,
        multiline_commands: Vec<String>,
        mut shortcuts: Vec<(String, String)>,
    ) -> Self {
        // Longest prefix first so "@@" wins over "@".
        shortcuts.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut punctuation: Vec<char> = terminators.clone();
        punctuation.push(PIPE_CHAR);
        punctuation.push(REDIRECT_CHAR);

        StatementParser {
            terminators,
            multiline_commands,
            shortcuts,
            aliases: BTreeMap::new(),
            tokenizer: Tokenizer::new(punctuation),
        }
    }

    // ── Alias table ──

    /// Set an alias, returning true when an existing one was overwritten.
    pub fn set_alias(&mut self, name: &str, value: &str) -> bool {
        self.aliases
            .insert(name.to_string(), value.to_string())
            .is_some()
    }

    pub fn remove_alias(&mut self, name: &str) -> bool {
        self.aliases.remove(name).is_some()
    }

    pub fn clear_aliases(&mut self) {
        self.aliases.clear();
    }

    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.aliases.contains_key(name)
    }

    // ── Name validation ──

    /// Check that `name` can serve as a command, alias, or macro name.
    ///
    /// Run once at interpreter construction for every registered command, and
    /// again whenever an alias or macro is created.
    pub fn validate_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName("cannot be an empty string".to_string()));
        }
        for (prefix, _) in &self.shortcuts {
            if name.starts_with(prefix.as_str()) {
                return Err(Error::InvalidName(format!(
                    "cannot start with a shortcut: {prefix}"
                )));
            }
        }
        let special = |c: char| {
            c.is_whitespace()
                || QUOTES.contains(&c)
                || self.terminators.contains(&c)
                || c == PIPE_CHAR
                || c == REDIRECT_CHAR
                || c == COMMENT_CHAR
        };
        if name.chars().any(special) {
            return Err(Error::InvalidName(
                "cannot contain whitespace, quotes, or operator characters".to_string(),
            ));
        }
        Ok(())
    }

    // ── Completion hooks ──

    /// Tokenize for a completion collaborator: unclosed quotes are tolerated
    /// and a trailing empty token marks the cursor position after whitespace.
    pub fn split_for_completion(&self, line: &str) -> Vec<String> {
        self.tokenizer.split_for_completion(&self.expand(line))
    }

    // ── Parsing ──

    /// Parse `line` into a [`Statement`], resolving shortcuts and aliases.
    ///
    /// Returns [`ParseOutcome::Empty`] when no command remains after parsing
    /// (blank input, bare terminator, comment-only line).
    pub fn parse(&self, line: &str) -> Result<ParseOutcome> {
        let expanded = self.expand(line);
        let tokens = self.tokenizer.split(&expanded)?;

        // A trailing linefeed acts as an implicit terminator: it is how a
        // blank continuation line ends a terminator-less multiline statement.
        let newline_terminated = expanded.ends_with('\n');

        let is_terminator = |t: &String| {
            let mut chars = t.chars();
            matches!((chars.next(), chars.next()), (Some(c), None) if self.terminators.contains(&c))
        };

        let mut terminator = String::new();
        let mut suffix = String::new();
        let (command_tokens, op_tokens): (Vec<String>, Vec<String>) =
            if let Some(pos) = tokens.iter().position(is_terminator) {
                terminator = tokens[pos].clone();
                let rest = &tokens[pos + 1..];
                let op_start = rest
                    .iter()
                    .position(|t| is_operator(t))
                    .unwrap_or(rest.len());
                suffix = rest[..op_start].join(" ");
                (tokens[..pos].to_vec(), rest[op_start..].to_vec())
            } else {
                if newline_terminated {
                    terminator = "\n".to_string();
                }
                let op_start = tokens
                    .iter()
                    .position(|t| is_operator(t))
                    .unwrap_or(tokens.len());
                (tokens[..op_start].to_vec(), tokens[op_start..].to_vec())
            };

        let mut pipe_to = String::new();
        let mut output = RedirectMode::None;
        let mut output_to = String::new();

        if let Some(op) = op_tokens.first() {
            let rest = &op_tokens[1..];
            if op == "|" {
                if rest.is_empty() || rest[0] == "|" {
                    return Err(Error::Syntax("nothing to pipe to".to_string()));
                }
                pipe_to = rest.join(" ");
            } else {
                output = if op == ">>" {
                    RedirectMode::Append
                } else {
                    RedirectMode::Truncate
                };
                if rest.iter().any(|t| is_operator(t)) {
                    return Err(Error::Syntax(
                        "multiple redirection operators on one statement".to_string(),
                    ));
                }
                output_to = rest.join(" ");
            }
        }

        let Some(command) = command_tokens.first().cloned() else {
            return Ok(ParseOutcome::Empty);
        };
        let command = strip_quotes(&command);
        let arg_list = command_tokens[1..].to_vec();

        let statement = Statement {
            raw: line.to_string(),
            args: arg_list.join(" "),
            arg_list,
            multiline_command: self.multiline_tag(&command),
            command,
            terminator,
            suffix,
            pipe_to,
            output,
            output_to,
        };
        debug!(
            command = %statement.command,
            terminator = ?statement.terminator,
            pipe_to = %statement.pipe_to,
            output_to = %statement.output_to,
            "parsed statement"
        );
        Ok(ParseOutcome::Statement(statement))
    }

    /// Extract only the command name and argument text, without validating
    /// quoting or redirection. Used for lightweight command-name lookups:
    /// tab completion and the continuation loop's multiline check.
    pub fn parse_command_only(&self, line: &str) -> Statement {
        let expanded = self.expand(line);
        let trimmed = expanded.trim_start();
        let (command, args) = match trimmed.split_once(char::is_whitespace) {
            Some((command, rest)) => (command.to_string(), rest.trim().to_string()),
            None => (trimmed.to_string(), String::new()),
        };
        Statement {
            raw: line.to_string(),
            args,
            multiline_command: self.multiline_tag(&command),
            command,
            ..Statement::default()
        }
    }

    fn multiline_tag(&self, command: &str) -> String {
        if self.multiline_commands.iter().any(|c| c == command) {
            command.to_string()
        } else {
            String::new()
        }
    }

    /// Apply shortcut and alias expansion to a line before tokenization.
    ///
    /// A shortcut is replaced once by longest-prefix match. Aliases are
    /// expanded repeatedly until the command word is not an alias, with each
    /// alias applied at most once so self-referential aliases cannot loop.
    fn expand(&self, line: &str) -> String {
        let mut line = line.trim_start().to_string();

        for (prefix, expansion) in &self.shortcuts {
            if line.starts_with(prefix.as_str()) {
                line = format!("{} {}", expansion, &line[prefix.len()..]);
                break;
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        loop {
            let Some(first) = line.split_whitespace().next().map(str::to_string) else {
                break;
            };
            match self.aliases.get(&first) {
                Some(value) if !seen.contains(&first) => {
                    seen.insert(first.clone());
                    let rest = line[first.len()..].to_string();
                    line = format!("{value}{rest}");
                }
                _ => break,
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> StatementParser {
        StatementParser::new(
            vec![';'],
            vec!["orate".to_string()],
            vec![
                ("?".to_string(), "help".to_string()),
                ("!".to_string(), "shell".to_string()),
            ],
        )
    }

    fn parse(line: &str) -> Statement {
        match parser().parse(line).unwrap() {
            ParseOutcome::Statement(st) => st,
            ParseOutcome::Empty => panic!("expected a statement for {line:?}"),
        }
    }

    #[test]
    fn simple_command() {
        let st = parse("print hello world");
        assert_eq!(st.command, "print");
        assert_eq!(st.args, "hello world");
        assert_eq!(st.arg_list, vec!["hello", "world"]);
        assert_eq!(st.raw, "print hello world");
        assert!(st.terminator.is_empty());
    }

    #[test]
    fn blank_line_is_empty_outcome() {
        assert_eq!(parser().parse("").unwrap(), ParseOutcome::Empty);
        assert_eq!(parser().parse("   ").unwrap(), ParseOutcome::Empty);
    }

    #[test]
    fn bare_terminator_is_empty_outcome() {
        assert_eq!(parser().parse(";").unwrap(), ParseOutcome::Empty);
    }

    #[test]
    fn terminator_and_suffix() {
        let st = parse("orate hi there; now");
        assert_eq!(st.command, "orate");
        assert_eq!(st.args, "hi there");
        assert_eq!(st.terminator, ";");
        assert_eq!(st.suffix, "now");
        assert_eq!(st.multiline_command, "orate");
    }

    #[test]
    fn pipe_consumes_remainder() {
        let st = parse("print hello | sort -r > out.txt");
        assert_eq!(st.command, "print");
        assert_eq!(st.pipe_to, "sort -r > out.txt");
        assert_eq!(st.output, RedirectMode::None);
        assert!(st.output_to.is_empty());
    }

    #[test]
    fn empty_pipe_target_is_syntax_error() {
        assert!(matches!(parser().parse("print hi |"), Err(Error::Syntax(_))));
    }

    #[test]
    fn consecutive_pipes_are_a_syntax_error() {
        assert!(matches!(
            parser().parse("print hi | | wc"),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn redirect_truncate() {
        let st = parse("print hi > out.txt");
        assert_eq!(st.output, RedirectMode::Truncate);
        assert_eq!(st.output_to, "out.txt");
        assert!(st.pipe_to.is_empty());
    }

    #[test]
    fn redirect_append() {
        let st = parse("print hi >> out.txt");
        assert_eq!(st.output, RedirectMode::Append);
        assert_eq!(st.output_to, "out.txt");
    }

    #[test]
    fn redirect_without_target_means_clipboard() {
        let st = parse("print hi >");
        assert_eq!(st.output, RedirectMode::Truncate);
        assert!(st.output_to.is_empty());
    }

    #[test]
    fn operator_inside_redirect_target_is_syntax_error() {
        assert!(matches!(
            parser().parse("print hi > out.txt | wc"),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn pipe_and_output_are_mutually_exclusive() {
        let lines = [
            "print hi",
            "print hi | wc",
            "print hi > f",
            "print hi >> f",
            "print hi; x | wc",
            "print hi; x > f",
            r#"print "a|b" > f"#,
        ];
        for line in lines {
            if let Ok(ParseOutcome::Statement(st)) = parser().parse(line) {
                assert!(
                    st.pipe_to.is_empty() || st.output == RedirectMode::None,
                    "both pipe and output set for {line:?}"
                );
            }
        }
    }

    #[test]
    fn quoted_operators_are_literal() {
        let st = parse(r#"print "a;b|c>d" done"#);
        assert_eq!(st.command, "print");
        assert_eq!(st.arg_list, vec![r#""a;b|c>d""#, "done"]);
        assert!(st.pipe_to.is_empty());
        assert_eq!(st.output, RedirectMode::None);
        assert!(st.terminator.is_empty());
    }

    #[test]
    fn unclosed_quote_is_an_error() {
        assert!(matches!(
            parser().parse(r#"help "open"#),
            Err(Error::UnclosedQuote)
        ));
    }

    #[test]
    fn comment_stripped_from_args_but_not_raw() {
        let st = parse("print hi # trailing note");
        assert_eq!(st.args, "hi");
        assert_eq!(st.raw, "print hi # trailing note");
    }

    #[test]
    fn comment_only_line_is_empty_outcome() {
        assert_eq!(parser().parse("# note").unwrap(), ParseOutcome::Empty);
    }

    #[test]
    fn shortcut_expansion() {
        let st = parse("!ls -l");
        assert_eq!(st.command, "shell");
        assert_eq!(st.args, "ls -l");
        assert_eq!(st.raw, "!ls -l");
    }

    #[test]
    fn question_mark_shortcut() {
        let st = parse("?print");
        assert_eq!(st.command, "help");
        assert_eq!(st.args, "print");
    }

    #[test]
    fn longest_shortcut_prefix_wins() {
        let parser = StatementParser::new(
            vec![';'],
            Vec::new(),
            vec![
                ("@".to_string(), "run_script".to_string()),
                ("@@".to_string(), "relative_run_script".to_string()),
            ],
        );
        match parser.parse("@@setup.txt").unwrap() {
            ParseOutcome::Statement(st) => assert_eq!(st.command, "relative_run_script"),
            ParseOutcome::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn alias_expansion() {
        let mut parser = parser();
        parser.set_alias("ll", "shell ls -l");
        match parser.parse("ll /tmp").unwrap() {
            ParseOutcome::Statement(st) => {
                assert_eq!(st.command, "shell");
                assert_eq!(st.args, "ls -l /tmp");
                assert_eq!(st.raw, "ll /tmp");
            }
            ParseOutcome::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn self_referential_alias_does_not_loop() {
        let mut parser = parser();
        parser.set_alias("go", "go fast");
        match parser.parse("go").unwrap() {
            ParseOutcome::Statement(st) => {
                assert_eq!(st.command, "go");
                assert_eq!(st.args, "fast");
            }
            ParseOutcome::Empty => panic!("expected statement"),
        }
    }

    #[test]
    fn multiline_command_without_terminator() {
        let st = parse("orate the first line");
        assert_eq!(st.multiline_command, "orate");
        assert!(st.terminator.is_empty());
    }

    #[test]
    fn trailing_newline_acts_as_terminator() {
        let st = parse("orate all done\n");
        assert_eq!(st.terminator, "\n");
    }

    #[test]
    fn parse_command_only_ignores_bad_quoting() {
        let parser = parser();
        let st = parser.parse_command_only(r#"orate "unclosed"#);
        assert_eq!(st.command, "orate");
        assert_eq!(st.args, r#""unclosed"#);
        assert_eq!(st.multiline_command, "orate");
    }

    #[test]
    fn parse_command_only_applies_shortcuts() {
        let st = parser().parse_command_only("!ls");
        assert_eq!(st.command, "shell");
        assert_eq!(st.args, "ls");
    }

    #[test]
    fn validate_name_rejects_bad_names() {
        let parser = parser();
        assert!(parser.validate_name("").is_err());
        assert!(parser.validate_name("!bang").is_err());
        assert!(parser.validate_name("has space").is_err());
        assert!(parser.validate_name("semi;colon").is_err());
        assert!(parser.validate_name("pi|pe").is_err());
        assert!(parser.validate_name("redir>").is_err());
        assert!(parser.validate_name(r#"quo"te"#).is_err());
        assert!(parser.validate_name("hash#tag").is_err());
    }

    #[test]
    fn validate_name_accepts_ordinary_names() {
        let parser = parser();
        assert!(parser.validate_name("print").is_ok());
        assert!(parser.validate_name("run_script").is_ok());
        assert!(parser.validate_name("v2").is_ok());
    }
}
