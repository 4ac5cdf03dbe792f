use crate::error::{Error, Result};

/// The quote characters recognized by the tokenizer.
pub const QUOTES: [char; 2] = ['"', '\''];

/// Character that starts a comment when it opens a new token.
pub const COMMENT_CHAR: char = '#';

/// States for the tokenizer state machine.
enum State {
    /// Between tokens — whitespace is skipped
    Normal,
    /// Building a token — whitespace or punctuation ends it
    InWord,
    /// Inside quotes — everything except the closing quote is literal
    InQuote(char),
}

/// Splits raw text into tokens while preserving quotes.
///
/// Punctuation characters (statement terminators plus the redirection and
/// pipe symbols) force a token boundary even in the middle of an unbroken
/// run of characters, unless they appear inside quotes. A run of two `>`
/// characters is combined into a single `>>` token.
pub struct Tokenizer {
    punctuation: Vec<char>,
}

impl Tokenizer {
    /// Create a tokenizer that splits on the given punctuation characters.
    pub fn new(punctuation: Vec<char>) -> Self {
        Tokenizer { punctuation }
    }

    /// Split `line` into raw tokens with quotes preserved.
    ///
    /// A `#` that opens a new token starts a comment: the rest of the line is
    /// discarded. Returns [`Error::UnclosedQuote`] when a quote is opened but
    /// never closed.
    pub fn split(&self, line: &str) -> Result<Vec<String>> {
        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut state = State::Normal;
        let mut chars = line.chars().peekable();

        while let Some(ch) = chars.next() {
            match (&state, ch) {
                (State::InQuote(q), c) => {
                    current.push(c);
                    if c == *q {
                        state = State::InWord;
                    }
                }
                (State::Normal, c) if c.is_whitespace() => {}
                (State::Normal, COMMENT_CHAR) => {
                    // Comment opens a token: discard the rest of the line.
                    return Ok(tokens);
                }
                (State::InWord, c) if c.is_whitespace() => {
                    tokens.push(std::mem::take(&mut current));
                    state = State::Normal;
                }
                (_, c) if QUOTES.contains(&c) => {
                    current.push(c);
                    state = State::InQuote(c);
                }
                (_, c) if self.punctuation.contains(&c) => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    // `>>` is one token; every other punctuation char stands alone.
                    if c == '>' && chars.peek() == Some(&'>') {
                        chars.next();
                        tokens.push(">>".to_string());
                    } else {
                        tokens.push(c.to_string());
                    }
                    state = State::Normal;
                }
                (_, c) => {
                    current.push(c);
                    state = State::InWord;
                }
            }
        }

        match state {
            State::InQuote(_) => Err(Error::UnclosedQuote),
            State::InWord => {
                tokens.push(current);
                Ok(tokens)
            }
            State::Normal => Ok(tokens),
        }
    }

    /// Split `line` for a completion collaborator positioned at the end of it.
    ///
    /// Unlike [`Tokenizer::split`], an unclosed quote is tolerated (the
    /// in-progress token is returned as-is) and a line ending in whitespace
    /// yields a trailing empty token marking the completion cursor position.
    pub fn split_for_completion(&self, line: &str) -> Vec<String> {
        let mut tokens = match self.split(line) {
            Ok(tokens) => tokens,
            Err(_) => {
                // Re-split with the dangling quote closed, then drop the
                // closing quote we appended from the final token.
                let mut patched = String::from(line);
                for q in QUOTES {
                    patched.push(q);
                    if let Ok(mut tokens) = self.split(&patched) {
                        if let Some(last) = tokens.last_mut() {
                            last.pop();
                        }
                        return tokens;
                    }
                    patched.pop();
                }
                Vec::new()
            }
        };
        if line.is_empty() || line.ends_with(char::is_whitespace) {
            tokens.push(String::new());
        }
        tokens
    }
}

/// Remove one matching pair of surrounding quotes from `token`, if present.
pub fn strip_quotes(token: &str) -> String {
    let mut chars = token.chars();
    if let (Some(first), Some(last)) = (chars.next(), chars.next_back()) {
        if first == last && QUOTES.contains(&first) {
            return chars.collect();
        }
    }
    token.to_string()
}
