use crate::error::{Error, Result};
use crate::statement::Statement;

/// One placeholder occurrence inside a macro value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroArg {
    /// Byte offset of the opening brace in the macro value.
    pub start_index: usize,
    /// The placeholder number (1-based).
    pub number: usize,
    /// True for `{{n}}`, which resolves to the literal text `{n}`.
    pub is_escaped: bool,
}

/// A named, parametrized rewrite rule.
///
/// A macro's value may contain positional placeholders `{1}`, `{2}`, … which
/// are filled from the invoking statement's arguments, and escaped
/// placeholders `{{n}}` which resolve to literal `{n}` text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub value: String,
    /// Highest placeholder number referenced; the invocation must supply at
    /// least this many arguments.
    pub minimum_arg_count: usize,
    /// Every placeholder occurrence, in source order.
    pub arg_list: Vec<MacroArg>,
}

/// Parse `{digits}` at the start of `text`, returning the number and the
/// length of the matched text.
fn parse_braced_number(text: &str) -> Option<(usize, usize)> {
    let rest = text.strip_prefix('{')?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    if !rest[digits.len()..].starts_with('}') {
        return None;
    }
    let number = digits.parse().ok()?;
    Some((number, digits.len() + 2))
}

impl Macro {
    /// Build a macro from its name and value, scanning the value for
    /// placeholders and validating their numbering.
    ///
    /// Numbering rules: every placeholder number must be positive, and all
    /// numbers 1..=N must appear at least once, where N is the highest number
    /// used. The name itself is validated by the caller against the command
    /// and alias namespaces.
    pub fn create(name: &str, value: &str) -> Result<Macro> {
        let mut arg_list: Vec<MacroArg> = Vec::new();
        let mut seen_numbers: Vec<usize> = Vec::new();
        let mut max_number = 0;

        let mut i = 0;
        while i < value.len() {
            if !value[i..].starts_with('{') {
                i += value[i..].chars().next().map_or(1, char::len_utf8);
                continue;
            }
            // Escaped placeholder: "{{n}}"
            if value[i..].starts_with("{{") {
                if let Some((number, len)) = parse_braced_number(&value[i + 1..]) {
                    if value[i + 1 + len..].starts_with('}') {
                        arg_list.push(MacroArg {
                            start_index: i,
                            number,
                            is_escaped: true,
                        });
                        i += len + 2;
                        continue;
                    }
                }
                i += 1;
                continue;
            }
            // Normal placeholder: "{n}" neither preceded by '{' nor followed by '}'
            if let Some((number, len)) = parse_braced_number(&value[i..]) {
                if !value[i + len..].starts_with('}') && !value[..i].ends_with('{') {
                    if number < 1 {
                        return Err(Error::ArgumentNumbering(
                            "argument numbers must be greater than 0".to_string(),
                        ));
                    }
                    if !seen_numbers.contains(&number) {
                        seen_numbers.push(number);
                    }
                    max_number = max_number.max(number);
                    arg_list.push(MacroArg {
                        start_index: i,
                        number,
                        is_escaped: false,
                    });
                }
                i += len;
                continue;
            }
            i += 1;
        }

        if seen_numbers.len() != max_number {
            return Err(Error::ArgumentNumbering(format!(
                "not all numbers between 1 and {max_number} are present in the argument placeholders"
            )));
        }

        Ok(Macro {
            name: name.to_string(),
            value: value.to_string(),
            minimum_arg_count: max_number,
            arg_list,
        })
    }

    /// Resolve this macro against an invoking statement, producing the
    /// rewritten command line.
    ///
    /// Placeholders are substituted from the highest offset down, each one
    /// replacing the last textual occurrence, so earlier replacements never
    /// shift the offsets of later ones. Arguments beyond
    /// `minimum_arg_count` are appended with their quotes preserved, followed
    /// by the invocation's own terminator and redirection text.
    pub fn resolve(&self, statement: &Statement) -> Result<String> {
        if statement.arg_list.len() < self.minimum_arg_count {
            return Err(Error::InsufficientArguments {
                name: self.name.clone(),
                required: self.minimum_arg_count,
            });
        }

        // Unquoted values; argv[0] is the command, so placeholder numbers
        // index it directly.
        let argv = statement.argv();

        let mut order: Vec<&MacroArg> = self.arg_list.iter().collect();
        order.sort_by(|a, b| b.start_index.cmp(&a.start_index));

        let mut resolved = self.value.clone();
        for arg in order {
            let (needle, replacement) = if arg.is_escaped {
                (format!("{{{{{}}}}}", arg.number), format!("{{{}}}", arg.number))
            } else {
                (format!("{{{}}}", arg.number), argv[arg.number].clone())
            };
            if let Some(pos) = resolved.rfind(&needle) {
                resolved.replace_range(pos..pos + needle.len(), &replacement);
            }
        }

        // Extra arguments keep their quotes.
        for extra in &statement.arg_list[self.minimum_arg_count..] {
            resolved.push(' ');
            resolved.push_str(extra);
        }

        Ok(resolved + &statement.post_command())
    }
}
