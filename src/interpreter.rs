use std::collections::BTreeMap;

use tracing::debug;

use crate::continuation::{Collected, ContinuationController, InputSource, ReadLine};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::macros::Macro;
use crate::parser::{StatementParser, DEFAULT_TERMINATOR};
use crate::redirect;
use crate::registry::CommandRegistry;
use crate::statement::Statement;
use crate::tokenizer::strip_quotes;

/// The interpreter loop: read a line, collect it into a complete statement,
/// resolve macros, apply redirection, dispatch, restore.
///
/// Commands, aliases, and macros are three disjoint namespaces; creation in
/// any one of them checks the other two. The `macro` and `alias` management
/// commands are built in because they mutate the parser and macro table.
pub struct Interpreter {
    parser: StatementParser,
    registry: CommandRegistry,
    macros: BTreeMap<String, Macro>,
    continuation: ContinuationController,
    ctx: ExecutionContext,
    prompt: String,
    continuation_prompt: String,
}

impl Interpreter {
    /// Build an interpreter around a command registry.
    ///
    /// Every registered command name is validated against the parser
    /// configuration; a name that collides with a shortcut prefix or
    /// contains operator characters is a construction error, not a runtime
    /// surprise.
    pub fn new(
        registry: CommandRegistry,
        shortcuts: Vec<(String, String)>,
        ctx: ExecutionContext,
    ) -> Result<Interpreter> {
        let parser = StatementParser::new(
            vec![DEFAULT_TERMINATOR],
            registry.multiline_commands(),
            shortcuts,
        );
        for name in registry.command_names() {
            parser.validate_name(&name)?;
        }
        for name in [MACRO_COMMAND, ALIAS_COMMAND] {
            parser.validate_name(name)?;
        }
        Ok(Interpreter {
            parser,
            registry,
            macros: BTreeMap::new(),
            continuation: ContinuationController::new(false),
            ctx,
            prompt: "cmdkit> ".to_string(),
            continuation_prompt: "> ".to_string(),
        })
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
    }

    pub fn set_continuation_prompt(&mut self, prompt: &str) {
        self.continuation_prompt = prompt.to_string();
    }

    /// When set, an interrupt while reading input ends the interpreter
    /// instead of discarding the current line.
    pub fn set_quit_on_interrupt(&mut self, quit: bool) {
        self.continuation.set_quit_on_interrupt(quit);
    }

    pub fn set_allow_redirection(&mut self, allow: bool) {
        self.ctx.allow_redirection = allow;
    }

    pub fn parser(&self) -> &StatementParser {
        &self.parser
    }

    pub fn macros(&self) -> &BTreeMap<String, Macro> {
        &self.macros
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        &mut self.ctx
    }

    /// Run until end of input, a handler requests a stop, or an interrupt is
    /// configured fatal. Errors from individual statements are reported and
    /// the loop continues.
    pub fn run(&mut self, source: &mut dyn InputSource) -> Result<()> {
        loop {
            match source.next_line(&self.prompt)? {
                ReadLine::Eof => return Ok(()),
                ReadLine::Interrupted => {
                    if self.continuation.quit_on_interrupt() {
                        return Err(Error::Interrupted);
                    }
                }
                ReadLine::Line(line) => match self.execute_line(&line, source) {
                    Ok(true) => return Ok(()),
                    Ok(false) => {}
                    Err(Error::Interrupted) if self.continuation.quit_on_interrupt() => {
                        return Err(Error::Interrupted);
                    }
                    Err(e) => self.ctx.error(&e.to_string()),
                },
            }
        }
    }

    /// Execute one typed line, collecting continuation input from `source`
    /// as needed. Returns whether a handler requested a stop.
    pub fn execute_line(&mut self, line: &str, source: &mut dyn InputSource) -> Result<bool> {
        match self.input_line_to_statement(line, source)? {
            Collected::Empty => Ok(false),
            Collected::Statement(statement) => self.execute_statement(&statement),
        }
    }

    /// Turn a typed line into its final statement, expanding macros.
    ///
    /// Each macro in a chain expands at most once, so a macro whose value
    /// invokes itself (directly or through other macros) stops expanding
    /// instead of looping. The final statement's `raw` is the line as
    /// originally typed, not any intermediate expansion.
    fn input_line_to_statement(
        &mut self,
        line: &str,
        source: &mut dyn InputSource,
    ) -> Result<Collected> {
        let mut line = line.to_string();
        let mut used_macros: Vec<String> = Vec::new();
        let mut original_raw: Option<String> = None;

        loop {
            let collected = self.continuation.collect(
                &self.parser,
                source,
                &line,
                &self.continuation_prompt,
            )?;
            let mut statement = match collected {
                Collected::Empty => return Ok(Collected::Empty),
                Collected::Statement(statement) => statement,
            };
            if original_raw.is_none() {
                original_raw = Some(statement.raw.clone());
            }

            match self.macros.get(&statement.command) {
                Some(mac) if !used_macros.contains(&statement.command) => {
                    used_macros.push(statement.command.clone());
                    line = mac.resolve(&statement)?;
                    debug!(macro_name = %mac.name, resolved = %line, "macro expanded");
                }
                _ => {
                    if let Some(raw) = original_raw {
                        statement.raw = raw;
                    }
                    return Ok(Collected::Statement(statement));
                }
            }
        }
    }

    /// Run one complete statement: redirection setup, dispatch, teardown.
    ///
    /// Teardown always runs, even when the handler fails, and both setup and
    /// teardown hold interrupt protection so a Ctrl-C cannot strand a
    /// half-swapped output stream.
    pub fn execute_statement(&mut self, statement: &Statement) -> Result<bool> {
        let saved = {
            let _guard = self.ctx.interrupts().protect();
            redirect::begin(&mut self.ctx, statement)?
        };

        let dispatched = self.dispatch(statement);

        let restored = {
            let _guard = self.ctx.interrupts().protect();
            redirect::end(&mut self.ctx, saved)
        };

        let stop = dispatched?;
        restored?;
        Ok(stop)
    }

    fn dispatch(&mut self, statement: &Statement) -> Result<bool> {
        match statement.command.as_str() {
            MACRO_COMMAND => self.do_macro(statement).map(|()| false),
            ALIAS_COMMAND => self.do_alias(statement).map(|()| false),
            _ => self.registry.dispatch(&mut self.ctx, statement),
        }
    }

    // ── macro and alias management commands ──

    fn do_macro(&mut self, statement: &Statement) -> Result<()> {
        match subcommand(statement) {
            Some("create") => {
                let (name, value) = name_and_value(statement, "macro create NAME VALUE")?;
                self.create_macro(&name, &value)
            }
            Some("delete") => {
                if is_delete_all(statement) {
                    self.macros.clear();
                    return self.ctx.writeln("All macros deleted");
                }
                if statement.arg_list.len() < 2 {
                    return Err(Error::Syntax("usage: macro delete NAME... | --all".to_string()));
                }
                for token in &statement.arg_list[1..] {
                    let name = strip_quotes(token);
                    if self.macros.remove(&name).is_some() {
                        self.ctx.writeln(&format!("Macro '{name}' deleted"))?;
                    } else {
                        self.ctx.error(&format!("Macro '{name}' does not exist"));
                    }
                }
                Ok(())
            }
            Some("list") => {
                let names: Vec<String> = if statement.arg_list.len() > 1 {
                    statement.arg_list[1..].iter().map(|t| strip_quotes(t)).collect()
                } else {
                    self.macros.keys().cloned().collect()
                };
                for name in names {
                    match self.macros.get(&name) {
                        Some(mac) => self
                            .ctx
                            .writeln(&format!("macro create {} {}", mac.name, mac.value))?,
                        None => self.ctx.error(&format!("Macro '{name}' not found")),
                    }
                }
                Ok(())
            }
            _ => Err(Error::Syntax(
                "expected one of: macro create, macro delete, macro list".to_string(),
            )),
        }
    }

    fn do_alias(&mut self, statement: &Statement) -> Result<()> {
        match subcommand(statement) {
            Some("create") => {
                let (name, value) = name_and_value(statement, "alias create NAME VALUE")?;
                self.create_alias(&name, &value)
            }
            Some("delete") => {
                if is_delete_all(statement) {
                    self.parser.clear_aliases();
                    return self.ctx.writeln("All aliases deleted");
                }
                if statement.arg_list.len() < 2 {
                    return Err(Error::Syntax("usage: alias delete NAME... | --all".to_string()));
                }
                for token in &statement.arg_list[1..] {
                    let name = strip_quotes(token);
                    if self.parser.remove_alias(&name) {
                        self.ctx.writeln(&format!("Alias '{name}' deleted"))?;
                    } else {
                        self.ctx.error(&format!("Alias '{name}' does not exist"));
                    }
                }
                Ok(())
            }
            Some("list") => {
                let names: Vec<String> = if statement.arg_list.len() > 1 {
                    statement.arg_list[1..].iter().map(|t| strip_quotes(t)).collect()
                } else {
                    self.parser.aliases().keys().cloned().collect()
                };
                for name in names {
                    match self.parser.aliases().get(&name) {
                        Some(value) => self
                            .ctx
                            .writeln(&format!("alias create {name} {value}"))?,
                        None => self.ctx.error(&format!("Alias '{name}' not found")),
                    }
                }
                Ok(())
            }
            _ => Err(Error::Syntax(
                "expected one of: alias create, alias delete, alias list".to_string(),
            )),
        }
    }

    /// Create or overwrite a macro, enforcing the namespace rules.
    pub fn create_macro(&mut self, name: &str, value: &str) -> Result<()> {
        self.parser.validate_name(name)?;
        if self.registry.is_known_command(name) || is_builtin(name) {
            return Err(Error::InvalidName(
                "a macro cannot have the same name as a command".to_string(),
            ));
        }
        if self.parser.has_alias(name) {
            return Err(Error::InvalidName(
                "a macro cannot have the same name as an alias".to_string(),
            ));
        }
        let mac = Macro::create(name, value)?;
        let verb = if self.macros.insert(name.to_string(), mac).is_some() {
            "overwritten"
        } else {
            "created"
        };
        self.ctx.writeln(&format!("Macro '{name}' {verb}"))
    }

    /// Create or overwrite an alias, enforcing the namespace rules.
    pub fn create_alias(&mut self, name: &str, value: &str) -> Result<()> {
        self.parser.validate_name(name)?;
        if self.registry.is_known_command(name) || is_builtin(name) {
            return Err(Error::InvalidName(
                "an alias cannot have the same name as a command".to_string(),
            ));
        }
        if self.macros.contains_key(name) {
            return Err(Error::InvalidName(
                "an alias cannot have the same name as a macro".to_string(),
            ));
        }
        let verb = if self.parser.set_alias(name, value) {
            "overwritten"
        } else {
            "created"
        };
        self.ctx.writeln(&format!("Alias '{name}' {verb}"))
    }
}

const MACRO_COMMAND: &str = "macro";
const ALIAS_COMMAND: &str = "alias";

fn is_builtin(name: &str) -> bool {
    name == MACRO_COMMAND || name == ALIAS_COMMAND
}

fn subcommand(statement: &Statement) -> Option<&str> {
    statement.arg_list.first().map(String::as_str)
}

fn is_delete_all(statement: &Statement) -> bool {
    statement.arg_list.get(1).map(String::as_str) == Some("--all")
}

/// Extract `NAME VALUE...` from a management subcommand.
///
/// Operator tokens that were quoted to get past the parser (a value
/// containing `>` or `|`) are unquoted here so the stored value carries the
/// operator itself.
fn name_and_value(statement: &Statement, usage: &str) -> Result<(String, String)> {
    if statement.arg_list.len() < 3 {
        return Err(Error::Syntax(format!("usage: {usage}")));
    }
    let name = strip_quotes(&statement.arg_list[1]);
    let value = statement.arg_list[2..]
        .iter()
        .map(|token| {
            let stripped = strip_quotes(token);
            if matches!(stripped.as_str(), "|" | ">" | ">>" | ";") {
                stripped
            } else {
                token.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    Ok((name, value))
}
