use std::collections::{BTreeMap, BTreeSet};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::statement::Statement;
use crate::tokenizer::{COMMENT_CHAR, QUOTES};

/// A command handler. Returning `Ok(true)` asks the interpreter loop to
/// stop.
pub type Handler = Box<dyn FnMut(&mut ExecutionContext, &Statement) -> Result<bool>>;

struct CommandEntry {
    handler: Handler,
    help: String,
}

/// Explicit name-to-handler map, with a side set of commands that accept
/// multi-line bodies.
///
/// Registration rejects names that could never be parsed back as a command
/// word. The interpreter performs a second check against its parser
/// configuration (shortcuts and terminators) when it is constructed.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, CommandEntry>,
    multiline: BTreeSet<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        CommandRegistry::default()
    }

    /// Register a command. Fails on an empty name, a duplicate, or a name
    /// containing characters the tokenizer treats specially.
    pub fn register(&mut self, name: &str, help: &str, handler: Handler) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName("command name cannot be empty".to_string()));
        }
        if name
            .chars()
            .any(|c| c.is_whitespace() || QUOTES.contains(&c) || c == COMMENT_CHAR)
        {
            return Err(Error::InvalidName(format!(
                "'{name}' contains characters not allowed in command names"
            )));
        }
        if self.commands.contains_key(name) {
            return Err(Error::InvalidName(format!(
                "command '{name}' is already registered"
            )));
        }
        self.commands.insert(
            name.to_string(),
            CommandEntry {
                handler,
                help: help.to_string(),
            },
        );
        Ok(())
    }

    /// Register a command whose body may span multiple input lines.
    pub fn register_multiline(&mut self, name: &str, help: &str, handler: Handler) -> Result<()> {
        self.register(name, help, handler)?;
        self.multiline.insert(name.to_string());
        Ok(())
    }

    pub fn is_known_command(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn is_multiline_command(&self, name: &str) -> bool {
        self.multiline.contains(name)
    }

    /// Multiline command names, for configuring a parser.
    pub fn multiline_commands(&self) -> Vec<String> {
        self.multiline.iter().cloned().collect()
    }

    /// Registered command names in sorted order.
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    pub fn help_for(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|entry| entry.help.as_str())
    }

    /// Run the handler for `statement.command`.
    pub fn dispatch(&mut self, ctx: &mut ExecutionContext, statement: &Statement) -> Result<bool> {
        match self.commands.get_mut(&statement.command) {
            Some(entry) => (entry.handler)(ctx, statement),
            None => Err(Error::UnknownCommand(statement.command.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::InterruptState;
    use std::sync::{Arc, Mutex};

    fn noop() -> Handler {
        Box::new(|_, _| Ok(false))
    }

    #[test]
    fn register_and_query() {
        let mut registry = CommandRegistry::new();
        registry.register("print", "print text", noop()).unwrap();
        registry
            .register_multiline("orate", "speak at length", noop())
            .unwrap();

        assert!(registry.is_known_command("print"));
        assert!(registry.is_known_command("orate"));
        assert!(!registry.is_known_command("missing"));
        assert!(registry.is_multiline_command("orate"));
        assert!(!registry.is_multiline_command("print"));
        assert_eq!(registry.multiline_commands(), vec!["orate"]);
        assert_eq!(registry.command_names(), vec!["orate", "print"]);
        assert_eq!(registry.help_for("print"), Some("print text"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut registry = CommandRegistry::new();
        assert!(registry.register("", "", noop()).is_err());
        assert!(registry.register("two words", "", noop()).is_err());
        assert!(registry.register("quo\"te", "", noop()).is_err());
        assert!(registry.register("hash#", "", noop()).is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register("print", "", noop()).unwrap();
        let err = registry.register("print", "", noop()).unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn dispatch_runs_the_handler() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&calls);

        let mut registry = CommandRegistry::new();
        registry
            .register(
                "print",
                "",
                Box::new(move |_, st| {
                    record.lock().unwrap().push(st.args.clone());
                    Ok(false)
                }),
            )
            .unwrap();

        let (mut ctx, _buffer) = ExecutionContext::capturing(InterruptState::new());
        let statement = Statement {
            command: "print".to_string(),
            args: "hello".to_string(),
            ..Statement::default()
        };
        assert!(!registry.dispatch(&mut ctx, &statement).unwrap());
        assert_eq!(*calls.lock().unwrap(), vec!["hello"]);
    }

    #[test]
    fn dispatch_unknown_command_names_all_namespaces() {
        let mut registry = CommandRegistry::new();
        let (mut ctx, _buffer) = ExecutionContext::capturing(InterruptState::new());
        let statement = Statement {
            command: "mystery".to_string(),
            ..Statement::default()
        };
        let err = registry.dispatch(&mut ctx, &statement).unwrap_err();
        assert_eq!(
            err.to_string(),
            "mystery is not a recognized command, alias, or macro"
        );
    }

    #[test]
    fn handler_can_request_stop() {
        let mut registry = CommandRegistry::new();
        registry
            .register("quit", "", Box::new(|_, _| Ok(true)))
            .unwrap();
        let (mut ctx, _buffer) = ExecutionContext::capturing(InterruptState::new());
        let statement = Statement {
            command: "quit".to_string(),
            ..Statement::default()
        };
        assert!(registry.dispatch(&mut ctx, &statement).unwrap());
    }
}
