use std::process::{Command, ExitCode};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use cmdkit::{
    CommandRegistry, Error, ExecutionContext, Interpreter, InterruptState, StdinSource,
};

fn shell_command(line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(line);
        command
    }
    #[cfg(not(unix))]
    {
        let mut command = Command::new("cmd");
        command.args(["/C", line]);
        command
    }
}

fn build_registry() -> cmdkit::Result<CommandRegistry> {
    let mut registry = CommandRegistry::new();

    registry.register(
        "print",
        "print its arguments",
        Box::new(|ctx, st| {
            let text = st
                .argv()
                .into_iter()
                .skip(1)
                .collect::<Vec<_>>()
                .join(" ");
            ctx.writeln(&text)?;
            Ok(false)
        }),
    )?;

    registry.register_multiline(
        "orate",
        "print text collected until a terminator",
        Box::new(|ctx, st| {
            ctx.writeln(&st.args)?;
            Ok(false)
        }),
    )?;

    registry.register(
        "shell",
        "run a command in the system shell (shortcut: !)",
        Box::new(|ctx, st| {
            if st.args.is_empty() {
                return Err(Error::Syntax("usage: shell COMMAND".to_string()));
            }
            let output = shell_command(&st.args).output().map_err(Error::Io)?;
            ctx.write(&String::from_utf8_lossy(&output.stdout))?;
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim_end().is_empty() {
                ctx.error(stderr.trim_end());
            }
            Ok(false)
        }),
    )?;

    registry.register("quit", "exit the interpreter", Box::new(|_, _| Ok(true)))?;
    registry.register("exit", "exit the interpreter", Box::new(|_, _| Ok(true)))?;

    // Snapshot the registry's own help text so the listing cannot drift from
    // what is actually registered. The interpreter-builtin `macro`/`alias`
    // commands and `help` itself are appended by hand.
    let mut help_entries: Vec<(String, String)> = registry
        .command_names()
        .into_iter()
        .map(|name| {
            let text = registry.help_for(&name).unwrap_or_default().to_string();
            (name, text)
        })
        .collect();
    help_entries.push(("macro".to_string(), "macro create|delete|list".to_string()));
    help_entries.push(("alias".to_string(), "alias create|delete|list".to_string()));
    help_entries.push(("help".to_string(), "list commands (shortcut: ?)".to_string()));
    help_entries.sort();

    registry.register(
        "help",
        "list commands (shortcut: ?)",
        Box::new(move |ctx, _| {
            for (name, text) in &help_entries {
                ctx.writeln(&format!("{name:<8}{text}"))?;
            }
            Ok(false)
        }),
    )?;

    Ok(registry)
}

fn run() -> cmdkit::Result<()> {
    let interrupts = InterruptState::new();
    let handler_state = Arc::clone(&interrupts);
    ctrlc::set_handler(move || handler_state.handle_interrupt())
        .expect("failed to install Ctrl-C handler");

    let registry = build_registry()?;
    let ctx = ExecutionContext::new(Arc::clone(&interrupts));
    let mut interp = Interpreter::new(
        registry,
        vec![
            ("?".to_string(), "help".to_string()),
            ("!".to_string(), "shell".to_string()),
        ],
        ctx,
    )?;

    let mut input = StdinSource::new(interrupts);
    interp.run(&mut input)?;
    println!("Goodbye!");
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
