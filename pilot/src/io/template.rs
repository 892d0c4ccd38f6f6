//! Argv templating for configured external commands.

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, UndefinedBehavior, Value};

/// Render every argument of `template` with `ctx`.
///
/// Undefined variables are errors so a typo in a config file fails loudly
/// instead of passing an empty argument.
pub fn render_argv(template: &[String], ctx: &Value) -> Result<Vec<String>> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    template
        .iter()
        .map(|arg| {
            env.render_str(arg, ctx)
                .with_context(|| format!("render argument {arg:?}"))
        })
        .collect()
}

/// Build a [`Command`] from a rendered argv.
pub fn command_from_argv(argv: &[String]) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must not be empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args);
    Ok(cmd)
}
