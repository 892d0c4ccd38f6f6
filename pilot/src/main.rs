//! `pilot`: drive a game or desktop UI with an external decision policy.
//!
//! With a task on the command line, runs it once and exits with a code that
//! reflects the outcome. Without one, reads tasks line by line until `exit`.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pilot::controller::{Controller, ControllerConfig, Pacer};
use pilot::core::report::{StepReport, TaskOutcome};
use pilot::core::types::{StepResult, StopReason};
use pilot::exit_codes;
use pilot::io::backend::{AnyBackend, Backend};
use pilot::io::config::{PilotConfig, resolve_config};
use pilot::io::policy::{CommandPolicy, Policy};
use pilot::io::step_log::StepLog;
use pilot::logging;
use tracing::debug;

const EXIT_SENTINEL: &str = "exit";

#[derive(Parser, Debug)]
#[command(
    name = "pilot",
    version,
    about = "Bounded observe/decide/act agent runner for games and desktop UIs"
)]
struct Cli {
    /// Task instruction. Starts an interactive session when omitted.
    task: Vec<String>,

    /// TOML config file (defaults to ./pilot.toml when present).
    #[arg(long, env = "PILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Drive the sandboxed remote desktop instead of the local display.
    #[arg(long)]
    remote: bool,

    /// Maximum observe/decide/act cycles per task.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Pause between steps, in seconds.
    #[arg(long)]
    step_delay: Option<f64>,

    /// Write per-step records under this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() {
    dotenv::dotenv().ok();
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("fatal: {:#}", err);
            exit_codes::FATAL
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let cfg = effective_config(&cli, |key| std::env::var(key).ok())?;

    if cli.print_config {
        print!(
            "{}",
            toml::to_string_pretty(&cfg).context("serialize config toml")?
        );
        return Ok(exit_codes::OK);
    }

    let backend = AnyBackend::from_config(&cfg).context("start backend")?;
    let policy = CommandPolicy::new(&cfg.policy, backend.platform()).context("start policy")?;
    println!(
        "backend: {} (platform {})",
        backend.kind(),
        backend.platform()
    );

    let mut controller = Controller::new(backend, policy, ControllerConfig::from(&cfg));
    if let Some(dir) = &cfg.log.dir {
        controller = controller.with_step_log(StepLog::new(dir, cfg.log.save_screenshots));
    }

    if !cli.task.is_empty() {
        let outcome = run_one(&mut controller, &cli.task.join(" "))?;
        return Ok(if outcome.success {
            exit_codes::OK
        } else {
            exit_codes::TIMED_OUT
        });
    }

    interactive(&mut controller)?;
    Ok(exit_codes::OK)
}

/// Resolve file/env layers, then apply CLI flags and validate.
fn effective_config<F>(cli: &Cli, lookup: F) -> Result<PilotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = resolve_config(cli.config.as_deref(), lookup)?;
    apply_cli_overrides(&mut cfg, cli);
    cfg.validate().context("invalid configuration")?;
    debug!(?cfg, "effective configuration");
    Ok(cfg)
}

fn apply_cli_overrides(cfg: &mut PilotConfig, cli: &Cli) {
    if cli.remote {
        cfg.use_remote = true;
    }
    if let Some(max_steps) = cli.max_steps {
        cfg.max_steps = max_steps;
    }
    if let Some(step_delay) = cli.step_delay {
        cfg.step_delay_secs = step_delay;
    }
    if let Some(dir) = &cli.log_dir {
        cfg.log.dir = Some(dir.clone());
    }
}

fn interactive<B: Backend, P: Policy, S: Pacer>(
    controller: &mut Controller<B, P, S>,
) -> Result<()> {
    println!("interactive mode (type '{EXIT_SENTINEL}' to quit)");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("task: ");
        std::io::stdout().flush().context("flush stdout")?;
        let Some(line) = lines.next() else {
            println!();
            return Ok(());
        };
        let line = line.context("read task")?;
        let task = line.trim();
        if task.eq_ignore_ascii_case(EXIT_SENTINEL) {
            return Ok(());
        }
        if task.is_empty() {
            continue;
        }
        run_one(controller, task)?;
    }
}

fn run_one<B: Backend, P: Policy, S: Pacer>(
    controller: &mut Controller<B, P, S>,
    task: &str,
) -> Result<TaskOutcome> {
    println!("\ntask: {task}");
    let threshold = controller.config().limits.completion_threshold;
    let outcome = controller.run_task(task, |report| print_step(report, threshold))?;
    print_outcome(&outcome);
    Ok(outcome)
}

fn print_step(report: &StepReport, threshold: u32) {
    println!("step {}/{}", report.step, report.max_steps);
    if report.corrective {
        println!("  retrying after failure");
    }
    if let Some(info) = &report.info {
        println!("  thought: {info}");
    }
    if let Some(action) = &report.action {
        println!("  action: {action}");
    }
    match report.result {
        StepResult::Idle => println!(
            "  completion signal ({}/{})",
            report.completion_count, threshold
        ),
        StepResult::Executed => {}
        StepResult::Faulted(phase) => println!(
            "  error ({phase}): {}",
            report.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_outcome(outcome: &TaskOutcome) {
    match outcome.stop {
        StopReason::Completed => println!(
            "complete after {} steps ({} failed)",
            outcome.steps_executed, outcome.faults
        ),
        StopReason::StepBudgetExhausted => println!(
            "max steps reached ({}) without completion",
            outcome.steps_executed
        ),
    }
}
