//! Local backend: the display and input devices of the machine running pilot.
//!
//! Scripts run through the configured interpreter (by default `python3` with
//! `pyautogui` imported by the prelude) with full local privilege.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use minijinja::context;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{BackendKind, Platform};
use crate::io::backend::Backend;
use crate::io::config::LocalConfig;
use crate::io::process::{CommandOutput, run_command};
use crate::io::screen::normalize_png;
use crate::io::template::{command_from_argv, render_argv};

pub struct LocalBackend {
    config: LocalConfig,
    platform: Platform,
}

impl LocalBackend {
    /// Bind to the local display. Nothing is touched until the first call.
    pub fn new(config: LocalConfig) -> Self {
        Self {
            config,
            platform: Platform::current(),
        }
    }

    fn run_interpreter(&self, body: &str) -> Result<CommandOutput> {
        let cmd = command_from_argv(&self.config.interpreter)?;
        let program = compose_program(&self.config.prelude, body);
        run_command(cmd, Some(program.as_bytes()), self.config.output_limit_bytes)
            .context("run local interpreter")
    }

    fn capture_to(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy().to_string();
        let output = match &self.config.capture_command {
            Some(template) => {
                let argv = render_argv(template, &context! { path => path_str })?;
                let cmd = command_from_argv(&argv)?;
                run_command(cmd, None, self.config.output_limit_bytes)
                    .context("run capture command")?
            }
            None => {
                let literal = serde_json::to_string(&path_str).context("quote capture path")?;
                self.run_interpreter(&format!(
                    "pyautogui.screenshot().save({literal}, format=\"PNG\")"
                ))?
            }
        };
        if !output.status.success() {
            return Err(anyhow!(
                "screen capture failed with status {:?}: {}",
                output.status.code(),
                output.stderr_summary().unwrap_or_default()
            ));
        }
        Ok(())
    }
}

impl Backend for LocalBackend {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    #[instrument(skip_all)]
    fn screenshot(&self) -> Result<Vec<u8>> {
        let dir = tempfile::Builder::new()
            .prefix("pilot-capture")
            .tempdir()
            .context("create capture dir")?;
        let path = dir.path().join("screen.png");
        self.capture_to(&path)?;
        let bytes = fs::read(&path)
            .with_context(|| format!("read captured screenshot {}", path.display()))?;
        debug!(bytes = bytes.len(), "captured local screenshot");
        normalize_png(bytes)
    }

    #[instrument(skip_all, fields(script_len = script.len()))]
    fn exec(&self, script: &str) -> Result<()> {
        let output = self.run_interpreter(script)?;
        let stdout = output.stdout_text();
        if !stdout.is_empty() {
            info!(output = %stdout, "script output");
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "local script failed");
            return Err(anyhow!(
                output
                    .stderr_summary()
                    .unwrap_or_else(|| format!("script exited with status {:?}", output.status.code()))
            ));
        }
        Ok(())
    }
}

fn compose_program(prelude: &str, body: &str) -> String {
    let mut program = String::with_capacity(prelude.len() + body.len() + 2);
    program.push_str(prelude);
    if !prelude.is_empty() && !prelude.ends_with('\n') {
        program.push('\n');
    }
    program.push_str(body);
    if !body.ends_with('\n') {
        program.push('\n');
    }
    program
}
