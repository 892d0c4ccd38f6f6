//! Session configuration.
//!
//! Layers, lowest to highest precedence: built-in defaults, an optional TOML
//! file, environment variables, then CLI flags (applied by the binary). The
//! result is read once at startup and never changes during a session.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::machine::StepLimits;
use crate::core::types::{BackendKind, Platform};

/// Default file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "pilot.toml";

/// Session configuration (TOML).
///
/// Missing fields take the built-in defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PilotConfig {
    /// Maximum observe/decide/act cycles per task.
    pub max_steps: u32,

    /// Pause between consecutive steps, in seconds.
    pub step_delay_secs: f64,

    /// Consecutive completion signals required before a task counts as done.
    pub completion_threshold: u32,

    /// Drive a sandboxed remote session instead of the local display.
    pub use_remote: bool,

    pub policy: PolicyConfig,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Argv template for the policy command. Rendered with `platform`, `model`,
    /// `model_type`, `grounding_model` and `grounding_type`.
    pub command: Vec<String>,
    pub model: String,
    pub model_type: String,
    pub grounding_model: String,
    pub grounding_type: String,
    /// Truncate policy stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            command: [
                "agent-s-bridge",
                "--platform",
                "{{ platform }}",
                "--model",
                "{{ model }}",
                "--model-type",
                "{{ model_type }}",
                "--grounding-model",
                "{{ grounding_model }}",
                "--grounding-type",
                "{{ grounding_type }}",
            ]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
            model: "gpt-4o".to_string(),
            model_type: "openai".to_string(),
            grounding_model: "claude-3-7-sonnet-20250219".to_string(),
            grounding_type: "anthropic".to_string(),
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalConfig {
    /// Interpreter argv; the prelude followed by the script is fed on stdin.
    pub interpreter: Vec<String>,
    /// Code prepended to every script (imports the automation vocabulary).
    pub prelude: String,
    /// Optional capture argv template with a `{{ path }}` placeholder. When
    /// unset, the interpreter saves a screenshot itself.
    pub capture_command: Option<Vec<String>>,
    /// Truncate interpreter stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            interpreter: vec!["python3".to_string(), "-".to_string()],
            prelude: "import pyautogui\nimport time\n".to_string(),
            capture_command: None,
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    /// Existing session to attach to. A new session is created when unset.
    pub session_id: Option<String>,
    pub api_key: Option<String>,
    /// Platform of the remote session's desktop.
    pub platform: Platform,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.orgo.ai/api".to_string(),
            session_id: None,
            api_key: None,
            platform: Platform::Linux,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Directory for per-step records. Step logging is off when unset.
    pub dir: Option<PathBuf>,
    /// Store each observation next to the step metadata.
    pub save_screenshots: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            save_screenshots: true,
        }
    }
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            step_delay_secs: 0.5,
            completion_threshold: 2,
            use_remote: false,
            policy: PolicyConfig::default(),
            local: LocalConfig::default(),
            remote: RemoteConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        self.limits().validate()?;
        if !self.step_delay_secs.is_finite() || self.step_delay_secs < 0.0 {
            return Err(anyhow!("step_delay_secs must be a non-negative number"));
        }
        if self.policy.command.is_empty() || self.policy.command[0].trim().is_empty() {
            return Err(anyhow!("policy.command must be a non-empty array"));
        }
        if self.policy.output_limit_bytes == 0 {
            return Err(anyhow!("policy.output_limit_bytes must be > 0"));
        }
        if self.local.interpreter.is_empty() || self.local.interpreter[0].trim().is_empty() {
            return Err(anyhow!("local.interpreter must be a non-empty array"));
        }
        if let Some(capture) = &self.local.capture_command
            && (capture.is_empty() || capture[0].trim().is_empty())
        {
            return Err(anyhow!("local.capture_command must be a non-empty array"));
        }
        if self.local.output_limit_bytes == 0 {
            return Err(anyhow!("local.output_limit_bytes must be > 0"));
        }
        if self.use_remote && self.remote.base_url.trim().is_empty() {
            return Err(anyhow!("remote.base_url must be set when use_remote is true"));
        }
        Ok(())
    }

    pub fn limits(&self) -> StepLimits {
        StepLimits {
            max_steps: self.max_steps,
            completion_threshold: self.completion_threshold,
        }
    }

    /// Zero when `step_delay_secs` is negative or not finite.
    pub fn step_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.step_delay_secs).unwrap_or_default()
    }

    pub fn backend_kind(&self) -> BackendKind {
        BackendKind::from_remote_flag(self.use_remote)
    }

    /// Apply environment overrides using `lookup` (usually `std::env::var`).
    ///
    /// Empty values are ignored. Unparseable values are errors.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = get("AGENT_MODEL") {
            self.policy.model = value;
        }
        if let Some(value) = get("AGENT_MODEL_TYPE") {
            self.policy.model_type = value;
        }
        if let Some(value) = get("GROUNDING_MODEL") {
            self.policy.grounding_model = value;
        }
        if let Some(value) = get("GROUNDING_MODEL_TYPE") {
            self.policy.grounding_type = value;
        }
        if let Some(value) = get("MAX_STEPS") {
            self.max_steps = value
                .trim()
                .parse()
                .with_context(|| format!("parse MAX_STEPS={value:?}"))?;
        }
        if let Some(value) = get("STEP_DELAY") {
            self.step_delay_secs = value
                .trim()
                .parse()
                .with_context(|| format!("parse STEP_DELAY={value:?}"))?;
        }
        if let Some(value) = get("COMPLETION_THRESHOLD") {
            self.completion_threshold = value
                .trim()
                .parse()
                .with_context(|| format!("parse COMPLETION_THRESHOLD={value:?}"))?;
        }
        if let Some(value) = get("USE_CLOUD_ENVIRONMENT") {
            self.use_remote = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(value) = get("REMOTE_BASE_URL") {
            self.remote.base_url = value;
        }
        if let Some(value) = get("REMOTE_SESSION_ID") {
            self.remote.session_id = Some(value);
        }
        if let Some(value) = get("REMOTE_API_KEY") {
            self.remote.api_key = Some(value);
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`. Not validated:
/// callers validate once every layer has been applied.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        return Ok(PilotConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}

/// Resolve file and environment layers.
///
/// An explicitly requested file must exist; the default file is optional.
pub fn resolve_config<F>(explicit: Option<&Path>, lookup: F) -> Result<PilotConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file {} not found", path.display()));
            }
            load_config(path)?
        }
        None => load_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    cfg.apply_env(lookup)?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
