//! Shared deterministic types for the step controller.
//!
//! These types define stable contracts between the controller, the backends
//! and the decision policy. They must not depend on I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Target platform identifier handed to the decision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Darwin,
    Linux,
}

impl Platform {
    /// Platform of the machine running the controller.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Darwin => "darwin",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "darwin" => Ok(Platform::Darwin),
            "linux" => Ok(Platform::Linux),
            other => Err(anyhow!(
                "unknown platform '{other}' (expected windows, darwin or linux)"
            )),
        }
    }
}

/// Which execution backend is bound for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl BackendKind {
    pub fn from_remote_flag(remote: bool) -> Self {
        if remote {
            BackendKind::Remote
        } else {
            BackendKind::Local
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Remote => f.write_str("remote"),
        }
    }
}

/// A single captured snapshot, valid for one decision cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Encoded still image (PNG).
    pub screenshot: Vec<u8>,
}

/// Decision policy response for one step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Advisory rationale, used only for observability.
    #[serde(default)]
    pub info: Option<String>,
    /// Proposed scripts; only the first one is consumed per step.
    #[serde(default)]
    pub action: Option<Vec<Option<String>>>,
}

impl Prediction {
    /// Shorthand for a prediction proposing a single script.
    pub fn act(script: impl Into<String>) -> Self {
        Self {
            info: None,
            action: Some(vec![Some(script.into())]),
        }
    }

    /// Shorthand for the completion signal (empty action list).
    pub fn complete() -> Self {
        Self {
            info: None,
            action: Some(Vec::new()),
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Non-empty rationale, if any.
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref().filter(|info| !info.trim().is_empty())
    }

    /// Interpret the action list.
    ///
    /// A missing or empty list, a missing/blank first element, or a first
    /// element reading `DONE` all signal completion.
    pub fn decision(&self) -> Decision {
        let first = self
            .action
            .as_ref()
            .and_then(|actions| actions.first())
            .and_then(|first| first.as_deref());
        match first {
            Some(script) if !is_completion_script(script) => Decision::Act(script.to_string()),
            _ => Decision::Complete,
        }
    }
}

fn is_completion_script(script: &str) -> bool {
    let trimmed = script.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("done")
}

/// What the controller does with a prediction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Complete,
    Act(String),
}

/// Phase of a step in which a fault was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPhase {
    Capture,
    Predict,
    Exec,
}

impl fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPhase::Capture => f.write_str("capture"),
            FaultPhase::Predict => f.write_str("predict"),
            FaultPhase::Exec => f.write_str("exec"),
        }
    }
}

/// Classified result of one observe/decide/act cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "phase")]
pub enum StepResult {
    /// The policy signalled completion; nothing was executed.
    Idle,
    /// The proposed script ran successfully.
    Executed,
    /// Capture, prediction or execution raised.
    Faulted(FaultPhase),
}

/// Why a task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Completion was observed `completion_threshold` times in a row.
    Completed,
    /// The step budget ran out without completion.
    StepBudgetExhausted,
}
