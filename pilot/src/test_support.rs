//! Scripted doubles for the backend, the policy and the pacer.
//!
//! Queues are consumed in call order; `assert_drained` checks that a test
//! used every response it scripted.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::controller::Pacer;
use crate::core::types::{BackendKind, Observation, Platform, Prediction};
use crate::io::backend::Backend;
use crate::io::policy::Policy;

/// Backend whose captures and executions succeed unless told otherwise.
///
/// Failures are keyed by 1-indexed call number.
pub struct ScriptedBackend {
    platform: Platform,
    kind: BackendKind,
    capture_failures: HashMap<u32, String>,
    exec_failures: HashMap<u32, String>,
    captures: Cell<u32>,
    exec_calls: Cell<u32>,
    executed: RefCell<Vec<String>>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            platform: Platform::Linux,
            kind: BackendKind::Local,
            capture_failures: HashMap::new(),
            exec_failures: HashMap::new(),
            captures: Cell::new(0),
            exec_calls: Cell::new(0),
            executed: RefCell::new(Vec::new()),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn failing_capture_on(mut self, call: u32, message: &str) -> Self {
        self.capture_failures.insert(call, message.to_string());
        self
    }

    pub fn failing_exec_on(mut self, call: u32, message: &str) -> Self {
        self.exec_failures.insert(call, message.to_string());
        self
    }

    pub fn captures(&self) -> u32 {
        self.captures.get()
    }

    /// Scripts passed to `exec`, including failed ones.
    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl Backend for ScriptedBackend {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        let call = self.captures.get() + 1;
        self.captures.set(call);
        if let Some(message) = self.capture_failures.get(&call) {
            return Err(anyhow!(message.clone()));
        }
        Ok(format!("frame-{call}").into_bytes())
    }

    fn exec(&self, script: &str) -> Result<()> {
        let call = self.exec_calls.get() + 1;
        self.exec_calls.set(call);
        self.executed.borrow_mut().push(script.to_string());
        if let Some(message) = self.exec_failures.get(&call) {
            return Err(anyhow!(message.clone()));
        }
        Ok(())
    }
}

/// Policy that replays queued responses and records what it was asked.
pub struct ScriptedPolicy {
    responses: VecDeque<std::result::Result<Prediction, String>>,
    fallback: Option<Prediction>,
    instructions: Vec<String>,
    observations: Vec<Vec<u8>>,
}

impl ScriptedPolicy {
    /// Replay `responses` in order; `Err` entries become policy faults.
    pub fn new(responses: Vec<std::result::Result<Prediction, String>>) -> Self {
        Self {
            responses: responses.into(),
            fallback: None,
            instructions: Vec::new(),
            observations: Vec::new(),
        }
    }

    /// Return `prediction` for every call.
    pub fn repeating(prediction: Prediction) -> Self {
        Self {
            fallback: Some(prediction),
            ..Self::new(Vec::new())
        }
    }

    /// Instructions received, one per call.
    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }

    /// Screenshot bytes received, one per call.
    pub fn observations(&self) -> &[Vec<u8>] {
        &self.observations
    }

    pub fn assert_drained(&self) -> Result<()> {
        if !self.responses.is_empty() {
            return Err(anyhow!(
                "scripted policy has {} unused responses",
                self.responses.len()
            ));
        }
        Ok(())
    }
}

impl Policy for ScriptedPolicy {
    fn predict(&mut self, instruction: &str, observation: &Observation) -> Result<Prediction> {
        self.instructions.push(instruction.to_string());
        self.observations.push(observation.screenshot.clone());
        match self.responses.pop_front() {
            Some(Ok(prediction)) => Ok(prediction),
            Some(Err(message)) => Err(anyhow!(message)),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("scripted policy exhausted")),
        }
    }
}

/// Pacer that records requested pauses instead of sleeping.
#[derive(Debug, Default)]
pub struct RecordingPacer {
    pauses: Vec<Duration>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> &[Duration] {
        &self.pauses
    }
}

impl Pacer for RecordingPacer {
    fn pause(&mut self, delay: Duration) {
        self.pauses.push(delay);
    }
}
