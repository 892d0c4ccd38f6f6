//! Orchestration of a task: repeated observe/decide/act cycles.
//!
//! The [`Controller`] owns one backend and one policy for the whole session
//! and drives the pure [`StepMachine`] with the result of each cycle. Faults
//! inside a cycle (capture, prediction, execution) never end the task; they
//! switch the next instruction to the corrective one. Only step-log I/O
//! errors are returned.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument, warn};

use crate::core::machine::{MachineState, StepLimits, StepMachine};
use crate::core::report::{PhaseTimings, StepReport, TaskOutcome};
use crate::core::types::{Decision, FaultPhase, Observation, StepResult, StopReason};
use crate::io::backend::Backend;
use crate::io::config::PilotConfig;
use crate::io::policy::Policy;
use crate::io::step_log::StepLog;

/// Settings the controller reads once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    pub limits: StepLimits,
    /// Pause between consecutive steps (never before the first one).
    pub step_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            limits: StepLimits::default(),
            step_delay: Duration::from_millis(500),
        }
    }
}

impl From<&PilotConfig> for ControllerConfig {
    fn from(cfg: &PilotConfig) -> Self {
        Self {
            limits: cfg.limits(),
            step_delay: cfg.step_delay(),
        }
    }
}

/// Inter-step pacing.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
}

/// Pacer that blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&mut self, delay: Duration) {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

pub struct Controller<B, P, S = ThreadPacer> {
    backend: B,
    policy: P,
    pacer: S,
    config: ControllerConfig,
    step_log: Option<StepLog>,
    tasks_started: u32,
}

impl<B: Backend, P: Policy> Controller<B, P, ThreadPacer> {
    pub fn new(backend: B, policy: P, config: ControllerConfig) -> Self {
        Self {
            backend,
            policy,
            pacer: ThreadPacer,
            config,
            step_log: None,
            tasks_started: 0,
        }
    }
}

impl<B: Backend, P: Policy, S: Pacer> Controller<B, P, S> {
    pub fn with_pacer<T: Pacer>(self, pacer: T) -> Controller<B, P, T> {
        Controller {
            backend: self.backend,
            policy: self.policy,
            pacer,
            config: self.config,
            step_log: self.step_log,
            tasks_started: self.tasks_started,
        }
    }

    pub fn with_step_log(mut self, step_log: StepLog) -> Self {
        self.step_log = Some(step_log);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn pacer(&self) -> &S {
        &self.pacer
    }

    pub fn config(&self) -> ControllerConfig {
        self.config
    }

    /// Run one task until completion or until the step budget is exhausted.
    ///
    /// `on_step` is called after every cycle. A timeout is returned as an
    /// outcome with `success == false`, not as an error.
    #[instrument(skip_all, fields(max_steps = self.config.limits.max_steps))]
    pub fn run_task<F: FnMut(&StepReport)>(
        &mut self,
        instruction: &str,
        mut on_step: F,
    ) -> Result<TaskOutcome> {
        let start = Instant::now();
        let started_at = Utc::now();
        self.tasks_started += 1;
        let task_id = format!(
            "{}-{}",
            started_at.format("%Y%m%dT%H%M%S"),
            self.tasks_started
        );
        info!(%task_id, kind = %self.backend.kind(), platform = %self.backend.platform(), "task started");

        let mut machine = StepMachine::new(instruction, self.config.limits);
        let keep_observation = self.step_log.is_some();
        let mut faults = 0u32;

        while let MachineState::Running { step } = machine.state() {
            if step > 0 {
                self.pacer.pause(self.config.step_delay);
            }

            let step_instruction = machine.instruction().to_string();
            let corrective = machine.is_corrective();
            let cycle = self.run_cycle(&step_instruction, keep_observation);
            if matches!(cycle.result, StepResult::Faulted(_)) {
                faults += 1;
            }
            machine.record(cycle.result);

            let report = StepReport {
                step: step + 1,
                max_steps: self.config.limits.max_steps,
                instruction: step_instruction,
                corrective,
                info: cycle.info,
                action: cycle.action,
                result: cycle.result,
                error: cycle.error,
                completion_count: machine.completion_count(),
                timings: cycle.timings,
            };
            if let Some(log) = &self.step_log {
                log.write_step(&task_id, &report, cycle.screenshot.as_deref())?;
            }
            on_step(&report);
        }

        let stop = machine
            .stop_reason()
            .ok_or_else(|| anyhow!("controller stopped without a stop reason"))?;
        let outcome = TaskOutcome {
            task_id,
            instruction: instruction.to_string(),
            success: stop == StopReason::Completed,
            stop,
            steps_executed: machine.steps_taken(),
            faults,
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ended_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            duration_ms: millis(start),
        };
        if let Some(log) = &self.step_log {
            log.write_summary(&outcome)?;
        }
        info!(
            task_id = %outcome.task_id,
            success = outcome.success,
            steps = outcome.steps_executed,
            faults,
            "task finished"
        );
        Ok(outcome)
    }

    fn run_cycle(&mut self, instruction: &str, keep_observation: bool) -> Cycle {
        let mut timings = PhaseTimings::default();

        let t = Instant::now();
        let screenshot = match self.backend.screenshot() {
            Ok(bytes) => bytes,
            Err(err) => return Cycle::fault(FaultPhase::Capture, &err, timings),
        };
        timings.capture_ms = Some(millis(t));

        let observation = Observation { screenshot };
        let t = Instant::now();
        let predicted = self.policy.predict(instruction, &observation);
        timings.predict_ms = Some(millis(t));
        let Observation { screenshot } = observation;
        let screenshot = keep_observation.then_some(screenshot);

        let prediction = match predicted {
            Ok(prediction) => prediction,
            Err(err) => {
                let mut cycle = Cycle::fault(FaultPhase::Predict, &err, timings);
                cycle.screenshot = screenshot;
                return cycle;
            }
        };
        let info = prediction.info().map(str::to_string);

        let script = match prediction.decision() {
            Decision::Complete => {
                debug!("policy signalled completion");
                return Cycle {
                    result: StepResult::Idle,
                    info,
                    action: None,
                    error: None,
                    timings,
                    screenshot,
                };
            }
            Decision::Act(script) => script,
        };

        let t = Instant::now();
        let executed = self.backend.exec(&script);
        timings.exec_ms = Some(millis(t));
        let (result, error) = match executed {
            Ok(()) => (StepResult::Executed, None),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "action failed");
                (StepResult::Faulted(FaultPhase::Exec), Some(format!("{err:#}")))
            }
        };
        Cycle {
            result,
            info,
            action: Some(script),
            error,
            timings,
            screenshot,
        }
    }
}

/// Everything one cycle produced, before it is folded into the state machine.
struct Cycle {
    result: StepResult,
    info: Option<String>,
    action: Option<String>,
    error: Option<String>,
    timings: PhaseTimings,
    screenshot: Option<Vec<u8>>,
}

impl Cycle {
    fn fault(phase: FaultPhase, err: &anyhow::Error, timings: PhaseTimings) -> Self {
        warn!(%phase, error = %format!("{err:#}"), "step fault");
        Self {
            result: StepResult::Faulted(phase),
            info: None,
            action: None,
            error: Some(format!("{err:#}")),
            timings,
            screenshot: None,
        }
    }
}

fn millis(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
