//! Records describing what happened during a task.
//!
//! Produced by the controller, consumed by the CLI for operator output and by
//! the step log for persistence. Field order is the serialized order.

use serde::Serialize;

use crate::core::types::{StepResult, StopReason};

/// Wall-clock time spent in each phase of a step, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTimings {
    pub capture_ms: Option<u64>,
    pub predict_ms: Option<u64>,
    pub exec_ms: Option<u64>,
}

/// One observe/decide/act cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    /// 1-indexed step number.
    pub step: u32,
    pub max_steps: u32,
    /// Instruction handed to the policy for this step.
    pub instruction: String,
    /// Whether `instruction` was the corrective instruction.
    pub corrective: bool,
    pub info: Option<String>,
    /// Script chosen for execution, if any.
    pub action: Option<String>,
    pub result: StepResult,
    /// Human-readable fault message when `result` is a fault.
    pub error: Option<String>,
    /// Completion counter after this step.
    pub completion_count: u32,
    pub timings: PhaseTimings,
}

/// Final result of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub instruction: String,
    pub success: bool,
    pub stop: StopReason,
    pub steps_executed: u32,
    pub faults: u32,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
}
