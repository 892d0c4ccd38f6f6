//! Pure step-controller state machine.
//!
//! Owns the instruction, the step counter and the completion debounce counter.
//! The orchestration layer feeds it one [`StepResult`] per cycle; every
//! transition is deterministic in (current state, last result).

use anyhow::{Result, anyhow};

use crate::core::types::{StepResult, StopReason};

/// Instruction used for exactly one cycle after a faulted step.
pub const CORRECTIVE_INSTRUCTION: &str = "The previous action failed. Try a different approach.";

/// Bounds that shape a task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimits {
    /// Maximum number of observe/decide/act cycles.
    pub max_steps: u32,
    /// Consecutive completion signals required before accepting completion.
    pub completion_threshold: u32,
}

impl Default for StepLimits {
    fn default() -> Self {
        Self {
            max_steps: 10,
            completion_threshold: 2,
        }
    }
}

impl StepLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(anyhow!("max_steps must be > 0"));
        }
        if self.completion_threshold == 0 {
            return Err(anyhow!("completion_threshold must be > 0"));
        }
        Ok(())
    }
}

/// Controller state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Next cycle to run (0-indexed).
    Running { step: u32 },
    Done { success: bool },
}

#[derive(Debug, Clone)]
pub struct StepMachine {
    limits: StepLimits,
    original: String,
    instruction: String,
    steps_taken: u32,
    completion_count: u32,
    done: Option<StopReason>,
}

impl StepMachine {
    pub fn new(instruction: impl Into<String>, limits: StepLimits) -> Self {
        let original = instruction.into();
        Self {
            limits,
            instruction: original.clone(),
            original,
            steps_taken: 0,
            completion_count: 0,
            done: None,
        }
    }

    pub fn state(&self) -> MachineState {
        match self.done {
            Some(reason) => MachineState::Done {
                success: reason == StopReason::Completed,
            },
            None => MachineState::Running {
                step: self.steps_taken,
            },
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.done
    }

    /// Instruction to hand to the policy for the next cycle.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn is_corrective(&self) -> bool {
        self.instruction == CORRECTIVE_INSTRUCTION && self.original != CORRECTIVE_INSTRUCTION
    }

    pub fn steps_taken(&self) -> u32 {
        self.steps_taken
    }

    pub fn completion_count(&self) -> u32 {
        self.completion_count
    }

    /// Apply the result of one cycle and return the resulting state.
    ///
    /// Results recorded after the machine is done are ignored.
    pub fn record(&mut self, result: StepResult) -> MachineState {
        if self.done.is_some() {
            return self.state();
        }
        self.steps_taken += 1;

        match result {
            StepResult::Idle => {
                self.completion_count += 1;
                self.instruction.clone_from(&self.original);
                if self.completion_count >= self.limits.completion_threshold {
                    self.done = Some(StopReason::Completed);
                    return self.state();
                }
            }
            StepResult::Executed => {
                self.completion_count = 0;
                self.instruction.clone_from(&self.original);
            }
            StepResult::Faulted(_) => {
                self.completion_count = 0;
                self.instruction = CORRECTIVE_INSTRUCTION.to_string();
            }
        }

        if self.steps_taken >= self.limits.max_steps {
            self.done = Some(StopReason::StepBudgetExhausted);
        }
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FaultPhase;

    fn limits(max_steps: u32, completion_threshold: u32) -> StepLimits {
        StepLimits {
            max_steps,
            completion_threshold,
        }
    }

    #[test]
    fn starts_running_at_step_zero_with_original_instruction() {
        let machine = StepMachine::new("solve the puzzle", StepLimits::default());
        assert_eq!(machine.state(), MachineState::Running { step: 0 });
        assert_eq!(machine.instruction(), "solve the puzzle");
        assert!(!machine.is_corrective());
    }

    #[test]
    fn budget_exhaustion_is_a_timeout() {
        for max_steps in 1..=5 {
            let mut machine = StepMachine::new("task", limits(max_steps, 2));
            let mut cycles = 0;
            while let MachineState::Running { .. } = machine.state() {
                machine.record(StepResult::Executed);
                cycles += 1;
            }
            assert_eq!(cycles, max_steps);
            assert_eq!(machine.state(), MachineState::Done { success: false });
            assert_eq!(
                machine.stop_reason(),
                Some(StopReason::StepBudgetExhausted)
            );
        }
    }

    #[test]
    fn single_idle_does_not_complete_with_threshold_two() {
        let mut machine = StepMachine::new("task", limits(10, 2));
        assert_eq!(
            machine.record(StepResult::Idle),
            MachineState::Running { step: 1 }
        );
        assert_eq!(machine.completion_count(), 1);
        assert_eq!(
            machine.record(StepResult::Idle),
            MachineState::Done { success: true }
        );
    }

    #[test]
    fn threshold_one_completes_on_first_idle() {
        let mut machine = StepMachine::new("task", limits(10, 1));
        assert_eq!(
            machine.record(StepResult::Idle),
            MachineState::Done { success: true }
        );
    }

    #[test]
    fn executed_step_resets_completion_counter() {
        let mut machine = StepMachine::new("task", limits(10, 2));
        machine.record(StepResult::Idle);
        machine.record(StepResult::Executed);
        assert_eq!(machine.completion_count(), 0);
        assert_eq!(
            machine.record(StepResult::Idle),
            MachineState::Running { step: 3 }
        );
    }

    #[test]
    fn fault_resets_completion_counter() {
        let mut machine = StepMachine::new("task", limits(10, 2));
        machine.record(StepResult::Idle);
        machine.record(StepResult::Faulted(FaultPhase::Capture));
        assert_eq!(machine.completion_count(), 0);
    }

    #[test]
    fn fault_sets_corrective_instruction_for_one_cycle() {
        let mut machine = StepMachine::new("open the menu", limits(10, 2));
        machine.record(StepResult::Executed);
        machine.record(StepResult::Faulted(FaultPhase::Exec));
        assert_eq!(machine.instruction(), CORRECTIVE_INSTRUCTION);
        assert!(machine.is_corrective());

        machine.record(StepResult::Executed);
        assert_eq!(machine.instruction(), "open the menu");
    }

    #[test]
    fn idle_after_fault_restores_instruction_and_counts() {
        let mut machine = StepMachine::new("task", limits(10, 3));
        machine.record(StepResult::Faulted(FaultPhase::Exec));
        machine.record(StepResult::Idle);
        assert_eq!(machine.instruction(), "task");
        assert!(!machine.is_corrective());
        machine.record(StepResult::Idle);
        assert_eq!(machine.completion_count(), 2);
    }

    #[test]
    fn completion_on_last_budgeted_step_is_success() {
        let mut machine = StepMachine::new("task", limits(2, 2));
        machine.record(StepResult::Idle);
        assert_eq!(
            machine.record(StepResult::Idle),
            MachineState::Done { success: true }
        );
        assert_eq!(machine.stop_reason(), Some(StopReason::Completed));
    }

    #[test]
    fn records_after_done_are_ignored() {
        let mut machine = StepMachine::new("task", limits(1, 2));
        machine.record(StepResult::Executed);
        let steps = machine.steps_taken();
        machine.record(StepResult::Faulted(FaultPhase::Exec));
        assert_eq!(machine.steps_taken(), steps);
        assert_eq!(machine.instruction(), "task");
    }

    #[test]
    fn limits_reject_zero_values() {
        assert!(limits(0, 2).validate().is_err());
        assert!(limits(3, 0).validate().is_err());
        assert!(StepLimits::default().validate().is_ok());
    }
}
