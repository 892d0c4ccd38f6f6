//! Task-level harness tests for the step controller.
//!
//! These tests drive `Controller::run_task` through whole tasks with scripted
//! backends and policies to verify budget, completion debounce and
//! corrective-instruction behavior end to end.

use std::time::Duration;

use pilot::controller::{Controller, ControllerConfig};
use pilot::core::machine::{CORRECTIVE_INSTRUCTION, StepLimits};
use pilot::core::report::StepReport;
use pilot::core::types::{FaultPhase, Platform, Prediction, StepResult, StopReason};
use pilot::test_support::{RecordingPacer, ScriptedBackend, ScriptedPolicy};

fn config(max_steps: u32, completion_threshold: u32) -> ControllerConfig {
    ControllerConfig {
        limits: StepLimits {
            max_steps,
            completion_threshold,
        },
        step_delay: Duration::ZERO,
    }
}

fn run(
    backend: ScriptedBackend,
    policy: ScriptedPolicy,
    config: ControllerConfig,
    instruction: &str,
) -> (
    Controller<ScriptedBackend, ScriptedPolicy, RecordingPacer>,
    pilot::core::report::TaskOutcome,
    Vec<StepReport>,
) {
    let mut controller =
        Controller::new(backend, policy, config).with_pacer(RecordingPacer::default());
    let mut reports = Vec::new();
    let outcome = controller
        .run_task(instruction, |report| reports.push(report.clone()))
        .expect("run task");
    (controller, outcome, reports)
}

/// Budget of 3, every action succeeds: exactly 3 steps, timeout, no corrective instruction.
#[test]
fn always_acting_policy_times_out_after_budget() {
    let (controller, outcome, reports) = run(
        ScriptedBackend::new(),
        ScriptedPolicy::repeating(Prediction::act("pyautogui.press('right')")),
        config(3, 2),
        "reach the exit",
    );

    assert!(!outcome.success);
    assert_eq!(outcome.stop, StopReason::StepBudgetExhausted);
    assert_eq!(outcome.steps_executed, 3);
    assert_eq!(outcome.faults, 0);
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|r| r.result == StepResult::Executed));
    assert!(reports.iter().all(|r| !r.corrective));
    assert_eq!(
        controller.policy().instructions(),
        &["reach the exit", "reach the exit", "reach the exit"]
    );
    assert_eq!(controller.backend().executed().len(), 3);
    assert_eq!(controller.backend().captures(), 3);
}

/// Budget of 10: actions on steps 1-2, completion signals on steps 3 and 4.
#[test]
fn two_consecutive_completion_signals_finish_the_task() {
    let policy = ScriptedPolicy::new(vec![
        Ok(Prediction::act("pyautogui.write('crane', interval=0.1)")),
        Ok(Prediction::act("pyautogui.press('enter')")),
        Ok(Prediction::complete()),
        Ok(Prediction::complete().with_info("solved")),
    ]);
    let (controller, outcome, reports) =
        run(ScriptedBackend::new(), policy, config(10, 2), "solve wordle");

    assert!(outcome.success);
    assert_eq!(outcome.stop, StopReason::Completed);
    assert_eq!(outcome.steps_executed, 4);
    assert_eq!(reports[2].result, StepResult::Idle);
    assert_eq!(reports[2].completion_count, 1);
    assert_eq!(reports[3].completion_count, 2);
    assert_eq!(reports[3].info.as_deref(), Some("solved"));
    controller.policy().assert_drained().expect("policy drained");
}

/// A lone completion signal followed by an action does not end the task.
#[test]
fn single_completion_signal_is_debounced() {
    let policy = ScriptedPolicy::new(vec![
        Ok(Prediction::complete()),
        Ok(Prediction::act("pyautogui.click(10, 10)")),
        Ok(Prediction::complete()),
        Ok(Prediction::act("pyautogui.click(20, 20)")),
    ]);
    let (_, outcome, reports) = run(ScriptedBackend::new(), policy, config(4, 2), "task");

    assert!(!outcome.success);
    assert_eq!(outcome.stop, StopReason::StepBudgetExhausted);
    assert_eq!(reports[1].completion_count, 0);
}

/// Threshold 1 reproduces the single-signal termination rule.
#[test]
fn threshold_of_one_stops_on_first_completion_signal() {
    let policy = ScriptedPolicy::new(vec![
        Ok(Prediction::act("pyautogui.click()")),
        Ok(Prediction::complete()),
    ]);
    let (_, outcome, _) = run(ScriptedBackend::new(), policy, config(10, 1), "task");
    assert!(outcome.success);
    assert_eq!(outcome.steps_executed, 2);
}

/// Failure on step 2, success on step 3: step 3 sees the corrective instruction,
/// step 4 sees the original again.
#[test]
fn execution_fault_mutates_next_instruction_only() {
    let policy = ScriptedPolicy::repeating(Prediction::act("pyautogui.hotkey('ctrl', 'r')"));
    let backend = ScriptedBackend::new().failing_exec_on(2, "FailSafeException: mouse in corner");
    let (controller, outcome, reports) = run(backend, policy, config(4, 2), "restart the level");

    assert_eq!(
        controller.policy().instructions(),
        &[
            "restart the level",
            "restart the level",
            CORRECTIVE_INSTRUCTION,
            "restart the level",
        ]
    );
    assert_eq!(reports[1].result, StepResult::Faulted(FaultPhase::Exec));
    assert_eq!(
        reports[1].error.as_deref(),
        Some("FailSafeException: mouse in corner")
    );
    assert!(reports[2].corrective);
    assert!(!reports[3].corrective);
    assert_eq!(outcome.faults, 1);
    assert_eq!(outcome.steps_executed, 4);
}

/// Repeated failures keep the corrective instruction in place.
#[test]
fn consecutive_faults_keep_corrective_instruction() {
    let policy = ScriptedPolicy::repeating(Prediction::act("pyautogui.click()"));
    let backend = ScriptedBackend::new()
        .failing_exec_on(1, "first")
        .failing_exec_on(2, "second");
    let (controller, outcome, _) = run(backend, policy, config(3, 2), "task");

    assert_eq!(
        controller.policy().instructions(),
        &["task", CORRECTIVE_INSTRUCTION, CORRECTIVE_INSTRUCTION]
    );
    assert_eq!(outcome.faults, 2);
}

/// A fault between two completion signals resets the debounce counter.
#[test]
fn fault_between_completion_signals_resets_debounce() {
    let policy = ScriptedPolicy::new(vec![
        Ok(Prediction::complete()),
        Ok(Prediction::act("pyautogui.click()")),
        Ok(Prediction::complete()),
        Ok(Prediction::complete()),
    ]);
    let backend = ScriptedBackend::new().failing_exec_on(1, "boom");
    let (_, outcome, reports) = run(backend, policy, config(10, 2), "task");

    assert_eq!(reports[1].completion_count, 0);
    assert!(outcome.success);
    assert_eq!(outcome.steps_executed, 4);
}

/// Every step captures a fresh observation.
#[test]
fn observations_are_captured_fresh_each_step() {
    let (controller, _, _) = run(
        ScriptedBackend::new(),
        ScriptedPolicy::repeating(Prediction::act("pyautogui.press('a')")),
        config(3, 2),
        "task",
    );
    assert_eq!(
        controller.policy().observations(),
        &[
            b"frame-1".to_vec(),
            b"frame-2".to_vec(),
            b"frame-3".to_vec()
        ]
    );
}

/// Budgets of every size bound the number of cycles.
#[test]
fn budget_bounds_cycles_for_any_size() {
    for max_steps in 1..=6 {
        let (controller, outcome, reports) = run(
            ScriptedBackend::new().with_platform(Platform::Darwin),
            ScriptedPolicy::repeating(Prediction::act("pyautogui.press('space')")),
            config(max_steps, 2),
            "task",
        );
        assert_eq!(reports.len() as u32, max_steps);
        assert_eq!(outcome.steps_executed, max_steps);
        assert_eq!(controller.backend().captures(), max_steps);
        assert_eq!(controller.pacer().pauses().len() as u32, max_steps - 1);
    }
}

/// The same controller can run several tasks in one session.
#[test]
fn session_runs_multiple_tasks_with_fresh_state() {
    let policy = ScriptedPolicy::new(vec![
        Ok(Prediction::act("pyautogui.click()")),
        Ok(Prediction::act("pyautogui.click()")),
        Ok(Prediction::complete()),
        Ok(Prediction::complete()),
    ]);
    let backend = ScriptedBackend::new().failing_exec_on(2, "boom");
    let mut controller =
        Controller::new(backend, policy, config(2, 2)).with_pacer(RecordingPacer::default());

    let first = controller.run_task("first task", |_| {}).expect("first");
    assert!(!first.success);

    let second = controller.run_task("second task", |_| {}).expect("second");
    assert!(second.success);
    assert_eq!(
        controller.policy().instructions(),
        &["first task", "first task", "second task", "second task"]
    );
}
