//! Per-task execution state.
//!
//! Tracks lifecycle, phase progress, errors, and metrics for one migration
//! task. Mutated only by the owning engine; once a terminal status is
//! reached the state is frozen and further transitions are ignored.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::engine::MigrationPhase;
use crate::report::MigrationOutcome;

/// Lifecycle status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Created but not started.
    Pending,
    /// Phases are executing.
    Running,
    /// All phases completed.
    Completed,
    /// A phase failed.
    Failed,
    /// Cancelled at a phase boundary.
    Cancelled,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Pending => write!(f, "pending"),
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl ExecutionStatus {
    /// Whether the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Size and timing metrics for one task.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Total bytes discovered for transfer.
    pub total_size: u64,
    /// Bytes transferred so far.
    pub processed_size: u64,
    /// Predicted total duration, once enough data exists.
    pub estimated_duration: Option<Duration>,
    /// Measured duration, set at terminal status.
    pub actual_duration: Option<Duration>,
    /// Observed throughput in bytes per second.
    pub throughput: Option<f64>,
}

/// One phase-attributed error.
#[derive(Debug, Clone)]
pub struct PhaseFailure {
    /// The phase the error is attributed to.
    pub phase: MigrationPhase,
    /// Error message.
    pub message: String,
    /// When the error was recorded.
    pub at: DateTime<Utc>,
}

/// Execution state for one migration task.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Unique task id.
    pub id: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// When the task started.
    pub start_time: Option<Instant>,
    /// When the task reached a terminal status.
    pub end_time: Option<Instant>,
    /// Phase currently executing.
    pub current_phase: Option<MigrationPhase>,
    /// Completed phases, unique, in insertion order.
    pub completed_phases: Vec<MigrationPhase>,
    /// All phases this task will visit.
    pub total_phases: Vec<MigrationPhase>,
    /// Phase-attributed errors.
    pub errors: Vec<PhaseFailure>,
    /// Non-fatal warnings (cleanup failures land here).
    pub warnings: Vec<String>,
    /// Size and timing metrics.
    pub metrics: ExecutionMetrics,
    /// Final outcome, set on success.
    pub result: Option<MigrationOutcome>,
}

impl ExecutionState {
    /// Create a pending state covering the given phases.
    pub fn new(id: impl Into<String>, total_phases: Vec<MigrationPhase>) -> Self {
        Self {
            id: id.into(),
            status: ExecutionStatus::Pending,
            start_time: None,
            end_time: None,
            current_phase: None,
            completed_phases: Vec::new(),
            total_phases,
            errors: Vec::new(),
            warnings: Vec::new(),
            metrics: ExecutionMetrics::default(),
            result: None,
        }
    }

    /// Start the task and the duration clock.
    pub fn start(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Running;
        self.start_time = Some(Instant::now());
    }

    /// Enter a phase, completing the previous one.
    ///
    /// Re-entering the current phase is a no-op; a phase name never appears
    /// twice in `completed_phases`.
    pub fn set_current_phase(&mut self, phase: MigrationPhase) {
        if self.status.is_terminal() {
            return;
        }
        if let Some(prev) = self.current_phase {
            if prev == phase {
                return;
            }
            self.push_completed(prev);
        }
        self.current_phase = Some(phase);
    }

    /// Mark the current phase as completed without leaving it.
    pub fn complete_current_phase(&mut self) {
        if let Some(current) = self.current_phase {
            self.push_completed(current);
        }
    }

    /// Leave the current phase without completing it.
    ///
    /// A failed phase must not appear in `completed_phases` when a later
    /// phase (Cleanup) is entered.
    pub fn abandon_current_phase(&mut self) {
        self.current_phase = None;
    }

    fn push_completed(&mut self, phase: MigrationPhase) {
        if !self.completed_phases.contains(&phase) {
            self.completed_phases.push(phase);
        }
    }

    /// Mark the task as completed and stop the clock.
    pub fn complete(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.complete_current_phase();
        self.status = ExecutionStatus::Completed;
        self.stop_clock();
    }

    /// Mark the task as failed with a phase-attributed error.
    pub fn fail(&mut self, phase: MigrationPhase, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.errors.push(PhaseFailure {
            phase,
            message: message.into(),
            at: Utc::now(),
        });
        self.status = ExecutionStatus::Failed;
        self.stop_clock();
    }

    /// Mark the task as cancelled and stop the duration clock.
    ///
    /// In-flight external operations are not killed; the owning engine
    /// checks for cancellation at phase boundaries.
    pub fn cancel(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = ExecutionStatus::Cancelled;
        self.stop_clock();
    }

    /// Record a non-fatal warning.
    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Measured duration: running so far, or total at terminal status.
    pub fn duration(&self) -> Option<Duration> {
        let start = self.start_time?;
        Some(match self.end_time {
            Some(end) => end.duration_since(start),
            None => start.elapsed(),
        })
    }

    /// Completed phases as a share of all phases, in percent.
    pub fn percent_complete(&self) -> f64 {
        if self.total_phases.is_empty() {
            return 0.0;
        }
        (self.completed_phases.len() as f64 / self.total_phases.len() as f64) * 100.0
    }

    fn stop_clock(&mut self) {
        if self.end_time.is_none() {
            self.end_time = Some(Instant::now());
        }
        self.metrics.actual_duration = self.duration();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ExecutionState {
        ExecutionState::new("task-1", MigrationPhase::ORDERED.to_vec())
    }

    #[test]
    fn test_lifecycle() {
        let mut state = state();
        assert_eq!(state.status, ExecutionStatus::Pending);
        assert!(!state.status.is_terminal());

        state.start();
        assert_eq!(state.status, ExecutionStatus::Running);
        assert!(state.start_time.is_some());

        state.set_current_phase(MigrationPhase::Validation);
        state.set_current_phase(MigrationPhase::Discovery);
        assert_eq!(state.completed_phases, vec![MigrationPhase::Validation]);

        state.complete();
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert!(state.status.is_terminal());
        assert!(state.end_time.is_some());
        assert!(state.metrics.actual_duration.is_some());
        assert!(state.completed_phases.contains(&MigrationPhase::Discovery));
    }

    #[test]
    fn test_set_same_phase_twice_no_duplicate() {
        let mut state = state();
        state.start();

        state.set_current_phase(MigrationPhase::Export);
        state.set_current_phase(MigrationPhase::Export);
        state.set_current_phase(MigrationPhase::Import);
        state.set_current_phase(MigrationPhase::Import);

        assert_eq!(state.completed_phases, vec![MigrationPhase::Export]);

        state.complete_current_phase();
        state.complete_current_phase();
        assert_eq!(
            state.completed_phases,
            vec![MigrationPhase::Export, MigrationPhase::Import]
        );
    }

    #[test]
    fn test_abandoned_phase_not_completed() {
        let mut state = state();
        state.start();

        state.set_current_phase(MigrationPhase::Export);
        state.abandon_current_phase();
        state.set_current_phase(MigrationPhase::Cleanup);
        state.complete_current_phase();

        assert_eq!(state.completed_phases, vec![MigrationPhase::Cleanup]);
    }

    #[test]
    fn test_fail_records_phase_attribution() {
        let mut state = state();
        state.start();
        state.set_current_phase(MigrationPhase::Preflight);
        state.fail(MigrationPhase::Preflight, "target unreachable");

        assert_eq!(state.status, ExecutionStatus::Failed);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].phase, MigrationPhase::Preflight);
        assert!(state.errors[0].message.contains("unreachable"));
    }

    #[test]
    fn test_cancel_stops_clock() {
        let mut state = state();
        state.start();
        state.cancel();

        assert_eq!(state.status, ExecutionStatus::Cancelled);
        let frozen = state.duration().unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(state.duration().unwrap(), frozen);
    }

    #[test]
    fn test_terminal_state_frozen() {
        let mut state = state();
        state.start();
        state.complete();

        state.fail(MigrationPhase::Export, "too late");
        assert_eq!(state.status, ExecutionStatus::Completed);
        assert!(state.errors.is_empty());

        state.cancel();
        assert_eq!(state.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_percent_complete() {
        let mut state = state();
        state.start();
        assert_eq!(state.percent_complete(), 0.0);

        state.set_current_phase(MigrationPhase::Validation);
        state.set_current_phase(MigrationPhase::Discovery);
        let expected = 100.0 / MigrationPhase::ORDERED.len() as f64;
        assert!((state.percent_complete() - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ExecutionStatus::Pending.to_string(), "pending");
        assert_eq!(ExecutionStatus::Cancelled.to_string(), "cancelled");
    }
}
