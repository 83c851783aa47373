//! Plan lifecycle transitions
//!
//! Every mutation of a plan's status goes through [`apply`], which validates
//! the event against the transition table before touching the record. Removal
//! (stop/reject) is not a status and is handled by the scheduler.

use chrono::{DateTime, Utc};
use sg_plan::{Amount, ExecutionPlan, PlanStatus};

/// Lifecycle transition errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Event not accepted in the current status
    #[error("cannot {event} a plan that is {from}")]
    Illegal {
        /// Status at the time of the event
        from: PlanStatus,
        /// Event name
        event: &'static str,
    },

    /// Step was already executed
    #[error("step {0} already executed")]
    StepAlreadyExecuted(usize),

    /// No step at the current index
    #[error("no step at index {index} (plan has {len})")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Sequence length
        len: usize,
    },
}

/// Input to the plan state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEvent {
    /// Owner accepted the plan
    Approve,
    /// Execution requested
    Start,
    /// Execution interrupted
    Pause,
    /// Execution continued
    Resume,
    /// The step at `current_index` was submitted
    StepSucceeded {
        /// Transaction hash
        hash: String,
        /// Submission time
        executed_at: DateTime<Utc>,
        /// Amount actually submitted
        resolved_amount: Amount,
    },
    /// The step at `current_index` was rejected
    StepFailed {
        /// Client-provided reason
        reason: String,
    },
}

impl PlanEvent {
    /// Event name used in errors and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::StepSucceeded { .. } => "record success for",
            Self::StepFailed { .. } => "record failure for",
        }
    }
}

/// Statuses reachable from `from` in one event
#[must_use]
pub fn allowed_transitions(from: PlanStatus) -> Vec<PlanStatus> {
    use PlanStatus::{Approved, Completed, Executing, Failed, Paused, PendingApproval};
    match from {
        PendingApproval => vec![Approved],
        Approved => vec![Executing],
        Executing => vec![Executing, Paused, Completed, Failed],
        Paused => vec![Executing],
        Completed | Failed => vec![],
    }
}

/// Validate a status change against the transition table
///
/// # Errors
/// `Illegal` if `to` is not reachable from `from`
pub fn validate_transition(
    from: PlanStatus,
    to: PlanStatus,
    event: &'static str,
) -> Result<(), TransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(TransitionError::Illegal { from, event })
    }
}

/// Apply `event` to `plan`, returning the new status
///
/// The plan is left untouched when the event is rejected.
///
/// # Errors
/// - `Illegal` if the event is not accepted in the current status
/// - `IndexOutOfRange` / `StepAlreadyExecuted` for a step outcome that does
///   not match the next pending step
pub fn apply(plan: &mut ExecutionPlan, event: PlanEvent) -> Result<PlanStatus, TransitionError> {
    let from = plan.status;
    let name = event.name();

    let to = match &event {
        PlanEvent::Approve => PlanStatus::Approved,
        PlanEvent::Start | PlanEvent::Resume => {
            // Start is only valid from approved, resume only from paused
            let expected = if matches!(event, PlanEvent::Start) {
                PlanStatus::Approved
            } else {
                PlanStatus::Paused
            };
            if from != expected {
                return Err(TransitionError::Illegal { from, event: name });
            }
            PlanStatus::Executing
        }
        PlanEvent::Pause => PlanStatus::Paused,
        PlanEvent::StepSucceeded { .. } | PlanEvent::StepFailed { .. } => {
            if from != PlanStatus::Executing {
                return Err(TransitionError::Illegal { from, event: name });
            }
            let len = plan.transaction_sequence.len();
            let index = plan.current_index;
            let step = plan
                .transaction_sequence
                .get(index)
                .ok_or(TransitionError::IndexOutOfRange { index, len })?;
            if step.executed {
                return Err(TransitionError::StepAlreadyExecuted(index));
            }
            match event {
                PlanEvent::StepFailed { .. } => PlanStatus::Failed,
                _ if index + 1 == len => PlanStatus::Completed,
                _ => PlanStatus::Executing,
            }
        }
    };

    validate_transition(from, to, name)?;

    match event {
        PlanEvent::StepSucceeded {
            hash,
            executed_at,
            resolved_amount,
        } => {
            let step = &mut plan.transaction_sequence[plan.current_index];
            step.executed = true;
            step.hash = Some(hash);
            step.executed_at = Some(executed_at);
            step.resolved_amount = Some(resolved_amount);
            plan.current_index += 1;
        }
        PlanEvent::StepFailed { reason } => plan.failure = Some(reason),
        _ => {}
    }
    plan.status = to;
    Ok(to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sg_plan::{ExecutionPlanner, WalletAddress};

    fn plan(steps: u32) -> ExecutionPlan {
        ExecutionPlanner::default()
            .generate(WalletAddress::new("0xabc"), Amount::from_whole(10), steps)
            .unwrap()
    }

    fn success() -> PlanEvent {
        PlanEvent::StepSucceeded {
            hash: "0x01".into(),
            executed_at: Utc::now(),
            resolved_amount: Amount::from_whole(1),
        }
    }

    #[test]
    fn happy_path_to_completion() {
        let mut p = plan(2);
        assert_eq!(apply(&mut p, PlanEvent::Approve), Ok(PlanStatus::Approved));
        assert_eq!(apply(&mut p, PlanEvent::Start), Ok(PlanStatus::Executing));
        assert_eq!(apply(&mut p, success()), Ok(PlanStatus::Executing));
        assert_eq!(p.current_index, 1);
        assert!(p.transaction_sequence[0].executed);
        assert_eq!(apply(&mut p, success()), Ok(PlanStatus::Completed));
        assert_eq!(p.current_index, 2);
        assert!(p.current_step().is_none());
    }

    #[test]
    fn cannot_start_before_approval() {
        let mut p = plan(4);
        let err = apply(&mut p, PlanEvent::Start).unwrap_err();
        assert_eq!(
            err,
            TransitionError::Illegal {
                from: PlanStatus::PendingApproval,
                event: "start"
            }
        );
        assert_eq!(p.status, PlanStatus::PendingApproval);
    }

    #[test]
    fn resume_requires_pause() {
        let mut p = plan(4);
        apply(&mut p, PlanEvent::Approve).unwrap();
        assert!(apply(&mut p, PlanEvent::Resume).is_err());
        apply(&mut p, PlanEvent::Start).unwrap();
        assert!(apply(&mut p, PlanEvent::Start).is_err());
        apply(&mut p, PlanEvent::Pause).unwrap();
        assert!(apply(&mut p, PlanEvent::Start).is_err());
        assert_eq!(apply(&mut p, PlanEvent::Resume), Ok(PlanStatus::Executing));
    }

    #[test]
    fn failure_keeps_index_and_records_reason() {
        let mut p = plan(4);
        apply(&mut p, PlanEvent::Approve).unwrap();
        apply(&mut p, PlanEvent::Start).unwrap();
        apply(&mut p, success()).unwrap();
        apply(&mut p, success()).unwrap();
        let status = apply(
            &mut p,
            PlanEvent::StepFailed {
                reason: "reverted".into(),
            },
        )
        .unwrap();
        assert_eq!(status, PlanStatus::Failed);
        assert_eq!(p.current_index, 2);
        assert!(!p.transaction_sequence[2].executed);
        assert_eq!(p.failure.as_deref(), Some("reverted"));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for status in [PlanStatus::Completed, PlanStatus::Failed] {
            assert!(allowed_transitions(status).is_empty());
            let mut p = plan(2);
            p.status = status;
            for event in [PlanEvent::Approve, PlanEvent::Start, PlanEvent::Pause, PlanEvent::Resume, success()] {
                assert!(apply(&mut p, event).is_err());
            }
        }
    }

    #[test]
    fn step_outcome_outside_executing_rejected() {
        let mut p = plan(2);
        apply(&mut p, PlanEvent::Approve).unwrap();
        assert!(apply(&mut p, success()).is_err());
        assert_eq!(p.current_index, 0);
    }

    #[test]
    fn already_executed_step_rejected() {
        let mut p = plan(2);
        p.status = PlanStatus::Executing;
        p.transaction_sequence[0].executed = true;
        assert_eq!(
            apply(&mut p, success()),
            Err(TransitionError::StepAlreadyExecuted(0))
        );
    }
}
