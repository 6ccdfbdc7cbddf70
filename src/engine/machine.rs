//! Task lifecycle state machine.
//!
//! | From        | Event    | To          |
//! |-------------|----------|-------------|
//! | Pending     | start    | InProgress  |
//! | InProgress  | block    | Blocked     |
//! | Blocked     | unblock  | Pending     |
//! | InProgress  | complete | Done        |
//! | InProgress  | stop     | Pending     |
//! | Done        | reopen   | InProgress  |
//! | Done        | verify   | Verified    |
//! | Verified    | reopen   | InProgress  |
//!
//! Dependency and policy guards on `start` belong to the coordinator; this
//! module only knows the table and the evidence requirement on `verify`.

use chrono::{DateTime, Utc};

use crate::core::{CharterError, Result, TaskEvent, TaskResult, TaskStatus, TransitionError};

/// Look up the transition table.
pub fn next_status(from: TaskStatus, event: TaskEvent) -> Option<TaskStatus> {
    use TaskEvent as E;
    use TaskStatus as S;

    match (from, event) {
        (S::Pending, E::Start) => Some(S::InProgress),
        (S::InProgress, E::Block) => Some(S::Blocked),
        (S::Blocked, E::Unblock) => Some(S::Pending),
        (S::InProgress, E::Complete) => Some(S::Done),
        (S::InProgress, E::Stop) => Some(S::Pending),
        (S::Done | S::Verified, E::Reopen) => Some(S::InProgress),
        (S::Done, E::Verify) => Some(S::Verified),
        (S::Pending, E::Block | E::Unblock | E::Complete | E::Stop | E::Reopen | E::Verify)
        | (S::InProgress, E::Start | E::Unblock | E::Reopen | E::Verify)
        | (S::Blocked, E::Start | E::Block | E::Complete | E::Stop | E::Reopen | E::Verify)
        | (S::Done, E::Start | E::Block | E::Unblock | E::Complete | E::Stop)
        | (S::Verified, E::Start | E::Block | E::Unblock | E::Complete | E::Stop | E::Verify) => {
            None
        }
    }
}

/// Events accepted in a given status.
pub fn allowed_events(from: TaskStatus) -> Vec<TaskEvent> {
    TaskEvent::ALL.into_iter().filter(|e| next_status(from, *e).is_some()).collect()
}

/// Inputs recorded alongside a transition.
#[derive(Debug, Clone)]
pub struct TransitionContext<'a> {
    pub actor: &'a str,
    pub now: DateTime<Utc>,
    pub evidence: Option<&'a str>,
}

/// Compute the result after applying `event`.
///
/// The input is never modified; on error nothing changes.
pub fn apply(
    task_id: &str,
    current: &TaskResult,
    event: TaskEvent,
    ctx: &TransitionContext<'_>,
) -> Result<TaskResult> {
    let to = next_status(current.status, event).ok_or_else(|| TransitionError {
        task_id: task_id.to_string(),
        from: current.status,
        attempted: event.target(),
        event,
    })?;

    let evidence = ctx.evidence.map(str::trim).filter(|e| !e.is_empty());
    if event == TaskEvent::Verify && evidence.is_none() {
        return Err(CharterError::EvidenceRequired { task_id: task_id.to_string() });
    }

    let mut next = current.clone();
    next.status = to;
    match event {
        TaskEvent::Start => {
            next.owner = Some(ctx.actor.to_string());
            next.started_at = Some(ctx.now);
            next.completed_at = None;
        }
        TaskEvent::Complete => {
            next.completed_at = Some(ctx.now);
        }
        TaskEvent::Verify => {
            next.completed_at = Some(ctx.now);
            next.evidence = evidence.map(str::to_string);
        }
        TaskEvent::Reopen => {
            next.completed_at = None;
            next.evidence = None;
        }
        TaskEvent::Stop => {
            next.owner = None;
            next.started_at = None;
        }
        TaskEvent::Block | TaskEvent::Unblock => {}
    }

    Ok(next)
}
