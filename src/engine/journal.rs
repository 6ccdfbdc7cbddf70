//! Append-only audit journal.
//!
//! Events are only ever appended. Corrections are new events (a
//! `task.reopen` after a `task.complete`), never edits.

use chrono::{DateTime, Utc};

use crate::core::{Event, Result};
use crate::storage::{Repository, StorageResult};

/// Read/append view over a repository's event log.
#[derive(Debug)]
pub struct Journal<'r, R: Repository + ?Sized> {
    repo: &'r R,
}

impl<'r, R: Repository + ?Sized> Journal<'r, R> {
    pub fn new(repo: &'r R) -> Self {
        Self { repo }
    }

    /// Persist an event, stamping it with `now` if it has no timestamp.
    ///
    /// Returns the event as written. The raw storage error is returned so
    /// the caller can decide how to report a failed append.
    pub fn append(&self, mut event: Event, now: DateTime<Utc>) -> StorageResult<Event> {
        if event.timestamp.is_none() {
            event.timestamp = Some(now);
        }
        self.repo.append_event(&event)?;
        tracing::trace!(action = %event.action, actor = %event.actor, "journaled");
        Ok(event)
    }

    /// Every event in append order.
    pub fn load_all(&self) -> Result<Vec<Event>> {
        Ok(self.repo.load_events()?)
    }

    /// Most recent events first, optionally capped at `limit`.
    pub fn timeline(&self, limit: Option<usize>) -> Result<Vec<Event>> {
        let events = self.load_all()?;
        let take = limit.unwrap_or(events.len());
        Ok(events.into_iter().rev().take(take).collect())
    }

    /// Events that mention `task_id`, in append order.
    pub fn events_for_task(&self, task_id: &str) -> Result<Vec<Event>> {
        let mut events = self.load_all()?;
        events.retain(|e| e.task_id() == Some(task_id));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{actions, keys};
    use crate::storage::MemoryRepository;
    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_append_stamps_missing_timestamp() {
        let repo = MemoryRepository::new();
        let journal = Journal::new(&repo);

        let written = journal.append(Event::new("ana", actions::PROJECT_INIT), ts(9)).unwrap();
        assert_eq!(written.timestamp, Some(ts(9)));

        let pinned = Event::new("ana", actions::TIME_LOG).at(ts(7));
        let written = journal.append(pinned, ts(9)).unwrap();
        assert_eq!(written.timestamp, Some(ts(7)));
    }

    #[test]
    fn test_insertion_order_is_kept_over_timestamps() {
        let repo = MemoryRepository::new();
        let journal = Journal::new(&repo);
        journal.append(Event::new("a", "first").at(ts(12)), ts(12)).unwrap();
        journal.append(Event::new("a", "second").at(ts(8)), ts(12)).unwrap();

        let actions: Vec<_> = journal.load_all().unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["first", "second"]);

        // Loading twice has no side effects.
        assert_eq!(journal.load_all().unwrap(), journal.load_all().unwrap());
    }

    #[test]
    fn test_timeline_is_reversed_and_limited() {
        let repo = MemoryRepository::new();
        let journal = Journal::new(&repo);
        for action in ["a", "b", "c", "d"] {
            journal.append(Event::new("x", action), ts(10)).unwrap();
        }

        let all: Vec<_> = journal.timeline(None).unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(all, vec!["d", "c", "b", "a"]);

        let two: Vec<_> = journal.timeline(Some(2)).unwrap().into_iter().map(|e| e.action).collect();
        assert_eq!(two, vec!["d", "c"]);
    }

    #[test]
    fn test_events_for_task() {
        let repo = MemoryRepository::new();
        let journal = Journal::new(&repo);
        journal.append(Event::new("x", actions::TASK_START).with(keys::TASK_ID, "task-a"), ts(1)).unwrap();
        journal.append(Event::new("x", actions::TASK_START).with(keys::TASK_ID, "task-b"), ts(2)).unwrap();
        journal.append(Event::new("x", actions::TASK_COMPLETE).with(keys::TASK_ID, "task-a"), ts(3)).unwrap();

        let events = journal.events_for_task("task-a").unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_completion());
    }
}
