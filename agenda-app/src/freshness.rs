//! Which entity IDs the agent has legitimately observed, and for how long.
//!
//! A mutation proposal may only target an ID returned by the most recent read
//! of its kind, and only while that read is younger than the TTL.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Calendar,
    Tasks,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::Tasks => "tasks",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of "now". Injected so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why a proposal target was refused. The message is shown to the agent
/// verbatim and names the read it should perform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{}", stale_message(.0))]
    Stale(EntityKind),
    #[error("{}", unknown_id_message(.kind, .id))]
    UnknownId { kind: EntityKind, id: String },
}

fn stale_message(kind: &EntityKind) -> String {
    match kind {
        EntityKind::Calendar => {
            "Calendar data is stale. Call get_calendar_events first to get current data."
                .to_string()
        }
        EntityKind::Tasks => {
            "Task data is stale. Call get_tasks first to get current data.".to_string()
        }
    }
}

fn unknown_id_message(kind: &EntityKind, id: &str) -> String {
    match kind {
        EntityKind::Calendar => format!(
            "Event ID '{id}' not found in recent calendar fetch. Call get_calendar_events first."
        ),
        EntityKind::Tasks => {
            format!("Task ID '{id}' not found in recent tasks fetch. Call get_tasks first.")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    allowed_event_ids: HashSet<String>,
    allowed_task_ids: HashSet<String>,
    calendar_fetched_at: Option<DateTime<Utc>>,
    tasks_fetched_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Replaces the allowed set for `kind` with `ids`. Never merges.
    pub fn record_read<I>(&mut self, kind: EntityKind, ids: I, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = String>,
    {
        let ids: HashSet<String> = ids.into_iter().collect();
        tracing::debug!(kind = %kind, ids = ids.len(), "session snapshot replaced");
        match kind {
            EntityKind::Calendar => {
                self.allowed_event_ids = ids;
                self.calendar_fetched_at = Some(now);
            }
            EntityKind::Tasks => {
                self.allowed_task_ids = ids;
                self.tasks_fetched_at = Some(now);
            }
        }
    }

    pub fn is_fresh(&self, kind: EntityKind, now: DateTime<Utc>, ttl: TimeDelta) -> bool {
        let fetched_at = match kind {
            EntityKind::Calendar => self.calendar_fetched_at,
            EntityKind::Tasks => self.tasks_fetched_at,
        };
        fetched_at.is_some_and(|at| now.signed_duration_since(at) < ttl)
    }

    pub fn validate(
        &self,
        kind: EntityKind,
        id: &str,
        now: DateTime<Utc>,
        ttl: TimeDelta,
    ) -> Result<(), ValidationError> {
        if !self.is_fresh(kind, now, ttl) {
            return Err(ValidationError::Stale(kind));
        }
        let allowed = match kind {
            EntityKind::Calendar => &self.allowed_event_ids,
            EntityKind::Tasks => &self.allowed_task_ids,
        };
        if !allowed.contains(id) {
            return Err(ValidationError::UnknownId {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Clock;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};
    use std::sync::Mutex;

    /// A clock that only moves when told to.
    pub(crate) struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Self {
            let start = Utc
                .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
                .single()
                .expect("valid start instant");
            Self {
                now: Mutex::new(start),
            }
        }

        pub(crate) fn advance_secs(&self, secs: i64) {
            let mut now = self.now.lock().expect("clock lock");
            *now += TimeDelta::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().expect("clock lock")
        }
    }
}
