//! Calendar/task backend selection, including the seeded in-memory planner
//! used by `--dev-backend`.

use crate::config::AgendaConfig;
use agenda_tools::{Event, GoogleWorkspace, InMemoryPlanner, MutationBackend, ReadBackend, Task};
use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, TimeDelta};
use std::sync::Arc;

/// The two halves of the planner. Reads feed the agent loop; writes are only
/// reachable through the dispatcher.
#[derive(Clone)]
pub struct Backends {
    pub name: &'static str,
    pub reads: Arc<dyn ReadBackend>,
    pub writes: Arc<dyn MutationBackend>,
}

pub fn build_backends(cfg: &AgendaConfig, dev_backend: bool) -> Result<Backends> {
    if dev_backend {
        let planner = Arc::new(seeded_planner(chrono::Local::now().date_naive()));
        tracing::info!(
            events = planner.events().len(),
            tasks = planner.tasks().len(),
            "using in-memory dev planner"
        );
        return Ok(Backends {
            name: "dev",
            reads: planner.clone(),
            writes: planner,
        });
    }

    let google_cfg = cfg.google_config().ok_or_else(|| {
        anyhow::anyhow!(
            "google credentials missing: set [google] client_id, client_secret and refresh_token \
             (or GOOGLE_* env vars), or pass --dev-backend"
        )
    })?;
    let workspace = Arc::new(GoogleWorkspace::new(google_cfg)?);
    tracing::info!(calendar_id = %cfg.google.calendar_id, "using google calendar and tasks");
    Ok(Backends {
        name: "google",
        reads: workspace.clone(),
        writes: workspace,
    })
}

/// A small week of sample data anchored on `today`.
pub fn seeded_planner(today: NaiveDate) -> InMemoryPlanner {
    let events = vec![
        event("dev-e1", "Team standup", at(today, 9, 30), "", "Zoom"),
        event(
            "dev-e2",
            "Lunch with Sam",
            at(today, 12, 0),
            "Try the new ramen place",
            "Downtown",
        ),
        event(
            "dev-e3",
            "Dentist",
            at(today + TimeDelta::days(2), 15, 0),
            "",
            "Smile Clinic",
        ),
        event(
            "dev-e4",
            "Company offsite",
            (today + TimeDelta::days(5)).format("%Y-%m-%d").to_string(),
            "All day",
            "",
        ),
    ];
    let tasks = vec![
        task("dev-t1", "Pay rent", "", Some(today + TimeDelta::days(1))),
        task("dev-t2", "Book flights", "Check prices for March", None),
        task("dev-t3", "Renew passport", "", Some(today + TimeDelta::days(14))),
    ];
    InMemoryPlanner::new().with_events(events).with_tasks(tasks)
}

fn at(day: NaiveDate, hour: i64, minute: i64) -> String {
    let start = day.and_time(NaiveTime::MIN) + TimeDelta::hours(hour) + TimeDelta::minutes(minute);
    start.and_utc().to_rfc3339()
}

fn event(id: &str, title: &str, start: String, description: &str, location: &str) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        start,
        description: description.to_string(),
        location: location.to_string(),
    }
}

fn task(id: &str, title: &str, notes: &str, due: Option<NaiveDate>) -> Task {
    Task {
        id: id.to_string(),
        tasklist_id: "dev-list".to_string(),
        title: title.to_string(),
        notes: notes.to_string(),
        due: due
            .map(|d| format!("{}T00:00:00.000Z", d.format("%Y-%m-%d")))
            .unwrap_or_default(),
        list: "My Tasks".to_string(),
    }
}
