//! A pending mutation the user has not yet confirmed.
//!
//! Fields prefixed `current_` / `task_title` / `event_*` are a display-only
//! snapshot and are never passed to the backend.

use crate::catalog::ToolName;
use crate::freshness::EntityKind;
use chrono::{NaiveDate, NaiveTime};
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "proposal_type", rename_all = "snake_case")]
pub enum Proposal {
    CreateTask {
        title: String,
        notes: String,
        due_date: Option<NaiveDate>,
    },
    EditTask {
        task_id: String,
        current_title: String,
        tasklist_id: Option<String>,
        new_title: Option<String>,
        new_notes: Option<String>,
        new_due_date: Option<NaiveDate>,
    },
    DeleteTask {
        task_id: String,
        task_title: String,
        tasklist_id: Option<String>,
    },
    CompleteTask {
        task_id: String,
        task_title: String,
        tasklist_id: Option<String>,
    },
    CreateEvent {
        title: String,
        date: NaiveDate,
        #[serde(serialize_with = "serialize_hhmm")]
        time: Option<NaiveTime>,
        duration_hours: u32,
        location: String,
        description: String,
    },
    EditEvent {
        event_id: String,
        current_title: String,
        current_datetime: Option<String>,
        new_title: Option<String>,
        new_date: Option<NaiveDate>,
        #[serde(serialize_with = "serialize_hhmm")]
        new_time: Option<NaiveTime>,
        new_location: Option<String>,
        new_description: Option<String>,
    },
    DeleteEvent {
        event_id: String,
        event_title: String,
        event_datetime: Option<String>,
    },
}

impl Proposal {
    /// The existing entity this proposal acts on; `None` for creates.
    pub fn target(&self) -> Option<(EntityKind, &str)> {
        match self {
            Self::CreateTask { .. } | Self::CreateEvent { .. } => None,
            Self::EditTask { task_id, .. }
            | Self::DeleteTask { task_id, .. }
            | Self::CompleteTask { task_id, .. } => Some((EntityKind::Tasks, task_id)),
            Self::EditEvent { event_id, .. } | Self::DeleteEvent { event_id, .. } => {
                Some((EntityKind::Calendar, event_id))
            }
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Self::CreateTask { .. } => "Create Task",
            Self::EditTask { .. } => "Edit Task",
            Self::DeleteTask { .. } => "Delete Task",
            Self::CompleteTask { .. } => "Complete Task",
            Self::CreateEvent { .. } => "Create Event",
            Self::EditEvent { .. } => "Edit Event",
            Self::DeleteEvent { .. } => "Delete Event",
        }
    }

    /// Human-facing label/value pairs. Internal IDs and empty values are omitted.
    pub fn details(&self) -> Vec<(&'static str, String)> {
        let mut out = Details::default();
        match self {
            Self::CreateTask {
                title,
                notes,
                due_date,
            } => {
                out.text("Title", title);
                out.text("Notes", notes);
                out.date("Due date", due_date.as_ref());
            }
            Self::EditTask {
                current_title,
                new_title,
                new_notes,
                new_due_date,
                ..
            } => {
                out.text("Current", current_title);
                out.opt_text("New title", new_title.as_deref());
                out.opt_text("New notes", new_notes.as_deref());
                out.date("New due date", new_due_date.as_ref());
            }
            Self::DeleteTask { task_title, .. } | Self::CompleteTask { task_title, .. } => {
                out.text("Task", task_title);
            }
            Self::CreateEvent {
                title,
                date,
                time,
                duration_hours,
                location,
                description,
            } => {
                out.text("Title", title);
                out.date("Date", Some(date));
                out.time("Time", time.as_ref());
                out.text("Duration (hours)", &duration_hours.to_string());
                out.text("Location", location);
                out.text("Description", description);
            }
            Self::EditEvent {
                current_title,
                current_datetime,
                new_title,
                new_date,
                new_time,
                new_location,
                new_description,
                ..
            } => {
                out.text("Current", current_title);
                out.opt_text("Currently at", current_datetime.as_deref());
                out.opt_text("New title", new_title.as_deref());
                out.date("New date", new_date.as_ref());
                out.time("New time", new_time.as_ref());
                out.opt_text("New location", new_location.as_deref());
                out.opt_text("New description", new_description.as_deref());
            }
            Self::DeleteEvent {
                event_title,
                event_datetime,
                ..
            } => {
                out.text("Event", event_title);
                out.opt_text("Scheduled", event_datetime.as_deref());
            }
        }
        out.0
    }

    /// `**Action**` followed by one indented `Label: value` line per detail.
    pub fn render(&self) -> String {
        let details = self.details();
        let body = if details.is_empty() {
            "  (no details)".to_string()
        } else {
            details
                .iter()
                .map(|(label, value)| format!("  {label}: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!("**{}**\n{body}", self.action_name())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct Details(Vec<(&'static str, String)>);

impl Details {
    fn text(&mut self, label: &'static str, value: &str) {
        if !value.is_empty() {
            self.0.push((label, value.to_string()));
        }
    }

    fn opt_text(&mut self, label: &'static str, value: Option<&str>) {
        if let Some(value) = value {
            self.text(label, value);
        }
    }

    fn date(&mut self, label: &'static str, value: Option<&NaiveDate>) {
        if let Some(date) = value {
            self.0.push((label, date.format("%Y-%m-%d").to_string()));
        }
    }

    fn time(&mut self, label: &'static str, value: Option<&NaiveTime>) {
        if let Some(time) = value {
            self.0.push((label, time.format("%H:%M").to_string()));
        }
    }
}

fn serialize_hhmm<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(time) => s.serialize_str(&time.format("%H:%M").to_string()),
        None => s.serialize_none(),
    }
}

/// A queued proposal plus the tool call that produced it. The call id is
/// what the eventual tool result must answer; `proposal_id` is what the
/// user's buttons refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingProposalEntry {
    pub proposal_id: String,
    pub tool_call_id: String,
    pub tool: ToolName,
    pub proposal: Proposal,
}

impl PendingProposalEntry {
    pub fn new(tool_call_id: impl Into<String>, tool: ToolName, proposal: Proposal) -> Self {
        Self {
            proposal_id: uuid::Uuid::new_v4().simple().to_string(),
            tool_call_id: tool_call_id.into(),
            tool,
            proposal,
        }
    }
}
