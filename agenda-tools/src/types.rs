use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A calendar event as shown to the assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    /// RFC 3339 date-time for timed events, `YYYY-MM-DD` for all-day ones.
    pub start: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

/// An incomplete task from one of the user's task lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub tasklist_id: String,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub due: String,
    /// Human name of the containing list.
    #[serde(default)]
    pub list: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub notes: String,
    pub due_date: Option<NaiveDate>,
    /// Default list when `None`.
    pub tasklist_id: Option<String>,
}

/// Fields to overwrite on an existing task. `None` leaves the field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub date: NaiveDate,
    /// All-day event when `None`.
    pub time: Option<NaiveTime>,
    pub duration_hours: u32,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Normalized result of a write against the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifier of the created entity, when the operation creates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl MutationOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            id: None,
        }
    }

    pub fn created(message: impl Into<String>, id: Option<String>) -> Self {
        Self {
            id,
            ..Self::succeeded(message)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            id: None,
        }
    }
}
