//! The closed set of tools the agent may call, their JSON schemas and typed
//! argument parsing.

use crate::proposal::Proposal;
use agenda_llm::ToolDefinition;
use agenda_tools::ToolError;
use agenda_tools::args::{
    optional_date, optional_string, optional_time, optional_u32_in_range, parse_date,
    require_non_empty, require_string,
};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetCalendarEvents,
    GetTodayEvents,
    GetTasks,
    ProposeCreateTask,
    ProposeEditTask,
    ProposeDeleteTask,
    ProposeCompleteTask,
    ProposeCreateEvent,
    ProposeEditEvent,
    ProposeDeleteEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    /// Runs immediately and refreshes the session snapshot.
    Read,
    /// Produces a proposal that waits for the user.
    Propose,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::GetCalendarEvents,
        ToolName::GetTodayEvents,
        ToolName::GetTasks,
        ToolName::ProposeCreateTask,
        ToolName::ProposeEditTask,
        ToolName::ProposeDeleteTask,
        ToolName::ProposeCompleteTask,
        ToolName::ProposeCreateEvent,
        ToolName::ProposeEditEvent,
        ToolName::ProposeDeleteEvent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetCalendarEvents => "get_calendar_events",
            Self::GetTodayEvents => "get_today_events",
            Self::GetTasks => "get_tasks",
            Self::ProposeCreateTask => "propose_create_task",
            Self::ProposeEditTask => "propose_edit_task",
            Self::ProposeDeleteTask => "propose_delete_task",
            Self::ProposeCompleteTask => "propose_complete_task",
            Self::ProposeCreateEvent => "propose_create_event",
            Self::ProposeEditEvent => "propose_edit_event",
            Self::ProposeDeleteEvent => "propose_delete_event",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn class(self) -> ToolClass {
        match self {
            Self::GetCalendarEvents | Self::GetTodayEvents | Self::GetTasks => ToolClass::Read,
            _ => ToolClass::Propose,
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::GetCalendarEvents => {
                "Get calendar events for the next N days. Use when user asks about their schedule, upcoming events, or what they have planned."
            }
            Self::GetTodayEvents => {
                "Get calendar events for today only. Use when user asks specifically about today's schedule."
            }
            Self::GetTasks => {
                "Get all incomplete tasks. Use when user asks about their tasks, todos, or what they need to do."
            }
            Self::ProposeCreateTask => {
                "Propose creating a new task. User will be asked to confirm before it's created. Use this when user wants to add a new task or todo."
            }
            Self::ProposeEditTask => {
                "Propose editing an existing task. User will confirm before changes are made. Use get_tasks first to find the task_id."
            }
            Self::ProposeDeleteTask => {
                "Propose deleting a task. User will confirm before deletion. Use get_tasks first to find the task_id."
            }
            Self::ProposeCompleteTask => {
                "Propose marking a task as complete. User will confirm before completion. Use get_tasks first to find the task_id."
            }
            Self::ProposeCreateEvent => {
                "Propose creating a new calendar event. User will confirm before creation. Use for scheduling meetings, appointments, reminders."
            }
            Self::ProposeEditEvent => {
                "Propose editing an existing calendar event. User will confirm before changes. Use get_calendar_events first to find event_id."
            }
            Self::ProposeDeleteEvent => {
                "Propose deleting a calendar event. User will confirm before deletion. Use get_calendar_events first to find event_id."
            }
        }
    }

    fn parameters(self) -> Value {
        const DATE: &str = r"^\d{4}-\d{2}-\d{2}$";
        const TIME: &str = r"^\d{2}:\d{2}$";
        match self {
            Self::GetCalendarEvents => json!({
                "type": "object",
                "properties": {
                    "days_ahead": {
                        "type": "integer", "minimum": 1, "maximum": 30, "default": 7,
                        "description": "Number of days to look ahead (1-30)"
                    }
                }
            }),
            Self::GetTodayEvents | Self::GetTasks => json!({
                "type": "object",
                "properties": {}
            }),
            Self::ProposeCreateTask => json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "minLength": 1, "description": "The task title - be specific and actionable"},
                    "notes": {"type": "string", "default": "", "description": "Optional additional notes or details"},
                    "due_date": {"type": "string", "pattern": DATE, "description": "Due date in YYYY-MM-DD format (e.g., 2025-01-15)"}
                },
                "required": ["title"]
            }),
            Self::ProposeEditTask => json!({
                "type": "object",
                "properties": {
                    "task_id": {"type": "string", "description": "The ID of the task to edit (from get_tasks)"},
                    "current_title": {"type": "string", "description": "The current title of the task (for user to see what's being edited)"},
                    "tasklist_id": {"type": "string", "description": "The task list ID (from get_tasks, uses default if not provided)"},
                    "title": {"type": "string", "minLength": 1, "description": "New title for the task"},
                    "notes": {"type": "string", "description": "New notes for the task"},
                    "due_date": {"type": "string", "pattern": DATE, "description": "New due date in YYYY-MM-DD format"}
                },
                "required": ["task_id", "current_title"]
            }),
            Self::ProposeDeleteTask | Self::ProposeCompleteTask => {
                let verb = if self == Self::ProposeDeleteTask {
                    "delete"
                } else {
                    "complete"
                };
                let gerund = if self == Self::ProposeDeleteTask {
                    "deleted"
                } else {
                    "completed"
                };
                json!({
                    "type": "object",
                    "properties": {
                        "task_id": {"type": "string", "description": format!("The ID of the task to {verb} (from get_tasks)")},
                        "task_title": {"type": "string", "description": format!("The title of the task being {gerund} (for user confirmation)")},
                        "tasklist_id": {"type": "string", "description": "The task list ID (from get_tasks)"}
                    },
                    "required": ["task_id", "task_title"]
                })
            }
            Self::ProposeCreateEvent => json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "minLength": 1, "description": "Event title/summary"},
                    "date": {"type": "string", "pattern": DATE, "description": "Event date in YYYY-MM-DD format (e.g., 2025-01-15)"},
                    "time": {"type": "string", "pattern": TIME, "description": "Event time in HH:MM 24-hour format (e.g., 14:30). Omit for all-day event."},
                    "duration_hours": {"type": "integer", "minimum": 1, "maximum": 24, "default": 1, "description": "Event duration in hours (1-24)"},
                    "location": {"type": "string", "default": "", "description": "Event location"},
                    "description": {"type": "string", "default": "", "description": "Event description or notes"}
                },
                "required": ["title", "date"]
            }),
            Self::ProposeEditEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "string", "description": "The ID of the event to edit (from get_calendar_events)"},
                    "current_title": {"type": "string", "description": "The current title of the event (for user to see what's being edited)"},
                    "current_datetime": {"type": "string", "description": "The current date/time of the event (for user context)"},
                    "title": {"type": "string", "minLength": 1, "description": "New title for the event"},
                    "date": {"type": "string", "pattern": DATE, "description": "New date in YYYY-MM-DD format"},
                    "time": {"type": "string", "pattern": TIME, "description": "New time in HH:MM 24-hour format"},
                    "location": {"type": "string", "description": "New location"},
                    "description": {"type": "string", "description": "New description"}
                },
                "required": ["event_id", "current_title"]
            }),
            Self::ProposeDeleteEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "string", "description": "The ID of the event to delete (from get_calendar_events)"},
                    "event_title": {"type": "string", "description": "The title of the event being deleted (for user confirmation)"},
                    "event_datetime": {"type": "string", "description": "The date/time of the event (for user context)"}
                },
                "required": ["event_id", "event_title"]
            }),
        }
    }
}

/// Schemas for every tool, in a stable order.
pub fn tool_definitions() -> agenda_llm::Result<Vec<ToolDefinition>> {
    ToolName::ALL
        .into_iter()
        .map(|t| ToolDefinition::validated(t.as_str(), t.description(), t.parameters()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest {
    CalendarEvents { days_ahead: u32 },
    TodayEvents,
    Tasks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCall {
    Read(ReadRequest),
    Propose(Proposal),
}

/// Raw JSON arguments as emitted by the model. Empty means no arguments.
pub fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(json!({})),
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

pub fn parse_call(tool: ToolName, args: &Value) -> Result<ParsedCall, ToolError> {
    let call = match tool {
        ToolName::GetCalendarEvents => ParsedCall::Read(ReadRequest::CalendarEvents {
            days_ahead: optional_u32_in_range(args, "days_ahead", 1, 30, 7)?,
        }),
        ToolName::GetTodayEvents => ParsedCall::Read(ReadRequest::TodayEvents),
        ToolName::GetTasks => ParsedCall::Read(ReadRequest::Tasks),
        ToolName::ProposeCreateTask => ParsedCall::Propose(Proposal::CreateTask {
            title: require_non_empty(args, "title")?,
            notes: optional_string(args, "notes")?.unwrap_or_default(),
            due_date: optional_date(args, "due_date")?,
        }),
        ToolName::ProposeEditTask => ParsedCall::Propose(Proposal::EditTask {
            task_id: require_non_empty(args, "task_id")?,
            current_title: require_string(args, "current_title")?,
            tasklist_id: optional_id(args, "tasklist_id")?,
            new_title: optional_non_empty(args, "title")?,
            new_notes: optional_string(args, "notes")?,
            new_due_date: optional_date(args, "due_date")?,
        }),
        ToolName::ProposeDeleteTask => ParsedCall::Propose(Proposal::DeleteTask {
            task_id: require_non_empty(args, "task_id")?,
            task_title: require_string(args, "task_title")?,
            tasklist_id: optional_id(args, "tasklist_id")?,
        }),
        ToolName::ProposeCompleteTask => ParsedCall::Propose(Proposal::CompleteTask {
            task_id: require_non_empty(args, "task_id")?,
            task_title: require_string(args, "task_title")?,
            tasklist_id: optional_id(args, "tasklist_id")?,
        }),
        ToolName::ProposeCreateEvent => ParsedCall::Propose(Proposal::CreateEvent {
            title: require_non_empty(args, "title")?,
            date: parse_date("date", &require_string(args, "date")?)?,
            time: optional_time(args, "time")?,
            duration_hours: optional_u32_in_range(args, "duration_hours", 1, 24, 1)?,
            location: optional_string(args, "location")?.unwrap_or_default(),
            description: optional_string(args, "description")?.unwrap_or_default(),
        }),
        ToolName::ProposeEditEvent => ParsedCall::Propose(Proposal::EditEvent {
            event_id: require_non_empty(args, "event_id")?,
            current_title: require_string(args, "current_title")?,
            current_datetime: optional_string(args, "current_datetime")?,
            new_title: optional_non_empty(args, "title")?,
            new_date: optional_date(args, "date")?,
            new_time: optional_time(args, "time")?,
            new_location: optional_string(args, "location")?,
            new_description: optional_string(args, "description")?,
        }),
        ToolName::ProposeDeleteEvent => ParsedCall::Propose(Proposal::DeleteEvent {
            event_id: require_non_empty(args, "event_id")?,
            event_title: require_string(args, "event_title")?,
            event_datetime: optional_string(args, "event_datetime")?,
        }),
    };
    Ok(call)
}

/// Present-but-blank is an error; absent is "leave unchanged".
fn optional_non_empty(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match optional_string(args, key)? {
        Some(v) if v.trim().is_empty() => Err(ToolError::InvalidArguments(format!(
            "key {key} must be non-empty when provided"
        ))),
        other => Ok(other),
    }
}

/// Blank identifiers are treated as absent.
fn optional_id(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    Ok(optional_string(args, key)?.filter(|v| !v.trim().is_empty()))
}
