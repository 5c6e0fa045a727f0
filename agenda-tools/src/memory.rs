//! Process-local planner used for offline runs and tests.

use crate::error::{Result, ToolError};
use crate::traits::{MutationBackend, ReadBackend};
use crate::types::{Event, EventPatch, MutationOutcome, NewEvent, NewTask, Task, TaskPatch};
use async_trait::async_trait;
use std::sync::Mutex;

const DEFAULT_LIST_ID: &str = "default";

/// A write the planner received, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMutation {
    CreateTask(NewTask),
    EditTask {
        task_id: String,
        tasklist_id: Option<String>,
        patch: TaskPatch,
    },
    DeleteTask {
        task_id: String,
        tasklist_id: Option<String>,
    },
    CompleteTask {
        task_id: String,
        tasklist_id: Option<String>,
    },
    CreateEvent(NewEvent),
    EditEvent {
        event_id: String,
        patch: EventPatch,
    },
    DeleteEvent {
        event_id: String,
    },
}

#[derive(Default)]
struct PlannerState {
    events: Vec<Event>,
    tasks: Vec<Task>,
    next_id: u64,
    mutations: Vec<RecordedMutation>,
    read_failure: Option<String>,
    mutation_failure: Option<String>,
}

#[derive(Default)]
pub struct InMemoryPlanner {
    state: Mutex<PlannerState>,
}

impl InMemoryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(self, events: Vec<Event>) -> Self {
        self.lock().events = events;
        self
    }

    pub fn with_tasks(self, tasks: Vec<Task>) -> Self {
        self.lock().tasks = tasks;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    pub fn mutations(&self) -> Vec<RecordedMutation> {
        self.lock().mutations.clone()
    }

    /// Makes every read fail with `message` until cleared with `None`.
    pub fn set_read_failure(&self, message: Option<&str>) {
        self.lock().read_failure = message.map(str::to_string);
    }

    /// Makes the next write fail with `message`.
    pub fn fail_next_mutation(&self, message: &str) {
        self.lock().mutation_failure = Some(message.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlannerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_mutation(&self, record: RecordedMutation) -> Result<std::sync::MutexGuard<'_, PlannerState>> {
        let mut state = self.lock();
        state.mutations.push(record);
        if let Some(message) = state.mutation_failure.take() {
            return Err(ToolError::ExecutionFailed(message));
        }
        Ok(state)
    }
}

impl PlannerState {
    fn allocate_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn task_mut(&mut self, task_id: &str) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| ToolError::NotFound(format!("task {task_id}")))
    }

    fn event_mut(&mut self, event_id: &str) -> Result<&mut Event> {
        self.events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| ToolError::NotFound(format!("event {event_id}")))
    }

    fn check_reads(&self) -> Result<()> {
        match &self.read_failure {
            Some(message) => Err(ToolError::ExecutionFailed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ReadBackend for InMemoryPlanner {
    async fn get_calendar_events(&self, _days_ahead: u32) -> Result<Vec<Event>> {
        let state = self.lock();
        state.check_reads()?;
        let mut events = state.events.clone();
        events.sort_by(|a, b| a.start.cmp(&b.start));
        Ok(events)
    }

    async fn get_tasks(&self) -> Result<Vec<Task>> {
        let state = self.lock();
        state.check_reads()?;
        Ok(state.tasks.clone())
    }
}

#[async_trait]
impl MutationBackend for InMemoryPlanner {
    async fn create_task(&self, task: &NewTask) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::CreateTask(task.clone()))?;
        let id = state.allocate_id("task");
        state.tasks.push(Task {
            id: id.clone(),
            tasklist_id: task
                .tasklist_id
                .clone()
                .unwrap_or_else(|| DEFAULT_LIST_ID.to_string()),
            title: task.title.clone(),
            notes: task.notes.clone(),
            due: task
                .due_date
                .map(|d| format!("{d}T00:00:00.000Z"))
                .unwrap_or_default(),
            list: "My Tasks".to_string(),
        });
        Ok(MutationOutcome::created(
            format!("Created task '{}'", task.title),
            Some(id),
        ))
    }

    async fn edit_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
        patch: &TaskPatch,
    ) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::EditTask {
            task_id: task_id.to_string(),
            tasklist_id: tasklist_id.map(str::to_string),
            patch: patch.clone(),
        })?;
        let task = state.task_mut(task_id)?;
        if let Some(title) = &patch.title {
            task.title = title.clone();
        }
        if let Some(notes) = &patch.notes {
            task.notes = notes.clone();
        }
        if let Some(due) = patch.due_date {
            task.due = format!("{due}T00:00:00.000Z");
        }
        Ok(MutationOutcome::succeeded(format!(
            "Updated task '{}'",
            task.title
        )))
    }

    async fn delete_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::DeleteTask {
            task_id: task_id.to_string(),
            tasklist_id: tasklist_id.map(str::to_string),
        })?;
        state.task_mut(task_id)?;
        state.tasks.retain(|t| t.id != task_id);
        Ok(MutationOutcome::succeeded("Task deleted"))
    }

    async fn complete_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::CompleteTask {
            task_id: task_id.to_string(),
            tasklist_id: tasklist_id.map(str::to_string),
        })?;
        let title = state.task_mut(task_id)?.title.clone();
        state.tasks.retain(|t| t.id != task_id);
        Ok(MutationOutcome::succeeded(format!("Completed task '{title}'")))
    }

    async fn create_event(&self, event: &NewEvent) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::CreateEvent(event.clone()))?;
        let id = state.allocate_id("event");
        let start = match event.time {
            Some(time) => event.date.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => event.date.to_string(),
        };
        state.events.push(Event {
            id: id.clone(),
            title: event.title.clone(),
            start,
            description: event.description.clone(),
            location: event.location.clone(),
        });
        Ok(MutationOutcome::created(
            format!("Created event '{}'", event.title),
            Some(id),
        ))
    }

    async fn edit_event(&self, event_id: &str, patch: &EventPatch) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::EditEvent {
            event_id: event_id.to_string(),
            patch: patch.clone(),
        })?;
        let event = state.event_mut(event_id)?;
        if let Some(title) = &patch.title {
            event.title = title.clone();
        }
        if let Some(description) = &patch.description {
            event.description = description.clone();
        }
        if let Some(location) = &patch.location {
            event.location = location.clone();
        }
        match (patch.date, patch.time) {
            (Some(date), Some(time)) => {
                event.start = date.and_time(time).format("%Y-%m-%dT%H:%M:%S").to_string();
            }
            (Some(date), None) => {
                let rest = event.start.get(10..).unwrap_or_default().to_string();
                event.start = format!("{date}{rest}");
            }
            (None, Some(time)) => {
                let day = event.start.get(..10).unwrap_or_default().to_string();
                event.start = format!("{day}T{}:00", time.format("%H:%M"));
            }
            (None, None) => {}
        }
        Ok(MutationOutcome::succeeded(format!(
            "Updated event '{}'",
            event.title
        )))
    }

    async fn delete_event(&self, event_id: &str) -> Result<MutationOutcome> {
        let mut state = self.begin_mutation(RecordedMutation::DeleteEvent {
            event_id: event_id.to_string(),
        })?;
        state.event_mut(event_id)?;
        state.events.retain(|e| e.id != event_id);
        Ok(MutationOutcome::succeeded("Event deleted"))
    }
}
