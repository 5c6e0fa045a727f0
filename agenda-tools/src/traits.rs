use crate::error::Result;
use crate::types::{Event, EventPatch, MutationOutcome, NewEvent, NewTask, Task, TaskPatch};
use async_trait::async_trait;

/// Side-effect-free lookups the assistant may run at any time.
#[async_trait]
pub trait ReadBackend: Send + Sync {
    async fn get_calendar_events(&self, days_ahead: u32) -> Result<Vec<Event>>;

    async fn get_today_events(&self) -> Result<Vec<Event>> {
        self.get_calendar_events(1).await
    }

    async fn get_tasks(&self) -> Result<Vec<Task>>;
}

/// Writes. Only ever invoked for a proposal the user confirmed.
#[async_trait]
pub trait MutationBackend: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<MutationOutcome>;

    async fn edit_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
        patch: &TaskPatch,
    ) -> Result<MutationOutcome>;

    async fn delete_task(&self, task_id: &str, tasklist_id: Option<&str>)
    -> Result<MutationOutcome>;

    async fn complete_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome>;

    async fn create_event(&self, event: &NewEvent) -> Result<MutationOutcome>;

    async fn edit_event(&self, event_id: &str, patch: &EventPatch) -> Result<MutationOutcome>;

    async fn delete_event(&self, event_id: &str) -> Result<MutationOutcome>;
}
