//! Turns a confirmed proposal into exactly one backend write.

use crate::proposal::Proposal;
use agenda_tools::{EventPatch, MutationBackend, MutationOutcome, NewEvent, NewTask, TaskPatch};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn MutationBackend>,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn MutationBackend>) -> Self {
        Self { backend }
    }

    /// Never fails: backend errors come back as an unsuccessful outcome.
    #[tracing::instrument(level = "info", skip_all, fields(action = proposal.action_name()))]
    pub async fn dispatch(&self, proposal: &Proposal) -> MutationOutcome {
        let started = Instant::now();
        let result = match proposal {
            Proposal::CreateTask {
                title,
                notes,
                due_date,
            } => {
                self.backend
                    .create_task(&NewTask {
                        title: title.clone(),
                        notes: notes.clone(),
                        due_date: *due_date,
                        tasklist_id: None,
                    })
                    .await
            }
            Proposal::EditTask {
                task_id,
                tasklist_id,
                new_title,
                new_notes,
                new_due_date,
                ..
            } => {
                let patch = TaskPatch {
                    title: new_title.clone(),
                    notes: new_notes.clone(),
                    due_date: *new_due_date,
                };
                self.backend
                    .edit_task(task_id, tasklist_id.as_deref(), &patch)
                    .await
            }
            Proposal::DeleteTask {
                task_id,
                tasklist_id,
                ..
            } => self.backend.delete_task(task_id, tasklist_id.as_deref()).await,
            Proposal::CompleteTask {
                task_id,
                tasklist_id,
                ..
            } => {
                self.backend
                    .complete_task(task_id, tasklist_id.as_deref())
                    .await
            }
            Proposal::CreateEvent {
                title,
                date,
                time,
                duration_hours,
                location,
                description,
            } => {
                self.backend
                    .create_event(&NewEvent {
                        title: title.clone(),
                        date: *date,
                        time: *time,
                        duration_hours: *duration_hours,
                        location: location.clone(),
                        description: description.clone(),
                    })
                    .await
            }
            Proposal::EditEvent {
                event_id,
                new_title,
                new_date,
                new_time,
                new_location,
                new_description,
                ..
            } => {
                let patch = EventPatch {
                    title: new_title.clone(),
                    date: *new_date,
                    time: *new_time,
                    location: new_location.clone(),
                    description: new_description.clone(),
                };
                self.backend.edit_event(event_id, &patch).await
            }
            Proposal::DeleteEvent { event_id, .. } => self.backend.delete_event(event_id).await,
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(outcome) => {
                tracing::info!(
                    success = outcome.success,
                    latency_ms,
                    "confirmed proposal executed"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, latency_ms, "confirmed proposal failed");
                MutationOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agenda_tools::{InMemoryPlanner, RecordedMutation, Task};
    use chrono::NaiveDate;

    fn planner_with_task() -> Arc<InMemoryPlanner> {
        Arc::new(InMemoryPlanner::new().with_tasks(vec![Task {
            id: "t1".to_string(),
            tasklist_id: "L1".to_string(),
            title: "Pay rent".to_string(),
            notes: String::new(),
            due: String::new(),
            list: "My Tasks".to_string(),
        }]))
    }

    #[tokio::test]
    async fn display_only_fields_never_reach_the_backend() {
        let planner = planner_with_task();
        let dispatcher = Dispatcher::new(planner.clone());
        let outcome = dispatcher
            .dispatch(&Proposal::EditTask {
                task_id: "t1".to_string(),
                current_title: "SHOULD NOT BE WRITTEN".to_string(),
                tasklist_id: Some("L1".to_string()),
                new_title: None,
                new_notes: None,
                new_due_date: NaiveDate::from_ymd_opt(2026, 3, 9),
            })
            .await;
        assert!(outcome.success);
        assert_eq!(
            planner.mutations(),
            vec![RecordedMutation::EditTask {
                task_id: "t1".to_string(),
                tasklist_id: Some("L1".to_string()),
                patch: TaskPatch {
                    title: None,
                    notes: None,
                    due_date: NaiveDate::from_ymd_opt(2026, 3, 9),
                },
            }]
        );
        assert_eq!(planner.tasks()[0].title, "Pay rent");
    }

    #[tokio::test]
    async fn backend_error_becomes_failed_outcome() {
        let planner = planner_with_task();
        planner.fail_next_mutation("quota exceeded");
        let dispatcher = Dispatcher::new(planner.clone());
        let outcome = dispatcher
            .dispatch(&Proposal::DeleteTask {
                task_id: "t1".to_string(),
                task_title: "Pay rent".to_string(),
                tasklist_id: None,
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap_or_default().contains("quota exceeded"));
        assert_eq!(planner.tasks().len(), 1);
    }

    #[tokio::test]
    async fn delete_event_issues_single_call() {
        let planner = Arc::new(InMemoryPlanner::new());
        let dispatcher = Dispatcher::new(planner.clone());
        let outcome = dispatcher
            .dispatch(&Proposal::DeleteEvent {
                event_id: "gone".to_string(),
                event_title: "Standup".to_string(),
                event_datetime: None,
            })
            .await;
        assert!(!outcome.success);
        assert_eq!(
            planner.mutations(),
            vec![RecordedMutation::DeleteEvent {
                event_id: "gone".to_string()
            }]
        );
    }
}
