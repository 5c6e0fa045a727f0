use super::{GoogleWorkspace, str_field};
use crate::error::{Result, ToolError};
use crate::types::{MutationOutcome, NewTask, Task, TaskPatch};
use chrono::NaiveDate;
use reqwest::Method;
use serde_json::json;

impl GoogleWorkspace {
    pub(super) async fn list_open_tasks(&self) -> Result<Vec<Task>> {
        let lists = self.task_lists().await?;
        let mut out = Vec::new();
        for (list_id, list_title) in lists {
            let url = self.tasks_url(&["lists", &list_id, "tasks"])?;
            let body = self
                .call(
                    Method::GET,
                    url,
                    &[("showCompleted", "false".to_string())],
                    None,
                )
                .await?;
            let Some(items) = body.get("items").and_then(|v| v.as_array()) else {
                continue;
            };
            out.extend(items.iter().filter_map(|item| {
                Some(Task {
                    id: str_field(item, "id")?,
                    tasklist_id: list_id.clone(),
                    title: str_field(item, "title").unwrap_or_else(|| "No title".to_string()),
                    notes: str_field(item, "notes").unwrap_or_default(),
                    due: str_field(item, "due").unwrap_or_default(),
                    list: list_title.clone(),
                })
            }));
        }
        tracing::info!(count = out.len(), "fetched tasks");
        Ok(out)
    }

    pub(super) async fn insert_task(&self, task: &NewTask) -> Result<MutationOutcome> {
        let tasklist_id = self.resolve_tasklist(task.tasklist_id.as_deref()).await?;
        let mut body = json!({"title": task.title, "notes": task.notes});
        if let Some(due) = task.due_date {
            body["due"] = json!(due_timestamp(due));
        }
        let url = self.tasks_url(&["lists", &tasklist_id, "tasks"])?;
        let created = self.call(Method::POST, url, &[], Some(&body)).await?;
        tracing::info!(title = %task.title, "created task");
        Ok(MutationOutcome::created(
            format!("Created task '{}'", task.title),
            str_field(&created, "id"),
        ))
    }

    pub(super) async fn update_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
        patch: &TaskPatch,
    ) -> Result<MutationOutcome> {
        let tasklist_id = self.resolve_tasklist(tasklist_id).await?;
        let url = self.tasks_url(&["lists", &tasklist_id, "tasks", task_id])?;
        let mut task = self.fetch_task(url.clone()).await?;
        if let Some(title) = patch.title.as_deref().filter(|t| !t.trim().is_empty()) {
            task["title"] = json!(title);
        }
        if let Some(notes) = &patch.notes {
            task["notes"] = json!(notes);
        }
        if let Some(due) = patch.due_date {
            task["due"] = json!(due_timestamp(due));
        }
        let updated = self.call(Method::PUT, url, &[], Some(&task)).await?;
        let title = str_field(&updated, "title").unwrap_or_default();
        tracing::info!(%title, "updated task");
        Ok(MutationOutcome::succeeded(format!("Updated task '{title}'")))
    }

    pub(super) async fn remove_task(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        let tasklist_id = self.resolve_tasklist(tasklist_id).await?;
        let url = self.tasks_url(&["lists", &tasklist_id, "tasks", task_id])?;
        self.call(Method::DELETE, url, &[], None).await?;
        tracing::info!(task_id, "deleted task");
        Ok(MutationOutcome::succeeded("Task deleted"))
    }

    pub(super) async fn mark_task_completed(
        &self,
        task_id: &str,
        tasklist_id: Option<&str>,
    ) -> Result<MutationOutcome> {
        let tasklist_id = self.resolve_tasklist(tasklist_id).await?;
        let url = self.tasks_url(&["lists", &tasklist_id, "tasks", task_id])?;
        let mut task = self.fetch_task(url.clone()).await?;
        task["status"] = json!("completed");
        let updated = self.call(Method::PUT, url, &[], Some(&task)).await?;
        let title = str_field(&updated, "title").unwrap_or_default();
        tracing::info!(%title, "completed task");
        Ok(MutationOutcome::succeeded(format!("Completed task '{title}'")))
    }

    async fn fetch_task(&self, url: reqwest::Url) -> Result<serde_json::Value> {
        let task = self.call(Method::GET, url, &[], None).await?;
        if !task.is_object() {
            return Err(ToolError::ExecutionFailed(
                "task resource is not an object".to_string(),
            ));
        }
        Ok(task)
    }

    async fn task_lists(&self) -> Result<Vec<(String, String)>> {
        let url = self.tasks_url(&["users", "@me", "lists"])?;
        let body = self.call(Method::GET, url, &[], None).await?;
        Ok(body
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let id = str_field(item, "id")?;
                        let title = str_field(item, "title").unwrap_or_else(|| "Default".to_string());
                        Some((id, title))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// The explicit list, else the first list on the account.
    async fn resolve_tasklist(&self, tasklist_id: Option<&str>) -> Result<String> {
        if let Some(id) = tasklist_id.map(str::trim).filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        self.task_lists()
            .await?
            .into_iter()
            .next()
            .map(|(id, _)| id)
            .ok_or_else(|| ToolError::NotFound("account has no task lists".to_string()))
    }
}

fn due_timestamp(date: NaiveDate) -> String {
    format!("{}T00:00:00.000Z", date.format("%Y-%m-%d"))
}
