use super::{GoogleWorkspace, str_field};
use crate::error::{Result, ToolError};
use crate::types::{Event, EventPatch, MutationOutcome, NewEvent};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use reqwest::Method;
use serde_json::json;

const MAX_EVENTS: u32 = 50;

impl GoogleWorkspace {
    pub(super) async fn list_events(&self, days_ahead: u32) -> Result<Vec<Event>> {
        let now = Utc::now();
        let time_max = now + Duration::days(i64::from(days_ahead));
        let url = self.calendar_url(&["calendars", &self.cfg.calendar_id, "events"])?;
        let body = self
            .call(
                Method::GET,
                url,
                &[
                    ("timeMin", now.to_rfc3339()),
                    ("timeMax", time_max.to_rfc3339()),
                    ("maxResults", MAX_EVENTS.to_string()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                ],
                None,
            )
            .await?;

        let events: Vec<Event> = body
            .get("items")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(event_from_json).collect())
            .unwrap_or_default();
        tracing::info!(count = events.len(), days_ahead, "fetched calendar events");
        Ok(events)
    }

    pub(super) async fn insert_event(&self, event: &NewEvent) -> Result<MutationOutcome> {
        let url = self.calendar_url(&["calendars", &self.cfg.calendar_id, "events"])?;
        let body = new_event_body(event, &self.cfg.timezone)?;
        let created = self.call(Method::POST, url, &[], Some(&body)).await?;
        tracing::info!(title = %event.title, "created event");
        Ok(MutationOutcome::created(
            format!("Created event '{}'", event.title),
            str_field(&created, "id"),
        ))
    }

    pub(super) async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<MutationOutcome> {
        let url = self.calendar_url(&["calendars", &self.cfg.calendar_id, "events", event_id])?;
        let mut event = self.call(Method::GET, url.clone(), &[], None).await?;
        apply_event_patch(&mut event, patch, &self.cfg.timezone)?;
        let updated = self.call(Method::PUT, url, &[], Some(&event)).await?;
        let title = str_field(&updated, "summary").unwrap_or_default();
        tracing::info!(%title, "updated event");
        Ok(MutationOutcome::succeeded(format!("Updated event '{title}'")))
    }

    pub(super) async fn remove_event(&self, event_id: &str) -> Result<MutationOutcome> {
        let url = self.calendar_url(&["calendars", &self.cfg.calendar_id, "events", event_id])?;
        self.call(Method::DELETE, url, &[], None).await?;
        tracing::info!(event_id, "deleted event");
        Ok(MutationOutcome::succeeded("Event deleted"))
    }
}

pub(super) fn event_from_json(v: &serde_json::Value) -> Option<Event> {
    let id = str_field(v, "id")?;
    let start = v.get("start")?;
    let start = str_field(start, "dateTime").or_else(|| str_field(start, "date"))?;
    Some(Event {
        id,
        title: str_field(v, "summary").unwrap_or_else(|| "No title".to_string()),
        start,
        description: str_field(v, "description").unwrap_or_default(),
        location: str_field(v, "location").unwrap_or_default(),
    })
}

pub(super) fn new_event_body(event: &NewEvent, timezone: &str) -> Result<serde_json::Value> {
    let (start, end) = match event.time {
        Some(time) => {
            let start = event.date.and_time(time);
            let end = start + Duration::hours(i64::from(event.duration_hours));
            (
                json!({"dateTime": start.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": timezone}),
                json!({"dateTime": end.format("%Y-%m-%dT%H:%M:%S").to_string(), "timeZone": timezone}),
            )
        }
        None => (
            json!({"date": event.date.to_string()}),
            json!({"date": next_day(event.date)?.to_string()}),
        ),
    };
    Ok(json!({
        "summary": event.title,
        "description": event.description,
        "location": event.location,
        "start": start,
        "end": end,
    }))
}

/// Overwrites the provided fields on a fetched event resource.
///
/// All-day events only move by date. Timed events keep their UTC offset and
/// duration while the start is moved to the new date and/or time.
pub(super) fn apply_event_patch(
    event: &mut serde_json::Value,
    patch: &EventPatch,
    default_timezone: &str,
) -> Result<()> {
    let Some(obj) = event.as_object_mut() else {
        return Err(ToolError::ExecutionFailed(
            "event resource is not an object".to_string(),
        ));
    };
    if let Some(title) = patch.title.as_deref().filter(|t| !t.trim().is_empty()) {
        obj.insert("summary".to_string(), json!(title));
    }
    if let Some(description) = &patch.description {
        obj.insert("description".to_string(), json!(description));
    }
    if let Some(location) = &patch.location {
        obj.insert("location".to_string(), json!(location));
    }

    let start = obj.get("start").cloned().unwrap_or(serde_json::Value::Null);
    let is_all_day = start.get("date").and_then(|v| v.as_str()).is_some();

    if is_all_day {
        if let Some(date) = patch.date {
            obj.insert("start".to_string(), json!({"date": date.to_string()}));
            obj.insert("end".to_string(), json!({"date": next_day(date)?.to_string()}));
        }
        return Ok(());
    }
    if patch.date.is_none() && patch.time.is_none() {
        return Ok(());
    }

    let end = obj.get("end").cloned().unwrap_or(serde_json::Value::Null);
    let existing_start = parse_event_datetime(&start, "start")?;
    let existing_end = parse_event_datetime(&end, "end")?;
    let duration = existing_end - existing_start;
    let timezone = str_field(&start, "timeZone").unwrap_or_else(|| default_timezone.to_string());

    let new_date = patch.date.unwrap_or_else(|| existing_start.date_naive());
    let new_time = patch.time.unwrap_or_else(|| existing_start.time());
    let offset = *existing_start.offset();
    let new_start = offset
        .from_local_datetime(&new_date.and_time(new_time))
        .single()
        .ok_or_else(|| ToolError::ExecutionFailed("ambiguous event start".to_string()))?;
    let new_end = new_start + duration;

    obj.insert(
        "start".to_string(),
        json!({"dateTime": new_start.to_rfc3339(), "timeZone": timezone}),
    );
    obj.insert(
        "end".to_string(),
        json!({"dateTime": new_end.to_rfc3339(), "timeZone": timezone}),
    );
    Ok(())
}

fn parse_event_datetime(v: &serde_json::Value, which: &str) -> Result<DateTime<FixedOffset>> {
    let raw = v.get("dateTime").and_then(|x| x.as_str()).ok_or_else(|| {
        ToolError::ExecutionFailed(format!("event {which} is missing dateTime"))
    })?;
    DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ToolError::ExecutionFailed(format!("event {which} {raw:?}: {e}")))
}

fn next_day(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| ToolError::InvalidArguments(format!("date {date} is out of range")))
}
