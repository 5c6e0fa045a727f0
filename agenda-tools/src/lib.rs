//! Calendar and task backends for the assistant.
//!
//! Reads are free to run at any time. Writes go through [`MutationBackend`]
//! and are only issued for proposals the user confirmed.

pub mod args;
mod error;
mod google;
mod memory;
mod traits;
mod types;

pub use error::{Result, ToolError};
pub use google::{GOOGLE_CALENDAR_BASE_URL, GOOGLE_TASKS_BASE_URL, GoogleAuth, GoogleConfig, GoogleWorkspace};
pub use memory::{InMemoryPlanner, RecordedMutation};
pub use traits::{MutationBackend, ReadBackend};
pub use types::{Event, EventPatch, MutationOutcome, NewEvent, NewTask, Task, TaskPatch};
