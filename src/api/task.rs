use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use xenrpc_transport::{wire_enum, wire_record, Invoke};

use crate::api::TaskRef;
use crate::{Method, Release, Result, Session};

pub const GET_RECORD: Method = Method::new("task.get_record", Release::Rio);
pub const GET_ALL_RECORDS: Method = Method::new("task.get_all_records", Release::Rio);
pub const GET_STATUS: Method = Method::new("task.get_status", Release::Rio);
pub const GET_RESULT: Method = Method::new("task.get_result", Release::Rio);
pub const GET_ERROR_INFO: Method = Method::new("task.get_error_info", Release::Rio);
pub const GET_PROGRESS: Method = Method::new("task.get_progress", Release::Rio);
pub const CANCEL: Method = Method::new("task.cancel", Release::Rio);
pub const DESTROY: Method = Method::new("task.destroy", Release::Rio);

wire_enum! {
    pub enum TaskStatus {
        Pending => "pending",
        Success => "success",
        Failure => "failure",
        Cancelling => "cancelling",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    /// Whether the task has reached a final state. Unknown statuses are not final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

wire_record! {
    /// Server-side handle of a long-running operation
    pub struct TaskRecord {
        pub uuid: String => "uuid",
        pub name_label: String => "name_label",
        pub name_description: String => "name_description",
        pub status: TaskStatus => "status",
        /// Completion in `[0, 1]`
        pub progress: f64 => "progress",
        pub created: DateTime<Utc> => "created",
        pub finished: DateTime<Utc> => "finished",
        /// Encoded result, only meaningful once the task succeeded
        pub result: String => "result",
        /// Fault description, only meaningful once the task failed
        pub error_info: Vec<String> => "error_info",
        pub other_config: BTreeMap<String, String> => "other_config",
    }
}

/// `task` class operations.
///
/// The task bridge operations (`poll`, `result`, `wait`, ..) are implemented
/// in [crate::task].
pub struct Tasks<'a, T> {
    pub(crate) session: &'a Session<T>,
}

impl<'a, T> Tasks<'a, T> {
    pub(crate) fn new(session: &'a Session<T>) -> Self {
        Self { session }
    }
}

impl<T: Invoke> Tasks<'_, T> {
    pub async fn get_record(&self, task: &TaskRef) -> Result<TaskRecord> {
        self.session.call(GET_RECORD, (task,)).await
    }

    pub async fn get_all_records(&self) -> Result<HashMap<TaskRef, TaskRecord>> {
        self.session.call(GET_ALL_RECORDS, ()).await
    }

    pub async fn get_status(&self, task: &TaskRef) -> Result<TaskStatus> {
        self.session.call(GET_STATUS, (task,)).await
    }

    pub async fn get_result(&self, task: &TaskRef) -> Result<String> {
        self.session.call(GET_RESULT, (task,)).await
    }

    pub async fn get_error_info(&self, task: &TaskRef) -> Result<Vec<String>> {
        self.session.call(GET_ERROR_INFO, (task,)).await
    }

    pub async fn get_progress(&self, task: &TaskRef) -> Result<f64> {
        self.session.call(GET_PROGRESS, (task,)).await
    }

    /// Requests cancellation. The task moves to `cancelling` and later to
    /// `cancelled` unless it completes first.
    pub async fn cancel(&self, task: &TaskRef) -> Result<()> {
        self.session.call(CANCEL, (task,)).await
    }

    /// Removes the task from the server, tasks are never destroyed implicitly
    pub async fn destroy(&self, task: TaskRef) -> Result<()> {
        self.session.call(DESTROY, (&task,)).await
    }
}
