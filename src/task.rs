//! Bridge between asynchronous server-side operations and client futures

use core::fmt;
use core::marker::PhantomData;
use core::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, trace};
use xenrpc_transport::{xmlrpc, Decode, DecodeError, DecodeErrorKind, Invoke, RpcFault, Value};

use crate::api::task::{TaskRecord, TaskStatus, Tasks, GET_RESULT};
use crate::api::TaskRef;
use crate::{codes, Error, Result, Session};

/// Reads a task result, which the server renders as an XML-RPC `<value>`
/// document. Anything else is taken verbatim.
fn task_result(raw: String) -> Result<Value> {
    let doc = raw.trim();
    if doc.is_empty() {
        return Ok(Value::String(String::new()));
    }
    if !doc.starts_with('<') {
        return Ok(Value::String(raw));
    }
    xmlrpc::parse_value(doc).map_err(|err| {
        DecodeError::new(DecodeErrorKind::Malformed(err.to_string()))
            .within(GET_RESULT.name)
            .into()
    })
}

impl<T: Invoke> Tasks<'_, T> {
    /// Returns the current status without blocking
    pub async fn poll(&self, task: &TaskRef) -> Result<TaskStatus> {
        self.get_status(task).await
    }

    /// Returns the outcome of a finished task.
    ///
    /// A task which has not reached a final state yields [Error::TaskNotFinished].
    /// A failed or cancelled task yields the fault recorded by the server.
    pub async fn result(&self, task: &TaskRef) -> Result<Value> {
        let status = self.poll(task).await?;
        self.outcome(task, status).await
    }

    async fn outcome(&self, task: &TaskRef, status: TaskStatus) -> Result<Value> {
        match status {
            TaskStatus::Success => self.get_result(task).await.and_then(task_result),
            TaskStatus::Failure | TaskStatus::Cancelled => {
                let info = self.get_error_info(task).await?;
                let fault = RpcFault::from_description(info).unwrap_or_else(|| {
                    if status == TaskStatus::Cancelled {
                        RpcFault::new(codes::TASK_CANCELLED, [task.as_str()])
                    } else {
                        RpcFault::new(codes::INTERNAL_ERROR, ["task failed without error description"])
                    }
                });
                debug!(task = %task, code = %fault.code, "task did not succeed");
                Err(fault.into())
            }
            status => Err(Error::TaskNotFinished {
                task: task.clone(),
                status,
            }),
        }
    }

    /// Polls the task every `poll_interval` until it reaches a final state,
    /// then returns its outcome as [Tasks::result] does
    #[instrument(level = "debug", skip(self))]
    pub async fn wait(&self, task: &TaskRef, poll_interval: Duration) -> Result<Value> {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let status = self.poll(task).await?;
            trace!(%status, "polled task");
            if status.is_terminal() {
                return self.outcome(task, status).await;
            }
        }
    }

    /// Like [Tasks::wait], but is woken by task events instead of polling.
    /// `timeout` bounds each individual long-poll, not the whole wait.
    #[instrument(level = "debug", skip(self))]
    pub async fn wait_for_event(&self, task: &TaskRef, timeout: Duration) -> Result<Value> {
        let mut sub = self.session.subscribe([format!("task/{task}")]);
        let mirror = sub.mirror();
        loop {
            let update = sub.next(timeout).await?;
            trace!(events = update.batch.events.len(), "received task events");
            let record = mirror
                .read()
                .await
                .record::<TaskRecord>("task", task.as_str())
                .map_err(|err| err.within("task"))?;
            let Some(TaskRecord { status, .. }) = record else {
                return Err(RpcFault::new(codes::HANDLE_INVALID, ["task", task.as_str()]).into());
            };
            if status.is_terminal() {
                return self.outcome(task, status).await;
            }
        }
    }
}

/// Typed handle to a task whose successful result decodes as `R`
pub struct TaskHandle<R> {
    task: TaskRef,
    _ty: PhantomData<fn() -> R>,
}

impl<R> Clone for TaskHandle<R> {
    fn clone(&self) -> Self {
        Self::new(self.task.clone())
    }
}

impl<R> fmt::Debug for TaskHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.task).finish()
    }
}

impl<R> TaskHandle<R> {
    pub fn new(task: TaskRef) -> Self {
        Self {
            task,
            _ty: PhantomData,
        }
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    pub fn into_task(self) -> TaskRef {
        self.task
    }
}

impl<R: Decode> TaskHandle<R> {
    fn decode(value: Value) -> Result<R> {
        R::decode(value).map_err(|err| err.within(GET_RESULT.name).into())
    }

    pub async fn poll<T: Invoke>(&self, session: &Session<T>) -> Result<TaskStatus> {
        session.task().poll(&self.task).await
    }

    pub async fn result<T: Invoke>(&self, session: &Session<T>) -> Result<R> {
        session.task().result(&self.task).await.and_then(Self::decode)
    }

    pub async fn wait<T: Invoke>(&self, session: &Session<T>, poll_interval: Duration) -> Result<R> {
        session
            .task()
            .wait(&self.task, poll_interval)
            .await
            .and_then(Self::decode)
    }

    pub async fn wait_for_event<T: Invoke>(&self, session: &Session<T>, timeout: Duration) -> Result<R> {
        session
            .task()
            .wait_for_event(&self.task, timeout)
            .await
            .and_then(Self::decode)
    }

    pub async fn cancel<T: Invoke>(&self, session: &Session<T>) -> Result<()> {
        session.task().cancel(&self.task).await
    }

    pub async fn destroy<T: Invoke>(self, session: &Session<T>) -> Result<()> {
        session.task().destroy(self.task).await
    }
}
