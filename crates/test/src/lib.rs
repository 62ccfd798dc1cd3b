//! In-memory control plane speaking the JSON-RPC envelope.
//!
//! [FakeXapi] implements [Invoke], so a client can be pointed at it directly.
//! It models sessions, VMs, VBDs, asynchronous tasks and the event log closely
//! enough to exercise session handling, the task bridge and event resynchronization.

use core::time::Duration;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Context as _};
use bytes::Bytes;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, instrument};
use xenrpc_transport::{Invoke, RpcFault, Value};

mod events;

use state::{arity, float_arg, string_arg, strings_arg, State};

pub(crate) type Record = BTreeMap<String, Value>;

/// Error codes raised by the fake
pub mod codes {
    pub const EVENTS_LOST: &str = "EVENTS_LOST";
    pub const EVENT_FROM_TOKEN_PARSE_FAILURE: &str = "EVENT_FROM_TOKEN_PARSE_FAILURE";
    pub const FIELD_TYPE_ERROR: &str = "FIELD_TYPE_ERROR";
    pub const HANDLE_INVALID: &str = "HANDLE_INVALID";
    pub const UUID_INVALID: &str = "UUID_INVALID";
    pub const MESSAGE_METHOD_UNKNOWN: &str = "MESSAGE_METHOD_UNKNOWN";
    pub const MESSAGE_PARAMETER_COUNT_MISMATCH: &str = "MESSAGE_PARAMETER_COUNT_MISMATCH";
    pub const OPERATION_NOT_ALLOWED: &str = "OPERATION_NOT_ALLOWED";
    pub const SESSION_AUTHENTICATION_FAILED: &str = "SESSION_AUTHENTICATION_FAILED";
    pub const SESSION_INVALID: &str = "SESSION_INVALID";
    pub const SESSION_NOT_REGISTERED: &str = "SESSION_NOT_REGISTERED";
    pub const TASK_CANCELLED: &str = "TASK_CANCELLED";
    pub const DEVICE_ALREADY_ATTACHED: &str = "DEVICE_ALREADY_ATTACHED";
    pub const DEVICE_ALREADY_DETACHED: &str = "DEVICE_ALREADY_DETACHED";
    pub const VBD_NOT_EMPTY: &str = "VBD_NOT_EMPTY";
    pub const VBD_IS_EMPTY: &str = "VBD_IS_EMPTY";
}

/// Longest long-poll the fake honours
const MAX_POLL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug)]
pub struct Config {
    pub username: String,
    pub password: String,
    /// Time an `Async.` task stays pending before it runs
    pub task_delay: Duration,
    /// Number of events retained, older tokens get `EVENTS_LOST`
    pub event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            username: "root".into(),
            password: "xenroot".into(),
            task_delay: Duration::from_millis(20),
            event_history: 1024,
        }
    }
}

struct Inner {
    config: Config,
    state: Mutex<State>,
}

/// In-memory control plane, clones share state
#[derive(Clone)]
pub struct FakeXapi {
    inner: Arc<Inner>,
}

impl Default for FakeXapi {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl FakeXapi {
    pub fn new(config: Config) -> Self {
        let state = State::new(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next `event.from` or `event.next` with a non-empty token fail
    /// with `EVENTS_LOST`
    pub fn lose_events(&self) {
        self.lock().lose_events = true;
    }

    /// Makes the next call of `method` fail with `fault`
    pub fn fail_next(&self, method: &str, fault: RpcFault) {
        self.lock()
            .faults
            .entry(method.to_string())
            .or_insert_with(VecDeque::new)
            .push_back(fault);
    }

    /// Makes the next `n` exchanges fail at the transport level
    pub fn fail_transport(&self, n: usize) {
        self.lock().transport_failures = n;
    }

    /// Makes the next `n` exchanges return a body which is not an envelope
    pub fn malform_responses(&self, n: usize) {
        self.lock().malformed_responses = n;
    }

    /// Number of times `method` was invoked
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or_default()
    }

    /// Number of live sessions
    pub fn sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Current position of the event log
    pub fn generation(&self) -> u64 {
        self.lock().log.generation()
    }

    async fn dispatch(&self, method: &str, args: Vec<Value>) -> Result<Value, RpcFault> {
        let fault = self.lock().take_fault(method);
        if let Some(fault) = fault {
            debug!(method, code = %fault.code, "returning injected fault");
            return Err(fault);
        }
        match method {
            "session.login_with_password" => self.lock().login(&self.inner.config, &args),
            "event.from" => self.event_from(&args).await,
            "event.next" => self.event_next(&args).await,
            _ => {
                let session = string_arg(&args, 0)?;
                let mut state = self.lock();
                state.check_session(session)?;
                if let Some(method) = method.strip_prefix("Async.") {
                    self.start_task(&mut state, method, &args[1..])
                } else {
                    state.call(session, method, &args[1..])
                }
            }
        }
    }

    fn start_task(&self, state: &mut State, method: &str, args: &[Value]) -> Result<Value, RpcFault> {
        let (task, cancel) = state.create_task(&format!("Async.{method}"));
        debug!(task = %task, method, "task created");
        let fake = self.clone();
        let delay = self.inner.config.task_delay;
        let method = method.to_string();
        let args = args.to_vec();
        let reference = task.clone();
        tokio::spawn(async move {
            let cancelled = tokio::select! {
                () = tokio::time::sleep(delay) => false,
                () = cancel.notified() => true,
            };
            fake.lock().finish_task(&reference, cancelled, &method, &args);
        });
        Ok(Value::String(task))
    }

    async fn event_from(&self, args: &[Value]) -> Result<Value, RpcFault> {
        arity("event.from", args, 4)?;
        let session = string_arg(args, 0)?;
        let classes = strings_arg(args, 1)?;
        let token = string_arg(args, 2)?;
        let timeout = Duration::try_from_secs_f64(float_arg(args, 3)?)
            .unwrap_or_default()
            .min(MAX_POLL);
        let deadline = Instant::now() + timeout;
        let mut expired = false;
        loop {
            let mut changed = {
                let mut state = self.lock();
                state.check_session(session)?;
                if let Some(batch) = state.events_from(&classes, token, expired)? {
                    return Ok(batch);
                }
                state.log.subscribe()
            };
            expired = tokio::time::timeout_at(deadline, changed.changed())
                .await
                .is_err();
        }
    }

    async fn event_next(&self, args: &[Value]) -> Result<Value, RpcFault> {
        arity("event.next", args, 1)?;
        let session = string_arg(args, 0)?;
        loop {
            let mut changed = {
                let mut state = self.lock();
                state.check_session(session)?;
                if let Some(events) = state.events_next(session)? {
                    return Ok(events);
                }
                state.log.subscribe()
            };
            if changed.changed().await.is_err() {
                // unreachable while `self` holds the sender
                return Ok(Value::List(Vec::new()));
            }
        }
    }
}

impl Invoke for FakeXapi {
    #[instrument(level = "trace", skip_all)]
    async fn invoke(&self, request: Bytes) -> anyhow::Result<Bytes> {
        let request: serde_json::Value =
            serde_json::from_slice(&request).context("failed to parse request")?;
        let method = request["method"]
            .as_str()
            .context("request carries no method")?
            .to_string();
        let args = match request.get("params") {
            None => Vec::new(),
            Some(serde_json::Value::Array(params)) => {
                params.iter().cloned().map(Value::from_json).collect()
            }
            Some(..) => bail!("request parameters are not a list"),
        };
        let id = request.get("id").cloned().unwrap_or_default();
        {
            let mut state = self.lock();
            *state.calls.entry(method.clone()).or_default() += 1;
            if state.transport_failures > 0 {
                state.transport_failures -= 1;
                bail!("connection reset by peer");
            }
            if state.malformed_responses > 0 {
                state.malformed_responses -= 1;
                return Ok(Bytes::from_static(b"<html><body>502 Bad Gateway</body></html>"));
            }
        }
        debug!(method = %method, "handling call");
        let body = match self.dispatch(&method, args).await {
            Ok(value) => json!({
                "jsonrpc": "2.0",
                "result": value.to_json().context("failed to encode result")?,
                "id": id,
            }),
            Err(RpcFault { code, params }) => json!({
                "jsonrpc": "2.0",
                "error": {"code": 1, "message": code, "data": params},
                "id": id,
            }),
        };
        Ok(Bytes::from(body.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn call(fake: &FakeXapi, method: &str, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let request = json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1});
        let response = fake.invoke(Bytes::from(request.to_string())).await?;
        serde_json::from_slice(&response).context("failed to parse response")
    }

    async fn login(fake: &FakeXapi) -> anyhow::Result<String> {
        let res = call(fake, "session.login_with_password", json!(["root", "xenroot", "1.0", "test"])).await?;
        res["result"]
            .as_str()
            .map(str::to_string)
            .context("login returned no session")
    }

    #[test_log::test(tokio::test)]
    async fn sessions() -> anyhow::Result<()> {
        let fake = FakeXapi::default();
        let res = call(&fake, "session.login_with_password", json!(["root", "wrong"])).await?;
        assert_eq!(res["error"]["message"], codes::SESSION_AUTHENTICATION_FAILED);

        let session = login(&fake).await?;
        assert_eq!(fake.sessions(), 1);
        let res = call(&fake, "VM.get_all", json!([session])).await?;
        assert_eq!(res["result"], json!([]));

        call(&fake, "session.logout", json!([session])).await?;
        let res = call(&fake, "VM.get_all", json!([session])).await?;
        assert_eq!(res["error"], json!({"code": 1, "message": "SESSION_INVALID", "data": [session]}));
        assert_eq!(fake.calls("VM.get_all"), 2);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn unknown_method() -> anyhow::Result<()> {
        let fake = FakeXapi::default();
        let session = login(&fake).await?;
        let res = call(&fake, "VM.frobnicate", json!([session])).await?;
        assert_eq!(res["error"]["message"], codes::MESSAGE_METHOD_UNKNOWN);
        assert_eq!(res["error"]["data"], json!(["VM.frobnicate"]));
        let res = call(&fake, "VM.get_record", json!([session])).await?;
        assert_eq!(res["error"]["message"], codes::MESSAGE_PARAMETER_COUNT_MISMATCH);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn injected_failures() -> anyhow::Result<()> {
        let fake = FakeXapi::default();
        let session = login(&fake).await?;
        fake.fail_transport(1);
        assert!(call(&fake, "VM.get_all", json!([session])).await.is_err());
        fake.malform_responses(1);
        assert!(call(&fake, "VM.get_all", json!([session])).await.is_err());
        fake.fail_next("VM.get_all", RpcFault::new("INTERNAL_ERROR", ["boom"]));
        let res = call(&fake, "VM.get_all", json!([session])).await?;
        assert_eq!(res["error"]["data"], json!(["boom"]));
        let res = call(&fake, "VM.get_all", json!([session])).await?;
        assert_eq!(res["result"], json!([]));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn event_tokens() -> anyhow::Result<()> {
        let fake = FakeXapi::default();
        let session = login(&fake).await?;
        let res = call(&fake, "event.from", json!([session, ["VM"], "", 0.0])).await?;
        let t0 = res["result"]["token"].as_str().context("no token")?.to_string();
        assert_eq!(res["result"]["events"], json!([]));

        let res = call(&fake, "VM.create", json!([session, {"name_label": "web0"}])).await?;
        let vm = res["result"].as_str().context("no VM")?.to_string();

        let res = call(&fake, "event.from", json!([session, ["VM"], t0, 5.0])).await?;
        let events = res["result"]["events"].as_array().context("no events")?;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["operation"], "add");
        assert_eq!(events[0]["class"], "vm");
        assert_eq!(events[0]["ref"], vm.as_str());
        assert_eq!(events[0]["snapshot"]["name_label"], "web0");
        assert_ne!(res["result"]["token"], t0.as_str());

        let res = call(&fake, "event.from", json!([session, ["VM"], "not-a-token", 0.0])).await?;
        assert_eq!(res["error"]["message"], codes::EVENT_FROM_TOKEN_PARSE_FAILURE);

        fake.lose_events();
        let res = call(&fake, "event.from", json!([session, ["VM"], t0, 0.0])).await?;
        assert_eq!(res["error"]["message"], codes::EVENTS_LOST);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn long_poll_wakes() -> anyhow::Result<()> {
        let fake = FakeXapi::default();
        let session = login(&fake).await?;
        let res = call(&fake, "event.from", json!([session, ["VM"], "", 0.0])).await?;
        let t0 = res["result"]["token"].clone();

        let poll = tokio::spawn({
            let fake = fake.clone();
            let session = session.clone();
            async move { call(&fake, "event.from", json!([session, ["VM"], t0, 60.0])).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        call(&fake, "VM.create", json!([session, {"name_label": "web0"}])).await?;
        let res = tokio::time::timeout(Duration::from_secs(10), poll).await???;
        assert_eq!(res["result"]["events"].as_array().map(Vec::len), Some(1));
        Ok(())
    }
}
