use core::fmt;

use tracing::{debug, instrument};
use xenrpc_transport::{Decode, Invoke, Params, Value};

use crate::api::{self, SessionRef, TaskRef};
use crate::event::Subscription;
use crate::task::TaskHandle;
use crate::{Client, Method, Result};

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// API version the client speaks
    pub version: String,
    /// Free-form client identification, shown in the server's session list
    pub originator: String,
}

impl Credentials {
    pub const DEFAULT_VERSION: &'static str = "1.0";
    pub const DEFAULT_ORIGINATOR: &'static str = "xenrpc";

    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            version: Self::DEFAULT_VERSION.into(),
            originator: Self::DEFAULT_ORIGINATOR.into(),
        }
    }

    #[must_use]
    pub fn with_originator(mut self, originator: impl Into<String>) -> Self {
        self.originator = originator.into();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("version", &self.version)
            .field("originator", &self.originator)
            .finish()
    }
}

/// Authenticated session.
///
/// Every call made through the session presents the session reference as its
/// first argument. Clones share the same server-side session.
pub struct Session<T> {
    client: Client<T>,
    handle: SessionRef,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<T> Session<T> {
    /// Attaches to an existing server-side session
    pub fn from_ref(client: Client<T>, handle: SessionRef) -> Self {
        Self { client, handle }
    }

    pub fn handle(&self) -> &SessionRef {
        &self.handle
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    /// `VM` class operations
    pub fn vm(&self) -> api::vm::Vms<'_, T> {
        api::vm::Vms::new(self)
    }

    /// `VBD` class operations
    pub fn vbd(&self) -> api::vbd::Vbds<'_, T> {
        api::vbd::Vbds::new(self)
    }

    /// `task` class operations and the task bridge
    pub fn task(&self) -> api::task::Tasks<'_, T> {
        api::task::Tasks::new(self)
    }

    /// Raw `event` class operations, see [Session::subscribe] for the event reader
    pub fn event(&self) -> api::event::Events<'_, T> {
        api::event::Events::new(self)
    }
}

impl<T: Invoke> Session<T> {
    /// Invokes `method` with the session reference prepended to `args`
    pub async fn invoke(&self, method: &str, mut args: Vec<Value>) -> Result<Value> {
        args.insert(0, Value::String(self.handle.as_str().to_string()));
        self.client.invoke(method, args).await
    }

    /// Like [Client::call], but presents the session reference first
    pub async fn call<R: Decode>(&self, method: impl AsRef<str>, params: impl Params) -> Result<R> {
        let method = method.as_ref();
        let args = params
            .encode_params()
            .map_err(|err| err.within(method))?;
        let value = self.invoke(method, args).await?;
        R::decode(value).map_err(|err| err.within(method).into())
    }

    /// Invokes the `Async.` twin of `method`, returning a handle to the task
    /// which will eventually carry a result of type `R`
    pub async fn call_async<R: Decode>(
        &self,
        method: Method,
        params: impl Params,
    ) -> Result<TaskHandle<R>> {
        let method = method.async_name();
        let task: TaskRef = self.call(&method, params).await?;
        debug!(method = %method, task = %task, "started task");
        Ok(TaskHandle::new(task))
    }

    /// Starts an event subscription on `classes`. Entries are class names
    /// (`VM`), object filters (`VM/OpaqueRef:..`) or `*`.
    pub fn subscribe<I>(&self, classes: I) -> Subscription<T>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Subscription::new(self.clone(), classes)
    }

    /// Invalidates the session on the server.
    ///
    /// Calls still in flight on clones of this session will fail with
    /// `SESSION_INVALID`, callers must not log out while the session is in use.
    #[instrument(level = "debug", skip_all, fields(session = %self.handle))]
    pub async fn logout(self) -> Result<()> {
        self.client
            .call(api::session::LOGOUT, (&self.handle,))
            .await
    }
}
