use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use std::sync::Arc;

use tracing::{debug, instrument, trace};
use xenrpc_transport::{decode_response, Decode, Invoke, Params, Request, Response, Value};

use crate::session::{Credentials, Session};
use crate::{api, Result, TransportError};

/// API release in which an operation first appeared, ordered oldest first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Release {
    Rio,
    Miami,
    Orlando,
    George,
    MidnightRide,
    Cowley,
    Boston,
    Tampa,
    Clearwater,
    Creedence,
    Dundee,
    Ely,
    Falcon,
    Inverness,
    Jura,
    Kolkata,
    Lima,
    Naples,
    Quebec,
    Stockholm,
}

impl Release {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rio => "rio",
            Self::Miami => "miami",
            Self::Orlando => "orlando",
            Self::George => "george",
            Self::MidnightRide => "midnight-ride",
            Self::Cowley => "cowley",
            Self::Boston => "boston",
            Self::Tampa => "tampa",
            Self::Clearwater => "clearwater",
            Self::Creedence => "creedence",
            Self::Dundee => "dundee",
            Self::Ely => "ely",
            Self::Falcon => "falcon",
            Self::Inverness => "inverness",
            Self::Jura => "jura",
            Self::Kolkata => "kolkata",
            Self::Lima => "lima",
            Self::Naples => "naples",
            Self::Quebec => "quebec",
            Self::Stockholm => "stockholm",
        }
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-qualified wire name of an operation, annotated with the release that
/// introduced it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Method {
    pub name: &'static str,
    pub since: Release,
}

impl Method {
    pub const fn new(name: &'static str, since: Release) -> Self {
        Self { name, since }
    }

    /// Name of the `Async.` twin returning a task reference
    pub fn async_name(&self) -> String {
        format!("Async.{}", self.name)
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.name
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

struct Inner<T> {
    transport: T,
    next_id: AtomicU64,
}

/// Dispatcher: turns method calls into single request/response exchanges over
/// a transport and classifies the outcome.
///
/// Cheap to clone, all clones share the transport and the request id sequence.
pub struct Client<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("next_id", &self.inner.next_id)
            .finish_non_exhaustive()
    }
}

impl<T> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }
}

impl<T: Invoke> Client<T> {
    /// Performs exactly one exchange, never retrying.
    ///
    /// A server fault is returned as [`Error::Fault`](crate::Error::Fault) with
    /// the code and parameters untouched.
    #[instrument(level = "trace", skip(self, args))]
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request {
            id,
            method,
            params: &args,
        }
        .to_bytes()
        .map_err(|err| err.within(method))?;
        debug!(id, method, "invoking method");
        let response = self
            .inner
            .transport
            .invoke(request)
            .await
            .map_err(|err| TransportError::new(method, err))?;
        trace!(id, ?response, "received response");
        match decode_response(&response) {
            Ok(Response::Success(value)) => Ok(value),
            Ok(Response::Failure(fault)) => {
                debug!(id, method, code = %fault.code, "server returned a fault");
                Err(fault.into())
            }
            Err(err) => Err(TransportError::new(method, err.into()).into()),
        }
    }

    /// Encodes `params`, invokes `method` and decodes the result as `R`.
    ///
    /// Encoding failures are reported before any I/O takes place, decoding
    /// failures carry `method` as the root of their path.
    pub async fn call<R: Decode>(&self, method: impl AsRef<str>, params: impl Params) -> Result<R> {
        let method = method.as_ref();
        let args = params
            .encode_params()
            .map_err(|err| err.within(method))?;
        let value = self.invoke(method, args).await?;
        R::decode(value).map_err(|err| err.within(method).into())
    }

    /// Authenticates and returns a [Session] bound to this client
    #[instrument(level = "debug", skip_all, fields(username = %credentials.username, originator = %credentials.originator))]
    pub async fn login_with_password(&self, credentials: &Credentials) -> Result<Session<T>> {
        let handle: api::SessionRef = self
            .call(
                api::session::LOGIN_WITH_PASSWORD,
                (
                    &credentials.username,
                    &credentials.password,
                    &credentials.version,
                    &credentials.originator,
                ),
            )
            .await?;
        debug!(session = %handle, "logged in");
        Ok(Session::from_ref(self.clone(), handle))
    }
}
