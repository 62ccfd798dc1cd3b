//! Asynchronous client for XenAPI-style control planes.
//!
//! A [Client] dispatches calls over any [Invoke] transport, a [Session] binds
//! calls to an authenticated session, [task] bridges `Async.*` operations and
//! [event] keeps a mirror of server state up to date.

pub mod api;
pub mod client;
pub mod error;
pub mod event;
pub mod session;
pub mod task;

pub use client::{Client, Method, Release};
pub use error::{codes, Error, Result, RpcFault, TransportError};
pub use event::{LegacySubscription, Mirror, Subscription, Update};
pub use session::{Credentials, Session};
pub use task::TaskHandle;

pub use xenrpc_transport as transport;
pub use xenrpc_transport::{Decode, Encode, Invoke, InvokeExt, Ref, Value};
#[cfg(feature = "http")]
pub use xenrpc_transport_http as http;
