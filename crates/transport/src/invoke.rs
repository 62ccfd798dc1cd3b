use core::future::Future;
use core::time::Duration;

use std::sync::Arc;

use anyhow::Context as _;
use bytes::Bytes;
use tracing::instrument;

/// Client-side handle to a transport.
///
/// An implementation performs exactly one request/response exchange per call and
/// never retries on its own.
pub trait Invoke: Send + Sync {
    /// Send an encoded request and return the encoded response
    fn invoke(&self, request: Bytes) -> impl Future<Output = anyhow::Result<Bytes>> + Send;
}

impl<T: Invoke> Invoke for &T {
    fn invoke(&self, request: Bytes) -> impl Future<Output = anyhow::Result<Bytes>> + Send {
        (**self).invoke(request)
    }
}

impl<T: Invoke> Invoke for Arc<T> {
    fn invoke(&self, request: Bytes) -> impl Future<Output = anyhow::Result<Bytes>> + Send {
        (**self).invoke(request)
    }
}

/// Bounds every exchange of a borrowed transport by a client-side deadline
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeout<'a, T: ?Sized> {
    pub inner: &'a T,
    pub timeout: Duration,
}

impl<T: Invoke> Invoke for Timeout<'_, T> {
    #[instrument(level = "trace", skip(self, request))]
    async fn invoke(&self, request: Bytes) -> anyhow::Result<Bytes> {
        tokio::time::timeout(self.timeout, self.inner.invoke(request))
            .await
            .context("invocation timed out")?
    }
}

/// Like [`Timeout`], but owns the transport
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeoutOwned<T> {
    pub inner: T,
    pub timeout: Duration,
}

impl<T: Invoke> Invoke for TimeoutOwned<T> {
    #[instrument(level = "trace", skip(self, request))]
    async fn invoke(&self, request: Bytes) -> anyhow::Result<Bytes> {
        self.inner.timeout(self.timeout).invoke(request).await
    }
}

pub trait InvokeExt: Invoke {
    /// Returns a [`Timeout`], wrapping [Self] with an implementation of [Invoke], which will
    /// error, if call to [Self::invoke] does not return within a supplied `timeout`
    fn timeout(&self, timeout: Duration) -> Timeout<'_, Self> {
        Timeout {
            inner: self,
            timeout,
        }
    }

    /// This is like [`InvokeExt::timeout`], but moves [Self] and returns corresponding [`TimeoutOwned`]
    fn timeout_owned(self, timeout: Duration) -> TimeoutOwned<Self>
    where
        Self: Sized,
    {
        TimeoutOwned {
            inner: self,
            timeout,
        }
    }
}

impl<T: Invoke> InvokeExt for T {}
