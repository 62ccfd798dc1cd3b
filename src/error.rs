use xenrpc_transport::{DecodeError, EncodeError};

pub use xenrpc_transport::RpcFault;

use crate::api::task::TaskStatus;
use crate::api::TaskRef;

/// Error codes with special meaning to the client
pub mod codes {
    pub const SESSION_AUTHENTICATION_FAILED: &str = "SESSION_AUTHENTICATION_FAILED";
    pub const SESSION_INVALID: &str = "SESSION_INVALID";
    pub const SESSION_NOT_REGISTERED: &str = "SESSION_NOT_REGISTERED";
    pub const EVENTS_LOST: &str = "EVENTS_LOST";
    pub const EVENT_FROM_TOKEN_PARSE_FAILURE: &str = "EVENT_FROM_TOKEN_PARSE_FAILURE";
    pub const HANDLE_INVALID: &str = "HANDLE_INVALID";
    pub const UUID_INVALID: &str = "UUID_INVALID";
    pub const TASK_CANCELLED: &str = "TASK_CANCELLED";
    pub const DEVICE_ALREADY_ATTACHED: &str = "DEVICE_ALREADY_ATTACHED";
    pub const DEVICE_ALREADY_DETACHED: &str = "DEVICE_ALREADY_DETACHED";
    pub const VBD_NOT_EMPTY: &str = "VBD_NOT_EMPTY";
    pub const VBD_IS_EMPTY: &str = "VBD_IS_EMPTY";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const MESSAGE_METHOD_UNKNOWN: &str = "MESSAGE_METHOD_UNKNOWN";
    pub const MESSAGE_PARAMETER_COUNT_MISMATCH: &str = "MESSAGE_PARAMETER_COUNT_MISMATCH";
}

/// The exchange itself failed: the transport errored or the response was not a
/// recognizable envelope. The call may or may not have taken effect.
#[derive(Debug, thiserror::Error)]
#[error("failed to invoke `{method}`")]
pub struct TransportError {
    method: String,
    #[source]
    source: anyhow::Error,
}

impl TransportError {
    pub fn new(method: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            method: method.into(),
            source,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Underlying transport error chain
    pub fn inner(&self) -> &anyhow::Error {
        &self.source
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Arguments could not be represented on the wire, nothing was sent
    #[error("failed to encode arguments: {0}")]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Server rejected the call
    #[error(transparent)]
    Fault(#[from] RpcFault),
    /// Server returned a value of unexpected shape
    #[error("failed to decode result: {0}")]
    Decode(#[from] DecodeError),
    #[error("task `{task}` has not finished, status is `{status}`")]
    TaskNotFinished { task: TaskRef, status: TaskStatus },
    #[error("operation was cancelled")]
    Cancelled,
}

impl Error {
    /// Returns the server fault, if this is one
    pub fn fault(&self) -> Option<&RpcFault> {
        if let Self::Fault(fault) = self {
            Some(fault)
        } else {
            None
        }
    }

    /// Whether this is a server fault with error code `code`
    pub fn is_fault(&self, code: &str) -> bool {
        self.fault().is_some_and(|fault| fault.is(code))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
