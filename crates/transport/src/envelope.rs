//! Call envelope: JSON-RPC requests and the response shapes the control plane emits

use core::fmt;

use bytes::Bytes;
use serde_json::json;

use crate::{EncodeError, Value};

/// Outgoing call
#[derive(Clone, Copy, Debug)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

impl Request<'_> {
    /// Serializes the request as a JSON-RPC 2.0 call
    pub fn to_bytes(&self) -> Result<Bytes, EncodeError> {
        let params = self
            .params
            .iter()
            .enumerate()
            .map(|(i, v)| v.to_json().map_err(|err| err.within(format!("#{i}"))))
            .collect::<Result<Vec<_>, _>>()?;
        let body = json!({
            "jsonrpc": "2.0",
            "method": self.method,
            "params": params,
            "id": self.id,
        });
        // serializing a `serde_json::Value` cannot fail
        Ok(Bytes::from(body.to_string()))
    }
}

/// Server-side fault: an error code followed by its parameters, passed through verbatim
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RpcFault {
    pub code: String,
    pub params: Vec<String>,
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server fault {}", self.code)?;
        if !self.params.is_empty() {
            write!(f, " [{}]", self.params.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcFault {}

impl RpcFault {
    pub fn new(code: impl Into<String>, params: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            code: code.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the fault carries error code `code`
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// Splits an `ErrorDescription` list into code and parameters
    pub fn from_description(description: Vec<String>) -> Option<Self> {
        let mut it = description.into_iter();
        let code = it.next()?;
        Some(Self {
            code,
            params: it.collect(),
        })
    }
}

/// Classified response
#[derive(Clone, Debug, PartialEq)]
pub enum Response {
    Success(Value),
    Failure(RpcFault),
}

/// Response did not match any known envelope shape
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("response is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("response is neither a success nor a failure envelope")]
    Shape,
    #[error("failure envelope carries an empty error description")]
    EmptyDescription,
}

fn fault_param(v: serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s,
        v => v.to_string(),
    }
}

fn fault_from_list(description: serde_json::Value) -> Result<RpcFault, EnvelopeError> {
    let serde_json::Value::Array(description) = description else {
        return Err(EnvelopeError::Shape);
    };
    RpcFault::from_description(description.into_iter().map(fault_param).collect())
        .ok_or(EnvelopeError::EmptyDescription)
}

/// Classifies a raw response body.
///
/// Accepted shapes are JSON-RPC 2.0 (`result` or `error` object with the code in
/// `message` and parameters in `data`), JSON-RPC 1.0 (`error` as a list) and the
/// struct envelope (`Status`, `Value`, `ErrorDescription`).
pub fn decode_response(buf: &[u8]) -> Result<Response, EnvelopeError> {
    let serde_json::Value::Object(mut obj) = serde_json::from_slice::<serde_json::Value>(buf)? else {
        return Err(EnvelopeError::Shape);
    };
    if let Some(status) = obj.remove("Status") {
        return match status.as_str() {
            Some("Success") => Ok(Response::Success(Value::from_json(
                obj.remove("Value").unwrap_or_default(),
            ))),
            Some("Failure") => obj
                .remove("ErrorDescription")
                .map_or(Err(EnvelopeError::Shape), fault_from_list)
                .map(Response::Failure),
            _ => Err(EnvelopeError::Shape),
        };
    }
    match obj.remove("error") {
        None | Some(serde_json::Value::Null) => {}
        Some(serde_json::Value::Object(mut err)) => {
            let Some(serde_json::Value::String(code)) = err.remove("message") else {
                return Err(EnvelopeError::Shape);
            };
            let params = match err.remove("data") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Array(data)) => data.into_iter().map(fault_param).collect(),
                Some(data) => vec![fault_param(data)],
            };
            return Ok(Response::Failure(RpcFault { code, params }));
        }
        Some(err @ serde_json::Value::Array(..)) => {
            return fault_from_list(err).map(Response::Failure)
        }
        Some(..) => return Err(EnvelopeError::Shape),
    }
    obj.remove("result")
        .map(|v| Response::Success(Value::from_json(v)))
        .ok_or(EnvelopeError::Shape)
}
