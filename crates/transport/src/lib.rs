//! Wire values, the typed codec and the transport abstraction shared by all
//! xenrpc crates.

pub mod codec;
pub mod envelope;
mod invoke;
mod macros;
mod reference;
mod value;
pub mod xmlrpc;

pub use codec::{Decode, DecodeError, DecodeErrorKind, Encode, EncodeError, EncodeErrorKind, Params};
pub use envelope::{decode_response, EnvelopeError, Request, Response, RpcFault};
pub use invoke::*;
pub use reference::{Ref, NULL_REF};
pub use value::{format_datetime, parse_datetime, Kind, Value, DATETIME_FORMAT};

pub use bytes::Bytes;
