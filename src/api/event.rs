use std::collections::BTreeMap;

use xenrpc_transport::codec::{expect_map, take_field};
use xenrpc_transport::{wire_enum, Decode, DecodeError, Invoke, Value};

use crate::{Method, Release, Result, Session};

pub const FROM: Method = Method::new("event.from", Release::Boston);
pub const REGISTER: Method = Method::new("event.register", Release::Rio);
pub const UNREGISTER: Method = Method::new("event.unregister", Release::Rio);
pub const NEXT: Method = Method::new("event.next", Release::Rio);
pub const GET_CURRENT_ID: Method = Method::new("event.get_current_id", Release::Rio);
pub const INJECT: Method = Method::new("event.inject", Release::Tampa);

wire_enum! {
    pub enum EventOperation {
        Add => "add",
        Modify => "mod",
        Delete => "del",
    }
}

/// A single change to an object
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    pub id: i64,
    pub timestamp: String,
    /// Lowercase class name, e.g. `vm`
    pub class: String,
    pub operation: EventOperation,
    pub reference: String,
    /// Object record after the change, absent for deletions
    pub snapshot: Option<Value>,
}

impl Decode for Event {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut map = expect_map(value)?;
        let snapshot = match map.remove("snapshot") {
            // `null` on the wire
            Some(Value::String(s)) if s.is_empty() => None,
            snapshot => snapshot,
        };
        Ok(Self {
            id: take_field(&mut map, "id")?,
            timestamp: take_field(&mut map, "timestamp")?,
            class: take_field(&mut map, "class")?,
            operation: take_field(&mut map, "operation")?,
            reference: take_field(&mut map, "ref")?,
            snapshot,
        })
    }
}

/// Result of `event.from`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventBatch {
    /// Position to resume from, opaque to the client
    pub token: String,
    pub events: Vec<Event>,
    /// Number of live objects per subscribed class
    pub valid_ref_counts: BTreeMap<String, i64>,
}

impl Decode for EventBatch {
    fn decode(value: Value) -> Result<Self, DecodeError> {
        let mut map = expect_map(value)?;
        Ok(Self {
            token: take_field(&mut map, "token")?,
            events: take_field(&mut map, "events")?,
            valid_ref_counts: take_field(&mut map, "valid_ref_counts")?,
        })
    }
}

/// Raw `event` class operations
pub struct Events<'a, T> {
    session: &'a Session<T>,
}

impl<'a, T> Events<'a, T> {
    pub(crate) fn new(session: &'a Session<T>) -> Self {
        Self { session }
    }
}

impl<T: Invoke> Events<'_, T> {
    /// Returns events on `classes` newer than `token`, blocking up to `timeout`
    /// seconds if there are none. The empty token returns the current state.
    pub async fn from(&self, classes: &[String], token: &str, timeout: f64) -> Result<EventBatch> {
        self.session.call(FROM, (classes, token, timeout)).await
    }

    pub async fn register(&self, classes: &[String]) -> Result<()> {
        self.session.call(REGISTER, (classes,)).await
    }

    pub async fn unregister(&self, classes: &[String]) -> Result<()> {
        self.session.call(UNREGISTER, (classes,)).await
    }

    /// Blocks until events on registered classes are available
    pub async fn next(&self) -> Result<Vec<Event>> {
        self.session.call(NEXT, ()).await
    }

    pub async fn get_current_id(&self) -> Result<String> {
        self.session.call(GET_CURRENT_ID, ()).await
    }

    /// Generates a `mod` event on the object, returns the token of that event
    pub async fn inject(&self, class: &str, reference: &str) -> Result<String> {
        self.session.call(INJECT, (class, reference)).await
    }
}
