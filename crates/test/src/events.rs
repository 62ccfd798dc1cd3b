use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use xenrpc_transport::Value;

use crate::Record;

pub(crate) struct Logged {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub class: String,
    pub operation: &'static str,
    pub reference: String,
    pub snapshot: Option<Record>,
}

impl Logged {
    pub fn render(&self) -> Value {
        let mut m = BTreeMap::from([
            ("id".to_string(), Value::Int(i64::try_from(self.id).unwrap_or(i64::MAX))),
            (
                "timestamp".to_string(),
                Value::String(format!(
                    "{}.{:03}",
                    self.timestamp.timestamp(),
                    self.timestamp.timestamp_subsec_millis()
                )),
            ),
            ("class".to_string(), Value::from(self.class.as_str())),
            ("operation".to_string(), Value::from(self.operation)),
            ("ref".to_string(), Value::from(self.reference.as_str())),
        ]);
        if let Some(snapshot) = &self.snapshot {
            m.insert("snapshot".to_string(), Value::Map(snapshot.clone()));
        }
        Value::Map(m)
    }
}

/// Whether an object of `class` is covered by the subscription `classes`
pub(crate) fn subscribed(classes: &[String], class: &str, reference: &str) -> bool {
    classes.iter().any(|entry| {
        if entry == "*" {
            return true;
        }
        match entry.split_once('/') {
            Some((c, r)) => c.eq_ignore_ascii_case(class) && r == reference,
            None => entry.eq_ignore_ascii_case(class),
        }
    })
}

/// Bounded, ordered log of object changes. Event ids double as generations.
pub(crate) struct EventLog {
    events: VecDeque<Logged>,
    generation: u64,
    capacity: usize,
    notify: watch::Sender<u64>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            events: VecDeque::new(),
            generation: 0,
            capacity: capacity.max(1),
            notify,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Receiver woken on every subsequent change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn push(
        &mut self,
        class: &str,
        operation: &'static str,
        reference: &str,
        snapshot: Option<Record>,
    ) -> u64 {
        self.generation += 1;
        self.events.push_back(Logged {
            id: self.generation,
            timestamp: Utc::now(),
            class: class.to_string(),
            operation,
            reference: reference.to_string(),
            snapshot,
        });
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        self.notify.send_replace(self.generation);
        self.generation
    }

    /// Events after generation `from`, `None` if some of them were already discarded
    pub fn since(&self, from: u64) -> Option<impl Iterator<Item = &Logged>> {
        let oldest = self.events.front().map_or(self.generation + 1, |e| e.id);
        if from.saturating_add(1) < oldest {
            return None;
        }
        Some(self.events.iter().filter(move |e| e.id > from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_filters() {
        let classes = ["VM".to_string(), "task/OpaqueRef:t0".to_string()];
        assert!(subscribed(&classes, "vm", "OpaqueRef:v0"));
        assert!(subscribed(&classes, "task", "OpaqueRef:t0"));
        assert!(!subscribed(&classes, "task", "OpaqueRef:t1"));
        assert!(!subscribed(&classes, "vbd", "OpaqueRef:b0"));
        assert!(subscribed(&["*".to_string()], "vbd", "OpaqueRef:b0"));
    }

    #[test]
    fn bounded_history() {
        let mut log = EventLog::new(2);
        assert_eq!(log.since(0).map(Iterator::count), Some(0));
        log.push("vm", "add", "OpaqueRef:a", None);
        log.push("vm", "mod", "OpaqueRef:a", None);
        log.push("vm", "del", "OpaqueRef:a", None);
        assert_eq!(log.generation(), 3);
        assert!(log.since(0).is_none());
        let ops: Vec<_> = log
            .since(1)
            .map(|events| events.map(|e| e.operation).collect())
            .unwrap_or_default();
        assert_eq!(ops, ["mod", "del"]);
        assert_eq!(log.since(3).map(Iterator::count), Some(0));
    }
}
