//! Event reader: long-polls `event.from` and maintains a mirror of server state

use core::time::Duration;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::Stream;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use xenrpc_transport::{Decode, DecodeError, Invoke, RpcFault, Value};

use crate::api::event::{Event, EventBatch, EventOperation};
use crate::{codes, Error, Result, Session};

/// Wildcard class subscribing to everything
pub const ALL_CLASSES: &str = "*";

/// Whether the subscription entries `classes` cover object `reference` of
/// `class`. Entries are class names, `class/reference` pairs or [ALL_CLASSES].
fn covers(classes: &[String], class: &str, reference: &str) -> bool {
    classes.iter().any(|entry| match entry.split_once('/') {
        Some((c, r)) => c.eq_ignore_ascii_case(class) && r == reference,
        None => entry == ALL_CLASSES || entry.eq_ignore_ascii_case(class),
    })
}

/// Client-side copy of the subscribed objects, keyed by lowercase class name
/// and reference
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mirror {
    classes: HashMap<String, HashMap<String, Value>>,
}

impl Mirror {
    /// Applies a single event: `add` and `mod` replace the snapshot, `del`
    /// removes the object. Events without a snapshot only remove.
    pub fn apply(&mut self, event: &Event) {
        let class = event.class.to_ascii_lowercase();
        match (&event.operation, &event.snapshot) {
            (EventOperation::Delete, _) | (_, None) => {
                if let Some(objects) = self.classes.get_mut(&class) {
                    objects.remove(&event.reference);
                }
            }
            (_, Some(snapshot)) => {
                self.classes
                    .entry(class)
                    .or_default()
                    .insert(event.reference.clone(), snapshot.clone());
            }
        }
    }

    /// Replaces the contents wholesale
    pub fn replace(&mut self, classes: HashMap<String, HashMap<String, Value>>) {
        self.classes = classes
            .into_iter()
            .map(|(class, objects)| (class.to_ascii_lowercase(), objects))
            .collect();
    }

    /// Drops every object not covered by the subscription entries `classes`
    pub fn retain(&mut self, classes: &[String]) {
        for (class, objects) in &mut self.classes {
            objects.retain(|reference, _| covers(classes, class, reference));
        }
        self.classes.retain(|_, objects| !objects.is_empty());
    }

    /// Drops the objects matched by a single subscription entry
    fn forget(&mut self, entry: &str) {
        if entry == ALL_CLASSES {
            self.classes.clear();
        } else if let Some((class, reference)) = entry.split_once('/') {
            if let Some(objects) = self.classes.get_mut(&class.to_ascii_lowercase()) {
                objects.remove(reference);
            }
        } else {
            self.classes.remove(&entry.to_ascii_lowercase());
        }
    }

    pub fn get(&self, class: &str, reference: &str) -> Option<&Value> {
        self.classes
            .get(&class.to_ascii_lowercase())
            .and_then(|objects| objects.get(reference))
    }

    /// Decodes the snapshot of an object, `None` if it is not mirrored
    pub fn record<R: Decode>(&self, class: &str, reference: &str) -> Result<Option<R>, DecodeError> {
        self.get(class, reference)
            .cloned()
            .map(R::decode)
            .transpose()
            .map_err(|err| err.within(reference))
    }

    /// Iterates over all mirrored objects of `class`
    pub fn objects<'a>(&'a self, class: &str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.classes
            .get(&class.to_ascii_lowercase())
            .into_iter()
            .flat_map(|objects| objects.iter().map(|(r, v)| (r.as_str(), v)))
    }

    pub fn len(&self, class: &str) -> usize {
        self.classes
            .get(&class.to_ascii_lowercase())
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(HashMap::is_empty)
    }
}

/// Outcome of a single [Subscription::next] call
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub batch: EventBatch,
    /// Events were lost and the mirror was rebuilt from full records before
    /// this batch was applied
    pub resynced: bool,
}

/// Token-based event subscription.
///
/// The subscription owns its token, every call resumes from the position the
/// previous call returned. Run it on its own task, [Subscription::next] blocks
/// for up to the requested timeout.
pub struct Subscription<T> {
    session: Session<T>,
    classes: Vec<String>,
    token: String,
    mirror: Arc<RwLock<Mirror>>,
    cancel: CancellationToken,
}

impl<T> Subscription<T> {
    pub fn new<I>(session: Session<T>, classes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            session,
            classes: classes.into_iter().map(Into::into).collect(),
            token: String::new(),
            mirror: Arc::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Latest token received, empty before the first batch
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Shared handle to the mirror, updated by every batch
    pub fn mirror(&self) -> Arc<RwLock<Mirror>> {
        Arc::clone(&self.mirror)
    }

    /// Token which, once cancelled, makes pending and future calls to
    /// [Subscription::next] return [Error::Cancelled]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Changes the subscribed classes, the next call starts from the current state
    fn set_classes(&mut self, classes: Vec<String>) {
        self.classes = classes;
        self.token.clear();
    }
}

impl<T: Invoke> Subscription<T> {
    /// Returns the next batch, waiting up to `timeout` for changes.
    ///
    /// The first call returns the current state of all subscribed objects. On
    /// `EVENTS_LOST` the mirror is rebuilt and the resumed batch is returned with
    /// [Update::resynced] set.
    pub async fn next(&mut self, timeout: Duration) -> Result<Update> {
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            res = self.poll(timeout) => res,
        }
    }

    #[instrument(level = "trace", skip(self), fields(token = %self.token))]
    async fn poll(&mut self, timeout: Duration) -> Result<Update> {
        let res = self
            .session
            .event()
            .from(&self.classes, &self.token, timeout.as_secs_f64())
            .await;
        match res {
            Ok(batch) => {
                self.accept(&batch).await;
                Ok(Update {
                    batch,
                    resynced: false,
                })
            }
            Err(err) if err.is_fault(codes::EVENTS_LOST) => {
                if self.classes.iter().any(|class| class == ALL_CLASSES) {
                    return Err(err);
                }
                warn!(classes = ?self.classes, "events were lost, resynchronizing");
                self.resync().await?;
                let batch = self
                    .session
                    .event()
                    .from(&self.classes, &self.token, 0.)
                    .await?;
                self.accept(&batch).await;
                Ok(Update {
                    batch,
                    resynced: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    async fn accept(&mut self, batch: &EventBatch) {
        trace!(events = batch.events.len(), token = %batch.token, "applying batch");
        let mut mirror = self.mirror.write().await;
        for event in &batch.events {
            mirror.apply(event);
        }
        self.token.clone_from(&batch.token);
    }

    /// Rebuilds the mirror from full records.
    ///
    /// The fresh token is taken before the records are read, events racing the
    /// reads are replayed by the resumed long-poll.
    async fn resync(&mut self) -> Result<()> {
        let fresh = self.session.event().from(&self.classes, "", 0.).await?;
        let mut objects: HashMap<String, HashMap<String, Value>> = HashMap::new();
        for class in &self.classes {
            if let Some((class, reference)) = class.split_once('/') {
                let method = format!("{class}.get_record");
                match self.session.call::<Value>(&method, (reference,)).await {
                    Ok(record) => {
                        objects
                            .entry(class.to_ascii_lowercase())
                            .or_default()
                            .insert(reference.to_string(), record);
                    }
                    Err(err) if err.is_fault(codes::HANDLE_INVALID) => {
                        debug!(class, reference, "subscribed object no longer exists");
                    }
                    Err(err) => return Err(err),
                }
            } else {
                let method = format!("{class}.get_all_records");
                let records: BTreeMap<String, Value> = self.session.call(&method, ()).await?;
                objects
                    .entry(class.to_ascii_lowercase())
                    .or_default()
                    .extend(records);
            }
        }
        self.mirror.write().await.replace(objects);
        debug!(token = %fresh.token, "resynchronized");
        self.token = fresh.token;
        Ok(())
    }

    /// Adapts the subscription into a stream of updates, which ends once the
    /// subscription is cancelled
    pub fn into_stream(self, timeout: Duration) -> impl Stream<Item = Result<Update>> {
        futures::stream::unfold(self, move |mut sub| async move {
            match sub.next(timeout).await {
                Err(Error::Cancelled) => None,
                res => Some((res, sub)),
            }
        })
    }
}

/// Registration-based interface, layered over [Subscription].
///
/// The registration keeps its position across [LegacySubscription::register]
/// and [LegacySubscription::unregister], events on classes which stay
/// registered are never dropped. Newly registered classes are seeded into the
/// mirror from their current state.
pub struct LegacySubscription<T> {
    inner: Subscription<T>,
    poll_timeout: Duration,
    pending: Vec<Event>,
    lost: bool,
}

impl<T: Invoke> LegacySubscription<T> {
    /// Default long-poll timeout used while waiting in [LegacySubscription::next]
    pub const POLL_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(session: Session<T>) -> Self {
        Self {
            inner: Subscription::new(session, Vec::<String>::new()),
            poll_timeout: Self::POLL_TIMEOUT,
            pending: Vec::new(),
            lost: false,
        }
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn classes(&self) -> &[String] {
        self.inner.classes()
    }

    pub fn mirror(&self) -> Arc<RwLock<Mirror>> {
        self.inner.mirror()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancellation()
    }

    /// Adds `classes` to the registration, subsequent [LegacySubscription::next]
    /// calls return events on them which happen after this call
    #[instrument(level = "trace", skip_all)]
    pub async fn register<I>(&mut self, classes: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut added: Vec<String> = Vec::new();
        for class in classes {
            let class = class.into();
            if !self.inner.classes().contains(&class) && !added.contains(&class) {
                added.push(class);
            }
        }
        if added.is_empty() {
            return Ok(());
        }
        if self.inner.classes().is_empty() {
            self.inner.set_classes(added);
            // the initial batch is the current state, it only seeds the mirror
            return self.inner.next(Duration::ZERO).await.map(|_| ());
        }

        // queue what is already pending on the registered classes, then seed
        // the new ones and resume all of them from the queued position
        self.pump(Duration::ZERO).await?;
        let seed = self.inner.session.event().from(&added, "", 0.).await?;
        {
            let mut mirror = self.inner.mirror.write().await;
            for entry in &added {
                mirror.forget(entry);
            }
            for event in &seed.events {
                mirror.apply(event);
            }
        }
        debug!(?added, seeded = seed.events.len(), "registered classes");
        self.inner.classes.extend(added);
        Ok(())
    }

    /// Removes `classes` from the registration and drops their objects from
    /// the mirror
    pub async fn unregister<I>(&mut self, classes: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        let remaining: Vec<String> = self
            .inner
            .classes()
            .iter()
            .filter(|class| !classes.contains(*class))
            .cloned()
            .collect();
        if remaining.len() == self.inner.classes().len() {
            return Ok(());
        }
        if remaining.is_empty() {
            self.inner.set_classes(remaining);
            self.pending.clear();
            self.lost = false;
        } else {
            self.pending
                .retain(|event| covers(&remaining, &event.class, &event.reference));
            self.inner.classes = remaining;
        }
        self.inner.mirror.write().await.retain(self.inner.classes());
        Ok(())
    }

    /// Polls once, queueing the events for [LegacySubscription::next]
    async fn pump(&mut self, timeout: Duration) -> Result<()> {
        match self.inner.next(timeout).await {
            Ok(Update { batch, resynced }) => {
                self.lost |= resynced;
                self.pending.extend(batch.events);
                Ok(())
            }
            Err(err) if err.is_fault(codes::EVENTS_LOST) => {
                // wildcard registrations cannot be read back per class,
                // start over from the current state instead
                warn!("events were lost, reseeding");
                self.inner.token.clear();
                self.inner.mirror.write().await.retain(&[]);
                self.pending.clear();
                self.inner.next(Duration::ZERO).await?;
                self.lost = true;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Blocks until at least one event on the registered classes is available.
    ///
    /// Returns an `EVENTS_LOST` fault once events were lost and the mirror was
    /// rebuilt, the registration stays in place and the following call
    /// continues from the rebuilt state.
    pub async fn next(&mut self) -> Result<Vec<Event>> {
        if self.inner.classes().is_empty() {
            return Err(RpcFault::new(
                codes::SESSION_NOT_REGISTERED,
                [self.inner.session.handle().as_str()],
            )
            .into());
        }
        loop {
            if std::mem::take(&mut self.lost) {
                return Err(RpcFault::new(codes::EVENTS_LOST, Vec::<String>::new()).into());
            }
            if !self.pending.is_empty() {
                return Ok(std::mem::take(&mut self.pending));
            }
            self.pump(self.poll_timeout).await?;
        }
    }
}
