//! Listener registry.
//!
//! Registrations live in a copy-on-write list: subscribing or unsubscribing
//! swaps in a new list, and [`EventRegistry::publish`] iterates over the
//! list it saw when it started. A listener may therefore subscribe or
//! unsubscribe from inside its own callback.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace, warn};

use crate::error::{ListenerError, WaitError};
use crate::event::{Envelope, EventKind};

/// Handles one published event.
pub trait Listener: Send + Sync + 'static {
    /// Called for every event that passes the registration's filter.
    ///
    /// # Errors
    ///
    /// An error is logged; it does not affect other listeners.
    fn on_event(&self, event: &Envelope) -> Result<(), ListenerError>;
}

impl<F> Listener for F
where
    F: Fn(&Envelope) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &Envelope) -> Result<(), ListenerError> {
        self(event)
    }
}

type Predicate = Box<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Decides which events reach a listener.
#[derive(Default)]
pub struct EventFilter {
    kinds: Option<BTreeSet<EventKind>>,
    predicate: Option<Predicate>,
}

impl std::fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventFilter")
            .field("kinds", &self.kinds)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl EventFilter {
    /// Accepts every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Accepts events of the given kinds.
    #[must_use]
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: Some(kinds.into_iter().collect()),
            predicate: None,
        }
    }

    /// Accepts events of one kind.
    #[must_use]
    pub fn kind(kind: EventKind) -> Self {
        Self::kinds([kind])
    }

    /// Adds a predicate, evaluated after the kind check.
    #[must_use]
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&Envelope) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Returns true if `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &Envelope) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(event))
    }
}

/// Identifies a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

struct Registration {
    id: ListenerId,
    filter: EventFilter,
    listener: Box<dyn Listener>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    listeners: RwLock<Arc<Vec<Arc<Registration>>>>,
}

/// Fans published events out to registered listeners.
///
/// Cloning is cheap; clones share registrations.
#[derive(Clone, Default)]
pub struct EventRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events passing `filter`.
    pub fn subscribe(&self, filter: EventFilter, listener: impl Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Arc::new(Registration {
            id,
            filter,
            listener: Box::new(listener),
        });

        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(listeners.len() + 1);
        next.extend(listeners.iter().cloned());
        next.push(registration);
        *listeners = Arc::new(next);
        id
    }

    /// Removes a registration. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !listeners.iter().any(|r| r.id == id) {
            return false;
        }
        let next: Vec<_> = listeners.iter().filter(|r| r.id != id).cloned().collect();
        *listeners = Arc::new(next);
        true
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Registration>>> {
        let listeners = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*listeners)
    }

    /// Delivers `event` to every matching listener.
    ///
    /// Returns the number of listeners invoked. Failures and panics are
    /// logged and do not stop delivery.
    pub fn publish(&self, event: &Envelope) -> usize {
        let listeners = self.snapshot();
        let mut delivered = 0;

        for registration in listeners.iter() {
            if !registration.filter.matches(event) {
                continue;
            }
            delivered += 1;

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                registration.listener.on_event(event)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        listener = registration.id.get(),
                        kind = %event.kind(),
                        error = %e,
                        "Listener returned an error"
                    );
                }
                Err(_) => {
                    error!(
                        listener = registration.id.get(),
                        kind = %event.kind(),
                        "Listener panicked"
                    );
                }
            }
        }

        trace!(kind = %event.kind(), shard = event.shard, delivered, "Published event");
        delivered
    }

    /// Waits for the next event of `kind` matching `predicate`.
    ///
    /// The registration is removed when the event arrives, when `deadline`
    /// elapses, or when the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] if nothing matched in time.
    pub async fn wait_for(
        &self,
        kind: EventKind,
        predicate: impl Fn(&Envelope) -> bool + Send + Sync + 'static,
        deadline: Duration,
    ) -> Result<Envelope, WaitError> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.subscribe(
            EventFilter::kind(kind).with_predicate(predicate),
            move |event: &Envelope| -> Result<(), ListenerError> {
                let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(sender) = sender {
                    let _ = sender.send(event.clone());
                }
                Ok(())
            },
        );
        let _guard = Unsubscribe {
            registry: self.clone(),
            id,
        };

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(event)) => Ok(event),
            // The sender lives in the registration, which the guard still holds.
            Ok(Err(_)) | Err(_) => Err(WaitError::Timeout { waited: deadline }),
        }
    }

    /// Forwards matching events into a channel.
    ///
    /// The registration is removed when the returned stream is dropped. If
    /// the consumer falls `capacity` events behind, further events are
    /// dropped with a warning rather than blocking the shard.
    #[must_use]
    pub fn subscribe_channel(&self, filter: EventFilter, capacity: usize) -> EventStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.subscribe(filter, move |event: &Envelope| -> Result<(), ListenerError> {
            match tx.try_send(Arc::new(event.clone())) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    Err(ListenerError::new("event stream full, event dropped"))
                }
                // Receiver gone; the stream's drop unsubscribes us shortly.
                Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
            }
        });
        EventStream {
            rx,
            guard: Unsubscribe {
                registry: self.clone(),
                id,
            },
        }
    }
}

struct Unsubscribe {
    registry: EventRegistry,
    id: ListenerId,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.registry.unsubscribe(self.id);
    }
}

/// Events delivered through [`EventRegistry::subscribe_channel`].
pub struct EventStream {
    rx: mpsc::Receiver<Arc<Envelope>>,
    guard: Unsubscribe,
}

impl EventStream {
    /// Receives the next event. Returns `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<Arc<Envelope>> {
        self.rx.recv().await
    }

    /// Returns the listener id backing the stream.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.guard.id
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").field("id", &self.id()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use shardline_core::GuildId;

    use super::*;
    use crate::event::Event;

    fn envelope(event: Event) -> Envelope {
        Envelope::new(0, Some(1), event)
    }

    fn guild_update(id: u64) -> Envelope {
        envelope(Event::GuildUpdate {
            guild_id: GuildId::new(id),
        })
    }

    fn counter(count: &Arc<AtomicUsize>) -> impl Listener {
        let count = Arc::clone(count);
        move |_: &Envelope| -> Result<(), ListenerError> {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_kind_filter_and_predicate() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.subscribe(
            EventFilter::kind(EventKind::GuildUpdate)
                .with_predicate(|e| e.event.guild_id() == Some(GuildId::new(7))),
            counter(&count),
        );

        registry.publish(&guild_update(7));
        registry.publish(&guild_update(8));
        registry.publish(&envelope(Event::Resumed));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_listeners_do_not_affect_others() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        registry.subscribe(EventFilter::all(), |_: &Envelope| -> Result<(), ListenerError> {
            Err(ListenerError::new("nope"))
        });
        registry.subscribe(EventFilter::all(), |_: &Envelope| -> Result<(), ListenerError> {
            panic!("listener bug")
        });
        registry.subscribe(EventFilter::all(), counter(&count));

        assert_eq!(registry.publish(&envelope(Event::Resumed)), 3);
        assert_eq!(registry.publish(&envelope(Event::Resumed)), 3);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = EventRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = registry.subscribe(EventFilter::all(), counter(&count));

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.publish(&envelope(Event::Resumed));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_subscribe_during_publish() {
        let registry = EventRegistry::new();
        let inner = registry.clone();
        registry.subscribe(EventFilter::all(), move |_: &Envelope| -> Result<(), ListenerError> {
            inner.subscribe(EventFilter::all(), |_: &Envelope| -> Result<(), ListenerError> {
                Ok(())
            });
            Ok(())
        });

        // The new registration is not part of the list being delivered to.
        assert_eq!(registry.publish(&envelope(Event::Resumed)), 1);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_fires_once_and_unregisters() {
        let registry = EventRegistry::new();
        let publisher = registry.clone();

        let waiter = tokio::spawn({
            let registry = registry.clone();
            async move {
                registry
                    .wait_for(
                        EventKind::GuildUpdate,
                        |e| e.event.guild_id() == Some(GuildId::new(2)),
                        Duration::from_secs(5),
                    )
                    .await
            }
        });

        while publisher.is_empty() {
            tokio::task::yield_now().await;
        }
        publisher.publish(&guild_update(1));
        publisher.publish(&guild_update(2));

        let event = waiter.await.unwrap().unwrap();
        assert_eq!(event.event.guild_id(), Some(GuildId::new(2)));
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let registry = EventRegistry::new();
        let result = registry
            .wait_for(EventKind::Ready, |_| true, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(WaitError::Timeout { .. })));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_channel() {
        let registry = EventRegistry::new();
        let mut stream = registry.subscribe_channel(EventFilter::kind(EventKind::Resumed), 8);

        registry.publish(&guild_update(1));
        registry.publish(&envelope(Event::Resumed));

        let event = stream.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Resumed);

        drop(stream);
        assert!(registry.is_empty());
    }
}
