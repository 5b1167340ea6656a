//! In-process notification bus.
//!
//! Subscribers register interest in a [`Topic`] and get their own unbounded
//! tokio channel. Publishing never blocks and never fails from the publisher's
//! point of view: events go to every live registration, and registrations
//! whose receiver is gone are pruned on the way. Delivery is at most once;
//! nothing is replayed to late subscribers.
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

use ahash::AHashMap;
use roster_data::Rider;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::{debug, info, instrument, warn};

/// Named channel on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Topic {
    /// Rider lifecycle events
    Riders,
}

impl Topic {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Riders => "riders",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rider lifecycle event. Each carries the rider as it was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RiderEvent {
    Created(Rider),
    Updated(Rider),
}

impl RiderEvent {
    pub const fn rider(&self) -> &Rider {
        match self {
            Self::Created(rider) | Self::Updated(rider) => rider,
        }
    }

    pub fn into_rider(self) -> Rider {
        match self {
            Self::Created(rider) | Self::Updated(rider) => rider,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "rider_created",
            Self::Updated(_) => "rider_updated",
        }
    }

    pub const fn topic(&self) -> Topic {
        Topic::Riders
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    #[error("Notification bus has shut down")]
    Closed,
}

#[derive(Debug)]
struct Registration {
    id: u64,
    tx: UnboundedSender<RiderEvent>,
}

#[derive(Debug, Default)]
struct BusState {
    registry: AHashMap<Topic, Vec<Registration>>,
    next_id: u64,
    closed: bool,
}

// A panic while holding the lock cannot leave the registry half-updated, so a
// poisoned lock is still safe to use.
fn lock(state: &RwLock<BusState>) -> RwLockWriteGuard<'_, BusState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

fn read(state: &RwLock<BusState>) -> RwLockReadGuard<'_, BusState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

/// Topic based publish/subscribe hub.
///
/// Create one at startup, share it behind an [`Arc`] and call
/// [`NotificationBus::shutdown`] when tearing down.
///
/// ```rust
/// use roster::{NotificationBus, RiderEvent, Topic};
/// use roster_data::Rider;
///
/// let bus = NotificationBus::new();
/// let mut sub = bus.subscribe(Topic::Riders);
///
/// let rider = Rider {
///     id: 1,
///     name: "Carl".into(),
///     email: "carl@x.com".into(),
///     phone: "4165553333".into(),
/// };
/// bus.publish(RiderEvent::Created(rider.clone()));
///
/// assert_eq!(sub.try_recv()?, Some(RiderEvent::Created(rider)));
/// # Ok::<(), roster::BusError>(())
/// ```
#[derive(Debug, Default)]
pub struct NotificationBus {
    state: Arc<RwLock<BusState>>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `topic`. The registration lives as long as the
    /// returned [`Subscription`]. Subscribing after shutdown yields a
    /// subscription that is already closed.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;

        if state.closed {
            warn!(%topic, "Subscribed to a bus that has shut down");
        } else {
            state
                .registry
                .entry(topic)
                .or_default()
                .push(Registration { id, tx });
            debug!(%topic, subscription = id, "Registered subscriber");
        }

        Subscription {
            id,
            topic,
            rx,
            bus: Arc::downgrade(&self.state),
        }
    }

    /// Send `event` to every live subscriber of its topic.
    #[instrument(name = "Publish", level = "debug", skip_all, fields(topic = %event.topic(), event = event.kind()))]
    pub fn publish(&self, event: RiderEvent) {
        let mut state = lock(&self.state);
        if state.closed {
            warn!("Dropping event published after shutdown");
            return;
        }
        let Some(registrations) = state.registry.get_mut(&event.topic()) else {
            debug!(delivered = 0, "No subscribers");
            return;
        };

        registrations.retain(|registration| registration.tx.send(event.clone()).is_ok());
        debug!(delivered = registrations.len(), "Published event");
    }

    /// Live registrations on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        read(&self.state)
            .registry
            .get(&topic)
            .map_or(0, |registrations| {
                registrations
                    .iter()
                    .filter(|registration| !registration.tx.is_closed())
                    .count()
            })
    }

    /// Drop every registration. Subscribers see end of stream once they have
    /// drained what was already queued.
    pub fn shutdown(&self) {
        let mut state = lock(&self.state);
        let dropped: usize = state.registry.values().map(Vec::len).sum();
        state.registry.clear();
        state.closed = true;
        info!(dropped, "Notification bus shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        read(&self.state).closed
    }
}

/// Receiving end of one registration.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    topic: Topic,
    rx: UnboundedReceiver<RiderEvent>,
    bus: Weak<RwLock<BusState>>,
}

impl Subscription {
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event. `None` once the bus has shut down and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<RiderEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_recv(&mut self) -> Result<Option<RiderEvent>, BusError> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(BusError::Closed),
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<RiderEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(state) = self.bus.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        if let Some(registrations) = state.registry.get_mut(&self.topic) {
            registrations.retain(|registration| registration.id != self.id);
        }
    }
}
