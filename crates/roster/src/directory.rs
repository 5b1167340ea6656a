//! The rider directory.
//!
//! [`Directory`] is the one entry point callers use for riders: lookups,
//! tag-scoped listings, ranked search and the create/update/delete lifecycle.
//! Successful creates and updates are announced on the [`NotificationBus`]
//! after the store has committed them.
//!
//! ```rust
//! use roster::{Directory, RiderAttrs, RiderEvent, SearchOptions, Topic};
//!
//! let directory = Directory::in_memory()?;
//! let mut events = directory.bus().subscribe(Topic::Riders);
//!
//! let carl = directory.create_rider(
//!     &RiderAttrs::new()
//!         .name("Carl")
//!         .email("Carl@X.com")
//!         .phone("(416) 555-3333"),
//! )?;
//! assert_eq!(carl.email, "carl@x.com");
//! assert_eq!(events.try_recv()?, Some(RiderEvent::Created(carl.clone())));
//!
//! let found = directory.get_rider_by_phone("416-555-3333")?;
//! assert_eq!(found, carl);
//!
//! let results = directory.search_riders("car", &SearchOptions::default())?;
//! assert_eq!(results, vec![carl]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
use std::{path::Path, sync::Arc};

use roster_data::{Rider, RiderAttrs, RiderStore, canonical_phone, snapshot::SnapshotMetadata};
use tracing::{info, instrument, warn};

use crate::{
    bus::{NotificationBus, RiderEvent, Subscription, Topic},
    error::{Result, RosterError},
    search::{SearchOptions, search_riders_inner},
};

/// Rider repository backed by a [`RiderStore`], announcing changes on a
/// [`NotificationBus`].
#[derive(Debug, Clone)]
pub struct Directory {
    store: Arc<RiderStore>,
    bus: Arc<NotificationBus>,
}

impl Directory {
    pub const fn new(store: Arc<RiderStore>, bus: Arc<NotificationBus>) -> Self {
        Self { store, bus }
    }

    /// Empty store with a private bus.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(
            Arc::new(RiderStore::new()?),
            Arc::new(NotificationBus::new()),
        ))
    }

    /// Load the snapshot in `dir`, or start empty when there is none.
    #[instrument(name = "Open Directory", level = "info", skip(dir, bus), fields(dir = ?dir.as_ref()))]
    pub fn open(dir: impl AsRef<Path>, bus: Arc<NotificationBus>) -> Result<Self> {
        let t_init = std::time::Instant::now();
        let store = RiderStore::load_or_new(dir)?;
        info!(
            riders = store.rider_count()?,
            elapsed = ?t_init.elapsed(),
            "Directory ready"
        );
        Ok(Self::new(Arc::new(store), bus))
    }

    /// [`Directory::open`] on [`roster_data::data_dir`].
    pub fn open_default(bus: Arc<NotificationBus>) -> Result<Self> {
        Self::open(roster_data::data_dir(), bus)
    }

    /// Persist the store to `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<SnapshotMetadata> {
        Ok(self.store.save_snapshot(dir)?)
    }

    pub fn store(&self) -> &Arc<RiderStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    /// Subscribe to rider lifecycle events.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe(Topic::Riders)
    }

    /// Every rider, in no particular order.
    pub fn list_riders(&self) -> Result<Vec<Rider>> {
        Ok(self.store.all_riders()?)
    }

    /// Riders carrying the tag called exactly `name`. Unknown tags give an
    /// empty list.
    pub fn list_riders_by_tag(&self, name: &str) -> Result<Vec<Rider>> {
        match self.store.tag_by_name(name)? {
            Some(tag) => Ok(self.store.riders_for_tag(tag.id)?),
            None => Ok(Vec::new()),
        }
    }

    /// Riders matching `query` on the fields `options` enables, most active
    /// first.
    pub fn search_riders(&self, query: &str, options: &SearchOptions) -> Result<Vec<Rider>> {
        search_riders_inner(&self.store, query, options)
    }

    pub fn get_rider(&self, id: u64) -> Result<Rider> {
        self.lookup_id(id)?
            .ok_or_else(|| RosterError::not_found("Rider", id))
    }

    pub fn find_rider(&self, id: u64) -> Result<Option<Rider>> {
        self.lookup_id(id)
    }

    /// Riders whose id is in `ids`. Unknown ids are skipped.
    pub fn get_riders(&self, ids: &[u64]) -> Result<Vec<Rider>> {
        Ok(self.store.riders_by_ids(ids)?)
    }

    pub fn get_rider_by_email(&self, email: &str) -> Result<Rider> {
        self.lookup_email(email)?
            .ok_or_else(|| RosterError::not_found("Rider", email))
    }

    pub fn find_rider_by_email(&self, email: &str) -> Result<Option<Rider>> {
        self.lookup_email(email)
    }

    /// Lookup by phone in any common format. A phone that cannot be parsed
    /// is an [`RosterError::InvalidArgument`].
    pub fn get_rider_by_phone(&self, phone: &str) -> Result<Rider> {
        let canonical =
            canonical_phone(phone).map_err(|e| RosterError::InvalidArgument(e.to_string()))?;
        self.lookup_phone(&canonical)?
            .ok_or_else(|| RosterError::not_found("Rider", phone))
    }

    /// Like [`Directory::get_rider_by_phone`], but an unparseable phone is
    /// simply not found.
    pub fn find_rider_by_phone(&self, phone: &str) -> Result<Option<Rider>> {
        match canonical_phone(phone) {
            Ok(canonical) => self.lookup_phone(&canonical),
            Err(_) => Ok(None),
        }
    }

    /// Validate and insert a rider, then announce it.
    #[instrument(name = "Create Rider", level = "info", skip_all)]
    pub fn create_rider(&self, attrs: &RiderAttrs) -> Result<Rider> {
        let rider = self.store.insert_rider(attrs)?;
        info!(rider_id = rider.id, "Created rider");
        self.bus.publish(RiderEvent::Created(rider.clone()));
        Ok(rider)
    }

    /// Validate `attrs` over `existing` and store the result, then announce it.
    #[instrument(name = "Update Rider", level = "info", skip_all, fields(rider_id = existing.id))]
    pub fn update_rider(&self, existing: &Rider, attrs: &RiderAttrs) -> Result<Rider> {
        let rider = self.store.update_rider(existing.id, attrs)?;
        info!("Updated rider");
        self.bus.publish(RiderEvent::Updated(rider.clone()));
        Ok(rider)
    }

    /// Remove a rider along with its tag memberships and participations.
    ///
    /// Unlike create and update, deletion publishes no event.
    #[instrument(name = "Delete Rider", level = "info", skip_all, fields(rider_id = existing.id))]
    pub fn delete_rider(&self, existing: &Rider) -> Result<Rider> {
        let removed = self.store.delete_rider(existing.id).map_err(|e| {
            warn!(error = %e, "Delete failed");
            RosterError::from(e)
        })?;
        info!("Deleted rider");
        Ok(removed)
    }

    pub fn count_riders(&self) -> Result<usize> {
        Ok(self.store.rider_count()?)
    }

    /// Names of the rider's tags, sorted.
    pub fn tags_for_rider(&self, rider: &Rider) -> Result<Vec<String>> {
        Ok(self
            .store
            .tags_for_rider(rider.id)?
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }

    pub fn participation_count(&self, rider: &Rider) -> Result<u64> {
        Ok(self.store.participation_count(rider.id)?)
    }

    fn lookup_id(&self, id: u64) -> Result<Option<Rider>> {
        Ok(self.store.rider_by_id(id)?)
    }

    fn lookup_email(&self, email: &str) -> Result<Option<Rider>> {
        Ok(self.store.rider_by_email(&email.trim().to_lowercase())?)
    }

    fn lookup_phone(&self, canonical: &str) -> Result<Option<Rider>> {
        Ok(self.store.rider_by_phone(canonical)?)
    }
}
