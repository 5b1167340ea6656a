//! In-memory rider store.
//!
//! Every table is a polars `DataFrame` behind one `RwLock`. Readers take a
//! cheap clone of the frames they need and release the lock before running
//! any lazy query; writers hold the write lock across validation and the
//! write itself so uniqueness checks cannot race an insert.
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use polars::prelude::*;
use tracing::{debug, info, instrument};

use crate::{
    StoreError,
    changeset::{BLANK, RiderAttrs, TAKEN, ValidationErrors},
    error::Result,
    model::{Participation, Rider, Tag},
    schema::{Table, participations, rider_tags, riders, tags},
};

/// Raw table state, also the unit of snapshot persistence.
#[derive(Debug, Clone)]
pub(crate) struct Tables {
    pub riders: DataFrame,
    pub tags: DataFrame,
    pub rider_tags: DataFrame,
    pub participations: DataFrame,
    pub next_rider_id: u64,
    pub next_tag_id: u64,
    pub next_participation_id: u64,
}

impl Tables {
    fn empty() -> Result<Self> {
        Ok(Self {
            riders: Table::Riders.empty_frame()?,
            tags: Table::Tags.empty_frame()?,
            rider_tags: Table::RiderTags.empty_frame()?,
            participations: Table::Participations.empty_frame()?,
            next_rider_id: 1,
            next_tag_id: 1,
            next_participation_id: 1,
        })
    }

    pub fn frame(&self, table: Table) -> &DataFrame {
        match table {
            Table::Riders => &self.riders,
            Table::Tags => &self.tags,
            Table::RiderTags => &self.rider_tags,
            Table::Participations => &self.participations,
        }
    }

    fn rider(&self, id: u64) -> Result<Option<Rider>> {
        first_rider(self.riders.clone().lazy().filter(col(riders::ID).eq(lit(id))))
    }

    fn has_tag(&self, id: u64) -> Result<bool> {
        Ok(matching_rows(self.tags.clone().lazy(), col(tags::ID).eq(lit(id)))? > 0)
    }

    /// Record a `TAKEN` error for every unique rider column `candidate`
    /// collides on, ignoring the candidate's own row.
    fn check_unique(&self, candidate: &Rider, errors: &mut ValidationErrors) -> Result<()> {
        for (field, value) in [
            (riders::EMAIL, candidate.email.as_str()),
            (riders::PHONE, candidate.phone.as_str()),
        ] {
            let clash = col(field)
                .eq(lit(value))
                .and(col(riders::ID).neq(lit(candidate.id)));
            if matching_rows(self.riders.clone().lazy(), clash)? > 0 {
                errors.add(field, TAKEN);
            }
        }
        Ok(())
    }
}

fn matching_rows(lf: LazyFrame, predicate: Expr) -> PolarsResult<usize> {
    Ok(lf.filter(predicate).collect()?.height())
}

/// Append `row` in place and collapse back to one chunk, so repeated
/// single-row writes do not fragment the table.
fn append_rows(table: &mut DataFrame, row: &DataFrame) -> PolarsResult<()> {
    table.vstack_mut(row)?;
    table.as_single_chunk();
    Ok(())
}

fn first_rider(lf: LazyFrame) -> Result<Option<Rider>> {
    let df = lf.limit(1).collect()?;
    Ok(Rider::from_df(&df)?.into_iter().next())
}

/// The storage collaborator behind the directory.
#[derive(Debug)]
pub struct RiderStore {
    tables: RwLock<Tables>,
}

impl RiderStore {
    pub fn new() -> Result<Self> {
        Ok(Self::from_tables(Tables::empty()?))
    }

    pub(crate) const fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }

    /// Consistent copy of every table, for snapshots.
    pub(crate) fn tables(&self) -> Result<Tables> {
        Ok(self.read()?.clone())
    }

    pub fn riders_lf(&self) -> Result<LazyFrame> {
        Ok(self.read()?.riders.clone().lazy())
    }

    pub fn tags_lf(&self) -> Result<LazyFrame> {
        Ok(self.read()?.tags.clone().lazy())
    }

    pub fn rider_tags_lf(&self) -> Result<LazyFrame> {
        Ok(self.read()?.rider_tags.clone().lazy())
    }

    pub fn participations_lf(&self) -> Result<LazyFrame> {
        Ok(self.read()?.participations.clone().lazy())
    }

    pub fn rider_count(&self) -> Result<usize> {
        Ok(self.read()?.riders.height())
    }

    pub fn all_riders(&self) -> Result<Vec<Rider>> {
        let df = self.read()?.riders.clone();
        Rider::from_df(&df)
    }

    pub fn rider_by_id(&self, id: u64) -> Result<Option<Rider>> {
        first_rider(self.riders_lf()?.filter(col(riders::ID).eq(lit(id))))
    }

    /// Exact match against the stored (lowercase) email.
    pub fn rider_by_email(&self, email: &str) -> Result<Option<Rider>> {
        first_rider(self.riders_lf()?.filter(col(riders::EMAIL).eq(lit(email))))
    }

    /// Exact match against the stored canonical phone.
    pub fn rider_by_phone(&self, phone: &str) -> Result<Option<Rider>> {
        first_rider(self.riders_lf()?.filter(col(riders::PHONE).eq(lit(phone))))
    }

    pub fn riders_by_ids(&self, ids: &[u64]) -> Result<Vec<Rider>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = Series::new("ids".into(), ids);
        let df = self
            .riders_lf()?
            .filter(col(riders::ID).is_in(lit(ids).implode(), false))
            .collect()?;
        Rider::from_df(&df)
    }

    pub fn tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let df = self
            .tags_lf()?
            .filter(col(tags::NAME).eq(lit(name)))
            .limit(1)
            .collect()?;
        Ok(Tag::from_df(&df)?.into_iter().next())
    }

    pub fn riders_for_tag(&self, tag_id: u64) -> Result<Vec<Rider>> {
        let members = self
            .rider_tags_lf()?
            .filter(col(rider_tags::TAG_ID).eq(lit(tag_id)))
            .select([col(rider_tags::RIDER_ID)]);
        let df = self
            .riders_lf()?
            .join(
                members,
                [col(riders::ID)],
                [col(rider_tags::RIDER_ID)],
                JoinArgs::new(JoinType::Semi),
            )
            .collect()?;
        Rider::from_df(&df)
    }

    /// Tags attached to `rider_id`, ordered by name.
    pub fn tags_for_rider(&self, rider_id: u64) -> Result<Vec<Tag>> {
        let memberships = self
            .rider_tags_lf()?
            .filter(col(rider_tags::RIDER_ID).eq(lit(rider_id)))
            .select([col(rider_tags::TAG_ID)]);
        let df = self
            .tags_lf()?
            .join(
                memberships,
                [col(tags::ID)],
                [col(rider_tags::TAG_ID)],
                JoinArgs::new(JoinType::Semi),
            )
            .sort([tags::NAME], SortMultipleOptions::default())
            .collect()?;
        Tag::from_df(&df)
    }

    pub fn participation_count(&self, rider_id: u64) -> Result<u64> {
        let n = matching_rows(
            self.participations_lf()?,
            col(participations::RIDER_ID).eq(lit(rider_id)),
        )?;
        Ok(n as u64)
    }

    /// Validate `attrs` as a new rider and append it.
    #[instrument(name = "Insert Rider", level = "debug", skip_all)]
    pub fn insert_rider(&self, attrs: &RiderAttrs) -> Result<Rider> {
        let mut tables = self.write()?;
        let id = tables.next_rider_id;

        let candidate = attrs.apply(None, id).map_err(StoreError::Validation)?;
        let mut errors = ValidationErrors::default();
        tables.check_unique(&candidate, &mut errors)?;
        if !errors.is_empty() {
            return Err(StoreError::Validation(errors));
        }

        append_rows(&mut tables.riders, &candidate.to_df()?)?;
        tables.next_rider_id += 1;
        debug!(rider_id = id, "Inserted rider");
        Ok(candidate)
    }

    /// Validate `attrs` against rider `id` and rewrite its row in place.
    #[instrument(name = "Update Rider", level = "debug", skip(self, attrs))]
    pub fn update_rider(&self, id: u64, attrs: &RiderAttrs) -> Result<Rider> {
        let mut tables = self.write()?;
        let existing = tables.rider(id)?.ok_or(StoreError::RiderNotFound(id))?;

        let candidate = attrs
            .apply(Some(&existing), id)
            .map_err(StoreError::Validation)?;
        let mut errors = ValidationErrors::default();
        tables.check_unique(&candidate, &mut errors)?;
        if !errors.is_empty() {
            return Err(StoreError::Validation(errors));
        }

        let is_target = col(riders::ID).eq(lit(id));
        tables.riders = tables
            .riders
            .clone()
            .lazy()
            .with_columns([
                when(is_target.clone())
                    .then(lit(candidate.name.clone()))
                    .otherwise(col(riders::NAME))
                    .alias(riders::NAME),
                when(is_target.clone())
                    .then(lit(candidate.email.clone()))
                    .otherwise(col(riders::EMAIL))
                    .alias(riders::EMAIL),
                when(is_target)
                    .then(lit(candidate.phone.clone()))
                    .otherwise(col(riders::PHONE))
                    .alias(riders::PHONE),
            ])
            .collect()?;
        debug!(rider_id = id, "Updated rider");
        Ok(candidate)
    }

    /// Remove rider `id` together with its tag memberships and participations.
    #[instrument(name = "Delete Rider", level = "debug", skip(self))]
    pub fn delete_rider(&self, id: u64) -> Result<Rider> {
        let mut tables = self.write()?;
        let existing = tables.rider(id)?.ok_or(StoreError::RiderNotFound(id))?;

        let riders = tables
            .riders
            .clone()
            .lazy()
            .filter(col(riders::ID).neq(lit(id)))
            .collect()?;
        let rider_tags = tables
            .rider_tags
            .clone()
            .lazy()
            .filter(col(rider_tags::RIDER_ID).neq(lit(id)))
            .collect()?;
        let participations = tables
            .participations
            .clone()
            .lazy()
            .filter(col(participations::RIDER_ID).neq(lit(id)))
            .collect()?;

        tables.riders = riders;
        tables.rider_tags = rider_tags;
        tables.participations = participations;
        debug!(rider_id = id, "Deleted rider");
        Ok(existing)
    }

    /// Create a tag. Names are trimmed and must be unique.
    pub fn insert_tag(&self, name: &str) -> Result<Tag> {
        let mut tables = self.write()?;
        let name = name.trim();
        let mut errors = ValidationErrors::default();
        if name.is_empty() {
            errors.add("name", BLANK);
        } else if matching_rows(tables.tags.clone().lazy(), col(tags::NAME).eq(lit(name)))? > 0 {
            errors.add("name", TAKEN);
        }
        if !errors.is_empty() {
            return Err(StoreError::Validation(errors));
        }

        let tag = Tag {
            id: tables.next_tag_id,
            name: name.to_string(),
        };
        let row = df!(tags::ID => [tag.id], tags::NAME => [tag.name.as_str()])?;
        append_rows(&mut tables.tags, &row)?;
        tables.next_tag_id += 1;
        info!(tag_id = tag.id, tag = %tag.name, "Created tag");
        Ok(tag)
    }

    /// Attach a tag to a rider. Attaching twice is a no-op.
    pub fn tag_rider(&self, rider_id: u64, tag_id: u64) -> Result<()> {
        let mut tables = self.write()?;
        if tables.rider(rider_id)?.is_none() {
            return Err(StoreError::RiderNotFound(rider_id));
        }
        if !tables.has_tag(tag_id)? {
            return Err(StoreError::TagNotFound(tag_id));
        }

        let existing = col(rider_tags::RIDER_ID)
            .eq(lit(rider_id))
            .and(col(rider_tags::TAG_ID).eq(lit(tag_id)));
        if matching_rows(tables.rider_tags.clone().lazy(), existing)? > 0 {
            return Ok(());
        }

        let row = df!(
            rider_tags::RIDER_ID => [rider_id],
            rider_tags::TAG_ID => [tag_id]
        )?;
        append_rows(&mut tables.rider_tags, &row)?;
        Ok(())
    }

    pub fn untag_rider(&self, rider_id: u64, tag_id: u64) -> Result<()> {
        let mut tables = self.write()?;
        let keep = col(rider_tags::RIDER_ID)
            .neq(lit(rider_id))
            .or(col(rider_tags::TAG_ID).neq(lit(tag_id)));
        tables.rider_tags = tables.rider_tags.clone().lazy().filter(keep).collect()?;
        Ok(())
    }

    pub fn record_participation(&self, rider_id: u64, campaign: &str) -> Result<Participation> {
        let mut tables = self.write()?;
        if tables.rider(rider_id)?.is_none() {
            return Err(StoreError::RiderNotFound(rider_id));
        }

        let participation = Participation {
            id: tables.next_participation_id,
            rider_id,
            campaign: campaign.to_string(),
        };
        let row = df!(
            participations::ID => [participation.id],
            participations::RIDER_ID => [rider_id],
            participations::CAMPAIGN => [campaign]
        )?;
        append_rows(&mut tables.participations, &row)?;
        tables.next_participation_id += 1;
        Ok(participation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(name: &str, email: &str, phone: &str) -> RiderAttrs {
        RiderAttrs::new().name(name).email(email).phone(phone)
    }

    fn store_with_alice_and_bob() -> (RiderStore, Rider, Rider) {
        let store = RiderStore::new().unwrap();
        let alice = store
            .insert_rider(&attrs("Alice", "alice@x.com", "4165551111"))
            .unwrap();
        let bob = store
            .insert_rider(&attrs("Bob", "bob@x.com", "4165552222"))
            .unwrap();
        (store, alice, bob)
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let (store, alice, bob) = store_with_alice_and_bob();
        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert_eq!(store.rider_count().unwrap(), 2);
    }

    #[test]
    fn test_insert_rejects_duplicate_email_and_phone() {
        let (store, _, _) = store_with_alice_and_bob();
        let err = store
            .insert_rider(&attrs("Alice Two", "ALICE@x.com", "416-555-1111"))
            .unwrap_err();
        let errors = match err {
            StoreError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(errors.on("email"), vec![TAKEN]);
        assert_eq!(errors.on("phone"), vec![TAKEN]);
        assert_eq!(store.rider_count().unwrap(), 2);
    }

    #[test]
    fn test_failed_insert_does_not_consume_an_id() {
        let (store, _, _) = store_with_alice_and_bob();
        assert!(store.insert_rider(&RiderAttrs::new()).is_err());
        let carl = store
            .insert_rider(&attrs("Carl", "carl@x.com", "4165553333"))
            .unwrap();
        assert_eq!(carl.id, 3);
    }

    #[test]
    fn test_lookups() {
        let (store, alice, bob) = store_with_alice_and_bob();
        assert_eq!(store.rider_by_id(alice.id).unwrap(), Some(alice.clone()));
        assert_eq!(store.rider_by_id(99).unwrap(), None);
        assert_eq!(store.rider_by_email("bob@x.com").unwrap(), Some(bob.clone()));
        assert_eq!(store.rider_by_phone("4165551111").unwrap(), Some(alice.clone()));

        let mut subset = store.riders_by_ids(&[bob.id, 42, alice.id]).unwrap();
        subset.sort_by_key(|r| r.id);
        assert_eq!(subset, vec![alice, bob]);
        assert!(store.riders_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_update_rewrites_only_target_row() {
        let (store, alice, bob) = store_with_alice_and_bob();
        let updated = store
            .update_rider(alice.id, &RiderAttrs::new().email("Alicia@X.com"))
            .unwrap();
        assert_eq!(updated.email, "alicia@x.com");
        assert_eq!(updated.name, "Alice");
        assert_eq!(store.rider_by_id(alice.id).unwrap(), Some(updated));
        assert_eq!(store.rider_by_id(bob.id).unwrap(), Some(bob));
    }

    #[test]
    fn test_update_may_keep_own_email() {
        let (store, alice, _) = store_with_alice_and_bob();
        let updated = store
            .update_rider(alice.id, &RiderAttrs::new().email("alice@x.com").name("Al"))
            .unwrap();
        assert_eq!(updated.name, "Al");
    }

    #[test]
    fn test_update_and_delete_unknown_rider() {
        let store = RiderStore::new().unwrap();
        assert!(matches!(
            store.update_rider(5, &RiderAttrs::new().name("x")),
            Err(StoreError::RiderNotFound(5))
        ));
        assert!(matches!(
            store.delete_rider(5),
            Err(StoreError::RiderNotFound(5))
        ));
    }

    #[test]
    fn test_delete_cascades() {
        let (store, alice, bob) = store_with_alice_and_bob();
        let tag = store.insert_tag("captains").unwrap();
        store.tag_rider(alice.id, tag.id).unwrap();
        store.tag_rider(bob.id, tag.id).unwrap();
        store.record_participation(alice.id, "spring-ride").unwrap();

        store.delete_rider(alice.id).unwrap();

        assert_eq!(store.rider_count().unwrap(), 1);
        assert_eq!(store.riders_for_tag(tag.id).unwrap(), vec![bob]);
        assert_eq!(store.participation_count(alice.id).unwrap(), 0);
    }

    #[test]
    fn test_tags() {
        let (store, alice, _) = store_with_alice_and_bob();
        let captains = store.insert_tag("captains").unwrap();
        let marshals = store.insert_tag(" marshals ").unwrap();
        assert_eq!(marshals.name, "marshals");
        assert!(matches!(
            store.insert_tag("captains"),
            Err(StoreError::Validation(_))
        ));

        store.tag_rider(alice.id, marshals.id).unwrap();
        store.tag_rider(alice.id, captains.id).unwrap();
        store.tag_rider(alice.id, captains.id).unwrap();

        assert_eq!(store.riders_for_tag(captains.id).unwrap(), vec![alice.clone()]);
        let names: Vec<_> = store
            .tags_for_rider(alice.id)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["captains", "marshals"]);

        store.untag_rider(alice.id, captains.id).unwrap();
        assert!(store.riders_for_tag(captains.id).unwrap().is_empty());
        assert_eq!(store.tag_by_name("captains").unwrap(), Some(captains));
        assert_eq!(store.tag_by_name("nope").unwrap(), None);
    }

    #[test]
    fn test_tag_rider_requires_both_sides() {
        let (store, alice, _) = store_with_alice_and_bob();
        let tag = store.insert_tag("captains").unwrap();
        assert!(matches!(
            store.tag_rider(99, tag.id),
            Err(StoreError::RiderNotFound(99))
        ));
        assert!(matches!(
            store.tag_rider(alice.id, 99),
            Err(StoreError::TagNotFound(99))
        ));
    }

    #[test]
    fn test_repeated_writes_keep_tables_in_one_chunk() {
        let store = RiderStore::new().unwrap();
        let tag = store.insert_tag("captains").unwrap();
        for i in 0..200u64 {
            let rider = store
                .insert_rider(&attrs(
                    &format!("Rider {i}"),
                    &format!("rider{i}@x.com"),
                    &format!("416555{:04}", 1000 + i),
                ))
                .unwrap();
            store.tag_rider(rider.id, tag.id).unwrap();
            store.record_participation(rider.id, "spring").unwrap();
        }
        store.insert_tag("marshals").unwrap();

        let tables = store.tables().unwrap();
        for table in Table::ALL {
            assert_eq!(
                tables.frame(table).first_col_n_chunks(),
                1,
                "{} table is fragmented",
                table.name()
            );
        }
        assert_eq!(tables.riders.height(), 200);
        assert_eq!(store.riders_for_tag(tag.id).unwrap().len(), 200);
    }

    #[test]
    fn test_participations() {
        let (store, alice, bob) = store_with_alice_and_bob();
        for campaign in ["a", "b", "c"] {
            store.record_participation(alice.id, campaign).unwrap();
        }
        assert_eq!(store.participation_count(alice.id).unwrap(), 3);
        assert_eq!(store.participation_count(bob.id).unwrap(), 0);
        assert!(matches!(
            store.record_participation(99, "x"),
            Err(StoreError::RiderNotFound(99))
        ));
    }
}
