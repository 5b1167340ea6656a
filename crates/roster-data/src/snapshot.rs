//! Parquet snapshots of a [`RiderStore`].
//!
//! A snapshot directory holds one parquet file per table plus a
//! `metadata.json` with row counts and the id counters, so ids are never
//! reused after a reload.
//!
//! Saving writes a complete snapshot into a staging directory beside the
//! target and then swaps it in, so a failed save leaves the previous snapshot
//! untouched. The snapshot owns its directory: anything else in it is
//! replaced along with the tables.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    StoreError,
    error::Result,
    schema::Table,
    store::{RiderStore, Tables},
};

const METADATA_FILE: &str = "metadata.json";
const SNAPSHOT_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub rider_rows: usize,
    pub tag_rows: usize,
    pub rider_tag_rows: usize,
    pub participation_rows: usize,
    pub next_rider_id: u64,
    pub next_tag_id: u64,
    pub next_participation_id: u64,
}

fn snapshot_files() -> impl Iterator<Item = String> {
    std::iter::once(METADATA_FILE.to_string()).chain(Table::ALL.into_iter().map(Table::parquet_file))
}

/// Snapshot files absent from `dir`.
fn missing_files(dir: &Path) -> Vec<String> {
    snapshot_files()
        .filter(|file| !dir.join(file).exists())
        .collect()
}

/// True when every snapshot file is present in `dir`.
#[must_use]
pub fn snapshot_exists(dir: &Path) -> bool {
    missing_files(dir).is_empty()
}

fn save_table(df: &DataFrame, table: Table, dir: &Path) -> Result<()> {
    let sink_time = std::time::Instant::now();
    let mut df = df
        .clone()
        .lazy()
        .sort([table.columns()[0]], SortMultipleOptions::default())
        .collect()?;
    let path = dir.join(table.parquet_file());
    let mut file = std::fs::File::create(&path)?;
    ParquetWriter::new(&mut file).finish(&mut df)?;

    info!(
        table = table.name(),
        rows = df.height(),
        sink_time = ?sink_time.elapsed(),
        "Saved to parquet file"
    );
    Ok(())
}

fn load_table(table: Table, dir: &Path) -> Result<DataFrame> {
    let path = dir.join(table.parquet_file());
    let df = LazyFrame::scan_parquet(&path, Default::default())?
        .select(table.columns().iter().map(|c| col(*c)).collect::<Vec<_>>())
        .collect()?;
    Ok(df)
}

fn next_id(df: &DataFrame, recorded: u64) -> Result<u64> {
    let max_id = df.column("id")?.u64()?.max().unwrap_or(0);
    Ok(recorded.max(max_id + 1))
}

/// Absolute target path split into its parent and final component.
fn resolve_target(dir: &Path) -> Result<(PathBuf, std::ffi::OsString)> {
    let dir = if dir.exists() {
        dir.canonicalize()?
    } else {
        std::path::absolute(dir)?
    };
    match (dir.parent(), dir.file_name()) {
        (Some(parent), Some(name)) => Ok((parent.to_path_buf(), name.to_os_string())),
        _ => Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot write a snapshot to {}", dir.display()),
        ))),
    }
}

/// Replace `target` with the fully written `staged` directory.
fn swap_into_place(staged: &Path, target: &Path, parent: &Path, name: &std::ffi::OsStr) -> Result<()> {
    if !target.exists() {
        std::fs::rename(staged, target)?;
        return Ok(());
    }

    let mut previous_name = std::ffi::OsString::from(".");
    previous_name.push(name);
    previous_name.push(".previous");
    let previous = parent.join(previous_name);
    if previous.exists() {
        std::fs::remove_dir_all(&previous)?;
    }

    std::fs::rename(target, &previous)?;
    if let Err(e) = std::fs::rename(staged, target) {
        // Put the old snapshot back before reporting.
        std::fs::rename(&previous, target)?;
        return Err(e.into());
    }
    if let Err(e) = std::fs::remove_dir_all(&previous) {
        warn!(path = ?previous, error = %e, "Could not remove previous snapshot");
    }
    Ok(())
}

impl RiderStore {
    /// Write every table to `dir`, replacing any snapshot already there.
    #[instrument(name = "Save Snapshot", level = "info", skip(self, dir), fields(dir = ?dir.as_ref()))]
    pub fn save_snapshot(&self, dir: impl AsRef<Path>) -> Result<SnapshotMetadata> {
        let (parent, name) = resolve_target(dir.as_ref())?;
        let target = parent.join(&name);
        std::fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".roster-snapshot-")
            .tempdir_in(&parent)?;

        let tables = self.tables()?;
        for table in Table::ALL {
            save_table(tables.frame(table), table, staging.path())?;
        }

        let metadata = SnapshotMetadata {
            version: SNAPSHOT_VERSION.to_string(),
            generated_at: Utc::now(),
            rider_rows: tables.riders.height(),
            tag_rows: tables.tags.height(),
            rider_tag_rows: tables.rider_tags.height(),
            participation_rows: tables.participations.height(),
            next_rider_id: tables.next_rider_id,
            next_tag_id: tables.next_tag_id,
            next_participation_id: tables.next_participation_id,
        };
        std::fs::write(
            staging.path().join(METADATA_FILE),
            serde_json::to_vec_pretty(&metadata)?,
        )?;

        // On success the staging path no longer exists and dropping the
        // guard is a no-op. On failure it cleans up the staged files.
        swap_into_place(staging.path(), &target, &parent, &name)?;
        Ok(metadata)
    }

    /// Rebuild a store from a directory written by [`RiderStore::save_snapshot`].
    ///
    /// A directory with none of the snapshot files is
    /// [`StoreError::SnapshotMissing`]. One with only some of them is
    /// [`StoreError::SnapshotIncomplete`].
    #[instrument(name = "Load Snapshot", level = "info", skip(dir), fields(dir = ?dir.as_ref()))]
    pub fn load_snapshot(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let missing = missing_files(dir);
        if missing.len() == snapshot_files().count() {
            return Err(StoreError::SnapshotMissing);
        }
        if !missing.is_empty() {
            warn!(?missing, "Refusing to load a partial snapshot");
            return Err(StoreError::SnapshotIncomplete(missing));
        }
        let t_load = std::time::Instant::now();

        let metadata: SnapshotMetadata =
            serde_json::from_slice(&std::fs::read(dir.join(METADATA_FILE))?)?;

        let riders = load_table(Table::Riders, dir)?;
        let tags = load_table(Table::Tags, dir)?;
        let rider_tags = load_table(Table::RiderTags, dir)?;
        let participations = load_table(Table::Participations, dir)?;

        let tables = Tables {
            next_rider_id: next_id(&riders, metadata.next_rider_id)?,
            next_tag_id: next_id(&tags, metadata.next_tag_id)?,
            next_participation_id: next_id(&participations, metadata.next_participation_id)?,
            riders,
            tags,
            rider_tags,
            participations,
        };

        info!(
            riders = tables.riders.height(),
            generated_at = %metadata.generated_at,
            time_loaded = ?t_load.elapsed(),
            "Loaded snapshot"
        );
        Ok(Self::from_tables(tables))
    }

    /// Load the snapshot in `dir`, or start empty when `dir` holds no
    /// snapshot files at all. A partial snapshot is an error.
    pub fn load_or_new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        match Self::load_snapshot(dir) {
            Err(StoreError::SnapshotMissing) => {
                info!(dir = ?dir, "No snapshot found, starting with an empty store");
                Self::new()
            }
            loaded => loaded,
        }
    }
}
