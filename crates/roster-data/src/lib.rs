//! Storage side of the roster directory.
//!
//! Riders, tags, tag memberships and participation records live in polars
//! `DataFrame`s held by a [`RiderStore`]. The store hands out `LazyFrame`
//! snapshots for querying and owns every write, validating rider attributes
//! through [`RiderAttrs`] changesets before they touch a frame.
use once_cell::sync::Lazy;
use std::path::PathBuf;
use tracing::warn;

pub mod changeset;
pub mod model;
pub mod phone;
pub mod schema;
pub mod snapshot;
pub mod store;
pub mod test_data;

static TEST_DATA_DIR: Lazy<tempfile::TempDir> = Lazy::new(|| {
    tempfile::TempDir::new().expect("Failed to create global temporary test data directory")
});

pub const DATA_DIR_DEFAULT: &str = "./roster_data";
pub const DATA_DIR_ENV: &str = "ROSTER_DATA_DIR";

/// Global data directory used for snapshots when the caller does not pass one.
///
/// Resolution order: `ROSTER_DATA_DIR`, the platform data directory (with the
/// `system-dirs` feature), then [`DATA_DIR_DEFAULT`]. Unit tests always get a
/// process-wide temporary directory.
pub static DATA_DIR: Lazy<PathBuf> = Lazy::new(|| {
    if cfg!(test) {
        let temp_dir = TEST_DATA_DIR.path().to_path_buf();
        warn!(temp_dir = ?temp_dir, "Using temporary data directory for tests");
        return temp_dir;
    }
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }
    platform_data_dir().unwrap_or_else(|| PathBuf::from(DATA_DIR_DEFAULT))
});

#[cfg(feature = "system-dirs")]
fn platform_data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "roster", "roster").map(|dirs| dirs.data_dir().to_path_buf())
}

#[cfg(not(feature = "system-dirs"))]
const fn platform_data_dir() -> Option<PathBuf> {
    None
}

pub fn data_dir() -> &'static std::path::Path {
    DATA_DIR.as_path()
}

mod error {
    use polars::prelude::PolarsError;
    use thiserror::Error;

    use crate::changeset::ValidationErrors;

    #[derive(Error, Debug)]
    pub enum StoreError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        #[error("Polars error: {0}")]
        Polars(#[from] PolarsError),
        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
        #[error("Validation failed: {0}")]
        Validation(ValidationErrors),
        #[error("Rider {0} does not exist")]
        RiderNotFound(u64),
        #[error("Tag {0} does not exist")]
        TagNotFound(u64),
        #[error("No snapshot found in the provided directory")]
        SnapshotMissing,
        #[error("Snapshot is incomplete, missing: {}", .0.join(", "))]
        SnapshotIncomplete(Vec<String>),
        #[error("Store lock was poisoned")]
        Poisoned,
        #[error("Unexpected null in {0} table")]
        Corrupt(&'static str),
    }

    pub type Result<T> = std::result::Result<T, StoreError>;
}

pub use changeset::{RiderAttrs, ValidationErrors};
pub use error::{Result, StoreError};
pub use model::{Participation, Rider, Tag};
pub use phone::{PhoneError, canonical_phone};
pub use store::RiderStore;
pub use test_data::{Fixture, FixtureConfig, seed_store};
