//! Roster - rider directory search and change notification
//!
//! Roster keeps a directory of volunteer riders and answers two kinds of
//! question about it: *who matches this text?* and *tell me when a rider
//! changes*. Search is a case-insensitive substring match over the name,
//! email and phone fields you enable, ranked by how many campaigns each rider
//! has taken part in. Every successful create or update is announced on an
//! in-process [`NotificationBus`].
//!
//! # Quick Start
//!
//! ```rust
//! use roster::{Directory, SearchOptions};
//! use roster_data::{FixtureConfig, seed_store};
//!
//! let directory = Directory::in_memory()?;
//! seed_store(directory.store(), &FixtureConfig::minimal())?;
//!
//! // Alice has three participations, Bob one.
//! let everyone = directory.search_riders("", &SearchOptions::default())?;
//! let names: Vec<_> = everyone.iter().map(|r| r.name.as_str()).collect();
//! assert_eq!(names, ["Alice", "Bob"]);
//!
//! // Phone search ignores formatting.
//! let options = SearchOptions::builder().name(false).phone(true).build();
//! let found = directory.search_riders("555-2222", &options)?;
//! assert_eq!(found[0].name, "Bob");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Data
//!
//! Riders live in a polars-backed [`RiderStore`] from the `roster-data`
//! crate, which can be snapshotted to parquet with [`Directory::save`] and
//! reopened with [`Directory::open`].
use once_cell::sync::OnceCell;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

mod bus;
mod config;
mod directory;
pub mod error;
pub mod search;

pub use bus::{BusError, NotificationBus, RiderEvent, Subscription, Topic};
pub use config::SearchOptionsBuilder;
pub use directory::Directory;
pub use polars;
pub use roster_data as data;
pub use roster_data::{Rider, RiderAttrs, RiderStore, Tag, ValidationErrors};
pub use search::{
    FilterBuilder, SearchClause, SearchOptions, build_filter, rank_and_fetch,
    rank_and_fetch_with_counts,
};

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Initialize logging for the Roster library.
///
/// Installs a `tracing` fmt subscriber. `RUST_LOG` takes precedence over
/// `level` when set. Only the first call has any effect.
///
/// # Examples
///
/// ```rust
/// use roster::init_logging;
/// use tracing::Level;
///
/// init_logging(Level::INFO)?;
/// # Ok::<(), roster::error::RosterError>(())
/// ```
pub fn init_logging(level: impl Into<LevelFilter>) -> Result<&'static (), error::RosterError> {
    LOGGER_INIT.get_or_try_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level.into().to_string()))?
            .add_directive("polars=warn".parse()?);

        tracing_subscriber::fmt::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use roster_data::{FixtureConfig, seed_store};

    use super::*;

    fn setup_test_env() {
        let _ = init_logging(tracing::Level::WARN);
    }

    fn seeded() -> Directory {
        let directory = Directory::in_memory().unwrap();
        seed_store(directory.store(), &FixtureConfig::minimal()).unwrap();
        directory
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        setup_test_env();
        assert!(init_logging(tracing::Level::DEBUG).is_ok());
    }

    #[test]
    fn test_basic_search() {
        setup_test_env();
        let directory = seeded();

        let results = directory
            .search_riders("a", &SearchOptions::default())
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Alice");
    }

    #[test]
    fn test_configuration() {
        setup_test_env();
        let directory = seeded();

        let options = SearchOptionsBuilder::all_fields().limit(1).build();
        let results = directory.search_riders("x.com", &options).unwrap();
        assert_eq!(results.len(), 1, "Should respect limit in options");
        assert_eq!(results[0].name, "Alice");
    }

    #[test]
    fn test_empty_search() {
        setup_test_env();
        let directory = Directory::in_memory().unwrap();

        let results = directory.search_riders("", &SearchOptions::default());
        assert!(results.is_ok(), "Empty search should not error");
        assert!(results.unwrap().is_empty());
    }
}
