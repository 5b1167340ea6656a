//! Rider search.
//!
//! A query runs in two steps. [`FilterBuilder`] turns the query text and the
//! enabled [`SearchOptions`] modes into one boolean polars expression, then
//! [`rank_and_fetch`] applies it to the riders table and orders the matches by
//! how many campaigns each rider has taken part in.

mod filter;
mod rank;

pub use filter::{FilterBuilder, SearchClause};
use polars::prelude::Expr;
pub use rank::{rank_and_fetch, rank_and_fetch_with_counts};
use roster_data::{Rider, RiderStore};
use tracing::{debug, instrument};

use crate::{config::SearchOptionsBuilder, error::Result};

pub const DEFAULT_LIMIT: usize = 100;

/// Which rider fields a query is matched against, and how many riders come back.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchOptions {
    /// Maximum number of riders returned
    pub limit: usize,
    /// Case-insensitive substring match on name
    pub name_search: bool,
    /// Case-insensitive substring match on email
    pub email_search: bool,
    /// Digit substring match on phone. Ignored for queries without a digit.
    pub phone_search: bool,
}

impl SearchOptions {
    pub fn builder() -> SearchOptionsBuilder {
        SearchOptionsBuilder::new()
    }

    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.name_search || self.email_search || self.phone_search
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            name_search: true,
            email_search: false,
            phone_search: false,
        }
    }
}

/// Predicate for `query` under `options`.
pub fn build_filter(query: &str, options: &SearchOptions) -> Expr {
    FilterBuilder::from_options(query, options).build()
}

#[instrument(name = "Rider Search", level = "info", skip(store, options), fields(limit = options.limit))]
pub(crate) fn search_riders_inner(
    store: &RiderStore,
    query: &str,
    options: &SearchOptions,
) -> Result<Vec<Rider>> {
    let filter = FilterBuilder::from_options(query, options);
    debug!(clauses = ?filter.clauses(), "Built search filter");
    let riders = rank_and_fetch(store, filter.build(), options.limit)?;
    debug!(results = riders.len(), "Search complete");
    Ok(riders)
}
