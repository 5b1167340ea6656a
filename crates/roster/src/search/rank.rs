use polars::prelude::*;
use roster_data::{
    Rider, RiderStore,
    schema::{PARTICIPATION_COUNT, participations, riders},
};
use tracing::{debug, instrument};

use crate::error::Result;

/// Riders matching `predicate`, most active first, at most `limit` of them.
///
/// Riders with equal participation counts come back in no particular order.
pub fn rank_and_fetch(store: &RiderStore, predicate: Expr, limit: usize) -> Result<Vec<Rider>> {
    Ok(rank_and_fetch_with_counts(store, predicate, limit)?
        .into_iter()
        .map(|(rider, _)| rider)
        .collect())
}

/// [`rank_and_fetch`], keeping each rider's participation count.
#[instrument(name = "Rank and Fetch", level = "debug", skip(store, predicate))]
pub fn rank_and_fetch_with_counts(
    store: &RiderStore,
    predicate: Expr,
    limit: usize,
) -> Result<Vec<(Rider, u64)>> {
    let t_rank = std::time::Instant::now();

    let counts = store
        .participations_lf()?
        .group_by([col(participations::RIDER_ID)])
        .agg([len().alias(PARTICIPATION_COUNT)]);

    let df = store
        .riders_lf()?
        .filter(predicate)
        .join(
            counts,
            [col(riders::ID)],
            [col(participations::RIDER_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            col(PARTICIPATION_COUNT)
                .fill_null(lit(0))
                .cast(DataType::UInt64),
        )
        .sort(
            [PARTICIPATION_COUNT],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .limit(IdxSize::try_from(limit).unwrap_or(IdxSize::MAX))
        .collect()?;

    let ranked = Rider::from_df(&df)?;
    let counts = df.column(PARTICIPATION_COUNT)?.u64()?;
    let ranked: Vec<_> = ranked
        .into_iter()
        .zip(counts.into_iter().map(|count| count.unwrap_or(0)))
        .collect();

    debug!(
        results = ranked.len(),
        elapsed = ?t_rank.elapsed(),
        "Ranked riders by participation"
    );
    Ok(ranked)
}
