use tracing::info;

use super::error::Result;
use crate::{
    changeset::RiderAttrs,
    model::{Rider, Tag},
    store::RiderStore,
};

/// Configuration for fixture generation
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Number of riders to insert
    pub riders: usize,
    /// Tags to create. Rider `i` joins `tags[i % (tags.len() + 1)]`, so one
    /// rider in every `tags.len() + 1` stays untagged.
    pub tags: Vec<String>,
    /// Whether to record participations at all
    pub participations: bool,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self::sample()
    }
}

impl FixtureConfig {
    /// Alice (3 participations, tagged `captains`) and Bob (1, untagged).
    pub fn minimal() -> Self {
        Self {
            riders: 2,
            tags: vec!["captains".to_string()],
            participations: true,
        }
    }

    /// A few dozen riders over three tags
    pub fn sample() -> Self {
        Self {
            riders: 24,
            tags: vec![
                "captains".to_string(),
                "marshals".to_string(),
                "newcomers".to_string(),
            ],
            participations: true,
        }
    }
}

/// What [`seed_store`] inserted.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub riders: Vec<Rider>,
    pub tags: Vec<Tag>,
}

impl Fixture {
    pub fn rider(&self, name: &str) -> Option<&Rider> {
        self.riders.iter().find(|r| r.name == name)
    }
}

// (name, email local part, participations)
const BASE_RIDERS: [(&str, &str, usize); 8] = [
    ("Alice", "alice", 3),
    ("Bob", "bob", 1),
    ("Carmen", "carmen", 5),
    ("Dmitri", "dmitri", 0),
    ("Esther", "esther", 2),
    ("Farah", "farah", 4),
    ("Gus", "gus", 0),
    ("Hana", "hana", 1),
];

/// Participation count the fixture gives rider `index`.
#[must_use]
pub fn participations_for(index: usize) -> usize {
    BASE_RIDERS[index % BASE_RIDERS.len()].2
}

fn attrs_for(index: usize) -> RiderAttrs {
    let (name, local, _) = BASE_RIDERS[index % BASE_RIDERS.len()];
    let cycle = index / BASE_RIDERS.len();
    // 1111 is coprime with 10^4, so the suffix never repeats below 10k riders.
    let phone = format!("416555{:04}", (1111 * (index + 1)) % 10_000);
    if cycle == 0 {
        RiderAttrs::new()
            .name(name)
            .email(format!("{local}@x.com"))
            .phone(phone)
    } else {
        RiderAttrs::new()
            .name(format!("{name} {cycle}"))
            .email(format!("{local}{cycle}@x.com"))
            .phone(phone)
    }
}

/// Fill `store` according to `config`.
pub fn seed_store(store: &RiderStore, config: &FixtureConfig) -> Result<Fixture> {
    info!("Seeding store with config: {:?}", config);

    let tags = config
        .tags
        .iter()
        .map(|name| store.insert_tag(name))
        .collect::<Result<Vec<_>>>()?;

    let mut riders = Vec::with_capacity(config.riders);
    for index in 0..config.riders {
        let rider = store.insert_rider(&attrs_for(index))?;

        if let Some(tag) = tags.get(index % (tags.len() + 1)) {
            store.tag_rider(rider.id, tag.id)?;
        }
        if config.participations {
            for n in 0..participations_for(index) {
                store.record_participation(rider.id, &format!("campaign-{n}"))?;
            }
        }
        riders.push(rider);
    }

    Ok(Fixture { riders, tags })
}
