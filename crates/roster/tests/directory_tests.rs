//! Integration tests for the rider directory
//!
//! These run against the public API only: a directory seeded through
//! `roster_data::seed_store`, searched, mutated and observed through the bus.

use std::{sync::Arc, time::Duration};

use roster::{
    Directory, NotificationBus, RiderAttrs, RiderEvent, SearchOptions, SearchOptionsBuilder,
    error::RosterError,
};
use roster_data::{FixtureConfig, seed_store};

fn setup_test_env() {
    let _ = roster::init_logging(tracing::Level::WARN);
}

fn directory_with(config: &FixtureConfig) -> Directory {
    setup_test_env();
    let directory = Directory::in_memory().expect("Should create directory");
    seed_store(directory.store(), config).expect("Should seed store");
    directory
}

fn names(riders: &[roster::Rider]) -> Vec<&str> {
    riders.iter().map(|r| r.name.as_str()).collect()
}

fn carl() -> RiderAttrs {
    RiderAttrs::new()
        .name("Carl")
        .email("carl@x.com")
        .phone("416 555 3333")
}

#[test]
fn test_worked_example() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut events = directory.subscribe();

    let by_name = SearchOptions::default();
    assert_eq!(names(&directory.search_riders("a", &by_name).unwrap()), ["Alice"]);
    assert_eq!(
        names(&directory.search_riders("", &by_name).unwrap()),
        ["Alice", "Bob"]
    );

    let carl = directory.create_rider(&carl()).expect("Carl is valid");
    assert_eq!(carl.phone, "4165553333");
    assert_eq!(events.drain(), vec![RiderEvent::Created(carl)]);
}

#[test]
fn test_no_modes_returns_nothing() {
    let directory = directory_with(&FixtureConfig::sample());
    let none = SearchOptionsBuilder::new().name(false).build();
    assert!(!none.any_enabled());

    for query in ["", "a", "alice", "4165551111", "x.com"] {
        assert!(
            directory.search_riders(query, &none).unwrap().is_empty(),
            "query {query:?} should match nothing"
        );
    }
}

#[test]
fn test_name_search_filters_ranks_and_truncates() {
    let config = FixtureConfig::sample();
    let directory = directory_with(&config);
    let options = SearchOptionsBuilder::name_only().limit(4).build();

    let results = directory.search_riders("A", &options).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.name.to_lowercase().contains('a')));

    let counts: Vec<u64> = results
        .iter()
        .map(|r| directory.participation_count(r).unwrap())
        .collect();
    assert!(
        counts.windows(2).all(|w| w[0] >= w[1]),
        "counts should be descending: {counts:?}"
    );

    // Every excluded rider whose name matches ranks no higher than the last one kept.
    let all_matching = directory
        .search_riders("a", &SearchOptionsBuilder::name_only().build())
        .unwrap();
    let floor = *counts.last().unwrap();
    for rider in all_matching.iter().filter(|r| !results.contains(r)) {
        assert!(directory.participation_count(rider).unwrap() <= floor);
    }
}

#[test]
fn test_empty_query_returns_up_to_limit() {
    let config = FixtureConfig::sample();
    let directory = directory_with(&config);

    let everyone = directory
        .search_riders("", &SearchOptions::default())
        .unwrap();
    assert_eq!(everyone.len(), config.riders);

    let capped = directory
        .search_riders("", &SearchOptions::builder().limit(5).build())
        .unwrap();
    assert_eq!(capped.len(), 5);
}

#[test]
fn test_phone_search_needs_a_digit() {
    let directory = directory_with(&FixtureConfig::minimal());
    let phone_only = SearchOptionsBuilder::new().name(false).phone(true).build();

    assert!(directory.search_riders("bob", &phone_only).unwrap().is_empty());
    assert_eq!(
        names(&directory.search_riders("(416) 555-2222", &phone_only).unwrap()),
        ["Bob"]
    );

    let contact = SearchOptionsBuilder::contact().build();
    assert_eq!(
        names(&directory.search_riders("bob", &contact).unwrap()),
        ["Bob"],
        "email still matches when the phone clause is dropped"
    );
}

#[test]
fn test_invalid_create_publishes_nothing() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut events = directory.subscribe();

    let err = directory
        .create_rider(&RiderAttrs::new().name("Nobody").email("nope").phone("12"))
        .unwrap_err();
    let errors = err.validation_errors().expect("validation failure");
    assert_eq!(errors.on("email"), ["has invalid format"]);
    assert_eq!(errors.on("phone").len(), 1);

    let err = directory
        .create_rider(
            &RiderAttrs::new()
                .name("Alice Again")
                .email("alice@x.com")
                .phone("4165559999"),
        )
        .unwrap_err();
    assert_eq!(
        err.validation_errors().map(|e| e.on("email")),
        Some(vec!["has already been taken"])
    );

    assert_eq!(directory.count_riders().unwrap(), 2);
    assert!(events.drain().is_empty());
}

#[test]
fn test_update_publishes_and_delete_does_not() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut events = directory.subscribe();
    let bob = directory.get_rider_by_email("bob@x.com").unwrap();

    let bobby = directory
        .update_rider(&bob, &RiderAttrs::new().name("Bobby"))
        .unwrap();
    assert_eq!(bobby.email, bob.email);
    assert!(
        directory
            .update_rider(&bob, &RiderAttrs::new().email(""))
            .is_err()
    );

    directory.delete_rider(&bobby).unwrap();
    assert!(matches!(
        directory.delete_rider(&bobby),
        Err(RosterError::NotFound { .. })
    ));
    assert!(matches!(
        directory.update_rider(&bobby, &RiderAttrs::new().name("Ghost")),
        Err(RosterError::NotFound { .. })
    ));

    assert_eq!(events.drain(), vec![RiderEvent::Updated(bobby.clone())]);
    assert_eq!(directory.find_rider(bobby.id).unwrap(), None);
}

#[test]
fn test_phone_formats_find_the_same_rider() {
    let directory = directory_with(&FixtureConfig::minimal());
    let created = directory
        .create_rider(
            &RiderAttrs::new()
                .name("Dana")
                .email("dana@x.com")
                .phone("+1 416-555-1234"),
        )
        .unwrap();

    for phone in ["416-555-1234", "4165551234", "(416) 555.1234", "1 416 555 1234"] {
        assert_eq!(directory.get_rider_by_phone(phone).unwrap(), created);
    }
}

#[test]
fn test_list_riders_by_tag() {
    let config = FixtureConfig::sample();
    let directory = directory_with(&config);

    assert!(directory.list_riders_by_tag("unknown").unwrap().is_empty());
    assert!(directory.list_riders_by_tag("Captains").unwrap().is_empty());

    let captains = directory.list_riders_by_tag("captains").unwrap();
    // Riders 0, 4, 8, ... of the fixture.
    assert_eq!(captains.len(), config.riders.div_ceil(config.tags.len() + 1));
    for rider in &captains {
        assert!(
            directory
                .tags_for_rider(rider)
                .unwrap()
                .contains(&"captains".to_string())
        );
    }
}

#[test]
fn test_get_riders_skips_unknown_ids() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut found = directory.get_riders(&[2, 1000, 1]).unwrap();
    found.sort_by_key(|r| r.id);
    assert_eq!(names(&found), ["Alice", "Bob"]);
    assert_eq!(directory.list_riders().unwrap().len(), 2);
}

#[test]
fn test_two_subscriptions_each_receive_once() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut first = directory.subscribe();
    let mut second = directory.subscribe();

    let carl = directory.create_rider(&carl()).unwrap();

    for sub in [&mut first, &mut second] {
        assert_eq!(sub.drain(), vec![RiderEvent::Created(carl.clone())]);
    }
}

#[test]
fn test_shared_bus_across_directories() {
    setup_test_env();
    let bus = Arc::new(NotificationBus::new());
    let dir = tempfile::tempdir().unwrap();

    let first = Directory::open(dir.path(), Arc::clone(&bus)).unwrap();
    seed_store(first.store(), &FixtureConfig::minimal()).unwrap();
    first.save(dir.path()).unwrap();

    let second = Directory::open(dir.path(), Arc::clone(&bus)).unwrap();
    let mut events = bus.subscribe(roster::Topic::Riders);
    let carl = second.create_rider(&carl()).unwrap();
    assert_eq!(carl.id, 3, "ids continue from the snapshot");
    assert_eq!(events.drain().len(), 1);

    bus.shutdown();
    assert!(matches!(events.try_recv(), Err(roster::BusError::Closed)));
    // Mutations still succeed once nobody is listening.
    second
        .update_rider(&carl, &RiderAttrs::new().name("Carlos"))
        .unwrap();
}

#[tokio::test]
async fn test_subscriber_task_observes_creates() {
    let directory = directory_with(&FixtureConfig::minimal());
    let mut events = directory.subscribe();

    let listener = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event.into_rider().name);
        }
        seen
    });

    let writer = directory.clone();
    tokio::task::spawn_blocking(move || {
        writer.create_rider(&carl()).unwrap();
        writer
            .create_rider(
                &RiderAttrs::new()
                    .name("Dana")
                    .email("dana@x.com")
                    .phone("4165554444"),
            )
            .unwrap();
    })
    .await
    .unwrap();
    directory.bus().shutdown();

    let seen = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .expect("listener should finish after shutdown")
        .unwrap();
    assert_eq!(seen, ["Carl", "Dana"]);
}
