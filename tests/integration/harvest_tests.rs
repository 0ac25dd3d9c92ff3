//! Harvest session behaviour against a scripted portal

use crate::common::*;
use objection_harvest::crawler::{HarvestSession, WorkItem};
use objection_harvest::ledger::{CsvLedger, Ledger, LedgerEntry};
use objection_harvest::portal::ArtifactStore;
use objection_harvest::state::{ObservationPosition, Positions, TerminalState};
use objection_harvest::HarvestError;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

fn work(items: &[(u64, &str)]) -> Vec<WorkItem> {
    items
        .iter()
        .map(|(row_index, id)| WorkItem::full(item(*row_index, id)))
        .collect()
}

#[tokio::test]
async fn test_resume_after_crash_appends_only_remaining_items() {
    let dir = TempDir::new().unwrap();
    let shard = work(&[(0, "A"), (1, "B"), (2, "C")]);

    // The first run wrote A and then died
    let mut ledger = CsvLedger::new(dir.path().join("ledger.csv"));
    ledger
        .append(&LedgerEntry::with_positions(
            &item(0, "A"),
            Positions::parse_ledger("https://docs/a1"),
        ))
        .unwrap();

    let portal = ScriptedPortal::new()
        .with_listing("A", Listing::pages(vec![vec![ok("https://docs/a1")]]))
        .with_listing("B", Listing::no_records())
        .with_listing("C", Listing::pages(vec![vec![ok("https://docs/c1")]]));

    let mut session = session(dir.path(), portal);
    let summary = session.run(&shard).await.unwrap();

    assert_eq!(summary.processed, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(session.portal().opened_items(), vec!["B", "C"]);

    let entries = session.ledger().entries().unwrap();
    let indices: Vec<u64> = entries.iter().map(|e| e.row_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    // A third launch has nothing left to do
    let mut again = crate::common::session(dir.path(), ScriptedPortal::new());
    let summary = again.run(&shard).await.unwrap();
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.skipped, 3);
    assert!(again.portal().opened.is_empty());
    assert_eq!(again.ledger().entries().unwrap().len(), 3);
}

#[tokio::test]
async fn test_failed_position_still_occupies_its_slot() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new().with_listing(
        "D",
        Listing::pages(vec![
            vec![ok("https://docs/d1"), fail()],
            vec![ok("https://docs/d3")],
        ]),
    );

    let mut session = session(dir.path(), portal);
    session.run(&work(&[(3, "D")])).await.unwrap();

    let entries = session.ledger().entries().unwrap();
    let entry = &entries[0];
    assert_eq!(entry.terminal_state, TerminalState::HasRecords);
    assert_eq!(entry.observation_count(), 3);
    assert_eq!(
        entry.positions,
        Positions::from_vec(vec![
            ObservationPosition::Resolved("https://docs/d1".to_string()),
            ObservationPosition::Failed,
            ObservationPosition::Resolved("https://docs/d3".to_string()),
        ])
    );

    let content = std::fs::read_to_string(dir.path().join("ledger.csv")).unwrap();
    let row = content.lines().nth(1).unwrap();
    assert_eq!(
        row,
        "0,3,D,0,True,3,https://docs/d1;DOWNLOAD_FAILED;https://docs/d3,"
    );
}

#[tokio::test]
async fn test_count_matches_positions_for_every_entry() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new()
        .with_listing("A", Listing::no_records())
        .with_listing("B", Listing::pages(vec![vec![fail(), fail()], vec![fail()]]))
        .with_listing("C", Listing::pages(vec![vec![]]))
        .with_listing("D", Listing::pages(vec![vec![ok("u1")]]).with_nav_failures(5));

    let mut session = session(dir.path(), portal);
    session
        .run(&work(&[(0, "A"), (1, "B"), (2, "C"), (3, "D")]))
        .await
        .unwrap();

    let content = std::fs::read_to_string(dir.path().join("ledger.csv")).unwrap();
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    for record in reader.records() {
        let record = record.unwrap();
        let declared: usize = record[5].parse().unwrap();
        let positions = Positions::parse_ledger(&record[6]);
        assert_eq!(declared, positions.len(), "row {:?}", record);
    }
}

#[tokio::test]
async fn test_no_records_confirmed_by_second_read() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new()
        .with_listing("EMPTY", Listing::no_records())
        .with_listing(
            "FLICKER",
            Listing::pages(vec![vec![ok("u1"), ok("u2")]])
                .with_summaries(&[NO_RECORDS, "Showing 1 to 2 of 2 entries"]),
        );

    let mut session = session(dir.path(), portal);
    let summary = session
        .run(&work(&[(0, "EMPTY"), (1, "FLICKER")]))
        .await
        .unwrap();
    assert_eq!(summary.no_records, 1);

    let entries = session.ledger().entries().unwrap();
    assert_eq!(entries[0].terminal_state, TerminalState::NoRecords);
    assert_eq!(entries[0].observation_count(), 0);
    assert!(!entries[0].is_page_failure());

    assert_eq!(entries[1].terminal_state, TerminalState::HasRecords);
    assert_eq!(entries[1].observation_count(), 2);
}

#[tokio::test]
async fn test_navigation_retries_then_records_page_failure() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new()
        .with_listing("FLAKY", Listing::pages(vec![vec![ok("u1")]]).with_nav_failures(2))
        .with_listing("DEAD", Listing::pages(vec![vec![ok("u1")]]).with_nav_failures(3));

    let mut session = session(dir.path(), portal);
    let summary = session
        .run(&work(&[(0, "FLAKY"), (1, "DEAD")]))
        .await
        .unwrap();
    assert_eq!(summary.page_failures, 1);

    let opened = &session.portal().opened;
    assert_eq!(opened.iter().filter(|id| *id == "FLAKY").count(), 3);
    assert_eq!(opened.iter().filter(|id| *id == "DEAD").count(), 3);

    let entries = session.ledger().entries().unwrap();
    assert!(!entries[0].is_page_failure());
    assert_eq!(entries[0].observation_count(), 1);

    assert!(entries[1].is_page_failure());
    assert!(entries[1].error.contains("navigation failed after 3 attempts"));
    assert!(entries[1].positions.is_empty());
    assert_eq!(entries[1].terminal_state, TerminalState::HasRecords);
}

#[tokio::test]
async fn test_pagination_failure_is_page_failure() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new().with_listing(
        "P",
        Listing::pages(vec![vec![ok("u1")], vec![ok("u2")]]).failing_after_page(0),
    );

    let mut session = session(dir.path(), portal);
    session.run(&work(&[(0, "P")])).await.unwrap();

    let entry = &session.ledger().entries().unwrap()[0];
    assert!(entry.error.starts_with("pagination failed"));
    assert!(entry.positions.is_empty());
}

#[tokio::test]
async fn test_resolution_timeout_degrades_to_failed() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new().with_listing(
        "SLOW",
        Listing::pages(vec![vec![Outcome::Hang, ok("u2")]]),
    );

    let mut session = session(dir.path(), portal);
    session.run(&work(&[(0, "SLOW")])).await.unwrap();

    let entry = &session.ledger().entries().unwrap()[0];
    assert!(!entry.is_page_failure());
    assert_eq!(entry.positions.failed_indices(), BTreeSet::from([0]));
    assert_eq!(entry.positions.get(1).and_then(|p| p.locator()), Some("u2"));
}

#[tokio::test]
async fn test_stored_artifact_is_not_fetched_again() {
    let dir = TempDir::new().unwrap();
    let store = ArtifactStore::new(dir.path().join("pdfs"));
    store.ensure_root().unwrap();
    std::fs::write(store.path_for("1234/23", 0), b"%PDF").unwrap();

    let portal = ScriptedPortal::new().with_listing(
        "1234/23",
        Listing::pages(vec![vec![ok("u1"), ok("u2")]]),
    );

    let mut session = session(dir.path(), portal);
    session.run(&work(&[(0, "1234/23")])).await.unwrap();

    let entry = &session.ledger().entries().unwrap()[0];
    assert_eq!(entry.positions.to_ledger_string(), "EXISTS;u2");
    assert_eq!(
        session.portal().resolved,
        vec![("1234/23".to_string(), 0, 1)]
    );
    assert!(store.exists("1234/23", 1));
}

#[tokio::test]
async fn test_stop_flag_interrupts_before_next_item() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new().with_listing("A", Listing::no_records());

    let stop = Arc::new(AtomicBool::new(true));
    let mut session = session(dir.path(), portal).with_stop_flag(stop);
    let result = session.run(&work(&[(0, "A")])).await;

    assert!(matches!(
        result,
        Err(HarvestError::Interrupted { processed: 0 })
    ));
    assert!(session.ledger().load_done_set().unwrap().is_empty());
}

#[tokio::test]
async fn test_portal_recycled_periodically() {
    let dir = TempDir::new().unwrap();
    let mut portal = ScriptedPortal::new();
    let mut items = Vec::new();
    for i in 0..5u64 {
        let id = format!("R{}", i);
        portal = portal.with_listing(&id, Listing::no_records());
        items.push(WorkItem::full(item(i, &id)));
    }

    let mut settings = fast_settings();
    settings.recycle_every = 2;
    let mut session = HarvestSession::new(
        portal,
        CsvLedger::new(dir.path().join("ledger.csv")),
        crawler(&dir.path().join("pdfs")),
        settings,
    )
    .unwrap();

    session.run(&items).await.unwrap();
    assert_eq!(session.portal().recycles, 2);
}

#[tokio::test]
async fn test_empty_item_id_is_recorded_as_failure() {
    let dir = TempDir::new().unwrap();
    let mut session = session(dir.path(), ScriptedPortal::new());
    session.run(&work(&[(4, "  ")])).await.unwrap();

    let entry = &session.ledger().entries().unwrap()[0];
    assert_eq!(entry.error, "empty item id");
    assert!(session.portal().opened.is_empty());
}

#[tokio::test]
async fn test_duplicate_work_items_append_once() {
    let dir = TempDir::new().unwrap();
    let portal = ScriptedPortal::new().with_listing("A", Listing::no_records());

    let mut session = session(dir.path(), portal);
    let summary = session
        .run(&work(&[(0, "A"), (0, "A")]))
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    let done: HashSet<u64> = session.ledger().load_done_set().unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(session.ledger().entries().unwrap().len(), 1);
}
