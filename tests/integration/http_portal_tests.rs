//! The HTTP portal against a mock planning portal
//!
//! These tests use wiremock to serve listing pages and letters and run a
//! whole session through them.

use crate::common::{fast_settings, item};
use objection_harvest::config::{PortalConfig, TimeoutConfig};
use objection_harvest::crawler::{HarvestSession, ListingCrawler, WorkItem};
use objection_harvest::ledger::CsvLedger;
use objection_harvest::portal::{ArtifactStore, HttpPortal, Portal};
use objection_harvest::state::{ObservationPosition, TerminalState};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/SearchResult/RunThirdPartySearch";

fn portal_config(server: &MockServer) -> PortalConfig {
    toml::from_str(&format!(
        r#"
base-url = "{}{}"
search-params = [["FileSystemId", "PL"]]
"#,
        server.uri(),
        SEARCH_PATH
    ))
    .unwrap()
}

fn timeouts() -> TimeoutConfig {
    TimeoutConfig {
        navigation: 5_000,
        resolve: 5_000,
        download: 5_000,
        settle: 0,
        confirm_pause: 0,
        page_advance: 0,
    }
}

fn http_session(
    dir: &Path,
    server: &MockServer,
) -> HarvestSession<HttpPortal, CsvLedger> {
    let portal = HttpPortal::new(&portal_config(server), &timeouts()).unwrap();
    let crawler = ListingCrawler::new(
        ArtifactStore::new(dir.join("pdfs")),
        Duration::from_secs(5),
        Duration::ZERO,
        true,
    );
    HarvestSession::new(
        portal,
        CsvLedger::new(dir.join("ledger.csv")),
        crawler,
        fast_settings(),
    )
    .unwrap()
}

fn listing_page(summary: &str, rows: &[&str], next: &str) -> String {
    let rows: String = rows
        .iter()
        .map(|href| {
            format!(
                r#"<tr><td><a href="{}"><span aria-label="3rd Party Observation Letter"></span></a></td></tr>"#,
                href
            )
        })
        .collect();
    format!(
        r#"<html><body>
<div id="searchResult_info">{}</div>
<table><tr><td><a href="/doc/plan"><span aria-label="Planning Report"></span></a></td></tr>{}</table>
{}
</body></html>"#,
        summary, rows, next
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_two_page_listing(server: &MockServer, item_id: &str) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("Folder1_Ref", item_id))
        .respond_with(html(listing_page(
            "Showing 1 to 3 of 3 entries",
            &["/doc/1", "/doc/2"],
            r#"<a id="searchResult_next" href="?page=2">Next</a>"#,
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("page", "2"))
        .respond_with(html(listing_page(
            "Showing 1 to 3 of 3 entries",
            &["/doc/3"],
            r#"<a id="searchResult_next" class="paginate_button disabled" href="?page=3">Next</a>"#,
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/doc/1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 one".to_vec()))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/doc/2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/doc/3"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/files/3.pdf"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files/3.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 three".to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_harvest_over_http_listing() {
    let server = MockServer::start().await;
    mount_two_page_listing(&server, "100/23").await;

    let dir = TempDir::new().unwrap();
    let mut session = http_session(dir.path(), &server);
    session
        .run(&[WorkItem::full(item(0, "100/23"))])
        .await
        .unwrap();

    let entry = &session.ledger().entries().unwrap()[0];
    assert_eq!(entry.terminal_state, TerminalState::HasRecords);
    assert!(entry.error.is_empty());
    assert_eq!(entry.observation_count(), 3);
    assert_eq!(
        entry.positions.get(0),
        Some(&ObservationPosition::Resolved(format!("{}/doc/1", server.uri())))
    );
    assert_eq!(entry.positions.get(1), Some(&ObservationPosition::Failed));
    assert_eq!(
        entry.positions.get(2),
        Some(&ObservationPosition::Resolved(format!(
            "{}/files/3.pdf",
            server.uri()
        )))
    );

    let store = ArtifactStore::new(dir.path().join("pdfs"));
    assert!(store.exists("100/23", 0));
    assert!(!store.exists("100/23", 1));
    assert!(store.exists("100/23", 2));
    assert_eq!(
        std::fs::read(store.path_for("100/23", 2)).unwrap(),
        b"%PDF-1.4 three"
    );
}

#[tokio::test]
async fn test_empty_listing_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("Folder1_Ref", "200/23"))
        .respond_with(html(listing_page(
            "Showing 0 to 0 of 0 entries",
            &[],
            r#"<a id="searchResult_next" class="disabled">Next</a>"#,
        )))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut session = http_session(dir.path(), &server);
    let summary = session
        .run(&[WorkItem::full(item(0, "200/23"))])
        .await
        .unwrap();

    assert_eq!(summary.no_records, 1);
    let entry = &session.ledger().entries().unwrap()[0];
    assert_eq!(entry.terminal_state, TerminalState::NoRecords);
    assert!(entry.positions.is_empty());
}

#[tokio::test]
async fn test_server_error_becomes_page_failure_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("Folder1_Ref", "999/23"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut session = http_session(dir.path(), &server);
    let summary = session
        .run(&[WorkItem::full(item(0, "999/23"))])
        .await
        .unwrap();

    assert_eq!(summary.page_failures, 1);
    let entry = &session.ledger().entries().unwrap()[0];
    assert!(entry.error.contains("500"));
    assert!(entry.positions.is_empty());
}

#[tokio::test]
async fn test_portal_reads_listing_directly() {
    let server = MockServer::start().await;
    mount_two_page_listing(&server, "300/23").await;

    let mut portal = HttpPortal::new(&portal_config(&server), &timeouts()).unwrap();
    portal.open_listing("300/23").await.unwrap();

    assert_eq!(
        portal.summary_text().await.as_deref(),
        Some("Showing 1 to 3 of 3 entries")
    );
    let first = portal.indicators().await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].label, "3rd Party Observation Letter");

    assert!(portal.next_page().await.unwrap());
    let second = portal.indicators().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(
        second[0].target.as_deref(),
        Some(format!("{}/doc/3", server.uri()).as_str())
    );

    // The disabled control ends the listing
    assert!(!portal.next_page().await.unwrap());
}
