//! Integration tests for the record stream
//!
//! These tests use wiremock to stand in for the register and drive the
//! stream end-to-end: listing queries, the rating fallback, detail
//! enrichment, retries and encoding repair.

use register_crawl::config::{
    Config, ConnectionConfig, CrawlerConfig, EncodingPolicy, OutputConfig, UserAgentConfig,
};
use register_crawl::crawler::{Connection, RecordStream, RATING_BUCKETS};
use register_crawl::storage::{RecordStore, RunStatus, SqliteStore};
use register_crawl::{ClassificationRecord, CrawlError, Field};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const LISTING_PATH: &str = "/www/cob/find.nsf/classifications";
const DETAIL_PATH_RE: &str = r"^/www/cob/find\.nsf/d853f429dd038ae1ca25759b0003557c/";

/// Matches listing queries for the window starting at `begin`
///
/// `bucket` restricts the match to one rating bucket's query; `None` matches
/// only the all-ratings query.
struct ListingQuery {
    begin: String,
    bucket: Option<String>,
}

impl ListingQuery {
    fn all_ratings(begin: &str) -> Self {
        Self {
            begin: begin.to_string(),
            bucket: None,
        }
    }

    fn bucket(begin: &str, index: usize) -> Self {
        Self {
            begin: begin.to_string(),
            bucket: Some(RATING_BUCKETS[index].clause()),
        }
    }
}

impl Match for ListingQuery {
    fn matches(&self, request: &Request) -> bool {
        let Some(query) = request.url.query() else {
            return false;
        };
        let window = format!("%5BclassificationDate%5D%3E={})", self.begin);
        if !query.contains(&window) {
            return false;
        }
        match &self.bucket {
            Some(clause) => query.ends_with(clause.as_str()),
            None => !query.contains("rating"),
        }
    }
}

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn connection_config(base_url: &str, max_attempts: Option<u32>) -> ConnectionConfig {
    ConnectionConfig {
        base_url: base_url.to_string(),
        read_timeout_ms: 2000,
        connect_timeout_ms: 2000,
        max_attempts,
        retry_delay_ms: 0,
    }
}

/// A stream over 2000 positioned after `(2000, month, day)`
fn open_stream(
    base_url: &str,
    max_attempts: Option<u32>,
    policy: EncodingPolicy,
    month: u32,
    day: u32,
) -> RecordStream {
    let conn = Connection::open(&connection_config(base_url, max_attempts), &user_agent())
        .expect("Failed to open connection");
    let mut stream = RecordStream::with_connection(conn, 2000, 2001, policy);
    stream.resume(2000, month, day).expect("Invalid checkpoint");
    stream
}

fn listing_page(reported: usize, ids: &[String]) -> String {
    let rows: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td>01/12/2000</td><td><a href="/www/cob/find.nsf/d853f429dd038ae1ca25759b0003557c/{id}?OpenDocument">TITLE {id}</a></td><td>M</td></tr>"#
            )
        })
        .collect();

    format!(
        r#"<html><body><div class="content">
        <p>Showing 1 - {} of {} results</p>
        <div id="results"><table>
        <tr><th>Date</th><th>Title</th><th>Classification</th></tr>
        {}
        </table></div></div></body></html>"#,
        ids.len(),
        reported,
        rows
    )
}

const EMPTY_LISTING: &str =
    r#"<html><body><div class="content"><p>No documents found</p></div></body></html>"#;

fn detail_page(classification: &str) -> String {
    format!(
        r#"<html><body><div class="content">
        <p><b>A TITLE</b> Feature Film (Cinema)</p>
        <div class="fform">
        <div class="frow"><span class="flabel">Classification</span><span class="ffield">{}</span></div>
        <div class="frow"><span class="flabel">Date of Classification</span><span class="ffield">12/05/2000</span></div>
        <div class="frow"><span class="flabel">Version</span><span class="ffield">Original</span></div>
        </div></div></body></html>"#,
        classification
    )
}

fn ids(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}{}", prefix, i)).collect()
}

async fn mount_listing(server: &MockServer, query: ListingQuery, body: String) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query)
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn mount_empty_listings(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(EMPTY_LISTING))
        .mount(server)
        .await;
}

async fn mount_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(DETAIL_PATH_RE))
        .respond_with(ResponseTemplate::new(200).set_body_string(detail_page("M")))
        .mount(server)
        .await;
}

async fn collect(stream: &mut RecordStream) -> Vec<ClassificationRecord> {
    let mut records = Vec::new();
    while let Some(record) = stream.next().await.expect("stream failed") {
        records.push(record);
    }
    records
}

#[tokio::test]
async fn test_window_below_cap_yields_every_row_in_order() {
    let server = MockServer::start().await;
    let rows = ids("r", 437);

    mount_listing(&server, ListingQuery::all_ratings("1/12/2000"), listing_page(437, &rows)).await;
    mount_empty_listings(&server).await;
    mount_details(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 11, 15);
    let records = collect(&mut stream).await;

    assert_eq!(records.len(), 437);
    let got: Vec<&str> = records.iter().map(|r| r.detail_id()).collect();
    assert_eq!(got, rows.iter().map(String::as_str).collect::<Vec<_>>());

    let first = &records[0];
    assert_eq!(first.title(), "TITLE r0");
    assert_eq!(first.get(&Field::Classification), Some("M"));
    assert_eq!(first.get(&Field::DateOfClassification), Some("2000-12-05"));
    assert_eq!(first.get(&Field::Medium), Some("Cinema"));

    // [1/12/2000, 15/12/2000) and [15/12/2000, 1/1/2001)
    assert_eq!(stream.stats().windows, 2);
    assert_eq!(stream.stats().fallback_windows, 0);
    assert_eq!(stream.stats().records, 437);
}

#[tokio::test]
async fn test_saturated_window_queries_every_bucket_before_details() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(1000, &ids("x", 20)),
    )
    .await;
    mount_listing(
        &server,
        ListingQuery::bucket("15/12/2000", 1),
        listing_page(3, &["g1".to_string(), "g2".to_string(), "g3".to_string()]),
    )
    .await;
    mount_listing(
        &server,
        ListingQuery::bucket("15/12/2000", 3),
        listing_page(2, &["m1".to_string(), "g2".to_string()]),
    )
    .await;
    mount_empty_listings(&server).await;
    mount_details(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);
    let records = collect(&mut stream).await;

    let got: Vec<&str> = records.iter().map(|r| r.detail_id()).collect();
    assert_eq!(got, vec!["g1", "g2", "g3", "m1"]);
    assert_eq!(stream.stats().fallback_windows, 1);
    assert_eq!(stream.stats().duplicates, 1);

    let requests = server.received_requests().await.unwrap();
    let is_listing: Vec<bool> = requests
        .iter()
        .map(|r| r.url.path() == LISTING_PATH)
        .collect();

    // One all-ratings query plus one per bucket, all before any detail page
    assert_eq!(is_listing.len(), 1 + RATING_BUCKETS.len() + 4);
    assert!(is_listing[..1 + RATING_BUCKETS.len()].iter().all(|&l| l));
    assert!(is_listing[1 + RATING_BUCKETS.len()..].iter().all(|&l| !l));
}

#[tokio::test]
async fn test_saturated_bucket_is_a_data_integrity_error() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(1000, &ids("x", 5)),
    )
    .await;
    mount_listing(
        &server,
        ListingQuery::bucket("15/12/2000", 2),
        listing_page(1000, &ids("pg", 5)),
    )
    .await;
    mount_empty_listings(&server).await;
    mount_details(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);

    match stream.next().await {
        Err(CrawlError::DataIntegrity { bucket, count, .. }) => {
            assert_eq!(bucket, "PG");
            assert_eq!(count, 1000);
        }
        other => panic!("expected DataIntegrity, got {:?}", other.map(|r| r.is_some())),
    }

    // The failed window is behind the stream; the range is now exhausted
    assert!(stream.next().await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_errors_are_retried_on_a_fresh_connection() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(ListingQuery::all_ratings("15/12/2000"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(2, &ids("ok", 2)),
    )
    .await;
    mount_details(&server).await;

    // Unbounded retries
    let mut stream = open_stream(&server.uri(), None, EncodingPolicy::Abort, 12, 1);
    let records = collect(&mut stream).await;

    assert_eq!(records.len(), 2);
    assert_eq!(stream.reconnects(), 2);
}

#[tokio::test]
async fn test_capped_retries_give_up() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);

    match stream.next().await {
        Err(CrawlError::RetriesExhausted {
            attempts, reason, ..
        }) => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"));
        }
        other => panic!("expected RetriesExhausted, got {:?}", other.map(|r| r.is_some())),
    }
}

#[tokio::test]
async fn test_connection_refused_is_retried() {
    // Nothing listens on port 1
    let mut stream = open_stream("http://127.0.0.1:1", Some(2), EncodingPolicy::Abort, 12, 1);

    let err = stream.next().await.unwrap_err();
    assert!(matches!(err, CrawlError::RetriesExhausted { attempts: 2, .. }));
    assert_eq!(stream.reconnects(), 1);
}

#[tokio::test]
async fn test_latin1_detail_page_is_transcoded() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(1, &["cafe1".to_string()]),
    )
    .await;

    let mut body = b"<html><body><div class=\"content\"><p><b>X</b> Film (DVD)</p><div class=\"fform\">".to_vec();
    body.extend_from_slice(
        b"<div class=\"frow\"><span class=\"flabel\">Title</span><span class=\"ffield\">Caf\xe9 Society</span></div>",
    );
    body.extend_from_slice(
        "<div class=\"frow\"><span class=\"flabel\">Author</span><span class=\"ffield\">Zoë</span></div>"
            .as_bytes(),
    );
    body.extend_from_slice(b"</div></div></body></html>");

    Mock::given(method("GET"))
        .and(path_regex(DETAIL_PATH_RE))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);
    let record = stream.next().await.unwrap().unwrap();

    assert_eq!(record.title(), "Café Society");
    assert_eq!(record.get(&Field::Author), Some("Zoë"));
    assert_eq!(record.detail_id(), "cafe1");
}

async fn mount_undecodable_window(server: &MockServer) {
    mount_listing(
        server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(2, &["bad1".to_string(), "good1".to_string()]),
    )
    .await;

    let mut body = b"<html><body><div class=\"fform\"><div class=\"frow\">".to_vec();
    body.extend_from_slice(
        b"<span class=\"flabel\">Publisher</span><span class=\"ffield\">\x81\x8d\x90</span>",
    );
    body.extend_from_slice(b"</div></div></body></html>");

    Mock::given(method("GET"))
        .and(path_regex(r"/bad1$"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
    mount_details(server).await;
}

#[tokio::test]
async fn test_undecodable_field_aborts_the_record() {
    let server = MockServer::start().await;
    mount_undecodable_window(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);

    match stream.next().await {
        Err(CrawlError::Encoding {
            detail_id, field, ..
        }) => {
            assert_eq!(detail_id, "bad1");
            assert_eq!(field, "publisher");
        }
        other => panic!("expected Encoding error, got {:?}", other.map(|r| r.is_some())),
    }

    // The stream moves past the failed record
    let next = stream.next().await.unwrap().unwrap();
    assert_eq!(next.detail_id(), "good1");
}

#[tokio::test]
async fn test_undecodable_field_is_skipped_under_skip_policy() {
    let server = MockServer::start().await;
    mount_undecodable_window(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Skip, 12, 1);
    let records = collect(&mut stream).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].detail_id(), "good1");
    assert_eq!(stream.stats().skipped, 1);
}

#[tokio::test]
async fn test_peek_then_next_and_terminal_end() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(2, &ids("p", 2)),
    )
    .await;
    mount_details(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);

    let peeked = stream.peek().await.unwrap().cloned().unwrap();
    let again = stream.peek().await.unwrap().cloned().unwrap();
    assert_eq!(peeked, again);
    assert_eq!(stream.next().await.unwrap().unwrap(), peeked);

    assert_eq!(stream.next().await.unwrap().unwrap().detail_id(), "p1");
    assert!(stream.peek().await.unwrap().is_none());
    assert!(stream.next().await.unwrap().is_none());
    assert!(stream.next().await.unwrap().is_none());
    assert!(stream.is_done());

    // Two listing queries would mean the window was fetched twice
    let listings = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == LISTING_PATH)
        .count();
    assert_eq!(listings, 1);
}

#[tokio::test]
async fn test_resume_discards_peeked_record() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(1, &["late1".to_string()]),
    )
    .await;
    mount_listing(
        &server,
        ListingQuery::all_ratings("1/12/2000"),
        listing_page(1, &["early1".to_string()]),
    )
    .await;
    mount_details(&server).await;

    let mut stream = open_stream(&server.uri(), Some(3), EncodingPolicy::Abort, 12, 1);
    assert_eq!(stream.peek().await.unwrap().unwrap().detail_id(), "late1");

    stream.resume(2000, 11, 15).unwrap();
    let records = collect(&mut stream).await;
    let got: Vec<&str> = records.iter().map(|r| r.detail_id()).collect();
    assert_eq!(got, vec!["early1", "late1"]);
}

#[tokio::test]
async fn test_records_stream_into_store() {
    let server = MockServer::start().await;

    mount_listing(
        &server,
        ListingQuery::all_ratings("15/12/2000"),
        listing_page(3, &ids("s", 3)),
    )
    .await;
    mount_details(&server).await;

    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("register.db");
    let config = Config {
        crawler: CrawlerConfig {
            start_year: 2000,
            finish_year: 2001,
            on_encoding_error: EncodingPolicy::Abort,
        },
        connection: connection_config(&server.uri(), Some(3)),
        user_agent: user_agent(),
        output: OutputConfig {
            database_path: db_path.to_string_lossy().to_string(),
        },
    };

    let mut store = SqliteStore::new(&db_path).unwrap();
    let run_id = store.create_run("hash").unwrap();

    for pass in 0..2 {
        let mut stream = RecordStream::new(&config).unwrap();
        stream.resume(2000, 12, 1).unwrap();
        let mut inserted = 0;
        while let Some(record) = stream.next().await.unwrap() {
            if store.insert_record(&record, run_id).unwrap() {
                inserted += 1;
            }
        }
        assert_eq!(inserted, if pass == 0 { 3 } else { 0 });
    }
    store.finish_run(run_id, RunStatus::Completed).unwrap();

    assert_eq!(store.count_records().unwrap(), 3);
    assert_eq!(
        store.last_classification_date().unwrap(),
        chrono::NaiveDate::from_ymd_opt(2000, 12, 5)
    );
    assert_eq!(
        store.count_by_classification().unwrap(),
        vec![("M".to_string(), 3)]
    );

    let stored = store.get_record("s1").unwrap().unwrap();
    assert_eq!(stored.get(&Field::Medium), Some("Cinema"));
    assert_eq!(
        store.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}
