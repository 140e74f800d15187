use shared::{run_ingest, Error, FeedSource, IngestSettings, Store};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_rss() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Test Feed</title>
    <link>http://example.com/</link>
    <description>Test description</description>
    <language>en-gb</language>
    <item>
      <title>Item A</title>
      <link>http://example.com/a</link>
      <guid>a</guid>
      <pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate>
      <description>First</description>
    </item>
    <item>
      <title>Item B</title>
      <link>http://example.com/b</link>
      <guid>b</guid>
      <pubDate>Mon, 21 Oct 2024 08:00:00 GMT</pubDate>
      <description>Second</description>
    </item>
    <item>
      <title>Item C</title>
      <link>http://example.com/c</link>
      <guid>c</guid>
      <description>Third</description>
    </item>
  </channel>
</rss>"#
        .to_string()
}

fn sample_atom() -> String {
    r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2024-10-21T10:00:00Z</updated>
  <entry>
    <title>Atom entry</title>
    <id>urn:entry:1</id>
    <link href="https://example.org/entry-1"/>
    <updated>2024-10-21T10:00:00Z</updated>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
  </entry>
</feed>"#
        .to_string()
}

fn settings() -> IngestSettings {
    IngestSettings {
        concurrency: 2,
        timeout_secs: 2,
        retry_attempts: 1,
        retry_backoff_ms: 10,
        ..IngestSettings::default()
    }
}

fn feed(server: &MockServer, name: &str, route: &str) -> FeedSource {
    FeedSource::new(name, format!("{}{}", server.uri(), route))
}

/// Key of an item whose GUID is not a URI.
fn scoped_key(feed: &FeedSource, guid: &str) -> String {
    format!("{}#{}", feed.url, guid)
}

fn single_item_rss(guid: &str, title: &str, link: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>{title} feed</title>
    <link>{link}</link>
    <description>One item</description>
    <item>
      <title>{title}</title>
      <link>{link}</link>
      <guid isPermaLink="false">{guid}</guid>
      <description>About {title}</description>
    </item>
  </channel>
</rss>"#
    )
}

async fn serve(server: &MockServer, route: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .insert_header("content-type", "application/rss+xml")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn second_run_on_unchanged_feed_inserts_nothing() {
    let server = MockServer::start().await;
    serve(&server, "/feed", 200, sample_rss()).await;

    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("news.db").display());
    let mut store = Store::open(&url).unwrap();
    let feeds = vec![feed(&server, "Test", "/feed")];

    let first = run_ingest(&mut store, feeds.clone(), &settings()).await.unwrap();
    assert_eq!(first.articles_inserted, 3);
    assert_eq!(first.duplicates, 0);
    assert_eq!(store.count_articles().unwrap(), 3);

    let second = run_ingest(&mut store, feeds.clone(), &settings()).await.unwrap();
    assert_eq!(second.articles_inserted, 0);
    assert_eq!(second.duplicates, 3);
    assert_eq!(store.count_articles().unwrap(), 3);

    let a = store
        .article(&scoped_key(&feeds[0], "a"))
        .unwrap()
        .expect("article a stored");
    assert_eq!(a.title, "Item A");
    assert_eq!(a.body, "First");
    assert_eq!(a.language.as_deref(), Some("en-gb"));
    assert!(!a.summarized);
    assert!(store
        .article(&scoped_key(&feeds[0], "c"))
        .unwrap()
        .unwrap()
        .published_at
        .is_none());

    // a fresh connection sees the same rows
    drop(store);
    let reopened = Store::open(&url).unwrap();
    assert_eq!(reopened.count_articles().unwrap(), 3);
}

#[tokio::test]
async fn one_failing_feed_does_not_abort_the_others() {
    let server = MockServer::start().await;
    serve(&server, "/good", 200, sample_rss()).await;
    serve(&server, "/missing", 404, "not found".to_string()).await;
    serve(&server, "/garbage", 200, "<html>not a feed</html>".to_string()).await;

    let mut store = Store::open_in_memory().unwrap();
    let good = feed(&server, "Good", "/good");
    let missing = feed(&server, "Missing", "/missing");
    let garbage = feed(&server, "Garbage", "/garbage");

    let report = run_ingest(
        &mut store,
        vec![good.clone(), missing.clone(), garbage.clone()],
        &settings(),
    )
    .await
    .unwrap();

    assert_eq!(report.feeds_attempted, 3);
    assert_eq!(report.feeds_succeeded, 1);
    assert_eq!(report.feeds_failed, 2);
    assert_eq!(report.articles_inserted, 3);

    let ok_status = store.feed_status(&good.url).unwrap().unwrap();
    assert_eq!(ok_status.articles_count, 3);
    assert!(ok_status.last_success_at.is_some());
    assert!(ok_status.last_error.is_none());

    let missing_status = store.feed_status(&missing.url).unwrap().unwrap();
    assert!(missing_status.last_success_at.is_none());
    assert!(missing_status.last_fetched_at.is_some());
    assert!(missing_status.last_error.unwrap().contains("404"));

    let garbage_status = store.feed_status(&garbage.url).unwrap().unwrap();
    assert!(garbage_status.last_error.unwrap().contains("parsing"));
}

#[tokio::test]
async fn all_feeds_failing_is_an_error() {
    let server = MockServer::start().await;
    serve(&server, "/gone", 410, String::new()).await;

    let mut store = Store::open_in_memory().unwrap();
    let feeds = vec![feed(&server, "Gone", "/gone"), feed(&server, "Nowhere", "/nowhere")];

    let err = run_ingest(&mut store, feeds, &settings()).await.unwrap_err();
    assert!(matches!(err, Error::AllFeedsFailed(2)));
    assert_eq!(store.count_articles().unwrap(), 0);
}

#[tokio::test]
async fn empty_feed_list_is_a_no_op() {
    let mut store = Store::open_in_memory().unwrap();
    let report = run_ingest(&mut store, Vec::new(), &settings()).await.unwrap();
    assert_eq!(report.feeds_attempted, 0);
    assert_eq!(store.count_articles().unwrap(), 0);
}

#[tokio::test]
async fn transient_server_error_is_retried_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    serve(&server, "/flaky", 200, sample_rss()).await;

    let mut store = Store::open_in_memory().unwrap();
    let report = run_ingest(&mut store, vec![feed(&server, "Flaky", "/flaky")], &settings())
        .await
        .unwrap();

    assert_eq!(report.feeds_failed, 0);
    assert_eq!(report.articles_inserted, 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    serve(&server, "/ok", 200, sample_rss()).await;

    let mut store = Store::open_in_memory().unwrap();
    let report = run_ingest(
        &mut store,
        vec![feed(&server, "Forbidden", "/forbidden"), feed(&server, "Ok", "/ok")],
        &settings(),
    )
    .await
    .unwrap();

    assert_eq!(report.feeds_failed, 1);
}

#[tokio::test]
async fn atom_feeds_and_entry_limits_are_honoured() {
    let server = MockServer::start().await;
    serve(&server, "/atom", 200, sample_atom()).await;
    serve(&server, "/rss", 200, sample_rss()).await;

    let mut store = Store::open_in_memory().unwrap();
    let mut limited = settings();
    limited.max_articles_per_feed = 2;

    let mut world = feed(&server, "Atom", "/atom");
    world.category = Some("world".to_string());
    world.country = Some("FR".to_string());
    world.language = Some("fr".to_string());
    let rss = feed(&server, "Rss", "/rss");

    let report = run_ingest(&mut store, vec![world, rss.clone()], &limited)
        .await
        .unwrap();

    assert_eq!(report.articles_inserted, 3);
    let entry = store.article("urn:entry:1").unwrap().unwrap();
    assert_eq!(entry.body, "Body");
    assert_eq!(entry.category.as_deref(), Some("world"));
    assert_eq!(entry.country.as_deref(), Some("FR"));
    assert_eq!(entry.language.as_deref(), Some("fr"), "configured language fills the gap");
    assert!(
        store.article(&scoped_key(&rss, "c")).unwrap().is_none(),
        "third RSS item is over the limit"
    );
}

#[tokio::test]
async fn feeds_sharing_an_opaque_guid_keep_both_articles() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/alpha",
        200,
        single_item_rss("1", "Alpha story", "https://alpha.example/story"),
    )
    .await;
    serve(
        &server,
        "/beta",
        200,
        single_item_rss("1", "Beta story", "https://beta.example/story"),
    )
    .await;

    let mut store = Store::open_in_memory().unwrap();
    let alpha = feed(&server, "Alpha", "/alpha");
    let beta = feed(&server, "Beta", "/beta");

    let report = run_ingest(&mut store, vec![alpha.clone(), beta.clone()], &settings())
        .await
        .unwrap();

    assert_eq!(report.articles_inserted, 2);
    assert_eq!(report.duplicates, 0);
    assert_eq!(store.count_articles().unwrap(), 2);
    assert_eq!(
        store.article(&scoped_key(&beta, "1")).unwrap().unwrap().title,
        "Beta story"
    );
    assert_eq!(
        store.article(&scoped_key(&alpha, "1")).unwrap().unwrap().title,
        "Alpha story"
    );
}
