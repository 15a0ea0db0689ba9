use crate::common::test_config;
use lead_probe::fetcher::FetchError;
use lead_probe::ProbeContext;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_url(server: &MockServer, page: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page)).expect("Failed to build URL")
}

#[tokio::test]
async fn test_fetch_retries_transient_status() {
    let mock_server = MockServer::start().await;

    // First three attempts fail, the fourth succeeds
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>home</html>"))
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config()).expect("Failed to build context");
    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Fetch should succeed after retries");

    assert_eq!(page.status, 200);
    assert_eq!(page.text(), "<html>home</html>");
    assert!(!page.truncated);

    let home_requests = mock_server
        .received_requests()
        .await
        .expect("Request recording is enabled")
        .iter()
        .filter(|r| r.url.path() == "/")
        .count();
    assert_eq!(home_requests, 4);
}

#[tokio::test]
async fn test_fetch_gives_up_after_max_retries() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config()).expect("Failed to build context");
    let err = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect_err("Fetch should be exhausted");

    assert!(matches!(err, FetchError::Exhausted { attempts: 4, .. }));
}

#[tokio::test]
async fn test_fetch_does_not_retry_client_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config()).expect("Failed to build context");
    let err = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/missing"))
        .await
        .expect_err("404 should fail");

    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn test_robots_disallow_blocks_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("public"))
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config()).expect("Failed to build context");

    let err = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/private"))
        .await
        .expect_err("Disallowed path should not be fetched");
    assert!(matches!(err, FetchError::Disallowed { .. }));

    // robots.txt is cached for the origin
    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Root should be allowed");
    assert_eq!(page.text(), "public");
    assert_eq!(ctx.fetcher.robots_cached(), 1);
}

#[tokio::test]
async fn test_robots_transient_failure_is_retried() {
    let mock_server = MockServer::start().await;

    // robots.txt is briefly unavailable before serving its rules
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private"))
        .respond_with(ResponseTemplate::new(200).set_body_string("secret"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("public"))
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config()).expect("Failed to build context");

    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Root should be allowed");
    assert_eq!(page.text(), "public");

    let err = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/private"))
        .await
        .expect_err("Rules served after the 503 must still apply");
    assert!(matches!(err, FetchError::Disallowed { .. }));
}

#[tokio::test]
async fn test_robots_unreachable_allows_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.fetch.retry.max_retries = 1;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Unreachable robots.txt does not block the page");
    assert_eq!(page.text(), "ok");
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.fetch.respect_robots = false;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Fetch should ignore robots.txt");
    assert_eq!(page.text(), "ok");
}

#[tokio::test]
async fn test_body_truncated_at_byte_cap() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 10_000]))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.fetch.max_bytes = 1024;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let page = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect("Truncated page is still a page");

    assert!(page.truncated);
    assert_eq!(page.body.len(), 1024);
}

#[tokio::test]
async fn test_body_at_byte_cap_is_complete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/exact"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 1024]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/over"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'a'; 1025]))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.fetch.max_bytes = 1024;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let exact = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/exact"))
        .await
        .expect("Body at the cap is kept whole");
    assert!(!exact.truncated);
    assert_eq!(exact.body.len(), 1024);

    let over = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/over"))
        .await
        .expect("Body over the cap is still a page");
    assert!(over.truncated);
    assert_eq!(over.body.len(), 1024);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let mut config = test_config();
    config.fetch.connect_timeout_ms = 100;
    config.fetch.read_timeout_ms = 200;
    config.fetch.retry.max_retries = 0;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let started = std::time::Instant::now();
    let err = ctx
        .fetcher
        .fetch(&page_url(&mock_server, "/"))
        .await
        .expect_err("Slow response should time out");

    assert!(matches!(err, FetchError::Exhausted { attempts: 1, .. }));
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
}
