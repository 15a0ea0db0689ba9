use crate::common::{test_config, test_config_with_metrics, CollectingHandler, PSI_BODY};
use lead_probe::pipeline::{DomainRecord, ErrorKind, RecordHandler, Stage};
use lead_probe::{BatchOrchestrator, DomainState, Outcome, ProbeContext};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Batch key of a mock server, e.g. "127.0.0.1:41234"
fn domain_key(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).expect("Failed to parse server URI");
    format!(
        "{}:{}",
        url.host_str().expect("Server URI has a host"),
        url.port().expect("Server URI has a port")
    )
}

async fn mount_home(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html>home</html>")
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_metrics_failure_yields_partial_record() {
    let site = MockServer::start().await;
    let psi = MockServer::start().await;

    mount_home(&site, Duration::ZERO).await;

    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string("about us"))
        .mount(&site)
        .await;

    // /missing is not mounted and answers 404

    Mock::given(method("GET"))
        .and(path("/pagespeedonline/v5/runPagespeed"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&psi)
        .await;

    let mut config = test_config_with_metrics(&psi.uri());
    config.fetch.probe_paths = vec!["/about".to_string(), "/missing".to_string()];
    let ctx = Arc::new(ProbeContext::new(config).expect("Failed to build context"));

    let handler = Arc::new(CollectingHandler::default());
    let orchestrator = BatchOrchestrator::new(ctx).with_handler(handler.clone());

    let result = orchestrator
        .run(&[site.uri()], 4)
        .await
        .expect("Batch should run");

    let key = domain_key(&site);
    let task = result.get(&key).expect("Domain should be in the result");

    assert_eq!(task.state, DomainState::Done);
    assert_eq!(result.outcome(&key), Some(Outcome::Partial));
    assert_eq!(task.pages.len(), 2);
    assert!(task.metrics.is_none());

    let metrics_error = task
        .errors
        .iter()
        .find(|e| e.stage == Stage::Metrics)
        .expect("Metrics failure should be recorded");
    assert_eq!(metrics_error.kind, ErrorKind::Transient);

    assert!(task
        .errors
        .iter()
        .any(|e| e.stage == Stage::Fetch && e.target.ends_with("/missing")));

    // Partial records still reach the handler
    assert_eq!(handler.domains(), vec![key]);
}

#[tokio::test]
async fn test_successful_domain_gets_metrics() {
    let site = MockServer::start().await;
    let psi = MockServer::start().await;

    mount_home(&site, Duration::ZERO).await;

    Mock::given(method("GET"))
        .and(path("/pagespeedonline/v5/runPagespeed"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PSI_BODY))
        .expect(1)
        .mount(&psi)
        .await;

    let ctx = Arc::new(
        ProbeContext::new(test_config_with_metrics(&psi.uri())).expect("Failed to build context"),
    );
    let result = BatchOrchestrator::new(ctx)
        .run(&[site.uri()], 2)
        .await
        .expect("Batch should run");

    let key = domain_key(&site);
    assert_eq!(result.outcome(&key), Some(Outcome::Success));
    let metrics = result.get(&key).and_then(|t| t.metrics.clone());
    assert_eq!(metrics.and_then(|m| m.performance), Some(91));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_isolates_slow_domains() {
    let mut fast = Vec::new();
    for _ in 0..8 {
        let server = MockServer::start().await;
        mount_home(&server, Duration::from_millis(150)).await;
        fast.push(server);
    }

    let mut slow = Vec::new();
    for _ in 0..2 {
        let server = MockServer::start().await;
        mount_home(&server, Duration::from_secs(3)).await;
        slow.push(server);
    }

    let mut config = test_config();
    config.fetch.connect_timeout_ms = 100;
    config.fetch.read_timeout_ms = 200;
    config.fetch.retry.max_retries = 0;
    let ctx = Arc::new(ProbeContext::new(config).expect("Failed to build context"));

    let handler = Arc::new(CollectingHandler::default());
    let orchestrator = BatchOrchestrator::new(ctx).with_handler(handler.clone());

    let domains: Vec<String> = fast.iter().chain(slow.iter()).map(|s| s.uri()).collect();
    let result = orchestrator
        .run(&domains, 10)
        .await
        .expect("Batch should run");

    assert_eq!(result.len(), 10);
    assert_eq!(result.count_state(DomainState::Done), 8);
    assert_eq!(result.count_state(DomainState::Failed), 2);

    for server in &slow {
        let task = result.get(&domain_key(server)).expect("Slow domain is reported");
        assert_eq!(task.state, DomainState::Failed);
        assert!(task.errors.iter().all(|e| e.kind == ErrorKind::Transient));
    }

    // Run serially this batch takes 8 x 150ms plus 2 x 300ms
    assert!(
        result.elapsed < Duration::from_millis(1500),
        "batch took {:?}",
        result.elapsed
    );

    // Failed domains are not handed downstream
    assert_eq!(handler.domains().len(), 8);
}

#[tokio::test]
async fn test_batch_dedupes_and_reports_malformed_input() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("home"))
        .expect(1)
        .mount(&site)
        .await;

    let ctx = Arc::new(ProbeContext::new(test_config()).expect("Failed to build context"));
    let orchestrator = BatchOrchestrator::new(ctx);

    let inputs = vec![
        site.uri(),
        format!("{}/", site.uri()),
        "   ".to_string(),
        "ftp://files.example.com".to_string(),
    ];
    let result = orchestrator.run(&inputs, 3).await.expect("Batch should run");

    assert_eq!(result.len(), 2);
    assert_eq!(result.order[0], domain_key(&site));
    assert_eq!(result.outcome(&domain_key(&site)), Some(Outcome::Success));

    let malformed = result
        .get("ftp://files.example.com")
        .expect("Malformed input is still reported");
    assert_eq!(malformed.state, DomainState::Failed);
    assert_eq!(malformed.errors[0].kind, ErrorKind::Fatal);
}

#[tokio::test]
async fn test_zero_concurrency_rejected() {
    let ctx = Arc::new(ProbeContext::new(test_config()).expect("Failed to build context"));
    let orchestrator = BatchOrchestrator::new(ctx);

    assert!(orchestrator.run(&["example.com"], 0).await.is_err());
}

#[tokio::test]
async fn test_deadline_skips_unstarted_domains() {
    let site = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&site)
        .await;

    let mut config = test_config();
    config.batch.deadline_secs = Some(0);
    let ctx = Arc::new(ProbeContext::new(config).expect("Failed to build context"));

    let result = BatchOrchestrator::new(ctx)
        .run(&[site.uri()], 2)
        .await
        .expect("Batch should run");

    let task = result.get(&domain_key(&site)).expect("Domain is reported");
    assert_eq!(task.state, DomainState::Failed);
    assert_eq!(task.errors[0].stage, Stage::Schedule);
    assert_eq!(task.errors[0].kind, ErrorKind::Resource);
}

#[tokio::test]
async fn test_forced_sequential_processes_all() {
    let mut servers = Vec::new();
    for _ in 0..3 {
        let server = MockServer::start().await;
        mount_home(&server, Duration::ZERO).await;
        servers.push(server);
    }

    let mut config = test_config();
    config.batch.force_sequential = true;
    let ctx = Arc::new(ProbeContext::new(config).expect("Failed to build context"));

    let domains: Vec<String> = servers.iter().map(|s| s.uri()).collect();
    let result = BatchOrchestrator::new(ctx)
        .run(&domains, 3)
        .await
        .expect("Batch should run");

    assert_eq!(result.count(Outcome::Success), 3);
    let order: Vec<String> = servers.iter().map(domain_key).collect();
    assert_eq!(result.order, order);
}

/// Panics while handling one chosen domain
struct PanickingHandler {
    domain: String,
}

impl RecordHandler for PanickingHandler {
    fn handle(&self, record: &DomainRecord) {
        if record.domain == self.domain {
            panic!("handler failed for {}", record.domain);
        }
    }
}

#[tokio::test]
async fn test_panicking_domain_is_isolated_in_both_executors() {
    let broken = MockServer::start().await;
    let healthy = MockServer::start().await;
    mount_home(&broken, Duration::ZERO).await;
    mount_home(&healthy, Duration::ZERO).await;

    for force_sequential in [true, false] {
        let mut config = test_config();
        config.batch.force_sequential = force_sequential;
        let ctx = Arc::new(ProbeContext::new(config).expect("Failed to build context"));

        let handler = Arc::new(PanickingHandler {
            domain: domain_key(&broken),
        });
        let result = BatchOrchestrator::new(ctx)
            .with_handler(handler)
            .run(&[broken.uri(), healthy.uri()], 2)
            .await
            .expect("A panicking domain must not fail the batch");

        assert_eq!(result.len(), 2, "force_sequential = {}", force_sequential);

        let failed = result.get(&domain_key(&broken)).expect("Broken domain is reported");
        assert_eq!(failed.state, DomainState::Failed);
        assert_eq!(failed.errors.last().map(|e| e.stage), Some(Stage::Schedule));

        assert_eq!(result.outcome(&domain_key(&healthy)), Some(Outcome::Success));
    }
}
