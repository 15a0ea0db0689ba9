use crate::common::{test_config_with_metrics, PSI_BODY};
use lead_probe::credentials::CredentialId;
use lead_probe::metrics::MetricsError;
use lead_probe::ProbeContext;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PSI_PATH: &str = "/pagespeedonline/v5/runPagespeed";

const QUOTA_BODY: &str = r#"{
    "error": {
        "code": 429,
        "message": "Quota exceeded for quota metric 'Queries' and limit 'Queries per day'",
        "status": "RESOURCE_EXHAUSTED"
    }
}"#;

#[tokio::test]
async fn test_metrics_served_from_cache_on_repeat() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .and(query_param("url", "https://example.com/"))
        .and(query_param("strategy", "mobile"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PSI_BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config_with_metrics(&mock_server.uri()))
        .expect("Failed to build context");

    let first = ctx
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect("First call should reach PSI");
    let second = ctx
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect("Second call should hit the cache");

    assert_eq!(first.performance, Some(91));
    assert_eq!(first.lcp_ms, Some(1800));
    assert_eq!(first, second);
    assert_eq!(ctx.cache.len(), 1);
}

#[tokio::test]
async fn test_quota_refusal_rotates_credential() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .and(query_param("key", "key-one"))
        .respond_with(ResponseTemplate::new(429).set_body_string(QUOTA_BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .and(query_param("key", "key-two"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PSI_BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config_with_metrics(&mock_server.uri()))
        .expect("Failed to build context");

    let result = ctx
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect("Second credential should succeed");
    assert_eq!(result.performance, Some(91));

    let parked = ctx.credentials.state(CredentialId(0)).unwrap();
    assert!(parked.cooldown_until.is_some());
    assert_eq!(parked.quota_strikes, 1);

    let healthy = ctx.credentials.state(CredentialId(1)).unwrap();
    assert!(healthy.cooldown_until.is_none());
    assert_eq!(healthy.consecutive_failures, 0);
}

#[tokio::test]
async fn test_all_credentials_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string(QUOTA_BODY))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut config = test_config_with_metrics(&mock_server.uri());
    config.metrics.cooldown_ms = 60_000;
    config.metrics.max_cooldown_wait_ms = 50;
    let ctx = ProbeContext::new(config).expect("Failed to build context");

    let err = ctx
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect_err("Every key is over quota");

    assert!(matches!(err, MetricsError::Credentials(_)));
    assert!(err.is_quota());
    assert!(ctx.cache.is_empty());
}

#[tokio::test]
async fn test_bad_request_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("Invalid url"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ctx = ProbeContext::new(test_config_with_metrics(&mock_server.uri()))
        .expect("Failed to build context");

    let err = ctx
        .metrics
        .get_metrics("not-a-page")
        .await
        .expect_err("400 should fail at once");

    assert!(matches!(err, MetricsError::Status { status: 400, quota: false, .. }));
    assert!(!err.to_string().contains("key-one"));
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let mock_server = MockServer::start().await;
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let cache_path = temp_dir.path().join("psi-cache.db");

    Mock::given(method("GET"))
        .and(path(PSI_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(PSI_BODY))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = test_config_with_metrics(&mock_server.uri());
    config.cache.path = Some(cache_path.to_string_lossy().into_owned());

    let first_run = ProbeContext::new(config.clone()).expect("Failed to build context");
    first_run
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect("PSI call should succeed");
    assert_eq!(first_run.save_cache(), 1);

    let second_run = ProbeContext::new(config).expect("Failed to build context");
    assert_eq!(second_run.cache.len(), 1);
    let cached = second_run
        .metrics
        .get_metrics("https://example.com/")
        .await
        .expect("Restored entry should be served");
    assert_eq!(cached.performance, Some(91));
}
