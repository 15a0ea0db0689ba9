use lead_probe::config::{parse_config, Config};
use lead_probe::pipeline::{DomainRecord, RecordHandler};
use std::sync::Mutex;

/// Fast limits, short timeouts and near-instant retries
const TEST_CONFIG: &str = r#"
[fetch]
connect-timeout-ms = 500
read-timeout-ms = 1000
per-host-rps = 1000.0
global-rps = 1000.0
max-concurrent-requests = 32
probe-paths = []

[fetch.retry]
max-retries = 3
base-delay-ms = 10
max-delay-ms = 50
jitter-ms = 0

[metrics]
enabled = false
endpoint = "http://127.0.0.1:9/pagespeedonline/v5/runPagespeed"
request-timeout-ms = 2000

[metrics.retry]
max-retries = 1
base-delay-ms = 10
max-delay-ms = 50
jitter-ms = 0

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[[credential]]
name = "primary"
key = "key-one"

[[credential]]
name = "secondary"
key = "key-two"
"#;

/// Creates a test configuration with metrics disabled
pub fn test_config() -> Config {
    parse_config(TEST_CONFIG).expect("test config should parse")
}

/// Creates a test configuration with metrics served by `server_uri`
pub fn test_config_with_metrics(server_uri: &str) -> Config {
    let mut config = test_config();
    config.metrics.enabled = true;
    config.metrics.endpoint = format!("{}/pagespeedonline/v5/runPagespeed", server_uri);
    config
}

/// Minimal PSI response with a performance score of 0.91
pub const PSI_BODY: &str = r#"{
    "lighthouseResult": {
        "categories": {"performance": {"score": 0.91}, "seo": {"score": 0.8}},
        "audits": {"largest-contentful-paint": {"numericValue": 1800.4}}
    }
}"#;

/// Keeps every record handed to it
#[derive(Default)]
pub struct CollectingHandler {
    pub records: Mutex<Vec<DomainRecord>>,
}

impl CollectingHandler {
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.domain.clone())
            .collect();
        domains.sort();
        domains
    }
}

impl RecordHandler for CollectingHandler {
    fn handle(&self, record: &DomainRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
