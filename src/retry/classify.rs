//! HTTP error classification shared by the page fetcher and the metrics client

use super::Classification;
use reqwest::StatusCode;

/// Body fragments that mark an upstream quota or billing refusal
const QUOTA_MARKERS: &[&str] = &[
    "quota",
    "ratelimitexceeded",
    "dailylimitexceeded",
    "userratelimitexceeded",
    "resource_exhausted",
    "billing",
];

/// Whether a response body signals quota exhaustion
pub fn has_quota_marker(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    QUOTA_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Classifies an HTTP status, optionally inspecting the response body
///
/// | Response | Classification |
/// |----------|----------------|
/// | 4xx/5xx body with quota or billing marker | QuotaExceeded |
/// | 5xx, 429, 408, 413 | Retryable |
/// | other 4xx | Fatal |
///
/// Pass `None` for the body when the caller has no credential to rotate; the
/// result then depends on the status alone.
pub fn classify_status(status: StatusCode, body: Option<&str>) -> Classification {
    let is_error = status.is_client_error() || status.is_server_error();
    if is_error && body.map_or(false, has_quota_marker) {
        return Classification::QuotaExceeded;
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::PAYLOAD_TOO_LARGE
    {
        return Classification::Retryable;
    }

    Classification::Fatal
}

/// Classifies a transport-level failure
///
/// Timeouts, connection failures and errors while sending the request or
/// reading the body (resets, dropped connections) are transient. Builder,
/// redirect and decode errors will not improve on retry.
pub fn classify_transport(err: &reqwest::Error) -> Classification {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        Classification::Retryable
    } else {
        Classification::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        for code in [500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, None), Classification::Retryable);
        }
    }

    #[test]
    fn test_specific_client_errors_are_retryable() {
        for code in [408, 413, 429] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, None), Classification::Retryable);
        }
    }

    #[test]
    fn test_other_client_errors_are_fatal() {
        for code in [400, 401, 403, 404, 410] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(classify_status(status, None), Classification::Fatal);
        }
    }

    #[test]
    fn test_quota_marker_overrides_status() {
        let body = r#"{"error":{"code":429,"status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(body)),
            Classification::QuotaExceeded
        );

        let body = r#"{"error":{"errors":[{"reason":"dailyLimitExceeded"}]}}"#;
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, Some(body)),
            Classification::QuotaExceeded
        );
    }

    #[test]
    fn test_forbidden_without_marker_is_fatal() {
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, Some("access denied")),
            Classification::Fatal
        );
    }

    #[test]
    fn test_body_ignored_when_not_supplied() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None),
            Classification::Retryable
        );
    }

    #[test]
    fn test_success_body_never_quota() {
        assert_eq!(
            classify_status(StatusCode::OK, Some("quota usage page")),
            Classification::Fatal
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_retryable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap_err();
        assert_eq!(classify_transport(&err), Classification::Retryable);
    }

    #[tokio::test]
    async fn test_builder_error_is_fatal() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .unwrap_err();
        assert!(err.is_builder());
        assert_eq!(classify_transport(&err), Classification::Fatal);
    }
}
