//! PageSpeed Insights response decoding

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lab and field metrics extracted from one PSI run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResult {
    /// Category scores, 0-100
    pub performance: Option<u8>,
    pub seo: Option<u8>,
    pub accessibility: Option<u8>,
    pub best_practices: Option<u8>,

    /// Largest Contentful Paint
    pub lcp_ms: Option<u64>,

    /// Cumulative Layout Shift
    pub cls: Option<f64>,

    /// First Contentful Paint
    pub fcp_ms: Option<u64>,

    pub max_potential_fid_ms: Option<u64>,
    pub speed_index_ms: Option<u64>,

    /// Field-data time to first byte (75th percentile)
    pub ttfb_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PsiResponse {
    #[serde(rename = "lighthouseResult")]
    lighthouse_result: Option<LighthouseResult>,

    #[serde(rename = "loadingExperience")]
    loading_experience: Option<LoadingExperience>,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    categories: HashMap<String, CategoryResult>,

    #[serde(default)]
    audits: HashMap<String, AuditResult>,
}

#[derive(Debug, Deserialize)]
struct CategoryResult {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AuditResult {
    #[serde(rename = "numericValue")]
    numeric_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LoadingExperience {
    #[serde(default)]
    metrics: HashMap<String, FieldMetric>,
}

#[derive(Debug, Deserialize)]
struct FieldMetric {
    percentile: Option<f64>,
}

/// Field metric carrying the TTFB percentile
const TTFB_FIELD_METRIC: &str = "EXPERIMENTAL_TIME_TO_FIRST_BYTE";

/// Decodes a PSI `runPagespeed` response body
///
/// # Returns
///
/// * `Ok(MetricsResult)` - Every metric present in the response; absent ones are `None`
/// * `Err(String)` - The body is not JSON or has no `lighthouseResult`
pub fn decode(body: &str) -> Result<MetricsResult, String> {
    let response: PsiResponse = serde_json::from_str(body).map_err(|e| e.to_string())?;
    let lighthouse = response
        .lighthouse_result
        .ok_or_else(|| "response has no lighthouseResult".to_string())?;

    let score = |name: &str| {
        lighthouse
            .categories
            .get(name)
            .and_then(|c| c.score)
            .map(|s| (s * 100.0).round().clamp(0.0, 100.0) as u8)
    };
    let audit = |name: &str| lighthouse.audits.get(name).and_then(|a| a.numeric_value);
    let audit_ms = |name: &str| audit(name).map(|v| v.max(0.0).round() as u64);

    let ttfb_ms = response
        .loading_experience
        .as_ref()
        .and_then(|le| le.metrics.get(TTFB_FIELD_METRIC))
        .and_then(|m| m.percentile)
        .map(|p| p.max(0.0).round() as u64);

    Ok(MetricsResult {
        performance: score("performance"),
        seo: score("seo"),
        accessibility: score("accessibility"),
        best_practices: score("best-practices"),
        lcp_ms: audit_ms("largest-contentful-paint"),
        cls: audit("cumulative-layout-shift"),
        fcp_ms: audit_ms("first-contentful-paint"),
        max_potential_fid_ms: audit_ms("max-potential-fid"),
        speed_index_ms: audit_ms("speed-index"),
        ttfb_ms,
    })
}
