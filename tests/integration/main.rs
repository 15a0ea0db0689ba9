//! Integration tests for Lead-Probe
//!
//! These tests use wiremock to stand in for both the probed sites and the
//! PageSpeed Insights API, and drive the fetcher, metrics client and batch
//! orchestrator end-to-end.

mod batch_tests;
mod common;
mod fetch_tests;
mod metrics_tests;
