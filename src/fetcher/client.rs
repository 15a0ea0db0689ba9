use crate::config::{FetchConfig, UserAgentConfig};
use reqwest::{redirect::Policy, Client};

/// Maximum redirect hops followed for a single request
pub const MAX_REDIRECTS: usize = 10;

/// Builds the shared HTTP client
///
/// # Arguments
///
/// * `user_agent` - Identification sent with every request
/// * `fetch` - Supplies the connect timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. TLS backend init)
///
/// # Example
///
/// ```no_run
/// use lead_probe::config::{FetchConfig, UserAgentConfig};
/// use lead_probe::fetcher::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "LeadProbe".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&user_agent, &FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetch: &FetchConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(fetch.connect_timeout())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}
