use crate::{UrlError, UrlResult};
use url::Url;

/// A domain to probe, resolved from user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Stable key identifying the domain in a batch
    pub key: String,

    /// URL of the primary page
    pub root: Url,
}

/// Resolves a raw batch entry into a probe target
///
/// Bare domains become `https://<domain>/`. Entries carrying an explicit
/// `http` or `https` scheme keep it, along with their path. Query strings and
/// fragments are dropped.
///
/// The key is the lowercase host with any `www.` prefix removed, followed by a
/// non-default port and a non-root path, so `WWW.Example.com` and
/// `https://example.com/` resolve to the same key.
///
/// # Examples
///
/// ```
/// use lead_probe::url::parse_target;
///
/// let target = parse_target("WWW.Example.com").unwrap();
/// assert_eq!(target.key, "example.com");
/// assert_eq!(target.root.as_str(), "https://www.example.com/");
/// ```
pub fn parse_target(input: &str) -> UrlResult<Target> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let mut root = Url::parse(&candidate).map_err(|e| UrlError::Parse(e.to_string()))?;

    if root.scheme() != "http" && root.scheme() != "https" {
        return Err(UrlError::InvalidScheme(root.scheme().to_string()));
    }

    root.set_fragment(None);
    root.set_query(None);

    let host = host_key(&root).ok_or(UrlError::MissingDomain)?;
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let mut key = host;
    if let Some(port) = root.port() {
        key.push_str(&format!(":{}", port));
    }
    let path = root.path().trim_end_matches('/');
    if !path.is_empty() {
        key.push_str(path);
    }

    Ok(Target { key, root })
}

/// Returns the lowercase host of a URL, used as the per-host rate limit scope
pub fn host_key(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

/// Resolves a probe path against a target's primary page
pub fn join_probe_path(root: &Url, path: &str) -> UrlResult<Url> {
    root.join(path).map_err(|e| UrlError::Parse(e.to_string()))
}
