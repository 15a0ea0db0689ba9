use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Parameter names never folded into a fingerprint
const SECRET_PARAMS: &[&str] = &["key", "api_key", "apikey", "token"];

/// Stable identity of a logical upstream request
///
/// Hex SHA-256 over the endpoint and the sorted, key-lowercased parameter list.
/// Credentials are excluded so the same request made with different API keys
/// shares one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a request
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL of the upstream API
    /// * `params` - Query parameters in any order; repeated names are allowed
    pub fn of(endpoint: &str, params: &[(&str, &str)]) -> Self {
        let mut normalized: Vec<(String, &str)> = params
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
            .filter(|(k, _)| !SECRET_PARAMS.contains(&k.as_str()))
            .collect();
        normalized.sort();

        let mut hasher = Sha256::new();
        hasher.update(endpoint.trim_end_matches('/').as_bytes());
        for (key, value) in &normalized {
            hasher.update(b"\n");
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps a previously computed hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
