//! robots.txt rule matching backed by the robotstxt crate

use robotstxt::DefaultMatcher;

/// The robots.txt rules of one origin
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw robots.txt body; `None` means everything is allowed
    body: Option<String>,
}

impl RobotsRules {
    /// Rules parsed from a robots.txt body
    pub fn from_body(body: impl Into<String>) -> Self {
        let body = body.into();
        if body.trim().is_empty() {
            return Self::allow_all();
        }
        Self { body: Some(body) }
    }

    /// Used when robots.txt is missing, unreachable or returned an error status
    pub fn allow_all() -> Self {
        Self { body: None }
    }

    pub fn is_allow_all(&self) -> bool {
        self.body.is_none()
    }

    /// Checks whether `agent` may fetch `url`
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL or path to check
    /// * `agent` - Product token matched against `User-agent` lines
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        match &self.body {
            None => true,
            Some(body) => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(body, agent, url)
            }
        }
    }
}
