use std::time::Duration;

pub const DEFAULT_CONNECT_API_URL: &str = "https://api.ledgerdeck.app";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach the Ledgerdeck service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONNECT_API_URL.to_string(),
            access_token: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ConnectConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url).unwrap_or_else(|| DEFAULT_CONNECT_API_URL.to_string()),
            ..Self::default()
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = Some(token).filter(|t| !t.trim().is_empty());
        self
    }

    /// Reads `LD_CONNECT_API_URL` and `LD_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base_url = lookup("LD_CONNECT_API_URL")
            .and_then(|v| normalize_base_url(&v))
            .unwrap_or_else(|| DEFAULT_CONNECT_API_URL.to_string());
        let access_token = lookup("LD_ACCESS_TOKEN")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Self {
            base_url,
            access_token,
            ..Self::default()
        }
    }
}

fn normalize_base_url(value: &str) -> Option<String> {
    Some(value.trim().trim_end_matches('/').to_string()).filter(|v| !v.is_empty())
}
