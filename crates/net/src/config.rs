use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    pub max_redirects: u32,
    /// Responses larger than this are truncated.
    pub max_body_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: concat!("turbine/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 5,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}
