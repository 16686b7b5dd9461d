use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Snapshots kept for back/forward restores and previews.
    pub cache_capacity: usize,
    /// Locations outside this path prefix are handed back as full page loads.
    pub root_path: String,
    /// Consecutive missing-frame results before a frame stops reloading.
    pub frame_missing_limit: u32,
    /// Maximum `recurse` pointers followed while resolving one frame.
    pub frame_recurse_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10,
            root_path: "/".to_string(),
            frame_missing_limit: 3,
            frame_recurse_limit: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_keep_defaults() {
        let cfg: SessionConfig = toml::from_str("cache_capacity = 2\nroot_path = \"/app/\"").unwrap();
        assert_eq!(cfg.cache_capacity, 2);
        assert_eq!(cfg.root_path, "/app/");
        assert_eq!(cfg.frame_missing_limit, 3);
        assert_eq!(cfg.frame_recurse_limit, 16);
    }
}
