use browser::SessionConfig;
use net::TransportConfig;
use runtime_net::StreamConfig;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Contents of the TOML file passed with `--config`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub stream: StreamConfig,
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => write!(f, "cannot read {}: {source}", path.display()),
            ConfigError::Parse { path, source } => write!(f, "invalid config {}: {source}", path.display()),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_optional() {
        let cfg = Config::parse("[session]\ncache_capacity = 3\n\n[stream]\njitter_ratio = 0.5\n").unwrap();
        assert_eq!(cfg.session.cache_capacity, 3);
        assert_eq!(cfg.session.frame_missing_limit, 3);
        assert_eq!(cfg.transport, TransportConfig::default());
        assert_eq!(cfg.stream.jitter_ratio, 0.5);
    }

    #[test]
    fn unreadable_files_name_the_path() {
        let err = Config::load(Path::new("/nonexistent/turbine.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/turbine.toml"));
    }
}
