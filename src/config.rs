use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when RELMAP_CONFIG is unset
const DEFAULT_CONFIG_FILE: &str = "relmap.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Graph store connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `host`, `host:port`, `http(s)://...`, `sqlite:<path>` or `memory:`
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Server side evaluation timeout for a single query
    #[serde(default = "default_query_timeout_minutes")]
    pub query_timeout_minutes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            query_timeout_minutes: default_query_timeout_minutes(),
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_drain_timeout_minutes")]
    pub drain_timeout_minutes: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            drain_timeout_minutes: default_drain_timeout_minutes(),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_query_timeout_minutes() -> u64 {
    10
}

fn default_pool_size() -> usize {
    4
}

fn default_drain_timeout_minutes() -> u64 {
    30
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Config {
    /// Load configuration
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for a config file in this order:
    /// 1. Path specified in RELMAP_CONFIG environment variable (must exist)
    /// 2. ./relmap.toml in current directory (optional)
    ///
    /// Without a file every setting takes its default.
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        match std::env::var("RELMAP_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.store.endpoint.as_deref() {
            Some(endpoint) if !endpoint.trim().is_empty() => {}
            _ => anyhow::bail!("store.endpoint must be set (argument or config file)"),
        }

        if self.store.query_timeout_minutes == 0 {
            anyhow::bail!("store.query_timeout_minutes must be greater than 0");
        }

        if self.dispatch.pool_size == 0 {
            anyhow::bail!("dispatch.pool_size must be greater than 0");
        }

        if self.dispatch.drain_timeout_minutes == 0 {
            anyhow::bail!("dispatch.drain_timeout_minutes must be greater than 0");
        }

        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.store.query_timeout_minutes * 60)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.drain_timeout_minutes * 60)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    fn with_config_env(config_path: Option<&Path>, f: impl FnOnce()) {
        let original = std::env::var("RELMAP_CONFIG").ok();
        match config_path {
            Some(p) => std::env::set_var("RELMAP_CONFIG", p),
            None => std::env::remove_var("RELMAP_CONFIG"),
        }
        f();
        std::env::remove_var("RELMAP_CONFIG");
        if let Some(val) = original {
            std::env::set_var("RELMAP_CONFIG", val);
        }
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("relmap.toml");
        fs::write(
            &config_path,
            r#"
[store]
endpoint = "reader.example.com"
query_timeout_minutes = 5

[dispatch]
pool_size = 16

[output]
dir = "/tmp/relations"
"#,
        )
        .unwrap();

        with_config_env(Some(&config_path), || {
            let config = Config::load().unwrap();
            assert_eq!(config.store.endpoint.as_deref(), Some("reader.example.com"));
            assert_eq!(config.query_timeout(), Duration::from_secs(300));
            assert_eq!(config.dispatch.pool_size, 16);
            assert_eq!(config.dispatch.drain_timeout_minutes, 30);
            assert_eq!(config.output_dir(), Path::new("/tmp/relations"));
            assert!(config.validate().is_ok());
        });
    }

    #[test]
    fn test_config_missing_env_path_fails() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nonexistent.toml");
        with_config_env(Some(&missing), || {
            let err = Config::load().unwrap_err();
            assert!(err.to_string().contains("Failed to read config file"));
        });
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.dispatch.drain_timeout_minutes, 30);
        assert_eq!(config.drain_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.output_dir(), Path::new("out"));
        // No endpoint configured yet
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_zero_values() {
        let mut config = Config::default();
        config.store.endpoint = Some("memory:".to_string());
        assert!(config.validate().is_ok());

        config.dispatch.pool_size = 0;
        assert!(config.validate().unwrap_err().to_string().contains("pool_size"));

        config.dispatch.pool_size = 1;
        config.store.query_timeout_minutes = 0;
        assert!(config.validate().unwrap_err().to_string().contains("query_timeout"));
    }

    #[test]
    fn test_config_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[dispatch]\npool_size = \"many\"\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }
}
