use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DolexConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub mcp: MCPProtocolConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(with = "duration_string")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the source registry (`sources.json`) and any
    /// per-process scratch state.
    pub data_dir: String,
    /// Prefixes a source path must fall under; empty means unrestricted.
    pub sandbox_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MCPProtocolConfig {
    pub protocol_version: String,
    pub server_name: String,
    pub server_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
    pub result_cache_capacity: usize,
    pub spec_cache_capacity: usize,
    pub max_query_rows: usize,
    pub hard_row_cap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    pub enable_request_validation: bool,
}

impl Default for DolexConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig { host: "127.0.0.1".to_string(), port: 7420, request_timeout: Duration::from_secs(30) },
            storage: StorageConfig { data_dir: "./dolex-data".to_string(), sandbox_prefixes: vec![] },
            mcp: MCPProtocolConfig {
                protocol_version: "2024-11-05".to_string(),
                server_name: "dolex".to_string(),
                server_version: env!("CARGO_PKG_VERSION").to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: "text".to_string() },
            performance: PerformanceConfig { result_cache_capacity: 20, spec_cache_capacity: 20, max_query_rows: 1000, hard_row_cap: 10_000 },
            security: SecurityConfig { enable_request_validation: true },
        }
    }
}

impl DolexConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DolexConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Layer defaults, then an optional TOML file, then environment
    /// variables (spec §A.3: `DOLEX_DATA_DIR`, `DOLEX_SERVER_HOST`,
    /// `DOLEX_SERVER_PORT`).
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Ok(host) = std::env::var("DOLEX_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("DOLEX_SERVER_PORT") {
            config.server.port = port.parse()?;
        }
        if let Ok(data_dir) = std::env::var("DOLEX_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }

        Ok(config)
    }

    pub fn registry_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.storage.data_dir).join("sources.json")
    }
}

mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if let Some(stripped) = s.strip_suffix('s') {
            let secs: u64 = stripped.parse().map_err(serde::de::Error::custom)?;
            Ok(Duration::from_secs(secs))
        } else {
            Err(serde::de::Error::custom("expected duration string ending with 's'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DolexConfig::default();
        assert_eq!(config.performance.hard_row_cap, 10_000);
        assert_eq!(config.mcp.server_name, "dolex");
    }

    #[test]
    fn env_vars_override_defaults() {
        std::env::set_var("DOLEX_SERVER_PORT", "9999");
        let config = DolexConfig::load(None).unwrap();
        assert_eq!(config.server.port, 9999);
        std::env::remove_var("DOLEX_SERVER_PORT");
    }
}
