use std::env;
use std::str::FromStr;

/// Persistence backend selected once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    File,
    Database,
}

impl FromStr for DataSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" | "yaml" => Ok(DataSource::File),
            "database" | "db" | "sqlite" => Ok(DataSource::Database),
            other => Err(anyhow::anyhow!("Unknown DATA_SOURCE: {}", other)),
        }
    }
}

/// Config holds all application configuration.
///
/// Built once at process start and handed to each component constructor;
/// nothing re-reads the environment afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_source: DataSource,
    pub data_dir: String,
    pub db_path: String,
    pub db_max_connections: u32,
    pub inventory_file: String,
    pub templates_dir: String,
    pub generated_dir: String,
    pub deployed_dir: String,
    pub audit_dir: String,
    pub error_dir: String,
    pub listen_addr: String,
    pub ssh_user: String,
    pub ssh_pass: String,
    pub ssh_port: u16,
    pub connect_timeout_secs: u64,
    pub command_delay_ms: u64,
    pub read_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            data_source: get_env("DATA_SOURCE", "file").parse()?,
            data_dir: get_env("DATA_DIR", "/data"),
            db_path: get_env("DB_PATH", "/data/provisioner.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5").parse().unwrap_or(5),
            inventory_file: get_env("INVENTORY_FILE", ""),
            templates_dir: get_env("TEMPLATES_DIR", "/templates"),
            generated_dir: get_env("GENERATED_DIR", "/data/generated_configs"),
            deployed_dir: get_env("DEPLOYED_DIR", "/data/deployed_configs"),
            audit_dir: get_env("AUDIT_DIR", "/data/audit_logs"),
            error_dir: get_env("ERROR_DIR", "/data/errors"),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            ssh_user: get_env("SSH_USER", ""),
            ssh_pass: get_env("SSH_PASS", ""),
            ssh_port: get_env("SSH_PORT", "22").parse().unwrap_or(22),
            connect_timeout_secs: get_env("CONNECT_TIMEOUT_SECS", "10").parse().unwrap_or(10),
            command_delay_ms: get_env("COMMAND_DELAY_MS", "500").parse().unwrap_or(500),
            read_timeout_secs: get_env("READ_TIMEOUT_SECS", "30").parse().unwrap_or(30),
        })
    }

    /// Configuration rooted at a scratch directory, used by tests
    #[cfg(test)]
    pub fn for_dir(root: &std::path::Path) -> Self {
        let sub = |name: &str| root.join(name).to_string_lossy().to_string();
        Self {
            data_source: DataSource::File,
            data_dir: root.to_string_lossy().to_string(),
            db_path: sub("provisioner.db"),
            db_max_connections: 1,
            inventory_file: String::new(),
            templates_dir: sub("templates"),
            generated_dir: sub("generated_configs"),
            deployed_dir: sub("deployed_configs"),
            audit_dir: sub("audit_logs"),
            error_dir: sub("errors"),
            listen_addr: "127.0.0.1:0".to_string(),
            ssh_user: "netops".to_string(),
            ssh_pass: "secret".to_string(),
            ssh_port: 22,
            connect_timeout_secs: 10,
            command_delay_ms: 0,
            read_timeout_secs: 5,
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
