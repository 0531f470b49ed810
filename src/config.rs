use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Browser-identity headers attached to every backend call.
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// Inbound model name -> backend `llmName`.
    #[serde(default)]
    pub models: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_create_conversation_url")]
    pub create_conversation_url: String,
    #[serde(default = "default_send_message_url")]
    pub send_message_url: String,
    #[serde(default = "default_deployment_id")]
    pub deployment_id: String,
    #[serde(default = "default_external_application_id")]
    pub external_application_id: String,
    #[serde(default = "default_conversation_name")]
    pub conversation_name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_is_desktop")]
    pub is_desktop: bool,
    /// Max seconds between two body reads from the backend. 0 disables.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            create_conversation_url: default_create_conversation_url(),
            send_message_url: default_send_message_url(),
            deployment_id: default_deployment_id(),
            external_application_id: default_external_application_id(),
            conversation_name: default_conversation_name(),
            timezone: default_timezone(),
            language: default_language(),
            is_desktop: default_is_desktop(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend: BackendConfig::default(),
            headers: default_headers(),
            models: HashMap::new(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_create_conversation_url() -> String {
    "https://pa002.abacus.ai/cluster-proxy/api/createDeploymentConversation".to_string()
}

fn default_send_message_url() -> String {
    "https://pa002.abacus.ai/api/_chatLLMSendMessageSSE".to_string()
}

fn default_deployment_id() -> String {
    "d892fb336".to_string()
}

fn default_external_application_id() -> String {
    "ca852b1e2".to_string()
}

fn default_conversation_name() -> String {
    "New Chat".to_string()
}

fn default_timezone() -> String {
    "Asia/Hong_Kong".to_string()
}

fn default_language() -> String {
    "zh-CN".to_string()
}

fn default_is_desktop() -> bool {
    true
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_headers() -> BTreeMap<String, String> {
    [
        ("sec-ch-ua-platform", "Windows"),
        (
            "sec-ch-ua",
            "\"Not(A:Brand\";v=\"99\", \"Microsoft Edge\";v=\"133\", \"Chromium\";v=\"133\"",
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("X-Abacus-Org-Host", "apps"),
        (
            "User-Agent",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
             Chrome/133.0.0.0 Safari/537.36 Edg/133.0.0.0",
        ),
        ("Sec-Fetch-Site", "same-site"),
        ("Sec-Fetch-Mode", "cors"),
        ("Sec-Fetch-Dest", "empty"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using built-in defaults");
        Ok(Self::default())
    }

    /// Backend `llmName` for the model the caller asked for.
    pub fn backend_model<'a>(&'a self, requested: &'a str) -> &'a str {
        self.models
            .get(requested)
            .map(String::as_str)
            .unwrap_or(requested)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("abacus-proxy.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("abacus-proxy").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("abacus-proxy").join("config.toml"));
        paths.push(home.join(".abacus-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[backend]
send_message_url = "http://127.0.0.1:9000/send"
idle_timeout_secs = 0

[headers]
User-Agent = "test-agent"

[models]
"gpt-4o" = "OPENAI_GPT4O"
"#
        )
        .unwrap();

        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.backend.send_message_url, "http://127.0.0.1:9000/send");
        assert_eq!(config.backend.deployment_id, "d892fb336");
        assert_eq!(config.backend.idle_timeout(), None);
        assert_eq!(config.headers.len(), 1);
        assert_eq!(config.backend_model("gpt-4o"), "OPENAI_GPT4O");
        assert_eq!(config.backend_model("claude"), "claude");
    }

    #[test]
    fn test_defaults_without_file_content() {
        let f = NamedTempFile::new().unwrap();
        let config = ProxyConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.backend.external_application_id, "ca852b1e2");
        assert_eq!(config.backend.idle_timeout(), Some(Duration::from_secs(120)));
        assert!(config.headers.contains_key("User-Agent"));
        assert!(config.headers.contains_key("sec-ch-ua"));
    }

    #[test]
    fn test_missing_explicit_path_is_error() {
        let err = ProxyConfig::find_and_load(Some(Path::new("/nonexistent/abacus.toml")));
        assert!(matches!(err, Err(ProxyError::Config { .. })));
    }
}
