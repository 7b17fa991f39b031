//! Proxy configuration: the YAML file listing backends and server-level
//! settings (spec.md SPEC_FULL §3), loaded once at startup the way the
//! teacher loads `arch_config.yaml`.

use bridge_core::Capabilities;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Speaks OpenAI Chat Completions; requests/responses are translated.
    OpenAiCompatible,
    /// Already speaks the Anthropic Messages API; forwarded verbatim.
    AnthropicCompatible,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendAuth {
    /// Name of the environment variable holding the bearer token, e.g.
    /// `OPENAI_API_KEY`. Resolved at request time, never logged.
    pub token_env: Option<String>,
    /// Header name to send the token under; defaults to `Authorization`.
    pub header_name: Option<String>,
}

impl BackendAuth {
    pub fn header_name(&self) -> &str {
        self.header_name.as_deref().unwrap_or("Authorization")
    }

    pub fn resolve_token(&self) -> Option<String> {
        let var = self.token_env.as_ref()?;
        std::env::var(var).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub auth: BackendAuth,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::OpenAiCompatible
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub sink: TraceSinkKind,
    pub file_path: Option<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            sink: TraceSinkKind::Null,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraceSinkKind {
    #[default]
    Null,
    Stderr,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_cache_soft_cap")]
    pub soft_cap: usize,
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}

fn default_cache_soft_cap() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_cache_ttl_ms(),
            soft_cap: default_cache_soft_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub bind_address: Option<String>,
    pub backends: Vec<Backend>,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl ProxyConfig {
    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// The backend requests are routed to. Selecting among multiple
    /// configured backends (model-based routing, failover) is out of
    /// scope; the first configured backend is the default.
    pub fn default_backend(&self) -> Option<&Backend> {
        self.backends.first()
    }

    pub fn find_backend(&self, id: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_minimal_backend_with_defaulted_capabilities() {
        let yaml = r#"
bind_address: "0.0.0.0:8089"
backends:
  - id: local
    base_url: "http://localhost:11434/v1"
"#;
        let config = ProxyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.backends.len(), 1);
        let backend = &config.backends[0];
        assert_eq!(backend.kind, BackendKind::OpenAiCompatible);
        assert_eq!(backend.capabilities.inactivity_timeout_ms, 30_000);
    }

    #[test]
    fn parses_capability_overrides() {
        let yaml = r#"
backends:
  - id: local
    base_url: "http://localhost:11434/v1"
    kind: anthropic_compatible
    capabilities:
      strict_additional_properties: true
      keepalive_interval_ms: 5000
"#;
        let config = ProxyConfig::from_yaml_str(yaml).unwrap();
        let backend = &config.backends[0];
        assert_eq!(backend.kind, BackendKind::AnthropicCompatible);
        assert!(backend.capabilities.strict_additional_properties);
        assert_eq!(backend.capabilities.keepalive_interval_ms, 5000);
    }

    #[test]
    #[serial_test::serial]
    fn auth_token_env_resolves_from_process_environment() {
        std::env::set_var("TEST_BACKEND_TOKEN", "secret-value");
        let auth = BackendAuth {
            token_env: Some("TEST_BACKEND_TOKEN".to_string()),
            header_name: None,
        };
        assert_eq!(auth.resolve_token().as_deref(), Some("secret-value"));
        assert_eq!(auth.header_name(), "Authorization");
        std::env::remove_var("TEST_BACKEND_TOKEN");
    }
}
