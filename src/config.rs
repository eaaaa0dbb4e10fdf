use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coverage::InsuranceProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub insurance: InsuranceConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSourceKind {
    #[default]
    Static,
    Http,
    Layered,
}

impl KnowledgeSourceKind {
    pub fn as_slug(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Http => "http",
            Self::Layered => "layered",
        }
    }
}

impl Display for KnowledgeSourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_slug())
    }
}

#[derive(Debug, Error)]
#[error("unknown knowledge source: {0} (expected static, http or layered)")]
pub struct KnowledgeSourceParseError(pub String);

impl FromStr for KnowledgeSourceKind {
    type Err = KnowledgeSourceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "static" | "builtin" => Ok(Self::Static),
            "http" | "remote" => Ok(Self::Http),
            "layered" => Ok(Self::Layered),
            _ => Err(KnowledgeSourceParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub source: KnowledgeSourceKind,
    /// JSON dataset replacing the built-in one; empty means built-in.
    #[serde(default)]
    pub dataset_path: String,
    #[serde(default)]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_true")]
    pub retry_on_timeout: bool,
    #[serde(default = "default_max_concurrent_lookups")]
    pub max_concurrent_lookups: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub policy_id: String,
    #[serde(default)]
    pub plan_name: String,
    #[serde(default)]
    pub connected: bool,
}

impl InsuranceConfig {
    pub fn profile(&self) -> InsuranceProfile {
        InsuranceProfile {
            provider: self.provider.clone(),
            policy_id: self.policy_id.clone(),
            plan_name: self.plan_name.clone(),
            is_connected: self.connected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source: Option<KnowledgeSourceKind>,
    pub base_url: Option<String>,
    pub dataset_path: Option<String>,
    pub provider: Option<String>,
    pub policy_id: Option<String>,
    pub plan_name: Option<String>,
}

impl Config {
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config/rx-advisor/config.toml")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(Self::default_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed reading config: {}", path.display()))?;
        let parsed: Self = toml::from_str(&data)
            .with_context(|| format!("failed parsing TOML config: {}", path.display()))?;
        Ok(parsed)
    }

    /// Naming any insurance field on the command line connects the profile.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(source) = overrides.source {
            self.knowledge.source = source;
        }
        if let Some(base_url) = overrides.base_url {
            self.knowledge.base_url = base_url;
        }
        if let Some(dataset_path) = overrides.dataset_path {
            self.knowledge.dataset_path = dataset_path;
        }
        let mut insurance_named = false;
        if let Some(provider) = overrides.provider {
            self.insurance.provider = provider;
            insurance_named = true;
        }
        if let Some(policy_id) = overrides.policy_id {
            self.insurance.policy_id = policy_id;
            insurance_named = true;
        }
        if let Some(plan_name) = overrides.plan_name {
            self.insurance.plan_name = plan_name;
            insurance_named = true;
        }
        if insurance_named {
            self.insurance.connected = true;
        }
    }

    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed creating config directory: {}", parent.display())
            })?;
        }
        fs::write(path, Self::default_template())
            .with_context(|| format!("failed writing config template: {}", path.display()))
    }

    pub fn resolved_dataset_path(&self) -> Option<PathBuf> {
        let raw = self.knowledge.dataset_path.trim();
        (!raw.is_empty()).then(|| expand_tilde(raw))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn default_template() -> String {
        let template = r#"[knowledge]
# static | http | layered
source = "static"
# dataset_path = "~/.local/share/rx-advisor/knowledge.json"
base_url = ""

[lookup]
timeout_ms = 2500
retry_on_timeout = true
max_concurrent_lookups = 8

[insurance]
provider = ""
policy_id = ""
plan_name = ""
connected = false

[server]
host = "127.0.0.1"
port = 3002
"#;
        template.to_string()
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_on_timeout: default_true(),
            max_concurrent_lookups: default_max_concurrent_lookups(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    2_500
}

fn default_max_concurrent_lookups() -> usize {
    8
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3002
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&Config::default_template()).unwrap();
        assert_eq!(parsed.knowledge.source, KnowledgeSourceKind::Static);
        assert_eq!(parsed.lookup.timeout_ms, 2_500);
        assert!(parsed.lookup.retry_on_timeout);
        assert_eq!(parsed.lookup.max_concurrent_lookups, 8);
        assert_eq!(parsed.bind_address(), "127.0.0.1:3002");
        assert!(!parsed.insurance.profile().is_connected);
        assert!(parsed.resolved_dataset_path().is_none());
    }

    #[test]
    fn partial_file_keeps_section_defaults() {
        let parsed: Config = toml::from_str(
            r#"
[knowledge]
source = "layered"
base_url = "http://kb.internal:8080"

[lookup]
timeout_ms = 900
"#,
        )
        .unwrap();
        assert_eq!(parsed.knowledge.source, KnowledgeSourceKind::Layered);
        assert_eq!(parsed.lookup.timeout_ms, 900);
        assert_eq!(parsed.lookup.max_concurrent_lookups, 8);
        assert_eq!(parsed.server.port, 3002);
    }

    #[test]
    fn insurance_override_connects_profile() {
        let mut config = Config::default();
        config.apply_overrides(ConfigOverrides {
            source: Some("remote".parse().unwrap()),
            provider: Some("Acme Health".to_string()),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.knowledge.source, KnowledgeSourceKind::Http);
        let profile = config.insurance.profile();
        assert!(profile.is_connected);
        assert_eq!(profile.provider, "Acme Health");
    }

    #[test]
    fn missing_file_means_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/rx-advisor.toml"))).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert!("sqlite".parse::<KnowledgeSourceKind>().is_err());
    }
}
