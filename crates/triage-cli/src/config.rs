use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use triage_core::{MalformedVerdictPolicy, RouterConfig};

/// Built-in configuration, also written by `triage init`
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    pub provider: ProviderConfig,
    #[serde(default)]
    pub guardrail: GuardrailConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_provider_name() -> String {
    "gemini".to_string()
}

fn default_base_url() -> String {
    triage_core::providers::openai_compat::GEMINI_OPENAI_BASE_URL.to_string()
}

fn default_model() -> String {
    triage_core::providers::openai_compat::GEMINI_DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The API key from config, falling back to the `API_KEY_VARS` environment variables.
    ///
    /// A missing key is a startup error, never a per-turn one.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    fn resolve_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
        if !self.api_key.trim().is_empty() && !self.api_key.contains("${") {
            return Ok(self.api_key.trim().to_string());
        }

        API_KEY_VARS
            .iter()
            .filter_map(|var| lookup(*var))
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No API key configured for provider '{}'. Set one of {} or \
                     provider.api_key in the config file.",
                    self.name,
                    API_KEY_VARS.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailConfig {
    #[serde(default)]
    pub on_malformed: MalformedVerdictPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on a whole turn; 0 disables the bound
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_turn_timeout_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

impl SessionConfig {
    pub fn turn_timeout(&self) -> Option<Duration> {
        (self.turn_timeout_secs > 0).then(|| Duration::from_secs(self.turn_timeout_secs))
    }
}

/// Key variables, in fallback order when the config carries no key.
/// These are also the only key variables `${VAR}` expansion accepts.
const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GEMINI_API_KEYS", "OPENAI_API_KEY"];

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".triage")
}

impl TriageConfig {
    /// Load from `custom_path`, or `~/.triage/config.toml`.
    ///
    /// Without an explicit path and without a config file the built-in
    /// defaults are used, so credentials can come from the environment alone.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    debug!("No config at {}, using built-in defaults", path.display());
                    return Self::parse(DEFAULT_CONFIG, Path::new("<built-in>"));
                }
                path
            }
        };

        // Refuse group/other-readable config files, they may hold secrets
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    return Err(anyhow!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    ));
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `triage init` first.",
                path.display()
            )
        })?;

        Self::parse(&content, &path)
    }

    /// Copy with the API key masked, for display
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        cfg.provider.api_key = mask_secret(&cfg.provider.api_key);
        cfg
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok());

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if !config.provider.api_key.is_empty() && !content.contains("api_key = \"${") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{GEMINI_API_KEY}}\""
            );
        }

        Ok(config)
    }
}

/// Non-secret environment variables that may be expanded in config files.
const PLAIN_ENV_VARS: &[&str] = &["HOME", "USER"];

fn is_expandable(name: &str) -> bool {
    API_KEY_VARS.contains(&name) || PLAIN_ENV_VARS.contains(&name)
}

fn expand_env_vars(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !is_expandable(&var_name) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = lookup(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}
