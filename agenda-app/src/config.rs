//! Agenda configuration loader.
//!
//! TOML file first, then environment overrides, then validation.

use crate::assistant::AgentSettings;
use agenda_llm::{LlmClientConfig, Provider};
use agenda_tools::{GoogleAuth, GoogleConfig};
use chrono::TimeDelta;
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgendaConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub keys: KeysConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub google: GoogleSection,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub model: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider default when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// IANA zone name for events created without an explicit offset.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Ask Ollama reasoning models to return their thinking separately.
    #[serde(default = "default_think")]
    pub think: bool,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_think() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeysConfig {
    pub openai_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "default_freshness_ttl_secs")]
    pub freshness_ttl_secs: u64,
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
}

fn default_max_iterations() -> usize {
    5
}

fn default_max_history_messages() -> usize {
    20
}

fn default_freshness_ttl_secs() -> u64 {
    120
}

fn default_llm_timeout_secs() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_history_messages: default_max_history_messages(),
            freshness_ttl_secs: default_freshness_ttl_secs(),
            llm_timeout_secs: default_llm_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    /// Override for the Bot API endpoint, e.g. a local bot API server.
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSection {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

impl Default for GoogleSection {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            refresh_token: String::new(),
            calendar_id: default_calendar_id(),
        }
    }
}

impl GoogleSection {
    pub fn is_configured(&self) -> bool {
        [&self.client_id, &self.client_secret, &self.refresh_token]
            .iter()
            .all(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Sender IDs allowed to talk to the assistant.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Respond to anyone. Off by default; the assistant can edit your calendar.
    #[serde(default)]
    pub allow_all_senders: bool,
}

impl AgendaConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = var("AGENDA_MODEL") {
            self.general.model = v;
        }
        if let Some(v) = var("AGENDA_LLM_PROVIDER") {
            self.general.provider = v;
        }
        if let Some(v) = var("AGENDA_LLM_BASE_URL") {
            self.general.base_url = Some(v);
        }
        if let Some(v) = var("AGENDA_TIMEZONE") {
            self.general.timezone = v;
        }
        if let Some(v) = var("OPENAI_API_KEY") {
            self.keys.openai_api_key = Some(v);
        }
        if let Some(v) = var("TELEGRAM_BOT_TOKEN") {
            self.channels.telegram.bot_token = v;
            self.channels.telegram.enabled = true;
        }
        if let Some(v) = var("GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = var("GOOGLE_CLIENT_SECRET") {
            self.google.client_secret = v;
        }
        if let Some(v) = var("GOOGLE_REFRESH_TOKEN") {
            self.google.refresh_token = v;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        self.provider()?;
        self.timezone()?;
        if self.agent.max_iterations == 0 {
            return Err(anyhow::anyhow!("agent.max_iterations must be > 0"));
        }
        if self.agent.max_history_messages == 0 {
            return Err(anyhow::anyhow!("agent.max_history_messages must be > 0"));
        }
        if self.agent.freshness_ttl_secs == 0 {
            return Err(anyhow::anyhow!("agent.freshness_ttl_secs must be > 0"));
        }
        if self.agent.llm_timeout_secs == 0 {
            return Err(anyhow::anyhow!("agent.llm_timeout_secs must be > 0"));
        }
        if self.channels.telegram.enabled && self.channels.telegram.bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "channels.telegram.bot_token is required when telegram is enabled"
            ));
        }
        Ok(())
    }

    pub fn provider(&self) -> anyhow::Result<Provider> {
        Ok(self.general.provider.parse::<Provider>()?)
    }

    pub fn llm_client_config(&self) -> anyhow::Result<LlmClientConfig> {
        Ok(LlmClientConfig {
            provider: self.provider()?,
            model: self.general.model.clone(),
            base_url: self.general.base_url.clone(),
            api_key: self.keys.openai_api_key.clone().filter(|k| !k.is_empty()),
            timeout: Duration::from_secs(self.agent.llm_timeout_secs),
            temperature: self.general.temperature,
            think: self.general.think,
        })
    }

    /// `general.timezone` as an IANA zone.
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        let name = self.general.timezone.trim();
        name.parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("general.timezone {name:?} is not an IANA zone: {e}"))
    }

    pub fn agent_settings(&self) -> anyhow::Result<AgentSettings> {
        Ok(AgentSettings {
            max_iterations: self.agent.max_iterations,
            llm_timeout: Duration::from_secs(self.agent.llm_timeout_secs),
            freshness_ttl: TimeDelta::seconds(
                i64::try_from(self.agent.freshness_ttl_secs).unwrap_or(i64::MAX / 1_000),
            ),
            timezone: self.timezone()?,
            system_prompt: self.general.system_prompt.clone(),
        })
    }

    /// `None` until all three OAuth values are present.
    pub fn google_config(&self) -> Option<GoogleConfig> {
        if !self.google.is_configured() {
            return None;
        }
        let auth = GoogleAuth::refresh_token(
            &self.google.client_id,
            &self.google.client_secret,
            &self.google.refresh_token,
        );
        let mut cfg = GoogleConfig::new(auth, &self.general.timezone);
        cfg.calendar_id = self.google.calendar_id.clone();
        Some(cfg)
    }

    pub fn is_sender_allowed(&self, sender_id: &str) -> bool {
        self.security.allow_all_senders
            || self
                .security
                .allowed_users
                .iter()
                .any(|allowed| allowed.trim() == sender_id)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; pass --config explicitly"))?;
    Ok(Path::new(&home).join(".agenda").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const MINIMAL: &str = r#"
[general]
model = "gpt-4o-mini"
"#;

    #[test]
    fn minimal_config_fills_defaults() {
        let cfg = AgendaConfig::parse(MINIMAL).expect("parses");
        cfg.validate().expect("valid");
        assert_eq!(cfg.general.provider, "openai");
        assert_eq!(cfg.general.timezone, "UTC");
        assert_eq!(cfg.agent.max_iterations, 5);
        assert_eq!(cfg.agent.max_history_messages, 20);
        assert_eq!(cfg.agent.freshness_ttl_secs, 120);
        assert_eq!(cfg.google.calendar_id, "primary");
        assert!(cfg.google_config().is_none());
        assert!(!cfg.is_sender_allowed("42"));
    }

    #[test]
    fn env_overrides_win_and_blank_values_are_ignored() {
        let mut cfg = AgendaConfig::parse(MINIMAL).expect("parses");
        let env: HashMap<&str, &str> = HashMap::from([
            ("AGENDA_MODEL", "qwen3:14b"),
            ("AGENDA_LLM_PROVIDER", "ollama"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("OPENAI_API_KEY", "  "),
            ("GOOGLE_CLIENT_ID", "cid"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REFRESH_TOKEN", "refresh"),
        ]);
        cfg.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));
        cfg.validate().expect("valid");
        assert_eq!(cfg.general.model, "qwen3:14b");
        assert_eq!(cfg.provider().expect("provider"), Provider::Ollama);
        assert!(cfg.channels.telegram.enabled);
        assert_eq!(cfg.keys.openai_api_key, None);
        let google = cfg.google_config().expect("google configured");
        assert_eq!(google.calendar_id, "primary");
    }

    #[test]
    fn unknown_provider_fails_validation() {
        let cfg = AgendaConfig::parse(
            r#"
[general]
model = "m"
provider = "carrier-pigeon"
"#,
        )
        .expect("parses");
        let err = cfg.validate().expect_err("bad provider");
        assert!(err.to_string().contains("unsupported llm provider"));
    }

    #[test]
    fn timezone_must_be_an_iana_zone() {
        let mut cfg = AgendaConfig::parse("[general]\nmodel = \"m\"\ntimezone = \"Mars/Olympus\"\n")
            .expect("parses");
        let err = cfg.validate().expect_err("unknown zone");
        assert!(err.to_string().contains("Mars/Olympus"), "{err}");
        cfg.general.timezone = "Europe/Berlin".to_string();
        cfg.validate().expect("valid zone");
        assert_eq!(cfg.timezone().expect("zone"), Tz::Europe__Berlin);
    }

    #[test]
    fn telegram_enabled_without_token_is_rejected() {
        let cfg = AgendaConfig::parse(
            r#"
[general]
model = "m"

[channels.telegram]
enabled = true
"#,
        )
        .expect("parses");
        cfg.validate().expect_err("missing token");
    }

    #[test]
    fn agent_settings_follow_config() {
        let cfg = AgendaConfig::parse(
            r#"
[general]
model = "m"
system_prompt = "Be brief. Now: {current_datetime}"

[agent]
max_iterations = 3
freshness_ttl_secs = 60
"#,
        )
        .expect("parses");
        let settings = cfg.agent_settings().expect("settings");
        assert_eq!(settings.max_iterations, 3);
        assert_eq!(settings.timezone, Tz::UTC);
        assert_eq!(settings.freshness_ttl, TimeDelta::seconds(60));
        assert_eq!(settings.llm_timeout, Duration::from_secs(120));
        assert!(settings.system_prompt.is_some());
    }

    #[test]
    fn allowlist_matches_exact_sender() {
        let cfg = AgendaConfig::parse(
            r#"
[general]
model = "m"

[security]
allowed_users = ["42"]
"#,
        )
        .expect("parses");
        assert!(cfg.is_sender_allowed("42"));
        assert!(!cfg.is_sender_allowed("420"));
    }

    #[tokio::test]
    async fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, MINIMAL).expect("write config");
        let cfg = AgendaConfig::load(Some(path)).await.expect("loads");
        assert!(!cfg.general.model.is_empty());
    }

    #[tokio::test]
    async fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AgendaConfig::load(Some(dir.path().join("nope.toml")))
            .await
            .expect_err("missing file");
        assert!(err.to_string().starts_with("read config"));
    }
}
