use crate::error::{Result, TaniclawError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Absolute ceilings. A configured limit above these is clamped.
pub const HARD_MAX_WATERING_ML: u32 = 2000;
pub const HARD_MAX_FERTILIZER_GRAMS: u32 = 20;

const ENV_PREFIX: &str = "TANICLAW_";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SchedulerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_plants: usize,
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            max_concurrent_plants: default_max_concurrent(),
        }
    }
}

// ---------------------------------------------------------------------------
// SecurityConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_daily_actions")]
    pub max_daily_actions: u32,
    #[serde(default = "default_max_watering_ml")]
    pub max_watering_amount_ml: u32,
    #[serde(default = "default_max_fertilizer_grams")]
    pub max_fertilizer_grams: u32,
}

fn default_max_daily_actions() -> u32 {
    50
}

fn default_max_watering_ml() -> u32 {
    500
}

fn default_max_fertilizer_grams() -> u32 {
    20
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_daily_actions: default_max_daily_actions(),
            max_watering_amount_ml: default_max_watering_ml(),
            max_fertilizer_grams: default_max_fertilizer_grams(),
        }
    }
}

impl SecurityConfig {
    pub fn watering_ceiling_ml(&self) -> u32 {
        self.max_watering_amount_ml.min(HARD_MAX_WATERING_ML)
    }

    pub fn fertilizer_ceiling_grams(&self) -> u32 {
        self.max_fertilizer_grams.min(HARD_MAX_FERTILIZER_GRAMS)
    }
}

// ---------------------------------------------------------------------------
// WeatherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weather_api")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_weather_api() -> String {
    "https://api.open-meteo.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: default_weather_api(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_llm_api")]
    pub api_base: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_fallback")]
    pub fallback_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_llm_api() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_llm_fallback() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_llm_api(),
            model: default_llm_model(),
            fallback_model: default_llm_fallback(),
            api_key: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Enabled and holding a non-empty key.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// NotificationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub telegram_api_base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp_api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_base: default_telegram_api(),
            whatsapp_api_url: None,
            whatsapp_api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl NotificationConfig {
    pub fn telegram(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.telegram_bot_token)?, non_empty(&self.telegram_chat_id)?))
    }

    pub fn whatsapp(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.whatsapp_api_url)?, non_empty(&self.whatsapp_api_key)?))
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Config {
    /// Read `.taniclaw/config.yaml` and apply `TANICLAW_*` overrides from the
    /// process environment.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(TaniclawError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let mut cfg: Config = serde_yaml::from_str(&data)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Apply overrides from `lookup`, which maps a full variable name
    /// (`TANICLAW_LLM_ENABLED`) to its value. Unparseable values are ignored
    /// with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let flag = |name: &str| -> Option<bool> {
            let raw = get(name)?;
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => {
                    tracing::warn!(var = %format!("{ENV_PREFIX}{name}"), value = %raw, "ignoring non-boolean override");
                    None
                }
            }
        };

        if let Some(v) = get("GROQ_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = flag("LLM_ENABLED") {
            self.llm.enabled = v;
        }
        if let Some(v) = flag("WEATHER_ENABLED") {
            self.weather.enabled = v;
        }
        if let Some(v) = flag("NOTIFICATION_ENABLED") {
            self.notification.enabled = v;
        }
        if let Some(v) = get("TELEGRAM_BOT_TOKEN") {
            self.notification.telegram_bot_token = Some(v);
        }
        if let Some(v) = get("TELEGRAM_CHAT_ID") {
            self.notification.telegram_chat_id = Some(v);
        }
        if let Some(v) = get("WHATSAPP_API_URL") {
            self.notification.whatsapp_api_url = Some(v);
        }
        if let Some(v) = get("WHATSAPP_API_KEY") {
            self.notification.whatsapp_api_key = Some(v);
        }
        if let Some(v) = get("MAX_DAILY_ACTIONS") {
            match v.trim().parse() {
                Ok(n) => self.security.max_daily_actions = n,
                Err(_) => {
                    tracing::warn!(value = %v, "ignoring non-numeric TANICLAW_MAX_DAILY_ACTIONS")
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        if self.security.max_watering_amount_ml > HARD_MAX_WATERING_ML {
            warn(
                WarnLevel::Warning,
                format!(
                    "security.max_watering_amount_ml={} exceeds the hard ceiling of {HARD_MAX_WATERING_ML} ml; \
                     the ceiling applies",
                    self.security.max_watering_amount_ml
                ),
            );
        }
        if self.security.max_fertilizer_grams > HARD_MAX_FERTILIZER_GRAMS {
            warn(
                WarnLevel::Warning,
                format!(
                    "security.max_fertilizer_grams={} exceeds the hard ceiling of {HARD_MAX_FERTILIZER_GRAMS} g; \
                     the ceiling applies",
                    self.security.max_fertilizer_grams
                ),
            );
        }
        if self.security.max_daily_actions == 0 {
            warn(
                WarnLevel::Error,
                "security.max_daily_actions is 0; every non-manual action will be rejected".to_string(),
            );
        }
        if self.scheduler.interval_minutes == 0 {
            warn(
                WarnLevel::Error,
                "scheduler.interval_minutes must be at least 1".to_string(),
            );
        }
        if self.scheduler.max_concurrent_plants == 0 {
            warn(
                WarnLevel::Warning,
                "scheduler.max_concurrent_plants is 0; plants will run one at a time".to_string(),
            );
        }
        if self.llm.enabled && !self.llm.is_usable() {
            warn(
                WarnLevel::Warning,
                "llm.enabled is true but no API key is set (TANICLAW_GROQ_API_KEY); advisory is off"
                    .to_string(),
            );
        }
        if self.notification.enabled
            && self.notification.telegram().is_none()
            && self.notification.whatsapp().is_none()
        {
            warn(
                WarnLevel::Warning,
                "notification.enabled is true but no Telegram or WhatsApp channel is configured"
                    .to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.scheduler.interval_minutes, 60);
        assert_eq!(cfg.security.max_daily_actions, 50);
        assert_eq!(cfg.security.max_watering_amount_ml, 500);
        assert!(cfg.weather.enabled);
        assert!(!cfg.llm.enabled);
        assert!(!cfg.notification.enabled);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn soft_limits_are_clamped_to_hard_ceilings() {
        let cfg: Config = serde_yaml::from_str(
            "security:\n  max_watering_amount_ml: 5000\n  max_fertilizer_grams: 50\n",
        )
        .unwrap();
        assert_eq!(cfg.security.watering_ceiling_ml(), 2000);
        assert_eq!(cfg.security.fertilizer_ceiling_grams(), 20);
        assert_eq!(cfg.validate().len(), 2);
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("TANICLAW_LLM_ENABLED", "true"),
            ("TANICLAW_GROQ_API_KEY", "gsk_test"),
            ("TANICLAW_WEATHER_ENABLED", "false"),
            ("TANICLAW_MAX_DAILY_ACTIONS", "7"),
            ("TANICLAW_TELEGRAM_BOT_TOKEN", "tok"),
        ]));
        assert!(cfg.llm.is_usable());
        assert!(!cfg.weather.enabled);
        assert_eq!(cfg.security.max_daily_actions, 7);
        assert_eq!(cfg.notification.telegram_bot_token.as_deref(), Some("tok"));
        assert!(cfg.notification.telegram().is_none());
    }

    #[test]
    fn bad_env_values_are_ignored() {
        let mut cfg = Config::default();
        cfg.apply_env(env(&[
            ("TANICLAW_LLM_ENABLED", "maybe"),
            ("TANICLAW_MAX_DAILY_ACTIONS", "lots"),
        ]));
        assert!(!cfg.llm.enabled);
        assert_eq!(cfg.security.max_daily_actions, 50);
    }

    #[test]
    fn validate_flags_misconfigured_optional_services() {
        let mut cfg = Config::default();
        cfg.llm.enabled = true;
        cfg.notification.enabled = true;
        cfg.scheduler.interval_minutes = 0;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn load_requires_init_and_roundtrips() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(TaniclawError::NotInitialized)
        ));

        let mut cfg = Config::default();
        cfg.scheduler.interval_minutes = 15;
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.scheduler.interval_minutes, 15);
    }
}
