use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Outer per-request budget must stay under the most constrained platform
/// webhook deadline (Telegram: 30 s).
pub const WEBHOOK_BUDGET_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Top-level config (meridian.yaml + MERIDIAN_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeridianConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub time_parsing: TimeParsingConfig,
    #[serde(default)]
    pub dedupe: DedupeConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MeridianConfig {
    /// Load config from a YAML file with MERIDIAN_* env var overrides.
    ///
    /// A missing file is not an error — serde defaults apply, and env vars
    /// can still override individual fields.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("meridian.yaml");

        let config: MeridianConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("MERIDIAN_").split("_"))
            .extract()
            .map_err(|e| crate::error::MeridianError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_bind")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL for verification links (e.g. behind a proxy).
    #[serde(default)]
    pub base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            host: default_bind(),
            port: default_port(),
            base_url: String::new(),
        }
    }
}

impl AppConfig {
    /// Effective base URL for links: configured value or host:port fallback.
    pub fn effective_base_url(&self) -> String {
        if self.base_url.is_empty() {
            format!("http://localhost:{}", self.port)
        } else {
            self.base_url.trim_end_matches('/').to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// A named city offered in verification prompts and the agent tool chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    pub tz: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneConfig {
    #[serde(default = "default_tz")]
    pub default: String,
    /// Team timezones always included as conversion targets, config-first.
    #[serde(default)]
    pub team_timezones: Vec<String>,
    /// Cities offered in prompts and checked first by the session tool chain.
    #[serde(default)]
    pub team_cities: Vec<CityConfig>,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            default: default_tz(),
            team_timezones: Vec::new(),
            team_cities: Vec::new(),
        }
    }
}

/// Source → confidence table plus decay and the verification threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Below this effective confidence we prompt for re-verification.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_one")]
    pub verified: f64,
    #[serde(default = "default_one")]
    pub city_pick: f64,
    #[serde(default = "default_one")]
    pub relocation_confirmed: f64,
    #[serde(default = "default_message_explicit")]
    pub message_explicit: f64,
    #[serde(default = "default_inferred")]
    pub inferred: f64,
    #[serde(default = "default_chat_default")]
    pub chat_default: f64,
    /// Confidence lost per day since `updated_at`.
    #[serde(default = "default_decay")]
    pub decay_per_day: f64,
    /// Confidence written when a relocation is detected.
    #[serde(default)]
    pub relocation_reset: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            verified: 1.0,
            city_pick: 1.0,
            relocation_confirmed: 1.0,
            message_explicit: default_message_explicit(),
            inferred: default_inferred(),
            chat_default: default_chat_default(),
            decay_per_day: default_decay(),
            relocation_reset: 0.0,
        }
    }
}

/// Confidence values for each regex pattern tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeParsingConfidenceConfig {
    #[serde(default = "default_conf_hhmm")]
    pub hhmm_ampm: f64,
    #[serde(default = "default_conf_090")]
    pub european_hhmm: f64,
    #[serde(default = "default_conf_090")]
    pub military: f64,
    #[serde(default = "default_conf_hhmm")]
    pub plain_hhmm: f64,
    #[serde(default = "default_conf_090")]
    pub h_ampm: f64,
    #[serde(default = "default_conf_range")]
    pub range: f64,
    #[serde(default = "default_conf_at_h")]
    pub at_h: f64,
}

impl Default for TimeParsingConfidenceConfig {
    fn default() -> Self {
        Self {
            hhmm_ampm: 0.95,
            european_hhmm: 0.9,
            military: 0.9,
            plain_hhmm: 0.95,
            h_ampm: 0.9,
            range: 0.85,
            at_h: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeParsingConfig {
    #[serde(default)]
    pub confidence: TimeParsingConfidenceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Dedup record retention (default 7 days).
    #[serde(default = "default_dedupe_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_throttle_seconds")]
    pub throttle_seconds: u64,
    /// Throttle entries older than throttle_seconds × multiplier are swept.
    #[serde(default = "default_cleanup_multiplier")]
    pub cache_cleanup_multiplier: u64,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_dedupe_ttl(),
            throttle_seconds: default_throttle_seconds(),
            cache_cleanup_multiplier: default_cleanup_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rl_requests")]
    pub requests: usize,
    #[serde(default = "default_rl_window")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rl_requests(),
            window_seconds: default_rl_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub per_user: RateLimitConfig,
    #[serde(default)]
    pub per_chat: RateLimitConfig,
    /// Notify a user about rate limiting at most this many times, ever.
    #[serde(default = "default_max_notifications")]
    pub max_notifications: u32,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_user: RateLimitConfig::default(),
            per_chat: RateLimitConfig::default(),
            max_notifications: default_max_notifications(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Below low → negative, above high → positive, between → binary head.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f64,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,
    /// Texts longer than this are scored window-by-window.
    #[serde(default = "default_long_text_threshold")]
    pub long_text_threshold: usize,
    /// Tokens kept on each side of a trigger token.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Optional model artifact directory; embedded seed models otherwise.
    #[serde(default)]
    pub model_dir: Option<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            long_text_threshold: default_long_text_threshold(),
            window_size: default_window_size(),
            model_dir: None,
        }
    }
}

/// Per-operation LLM bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmOperationConfig {
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: f64,
}

impl Default for LlmOperationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_seconds: default_llm_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmExtractionConfig {
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,
    #[serde(default = "default_extraction_timeout")]
    pub timeout_seconds: f64,
    /// Confidence assigned to LLM-extracted times.
    #[serde(default = "default_extraction_confidence")]
    pub default_confidence: f64,
}

impl Default for LlmExtractionConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_extraction_max_tokens(),
            temperature: default_llm_temperature(),
            timeout_seconds: default_extraction_timeout(),
            default_confidence: default_extraction_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Open after this many consecutive failures.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Fail fast for this long before allowing a single probe call.
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_seconds: f64,
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_seconds: default_reset_timeout(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Only ever called as a fallback, never on the happy path.
    #[serde(default = "bool_true")]
    pub fallback_only: bool,
    #[serde(default)]
    pub intent: LlmOperationConfig,
    #[serde(default)]
    pub normalization: LlmOperationConfig,
    #[serde(default)]
    pub extraction: LlmExtractionConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            fallback_only: true,
            intent: LlmOperationConfig::default(),
            normalization: LlmOperationConfig::default(),
            extraction: LlmExtractionConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTimeoutsConfig {
    #[serde(default = "default_api_timeout")]
    pub telegram_api: f64,
    #[serde(default = "default_api_timeout")]
    pub slack_api: f64,
    #[serde(default = "default_api_timeout")]
    pub whatsapp_api: f64,
}

impl Default for HttpTimeoutsConfig {
    fn default() -> Self {
        Self {
            telegram_api: default_api_timeout(),
            slack_api: default_api_timeout(),
            whatsapp_api: default_api_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub timeouts: HttpTimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "default_max_cities")]
    pub max_cities_shown: usize,
    #[serde(default = "default_token_hours")]
    pub verification_token_hours: i64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            max_cities_shown: default_max_cities(),
            verification_token_hours: default_token_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggersConfig {
    #[serde(default = "default_relocation_confidence")]
    pub relocation_confidence: f64,
    #[serde(default = "default_city_detection_confidence")]
    pub city_detection_confidence: f64,
    /// Consult the LLM for ambiguous city mentions with no matching pattern.
    #[serde(default)]
    pub geo_intent_enabled: bool,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            relocation_confidence: default_relocation_confidence(),
            city_detection_confidence: default_city_detection_confidence(),
            geo_intent_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Process secrets read from plain environment variables at startup.
///
/// Empty strings mean "not configured": webhook signature checks treat an
/// empty secret as verification disabled (bootstrap compatibility).
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub telegram_bot_token: String,
    pub telegram_webhook_secret: String,
    pub slack_bot_token: String,
    pub slack_signing_secret: String,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_verify_token: String,
    pub whatsapp_app_secret: String,
    pub llm_api_key: String,
    pub app_secret_key: String,
    pub verify_token_secret: String,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            telegram_bot_token: var("TELEGRAM_BOT_TOKEN"),
            telegram_webhook_secret: var("TELEGRAM_WEBHOOK_SECRET"),
            slack_bot_token: var("SLACK_BOT_TOKEN"),
            slack_signing_secret: var("SLACK_SIGNING_SECRET"),
            whatsapp_access_token: var("WHATSAPP_ACCESS_TOKEN"),
            whatsapp_phone_number_id: var("WHATSAPP_PHONE_NUMBER_ID"),
            whatsapp_verify_token: var("WHATSAPP_VERIFY_TOKEN"),
            whatsapp_app_secret: var("WHATSAPP_APP_SECRET"),
            llm_api_key: var("LLM_API_KEY"),
            app_secret_key: std::env::var("APP_SECRET_KEY")
                .unwrap_or_else(|_| "dev-secret-key".to_string()),
            verify_token_secret: std::env::var("VERIFY_TOKEN_SECRET")
                .unwrap_or_else(|_| "dev-verify-secret".to_string()),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_app_name() -> String {
    "Meridian".to_string()
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_db_path() -> String {
    "meridian.db".to_string()
}
fn default_tz() -> String {
    "UTC".to_string()
}
fn default_threshold() -> f64 {
    0.7
}
fn default_one() -> f64 {
    1.0
}
fn default_message_explicit() -> f64 {
    0.9
}
fn default_inferred() -> f64 {
    0.6
}
fn default_chat_default() -> f64 {
    0.5
}
fn default_decay() -> f64 {
    0.01
}
fn default_conf_hhmm() -> f64 {
    0.95
}
fn default_conf_090() -> f64 {
    0.9
}
fn default_conf_range() -> f64 {
    0.85
}
fn default_conf_at_h() -> f64 {
    0.7
}
fn default_dedupe_ttl() -> u64 {
    604_800 // 7 days
}
fn default_throttle_seconds() -> u64 {
    2
}
fn default_cleanup_multiplier() -> u64 {
    10
}
fn default_rl_requests() -> usize {
    20
}
fn default_rl_window() -> u64 {
    60
}
fn default_max_notifications() -> u32 {
    3
}
fn default_low_threshold() -> f64 {
    0.40
}
fn default_high_threshold() -> f64 {
    0.60
}
fn default_long_text_threshold() -> usize {
    100
}
fn default_window_size() -> usize {
    5
}
fn default_llm_max_tokens() -> u32 {
    150
}
fn default_llm_temperature() -> f64 {
    0.1
}
fn default_llm_timeout() -> f64 {
    10.0
}
fn default_extraction_max_tokens() -> u32 {
    500
}
fn default_extraction_timeout() -> f64 {
    9.0
}
fn default_extraction_confidence() -> f64 {
    0.8
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_reset_timeout() -> f64 {
    60.0
}
fn default_llm_model() -> String {
    "qwen/qwen3-next-80b-a3b-instruct".to_string()
}
fn default_llm_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}
fn default_api_timeout() -> f64 {
    30.0
}
fn default_max_cities() -> usize {
    4
}
fn default_token_hours() -> i64 {
    24
}
fn default_relocation_confidence() -> f64 {
    0.9
}
fn default_city_detection_confidence() -> f64 {
    0.7
}
fn default_log_level() -> String {
    "info".to_string()
}
