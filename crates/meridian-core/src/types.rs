use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported messaging platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Slack,
    Discord,
    Whatsapp,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Telegram => "telegram",
            Platform::Slack => "slack",
            Platform::Discord => "discord",
            Platform::Whatsapp => "whatsapp",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Platform::Telegram),
            "slack" => Ok(Platform::Slack),
            "discord" => Ok(Platform::Discord),
            "whatsapp" => Ok(Platform::Whatsapp),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

/// Platform-agnostic representation of an incoming message event.
///
/// All connectors normalize their wire payloads to this shape. Immutable
/// after construction; `(platform, event_id)` is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub platform: Platform,
    /// Globally unique per platform; used for deduplication.
    pub event_id: String,
    /// Platform message ID used as the reply anchor.
    pub message_id: Option<String>,
    pub chat_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub reply_to_message_id: Option<String>,
    /// Original platform payload, kept for debugging only.
    pub raw_payload: Option<serde_json::Value>,
}

/// How outbound text should be rendered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    #[default]
    Plain,
    Markdown,
    Html,
}

/// Platform-agnostic outgoing message. Connectors translate `parse_mode`
/// and `reply_to_message_id` to native fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub platform: Platform,
    pub chat_id: String,
    pub text: String,
    pub reply_to_message_id: Option<String>,
    pub parse_mode: ParseMode,
}

impl OutboundMessage {
    pub fn plain(platform: Platform, chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            platform,
            chat_id: chat_id.into(),
            text: text.into(),
            reply_to_message_id: None,
            parse_mode: ParseMode::Plain,
        }
    }
}

/// A time reference extracted from message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedTime {
    /// The original time string as it appeared in the message.
    pub original_text: String,
    /// Hour in 24-hour form, 0..=23.
    pub hour: u8,
    /// Minute, 0..=59.
    pub minute: u8,
    /// IANA timezone hinted in the message (e.g. "3pm PST" → America/Los_Angeles).
    pub timezone_hint: Option<String>,
    pub is_tomorrow: bool,
    /// Parsing confidence in [0, 1].
    pub confidence: f64,
}

/// How a user's timezone was determined. Determines initial confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezoneSource {
    WebVerified,
    CityPick,
    MessageExplicit,
    Inferred,
    RelocationConfirmed,
    ChatDefault,
    #[default]
    Default,
}

impl TimezoneSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimezoneSource::WebVerified => "web_verified",
            TimezoneSource::CityPick => "city_pick",
            TimezoneSource::MessageExplicit => "message_explicit",
            TimezoneSource::Inferred => "inferred",
            TimezoneSource::RelocationConfirmed => "relocation_confirmed",
            TimezoneSource::ChatDefault => "chat_default",
            TimezoneSource::Default => "default",
        }
    }
}

impl std::str::FromStr for TimezoneSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "web_verified" => Ok(TimezoneSource::WebVerified),
            "city_pick" => Ok(TimezoneSource::CityPick),
            "message_explicit" => Ok(TimezoneSource::MessageExplicit),
            "inferred" => Ok(TimezoneSource::Inferred),
            "relocation_confirmed" => Ok(TimezoneSource::RelocationConfirmed),
            "chat_default" => Ok(TimezoneSource::ChatDefault),
            "default" => Ok(TimezoneSource::Default),
            other => Err(format!("unknown timezone source: {}", other)),
        }
    }
}

/// Per-user timezone state, keyed by (platform, user_id).
///
/// Invariant: `tz_iana == None` implies `confidence == 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserTzState {
    pub platform: Platform,
    pub user_id: String,
    pub tz_iana: Option<String>,
    pub confidence: f64,
    pub source: TimezoneSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// Per-chat state, keyed by (platform, chat_id).
///
/// Invariant: `active_timezones` is always the sorted, deduplicated
/// projection of `user_timezones` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatState {
    pub platform: Platform,
    pub chat_id: String,
    pub default_tz: Option<String>,
    /// user_id → tz_iana for every participant we have resolved.
    pub user_timezones: BTreeMap<String, String>,
    pub active_timezones: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Deduplication record; presence means the event was admitted past the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupEvent {
    pub platform: Platform,
    pub event_id: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
}

/// Classified signal extracted from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Time,
    Relocation,
    Mention,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerKind::Time => f.write_str("time"),
            TriggerKind::Relocation => f.write_str("relocation"),
            TriggerKind::Mention => f.write_str("mention"),
        }
    }
}

/// Detector output: one classified signal with a structured payload the
/// matching handler knows how to act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedTrigger {
    pub kind: TriggerKind,
    pub confidence: f64,
    pub original_text: String,
    pub data: serde_json::Value,
}

/// Context resolved once per event and shared by all handlers.
#[derive(Debug, Clone)]
pub struct ResolvedContext {
    pub platform: Platform,
    pub chat_id: String,
    pub user_id: String,
    /// Source timezone for conversions, if one could be resolved.
    pub source_timezone: Option<String>,
    /// Target timezones: config team set first, then chat active set.
    pub target_timezones: Vec<String>,
    /// Which targets came from config (annotated "team" vs "chat").
    pub team_timezones: Vec<String>,
    pub reply_to_message_id: Option<String>,
}

/// Aggregate result of one pipeline run.
#[derive(Debug, Default)]
pub struct PipelineResult {
    pub messages: Vec<OutboundMessage>,
    pub triggers_detected: usize,
    pub triggers_handled: usize,
    pub errors: Vec<String>,
    /// Set when the pipeline could not act for lack of user state; the
    /// orchestrator turns this into a session.
    pub needs_state_collection: bool,
    pub state_collection_trigger: Option<DetectedTrigger>,
}

/// What a session is trying to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionGoal {
    AwaitingTimezone,
    ReverifyTimezone,
    ConfirmRelocation,
}

impl SessionGoal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionGoal::AwaitingTimezone => "AWAITING_TIMEZONE",
            SessionGoal::ReverifyTimezone => "REVERIFY_TIMEZONE",
            SessionGoal::ConfirmRelocation => "CONFIRM_RELOCATION",
        }
    }
}

impl std::str::FromStr for SessionGoal {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AWAITING_TIMEZONE" => Ok(SessionGoal::AwaitingTimezone),
            "REVERIFY_TIMEZONE" => Ok(SessionGoal::ReverifyTimezone),
            "CONFIRM_RELOCATION" => Ok(SessionGoal::ConfirmRelocation),
            other => Err(format!("unknown session goal: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Expired => "EXPIRED",
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(SessionStatus::Active),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "FAILED" => Ok(SessionStatus::Failed),
            "EXPIRED" => Ok(SessionStatus::Expired),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// One role-tagged turn of a session conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: String,
    pub content: String,
}

/// Mutable working state a session accumulates across turns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub history: Vec<SessionTurn>,
    /// Text of the message that opened the session.
    #[serde(default)]
    pub original_text: String,
    /// Trigger payload that opened the session (e.g. the relocation city).
    #[serde(default)]
    pub trigger_data: serde_json::Value,
    #[serde(default)]
    pub verify_url: Option<String>,
    /// Existing tz for re-verify prompts.
    #[serde(default)]
    pub existing_tz: Option<String>,
    /// Candidate resolved by the relocation flow, awaiting confirmation.
    #[serde(default)]
    pub resolved_city: Option<String>,
    #[serde(default)]
    pub resolved_tz: Option<String>,
}

/// A bounded multi-turn interaction collecting missing user state.
///
/// Invariants: at most one ACTIVE session per (platform, chat_id, user_id);
/// `expires_at > created_at`; `attempts <= MAX_ATTEMPTS` while ACTIVE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub platform: Platform,
    pub chat_id: String,
    pub user_id: String,
    pub goal: SessionGoal,
    pub status: SessionStatus,
    pub context: SessionContext,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result returned to the webhook layer for one inbound event.
#[derive(Debug, Default)]
pub struct HandlerResult {
    pub should_respond: bool,
    pub messages: Vec<OutboundMessage>,
}

impl HandlerResult {
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn respond(messages: Vec<OutboundMessage>) -> Self {
        Self {
            should_respond: !messages.is_empty(),
            messages,
        }
    }
}
