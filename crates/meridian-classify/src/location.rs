use std::sync::LazyLock;

use meridian_core::config::ClassifierConfig;

use crate::model::{ClassifierModel, LinearModel, TypeHead, DEFAULT_HASH_DIMS};

/// Result of location-change trigger detection.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationTriggerResult {
    pub triggered: bool,
    /// "explicit_location", "change_phrase", "question", or "none".
    pub trigger_type: String,
    pub confidence: f64,
}

const SEED_EXPLICIT: &[&str] = &[
    "я в берлине сейчас",
    "I'm in Berlin right now",
    "нахожусь в лондоне",
    "сейчас в Тбилиси",
    "I am currently in Tokyo",
    "сижу в Ереване эту неделю",
];

const SEED_CHANGE: &[&str] = &[
    "переехал в Москву",
    "moved to London last month",
    "relocating to Paris soon",
    "перебрался в Ташкент",
    "лечу в Париж завтра",
    "мы переезжаем в Берлин",
    "just relocated to NYC",
    "приехал в Стамбул",
];

const SEED_QUESTION: &[&str] = &[
    "where are you based now?",
    "ты сейчас где?",
    "а ты в каком городе?",
    "what city are you in?",
];

const SEED_NEGATIVE: &[&str] = &[
    "привет, как дела?",
    "готово, закоммитил",
    "version 3.0 released",
    "shipped the fix",
    "созвон в 15:00",
    "lunch at noon?",
    "merge the PR please",
    "отличная работа",
];

static SEED_MODEL: LazyLock<ClassifierModel> = LazyLock::new(|| {
    let positive: Vec<&str> = SEED_EXPLICIT
        .iter()
        .chain(SEED_CHANGE)
        .chain(SEED_QUESTION)
        .copied()
        .collect();
    let labeled: Vec<(&str, &str)> = SEED_EXPLICIT
        .iter()
        .map(|t| ("explicit_location", *t))
        .chain(SEED_CHANGE.iter().map(|t| ("change_phrase", *t)))
        .chain(SEED_QUESTION.iter().map(|t| ("question", *t)))
        .collect();
    ClassifierModel {
        hash_dims: DEFAULT_HASH_DIMS,
        binary: LinearModel::fit_centroid(&positive, SEED_NEGATIVE, DEFAULT_HASH_DIMS),
        type_head: Some(TypeHead::fit_centroid(&labeled, DEFAULT_HASH_DIMS)),
    }
});

/// Two-stage classifier: does this message mention the speaker's own
/// location or a relocation, and which flavor?
pub struct LocationClassifier {
    model: ClassifierModel,
}

impl LocationClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let model = ClassifierModel::load_or_seed(
            config.model_dir.as_deref(),
            "location_change_trigger",
            || SEED_MODEL.clone(),
        );
        Self { model }
    }

    pub fn predict(&self, text: &str) -> LocationTriggerResult {
        let (proba, label) = self.model.predict_with_type(text);
        if proba < 0.5 {
            return LocationTriggerResult {
                triggered: false,
                trigger_type: "none".to_string(),
                confidence: 1.0 - proba,
            };
        }
        LocationTriggerResult {
            triggered: true,
            trigger_type: label.unwrap_or_else(|| "explicit_location".to_string()),
            confidence: proba,
        }
    }
}
