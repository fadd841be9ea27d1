use std::sync::LazyLock;

use meridian_core::config::ClassifierConfig;

use crate::model::{ClassifierModel, LinearModel, TypeHead, DEFAULT_HASH_DIMS};

/// Result of timezone-context trigger detection.
#[derive(Debug, Clone, PartialEq)]
pub struct TzTriggerResult {
    pub triggered: bool,
    /// "explicit_tz", "clarification_question", or "none".
    pub trigger_type: String,
    pub confidence: f64,
}

const SEED_EXPLICIT: &[&str] = &[
    "3pm PST works for me",
    "встречаемся в 15 по мск",
    "в 12 по Тбилиси",
    "10am EST tomorrow",
    "call is 14:00 CET",
    "давай в 9 по москве",
    "1500Z briefing",
    "18:00 UTC deploy window",
];

const SEED_CLARIFY: &[&str] = &[
    "это по москве?",
    "what timezone is that?",
    "по какому времени?",
    "is that my time or yours?",
    "which tz?",
    "а это по какому поясу",
    "whose timezone are we talking",
    "в каком часовом поясе встреча?",
];

const SEED_NEGATIVE: &[&str] = &[
    "let's meet at 3pm",
    "созвон в 15:00",
    "dinner at 8 tonight",
    "готово, закоммитил",
    "looks good to me",
    "shipped the release",
    "see you tomorrow",
    "завтра созвон",
];

static SEED_MODEL: LazyLock<ClassifierModel> = LazyLock::new(|| {
    let positive: Vec<&str> = SEED_EXPLICIT.iter().chain(SEED_CLARIFY).copied().collect();
    let labeled: Vec<(&str, &str)> = SEED_EXPLICIT
        .iter()
        .map(|t| ("explicit_tz", *t))
        .chain(SEED_CLARIFY.iter().map(|t| ("clarification_question", *t)))
        .collect();
    ClassifierModel {
        hash_dims: DEFAULT_HASH_DIMS,
        binary: LinearModel::fit_centroid(&positive, SEED_NEGATIVE, DEFAULT_HASH_DIMS),
        type_head: Some(TypeHead::fit_centroid(&labeled, DEFAULT_HASH_DIMS)),
    }
});

/// Two-stage classifier: does this message need timezone resolution, and if
/// so, is it an explicit tz mention or a clarification question?
pub struct TzContextClassifier {
    model: ClassifierModel,
}

impl TzContextClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let model = ClassifierModel::load_or_seed(
            config.model_dir.as_deref(),
            "tz_context_trigger",
            || SEED_MODEL.clone(),
        );
        Self { model }
    }

    pub fn predict(&self, text: &str) -> TzTriggerResult {
        let (proba, label) = self.model.predict_with_type(text);
        if proba < 0.5 {
            return TzTriggerResult {
                triggered: false,
                trigger_type: "none".to_string(),
                confidence: 1.0 - proba,
            };
        }
        TzTriggerResult {
            triggered: true,
            trigger_type: label.unwrap_or_else(|| "explicit_tz".to_string()),
            confidence: proba,
        }
    }

    pub fn predict_proba(&self, text: &str) -> f64 {
        self.model.predict_proba(text)
    }
}
