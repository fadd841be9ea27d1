use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use meridian_core::config::ClassifierConfig;

use crate::model::{ClassifierModel, LinearModel, DEFAULT_HASH_DIMS};

static DIGIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

/// Time words without digits. Rare but important.
const TIME_WORDS: &[&str] = &[
    "noon", "midnight", "midday", "полдень", "полночь", "midi", "minuit",
];

const SEED_POSITIVE: &[&str] = &[
    "meet at 3pm",
    "call at 10:30 tomorrow",
    "standup at 14:00",
    "созвон в 15:00",
    "давай в 18:30",
    "встреча в 12 по мск",
    "lunch at noon",
    "деплой в полночь",
    "wheels up 1500Z",
    "on se voit à 14h30",
    "demo starts 9:00 a.m.",
    "free 5-7pm today",
    "let's sync at 4 pm PST",
    "завтра в 10 утра",
    "shift ends 23:59",
    "kickoff 0930 sharp",
];

const SEED_NEGATIVE: &[&str] = &[
    "version 3.0 released",
    "released 2.5.1 to prod",
    "port 8080 is taken",
    "room 404 again",
    "chapter 12 is done",
    "costs $50 per seat",
    "got 10 items left",
    "issue #1500 closed",
    "3 bugs remaining",
    "нужно 2 ревью",
    "осталось 15 тасков",
    "PR 245 merged",
    "error code 500",
    "2 of 7 done",
    "budget is 1000 dollars",
    "温度是25度",
];

static SEED_MODEL: LazyLock<ClassifierModel> = LazyLock::new(|| ClassifierModel {
    hash_dims: DEFAULT_HASH_DIMS,
    binary: LinearModel::fit_centroid(SEED_POSITIVE, SEED_NEGATIVE, DEFAULT_HASH_DIMS),
    type_head: None,
});

/// Binary classifier: does this text contain a time reference?
///
/// A digit/time-word trigger guard runs before any inference, and long texts
/// are scored window-by-window around trigger tokens.
pub struct TimeClassifier {
    model: ClassifierModel,
    config: ClassifierConfig,
}

impl TimeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let model =
            ClassifierModel::load_or_seed(config.model_dir.as_deref(), "time_classifier", || {
                SEED_MODEL.clone()
            });
        Self { model, config }
    }

    /// True if `text` likely contains a time reference.
    ///
    /// Texts with no digit and no time word are negative without consulting
    /// the model at all.
    pub fn contains_time(&self, text: &str) -> bool {
        if !has_trigger(text) {
            return false;
        }

        if text.chars().count() <= self.config.long_text_threshold {
            return self.check_with_threshold(text);
        }

        // Long text: score ±window_size tokens around every trigger token.
        let windows = extract_windows(text, self.config.window_size);
        if windows.is_empty() {
            return false;
        }
        windows.iter().any(|w| self.check_with_threshold(w))
    }

    /// Raw positive-class probability, mostly for threshold analysis.
    pub fn predict_proba(&self, text: &str) -> f64 {
        self.model.predict_proba(text)
    }

    fn check_with_threshold(&self, text: &str) -> bool {
        let proba = self.model.predict_proba(text);
        if proba > self.config.high_threshold {
            return true;
        }
        if proba < self.config.low_threshold {
            return false;
        }
        // Uncertain band: the binary head's own decision stands.
        proba >= 0.5
    }
}

/// Trigger guard: any digit, or one of the closed time-word set.
fn has_trigger(text: &str) -> bool {
    if DIGIT.is_match(text) {
        return true;
    }
    let lower = text.to_lowercase();
    TIME_WORDS.iter().any(|w| lower.contains(w))
}

fn token_is_trigger(token: &str) -> bool {
    DIGIT.is_match(token) || TIME_WORDS.contains(&token.to_lowercase().as_str())
}

/// ±`window_size` tokens around every trigger token, deduplicated by bounds.
fn extract_windows(text: &str, window_size: usize) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut windows = Vec::new();
    let mut seen_ranges: HashSet<(usize, usize)> = HashSet::new();

    for (i, token) in tokens.iter().enumerate() {
        if !token_is_trigger(token) {
            continue;
        }
        let start = i.saturating_sub(window_size);
        let end = (i + window_size + 1).min(tokens.len());
        if !seen_ranges.insert((start, end)) {
            continue;
        }
        windows.push(tokens[start..end].join(" "));
    }

    windows
}
