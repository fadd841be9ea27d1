use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Feature space size for hashed n-grams. Must match the offline trainer.
pub const DEFAULT_HASH_DIMS: usize = 4096;

const NGRAM_MIN: usize = 2;
const NGRAM_MAX: usize = 5;

/// FNV-1a. Stable across platforms and releases, unlike the std hasher —
/// model artifacts depend on it.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Hashed character n-gram features in word-boundary mode: each word is
/// padded with spaces and n-grams never cross word boundaries. L2-normalized
/// counts.
pub fn featurize(text: &str, dims: usize) -> Vec<f64> {
    let mut features = vec![0.0; dims];
    let lower = text.to_lowercase();

    for word in lower.split_whitespace() {
        let padded: Vec<char> = std::iter::once(' ')
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for n in NGRAM_MIN..=NGRAM_MAX.min(padded.len()) {
            for gram in padded.windows(n) {
                let s: String = gram.iter().collect();
                let idx = (fnv1a(s.as_bytes()) % dims as u64) as usize;
                features[idx] += 1.0;
            }
        }
    }

    let norm: f64 = features.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut features {
            *v /= norm;
        }
    }
    features
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// One logistic head over the hashed feature space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearModel {
    /// Probability of the positive class.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let z: f64 = features
            .iter()
            .zip(&self.weights)
            .map(|(f, w)| f * w)
            .sum::<f64>()
            + self.bias;
        sigmoid(z)
    }

    /// Nearest-centroid fit over seed phrases: weights point from the
    /// negative centroid toward the positive one. Deterministic; used only
    /// to build the embedded fallback models.
    pub fn fit_centroid(positive: &[&str], negative: &[&str], dims: usize) -> Self {
        let centroid = |texts: &[&str]| -> Vec<f64> {
            let mut acc = vec![0.0; dims];
            for text in texts {
                for (a, f) in acc.iter_mut().zip(featurize(text, dims)) {
                    *a += f;
                }
            }
            if !texts.is_empty() {
                for a in &mut acc {
                    *a /= texts.len() as f64;
                }
            }
            acc
        };

        let pos = centroid(positive);
        let neg = centroid(negative);
        // Scale sharpens the sigmoid around the midpoint.
        const SCALE: f64 = 24.0;
        let weights: Vec<f64> = pos
            .iter()
            .zip(&neg)
            .map(|(p, n)| (p - n) * SCALE)
            .collect();
        let midpoint: f64 = pos
            .iter()
            .zip(&neg)
            .zip(&weights)
            .map(|((p, n), w)| (p + n) / 2.0 * w)
            .sum();
        Self {
            weights,
            bias: -midpoint,
        }
    }
}

/// Multinomial subtype head: one linear scorer per label, argmax wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeHead {
    pub labels: Vec<String>,
    pub heads: Vec<LinearModel>,
}

impl TypeHead {
    pub fn predict(&self, features: &[f64]) -> Option<&str> {
        self.labels
            .iter()
            .zip(&self.heads)
            .max_by(|(_, a), (_, b)| {
                a.predict_proba(features)
                    .total_cmp(&b.predict_proba(features))
            })
            .map(|(label, _)| label.as_str())
    }

    /// One-vs-rest centroid heads from labeled seed phrases.
    pub fn fit_centroid(labeled: &[(&str, &str)], dims: usize) -> Self {
        let mut labels: Vec<String> = labeled.iter().map(|(l, _)| l.to_string()).collect();
        labels.sort();
        labels.dedup();

        let heads = labels
            .iter()
            .map(|label| {
                let positive: Vec<&str> = labeled
                    .iter()
                    .filter(|(l, _)| l == label)
                    .map(|(_, t)| *t)
                    .collect();
                let negative: Vec<&str> = labeled
                    .iter()
                    .filter(|(l, _)| l != label)
                    .map(|(_, t)| *t)
                    .collect();
                LinearModel::fit_centroid(&positive, &negative, dims)
            })
            .collect();

        Self { labels, heads }
    }
}

/// A complete classifier artifact: binary head + optional subtype head.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierModel {
    pub hash_dims: usize,
    pub binary: LinearModel,
    pub type_head: Option<TypeHead>,
}

impl ClassifierModel {
    pub fn predict_proba(&self, text: &str) -> f64 {
        let features = featurize(text, self.hash_dims);
        self.binary.predict_proba(&features)
    }

    /// (positive probability, subtype label if any head is present).
    pub fn predict_with_type(&self, text: &str) -> (f64, Option<String>) {
        let features = featurize(text, self.hash_dims);
        let proba = self.binary.predict_proba(&features);
        let label = self
            .type_head
            .as_ref()
            .and_then(|h| h.predict(&features))
            .map(String::from);
        (proba, label)
    }

    /// Load a trained artifact from `dir/name.json`, or fall back to the
    /// provided seed model. A corrupt artifact logs and falls back rather
    /// than failing startup.
    pub fn load_or_seed(dir: Option<&str>, name: &str, seed: impl FnOnce() -> Self) -> Self {
        if let Some(dir) = dir {
            let path = Path::new(dir).join(format!("{}.json", name));
            match std::fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<ClassifierModel>(&raw) {
                    Ok(model) => {
                        debug!(model = name, path = %path.display(), "loaded classifier artifact");
                        return model;
                    }
                    Err(e) => {
                        warn!(model = name, error = %e, "corrupt classifier artifact; using seed model");
                    }
                },
                Err(_) => {
                    debug!(model = name, "no classifier artifact; using seed model");
                }
            }
        }
        seed()
    }
}
