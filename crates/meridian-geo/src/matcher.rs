use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::data::city_table;
use crate::normalize::normalize_russian_case;

/// A city name detected inside free text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCity {
    /// The text as it appeared in the message.
    pub original: String,
    /// Canonical (English) city name.
    pub normalized: String,
    pub timezone: String,
}

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\w\-]+").unwrap());

/// Find every city name mentioned in `text`.
///
/// Word-boundary languages are scanned with 3-, 2-, then 1-word windows
/// (longer windows win so "New York" is not shadowed by "York"); CJK text is
/// additionally scanned with 2–4 character sliding windows. Results are
/// deduplicated by resolved timezone, first occurrence wins.
pub fn find_cities_in_text(text: &str) -> Vec<DetectedCity> {
    let table = city_table();
    let mut found: Vec<DetectedCity> = Vec::new();
    let mut seen_timezones: HashSet<String> = HashSet::new();

    let words: Vec<&str> = WORD_RE.find_iter(text).map(|m| m.as_str()).collect();

    // Multi-word combinations first: "New York", "San Francisco", …
    for n_words in [3usize, 2] {
        if words.len() < n_words {
            continue;
        }
        for window in words.windows(n_words) {
            let phrase = window.join(" ");
            if let Some(rec) = table.lookup_in_text(&phrase) {
                if seen_timezones.insert(rec.timezone.clone()) {
                    found.push(DetectedCity {
                        original: phrase,
                        normalized: rec.name.clone(),
                        timezone: rec.timezone.clone(),
                    });
                }
            }
        }
    }

    // Then single words, with Russian case normalization on miss.
    for word in &words {
        let rec = table.lookup_in_text(word).or_else(|| {
            let normalized = normalize_russian_case(word);
            if normalized != *word {
                table.lookup_in_text(&normalized)
            } else {
                None
            }
        });
        if let Some(rec) = rec {
            if seen_timezones.insert(rec.timezone.clone()) {
                found.push(DetectedCity {
                    original: word.to_string(),
                    normalized: rec.name.clone(),
                    timezone: rec.timezone.clone(),
                });
            }
        }
    }

    // CJK has no word boundaries: slide 2–4 char windows over CJK runs.
    find_cjk_cities(text, table, &mut seen_timezones, &mut found);

    found
}

fn find_cjk_cities(
    text: &str,
    table: &crate::data::CityTable,
    seen_timezones: &mut HashSet<String>,
    found: &mut Vec<DetectedCity>,
) {
    if !text.chars().any(is_cjk_char) {
        return;
    }

    let chars: Vec<char> = text.chars().collect();
    for window_size in [2usize, 3, 4] {
        if chars.len() < window_size {
            continue;
        }
        for window in chars.windows(window_size) {
            if !window.iter().copied().all(is_cjk_char) {
                continue;
            }
            let substr: String = window.iter().collect();
            if let Some(rec) = table.lookup_in_text(&substr) {
                if seen_timezones.insert(rec.timezone.clone()) {
                    found.push(DetectedCity {
                        original: substr,
                        normalized: rec.name.clone(),
                        timezone: rec.timezone.clone(),
                    });
                }
            }
        }
    }
}

/// CJK Unified Ideographs, Extension A, kana, and Hangul.
fn is_cjk_char(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x3040..=0x309F).contains(&code)
        || (0x30A0..=0x30FF).contains(&code)
        || (0xAC00..=0xD7AF).contains(&code)
}
