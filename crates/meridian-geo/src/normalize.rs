/// Deterministic Russian declension rewrites.
///
/// City names in Russian text arrive in dative/accusative/prepositional case
/// ("по Бобруйску", "в Москву", "в Берлине"). These suffix rewrites recover
/// the nominative form so the table lookup can hit.
pub fn normalize_russian_case(city: &str) -> String {
    let chars: Vec<char> = city.chars().collect();
    let lower: String = city.to_lowercase();

    let drop_last = |n: usize| chars[..chars.len() - n].iter().collect::<String>();
    // Preserve the case of the replaced letter ("МОСКВУ" → "МОСКВА").
    let last_is_lower = chars.last().map(|c| c.is_lowercase()).unwrap_or(true);
    let cased = |lower_ch: char, upper_ch: char| if last_is_lower { lower_ch } else { upper_ch };

    // -ску → -ск (Бобруйску → Бобруйск, Минску → Минск)
    if lower.ends_with("ску") {
        return drop_last(1);
    }
    // -ву → -ва (Москву → Москва), accusative
    if lower.ends_with("ву") {
        return format!("{}{}", drop_last(1), cased('а', 'А'));
    }
    // -ве → -ва (Москве → Москва), prepositional
    if lower.ends_with("ве") {
        return format!("{}{}", drop_last(1), cased('а', 'А'));
    }
    // -ине → -ин (Берлине → Берлин)
    if lower.ends_with("ине") {
        return drop_last(1);
    }
    // -ни → -нь (Казани → Казань)
    if lower.ends_with("ни") {
        return format!("{}{}", drop_last(1), cased('ь', 'Ь'));
    }
    // -ну → -н (Лондону → Лондон, Берлину → Берлин)
    if lower.ends_with("ну") {
        return drop_last(1);
    }
    // -не → -на (Вене → Вена)
    if lower.ends_with("не") {
        return format!("{}{}", drop_last(1), cased('а', 'А'));
    }
    // -те → -т (Ташкенте → Ташкент)
    if lower.ends_with("те") {
        return drop_last(1);
    }
    // -ту → -т
    if lower.ends_with("ту") {
        return drop_last(1);
    }
    // Generic prepositional: final -е dropped when a consonant precedes it.
    if lower.ends_with('е') && chars.len() > 3 {
        let preceding = chars[chars.len() - 2].to_lowercase().next().unwrap_or(' ');
        if !"аеёиоуыэюя".contains(preceding) {
            return drop_last(1);
        }
    }

    city.to_string()
}

/// Words the greedy "moved to X Y" capture drags in that are never part of
/// a city name.
const TRAILING_WORDS: &[&str] = &[
    "last",
    "next",
    "yesterday",
    "today",
    "tomorrow",
    "soon",
    "week",
    "month",
    "year",
    "ago",
    "живу",
    "жить",
    "буду",
    "работаю",
    "теперь",
];

/// Strip a known trailing non-city word from a captured city phrase.
///
/// "London last" (from "moved to London last week") becomes "London".
pub fn clean_city(raw_city: &str) -> String {
    let words: Vec<&str> = raw_city.split_whitespace().collect();
    if words.len() > 1 {
        let last = words[words.len() - 1].to_lowercase();
        if TRAILING_WORDS.contains(&last.as_str()) {
            return words[..words.len() - 1].join(" ");
        }
    }
    raw_city.trim().to_string()
}
