use std::sync::LazyLock;

use regex::Regex;

/// Known timezone abbreviations → IANA. Closed list; anything fancier goes
/// through the geocoder.
pub const TIMEZONE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("pst", "America/Los_Angeles"),
    ("pdt", "America/Los_Angeles"),
    ("mst", "America/Denver"),
    ("mdt", "America/Denver"),
    ("cst", "America/Chicago"),
    ("cdt", "America/Chicago"),
    ("est", "America/New_York"),
    ("edt", "America/New_York"),
    ("gmt", "Europe/London"),
    ("bst", "Europe/London"),
    ("cet", "Europe/Berlin"),
    ("cest", "Europe/Berlin"),
    ("jst", "Asia/Tokyo"),
    ("aest", "Australia/Sydney"),
    ("aedt", "Australia/Sydney"),
    ("utc", "UTC"),
    ("мск", "Europe/Moscow"),
    ("msk", "Europe/Moscow"),
];

/// Well-known city shorthands → IANA, for hints like "3pm Tokyo".
pub const CITY_TIMEZONES: &[(&str, &str)] = &[
    ("los angeles", "America/Los_Angeles"),
    ("la", "America/Los_Angeles"),
    ("san francisco", "America/Los_Angeles"),
    ("sf", "America/Los_Angeles"),
    ("seattle", "America/Los_Angeles"),
    ("new york", "America/New_York"),
    ("nyc", "America/New_York"),
    ("boston", "America/New_York"),
    ("chicago", "America/Chicago"),
    ("denver", "America/Denver"),
    ("london", "Europe/London"),
    ("paris", "Europe/Paris"),
    ("berlin", "Europe/Berlin"),
    ("amsterdam", "Europe/Amsterdam"),
    ("tokyo", "Asia/Tokyo"),
    ("sydney", "Australia/Sydney"),
    ("melbourne", "Australia/Melbourne"),
];

static TZ_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = TIMEZONE_ABBREVIATIONS
        .iter()
        .map(|(abbr, _)| regex::escape(abbr))
        .collect();
    Regex::new(&format!(r"(?i)\b({})\b", alternatives.join("|"))).unwrap()
});

static CITY_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives: Vec<String> = CITY_TIMEZONES
        .iter()
        .map(|(city, _)| regex::escape(city))
        .collect();
    Regex::new(&format!(r"(?i)\b({})\b", alternatives.join("|"))).unwrap()
});

/// Look up a timezone abbreviation like PST, CET, Мск (case-insensitive).
pub fn lookup_tz_abbreviation(abbrev: &str) -> Option<&'static str> {
    let lower = abbrev.trim().to_lowercase();
    TIMEZONE_ABBREVIATIONS
        .iter()
        .find(|(a, _)| *a == lower)
        .map(|(_, tz)| *tz)
}

fn lookup_city_hint(city: &str) -> Option<&'static str> {
    let lower = city.trim().to_lowercase();
    CITY_TIMEZONES
        .iter()
        .find(|(c, _)| *c == lower)
        .map(|(_, tz)| *tz)
}

/// Scan text for a timezone hint: a known abbreviation first, then a known
/// city shorthand. The first hit applies to every time parsed from the
/// message.
pub fn extract_timezone_hint(text: &str) -> Option<&'static str> {
    if let Some(m) = TZ_HINT_RE.find(text) {
        if let Some(tz) = lookup_tz_abbreviation(m.as_str()) {
            return Some(tz);
        }
    }
    if let Some(m) = CITY_HINT_RE.find(text) {
        return lookup_city_hint(m.as_str());
    }
    None
}
