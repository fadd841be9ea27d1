use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use meridian_core::config::TimeParsingConfidenceConfig;
use meridian_core::types::ParsedTime;

use crate::hints::extract_timezone_hint;

// 7:30pm, 3:30 pm, 10:00 a.m.
static HH_MM_AMPM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*([ap])\.?m\.?\b").unwrap());
// 14h30, 9h — European format
static HH_H_MM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})h(\d{2})?\b").unwrap());
// 1500Z, 0745, 2200 — military / 4-digit 24h
static MILITARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]\d|2[0-3])([0-5]\d)[Zz]?\b").unwrap());
// 14:30, 2:30 — plain 24h or ambiguous
static HH_MM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2}):(\d{2})\b").unwrap());
// 2pm, 2 pm, 1p.m.
static H_AMPM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})\s*([ap])\.?m\.?\b").unwrap());
// 5-7pm, 7-10am
static RANGE_AMPM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})-(\d{1,2})\s*(am|pm)\b").unwrap());
// at 10, at 2
static AT_H: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bat\s+(\d{1,2})\b").unwrap());

static TOMORROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btomorrow\b").unwrap());

/// Convert a 12-hour value with an am/pm marker to 24-hour.
fn to_24h(hour: u8, is_pm: bool) -> u8 {
    match (hour, is_pm) {
        (12, false) => 0, // 12am → 0
        (12, true) => 12, // 12pm → 12
        (h, false) => h,
        (h, true) => h + 12,
    }
}

/// Extract every time reference from `text`.
///
/// Patterns run in priority order; a text position claimed by one pattern is
/// never double-counted by a later one. Callers are expected to gate this
/// behind `contains_time` — the patterns alone accept things like bare
/// 4-digit numbers.
pub fn parse_times(text: &str, conf: &TimeParsingConfidenceConfig) -> Vec<ParsedTime> {
    let mut results: Vec<ParsedTime> = Vec::new();
    let mut matched: HashSet<usize> = HashSet::new();

    let is_tomorrow = TOMORROW.is_match(text);
    let tz_hint = extract_timezone_hint(text).map(String::from);

    let make = |original: &str, hour: u8, minute: u8, confidence: f64| ParsedTime {
        original_text: original.to_string(),
        hour,
        minute,
        timezone_hint: tz_hint.clone(),
        is_tomorrow,
        confidence,
    };

    // 1. HH:MM with am/pm (highest priority — must run before plain HH:MM).
    for caps in HH_MM_AMPM.captures_iter(text) {
        let m = caps.get(0).unwrap();
        let hour: u8 = caps[1].parse().unwrap_or(99);
        let minute: u8 = caps[2].parse().unwrap_or(99);
        let is_pm = caps[3].eq_ignore_ascii_case("p");
        if (1..=12).contains(&hour) && minute <= 59 {
            results.push(make(m.as_str(), to_24h(hour, is_pm), minute, conf.hhmm_ampm));
            matched.insert(m.start());
        }
    }

    // 2. European HhMM (14h30, 9h).
    for caps in HH_H_MM.captures_iter(text) {
        let m = caps.get(0).unwrap();
        if matched.contains(&m.start()) {
            continue;
        }
        let hour: u8 = caps[1].parse().unwrap_or(99);
        let minute: u8 = caps
            .get(2)
            .map(|g| g.as_str().parse().unwrap_or(99))
            .unwrap_or(0);
        if hour <= 23 && minute <= 59 {
            results.push(make(m.as_str(), hour, minute, conf.european_hhmm));
            matched.insert(m.start());
        }
    }

    // 3. Military time (1500Z, 0745). The pattern already bounds the digits.
    for caps in MILITARY.captures_iter(text) {
        let m = caps.get(0).unwrap();
        if matched.contains(&m.start()) {
            continue;
        }
        let hour: u8 = caps[1].parse().unwrap_or(99);
        let minute: u8 = caps[2].parse().unwrap_or(99);
        results.push(make(m.as_str(), hour, minute, conf.military));
        matched.insert(m.start());
    }

    // 4. Plain HH:MM (skip positions the am/pm form already claimed).
    for caps in HH_MM.captures_iter(text) {
        let m = caps.get(0).unwrap();
        if matched.contains(&m.start()) {
            continue;
        }
        let hour: u8 = caps[1].parse().unwrap_or(99);
        let minute: u8 = caps[2].parse().unwrap_or(99);
        if hour <= 23 && minute <= 59 {
            results.push(make(m.as_str(), hour, minute, conf.plain_hhmm));
            matched.insert(m.start());
        }
    }

    // 5. Ranges (5-7pm). Runs before the bare-hour pattern and claims the
    // position of both hours, so "5-7pm" yields exactly two entries.
    for caps in RANGE_AMPM.captures_iter(text) {
        let m = caps.get(0).unwrap();
        if matched.contains(&m.start()) {
            continue;
        }
        let start_h: u8 = caps[1].parse().unwrap_or(99);
        let end_h: u8 = caps[2].parse().unwrap_or(99);
        let is_pm = caps[3].eq_ignore_ascii_case("pm");
        for h in [start_h, end_h] {
            if (1..=12).contains(&h) {
                results.push(make(m.as_str(), to_24h(h, is_pm), 0, conf.range));
            }
        }
        matched.insert(m.start());
        matched.insert(caps.get(2).unwrap().start());
    }

    // 6. Bare hour with am/pm (2pm).
    for caps in H_AMPM.captures_iter(text) {
        let m = caps.get(0).unwrap();
        if matched.contains(&m.start()) {
            continue;
        }
        let hour: u8 = caps[1].parse().unwrap_or(99);
        let is_pm = caps[2].eq_ignore_ascii_case("p");
        if (1..=12).contains(&hour) {
            results.push(make(m.as_str(), to_24h(hour, is_pm), 0, conf.h_ampm));
            matched.insert(m.start());
        }
    }

    // 7. "at H" — ambiguous, only when nothing else matched at all.
    if results.is_empty() {
        for caps in AT_H.captures_iter(text) {
            let m = caps.get(0).unwrap();
            let hour: u8 = caps[1].parse().unwrap_or(99);
            if hour <= 23 {
                results.push(make(m.as_str(), hour, 0, conf.at_h));
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<ParsedTime> {
        parse_times(text, &TimeParsingConfidenceConfig::default())
    }

    #[test]
    fn hh_mm_ampm_variants() {
        let times = parse("let's do 7:30pm");
        assert_eq!(times.len(), 1);
        assert_eq!((times[0].hour, times[0].minute), (19, 30));
        assert_eq!(times[0].confidence, 0.95);

        let times = parse("starts 10:00 a.m. sharp");
        assert_eq!((times[0].hour, times[0].minute), (10, 0));
    }

    #[test]
    fn twelve_oclock_boundaries() {
        assert_eq!(parse("12am tonight")[0].hour, 0);
        assert_eq!(parse("12pm lunch")[0].hour, 12);
        assert_eq!(parse("meet at 00:00")[0].hour, 0);
        let t = &parse("until 23:59")[0];
        assert_eq!((t.hour, t.minute), (23, 59));
    }

    #[test]
    fn european_h_format() {
        let t = &parse("on se voit à 14h30")[0];
        assert_eq!((t.hour, t.minute), (14, 30));
        let t = &parse("rdv 9h")[0];
        assert_eq!((t.hour, t.minute), (9, 0));
        let t = &parse("14h ça marche")[0];
        assert_eq!((t.hour, t.minute), (14, 0));
    }

    #[test]
    fn military_time() {
        let t = &parse("wheels up 1500Z")[0];
        assert_eq!((t.hour, t.minute), (15, 0));
        let t = &parse("briefing 0745")[0];
        assert_eq!((t.hour, t.minute), (7, 45));
    }

    #[test]
    fn plain_24h() {
        let t = &parse("standup at 14:30")[0];
        assert_eq!((t.hour, t.minute), (14, 30));
        assert_eq!(t.confidence, 0.95);
    }

    #[test]
    fn ampm_position_not_double_counted() {
        // "7:30pm" must parse once (as 19:30), not again as plain 7:30.
        let times = parse("dinner 7:30pm?");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].hour, 19);
    }

    #[test]
    fn bare_hour_ampm() {
        let t = &parse("2pm works")[0];
        assert_eq!((t.hour, t.minute), (14, 0));
        assert_eq!(t.confidence, 0.9);
    }

    #[test]
    fn range_produces_two_entries() {
        let times = parse("free 5-7pm");
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].hour, 17);
        assert_eq!(times[1].hour, 19);
        assert!(times.iter().all(|t| t.confidence == 0.85));
    }

    #[test]
    fn at_h_only_when_nothing_else() {
        let times = parse("see you at 10");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].hour, 10);
        assert_eq!(times[0].confidence, 0.7);

        // When a stronger pattern matched, "at N" stays silent.
        let times = parse("at 10 or maybe 14:30");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].hour, 14);
    }

    #[test]
    fn tomorrow_flag_applies_to_all_times() {
        let times = parse("tomorrow at 9:00 or 15:00");
        assert_eq!(times.len(), 2);
        assert!(times.iter().all(|t| t.is_tomorrow));
    }

    #[test]
    fn timezone_hint_attached_to_every_time() {
        let times = parse("call at 10am PST");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].timezone_hint.as_deref(), Some("America/Los_Angeles"));
    }

    #[test]
    fn invalid_hours_rejected() {
        assert!(parse("code 25:99 fail").is_empty());
        // 13pm is not a valid 12-hour value.
        assert!(parse("13pm").is_empty());
    }

    #[test]
    fn no_times_in_plain_text() {
        assert!(parse("hello there").is_empty());
    }
}
