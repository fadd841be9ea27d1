use std::str::FromStr;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use meridian_core::types::ParsedTime;

/// A time converted into one target timezone.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedTime {
    pub timezone: String,
    pub hour: u8,
    pub minute: u8,
    /// e.g. "18:00 UK (UTC+1, team)"
    pub formatted: String,
    pub is_next_day: bool,
    pub is_prev_day: bool,
    /// "team", "chat", or "" when unknown.
    pub source: String,
}

/// True if `timezone` names a zone in the IANA database.
pub fn is_valid_iana_timezone(timezone: &str) -> bool {
    Tz::from_str(timezone).is_ok()
}

/// UTC offset string for a timezone right now: "UTC+3", "UTC-8", "UTC+5:30".
pub fn get_utc_offset(timezone: &str) -> String {
    let Ok(tz) = Tz::from_str(timezone) else {
        return "UTC".to_string();
    };
    let now = Utc::now().with_timezone(&tz);
    let total_seconds = now.offset().fix().local_minus_utc();
    let sign = if total_seconds >= 0 { "+" } else { "-" };
    let abs = total_seconds.unsigned_abs();
    let hours = abs / 3600;
    let minutes = (abs % 3600) / 60;
    if minutes > 0 {
        format!("UTC{}{}:{:02}", sign, hours, minutes)
    } else {
        format!("UTC{}{}", sign, hours)
    }
}

/// Short label for a timezone: closed map for the common zones, else the
/// last IANA segment with underscores replaced.
pub fn timezone_abbreviation(timezone: &str) -> String {
    match timezone {
        "America/Los_Angeles" => "PT".to_string(),
        "America/New_York" => "ET".to_string(),
        "America/Chicago" => "CT".to_string(),
        "America/Denver" => "MT".to_string(),
        "Europe/London" => "UK".to_string(),
        "Europe/Berlin" | "Europe/Paris" => "CET".to_string(),
        "Asia/Tokyo" => "JST".to_string(),
        "Australia/Sydney" => "AEST".to_string(),
        "UTC" => "UTC".to_string(),
        other => match other.rsplit('/').next() {
            Some(city) => city.replace('_', " "),
            None => other.to_string(),
        },
    }
}

/// Resolve a wall-clock time in `tz` on `date`.
///
/// DST note: an ambiguous local time (fall-back) takes the earlier mapping;
/// a non-existent local time (spring-forward gap) is shifted forward an hour
/// to the first valid instant, so round-trips across a gap can move by the
/// gap length.
fn resolve_local(tz: Tz, date: NaiveDate, hour: u8, minute: u8) -> Option<DateTime<Tz>> {
    let naive = date.and_hms_opt(u32::from(hour), u32::from(minute), 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => match tz.from_local_datetime(&(naive + Duration::hours(1))) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt),
            LocalResult::None => None,
        },
    }
}

/// Convert a parsed time from `source_tz` to `target_tz` on the reference
/// date (today in the source timezone when `None`), honoring the tomorrow
/// flag and tagging day crossings.
pub fn convert_to_timezone(
    parsed: &ParsedTime,
    source_tz: &str,
    target_tz: &str,
    reference_date: Option<NaiveDate>,
    source: &str,
) -> Option<ConvertedTime> {
    let src: Tz = Tz::from_str(source_tz).ok()?;
    let dst: Tz = Tz::from_str(target_tz).ok()?;

    let mut date =
        reference_date.unwrap_or_else(|| Utc::now().with_timezone(&src).date_naive());
    if parsed.is_tomorrow {
        date = date.succ_opt()?;
    }

    let source_dt = resolve_local(src, date, parsed.hour, parsed.minute)?;
    let target_dt = source_dt.with_timezone(&dst);

    let is_next_day = target_dt.date_naive() > source_dt.date_naive();
    let is_prev_day = target_dt.date_naive() < source_dt.date_naive();

    let hour = target_dt.hour() as u8;
    let minute = target_dt.minute() as u8;
    let formatted = format_time_with_tz(hour, minute, target_tz, is_next_day, is_prev_day, source);

    Some(ConvertedTime {
        timezone: target_tz.to_string(),
        hour,
        minute,
        formatted,
        is_next_day,
        is_prev_day,
        source: source.to_string(),
    })
}

/// Convert one parsed time into every target timezone, skipping the source
/// itself. Targets found in `team_tzs` are annotated "team", others "chat".
pub fn convert_to_timezones(
    parsed: &ParsedTime,
    source_tz: &str,
    target_tzs: &[String],
    reference_date: Option<NaiveDate>,
    team_tzs: &[String],
) -> Vec<ConvertedTime> {
    let mut results = Vec::new();
    for target in target_tzs {
        if target == source_tz {
            continue;
        }
        let source = if team_tzs.iter().any(|t| t == target) {
            "team"
        } else {
            "chat"
        };
        match convert_to_timezone(parsed, source_tz, target, reference_date, source) {
            Some(conv) => results.push(conv),
            None => warn!(source_tz, target_tz = %target, "conversion failed; skipping target"),
        }
    }
    results
}

/// "14:30 CET (UTC+1, team)" with a day tag when the date differs.
pub fn format_time_with_tz(
    hour: u8,
    minute: u8,
    timezone: &str,
    is_next_day: bool,
    is_prev_day: bool,
    source: &str,
) -> String {
    let abbrev = timezone_abbreviation(timezone);
    let offset = get_utc_offset(timezone);

    let info = if source.is_empty() {
        offset
    } else {
        format!("{}, {}", offset, source)
    };

    let day_tag = if is_next_day {
        " +1 day"
    } else if is_prev_day {
        " -1 day"
    } else {
        ""
    };

    format!("{:02}:{:02} {} ({}){}", hour, minute, abbrev, info, day_tag)
}

/// Assemble the multi-timezone reply:
///
/// ```text
/// 🕐 10:00 (PT, UTC-8):
///   → 18:00 UK (UTC+0, team)
///   → 03:00 JST (UTC+9, team) +1 day
/// ```
pub fn format_conversion_response(
    original_text: &str,
    source_tz: &str,
    conversions: &[ConvertedTime],
    source_label: &str,
) -> String {
    if conversions.is_empty() {
        return String::new();
    }

    let abbrev = timezone_abbreviation(source_tz);
    let offset = get_utc_offset(source_tz);
    let header = if source_label.is_empty() {
        format!("🕐 {} ({}, {}):", original_text, abbrev, offset)
    } else {
        format!(
            "🕐 {} ({}, {}, {}):",
            original_text, abbrev, offset, source_label
        )
    };

    let mut lines = vec![header];
    for conv in conversions {
        lines.push(format!("  → {}", conv.formatted));
    }
    lines.join("\n")
}

/// Convert raw hour/minute to all targets and format the reply. The header
/// always shows the normalized HH:MM form.
#[allow(clippy::too_many_arguments)]
pub fn format_time_conversion(
    hour: u8,
    minute: u8,
    source_tz: &str,
    target_tzs: &[String],
    is_tomorrow: bool,
    team_tzs: &[String],
    reference_date: Option<NaiveDate>,
    source_label: &str,
) -> String {
    let parsed = ParsedTime {
        original_text: format!("{:02}:{:02}", hour, minute),
        hour,
        minute,
        timezone_hint: None,
        is_tomorrow,
        confidence: 1.0,
    };

    let conversions = convert_to_timezones(&parsed, source_tz, target_tzs, reference_date, team_tzs);
    let normalized = format!("{:02}:{:02}", hour, minute);
    format_conversion_response(&normalized, source_tz, &conversions, source_label)
}
