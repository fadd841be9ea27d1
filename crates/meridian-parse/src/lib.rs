//! Rules-based time parsing and timezone conversion.
//!
//! The regex layer handles the overwhelming majority of real time mentions;
//! the LLM is only consulted by the detector when these rules fail. Callers
//! gate `parse_times` behind the time classifier's `contains_time` check.

pub mod convert;
pub mod hints;
pub mod parse;

pub use convert::{
    convert_to_timezone, convert_to_timezones, format_conversion_response, format_time_conversion,
    get_utc_offset, is_valid_iana_timezone, timezone_abbreviation, ConvertedTime,
};
pub use hints::{extract_timezone_hint, lookup_tz_abbreviation};
pub use parse::parse_times;
