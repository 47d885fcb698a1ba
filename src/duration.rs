//! Human-readable interval strings.
//!
//! Parsing accepts exactly one run of ASCII digits followed by a single unit
//! letter: `s`, `m`, `h`, `d`, `w` or `y` (a year is 365 days). Formatting
//! picks the largest unit among `ms`, `s`, `m`, `h` and `d` that fits, so
//! week and year inputs do not format back to their original text.

use crate::error::{QuotagateError, Result};

const SECOND: u64 = 1_000;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;
const YEAR: u64 = 365 * DAY;

/// Parse an interval such as `"30s"` or `"5m"` into milliseconds.
pub fn parse_duration(text: &str) -> Result<u64> {
    let invalid = || QuotagateError::InvalidDuration {
        input: text.to_string(),
    };

    let unit = text.chars().last().ok_or_else(invalid)?;
    let magnitude = &text[..text.len() - unit.len_utf8()];

    if magnitude.is_empty() || !magnitude.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if !unit.is_ascii_alphabetic() {
        return Err(invalid());
    }

    let factor = match unit {
        's' => SECOND,
        'm' => MINUTE,
        'h' => HOUR,
        'd' => DAY,
        'w' => WEEK,
        'y' => YEAR,
        other => {
            return Err(QuotagateError::UnknownDurationUnit {
                input: text.to_string(),
                unit: other,
            })
        }
    };

    let value: u64 = magnitude.parse().map_err(|_| invalid())?;
    value.checked_mul(factor).ok_or_else(invalid)
}

/// Format milliseconds using the largest whole unit that fits (truncating).
pub fn format_duration(millis: u64) -> String {
    if millis < SECOND {
        format!("{}ms", millis)
    } else if millis < MINUTE {
        format!("{}s", millis / SECOND)
    } else if millis < HOUR {
        format!("{}m", millis / MINUTE)
    } else if millis < DAY {
        format!("{}h", millis / HOUR)
    } else {
        format!("{}d", millis / DAY)
    }
}
