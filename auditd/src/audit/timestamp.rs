//! Audit timestamps
//!
//! Lines carry local wall-clock time with millisecond precision followed by
//! either `Z` or a signed `HHMM` offset, e.g. `2024-01-01T09:30:00.125+0530`.

use chrono::{DateTime, FixedOffset, Local};

/// Current local time as an audit timestamp
pub fn generate_timestamp() -> String {
    format_timestamp(Local::now().fixed_offset())
}

/// Format a known instant and offset as an audit timestamp
pub fn format_timestamp(at: DateTime<FixedOffset>) -> String {
    let mut out = at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();

    let offset_secs = at.offset().local_minus_utc();
    if offset_secs == 0 {
        out.push('Z');
    } else {
        let sign = if offset_secs < 0 { '-' } else { '+' };
        let minutes = offset_secs.unsigned_abs() / 60;
        out.push(sign);
        out.push_str(&format!("{:02}{:02}", minutes / 60, minutes % 60));
    }
    out
}

/// Structural check of a caller-supplied timestamp
///
/// Only the `YYYY-MM-DDTHH:MM:SS` skeleton is checked: digits and separators
/// at fixed positions. Calendar values are not validated, so `2024-13-45`
/// passes, and anything after the seconds is ignored.
pub fn is_timestamp_well_formed(s: &str) -> bool {
    const SKELETON: &[u8; 19] = b"dddd-dd-ddTdd:dd:dd";

    let bytes = s.as_bytes();
    if bytes.len() < SKELETON.len() {
        return false;
    }

    SKELETON
        .iter()
        .zip(bytes)
        .all(|(&expected, &actual)| match expected {
            b'd' => actual.is_ascii_digit(),
            sep => actual == sep,
        })
}
