//! Duration strings as exchanged on the `interval` topic.
//!
//! A duration is a sequence of decimal numbers, each with an optional
//! fraction and a mandatory unit suffix, such as `300ms`, `1.5h` or
//! `2h45m`. Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`.
//! A bare `0` is accepted. Formatting produces the same syntax, e.g. `1m0s`.

use std::fmt::Write;
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fraction digits beyond this are ignored; they are below nanosecond
/// precision for every supported unit.
const MAX_FRACTION_DIGITS: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration \"{0}\"")]
    Invalid(String),

    #[error("missing unit in duration \"{0}\"")]
    MissingUnit(String),

    #[error("unknown unit \"{unit}\" in duration \"{input}\"")]
    UnknownUnit { unit: String, input: String },

    #[error("duration \"{0}\" is out of range")]
    Overflow(String),

    #[error("interval must be positive, got \"{0}\"")]
    NonPositive(String),
}

fn unit_scale(unit: &str) -> Option<i128> {
    let scale = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(scale)
}

fn is_number_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// Parses a signed duration into nanoseconds.
fn parse_nanos(input: &str) -> Result<i128, DurationError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let (negative, mut rest) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if rest == "0" {
        return Ok(0);
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let overflow = || DurationError::Overflow(input.to_string());
    let mut total: i128 = 0;

    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number_char(c)).unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number_char).unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(DurationError::Invalid(input.to_string()));
        }
        if unit.is_empty() {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let scale = unit_scale(unit).ok_or_else(|| DurationError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(overflow)?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let numerator: i128 = digits
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?;
            let denominator = 10i128.pow(digits.len() as u32);
            value += numerator * scale / denominator;
        }

        total = total.checked_add(value).ok_or_else(overflow)?;
        if total > i128::from(u64::MAX) {
            return Err(overflow());
        }
    }

    Ok(if negative { -total } else { total })
}

/// Parses a report interval. Zero and negative durations are rejected.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use sysmon_common::duration::{parse_interval, DurationError};
///
/// assert_eq!(parse_interval("1h45m").unwrap(), Duration::from_secs(6300));
/// assert_eq!(parse_interval("1.5s").unwrap(), Duration::from_millis(1500));
/// assert!(matches!(parse_interval("0s"), Err(DurationError::NonPositive(_))));
/// assert!(parse_interval("soon").is_err());
/// ```
pub fn parse_interval(input: &str) -> Result<Duration, DurationError> {
    let nanos = parse_nanos(input)?;
    if nanos <= 0 {
        return Err(DurationError::NonPositive(input.trim().to_string()));
    }
    let nanos = u64::try_from(nanos).map_err(|_| DurationError::Overflow(input.to_string()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Renders `whole.rem` with `rem` zero-padded to the width of `scale` and
/// trailing zeros removed.
fn with_fraction(out: &mut String, whole: u128, rem: u128, scale: u128) {
    let _ = write!(out, "{whole}");
    if rem == 0 {
        return;
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{rem:0width$}");
    let _ = write!(out, ".{}", digits.trim_end_matches('0'));
}

/// Formats a duration in the same syntax accepted by [`parse_interval`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use sysmon_common::duration::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(60)), "1m0s");
/// assert_eq!(format_duration(Duration::from_secs(6300)), "1h45m0s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
/// assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
/// ```
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    let mut out = String::new();

    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        let _ = write!(out, "{nanos}ns");
        return out;
    }
    if nanos < NANOS_PER_MILLI {
        with_fraction(&mut out, nanos / NANOS_PER_MICRO, nanos % NANOS_PER_MICRO, NANOS_PER_MICRO);
        out.push_str("µs");
        return out;
    }
    if nanos < NANOS_PER_SEC {
        with_fraction(&mut out, nanos / NANOS_PER_MILLI, nanos % NANOS_PER_MILLI, NANOS_PER_MILLI);
        out.push_str("ms");
        return out;
    }

    let secs = d.as_secs();
    let hours = secs / 3_600;
    let minutes = (secs % 3_600) / 60;
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    with_fraction(
        &mut out,
        u128::from(secs % 60),
        u128::from(d.subsec_nanos()),
        NANOS_PER_SEC,
    );
    out.push('s');
    out
}
