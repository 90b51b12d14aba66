//! Duration strings such as `"500ms"`, `"2s"` or `"1h30m"`

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::{MessageError, MessageResult};

fn component_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("valid duration regex")
    })
}

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        _ => 3600e9,
    }
}

/// Parse a duration made of `<number><unit>` components
///
/// Units are `ns`, `us` (`µs`), `ms`, `s`, `m` and `h`; numbers may have a
/// fraction and components may be chained (`"1m30s"`). A bare `"0"` is zero.
/// Negative durations are rejected.
pub fn parse_duration(input: &str) -> MessageResult<Duration> {
    let invalid = || MessageError::InvalidDuration(input.to_string());

    let mut rest = input.trim();
    if let Some(stripped) = rest.strip_prefix('+') {
        rest = stripped;
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let caps = component_regex().captures(rest).ok_or_else(invalid)?;
        let number: f64 = caps[1].parse().map_err(|_| invalid())?;
        total_nanos += number * unit_nanos(&caps[2]);
        rest = &rest[caps[0].len()..];
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
