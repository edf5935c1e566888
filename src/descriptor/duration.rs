//! Human-readable durations for the descriptor: `"250ms"`, `"30s"`, `"5m"`, or
//! bare seconds (`"60"` or `60`).
//!
//! Use as `#[serde(with = "crate::descriptor::duration")]`.

use std::fmt;
use std::time::Duration;

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

/// Parses a duration string.
pub fn parse(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let number = |digits: &str| -> Result<u64, String> {
        digits
            .trim()
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))
    };

    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(number(ms)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(number(secs)?))
    } else if let Some(mins) = s.strip_suffix('m') {
        number(mins)?
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration out of range: {s}"))
    } else {
        Ok(Duration::from_secs(number(s)?))
    }
}

/// Formats a duration in the shortest exact unit of the parser.
pub fn format(d: Duration) -> String {
    if d.subsec_nanos() != 0 {
        format!("{}ms", d.as_millis())
    } else if d.as_secs() != 0 && d.as_secs() % 60 == 0 {
        format!("{}m", d.as_secs() / 60)
    } else {
        format!("{}s", d.as_secs())
    }
}

pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a duration such as \"500ms\", \"30s\", \"5m\" or a number of seconds")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        parse(v).map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_secs(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_secs)
            .map_err(|_| E::custom(format!("negative duration: {v}")))
    }
}
