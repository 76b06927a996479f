//! A `time.Duration`-style string (e.g. `"1h"`, `"90s"`) used for
//! `RolloutCooldown` and the `reconcile-interval` annotation.
//!
//! CRD spec fields that hold a duration are conventionally typed as plain
//! strings in Kubernetes (`metav1.Duration` marshals the same way), so this
//! wraps a [`std::time::Duration`] with a custom (de)serializer instead of
//! exposing raw seconds.

use std::fmt;
use std::time::Duration;

/// A plain `String` newtype rather than a custom (de)serializer: CRD spec
/// fields are kept as plain strings on the wire (matching `metav1.Duration`
/// marshalling), with parsing done explicitly by callers via [`KubeDuration::parse`]
/// instead of baked into (de)serialization, so the field stays a trivial
/// `Option<String>` in the generated CRD schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KubeDuration(pub Duration);

impl KubeDuration {
    pub fn new(d: Duration) -> Self {
        Self(d)
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Parses strings of the form `"1h30m15s"` / `"500ms"` / `"45"` (seconds).
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration".into());
        }
        if let Ok(secs) = s.parse::<u64>() {
            return Ok(Self(Duration::from_secs(secs)));
        }

        let mut total = Duration::ZERO;
        let mut num = String::new();
        let mut chars = s.chars().peekable();
        let mut consumed_unit = false;
        while let Some(c) = chars.next() {
            if c.is_ascii_digit() || c == '.' {
                num.push(c);
                continue;
            }
            let mut unit = c.to_string();
            if c == 'm' && chars.peek() == Some(&'s') {
                chars.next();
                unit = "ms".to_string();
            }
            let value: f64 = num
                .parse()
                .map_err(|_| format!("invalid numeric component in duration {s:?}"))?;
            num.clear();
            let part = match unit.as_str() {
                "h" => Duration::from_secs_f64(value * 3600.0),
                "m" => Duration::from_secs_f64(value * 60.0),
                "s" => Duration::from_secs_f64(value),
                "ms" => Duration::from_secs_f64(value / 1000.0),
                other => return Err(format!("unrecognised duration unit {other:?} in {s:?}")),
            };
            total += part;
            consumed_unit = true;
        }
        if !num.is_empty() || !consumed_unit {
            return Err(format!("trailing or missing unit in duration {s:?}"));
        }
        Ok(Self(total))
    }
}

impl fmt::Display for KubeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs_f64();
        if secs >= 3600.0 && secs.fract() == 0.0 && (secs as u64) % 3600 == 0 {
            write!(f, "{}h", (secs as u64) / 3600)
        } else if secs >= 60.0 && secs.fract() == 0.0 && (secs as u64) % 60 == 0 {
            write!(f, "{}m", (secs as u64) / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compound_durations() {
        assert_eq!(KubeDuration::parse("1h").unwrap().0, Duration::from_secs(3600));
        assert_eq!(KubeDuration::parse("90s").unwrap().0, Duration::from_secs(90));
        assert_eq!(
            KubeDuration::parse("1h30m").unwrap().0,
            Duration::from_secs(5400)
        );
        assert_eq!(KubeDuration::parse("45").unwrap().0, Duration::from_secs(45));
    }

    #[test]
    fn rejects_garbage() {
        assert!(KubeDuration::parse("").is_err());
        assert!(KubeDuration::parse("1q").is_err());
    }

    #[test]
    fn roundtrips_hour_and_minute() {
        assert_eq!(KubeDuration::parse("2h").unwrap().to_string(), "2h");
        assert_eq!(KubeDuration::parse("5m").unwrap().to_string(), "5m");
    }
}
