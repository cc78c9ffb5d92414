//! HTTP server timeouts derived from the query timeout

use std::time::Duration;

use crate::error::{CoreError, Result};

/// Upper bound for the idle timeout
pub const DEFAULT_HTTP_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra write time granted on top of the query timeout
pub const QUERY_WRITE_GRACE: Duration = Duration::from_secs(60);

/// Longest query timeout accepted on a stack
pub const MAX_QUERY_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// HTTP server timeouts shared by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub idle: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl HttpTimeouts {
    /// `idle = min(30s, query)`, `read = query / 10`, `write = query + 1m`
    pub fn from_query_timeout(query_timeout: Duration) -> Self {
        Self {
            idle: DEFAULT_HTTP_IDLE_TIMEOUT.min(query_timeout),
            read: query_timeout / 10,
            write: query_timeout.saturating_add(QUERY_WRITE_GRACE),
        }
    }
}

/// Parse a duration string (e.g., "30s", "5m", "1h", "500ms", "1m30s")
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let num: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let (unit, remaining) = if let Some(stripped) = rest.strip_prefix("ms") {
            ("ms", stripped)
        } else if let Some(stripped) = rest.strip_prefix('s') {
            ("s", stripped)
        } else if let Some(stripped) = rest.strip_prefix('m') {
            ("m", stripped)
        } else if let Some(stripped) = rest.strip_prefix('h') {
            ("h", stripped)
        } else if rest.is_empty() && total.is_zero() {
            // Bare number means seconds
            ("s", rest)
        } else {
            return None;
        };
        rest = remaining;

        let part = match unit {
            "ms" => Duration::from_millis(num),
            "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num.checked_mul(60)?),
            "h" => Duration::from_secs(num.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
    }

    Some(total)
}

/// Parse the query timeout limit, rejecting zero, unparsable and
/// out-of-range values
pub fn parse_query_timeout(value: &str) -> Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() && d <= MAX_QUERY_TIMEOUT => Ok(d),
        _ => Err(CoreError::InvalidDuration {
            field: "limits.global.queries.queryTimeout".to_string(),
            value: value.to_string(),
        }),
    }
}

/// Render a duration the way Loki's flag parser accepts it
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        return format!("{}ms", millis);
    }
    let secs = duration.as_secs();
    if secs % 3600 == 0 && secs > 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 && secs > 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("3x"), None);
        assert_eq!(parse_duration("m"), None);
    }

    #[test]
    fn test_default_query_timeout() {
        let timeouts = HttpTimeouts::from_query_timeout(Duration::from_secs(180));
        assert_eq!(timeouts.idle, Duration::from_secs(30));
        assert_eq!(timeouts.read, Duration::from_secs(18));
        assert_eq!(timeouts.write, Duration::from_secs(240));
    }

    #[test]
    fn test_short_query_timeout_caps_idle() {
        let timeouts = HttpTimeouts::from_query_timeout(Duration::from_secs(10));
        assert_eq!(timeouts.idle, Duration::from_secs(10));
        assert_eq!(timeouts.read, Duration::from_secs(1));
    }

    #[test]
    fn test_parse_query_timeout_rejects_zero() {
        assert!(parse_query_timeout("0s").is_err());
        assert!(parse_query_timeout("soon").is_err());
        assert_eq!(parse_query_timeout("3m").unwrap(), Duration::from_secs(180));
    }

    #[test]
    fn test_parse_duration_overflow() {
        assert_eq!(parse_duration("18446744073709551615s"), Some(Duration::from_secs(u64::MAX)));
        assert_eq!(parse_duration("18446744073709551615m"), None);
        assert_eq!(parse_duration("18446744073709551615h"), None);
        assert_eq!(parse_duration("18446744073709551615s1s"), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
    }

    #[test]
    fn test_parse_query_timeout_upper_bound() {
        assert_eq!(parse_query_timeout("24h").unwrap(), MAX_QUERY_TIMEOUT);
        assert!(parse_query_timeout("25h").is_err());
        assert!(parse_query_timeout("18446744073709551615s").is_err());
    }

    #[test]
    fn test_huge_query_timeout_saturates() {
        let timeouts = HttpTimeouts::from_query_timeout(Duration::MAX);
        assert_eq!(timeouts.write, Duration::MAX);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(240)), "4m");
        assert_eq!(format_duration(Duration::from_secs(18)), "18s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1500ms");
        assert_eq!(format_duration(Duration::from_secs(7200)), "2h");
    }
}
