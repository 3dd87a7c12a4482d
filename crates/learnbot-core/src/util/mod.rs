pub mod http;
pub mod markdown;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};

/// Deployment civil time offset (UTC+5).
pub const DEPLOYMENT_OFFSET_SECS: i32 = 5 * 3600;

/// The fixed UTC+5 offset used for every stored timestamp.
pub fn deployment_offset() -> FixedOffset {
    // 5h is always within the valid ±24h range.
    FixedOffset::east_opt(DEPLOYMENT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Source of "now" for store timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the deployment offset, read at call time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&deployment_offset())
    }
}

/// Parse a store timestamp.
///
/// Accepts RFC 3339 and offset-less `timestamp` values; the latter are taken
/// to be in the deployment offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    naive.and_local_timezone(deployment_offset()).single()
}

/// Truncate a string to max length, adding suffix if truncated.
pub fn truncate_string(s: &str, max_len: usize, suffix: &str) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len.saturating_sub(suffix.len());
    // Ensure we don't split a multi-byte UTF-8 character
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], suffix)
}
