//! Time source for every timestamp the engine writes.

use std::sync::atomic::{AtomicI64, Ordering};

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// The current time as an RFC 3339 UTC string with millisecond precision.
    fn now_rfc3339(&self) -> String {
        format_timestamp(self.now())
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct FixedClock {
    unix_millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self {
            unix_millis: AtomicI64::new((at.unix_timestamp_nanos() / 1_000_000) as i64),
        }
    }

    /// Parse an RFC 3339 string; `None` if it does not parse.
    pub fn at(raw: &str) -> Option<Self> {
        parse_timestamp(raw).map(Self::new)
    }

    pub fn advance_millis(&self, millis: i64) {
        self.unix_millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        let nanos = i128::from(self.unix_millis.load(Ordering::SeqCst)) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Format as `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC.
pub fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        at.year(),
        at.month() as u8,
        at.day(),
        at.hour(),
        at.minute(),
        at.second(),
        at.millisecond()
    )
}

/// Parse any RFC 3339 timestamp.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).ok()
}

/// Milliseconds since the Unix epoch for an RFC 3339 timestamp.
pub fn timestamp_millis(raw: &str) -> Option<i64> {
    parse_timestamp(raw).map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn formats_with_millisecond_precision() {
        let at = datetime!(2026-03-04 05:06:07.089 UTC);
        assert_eq!(format_timestamp(at), "2026-03-04T05:06:07.089Z");
    }

    #[test]
    fn formats_offsets_as_utc() {
        let at = datetime!(2026-03-04 02:00:00 +02:00);
        assert_eq!(format_timestamp(at), "2026-03-04T00:00:00.000Z");
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::at("2026-01-01T00:00:00Z").unwrap();
        clock.advance_millis(2_500);
        assert_eq!(clock.now_rfc3339(), "2026-01-01T00:00:02.500Z");
    }

    #[test]
    fn unparseable_timestamps_have_no_millis() {
        assert_eq!(timestamp_millis("yesterday"), None);
        assert_eq!(timestamp_millis("1970-01-01T00:00:01Z"), Some(1_000));
    }
}
