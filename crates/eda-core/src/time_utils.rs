use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── Month arithmetic ──────────────────────────────────────────────────────────

/// Length of the average Gregorian month in seconds (30.436875 days).
pub const AVERAGE_MONTH_SECONDS: i64 = 2_629_746;

const AVERAGE_MONTH_MILLIS: i64 = AVERAGE_MONTH_SECONDS * 1_000;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Convert an elapsed duration into a whole month index.
///
/// Truncating: 60 days is month 1 (1.97 months), 29 days is month 0.
/// Non-positive durations map to month 0.
pub fn months_elapsed(elapsed: TimeDelta) -> u32 {
    let millis = elapsed.num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    u32::try_from(millis / AVERAGE_MONTH_MILLIS).unwrap_or(u32::MAX)
}

/// Elapsed duration as fractional days.
pub fn days_elapsed(elapsed: TimeDelta) -> f64 {
    elapsed.num_milliseconds() as f64 / MILLIS_PER_DAY
}

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails or the name is not a known zone.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone()
        .ok()
        .filter(|name| TimezoneHandler::validate_timezone(name))
        .unwrap_or_else(|| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Parses event timestamps into UTC instants.
///
/// Strings that carry an offset are converted directly; naive strings are
/// interpreted in the handler's timezone.
#[derive(Debug, Clone)]
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler with the given IANA timezone name as the default.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    pub fn default_tz(&self) -> Tz {
        self.default_tz
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    /// Parse an ISO 8601 / RFC 3339 timestamp string into a UTC [`DateTime`].
    ///
    /// Accepts a `Z` suffix or any fixed offset, naive date-times with a `T`
    /// or space separator (optionally with fractional seconds) and bare
    /// `YYYY-MM-DD` dates (midnight). Returns `None` for empty or
    /// unrecognised input.
    pub fn parse_timestamp(&self, raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = match s.strip_suffix('Z') {
            Some(stripped) => format!("{}+00:00", stripped),
            None => s.to_string(),
        };
        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(dt.with_timezone(&Utc));
        }

        const FMTS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
        ];
        for fmt in FMTS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return self.localize(naive);
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return self.localize(date.and_hms_opt(0, 0, 0)?);
        }

        None
    }

    /// Attach the default timezone to a naive local time. Ambiguous local
    /// times (DST fall-back) resolve to the earlier instant; non-existent
    /// ones (DST spring-forward gap) yield `None`.
    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self.default_tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
