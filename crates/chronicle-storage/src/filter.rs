use chronicle_types::RelationshipType;
use chrono::{DateTime, Utc};

/// Predicate used by `queries::session::list`. Every field is optional and
/// `None` means "don't filter on this"; combined with `AND`.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub project: Option<String>,
    pub machine: Option<String>,
    pub agent: Option<String>,
    pub relationship_type: Option<RelationshipType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_messages: Option<u32>,
    pub max_messages: Option<u32>,
    /// Only sessions whose `COALESCE(ended_at, started_at, created_at)` is
    /// at or after this instant (§4.9's "active_since").
    pub active_since: Option<DateTime<Utc>>,
}

/// Predicate used by the `analytics` module. `timezone` governs how
/// `since`/`until` (given in UTC) are widened before the SQL range filter
/// runs, and how day buckets are computed, so that a user's local calendar
/// day is represented correctly regardless of UTC offset. `day_of_week`
/// (0 = Monday .. 6 = Sunday, matching `HourOfWeekBucket::day_of_week`) and
/// `hour_of_day` (0..23) are applied after localization, in application
/// code, since they depend on `timezone` the same way bucketing does.
#[derive(Debug, Clone)]
pub struct AnalyticsFilter {
    pub project: Option<String>,
    pub machine: Option<String>,
    pub agent: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_messages: Option<u32>,
    pub max_messages: Option<u32>,
    pub active_since: Option<DateTime<Utc>>,
    pub day_of_week: Option<Vec<u32>>,
    pub hour_of_day: Option<Vec<u32>>,
    pub timezone: chrono_tz::Tz,
}

impl Default for AnalyticsFilter {
    fn default() -> Self {
        Self {
            project: None,
            machine: None,
            agent: None,
            since: None,
            until: None,
            min_messages: None,
            max_messages: None,
            active_since: None,
            day_of_week: None,
            hour_of_day: None,
            timezone: chrono_tz::UTC,
        }
    }
}

/// The widest possible UTC offset (UTC+14 to UTC-12) is 14 hours; padding a
/// UTC range by that much on both sides guarantees it still covers the full
/// local-calendar-day range no matter which timezone a filter names, before
/// the precise per-row bucketing happens.
const MAX_UTC_OFFSET_HOURS: i64 = 14;

pub fn pad_for_timezone(since: DateTime<Utc>, until: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let pad = chrono::Duration::hours(MAX_UTC_OFFSET_HOURS);
    (since - pad, until + pad)
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total: u64,
}
