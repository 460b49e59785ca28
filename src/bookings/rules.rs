//! Booking business rules
//!
//! Pure functions over times and amounts. Every service path that prices,
//! cancels, checks in or detects conflicts goes through here, and the SQL
//! overlap predicate mirrors [`ranges_overlap`].

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::model::BookingStatus;

/// Check-in is accepted this many minutes either side of the start time
pub const CHECK_IN_WINDOW_MINUTES: i64 = 30;

/// Bookings starting within this many hours can no longer be cancelled
pub const CANCELLATION_CUTOFF_HOURS: i64 = 1;

/// Cancelling more than this many hours ahead refunds the full amount
pub const FULL_REFUND_HOURS: i64 = 24;

/// Refund share between the cutoff and the full-refund horizon
pub const PARTIAL_REFUND_PERCENT: i64 = 50;

pub const MIN_EXTENSION_HOURS: i64 = 1;
pub const MAX_EXTENSION_HOURS: i64 = 24;

const MILLIS_PER_HOUR: i128 = 3_600_000;

/// Half-open interval overlap: `[a_start, a_end)` meets `[b_start, b_end)`
pub fn ranges_overlap(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && a_end > b_start
}

/// Integer division of a non-negative numerator, rounding half up
fn div_round(numerator: i128, denominator: i128) -> i128 {
    (numerator + denominator / 2) / denominator
}

/// Price of a stay: fractional hours times the hourly rate, rounded to the cent
pub fn amount_for_span(start: DateTime<Utc>, end: DateTime<Utc>, hourly_rate_cents: i64) -> i64 {
    let millis = (end - start).num_milliseconds().max(0) as i128;
    let cents = div_round(millis * hourly_rate_cents.max(0) as i128, MILLIS_PER_HOUR);
    i64::try_from(cents).unwrap_or(i64::MAX)
}

/// Price of extending by whole hours at the given rate
pub fn extension_amount(additional_hours: i64, hourly_rate_cents: i64) -> i64 {
    additional_hours.saturating_mul(hourly_rate_cents)
}

pub fn percent_of(amount_cents: i64, percent: i64) -> i64 {
    let cents = div_round(amount_cents.max(0) as i128 * percent as i128, 100);
    i64::try_from(cents).unwrap_or(i64::MAX)
}

/// Whether the owner may still cancel
pub fn can_be_cancelled(status: BookingStatus, start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    status == BookingStatus::Confirmed && start - now > Duration::hours(CANCELLATION_CUTOFF_HOURS)
}

/// Refund owed when cancelling at `now`, or `None` inside the cutoff
pub fn cancellation_refund(total_cents: i64, start: DateTime<Utc>, now: DateTime<Utc>) -> Option<i64> {
    let until_start = start - now;
    if until_start <= Duration::hours(CANCELLATION_CUTOFF_HOURS) {
        None
    } else if until_start > Duration::hours(FULL_REFUND_HOURS) {
        Some(total_cents)
    } else {
        Some(percent_of(total_cents, PARTIAL_REFUND_PERCENT))
    }
}

pub fn within_check_in_window(start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let window = Duration::minutes(CHECK_IN_WINDOW_MINUTES);
    let offset = now - start;
    offset <= window && offset >= -window
}

pub fn valid_extension(additional_hours: i64) -> bool {
    (MIN_EXTENSION_HOURS..=MAX_EXTENSION_HOURS).contains(&additional_hours)
}

/// Whole hours and remaining minutes of a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingDuration {
    pub hours: i64,
    pub minutes: i64,
}

impl BookingDuration {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let total_minutes = (end - start).num_minutes().max(0);
        Self {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_overlap_is_half_open() {
        assert!(ranges_overlap(at(9, 0), at(11, 0), at(10, 0), at(12, 0)));
        assert!(ranges_overlap(at(9, 0), at(11, 0), at(9, 30), at(10, 0)));
        assert!(!ranges_overlap(at(9, 0), at(11, 0), at(11, 0), at(12, 0)));
        assert!(!ranges_overlap(at(11, 0), at(12, 0), at(9, 0), at(11, 0)));
    }

    #[test]
    fn test_amount_uses_fractional_hours() {
        assert_eq!(amount_for_span(at(9, 0), at(11, 0), 1000), 2000);
        assert_eq!(amount_for_span(at(9, 0), at(9, 30), 1000), 500);
        // 20 minutes at $10/h is 333.33 cents
        assert_eq!(amount_for_span(at(9, 0), at(9, 20), 1000), 333);
        // 10 minutes at $0.09/h is 1.5 cents, rounded half up
        assert_eq!(amount_for_span(at(9, 0), at(9, 10), 9), 2);
        assert_eq!(amount_for_span(at(11, 0), at(9, 0), 1000), 0);
    }

    #[test]
    fn test_percent_of_rounds_half_up() {
        assert_eq!(percent_of(2000, 50), 1000);
        assert_eq!(percent_of(333, 50), 167);
        assert_eq!(percent_of(0, 50), 0);
    }

    #[test]
    fn test_duration_breakdown() {
        assert_eq!(
            BookingDuration::between(at(9, 0), at(11, 45)),
            BookingDuration {
                hours: 2,
                minutes: 45
            }
        );
    }

    #[test]
    fn test_extension_bounds() {
        assert!(!valid_extension(0));
        assert!(valid_extension(1));
        assert!(valid_extension(24));
        assert!(!valid_extension(25));
        assert_eq!(extension_amount(2, 1000), 2000);
    }

    #[test]
    fn test_check_in_window_edges() {
        let start = at(10, 0);
        assert!(within_check_in_window(start, at(9, 30)));
        assert!(within_check_in_window(start, at(10, 30)));
        assert!(!within_check_in_window(start, at(9, 29)));
        assert!(!within_check_in_window(start, at(10, 31)));
    }
}
