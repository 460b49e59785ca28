//! Booking and payment rule tests
//!
//! Pricing, refund policy, check-in window, rating aggregation and
//! refund limits, checked against the pure rule functions.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use parkspot_server::bookings::rules::{
    amount_for_span, can_be_cancelled, cancellation_refund, extension_amount, ranges_overlap,
    within_check_in_window,
};
use parkspot_server::bookings::BookingStatus;
use parkspot_server::error::ApiError;
use parkspot_server::payments::{
    net_amount, resolve_refund_amount, Refund, RefundStatus,
};
use parkspot_server::spots::RatingSummary;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, hour, minute, 0).unwrap()
}

// ============================================================================
// Pricing
// ============================================================================

#[test]
fn test_two_hour_booking_at_ten_dollars() {
    assert_eq!(amount_for_span(at(9, 0), at(11, 0), 1000), 2000);
}

#[test]
fn test_extension_by_two_hours_adds_twenty_dollars() {
    let original_end = at(11, 0);
    let new_end = original_end + Duration::hours(2);
    assert_eq!(new_end, at(13, 0));
    assert_eq!(2000 + extension_amount(2, 1000), 4000);
}

// ============================================================================
// Cancellation and refunds
// ============================================================================

#[test]
fn test_cancel_thirty_hours_ahead_refunds_in_full() {
    let now = at(0, 0);
    let start = now + Duration::hours(30);
    assert!(can_be_cancelled(BookingStatus::Confirmed, start, now));
    assert_eq!(cancellation_refund(2000, start, now), Some(2000));
}

#[test]
fn test_cancel_five_hours_ahead_refunds_half() {
    let now = at(0, 0);
    let start = now + Duration::hours(5);
    assert!(can_be_cancelled(BookingStatus::Confirmed, start, now));
    assert_eq!(cancellation_refund(2000, start, now), Some(1000));
}

#[test]
fn test_cancel_inside_the_last_hour_is_rejected() {
    let now = at(0, 0);
    let start = now + Duration::minutes(45);
    assert!(!can_be_cancelled(BookingStatus::Confirmed, start, now));
    assert_eq!(cancellation_refund(2000, start, now), None);

    let exactly_one_hour = now + Duration::hours(1);
    assert_eq!(cancellation_refund(2000, exactly_one_hour, now), None);
}

#[test]
fn test_exactly_twenty_four_hours_is_partial() {
    let now = at(0, 0);
    let start = now + Duration::hours(24);
    assert_eq!(cancellation_refund(2000, start, now), Some(1000));
}

#[test]
fn test_only_confirmed_bookings_are_cancellable() {
    let now = at(0, 0);
    let start = now + Duration::hours(48);
    for status in [
        BookingStatus::Pending,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::NoShow,
    ] {
        assert!(!can_be_cancelled(status, start, now), "{} should not cancel", status);
    }
}

// ============================================================================
// Check-in window and overlap
// ============================================================================

#[test]
fn test_check_in_window_is_thirty_minutes_either_side() {
    let start = at(12, 0);
    assert!(within_check_in_window(start, at(11, 30)));
    assert!(within_check_in_window(start, at(12, 0)));
    assert!(within_check_in_window(start, at(12, 30)));
    assert!(!within_check_in_window(start, at(11, 0)));
    assert!(!within_check_in_window(start, at(13, 0)));
}

#[test]
fn test_back_to_back_bookings_do_not_overlap() {
    assert!(!ranges_overlap(at(9, 0), at(11, 0), at(11, 0), at(13, 0)));
    assert!(ranges_overlap(at(9, 0), at(11, 0), at(10, 59), at(13, 0)));
    assert!(ranges_overlap(at(9, 0), at(17, 0), at(10, 0), at(11, 0)));
}

// ============================================================================
// Rating aggregation
// ============================================================================

#[test]
fn test_running_average_matches_mean() {
    let scores = [5i16, 3, 4, 1, 5, 2];
    let summary = scores.iter().fold(
        RatingSummary {
            average: 0.0,
            count: 0,
        },
        |acc, &s| acc.record(s),
    );

    let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64;
    assert_eq!(summary.count, scores.len() as i32);
    assert!((summary.average - mean).abs() < 1e-9);
}

// ============================================================================
// Refund limits
// ============================================================================

fn settled(amount_cents: i64) -> Refund {
    Refund {
        id: Uuid::new_v4(),
        payment_id: Uuid::nil(),
        amount_cents,
        reason: "partial".to_string(),
        refund_id: format!("refund_{}", Uuid::new_v4().simple()),
        provider_reference: Some("re_test".to_string()),
        status: RefundStatus::Succeeded,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn test_refund_cannot_exceed_net_amount() {
    let refunds = vec![settled(600)];
    let net = net_amount(2000, &refunds);
    assert_eq!(net, 1400);

    assert_eq!(resolve_refund_amount(None, net).unwrap(), 1400);
    assert_eq!(resolve_refund_amount(Some(1400), net).unwrap(), 1400);
    assert!(matches!(
        resolve_refund_amount(Some(1401), net),
        Err(ApiError::BadRequest(_))
    ));
}
