use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::bookings::{BookingResponse, BookingStatus};
use crate::models::{PageWindow, PaginationParams, UserResponse, UserRole};
use crate::payments::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_spots: i64,
    pub total_bookings: i64,
    pub total_revenue_cents: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub recent_bookings: Vec<BookingResponse>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyBookings {
    pub day: NaiveDate,
    pub total_bookings: i64,
    pub total_revenue_cents: i64,
    pub average_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: BookingStatus,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingAnalytics {
    pub daily: Vec<DailyBookings>,
    pub status_distribution: Vec<StatusCount>,
}

/// Optional created-at window for reports
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StatusTotals {
    pub status: BookingStatus,
    pub count: i64,
    pub total_amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityCount {
    pub is_available: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub bookings_by_status: Vec<StatusTotals>,
    pub spots_by_availability: Vec<AvailabilityCount>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenuePeriod {
    Day,
    #[default]
    Month,
}

impl RevenuePeriod {
    /// Field name accepted by `date_trunc`
    pub fn trunc_unit(&self) -> &'static str {
        match self {
            RevenuePeriod::Day => "day",
            RevenuePeriod::Month => "month",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAnalyticsQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub period: RevenuePeriod,
}

/// One (status, method) aggregate row
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatusMethodRow {
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub count: i64,
    pub total_amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodTotals {
    pub method: PaymentMethod,
    pub count: i64,
    pub total_amount_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub status: PaymentStatus,
    pub total_count: i64,
    pub total_amount_cents: i64,
    pub methods: Vec<MethodTotals>,
}

/// Fold per-(status, method) rows into per-status totals, keeping row order
pub fn group_by_status(rows: Vec<StatusMethodRow>) -> Vec<StatusBreakdown> {
    let mut groups: Vec<StatusBreakdown> = Vec::new();
    for row in rows {
        let method = MethodTotals {
            method: row.payment_method,
            count: row.count,
            total_amount_cents: row.total_amount_cents,
        };
        match groups.iter_mut().find(|g| g.status == row.status) {
            Some(group) => {
                group.total_count += row.count;
                group.total_amount_cents += row.total_amount_cents;
                group.methods.push(method);
            }
            None => groups.push(StatusBreakdown {
                status: row.status,
                total_count: row.count,
                total_amount_cents: row.total_amount_cents,
                methods: vec![method],
            }),
        }
    }
    groups
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint {
    pub period_start: DateTime<Utc>,
    pub revenue_cents: i64,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAnalytics {
    pub by_status: Vec<StatusBreakdown>,
    pub revenue_over_time: Vec<RevenuePoint>,
}

/// Filters for the admin user listing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Case-insensitive match on name or email
    pub search: Option<String>,
    pub role: Option<UserRole>,
}

impl UserListQuery {
    pub fn window(&self) -> PageWindow {
        PaginationParams {
            page: self.page,
            limit: self.limit,
        }
        .window()
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// A user with their latest bookings
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: UserResponse,
    pub recent_bookings: Vec<BookingResponse>,
}

/// Admin edit of an account; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdateUserRequest {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub is_verified: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectSpotRequest {
    #[validate(custom = "validate_reason")]
    pub reason: String,
}

fn validate_reason(reason: &str) -> Result<(), validator::ValidationError> {
    if reason.trim().is_empty() {
        let mut err = validator::ValidationError::new("required");
        err.message = Some("Rejection reason is required".into());
        return Err(err);
    }
    Ok(())
}
