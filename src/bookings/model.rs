use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::payments::PaymentMethod;
use crate::spots::VehicleType;

use super::rules::{self, BookingDuration};

/// Booking lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }

    /// Statuses that hold the spot for their time range
    pub fn occupies_slot(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Cancelled | BookingStatus::NoShow
        )
    }

    /// Allowed edges of the lifecycle graph
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Active)
                | (Confirmed, Cancelled)
                | (Confirmed, NoShow)
                | (Active, Completed)
        )
    }

    /// Still editable by the booking owner
    pub fn is_modifiable(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state mirrored from the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "booking_payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BookingPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    #[validate(length(min = 1, max = 20, message = "License plate is required"))]
    pub license_plate: String,
    #[validate(length(max = 50))]
    pub make: Option<String>,
    #[validate(length(max = 50))]
    pub model: Option<String>,
    #[validate(length(max = 30))]
    pub color: Option<String>,
    #[serde(rename = "type", default)]
    pub vehicle_type: VehicleType,
}

impl VehicleInfo {
    pub fn normalized(mut self) -> Self {
        self.license_plate = self.license_plate.trim().to_uppercase();
        self
    }
}

/// Partial vehicle update
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfoPatch {
    #[validate(length(min = 1, max = 20))]
    pub license_plate: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub vehicle_type: Option<VehicleType>,
}

impl VehicleInfoPatch {
    pub fn apply(self, mut current: VehicleInfo) -> VehicleInfo {
        if let Some(plate) = self.license_plate {
            current.license_plate = plate;
        }
        if self.make.is_some() {
            current.make = self.make;
        }
        if self.model.is_some() {
            current.model = self.model;
        }
        if self.color.is_some() {
            current.color = self.color;
        }
        if let Some(vehicle_type) = self.vehicle_type {
            current.vehicle_type = vehicle_type;
        }
        current.normalized()
    }
}

/// Booking row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub parking_spot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_amount_cents: i64,
    pub status: BookingStatus,
    pub payment_status: BookingPaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_id: Option<Uuid>,
    pub vehicle_info: Json<VehicleInfo>,
    pub booking_code: Option<String>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub rating_score: Option<i16>,
    pub rating_comment: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub refund_amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn duration(&self) -> BookingDuration {
        BookingDuration::between(self.start_time, self.end_time)
    }

    /// Time actually parked, once both check-in and check-out happened
    pub fn actual_duration(&self) -> Option<BookingDuration> {
        match (self.check_in_time, self.check_out_time) {
            (Some(check_in), Some(check_out)) => Some(BookingDuration::between(check_in, check_out)),
            _ => None,
        }
    }
}

/// Booking as returned by the API, with derived fields
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    #[serde(flatten)]
    pub booking: Booking,
    pub duration: BookingDuration,
    pub actual_duration: Option<BookingDuration>,
    pub can_be_cancelled: bool,
}

impl BookingResponse {
    pub fn at(booking: Booking, now: DateTime<Utc>) -> Self {
        Self {
            duration: booking.duration(),
            actual_duration: booking.actual_duration(),
            can_be_cancelled: rules::can_be_cancelled(booking.status, booking.start_time, now),
            booking,
        }
    }
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self::at(booking, Utc::now())
    }
}

/// Outcome of an availability check
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Availability {
    pub fn available() -> Self {
        Self {
            is_available: true,
            reason: None,
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            is_available: false,
            reason: Some(reason.to_string()),
        }
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if start >= end {
        let mut err = ValidationError::new("time_range");
        err.message = Some("End time must be after start time".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_availability_query", skip_on_field_errors = false))]
pub struct AvailabilityQuery {
    pub spot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

fn validate_availability_query(query: &AvailabilityQuery) -> Result<(), ValidationError> {
    check_range(query.start_time, query.end_time)
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_create_booking", skip_on_field_errors = false))]
pub struct CreateBookingRequest {
    pub parking_spot_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[validate]
    pub vehicle_info: VehicleInfo,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

fn validate_create_booking(request: &CreateBookingRequest) -> Result<(), ValidationError> {
    check_range(request.start_time, request.end_time)
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[validate]
    pub vehicle_info: Option<VehicleInfoPatch>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    #[validate(length(max = 200, message = "Reason cannot exceed 200 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ExtendBookingRequest {
    #[validate(range(min = 1, max = 24, message = "Additional hours must be between 1 and 24"))]
    pub additional_hours: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
    #[validate(length(max = 200, message = "Reason cannot exceed 200 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub spot_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_machine_edges() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Active));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(Active.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Active));
        assert!(!Active.can_transition_to(Cancelled));
        for terminal in [Completed, Cancelled, NoShow] {
            assert!(terminal.is_terminal());
            for next in [Pending, Confirmed, Active, Completed, Cancelled, NoShow] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_license_plate_is_normalized() {
        let info = VehicleInfo {
            license_plate: "  abc-123 ".to_string(),
            make: None,
            model: None,
            color: None,
            vehicle_type: VehicleType::Car,
        }
        .normalized();
        assert_eq!(info.license_plate, "ABC-123");

        let patched = VehicleInfoPatch {
            license_plate: Some("xyz 9".to_string()),
            color: Some("red".to_string()),
            ..Default::default()
        }
        .apply(info);
        assert_eq!(patched.license_plate, "XYZ 9");
        assert_eq!(patched.color.as_deref(), Some("red"));
    }

    #[test]
    fn test_vehicle_type_defaults_to_car() {
        let info: VehicleInfo = serde_json::from_str(r#"{"licensePlate":"AB12"}"#).unwrap();
        assert_eq!(info.vehicle_type, VehicleType::Car);
    }
}
