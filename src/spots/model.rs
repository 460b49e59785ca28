use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::types::Json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::{ApiError, ApiResult};

/// Amenities a spot can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "spot_feature", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SpotFeature {
    Covered,
    Security,
    EvCharging,
    HandicapAccessible,
    Valet,
    CameraSurveillance,
    Lighting,
}

impl PgHasArrayType for SpotFeature {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_spot_feature")
    }
}

impl SpotFeature {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "covered" => Some(SpotFeature::Covered),
            "security" => Some(SpotFeature::Security),
            "ev_charging" => Some(SpotFeature::EvCharging),
            "handicap_accessible" => Some(SpotFeature::HandicapAccessible),
            "valet" => Some(SpotFeature::Valet),
            "camera_surveillance" => Some(SpotFeature::CameraSurveillance),
            "lighting" => Some(SpotFeature::Lighting),
            _ => None,
        }
    }

    /// Parse a comma separated list such as `covered,ev_charging`
    pub fn parse_list(raw: &str) -> ApiResult<Vec<Self>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Self::parse(s)
                    .ok_or_else(|| ApiError::field("features", &format!("Unknown feature '{}'", s)))
            })
            .collect()
    }
}

/// Vehicle classes a spot accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vehicle_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    #[default]
    Car,
    Motorcycle,
    Bicycle,
    Truck,
    Van,
}

impl PgHasArrayType for VehicleType {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_vehicle_type")
    }
}

/// WGS84 coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate, sqlx::FromRow)]
pub struct GeoPoint {
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub longitude: f64,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub latitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Zip code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
    pub full_address: Option<String>,
}

impl Address {
    pub fn with_full_address(mut self) -> Self {
        if self.full_address.as_deref().map_or(true, |s| s.trim().is_empty()) {
            self.full_address = Some(format!(
                "{}, {}, {} {}, {}",
                self.street, self.city, self.state, self.zip_code, self.country
            ));
        }
        self
    }
}

/// Weekly opening window, `HH:MM` local clock times
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    #[validate(range(min = 0, max = 6, message = "Day of week must be between 0 and 6"))]
    pub day_of_week: u8,
    #[validate(custom = "validate_clock_time")]
    pub start_time: String,
    #[validate(custom = "validate_clock_time")]
    pub end_time: String,
}

fn validate_clock_time(value: &str) -> Result<(), ValidationError> {
    chrono::NaiveTime::parse_from_str(value, "%H:%M")
        .map(|_| ())
        .map_err(|_| {
            let mut err = ValidationError::new("clock_time");
            err.message = Some("Time must be formatted as HH:MM".into());
            err
        })
}

/// Parking spot row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ParkingSpot {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[sqlx(flatten)]
    pub location: GeoPoint,
    pub address: Json<Address>,
    pub hourly_rate_cents: i64,
    pub daily_rate_cents: Option<i64>,
    pub weekly_rate_cents: Option<i64>,
    pub currency: String,
    pub is_available: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub time_slots: Json<Vec<TimeSlot>>,
    pub features: Vec<SpotFeature>,
    pub vehicle_types: Vec<VehicleType>,
    pub rules: Option<String>,
    pub rating_average: f64,
    pub rating_count: i32,
    pub is_active: bool,
    pub total_bookings: i32,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParkingSpot {
    /// Global availability: the owner's flag and the soft-delete flag
    pub fn is_bookable(&self) -> bool {
        self.is_available && self.is_active
    }
}

/// Search hit with its distance from the query point
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SpotWithDistance {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub spot: ParkingSpot,
    pub distance_km: Option<f64>,
}

/// Completed stay shown on a spot's detail page
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentStay {
    pub booking_id: Uuid,
    pub guest_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub rating_score: Option<i16>,
    pub rating_comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotDetails {
    #[serde(flatten)]
    pub spot: ParkingSpot,
    pub recent_bookings: Vec<RecentStay>,
}

/// Running rating aggregate of a spot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average: f64,
    pub count: i32,
}

impl RatingSummary {
    /// Fold one more score into the running mean
    pub fn record(self, score: i16) -> Self {
        let count = self.count + 1;
        let average = (self.average * self.count as f64 + score as f64) / count as f64;
        Self { average, count }
    }
}

/// What happened to a spot on delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotRemoval {
    Deleted,
    /// Booking history references the spot, so it was switched off instead
    Deactivated,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PricingInput {
    #[validate(range(min = 0, message = "Hourly rate must be a positive number"))]
    pub hourly_rate_cents: i64,
    #[validate(range(min = 0, message = "Daily rate must be a positive number"))]
    pub daily_rate_cents: Option<i64>,
    #[validate(range(min = 0, message = "Weekly rate must be a positive number"))]
    pub weekly_rate_cents: Option<i64>,
    #[validate(length(equal = 3, message = "Currency must be a 3-letter code"))]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_availability_window", skip_on_field_errors = false))]
pub struct AvailabilityInput {
    pub is_available: Option<bool>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub time_slots: Option<Vec<TimeSlot>>,
}

fn validate_availability_window(input: &AvailabilityInput) -> Result<(), ValidationError> {
    if let (Some(from), Some(to)) = (input.available_from, input.available_to) {
        if from >= to {
            let mut err = ValidationError::new("availability_window");
            err.message = Some("availableFrom must be before availableTo".into());
            return Err(err);
        }
    }
    let slots_valid = input
        .time_slots
        .iter()
        .flatten()
        .all(|slot| slot.validate().is_ok());
    if !slots_valid {
        let mut err = ValidationError::new("time_slots");
        err.message = Some("Time slots need a day 0-6 and HH:MM start and end times".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSpotRequest {
    #[validate(length(min = 3, max = 100, message = "Title must be between 3 and 100 characters"))]
    pub title: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate]
    pub location: GeoPoint,
    #[validate]
    pub address: Address,
    #[validate]
    pub pricing: PricingInput,
    #[validate]
    #[serde(default)]
    pub availability: AvailabilityInput,
    #[serde(default)]
    pub features: Vec<SpotFeature>,
    #[serde(default)]
    pub vehicle_types: Vec<VehicleType>,
    #[validate(length(max = 1000, message = "Rules cannot exceed 1000 characters"))]
    pub rules: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpotRequest {
    #[validate(length(min = 3, max = 100, message = "Title must be between 3 and 100 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate]
    pub location: Option<GeoPoint>,
    #[validate]
    pub address: Option<Address>,
    #[validate]
    pub pricing: Option<PricingInput>,
    pub features: Option<Vec<SpotFeature>>,
    pub vehicle_types: Option<Vec<VehicleType>>,
    #[validate(length(max = 1000, message = "Rules cannot exceed 1000 characters"))]
    pub rules: Option<String>,
    /// Admin only
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpotSort {
    #[default]
    CreatedAt,
    HourlyRate,
    Rating,
    TotalBookings,
}

impl SpotSort {
    pub fn column(&self) -> &'static str {
        match self {
            SpotSort::CreatedAt => "created_at",
            SpotSort::HourlyRate => "hourly_rate_cents",
            SpotSort::Rating => "rating_average",
            SpotSort::TotalBookings => "total_bookings",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query string for listing, searching and nearby lookups
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_search_window", skip_on_field_errors = false))]
pub struct SpotQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(alias = "q")]
    #[validate(length(max = 200))]
    pub search: Option<String>,
    pub vehicle_type: Option<VehicleType>,
    /// Comma separated feature list, any match qualifies
    pub features: Option<String>,
    #[validate(range(min = 0))]
    pub max_hourly_rate_cents: Option<i64>,
    pub sort_by: Option<SpotSort>,
    pub sort_order: Option<SortOrder>,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    pub lat: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    pub lng: Option<f64>,
    /// Search radius in kilometres
    #[validate(range(min = 1.0, max = 50.0, message = "Radius must be between 1 and 50 km"))]
    pub radius: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

fn validate_search_window(query: &SpotQuery) -> Result<(), ValidationError> {
    match (query.start_time, query.end_time) {
        (Some(start), Some(end)) if start >= end => {
            let mut err = ValidationError::new("time_window");
            err.message = Some("startTime must be before endTime".into());
            Err(err)
        }
        (Some(_), None) | (None, Some(_)) => {
            let mut err = ValidationError::new("time_window");
            err.message = Some("startTime and endTime must be given together".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl SpotQuery {
    pub const DEFAULT_RADIUS_KM: f64 = 5.0;

    pub fn center(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                longitude,
                latitude,
            }),
            _ => None,
        }
    }

    pub fn radius_km(&self) -> f64 {
        self.radius.unwrap_or(Self::DEFAULT_RADIUS_KM)
    }

    pub fn feature_list(&self) -> ApiResult<Vec<SpotFeature>> {
        match &self.features {
            Some(raw) => SpotFeature::parse_list(raw),
            None => Ok(Vec::new()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(max = 500, message = "Comment cannot exceed 500 characters"))]
    pub comment: Option<String>,
}
