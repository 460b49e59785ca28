//! Booking handlers

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthenticatedUser, SpotOwnerUser};
use crate::admin::{AdminService, BookingAnalytics};
use crate::bookings::{
    Availability, AvailabilityQuery, BookingListQuery, BookingResponse, BookingService,
    CancelBookingRequest, CreateBookingRequest, ExtendBookingRequest, UpdateBookingRequest,
    UpdateBookingStatusRequest,
};
use crate::error::ApiError;
use crate::models::{ApiResponse, Paginated};
use crate::spots::RatingRequest;

/// GET /api/bookings/availability
pub async fn check_availability(
    State(bookings): State<Arc<BookingService>>,
    ApiQuery(query): ApiQuery<AvailabilityQuery>,
) -> Result<Json<ApiResponse<Availability>>, ApiError> {
    query.validate()?;
    Ok(Json(ApiResponse::ok(bookings.check_availability(query).await?)))
}

/// POST /api/bookings
pub async fn create_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<CreateBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), ApiError> {
    request.validate()?;
    let booking = bookings.create_booking(&user, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Booking created successfully", booking)),
    ))
}

/// GET /api/bookings
pub async fn list_my_bookings(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<BookingListQuery>,
) -> Result<Json<ApiResponse<Paginated<BookingResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        bookings.list_user_bookings(user.user_id, query).await?,
    )))
}

pub async fn get_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    Ok(Json(ApiResponse::ok(bookings.get_booking(&user, id).await?)))
}

pub async fn update_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    request.validate()?;
    let booking = bookings.update_booking(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Booking updated successfully", booking)))
}

/// DELETE /api/bookings/:id, body optional
pub async fn cancel_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    body: Option<ApiJson<CancelBookingRequest>>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let request = body.map(|ApiJson(r)| r).unwrap_or_default();
    request.validate()?;
    let booking = bookings.cancel_booking(&user, id, request.reason).await?;
    Ok(Json(ApiResponse::with_message("Booking cancelled successfully", booking)))
}

pub async fn check_in(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = bookings.check_in(&user, id).await?;
    Ok(Json(ApiResponse::with_message("Checked in successfully", booking)))
}

pub async fn check_out(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = bookings.check_out(&user, id).await?;
    Ok(Json(ApiResponse::with_message("Checked out successfully", booking)))
}

pub async fn extend_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<ExtendBookingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    request.validate()?;
    let booking = bookings.extend_booking(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Booking extended successfully", booking)))
}

pub async fn rate_booking(
    State(bookings): State<Arc<BookingService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RatingRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    request.validate()?;
    let booking = bookings.rate_booking(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Rating submitted successfully", booking)))
}

/// GET /api/bookings/spot/:id
pub async fn list_spot_bookings(
    State(bookings): State<Arc<BookingService>>,
    SpotOwnerUser(owner): SpotOwnerUser,
    ApiPath(spot_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<BookingListQuery>,
) -> Result<Json<ApiResponse<Paginated<BookingResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        bookings.list_spot_bookings(&owner, spot_id, query).await?,
    )))
}

pub async fn update_booking_status(
    State(bookings): State<Arc<BookingService>>,
    SpotOwnerUser(actor): SpotOwnerUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateBookingStatusRequest>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    request.validate()?;
    let booking = bookings.update_status(&actor, id, request).await?;
    Ok(Json(ApiResponse::with_message("Booking status updated successfully", booking)))
}

/// GET /api/bookings/admin/all
pub async fn list_all_bookings(
    State(bookings): State<Arc<BookingService>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<BookingListQuery>,
) -> Result<Json<ApiResponse<Paginated<BookingResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(bookings.list_bookings(query).await?)))
}

/// GET /api/bookings/admin/analytics
pub async fn booking_analytics(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<BookingAnalytics>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.booking_analytics().await?)))
}
