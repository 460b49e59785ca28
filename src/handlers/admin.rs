//! Admin dashboard handlers

use axum::{
    extract::State,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, ApiJson, ApiPath, ApiQuery};
use crate::admin::{
    AdminService, AdminUpdateUserRequest, BookingAnalytics, Dashboard, RejectSpotRequest, Report,
    ReportQuery, UserDetails, UserListQuery,
};
use crate::error::ApiError;
use crate::models::{ApiResponse, Paginated, UserResponse};
use crate::spots::ParkingSpot;

pub async fn dashboard(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<Dashboard>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.dashboard().await?)))
}

pub async fn analytics(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<BookingAnalytics>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.booking_analytics().await?)))
}

pub async fn reports(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> Result<Json<ApiResponse<Report>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.reports(query).await?)))
}

/// GET /api/admin/users
pub async fn list_users(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> Result<Json<ApiResponse<Paginated<UserResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.list_users(query).await?)))
}

pub async fn get_user(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<UserDetails>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.get_user(id).await?)))
}

pub async fn update_user(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AdminUpdateUserRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    request.validate()?;
    let user = admin.update_user(id, request).await?;
    Ok(Json(ApiResponse::with_message("User updated successfully", user)))
}

pub async fn delete_user(
    State(admin): State<Arc<AdminService>>,
    AdminUser(actor): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    admin.delete_user(&actor, id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}

/// POST /api/admin/spots/:id/approve
pub async fn approve_spot(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<ParkingSpot>>, ApiError> {
    let spot = admin.approve_spot(id).await?;
    Ok(Json(ApiResponse::with_message("Parking spot approved", spot)))
}

/// POST /api/admin/spots/:id/reject
pub async fn reject_spot(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RejectSpotRequest>,
) -> Result<Json<ApiResponse<ParkingSpot>>, ApiError> {
    request.validate()?;
    let spot = admin.reject_spot(id, &request.reason).await?;
    Ok(Json(ApiResponse::with_message("Parking spot rejected", spot)))
}
