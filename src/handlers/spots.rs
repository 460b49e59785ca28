//! Parking spot handlers

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{ApiJson, ApiPath, ApiQuery, AuthenticatedUser, OptionalUser, SpotOwnerUser};
use crate::error::ApiError;
use crate::models::{ApiResponse, Paginated, PaginationParams};
use crate::spots::{
    AvailabilityInput, CreateSpotRequest, ParkingSpot, RatingRequest, RatingSummary, SpotDetails,
    SpotQuery, SpotRemoval, SpotService, SpotWithDistance, UpdateSpotRequest,
};

pub async fn list_spots(
    State(spots): State<Arc<SpotService>>,
    _viewer: OptionalUser,
    ApiQuery(query): ApiQuery<SpotQuery>,
) -> Result<Json<ApiResponse<Paginated<ParkingSpot>>>, ApiError> {
    query.validate()?;
    Ok(Json(ApiResponse::ok(spots.list_spots(query).await?)))
}

pub async fn search_spots(
    State(spots): State<Arc<SpotService>>,
    ApiQuery(query): ApiQuery<SpotQuery>,
) -> Result<Json<ApiResponse<Vec<SpotWithDistance>>>, ApiError> {
    query.validate()?;
    Ok(Json(ApiResponse::ok(spots.search_spots(query).await?)))
}

pub async fn nearby_spots(
    State(spots): State<Arc<SpotService>>,
    ApiQuery(query): ApiQuery<SpotQuery>,
) -> Result<Json<ApiResponse<Vec<SpotWithDistance>>>, ApiError> {
    query.validate()?;
    Ok(Json(ApiResponse::ok(spots.nearby_spots(query).await?)))
}

pub async fn get_spot(
    State(spots): State<Arc<SpotService>>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<SpotDetails>>, ApiError> {
    Ok(Json(ApiResponse::ok(spots.get_spot_details(id).await?)))
}

pub async fn create_spot(
    State(spots): State<Arc<SpotService>>,
    SpotOwnerUser(owner): SpotOwnerUser,
    ApiJson(request): ApiJson<CreateSpotRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ParkingSpot>>), ApiError> {
    request.validate()?;
    let spot = spots.create_spot(&owner, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Parking spot created successfully", spot)),
    ))
}

pub async fn update_spot(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateSpotRequest>,
) -> Result<Json<ApiResponse<ParkingSpot>>, ApiError> {
    request.validate()?;
    let spot = spots.update_spot(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Parking spot updated successfully", spot)))
}

pub async fn delete_spot(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<SpotRemoval>>, ApiError> {
    let removal = spots.delete_spot(&user, id).await?;
    let message = match removal {
        SpotRemoval::Deleted => "Parking spot deleted successfully",
        SpotRemoval::Deactivated => "Parking spot deactivated, booking history retained",
    };
    Ok(Json(ApiResponse::with_message(message, removal)))
}

pub async fn my_spots(
    State(spots): State<Arc<SpotService>>,
    SpotOwnerUser(owner): SpotOwnerUser,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> Result<Json<ApiResponse<Paginated<ParkingSpot>>>, ApiError> {
    Ok(Json(ApiResponse::ok(spots.my_spots(owner.user_id, pagination).await?)))
}

pub async fn update_availability(
    State(spots): State<Arc<SpotService>>,
    SpotOwnerUser(owner): SpotOwnerUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<AvailabilityInput>,
) -> Result<Json<ApiResponse<ParkingSpot>>, ApiError> {
    request.validate()?;
    let spot = spots.update_availability(&owner, id, request).await?;
    Ok(Json(ApiResponse::with_message("Availability updated successfully", spot)))
}

pub async fn rate_spot(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RatingRequest>,
) -> Result<Json<ApiResponse<RatingSummary>>, ApiError> {
    request.validate()?;
    let summary = spots.add_rating(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Rating added successfully", summary)))
}

pub async fn add_favorite(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    spots.add_favorite(user.user_id, id).await?;
    Ok(Json(ApiResponse::message("Spot added to favorites")))
}

pub async fn remove_favorite(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    spots.remove_favorite(user.user_id, id).await?;
    Ok(Json(ApiResponse::message("Spot removed from favorites")))
}

pub async fn list_favorites(
    State(spots): State<Arc<SpotService>>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<Vec<ParkingSpot>>>, ApiError> {
    Ok(Json(ApiResponse::ok(spots.list_favorites(user.user_id).await?)))
}
