//! Authentication HTTP handlers
//!
//! Email/password registration and login issuing stateless access tokens.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use validator::Validate;

use super::{ApiJson, AuthenticatedUser};
use crate::auth::AuthService;
use crate::error::ApiError;
use crate::models::{
    ApiResponse, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest,
    UpdateProfileRequest, UserResponse,
};

/// POST /api/auth/register
pub async fn register(
    State(auth): State<Arc<AuthService>>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), ApiError> {
    request.validate()?;
    let response = auth.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("User registered successfully", response)),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(auth): State<Arc<AuthService>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    request.validate()?;
    let response = auth.login(request).await?;

    Ok(Json(ApiResponse::with_message("Login successful", response)))
}

/// GET /api/auth/me
pub async fn me(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let profile = auth.get_user(user.user_id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// PUT /api/auth/me
pub async fn update_profile(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    request.validate()?;
    let profile = auth.update_profile(user.user_id, request).await?;
    Ok(Json(ApiResponse::with_message("Profile updated successfully", profile)))
}

/// PUT /api/auth/change-password
pub async fn change_password(
    State(auth): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    request.validate()?;
    auth.change_password(user.user_id, request).await?;
    Ok(Json(ApiResponse::message("Password changed successfully")))
}
