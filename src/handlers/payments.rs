//! Payment handlers, including processor webhooks

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::{AdminUser, ApiJson, ApiPath, ApiQuery, AuthenticatedUser};
use crate::admin::{AdminService, PaymentAnalytics, PaymentAnalyticsQuery};
use crate::error::ApiError;
use crate::models::{ApiResponse, Paginated};
use crate::payments::{
    CreatePaymentIntentRequest, PayPalWebhook, PaymentIntent, PaymentListQuery, PaymentResponse,
    PaymentService, ProcessPaymentRequest, Refund, RefundReceipt, RefundRequest, StripeWebhook,
};
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// POST /api/payments/create-payment-intent
pub async fn create_payment_intent(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<CreatePaymentIntentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentIntent>>), ApiError> {
    request.validate()?;
    let intent = payments.create_payment_intent(&user, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Payment intent created successfully", intent)),
    ))
}

/// POST /api/payments/process-payment
pub async fn process_payment(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<ProcessPaymentRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    request.validate()?;
    let payment = payments.process_payment(&user, request).await?;
    Ok(Json(ApiResponse::with_message("Payment processed successfully", payment)))
}

pub async fn get_payment_by_booking(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiPath(booking_id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        payments.get_payment_by_booking(&user, booking_id).await?,
    )))
}

pub async fn list_my_payments(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> Result<Json<ApiResponse<Paginated<PaymentResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(
        payments.list_user_payments(user.user_id, query).await?,
    )))
}

pub async fn request_refund(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RefundRequest>,
) -> Result<Json<ApiResponse<RefundReceipt>>, ApiError> {
    request.validate()?;
    let receipt = payments.request_refund(&user, id, request).await?;
    Ok(Json(ApiResponse::with_message("Refund request submitted successfully", receipt)))
}

pub async fn get_refunds(
    State(payments): State<Arc<PaymentService>>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<ApiResponse<Vec<Refund>>>, ApiError> {
    Ok(Json(ApiResponse::ok(payments.get_refunds(&user, id).await?)))
}

/// GET /api/payments/admin/all
pub async fn list_all_payments(
    State(payments): State<Arc<PaymentService>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<PaymentListQuery>,
) -> Result<Json<ApiResponse<Paginated<PaymentResponse>>>, ApiError> {
    Ok(Json(ApiResponse::ok(payments.list_all_payments(query).await?)))
}

/// POST /api/payments/admin/:id/refund
pub async fn process_refund(
    State(payments): State<Arc<PaymentService>>,
    AdminUser(admin): AdminUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<RefundRequest>,
) -> Result<Json<ApiResponse<RefundReceipt>>, ApiError> {
    request.validate()?;
    let receipt = payments.process_refund(&admin, id, request).await?;
    Ok(Json(ApiResponse::with_message("Refund processed successfully", receipt)))
}

/// GET /api/payments/admin/analytics
pub async fn payment_analytics(
    State(admin): State<Arc<AdminService>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<PaymentAnalyticsQuery>,
) -> Result<Json<ApiResponse<PaymentAnalytics>>, ApiError> {
    Ok(Json(ApiResponse::ok(admin.payment_analytics(query).await?)))
}

/// Webhooks must carry the shared secret; without one configured every call is rejected
fn authenticate_webhook(app_state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    match &app_state.webhook_secret {
        Some(secret) if !secret.is_empty() => {
            let provided = headers
                .get(WEBHOOK_SECRET_HEADER)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default();

            if provided != secret {
                return Err(ApiError::Unauthorized(
                    "Unauthorized webhook request".to_string(),
                ));
            }
            Ok(())
        }
        _ => {
            tracing::error!("Webhook secret not configured - rejecting request");
            Err(ApiError::ServiceUnavailable(
                "Webhook endpoint is not configured".to_string(),
            ))
        }
    }
}

/// POST /api/payments/webhook/stripe
pub async fn stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authenticate_webhook(&app_state, &headers)?;
    let payload: StripeWebhook = serde_json::from_slice(&body)?;

    app_state
        .payment_service
        .handle_gateway_event(payload.into_event())
        .await?;

    Ok(Json(ApiResponse::message("Webhook processed")))
}

/// POST /api/payments/webhook/paypal
pub async fn paypal_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    authenticate_webhook(&app_state, &headers)?;
    let payload: PayPalWebhook = serde_json::from_slice(&body)?;

    app_state
        .payment_service
        .handle_gateway_event(payload.into_event())
        .await?;

    Ok(Json(ApiResponse::message("Webhook processed")))
}
