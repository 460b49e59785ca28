//! Payment routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::payments;
use crate::state::AppState;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/payments/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/api/payments/process-payment", post(payments::process_payment))
        .route("/api/payments/booking/:id", get(payments::get_payment_by_booking))
        .route("/api/payments/user/payments", get(payments::list_my_payments))
        .route("/api/payments/:id/refund", post(payments::request_refund))
        .route("/api/payments/:id/refunds", get(payments::get_refunds))
        .route("/api/payments/admin/all", get(payments::list_all_payments))
        .route("/api/payments/admin/analytics", get(payments::payment_analytics))
        .route("/api/payments/admin/:id/refund", post(payments::process_refund))
        .route("/api/payments/webhook/stripe", post(payments::stripe_webhook))
        .route("/api/payments/webhook/paypal", post(payments::paypal_webhook))
}
