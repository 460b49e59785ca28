//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::admin::AdminService;
use crate::auth::AuthService;
use crate::bookings::BookingService;
use crate::config::Config;
use crate::notifications::Notifier;
use crate::payments::{PaymentGateway, PaymentService};
use crate::spots::SpotService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth_service: Arc<AuthService>,
    pub spot_service: Arc<SpotService>,
    pub booking_service: Arc<BookingService>,
    pub payment_service: Arc<PaymentService>,
    pub admin_service: Arc<AdminService>,
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Wire every service onto one pool
    pub fn build(db_pool: PgPool, config: &Config) -> Self {
        let notifier = Notifier::new(
            config.notification_webhook_url.clone(),
            config.admin_email.clone(),
        );

        let auth_service = Arc::new(AuthService::new(
            db_pool.clone(),
            config.jwt_secret.clone(),
            config.jwt_ttl_seconds,
        ));
        let spot_service = Arc::new(SpotService::new(
            db_pool.clone(),
            config.default_currency.clone(),
        ));
        let booking_service = Arc::new(BookingService::new(
            db_pool.clone(),
            spot_service.clone(),
            notifier.clone(),
        ));
        let payment_service = Arc::new(PaymentService::new(
            db_pool.clone(),
            PaymentGateway::new(),
            notifier,
            config.default_currency.clone(),
        ));
        let admin_service = Arc::new(AdminService::new(db_pool.clone()));

        Self {
            db_pool,
            auth_service,
            spot_service,
            booking_service,
            payment_service,
            admin_service,
            webhook_secret: config.webhook_secret.clone(),
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.db_pool.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<SpotService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.spot_service.clone()
    }
}

impl FromRef<AppState> for Arc<BookingService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.booking_service.clone()
    }
}

impl FromRef<AppState> for Arc<PaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.payment_service.clone()
    }
}

impl FromRef<AppState> for Arc<AdminService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.admin_service.clone()
    }
}
