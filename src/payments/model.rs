//! Payment ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiError, ApiResult};

/// How the driver pays for a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Paypal,
    Stripe,
    Cash,
}

impl PaymentMethod {
    /// Processor that handles this method
    pub fn provider(&self) -> PaymentProvider {
        match self {
            PaymentMethod::CreditCard | PaymentMethod::DebitCard | PaymentMethod::Stripe => {
                PaymentProvider::Stripe
            }
            PaymentMethod::Paypal => PaymentProvider::Paypal,
            PaymentMethod::Cash => PaymentProvider::Cash,
        }
    }

    /// Methods that can open a payment intent
    pub fn is_online(&self) -> bool {
        matches!(
            self,
            PaymentMethod::CreditCard | PaymentMethod::DebitCard | PaymentMethod::Paypal
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Stripe,
    Paypal,
    Square,
    Cash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Statuses that block opening another payment for the same booking
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Succeeded
        )
    }

    pub fn awaiting_charge(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "refund_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Payment row
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_provider: PaymentProvider,
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub description: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Refund row, appended to a payment and never removed
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Refund {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
    pub refund_id: String,
    pub provider_reference: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sum of settled refunds
pub fn total_refunded(refunds: &[Refund]) -> i64 {
    refunds
        .iter()
        .filter(|r| r.status == RefundStatus::Succeeded)
        .map(|r| r.amount_cents)
        .sum()
}

/// Sum of refunds still waiting on the processor
pub fn total_pending_refunds(refunds: &[Refund]) -> i64 {
    refunds
        .iter()
        .filter(|r| r.status == RefundStatus::Pending)
        .map(|r| r.amount_cents)
        .sum()
}

pub fn net_amount(amount_cents: i64, refunds: &[Refund]) -> i64 {
    amount_cents - total_refunded(refunds)
}

pub fn can_be_refunded(status: PaymentStatus, net_amount_cents: i64) -> bool {
    status == PaymentStatus::Succeeded && net_amount_cents > 0
}

/// Refund amount for a request: defaults to everything still refundable
pub fn resolve_refund_amount(requested: Option<i64>, refundable_cents: i64) -> ApiResult<i64> {
    if requested.is_none() && refundable_cents <= 0 {
        return Err(ApiError::InvalidState(
            "Payment cannot be refunded".to_string(),
        ));
    }
    let amount = requested.unwrap_or(refundable_cents);
    if amount <= 0 {
        return Err(ApiError::field(
            "amountCents",
            "Refund amount must be greater than zero",
        ));
    }
    if amount > refundable_cents {
        return Err(ApiError::BadRequest(
            "Refund amount exceeds available amount".to_string(),
        ));
    }
    Ok(amount)
}

/// Payment with its refunds and derived totals
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub payment: Payment,
    pub refunds: Vec<Refund>,
    pub total_refunded_cents: i64,
    pub net_amount_cents: i64,
}

impl PaymentResponse {
    pub fn new(payment: Payment, refunds: Vec<Refund>) -> Self {
        let total_refunded_cents = total_refunded(&refunds);
        Self {
            net_amount_cents: payment.amount_cents - total_refunded_cents,
            total_refunded_cents,
            payment,
            refunds,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    pub booking_id: Uuid,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub payment_id: Uuid,
    pub transaction_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub client_secret: Option<String>,
    pub paypal_order_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    #[serde(alias = "paymentIntentId")]
    #[validate(length(min = 1, message = "Transaction id is required"))]
    pub transaction_id: String,
    #[validate(length(min = 1, message = "Payment method id is required"))]
    pub payment_method_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefundRequest {
    #[validate(range(min = 1, message = "Refund amount must be greater than zero"))]
    pub amount_cents: Option<i64>,
    #[validate(length(min = 1, max = 500, message = "Reason must be between 1 and 500 characters"))]
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    pub refund_id: String,
    pub amount_cents: i64,
    pub status: RefundStatus,
}

impl From<&Refund> for RefundReceipt {
    fn from(refund: &Refund) -> Self {
        Self {
            refund_id: refund.refund_id.clone(),
            amount_cents: refund.amount_cents,
            status: refund.status,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentListQuery {
    pub status: Option<PaymentStatus>,
    pub payment_method: Option<PaymentMethod>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Processor callback, normalised across providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    PaymentSucceeded { transaction_id: String },
    PaymentFailed { transaction_id: String, reason: String },
    RefundSucceeded { reference: String },
    RefundFailed { reference: String },
    Unhandled(String),
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhook {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: StripeObject,
}

#[derive(Debug, Deserialize)]
pub struct StripeObject {
    pub id: String,
    pub status: Option<String>,
    pub last_payment_error: Option<StripeError>,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    pub message: Option<String>,
}

impl StripeWebhook {
    pub fn into_event(self) -> GatewayEvent {
        let object = self.data.object;
        match self.event_type.as_str() {
            "payment_intent.succeeded" => GatewayEvent::PaymentSucceeded {
                transaction_id: object.id,
            },
            "payment_intent.payment_failed" => GatewayEvent::PaymentFailed {
                transaction_id: object.id,
                reason: object
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Payment failed".to_string()),
            },
            "refund.updated" | "refund.created" => match object.status.as_deref() {
                Some("succeeded") => GatewayEvent::RefundSucceeded { reference: object.id },
                Some("failed") | Some("canceled") => GatewayEvent::RefundFailed { reference: object.id },
                _ => GatewayEvent::Unhandled(self.event_type),
            },
            _ => GatewayEvent::Unhandled(self.event_type),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PayPalWebhook {
    pub event_type: String,
    pub resource: PayPalResource,
}

#[derive(Debug, Deserialize)]
pub struct PayPalResource {
    pub id: String,
}

impl PayPalWebhook {
    pub fn into_event(self) -> GatewayEvent {
        match self.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => GatewayEvent::PaymentSucceeded {
                transaction_id: self.resource.id,
            },
            "PAYMENT.CAPTURE.DENIED" => GatewayEvent::PaymentFailed {
                transaction_id: self.resource.id,
                reason: "Payment denied by PayPal".to_string(),
            },
            "PAYMENT.CAPTURE.REFUNDED" => GatewayEvent::RefundSucceeded {
                reference: self.resource.id,
            },
            _ => GatewayEvent::Unhandled(self.event_type),
        }
    }
}
