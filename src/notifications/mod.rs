//! Outbound notifications
//!
//! Notifications are dispatched on a spawned task after the triggering write
//! has committed. Delivery problems are logged and never reach the caller.

use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    BookingConfirmation {
        recipient: String,
        booking_id: Uuid,
        spot_title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        total_amount_cents: i64,
        booking_code: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BookingCancellation {
        recipient: String,
        booking_id: Uuid,
        spot_title: String,
        refund_amount_cents: i64,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    PaymentReceipt {
        recipient: String,
        payment_id: Uuid,
        booking_id: Uuid,
        amount_cents: i64,
        currency: String,
    },
    #[serde(rename_all = "camelCase")]
    RefundRequested {
        recipient: String,
        payment_id: Uuid,
        refund_id: String,
        amount_cents: i64,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    RefundProcessed {
        recipient: String,
        payment_id: Uuid,
        refund_id: String,
        amount_cents: i64,
    },
}

impl Notification {
    pub fn subject(&self) -> &'static str {
        match self {
            Notification::BookingConfirmation { .. } => "Booking Confirmation",
            Notification::BookingCancellation { .. } => "Booking Cancelled",
            Notification::PaymentReceipt { .. } => "Payment Receipt",
            Notification::RefundRequested { .. } => "Refund Request",
            Notification::RefundProcessed { .. } => "Refund Processed",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            Notification::BookingConfirmation { recipient, .. }
            | Notification::BookingCancellation { recipient, .. }
            | Notification::PaymentReceipt { recipient, .. }
            | Notification::RefundRequested { recipient, .. }
            | Notification::RefundProcessed { recipient, .. } => recipient,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    subject: &'static str,
    sent_at: DateTime<Utc>,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// Fire-and-forget notification sender
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    endpoint: Option<String>,
    admin_email: String,
}

impl Notifier {
    pub fn new(endpoint: Option<String>, admin_email: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            admin_email,
        }
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Queue a notification on a background task
    pub fn dispatch(&self, notification: Notification) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&notification).await {
                tracing::warn!(
                    error = %format!("{:#}", e),
                    subject = notification.subject(),
                    recipient = notification.recipient(),
                    "Notification delivery failed"
                );
            }
        });
    }

    pub async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let Some(endpoint) = &self.endpoint else {
            tracing::info!(
                subject = notification.subject(),
                recipient = notification.recipient(),
                "Notification endpoint not configured, skipping delivery"
            );
            return Ok(());
        };

        let envelope = Envelope {
            subject: notification.subject(),
            sent_at: Utc::now(),
            notification,
        };

        self.client
            .post(endpoint)
            .timeout(Duration::from_secs(5))
            .json(&envelope)
            .send()
            .await
            .context("sending notification")?
            .error_for_status()
            .context("notification endpoint rejected the request")?;

        tracing::debug!(
            subject = notification.subject(),
            recipient = notification.recipient(),
            "Notification delivered"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let notification = Notification::RefundRequested {
            recipient: "admin@example.com".to_string(),
            payment_id: Uuid::nil(),
            refund_id: "re_123".to_string(),
            amount_cents: 1500,
            reason: "Spot was blocked".to_string(),
        };
        let envelope = Envelope {
            subject: notification.subject(),
            sent_at: Utc::now(),
            notification: &notification,
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "refund_requested");
        assert_eq!(value["subject"], "Refund Request");
        assert_eq!(value["amountCents"], 1500);
        assert_eq!(value["recipient"], "admin@example.com");
    }

    #[tokio::test]
    async fn test_delivery_without_endpoint_is_a_noop() {
        let notifier = Notifier::new(None, "admin@example.com".to_string());
        let notification = Notification::PaymentReceipt {
            recipient: "driver@example.com".to_string(),
            payment_id: Uuid::new_v4(),
            booking_id: Uuid::new_v4(),
            amount_cents: 2000,
            currency: "USD".to_string(),
        };
        assert!(notifier.deliver(&notification).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_error() {
        let notifier = Notifier::new(
            Some("http://127.0.0.1:9/notify".to_string()),
            "admin@example.com".to_string(),
        );
        let notification = Notification::RefundProcessed {
            recipient: "driver@example.com".to_string(),
            payment_id: Uuid::new_v4(),
            refund_id: "re_1".to_string(),
            amount_cents: 100,
        };
        assert!(notifier.deliver(&notification).await.is_err());
    }
}
