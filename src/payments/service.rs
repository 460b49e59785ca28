use std::collections::HashMap;

use sqlx::{postgres::PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::bookings::{Booking, BookingService, BookingStatus};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{Paginated, PaginationParams};
use crate::notifications::{Notification, Notifier};
use crate::spots::SpotService;

use super::gateway::{random_token, ChargeOutcome, PaymentGateway};
use super::model::{
    can_be_refunded, net_amount, resolve_refund_amount, total_pending_refunds,
    CreatePaymentIntentRequest, GatewayEvent, Payment, PaymentIntent, PaymentListQuery,
    PaymentProvider, PaymentResponse, PaymentStatus, ProcessPaymentRequest, Refund, RefundReceipt,
    RefundRequest, RefundStatus,
};

/// Payment ledger: intents, captures, refunds and processor callbacks
#[derive(Clone)]
pub struct PaymentService {
    db_pool: PgPool,
    gateway: PaymentGateway,
    notifier: Notifier,
    currency: String,
}

impl PaymentService {
    pub fn new(db_pool: PgPool, gateway: PaymentGateway, notifier: Notifier, currency: String) -> Self {
        Self {
            db_pool,
            gateway,
            notifier,
            currency,
        }
    }

    pub async fn create_payment_intent(
        &self,
        user: &AuthenticatedUser,
        request: CreatePaymentIntentRequest,
    ) -> ApiResult<PaymentIntent> {
        if !request.payment_method.is_online() {
            return Err(ApiError::field(
                "paymentMethod",
                "Payment method must be one of credit_card, debit_card, paypal",
            ));
        }

        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(request.booking_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        if booking.user_id != user.user_id {
            return Err(ApiError::Forbidden(
                "Unauthorized to make payment for this booking".to_string(),
            ));
        }
        if booking.status.is_terminal() {
            return Err(ApiError::InvalidState(format!(
                "Cannot pay for a {} booking",
                booking.status
            )));
        }

        let statuses: Vec<PaymentStatus> =
            sqlx::query_scalar("SELECT status FROM payments WHERE booking_id = $1")
                .bind(booking.id)
                .fetch_all(&self.db_pool)
                .await?;
        if statuses.iter().any(PaymentStatus::is_open) {
            return Err(ApiError::Conflict(
                "Payment already exists for this booking".to_string(),
            ));
        }

        let spot_title: String = sqlx::query_scalar("SELECT title FROM parking_spots WHERE id = $1")
            .bind(booking.parking_spot_id)
            .fetch_one(&self.db_pool)
            .await?;

        let provider = request.payment_method.provider();
        let handle = self
            .gateway
            .create_intent(provider, booking.total_amount_cents, &self.currency)
            .await?;

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, booking_id, user_id, amount_cents, currency, payment_method,
                payment_provider, transaction_id, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(booking.id)
        .bind(user.user_id)
        .bind(booking.total_amount_cents)
        .bind(&self.currency)
        .bind(request.payment_method)
        .bind(provider)
        .bind(&handle.transaction_id)
        .bind(format!("Payment for parking spot: {}", spot_title))
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => {
                ApiError::Conflict("Payment already exists for this booking".to_string())
            }
            other => other,
        })?;

        tracing::info!(
            payment_id = %payment.id,
            booking_id = %booking.id,
            amount_cents = payment.amount_cents,
            "Payment intent recorded"
        );

        Ok(PaymentIntent {
            payment_id: payment.id,
            paypal_order_id: (provider == PaymentProvider::Paypal).then(|| payment.transaction_id.clone()),
            transaction_id: payment.transaction_id,
            amount_cents: payment.amount_cents,
            currency: payment.currency,
            client_secret: handle.client_secret,
        })
    }

    /// Lock spot, booking and payment in that order
    async fn lock_payment_chain(
        &self,
        payment_id: Uuid,
    ) -> ApiResult<(Transaction<'static, Postgres>, Booking, Payment)> {
        let spot_id: Uuid = sqlx::query_scalar(
            "SELECT b.parking_spot_id FROM payments p JOIN bookings b ON b.id = p.booking_id WHERE p.id = $1",
        )
        .bind(payment_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

        let mut tx = self.db_pool.begin().await?;
        SpotService::lock_spot(&mut tx, spot_id).await?;

        let booking = sqlx::query_as::<_, Booking>(
            "SELECT b.* FROM bookings b JOIN payments p ON p.booking_id = b.id WHERE p.id = $1 FOR UPDATE OF b",
        )
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await?;

        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await?;

        Ok((tx, booking, payment))
    }

    async fn payment_id_for_transaction(&self, transaction_id: &str) -> ApiResult<Option<Uuid>> {
        let id = sqlx::query_scalar("SELECT id FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(id)
    }

    pub async fn process_payment(
        &self,
        user: &AuthenticatedUser,
        request: ProcessPaymentRequest,
    ) -> ApiResult<PaymentResponse> {
        let payment_id = self
            .payment_id_for_transaction(&request.transaction_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

        let (mut tx, booking, payment) = self.lock_payment_chain(payment_id).await?;

        if payment.user_id != user.user_id {
            return Err(ApiError::Forbidden(
                "Unauthorized to process this payment".to_string(),
            ));
        }
        if !payment.status.awaiting_charge() {
            return Err(ApiError::InvalidState(
                "Payment has already been processed".to_string(),
            ));
        }
        if booking.status.is_terminal() {
            return Err(ApiError::InvalidState(format!(
                "Cannot pay for a {} booking",
                booking.status
            )));
        }
        if booking.status == BookingStatus::Pending
            && BookingService::slot_taken(
                &mut tx,
                booking.parking_spot_id,
                booking.start_time,
                booking.end_time,
                Some(booking.id),
            )
            .await?
        {
            return Err(ApiError::Conflict("Time slot is already booked".to_string()));
        }

        let outcome = self
            .gateway
            .charge(payment.payment_provider, &payment.transaction_id, &request.payment_method_id)
            .await?;

        match outcome {
            ChargeOutcome::Succeeded => {
                let paid = mark_succeeded(&mut tx, &payment).await?;
                mirror_paid(&mut tx, &booking, payment.id).await?;
                tx.commit().await?;

                tracing::info!(payment_id = %paid.id, booking_id = %booking.id, "Payment succeeded");

                self.notifier.dispatch(Notification::PaymentReceipt {
                    recipient: user.email.clone(),
                    payment_id: paid.id,
                    booking_id: booking.id,
                    amount_cents: paid.amount_cents,
                    currency: paid.currency.clone(),
                });

                Ok(PaymentResponse::new(paid, Vec::new()))
            }
            ChargeOutcome::Declined(reason) => {
                mark_failed(&mut tx, payment.id, booking.id, &reason).await?;
                tx.commit().await?;

                tracing::warn!(payment_id = %payment.id, reason = %reason, "Payment declined");

                Err(ApiError::PaymentDeclined(reason))
            }
        }
    }

    async fn fetch_payment(&self, payment_id: Uuid) -> ApiResult<Payment> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(payment_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
    }

    async fn refunds_for(&self, payment_ids: &[Uuid]) -> ApiResult<HashMap<Uuid, Vec<Refund>>> {
        let refunds = sqlx::query_as::<_, Refund>(
            "SELECT * FROM payment_refunds WHERE payment_id = ANY($1) ORDER BY created_at ASC",
        )
        .bind(payment_ids)
        .fetch_all(&self.db_pool)
        .await?;

        let mut grouped: HashMap<Uuid, Vec<Refund>> = HashMap::new();
        for refund in refunds {
            grouped.entry(refund.payment_id).or_default().push(refund);
        }
        Ok(grouped)
    }

    async fn with_refunds(&self, payments: Vec<Payment>) -> ApiResult<Vec<PaymentResponse>> {
        let ids: Vec<Uuid> = payments.iter().map(|p| p.id).collect();
        let mut refunds = self.refunds_for(&ids).await?;
        Ok(payments
            .into_iter()
            .map(|p| {
                let r = refunds.remove(&p.id).unwrap_or_default();
                PaymentResponse::new(p, r)
            })
            .collect())
    }

    /// Latest payment for a booking
    pub async fn get_payment_by_booking(
        &self,
        actor: &AuthenticatedUser,
        booking_id: Uuid,
    ) -> ApiResult<PaymentResponse> {
        let payment = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE booking_id = $1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(booking_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

        if payment.user_id != actor.user_id && !actor.is_admin() {
            return Err(ApiError::Forbidden(
                "Unauthorized to view this payment".to_string(),
            ));
        }

        let mut responses = self.with_refunds(vec![payment]).await?;
        responses
            .pop()
            .ok_or_else(|| ApiError::InternalError("payment lookup returned nothing".to_string()))
    }

    pub async fn list_user_payments(
        &self,
        user_id: Uuid,
        query: PaymentListQuery,
    ) -> ApiResult<Paginated<PaymentResponse>> {
        self.list_payments(Some(user_id), query).await
    }

    pub async fn list_all_payments(&self, query: PaymentListQuery) -> ApiResult<Paginated<PaymentResponse>> {
        self.list_payments(None, query).await
    }

    async fn list_payments(
        &self,
        user_id: Option<Uuid>,
        query: PaymentListQuery,
    ) -> ApiResult<Paginated<PaymentResponse>> {
        let window = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .window();

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM payments WHERE TRUE");
        push_payment_filters(&mut count_builder, user_id, &query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM payments WHERE TRUE");
        push_payment_filters(&mut builder, user_id, &query);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(window.limit);
        builder.push(" OFFSET ");
        builder.push_bind(window.offset);

        let payments = builder
            .build_query_as::<Payment>()
            .fetch_all(&self.db_pool)
            .await?;

        let items = self.with_refunds(payments).await?;
        Ok(Paginated::new(items, window, total))
    }

    pub async fn get_refunds(&self, actor: &AuthenticatedUser, payment_id: Uuid) -> ApiResult<Vec<Refund>> {
        let payment = self.fetch_payment(payment_id).await?;
        if payment.user_id != actor.user_id && !actor.is_admin() {
            return Err(ApiError::Forbidden(
                "Unauthorized to view refunds for this payment".to_string(),
            ));
        }

        Ok(self
            .refunds_for(&[payment.id])
            .await?
            .remove(&payment.id)
            .unwrap_or_default())
    }

    pub async fn request_refund(
        &self,
        user: &AuthenticatedUser,
        payment_id: Uuid,
        request: RefundRequest,
    ) -> ApiResult<RefundReceipt> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, payment_id).await?;
        if payment.user_id != user.user_id {
            return Err(ApiError::Forbidden(
                "Unauthorized to request refund for this payment".to_string(),
            ));
        }

        let refunds = load_refunds(&mut tx, payment.id).await?;
        let net = net_amount(payment.amount_cents, &refunds);
        if !can_be_refunded(payment.status, net) {
            return Err(ApiError::InvalidState(
                "Payment cannot be refunded".to_string(),
            ));
        }

        let refundable = net - total_pending_refunds(&refunds);
        let amount_cents = resolve_refund_amount(request.amount_cents, refundable)?;

        let refund = insert_refund(&mut tx, payment.id, amount_cents, &request.reason).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            refund_id = %refund.refund_id,
            amount_cents,
            "Refund requested"
        );

        self.notifier.dispatch(Notification::RefundRequested {
            recipient: self.notifier.admin_email().to_string(),
            payment_id: payment.id,
            refund_id: refund.refund_id.clone(),
            amount_cents,
            reason: request.reason,
        });

        Ok(RefundReceipt::from(&refund))
    }

    /// Settle the oldest pending refund, or issue a new one when none is waiting
    pub async fn process_refund(
        &self,
        admin: &AuthenticatedUser,
        payment_id: Uuid,
        request: RefundRequest,
    ) -> ApiResult<RefundReceipt> {
        let mut tx = self.db_pool.begin().await?;

        let payment = lock_payment(&mut tx, payment_id).await?;
        let refunds = load_refunds(&mut tx, payment.id).await?;
        let net = net_amount(payment.amount_cents, &refunds);
        if !can_be_refunded(payment.status, net) {
            return Err(ApiError::InvalidState(
                "Payment cannot be refunded".to_string(),
            ));
        }

        let pending = refunds
            .iter()
            .find(|r| r.status == RefundStatus::Pending)
            .cloned();

        let refund = match pending {
            Some(refund) => refund,
            None => {
                let amount_cents = resolve_refund_amount(request.amount_cents, net)?;
                insert_refund(&mut tx, payment.id, amount_cents, &request.reason).await?
            }
        };

        let reference = self
            .gateway
            .refund(payment.payment_provider, &payment.transaction_id, refund.amount_cents)
            .await?;

        let settled = sqlx::query_as::<_, Refund>(
            r#"
            UPDATE payment_refunds
            SET status = 'succeeded', provider_reference = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(refund.id)
        .bind(&reference)
        .fetch_one(&mut *tx)
        .await?;

        sync_refunded_status(&mut tx, payment.id).await?;

        let recipient: String = sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
            .bind(payment.user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            refund_id = %settled.refund_id,
            amount_cents = settled.amount_cents,
            admin = %admin.user_id,
            "Refund processed"
        );

        self.notifier.dispatch(Notification::RefundProcessed {
            recipient,
            payment_id: payment.id,
            refund_id: settled.refund_id.clone(),
            amount_cents: settled.amount_cents,
        });

        Ok(RefundReceipt::from(&settled))
    }

    /// Apply a normalised processor callback
    pub async fn handle_gateway_event(&self, event: GatewayEvent) -> ApiResult<()> {
        match event {
            GatewayEvent::PaymentSucceeded { transaction_id } => {
                let Some(payment_id) = self.payment_id_for_transaction(&transaction_id).await? else {
                    tracing::warn!(transaction_id = %transaction_id, "Webhook for unknown payment");
                    return Ok(());
                };

                let (mut tx, booking, payment) = self.lock_payment_chain(payment_id).await?;
                if !payment.status.awaiting_charge() {
                    tracing::debug!(payment_id = %payment.id, status = ?payment.status, "Payment already settled");
                    return Ok(());
                }

                mark_succeeded(&mut tx, &payment).await?;

                let slot_free = !BookingService::slot_taken(
                    &mut tx,
                    booking.parking_spot_id,
                    booking.start_time,
                    booking.end_time,
                    Some(booking.id),
                )
                .await?;

                if booking.status.is_terminal() || (booking.status == BookingStatus::Pending && !slot_free) {
                    tracing::error!(
                        payment_id = %payment.id,
                        booking_id = %booking.id,
                        booking_status = %booking.status,
                        "Captured payment for a booking that cannot be confirmed, refund required"
                    );
                    sqlx::query("UPDATE bookings SET payment_status = 'paid', payment_id = $2, updated_at = NOW() WHERE id = $1")
                        .bind(booking.id)
                        .bind(payment.id)
                        .execute(&mut *tx)
                        .await?;
                } else {
                    mirror_paid(&mut tx, &booking, payment.id).await?;
                }

                tx.commit().await?;
                tracing::info!(payment_id = %payment.id, "Payment succeeded via webhook");
            }
            GatewayEvent::PaymentFailed { transaction_id, reason } => {
                let Some(payment_id) = self.payment_id_for_transaction(&transaction_id).await? else {
                    tracing::warn!(transaction_id = %transaction_id, "Webhook for unknown payment");
                    return Ok(());
                };

                let (mut tx, booking, payment) = self.lock_payment_chain(payment_id).await?;
                if !payment.status.awaiting_charge() {
                    return Ok(());
                }

                mark_failed(&mut tx, payment.id, booking.id, &reason).await?;
                tx.commit().await?;
                tracing::warn!(payment_id = %payment.id, reason = %reason, "Payment failed via webhook");
            }
            GatewayEvent::RefundSucceeded { reference } => {
                let mut tx = self.db_pool.begin().await?;
                let payment_id: Option<Uuid> = sqlx::query_scalar(
                    r#"
                    UPDATE payment_refunds
                    SET status = 'succeeded', updated_at = NOW()
                    WHERE (provider_reference = $1 OR refund_id = $1) AND status = 'pending'
                    RETURNING payment_id
                    "#,
                )
                .bind(&reference)
                .fetch_optional(&mut *tx)
                .await?;

                if let Some(payment_id) = payment_id {
                    sync_refunded_status(&mut tx, payment_id).await?;
                    tracing::info!(payment_id = %payment_id, reference = %reference, "Refund settled via webhook");
                }
                tx.commit().await?;
            }
            GatewayEvent::RefundFailed { reference } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE payment_refunds
                    SET status = 'failed', updated_at = NOW()
                    WHERE (provider_reference = $1 OR refund_id = $1) AND status = 'pending'
                    "#,
                )
                .bind(&reference)
                .execute(&self.db_pool)
                .await?;

                if updated.rows_affected() > 0 {
                    tracing::warn!(reference = %reference, "Refund failed via webhook");
                }
            }
            GatewayEvent::Unhandled(event_type) => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(())
    }
}

async fn lock_payment(conn: &mut PgConnection, payment_id: Uuid) -> ApiResult<Payment> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))
}

async fn load_refunds(conn: &mut PgConnection, payment_id: Uuid) -> ApiResult<Vec<Refund>> {
    let refunds = sqlx::query_as::<_, Refund>(
        "SELECT * FROM payment_refunds WHERE payment_id = $1 ORDER BY created_at ASC",
    )
    .bind(payment_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(refunds)
}

async fn insert_refund(
    conn: &mut PgConnection,
    payment_id: Uuid,
    amount_cents: i64,
    reason: &str,
) -> ApiResult<Refund> {
    let refund = sqlx::query_as::<_, Refund>(
        r#"
        INSERT INTO payment_refunds (id, payment_id, amount_cents, reason, refund_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(payment_id)
    .bind(amount_cents)
    .bind(reason)
    .bind(format!("refund_{}", random_token(12)))
    .fetch_one(&mut *conn)
    .await?;
    Ok(refund)
}

async fn mark_succeeded(conn: &mut PgConnection, payment: &Payment) -> ApiResult<Payment> {
    let paid = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET status = 'succeeded', paid_at = NOW(), failure_reason = NULL, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(payment.id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(paid)
}

async fn mark_failed(conn: &mut PgConnection, payment_id: Uuid, booking_id: Uuid, reason: &str) -> ApiResult<()> {
    sqlx::query("UPDATE payments SET status = 'failed', failure_reason = $2, updated_at = NOW() WHERE id = $1")
        .bind(payment_id)
        .bind(reason)
        .execute(&mut *conn)
        .await?;

    sqlx::query("UPDATE bookings SET payment_status = 'failed', updated_at = NOW() WHERE id = $1")
        .bind(booking_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Mirror a captured payment onto its booking: paid, and pending becomes confirmed
async fn mirror_paid(conn: &mut PgConnection, booking: &Booking, payment_id: Uuid) -> ApiResult<()> {
    let next_status = if booking.status == BookingStatus::Pending {
        BookingStatus::Confirmed
    } else {
        booking.status
    };

    sqlx::query(
        r#"
        UPDATE bookings
        SET payment_status = 'paid', payment_id = $2, status = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(booking.id)
    .bind(payment_id)
    .bind(next_status)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Flip the payment and its booking to refunded once nothing is left to refund
async fn sync_refunded_status(conn: &mut PgConnection, payment_id: Uuid) -> ApiResult<()> {
    let booking_id: Option<Uuid> = sqlx::query_scalar(
        r#"
        UPDATE payments p
        SET status = 'refunded', updated_at = NOW()
        WHERE p.id = $1
          AND p.status = 'succeeded'
          AND p.amount_cents <= (
              SELECT COALESCE(SUM(r.amount_cents), 0)
              FROM payment_refunds r
              WHERE r.payment_id = p.id AND r.status = 'succeeded'
          )
        RETURNING p.booking_id
        "#,
    )
    .bind(payment_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(booking_id) = booking_id {
        sqlx::query("UPDATE bookings SET payment_status = 'refunded', updated_at = NOW() WHERE id = $1")
            .bind(booking_id)
            .execute(&mut *conn)
            .await?;
        tracing::info!(payment_id = %payment_id, booking_id = %booking_id, "Payment fully refunded");
    }

    Ok(())
}

fn push_payment_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    user_id: Option<Uuid>,
    query: &PaymentListQuery,
) {
    if let Some(user_id) = user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(method) = query.payment_method {
        builder.push(" AND payment_method = ");
        builder.push_bind(method);
    }
}
