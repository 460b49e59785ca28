use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{Paginated, PaginationParams};
use crate::notifications::{Notification, Notifier};
use crate::spots::{ParkingSpot, RatingRequest, SpotService};

use super::model::{
    Availability, AvailabilityQuery, Booking, BookingListQuery, BookingResponse, BookingStatus,
    CreateBookingRequest, ExtendBookingRequest, UpdateBookingRequest, UpdateBookingStatusRequest,
};
use super::pass::BookingPass;
use super::rules;

const DEFAULT_CANCELLATION_REASON: &str = "Cancelled by user";

/// Booking lifecycle: reservation, changes, check-in/out and rating
#[derive(Clone)]
pub struct BookingService {
    db_pool: PgPool,
    spots: Arc<SpotService>,
    notifier: Notifier,
}

impl BookingService {
    pub fn new(db_pool: PgPool, spots: Arc<SpotService>, notifier: Notifier) -> Self {
        Self {
            db_pool,
            spots,
            notifier,
        }
    }

    /// Whether a confirmed or active booking other than `exclude` overlaps `[start, end)`
    pub async fn slot_taken(
        conn: &mut PgConnection,
        spot_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> ApiResult<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bookings
                WHERE parking_spot_id = $1
                  AND status IN ('confirmed', 'active')
                  AND start_time < $3
                  AND end_time > $2
                  AND ($4::uuid IS NULL OR id <> $4)
            )
            "#,
        )
        .bind(spot_id)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_one(&mut *conn)
        .await?;

        Ok(taken)
    }

    pub async fn check_availability(&self, query: AvailabilityQuery) -> ApiResult<Availability> {
        let spot = self.spots.get_spot(query.spot_id).await?;
        if !spot.is_bookable() {
            return Ok(Availability::unavailable("Spot is not available"));
        }

        let mut conn = self.db_pool.acquire().await?;
        if Self::slot_taken(&mut conn, spot.id, query.start_time, query.end_time, None).await? {
            return Ok(Availability::unavailable("Time slot is already booked"));
        }

        Ok(Availability::available())
    }

    pub async fn create_booking(
        &self,
        user: &AuthenticatedUser,
        request: CreateBookingRequest,
    ) -> ApiResult<BookingResponse> {
        let mut tx = self.db_pool.begin().await?;

        let spot = SpotService::lock_spot(&mut tx, request.parking_spot_id).await?;
        if !spot.is_bookable() {
            return Err(ApiError::InvalidState(
                "Parking spot is not available".to_string(),
            ));
        }

        if Self::slot_taken(&mut tx, spot.id, request.start_time, request.end_time, None).await? {
            return Err(ApiError::Conflict("Time slot is already booked".to_string()));
        }

        let total_amount_cents =
            rules::amount_for_span(request.start_time, request.end_time, spot.hourly_rate_cents);

        let mut booking = sqlx::query_as::<_, Booking>(
            r#"
            INSERT INTO bookings (
                id, user_id, parking_spot_id, start_time, end_time, total_amount_cents,
                payment_method, vehicle_info, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.user_id)
        .bind(spot.id)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(total_amount_cents)
        .bind(request.payment_method)
        .bind(sqlx::types::Json(request.vehicle_info.normalized()))
        .bind(request.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            spot_id = %spot.id,
            user_id = %user.user_id,
            total_amount_cents,
            "Booking created"
        );

        booking.booking_code = self.attach_pass(&booking).await;

        self.notifier.dispatch(Notification::BookingConfirmation {
            recipient: user.email.clone(),
            booking_id: booking.id,
            spot_title: spot.title.clone(),
            start_time: booking.start_time,
            end_time: booking.end_time,
            total_amount_cents: booking.total_amount_cents,
            booking_code: booking.booking_code.clone(),
        });

        Ok(booking.into())
    }

    /// Generate and store the scannable pass; failures only cost the pass
    async fn attach_pass(&self, booking: &Booking) -> Option<String> {
        let code = match BookingPass::from(booking).encode() {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, error = %e, "Failed to encode booking pass");
                return None;
            }
        };

        match sqlx::query("UPDATE bookings SET booking_code = $1 WHERE id = $2")
            .bind(&code)
            .bind(booking.id)
            .execute(&self.db_pool)
            .await
        {
            Ok(_) => Some(code),
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, error = %e, "Failed to store booking pass");
                None
            }
        }
    }

    async fn fetch_booking(&self, booking_id: Uuid) -> ApiResult<Booking> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))
    }

    /// Lock the booking's spot, then the booking itself
    async fn lock_booking(
        &self,
        booking_id: Uuid,
    ) -> ApiResult<(Transaction<'static, Postgres>, ParkingSpot, Booking)> {
        let spot_id: Uuid = sqlx::query_scalar("SELECT parking_spot_id FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Booking not found".to_string()))?;

        let mut tx = self.db_pool.begin().await?;
        let spot = SpotService::lock_spot(&mut tx, spot_id).await?;
        let booking = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(booking_id)
            .fetch_one(&mut *tx)
            .await?;

        Ok((tx, spot, booking))
    }

    pub async fn get_booking(
        &self,
        actor: &AuthenticatedUser,
        booking_id: Uuid,
    ) -> ApiResult<BookingResponse> {
        let booking = self.fetch_booking(booking_id).await?;

        if booking.user_id != actor.user_id && !actor.is_admin() {
            let spot = self.spots.get_spot(booking.parking_spot_id).await?;
            if spot.owner_id != actor.user_id {
                return Err(ApiError::Forbidden(
                    "Not authorized to view this booking".to_string(),
                ));
            }
        }

        Ok(booking.into())
    }

    pub async fn list_user_bookings(
        &self,
        user_id: Uuid,
        query: BookingListQuery,
    ) -> ApiResult<Paginated<BookingResponse>> {
        let query = BookingListQuery {
            user_id: Some(user_id),
            spot_id: None,
            ..query
        };
        self.list_bookings(query).await
    }

    pub async fn list_spot_bookings(
        &self,
        actor: &AuthenticatedUser,
        spot_id: Uuid,
        query: BookingListQuery,
    ) -> ApiResult<Paginated<BookingResponse>> {
        let spot = self.spots.get_spot(spot_id).await?;
        if spot.owner_id != actor.user_id && !actor.is_admin() {
            return Err(ApiError::Forbidden(
                "Not authorized to view bookings for this spot".to_string(),
            ));
        }

        let query = BookingListQuery {
            spot_id: Some(spot_id),
            user_id: None,
            ..query
        };
        self.list_bookings(query).await
    }

    /// Filtered, paginated listing (newest first)
    pub async fn list_bookings(&self, query: BookingListQuery) -> ApiResult<Paginated<BookingResponse>> {
        let window = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .window();

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM bookings WHERE TRUE");
        push_booking_filters(&mut count_builder, &query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        let mut query_builder = QueryBuilder::<Postgres>::new("SELECT * FROM bookings WHERE TRUE");
        push_booking_filters(&mut query_builder, &query);
        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(window.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(window.offset);

        let bookings = query_builder
            .build_query_as::<Booking>()
            .fetch_all(&self.db_pool)
            .await?;

        let now = Utc::now();
        Ok(Paginated::new(bookings, window, total).map(|b| BookingResponse::at(b, now)))
    }

    pub async fn update_booking(
        &self,
        user: &AuthenticatedUser,
        booking_id: Uuid,
        request: UpdateBookingRequest,
    ) -> ApiResult<BookingResponse> {
        let (mut tx, spot, booking) = self.lock_booking(booking_id).await?;
        ensure_owner(user, &booking, "update")?;

        if !booking.status.is_modifiable() {
            return Err(ApiError::InvalidState(
                "Booking cannot be updated in its current status".to_string(),
            ));
        }

        let start = request.start_time.unwrap_or(booking.start_time);
        let end = request.end_time.unwrap_or(booking.end_time);
        let times_changed = start != booking.start_time || end != booking.end_time;

        let total_amount_cents = if times_changed {
            if start >= end {
                return Err(ApiError::field("endTime", "End time must be after start time"));
            }
            if Self::slot_taken(&mut tx, spot.id, start, end, Some(booking.id)).await? {
                return Err(ApiError::Conflict("Time slot is already booked".to_string()));
            }
            // Re-priced at the spot's current rate
            rules::amount_for_span(start, end, spot.hourly_rate_cents)
        } else {
            booking.total_amount_cents
        };

        let vehicle_info = match request.vehicle_info {
            Some(patch) => patch.apply(booking.vehicle_info.0.clone()),
            None => booking.vehicle_info.0.clone(),
        };

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                start_time = $2,
                end_time = $3,
                total_amount_cents = $4,
                vehicle_info = $5,
                notes = COALESCE($6, notes),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(start)
        .bind(end)
        .bind(total_amount_cents)
        .bind(sqlx::types::Json(vehicle_info))
        .bind(request.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(booking_id = %updated.id, times_changed, "Booking updated");

        Ok(updated.into())
    }

    pub async fn cancel_booking(
        &self,
        user: &AuthenticatedUser,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> ApiResult<BookingResponse> {
        let (mut tx, spot, booking) = self.lock_booking(booking_id).await?;
        ensure_owner(user, &booking, "cancel")?;

        let now = Utc::now();
        if !rules::can_be_cancelled(booking.status, booking.start_time, now) {
            return Err(ApiError::InvalidState(
                "Booking cannot be cancelled. Only confirmed bookings more than 1 hour before start can be cancelled."
                    .to_string(),
            ));
        }

        let refund_amount_cents =
            rules::cancellation_refund(booking.total_amount_cents, booking.start_time, now)
                .ok_or_else(|| {
                    ApiError::InvalidState("Booking is too close to its start time".to_string())
                })?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCELLATION_REASON.to_string());

        let cancelled = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                status = 'cancelled',
                refund_amount_cents = $2,
                cancellation_reason = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(refund_amount_cents)
        .bind(&reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(booking_id = %cancelled.id, refund_amount_cents, "Booking cancelled");

        self.notifier.dispatch(Notification::BookingCancellation {
            recipient: user.email.clone(),
            booking_id: cancelled.id,
            spot_title: spot.title,
            refund_amount_cents,
            reason,
        });

        Ok(cancelled.into())
    }

    pub async fn check_in(&self, user: &AuthenticatedUser, booking_id: Uuid) -> ApiResult<BookingResponse> {
        let (mut tx, _spot, booking) = self.lock_booking(booking_id).await?;
        ensure_owner(user, &booking, "check in to")?;

        if booking.status != BookingStatus::Confirmed {
            return Err(ApiError::InvalidState(
                "Booking must be confirmed to check in".to_string(),
            ));
        }

        let now = Utc::now();
        if !rules::within_check_in_window(booking.start_time, now) {
            return Err(ApiError::InvalidState(format!(
                "Check-in is only allowed within {} minutes of the booking start time",
                rules::CHECK_IN_WINDOW_MINUTES
            )));
        }

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = 'active', check_in_time = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(booking.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(booking_id = %updated.id, "Checked in");

        Ok(updated.into())
    }

    pub async fn check_out(&self, user: &AuthenticatedUser, booking_id: Uuid) -> ApiResult<BookingResponse> {
        let (mut tx, spot, booking) = self.lock_booking(booking_id).await?;
        ensure_owner(user, &booking, "check out of")?;

        if booking.status != BookingStatus::Active {
            return Err(ApiError::InvalidState(
                "Booking must be active to check out".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET status = 'completed', check_out_time = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(booking.id)
        .fetch_one(&mut *tx)
        .await?;

        SpotService::increment_total_bookings(&mut tx, spot.id).await?;

        tx.commit().await?;

        tracing::info!(booking_id = %updated.id, spot_id = %spot.id, "Checked out");

        Ok(updated.into())
    }

    pub async fn extend_booking(
        &self,
        user: &AuthenticatedUser,
        booking_id: Uuid,
        request: ExtendBookingRequest,
    ) -> ApiResult<BookingResponse> {
        if !rules::valid_extension(request.additional_hours) {
            return Err(ApiError::field(
                "additionalHours",
                "Additional hours must be between 1 and 24",
            ));
        }

        let (mut tx, spot, booking) = self.lock_booking(booking_id).await?;
        ensure_owner(user, &booking, "extend")?;

        if booking.status != BookingStatus::Active {
            return Err(ApiError::InvalidState(
                "Only active bookings can be extended".to_string(),
            ));
        }

        let new_end = booking.end_time + Duration::hours(request.additional_hours);

        // Only the added window can collide
        if Self::slot_taken(&mut tx, spot.id, booking.end_time, new_end, Some(booking.id)).await? {
            return Err(ApiError::Conflict(
                "Cannot extend booking due to conflicting reservation".to_string(),
            ));
        }

        let additional_cents = rules::extension_amount(request.additional_hours, spot.hourly_rate_cents);

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                end_time = $2,
                total_amount_cents = total_amount_cents + $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(new_end)
        .bind(additional_cents)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %updated.id,
            additional_hours = request.additional_hours,
            additional_cents,
            "Booking extended"
        );

        Ok(updated.into())
    }

    pub async fn rate_booking(
        &self,
        user: &AuthenticatedUser,
        booking_id: Uuid,
        request: RatingRequest,
    ) -> ApiResult<BookingResponse> {
        let booking = self.fetch_booking(booking_id).await?;
        ensure_owner(user, &booking, "rate")?;

        if booking.status != BookingStatus::Completed {
            return Err(ApiError::InvalidState(
                "Can only rate completed bookings".to_string(),
            ));
        }
        if booking.rating_score.is_some() {
            return Err(ApiError::InvalidState(
                "Booking has already been rated".to_string(),
            ));
        }

        self.spots
            .record_rating(
                booking.parking_spot_id,
                booking.id,
                request.rating,
                request.comment,
            )
            .await?;

        Ok(self.fetch_booking(booking_id).await?.into())
    }

    /// Status changes by the spot owner or an admin
    pub async fn update_status(
        &self,
        actor: &AuthenticatedUser,
        booking_id: Uuid,
        request: UpdateBookingStatusRequest,
    ) -> ApiResult<BookingResponse> {
        let target = request.status;
        if !matches!(
            target,
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::NoShow
        ) {
            return Err(ApiError::field(
                "status",
                "Status must be one of confirmed, cancelled, no_show",
            ));
        }

        let (mut tx, spot, booking) = self.lock_booking(booking_id).await?;

        if spot.owner_id != actor.user_id && !actor.is_admin() {
            return Err(ApiError::Forbidden(
                "Not authorized to update this booking".to_string(),
            ));
        }

        if !booking.status.can_transition_to(target) {
            return Err(ApiError::InvalidState(format!(
                "Cannot change booking status from {} to {}",
                booking.status, target
            )));
        }

        if target.occupies_slot()
            && Self::slot_taken(&mut tx, spot.id, booking.start_time, booking.end_time, Some(booking.id))
                .await?
        {
            return Err(ApiError::Conflict("Time slot is already booked".to_string()));
        }

        let reason = (target == BookingStatus::Cancelled).then(|| {
            request
                .reason
                .unwrap_or_else(|| "Cancelled by spot owner".to_string())
        });

        let updated = sqlx::query_as::<_, Booking>(
            r#"
            UPDATE bookings SET
                status = $2,
                cancellation_reason = COALESCE($3, cancellation_reason),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(booking.id)
        .bind(target)
        .bind(reason)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            booking_id = %updated.id,
            from = %booking.status,
            to = %target,
            actor = %actor.user_id,
            "Booking status changed"
        );

        Ok(updated.into())
    }
}

fn ensure_owner(user: &AuthenticatedUser, booking: &Booking, action: &str) -> ApiResult<()> {
    if booking.user_id == user.user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Not authorized to {} this booking",
            action
        )))
    }
}

fn push_booking_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &BookingListQuery) {
    if let Some(user_id) = query.user_id {
        builder.push(" AND user_id = ");
        builder.push_bind(user_id);
    }
    if let Some(spot_id) = query.spot_id {
        builder.push(" AND parking_spot_id = ");
        builder.push_bind(spot_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}
