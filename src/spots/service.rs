use chrono::{Duration, Utc};
use sqlx::{postgres::PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{PageWindow, Paginated, PaginationParams};

use super::geo::{BoundingBox, EARTH_RADIUS_KM};
use super::model::{
    AvailabilityInput, CreateSpotRequest, GeoPoint, ParkingSpot, RatingSummary, RecentStay,
    SpotDetails, SpotQuery, RatingRequest, SpotRemoval, SpotWithDistance, UpdateSpotRequest,
    VehicleType,
};

/// Maximum hits returned by proximity search
pub const SEARCH_RESULT_LIMIT: i64 = 50;

/// Listing, search and rating aggregation for parking spots
#[derive(Clone)]
pub struct SpotService {
    db_pool: PgPool,
    default_currency: String,
}

impl SpotService {
    pub fn new(db_pool: PgPool, default_currency: String) -> Self {
        Self {
            db_pool,
            default_currency,
        }
    }

    pub async fn create_spot(
        &self,
        owner: &AuthenticatedUser,
        request: CreateSpotRequest,
    ) -> ApiResult<ParkingSpot> {
        let now = Utc::now();
        let availability = request.availability;
        let vehicle_types = if request.vehicle_types.is_empty() {
            vec![VehicleType::Car]
        } else {
            request.vehicle_types
        };
        let currency = request
            .pricing
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| self.default_currency.clone());

        let spot = sqlx::query_as::<_, ParkingSpot>(
            r#"
            INSERT INTO parking_spots (
                id, owner_id, title, description, longitude, latitude, address,
                hourly_rate_cents, daily_rate_cents, weekly_rate_cents, currency,
                is_available, available_from, available_to, time_slots,
                features, vehicle_types, rules
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner.user_id)
        .bind(request.title.trim())
        .bind(request.description)
        .bind(request.location.longitude)
        .bind(request.location.latitude)
        .bind(sqlx::types::Json(request.address.with_full_address()))
        .bind(request.pricing.hourly_rate_cents)
        .bind(request.pricing.daily_rate_cents)
        .bind(request.pricing.weekly_rate_cents)
        .bind(currency)
        .bind(availability.is_available.unwrap_or(true))
        .bind(availability.available_from.unwrap_or(now))
        .bind(availability.available_to.unwrap_or(now + Duration::days(365)))
        .bind(sqlx::types::Json(availability.time_slots.unwrap_or_default()))
        .bind(request.features)
        .bind(vehicle_types)
        .bind(request.rules)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(spot_id = %spot.id, owner_id = %owner.user_id, "Parking spot created");

        Ok(spot)
    }

    pub async fn get_spot(&self, spot_id: Uuid) -> ApiResult<ParkingSpot> {
        sqlx::query_as::<_, ParkingSpot>("SELECT * FROM parking_spots WHERE id = $1")
            .bind(spot_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Parking spot not found".to_string()))
    }

    /// Spot with its five most recent completed stays
    pub async fn get_spot_details(&self, spot_id: Uuid) -> ApiResult<SpotDetails> {
        let spot = self.get_spot(spot_id).await?;

        let recent_bookings = sqlx::query_as::<_, RecentStay>(
            r#"
            SELECT b.id AS booking_id, u.name AS guest_name, b.start_time, b.end_time,
                   b.rating_score, b.rating_comment
            FROM bookings b
            JOIN users u ON u.id = b.user_id
            WHERE b.parking_spot_id = $1 AND b.status = 'completed'
            ORDER BY b.end_time DESC
            LIMIT 5
            "#,
        )
        .bind(spot_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(SpotDetails {
            spot,
            recent_bookings,
        })
    }

    /// Attribute and free-text listing of bookable spots
    pub async fn list_spots(&self, query: SpotQuery) -> ApiResult<Paginated<ParkingSpot>> {
        let window = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .window();
        let features = query.feature_list()?;

        let mut count_builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM parking_spots WHERE is_active AND is_available");
        push_attribute_filters(&mut count_builder, &query, &features);

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        let mut query_builder =
            QueryBuilder::<Postgres>::new("SELECT * FROM parking_spots WHERE is_active AND is_available");
        push_attribute_filters(&mut query_builder, &query, &features);
        push_sort(&mut query_builder, &query);
        push_window(&mut query_builder, window);

        let spots = query_builder
            .build_query_as::<ParkingSpot>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(Paginated::new(spots, window, total))
    }

    /// Proximity and attribute search, optionally excluding spots booked in a time range
    pub async fn search_spots(&self, query: SpotQuery) -> ApiResult<Vec<SpotWithDistance>> {
        let features = query.feature_list()?;
        let center = query.center();

        let mut builder = QueryBuilder::<Postgres>::new("SELECT *, ");
        match center {
            Some(point) => push_distance(&mut builder, point),
            None => {
                builder.push("NULL::float8");
            }
        }
        builder.push(" AS distance_km FROM parking_spots WHERE is_active AND is_available");

        push_attribute_filters(&mut builder, &query, &features);
        if let Some(point) = center {
            push_radius(&mut builder, point, query.radius_km());
        }

        if let (Some(start), Some(end)) = (query.start_time, query.end_time) {
            builder.push(
                " AND NOT EXISTS (SELECT 1 FROM bookings b WHERE b.parking_spot_id = parking_spots.id \
                 AND b.status IN ('confirmed', 'active') AND b.start_time < ",
            );
            builder.push_bind(end);
            builder.push(" AND b.end_time > ");
            builder.push_bind(start);
            builder.push(")");
        }

        if center.is_some() {
            builder.push(" ORDER BY distance_km ASC");
        } else {
            push_sort(&mut builder, &query);
        }

        let limit = query.limit.unwrap_or(SEARCH_RESULT_LIMIT).clamp(1, SEARCH_RESULT_LIMIT);
        builder.push(" LIMIT ");
        builder.push_bind(limit);

        let hits = builder
            .build_query_as::<SpotWithDistance>()
            .fetch_all(&self.db_pool)
            .await?;

        tracing::debug!(results = hits.len(), "Spot search completed");

        Ok(hits)
    }

    /// Closest bookable spots to a point
    pub async fn nearby_spots(&self, query: SpotQuery) -> ApiResult<Vec<SpotWithDistance>> {
        let center = query
            .center()
            .ok_or_else(|| ApiError::field("lat", "Latitude and longitude are required"))?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT *, ");
        push_distance(&mut builder, center);
        builder.push(" AS distance_km FROM parking_spots WHERE is_active AND is_available");
        push_radius(&mut builder, center, query.radius_km());
        builder.push(" ORDER BY distance_km ASC LIMIT ");
        builder.push_bind(query.limit.unwrap_or(10).clamp(1, SEARCH_RESULT_LIMIT));

        Ok(builder
            .build_query_as::<SpotWithDistance>()
            .fetch_all(&self.db_pool)
            .await?)
    }

    pub async fn my_spots(
        &self,
        owner_id: Uuid,
        pagination: PaginationParams,
    ) -> ApiResult<Paginated<ParkingSpot>> {
        let window = pagination.window();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parking_spots WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(&self.db_pool)
            .await?;

        let spots = sqlx::query_as::<_, ParkingSpot>(
            "SELECT * FROM parking_spots WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(owner_id)
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Paginated::new(spots, window, total))
    }

    pub async fn update_spot(
        &self,
        actor: &AuthenticatedUser,
        spot_id: Uuid,
        request: UpdateSpotRequest,
    ) -> ApiResult<ParkingSpot> {
        let existing = self.get_spot(spot_id).await?;
        ensure_can_manage(actor, &existing, "update")?;

        if request.is_active.is_some() && !actor.is_admin() {
            return Err(ApiError::Forbidden(
                "Only administrators can change the active flag".to_string(),
            ));
        }

        let pricing = request.pricing;
        let spot = sqlx::query_as::<_, ParkingSpot>(
            r#"
            UPDATE parking_spots SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                longitude = COALESCE($4, longitude),
                latitude = COALESCE($5, latitude),
                address = COALESCE($6, address),
                hourly_rate_cents = COALESCE($7, hourly_rate_cents),
                daily_rate_cents = CASE WHEN $8 THEN $9 ELSE daily_rate_cents END,
                weekly_rate_cents = CASE WHEN $8 THEN $10 ELSE weekly_rate_cents END,
                currency = COALESCE($11, currency),
                features = COALESCE($12, features),
                vehicle_types = COALESCE($13, vehicle_types),
                rules = COALESCE($14, rules),
                is_active = COALESCE($15, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(spot_id)
        .bind(request.title.map(|t| t.trim().to_string()))
        .bind(request.description)
        .bind(request.location.map(|l| l.longitude))
        .bind(request.location.map(|l| l.latitude))
        .bind(request.address.map(|a| sqlx::types::Json(a.with_full_address())))
        .bind(pricing.as_ref().map(|p| p.hourly_rate_cents))
        .bind(pricing.is_some())
        .bind(pricing.as_ref().and_then(|p| p.daily_rate_cents))
        .bind(pricing.as_ref().and_then(|p| p.weekly_rate_cents))
        .bind(pricing.as_ref().and_then(|p| p.currency.as_ref().map(|c| c.to_uppercase())))
        .bind(request.features)
        .bind(request.vehicle_types.filter(|v| !v.is_empty()))
        .bind(request.rules)
        .bind(request.is_active)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(spot_id = %spot.id, actor = %actor.user_id, "Parking spot updated");

        Ok(spot)
    }

    pub async fn update_availability(
        &self,
        actor: &AuthenticatedUser,
        spot_id: Uuid,
        request: AvailabilityInput,
    ) -> ApiResult<ParkingSpot> {
        let existing = self.get_spot(spot_id).await?;
        ensure_can_manage(actor, &existing, "update")?;

        let from = request.available_from.or(existing.available_from);
        let to = request.available_to.or(existing.available_to);
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                return Err(ApiError::field(
                    "availableFrom",
                    "availableFrom must be before availableTo",
                ));
            }
        }

        let spot = sqlx::query_as::<_, ParkingSpot>(
            r#"
            UPDATE parking_spots SET
                is_available = COALESCE($2, is_available),
                available_from = $3,
                available_to = $4,
                time_slots = COALESCE($5, time_slots),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(spot_id)
        .bind(request.is_available)
        .bind(from)
        .bind(to)
        .bind(request.time_slots.map(sqlx::types::Json))
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            spot_id = %spot.id,
            is_available = spot.is_available,
            "Spot availability updated"
        );

        Ok(spot)
    }

    /// Removes a spot, or switches it off when booking history still references it
    pub async fn delete_spot(&self, actor: &AuthenticatedUser, spot_id: Uuid) -> ApiResult<SpotRemoval> {
        let mut tx = self.db_pool.begin().await?;

        let spot = Self::lock_spot(&mut *tx, spot_id).await?;
        ensure_can_manage(actor, &spot, "delete")?;

        let (live, total): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE status IN ('confirmed', 'active')), COUNT(*)
            FROM bookings WHERE parking_spot_id = $1
            "#,
        )
        .bind(spot_id)
        .fetch_one(&mut *tx)
        .await?;

        if live > 0 {
            return Err(ApiError::Conflict(
                "Cannot delete spot with active bookings".to_string(),
            ));
        }

        let removal = if total == 0 {
            sqlx::query("DELETE FROM parking_spots WHERE id = $1")
                .bind(spot_id)
                .execute(&mut *tx)
                .await?;
            SpotRemoval::Deleted
        } else {
            sqlx::query(
                "UPDATE parking_spots SET is_active = FALSE, is_available = FALSE, updated_at = NOW() WHERE id = $1",
            )
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;
            SpotRemoval::Deactivated
        };

        tx.commit().await?;

        tracing::info!(%spot_id, ?removal, actor = %actor.user_id, "Parking spot removed");

        Ok(removal)
    }

    /// Rate the caller's latest completed, unrated stay on this spot
    pub async fn add_rating(
        &self,
        user: &AuthenticatedUser,
        spot_id: Uuid,
        request: RatingRequest,
    ) -> ApiResult<RatingSummary> {
        self.get_spot(spot_id).await?;

        let booking_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM bookings
            WHERE parking_spot_id = $1 AND user_id = $2
              AND status = 'completed' AND rating_score IS NULL
            ORDER BY end_time DESC
            LIMIT 1
            "#,
        )
        .bind(spot_id)
        .bind(user.user_id)
        .fetch_optional(&self.db_pool)
        .await?;

        let booking_id = booking_id.ok_or_else(|| {
            ApiError::InvalidState(
                "You can only rate spots you have completed an unrated booking for".to_string(),
            )
        })?;

        self.record_rating(spot_id, booking_id, request.rating, request.comment)
            .await
    }

    /// Sole writer of a spot's running rating.
    ///
    /// Stamps the rating on the booking and folds the score into the spot
    /// average in one transaction. The booking guard (`completed`, not yet
    /// rated) makes a second attempt for the same booking fail without
    /// touching the aggregate.
    pub async fn record_rating(
        &self,
        spot_id: Uuid,
        booking_id: Uuid,
        score: i16,
        comment: Option<String>,
    ) -> ApiResult<RatingSummary> {
        if !(1..=5).contains(&score) {
            return Err(ApiError::field("rating", "Rating must be between 1 and 5"));
        }

        let mut tx = self.db_pool.begin().await?;

        let stamped = sqlx::query(
            r#"
            UPDATE bookings
            SET rating_score = $1, rating_comment = $2, rated_at = NOW(), updated_at = NOW()
            WHERE id = $3 AND parking_spot_id = $4
              AND status = 'completed' AND rating_score IS NULL
            "#,
        )
        .bind(score)
        .bind(comment)
        .bind(booking_id)
        .bind(spot_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if stamped == 0 {
            return Err(ApiError::InvalidState(
                "Booking has already been rated or is not completed".to_string(),
            ));
        }

        let summary = sqlx::query_as::<_, RatingSummary>(
            r#"
            UPDATE parking_spots
            SET rating_average = (rating_average * rating_count + $2) / (rating_count + 1),
                rating_count = rating_count + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING rating_average AS average, rating_count AS count
            "#,
        )
        .bind(spot_id)
        .bind(score as f64)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound("Parking spot not found".to_string()))?;

        tx.commit().await?;

        tracing::info!(%spot_id, %booking_id, score, average = summary.average, "Rating recorded");

        Ok(summary)
    }

    pub async fn add_favorite(&self, user_id: Uuid, spot_id: Uuid) -> ApiResult<()> {
        self.get_spot(spot_id).await?;
        sqlx::query(
            "INSERT INTO favorite_spots (user_id, spot_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(spot_id)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    pub async fn remove_favorite(&self, user_id: Uuid, spot_id: Uuid) -> ApiResult<()> {
        sqlx::query("DELETE FROM favorite_spots WHERE user_id = $1 AND spot_id = $2")
            .bind(user_id)
            .bind(spot_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    pub async fn list_favorites(&self, user_id: Uuid) -> ApiResult<Vec<ParkingSpot>> {
        Ok(sqlx::query_as::<_, ParkingSpot>(
            r#"
            SELECT s.* FROM parking_spots s
            JOIN favorite_spots f ON f.spot_id = s.id
            WHERE f.user_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?)
    }

    /// Lock a spot row for the rest of the transaction.
    ///
    /// Every write that places a booking into the confirmed/active set takes
    /// this lock first, which serialises reservations per spot.
    pub async fn lock_spot(conn: &mut PgConnection, spot_id: Uuid) -> ApiResult<ParkingSpot> {
        sqlx::query_as::<_, ParkingSpot>("SELECT * FROM parking_spots WHERE id = $1 FOR UPDATE")
            .bind(spot_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| ApiError::NotFound("Parking spot not found".to_string()))
    }

    pub async fn increment_total_bookings(conn: &mut PgConnection, spot_id: Uuid) -> ApiResult<()> {
        sqlx::query(
            "UPDATE parking_spots SET total_bookings = total_bookings + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(spot_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

fn ensure_can_manage(actor: &AuthenticatedUser, spot: &ParkingSpot, action: &str) -> ApiResult<()> {
    if spot.owner_id == actor.user_id || actor.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Not authorized to {} this spot",
            action
        )))
    }
}

/// Escape LIKE metacharacters and wrap for a substring match
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_attribute_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    query: &SpotQuery,
    features: &[super::model::SpotFeature],
) {
    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        builder.push(" AND (title ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR address->>'fullAddress' ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR address->>'city' ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(vehicle_type) = query.vehicle_type {
        builder.push(" AND ");
        builder.push_bind(vehicle_type);
        builder.push(" = ANY(vehicle_types)");
    }

    if !features.is_empty() {
        builder.push(" AND features && ");
        builder.push_bind(features.to_vec());
    }

    if let Some(max_rate) = query.max_hourly_rate_cents {
        builder.push(" AND hourly_rate_cents <= ");
        builder.push_bind(max_rate);
    }
}

fn push_sort(builder: &mut QueryBuilder<'_, Postgres>, query: &SpotQuery) {
    let sort = query.sort_by.unwrap_or_default();
    let order = query.sort_order.unwrap_or_default();
    builder.push(format!(
        " ORDER BY {} {}, id ASC",
        sort.column(),
        order.keyword()
    ));
}

fn push_window(builder: &mut QueryBuilder<'_, Postgres>, window: PageWindow) {
    builder.push(" LIMIT ");
    builder.push_bind(window.limit);
    builder.push(" OFFSET ");
    builder.push_bind(window.offset);
}

/// Haversine distance in km between the row and `center`
fn push_distance(builder: &mut QueryBuilder<'_, Postgres>, center: GeoPoint) {
    builder.push(format!(
        "(2 * {:.1} * asin(LEAST(1.0, sqrt(power(sin(radians(latitude - ",
        EARTH_RADIUS_KM
    ));
    builder.push_bind(center.latitude);
    builder.push(") / 2), 2) + cos(radians(");
    builder.push_bind(center.latitude);
    builder.push(")) * cos(radians(latitude)) * power(sin(radians(longitude - ");
    builder.push_bind(center.longitude);
    builder.push(") / 2), 2)))))");
}

/// Bounding-box prefilter followed by the exact distance bound
fn push_radius(builder: &mut QueryBuilder<'_, Postgres>, center: GeoPoint, radius_km: f64) {
    let bbox = BoundingBox::around(center, radius_km);
    builder.push(" AND latitude BETWEEN ");
    builder.push_bind(bbox.min_lat);
    builder.push(" AND ");
    builder.push_bind(bbox.max_lat);
    if let Some((min_lng, max_lng)) = bbox.lng_range {
        builder.push(" AND longitude BETWEEN ");
        builder.push_bind(min_lng);
        builder.push(" AND ");
        builder.push_bind(max_lng);
    }
    builder.push(" AND ");
    push_distance(builder, center);
    builder.push(" <= ");
    builder.push_bind(radius_km);
}
