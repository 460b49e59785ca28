use chrono::{Duration, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::bookings::{Booking, BookingResponse};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{Paginated, User, UserResponse};
use crate::spots::service::like_pattern;
use crate::spots::ParkingSpot;

use super::model::{
    group_by_status, AdminUpdateUserRequest, AvailabilityCount, BookingAnalytics, DailyBookings,
    Dashboard, DashboardStats, PaymentAnalytics, PaymentAnalyticsQuery, Report, ReportQuery,
    RevenuePoint, StatusCount, StatusMethodRow, StatusTotals, UserDetails, UserListQuery,
};

const RECENT_BOOKINGS: i64 = 5;
const ANALYTICS_WINDOW_DAYS: i64 = 30;

/// Dashboard aggregates, user management and spot moderation
#[derive(Clone)]
pub struct AdminService {
    db_pool: PgPool,
}

impl AdminService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn dashboard(&self) -> ApiResult<Dashboard> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM parking_spots) AS total_spots,
                (SELECT COUNT(*) FROM bookings) AS total_bookings,
                (SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM payments WHERE status = 'succeeded')
                    AS total_revenue_cents
            "#,
        )
        .fetch_one(&self.db_pool)
        .await?;

        let recent = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings ORDER BY created_at DESC LIMIT $1",
        )
        .bind(RECENT_BOOKINGS)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Dashboard {
            stats,
            recent_bookings: recent.into_iter().map(BookingResponse::from).collect(),
        })
    }

    pub async fn booking_analytics(&self) -> ApiResult<BookingAnalytics> {
        let since = Utc::now() - Duration::days(ANALYTICS_WINDOW_DAYS);

        let daily = sqlx::query_as::<_, DailyBookings>(
            r#"
            SELECT
                (created_at AT TIME ZONE 'UTC')::date AS day,
                COUNT(*) AS total_bookings,
                COALESCE(SUM(total_amount_cents), 0)::BIGINT AS total_revenue_cents,
                COALESCE(ROUND(AVG(total_amount_cents)), 0)::BIGINT AS average_amount_cents
            FROM bookings
            WHERE created_at >= $1
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(since)
        .fetch_all(&self.db_pool)
        .await?;

        let status_distribution = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM bookings GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(BookingAnalytics {
            daily,
            status_distribution,
        })
    }

    pub async fn reports(&self, query: ReportQuery) -> ApiResult<Report> {
        let bookings_by_status = sqlx::query_as::<_, StatusTotals>(
            r#"
            SELECT
                status,
                COUNT(*) AS count,
                COALESCE(SUM(total_amount_cents), 0)::BIGINT AS total_amount_cents
            FROM bookings
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(&self.db_pool)
        .await?;

        let spots_by_availability = sqlx::query_as::<_, AvailabilityCount>(
            r#"
            SELECT is_available, COUNT(*) AS count
            FROM parking_spots
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY is_available
            ORDER BY is_available DESC
            "#,
        )
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(Report {
            bookings_by_status,
            spots_by_availability,
        })
    }

    pub async fn payment_analytics(&self, query: PaymentAnalyticsQuery) -> ApiResult<PaymentAnalytics> {
        let rows = sqlx::query_as::<_, StatusMethodRow>(
            r#"
            SELECT
                status,
                payment_method,
                COUNT(*) AS count,
                COALESCE(SUM(amount_cents), 0)::BIGINT AS total_amount_cents
            FROM payments
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            GROUP BY status, payment_method
            ORDER BY status, payment_method
            "#,
        )
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(&self.db_pool)
        .await?;

        let revenue_over_time = sqlx::query_as::<_, RevenuePoint>(
            r#"
            SELECT
                date_trunc($1, created_at, 'UTC') AS period_start,
                COALESCE(SUM(amount_cents), 0)::BIGINT AS revenue_cents,
                COUNT(*) AS count
            FROM payments
            WHERE status = 'succeeded'
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(query.period.trunc_unit())
        .bind(query.start_date)
        .bind(query.end_date)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(PaymentAnalytics {
            by_status: group_by_status(rows),
            revenue_over_time,
        })
    }

    /// Paginated user listing, newest first
    pub async fn list_users(&self, query: UserListQuery) -> ApiResult<Paginated<UserResponse>> {
        let window = query.window();

        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_user_filters(&mut count_builder, &query);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        let mut query_builder = QueryBuilder::<Postgres>::new("SELECT * FROM users WHERE TRUE");
        push_user_filters(&mut query_builder, &query);
        query_builder.push(" ORDER BY created_at DESC LIMIT ");
        query_builder.push_bind(window.limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(window.offset);

        let users = query_builder
            .build_query_as::<User>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(Paginated::new(users, window, total).map(UserResponse::from))
    }

    pub async fn get_user(&self, user_id: Uuid) -> ApiResult<UserDetails> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let recent = sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(RECENT_BOOKINGS)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(UserDetails {
            user: user.into(),
            recent_bookings: recent.into_iter().map(BookingResponse::from).collect(),
        })
    }

    pub async fn update_user(
        &self,
        user_id: Uuid,
        request: AdminUpdateUserRequest,
    ) -> ApiResult<UserResponse> {
        let email = request.email.as_deref().map(|e| e.trim().to_lowercase());

        if let Some(email) = &email {
            let taken: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND id <> $2")
                    .bind(email)
                    .bind(user_id)
                    .fetch_optional(&self.db_pool)
                    .await?;
            if taken.is_some() {
                return Err(ApiError::Conflict(
                    "User already exists with this email".to_string(),
                ));
            }
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                is_verified = COALESCE($5, is_verified),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(email)
        .bind(request.role)
        .bind(request.is_verified)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User updated by admin");

        Ok(user.into())
    }

    /// Hard delete of an account with no listings, bookings or payments
    pub async fn delete_user(&self, actor: &AuthenticatedUser, user_id: Uuid) -> ApiResult<()> {
        if actor.user_id == user_id {
            return Err(ApiError::BadRequest(
                "You cannot delete your own account".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(ApiError::NotFound("User not found".to_string()));
        }

        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM parking_spots WHERE owner_id = $1)
                OR EXISTS (SELECT 1 FROM bookings WHERE user_id = $1)
                OR EXISTS (SELECT 1 FROM payments WHERE user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(ApiError::Conflict(
                "User has parking spots, bookings or payments and cannot be deleted".to_string(),
            ));
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(%user_id, actor = %actor.user_id, "User deleted");

        Ok(())
    }

    /// Publish a spot and clear any earlier rejection
    pub async fn approve_spot(&self, spot_id: Uuid) -> ApiResult<ParkingSpot> {
        let spot = sqlx::query_as::<_, ParkingSpot>(
            r#"
            UPDATE parking_spots SET
                is_active = TRUE,
                approved_at = NOW(),
                rejected_at = NULL,
                rejection_reason = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(spot_id)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Parking spot not found".to_string()))?;

        tracing::info!(%spot_id, "Parking spot approved");

        Ok(spot)
    }

    /// Hide a spot from search and record why
    pub async fn reject_spot(&self, spot_id: Uuid, reason: &str) -> ApiResult<ParkingSpot> {
        let spot = sqlx::query_as::<_, ParkingSpot>(
            r#"
            UPDATE parking_spots SET
                is_active = FALSE,
                approved_at = NULL,
                rejected_at = NOW(),
                rejection_reason = $2,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(spot_id)
        .bind(reason.trim())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Parking spot not found".to_string()))?;

        tracing::info!(%spot_id, %reason, "Parking spot rejected");

        Ok(spot)
    }
}

fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserListQuery) {
    if let Some(term) = query.search_term() {
        let pattern = like_pattern(term);
        builder.push(" AND (name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR email ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(role) = query.role {
        builder.push(" AND role = ");
        builder.push_bind(role);
    }
}
