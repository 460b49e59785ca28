//! Booking and payment flows against a real database

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use sqlx::PgPool;
    use std::sync::Arc;
    use uuid::Uuid;

    use parkspot_server::bookings::{
        AvailabilityQuery, BookingPaymentStatus, BookingService, BookingStatus,
        CreateBookingRequest, ExtendBookingRequest, UpdateBookingRequest,
        UpdateBookingStatusRequest, VehicleInfo,
    };
    use parkspot_server::db::run_migrations;
    use parkspot_server::error::ApiError;
    use parkspot_server::middleware::AuthenticatedUser;
    use parkspot_server::models::UserRole;
    use parkspot_server::notifications::Notifier;
    use parkspot_server::payments::{
        CreatePaymentIntentRequest, PaymentGateway, PaymentMethod, PaymentService, PaymentStatus,
        ProcessPaymentRequest, RefundRequest,
    };
    use parkspot_server::spots::{RatingRequest, SpotRemoval, SpotService, VehicleType};

    const HOURLY_RATE_CENTS: i64 = 1000;

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/parkspot_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn notifier() -> Notifier {
        Notifier::new(None, "admin@example.com".to_string())
    }

    fn services(pool: &PgPool) -> (BookingService, PaymentService) {
        let spots = Arc::new(SpotService::new(pool.clone(), "USD".to_string()));
        let bookings = BookingService::new(pool.clone(), spots, notifier());
        let payments = PaymentService::new(
            pool.clone(),
            PaymentGateway::new(),
            notifier(),
            "USD".to_string(),
        );
        (bookings, payments)
    }

    async fn insert_user(pool: &PgPool, role: UserRole) -> AuthenticatedUser {
        let user_id = Uuid::new_v4();
        let email = format!("{}@example.com", user_id.simple());

        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(user_id)
        .bind("Flow Test")
        .bind(&email)
        .bind("not-a-real-hash")
        .bind(role)
        .execute(pool)
        .await
        .expect("Failed to insert user");

        AuthenticatedUser {
            user_id,
            email,
            role,
        }
    }

    async fn insert_spot(pool: &PgPool, owner: &AuthenticatedUser) -> Uuid {
        let spot_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO parking_spots (id, owner_id, title, longitude, latitude, address, hourly_rate_cents)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(spot_id)
        .bind(owner.user_id)
        .bind("Driveway near the station")
        .bind(-122.4194)
        .bind(37.7749)
        .bind(serde_json::json!({
            "street": "1 Market St",
            "city": "San Francisco",
            "state": "CA",
            "zipCode": "94105",
            "country": "US"
        }))
        .bind(HOURLY_RATE_CENTS)
        .execute(pool)
        .await
        .expect("Failed to insert spot");

        spot_id
    }

    fn booking_request(spot_id: Uuid, start: DateTime<Utc>, hours: i64) -> CreateBookingRequest {
        CreateBookingRequest {
            parking_spot_id: spot_id,
            start_time: start,
            end_time: start + Duration::hours(hours),
            vehicle_info: VehicleInfo {
                license_plate: " ab12 cd ".to_string(),
                make: Some("Toyota".to_string()),
                model: None,
                color: None,
                vehicle_type: VehicleType::Car,
            },
            payment_method: PaymentMethod::CreditCard,
            notes: None,
        }
    }

    async fn force_status(pool: &PgPool, booking_id: Uuid, status: BookingStatus) {
        sqlx::query("UPDATE bookings SET status = $2 WHERE id = $1")
            .bind(booking_id)
            .bind(status)
            .execute(pool)
            .await
            .expect("Failed to force booking status");
    }

    async fn force_times(pool: &PgPool, booking_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) {
        sqlx::query("UPDATE bookings SET start_time = $2, end_time = $3 WHERE id = $1")
            .bind(booking_id)
            .bind(start)
            .bind(end)
            .execute(pool)
            .await
            .expect("Failed to force booking times");
    }

    async fn book(
        bookings: &BookingService,
        driver: &AuthenticatedUser,
        spot_id: Uuid,
        start: DateTime<Utc>,
        hours: i64,
    ) -> Uuid {
        bookings
            .create_booking(driver, booking_request(spot_id, start, hours))
            .await
            .expect("Booking should be created")
            .booking
            .id
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_create_booking_prices_and_issues_pass() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(2);
        let booking = bookings
            .create_booking(&driver, booking_request(spot_id, start, 2))
            .await
            .expect("Booking should be created");

        assert_eq!(booking.booking.total_amount_cents, 2000);
        assert_eq!(booking.booking.status, BookingStatus::Pending);
        assert_eq!(booking.booking.payment_status, BookingPaymentStatus::Pending);
        assert_eq!(booking.booking.vehicle_info.license_plate, "AB12 CD");
        assert!(booking.booking.booking_code.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_overlapping_booking_conflicts() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let first_driver = insert_user(&pool, UserRole::User).await;
        let second_driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(3);
        let first = bookings
            .create_booking(&first_driver, booking_request(spot_id, start, 2))
            .await
            .expect("First booking should be created");
        force_status(&pool, first.booking.id, BookingStatus::Confirmed).await;

        let overlapping = bookings
            .create_booking(
                &second_driver,
                booking_request(spot_id, start + Duration::hours(1), 2),
            )
            .await;
        assert!(matches!(overlapping, Err(ApiError::Conflict(_))));

        let back_to_back = bookings
            .create_booking(
                &second_driver,
                booking_request(spot_id, start + Duration::hours(2), 2),
            )
            .await;
        assert!(back_to_back.is_ok(), "Touching ranges should not conflict");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_extension_charges_current_rate() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(4);
        let booking = bookings
            .create_booking(&driver, booking_request(spot_id, start, 2))
            .await
            .expect("Booking should be created");
        force_status(&pool, booking.booking.id, BookingStatus::Active).await;

        let extended = bookings
            .extend_booking(
                &driver,
                booking.booking.id,
                ExtendBookingRequest {
                    additional_hours: 2,
                },
            )
            .await
            .expect("Extension should succeed");

        assert_eq!(extended.booking.total_amount_cents, 4000);
        assert_eq!(
            extended.booking.end_time,
            booking.booking.end_time + Duration::hours(2)
        );
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_cancellation_refund_depends_on_notice() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let far = bookings
            .create_booking(&driver, booking_request(spot_id, Utc::now() + Duration::hours(30), 2))
            .await
            .expect("Booking should be created");
        let near = bookings
            .create_booking(&driver, booking_request(spot_id, Utc::now() + Duration::hours(5), 2))
            .await
            .expect("Booking should be created");
        force_status(&pool, far.booking.id, BookingStatus::Confirmed).await;
        force_status(&pool, near.booking.id, BookingStatus::Confirmed).await;

        let far = bookings
            .cancel_booking(&driver, far.booking.id, None)
            .await
            .expect("Cancellation should succeed");
        assert_eq!(far.booking.status, BookingStatus::Cancelled);
        assert_eq!(far.booking.refund_amount_cents, 2000);
        assert_eq!(far.booking.cancellation_reason.as_deref(), Some("Cancelled by user"));

        let near = bookings
            .cancel_booking(&driver, near.booking.id, Some("Plans changed".to_string()))
            .await
            .expect("Cancellation should succeed");
        assert_eq!(near.booking.refund_amount_cents, 1000);

        let again = bookings.cancel_booking(&driver, near.booking.id, None).await;
        assert!(matches!(again, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_other_users_cannot_cancel() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let stranger = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let booking = bookings
            .create_booking(&driver, booking_request(spot_id, Utc::now() + Duration::days(2), 1))
            .await
            .expect("Booking should be created");
        force_status(&pool, booking.booking.id, BookingStatus::Confirmed).await;

        let result = bookings.cancel_booking(&stranger, booking.booking.id, None).await;
        assert!(matches!(result, Err(ApiError::Forbidden(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_ratings_fold_into_spot_average() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(5);
        let mut ids = Vec::new();
        for offset in [0, 3] {
            let booking = bookings
                .create_booking(&driver, booking_request(spot_id, start + Duration::hours(offset), 2))
                .await
                .expect("Booking should be created");
            force_status(&pool, booking.booking.id, BookingStatus::Completed).await;
            ids.push(booking.booking.id);
        }

        for (id, score) in ids.iter().zip([4i16, 2]) {
            let rated = bookings
                .rate_booking(
                    &driver,
                    *id,
                    RatingRequest {
                        rating: score,
                        comment: None,
                    },
                )
                .await
                .expect("Rating should succeed");
            assert_eq!(rated.booking.rating_score, Some(score));
        }

        let (average, count): (f64, i32) =
            sqlx::query_as("SELECT rating_average, rating_count FROM parking_spots WHERE id = $1")
                .bind(spot_id)
                .fetch_one(&pool)
                .await
                .expect("Spot should exist");
        assert_eq!(count, 2);
        assert!((average - 3.0).abs() < 1e-9);

        let twice = bookings
            .rate_booking(
                &driver,
                ids[0],
                RatingRequest {
                    rating: 5,
                    comment: None,
                },
            )
            .await;
        assert!(matches!(twice, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_payment_confirms_booking_and_refunds_settle() {
        let pool = setup_test_db().await;
        let (bookings, payments) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let admin = insert_user(&pool, UserRole::Admin).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let booking = bookings
            .create_booking(&driver, booking_request(spot_id, Utc::now() + Duration::days(6), 2))
            .await
            .expect("Booking should be created");
        let booking_id = booking.booking.id;

        let intent = payments
            .create_payment_intent(
                &driver,
                CreatePaymentIntentRequest {
                    booking_id,
                    payment_method: PaymentMethod::CreditCard,
                },
            )
            .await
            .expect("Intent should be created");
        assert_eq!(intent.amount_cents, 2000);
        assert!(intent.client_secret.is_some());

        let paid = payments
            .process_payment(
                &driver,
                ProcessPaymentRequest {
                    transaction_id: intent.transaction_id.clone(),
                    payment_method_id: "pm_card_visa".to_string(),
                },
            )
            .await
            .expect("Payment should succeed");
        assert_eq!(paid.payment.status, PaymentStatus::Succeeded);
        assert!(paid.payment.paid_at.is_some());

        let confirmed = bookings
            .get_booking(&driver, booking_id)
            .await
            .expect("Booking should exist");
        assert_eq!(confirmed.booking.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.booking.payment_status, BookingPaymentStatus::Paid);
        assert_eq!(confirmed.booking.payment_id, Some(paid.payment.id));

        let duplicate = payments
            .create_payment_intent(
                &driver,
                CreatePaymentIntentRequest {
                    booking_id,
                    payment_method: PaymentMethod::CreditCard,
                },
            )
            .await;
        assert!(matches!(duplicate, Err(ApiError::Conflict(_))));

        let requested = payments
            .request_refund(
                &driver,
                paid.payment.id,
                RefundRequest {
                    amount_cents: Some(500),
                    reason: "Left early".to_string(),
                },
            )
            .await
            .expect("Refund request should be accepted");
        assert_eq!(requested.amount_cents, 500);

        let too_much = payments
            .request_refund(
                &driver,
                paid.payment.id,
                RefundRequest {
                    amount_cents: Some(1600),
                    reason: "Everything".to_string(),
                },
            )
            .await;
        assert!(matches!(too_much, Err(ApiError::BadRequest(_))));

        let settled = payments
            .process_refund(
                &admin,
                paid.payment.id,
                RefundRequest {
                    amount_cents: None,
                    reason: "Approved".to_string(),
                },
            )
            .await
            .expect("Pending refund should settle");
        assert_eq!(settled.refund_id, requested.refund_id);
        assert_eq!(settled.amount_cents, 500);

        let remainder = payments
            .process_refund(
                &admin,
                paid.payment.id,
                RefundRequest {
                    amount_cents: None,
                    reason: "Goodwill".to_string(),
                },
            )
            .await
            .expect("Remaining amount should refund");
        assert_eq!(remainder.amount_cents, 1500);

        let payment = payments
            .get_payment_by_booking(&driver, booking_id)
            .await
            .expect("Payment should exist");
        assert_eq!(payment.payment.status, PaymentStatus::Refunded);
        assert_eq!(payment.total_refunded_cents, 2000);
        assert_eq!(payment.net_amount_cents, 0);

        let booking = bookings
            .get_booking(&driver, booking_id)
            .await
            .expect("Booking should exist");
        assert_eq!(booking.booking.payment_status, BookingPaymentStatus::Refunded);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_declined_card_fails_payment_and_allows_retry() {
        let pool = setup_test_db().await;
        let (bookings, payments) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let booking = bookings
            .create_booking(&driver, booking_request(spot_id, Utc::now() + Duration::days(7), 1))
            .await
            .expect("Booking should be created");
        let booking_id = booking.booking.id;

        let intent = payments
            .create_payment_intent(
                &driver,
                CreatePaymentIntentRequest {
                    booking_id,
                    payment_method: PaymentMethod::CreditCard,
                },
            )
            .await
            .expect("Intent should be created");

        let declined = payments
            .process_payment(
                &driver,
                ProcessPaymentRequest {
                    transaction_id: intent.transaction_id,
                    payment_method_id: "pm_card_chargeDeclined".to_string(),
                },
            )
            .await;
        assert!(matches!(declined, Err(ApiError::PaymentDeclined(_))));

        let booking = bookings
            .get_booking(&driver, booking_id)
            .await
            .expect("Booking should exist");
        assert_eq!(booking.booking.status, BookingStatus::Pending);
        assert_eq!(booking.booking.payment_status, BookingPaymentStatus::Failed);

        let retry = payments
            .create_payment_intent(
                &driver,
                CreatePaymentIntentRequest {
                    booking_id,
                    payment_method: PaymentMethod::Paypal,
                },
            )
            .await
            .expect("A failed payment should not block a new intent");
        assert!(retry.paypal_order_id.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_check_in_needs_confirmation_and_window() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let soon = Utc::now() + Duration::minutes(10);
        let booking_id = book(&bookings, &driver, spot_id, soon, 1).await;

        let pending = bookings.check_in(&driver, booking_id).await;
        assert!(matches!(pending, Err(ApiError::InvalidState(_))));

        force_status(&pool, booking_id, BookingStatus::Confirmed).await;
        let active = bookings
            .check_in(&driver, booking_id)
            .await
            .expect("Check-in inside the window should succeed");
        assert_eq!(active.booking.status, BookingStatus::Active);
        assert!(active.booking.check_in_time.is_some());

        let other_spot = insert_spot(&pool, &owner).await;
        let later = Utc::now() + Duration::hours(2);
        let early_id = book(&bookings, &driver, other_spot, later, 1).await;
        force_status(&pool, early_id, BookingStatus::Confirmed).await;

        let early = bookings.check_in(&driver, early_id).await;
        match early {
            Err(ApiError::InvalidState(message)) => assert!(message.contains("30 minutes")),
            other => panic!("unexpected result: {:?}", other.map(|b| b.booking.status)),
        }

        let past = Utc::now() - Duration::minutes(45);
        force_times(&pool, early_id, past, past + Duration::hours(2)).await;
        let late = bookings.check_in(&driver, early_id).await;
        assert!(matches!(late, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_check_out_completes_and_counts_booking() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let booking_id = book(&bookings, &driver, spot_id, Utc::now() + Duration::days(1), 2).await;

        let not_active = bookings.check_out(&driver, booking_id).await;
        assert!(matches!(not_active, Err(ApiError::InvalidState(_))));

        force_status(&pool, booking_id, BookingStatus::Active).await;
        let completed = bookings
            .check_out(&driver, booking_id)
            .await
            .expect("Check-out should succeed");
        assert_eq!(completed.booking.status, BookingStatus::Completed);
        assert!(completed.booking.check_out_time.is_some());

        let total: i32 = sqlx::query_scalar("SELECT total_bookings FROM parking_spots WHERE id = $1")
            .bind(spot_id)
            .fetch_one(&pool)
            .await
            .expect("Spot should exist");
        assert_eq!(total, 1);

        let twice = bookings.check_out(&driver, booking_id).await;
        assert!(matches!(twice, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_update_booking_reprices_and_checks_conflicts() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let other_driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(8);
        let booking_id = book(&bookings, &driver, spot_id, start, 2).await;
        force_status(&pool, booking_id, BookingStatus::Confirmed).await;

        // Overlaps only its own previous window
        let longer = bookings
            .update_booking(
                &driver,
                booking_id,
                UpdateBookingRequest {
                    end_time: Some(start + Duration::hours(3)),
                    ..Default::default()
                },
            )
            .await
            .expect("Growing over its own window should succeed");
        assert_eq!(longer.booking.total_amount_cents, 3000);

        sqlx::query("UPDATE parking_spots SET hourly_rate_cents = 2000 WHERE id = $1")
            .bind(spot_id)
            .execute(&pool)
            .await
            .expect("Failed to change rate");

        let repriced = bookings
            .update_booking(
                &driver,
                booking_id,
                UpdateBookingRequest {
                    end_time: Some(start + Duration::hours(2)),
                    ..Default::default()
                },
            )
            .await
            .expect("Shrinking should succeed");
        assert_eq!(repriced.booking.total_amount_cents, 4000);

        let notes_only = bookings
            .update_booking(
                &driver,
                booking_id,
                UpdateBookingRequest {
                    notes: Some("Gate code 1234".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("Notes update should succeed");
        assert_eq!(notes_only.booking.total_amount_cents, 4000);
        assert_eq!(notes_only.booking.notes.as_deref(), Some("Gate code 1234"));

        let neighbour = book(&bookings, &other_driver, spot_id, start + Duration::hours(4), 2).await;
        force_status(&pool, neighbour, BookingStatus::Confirmed).await;

        let clash = bookings
            .update_booking(
                &driver,
                booking_id,
                UpdateBookingRequest {
                    end_time: Some(start + Duration::hours(5)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(clash, Err(ApiError::Conflict(_))));

        force_status(&pool, booking_id, BookingStatus::Cancelled).await;
        let closed = bookings
            .update_booking(
                &driver,
                booking_id,
                UpdateBookingRequest {
                    notes: Some("Too late".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(closed, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_owner_status_changes_follow_lifecycle() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let stranger = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let other_driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(9);
        let pending_id = book(&bookings, &driver, spot_id, start, 2).await;
        let confirmed_id = book(&bookings, &other_driver, spot_id, start + Duration::hours(1), 2).await;
        force_status(&pool, confirmed_id, BookingStatus::Confirmed).await;

        let status = |status: BookingStatus| UpdateBookingStatusRequest {
            status,
            reason: None,
        };

        let not_owner = bookings
            .update_status(&stranger, pending_id, status(BookingStatus::Confirmed))
            .await;
        assert!(matches!(not_owner, Err(ApiError::Forbidden(_))));

        let not_allowed = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Active))
            .await;
        assert!(matches!(not_allowed, Err(ApiError::Validation(_))));

        let overlapping = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Confirmed))
            .await;
        assert!(matches!(overlapping, Err(ApiError::Conflict(_))));

        let no_show = bookings
            .update_status(&owner, confirmed_id, status(BookingStatus::NoShow))
            .await
            .expect("Confirmed booking can be marked no-show");
        assert_eq!(no_show.booking.status, BookingStatus::NoShow);

        let freed = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Confirmed))
            .await
            .expect("Slot is free once the other booking is a no-show");
        assert_eq!(freed.booking.status, BookingStatus::Confirmed);

        let repeated = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Confirmed))
            .await;
        assert!(matches!(repeated, Err(ApiError::InvalidState(_))));

        let cancelled = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Cancelled))
            .await
            .expect("Owner can cancel a confirmed booking");
        assert_eq!(
            cancelled.booking.cancellation_reason.as_deref(),
            Some("Cancelled by spot owner")
        );

        let reopened = bookings
            .update_status(&owner, pending_id, status(BookingStatus::Confirmed))
            .await;
        assert!(matches!(reopened, Err(ApiError::InvalidState(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_delete_spot_depends_on_booking_history() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let spots = SpotService::new(pool.clone(), "USD".to_string());
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;

        let busy_spot = insert_spot(&pool, &owner).await;
        let busy_booking = book(&bookings, &driver, busy_spot, Utc::now() + Duration::days(2), 1).await;
        force_status(&pool, busy_booking, BookingStatus::Confirmed).await;

        let blocked = spots.delete_spot(&owner, busy_spot).await;
        assert!(matches!(blocked, Err(ApiError::Conflict(_))));

        let used_spot = insert_spot(&pool, &owner).await;
        let old_booking = book(&bookings, &driver, used_spot, Utc::now() + Duration::days(2), 1).await;
        force_status(&pool, old_booking, BookingStatus::Completed).await;

        let removal = spots
            .delete_spot(&owner, used_spot)
            .await
            .expect("Spot with history should be switched off");
        assert_eq!(removal, SpotRemoval::Deactivated);

        let (is_active, is_available): (bool, bool) =
            sqlx::query_as("SELECT is_active, is_available FROM parking_spots WHERE id = $1")
                .bind(used_spot)
                .fetch_one(&pool)
                .await
                .expect("Deactivated spot should still exist");
        assert!(!is_active);
        assert!(!is_available);

        let fresh_spot = insert_spot(&pool, &owner).await;
        let removal = spots
            .delete_spot(&owner, fresh_spot)
            .await
            .expect("Unused spot should be deleted");
        assert_eq!(removal, SpotRemoval::Deleted);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parking_spots WHERE id = $1")
            .bind(fresh_spot)
            .fetch_one(&pool)
            .await
            .expect("Count should succeed");
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_availability_reports_reason() {
        let pool = setup_test_db().await;
        let (bookings, _) = services(&pool);
        let owner = insert_user(&pool, UserRole::SpotOwner).await;
        let driver = insert_user(&pool, UserRole::User).await;
        let spot_id = insert_spot(&pool, &owner).await;

        let start = Utc::now() + Duration::days(10);
        let query = |start: DateTime<Utc>| AvailabilityQuery {
            spot_id,
            start_time: start,
            end_time: start + Duration::hours(2),
        };

        let booking_id = book(&bookings, &driver, spot_id, start, 2).await;
        let free = bookings
            .check_availability(query(start))
            .await
            .expect("Check should succeed");
        assert!(free.is_available, "Pending bookings do not hold the slot");

        force_status(&pool, booking_id, BookingStatus::Confirmed).await;
        let taken = bookings
            .check_availability(query(start + Duration::hours(1)))
            .await
            .expect("Check should succeed");
        assert!(!taken.is_available);
        assert_eq!(taken.reason.as_deref(), Some("Time slot is already booked"));

        sqlx::query("UPDATE parking_spots SET is_available = FALSE WHERE id = $1")
            .bind(spot_id)
            .execute(&pool)
            .await
            .expect("Failed to switch spot off");
        let closed = bookings
            .check_availability(query(start + Duration::days(1)))
            .await
            .expect("Check should succeed");
        assert!(!closed.is_available);
        assert_eq!(closed.reason.as_deref(), Some("Spot is not available"));
    }
}
