//! Authentication service
//!
//! Email/password accounts with bcrypt hashes and stateless access tokens.

use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest, User,
    UserResponse, UserRole,
};

use super::jwt::{generate_token, verify_token, Claims, JwtError};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("User already exists with this email")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Cannot self-register as admin")]
    RoleNotAllowed,

    #[error("User not found")]
    UserNotFound,

    #[error("Current password is incorrect")]
    IncorrectPassword,

    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    #[error("Token error: {0}")]
    TokenError(#[from] JwtError),
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::DatabaseError(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::EmailTaken => ApiError::Conflict(e.to_string()),
            AuthError::InvalidCredentials => ApiError::Unauthorized(e.to_string()),
            AuthError::RoleNotAllowed => ApiError::Forbidden(e.to_string()),
            AuthError::UserNotFound => ApiError::NotFound(e.to_string()),
            AuthError::IncorrectPassword => ApiError::BadRequest(e.to_string()),
            AuthError::TokenError(JwtError::TokenExpired) => {
                ApiError::Unauthorized("Token has expired".to_string())
            }
            AuthError::TokenError(_) => ApiError::Unauthorized("Invalid token".to_string()),
            AuthError::DatabaseError(msg) => ApiError::DatabaseError(msg),
            AuthError::HashingFailed(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db_pool: PgPool,
    jwt_secret: String,
    token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(db_pool: PgPool, jwt_secret: String, token_ttl_seconds: i64) -> Self {
        Self {
            db_pool,
            jwt_secret,
            token_ttl_seconds,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        Ok(verify_token(token, &self.jwt_secret)?)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let role = request.role.unwrap_or(UserRole::User);
        if role == UserRole::Admin {
            return Err(AuthError::RoleNotAllowed);
        }

        let email = request.email.trim().to_lowercase();

        let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db_pool)
            .await?;
        if existing.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = hash_password(request.password).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, email, password_hash, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.name.trim())
        .bind(&email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|d| d.code())
                .is_some_and(|code| code == "23505");
            if duplicate {
                AuthError::EmailTaken
            } else {
                AuthError::from(e)
            }
        })?;

        tracing::info!(user_id = %user.id, role = user.role.as_str(), "User registered");

        self.issue(user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = request.email.trim().to_lowercase();

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(request.password, &user.password_hash).await? {
            tracing::debug!(%email, "Rejected login attempt");
            return Err(AuthError::InvalidCredentials);
        }

        self.issue(user)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse, AuthError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        Ok(user.into())
    }

    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserResponse, AuthError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                avatar_url = COALESCE($4, avatar_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(request.name.as_deref().map(str::trim))
        .bind(request.phone.as_deref().map(str::trim))
        .bind(request.avatar_url)
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        tracing::info!(user_id = %user.id, "Profile updated");

        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let current_hash: String =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.db_pool)
                .await?
                .ok_or(AuthError::UserNotFound)?;

        if !verify_password(request.current_password, &current_hash).await? {
            return Err(AuthError::IncorrectPassword);
        }

        let password_hash = hash_password(request.new_password).await?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(&self.db_pool)
            .await?;

        tracing::info!(%user_id, "Password changed");

        Ok(())
    }

    fn issue(&self, user: User) -> Result<AuthResponse, AuthError> {
        let token = generate_token(&user, &self.jwt_secret, self.token_ttl_seconds)?;
        Ok(AuthResponse {
            token,
            expires_in: self.token_ttl_seconds,
            user: user.into(),
        })
    }
}

/// Hash on the blocking pool
async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AuthError::HashingFailed(e.to_string()))?
        .map_err(|e| AuthError::HashingFailed(e.to_string()))
}

async fn verify_password(password: String, hash: &str) -> Result<bool, AuthError> {
    let hash = hash.to_string();
    Ok(tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AuthError::HashingFailed(e.to_string()))?
        .unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("secret1".to_string(), "not-a-bcrypt-hash").await.unwrap());
    }

    #[test]
    fn test_incorrect_password_is_a_bad_request() {
        let err: ApiError = AuthError::IncorrectPassword.into();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "Current password is incorrect"));
    }
}
