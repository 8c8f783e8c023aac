use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_email::Email;
use uuid::Uuid;

use crate::db::{NewUser, Store, StoreError, UserStore};
use crate::domain::{account::generate_account_number, Role};

const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);
const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
const ACCOUNT_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("User already exists")]
    UserExists,
    #[error("{0}")]
    WeakPassword(&'static str),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("unable to hash password")]
    Hash,
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    sub: Uuid, // user_id
    role: Role,
    exp: i64, // expiration timestamp
    iat: i64, // issued at timestamp
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Email,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Email,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_uid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

// Authentication service
pub struct AuthService {
    store: Arc<dyn Store>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, jwt_secret: String) -> Self {
        Self { store, jwt_secret }
    }

    /// Registers a seller and opens its account.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        // Check if user already exists
        if self
            .store
            .find_user_by_email(req.email.as_str())
            .await?
            .is_some()
        {
            return Err(AuthError::UserExists);
        }

        check_password(&req.password)?;
        let password_hash = hash_password(&req.password)?;

        let mut attempt = 0;
        let (user, account) = loop {
            attempt += 1;
            let number = generate_account_number();
            let new_user = NewUser {
                email: req.email.as_str(),
                password_hash: &password_hash,
                full_name: req.full_name.as_deref(),
                role: Role::Seller,
            };
            match self.store.create_seller(new_user, &number).await {
                Ok(created) => break created,
                Err(StoreError::Conflict("account_number")) if attempt < ACCOUNT_NUMBER_ATTEMPTS => {
                    tracing::warn!("account number collision, retrying");
                }
                Err(StoreError::Conflict("email")) => return Err(AuthError::UserExists),
                Err(err) => return Err(err.into()),
            }
        };
        tracing::info!("seller created with email: {}", user.email);

        let mut response = self.issue_tokens(user.id, user.role).await?;
        response.account_number = Some(account.account_number);
        Ok(response)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        tracing::info!("Attempting to log in user with email: {}", req.email);

        let user = self
            .store
            .find_user_by_email(req.email.as_str())
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash =
            PasswordHash::new(&user.password_hash).map_err(|_err| AuthError::Hash)?;
        if Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .is_err()
        {
            tracing::warn!("Invalid credentials for user: {}", user.email);
            return Err(AuthError::InvalidCredentials);
        }
        tracing::info!("Password verified for user: {}", user.email);

        self.issue_tokens(user.id, user.role).await
    }

    pub fn verify_token(&self, token: &str) -> Result<Session, AuthError> {
        let mut validation = jsonwebtoken::Validation::default();

        validation.leeway = 10;
        validation.validate_exp = true;
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];

        let token_data = jsonwebtoken::decode::<Claims>(
            token,
            &jsonwebtoken::DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|err| {
            tracing::error!("Error decoding token: {:?}", err);
            AuthError::InvalidToken
        })?;

        Ok(Session {
            user_id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }

    pub async fn refresh_token(&self, refresh_token: String) -> Result<AuthResponse, AuthError> {
        let user = self
            .store
            .verify_refresh_token(&refresh_token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        self.issue_tokens(user.id, user.role).await
    }

    /// Creates an access token and stores a fresh refresh token.
    async fn issue_tokens(&self, user_id: Uuid, role: Role) -> Result<AuthResponse, AuthError> {
        let (access_token, refresh_token) = self.generate_tokens(user_id, role)?;

        let expires_at = Utc::now() + REFRESH_TOKEN_TTL;
        self.store
            .store_refresh_token(user_id, &refresh_token, expires_at)
            .await?;
        tracing::info!("stored refresh token for user: {}", user_id);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user_uid: user_id,
            account_number: None,
        })
    }

    pub fn generate_tokens(&self, user_id: Uuid, role: Role) -> Result<(String, String), AuthError> {
        let now = Utc::now();

        let access_claims = Claims {
            sub: user_id,
            role,
            exp: (now + ACCESS_TOKEN_TTL).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &access_claims,
            &jsonwebtoken::EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;

        // Refresh token
        let refresh_token = Uuid::new_v4().to_string();

        Ok((access_token, refresh_token))
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_err| AuthError::Hash)
}

pub fn check_password(password: &str) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword("Password must be at least 8 characters"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::WeakPassword("Password must contain at least one digit"));
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one special character",
        ));
    }
    Ok(())
}
