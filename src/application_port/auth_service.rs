use crate::domain_model::{FederatedProfile, IdentityRecord, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("user already exists")]
    UserExists,
    #[error("identity not found")]
    IdentityNotFound,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("token revoked")]
    TokenRevoked,
    #[error("federated sign-in failed: {0}")]
    FederatedSignIn(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TokenClass {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub user_id: UserId,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone)]
pub struct FederatedLogin {
    pub identity: IdentityRecord,
    pub tokens: TokenPair,
}

/// Mints and checks signed tokens. Never touches storage.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_pair(&self, user: UserId) -> Result<TokenPair, AuthError>;
    async fn verify(&self, token: &str, class: TokenClass) -> Result<TokenClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn signup(&self, request: SignupInput) -> Result<LoginResult, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    /// Verifies an access token and loads the identity it names.
    async fn authenticate(&self, access_token: &str) -> Result<IdentityRecord, AuthError>;
    /// Mints a pair and records its refresh token as the only valid one.
    async fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError>;
    async fn verify(&self, token: &str, class: TokenClass) -> Result<TokenClaims, AuthError>;
    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError>;
    async fn resolve_or_create(
        &self,
        profile: FederatedProfile,
    ) -> Result<FederatedLogin, AuthError>;
    async fn list_identities(&self) -> Result<Vec<IdentityRecord>, AuthError>;
    /// Removes the identity. Its outstanding tokens stop resolving to anyone.
    async fn delete_identity(&self, user_id: UserId) -> Result<(), AuthError>;
}
