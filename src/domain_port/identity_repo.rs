use crate::application_port::*;
use crate::domain_model::*;

#[async_trait::async_trait]
pub trait IdentityRepo: Send + Sync {
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError>;

    /// `email` must already be normalized.
    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError>;

    async fn find_by_federated_id(
        &self,
        provider: FederatedProvider,
        subject: &str,
    ) -> Result<Option<IdentityRecord>, AuthError>;

    /// Every identity, oldest first.
    async fn list(&self) -> Result<Vec<IdentityRecord>, AuthError>;

    /// Fails with `UserExists` when the email or federated id is already taken.
    async fn create(
        &self,
        user_id: UserId,
        identity: NewIdentity,
    ) -> Result<IdentityRecord, AuthError>;

    /// Unconditionally overwrites the current refresh token.
    async fn set_refresh_token(
        &self,
        user_id: UserId,
        token: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Replaces the current refresh token only if it still equals `expected`.
    /// Returns `false` when another writer got there first.
    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError>;

    /// Returns `false` when there was no such identity.
    async fn delete(&self, user_id: UserId) -> Result<bool, AuthError>;
}
