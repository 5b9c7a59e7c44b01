use super::AuthError;
use crate::domain_model::{FederatedProfile, FederatedProvider};

/// The authorization-code flow of one external identity provider.
#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> FederatedProvider;

    /// Where to send the browser to start signing in. `state` comes back
    /// untouched on the callback.
    fn authorization_url(&self, state: &str) -> Result<String, AuthError>;

    /// Trades the callback's code for the caller's verified profile.
    async fn exchange_code(&self, code: &str) -> Result<FederatedProfile, AuthError>;
}
