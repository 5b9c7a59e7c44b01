use crate::application_port::*;
use crate::domain_model::{FederatedProfile, FederatedProvider};
use crate::logger::*;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleConfig {
    /// Targets Google's public endpoints.
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        GoogleConfig {
            client_id,
            client_secret,
            redirect_uri,
            authorize_url: GOOGLE_AUTHORIZE_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

impl fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: bool,
    given_name: Option<String>,
    family_name: Option<String>,
}

pub struct GoogleOAuthProvider {
    config: GoogleConfig,
    http_client: Client,
}

impl GoogleOAuthProvider {
    pub fn try_new(config: GoogleConfig) -> Result<Self, AuthError> {
        Url::parse(&config.authorize_url)
            .map_err(|e| AuthError::Config(format!("google authorize url: {e}")))?;
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AuthError::Config(
                "google client id and secret must not be empty".to_string(),
            ));
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(format!("http client: {e}")))?;

        Ok(GoogleOAuthProvider {
            config,
            http_client,
        })
    }
}

fn exchange_failed(e: reqwest::Error) -> AuthError {
    AuthError::FederatedSignIn(format!("google: {e}"))
}

#[async_trait::async_trait]
impl OAuthProvider for GoogleOAuthProvider {
    fn provider(&self) -> FederatedProvider {
        FederatedProvider::Google
    }

    fn authorization_url(&self, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Config(format!("google authorize url: {e}")))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<FederatedProfile, AuthError> {
        let token: GoogleTokenResponse = self
            .http_client
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(exchange_failed)?
            .error_for_status()
            .map_err(exchange_failed)?
            .json()
            .await
            .map_err(exchange_failed)?;

        let info: GoogleUserInfo = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(exchange_failed)?
            .error_for_status()
            .map_err(exchange_failed)?
            .json()
            .await
            .map_err(exchange_failed)?;

        if !info.email_verified {
            warn!(subject = %info.sub, "google account email is not verified");
            return Err(AuthError::FederatedSignIn(
                "google account email is not verified".to_string(),
            ));
        }

        Ok(FederatedProfile {
            provider: FederatedProvider::Google,
            subject: info.sub,
            given_name: info.given_name.unwrap_or_default(),
            family_name: info.family_name.unwrap_or_default(),
            email: info.email,
        })
    }
}
