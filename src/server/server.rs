use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::settings::{Settings, TokenTransport};
use anyhow::anyhow;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub token_transport: TokenTransport,
    pub secure_cookies: bool,
    /// Set when Google sign-in is configured.
    pub google: Option<Arc<dyn OAuthProvider>>,
    pool: Option<Pool<MySql>>,
}

pub fn jwt_config(settings: &Settings) -> JwtConfig {
    JwtConfig {
        issuer: settings.auth.issuer.clone(),
        audience: settings.auth.audience.clone(),
        access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
        refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
        access_secret: settings.auth.access_secret.clone().into_bytes(),
        refresh_secret: settings.auth.refresh_secret.clone().into_bytes(),
    }
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        // Bad secrets stop start-up here rather than failing per request.
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let token_codec: Arc<dyn TokenCodec> = Arc::new(
            JwtHs256Codec::try_new(jwt_config(settings), clock)
                .map_err(|e| anyhow!("token authority: {e}"))?,
        );

        let mut pool = None;
        let identity_repo: Arc<dyn IdentityRepo> = match settings.storage.backend.as_str() {
            "memory" => Arc::new(MemoryIdentityRepo::new()),
            "mysql" => {
                let dsn = settings
                    .storage
                    .mysql_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("storage.mysql_dsn is required for mysql"))?;
                let mysql = Pool::<MySql>::connect(dsn).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlIdentityRepo::new(mysql))
            }
            other => return Err(anyhow!("Unknown storage backend: {}", other)),
        };

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher::new());

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            identity_repo,
            credential_hasher,
            token_codec,
        ));

        let google: Option<Arc<dyn OAuthProvider>> = match &settings.google {
            Some(google) => {
                let provider = GoogleOAuthProvider::try_new(GoogleConfig::new(
                    google.client_id.clone(),
                    google.client_secret.clone(),
                    google.redirect_uri.clone(),
                ))
                .map_err(|e| anyhow!("google sign-in: {e}"))?;
                Some(Arc::new(provider) as Arc<dyn OAuthProvider>)
            }
            None => None,
        };

        info!(
            storage = %settings.storage.backend,
            transport = ?settings.http.token_transport,
            google = google.is_some(),
            "server started"
        );

        Ok(Self {
            auth_service,
            token_transport: settings.http.token_transport,
            secure_cookies: settings.http.tls.is_some(),
            google,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
