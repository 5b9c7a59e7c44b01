use crate::application_port::{
    AccessToken, AuthError, RefreshToken, TokenClaims, TokenClass, TokenCodec, TokenPair,
};
use crate::domain_model::UserId;
use crate::domain_port::Clock;
use crate::logger::*;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("access_secret", &"<redacted>")
            .field("refresh_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // user id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // keeps two pairs minted in the same second distinct
}

struct ClassKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl ClassKeys {
    fn try_new(class: TokenClass, secret: &[u8], ttl: Duration) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Config(format!("{class:?} token secret is empty")));
        }
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::Config(format!("{class:?} token lifetime too large")))?;
        if ttl_secs == 0 {
            return Err(AuthError::Config(format!(
                "{class:?} token lifetime must be at least one second"
            )));
        }
        Ok(ClassKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        })
    }
}

/// HS256 codec with one secret per token class, so a token of one class can
/// never pass verification as the other.
pub struct JwtHs256Codec {
    issuer: String,
    audience: String,
    access: ClassKeys,
    refresh: ClassKeys,
    clock: Arc<dyn Clock>,
}

impl JwtHs256Codec {
    pub fn try_new(cfg: JwtConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        if cfg.access_secret == cfg.refresh_secret {
            return Err(AuthError::Config(
                "access and refresh token secrets must differ".to_string(),
            ));
        }
        let access = ClassKeys::try_new(TokenClass::Access, &cfg.access_secret, cfg.access_ttl)?;
        let refresh =
            ClassKeys::try_new(TokenClass::Refresh, &cfg.refresh_secret, cfg.refresh_ttl)?;

        Ok(JwtHs256Codec {
            issuer: cfg.issuer,
            audience: cfg.audience,
            access,
            refresh,
            clock,
        })
    }

    fn keys(&self, class: TokenClass) -> &ClassKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn encode(&self, user: UserId, class: TokenClass) -> Result<(String, DateTime<Utc>), AuthError> {
        let keys = self.keys(class);
        let iat = self.clock.now().timestamp();
        let exp = iat + keys.ttl_secs;
        let claims = Claims {
            sub: user.to_string(),
            exp,
            iat,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AuthError::Config(e.to_string()))?;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| AuthError::InternalError(format!("expiry out of range: {exp}")))?;
        Ok((token, expires_at))
    }

    fn decode(&self, token: &str, class: TokenClass) -> Result<Claims, AuthError> {
        // Expiry is checked against the injected clock below.
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = false;
        v.set_audience(&[self.audience.as_str()]);
        v.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.keys(class).decoding, &v).map_err(|e| {
            debug!(?class, kind = ?e.kind(), "token rejected");
            AuthError::TokenInvalid
        })?;

        if self.clock.now().timestamp() >= data.claims.exp {
            debug!(?class, "token expired");
            return Err(AuthError::TokenExpired);
        }

        Ok(data.claims)
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, AuthError> {
        sub.parse::<UserId>().map_err(|_| AuthError::TokenInvalid)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_pair(&self, user: UserId) -> Result<TokenPair, AuthError> {
        let (access_token, access_exp) = self.encode(user, TokenClass::Access)?;
        let (refresh_token, refresh_exp) = self.encode(user, TokenClass::Refresh)?;

        Ok(TokenPair {
            access_token: AccessToken(access_token),
            refresh_token: RefreshToken(refresh_token),
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }

    async fn verify(&self, token: &str, class: TokenClass) -> Result<TokenClaims, AuthError> {
        let claims = self.decode(token, class)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(AuthError::TokenInvalid)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::TokenInvalid)?;

        Ok(TokenClaims {
            user_id,
            jti: claims.jti,
            issued_at,
            expires_at,
        })
    }
}
