use super::error::*;
use crate::application_port::*;
use crate::domain_model::{IdentityRecord, PublicIdentity, UserId};
use crate::logger::*;
use crate::settings::TokenTransport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::{HeaderValue, StatusCode, header};
use warp::hyper::body::Bytes;
use uuid::Uuid;
use warp::{Reply, reject};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
pub const OAUTH_STATE_COOKIE: &str = "oauthState";

/// How long a started Google sign-in may take to come back.
const OAUTH_STATE_MAX_AGE_SECS: i64 = 10 * 60;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// How freshly issued tokens reach the client.
#[derive(Debug, Clone, Copy)]
pub struct TokenDelivery {
    pub transport: TokenTransport,
    pub secure: bool,
}

impl TokenDelivery {
    fn cookie(&self, name: &str, value: &str, expires_at: DateTime<Utc>) -> String {
        let max_age = (expires_at - Utc::now()).num_seconds().max(0);
        let mut cookie =
            format!("{name}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Strict");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `SameSite=Lax` so the cookie survives the redirect back from Google.
    fn state_cookie(&self, value: &str, max_age: i64) -> String {
        let mut cookie =
            format!("{OAUTH_STATE_COOKIE}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    fn reply<T: Serialize>(
        &self,
        status: StatusCode,
        body: &ApiResponse<T>,
        tokens: &TokenPair,
    ) -> Result<warp::reply::Response, warp::Rejection> {
        let mut response = warp::reply::with_status(warp::reply::json(body), status).into_response();

        if self.transport == TokenTransport::Cookie {
            let cookies = [
                self.cookie(
                    ACCESS_COOKIE,
                    &tokens.access_token.0,
                    tokens.access_token_expires_at,
                ),
                self.cookie(
                    REFRESH_COOKIE,
                    &tokens.refresh_token.0,
                    tokens.refresh_token_expires_at,
                ),
            ];
            for cookie in cookies {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(ApiErrorCode::internal)
                    .map_err(reject::custom)?;
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        Ok(response)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub tokens: TokenPair,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

pub async fn register(
    body: RegisterRequest,
    auth_service: Arc<dyn AuthService>,
    delivery: TokenDelivery,
) -> Result<impl warp::Reply, warp::Rejection> {
    let signup_input = SignupInput {
        name: body.name,
        surname: body.surname,
        email: body.email,
        password: body.password,
    };
    let result = auth_service
        .signup(signup_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = SessionResponse {
        user_id: Some(result.user_id),
        tokens: result.tokens,
    };
    delivery.reply(
        StatusCode::CREATED,
        &ApiResponse::ok(&response),
        &response.tokens,
    )
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    delivery: TokenDelivery,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        email: body.email,
        password: body.password,
    };
    let result = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = SessionResponse {
        user_id: Some(result.user_id),
        tokens: result.tokens,
    };
    delivery.reply(StatusCode::OK, &ApiResponse::ok(&response), &response.tokens)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// The token comes from the JSON body when there is one, else from the cookie.
pub async fn refresh_token(
    cookie: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    delivery: TokenDelivery,
) -> Result<impl warp::Reply, warp::Rejection> {
    let from_body = if body.is_empty() {
        None
    } else {
        let request: RefreshRequest = serde_json::from_slice(&body)
            .map_err(|_| reject::custom(ApiErrorCode::InvalidRequest))?;
        Some(request.refresh_token)
    };
    let presented = from_body
        .or(cookie)
        .ok_or_else(|| reject::custom(ApiErrorCode::MissingToken))?;

    let tokens = auth_service
        .rotate(&presented)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = SessionResponse {
        user_id: None,
        tokens,
    };
    delivery.reply(StatusCode::OK, &ApiResponse::ok(&response), &response.tokens)
}

pub async fn me(identity: IdentityRecord) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::json(&ApiResponse::ok(PublicIdentity::from(
        &identity,
    ))))
}

pub async fn delete_me(
    identity: IdentityRecord,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    auth_service
        .delete_identity(identity.user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_users(
    _caller: IdentityRecord,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let identities = auth_service
        .list_identities()
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let users: Vec<PublicIdentity> = identities.iter().map(PublicIdentity::from).collect();
    Ok(warp::reply::json(&ApiResponse::ok(users)))
}

fn header_value(value: &str) -> Result<HeaderValue, warp::Rejection> {
    HeaderValue::from_str(value)
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)
}

/// Starts Google sign-in: remembers a fresh `state` in a cookie and redirects
/// the browser to Google's consent page.
pub async fn google_login(
    google: Option<Arc<dyn OAuthProvider>>,
    delivery: TokenDelivery,
) -> Result<impl warp::Reply, warp::Rejection> {
    let google = google.ok_or_else(|| reject::custom(ApiErrorCode::NotFound))?;

    let state = Uuid::new_v4().simple().to_string();
    let location = google
        .authorization_url(&state)
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    headers.insert(header::LOCATION, header_value(&location)?);
    headers.append(
        header::SET_COOKIE,
        header_value(&delivery.state_cookie(&state, OAUTH_STATE_MAX_AGE_SECS))?,
    );
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Finishes Google sign-in and hands out a token pair like login does.
pub async fn google_callback(
    query: OAuthCallbackQuery,
    expected_state: Option<String>,
    google: Option<Arc<dyn OAuthProvider>>,
    auth_service: Arc<dyn AuthService>,
    delivery: TokenDelivery,
) -> Result<impl warp::Reply, warp::Rejection> {
    let google = google.ok_or_else(|| reject::custom(ApiErrorCode::NotFound))?;

    if let Some(error) = query.error {
        debug!(%error, "google sign-in was not granted");
        return Err(reject::custom(ApiErrorCode::FederatedSignInFailed));
    }
    match (query.state.as_deref(), expected_state.as_deref()) {
        (Some(got), Some(expected)) if got == expected => {}
        _ => {
            warn!("google callback state does not match");
            return Err(reject::custom(ApiErrorCode::InvalidRequest));
        }
    }
    let code = query
        .code
        .ok_or_else(|| reject::custom(ApiErrorCode::InvalidRequest))?;

    let profile = google
        .exchange_code(&code)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;
    let login = auth_service
        .resolve_or_create(profile)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let response = SessionResponse {
        user_id: Some(login.identity.user_id),
        tokens: login.tokens,
    };
    let mut reply = delivery.reply(StatusCode::OK, &ApiResponse::ok(&response), &response.tokens)?;
    reply
        .headers_mut()
        .append(header::SET_COOKIE, header_value(&delivery.state_cookie("", 0))?);
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(transport: TokenTransport, secure: bool) -> TokenDelivery {
        TokenDelivery { transport, secure }
    }

    #[test]
    fn cookies_are_http_only_and_optionally_secure() {
        let expires = Utc::now() + chrono::Duration::minutes(15);

        let plain = delivery(TokenTransport::Cookie, false).cookie(ACCESS_COOKIE, "abc", expires);
        assert!(plain.starts_with("accessToken=abc; Max-Age="));
        assert!(plain.contains("HttpOnly"));
        assert!(!plain.contains("Secure"));

        let secure = delivery(TokenTransport::Cookie, true).cookie(REFRESH_COOKIE, "xyz", expires);
        assert!(secure.ends_with("; Secure"));
    }

    #[test]
    fn state_cookie_is_lax_so_it_survives_the_redirect() {
        let cookie = delivery(TokenTransport::Bearer, true).state_cookie("st", 600);
        assert!(cookie.starts_with("oauthState=st; Max-Age=600;"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn expired_cookie_gets_zero_max_age() {
        let past = Utc::now() - chrono::Duration::minutes(1);
        let cookie = delivery(TokenTransport::Cookie, false).cookie(ACCESS_COOKIE, "abc", past);
        assert!(cookie.contains("Max-Age=0;"));
    }
}
