use super::error::*;
use super::handler::{self, ACCESS_COOKIE, OAUTH_STATE_COOKIE, REFRESH_COOKIE, TokenDelivery};
use crate::application_port::{AuthService, OAuthProvider};
use crate::domain_model::IdentityRecord;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::hyper::body::Bytes;
use warp::{Filter, reject};

pub const JSON_BODY_LIMIT: u64 = 16 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let delivery = TokenDelivery {
        transport: server.token_transport,
        secure: server.secure_cookies,
    };

    let register = warp::path("users")
        .and(warp::path("register"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_delivery(delivery))
        .and_then(handler::register);

    let login = warp::path("users")
        .and(warp::path("login"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(JSON_BODY_LIMIT))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_delivery(delivery))
        .and_then(handler::login);

    let refresh = warp::path("users")
        .and(warp::path("refreshToken"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::cookie::optional(REFRESH_COOKIE))
        .and(optional_body(JSON_BODY_LIMIT))
        .and(with(server.auth_service.clone()))
        .and(with_delivery(delivery))
        .and_then(handler::refresh_token);

    let me = warp::path("users")
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and_then(handler::me);

    let delete_me = warp::path("users")
        .and(warp::path("me"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::delete_me);

    let list_users = warp::path("users")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::list_users);

    let google_login = warp::path("users")
        .and(warp::path("googleLogin"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_google(server.google.clone()))
        .and(with_delivery(delivery))
        .and_then(handler::google_login);

    let google_callback = warp::path("users")
        .and(warp::path("googleCallback"))
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query())
        .and(warp::cookie::optional(OAUTH_STATE_COOKIE))
        .and(with_google(server.google.clone()))
        .and(with(server.auth_service.clone()))
        .and(with_delivery(delivery))
        .and_then(handler::google_callback);

    register
        .or(login)
        .or(refresh)
        .or(me)
        .or(delete_me)
        .or(list_users)
        .or(google_login)
        .or(google_callback)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_google(
    google: Option<Arc<dyn OAuthProvider>>,
) -> impl Filter<Extract = (Option<Arc<dyn OAuthProvider>>,), Error = Infallible> + Clone {
    warp::any().map(move || google.clone())
}

/// A body of at most `limit` bytes. A request with neither `Content-Length`
/// nor `Transfer-Encoding` has no body and yields an empty one.
fn optional_body(limit: u64) -> impl Filter<Extract = (Bytes,), Error = warp::Rejection> + Clone {
    let bodiless = warp::header::optional::<String>("content-length")
        .and(warp::header::optional::<String>("transfer-encoding"))
        .and_then(|length: Option<String>, encoding: Option<String>| async move {
            match (length, encoding) {
                (None, None) => Ok(Bytes::new()),
                _ => Err(reject::not_found()),
            }
        });
    let sized = warp::body::content_length_limit(limit).and(warp::body::bytes());

    bodiless.or(sized).unify()
}

fn with_delivery(
    delivery: TokenDelivery,
) -> impl Filter<Extract = (TokenDelivery,), Error = Infallible> + Clone {
    warp::any().map(move || delivery)
}

/// Picks the access token from `Authorization: Bearer` or, failing that, the
/// `accessToken` cookie. The scheme name is case-insensitive.
fn access_token(header: Option<&str>, cookie: Option<String>) -> Result<String, ApiErrorCode> {
    let Some(value) = header else {
        return cookie.ok_or(ApiErrorCode::MissingToken);
    };
    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim().to_string())
        }
        _ => Err(ApiErrorCode::InvalidToken),
    }
}

/// The request gate: resolves the caller's identity or rejects the request.
pub fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (IdentityRecord,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::cookie::optional(ACCESS_COOKIE))
        .and_then(move |header: Option<String>, cookie: Option<String>| {
            let auth_service = auth_service.clone();
            async move {
                let token = access_token(header.as_deref(), cookie).map_err(reject::custom)?;
                let identity = auth_service
                    .authenticate(&token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok::<_, warp::Rejection>(identity)
            }
        })
}
