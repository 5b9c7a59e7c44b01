use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{debug, warn};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::{
    InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType,
};
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (code, message) = if let Some(code) = err.find::<ApiErrorCode>() {
        (code.clone(), code.to_string())
    } else if err.is_not_found() {
        (ApiErrorCode::NotFound, ApiErrorCode::NotFound.to_string())
    } else if err.find::<MethodNotAllowed>().is_some() {
        (
            ApiErrorCode::MethodNotAllowed,
            ApiErrorCode::MethodNotAllowed.to_string(),
        )
    } else if err.find::<PayloadTooLarge>().is_some() {
        (
            ApiErrorCode::PayloadTooLarge,
            ApiErrorCode::PayloadTooLarge.to_string(),
        )
    } else if err.find::<LengthRequired>().is_some() {
        (
            ApiErrorCode::LengthRequired,
            ApiErrorCode::LengthRequired.to_string(),
        )
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            ApiErrorCode::UnsupportedMediaType,
            ApiErrorCode::UnsupportedMediaType.to_string(),
        )
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (ApiErrorCode::InvalidRequest, e.to_string())
    } else if let Some(e) = err.find::<InvalidQuery>() {
        (ApiErrorCode::InvalidRequest, e.to_string())
    } else {
        warn!("Unhandled rejection: {:?}", err);
        (
            ApiErrorCode::InternalError,
            ApiErrorCode::InternalError.to_string(),
        )
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), message));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Request is not valid")]
    InvalidRequest,
    #[error("Request body is too large")]
    PayloadTooLarge,
    #[error("Request body must be JSON")]
    UnsupportedMediaType,
    #[error("Content-Length is required")]
    LengthRequired,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Please provide a token")]
    MissingToken,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Federated sign-in failed")]
    FederatedSignInFailed,
    #[error("User not found")]
    UserNotFound,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiErrorCode::LengthRequired => StatusCode::LENGTH_REQUIRED,
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::MissingToken
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::FederatedSignInFailed => StatusCode::UNAUTHORIZED,
            ApiErrorCode::EmailTaken => StatusCode::CONFLICT,
            ApiErrorCode::UserNotFound | ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::InvalidInput(reason) => {
                debug!(%reason, "invalid input");
                ApiErrorCode::InvalidRequest
            }
            AuthError::UserExists => ApiErrorCode::EmailTaken,
            AuthError::IdentityNotFound => ApiErrorCode::UserNotFound,
            AuthError::TokenExpired => ApiErrorCode::TokenExpired,
            AuthError::FederatedSignIn(reason) => {
                debug!(%reason, "federated sign-in refused");
                ApiErrorCode::FederatedSignInFailed
            }
            // Clients see one code; the kind stays in the logs.
            e @ (AuthError::TokenInvalid | AuthError::TokenRevoked) => {
                debug!(kind = %e, "token refused");
                ApiErrorCode::InvalidToken
            }
            e @ (AuthError::Store(_) | AuthError::Config(_) | AuthError::InternalError(_)) => {
                ApiErrorCode::internal(e)
            }
        }
    }
}
