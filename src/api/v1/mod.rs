mod error;
mod handler;
mod router;

pub use error::{ApiErrorCode, recover_error};
pub use handler::{ACCESS_COOKIE, OAUTH_STATE_COOKIE, REFRESH_COOKIE};
pub use router::{JSON_BODY_LIMIT, routes, with_verification};
