mod auth_service_impl;
mod credential_hasher;
mod google_oauth;
mod jwt_codec;

pub use auth_service_impl::*;
pub use credential_hasher::*;
pub use google_oauth::*;
pub use jwt_codec::*;
