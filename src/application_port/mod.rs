mod auth_service;
mod oauth_provider;

pub use auth_service::*;
pub use oauth_provider::*;
