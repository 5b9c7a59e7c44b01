use super::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FederatedProvider {
    Google,
}

impl FederatedProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            FederatedProvider::Google => "google",
        }
    }
}

impl fmt::Display for FederatedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FederatedProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(FederatedProvider::Google),
            other => Err(format!("unknown federated provider: {other}")),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct FederatedId {
    pub provider: FederatedProvider,
    pub subject: String,
}

/// The durable user record. `current_refresh_token` is the only refresh token
/// that may be redeemed for this user.
#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub federated: Option<FederatedId>,
    pub current_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub federated: Option<FederatedId>,
}

/// A profile already verified by an external OAuth exchange.
#[derive(Debug, Clone)]
pub struct FederatedProfile {
    pub provider: FederatedProvider,
    pub subject: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
}

impl FederatedProfile {
    pub fn federated_id(&self) -> FederatedId {
        FederatedId {
            provider: self.provider,
            subject: self.subject.clone(),
        }
    }
}

/// Identity fields safe to hand back to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicIdentity {
    pub user_id: UserId,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub federated_provider: Option<FederatedProvider>,
    pub created_at: DateTime<Utc>,
}

impl From<&IdentityRecord> for PublicIdentity {
    fn from(record: &IdentityRecord) -> Self {
        PublicIdentity {
            user_id: record.user_id,
            name: record.name.clone(),
            surname: record.surname.clone(),
            email: record.email.clone(),
            federated_provider: record.federated.as_ref().map(|f| f.provider),
            created_at: record.created_at,
        }
    }
}
