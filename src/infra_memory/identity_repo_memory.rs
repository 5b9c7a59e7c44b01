use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Process-local identity store. Each record lives behind a `DashMap` shard
/// lock, which serializes writers to the same identity.
#[derive(Default)]
pub struct MemoryIdentityRepo {
    by_id: DashMap<UserId, IdentityRecord>,
    by_email: DashMap<String, UserId>,
    by_federated: DashMap<FederatedId, UserId>,
}

impl MemoryIdentityRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn get_cloned(&self, user_id: &UserId) -> Option<IdentityRecord> {
        self.by_id.get(user_id).map(|r| r.value().clone())
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MemoryIdentityRepo {
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError> {
        Ok(self.get_cloned(&user_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let user_id = self.by_email.get(email).map(|r| *r.value());
        Ok(user_id.and_then(|id| self.get_cloned(&id)))
    }

    async fn find_by_federated_id(
        &self,
        provider: FederatedProvider,
        subject: &str,
    ) -> Result<Option<IdentityRecord>, AuthError> {
        let key = FederatedId {
            provider,
            subject: subject.to_string(),
        };
        let user_id = self.by_federated.get(&key).map(|r| *r.value());
        Ok(user_id.and_then(|id| self.get_cloned(&id)))
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>, AuthError> {
        let mut all: Vec<IdentityRecord> = self.by_id.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.created_at);
        Ok(all)
    }

    async fn create(
        &self,
        user_id: UserId,
        identity: NewIdentity,
    ) -> Result<IdentityRecord, AuthError> {
        match self.by_email.entry(identity.email.clone()) {
            Entry::Occupied(_) => return Err(AuthError::UserExists),
            Entry::Vacant(slot) => {
                slot.insert(user_id);
            }
        }

        if let Some(federated) = &identity.federated {
            let taken = match self.by_federated.entry(federated.clone()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(user_id);
                    false
                }
            };
            if taken {
                self.by_email.remove(&identity.email);
                return Err(AuthError::UserExists);
            }
        }

        let record = IdentityRecord {
            user_id,
            name: identity.name,
            surname: identity.surname,
            email: identity.email,
            password_hash: identity.password_hash,
            federated: identity.federated,
            current_refresh_token: None,
            created_at: Utc::now(),
        };
        self.by_id.insert(user_id, record.clone());
        Ok(record)
    }

    async fn set_refresh_token(
        &self,
        user_id: UserId,
        token: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut record = self
            .by_id
            .get_mut(&user_id)
            .ok_or(AuthError::IdentityNotFound)?;
        record.current_refresh_token = token.map(str::to_string);
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let mut record = self
            .by_id
            .get_mut(&user_id)
            .ok_or(AuthError::IdentityNotFound)?;
        if record.current_refresh_token.as_deref() != Some(expected) {
            return Ok(false);
        }
        record.current_refresh_token = Some(replacement.to_string());
        Ok(true)
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, AuthError> {
        let Some((_, record)) = self.by_id.remove(&user_id) else {
            return Ok(false);
        };
        // Only release index entries this identity still owns.
        self.by_email.remove_if(&record.email, |_, owner| *owner == user_id);
        if let Some(federated) = &record.federated {
            self.by_federated
                .remove_if(federated, |_, owner| *owner == user_id);
        }
        Ok(true)
    }
}
