use super::util::is_dup_key;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

const SELECT_IDENTITY: &str = r#"
SELECT user_id, name, surname, email, password_hash,
       federated_provider, federated_subject, current_refresh_token, created_at
FROM identity
"#;

pub struct MySqlIdentityRepo {
    pool: MySqlPool,
}

impl MySqlIdentityRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlIdentityRepo { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<IdentityRecord, AuthError> {
        let store = |e: sqlx::Error| AuthError::Store(e.to_string());

        let provider: Option<String> = row.try_get("federated_provider").map_err(store)?;
        let subject: Option<String> = row.try_get("federated_subject").map_err(store)?;
        let federated = match (provider, subject) {
            (Some(provider), Some(subject)) => Some(FederatedId {
                provider: provider.parse().map_err(AuthError::Store)?,
                subject,
            }),
            _ => None,
        };
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store)?;

        Ok(IdentityRecord {
            user_id: row.try_get("user_id").map_err(store)?,
            name: row.try_get("name").map_err(store)?,
            surname: row.try_get("surname").map_err(store)?,
            email: row.try_get("email").map_err(store)?,
            password_hash: row.try_get("password_hash").map_err(store)?,
            federated,
            current_refresh_token: row.try_get("current_refresh_token").map_err(store)?,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MySqlIdentityRepo {
    async fn find_by_id(&self, user_id: UserId) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt = sqlx::query(&format!("{SELECT_IDENTITY} WHERE user_id = ?"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query identity by id: {e}")))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt = sqlx::query(&format!("{SELECT_IDENTITY} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("query identity by email: {e}")))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn find_by_federated_id(
        &self,
        provider: FederatedProvider,
        subject: &str,
    ) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt = sqlx::query(&format!(
            "{SELECT_IDENTITY} WHERE federated_provider = ? AND federated_subject = ?"
        ))
        .bind(provider.as_str())
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("query identity by federated id: {e}")))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>, AuthError> {
        let rows = sqlx::query(&format!("{SELECT_IDENTITY} ORDER BY created_at, user_id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("list identities: {e}")))?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn create(
        &self,
        user_id: UserId,
        identity: NewIdentity,
    ) -> Result<IdentityRecord, AuthError> {
        let (provider, subject) = match &identity.federated {
            Some(f) => (Some(f.provider.as_str()), Some(f.subject.as_str())),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
INSERT INTO identity (user_id, name, surname, email, password_hash,
                      federated_provider, federated_subject)
VALUES (?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(user_id)
        .bind(&identity.name)
        .bind(&identity.surname)
        .bind(&identity.email)
        .bind(identity.password_hash.as_deref())
        .bind(provider)
        .bind(subject)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_dup_key(&e) => return Err(AuthError::UserExists),
            Err(e) => return Err(AuthError::Store(e.to_string())),
        }

        self.find_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::Store(format!("identity {user_id} vanished after insert")))
    }

    async fn set_refresh_token(
        &self,
        user_id: UserId,
        token: Option<&str>,
    ) -> Result<(), AuthError> {
        let result = sqlx::query("UPDATE identity SET current_refresh_token = ? WHERE user_id = ?")
            .bind(token)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        // MySQL reports matched-but-unchanged rows as 0, so confirm existence.
        if result.rows_affected() == 0 && self.find_by_id(user_id).await?.is_none() {
            return Err(AuthError::IdentityNotFound);
        }
        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        replacement: &str,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
UPDATE identity
SET current_refresh_token = ?
WHERE user_id = ? AND current_refresh_token = ?
"#,
        )
        .bind(replacement)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        if self.find_by_id(user_id).await?.is_none() {
            return Err(AuthError::IdentityNotFound);
        }
        Ok(false)
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, AuthError> {
        let result = sqlx::query("DELETE FROM identity WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("delete identity: {e}")))?;

        Ok(result.rows_affected() == 1)
    }
}
