use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::IdentityRepo;
use crate::logger::*;
use std::sync::Arc;

pub struct RealAuthService {
    identity_repo: Arc<dyn IdentityRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    min_password_len: usize,
}

impl RealAuthService {
    pub fn new(
        identity_repo: Arc<dyn IdentityRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
    ) -> Self {
        Self {
            identity_repo,
            credential_hasher,
            token_codec,
            min_password_len: 6,
        }
    }

    fn validate_signup(&self, input: &SignupInput) -> Result<(), AuthError> {
        if input.name.trim().is_empty() || input.surname.trim().is_empty() {
            return Err(AuthError::InvalidInput("name and surname are required".to_string()));
        }
        if !input.email.contains('@') {
            return Err(AuthError::InvalidInput("email is not valid".to_string()));
        }
        if input.password.chars().count() < self.min_password_len {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                self.min_password_len
            )));
        }
        Ok(())
    }

    async fn find_or_create_federated(
        &self,
        profile: FederatedProfile,
    ) -> Result<IdentityRecord, AuthError> {
        if let Some(existing) = self
            .identity_repo
            .find_by_federated_id(profile.provider, &profile.subject)
            .await?
        {
            return Ok(existing);
        }

        let new_identity = NewIdentity {
            name: profile.given_name.clone(),
            surname: profile.family_name.clone(),
            email: normalize_email(&profile.email),
            password_hash: None,
            federated: Some(profile.federated_id()),
        };
        let user_id = UserId::new_random();
        match self.identity_repo.create(user_id, new_identity).await {
            Ok(created) => {
                info!(%user_id, provider = %profile.provider, "federated identity created");
                Ok(created)
            }
            // Either a concurrent sign-in created it first, or the email is taken.
            Err(AuthError::UserExists) => self
                .identity_repo
                .find_by_federated_id(profile.provider, &profile.subject)
                .await?
                .ok_or(AuthError::UserExists),
            Err(e) => Err(e),
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn signup(&self, request: SignupInput) -> Result<LoginResult, AuthError> {
        self.validate_signup(&request)?;
        let SignupInput {
            name,
            surname,
            email,
            password,
        } = request;
        let email = normalize_email(&email);

        if self.identity_repo.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserExists);
        }

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let user_id = UserId::new_random();
        self.identity_repo
            .create(
                user_id,
                NewIdentity {
                    name,
                    surname,
                    email,
                    password_hash: Some(password_hash),
                    federated: None,
                },
            )
            .await?;
        info!(%user_id, "identity registered");

        let tokens = self.issue_pair(user_id).await?;
        Ok(LoginResult { user_id, tokens })
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { email, password } = request;

        let rec = self
            .identity_repo
            .find_by_email(&normalize_email(&email))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // Federated-only identities have no local password.
        let password_hash = rec
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;

        let ok = self
            .credential_hasher
            .verify_password(&password, password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.issue_pair(rec.user_id).await?;
        Ok(LoginResult {
            user_id: rec.user_id,
            tokens,
        })
    }

    async fn authenticate(&self, access_token: &str) -> Result<IdentityRecord, AuthError> {
        let claims = self
            .token_codec
            .verify(access_token, TokenClass::Access)
            .await?;

        self.identity_repo
            .find_by_id(claims.user_id)
            .await?
            .ok_or(AuthError::IdentityNotFound)
    }

    async fn issue_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        let tokens = self.token_codec.issue_pair(user_id).await?;
        self.identity_repo
            .set_refresh_token(user_id, Some(&tokens.refresh_token.0))
            .await?;
        debug!(%user_id, "token pair issued");
        Ok(tokens)
    }

    async fn verify(&self, token: &str, class: TokenClass) -> Result<TokenClaims, AuthError> {
        self.token_codec.verify(token, class).await
    }

    async fn rotate(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .token_codec
            .verify(refresh_token, TokenClass::Refresh)
            .await?;
        let user_id = claims.user_id;

        let rec = self
            .identity_repo
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::IdentityNotFound)?;

        if rec.current_refresh_token.as_deref() != Some(refresh_token) {
            warn!(%user_id, "rotated-out refresh token presented");
            return Err(AuthError::TokenRevoked);
        }

        let tokens = self.token_codec.issue_pair(user_id).await?;

        // Compare-and-swap so that only one concurrent redemption wins.
        let swapped = self
            .identity_repo
            .swap_refresh_token(user_id, refresh_token, &tokens.refresh_token.0)
            .await?;
        if !swapped {
            warn!(%user_id, "refresh token redeemed concurrently");
            return Err(AuthError::TokenRevoked);
        }

        debug!(%user_id, "refresh token rotated");
        Ok(tokens)
    }

    async fn resolve_or_create(
        &self,
        profile: FederatedProfile,
    ) -> Result<FederatedLogin, AuthError> {
        let identity = self.find_or_create_federated(profile).await?;
        let tokens = self.issue_pair(identity.user_id).await?;

        // Return the record as it now stands, with the new refresh token.
        let identity = IdentityRecord {
            current_refresh_token: Some(tokens.refresh_token.0.clone()),
            ..identity
        };
        Ok(FederatedLogin { identity, tokens })
    }

    async fn list_identities(&self) -> Result<Vec<IdentityRecord>, AuthError> {
        self.identity_repo.list().await
    }

    async fn delete_identity(&self, user_id: UserId) -> Result<(), AuthError> {
        if !self.identity_repo.delete(user_id).await? {
            return Err(AuthError::IdentityNotFound);
        }
        info!(%user_id, "identity deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{
        Argon2PasswordHasher, DEFAULT_ACCESS_TTL, DEFAULT_REFRESH_TTL, JwtConfig, JwtHs256Codec,
    };
    use crate::domain_port::{Clock, ManualClock};
    use crate::infra_memory::MemoryIdentityRepo;
    use argon2::Params;
    use chrono::{DateTime, Duration};

    struct Fixture {
        service: Arc<RealAuthService>,
        repo: Arc<MemoryIdentityRepo>,
        codec: Arc<JwtHs256Codec>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let codec = Arc::new(
            JwtHs256Codec::try_new(
                JwtConfig {
                    issuer: "quill.auth".to_string(),
                    audience: "quill-client".to_string(),
                    access_ttl: DEFAULT_ACCESS_TTL,
                    refresh_ttl: DEFAULT_REFRESH_TTL,
                    access_secret: b"access-secret".to_vec(),
                    refresh_secret: b"refresh-secret".to_vec(),
                },
                dyn_clock,
            )
            .unwrap(),
        );
        let repo = Arc::new(MemoryIdentityRepo::new());
        let hasher = Arc::new(Argon2PasswordHasher::with_params(
            Params::new(8, 1, 1, None).unwrap(),
        ));
        let service = Arc::new(RealAuthService::new(repo.clone(), hasher, codec.clone()));
        Fixture {
            service,
            repo,
            codec,
            clock,
        }
    }

    fn signup_input(email: &str) -> SignupInput {
        SignupInput {
            name: "Ada".to_string(),
            surname: "Lovelace".to_string(),
            email: email.to_string(),
            password: "analytical".to_string(),
        }
    }

    fn google_profile() -> FederatedProfile {
        FederatedProfile {
            provider: FederatedProvider::Google,
            subject: "g-42".to_string(),
            given_name: "Grace".to_string(),
            family_name: "Hopper".to_string(),
            email: "a@b.com".to_string(),
        }
    }

    async fn stored_refresh_token(f: &Fixture, user_id: UserId) -> Option<String> {
        f.repo
            .find_by_id(user_id)
            .await
            .unwrap()
            .unwrap()
            .current_refresh_token
    }

    #[tokio::test]
    async fn signup_records_the_issued_refresh_token() {
        let f = fixture();
        let result = f.service.signup(signup_input("Ada@Example.com")).await.unwrap();

        assert_eq!(
            stored_refresh_token(&f, result.user_id).await.as_deref(),
            Some(result.tokens.refresh_token.0.as_str())
        );
        let record = f.repo.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(record.user_id, result.user_id);
        assert_ne!(record.password_hash.as_deref(), Some("analytical"));
    }

    #[tokio::test]
    async fn signup_rejects_duplicates_and_bad_input() {
        let f = fixture();
        f.service.signup(signup_input("ada@example.com")).await.unwrap();

        let err = f.service.signup(signup_input("ADA@example.com ")).await.unwrap_err();
        assert!(matches!(err, AuthError::UserExists));

        let short = SignupInput {
            password: "12345".to_string(),
            ..signup_input("new@example.com")
        };
        assert!(matches!(
            f.service.signup(short).await,
            Err(AuthError::InvalidInput(_))
        ));

        let no_at = signup_input("not-an-email");
        assert!(matches!(
            f.service.signup(no_at).await,
            Err(AuthError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn login_checks_the_password() {
        let f = fixture();
        let signed_up = f.service.signup(signup_input("ada@example.com")).await.unwrap();

        let login = f
            .service
            .login(LoginInput {
                email: "ada@example.com".to_string(),
                password: "analytical".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(login.user_id, signed_up.user_id);

        let err = f
            .service
            .login(LoginInput {
                email: "ada@example.com".to_string(),
                password: "difference".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = f
            .service
            .login(LoginInput {
                email: "nobody@example.com".to_string(),
                password: "analytical".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn new_login_revokes_the_previous_refresh_token() {
        let f = fixture();
        let first = f.service.signup(signup_input("ada@example.com")).await.unwrap();
        f.service
            .login(LoginInput {
                email: "ada@example.com".to_string(),
                password: "analytical".to_string(),
            })
            .await
            .unwrap();

        let err = f
            .service
            .rotate(&first.tokens.refresh_token.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
    }

    #[tokio::test]
    async fn authenticate_loads_the_identity_behind_an_access_token() {
        let f = fixture();
        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();

        let record = f
            .service
            .authenticate(&result.tokens.access_token.0)
            .await
            .unwrap();
        assert_eq!(record.user_id, result.user_id);

        let err = f
            .service
            .authenticate(&result.tokens.refresh_token.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));

        f.clock.advance(Duration::minutes(16));
        let err = f
            .service
            .authenticate(&result.tokens.access_token.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn authenticate_fails_for_unknown_identity() {
        let f = fixture();
        let pair = f.codec.issue_pair(UserId::new_random()).await.unwrap();

        let err = f.service.authenticate(&pair.access_token.0).await.unwrap_err();
        assert!(matches!(err, AuthError::IdentityNotFound));
    }

    #[tokio::test]
    async fn issued_pair_verifies_through_the_service() {
        let f = fixture();
        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();

        let claims = f
            .service
            .verify(&result.tokens.refresh_token.0, TokenClass::Refresh)
            .await
            .unwrap();
        assert_eq!(claims.user_id, result.user_id);
        assert!(matches!(
            f.service
                .verify(&result.tokens.refresh_token.0, TokenClass::Access)
                .await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn refresh_token_is_single_use() {
        let f = fixture();
        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();
        let presented = result.tokens.refresh_token.0;

        let rotated = f.service.rotate(&presented).await.unwrap();
        assert_ne!(rotated.refresh_token.0, presented);
        assert_eq!(
            stored_refresh_token(&f, result.user_id).await.as_deref(),
            Some(rotated.refresh_token.0.as_str())
        );

        let err = f.service.rotate(&presented).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));

        // The successor keeps working.
        f.service.rotate(&rotated.refresh_token.0).await.unwrap();
    }

    #[tokio::test]
    async fn rotation_without_a_recorded_token_is_revoked() {
        let f = fixture();
        let user_id = UserId::new_random();
        f.repo
            .create(
                user_id,
                NewIdentity {
                    name: "U".to_string(),
                    surname: "One".to_string(),
                    email: "u1@example.com".to_string(),
                    password_hash: None,
                    federated: None,
                },
            )
            .await
            .unwrap();

        let signed = f.codec.issue_pair(user_id).await.unwrap();
        let err = f.service.rotate(&signed.refresh_token.0).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));
        assert!(stored_refresh_token(&f, user_id).await.is_none());
    }

    #[tokio::test]
    async fn rotation_reports_each_failure_kind() {
        let f = fixture();

        let orphan = f.codec.issue_pair(UserId::new_random()).await.unwrap();
        assert!(matches!(
            f.service.rotate(&orphan.refresh_token.0).await,
            Err(AuthError::IdentityNotFound)
        ));

        assert!(matches!(
            f.service.rotate("garbage").await,
            Err(AuthError::TokenInvalid)
        ));

        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();
        assert!(matches!(
            f.service.rotate(&result.tokens.access_token.0).await,
            Err(AuthError::TokenInvalid)
        ));

        f.clock.advance(Duration::days(7) + Duration::seconds(1));
        assert!(matches!(
            f.service.rotate(&result.tokens.refresh_token.0).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotations_have_exactly_one_winner() {
        let f = fixture();
        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();
        let presented = result.tokens.refresh_token.0;

        let a = {
            let service = f.service.clone();
            let token = presented.clone();
            tokio::spawn(async move { service.rotate(&token).await })
        };
        let b = {
            let service = f.service.clone();
            let token = presented.clone();
            tokio::spawn(async move { service.rotate(&token).await })
        };
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        let winners: Vec<&TokenPair> = outcomes.iter().filter_map(|o| o.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(
            outcomes
                .iter()
                .any(|o| matches!(o, Err(AuthError::TokenRevoked)))
        );
        assert_eq!(
            stored_refresh_token(&f, result.user_id).await.as_deref(),
            Some(winners[0].refresh_token.0.as_str())
        );
    }

    #[tokio::test]
    async fn federated_sign_in_is_idempotent() {
        let f = fixture();

        let first = f.service.resolve_or_create(google_profile()).await.unwrap();
        let second = f.service.resolve_or_create(google_profile()).await.unwrap();

        assert_eq!(first.identity.user_id, second.identity.user_id);
        assert_eq!(f.repo.len(), 1);
        assert_eq!(first.identity.name, "Grace");
        assert_eq!(first.identity.email, "a@b.com");
        assert!(first.identity.password_hash.is_none());

        // Only the latest sign-in's refresh token is current.
        assert_eq!(
            stored_refresh_token(&f, second.identity.user_id).await.as_deref(),
            Some(second.tokens.refresh_token.0.as_str())
        );
        assert!(matches!(
            f.service.rotate(&first.tokens.refresh_token.0).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    #[tokio::test]
    async fn federated_identity_cannot_log_in_with_a_password() {
        let f = fixture();
        f.service.resolve_or_create(google_profile()).await.unwrap();

        let err = f
            .service
            .login(LoginInput {
                email: "a@b.com".to_string(),
                password: "anything".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn federated_sign_in_with_a_taken_email_fails() {
        let f = fixture();
        f.service.signup(signup_input("a@b.com")).await.unwrap();

        let err = f.service.resolve_or_create(google_profile()).await.unwrap_err();
        assert!(matches!(err, AuthError::UserExists));
    }

    #[tokio::test]
    async fn deleted_identity_cannot_authenticate_or_rotate() {
        let f = fixture();
        let result = f.service.signup(signup_input("ada@example.com")).await.unwrap();

        f.service.delete_identity(result.user_id).await.unwrap();
        assert!(f.service.list_identities().await.unwrap().is_empty());
        assert!(matches!(
            f.service.authenticate(&result.tokens.access_token.0).await,
            Err(AuthError::IdentityNotFound)
        ));
        assert!(matches!(
            f.service.rotate(&result.tokens.refresh_token.0).await,
            Err(AuthError::IdentityNotFound)
        ));
        assert!(matches!(
            f.service.delete_identity(result.user_id).await,
            Err(AuthError::IdentityNotFound)
        ));

        // The email is free again.
        f.service.signup(signup_input("ada@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn list_identities_includes_local_and_federated() {
        let f = fixture();
        f.service.signup(signup_input("ada@example.com")).await.unwrap();
        f.service.resolve_or_create(google_profile()).await.unwrap();

        let mut emails: Vec<String> = f
            .service
            .list_identities()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.email)
            .collect();
        emails.sort();
        assert_eq!(emails, ["a@b.com", "ada@example.com"]);
    }
}
