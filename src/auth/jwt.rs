use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::Claims;
use crate::{
    config::JwtConfig,
    error::AppError,
    state::AppState,
    store::{User, UserStore},
};

#[derive(Clone)]
struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and checks the service's bearer tokens.
///
/// Built from injected configuration; a service without a secret still
/// exists but refuses every token operation with [`AppError::Config`].
#[derive(Clone)]
pub struct TokenService {
    keys: Option<JwtKeys>,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for TokenService {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        let keys = cfg
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|secret| JwtKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            });
        Self {
            keys,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    fn keys(&self) -> Result<&JwtKeys, AppError> {
        self.keys
            .as_ref()
            .ok_or(AppError::Config("JWT_SECRET is not set"))
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        self.issue_at(user, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, user: &User, now: OffsetDateTime) -> Result<String, AppError> {
        let keys = self.keys()?;
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(e.into()))?;
        debug!(user_id = user.id, role = %user.role, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    pub(crate) fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, AppError> {
        let keys = self.keys()?;
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        // expiry is checked below against `now`, without leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AppError::InvalidToken
        })?;
        if now.unix_timestamp() >= data.claims.exp {
            debug!(user_id = data.claims.sub, "jwt expired");
            return Err(AppError::InvalidToken);
        }
        debug!(user_id = data.claims.sub, "jwt verified");
        Ok(data.claims)
    }

    /// Swap a valid token for a fresh one carrying the store's current
    /// email and role.
    pub async fn refresh(
        &self,
        token: &str,
        store: &dyn UserStore,
    ) -> Result<(String, User), AppError> {
        let claims = self.verify(token)?;
        let user = store.find_by_id(claims.sub).await?.ok_or_else(|| {
            warn!(user_id = claims.sub, "refresh for vanished user");
            AppError::NotFound
        })?;
        if user.role != claims.role {
            debug!(user_id = user.id, old = %claims.role, new = %user.role, "role changed since issuance");
        }
        let token = self.issue(&user)?;
        Ok((token, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryUserStore, Role};

    fn make_service(secret: Option<&str>) -> TokenService {
        TokenService::new(&JwtConfig::for_tests(secret))
    }

    fn user(id: i64, role: Role) -> User {
        User {
            id,
            email: format!("user{id}@example.com"),
            password_hash: String::new(),
            display_name: "Test".into(),
            role,
            created_at: OffsetDateTime::now_utc(),
            updated_at: None,
        }
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let tokens = make_service(Some("dev-secret"));
        let u = user(7, Role::Admin);
        let claims = tokens.verify(&tokens.issue(&u).unwrap()).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.email, "user7@example.com");
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_invalid() {
        let tokens = make_service(Some("dev-secret"));
        let issued = OffsetDateTime::now_utc() - TimeDuration::days(8);
        let token = tokens.issue_at(&user(1, Role::User), issued).unwrap();
        assert!(matches!(
            tokens.verify(&token).unwrap_err(),
            AppError::InvalidToken
        ));
    }

    #[test]
    fn token_is_invalid_exactly_at_expiry() {
        let tokens = make_service(Some("dev-secret"));
        let now = OffsetDateTime::now_utc();
        let token = tokens.issue_at(&user(1, Role::User), now).unwrap();
        let at_expiry = now + TimeDuration::days(7);
        assert!(tokens.verify_at(&token, at_expiry).is_err());
        assert!(tokens
            .verify_at(&token, at_expiry - TimeDuration::seconds(1))
            .is_ok());
    }

    #[test]
    fn tampered_token_is_invalid() {
        let tokens = make_service(Some("dev-secret"));
        let token = tokens.issue(&user(1, Role::User)).unwrap();

        // flip one bit in the payload segment
        let payload_start = token.find('.').unwrap() + 1;
        let mut bytes = token.into_bytes();
        bytes[payload_start + 4] ^= 0x01;
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            tokens.verify(&tampered).unwrap_err(),
            AppError::InvalidToken
        ));
    }

    #[test]
    fn token_from_other_secret_is_invalid() {
        let ours = make_service(Some("secret-a"));
        let theirs = make_service(Some("secret-b"));
        let token = theirs.issue(&user(1, Role::Admin)).unwrap();
        assert!(matches!(
            ours.verify(&token).unwrap_err(),
            AppError::InvalidToken
        ));
    }

    #[test]
    fn garbage_is_invalid() {
        let tokens = make_service(Some("dev-secret"));
        assert!(matches!(
            tokens.verify("not.a.jwt").unwrap_err(),
            AppError::InvalidToken
        ));
    }

    #[test]
    fn missing_secret_is_config_error() {
        let tokens = make_service(None);
        assert!(!tokens.is_configured());
        assert!(matches!(
            tokens.issue(&user(1, Role::User)).unwrap_err(),
            AppError::Config(_)
        ));
        assert!(matches!(
            tokens.verify("a.b.c").unwrap_err(),
            AppError::Config(_)
        ));
        assert!(!make_service(Some("")).is_configured());
    }

    #[tokio::test]
    async fn refresh_uses_current_store_role() {
        let tokens = make_service(Some("dev-secret"));
        let store = MemoryUserStore::new();
        let stored = store.insert("ana@example.com", "h", "Ana").await.unwrap();
        let old = tokens.issue(&stored).unwrap();

        store.set_role(stored.id, Role::Admin).await.unwrap();

        let (fresh, user) = tokens.refresh(&old, &store).await.unwrap();
        assert_eq!(user.role, Role::Admin);
        let claims = tokens.verify(&fresh).unwrap();
        assert_eq!(claims.sub, stored.id);
        assert_eq!(claims.role, Role::Admin);
        // the old token keeps its stale role until it expires
        assert_eq!(tokens.verify(&old).unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn refresh_for_deleted_user_is_not_found() {
        let tokens = make_service(Some("dev-secret"));
        let store = MemoryUserStore::new();
        let stored = store.insert("gone@example.com", "h", "Gone").await.unwrap();
        let token = tokens.issue(&stored).unwrap();
        store.delete(stored.id).await.unwrap();

        assert!(matches!(
            tokens.refresh(&token, &store).await.unwrap_err(),
            AppError::NotFound
        ));
    }

    #[tokio::test]
    async fn refresh_rejects_invalid_token() {
        let tokens = make_service(Some("dev-secret"));
        let store = MemoryUserStore::new();
        assert!(matches!(
            tokens.refresh("nope", &store).await.unwrap_err(),
            AppError::InvalidToken
        ));
    }
}
