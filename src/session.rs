//! Session ownership: JWT decode, expiry detection and the login/logout
//! lifecycle.
//!
//! A [`SessionManager`] is created once and handed to whatever needs the
//! current user. Invalid or expired credentials never surface as errors from
//! [`SessionManager::restore`]; they are cleared from the store and the
//! manager simply ends up without a session.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::clock::Clock;
use crate::error::SessionError;
use crate::metrics::SESSION_EVENTS;
use crate::session_clock::SessionClock;
use crate::store::{ACCESS_TOKEN_KEY, KeyValueStore, REFRESH_TOKEN_KEY};

/// Access token claims as issued by the API. Only `exp` is required.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub is_staff: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.exp.saturating_mul(1000) < now_ms
    }
}

/// Decode the payload segment of a JWT. The signature is not checked; the
/// server does that on every protected request.
pub fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    let mut parts = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(SessionError::MalformedToken);
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

// Short stable identifier for log lines; raw tokens are never logged
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)[..12].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub is_admin: bool,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub expiry: DateTime<Utc>,
}

pub struct SessionManager {
    store: Arc<dyn KeyValueStore>,
    api: ApiClient,
    clock: Arc<dyn Clock>,
    session: Option<Session>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn KeyValueStore>, api: ApiClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            api,
            clock,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.expiry)
    }

    pub fn session_clock(&self) -> SessionClock {
        match self.expiry() {
            Some(expiry) => SessionClock::new(expiry),
            None => SessionClock::none(),
        }
    }

    /// Pick up the access token left in the store by a previous run.
    pub async fn restore(&mut self) -> Option<&Session> {
        let token = match self.store.get(ACCESS_TOKEN_KEY) {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "credential store unavailable");
                return None;
            }
        };

        if let Err(e) = self.establish(&token).await {
            warn!(token = %fingerprint(&token), error = %e, "stored credentials rejected");
            self.clear();
        }
        self.session.as_ref()
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<&Session, SessionError> {
        let tokens = self.api.auth().login(username, password).await?;
        self.store.set(ACCESS_TOKEN_KEY, &tokens.access)?;
        self.store.set(REFRESH_TOKEN_KEY, &tokens.refresh)?;

        if let Err(e) = self.establish(&tokens.access).await {
            self.clear();
            return Err(e);
        }
        SESSION_EVENTS.with_label_values(&["login"]).inc();
        info!(username, "logged in");
        self.current()
    }

    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
        password2: &str,
    ) -> Result<&Session, SessionError> {
        self.api
            .auth()
            .register(username, email, password, password2)
            .await?;
        info!(username, "registered");
        self.login(username, password).await
    }

    /// Exchange the stored refresh token for a new access token.
    pub async fn refresh(&mut self) -> Result<&Session, SessionError> {
        let refresh = self
            .store
            .get(REFRESH_TOKEN_KEY)?
            .ok_or(SessionError::NoRefreshToken)?;

        let access = match self.api.auth().refresh(&refresh).await {
            Ok(token) => token.access,
            Err(e) => {
                if matches!(e, crate::error::ApiError::Unauthorized) {
                    self.clear();
                }
                return Err(e.into());
            }
        };
        self.store.set(ACCESS_TOKEN_KEY, &access)?;

        if let Err(e) = self.establish(&access).await {
            self.clear();
            return Err(e);
        }
        SESSION_EVENTS.with_label_values(&["refresh"]).inc();
        self.current()
    }

    pub fn logout(&mut self) {
        if let Some(user) = self.user() {
            info!(username = %user.username, "logged out");
        }
        SESSION_EVENTS.with_label_values(&["logout"]).inc();
        self.clear();
    }

    /// Drop the session once its token has expired. Returns true if it did.
    pub fn expire_if_needed(&mut self) -> bool {
        let now = self.clock.now();
        let Some(session) = self.session.as_ref().filter(|s| s.expiry <= now) else {
            return false;
        };
        info!(username = %session.user.username, "session expired");
        SESSION_EVENTS.with_label_values(&["expired"]).inc();
        self.clear();
        true
    }

    fn current(&self) -> Result<&Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::UserLookup)
    }

    async fn establish(&mut self, token: &str) -> Result<(), SessionError> {
        let claims = decode_claims(token)?;
        if claims.is_expired(self.clock.now_ms()) {
            return Err(SessionError::Expired);
        }
        let expiry = claims.expires_at().ok_or(SessionError::MalformedToken)?;

        let account = self.api.auth().current_user(token).await.map_err(|e| {
            warn!(token = %fingerprint(token), error = %e, "error fetching user data");
            SessionError::UserLookup
        })?;

        self.session = Some(Session {
            user: User {
                username: account.username,
                is_admin: account.is_staff,
                token: token.to_string(),
            },
            expiry,
        });
        Ok(())
    }

    fn clear(&mut self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "failed to clear credential");
            }
        }
        self.session = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn token_with(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload);
        format!("{header}.{body}.signature")
    }

    fn manager(store: &MemoryStore, now_ms: i64) -> SessionManager {
        let store: Arc<dyn KeyValueStore> = Arc::new(store.clone());
        // nothing listens here; lookups that get this far fail
        let api = ApiClient::new("http://127.0.0.1:9", store.clone()).unwrap();
        SessionManager::new(store, api, Arc::new(ManualClock::new(now_ms)))
    }

    #[test]
    fn test_decode_claims() {
        let token = token_with(
            r#"{"token_type":"access","exp":1700000900,"iat":1700000000,"jti":"j","user_id":4,"username":"anna","is_staff":false,"email":"a@x.io"}"#,
        );
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.exp, 1_700_000_900);
        assert_eq!(claims.username.as_deref(), Some("anna"));
        assert_eq!(
            claims.expires_at().unwrap().timestamp_millis(),
            1_700_000_900_000
        );
        assert!(!claims.is_expired(1_700_000_900_000));
        assert!(claims.is_expired(1_700_000_900_001));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        assert!(matches!(decode_claims("abc"), Err(SessionError::MalformedToken)));
        assert!(matches!(
            decode_claims("a.b.c.d"),
            Err(SessionError::MalformedToken)
        ));
        assert!(matches!(
            decode_claims("a.!!!.c"),
            Err(SessionError::Encoding(_))
        ));
        let no_exp = token_with(r#"{"username":"anna"}"#);
        assert!(matches!(decode_claims(&no_exp), Err(SessionError::Claims(_))));
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 12);
    }

    #[tokio::test]
    async fn test_restore_with_expired_token_clears_credentials() {
        let store = MemoryStore::new();
        store
            .set(ACCESS_TOKEN_KEY, &token_with(r#"{"exp":1000}"#))
            .unwrap();
        store.set(REFRESH_TOKEN_KEY, "refresh").unwrap();

        let mut manager = manager(&store, 2_000_000);
        assert!(manager.restore().await.is_none());
        assert!(store.is_empty());
        assert_eq!(manager.session_clock(), SessionClock::none());
    }

    #[tokio::test]
    async fn test_restore_with_garbage_token_clears_credentials() {
        let store = MemoryStore::new();
        store.set(ACCESS_TOKEN_KEY, "not-a-jwt").unwrap();
        let mut manager = manager(&store, 0);
        assert!(manager.restore().await.is_none());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_without_token_is_no_session() {
        let store = MemoryStore::new();
        let mut manager = manager(&store, 0);
        assert!(manager.restore().await.is_none());
        assert!(manager.user().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let store = MemoryStore::new();
        let mut manager = manager(&store, 0);
        assert!(matches!(
            manager.refresh().await,
            Err(SessionError::NoRefreshToken)
        ));
    }
}
