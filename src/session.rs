//! Server-side sessions carried by the `authdesk_session` cookie.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{InvalidHeaderValue, COOKIE},
        request::Parts,
        HeaderValue,
    },
};
use moka::future::Cache;
use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::schemas::AppState;

pub const SESSION_COOKIE: &str = "authdesk_session";

/// Session key holding the signed-in account id
pub const ACCOUNT_KEY: &str = "account_id";

pub type SessionData = HashMap<String, String>;

/// Session values by session id. Entries expire after the idle timeout;
/// every read refreshes the timer.
#[derive(Clone, Debug)]
pub struct SessionStore {
    cache: Cache<String, SessionData>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_sessions: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_sessions)
            .time_to_idle(idle_timeout)
            .build();
        Self {
            cache,
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// `Set-Cookie` value for a live session. A persistent cookie carries a
    /// Max-Age equal to the idle timeout; otherwise it ends with the browser.
    pub fn cookie(
        &self,
        session_id: &str,
        persistent: bool,
        secure: bool,
    ) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!("{SESSION_COOKIE}={session_id}; HttpOnly; SameSite=Lax; Path=/");
        if persistent {
            cookie.push_str(&format!("; Max-Age={}", self.idle_timeout.as_secs()));
        }
        if secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }

    /// `Set-Cookie` value that removes the session cookie
    pub fn expired_cookie() -> HeaderValue {
        HeaderValue::from_static(
            "authdesk_session=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        )
    }
}

/// The session attached to the current request, if any.
#[derive(Debug, Clone)]
pub struct Session {
    id: Option<String>,
    store: SessionStore,
}

impl Session {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub async fn read(&self, key: &str) -> Option<String> {
        let id = self.id.as_ref()?;
        self.store.cache.get(id).await?.get(key).cloned()
    }

    /// Store a value, opening a new session when none exists yet
    pub async fn insert(&mut self, key: &str, value: impl Into<String>) {
        let id = match &self.id {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                debug!("Opening session {}", id);
                self.id = Some(id.clone());
                id
            }
        };

        let mut data = self.store.cache.get(&id).await.unwrap_or_default();
        data.insert(key.to_string(), value.into());
        self.store.cache.insert(id, data).await;
    }

    /// Drop the current session and open an empty one under a fresh id
    pub async fn renew(&mut self) -> String {
        self.invalidate().await;
        let id = Uuid::new_v4().to_string();
        self.store.cache.insert(id.clone(), SessionData::new()).await;
        self.id = Some(id.clone());
        debug!("Opened session {}", id);
        id
    }

    /// Drop all values but keep the session id
    pub async fn clear(&self) {
        if let Some(id) = &self.id {
            self.store.cache.insert(id.clone(), SessionData::new()).await;
        }
    }

    /// End the session. The old id no longer resolves afterwards.
    pub async fn invalidate(&mut self) {
        if let Some(id) = self.id.take() {
            debug!("Invalidating session {}", id);
            self.store.cache.invalidate(&id).await;
        }
    }
}

fn session_id_from(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let store = state.sessions.clone();
        let id = match session_id_from(parts) {
            Some(id) if store.cache.contains_key(&id) => Some(id),
            Some(id) => {
                trace!("Ignoring unknown or expired session {}", id);
                None
            }
            None => None,
        };
        Ok(Session { id, store })
    }
}
