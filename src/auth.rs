use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::header::{AUTHORIZATION, COOKIE};
use warp::http::HeaderMap;

use crate::error::StoreError;
use crate::store::{KvStore, PASSWORD_KEY, SESSION_KEY};

pub const SESSION_COOKIE: &str = "session";

/// Decides whether a request carries a valid session.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &HeaderMap) -> bool;
}

/// Compares the bearer token or `session` cookie against the stored session token.
pub struct SessionAuthenticator {
    store: Arc<dyn KvStore>,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Checks `password` against the stored credential and opens a new session on match.
    /// Returns the session token, or `None` when no credential is set or it does not match.
    pub async fn login(&self, password: &str) -> Result<Option<String>, StoreError> {
        let stored = match self.store.get(PASSWORD_KEY).await? {
            Some(pwd) if !pwd.is_empty() => pwd,
            _ => {
                warn!("Login attempted while no password is set");
                return Ok(None);
            }
        };

        if !constant_time_eq(&stored, password) {
            warn!("Login failed: wrong password");
            return Ok(None);
        }

        let token = uuid::Uuid::new_v4().to_string();
        self.store.set(SESSION_KEY, &token).await?;
        info!("Login succeeded, new session issued");
        Ok(Some(token))
    }
}

#[async_trait]
impl Authenticator for SessionAuthenticator {
    async fn authenticate(&self, headers: &HeaderMap) -> bool {
        let Some(presented) = presented_token(headers) else {
            return false;
        };

        match self.store.get(SESSION_KEY).await {
            Ok(Some(expected)) if !expected.is_empty() => constant_time_eq(&expected, &presented),
            Ok(_) => false,
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                false
            }
        }
    }
}

fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

/// Stores `password` as the panel credential unless one is already set. Returns whether it was written.
pub async fn seed_password(store: &dyn KvStore, password: &str) -> Result<bool, StoreError> {
    if store.get(PASSWORD_KEY).await?.is_some_and(|p| !p.is_empty()) {
        return Ok(false);
    }
    store.set(PASSWORD_KEY, password).await?;
    info!("Panel password initialised from configuration");
    Ok(true)
}

pub fn session_cookie(token: &str) -> String {
    format!("{}={}; Path=/; HttpOnly; SameSite=Strict", SESSION_COOKIE, token)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
