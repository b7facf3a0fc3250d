//! Bearer tokens for the Firestore REST API.
//!
//! Service account tokens are leased from gcp_auth and reused until shortly
//! before they expire. Refreshes happen under the write lock so concurrent
//! callers wait for one fetch instead of racing. The emulator needs no OAuth
//! and accepts the fixed `owner` token.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// OAuth scope granting Firestore document access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

/// Token the emulator treats as an admin credential.
pub const EMULATOR_TOKEN: &str = "owner";

/// Leases are renewed this long before the provider's expiry.
const RENEW_BEFORE_EXPIRY: ChronoDuration = ChronoDuration::seconds(60);

#[derive(Debug, Clone)]
struct Lease {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Lease {
    /// Good for another request without renewal.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + RENEW_BEFORE_EXPIRY < self.expires_at
    }

    /// Past the renewal point but not yet rejected by the server.
    fn is_alive(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

enum Credentials {
    Emulator,
    ServiceAccount(Arc<dyn TokenProvider>),
}

/// Source of `Authorization: Bearer` values.
pub struct BearerTokens {
    credentials: Credentials,
    lease: RwLock<Option<Lease>>,
}

impl BearerTokens {
    pub fn emulator() -> Self {
        Self {
            credentials: Credentials::Emulator,
            lease: RwLock::new(None),
        }
    }

    pub fn service_account(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            credentials: Credentials::ServiceAccount(provider),
            lease: RwLock::new(None),
        }
    }

    /// Load the service account named by `GOOGLE_APPLICATION_CREDENTIALS`.
    pub fn from_env() -> FirestoreResult<Self> {
        let account = CustomServiceAccount::from_env()
            .map_err(|e| FirestoreError::credentials(format!("unreadable service account: {}", e)))?
            .ok_or_else(|| {
                FirestoreError::credentials(
                    "GOOGLE_APPLICATION_CREDENTIALS must point at a service account JSON file",
                )
            })?;
        Ok(Self::service_account(Arc::new(account)))
    }

    /// Current token, renewing the lease when it is close to expiry.
    ///
    /// If renewal fails while the old lease is still alive, the old token is
    /// returned and renewal is attempted again on the next call.
    pub async fn bearer(&self) -> FirestoreResult<String> {
        let provider = match &self.credentials {
            Credentials::Emulator => return Ok(EMULATOR_TOKEN.to_string()),
            Credentials::ServiceAccount(provider) => provider,
        };

        if let Some(lease) = self.lease.read().await.as_ref() {
            if lease.is_fresh(Utc::now()) {
                return Ok(lease.token.clone());
            }
        }

        let mut slot = self.lease.write().await;
        let now = Utc::now();
        if let Some(lease) = slot.as_ref().filter(|l| l.is_fresh(now)) {
            return Ok(lease.token.clone());
        }

        match provider.token(&[DATASTORE_SCOPE]).await {
            Ok(token) => {
                let lease = Lease {
                    token: token.as_str().to_string(),
                    expires_at: token.expires_at(),
                };
                debug!(expires_at = %lease.expires_at, "Leased Firestore access token");
                let bearer = lease.token.clone();
                *slot = Some(lease);
                Ok(bearer)
            }
            Err(e) => match slot.as_ref().filter(|l| l.is_alive(now)) {
                Some(lease) => {
                    warn!("Token renewal failed, reusing current token: {}", e);
                    Ok(lease.token.clone())
                }
                None => Err(FirestoreError::credentials(format!(
                    "token request failed: {}",
                    e
                ))),
            },
        }
    }

    /// Drop the current lease after the server rejected it.
    pub async fn forget(&self) {
        self.lease.write().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(expires_in_secs: i64, now: DateTime<Utc>) -> Lease {
        Lease {
            token: "t".into(),
            expires_at: now + ChronoDuration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn test_lease_renews_inside_margin() {
        let now = Utc::now();
        assert!(lease(3600, now).is_fresh(now));
        assert!(!lease(30, now).is_fresh(now));
        assert!(lease(30, now).is_alive(now));
        assert!(!lease(-1, now).is_alive(now));
    }

    #[tokio::test]
    async fn test_emulator_token_is_constant() {
        let tokens = BearerTokens::emulator();
        assert_eq!(tokens.bearer().await.unwrap(), "owner");
        tokens.forget().await;
        assert_eq!(tokens.bearer().await.unwrap(), "owner");
    }
}
