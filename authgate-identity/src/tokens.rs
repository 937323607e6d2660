//! Access token lifecycle
//!
//! Tokens are opaque `ag_`-prefixed identifiers backed by 32 bytes of OS
//! randomness. The raw identifier is returned exactly once at issuance;
//! only its SHA-256 digest is kept, so a stolen token table cannot be
//! replayed. Expiry is policy-configurable and defaults to "never": revoke
//! explicitly.

use crate::model::{User, UserStatus};
use authgate_core::{AuthGateError, AuthGateResult, ErrorContext};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Stored token record, keyed by digest
#[derive(Debug, Clone)]
pub struct AccessToken {
    /// SHA-256 digest of the raw identifier
    pub digest: String,
    /// Owning user, referenced by identifier only
    pub user_uid: String,
    pub issued_at: DateTime<Utc>,
    /// None means the token never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl AccessToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires) if now > expires)
    }
}

/// Expiry policy for issued tokens
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPolicy {
    /// Lifetime applied at issuance and on prolong; None disables expiry
    pub ttl: Option<Duration>,
}

impl TokenPolicy {
    pub fn never_expires() -> Self {
        Self { ttl: None }
    }

    pub fn with_ttl_secs(secs: i64) -> Self {
        Self {
            ttl: Some(Duration::seconds(secs)),
        }
    }
}

pub struct TokenManager {
    tokens: RwLock<HashMap<String, AccessToken>>,
    policy: TokenPolicy,
}

impl TokenManager {
    pub fn new(policy: TokenPolicy) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Issue a token for an active user, returning the raw identifier.
    /// Fails with `UserNotActive` for any other status.
    pub async fn issue(&self, user: &User) -> AuthGateResult<String> {
        if user.status != UserStatus::Active {
            return Err(AuthGateError::UserNotActive {
                login: user.login.clone(),
                context: ErrorContext::new("tokens")
                    .with_operation("issue")
                    .with_metadata("status", &user.status.to_string()),
            });
        }

        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        // Uniqueness under concurrent issuance: the digest is reserved
        // while the write lock is held; regenerate on the (cosmically
        // unlikely) collision.
        loop {
            let raw = generate_raw_token();
            let digest = digest_token(&raw);
            if tokens.contains_key(&digest) {
                continue;
            }
            tokens.insert(
                digest.clone(),
                AccessToken {
                    digest,
                    user_uid: user.uid.clone(),
                    issued_at: now,
                    expires_at: self.policy.ttl.map(|ttl| now + ttl),
                    revoked: false,
                    last_seen: None,
                },
            );
            info!(uid = %user.uid, "Issued access token");
            return Ok(raw);
        }
    }

    /// Resolve a raw token to its owning user uid. Unknown, revoked, and
    /// expired tokens all fail with `TokenInvalid`.
    pub async fn validate(&self, raw: &str) -> AuthGateResult<String> {
        let digest = digest_token(raw);
        let now = Utc::now();

        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&digest) {
            Some(token) if !token.revoked && !token.is_expired(now) => {
                token.last_seen = Some(now);
                Ok(token.user_uid.clone())
            }
            _ => Err(AuthGateError::TokenInvalid {
                context: ErrorContext::new("tokens").with_operation("validate"),
            }),
        }
    }

    /// Revoke a token. Idempotent: revoking an unknown or already revoked
    /// token succeeds.
    pub async fn revoke(&self, raw: &str) {
        let digest = digest_token(raw);
        let mut tokens = self.tokens.write().await;
        if let Some(token) = tokens.get_mut(&digest) {
            if !token.revoked {
                token.revoked = true;
                debug!(uid = %token.user_uid, "Revoked access token");
            }
        }
    }

    /// Push a token's expiry out by the policy TTL. A no-op under a
    /// never-expires policy; invalid tokens fail as in `validate`.
    pub async fn prolong(&self, raw: &str) -> AuthGateResult<()> {
        let digest = digest_token(raw);
        let now = Utc::now();

        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&digest) {
            Some(token) if !token.revoked && !token.is_expired(now) => {
                if let Some(ttl) = self.policy.ttl {
                    token.expires_at = Some(now + ttl);
                }
                Ok(())
            }
            _ => Err(AuthGateError::TokenInvalid {
                context: ErrorContext::new("tokens").with_operation("prolong"),
            }),
        }
    }

    /// Revoke every live token belonging to a user
    pub async fn revoke_all_for(&self, uid: &str) {
        let mut tokens = self.tokens.write().await;
        for token in tokens.values_mut() {
            if token.user_uid == uid && !token.revoked {
                token.revoked = true;
            }
        }
    }

    /// Number of live (not revoked, not expired) tokens
    pub async fn live_count(&self) -> usize {
        let now = Utc::now();
        let tokens = self.tokens.read().await;
        tokens
            .values()
            .filter(|t| !t.revoked && !t.is_expired(now))
            .count()
    }
}

/// 32 bytes of OS randomness, hex-encoded with a recognizable prefix
fn generate_raw_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("ag_{}", hex)
}

fn digest_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_user() -> User {
        let mut user = User::new("alice", "alice@example.com");
        user.status = UserStatus::Active;
        user
    }

    #[tokio::test]
    async fn issue_requires_active_status() {
        let manager = TokenManager::new(TokenPolicy::never_expires());

        for status in [UserStatus::New, UserStatus::Unconfirmed, UserStatus::Disabled] {
            let mut user = User::new("bob", "bob@example.com");
            user.status = status;
            let err = manager.issue(&user).await.unwrap_err();
            assert!(matches!(err, AuthGateError::UserNotActive { .. }));
        }

        assert!(manager.issue(&active_user()).await.is_ok());
    }

    #[tokio::test]
    async fn validates_until_revoked_then_always_fails() {
        let manager = TokenManager::new(TokenPolicy::never_expires());
        let user = active_user();
        let raw = manager.issue(&user).await.unwrap();

        assert_eq!(manager.validate(&raw).await.unwrap(), user.uid);
        assert_eq!(manager.validate(&raw).await.unwrap(), user.uid);

        manager.revoke(&raw).await;
        for _ in 0..3 {
            let err = manager.validate(&raw).await.unwrap_err();
            assert!(matches!(err, AuthGateError::TokenInvalid { .. }));
        }

        // Revoking again is fine
        manager.revoke(&raw).await;
        manager.revoke("ag_completely_unknown").await;
    }

    #[tokio::test]
    async fn expired_token_never_validates() {
        let manager = TokenManager::new(TokenPolicy {
            ttl: Some(Duration::seconds(-1)),
        });
        let raw = manager.issue(&active_user()).await.unwrap();

        let err = manager.validate(&raw).await.unwrap_err();
        assert!(matches!(err, AuthGateError::TokenInvalid { .. }));
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn prolong_extends_expiry() {
        let manager = TokenManager::new(TokenPolicy::with_ttl_secs(3_600));
        let raw = manager.issue(&active_user()).await.unwrap();

        manager.prolong(&raw).await.unwrap();
        assert!(manager.validate(&raw).await.is_ok());

        manager.revoke(&raw).await;
        assert!(manager.prolong(&raw).await.is_err());
    }

    #[tokio::test]
    async fn raw_tokens_are_unique_and_prefixed() {
        let manager = TokenManager::new(TokenPolicy::never_expires());
        let user = active_user();

        let a = manager.issue(&user).await.unwrap();
        let b = manager.issue(&user).await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("ag_"));
        // 32 bytes hex-encoded
        assert_eq!(a.len(), "ag_".len() + 64);
        assert_eq!(manager.live_count().await, 2);
    }

    #[tokio::test]
    async fn revoke_all_for_kills_every_session() {
        let manager = TokenManager::new(TokenPolicy::never_expires());
        let user = active_user();
        let a = manager.issue(&user).await.unwrap();
        let b = manager.issue(&user).await.unwrap();

        manager.revoke_all_for(&user.uid).await;
        assert!(manager.validate(&a).await.is_err());
        assert!(manager.validate(&b).await.is_err());
    }
}
