//! In-memory storage backend
//!
//! A single write lock over the whole map makes compare-and-swap on the
//! entity version atomic, which is what guarantees the "exactly one of two
//! concurrent saves wins" property.

use crate::model::{Role, User};
use crate::store::backend::{page_roles, page_users, StorageBackend};
use crate::store::filter::{RoleFilter, SortBy, UserFilter};
use async_trait::async_trait;
use authgate_core::{AuthGateError, AuthGateResult, ErrorContext};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    /// uid -> user
    users: HashMap<String, User>,
    /// login -> uid
    login_index: HashMap<String, String>,
    /// name -> role
    roles: HashMap<String, Role>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(entity: &str, expected: u64, found: u64) -> AuthGateError {
    AuthGateError::Conflict {
        entity: entity.to_string(),
        expected,
        found,
        context: ErrorContext::new("memory_backend")
            .with_suggestion("Reload the entity and retry the save"),
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn load_user(&self, uid: &str) -> AuthGateResult<Option<User>> {
        Ok(self.inner.read().await.users.get(uid).cloned())
    }

    async fn load_user_by_login(&self, login: &str) -> AuthGateResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .login_index
            .get(login)
            .and_then(|uid| inner.users.get(uid))
            .cloned())
    }

    async fn persist_user(&self, user: &User) -> AuthGateResult<()> {
        let mut inner = self.inner.write().await;

        let previous_login = match inner.users.get(&user.uid) {
            None if user.version == 1 => None,
            None => {
                return Err(AuthGateError::NotFound {
                    entity: "user".to_string(),
                    context: ErrorContext::new("memory_backend")
                        .with_operation("persist_user")
                        .with_metadata("uid", &user.uid),
                })
            }
            Some(stored) if stored.version + 1 == user.version => Some(stored.login.clone()),
            Some(stored) => {
                return Err(conflict("user", user.version, stored.version));
            }
        };

        // Login uniqueness is part of the persist contract: the claim is
        // made under the same write lock as the version CAS, so two racing
        // inserts with the same login cannot both succeed.
        if let Some(owner) = inner.login_index.get(&user.login) {
            if owner != &user.uid {
                return Err(AuthGateError::UserExists {
                    login: user.login.clone(),
                    context: ErrorContext::new("memory_backend")
                        .with_operation("persist_user")
                        .with_metadata("uid", &user.uid),
                });
            }
        }

        if let Some(previous) = previous_login {
            if previous != user.login {
                inner.login_index.remove(&previous);
            }
        }
        inner.login_index.insert(user.login.clone(), user.uid.clone());
        inner.users.insert(user.uid.clone(), user.clone());
        debug!(uid = %user.uid, version = user.version, "Persisted user");
        Ok(())
    }

    async fn remove_user(&self, uid: &str) -> AuthGateResult<()> {
        let mut inner = self.inner.write().await;
        match inner.users.remove(uid) {
            Some(user) => {
                inner.login_index.remove(&user.login);
                Ok(())
            }
            None => Err(AuthGateError::NotFound {
                entity: "user".to_string(),
                context: ErrorContext::new("memory_backend")
                    .with_operation("remove_user")
                    .with_metadata("uid", uid),
            }),
        }
    }

    async fn load_role(&self, name: &str) -> AuthGateResult<Option<Role>> {
        Ok(self.inner.read().await.roles.get(name).cloned())
    }

    async fn persist_role(&self, role: &Role) -> AuthGateResult<()> {
        let mut inner = self.inner.write().await;

        match inner.roles.get(&role.name) {
            None if role.version == 1 => {}
            None => {
                return Err(AuthGateError::NotFound {
                    entity: "role".to_string(),
                    context: ErrorContext::new("memory_backend")
                        .with_operation("persist_role")
                        .with_metadata("name", &role.name),
                })
            }
            Some(stored) if stored.version + 1 == role.version => {}
            Some(stored) => {
                return Err(conflict("role", role.version, stored.version));
            }
        }

        inner.roles.insert(role.name.clone(), role.clone());
        debug!(name = %role.name, version = role.version, "Persisted role");
        Ok(())
    }

    async fn remove_role(&self, name: &str) -> AuthGateResult<()> {
        let mut inner = self.inner.write().await;
        if inner.roles.remove(name).is_none() {
            return Err(AuthGateError::NotFound {
                entity: "role".to_string(),
                context: ErrorContext::new("memory_backend")
                    .with_operation("remove_role")
                    .with_metadata("name", name),
            });
        }
        Ok(())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        sort: SortBy,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<User>> {
        let inner = self.inner.read().await;
        let matching: Vec<User> = inner
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        Ok(page_users(matching, sort, limit, skip))
    }

    async fn list_roles(
        &self,
        filter: &RoleFilter,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<Role>> {
        let inner = self.inner.read().await;
        let matching: Vec<Role> = inner
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(page_roles(matching, limit, skip))
    }

    async fn count_users(&self, filter: &UserFilter) -> AuthGateResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().filter(|u| filter.matches(u)).count() as u64)
    }

    async fn count_roles(&self, filter: &RoleFilter) -> AuthGateResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.roles.values().filter(|r| filter.matches(r)).count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_then_stale_save_conflicts() {
        let backend = MemoryBackend::new();
        let user = User::new("alice", "alice@example.com");
        backend.persist_user(&user).await.unwrap();

        // A second insert of the same uid at version 1 is a conflict
        let err = backend.persist_user(&user).await.unwrap_err();
        assert!(matches!(err, AuthGateError::Conflict { .. }));

        let mut updated = user.clone();
        updated.version = 2;
        backend.persist_user(&updated).await.unwrap();

        // Saving from the old snapshot again loses the race
        let mut stale = user;
        stale.version = 2;
        let err = backend.persist_user(&stale).await.unwrap_err();
        assert!(matches!(err, AuthGateError::Conflict { .. }));
    }

    #[tokio::test]
    async fn second_uid_cannot_claim_a_taken_login() {
        let backend = MemoryBackend::new();
        backend
            .persist_user(&User::new("alice", "alice@example.com"))
            .await
            .unwrap();

        // A different uid inserting the same login loses at persist time,
        // even though it never went through the store's duplicate check
        let err = backend
            .persist_user(&User::new("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthGateError::UserExists { .. }));

        // Same for an update that renames onto a taken login
        let mut bob = User::new("bob", "bob@example.com");
        backend.persist_user(&bob).await.unwrap();
        bob.login = "alice".to_string();
        bob.version = 2;
        let err = backend.persist_user(&bob).await.unwrap_err();
        assert!(matches!(err, AuthGateError::UserExists { .. }));

        // Renaming to a free login moves the index entry
        bob.login = "robert".to_string();
        backend.persist_user(&bob).await.unwrap();
        assert!(backend.load_user_by_login("robert").await.unwrap().is_some());
        assert!(backend.load_user_by_login("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_after_remove_is_not_found() {
        let backend = MemoryBackend::new();
        let user = User::new("alice", "alice@example.com");
        backend.persist_user(&user).await.unwrap();
        backend.remove_user(&user.uid).await.unwrap();

        let mut updated = user;
        updated.version = 2;
        let err = backend.persist_user(&updated).await.unwrap_err();
        assert!(matches!(err, AuthGateError::NotFound { .. }));
    }

    #[tokio::test]
    async fn login_index_follows_user() {
        let backend = MemoryBackend::new();
        let user = User::new("alice", "alice@example.com");
        backend.persist_user(&user).await.unwrap();

        let found = backend.load_user_by_login("alice").await.unwrap();
        assert_eq!(found.unwrap().uid, user.uid);

        backend.remove_user(&user.uid).await.unwrap();
        assert!(backend.load_user_by_login("alice").await.unwrap().is_none());
    }
}
