//! Storage backend abstraction
//!
//! Backends persist entities and enforce the optimistic versioning
//! contract; everything else (hooks, events, timeouts, duplicate checks)
//! lives in [`super::AuthStore`].
//!
//! Persist semantics, identical for users and roles:
//! - incoming `version == 1` is an insert: fails with `Conflict` when the
//!   entity already exists (the store maps this to `DuplicateEntity` during
//!   create)
//! - incoming `version > 1` is an update: the stored version must be
//!   exactly `version - 1`, otherwise `Conflict`; a missing entity fails
//!   with `NotFound` (deleted concurrently)
//!
//! `persist_user` additionally enforces login uniqueness atomically with
//! the CAS: an insert or login change claiming a login that belongs to a
//! different uid fails with `UserExists`.

use crate::model::{Role, User};
use crate::store::filter::{RoleFilter, SortBy, UserFilter};
use async_trait::async_trait;
use authgate_core::AuthGateResult;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn load_user(&self, uid: &str) -> AuthGateResult<Option<User>>;

    async fn load_user_by_login(&self, login: &str) -> AuthGateResult<Option<User>>;

    async fn persist_user(&self, user: &User) -> AuthGateResult<()>;

    async fn remove_user(&self, uid: &str) -> AuthGateResult<()>;

    async fn load_role(&self, name: &str) -> AuthGateResult<Option<Role>>;

    async fn persist_role(&self, role: &Role) -> AuthGateResult<()>;

    async fn remove_role(&self, name: &str) -> AuthGateResult<()>;

    async fn list_users(
        &self,
        filter: &UserFilter,
        sort: SortBy,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<User>>;

    async fn list_roles(&self, filter: &RoleFilter, limit: usize, skip: usize)
        -> AuthGateResult<Vec<Role>>;

    async fn count_users(&self, filter: &UserFilter) -> AuthGateResult<u64>;

    async fn count_roles(&self, filter: &RoleFilter) -> AuthGateResult<u64>;
}

/// Sort and window a user listing in memory. Shared by backends without
/// native query support.
pub(crate) fn page_users(mut users: Vec<User>, sort: SortBy, limit: usize, skip: usize) -> Vec<User> {
    match sort {
        SortBy::Created => users.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortBy::Login => users.sort_by(|a, b| a.login.cmp(&b.login)),
    }
    users
        .into_iter()
        .skip(skip)
        .take(if limit == 0 { usize::MAX } else { limit })
        .collect()
}

pub(crate) fn page_roles(mut roles: Vec<Role>, limit: usize, skip: usize) -> Vec<Role> {
    roles.sort_by(|a, b| a.name.cmp(&b.name));
    roles
        .into_iter()
        .skip(skip)
        .take(if limit == 0 { usize::MAX } else { limit })
        .collect()
}
