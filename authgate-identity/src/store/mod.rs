//! Entity store
//!
//! [`AuthStore`] owns the user and role lifecycles on top of a pluggable
//! [`StorageBackend`]. Every mutation runs registered pre/post hooks
//! synchronously, emits the corresponding events through the injected
//! [`EventSink`], and is bounded by the configured backend deadline.

pub mod backend;
pub mod filter;
pub mod json_file;
pub mod memory;

pub use backend::StorageBackend;
pub use filter::{RoleFilter, SortBy, UserCursor, UserFilter};
pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;

use crate::model::{Role, User, BUILTIN_ROLES};
use authgate_core::{
    with_timeout, AuthEvent, AuthGateError, AuthGateResult, ErrorContext, EventSink,
};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Where a mutation hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreSave,
    PostSave,
    PreDelete,
    PostDelete,
}

/// Entity handed to a mutation hook
#[derive(Debug)]
pub enum HookPayload<'a> {
    User(&'a User),
    Role(&'a Role),
}

type MutationHook = Box<dyn Fn(&HookPayload<'_>) + Send + Sync>;

pub struct AuthStore {
    backend: Arc<dyn StorageBackend>,
    events: Arc<dyn EventSink>,
    hooks: RwLock<Vec<(HookStage, MutationHook)>>,
    op_timeout_ms: u64,
}

impl AuthStore {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        events: Arc<dyn EventSink>,
        op_timeout_ms: u64,
    ) -> Self {
        Self {
            backend,
            events,
            hooks: RwLock::new(Vec::new()),
            op_timeout_ms,
        }
    }

    /// Register a callback invoked synchronously around every mutation
    pub fn register_hook<F>(&self, stage: HookStage, hook: F)
    where
        F: Fn(&HookPayload<'_>) + Send + Sync + 'static,
    {
        self.hooks.write().unwrap().push((stage, Box::new(hook)));
    }

    fn run_hooks(&self, stage: HookStage, payload: &HookPayload<'_>) {
        for (hook_stage, hook) in self.hooks.read().unwrap().iter() {
            if *hook_stage == stage {
                hook(payload);
            }
        }
    }

    fn snapshot<T: serde::Serialize>(entity: &T) -> Value {
        serde_json::to_value(entity).unwrap_or(Value::Null)
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a freshly constructed user. Fails with `UserExists` when the
    /// login is taken and `DuplicateEntity` when the uid itself collides.
    pub async fn create_user(&self, user: User) -> AuthGateResult<User> {
        if user.version != 1 {
            return Err(AuthGateError::Validation {
                message: "create_user expects a freshly constructed entity".to_string(),
                field: Some("version".to_string()),
                context: ErrorContext::new("store").with_operation("create_user"),
            });
        }

        let existing = with_timeout(
            self.backend.load_user_by_login(&user.login),
            self.op_timeout_ms,
            "load_user_by_login",
        )
        .await??;
        if existing.is_some() {
            return Err(AuthGateError::UserExists {
                login: user.login.clone(),
                context: ErrorContext::new("store").with_operation("create_user"),
            });
        }

        self.run_hooks(HookStage::PreSave, &HookPayload::User(&user));
        self.events.emit(AuthEvent::UserPreSave {
            uid: user.uid.clone(),
            entity: Self::snapshot(&user),
        });

        let persisted = with_timeout(
            self.backend.persist_user(&user),
            self.op_timeout_ms,
            "persist_user",
        )
        .await?;
        // Two concurrent creates with the same login can both pass the
        // duplicate check above; the backend claims the login under its
        // write lock, so the loser fails there with `UserExists`. The CAS
        // on insert only covers uid collisions.
        if let Err(AuthGateError::Conflict { .. }) = &persisted {
            return Err(AuthGateError::DuplicateEntity {
                entity: "user".to_string(),
                message: format!("uid '{}' already exists", user.uid),
                context: ErrorContext::new("store").with_operation("create_user"),
            });
        }
        persisted?;

        self.run_hooks(HookStage::PostSave, &HookPayload::User(&user));
        self.events.emit(AuthEvent::UserSaved {
            uid: user.uid.clone(),
            entity: Self::snapshot(&user),
        });

        info!(uid = %user.uid, login = %user.login, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, uid: &str) -> AuthGateResult<User> {
        with_timeout(self.backend.load_user(uid), self.op_timeout_ms, "load_user")
            .await??
            .ok_or_else(|| AuthGateError::NotFound {
                entity: "user".to_string(),
                context: ErrorContext::new("store")
                    .with_operation("get_user")
                    .with_metadata("uid", uid),
            })
    }

    pub async fn get_user_by_login(&self, login: &str) -> AuthGateResult<User> {
        with_timeout(
            self.backend.load_user_by_login(login),
            self.op_timeout_ms,
            "load_user_by_login",
        )
        .await??
        .ok_or_else(|| AuthGateError::NotFound {
            entity: "user".to_string(),
            context: ErrorContext::new("store")
                .with_operation("get_user_by_login")
                .with_metadata("login", login),
        })
    }

    /// Save an already-stored user. Bumps the version on success; a stale
    /// snapshot fails with `Conflict`, a concurrently deleted user with
    /// `NotFound`. Saving an unchanged entity is safe to repeat.
    pub async fn save_user(&self, user: &mut User) -> AuthGateResult<()> {
        self.run_hooks(HookStage::PreSave, &HookPayload::User(user));
        self.events.emit(AuthEvent::UserPreSave {
            uid: user.uid.clone(),
            entity: Self::snapshot(user),
        });

        let mut next = user.clone();
        next.version += 1;
        next.modified_at = chrono::Utc::now();

        with_timeout(
            self.backend.persist_user(&next),
            self.op_timeout_ms,
            "persist_user",
        )
        .await??;
        *user = next;

        self.run_hooks(HookStage::PostSave, &HookPayload::User(user));
        self.events.emit(AuthEvent::UserSaved {
            uid: user.uid.clone(),
            entity: Self::snapshot(user),
        });

        debug!(uid = %user.uid, version = user.version, "Saved user");
        Ok(())
    }

    /// Delete a user; fails with `NotFound` when already absent
    pub async fn delete_user(&self, user: &User) -> AuthGateResult<()> {
        self.run_hooks(HookStage::PreDelete, &HookPayload::User(user));
        self.events.emit(AuthEvent::UserPreDelete {
            uid: user.uid.clone(),
        });

        with_timeout(
            self.backend.remove_user(&user.uid),
            self.op_timeout_ms,
            "remove_user",
        )
        .await??;

        self.run_hooks(HookStage::PostDelete, &HookPayload::User(user));
        self.events.emit(AuthEvent::UserDeleted {
            uid: user.uid.clone(),
        });

        info!(uid = %user.uid, login = %user.login, "Deleted user");
        Ok(())
    }

    /// Lazy, restartable iteration over matching users
    pub fn find_users(&self, filter: UserFilter, sort: SortBy, page_size: usize) -> UserCursor<'_> {
        UserCursor::new(self, filter, sort, page_size)
    }

    /// First user matching the filter, if any
    pub async fn find_user(&self, filter: &UserFilter) -> AuthGateResult<Option<User>> {
        Ok(self
            .list_users(filter, SortBy::Created, 1, 0)
            .await?
            .into_iter()
            .next())
    }

    /// One page of matching users; prefer [`AuthStore::find_users`] for
    /// iteration
    pub async fn list_users(
        &self,
        filter: &UserFilter,
        sort: SortBy,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<User>> {
        with_timeout(
            self.backend.list_users(filter, sort, limit, skip),
            self.op_timeout_ms,
            "list_users",
        )
        .await?
    }

    pub async fn count_users(&self, filter: &UserFilter) -> AuthGateResult<u64> {
        with_timeout(
            self.backend.count_users(filter),
            self.op_timeout_ms,
            "count_users",
        )
        .await?
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Insert a new role; fails with `DuplicateEntity` when the name is
    /// taken and with `Validation` when the name is malformed
    pub async fn create_role(&self, role: Role) -> AuthGateResult<Role> {
        if !crate::model::valid_role_name(&role.name) {
            return Err(AuthGateError::Validation {
                message: format!("Invalid role name '{}'", role.name),
                field: Some("name".to_string()),
                context: ErrorContext::new("store").with_operation("create_role"),
            });
        }

        let existing = with_timeout(
            self.backend.load_role(&role.name),
            self.op_timeout_ms,
            "load_role",
        )
        .await??;
        if existing.is_some() {
            return Err(AuthGateError::DuplicateEntity {
                entity: "role".to_string(),
                message: format!("role '{}' already exists", role.name),
                context: ErrorContext::new("store").with_operation("create_role"),
            });
        }

        self.run_hooks(HookStage::PreSave, &HookPayload::Role(&role));
        self.events.emit(AuthEvent::RolePreSave {
            name: role.name.clone(),
            entity: Self::snapshot(&role),
        });

        let persisted = with_timeout(
            self.backend.persist_role(&role),
            self.op_timeout_ms,
            "persist_role",
        )
        .await?;
        if let Err(AuthGateError::Conflict { .. }) = &persisted {
            return Err(AuthGateError::DuplicateEntity {
                entity: "role".to_string(),
                message: format!("role '{}' already exists", role.name),
                context: ErrorContext::new("store").with_operation("create_role"),
            });
        }
        persisted?;

        self.run_hooks(HookStage::PostSave, &HookPayload::Role(&role));
        self.events.emit(AuthEvent::RoleSaved {
            name: role.name.clone(),
            entity: Self::snapshot(&role),
        });

        info!(name = %role.name, "Created role");
        Ok(role)
    }

    pub async fn get_role(&self, name: &str) -> AuthGateResult<Role> {
        with_timeout(self.backend.load_role(name), self.op_timeout_ms, "load_role")
            .await??
            .ok_or_else(|| AuthGateError::NotFound {
                entity: "role".to_string(),
                context: ErrorContext::new("store")
                    .with_operation("get_role")
                    .with_metadata("name", name),
            })
    }

    pub async fn save_role(&self, role: &mut Role) -> AuthGateResult<()> {
        self.run_hooks(HookStage::PreSave, &HookPayload::Role(role));
        self.events.emit(AuthEvent::RolePreSave {
            name: role.name.clone(),
            entity: Self::snapshot(role),
        });

        let mut next = role.clone();
        next.version += 1;
        next.modified_at = chrono::Utc::now();

        with_timeout(
            self.backend.persist_role(&next),
            self.op_timeout_ms,
            "persist_role",
        )
        .await??;
        *role = next;

        self.run_hooks(HookStage::PostSave, &HookPayload::Role(role));
        self.events.emit(AuthEvent::RoleSaved {
            name: role.name.clone(),
            entity: Self::snapshot(role),
        });
        Ok(())
    }

    pub async fn delete_role(&self, role: &Role) -> AuthGateResult<()> {
        self.run_hooks(HookStage::PreDelete, &HookPayload::Role(role));
        self.events.emit(AuthEvent::RolePreDelete {
            name: role.name.clone(),
        });

        with_timeout(
            self.backend.remove_role(&role.name),
            self.op_timeout_ms,
            "remove_role",
        )
        .await??;

        self.run_hooks(HookStage::PostDelete, &HookPayload::Role(role));
        self.events.emit(AuthEvent::RoleDeleted {
            name: role.name.clone(),
        });
        Ok(())
    }

    pub async fn list_roles(
        &self,
        filter: &RoleFilter,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<Role>> {
        with_timeout(
            self.backend.list_roles(filter, limit, skip),
            self.op_timeout_ms,
            "list_roles",
        )
        .await?
    }

    /// All roles matching the filter
    pub async fn find_roles(&self, filter: &RoleFilter) -> AuthGateResult<Vec<Role>> {
        self.list_roles(filter, 0, 0).await
    }

    pub async fn count_roles(&self, filter: &RoleFilter) -> AuthGateResult<u64> {
        with_timeout(
            self.backend.count_roles(filter),
            self.op_timeout_ms,
            "count_roles",
        )
        .await?
    }

    /// Seed the minimum role set every deployment expects
    pub async fn ensure_builtin_roles(&self) -> AuthGateResult<()> {
        for name in BUILTIN_ROLES {
            if with_timeout(self.backend.load_role(name), self.op_timeout_ms, "load_role")
                .await??
                .is_none()
            {
                self.create_role(Role::new(name, format!("Built-in '{}' role", name)))
                    .await?;
            }
        }
        Ok(())
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }
}
