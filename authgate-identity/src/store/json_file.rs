//! JSON file storage backend
//!
//! One JSON document per entity under `<data_dir>/users` and
//! `<data_dir>/roles`. A single mutex serializes read-modify-write cycles
//! so the version compare-and-swap stays atomic within the process. Used by
//! the CLI so state survives between invocations; not meant for
//! multi-process deployments.

use crate::model::{Role, User};
use crate::store::backend::{page_roles, page_users, StorageBackend};
use crate::store::filter::{RoleFilter, SortBy, UserFilter};
use async_trait::async_trait;
use authgate_core::{AuthGateError, AuthGateResult, ErrorContext};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub struct JsonFileBackend {
    users_dir: PathBuf,
    roles_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileBackend {
    /// Open (creating directories if needed) a backend rooted at `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> AuthGateResult<Self> {
        let users_dir = data_dir.as_ref().join("users");
        let roles_dir = data_dir.as_ref().join("roles");
        std::fs::create_dir_all(&users_dir)?;
        std::fs::create_dir_all(&roles_dir)?;

        Ok(Self {
            users_dir,
            roles_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn user_path(&self, uid: &str) -> PathBuf {
        self.users_dir.join(format!("{}.json", uid))
    }

    fn role_path(&self, name: &str) -> PathBuf {
        self.roles_dir.join(format!("{}.json", name))
    }

    fn read_entity<T: DeserializeOwned>(path: &Path) -> AuthGateResult<Option<T>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entity<T: Serialize>(path: &Path, entity: &T) -> AuthGateResult<()> {
        let content = serde_json::to_string_pretty(entity)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn read_all<T: DeserializeOwned>(dir: &Path) -> AuthGateResult<Vec<T>> {
        let mut entities = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(entity) = Self::read_entity(&path)? {
                    entities.push(entity);
                }
            }
        }
        Ok(entities)
    }

    /// Shared CAS check; `stored_version` is None when the file is absent
    fn check_version(
        entity: &str,
        incoming: u64,
        stored_version: Option<u64>,
    ) -> AuthGateResult<()> {
        match stored_version {
            None if incoming == 1 => Ok(()),
            None => Err(AuthGateError::NotFound {
                entity: entity.to_string(),
                context: ErrorContext::new("json_file_backend").with_operation("persist"),
            }),
            Some(stored) if stored + 1 == incoming => Ok(()),
            Some(stored) => Err(AuthGateError::Conflict {
                entity: entity.to_string(),
                expected: incoming,
                found: stored,
                context: ErrorContext::new("json_file_backend")
                    .with_suggestion("Reload the entity and retry the save"),
            }),
        }
    }
}

#[async_trait]
impl StorageBackend for JsonFileBackend {
    async fn load_user(&self, uid: &str) -> AuthGateResult<Option<User>> {
        Self::read_entity(&self.user_path(uid))
    }

    async fn load_user_by_login(&self, login: &str) -> AuthGateResult<Option<User>> {
        let users: Vec<User> = Self::read_all(&self.users_dir)?;
        Ok(users.into_iter().find(|u| u.login == login))
    }

    async fn persist_user(&self, user: &User) -> AuthGateResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(&user.uid);
        let stored: Option<User> = Self::read_entity(&path)?;
        Self::check_version("user", user.version, stored.map(|u| u.version))?;

        // Login uniqueness is checked inside the write lock so racing
        // inserts with the same login cannot both succeed
        let users: Vec<User> = Self::read_all(&self.users_dir)?;
        if users.iter().any(|u| u.login == user.login && u.uid != user.uid) {
            return Err(AuthGateError::UserExists {
                login: user.login.clone(),
                context: ErrorContext::new("json_file_backend")
                    .with_operation("persist_user")
                    .with_metadata("uid", &user.uid),
            });
        }

        Self::write_entity(&path, user)?;
        debug!(uid = %user.uid, version = user.version, "Persisted user file");
        Ok(())
    }

    async fn remove_user(&self, uid: &str) -> AuthGateResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(uid);
        if !path.exists() {
            return Err(AuthGateError::NotFound {
                entity: "user".to_string(),
                context: ErrorContext::new("json_file_backend")
                    .with_operation("remove_user")
                    .with_metadata("uid", uid),
            });
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    async fn load_role(&self, name: &str) -> AuthGateResult<Option<Role>> {
        Self::read_entity(&self.role_path(name))
    }

    async fn persist_role(&self, role: &Role) -> AuthGateResult<()> {
        // The name becomes the file name; refuse anything that could
        // escape the roles directory
        if !crate::model::valid_role_name(&role.name) {
            return Err(AuthGateError::Validation {
                message: format!("Invalid role name '{}'", role.name),
                field: Some("name".to_string()),
                context: ErrorContext::new("json_file_backend").with_operation("persist_role"),
            });
        }

        let _guard = self.write_lock.lock().await;
        let path = self.role_path(&role.name);
        let stored: Option<Role> = Self::read_entity(&path)?;
        Self::check_version("role", role.version, stored.map(|r| r.version))?;
        Self::write_entity(&path, role)?;
        Ok(())
    }

    async fn remove_role(&self, name: &str) -> AuthGateResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.role_path(name);
        if !path.exists() {
            return Err(AuthGateError::NotFound {
                entity: "role".to_string(),
                context: ErrorContext::new("json_file_backend")
                    .with_operation("remove_role")
                    .with_metadata("name", name),
            });
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        sort: SortBy,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<User>> {
        let users: Vec<User> = Self::read_all(&self.users_dir)?;
        let matching = users.into_iter().filter(|u| filter.matches(u)).collect();
        Ok(page_users(matching, sort, limit, skip))
    }

    async fn list_roles(
        &self,
        filter: &RoleFilter,
        limit: usize,
        skip: usize,
    ) -> AuthGateResult<Vec<Role>> {
        let roles: Vec<Role> = Self::read_all(&self.roles_dir)?;
        let matching = roles.into_iter().filter(|r| filter.matches(r)).collect();
        Ok(page_roles(matching, limit, skip))
    }

    async fn count_users(&self, filter: &UserFilter) -> AuthGateResult<u64> {
        let users: Vec<User> = Self::read_all(&self.users_dir)?;
        Ok(users.iter().filter(|u| filter.matches(u)).count() as u64)
    }

    async fn count_roles(&self, filter: &RoleFilter) -> AuthGateResult<u64> {
        let roles: Vec<Role> = Self::read_all(&self.roles_dir)?;
        Ok(roles.iter().filter(|r| filter.matches(r)).count() as u64)
    }
}
