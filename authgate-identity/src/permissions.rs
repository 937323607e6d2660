//! Permission evaluation
//!
//! Effective permissions are resolved through role membership. Roles listed
//! in the configured admin set grant every permission string, explicit or
//! not; the system principal always passes; the anonymous principal only
//! holds what the `anonymous` role grants.

use crate::model::{Permissible, Principal, Role, User};
use crate::store::AuthStore;
use authgate_core::AuthGateResult;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A user's resolved capability set
#[derive(Debug, Clone)]
pub struct EffectiveGrants {
    /// True when the holder carries a full-grant (admin/dev) role
    pub full_grant: bool,
    pub permissions: BTreeSet<String>,
}

impl Permissible for EffectiveGrants {
    fn grants(&self, permission: &str) -> bool {
        self.full_grant || self.permissions.contains(permission)
    }
}

pub struct PermissionEvaluator {
    store: Arc<AuthStore>,
    admin_roles: Vec<String>,
}

impl PermissionEvaluator {
    pub fn new(store: Arc<AuthStore>, admin_roles: Vec<String>) -> Self {
        Self { store, admin_roles }
    }

    /// Resolve the capability set of a user by loading its roles. Role
    /// references pointing at deleted roles are skipped.
    pub async fn effective_grants(&self, user: &User) -> AuthGateResult<EffectiveGrants> {
        let mut permissions = BTreeSet::new();
        let mut full_grant = false;

        for role_name in &user.roles {
            if self.admin_roles.iter().any(|r| r == role_name) {
                full_grant = true;
                continue;
            }
            match self.store.get_role(role_name).await {
                Ok(role) => permissions.extend(role.permissions.iter().cloned()),
                Err(authgate_core::AuthGateError::NotFound { .. }) => {
                    debug!(role = %role_name, uid = %user.uid, "Skipping dangling role reference");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(EffectiveGrants {
            full_grant,
            permissions,
        })
    }

    /// Check whether a principal holds a permission
    pub async fn has_permission(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> AuthGateResult<bool> {
        match principal {
            // The system principal passes every check
            Principal::System => Ok(true),
            Principal::Anonymous => {
                let grants = self.anonymous_grants().await?;
                Ok(grants.grants(permission))
            }
            Principal::User(user) => {
                let grants = self.effective_grants(user).await?;
                Ok(grants.grants(permission))
            }
        }
    }

    /// Guard form of [`PermissionEvaluator::has_permission`]: fails with
    /// `PermissionDenied` instead of returning false
    pub async fn require_permission(
        &self,
        principal: &Principal,
        permission: &str,
    ) -> AuthGateResult<()> {
        if self.has_permission(principal, permission).await? {
            Ok(())
        } else {
            Err(authgate_core::AuthGateError::PermissionDenied {
                permission: permission.to_string(),
                context: authgate_core::ErrorContext::new("permissions")
                    .with_operation("require_permission")
                    .with_metadata("login", principal.login()),
            })
        }
    }

    pub async fn has_any_permission(
        &self,
        principal: &Principal,
        permissions: &[&str],
    ) -> AuthGateResult<bool> {
        for permission in permissions {
            if self.has_permission(principal, permission).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub async fn has_all_permissions(
        &self,
        principal: &Principal,
        permissions: &[&str],
    ) -> AuthGateResult<bool> {
        for permission in permissions {
            if !self.has_permission(principal, permission).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Permissions available without authentication: whatever the
    /// `anonymous` role explicitly grants
    async fn anonymous_grants(&self) -> AuthGateResult<EffectiveGrants> {
        let permissions = match self.store.get_role("anonymous").await {
            Ok(Role { permissions, .. }) => permissions,
            Err(authgate_core::AuthGateError::NotFound { .. }) => BTreeSet::new(),
            Err(e) => return Err(e),
        };
        Ok(EffectiveGrants {
            full_grant: false,
            permissions,
        })
    }
}
