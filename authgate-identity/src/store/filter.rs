//! Store query filters and cursors

use crate::model::{Role, User, UserStatus};
use authgate_core::AuthGateResult;

/// Filter over stored users. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub login: Option<String>,
    pub email: Option<String>,
    pub status: Option<UserStatus>,
    pub role: Option<String>,
    pub confirmation_hash: Option<String>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_confirmation_hash(mut self, hash: impl Into<String>) -> Self {
        self.confirmation_hash = Some(hash.into());
        self
    }

    pub fn matches(&self, user: &User) -> bool {
        if let Some(login) = &self.login {
            if &user.login != login {
                return false;
            }
        }
        if let Some(email) = &self.email {
            if &user.email != email {
                return false;
            }
        }
        if let Some(status) = self.status {
            if user.status != status {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if !user.has_role(role) {
                return false;
            }
        }
        if let Some(hash) = &self.confirmation_hash {
            if user.confirmation_hash.as_deref() != Some(hash.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Filter over stored roles
#[derive(Debug, Clone, Default)]
pub struct RoleFilter {
    pub name: Option<String>,
    pub permission: Option<String>,
}

impl RoleFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    pub fn matches(&self, role: &Role) -> bool {
        if let Some(name) = &self.name {
            if &role.name != name {
                return false;
            }
        }
        if let Some(permission) = &self.permission {
            if !role.permissions.contains(permission) {
                return false;
            }
        }
        true
    }
}

/// Sort key for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Created,
    Login,
}

/// Lazy, restartable iteration over matching users. Each page re-queries
/// the backend, so the cursor stays valid across concurrent mutations.
pub struct UserCursor<'a> {
    store: &'a super::AuthStore,
    filter: UserFilter,
    sort: SortBy,
    page_size: usize,
    offset: usize,
}

impl<'a> UserCursor<'a> {
    pub(super) fn new(
        store: &'a super::AuthStore,
        filter: UserFilter,
        sort: SortBy,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            filter,
            sort,
            page_size,
            offset: 0,
        }
    }

    /// Fetch the next page; an empty page means the sequence is exhausted
    pub async fn next_page(&mut self) -> AuthGateResult<Vec<User>> {
        let page = self
            .store
            .list_users(&self.filter, self.sort, self.page_size, self.offset)
            .await?;
        self.offset += page.len();
        Ok(page)
    }

    /// Restart iteration from the beginning
    pub fn restart(&mut self) {
        self.offset = 0;
    }
}
