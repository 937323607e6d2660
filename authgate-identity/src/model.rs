//! Identity data models
//!
//! Users reference roles by name only; the store owns both lifecycles.
//! Entities carry a monotonically increasing `version` used for optimistic
//! concurrency control in the storage backends.

use authgate_core::{AuthGateError, AuthGateResult, ErrorContext};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

/// Login reserved for the anonymous principal
pub const ANONYMOUS_LOGIN: &str = "anonymous";
/// Login reserved for the system principal
pub const SYSTEM_LOGIN: &str = "system";

/// Role names that every deployment starts with
pub const BUILTIN_ROLES: [&str; 4] = ["anonymous", "user", "dev", "admin"];

/// Role name rule: leading alphanumeric, then a restricted charset. Role
/// names end up in file paths, so no separators and no leading dots.
static ROLE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.\-_]{0,64}$").unwrap());

/// Whether a string is acceptable as a role name
pub fn valid_role_name(name: &str) -> bool {
    ROLE_NAME_RE.is_match(name)
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    New,
    Unconfirmed,
    Active,
    Disabled,
}

impl UserStatus {
    /// Whether the lifecycle state machine allows moving to `next`.
    ///
    /// New -> Unconfirmed (sign-up with confirmation required)
    /// New -> Active (sign-up without confirmation)
    /// Unconfirmed -> Active (successful confirmation)
    /// Active -> Disabled and Disabled -> Active (administrative)
    pub fn can_transition_to(self, next: UserStatus) -> bool {
        use UserStatus::*;
        matches!(
            (self, next),
            (New, Unconfirmed) | (New, Active) | (Unconfirmed, Active) | (Active, Disabled)
                | (Disabled, Active)
        )
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserStatus::New => write!(f, "new"),
            UserStatus::Unconfirmed => write!(f, "unconfirmed"),
            UserStatus::Active => write!(f, "active"),
            UserStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl std::str::FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(UserStatus::New),
            "unconfirmed" => Ok(UserStatus::Unconfirmed),
            "active" => Ok(UserStatus::Active),
            "disabled" => Ok(UserStatus::Disabled),
            _ => Err(format!("Unknown user status: {}", s)),
        }
    }
}

/// Capability-set interface shared by grant-carrying entities
pub trait Permissible {
    /// Check whether this entity grants a permission string
    fn grants(&self, permission: &str) -> bool;
}

/// A named set of permission strings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Role {
    /// Unique role name
    pub name: String,
    pub description: String,
    pub permissions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every save
    pub version: u64,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            permissions: BTreeSet::new(),
            created_at: now,
            modified_at: now,
            version: 1,
        }
    }

    pub fn add_permission(&mut self, permission: impl Into<String>) {
        self.permissions.insert(permission.into());
    }

    pub fn remove_permission(&mut self, permission: &str) {
        self.permissions.remove(permission);
    }
}

impl Permissible for Role {
    fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// A stored user account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier, immutable after creation
    pub uid: String,
    pub login: String,
    pub email: String,
    /// Argon2 hash; None for accounts without a credential yet
    pub password_hash: Option<String>,
    pub status: UserStatus,
    /// Role references by name
    pub roles: BTreeSet<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Opaque profile attributes, not interpreted by the core
    pub profile: BTreeMap<String, String>,
    /// Pending confirmation token, present only while Unconfirmed
    pub confirmation_hash: Option<String>,
    pub sign_in_count: u64,
    pub last_sign_in: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped on every save
    pub version: u64,
}

impl User {
    pub fn new(login: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            uid: uuid::Uuid::new_v4().to_string(),
            login: login.into(),
            email: email.into(),
            password_hash: None,
            status: UserStatus::New,
            roles: BTreeSet::new(),
            first_name: None,
            last_name: None,
            profile: BTreeMap::new(),
            confirmation_hash: None,
            sign_in_count: 0,
            last_sign_in: None,
            created_at: now,
            modified_at: now,
            version: 1,
        }
    }

    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }

    pub fn add_role(&mut self, name: impl Into<String>) {
        self.roles.insert(name.into());
    }

    pub fn remove_role(&mut self, name: &str) {
        self.roles.remove(name);
    }

    /// Hash and store a new credential
    pub fn set_password(&mut self, password: &str) -> AuthGateResult<()> {
        if password.is_empty() {
            return Err(AuthGateError::Validation {
                message: "Password must not be empty".to_string(),
                field: Some("password".to_string()),
                context: ErrorContext::new("model").with_operation("set_password"),
            });
        }
        self.password_hash = Some(crate::password::hash_password(password)?);
        Ok(())
    }

    /// Verify a credential against the stored hash
    pub fn verify_password(&self, password: &str) -> bool {
        match &self.password_hash {
            Some(hash) => crate::password::verify_password(password, hash).unwrap_or(false),
            None => false,
        }
    }

    /// Apply a lifecycle transition, rejecting anything the state machine
    /// does not define.
    pub fn transition_to(&mut self, next: UserStatus) -> AuthGateResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(AuthGateError::Validation {
                message: format!(
                    "Status transition {} -> {} is not allowed",
                    self.status, next
                ),
                field: Some("status".to_string()),
                context: ErrorContext::new("model")
                    .with_operation("transition_to")
                    .with_metadata("uid", &self.uid),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// The acting party in a permission check
#[derive(Debug, Clone)]
pub enum Principal {
    /// Unauthenticated caller; holds only the `anonymous` role grants
    Anonymous,
    /// Internal system principal; passes every permission check
    System,
    User(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Principal::System)
    }

    pub fn uid(&self) -> Option<&str> {
        match self {
            Principal::User(user) => Some(&user.uid),
            _ => None,
        }
    }

    pub fn login(&self) -> &str {
        match self {
            Principal::Anonymous => ANONYMOUS_LOGIN,
            Principal::System => SYSTEM_LOGIN,
            Principal::User(user) => &user.login,
        }
    }
}
