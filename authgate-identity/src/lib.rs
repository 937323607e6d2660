//! Authgate Identity - user/role store, permission evaluation, and
//! access-token lifecycle
//!
//! The crate is organized around four collaborators:
//! - [`store::AuthStore`]: versioned persistence of users and roles with
//!   pre/post mutation hooks and event emission
//! - [`permissions::PermissionEvaluator`]: resolves effective permissions
//!   through role membership
//! - [`tokens::TokenManager`]: issues, validates, and revokes access tokens
//! - [`workflow::AuthService`]: the sign-up/sign-in/status state machine
//!   tying the others together

pub mod model;
pub mod password;
pub mod permissions;
pub mod store;
pub mod tokens;
pub mod workflow;

pub use model::{Permissible, Principal, Role, User, UserStatus};
pub use permissions::{EffectiveGrants, PermissionEvaluator};
pub use store::{
    AuthStore, HookStage, JsonFileBackend, MemoryBackend, RoleFilter, SortBy, StorageBackend,
    UserCursor, UserFilter,
};
pub use tokens::{AccessToken, TokenManager, TokenPolicy};
pub use workflow::{AuthService, SignInOutcome, SignUpOutcome, SignUpRequest};
