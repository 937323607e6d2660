//! Sign-up, sign-in, and account status workflow
//!
//! [`AuthService`] is the high-level entry point: it wires the entity
//! store, the token manager, and the permission evaluator together and
//! drives the account lifecycle state machine.

use crate::model::{User, UserStatus};
use crate::permissions::PermissionEvaluator;
use crate::store::{AuthStore, UserFilter};
use crate::tokens::TokenManager;
use authgate_core::{AuthEvent, AuthGateConfig, AuthGateError, AuthGateResult, ErrorContext, EventSink};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Login validity: leading alphanumeric, then 1..=64 of a restricted set
static LOGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9.\-_@]{1,64}$").unwrap());

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Input to self-service registration
#[derive(Debug, Clone)]
pub struct SignUpRequest {
    pub login: String,
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub user: User,
    /// Present when the account must be confirmed before sign-in; the
    /// caller is responsible for delivering it out of band
    pub confirmation_hash: Option<String>,
}

/// Result of a successful sign-in
#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub user: User,
    /// Raw access token; shown once, never stored as-is
    pub access_token: String,
}

pub struct AuthService {
    store: Arc<AuthStore>,
    tokens: Arc<TokenManager>,
    evaluator: PermissionEvaluator,
    events: Arc<dyn EventSink>,
    config: AuthGateConfig,
}

impl AuthService {
    pub fn new(store: Arc<AuthStore>, tokens: Arc<TokenManager>, config: AuthGateConfig) -> Self {
        let evaluator = PermissionEvaluator::new(store.clone(), config.admin_roles.clone());
        let events = store.events().clone();
        Self {
            store,
            tokens,
            evaluator,
            events,
            config,
        }
    }

    pub fn store(&self) -> &Arc<AuthStore> {
        &self.store
    }

    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Seed built-in roles plus any configured default roles. Idempotent;
    /// run once at startup.
    pub async fn bootstrap(&self) -> AuthGateResult<()> {
        self.store.ensure_builtin_roles().await?;
        for name in &self.config.new_user_roles {
            if self.store.get_role(name).await.is_err() {
                self.store
                    .create_role(crate::model::Role::new(name, "Default sign-up role"))
                    .await?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Self-service registration. Disabled deployments reject outright;
    /// otherwise the account lands in `Unconfirmed` (with a confirmation
    /// hash to deliver) or directly in `Active`, per configuration.
    pub async fn sign_up(&self, request: SignUpRequest) -> AuthGateResult<SignUpOutcome> {
        if !self.config.signup_enabled {
            return Err(AuthGateError::SignUp {
                message: "Sign-up is disabled".to_string(),
                context: ErrorContext::new("workflow").with_operation("sign_up"),
            });
        }
        validate_login(&request.login)?;
        validate_email(&request.email)?;

        // Best-effort: unlike login uniqueness, which the backend claims
        // atomically on persist, email uniqueness is only this pre-check
        if self
            .store
            .find_user(&UserFilter::new().with_email(request.email.clone()))
            .await?
            .is_some()
        {
            return Err(AuthGateError::UserExists {
                login: request.login.clone(),
                context: ErrorContext::new("workflow")
                    .with_operation("sign_up")
                    .with_metadata("email", &request.email),
            });
        }

        let mut user = User::new(request.login, request.email);
        user.first_name = request.first_name;
        user.last_name = request.last_name;
        user.set_password(&request.password)
            .map_err(|e| e.in_operation("sign_up"))?;
        for role in &self.config.new_user_roles {
            user.add_role(role.clone());
        }

        let confirmation_hash = if self.config.signup_confirmation_required {
            let hash = generate_confirmation_hash();
            user.confirmation_hash = Some(hash.clone());
            user.transition_to(UserStatus::Unconfirmed)?;
            Some(hash)
        } else {
            user.transition_to(UserStatus::Active)?;
            None
        };

        // Login uniqueness is enforced by the store; a race between two
        // sign-ups with the same login surfaces as UserExists here.
        let user = self.store.create_user(user).await?;

        self.events.emit(AuthEvent::SignedUp {
            uid: user.uid.clone(),
            login: user.login.clone(),
        });
        self.events.emit(AuthEvent::UserStatusChanged {
            uid: user.uid.clone(),
            from: UserStatus::New.to_string(),
            to: user.status.to_string(),
        });
        info!(uid = %user.uid, login = %user.login, status = %user.status, "User signed up");

        Ok(SignUpOutcome {
            user,
            confirmation_hash,
        })
    }

    /// Redeem a confirmation hash, activating the account. Unknown hashes
    /// fail with `NotFound`; a hash is single-use.
    pub async fn confirm(&self, hash: &str) -> AuthGateResult<User> {
        let mut user = self
            .store
            .find_user(&UserFilter::new().with_confirmation_hash(hash))
            .await?
            .ok_or_else(|| AuthGateError::NotFound {
                entity: "confirmation".to_string(),
                context: ErrorContext::new("workflow").with_operation("confirm"),
            })?;

        let from = user.status;
        user.transition_to(UserStatus::Active)?;
        user.confirmation_hash = None;
        self.store.save_user(&mut user).await?;

        self.events.emit(AuthEvent::UserStatusChanged {
            uid: user.uid.clone(),
            from: from.to_string(),
            to: user.status.to_string(),
        });
        info!(uid = %user.uid, login = %user.login, "Account confirmed");
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Verify credentials and issue an access token. Unknown logins and
    /// wrong passwords fail identically to avoid probing.
    pub async fn sign_in(&self, login: &str, password: &str) -> AuthGateResult<SignInOutcome> {
        let mut user = match self.store.get_user_by_login(login).await {
            Ok(user) => user,
            Err(AuthGateError::NotFound { .. }) => {
                return Err(self.sign_in_failure(login, "unknown login"));
            }
            Err(e) => return Err(e),
        };

        if !user.verify_password(password) {
            return Err(self.sign_in_failure(login, "bad credentials"));
        }

        match user.status {
            UserStatus::New | UserStatus::Unconfirmed => {
                self.emit_sign_in_failed(login, "not confirmed");
                return Err(AuthGateError::UserNotConfirmed {
                    login: login.to_string(),
                    context: ErrorContext::new("workflow").with_operation("sign_in"),
                });
            }
            UserStatus::Disabled => {
                self.emit_sign_in_failed(login, "disabled");
                return Err(AuthGateError::UserNotActive {
                    login: login.to_string(),
                    context: ErrorContext::new("workflow").with_operation("sign_in"),
                });
            }
            UserStatus::Active => {}
        }

        user.sign_in_count += 1;
        user.last_sign_in = Some(chrono::Utc::now());
        self.store.save_user(&mut user).await?;

        let access_token = self.tokens.issue(&user).await?;
        self.events.emit(AuthEvent::SignedIn {
            uid: user.uid.clone(),
            login: user.login.clone(),
        });
        info!(uid = %user.uid, login = %user.login, count = user.sign_in_count, "User signed in");

        Ok(SignInOutcome { user, access_token })
    }

    /// Revoke a session token. Succeeds for tokens that are already
    /// invalid; only a live token produces a sign-out event.
    pub async fn sign_out(&self, raw_token: &str) -> AuthGateResult<()> {
        if let Ok(uid) = self.tokens.validate(raw_token).await {
            self.tokens.revoke(raw_token).await;
            self.events.emit(AuthEvent::SignedOut { uid });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    /// Administrative account creation; skips the sign-up gate and lands
    /// the account directly in the requested status.
    pub async fn admin_create_user(
        &self,
        login: &str,
        email: &str,
        password: Option<&str>,
        roles: &[String],
        status: UserStatus,
    ) -> AuthGateResult<User> {
        validate_login(login)?;
        validate_email(email)?;

        let mut user = User::new(login, email);
        if let Some(password) = password {
            user.set_password(password)?;
        }
        for role in roles {
            // Dangling role references are rejected up front on this path
            self.store
                .get_role(role)
                .await
                .map_err(|e| e.in_operation("admin_create_user"))?;
            user.add_role(role.clone());
        }
        apply_admin_status(&mut user, status)?;

        self.store.create_user(user).await
    }

    /// Administrative status change. Leaving `Active` revokes every live
    /// session of the account.
    pub async fn set_status(&self, uid: &str, next: UserStatus) -> AuthGateResult<User> {
        let mut user = self.store.get_user(uid).await?;
        let from = user.status;
        if from == next {
            return Ok(user);
        }

        user.transition_to(next)?;
        self.store.save_user(&mut user).await?;

        if from == UserStatus::Active {
            self.tokens.revoke_all_for(uid).await;
            warn!(uid = %uid, "Revoked all sessions on status change");
        }

        self.events.emit(AuthEvent::UserStatusChanged {
            uid: user.uid.clone(),
            from: from.to_string(),
            to: next.to_string(),
        });
        Ok(user)
    }

    /// Replace a user's credential and drop their live sessions
    pub async fn change_password(&self, login: &str, new_password: &str) -> AuthGateResult<()> {
        let mut user = self.store.get_user_by_login(login).await?;
        user.set_password(new_password)?;
        self.store.save_user(&mut user).await?;
        self.tokens.revoke_all_for(&user.uid).await;
        info!(uid = %user.uid, login = %user.login, "Password changed");
        Ok(())
    }

    /// Earliest-created user holding any full-grant role, if one exists
    pub async fn first_admin(&self) -> AuthGateResult<Option<User>> {
        let mut earliest: Option<User> = None;
        for role in &self.config.admin_roles {
            if let Some(user) = self
                .store
                .find_user(&UserFilter::new().with_role(role.clone()))
                .await?
            {
                let replace = earliest
                    .as_ref()
                    .map(|cur| user.created_at < cur.created_at)
                    .unwrap_or(true);
                if replace {
                    earliest = Some(user);
                }
            }
        }
        Ok(earliest)
    }

    fn sign_in_failure(&self, login: &str, reason: &str) -> AuthGateError {
        self.emit_sign_in_failed(login, reason);
        AuthGateError::Authentication {
            message: "Invalid login or password".to_string(),
            context: ErrorContext::new("workflow").with_operation("sign_in"),
        }
    }

    fn emit_sign_in_failed(&self, login: &str, reason: &str) {
        self.events.emit(AuthEvent::SignInFailed {
            login: login.to_string(),
            reason: reason.to_string(),
        });
    }
}

fn validate_login(login: &str) -> AuthGateResult<()> {
    if LOGIN_RE.is_match(login) {
        Ok(())
    } else {
        Err(AuthGateError::Validation {
            message: format!("Invalid login '{}'", login),
            field: Some("login".to_string()),
            context: ErrorContext::new("workflow").with_operation("validate_login"),
        })
    }
}

fn validate_email(email: &str) -> AuthGateResult<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AuthGateError::Validation {
            message: format!("Invalid email '{}'", email),
            field: Some("email".to_string()),
            context: ErrorContext::new("workflow").with_operation("validate_email"),
        })
    }
}

/// Drive a fresh account to `status` through legal transitions only
fn apply_admin_status(user: &mut User, status: UserStatus) -> AuthGateResult<()> {
    match status {
        UserStatus::New => Ok(()),
        UserStatus::Unconfirmed | UserStatus::Active => user.transition_to(status),
        UserStatus::Disabled => {
            user.transition_to(UserStatus::Active)?;
            user.transition_to(UserStatus::Disabled)
        }
    }
}

fn generate_confirmation_hash() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
