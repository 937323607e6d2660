//! End-to-end workflow tests: registration, confirmation, sessions, and
//! permission evaluation wired together over the file backend.

use std::sync::Arc;

use authgate_core::{AuthGateConfig, AuthGateError, MemoryEventSink};
use authgate_identity::{
    AuthService, AuthStore, JsonFileBackend, Principal, SignUpRequest, TokenManager, TokenPolicy,
    UserStatus,
};

fn build_service(
    dir: &std::path::Path,
    config: AuthGateConfig,
) -> (AuthService, Arc<MemoryEventSink>) {
    let events = Arc::new(MemoryEventSink::new());
    let backend = Arc::new(JsonFileBackend::open(dir).unwrap());
    let store = Arc::new(AuthStore::new(
        backend,
        events.clone(),
        config.store_op_timeout_ms,
    ));
    let tokens = Arc::new(TokenManager::new(TokenPolicy::never_expires()));
    (AuthService::new(store, tokens, config), events)
}

fn open_signup_config() -> AuthGateConfig {
    AuthGateConfig {
        signup_enabled: true,
        signup_confirmation_required: false,
        ..AuthGateConfig::default()
    }
}

fn request(login: &str) -> SignUpRequest {
    SignUpRequest {
        login: login.to_string(),
        email: format!("{}@example.com", login),
        password: "correct-horse-battery".to_string(),
        first_name: Some("Test".to_string()),
        last_name: None,
    }
}

#[tokio::test]
async fn register_confirm_sign_in_check_permission() {
    let dir = tempfile::tempdir().unwrap();
    let config = AuthGateConfig {
        signup_enabled: true,
        signup_confirmation_required: true,
        ..AuthGateConfig::default()
    };
    let (service, events) = build_service(dir.path(), config);
    service.bootstrap().await.unwrap();

    // Grant a permission through a role the default sign-up role chain
    // does not carry
    let store = service.store();
    let mut editor = authgate_identity::Role::new("editor", "Content editors");
    editor.add_permission("content.edit");
    store.create_role(editor).await.unwrap();

    let outcome = service.sign_up(request("alice")).await.unwrap();
    let hash = outcome.confirmation_hash.expect("confirmation required");
    assert_eq!(outcome.user.status, UserStatus::Unconfirmed);

    let mut user = service.confirm(&hash).await.unwrap();
    assert_eq!(user.status, UserStatus::Active);

    user.add_role("editor");
    store.save_user(&mut user).await.unwrap();

    let session = service
        .sign_in("alice", "correct-horse-battery")
        .await
        .unwrap();
    let principal = Principal::User(session.user.clone());

    let evaluator = service.evaluator();
    assert!(evaluator
        .has_permission(&principal, "content.edit")
        .await
        .unwrap());
    assert!(!evaluator
        .has_permission(&principal, "content.delete")
        .await
        .unwrap());
    assert!(!evaluator
        .has_permission(&Principal::Anonymous, "content.edit")
        .await
        .unwrap());
    assert!(evaluator
        .has_permission(&Principal::System, "content.edit")
        .await
        .unwrap());

    let names = events.event_names();
    for expected in ["sign_up", "user.status_change", "sign_in"] {
        assert!(names.iter().any(|n| *n == expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn admin_role_grants_everything() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = build_service(dir.path(), open_signup_config());
    service.bootstrap().await.unwrap();

    let admin = service
        .admin_create_user(
            "root",
            "root@example.com",
            Some("s3cret-s3cret"),
            &["admin".to_string()],
            UserStatus::Active,
        )
        .await
        .unwrap();
    let dev = service
        .admin_create_user(
            "devon",
            "devon@example.com",
            Some("s3cret-s3cret"),
            &["dev".to_string()],
            UserStatus::Active,
        )
        .await
        .unwrap();

    let evaluator = service.evaluator();
    for user in [admin, dev] {
        let principal = Principal::User(user);
        assert!(evaluator
            .has_permission(&principal, "anything.at.all")
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn sessions_span_store_reopen_but_tokens_do_not() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (service, _) = build_service(dir.path(), open_signup_config());
        service.bootstrap().await.unwrap();
        service.sign_up(request("alice")).await.unwrap();
        let session = service
            .sign_in("alice", "correct-horse-battery")
            .await
            .unwrap();
        assert!(service.tokens().validate(&session.access_token).await.is_ok());
    }

    // Accounts persist; tokens are process-local and start empty
    let (service, _) = build_service(dir.path(), open_signup_config());
    service.bootstrap().await.unwrap();
    let session = service
        .sign_in("alice", "correct-horse-battery")
        .await
        .unwrap();
    assert_eq!(session.user.sign_in_count, 2);
}

#[tokio::test]
async fn disabled_account_loses_access_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _) = build_service(dir.path(), open_signup_config());
    service.bootstrap().await.unwrap();

    let outcome = service.sign_up(request("alice")).await.unwrap();
    let session = service
        .sign_in("alice", "correct-horse-battery")
        .await
        .unwrap();

    service
        .set_status(&outcome.user.uid, UserStatus::Disabled)
        .await
        .unwrap();

    let err = service
        .tokens()
        .validate(&session.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthGateError::TokenInvalid { .. }));

    let err = service
        .sign_in("alice", "correct-horse-battery")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthGateError::UserNotActive { .. }));
}
