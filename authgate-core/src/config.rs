//! Configuration management

use crate::error::{AuthGateError, AuthGateResult, ErrorContext};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the identity core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthGateConfig {
    /// Whether self-registration is allowed
    pub signup_enabled: bool,
    /// Whether new accounts must be confirmed before activation
    pub signup_confirmation_required: bool,
    /// Roles attached to newly signed-up users
    pub new_user_roles: Vec<String>,
    /// Roles that grant every permission regardless of explicit grants
    pub admin_roles: Vec<String>,
    /// Access token time-to-live in seconds. None means tokens never
    /// expire and must be revoked explicitly.
    pub access_token_ttl_secs: Option<u64>,
    /// Deadline applied to every storage backend call
    pub store_op_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AuthGateConfig {
    fn default() -> Self {
        Self {
            signup_enabled: false,
            signup_confirmation_required: true,
            new_user_roles: vec!["user".to_string()],
            admin_roles: vec!["admin".to_string(), "dev".to_string()],
            access_token_ttl_secs: None,
            store_op_timeout_ms: 5_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl AuthGateConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AuthGateResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;

        toml::from_str(&content).map_err(|e| AuthGateError::Config {
            message: format!("Failed to parse config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("from_file")
                .with_metadata("path", &path.as_ref().display().to_string())
                .with_suggestion("Check the TOML syntax of the config file"),
        })
    }

    /// Write configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> AuthGateResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| AuthGateError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("save_to_file"),
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> AuthGateResult<()> {
        if self.admin_roles.is_empty() {
            return Err(AuthGateError::Config {
                message: "admin_roles must not be empty".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Keep at least one full-grant role, e.g. \"admin\""),
            });
        }

        if self.store_op_timeout_ms == 0 {
            return Err(AuthGateError::Config {
                message: "store_op_timeout_ms must be greater than zero".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AuthGateConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.signup_enabled);
        assert!(config.signup_confirmation_required);
        assert!(config.access_token_ttl_secs.is_none());
        assert_eq!(config.admin_roles, vec!["admin", "dev"]);
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authgate.toml");

        let mut config = AuthGateConfig::default();
        config.signup_enabled = true;
        config.access_token_ttl_secs = Some(86_400);
        config.save_to_file(&path).unwrap();

        let loaded = AuthGateConfig::from_file(&path).unwrap();
        assert!(loaded.signup_enabled);
        assert_eq!(loaded.access_token_ttl_secs, Some(86_400));
        assert_eq!(loaded.new_user_roles, vec!["user"]);
    }

    #[test]
    fn empty_admin_roles_rejected() {
        let config = AuthGateConfig {
            admin_roles: vec![],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AuthGateError::Config { .. })
        ));
    }
}
