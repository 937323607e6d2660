//! Authgate CLI - administrative interface for the identity store
//!
//! Operates directly on the JSON file backend; no server required.

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use authgate_core::{
    init_logging, AuthGateConfig, AuthGateError, AuthGateResult, ErrorContext, EventSink,
    TracingEventSink,
};
use authgate_identity::{
    AuthService, AuthStore, JsonFileBackend, SortBy, TokenManager, TokenPolicy, UserFilter,
    UserStatus,
};

#[derive(Parser)]
#[command(name = "authgate")]
#[command(about = "User and role administration for the authgate identity store")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory holding the user/role store
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user account
    UserAdd {
        /// Login name
        login: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password; prompted interactively when omitted
        #[arg(short, long)]
        password: Option<String>,

        /// Roles to attach (comma-separated)
        #[arg(short, long, default_value = "user")]
        roles: String,

        /// Initial status (new, unconfirmed, active, disabled)
        #[arg(short, long, default_value = "active")]
        status: String,
    },

    /// Modify an existing user account
    UserMod {
        /// Login name
        login: String,

        /// New email address
        #[arg(long)]
        email: Option<String>,

        /// New status (new, unconfirmed, active, disabled)
        #[arg(long)]
        status: Option<String>,

        /// Role to attach
        #[arg(long)]
        add_role: Option<String>,

        /// Role to detach
        #[arg(long)]
        remove_role: Option<String>,

        /// First name
        #[arg(long)]
        first_name: Option<String>,

        /// Last name
        #[arg(long)]
        last_name: Option<String>,
    },

    /// Change a user's password
    Passwd {
        /// Login name
        login: String,

        /// New password; prompted interactively when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create a role
    RoleAdd {
        /// Role name
        name: String,

        /// Role description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Permissions to grant (comma-separated)
        #[arg(short, long)]
        permissions: Option<String>,
    },

    /// List user accounts
    UserList {
        /// Filter by status (new, unconfirmed, active, disabled)
        #[arg(long)]
        status: Option<String>,

        /// Filter by role membership
        #[arg(long)]
        role: Option<String>,

        /// Maximum number of accounts to print (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> AuthGateResult<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }
    init_logging(&logging_config).map_err(|e| AuthGateError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli").with_operation("init_logging"),
    })?;

    let data_dir = cli
        .data_dir
        .or_else(|| dirs::home_dir().map(|d| d.join(".authgate")))
        .ok_or_else(|| AuthGateError::Config {
            message: "Cannot determine a data directory; pass --data-dir".to_string(),
            source: None,
            context: ErrorContext::new("cli"),
        })?;
    info!(data_dir = %data_dir.display(), "Opening store");

    let backend = Arc::new(JsonFileBackend::open(&data_dir)?);
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let store = Arc::new(AuthStore::new(backend, events, config.store_op_timeout_ms));
    let policy = match config.access_token_ttl_secs {
        Some(secs) => TokenPolicy::with_ttl_secs(secs as i64),
        None => TokenPolicy::never_expires(),
    };
    let tokens = Arc::new(TokenManager::new(policy));
    let service = AuthService::new(store, tokens, config);
    service.bootstrap().await?;

    match cli.command {
        Commands::UserAdd {
            login,
            email,
            password,
            roles,
            status,
        } => handle_user_add(&service, login, email, password, roles, status).await?,
        Commands::UserMod {
            login,
            email,
            status,
            add_role,
            remove_role,
            first_name,
            last_name,
        } => {
            handle_user_mod(
                &service,
                login,
                email,
                status,
                add_role,
                remove_role,
                first_name,
                last_name,
            )
            .await?
        }
        Commands::Passwd { login, password } => handle_passwd(&service, login, password).await?,
        Commands::RoleAdd {
            name,
            description,
            permissions,
        } => handle_role_add(&service, name, description, permissions).await?,
        Commands::UserList {
            status,
            role,
            limit,
        } => handle_user_list(&service, status, role, limit).await?,
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> AuthGateResult<AuthGateConfig> {
    if let Some(path) = path {
        return AuthGateConfig::from_file(path);
    }
    let default_paths = [
        dirs::config_dir().map(|d| d.join("authgate").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".authgate").join("config.toml")),
        Some(PathBuf::from("authgate.toml")),
    ];
    for path in default_paths.into_iter().flatten() {
        if path.exists() {
            return AuthGateConfig::from_file(&path);
        }
    }
    Ok(AuthGateConfig::default())
}

async fn handle_user_add(
    service: &AuthService,
    login: String,
    email: String,
    password: Option<String>,
    roles: String,
    status: String,
) -> AuthGateResult<()> {
    let status = parse_status(&status)?;
    let roles: Vec<String> = roles
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    let password = match password {
        Some(p) => p,
        None => prompt_password()?,
    };

    let user = service
        .admin_create_user(&login, &email, Some(&password), &roles, status)
        .await?;
    println!("Created user '{}' ({}, {})", user.login, user.uid, user.status);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_user_mod(
    service: &AuthService,
    login: String,
    email: Option<String>,
    status: Option<String>,
    add_role: Option<String>,
    remove_role: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
) -> AuthGateResult<()> {
    let store = service.store();
    let mut user = store.get_user_by_login(&login).await?;

    if let Some(email) = email {
        user.email = email;
    }
    if let Some(role) = add_role {
        store.get_role(&role).await?;
        user.add_role(role);
    }
    if let Some(role) = &remove_role {
        user.remove_role(role);
    }
    if let Some(first_name) = first_name {
        user.first_name = Some(first_name);
    }
    if let Some(last_name) = last_name {
        user.last_name = Some(last_name);
    }
    store.save_user(&mut user).await?;

    // Status changes go through the service so sessions get revoked
    if let Some(status) = status {
        let status = parse_status(&status)?;
        user = service.set_status(&user.uid, status).await?;
    }

    println!("Updated user '{}' ({})", user.login, user.status);
    Ok(())
}

async fn handle_passwd(
    service: &AuthService,
    login: String,
    password: Option<String>,
) -> AuthGateResult<()> {
    let password = match password {
        Some(p) => p,
        None => prompt_password()?,
    };
    service.change_password(&login, &password).await?;
    println!("Password changed for '{}'", login);
    Ok(())
}

async fn handle_role_add(
    service: &AuthService,
    name: String,
    description: String,
    permissions: Option<String>,
) -> AuthGateResult<()> {
    let mut role = authgate_identity::Role::new(name, description);
    if let Some(permissions) = permissions {
        for permission in permissions.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            role.add_permission(permission);
        }
    }
    let role = service.store().create_role(role).await?;
    println!(
        "Created role '{}' with {} permission(s)",
        role.name,
        role.permissions.len()
    );
    Ok(())
}

async fn handle_user_list(
    service: &AuthService,
    status: Option<String>,
    role: Option<String>,
    limit: usize,
) -> AuthGateResult<()> {
    let mut filter = UserFilter::new();
    if let Some(status) = status {
        filter = filter.with_status(parse_status(&status)?);
    }
    if let Some(role) = role {
        filter = filter.with_role(role);
    }

    let users = service
        .store()
        .list_users(&filter, SortBy::Login, limit, 0)
        .await?;
    if users.is_empty() {
        println!("No matching users");
        return Ok(());
    }

    println!(
        "{:<20} {:<30} {:<12} {:<10} ROLES",
        "LOGIN", "EMAIL", "STATUS", "SIGN-INS"
    );
    for user in &users {
        let roles: Vec<&str> = user.roles.iter().map(String::as_str).collect();
        println!(
            "{:<20} {:<30} {:<12} {:<10} {}",
            user.login,
            user.email,
            user.status.to_string(),
            user.sign_in_count,
            roles.join(",")
        );
    }
    println!("{} user(s)", users.len());
    Ok(())
}

fn parse_status(s: &str) -> AuthGateResult<UserStatus> {
    UserStatus::from_str(s).map_err(|message| AuthGateError::Validation {
        message,
        field: Some("status".to_string()),
        context: ErrorContext::new("cli").with_operation("parse_status"),
    })
}

/// Read a new password from stdin, asking twice
fn prompt_password() -> AuthGateResult<String> {
    let stdin = std::io::stdin();
    let mut read_line = |prompt: &str| -> AuthGateResult<String> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        let mut line = String::new();
        stdin.lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    };

    let first = read_line("New password: ")?;
    let second = read_line("Repeat password: ")?;
    if first != second {
        return Err(AuthGateError::Validation {
            message: "Passwords do not match".to_string(),
            field: Some("password".to_string()),
            context: ErrorContext::new("cli").with_operation("prompt_password"),
        });
    }
    if first.is_empty() {
        return Err(AuthGateError::Validation {
            message: "Password must not be empty".to_string(),
            field: Some("password".to_string()),
            context: ErrorContext::new("cli").with_operation("prompt_password"),
        });
    }
    Ok(first)
}
