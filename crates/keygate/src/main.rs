//! Keygate - credential verification and session token service

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::{Config, LoggingConfig};
use keygate_auth::{
    AuthenticationService, CancellationToken, LoginRejection, PasswordHasher, SessionResolver,
    TokenService, Unauthenticated, UserDirectory,
};
use keygate_db::{Database, NewUser, User};

/// Keygate - credential verification and session tokens
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "KEYGATE_CONFIG")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hash a password with the configured Argon2id parameters
    HashPassword {
        /// Password to hash (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Create a user
    AddUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: Option<String>,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
        /// Create the account disabled
        #[arg(long)]
        inactive: bool,
    },

    /// List users, flagging password hashes made with outdated parameters
    ListUsers,

    /// Replace a user's password, hashing it with the current parameters
    SetPassword {
        #[arg(long)]
        username: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Delete a user; tokens already issued to them stop resolving
    DeleteUser {
        #[arg(long)]
        username: String,
    },

    /// Enable or disable a user
    SetActive {
        #[arg(long)]
        username: String,
        #[arg(long, action = ArgAction::Set)]
        active: bool,
    },

    /// Verify credentials and print a session token
    Login {
        #[arg(long)]
        username: String,
        /// Password (read from stdin when omitted)
        #[arg(long)]
        password: Option<String>,
    },

    /// Resolve a session token to its user
    Whoami {
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration; a missing or invalid secret stops here
    let config = Config::load(&args.config)?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Keygate v{}", env!("CARGO_PKG_VERSION"));
    match &config.loaded_from {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Config file not found at {}, using defaults and environment", args.config),
    }

    let hasher = PasswordHasher::new(&config.auth.hashing)?;

    match args.command {
        Command::HashPassword { password } => {
            let password = password_or_stdin(password)?;
            println!("{}", hasher.hash(&password)?);
        }

        Command::AddUser {
            username,
            email,
            password,
            inactive,
        } => {
            let password = password_or_stdin(password)?;
            let db = open_database(&config).await?;
            let user = db
                .insert_user(NewUser {
                    username,
                    email,
                    password_hash: hasher.hash(&password)?,
                    active: !inactive,
                })
                .await?;
            info!("Created user {} (active: {})", user.username, user.active);
        }

        Command::ListUsers => {
            let db = open_database(&config).await?;
            let users = db.list_users().await?;
            let summaries: Vec<UserSummary> = users
                .iter()
                .map(|user| UserSummary::new(user, &hasher))
                .collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }

        Command::SetPassword { username, password } => {
            let password = password_or_stdin(password)?;
            let db = open_database(&config).await?;
            db.update_user_password(&username, &hasher.hash(&password)?)
                .await?;
            info!("Password updated for user {}", username);
        }

        Command::DeleteUser { username } => {
            let db = open_database(&config).await?;
            db.delete_user(&username).await?;
            info!("Deleted user {}", username);
        }

        Command::SetActive { username, active } => {
            let db = open_database(&config).await?;
            db.set_user_active(&username, active).await?;
            info!("User {} active: {}", username, active);
        }

        Command::Login { username, password } => {
            let password = password_or_stdin(password)?;
            let db = open_database(&config).await?;
            let directory: Arc<dyn UserDirectory> = Arc::new(db);
            let tokens = Arc::new(TokenService::new(&config.auth.token)?);
            let auth = AuthenticationService::new(directory, hasher, tokens)?;

            let cancel = cancel_on_ctrl_c();
            let token = auth
                .login(&username, &password, &cancel)
                .await
                .map_err(LoginRejection::from)?;
            println!("{}", serde_json::to_string_pretty(&token)?);
        }

        Command::Whoami { token } => {
            let db = open_database(&config).await?;
            let directory: Arc<dyn UserDirectory> = Arc::new(db);
            let tokens = Arc::new(TokenService::new(&config.auth.token)?);
            let resolver = SessionResolver::new(tokens, directory);

            let cancel = cancel_on_ctrl_c();
            let user = resolver
                .resolve(&token, &cancel)
                .await
                .map_err(Unauthenticated::from)?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
    }

    Ok(())
}

/// User listing row; never includes the hash itself
#[derive(Debug, Serialize)]
struct UserSummary<'a> {
    username: &'a str,
    email: Option<&'a str>,
    active: bool,
    needs_rehash: bool,
}

impl<'a> UserSummary<'a> {
    fn new(user: &'a User, hasher: &PasswordHasher) -> Self {
        Self {
            username: &user.username,
            email: user.email.as_deref(),
            active: user.active,
            needs_rehash: hasher.needs_rehash(&user.password_hash),
        }
    }
}

/// Initialize logging
fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    // Logs go to stderr so stdout stays clean for tokens and hashes
    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

/// Open the user database, creating its directory if needed
async fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = Path::new(&config.database.path).parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", config.database.path);
    Ok(Database::new(&db_url).await?)
}

/// Cancellation token that fires on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

/// Use the given password or read one line from stdin
fn password_or_stdin(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }

    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("No password given");
    }
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_auth::HashingConfig;
    use keygate_db::utils::parse_datetime_or_now;

    fn fast_hasher(memory_kib: u32) -> PasswordHasher {
        PasswordHasher::new(&HashingConfig {
            memory_kib,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_user_summary_flags_outdated_hash() {
        let old = fast_hasher(64);
        let current = fast_hasher(128);
        let user = User {
            id: 1,
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            password_hash: old.hash("correct").unwrap(),
            active: true,
            created_at: parse_datetime_or_now("2024-01-01T00:00:00Z"),
            updated_at: parse_datetime_or_now("2024-01-01T00:00:00Z"),
        };

        assert!(UserSummary::new(&user, &current).needs_rehash);
        assert!(!UserSummary::new(&user, &old).needs_rehash);

        let json = serde_json::to_string(&UserSummary::new(&user, &current)).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"username\":\"alice\""));
    }

    #[test]
    fn test_cli_parses_user_management_commands() {
        let args = Args::try_parse_from(["keygate", "delete-user", "--username", "bob"]).unwrap();
        assert!(matches!(args.command, Command::DeleteUser { username } if username == "bob"));

        let args = Args::try_parse_from(["keygate", "list-users"]).unwrap();
        assert!(matches!(args.command, Command::ListUsers));

        let args = Args::try_parse_from(["keygate", "set-active", "--username", "bob", "--active", "false"])
            .unwrap();
        assert!(matches!(args.command, Command::SetActive { active: false, .. }));
    }
}
