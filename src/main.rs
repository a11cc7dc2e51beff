use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use showcase::auth::TokenIssuer;
use showcase::config::{IngestConfig, ServerConfig};
use showcase::server::{AppState, create_router};
use showcase::storage::ProjectStorage;
use showcase::store::{SqliteStore, Store};
use showcase::types::{Role, User};

const NOT_INITIALIZED: &str =
    "Server not initialized. Run 'showcase admin init' first to create the database and admin token.";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "showcase")]
#[command(about = "A server for uploading and viewing student web projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(long, short, default_value = "8080")]
        port: u16,

        /// Data directory for the database, config and project files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Public base URL for external access (e.g., "https://showcase.school.example").
        /// Used for file links. If not set, links are relative.
        #[arg(long)]
        public_base_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database, config and admin token)
    Init {
        /// Data directory for the database, config and project files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Skip interactive prompts
        #[arg(long)]
        non_interactive: bool,
    },

    /// Drop every table and delete every stored project
    Reset {
        /// Data directory for the database, config and project files
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// Confirm that all data should be destroyed
        #[arg(long)]
        yes: bool,
    },
}

fn run_init(data_dir: String, non_interactive: bool) -> anyhow::Result<()> {
    let data_path = PathBuf::from(data_dir);
    fs::create_dir_all(&data_path)?;

    let config = ServerConfig::for_data_dir(&data_path);
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let token_file = config.admin_token_path();

    if store.has_admin_token()? {
        bail!(
            "Server already initialized. Admin token exists at: {}",
            token_file.display()
        );
    }

    let config_file = IngestConfig::path(&data_path);
    if config_file.exists() {
        IngestConfig::load(&data_path)?;
    } else {
        IngestConfig::default().save(&data_path)?;
    }

    let issuer = TokenIssuer::new()?;
    let issued = issuer.issue_admin()?;
    let raw_token = issued.raw;

    store.create_token(&issued.token)?;
    fs::write(&token_file, &raw_token)?;

    #[cfg(unix)]
    set_restrictive_permissions(&token_file);

    println!();
    println!("========================================");
    println!("Admin token (save this, it won't be shown again):");
    println!();
    println!("  {raw_token}");
    println!();
    println!("Token also written to: {}", token_file.display());
    println!("Upload limits written to: {}", config_file.display());
    println!("========================================");
    println!();

    if !non_interactive {
        create_default_user_prompt(&store, &issuer)?;
    }

    Ok(())
}

fn create_default_user_prompt(store: &SqliteStore, issuer: &TokenIssuer) -> anyhow::Result<()> {
    let create_user = inquire::Confirm::new("Would you like to create a default user?")
        .with_default(false)
        .prompt()?;

    if !create_user {
        return Ok(());
    }

    let username = inquire::Text::new("Username:")
        .with_validator(|input: &str| {
            if input.trim().is_empty() {
                Err("Username cannot be empty".into())
            } else if input.contains(char::is_whitespace) {
                Err("Username cannot contain whitespace".into())
            } else {
                Ok(inquire::validator::Validation::Valid)
            }
        })
        .prompt()?;

    let role = inquire::Select::new("Role:", vec![Role::Student, Role::Teacher, Role::Parent])
        .prompt()?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        role,
        created_at: now,
        updated_at: now,
    };
    store.create_user(&user)?;

    let issued = issuer.issue_for(&user, None)?;
    store.create_token(&issued.token)?;

    println!();
    println!("========================================");
    println!("Created {role} '{username}' with token:");
    println!();
    println!("  {}", issued.raw);
    println!();
    if let Some(expires_at) = issued.token.expires_at {
        println!("The token expires on {}.", expires_at.format("%Y-%m-%d"));
        println!();
    }
    println!("========================================");
    println!();

    Ok(())
}

async fn run_reset(data_dir: String, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!("Refusing to reset without --yes. This deletes every user, token and project.");
    }

    let config = ServerConfig::for_data_dir(data_dir);
    if !config.db_path().exists() {
        bail!(NOT_INITIALIZED);
    }

    let store = SqliteStore::new(config.db_path())?;
    store.reset()?;
    ProjectStorage::new(&config.data_dir).purge().await?;

    let token_file = config.admin_token_path();
    if token_file.exists() {
        fs::remove_file(&token_file)?;
    }

    info!("All data removed from {}", config.data_dir.display());
    println!("Reset complete. Run 'showcase admin init' to start over.");

    Ok(())
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    config.validate()?;

    let token_file = config.admin_token_path();
    if !token_file.exists() {
        bail!(NOT_INITIALIZED);
    }

    let store = SqliteStore::new(config.db_path())?;
    if !store.has_admin_token()? {
        bail!(NOT_INITIALIZED);
    }

    info!("Admin token available at {}", token_file.display());

    let ingest = IngestConfig::load(&config.data_dir)?;
    info!(
        max_upload_bytes = ingest.max_upload_bytes,
        max_entries = ingest.limits.max_entries,
        max_total_bytes = ingest.limits.max_total_bytes,
        "Upload limits loaded"
    );

    let state = Arc::new(AppState::new(
        Arc::new(store),
        config.data_dir.clone(),
        ingest,
        config.public_base_url.clone(),
    ));
    state.storage.sweep().await?;

    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("showcase=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                non_interactive,
            } => run_init(data_dir, non_interactive)?,
            AdminCommands::Reset { data_dir, yes } => run_reset(data_dir, yes).await?,
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            run_serve(ServerConfig {
                host,
                port,
                data_dir: data_dir.into(),
                public_base_url,
            })
            .await?;
        }
    }

    Ok(())
}
