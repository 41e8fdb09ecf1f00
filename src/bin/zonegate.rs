use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use axum::Router;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::{net::TcpListener, signal};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use zonegate::{
    AppState,
    actions::ZONE_COLLECTION_ROOT,
    api,
    auth::{AuthConfig, DEFAULT_MAX_BODY_BYTES},
    bootstrap::{BootstrapService, BootstrapState},
    config::{AppConfig, DEFAULT_LISTEN},
    crypto::{MasterKey, generate_token},
    db::{CredentialStore, SqliteStore, StoreConfig},
    metrics::TracingMetrics,
    permissions::NewPermission,
    upstream::{DEFAULT_BASE_URL, UpstreamConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    /// Master encryption key (32 raw characters or base64 of 32 bytes)
    #[arg(long, env = "ENCRYPTION_KEY", hide_env_values = true, value_name = "KEY")]
    encryption_key: String,
    /// Path to the SQLite database file
    #[arg(long, env = "DATA_PATH", value_name = "PATH", default_value = "data/zonegate.db")]
    db_path: PathBuf,
    /// Per-operation credential store timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 5)]
    store_timeout_secs: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the authorizing proxy
    Serve(ServeArgs),
    /// Manage API tokens
    #[command(subcommand)]
    Token(TokenCommand),
    /// Manage permissions of scoped tokens
    #[command(subcommand)]
    Permission(PermissionCommand),
}

#[derive(Args, Debug)]
#[command(rename_all = "kebab-case")]
struct ServeArgs {
    /// Listen address for the HTTP server
    #[arg(long, env = "HTTP_LISTEN", value_name = "ADDR", default_value = DEFAULT_LISTEN)]
    listen: SocketAddr,
    /// Upstream DNS API key; becomes the master credential on first start
    #[arg(long, env = "BUNNY_API_KEY", hide_env_values = true, value_name = "KEY")]
    upstream_api_key: String,
    /// Upstream DNS API base URL
    #[arg(long, env = "UPSTREAM_URL", value_name = "URL", default_value = DEFAULT_BASE_URL)]
    upstream_url: String,
    /// Upstream request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    upstream_timeout_secs: u64,
    /// Maximum accepted request body size in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    /// Reject the master credential once an admin token exists
    #[arg(long, env = "MASTER_KEY_LOCKOUT")]
    master_key_lockout: bool,
    /// Path prefix of the zone collection, forwarded as-is
    #[arg(long, value_name = "PATH", default_value = ZONE_COLLECTION_ROOT)]
    zone_root: String,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a new token and print its secret once
    Create {
        #[arg(long)]
        name: String,
        /// Grant full access, including zone creation and settings
        #[arg(long)]
        admin: bool,
    },
    List,
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
enum PermissionCommand {
    /// Attach a permission row to a scoped token
    Add {
        token_id: i64,
        /// Zone id; 0 means every zone
        #[arg(long, default_value_t = 0)]
        zone: i64,
        /// Allowed record types, e.g. TXT,A (empty allows all)
        #[arg(long = "record-type", value_delimiter = ',')]
        record_types: Vec<String>,
        /// Allowed actions, e.g. add_record,delete_record (empty allows all)
        #[arg(long = "action", value_delimiter = ',')]
        actions: Vec<String>,
    },
    List {
        token_id: i64,
    },
    Remove {
        id: i64,
    },
}

#[derive(Serialize)]
struct IssuedToken<'a> {
    #[serde(flatten)]
    token: &'a zonegate::db::Token,
    secret: &'a str,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let Cli {
        encryption_key,
        db_path,
        store_timeout_secs,
        command,
    } = Cli::parse();

    let master_key = MasterKey::parse(&encryption_key).context("invalid ENCRYPTION_KEY")?;
    let store_config = StoreConfig {
        path: db_path,
        op_timeout: Duration::from_secs(store_timeout_secs),
        ..StoreConfig::default()
    };

    match command {
        Command::Serve(args) => serve(store_config, master_key, args).await,
        Command::Token(cmd) => {
            let store = open_store(&store_config, master_key).await?;
            let res = run_token_command(&store, cmd).await;
            store.close().await?;
            res
        }
        Command::Permission(cmd) => {
            let store = open_store(&store_config, master_key).await?;
            let res = run_permission_command(&store, cmd).await;
            store.close().await?;
            res
        }
    }
}

async fn open_store(config: &StoreConfig, master_key: MasterKey) -> Result<SqliteStore> {
    SqliteStore::open(config, master_key)
        .await
        .with_context(|| format!("failed to open credential store {}", config.path.display()))
}

async fn serve(store_config: StoreConfig, master_key: MasterKey, args: ServeArgs) -> Result<()> {
    let config = build_app_config(store_config, &args)?;

    let store: Arc<dyn CredentialStore> = Arc::new(open_store(&config.store, master_key).await?);
    let bootstrap = BootstrapService::new(store.clone());
    bootstrap
        .ensure_bootstrapped(&args.upstream_api_key)
        .await
        .context("failed to bootstrap master identity")?;
    let upstream_key = store
        .get_master_api_key()
        .await
        .context("failed to load upstream credential")?;

    match bootstrap.state().await? {
        BootstrapState::Unconfigured => {
            warn!("no admin token issued yet; create one with `zonegate token create --admin`")
        }
        BootstrapState::Configured => info!("admin token present"),
    }

    let state = AppState::new(
        config.clone(),
        store.clone(),
        Arc::new(TracingMetrics),
        &upstream_key,
    );
    let zone_root = state.auth.parser().root().to_string();
    let app = Router::new()
        .merge(api::create_router(state))
        .layer(RequestBodyLimitLayer::new(config.body_limit()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind to {}", config.listen))?;

    info!(
        zone_root = %zone_root,
        "listening on http://{}",
        listener.local_addr()?
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    store.close().await?;
    Ok(())
}

fn build_app_config(store: StoreConfig, args: &ServeArgs) -> Result<AppConfig> {
    if args.upstream_api_key.trim().is_empty() {
        bail!("BUNNY_API_KEY cannot be empty");
    }
    if args.max_body_bytes == 0 {
        bail!("--max-body-bytes must be positive");
    }
    if !args.zone_root.starts_with('/') || args.zone_root.trim_end_matches('/').is_empty() {
        bail!("--zone-root must be an absolute path below '/'");
    }
    let base_url = args.upstream_url.trim().trim_end_matches('/');
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        bail!("invalid upstream URL '{}'", args.upstream_url);
    }

    Ok(AppConfig {
        listen: args.listen,
        store,
        upstream: UpstreamConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(args.upstream_timeout_secs),
            ..UpstreamConfig::default()
        },
        auth: AuthConfig {
            max_body_bytes: args.max_body_bytes,
            master_key_lockout: args.master_key_lockout,
            zone_root: args.zone_root.clone(),
            ..AuthConfig::default()
        },
    })
}

async fn run_token_command(store: &SqliteStore, cmd: TokenCommand) -> Result<()> {
    match cmd {
        TokenCommand::Create { name, admin } => {
            let secret = generate_token();
            let token = store.create_token(&name, &secret, admin).await?;
            info!(token_id = token.id, admin, "token issued");
            print_json(&IssuedToken {
                token: &token,
                secret: &secret,
            })
        }
        TokenCommand::List => print_json(&store.list_tokens().await?),
        TokenCommand::Delete { id } => {
            store.delete_token(id).await?;
            info!(token_id = id, "token deleted");
            Ok(())
        }
    }
}

async fn run_permission_command(store: &SqliteStore, cmd: PermissionCommand) -> Result<()> {
    match cmd {
        PermissionCommand::Add {
            token_id,
            zone,
            record_types,
            actions,
        } => {
            let perm = store
                .add_permission(
                    token_id,
                    NewPermission {
                        zone_id: zone,
                        record_types,
                        allowed_actions: actions,
                    },
                )
                .await?;
            print_json(&perm)
        }
        PermissionCommand::List { token_id } => {
            print_json(&store.list_permissions(token_id).await?)
        }
        PermissionCommand::Remove { id } => {
            store.remove_permission(id).await?;
            info!(permission_id = id, "permission removed");
            Ok(())
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install CTRL+C handler: {err}");
    }
    info!("shutdown signal received");
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
