//! Storelink CLI - Database migrations, shop tokens and order sync.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! storelink migrate
//!
//! # Connect a shop to an account
//! storelink shops add --account acct-1 --shop acme --token shpat_xxx
//!
//! # Sync every shop of an account (prints the report as JSON)
//! storelink sync --account acct-1 --deadline-secs 600
//!
//! # List synced orders, newest first
//! storelink orders list --account acct-1 --page 1 --page-size 50
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `shops` - Manage shop access tokens
//! - `sync` - Sync orders for an account
//! - `orders` - Inspect synced orders

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storelink_sync::SyncConfig;
use storelink_sync::config::LogFormat;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "storelink")]
#[command(author, version, about = "Storelink order sync tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage shop access tokens
    Shops {
        #[command(subcommand)]
        action: ShopsAction,
    },
    /// Sync orders from every shop of an account
    Sync {
        /// Account identifier
        #[arg(short, long)]
        account: String,

        /// Overall deadline in seconds; shops still running are reported as timed out
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Inspect synced orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum ShopsAction {
    /// Save or replace a shop's access token
    Add {
        /// Account identifier
        #[arg(short, long)]
        account: String,

        /// Shop name (e.g., acme or acme.myshopify.com)
        #[arg(short, long)]
        shop: String,

        /// Admin API access token
        #[arg(short, long)]
        token: String,
    },
    /// List the shops connected to an account
    List {
        /// Account identifier
        #[arg(short, long)]
        account: String,
    },
    /// Disconnect a shop from an account
    Remove {
        /// Account identifier
        #[arg(short, long)]
        account: String,

        /// Shop name
        #[arg(short, long)]
        shop: String,
    },
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List an account's orders, newest first
    List {
        /// Account identifier
        #[arg(short, long)]
        account: String,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: i64,

        /// Orders per page
        #[arg(long, default_value_t = 50)]
        page_size: i64,
    },
    /// Show one order
    Get {
        /// Shop name
        #[arg(short, long)]
        shop: String,

        /// Remote order ID
        #[arg(long)]
        id: i64,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storelink_sync=info,storelink_cli=info".into());

    let json = format == LogFormat::Json;
    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = SyncConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = init_sentry(&config);
    init_tracing(config.log_format);

    let code = match run(cli, &config).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(e) => {
            tracing::error!("Command failed: {e}");
            1
        }
    };

    // Flush pending Sentry events before exiting.
    drop(sentry_guard);
    std::process::exit(code);
}

/// Run a command. `Ok(false)` means it ran but did not fully succeed.
async fn run(cli: Cli, config: &SyncConfig) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run(config).await?,
        Commands::Shops { action } => match action {
            ShopsAction::Add {
                account,
                shop,
                token,
            } => commands::shops::add(config, &account, &shop, token).await?,
            ShopsAction::List { account } => commands::shops::list(config, &account).await?,
            ShopsAction::Remove { account, shop } => {
                commands::shops::remove(config, &account, &shop).await?;
            }
        },
        Commands::Sync {
            account,
            deadline_secs,
        } => return Ok(commands::sync::run(config, &account, deadline_secs).await?),
        Commands::Orders { action } => match action {
            OrdersAction::List {
                account,
                page,
                page_size,
            } => commands::orders::list(config, &account, page, page_size).await?,
            OrdersAction::Get { shop, id } => commands::orders::get(config, &shop, id).await?,
        },
    }
    Ok(true)
}
