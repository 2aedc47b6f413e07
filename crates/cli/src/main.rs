//! Fiat Parts - storefront and back office for used Fiat parts.
//!
//! Every invocation restores the persisted session, runs one command, and
//! exits. The guest cart and the session live in the local data directory.
//!
//! # Usage
//!
//! ```bash
//! # Browse the catalog
//! fiat-parts catalog parts --category brakes --search "pad"
//!
//! # Build a cart and check out
//! fiat-parts cart add <part-id>
//! fiat-parts auth login -e me@example.com
//! fiat-parts checkout --address "Via Roma 1" --city Torino --postal-code 10121
//!
//! # Back office (admin role required)
//! fiat-parts admin orders list --status pending
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use fiat_parts_storefront::config::StorefrontConfig;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;
mod error;

use app::App;
use commands::admin::AdminCommand;
use commands::auth::AuthCommand;
use commands::cart::CartCommand;
use commands::catalog::CatalogCommand;
use commands::checkout::CheckoutArgs;
use error::AppError;

#[derive(Parser)]
#[command(name = "fiat-parts")]
#[command(author, version, about = "Fiat Parts storefront and back office")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse parts and categories
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// View and change the cart
    Cart {
        #[command(subcommand)]
        command: CartCommand,
    },
    /// Sign in, register, and manage the profile
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
    /// Place an order for the cart contents
    Checkout(CheckoutArgs),
    /// List the signed-in user's orders
    Orders,
    /// Back-office management
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Map tracing levels to Sentry: errors and warnings become events, info and
/// debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let sentry_guard = init_sentry(&config);

    // Command output goes to stdout; keep the log quiet unless RUST_LOG says otherwise
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "fiat_parts_cli=warn,fiat_parts_storefront=warn,fiat_parts_admin=warn".into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let result = match App::init(&config).await {
        Ok(app) => run(&app, cli).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        e.report();
        #[allow(clippy::print_stderr)]
        {
            eprintln!("error: {e}");
        }
        // Flush pending Sentry events before exiting
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(app: &App, cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Catalog { command } => commands::catalog::run(app, command).await,
        Commands::Cart { command } => commands::cart::run(app, command).await,
        Commands::Auth { command } => commands::auth::run(app, command).await,
        Commands::Checkout(args) => commands::checkout::place_order(app, args).await,
        Commands::Orders => commands::checkout::list_orders(app).await,
        Commands::Admin { command } => commands::admin::run(app, command).await,
    }
}
