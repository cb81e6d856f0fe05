//! # Snippetbox Server
//!
//! This is the main entry point for the snippet sharing site.
//!
//! ## Key Concepts
//! - **Chains**: ordered interceptors around each handler (see `snippetbox::routes`)
//! - **Sessions**: server-side records keyed by an opaque cookie token
//! - **Template cache**: every page is validated once at startup

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions::MemoryStore;
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snippetbox::config::{Config, SessionBackendKind};
use snippetbox::db::Database;
use snippetbox::routes;
use snippetbox::session::SessionBackend;
use snippetbox::state::AppState;
use snippetbox::templates::TemplateCache;

/// How often expired session rows are purged from SQLite
const SESSION_CLEANUP_PERIOD: std::time::Duration = std::time::Duration::from_secs(600);

/// Main application entry point
///
/// This function:
/// 1. Sets up logging for debugging and monitoring
/// 2. Loads configuration from environment variables
/// 3. Opens the database and brings its schema up to date
/// 4. Picks the session store (and starts the expired-session cleanup for SQLite)
/// 5. Builds and validates the template cache
/// 6. Starts the HTTP or HTTPS server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing/logging system
    // Default: info level for most crates, debug level for our app
    // Can be overridden with RUST_LOG environment variable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,snippetbox=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables and .env file
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    // Connection pool + migrations for snippets and users
    let db = Database::connect(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;
    tracing::info!("Database ready");

    let sessions: Arc<dyn SessionBackend> = match config.session_backend {
        SessionBackendKind::Memory => {
            tracing::warn!("Using in-memory sessions; everyone is logged out on restart");
            Arc::new(MemoryStore::default())
        }
        SessionBackendKind::Sqlite => {
            // Session rows live next to the application tables
            let store = SqliteStore::new(db.pool().clone());
            store.migrate().await?;

            // Expired rows are never loaded, but they still take space
            let cleanup_store = store.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(SESSION_CLEANUP_PERIOD);
                loop {
                    interval.tick().await;
                    tracing::debug!("Running session cleanup task");
                    if let Err(e) = cleanup_store.delete_expired().await {
                        tracing::error!("Session cleanup failed: {:?}", e);
                    }
                }
            });

            Arc::new(store)
        }
    };

    // A page that can't render is a deployment error, not a runtime one
    let templates = TemplateCache::new().context("building template cache")?;
    tracing::info!("{} templates loaded", templates.len());

    let db = Arc::new(db);
    let state = AppState::new(db.clone(), db, templates);
    let app = routes::router(state, sessions, config.session_config(), &config.static_dir);

    serve(&config, app).await
}

/// Serve `app` over TLS when a certificate is configured, plain HTTP otherwise
///
/// Both variants pass the peer address through so request logs can show it.
async fn serve(config: &Config, app: Router) -> anyhow::Result<()> {
    let bind_addr = config.bind_address();

    match &config.tls {
        Some(tls) => {
            let addr = tokio::net::lookup_host(&bind_addr)
                .await?
                .next()
                .with_context(|| format!("{} did not resolve to an address", bind_addr))?;
            let rustls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                &tls.cert_path,
                &tls.key_path,
            )
            .await
            .context("loading TLS certificate and key")?;

            tracing::info!("Starting HTTPS server on {}", addr);
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await?;
        }
        None => {
            tracing::info!("Starting HTTP server on {}", bind_addr);
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
        }
    }

    Ok(())
}
