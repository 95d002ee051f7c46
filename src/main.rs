use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    classifier::ObjectClassifier,
    name_matcher::NameMatcher,
    object_store::ObjectStore,
    reconciler::{Reconciler, ReconcilerSettings},
    relocation::RelocationService,
    scheduler::spawn_reconciliation,
    storage_service::{SqliteObjectStore, run_migrations},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting card-sorter with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Extract the local file path SQLx will use
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if !db_path.starts_with(":memory:") {
        let db_path_obj = Path::new(db_path);
        // Create parent directory if needed
        if let Some(parent) = db_path_obj.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }

        // SQLx will not create the database file on its own
        match fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(db_path)
        {
            Ok(_) => tracing::debug!("Database file {} is ready", db_path),
            Err(e) => tracing::warn!("Failed to open database file {}: {}", db_path, e),
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?,
    );

    // --- Schema is idempotent; always bring it up to date ---
    run_migrations(&db).await?;
    if mode.migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let catalog = Arc::new(cfg.load_catalog()?);
    let classifier = Arc::new(ObjectClassifier::new(
        NameMatcher::new(catalog.clone(), cfg.fuzzy),
        cfg.processed_root.clone(),
    ));
    let sqlite_store = SqliteObjectStore::open(
        db.clone(),
        cfg.storage_dir.clone(),
        &cfg.credentials.account_name,
        &cfg.container,
    )
    .await?;
    tracing::info!(
        account = %sqlite_store.container().account,
        container = %sqlite_store.container().name,
        processed_root = %classifier.processed_root(),
        catalog_entries = catalog.len(),
        extensions = ?cfg.image_extensions.as_slice(),
        "object store ready"
    );
    let store: Arc<dyn ObjectStore> = Arc::new(sqlite_store);

    let relocation = RelocationService::new(store, classifier);
    let reconciler = Arc::new(Reconciler::new(
        relocation.clone(),
        ReconcilerSettings::new(&cfg.input_prefix, cfg.image_extensions.clone())
            .with_concurrency(cfg.scan_concurrency)
            .with_page_size(cfg.scan_page_size),
    ));

    // --- One-shot scan mode ---
    if mode.scan_once {
        let report = reconciler.run().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !report.is_clean() {
            anyhow::bail!(
                "reconciliation scan finished with {} failed item(s){}",
                report.failed,
                if report.enumeration_error.is_some() {
                    " and an enumeration error"
                } else {
                    ""
                }
            );
        }
        return Ok(());
    }

    // --- Background reconciliation ---
    let shutdown = CancellationToken::new();
    let scheduler = match cfg.scan_interval {
        Some(period) => Some(spawn_reconciliation(
            reconciler.clone(),
            period,
            shutdown.clone(),
        )),
        None => {
            tracing::info!("Periodic reconciliation disabled");
            None
        }
    };

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_object_bytes)
        .with_state(state::AppState::new(relocation, reconciler));

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        handle.await?;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C, cancelling `shutdown` for the background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                tracing::warn!("Could not listen for Ctrl-C: {}", err);
                // Keep serving until cancelled some other way.
                shutdown.cancelled().await;
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("Shutdown requested");
    shutdown.cancel();
}
