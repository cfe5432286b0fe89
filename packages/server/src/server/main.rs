// Main entry point for the store provisioning control plane

use std::sync::Arc;

use anyhow::{Context, Result};
use server_core::kernel::jobs::ProvisioningWorker;
use server_core::kernel::ServerKernel;
use server_core::server::build_app;
use server_core::Config;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Store Provisioning Control Plane");

    // Load configuration
    let config = Arc::new(Config::from_env().context("Failed to load configuration")?);
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Build kernel with the process-exec orchestrator adapters
    let kernel = Arc::new(ServerKernel::with_process_adapters(pool.clone(), &config));

    // Spawn the provisioning worker as a background task
    let worker = ProvisioningWorker::new(Arc::clone(&kernel), Arc::clone(&config));
    let worker_shutdown = worker.shutdown_token();
    let worker_task = tokio::spawn(async move {
        if let Err(e) = worker.run().await {
            tracing::error!(error = %e, "provisioning worker exited with error");
        }
    });

    // Build application
    let app = build_app(Arc::clone(&kernel), &config);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/healthz", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    let shutdown = worker_shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        shutdown.cancel();
    })
    .await
    .context("Server error")?;

    // Let the worker drain its in-flight jobs before exiting.
    worker_shutdown.cancel();
    let _ = worker_task.await;

    Ok(())
}
