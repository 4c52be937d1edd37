#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::engine::SimulatedEngine;
use server::service::handler::{AppState, router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use stickypool::WorkerPool;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let res = run(config).await;
    providers.shutdown();
    res
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let pool = Arc::new(load_pool(&config).await?);

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    let app = router(AppState::new(Arc::clone(&pool), &config.task_name));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Listener closed, draining worker pool");
    if let Ok(res) = tokio::time::timeout(config.shutdown_timeout, pool.drain()).await {
        res?;
        tracing::info!("Service shut down successfully");
    } else {
        tracing::warn!(
            "Worker pool did not drain within {:?}, abandoning running jobs",
            config.shutdown_timeout
        );
    }

    Ok(())
}

/// Loads every engine off the async runtime, since loading blocks.
async fn load_pool(config: &ServerConfig) -> anyhow::Result<WorkerPool> {
    let pool_config = config.pool;
    let device = config.device.clone();
    let load = config.load_duration;
    let work = config.work_duration;

    let pool = tokio::task::spawn_blocking(move || {
        WorkerPool::start(pool_config, |slot| {
            SimulatedEngine::load(SimulatedEngine::device_for(&device, slot), load, work)
        })
    })
    .await??;

    Ok(pool)
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting job server on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting job server on {} with {} workers",
            config.server_addr,
            config.pool.size
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
}
