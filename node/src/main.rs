// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZeroID Service Node
//!
//! Entry point for the `zeroid-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads key material, opens the
//! stores, and serves the HTTP API until SIGINT/SIGTERM.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the service
//! - `init`    — initialize the keys directory with a fresh issuer key
//! - `version` — print build version information
//!
//! Startup is fail-fast: unreadable keys, an unopenable database, or a
//! configured-but-unreadable verification key all exit non-zero before
//! the listener binds. The one deliberate soft spot is an *absent*
//! verification key path — the service boots and the proof routes
//! answer 503, which keeps issuance alive while a ceremony is pending.

mod api;
mod auth;
mod cli;
mod error;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use zeroid_protocol::crypto::keys::{load_issuer_keypair, load_master_key, RegulatorKeys};
use zeroid_protocol::kyc::MockKycProvider;
use zeroid_protocol::service::ZeroId;
use zeroid_protocol::store::db::ZeroIdDb;
use zeroid_protocol::verifier::ProofVerifier;

use auth::{ApiKeys, RateLimiter};
use cli::{Commands, ZeroIdCli};
use logging::LogFormat;
use metrics::ZeroIdMetrics;

/// Interval between escrow retention sweeps.
const PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ZeroIdCli::parse();

    match cli.command {
        Commands::Run(args) => run_service(args).await,
        Commands::Init(args) => init_keys(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the full service: key loading, store open, HTTP listener,
/// background retention sweeper, graceful shutdown.
async fn run_service(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        &format!(
            "zeroid_node={level},zeroid_protocol={level},tower_http=info",
            level = args.log_level
        ),
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        host = %args.host,
        port = args.port,
        data_dir = %args.data_dir.display(),
        "starting zeroid-node"
    );

    // --- Key material (all fatal on failure) ---
    let issuer_keypair = load_issuer_keypair(args.issuer_private_key.as_deref(), &args.keys_dir)
        .context("failed to load issuer keypair")?;

    let (master_key, ephemeral) = load_master_key(args.store_master_key.as_deref())
        .context("failed to load store master key")?;
    if ephemeral {
        tracing::warn!(
            "ZEROID_STORE_MASTER_KEY not set; using an ephemeral key — \
             all persisted stores become unreadable after restart"
        );
    }

    let api_keys = Arc::new(ApiKeys::new(&args.api_key_list()));
    if api_keys.is_empty() {
        tracing::warn!("ZEROID_API_KEYS is empty; every protected route will answer 401");
    }

    // --- Verification key ---
    // A configured path that doesn't load is fatal; an unconfigured one
    // degrades the proof routes to 503.
    let verifier = match &args.vkey_path {
        Some(path) => {
            let verifier = ProofVerifier::from_vkey_file(path)
                .with_context(|| format!("failed to load verification key {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                public_inputs = verifier.num_public_inputs(),
                "verification key loaded"
            );
            Some(Arc::new(verifier))
        }
        None => {
            tracing::warn!("ZEROID_VKEY_PATH not set; proof routes will answer 503");
            None
        }
    };

    // --- Persistent stores ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory {}", db_path.display()))?;
    let db = ZeroIdDb::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Service assembly ---
    let service = Arc::new(
        ZeroId::assemble(
            db,
            &master_key,
            issuer_keypair,
            Arc::new(RegulatorKeys::new()),
            Arc::new(MockKycProvider),
            verifier,
        )
        .context("failed to assemble service")?,
    );

    // --- HTTP ---
    let node_metrics = Arc::new(ZeroIdMetrics::new());
    let app_state = api::AppState {
        service: Arc::clone(&service),
        metrics: Arc::clone(&node_metrics),
        api_keys,
        limiter: Arc::new(RateLimiter::new()),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    let router = api::create_router(app_state, args.cors_origin.as_deref());

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind listener on {addr}"))?;
    tracing::info!("API server listening on {}", addr);

    // --- Retention sweeper ---
    // Escrow entries past their window are crypto-shredded on a timer;
    // nothing else in the system depends on this loop's cadence.
    let sweeper_service = Arc::clone(&service);
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper_service.purge_expired_escrow() {
                Ok(0) => {}
                Ok(n) => tracing::info!(purged = n, "escrow retention sweep"),
                Err(e) => tracing::error!(error = %e, "escrow retention sweep failed"),
            }
        }
    });

    // --- Serve until signalled ---
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();

    // Drain everything before exit; an acknowledged write that misses
    // the disk on a clean shutdown is a bug, not bad luck.
    service.flush().context("final store flush failed")?;
    tracing::info!("zeroid-node stopped");
    Ok(())
}

/// Initializes the keys directory and prints the issuer public key.
fn init_keys(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("zeroid_node=info", LogFormat::Pretty);

    let keypair = load_issuer_keypair(None, &args.keys_dir)
        .context("failed to initialize issuer keypair")?;
    let public = keypair.public_key();

    println!("Keys initialized.");
    println!("  Keys directory : {}", args.keys_dir.display());
    println!("  Issuer pubkey  : ({}, {})", public.ax(), public.ay());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("zeroid-node {}", env!("CARGO_PKG_VERSION"));
    println!(
        "curve      {}",
        zeroid_protocol::config::ZKP_CURVE
    );
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
