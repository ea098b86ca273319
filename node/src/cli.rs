//! # CLI Interface
//!
//! Defines the command-line argument structure for `zeroid-node` using
//! `clap` derive. Every configurable value has a corresponding
//! environment variable for container-friendly deployment — because
//! nobody wants to pass 12 flags to a Docker entrypoint.
//!
//! Key material arrives only through the environment (never flags, so it
//! never shows up in `ps` output or shell history).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ZeroID identity verification service.
///
/// Issues issuer-signed KYC credentials, verifies Groth16 predicate
/// proofs, enforces nullifier uniqueness, and maintains the encrypted
/// compliance escrow.
#[derive(Parser, Debug)]
#[command(
    name = "zeroid-node",
    about = "ZeroID privacy-preserving identity verification service",
    version,
    propagate_version = true
)]
pub struct ZeroIdCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the ZeroID binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the service.
    Run(RunArgs),
    /// Initialize the keys directory with a fresh issuer keypair.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Data directory for the persistent stores. Created on first run.
    #[arg(long, short = 'd', env = "ZEROID_DATA_DIR", default_value = "./zeroid-data")]
    pub data_dir: PathBuf,

    /// Bind address for the HTTP API.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP API port.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Comma-separated API key allow-list for the protected routes.
    #[arg(long, env = "ZEROID_API_KEYS", hide_env_values = true, default_value = "")]
    pub api_keys: String,

    /// Issuer private key, hex. When absent the key is loaded from (or
    /// generated into) `<keys_dir>/issuer.json`.
    #[arg(long, env = "ZEROID_ISSUER_PRIVATE_KEY", hide_env_values = true)]
    pub issuer_private_key: Option<String>,

    /// Directory holding persisted key files.
    #[arg(long, env = "ZEROID_KEYS_DIR", default_value = "./zeroid-data/keys")]
    pub keys_dir: PathBuf,

    /// Master secret for per-store key derivation, hex. Absent, an
    /// ephemeral key is used and every store is unreadable after
    /// restart — fine for development, loudly warned about.
    #[arg(long, env = "ZEROID_STORE_MASTER_KEY", hide_env_values = true)]
    pub store_master_key: Option<String>,

    /// Path to the Groth16 verification key JSON (snarkjs export).
    /// Absent, the proof routes answer 503.
    #[arg(long, env = "ZEROID_VKEY_PATH")]
    pub vkey_path: Option<PathBuf>,

    /// Allowed CORS origin. Absent, any origin is allowed (dev mode).
    #[arg(long, env = "ZEROID_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Log verbosity directive when RUST_LOG is unset.
    #[arg(long, env = "ZEROID_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "ZEROID_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl RunArgs {
    /// The parsed API key allow-list.
    pub fn api_key_list(&self) -> Vec<String> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InitArgs {
    /// Directory to write the issuer key file into.
    #[arg(long, env = "ZEROID_KEYS_DIR", default_value = "./zeroid-data/keys")]
    pub keys_dir: PathBuf,
}
