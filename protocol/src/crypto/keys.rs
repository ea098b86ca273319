//! # Key Management
//!
//! Loading and persistence for the three key families the service holds:
//!
//! - **Issuer keypair** — the BabyJubJub EdDSA key that signs every
//!   credential. Loaded from `ZEROID_ISSUER_PRIVATE_KEY` (hex) if set,
//!   else from `issuer.json` in the keys directory, else freshly
//!   generated and persisted there with 0600 permissions.
//! - **Regulator keys** — per-regulator AES-256 keys that wrap escrowed
//!   PII. Lazily read from `ZEROID_REGULATOR_KEY_<ID>` and cached in a
//!   concurrent map; the service never holds a regulator key it hasn't
//!   been asked for.
//! - **Store master key** — the HKDF seed for per-store keys, from
//!   `ZEROID_STORE_MASTER_KEY`. Absent, the service runs on an ephemeral
//!   random key and warns loudly: every store becomes unreadable after
//!   restart.
//!
//! Key bytes are never logged. If you add logging to this module, you
//! will be asked to leave.

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::eddsa::EddsaKeypair;
use crate::config::AES_KEY_LENGTH;

/// Errors that can occur while loading or persisting keys.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid key material for {context}: bad hex or wrong length")]
    InvalidKeyMaterial { context: String },

    #[error("unknown regulator key id: {0}")]
    UnknownRegulator(String),

    #[error("key file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// On-disk form of the issuer key file (`issuer.json`).
#[derive(Serialize, Deserialize)]
struct IssuerKeyFile {
    /// Hex-encoded 32-byte seed.
    private_key: String,
}

/// Load the issuer keypair, in precedence order:
///
/// 1. `env_hex` (the `ZEROID_ISSUER_PRIVATE_KEY` value, if set);
/// 2. `<keys_dir>/issuer.json`;
/// 3. freshly generated, persisted to `<keys_dir>/issuer.json`.
///
/// A present-but-invalid env var or key file is a hard error, not a
/// silent fall-through — regenerating the issuer key orphans every
/// credential signed under the old one.
pub fn load_issuer_keypair(
    env_hex: Option<&str>,
    keys_dir: &Path,
) -> Result<EddsaKeypair, KeyError> {
    if let Some(hex_str) = env_hex {
        return EddsaKeypair::from_hex(hex_str.trim()).map_err(|_| KeyError::InvalidKeyMaterial {
            context: "issuer private key (env)".into(),
        });
    }

    let key_path = keys_dir.join("issuer.json");
    if key_path.exists() {
        let raw = std::fs::read_to_string(&key_path)?;
        let file: IssuerKeyFile = serde_json::from_str(&raw)?;
        return EddsaKeypair::from_hex(&file.private_key).map_err(|_| {
            KeyError::InvalidKeyMaterial {
                context: format!("issuer key file {}", key_path.display()),
            }
        });
    }

    let keypair = EddsaKeypair::generate();
    std::fs::create_dir_all(keys_dir)?;
    let file = IssuerKeyFile {
        private_key: hex::encode(keypair.seed_bytes()),
    };
    std::fs::write(&key_path, serde_json::to_string_pretty(&file)?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %key_path.display(), "generated new issuer keypair");
    Ok(keypair)
}

/// Lazily loaded, concurrently cached regulator keys.
///
/// Lookup order: the in-process cache, then the environment variable
/// `ZEROID_REGULATOR_KEY_<ID>` (id uppercased). Once resolved, a key
/// stays cached for the life of the process — regulator keys do not
/// rotate mid-flight.
pub struct RegulatorKeys {
    cache: DashMap<String, [u8; AES_KEY_LENGTH]>,
}

impl RegulatorKeys {
    /// Construct with an empty cache; keys resolve from the environment
    /// on first use.
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Insert a key directly. Used by tests and by deployments that
    /// inject keys through a secrets mount instead of the environment.
    pub fn insert(&self, id: &str, key: [u8; AES_KEY_LENGTH]) {
        self.cache.insert(id.to_string(), key);
    }

    /// Resolve the key for a regulator id.
    pub fn get(&self, id: &str) -> Result<[u8; AES_KEY_LENGTH], KeyError> {
        if let Some(key) = self.cache.get(id) {
            return Ok(*key);
        }

        let var = format!(
            "ZEROID_REGULATOR_KEY_{}",
            id.to_uppercase().replace('-', "_")
        );
        let hex_str = std::env::var(&var).map_err(|_| KeyError::UnknownRegulator(id.to_string()))?;
        let key = decode_key_hex(&hex_str, &format!("regulator key {id}"))?;

        self.cache.insert(id.to_string(), key);
        Ok(key)
    }
}

impl Default for RegulatorKeys {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the store master key.
///
/// Returns the key and whether it is ephemeral. An ephemeral key means
/// every encrypted store written this run is garbage after restart; the
/// caller is expected to warn.
pub fn load_master_key(env_hex: Option<&str>) -> Result<([u8; AES_KEY_LENGTH], bool), KeyError> {
    match env_hex {
        Some(hex_str) => {
            let key = decode_key_hex(hex_str.trim(), "store master key")?;
            Ok((key, false))
        }
        None => {
            let mut key = [0u8; AES_KEY_LENGTH];
            rand::rngs::OsRng.fill_bytes(&mut key);
            Ok((key, true))
        }
    }
}

/// Decode a hex string into exactly 32 key bytes.
fn decode_key_hex(hex_str: &str, context: &str) -> Result<[u8; AES_KEY_LENGTH], KeyError> {
    let bytes = hex::decode(hex_str).map_err(|_| KeyError::InvalidKeyMaterial {
        context: context.to_string(),
    })?;
    bytes.try_into().map_err(|_| KeyError::InvalidKeyMaterial {
        context: context.to_string(),
    })
}
