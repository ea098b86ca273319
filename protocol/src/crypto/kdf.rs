//! # Store Key Derivation
//!
//! HKDF-SHA-256 derivation of per-store encryption keys from the single
//! master secret. Each persistent store gets its own 32-byte key, so a
//! leaked escrow key reads exactly nothing out of the credential store.
//!
//! The derivation is `HKDF(master, salt = default, info =
//! "zeroid-store-" || name, L = 32)`. No salt is supplied — the master
//! key is already uniform, so HKDF's extract step with its default
//! zero-salt is sufficient.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::config::{AES_KEY_LENGTH, STORE_KEY_INFO_PREFIX};

/// Derive the encryption key for a named store from the master secret.
///
/// Deterministic: the same `(master, name)` pair always yields the same
/// key, which is what lets the service reopen its stores after a restart.
pub fn derive_store_key(master: &[u8], name: &str) -> [u8; AES_KEY_LENGTH] {
    let hk = Hkdf::<Sha256>::new(None, master);
    let info = format!("{STORE_KEY_INFO_PREFIX}{name}");

    let mut okm = [0u8; AES_KEY_LENGTH];
    hk.expand(info.as_bytes(), &mut okm)
        .expect("32 bytes is far below the HKDF-SHA-256 output limit");
    okm
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_name() {
        let master = [7u8; 32];
        assert_eq!(
            derive_store_key(&master, "escrow"),
            derive_store_key(&master, "escrow")
        );
    }

    #[test]
    fn distinct_per_store_name() {
        let master = [7u8; 32];
        let escrow = derive_store_key(&master, "escrow");
        let credentials = derive_store_key(&master, "credentials");
        let cache = derive_store_key(&master, "proof_cache");

        assert_ne!(escrow, credentials);
        assert_ne!(escrow, cache);
        assert_ne!(credentials, cache);
    }

    #[test]
    fn distinct_per_master() {
        let a = derive_store_key(&[1u8; 32], "escrow");
        let b = derive_store_key(&[2u8; 32], "escrow");
        assert_ne!(a, b);
    }

    #[test]
    fn derived_key_drives_encryption() {
        // The derived key must be directly usable as an AES-256 key.
        let key = derive_store_key(&[9u8; 32], "audit");
        let blob = crate::crypto::encryption::encrypt(&key, b"audit entry").unwrap();
        assert_eq!(
            crate::crypto::encryption::decrypt(&key, &blob).unwrap(),
            b"audit entry"
        );
    }
}
