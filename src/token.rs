//! Access tokens and order numbers.
//!
//! The plaintext access token is handed to the customer exactly once; only
//! its SHA-256 hex digest is stored.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

const ACCESS_TOKEN_BYTES: usize = 32;
const ORDER_NUMBER_PREFIX: &str = "TKH";
const ORDER_NUMBER_LEN: usize = 6;

/// A freshly minted access token together with the digest to persist.
pub struct AccessToken {
    pub plaintext: String,
    pub hash: String,
}

impl AccessToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ACCESS_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let plaintext: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        let hash = hash_token(&plaintext);
        Self { plaintext, hash }
    }
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Constant-time digest comparison.
pub fn hashes_match(stored: &str, supplied: &str) -> bool {
    constant_time_eq::constant_time_eq(stored.as_bytes(), supplied.as_bytes())
}

/// Short human-facing order number such as `TKH7Q2XKA`.
pub fn generate_order_number() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(|b| (b as char).to_ascii_uppercase())
        .take(ORDER_NUMBER_LEN)
        .collect();
    format!("{}{}", ORDER_NUMBER_PREFIX, suffix)
}
