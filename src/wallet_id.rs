//! Wallet ID generation.
//!
//! Produces short, human-shareable account identifiers: a fixed prefix plus
//! random characters from an alphabet with the visually ambiguous glyphs
//! (0/O, 1/I/l) removed. Collision handling is bounded retry against the
//! store, then a longer fallback suffix.

use rand::Rng;
use tracing::warn;

use crate::error::WalletError;
use crate::store::WalletStore;
use crate::types::WalletId;

pub const WALLET_ID_PREFIX: &str = "W-";

/// Crockford-ish alphabet without 0, O, 1, I, L.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

const SHORT_SUFFIX_LEN: usize = 8;
const FALLBACK_SUFFIX_LEN: usize = 16;
const MAX_COLLISION_RETRIES: u32 = 5;

#[derive(Debug, Default)]
pub struct WalletIdGenerator;

impl WalletIdGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Produce a random candidate. Pure and side-effect free; nothing is
    /// persisted until the caller creates the wallet.
    pub fn candidate(suffix_len: usize) -> WalletId {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(WALLET_ID_PREFIX.len() + suffix_len);
        id.push_str(WALLET_ID_PREFIX);
        for _ in 0..suffix_len {
            let idx = rng.gen_range(0..ALPHABET.len());
            id.push(ALPHABET[idx] as char);
        }
        WalletId::new(id)
    }

    /// Generate an identifier not currently present in the store.
    ///
    /// After [`MAX_COLLISION_RETRIES`] collisions the short format is
    /// abandoned for a 16-character suffix, which is effectively unique.
    pub async fn generate(&self, store: &dyn WalletStore) -> Result<WalletId, WalletError> {
        for attempt in 0..MAX_COLLISION_RETRIES {
            let candidate = Self::candidate(SHORT_SUFFIX_LEN);
            if !store.wallet_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(attempt, candidate = %candidate, "wallet id collision, retrying");
        }
        Ok(Self::candidate(FALLBACK_SUFFIX_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_format() {
        let id = WalletIdGenerator::candidate(SHORT_SUFFIX_LEN);
        let s = id.as_str();
        assert!(s.starts_with(WALLET_ID_PREFIX));
        assert_eq!(s.len(), WALLET_ID_PREFIX.len() + SHORT_SUFFIX_LEN);
    }

    #[test]
    fn test_no_ambiguous_glyphs() {
        for _ in 0..200 {
            let id = WalletIdGenerator::candidate(SHORT_SUFFIX_LEN);
            let suffix = &id.as_str()[WALLET_ID_PREFIX.len()..];
            for c in suffix.chars() {
                assert!(!"0O1IL".contains(c), "ambiguous glyph in {}", id);
            }
        }
    }

    #[test]
    fn test_candidates_differ() {
        let a = WalletIdGenerator::candidate(SHORT_SUFFIX_LEN);
        let b = WalletIdGenerator::candidate(SHORT_SUFFIX_LEN);
        // 31^8 keyspace; two equal draws would indicate a broken RNG
        assert_ne!(a, b);
    }
}
