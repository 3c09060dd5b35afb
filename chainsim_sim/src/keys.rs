//! Deterministic account keys for simulation.

use chainsim_env::SimAccount;
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Bech-style prefix of every simulated account address.
pub const ADDRESS_PREFIX: &str = "chainsim1";

/// Provides deterministic Ed25519 account keys derived from a seed.
///
/// Keys are:
/// - Deterministic: same seed, same keys
/// - Unique: every account index gets its own key
/// - Isolated: asking for more accounts never changes earlier ones
pub struct DeterministicKeyProvider {
    master_seed: u64,

    /// Cache of generated keys by account index
    key_cache: BTreeMap<u64, SigningKey>,
}

impl DeterministicKeyProvider {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            key_cache: BTreeMap::new(),
        }
    }

    /// Generates or retrieves the signing key of an account.
    ///
    /// The key is derived from `master_seed * golden + index * prime`.
    pub fn account_key(&mut self, index: u64) -> SigningKey {
        if let Some(key) = self.key_cache.get(&index) {
            return key.clone();
        }

        let account_seed = self
            .master_seed
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(index.wrapping_mul(0x517cc1b727220a95));

        let mut rng = ChaCha8Rng::seed_from_u64(account_seed);
        let key = SigningKey::generate(&mut rng);

        self.key_cache.insert(index, key.clone());
        key
    }

    /// The first `n` accounts of this provider.
    pub fn accounts(&mut self, n: usize) -> Vec<SimAccount> {
        (0..n as u64)
            .map(|i| sim_account(&self.account_key(i).verifying_key()))
            .collect()
    }
}

/// Account address: prefix plus the first 20 bytes of the key's blake3 hash.
pub fn address_of(public_key: &[u8; 32]) -> String {
    let digest = blake3::hash(public_key);
    format!("{}{}", ADDRESS_PREFIX, hex::encode(&digest.as_bytes()[..20]))
}

pub fn sim_account(key: &VerifyingKey) -> SimAccount {
    let public_key = key.to_bytes();
    SimAccount {
        address: address_of(&public_key),
        public_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_account_keys() {
        let mut provider1 = DeterministicKeyProvider::new(42);
        let mut provider2 = DeterministicKeyProvider::new(42);

        assert_eq!(provider1.account_key(5).to_bytes(), provider2.account_key(5).to_bytes());
    }

    #[test]
    fn test_different_accounts_different_addresses() {
        let mut provider = DeterministicKeyProvider::new(42);
        let accounts = provider.accounts(3);

        assert_ne!(accounts[0].address, accounts[1].address);
        assert_ne!(accounts[1].address, accounts[2].address);
        assert!(accounts.iter().all(|a| a.address.starts_with(ADDRESS_PREFIX)));
        assert_eq!(accounts[0].address.len(), ADDRESS_PREFIX.len() + 40);
    }

    #[test]
    fn test_key_isolation() {
        let mut provider1 = DeterministicKeyProvider::new(42);
        let mut provider2 = DeterministicKeyProvider::new(42);

        let few = provider1.accounts(3);
        let many = provider2.accounts(10);

        assert_eq!(&many[..3], &few[..]);
    }

    #[test]
    fn test_seed_changes_keys() {
        let a = DeterministicKeyProvider::new(1).accounts(1);
        let b = DeterministicKeyProvider::new(2).accounts(1);
        assert_ne!(a, b);
    }
}
