//! Per user RSA key pairs, generated lazily on first signature.

use crate::config::MasterKey;
use crate::crypto;
use crate::model::{UserKeyPair, KEY_ALGORITHM};
use crate::store::Store;
use crate::Result;
use chrono::Utc;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// A stored key pair with its private key unwrapped for signing.
/// Lives only for the duration of one operation.
pub struct UnlockedKeyPair {
    pub record: UserKeyPair,
    pub private_key: RsaPrivateKey,
}

impl std::fmt::Debug for UnlockedKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKeyPair")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeyVault<'a> {
    store: &'a Store,
    master_key: &'a MasterKey,
}

impl<'a> KeyVault<'a> {
    pub fn new(store: &'a Store, master_key: &'a MasterKey) -> Self {
        Self { store, master_key }
    }

    /// Return the user's key pair, generating and persisting one on first use.
    ///
    /// Generation happens outside the store lock. When two first uses race, the
    /// unique index on the user id keeps the first committed pair and the loser
    /// adopts it.
    pub fn get_or_create(&self, user_id: &str) -> Result<UnlockedKeyPair> {
        if let Some(existing) = self.get(user_id) {
            return self.unlock(existing);
        }

        let (public_key, private_key) = crypto::generate_keypair()?;
        let candidate = UserKeyPair {
            user_id: user_id.to_owned(),
            public_key: crypto::encode_public_key(&public_key)?,
            private_key_wrapped: crypto::wrap_private(&private_key, self.master_key)?,
            algorithm: KEY_ALGORITHM.to_owned(),
            created_at: Utc::now(),
        };
        let candidate_public = candidate.public_key.clone();
        let stored = self
            .store
            .transaction(|tables| Ok(tables.insert_key_pair_if_absent(candidate)))?;

        if stored.public_key == candidate_public {
            log::info!("Generated and saved {} key pair for user: {}", KEY_ALGORITHM, user_id);
            Ok(UnlockedKeyPair {
                record: stored,
                private_key,
            })
        } else {
            log::debug!("Concurrent key generation for user {}, using stored pair", user_id);
            self.unlock(stored)
        }
    }

    pub fn has_key(&self, user_id: &str) -> bool {
        self.store.read(|tables| tables.key_pair(user_id).is_some())
    }

    /// Stored pair without the private key being touched.
    pub fn get(&self, user_id: &str) -> Option<UserKeyPair> {
        self.store.read(|tables| tables.key_pair(user_id).cloned())
    }

    /// Decoded public key, `None` if the user never signed.
    pub fn public_key(&self, user_id: &str) -> Result<Option<RsaPublicKey>> {
        self.get(user_id)
            .map(|key_pair| crypto::decode_public_key(&key_pair.public_key))
            .transpose()
    }

    fn unlock(&self, record: UserKeyPair) -> Result<UnlockedKeyPair> {
        let private_key = crypto::unwrap_private(&record.private_key_wrapped, self.master_key)
            .map_err(|err| {
                log::error!("Can not unwrap private key of user {}", record.user_id);
                err
            })?;
        Ok(UnlockedKeyPair {
            record,
            private_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_get_or_create_is_stable() {
        let store = Store::new();
        let master = MasterKey::new([3u8; 32]);
        let vault = KeyVault::new(&store, &master);
        assert!(!vault.has_key("u1"));
        assert!(vault.get("u1").is_none());

        let first = vault.get_or_create("u1").unwrap();
        let second = vault.get_or_create("u1").unwrap();
        assert!(vault.has_key("u1"));
        assert_eq!(first.record.public_key, second.record.public_key);
        assert_eq!(first.private_key, second.private_key);
        assert_eq!(first.record.algorithm, "RSA-2048");
        assert!(vault.public_key("u1").unwrap().is_some());
        assert!(vault.public_key("u2").unwrap().is_none());
    }

    #[test]
    fn test_wrong_master_key_can_not_unlock() {
        let store = Store::new();
        let master = MasterKey::new([3u8; 32]);
        KeyVault::new(&store, &master).get_or_create("u1").unwrap();

        let other = MasterKey::new([4u8; 32]);
        let result = KeyVault::new(&store, &other).get_or_create("u1");
        assert!(matches!(result, Err(Error::Crypto(_))));
    }
}
