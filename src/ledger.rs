//! The signature ledger: one immutable row per (document, signer).

use crate::crypto;
use crate::hasher::DocumentHasher;
use crate::key_vault::KeyVault;
use crate::model::{DocumentSignature, LedgerEntry, SIGNATURE_ALGORITHM};
use crate::store::{Store, Tables};
use crate::users::UserDirectory;
use crate::Result;
use chrono::{DateTime, Utc};

#[derive(Clone, Copy)]
pub struct SignatureLedger<'a> {
    store: &'a Store,
    hasher: DocumentHasher<'a>,
    vault: KeyVault<'a>,
    users: &'a dyn UserDirectory,
}

impl<'a> SignatureLedger<'a> {
    pub fn new(
        store: &'a Store,
        hasher: DocumentHasher<'a>,
        vault: KeyVault<'a>,
        users: &'a dyn UserDirectory,
    ) -> Self {
        Self {
            store,
            hasher,
            vault,
            users,
        }
    }

    /// Record the signing of `signer_id` on `document_id`.
    ///
    /// Registered signers get a SHA256withRSA signature over the current document
    /// hash, external signers a clickwrap row. Calling it again returns the
    /// existing row unchanged.
    pub fn record(
        &self,
        document_id: &str,
        signer_id: &str,
        signer_email: &str,
    ) -> Result<LedgerEntry> {
        if let Some(existing) = self.get(document_id, signer_id) {
            log::warn!(
                "Ledger row already exists for document {} and signer {}",
                document_id,
                signer_id
            );
            return Ok(existing);
        }
        let blob_key = self
            .store
            .read(|tables| tables.document(document_id).map(|doc| doc.blob_key.clone()))?;
        let entry = self.prepare(document_id, &blob_key, signer_id, signer_email, Utc::now())?;
        self.store
            .transaction(|tables| Ok(Self::commit(tables, entry)))
    }

    /// Build the row without persisting it. Slow work (key generation, hashing,
    /// signing) happens here so the committing transaction stays short.
    pub fn prepare(
        &self,
        document_id: &str,
        blob_key: &str,
        signer_id: &str,
        signer_email: &str,
        signed_at: DateTime<Utc>,
    ) -> Result<LedgerEntry> {
        let user = match self.users.find_by_email(signer_email) {
            Some(user) => user,
            None => {
                log::info!(
                    "Signer {} is not a registered user, recording clickwrap only",
                    signer_email
                );
                return Ok(LedgerEntry::ClickwrapOnly {
                    document_id: document_id.to_owned(),
                    signer_id: signer_id.to_owned(),
                    signed_at,
                });
            }
        };

        let key_pair = self.vault.get_or_create(&user.id)?;
        let document_hash = self.hasher.hash(blob_key)?;
        let signature = crypto::sign(&document_hash, &key_pair.private_key)?;
        log::debug!(
            "Created digital signature for hash: {}...",
            &document_hash[..20.min(document_hash.len())]
        );

        Ok(LedgerEntry::Cryptographic(DocumentSignature {
            document_id: document_id.to_owned(),
            signer_id: signer_id.to_owned(),
            user_id: user.id,
            document_hash,
            signature: base64::encode(signature),
            algorithm: SIGNATURE_ALGORITHM.to_owned(),
            signed_at,
            is_valid: true,
        }))
    }

    /// Persist a prepared row inside an open transaction. First writer wins.
    pub fn commit(tables: &mut Tables, entry: LedgerEntry) -> LedgerEntry {
        let stored = tables.insert_ledger_if_absent(entry.clone());
        if stored == entry {
            if let LedgerEntry::Cryptographic(signature) = &stored {
                log::info!(
                    "Created digital signature for document {} by user {} (signer {})",
                    signature.document_id,
                    signature.user_id,
                    signature.signer_id
                );
            }
        }
        stored
    }

    pub fn get(&self, document_id: &str, signer_id: &str) -> Option<LedgerEntry> {
        self.store
            .read(|tables| tables.ledger_entry(document_id, signer_id).cloned())
    }

    pub fn for_document(&self, document_id: &str) -> Vec<LedgerEntry> {
        self.store
            .read(|tables| tables.ledger_of_document(document_id))
    }
}
