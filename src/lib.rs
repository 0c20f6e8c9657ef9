//! Signing and verification engine for multi-party PDF e-signatures.
//!
//! Owners upload PDFs, place fields, invite signers by email. Each signer signs
//! through an unguessable token; registered signers additionally bind themselves
//! to the exact document bytes with an RSA signature over the document hash.
//! Anyone can later verify that a completed document is unmodified.

mod canvas;
mod data_url;
mod error;
mod image_xobject;
mod lopdf_utils;
mod page_stamp;
mod pdf_object;
mod rectangle;

pub mod api;
pub mod composer;
pub mod config;
pub mod crypto;
pub mod documents;
pub mod fields;
pub mod hasher;
pub mod invite;
pub mod key_vault;
pub mod ledger;
pub mod model;
pub mod qr;
pub mod storage;
pub mod store;
pub mod templates;
pub mod users;
pub mod verifier;
pub mod workflow;

pub use error::{Error, Result};
pub use lopdf;

use api::Api;
use composer::PdfComposer;
use config::Config;
use documents::Documents;
use fields::FieldRegistry;
use hasher::DocumentHasher;
use invite::InviteOrchestrator;
use key_vault::KeyVault;
use ledger::SignatureLedger;
use std::sync::Arc;
use storage::Storage;
use store::Store;
use templates::SignatureTemplates;
use users::UserDirectory;
use verifier::Verifier;
use workflow::SigningWorkflow;

/// Owns the shared state and hands out the components operating on it.
/// Cheap component handles borrow the engine for the duration of a request.
pub struct Engine {
    config: Config,
    store: Store,
    storage: Storage,
    users: Arc<dyn UserDirectory>,
}

impl Engine {
    pub fn new(config: Config, storage: Storage, users: Arc<dyn UserDirectory>) -> Result<Self> {
        config.validate()?;
        log::info!("Signing engine started with {:?} storage", storage);
        Ok(Self {
            config,
            store: Store::new(),
            storage,
            users,
        })
    }

    /// Build the blob backend from `storage.*` settings.
    pub fn from_config(config: Config, users: Arc<dyn UserDirectory>) -> Result<Self> {
        let storage = Storage::from_config(&config)?;
        Self::new(config, storage, users)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub fn key_vault(&self) -> KeyVault<'_> {
        KeyVault::new(&self.store, &self.config.crypto.master_key)
    }

    pub fn hasher(&self) -> DocumentHasher<'_> {
        DocumentHasher::new(&self.storage)
    }

    pub fn ledger(&self) -> SignatureLedger<'_> {
        SignatureLedger::new(
            &self.store,
            self.hasher(),
            self.key_vault(),
            self.users.as_ref(),
        )
    }

    pub fn documents(&self) -> Documents<'_> {
        Documents::new(self)
    }

    pub fn fields(&self) -> FieldRegistry<'_> {
        FieldRegistry::new(self)
    }

    pub fn invites(&self) -> InviteOrchestrator<'_> {
        InviteOrchestrator::new(self)
    }

    pub fn workflow(&self) -> SigningWorkflow<'_> {
        SigningWorkflow::new(self)
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(self)
    }

    pub fn composer(&self) -> PdfComposer<'_> {
        PdfComposer::new(self)
    }

    pub fn templates(&self) -> SignatureTemplates<'_> {
        SignatureTemplates::new(self)
    }

    /// Endpoint level facade with HTTP status mapping.
    pub fn api(&self) -> Api<'_> {
        Api::new(self)
    }
}
