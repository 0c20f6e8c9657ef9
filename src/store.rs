//! In-process relational state with all-or-nothing transactions.
//!
//! A transaction works on a copy of the tables and only replaces the committed
//! state when the closure returns `Ok`. Transactions are serialized by one lock,
//! so two writers racing on the same document always observe each other.
//!
//! Tables and their rows sit behind `Arc`, so the working copy shares all
//! state with the committed one. Only the tables and rows a transaction
//! writes to are cloned.

use crate::model::{
    Document, Field, LedgerEntry, SignatureTemplate, Signer, SignerStatus, UserKeyPair,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Table<T> = Arc<HashMap<String, Arc<T>>>;

/// Mutable access to one row, cloning the table and the row only if shared.
fn row_mut<'t, T: Clone>(table: &'t mut Table<T>, id: &str) -> Option<&'t mut T> {
    Arc::make_mut(table).get_mut(id).map(Arc::make_mut)
}

fn into_row<T: Clone>(row: Arc<T>) -> T {
    Arc::try_unwrap(row).unwrap_or_else(|shared| T::clone(&shared))
}

#[derive(Debug, Clone, Default)]
pub struct Tables {
    documents: Table<Document>,
    fields: Table<Field>,
    signers: Table<Signer>,
    /// Unique index: token -> signer id.
    signer_tokens: Arc<HashMap<String, String>>,
    /// Unique index: user id -> key pair.
    key_pairs: Table<UserKeyPair>,
    /// Unique index: (document id, signer id) -> row.
    ledger: Arc<BTreeMap<(String, String), Arc<LedgerEntry>>>,
    templates: Table<SignatureTemplate>,
}

impl Tables {
    // Documents

    pub fn document(&self, id: &str) -> Result<&Document> {
        self.documents
            .get(id)
            .map(|document| &**document)
            .ok_or_else(|| Error::not_found("Document not found"))
    }

    pub fn document_mut(&mut self, id: &str) -> Result<&mut Document> {
        row_mut(&mut self.documents, id).ok_or_else(|| Error::not_found("Document not found"))
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values().map(|document| &**document)
    }

    pub fn insert_document(&mut self, document: Document) {
        Arc::make_mut(&mut self.documents).insert(document.id.clone(), Arc::new(document));
    }

    /// Remove a document with its fields and signers. Ledger rows are kept.
    pub fn remove_document(&mut self, id: &str) -> Result<Document> {
        let document = Arc::make_mut(&mut self.documents)
            .remove(id)
            .ok_or_else(|| Error::not_found("Document not found"))?;
        Arc::make_mut(&mut self.fields).retain(|_, field| field.document_id != id);
        let signer_ids: Vec<String> = self
            .signers
            .values()
            .filter(|signer| signer.document_id == id)
            .map(|signer| signer.id.clone())
            .collect();
        for signer_id in signer_ids {
            if let Some(signer) = Arc::make_mut(&mut self.signers).remove(&signer_id) {
                Arc::make_mut(&mut self.signer_tokens).remove(&signer.token);
            }
        }
        Ok(into_row(document))
    }

    // Fields

    pub fn field(&self, id: &str) -> Result<&Field> {
        self.fields
            .get(id)
            .map(|field| &**field)
            .ok_or_else(|| Error::not_found(format!("Field not found: {}", id)))
    }

    pub fn field_mut(&mut self, id: &str) -> Result<&mut Field> {
        row_mut(&mut self.fields, id)
            .ok_or_else(|| Error::not_found(format!("Field not found: {}", id)))
    }

    pub fn insert_field(&mut self, field: Field) {
        Arc::make_mut(&mut self.fields).insert(field.id.clone(), Arc::new(field));
    }

    pub fn remove_field(&mut self, id: &str) -> Result<Field> {
        Arc::make_mut(&mut self.fields)
            .remove(id)
            .map(into_row)
            .ok_or_else(|| Error::not_found(format!("Field not found: {}", id)))
    }

    /// Fields of a document, ordered by page then position.
    pub fn fields_of_document(&self, document_id: &str) -> Vec<Field> {
        let mut fields: Vec<Field> = self
            .fields
            .values()
            .filter(|field| field.document_id == document_id)
            .map(|field| Field::clone(field))
            .collect();
        fields.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then(a.position_y.total_cmp(&b.position_y))
                .then(a.position_x.total_cmp(&b.position_x))
                .then(a.id.cmp(&b.id))
        });
        fields
    }

    pub fn fields_of_signer(&self, signer_id: &str) -> Vec<Field> {
        let mut fields: Vec<Field> = self
            .fields
            .values()
            .filter(|field| field.signer_id.as_deref() == Some(signer_id))
            .map(|field| Field::clone(field))
            .collect();
        fields.sort_by(|a, b| {
            a.page_number
                .cmp(&b.page_number)
                .then(a.position_y.total_cmp(&b.position_y))
                .then(a.id.cmp(&b.id))
        });
        fields
    }

    /// Assign many fields at once. Every field must belong to `document_id`.
    pub fn assign_fields(
        &mut self,
        document_id: &str,
        assignments: &[(String, String)],
    ) -> Result<()> {
        for (field_id, _) in assignments {
            let field = self.field(field_id)?;
            if field.document_id != document_id {
                return Err(Error::validation(format!(
                    "Field `{}` does not belong to this document",
                    field_id
                )));
            }
        }
        for (field_id, signer_id) in assignments {
            self.field_mut(field_id)?.signer_id = Some(signer_id.clone());
        }
        Ok(())
    }

    // Signers

    pub fn signer(&self, id: &str) -> Result<&Signer> {
        self.signers
            .get(id)
            .map(|signer| &**signer)
            .ok_or_else(|| Error::not_found("Signer not found"))
    }

    pub fn signer_mut(&mut self, id: &str) -> Result<&mut Signer> {
        row_mut(&mut self.signers, id).ok_or_else(|| Error::not_found("Signer not found"))
    }

    pub fn signer_by_token(&self, token: &str) -> Result<&Signer> {
        self.signer_tokens
            .get(token)
            .and_then(|id| self.signers.get(id))
            .map(|signer| &**signer)
            .ok_or_else(|| Error::not_found("Invalid signing token"))
    }

    /// Insert a signer, enforcing token uniqueness.
    pub fn insert_signer(&mut self, signer: Signer) -> Result<()> {
        if self.signer_tokens.contains_key(&signer.token) {
            return Err(Error::Unexpected("Signer token collision".to_owned()));
        }
        Arc::make_mut(&mut self.signer_tokens).insert(signer.token.clone(), signer.id.clone());
        Arc::make_mut(&mut self.signers).insert(signer.id.clone(), Arc::new(signer));
        Ok(())
    }

    /// Signers of a document ordered by `order`, then creation.
    pub fn signers_of_document(&self, document_id: &str) -> Vec<Signer> {
        let mut signers: Vec<Signer> = self
            .signers
            .values()
            .filter(|signer| signer.document_id == document_id)
            .map(|signer| Signer::clone(signer))
            .collect();
        signers.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        signers
    }

    pub fn count_signers_with_status(&self, document_id: &str, status: SignerStatus) -> usize {
        self.signers
            .values()
            .filter(|signer| signer.document_id == document_id && signer.status == status)
            .count()
    }

    /// Ids of documents where `email` was invited.
    pub fn documents_with_signer_email(&self, email: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .signers
            .values()
            .filter(|signer| signer.has_email(email))
            .map(|signer| signer.document_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    // Key pairs

    pub fn key_pair(&self, user_id: &str) -> Option<&UserKeyPair> {
        self.key_pairs.get(user_id).map(|key_pair| &**key_pair)
    }

    /// Insert unless the user already has a key pair. Returns the stored pair.
    pub fn insert_key_pair_if_absent(&mut self, key_pair: UserKeyPair) -> UserKeyPair {
        let stored = Arc::make_mut(&mut self.key_pairs)
            .entry(key_pair.user_id.clone())
            .or_insert_with(|| Arc::new(key_pair));
        UserKeyPair::clone(stored)
    }

    // Ledger

    pub fn ledger_entry(&self, document_id: &str, signer_id: &str) -> Option<&LedgerEntry> {
        self.ledger
            .get(&(document_id.to_owned(), signer_id.to_owned()))
            .map(|entry| &**entry)
    }

    /// Insert unless a row exists for the same (document, signer). Returns the stored row.
    pub fn insert_ledger_if_absent(&mut self, entry: LedgerEntry) -> LedgerEntry {
        let key = (entry.document_id().to_owned(), entry.signer_id().to_owned());
        let stored = Arc::make_mut(&mut self.ledger)
            .entry(key)
            .or_insert_with(|| Arc::new(entry));
        LedgerEntry::clone(stored)
    }

    pub fn ledger_of_document(&self, document_id: &str) -> Vec<LedgerEntry> {
        self.ledger
            .range((document_id.to_owned(), String::new())..)
            .take_while(|((doc, _), _)| doc == document_id)
            .map(|(_, entry)| LedgerEntry::clone(entry))
            .collect()
    }

    // Signature templates

    pub fn template(&self, id: &str) -> Option<&SignatureTemplate> {
        self.templates.get(id).map(|template| &**template)
    }

    pub fn templates_of_user(&self, user_id: &str) -> Vec<SignatureTemplate> {
        let mut templates: Vec<SignatureTemplate> = self
            .templates
            .values()
            .filter(|template| template.user_id == user_id)
            .map(|template| SignatureTemplate::clone(template))
            .collect();
        templates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        templates
    }

    pub fn upsert_template(&mut self, template: SignatureTemplate) {
        Arc::make_mut(&mut self.templates).insert(template.id.clone(), Arc::new(template));
    }

    pub fn remove_template(&mut self, id: &str) -> Option<SignatureTemplate> {
        Arc::make_mut(&mut self.templates)
            .remove(id)
            .map(into_row)
    }

    pub fn set_default_template(&mut self, user_id: &str, template_id: &str) {
        for template in Arc::make_mut(&mut self.templates).values_mut() {
            let is_default = template.id == template_id;
            if template.user_id == user_id && template.is_default != is_default {
                Arc::make_mut(template).is_default = is_default;
            }
        }
    }
}

/// Shared state of the engine.
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent read of the committed state.
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.lock();
        f(&tables)
    }

    /// Run `f` on a working copy and commit it only when `f` succeeds.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.lock();
        let mut working = tables.clone();
        let result = f(&mut working)?;
        *tables = working;
        Ok(result)
    }
}
