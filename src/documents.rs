//! Upload, lookup and housekeeping of documents.

use crate::model::{Document, DocumentStatus, Field, SigningOrder};
use crate::storage::BlobStore;
use crate::store::Tables;
use crate::users::Caller;
use crate::workflow::SignerView;
use crate::{Engine, Error, Result};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Owner or invited signer, else `Forbidden`.
pub(crate) fn authorize_access(
    tables: &Tables,
    document: &Document,
    caller: &Caller,
) -> Result<()> {
    if document.owner_id == caller.user_id
        || tables
            .signers_of_document(&document.id)
            .iter()
            .any(|signer| signer.has_email(&caller.email))
    {
        Ok(())
    } else {
        Err(Error::forbidden("You do not have access to this document"))
    }
}

pub(crate) fn authorize_owner(document: &Document, caller: &Caller) -> Result<()> {
    if document.owner_id == caller.user_id {
        Ok(())
    } else {
        Err(Error::forbidden("Only the document owner can do this"))
    }
}

pub(crate) fn require_draft(document: &Document, action: &str) -> Result<()> {
    if document.status == DocumentStatus::Draft {
        Ok(())
    } else {
        Err(Error::invalid_state(format!(
            "Can only {} while the document is a draft (status {})",
            action, document.status
        )))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetail {
    #[serde(flatten)]
    pub document: Document,
    pub fields: Vec<Field>,
    pub signers: Vec<SignerView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentListItem {
    #[serde(flatten)]
    pub document: Document,
    pub owner_name: String,
    pub is_owner: bool,
    pub signer_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    pub status: Option<DocumentStatus>,
    /// Case-insensitive title search.
    pub search: Option<String>,
}

#[derive(Clone, Copy)]
pub struct Documents<'a> {
    engine: &'a Engine,
}

impl<'a> Documents<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Store a new PDF as a DRAFT document owned by the caller.
    pub fn upload(
        &self,
        caller: &Caller,
        file_name: &str,
        bytes: &[u8],
        title: Option<&str>,
    ) -> Result<Document> {
        if bytes.is_empty() {
            return Err(Error::validation("File is empty"));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(Error::validation(format!(
                "File is larger than {} MB",
                MAX_UPLOAD_BYTES / 1024 / 1024
            )));
        }
        let page_count = lopdf::Document::load_mem(bytes)
            .map_err(|err| {
                log::debug!("Rejected upload `{}`: {}", file_name, err);
                Error::validation("Only PDF files are supported")
            })?
            .get_pages()
            .len();
        if page_count == 0 {
            return Err(Error::validation("PDF has no pages"));
        }

        let id = Uuid::new_v4().to_string();
        let blob_key = self
            .engine
            .storage()
            .upload(&format!("{}.pdf", Uuid::new_v4()), bytes)?;
        let now = Utc::now();
        let title = match title.map(str::trim) {
            Some(title) if !title.is_empty() => title.to_owned(),
            _ => file_name.trim().to_owned(),
        };
        let document = Document {
            id,
            title,
            blob_key,
            file_size: u64::try_from(bytes.len())?,
            page_count: u32::try_from(page_count)?,
            owner_id: caller.user_id.clone(),
            status: DocumentStatus::Draft,
            signing_order: SigningOrder::Parallel,
            created_at: now,
            updated_at: now,
            completed_at: None,
            declined_at: None,
            declined_by: None,
            decline_reason: None,
        };
        self.engine.store().transaction(|tables| {
            tables.insert_document(document.clone());
            Ok(())
        })?;
        log::info!(
            "Document {} uploaded by {} ({} pages, {} bytes)",
            document.id,
            caller.user_id,
            document.page_count,
            document.file_size
        );
        Ok(document)
    }

    pub fn get(&self, caller: &Caller, document_id: &str) -> Result<Document> {
        self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)?;
            Ok(document.clone())
        })
    }

    /// Document with fields and signer roster. Signing URLs are only shown to
    /// the owner.
    pub fn detail(&self, caller: &Caller, document_id: &str) -> Result<DocumentDetail> {
        let config = self.engine.config();
        self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)?;
            let is_owner = document.owner_id == caller.user_id;
            let signers = tables
                .signers_of_document(document_id)
                .iter()
                .map(|signer| {
                    if is_owner {
                        SignerView::with_url(signer, config)
                    } else {
                        SignerView::from(signer)
                    }
                })
                .collect();
            Ok(DocumentDetail {
                document: document.clone(),
                fields: tables.fields_of_document(document_id),
                signers,
            })
        })
    }

    /// Rename a draft. A blank title leaves it unchanged.
    pub fn update_title(
        &self,
        caller: &Caller,
        document_id: &str,
        title: Option<&str>,
    ) -> Result<Document> {
        self.engine.store().transaction(|tables| {
            let document = tables.document_mut(document_id)?;
            authorize_owner(document, caller)?;
            require_draft(document, "rename")?;
            if let Some(title) = title.map(str::trim).filter(|title| !title.is_empty()) {
                document.title = title.to_owned();
                document.updated_at = Utc::now();
            }
            Ok(document.clone())
        })
    }

    /// Delete a DRAFT or DECLINED document with its fields, signers and blob.
    /// Ledger rows stay for audit.
    pub fn delete(&self, caller: &Caller, document_id: &str) -> Result<()> {
        let document = self.engine.store().transaction(|tables| {
            let document = tables.document(document_id)?;
            authorize_owner(document, caller)?;
            if !matches!(
                document.status,
                DocumentStatus::Draft | DocumentStatus::Declined
            ) {
                return Err(Error::invalid_state(format!(
                    "Can not delete a document in status {}",
                    document.status
                )));
            }
            tables.remove_document(document_id)
        })?;
        if let Err(err) = self.engine.storage().delete(&document.blob_key) {
            log::warn!(
                "Document {} deleted but its blob {} could not be removed: {}",
                document.id,
                document.blob_key,
                err
            );
        }
        log::info!("Document {} deleted by {}", document.id, caller.user_id);
        Ok(())
    }

    /// Documents the caller owns or was invited to, newest first.
    pub fn list(&self, caller: &Caller, query: &DocumentQuery) -> Result<Vec<DocumentListItem>> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|search| !search.is_empty())
            .map(str::to_lowercase);
        let mut documents: Vec<(Document, usize)> = self.engine.store().read(|tables| {
            let invited = tables.documents_with_signer_email(&caller.email);
            tables
                .documents()
                .filter(|document| {
                    document.owner_id == caller.user_id || invited.contains(&document.id)
                })
                .filter(|document| query.status.map_or(true, |status| document.status == status))
                .filter(|document| {
                    search
                        .as_deref()
                        .map_or(true, |search| document.title.to_lowercase().contains(search))
                })
                .map(|document| {
                    (
                        document.clone(),
                        tables.signers_of_document(&document.id).len(),
                    )
                })
                .collect()
        });
        documents.sort_by(|(a, _), (b, _)| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(documents
            .into_iter()
            .map(|(document, signer_count)| {
                let owner_name = self
                    .engine
                    .users()
                    .find_by_id(&document.owner_id)
                    .map(|user| user.full_name)
                    .unwrap_or_else(|| "Unknown".to_owned());
                DocumentListItem {
                    is_owner: document.owner_id == caller.user_id,
                    owner_name,
                    signer_count,
                    document,
                }
            })
            .collect())
    }
}
