//! Signer side of the document lifecycle: self-sign, token sessions,
//! completion and decline.
//!
//! ```text
//! DRAFT --invite/self-sign--> SIGNING --all signed--> DONE
//!                                    \--any declined--> DECLINED
//! PENDING --complete--> SIGNED
//!         \--decline--> DECLINED
//! ```

use crate::config::Config;
use crate::data_url::validate_signature_image;
use crate::documents::{authorize_owner, require_draft};
use crate::ledger::SignatureLedger;
use crate::model::{
    Document, DocumentStatus, Field, LedgerEntry, Signer, SignerStatus, SigningOrder,
    MIN_DECLINE_REASON_LEN,
};
use crate::store::Tables;
use crate::users::Caller;
use crate::{Engine, Error, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Token entropy in bytes.
pub const TOKEN_BYTES: usize = 32;
/// Upper bound for TEXT and DATE values.
pub const MAX_TEXT_VALUE_LEN: usize = 1000;

/// Fresh signing token: 256 random bits, URL-safe base64 without padding.
pub(crate) fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

/// The one place signer rows are built, for invites and self-sign alike.
pub(crate) fn new_signer(document_id: &str, email: &str, name: &str, order: u32) -> Signer {
    let email = email.trim();
    let name = match name.trim() {
        "" => email.split('@').next().unwrap_or(email),
        name => name,
    };
    Signer {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_owned(),
        email: email.to_owned(),
        name: name.to_owned(),
        token: new_token(),
        order,
        status: SignerStatus::Pending,
        created_at: Utc::now(),
        signed_at: None,
        declined_at: None,
        decline_reason: None,
    }
}

/// Insert a signer, drawing a new token in the practically impossible case of
/// a collision.
pub(crate) fn insert_signer(tables: &mut Tables, mut signer: Signer) -> Result<Signer> {
    for _ in 0..3 {
        match tables.insert_signer(signer.clone()) {
            Ok(()) => return Ok(signer),
            Err(Error::Unexpected(_)) => signer.token = new_token(),
            Err(err) => return Err(err),
        }
    }
    Err(Error::Unexpected("Could not allocate a unique signer token".to_owned()))
}

/// Display state of a signer. Never carries the token; the signing URL is only
/// filled in for the signer itself and for the document owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub order: u32,
    pub status: SignerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

impl SignerView {
    pub(crate) fn with_url(signer: &Signer, config: &Config) -> Self {
        Self {
            signing_url: Some(config.signing_url(&signer.token)),
            ..Self::from(signer)
        }
    }
}

impl From<&Signer> for SignerView {
    fn from(signer: &Signer) -> Self {
        Self {
            id: signer.id.clone(),
            email: signer.email.clone(),
            name: signer.name.clone(),
            order: signer.order,
            status: signer.status,
            signing_url: None,
            created_at: signer.created_at,
            signed_at: signer.signed_at,
            declined_at: signer.declined_at,
            decline_reason: signer.decline_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfSignResponse {
    pub document: Document,
    pub signer: SignerView,
    pub signing_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningSession {
    pub document: Document,
    pub signer: SignerView,
    /// Fields assigned to this signer.
    pub fields: Vec<Field>,
    /// All signers of the document, without URLs.
    pub signers: Vec<SignerView>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    pub field_id: String,
    pub value: String,
}

impl FieldValue {
    pub fn new(field_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResponse {
    pub document: Document,
    pub signer: SignerView,
    /// `true` when this completion moved the document to DONE.
    pub document_completed: bool,
    pub ledger_entry: LedgerEntry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclineResponse {
    pub document: Document,
    pub signer: SignerView,
}

/// Reject tokens whose signer may not act right now.
fn check_can_act(tables: &Tables, document: &Document, signer: &Signer) -> Result<()> {
    match document.status {
        DocumentStatus::Draft => {
            return Err(Error::invalid_state("Document is not yet ready for signing"))
        }
        DocumentStatus::Done => {
            return Err(Error::invalid_state("Document has already been completed"))
        }
        DocumentStatus::Declined => {
            return Err(Error::invalid_state("This document has been declined"))
        }
        DocumentStatus::Signing => {}
    }
    match signer.status {
        SignerStatus::Signed => {
            return Err(Error::invalid_state("You have already signed this document"))
        }
        SignerStatus::Declined => {
            return Err(Error::invalid_state("You declined to sign this document"))
        }
        SignerStatus::Pending => {}
    }
    if document.signing_order == SigningOrder::Sequential
        && tables
            .signers_of_document(&document.id)
            .iter()
            .any(|other| other.status == SignerStatus::Pending && other.order < signer.order)
    {
        return Err(Error::invalid_state(
            "Waiting for earlier signers to complete before you can sign",
        ));
    }
    Ok(())
}

/// Validate submitted values against the signer's assigned fields.
fn check_field_values(
    tables: &Tables,
    document: &Document,
    signer: &Signer,
    values: &[FieldValue],
) -> Result<()> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.field_id.as_str()) {
            return Err(Error::validation(format!(
                "Field `{}` was submitted more than once",
                value.field_id
            )));
        }
        let field = tables.field(&value.field_id).map_err(|_| {
            Error::validation(format!("Field `{}` does not exist", value.field_id))
        })?;
        if field.document_id != document.id {
            return Err(Error::validation(format!(
                "Field `{}` does not belong to this document",
                field.id
            )));
        }
        if field.signer_id.as_deref() != Some(signer.id.as_str()) {
            return Err(Error::validation(format!(
                "Field `{}` is not assigned to you",
                field.id
            )));
        }
        if value.value.trim().is_empty() {
            // Left blank, the required check below decides.
            continue;
        }
        if field.field_type.is_image() {
            validate_signature_image(&value.value)?;
        } else if value.value.chars().count() > MAX_TEXT_VALUE_LEN {
            return Err(Error::validation(format!(
                "Value of field `{}` is longer than {} characters",
                field.id, MAX_TEXT_VALUE_LEN
            )));
        }
    }
    let submitted: HashSet<&str> = values
        .iter()
        .filter(|value| !value.value.trim().is_empty())
        .map(|value| value.field_id.as_str())
        .collect();
    if let Some(missing) = tables.fields_of_signer(&signer.id).iter().find(|field| {
        field.document_id == document.id
            && field.is_required
            && !submitted.contains(field.id.as_str())
    }) {
        return Err(Error::validation(format!(
            "Required field `{}` was not filled in",
            missing.id
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
pub struct SigningWorkflow<'a> {
    engine: &'a Engine,
}

impl<'a> SigningWorkflow<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    fn ledger(&self) -> SignatureLedger<'a> {
        self.engine.ledger()
    }

    /// Make the owner the signer of their own draft. Calling it again returns
    /// the existing signer and URL.
    pub fn self_sign(&self, caller: &Caller, document_id: &str) -> Result<SelfSignResponse> {
        let config = self.engine.config();
        let (document, signer, created) = self.engine.store().transaction(|tables| {
            let document = tables.document(document_id)?;
            authorize_owner(document, caller)?;
            if let Some(existing) = tables
                .signers_of_document(document_id)
                .into_iter()
                .find(|signer| signer.has_email(&caller.email))
            {
                return Ok((document.clone(), existing, false));
            }
            require_draft(document, "start signing")?;

            let signer = insert_signer(
                tables,
                new_signer(document_id, &caller.email, &caller.full_name, 1),
            )?;
            let unassigned: Vec<(String, String)> = tables
                .fields_of_document(document_id)
                .into_iter()
                .filter(|field| field.signer_id.is_none())
                .map(|field| (field.id, signer.id.clone()))
                .collect();
            tables.assign_fields(document_id, &unassigned)?;

            let document = tables.document_mut(document_id)?;
            document.status = DocumentStatus::Signing;
            document.updated_at = Utc::now();
            Ok((document.clone(), signer, true))
        })?;

        if created {
            log::info!(
                "Document {} moved to SIGNING, owner {} signs it alone",
                document.id,
                caller.user_id
            );
        }
        Ok(SelfSignResponse {
            signing_url: config.signing_url(&signer.token),
            signer: SignerView::with_url(&signer, config),
            document,
        })
    }

    /// Public lookup of a signing session by token.
    pub fn session(&self, token: &str) -> Result<SigningSession> {
        let config = self.engine.config();
        self.engine.store().read(|tables| {
            let signer = tables.signer_by_token(token)?;
            let document = tables.document(&signer.document_id)?;
            check_can_act(tables, document, signer)?;
            let fields = tables
                .fields_of_signer(&signer.id)
                .into_iter()
                .filter(|field| field.document_id == document.id)
                .collect();
            Ok(SigningSession {
                document: document.clone(),
                signer: SignerView::with_url(signer, config),
                fields,
                signers: tables
                    .signers_of_document(&document.id)
                    .iter()
                    .map(SignerView::from)
                    .collect(),
            })
        })
    }

    /// Submit the signer's field values and sign.
    ///
    /// Everything is checked up front; the ledger row is prepared outside the
    /// store lock and committed together with the field values, the signer
    /// status and the possible transition to DONE.
    pub fn complete(&self, token: &str, values: &[FieldValue]) -> Result<CompletionResponse> {
        let (document, signer) = self.engine.store().read(|tables| {
            let signer = tables.signer_by_token(token)?;
            let document = tables.document(&signer.document_id)?;
            check_can_act(tables, document, signer)?;
            check_field_values(tables, document, signer, values)?;
            Ok::<_, Error>((document.clone(), signer.clone()))
        })?;

        let signed_at = Utc::now();
        let prepared = self.ledger().prepare(
            &document.id,
            &document.blob_key,
            &signer.id,
            &signer.email,
            signed_at,
        )?;

        let (document, signer, ledger_entry, document_completed) =
            self.engine.store().transaction(|tables| {
                // Re-check, another request may have acted in between.
                {
                    let signer = tables.signer_by_token(token)?;
                    let document = tables.document(&signer.document_id)?;
                    check_can_act(tables, document, signer)?;
                    check_field_values(tables, document, signer, values)?;
                }
                for value in values.iter().filter(|value| !value.value.trim().is_empty()) {
                    tables.field_mut(&value.field_id)?.value = Some(value.value.clone());
                }
                let signer = tables.signer_mut(&signer.id)?;
                signer.status = SignerStatus::Signed;
                signer.signed_at = Some(signed_at);
                let signer = signer.clone();

                let ledger_entry = SignatureLedger::commit(tables, prepared);

                let pending =
                    tables.count_signers_with_status(&signer.document_id, SignerStatus::Pending);
                let document = tables.document_mut(&signer.document_id)?;
                document.updated_at = signed_at;
                let completed = pending == 0 && document.status == DocumentStatus::Signing;
                if completed {
                    document.status = DocumentStatus::Done;
                    document.completed_at = Some(signed_at);
                }
                Ok((document.clone(), signer, ledger_entry, completed))
            })?;

        log::info!(
            "Signer {} signed document {} ({})",
            signer.id,
            document.id,
            match &ledger_entry {
                LedgerEntry::Cryptographic(_) => "digital signature",
                LedgerEntry::ClickwrapOnly { .. } => "clickwrap only",
            }
        );
        if document_completed {
            log::info!("All signers signed, document {} is DONE", document.id);
        }
        Ok(CompletionResponse {
            signer: SignerView::from(&signer),
            document,
            document_completed,
            ledger_entry,
        })
    }

    /// Decline to sign. Declining ends the document for everyone.
    pub fn decline(&self, token: &str, reason: &str) -> Result<DeclineResponse> {
        let reason = reason.trim();
        if reason.chars().count() < MIN_DECLINE_REASON_LEN {
            return Err(Error::validation(format!(
                "Please provide a reason of at least {} characters",
                MIN_DECLINE_REASON_LEN
            )));
        }
        let (document, signer) = self.engine.store().transaction(|tables| {
            let signer = tables.signer_by_token(token)?;
            if signer.status != SignerStatus::Pending {
                return Err(Error::invalid_state(match signer.status {
                    SignerStatus::Signed => "You have already signed this document",
                    _ => "You declined to sign this document",
                }));
            }
            let document = tables.document(&signer.document_id)?;
            if document.status != DocumentStatus::Signing {
                return Err(Error::invalid_state(format!(
                    "Document can not be declined in status {}",
                    document.status
                )));
            }

            let now = Utc::now();
            let signer_id = signer.id.clone();
            let signer = tables.signer_mut(&signer_id)?;
            signer.status = SignerStatus::Declined;
            signer.declined_at = Some(now);
            signer.decline_reason = Some(reason.to_owned());
            let signer = signer.clone();

            let document = tables.document_mut(&signer.document_id)?;
            document.status = DocumentStatus::Declined;
            document.declined_at = Some(now);
            document.declined_by = Some(signer.id.clone());
            document.decline_reason = Some(reason.to_owned());
            document.updated_at = now;
            Ok((document.clone(), signer))
        })?;

        log::info!(
            "Signer {} declined document {}, document is DECLINED",
            signer.id,
            document.id
        );
        Ok(DeclineResponse {
            signer: SignerView::from(&signer),
            document,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_long_and_url_safe() {
        let token = new_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_ne!(token, new_token());
    }

    #[test]
    fn test_signer_name_falls_back_to_mailbox() {
        let signer = new_signer("d1", " bob@external.com ", "  ", 2);
        assert_eq!(signer.name, "bob");
        assert_eq!(signer.email, "bob@external.com");
        assert_eq!(signer.status, SignerStatus::Pending);
    }

    #[test]
    fn test_view_never_leaks_token() {
        let signer = new_signer("d1", "alice@example.com", "Alice", 1);
        let json = serde_json::to_string(&SignerView::from(&signer)).unwrap();
        assert!(!json.contains(&signer.token));
        assert!(!json.contains("signingUrl"));
    }
}
