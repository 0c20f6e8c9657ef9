//! Tamper detection: recompute the document hash and re-verify every
//! stored signature against its recorded hash.

use crate::crypto;
use crate::documents::authorize_access;
use crate::model::{
    DocumentSignature, DocumentStatus, LedgerEntry, Signer, SignerStatus, HASH_ALGORITHM,
    SIGNATURE_ALGORITHM,
};
use crate::users::Caller;
use crate::{Engine, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MSG_VALID: &str = "Signature valid and document unmodified";
pub const MSG_MODIFIED: &str = "Signature valid but document has been modified since signing";
pub const MSG_INVALID: &str = "Signature verification failed";
pub const MSG_NO_KEY: &str = "Public key not found for signer";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureVerification {
    pub signer_id: String,
    pub signer_name: String,
    pub signer_email: String,
    pub signature_valid: bool,
    pub hash_matches: bool,
    pub original_hash: String,
    pub algorithm: String,
    pub signed_at: DateTime<Utc>,
    pub status_message: String,
}

impl SignatureVerification {
    /// Both the signature and the hash check out.
    pub fn is_green(&self) -> bool {
        self.signature_valid && self.hash_matches
    }
}

/// Signer that signed without a cryptographic record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickwrapSigner {
    pub signer_id: String,
    pub signer_name: String,
    pub signer_email: String,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub document_id: String,
    pub document_title: String,
    pub valid: bool,
    pub modified: bool,
    /// `None` when there was nothing to compare against.
    pub current_hash: Option<String>,
    pub signatures: Vec<SignatureVerification>,
    /// Cryptographic rows only.
    pub total_signatures: usize,
    pub valid_signatures: usize,
    pub clickwrap_signers: Vec<ClickwrapSigner>,
    /// Registered signers without a ledger row yet.
    pub missing_signatures: usize,
    pub verified_at: DateTime<Utc>,
}

/// Minimal report for QR scanners. No emails, no hashes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVerificationReport {
    pub document_id: String,
    pub document_title: String,
    pub status: DocumentStatus,
    pub valid: bool,
    pub modified: bool,
    pub message: String,
    pub valid_signatures: usize,
    pub total_signatures: usize,
    pub signer_names: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub verified_at: DateTime<Utc>,
    pub hash_algorithm: &'static str,
    pub signature_algorithm: &'static str,
}

#[derive(Clone, Copy)]
pub struct Verifier<'a> {
    engine: &'a Engine,
}

impl<'a> Verifier<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Detailed report for the owner or a signer.
    pub fn verify_for(&self, caller: &Caller, document_id: &str) -> Result<VerificationReport> {
        self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)
        })?;
        self.verify(document_id)
    }

    /// Verify all ledger rows of a document against its current bytes.
    /// Read only: the stored `is_valid` flags are never touched.
    pub fn verify(&self, document_id: &str) -> Result<VerificationReport> {
        let verified_at = Utc::now();
        let (document, signers, entries) = self.engine.store().read(|tables| {
            let document = tables.document(document_id)?.clone();
            Ok::<_, Error>((
                document,
                tables.signers_of_document(document_id),
                tables.ledger_of_document(document_id),
            ))
        })?;

        let signer_of = |signer_id: &str| signers.iter().find(|signer| signer.id == signer_id);
        let clickwrap_signers: Vec<ClickwrapSigner> = entries
            .iter()
            .filter_map(|entry| match entry {
                LedgerEntry::ClickwrapOnly {
                    signer_id,
                    signed_at,
                    ..
                } => {
                    let (signer_name, signer_email) = describe(signer_of(signer_id));
                    Some(ClickwrapSigner {
                        signer_id: signer_id.clone(),
                        signer_name,
                        signer_email,
                        signed_at: *signed_at,
                    })
                }
                LedgerEntry::Cryptographic(_) => None,
            })
            .collect();
        let cryptographic: Vec<&DocumentSignature> =
            entries.iter().filter_map(LedgerEntry::as_cryptographic).collect();
        let missing_signatures = signers
            .iter()
            .filter(|signer| {
                !entries.iter().any(|entry| entry.signer_id() == signer.id)
                    && self.engine.users().find_by_email(&signer.email).is_some()
            })
            .count();

        if cryptographic.is_empty() {
            log::info!("Document {} has no digital signatures to verify", document_id);
            return Ok(VerificationReport {
                document_id: document.id,
                document_title: document.title,
                valid: false,
                modified: false,
                current_hash: None,
                signatures: Vec::new(),
                total_signatures: 0,
                valid_signatures: 0,
                clickwrap_signers,
                missing_signatures,
                verified_at,
            });
        }

        let current_hash = self.engine.hasher().hash(&document.blob_key)?;
        let signatures: Vec<SignatureVerification> = cryptographic
            .iter()
            .map(|row| self.check_row(row, &current_hash, signer_of(&row.signer_id)))
            .collect();

        let valid_signatures = signatures.iter().filter(|row| row.is_green()).count();
        let modified = signatures.iter().any(|row| !row.hash_matches);
        let valid = valid_signatures == signatures.len() && missing_signatures == 0;
        log::info!(
            "Verified document {}: {}/{} signatures valid, modified: {}",
            document_id,
            valid_signatures,
            signatures.len(),
            modified
        );

        Ok(VerificationReport {
            document_id: document.id,
            document_title: document.title,
            valid,
            modified,
            current_hash: Some(current_hash),
            total_signatures: signatures.len(),
            valid_signatures,
            signatures,
            clickwrap_signers,
            missing_signatures,
            verified_at,
        })
    }

    /// Report for unauthenticated QR scanners.
    pub fn public(&self, document_id: &str) -> Result<PublicVerificationReport> {
        let report = self.verify(document_id)?;
        let (status, completed_at, signer_names) = self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            let names = tables
                .signers_of_document(document_id)
                .into_iter()
                .filter(|signer| signer.status == SignerStatus::Signed)
                .map(|signer| signer.name)
                .collect::<Vec<_>>();
            Ok::<_, Error>((document.status, document.completed_at, names))
        })?;

        let message = if report.total_signatures == 0 {
            "No digital signatures found"
        } else if report.valid {
            "Document is authentic and has not been modified"
        } else if report.modified {
            "Document has been modified since it was signed"
        } else if report.valid_signatures < report.total_signatures {
            "One or more signatures could not be verified"
        } else {
            "Document is still awaiting signatures"
        };

        Ok(PublicVerificationReport {
            document_id: report.document_id,
            document_title: report.document_title,
            status,
            valid: report.valid,
            modified: report.modified,
            message: message.to_owned(),
            valid_signatures: report.valid_signatures,
            total_signatures: report.total_signatures,
            signer_names,
            completed_at,
            verified_at: report.verified_at,
            hash_algorithm: HASH_ALGORITHM,
            signature_algorithm: SIGNATURE_ALGORITHM,
        })
    }

    fn check_row(
        &self,
        row: &DocumentSignature,
        current_hash: &str,
        signer: Option<&Signer>,
    ) -> SignatureVerification {
        let (signer_name, signer_email) = describe(signer);
        let hash_matches = row.document_hash == current_hash;
        let public_key = self.engine.key_vault().public_key(&row.user_id);
        let (signature_valid, status_message) = match public_key {
            Ok(Some(public_key)) => {
                match crypto::verify_base64(&row.document_hash, &row.signature, &public_key) {
                    Ok(true) if hash_matches => (true, MSG_VALID),
                    Ok(true) => (true, MSG_MODIFIED),
                    Ok(false) => (false, MSG_INVALID),
                    Err(err) => {
                        log::error!(
                            "Malformed signature for document {} signer {}: {}",
                            row.document_id,
                            row.signer_id,
                            err.kind()
                        );
                        (false, MSG_INVALID)
                    }
                }
            }
            Ok(None) => (false, MSG_NO_KEY),
            Err(err) => {
                log::error!(
                    "Stored public key of user {} is unreadable: {}",
                    row.user_id,
                    err.kind()
                );
                (false, MSG_NO_KEY)
            }
        };
        SignatureVerification {
            signer_id: row.signer_id.clone(),
            signer_name,
            signer_email,
            signature_valid,
            hash_matches,
            original_hash: row.document_hash.clone(),
            algorithm: row.algorithm.clone(),
            signed_at: row.signed_at,
            status_message: status_message.to_owned(),
        }
    }
}

fn describe(signer: Option<&Signer>) -> (String, String) {
    match signer {
        Some(signer) => (signer.name.clone(), signer.email.clone()),
        None => ("Unknown".to_owned(), String::new()),
    }
}
