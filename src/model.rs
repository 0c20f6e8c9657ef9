//! Entities persisted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SIGNATURE_ALGORITHM: &str = "SHA256withRSA";
pub const KEY_ALGORITHM: &str = "RSA-2048";
pub const HASH_ALGORITHM: &str = "SHA-256";

/// Minimum trimmed length of a decline reason.
pub const MIN_DECLINE_REASON_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Signing,
    Done,
    Declined,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentStatus::Draft => "DRAFT",
            DocumentStatus::Signing => "SIGNING",
            DocumentStatus::Done => "DONE",
            DocumentStatus::Declined => "DECLINED",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigningOrder {
    /// `order` is display metadata only.
    #[default]
    Parallel,
    /// A signer may only act once every signer with a smaller `order` has signed.
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub title: String,
    /// Key of the PDF in the blob store.
    pub blob_key: String,
    pub file_size: u64,
    pub page_count: u32,
    pub owner_id: String,
    pub status: DocumentStatus,
    pub signing_order: SigningOrder,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    /// Id of the signer that declined.
    pub declined_by: Option<String>,
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    Signature,
    Initial,
    Date,
    Text,
}

impl FieldType {
    /// Fields that are filled with a drawn or uploaded image.
    pub fn is_image(self) -> bool {
        matches!(self, FieldType::Signature | FieldType::Initial)
    }
}

/// A rectangle placed on a page. Coordinates are percentages of the page
/// dimensions, measured from the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    pub document_id: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// 1-indexed.
    pub page_number: u32,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    /// Assigned signer.
    pub signer_id: Option<String>,
    /// Data URL for image fields, plain text otherwise.
    pub value: Option<String>,
    pub is_required: bool,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignerStatus {
    Pending,
    Signed,
    Declined,
}

impl fmt::Display for SignerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignerStatus::Pending => "PENDING",
            SignerStatus::Signed => "SIGNED",
            SignerStatus::Declined => "DECLINED",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    pub id: String,
    pub document_id: String,
    pub email: String,
    pub name: String,
    /// The only credential of a signer. Never serialized.
    #[serde(skip_serializing)]
    pub token: String,
    pub order: u32,
    pub status: SignerStatus,
    pub created_at: DateTime<Utc>,
    pub signed_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
}

impl Signer {
    pub fn has_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }
}

/// A registered account, as resolved through the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
}

/// Per user RSA key pair. The private key is only stored wrapped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserKeyPair {
    pub user_id: String,
    /// Base64 of the DER SubjectPublicKeyInfo.
    pub public_key: String,
    /// `IV (12 bytes) || ciphertext || tag (16 bytes)`.
    #[serde(skip_serializing)]
    pub private_key_wrapped: Vec<u8>,
    pub algorithm: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("user_id", &self.user_id)
            .field("public_key", &self.public_key)
            .field("private_key_wrapped", &"<wrapped>")
            .field("algorithm", &self.algorithm)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Cryptographic binding of a signer to the document bytes at signing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignature {
    pub document_id: String,
    pub signer_id: String,
    /// Registered account that produced the signature.
    pub user_id: String,
    /// Base64 of the SHA-256 digest.
    pub document_hash: String,
    /// Base64 of the raw RSA signature.
    pub signature: String,
    pub algorithm: String,
    pub signed_at: DateTime<Utc>,
    /// Validity when written. Never rewritten by verification.
    pub is_valid: bool,
}

/// One ledger row per (document, signer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntry {
    Cryptographic(DocumentSignature),
    /// External signer without an account: the signing is recorded but carries no
    /// cryptographic proof.
    #[serde(rename_all = "camelCase")]
    ClickwrapOnly {
        document_id: String,
        signer_id: String,
        signed_at: DateTime<Utc>,
    },
}

impl LedgerEntry {
    pub fn document_id(&self) -> &str {
        match self {
            LedgerEntry::Cryptographic(signature) => &signature.document_id,
            LedgerEntry::ClickwrapOnly { document_id, .. } => document_id,
        }
    }

    pub fn signer_id(&self) -> &str {
        match self {
            LedgerEntry::Cryptographic(signature) => &signature.signer_id,
            LedgerEntry::ClickwrapOnly { signer_id, .. } => signer_id,
        }
    }

    pub fn as_cryptographic(&self) -> Option<&DocumentSignature> {
        match self {
            LedgerEntry::Cryptographic(signature) => Some(signature),
            LedgerEntry::ClickwrapOnly { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateKind {
    Drawn,
    Typed,
    Uploaded,
}

/// Reusable visual signature owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTemplate {
    pub id: String,
    pub user_id: String,
    pub kind: TemplateKind,
    /// PNG or SVG data URL.
    pub image_data: String,
    pub name: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}
