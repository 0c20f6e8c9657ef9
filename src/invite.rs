use crate::documents::{authorize_owner, require_draft};
use crate::model::{Document, DocumentStatus, SigningOrder};
use crate::users::Caller;
use crate::workflow::{insert_signer, new_signer, SignerView};
use crate::{Engine, Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerRequest {
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Defaults to the position in the request, starting at 1.
    pub order: Option<u32>,
}

impl SignerRequest {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: name.into(),
            order: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub signers: Vec<SignerRequest>,
    #[serde(default)]
    pub signing_order: SigningOrder,
    /// Field id -> email of one of the invited signers.
    #[serde(default)]
    pub field_assignments: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub document: Document,
    /// Invited signers with their signing URLs, for delivery by the caller.
    pub signers: Vec<SignerView>,
}

#[derive(Clone, Copy)]
pub struct InviteOrchestrator<'a> {
    engine: &'a Engine,
}

impl<'a> InviteOrchestrator<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Create the signers, apply the field assignments and move the document
    /// to SIGNING. Nothing is written unless every step succeeds.
    pub fn invite(
        &self,
        caller: &Caller,
        document_id: &str,
        request: &InviteRequest,
    ) -> Result<InviteResponse> {
        validate_request(request)?;
        let config = self.engine.config();

        let (document, signers) = self.engine.store().transaction(|tables| {
            let document = tables.document(document_id)?;
            authorize_owner(document, caller)?;
            require_draft(document, "invite signers")?;

            let mut signers = Vec::with_capacity(request.signers.len());
            for (index, signer) in request.signers.iter().enumerate() {
                let order = match signer.order {
                    Some(order) => order,
                    None => u32::try_from(index + 1)?,
                };
                signers.push(insert_signer(
                    tables,
                    new_signer(document_id, &signer.email, &signer.name, order),
                )?);
            }

            let mut assignments = Vec::with_capacity(request.field_assignments.len());
            for (field_id, email) in &request.field_assignments {
                let signer = signers
                    .iter()
                    .find(|signer| signer.has_email(email))
                    .ok_or_else(|| {
                        Error::validation(format!(
                            "Field `{}` is assigned to `{}` who is not invited",
                            field_id, email
                        ))
                    })?;
                assignments.push((field_id.clone(), signer.id.clone()));
            }
            tables.assign_fields(document_id, &assignments)?;

            let document = tables.document_mut(document_id)?;
            document.status = DocumentStatus::Signing;
            document.signing_order = request.signing_order;
            document.updated_at = Utc::now();
            Ok((document.clone(), signers))
        })?;

        log::info!(
            "Document {} moved to SIGNING with {} signer(s), {:?} order",
            document.id,
            signers.len(),
            document.signing_order
        );
        Ok(InviteResponse {
            document,
            signers: signers
                .iter()
                .map(|signer| SignerView::with_url(signer, config))
                .collect(),
        })
    }
}

fn validate_request(request: &InviteRequest) -> Result<()> {
    if request.signers.is_empty() {
        return Err(Error::validation("At least one signer is required"));
    }
    let mut emails = HashSet::new();
    for signer in &request.signers {
        let email = signer.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::validation(format!(
                "`{}` is not a valid email address",
                signer.email
            )));
        }
        if !emails.insert(email.to_lowercase()) {
            return Err(Error::validation(format!(
                "Signer `{}` is listed more than once",
                email
            )));
        }
        if signer.order == Some(0) {
            return Err(Error::validation("Signer order starts at 1"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: InviteRequest = serde_json::from_str(
            r#"{"signers":[{"email":"alice@example.com","name":"Alice"}]}"#,
        )
        .unwrap();
        assert_eq!(request.signing_order, SigningOrder::Parallel);
        assert!(request.field_assignments.is_empty());
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn test_duplicate_emails_are_rejected() {
        let request = InviteRequest {
            signers: vec![
                SignerRequest::new("alice@example.com", "Alice"),
                SignerRequest::new("ALICE@example.com ", "Alice again"),
            ],
            ..InviteRequest::default()
        };
        assert!(matches!(validate_request(&request), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_and_zero_order_are_rejected() {
        assert!(validate_request(&InviteRequest::default()).is_err());
        let request = InviteRequest {
            signers: vec![SignerRequest::new("a@example.com", "A").with_order(0)],
            ..InviteRequest::default()
        };
        assert!(validate_request(&request).is_err());
    }
}
