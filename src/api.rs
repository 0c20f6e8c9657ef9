//! Endpoint level facade. Each method is one route of the HTTP contract and
//! returns the status code next to the body, so a transport layer only has to
//! serialise.

use crate::composer::ComposedPdf;
use crate::documents::{DocumentDetail, DocumentListItem, DocumentQuery};
use crate::fields::{FieldUpdate, NewField};
use crate::invite::{InviteRequest, InviteResponse};
use crate::model::{Document, Field, SignatureTemplate, TemplateKind};
use crate::users::Caller;
use crate::verifier::{PublicVerificationReport, VerificationReport};
use crate::workflow::{
    CompletionResponse, DeclineResponse, FieldValue, SelfSignResponse, SigningSession,
};
use crate::{Engine, Error, Result};
use serde::Serialize;

/// Message shown for every server side fault.
const GENERIC_ERROR: &str = "An unexpected error occurred";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub status: u16,
    pub kind: &'static str,
    pub message: String,
}

impl From<&Error> for ApiError {
    fn from(err: &Error) -> Self {
        let message = if err.is_client_error() {
            err.to_string()
        } else {
            GENERIC_ERROR.to_owned()
        };
        Self {
            status: err.status_code(),
            kind: err.kind(),
            message,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: std::result::Result<T, ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn from_result(route: &str, result: Result<T>) -> Self {
        match result {
            Ok(body) => Self {
                status: 200,
                body: Ok(body),
            },
            Err(err) => {
                if err.is_client_error() {
                    log::debug!("{} rejected: {}", route, err);
                } else {
                    log::error!("{} failed: {:?}", route, err);
                }
                let error = ApiError::from(&err);
                Self {
                    status: error.status,
                    body: Err(error),
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.body.is_ok()
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// JSON body: the payload on success, `{"error": ...}` otherwise.
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct ErrorBody<'e> {
            error: &'e ApiError,
        }
        Ok(match &self.body {
            Ok(body) => serde_json::to_string(body)?,
            Err(error) => serde_json::to_string(&ErrorBody { error })?,
        })
    }
}

#[derive(Clone, Copy)]
pub struct Api<'a> {
    engine: &'a Engine,
}

impl<'a> Api<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    fn authenticated<T>(
        &self,
        route: &str,
        caller: Option<&Caller>,
        f: impl FnOnce(&Caller) -> Result<T>,
    ) -> ApiResponse<T> {
        ApiResponse::from_result(route, Caller::require(caller).and_then(f))
    }

    // Documents

    /// `POST /documents`
    pub fn upload_document(
        &self,
        caller: Option<&Caller>,
        file_name: &str,
        bytes: &[u8],
        title: Option<&str>,
    ) -> ApiResponse<Document> {
        self.authenticated("POST /documents", caller, |caller| {
            self.engine.documents().upload(caller, file_name, bytes, title)
        })
    }

    /// `GET /documents`
    pub fn list_documents(
        &self,
        caller: Option<&Caller>,
        query: &DocumentQuery,
    ) -> ApiResponse<Vec<DocumentListItem>> {
        self.authenticated("GET /documents", caller, |caller| {
            self.engine.documents().list(caller, query)
        })
    }

    /// `GET /documents/{id}`
    pub fn document_detail(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
    ) -> ApiResponse<DocumentDetail> {
        self.authenticated("GET /documents/{id}", caller, |caller| {
            self.engine.documents().detail(caller, document_id)
        })
    }

    /// `PATCH /documents/{id}`
    pub fn update_document_title(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
        title: Option<&str>,
    ) -> ApiResponse<Document> {
        self.authenticated("PATCH /documents/{id}", caller, |caller| {
            self.engine.documents().update_title(caller, document_id, title)
        })
    }

    /// `DELETE /documents/{id}`
    pub fn delete_document(&self, caller: Option<&Caller>, document_id: &str) -> ApiResponse<()> {
        self.authenticated("DELETE /documents/{id}", caller, |caller| {
            self.engine.documents().delete(caller, document_id)
        })
    }

    // Fields

    /// `POST /documents/{id}/fields`
    pub fn create_field(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
        field: NewField,
    ) -> ApiResponse<Field> {
        self.authenticated("POST /documents/{id}/fields", caller, |caller| {
            self.engine.fields().create(caller, document_id, field)
        })
    }

    /// `GET /documents/{id}/fields`
    pub fn list_fields(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
    ) -> ApiResponse<Vec<Field>> {
        self.authenticated("GET /documents/{id}/fields", caller, |caller| {
            self.engine.fields().list(caller, document_id)
        })
    }

    /// `PUT /fields/{id}`
    pub fn update_field(
        &self,
        caller: Option<&Caller>,
        field_id: &str,
        update: FieldUpdate,
    ) -> ApiResponse<Field> {
        self.authenticated("PUT /fields/{id}", caller, |caller| {
            self.engine.fields().update(caller, field_id, update)
        })
    }

    /// `DELETE /fields/{id}`
    pub fn delete_field(&self, caller: Option<&Caller>, field_id: &str) -> ApiResponse<()> {
        self.authenticated("DELETE /fields/{id}", caller, |caller| {
            self.engine.fields().delete(caller, field_id)
        })
    }

    // Signing

    /// `POST /documents/{id}/invite`
    pub fn invite(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
        request: &InviteRequest,
    ) -> ApiResponse<InviteResponse> {
        self.authenticated("POST /documents/{id}/invite", caller, |caller| {
            self.engine.invites().invite(caller, document_id, request)
        })
    }

    /// `POST /documents/{id}/self-sign`
    pub fn self_sign(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
    ) -> ApiResponse<SelfSignResponse> {
        self.authenticated("POST /documents/{id}/self-sign", caller, |caller| {
            self.engine.workflow().self_sign(caller, document_id)
        })
    }

    /// `GET /signing/{token}`
    pub fn signing_session(&self, token: &str) -> ApiResponse<SigningSession> {
        ApiResponse::from_result("GET /signing/{token}", self.engine.workflow().session(token))
    }

    /// `POST /signing/{token}/complete`
    pub fn complete_signing(
        &self,
        token: &str,
        values: &[FieldValue],
    ) -> ApiResponse<CompletionResponse> {
        ApiResponse::from_result(
            "POST /signing/{token}/complete",
            self.engine.workflow().complete(token, values),
        )
    }

    /// `POST /signing/{token}/decline`
    pub fn decline_signing(&self, token: &str, reason: &str) -> ApiResponse<DeclineResponse> {
        ApiResponse::from_result(
            "POST /signing/{token}/decline",
            self.engine.workflow().decline(token, reason),
        )
    }

    // Artifacts and verification

    /// `GET /documents/{id}/download`
    pub fn download(&self, caller: Option<&Caller>, document_id: &str) -> ApiResponse<ComposedPdf> {
        self.authenticated("GET /documents/{id}/download", caller, |caller| {
            self.engine.composer().download(caller, document_id)
        })
    }

    /// `GET /documents/{id}/download/verified`
    pub fn download_verified(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
    ) -> ApiResponse<ComposedPdf> {
        self.authenticated("GET /documents/{id}/download/verified", caller, |caller| {
            self.engine.composer().verification_artifact(caller, document_id)
        })
    }

    /// `GET /documents/{id}/verify`
    pub fn verify(
        &self,
        caller: Option<&Caller>,
        document_id: &str,
    ) -> ApiResponse<VerificationReport> {
        self.authenticated("GET /documents/{id}/verify", caller, |caller| {
            self.engine.verifier().verify_for(caller, document_id)
        })
    }

    /// `GET /public/verify/{id}`
    pub fn public_verify(&self, document_id: &str) -> ApiResponse<PublicVerificationReport> {
        ApiResponse::from_result(
            "GET /public/verify/{id}",
            self.engine.verifier().public(document_id),
        )
    }

    // Signature templates

    /// `POST /signatures`
    pub fn create_template(
        &self,
        caller: Option<&Caller>,
        kind: TemplateKind,
        image_data: &str,
        name: Option<&str>,
    ) -> ApiResponse<SignatureTemplate> {
        self.authenticated("POST /signatures", caller, |caller| {
            self.engine.templates().create(caller, kind, image_data, name)
        })
    }

    /// `GET /signatures`
    pub fn list_templates(&self, caller: Option<&Caller>) -> ApiResponse<Vec<SignatureTemplate>> {
        self.authenticated("GET /signatures", caller, |caller| {
            Ok(self.engine.templates().list(caller))
        })
    }

    /// `PUT /signatures/{id}/default`
    pub fn set_default_template(
        &self,
        caller: Option<&Caller>,
        template_id: &str,
    ) -> ApiResponse<SignatureTemplate> {
        self.authenticated("PUT /signatures/{id}/default", caller, |caller| {
            self.engine.templates().set_default(caller, template_id)
        })
    }

    /// `DELETE /signatures/{id}`
    pub fn delete_template(&self, caller: Option<&Caller>, template_id: &str) -> ApiResponse<()> {
        self.authenticated("DELETE /signatures/{id}", caller, |caller| {
            self.engine.templates().delete(caller, template_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_faults_hide_details() {
        let response: ApiResponse<()> =
            ApiResponse::from_result("test", Err(Error::storage("disk /var/x is full")));
        assert_eq!(response.status, 500);
        let error = response.body.unwrap_err();
        assert_eq!(error.kind, "STORAGE_FAULT");
        assert_eq!(error.message, GENERIC_ERROR);
    }

    #[test]
    fn test_client_errors_keep_their_message() {
        let response: ApiResponse<()> = ApiResponse::from_result(
            "test",
            Err(Error::invalid_state("Document has already been completed")),
        );
        assert_eq!(response.status, 400);
        let json = response.to_json().unwrap();
        assert!(json.contains("already been completed"));
        assert!(json.contains("INVALID_STATE"));
    }

    #[test]
    fn test_success_is_200() {
        let response = ApiResponse::from_result("test", Ok(vec![1, 2]));
        assert_eq!(response.status, 200);
        assert_eq!(response.to_json().unwrap(), "[1,2]");
    }
}
