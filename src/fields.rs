//! Placement of fields on document pages. Editable only while DRAFT.

use crate::documents::{authorize_access, authorize_owner, require_draft};
use crate::model::{Document, Field, FieldType};
use crate::users::Caller;
use crate::{Engine, Error, Result};
use serde::Deserialize;
use uuid::Uuid;

/// Slack for float rounding in `x + width <= 100`.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewField {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub page_number: u32,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub signer_id: Option<String>,
    #[serde(default = "default_required")]
    pub is_required: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
}

fn default_required() -> bool {
    true
}

impl NewField {
    pub fn new(field_type: FieldType, page_number: u32, rect: (f64, f64, f64, f64)) -> Self {
        Self {
            field_type,
            page_number,
            position_x: rect.0,
            position_y: rect.1,
            width: rect.2,
            height: rect.3,
            signer_id: None,
            is_required: true,
            placeholder: None,
        }
    }
}

/// Partial update, `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldUpdate {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub page_number: Option<u32>,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub signer_id: Option<String>,
    pub is_required: Option<bool>,
    pub placeholder: Option<String>,
}

/// Coordinates are percentages: inside `[0, 100]` and the box stays on the page.
fn validate_geometry(field: &Field, document: &Document) -> Result<()> {
    let coordinates = [
        ("positionX", field.position_x),
        ("positionY", field.position_y),
        ("width", field.width),
        ("height", field.height),
    ];
    for (name, value) in coordinates {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(Error::validation(format!(
                "{} must be between 0 and 100, got {}",
                name, value
            )));
        }
    }
    if field.width <= 0.0 || field.height <= 0.0 {
        return Err(Error::validation("Field width and height must be positive"));
    }
    if field.position_x + field.width > 100.0 + EPSILON {
        return Err(Error::validation("Field extends beyond the right edge of the page"));
    }
    if field.position_y + field.height > 100.0 + EPSILON {
        return Err(Error::validation("Field extends beyond the bottom edge of the page"));
    }
    if field.page_number < 1 || field.page_number > document.page_count {
        return Err(Error::validation(format!(
            "Page {} does not exist, the document has {} page(s)",
            field.page_number, document.page_count
        )));
    }
    Ok(())
}

#[derive(Clone, Copy)]
pub struct FieldRegistry<'a> {
    engine: &'a Engine,
}

impl<'a> FieldRegistry<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    pub fn create(&self, caller: &Caller, document_id: &str, new: NewField) -> Result<Field> {
        self.engine.store().transaction(|tables| {
            let document = tables.document(document_id)?;
            authorize_owner(document, caller)?;
            require_draft(document, "add fields")?;
            let field = Field {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_owned(),
                field_type: new.field_type,
                page_number: new.page_number,
                position_x: new.position_x,
                position_y: new.position_y,
                width: new.width,
                height: new.height,
                signer_id: new.signer_id,
                value: None,
                is_required: new.is_required,
                placeholder: new.placeholder,
            };
            validate_geometry(&field, document)?;
            if let Some(signer_id) = &field.signer_id {
                if tables.signer(signer_id)?.document_id != document_id {
                    return Err(Error::validation("Signer does not belong to this document"));
                }
            }
            log::debug!("Field {} added to document {}", field.id, document_id);
            tables.insert_field(field.clone());
            Ok(field)
        })
    }

    pub fn update(&self, caller: &Caller, field_id: &str, update: FieldUpdate) -> Result<Field> {
        self.engine.store().transaction(|tables| {
            let mut field = tables.field(field_id)?.clone();
            let document = tables.document(&field.document_id)?;
            authorize_owner(document, caller)?;
            require_draft(document, "edit fields")?;

            if let Some(field_type) = update.field_type {
                field.field_type = field_type;
            }
            if let Some(page_number) = update.page_number {
                field.page_number = page_number;
            }
            if let Some(x) = update.position_x {
                field.position_x = x;
            }
            if let Some(y) = update.position_y {
                field.position_y = y;
            }
            if let Some(width) = update.width {
                field.width = width;
            }
            if let Some(height) = update.height {
                field.height = height;
            }
            if let Some(is_required) = update.is_required {
                field.is_required = is_required;
            }
            if update.placeholder.is_some() {
                field.placeholder = update.placeholder;
            }
            if let Some(signer_id) = update.signer_id {
                if tables.signer(&signer_id)?.document_id != field.document_id {
                    return Err(Error::validation("Signer does not belong to this document"));
                }
                field.signer_id = Some(signer_id);
            }
            validate_geometry(&field, document)?;
            tables.insert_field(field.clone());
            Ok(field)
        })
    }

    pub fn delete(&self, caller: &Caller, field_id: &str) -> Result<()> {
        self.engine.store().transaction(|tables| {
            let document_id = tables.field(field_id)?.document_id.clone();
            let document = tables.document(&document_id)?;
            authorize_owner(document, caller)?;
            require_draft(document, "delete fields")?;
            tables.remove_field(field_id)?;
            Ok(())
        })
    }

    /// Fields of a document, for the owner and its signers.
    pub fn list(&self, caller: &Caller, document_id: &str) -> Result<Vec<Field>> {
        self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)?;
            Ok(tables.fields_of_document(document_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DocumentStatus, SigningOrder};
    use chrono::Utc;

    fn document(page_count: u32) -> Document {
        Document {
            id: "d1".to_owned(),
            title: "Contract".to_owned(),
            blob_key: "d1.pdf".to_owned(),
            file_size: 1,
            page_count,
            owner_id: "owner".to_owned(),
            status: DocumentStatus::Draft,
            signing_order: SigningOrder::Parallel,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            declined_at: None,
            declined_by: None,
            decline_reason: None,
        }
    }

    fn field(page: u32, x: f64, y: f64, w: f64, h: f64) -> Field {
        Field {
            id: "f1".to_owned(),
            document_id: "d1".to_owned(),
            field_type: FieldType::Signature,
            page_number: page,
            position_x: x,
            position_y: y,
            width: w,
            height: h,
            signer_id: None,
            value: None,
            is_required: true,
            placeholder: None,
        }
    }

    #[test]
    fn test_geometry_inside_page_is_accepted() {
        let doc = document(2);
        assert!(validate_geometry(&field(1, 10.0, 80.0, 30.0, 8.0), &doc).is_ok());
        assert!(validate_geometry(&field(2, 70.0, 92.0, 30.0, 8.0), &doc).is_ok());
    }

    #[test]
    fn test_geometry_outside_page_is_rejected() {
        let doc = document(2);
        for bad in [
            field(1, -1.0, 10.0, 10.0, 10.0),
            field(1, 10.0, 101.0, 1.0, 1.0),
            field(1, 80.0, 10.0, 30.0, 10.0),
            field(1, 10.0, 95.0, 10.0, 10.0),
            field(1, f64::NAN, 10.0, 10.0, 10.0),
            field(1, 10.0, 10.0, 0.0, 10.0),
            field(0, 10.0, 10.0, 10.0, 10.0),
            field(3, 10.0, 10.0, 10.0, 10.0),
        ] {
            assert!(
                matches!(validate_geometry(&bad, &doc), Err(Error::Validation(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_new_field_defaults_to_required() {
        let new: NewField = serde_json::from_str(
            r#"{"type":"SIGNATURE","pageNumber":1,"positionX":1,"positionY":2,"width":3,"height":4}"#,
        )
        .unwrap();
        assert!(new.is_required);
        assert_eq!(new.signer_id, None);
    }
}
