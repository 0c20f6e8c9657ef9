//! Reusable visual signatures. A user with templates always has exactly one
//! default.

use crate::data_url::validate_signature_image;
use crate::model::{SignatureTemplate, TemplateKind};
use crate::store::Tables;
use crate::users::Caller;
use crate::{Engine, Error, Result};
use chrono::Utc;
use uuid::Uuid;

/// Template of `caller`, `NotFound` for anyone else's so ids can not be probed.
fn owned<'t>(
    tables: &'t Tables,
    caller: &Caller,
    template_id: &str,
) -> Result<&'t SignatureTemplate> {
    tables
        .template(template_id)
        .filter(|template| template.user_id == caller.user_id)
        .ok_or_else(|| Error::not_found("Signature not found"))
}

#[derive(Clone, Copy)]
pub struct SignatureTemplates<'a> {
    engine: &'a Engine,
}

impl<'a> SignatureTemplates<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Store a new template. The first one of a user becomes the default.
    pub fn create(
        &self,
        caller: &Caller,
        kind: TemplateKind,
        image_data: &str,
        name: Option<&str>,
    ) -> Result<SignatureTemplate> {
        validate_signature_image(image_data)?;
        self.engine.store().transaction(|tables| {
            let template = SignatureTemplate {
                id: Uuid::new_v4().to_string(),
                user_id: caller.user_id.clone(),
                kind,
                image_data: image_data.trim().to_owned(),
                name: name.map(str::trim).filter(|name| !name.is_empty()).map(str::to_owned),
                is_default: tables.templates_of_user(&caller.user_id).is_empty(),
                created_at: Utc::now(),
            };
            tables.upsert_template(template.clone());
            Ok(template)
        })
    }

    /// Templates of the caller, oldest first.
    pub fn list(&self, caller: &Caller) -> Vec<SignatureTemplate> {
        self.engine
            .store()
            .read(|tables| tables.templates_of_user(&caller.user_id))
    }

    pub fn get(&self, caller: &Caller, template_id: &str) -> Result<SignatureTemplate> {
        self.engine
            .store()
            .read(|tables| owned(tables, caller, template_id).cloned())
    }

    pub fn default_for(&self, caller: &Caller) -> Option<SignatureTemplate> {
        self.list(caller).into_iter().find(|template| template.is_default)
    }

    pub fn rename(
        &self,
        caller: &Caller,
        template_id: &str,
        name: Option<&str>,
    ) -> Result<SignatureTemplate> {
        self.engine.store().transaction(|tables| {
            let mut template = owned(tables, caller, template_id)?.clone();
            template.name = name.map(str::trim).filter(|name| !name.is_empty()).map(str::to_owned);
            tables.upsert_template(template.clone());
            Ok(template)
        })
    }

    pub fn set_default(&self, caller: &Caller, template_id: &str) -> Result<SignatureTemplate> {
        self.engine.store().transaction(|tables| {
            owned(tables, caller, template_id)?;
            tables.set_default_template(&caller.user_id, template_id);
            Ok(owned(tables, caller, template_id)?.clone())
        })
    }

    /// Delete a template. When it was the default, the oldest remaining one
    /// takes over.
    pub fn delete(&self, caller: &Caller, template_id: &str) -> Result<()> {
        self.engine.store().transaction(|tables| {
            let was_default = owned(tables, caller, template_id)?.is_default;
            tables.remove_template(template_id);
            if was_default {
                if let Some(next) = tables.templates_of_user(&caller.user_id).first() {
                    tables.set_default_template(&caller.user_id, &next.id);
                }
            }
            Ok(())
        })
    }
}
