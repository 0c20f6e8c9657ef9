#![allow(dead_code)]

use esign_engine::config::{Config, MasterKey};
use esign_engine::fields::NewField;
use esign_engine::invite::{InviteRequest, SignerRequest};
use esign_engine::lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document as PdfDocument, Object, Stream,
};
use esign_engine::model::{Document, Field, FieldType};
use esign_engine::storage::{MemoryBlobStore, Storage};
use esign_engine::users::{Caller, InMemoryUserDirectory};
use esign_engine::Engine;
use std::sync::Arc;

pub const FRONTEND: &str = "https://sign.example.com";

pub struct Harness {
    pub engine: Engine,
    pub users: Arc<InMemoryUserDirectory>,
    pub blobs: Arc<MemoryBlobStore>,
    pub owner: Caller,
}

pub fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let users = Arc::new(InMemoryUserDirectory::new());
    let owner = users
        .register("owner-1", "owner@example.com", "Olivia Owner")
        .unwrap();
    let blobs = Arc::new(MemoryBlobStore::new());
    let config = Config::new(MasterKey::new([42u8; 32]), FRONTEND);
    let engine = Engine::new(config, Storage::Memory(blobs.clone()), users.clone()).unwrap();
    Harness {
        engine,
        users,
        blobs,
        owner: Caller::from(&owner),
    }
}

impl Harness {
    /// Register an account and return it as a caller.
    pub fn register(&self, id: &str, email: &str, name: &str) -> Caller {
        Caller::from(&self.users.register(id, email, name).unwrap())
    }

    pub fn upload(&self, pages: u32, title: &str) -> Document {
        self.engine
            .documents()
            .upload(&self.owner, "contract.pdf", &fixture_pdf(pages), Some(title))
            .unwrap()
    }

    pub fn signature_field(&self, document_id: &str, page: u32, y: f64) -> Field {
        self.engine
            .fields()
            .create(
                &self.owner,
                document_id,
                NewField::new(FieldType::Signature, page, (10.0, y, 30.0, 8.0)),
            )
            .unwrap()
    }

    /// Invite `signers` (email, name) and give each one its own signature field.
    /// Returns the signing tokens in invitation order.
    pub fn invite_with_fields(&self, document_id: &str, signers: &[(&str, &str)]) -> Vec<String> {
        let mut request = InviteRequest::default();
        for (index, (email, name)) in signers.iter().enumerate() {
            let field = self.signature_field(document_id, 1, 10.0 + 10.0 * index as f64);
            request.signers.push(SignerRequest::new(*email, *name));
            request
                .field_assignments
                .insert(field.id, (*email).to_owned());
        }
        let response = self
            .engine
            .invites()
            .invite(&self.owner, document_id, &request)
            .unwrap();
        response
            .signers
            .iter()
            .map(|signer| token_of(signer.signing_url.as_deref().unwrap()))
            .collect()
    }

    /// Fill every field of the token's session with a PNG and complete.
    pub fn sign(&self, token: &str) -> esign_engine::workflow::CompletionResponse {
        let values = self.values_for(token);
        self.engine.workflow().complete(token, &values).unwrap()
    }

    pub fn values_for(&self, token: &str) -> Vec<esign_engine::workflow::FieldValue> {
        let session = self.engine.workflow().session(token).unwrap();
        session
            .fields
            .iter()
            .map(|field| esign_engine::workflow::FieldValue::new(field.id.clone(), png_data_url()))
            .collect()
    }

    pub fn blob(&self, document: &Document) -> Vec<u8> {
        use esign_engine::storage::BlobStore;
        self.blobs.download(&document.blob_key).unwrap()
    }
}

pub fn token_of(signing_url: &str) -> String {
    signing_url
        .rsplit('/')
        .next()
        .unwrap()
        .to_owned()
}

/// A small black PNG with an alpha channel.
pub fn png_data_url() -> String {
    let mut png = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png, 4, 2);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 0, 0, 255].repeat(8)).unwrap();
    }
    format!("data:image/png;base64,{}", base64::encode(png))
}

/// A letter sized PDF with `pages` pages of text.
pub fn fixture_pdf(pages: u32) -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let mut kids = Vec::new();
    for number in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 18.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Agreement page {}", number))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}
