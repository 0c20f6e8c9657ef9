use esign_engine::config::{Config, MasterKey};
use esign_engine::fields::NewField;
use esign_engine::invite::{InviteRequest, SignerRequest};
use esign_engine::lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document as PdfDocument, Object, Stream,
};
use esign_engine::model::{FieldType, SigningOrder};
use esign_engine::storage::Storage;
use esign_engine::users::{Caller, InMemoryUserDirectory};
use esign_engine::workflow::FieldValue;
use esign_engine::Engine;
use std::{fs::File, io::Write, sync::Arc};

fn main() {
    env_logger::init();

    // Pass a PDF path to sign your own file, otherwise a one page letter is used.
    let pdf_data = match std::env::args().nth(1) {
        Some(path) => std::fs::read(path).unwrap(),
        None => letter_pdf(),
    };

    let users = Arc::new(InMemoryUserDirectory::new());
    let owner = Caller::from(&users.register("1", "olivia@test.com", "Olivia").unwrap());
    users.register("9", "alice@test.com", "Alice").unwrap();

    let config = Config::new(MasterKey::new([7u8; 32]), "http://localhost:3000");
    let engine = Engine::new(config, Storage::memory(), users).unwrap();

    let document = engine
        .documents()
        .upload(&owner, "agreement.pdf", &pdf_data, Some("Service agreement"))
        .unwrap();

    // Alice is registered and gets a digital signature, Bob only a clickwrap row.
    let mut request = InviteRequest {
        signing_order: SigningOrder::Sequential,
        ..InviteRequest::default()
    };
    for (index, (email, name)) in [("alice@test.com", "Alice"), ("bob@test.com", "Bob")]
        .iter()
        .enumerate()
    {
        let field = engine
            .fields()
            .create(
                &owner,
                &document.id,
                NewField::new(
                    FieldType::Signature,
                    1,
                    (10.0 + 45.0 * index as f64, 80.0, 35.0, 8.0),
                ),
            )
            .unwrap();
        request.signers.push(SignerRequest::new(*email, *name));
        request.field_assignments.insert(field.id, email.to_string());
    }
    let invited = engine.invites().invite(&owner, &document.id, &request).unwrap();

    let signature = signature_data_url();
    for signer in &invited.signers {
        let url = signer.signing_url.as_deref().unwrap();
        println!("{} signs at {}", signer.name, url);
        let token = url.rsplit('/').next().unwrap();
        let session = engine.workflow().session(token).unwrap();
        let values: Vec<FieldValue> = session
            .fields
            .iter()
            .map(|field| FieldValue::new(field.id.clone(), signature.clone()))
            .collect();
        engine.workflow().complete(token, &values).unwrap();
    }

    let report = engine.verifier().public(&document.id).unwrap();
    println!(
        "{}: {} ({}/{} signatures valid)",
        report.document_title, report.message, report.valid_signatures, report.total_signatures
    );

    let signed = engine.composer().download(&owner, &document.id).unwrap();
    let mut pdf_file = File::create(format!("./demos/{}", signed.file_name)).unwrap();
    pdf_file.write_all(&signed.bytes).unwrap();

    let verified = engine
        .composer()
        .verification_artifact(&owner, &document.id)
        .unwrap();
    let mut pdf_file = File::create(format!("./demos/{}", verified.file_name)).unwrap();
    pdf_file.write_all(&verified.bytes).unwrap();
}

/// A blue scribble on a transparent background.
fn signature_data_url() -> String {
    let (width, height) = (120u32, 40u32);
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    for x in 0..width {
        let y = (height as f32 / 2.0 + (x as f32 / 8.0).sin() * 12.0) as u32;
        let offset = ((y * width + x) * 4) as usize;
        pixels[offset..offset + 4].copy_from_slice(&[20, 40, 160, 255]);
    }
    let mut png_data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_data, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&pixels).unwrap();
    }
    format!("data:image/png;base64,{}", base64::encode(png_data))
}

fn letter_pdf() -> Vec<u8> {
    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Times-Roman",
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 24.into()]),
            Operation::new("Td", vec![72.into(), 700.into()]),
            Operation::new("Tj", vec![Object::string_literal("Service agreement")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
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
