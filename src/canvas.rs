use crate::crypto;
use crate::data_url::{DataUrl, PNG, SVG};
use crate::lopdf_utils::media_box;
use crate::model::Field;
use crate::page_stamp::{
    draw_xobject, helvetica, image_matrix, translate_matrix, win_ansi, StampPage,
};
use crate::rectangle::Rectangle;
use crate::Error;
use lopdf::{
    content::{Content, Operation},
    dictionary, Document, Object, ObjectId,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Edge of the QR code in points.
const QR_SIZE: f32 = 80.0;
/// Distance of the QR code from the right and bottom edges of the page.
const QR_MARGIN: f32 = 30.0;
const QR_PADDING: f32 = 5.0;
const QR_CAPTION_SPACE: f32 = 25.0;
const QR_CAPTION: &str = "Scan to verify";
const QR_CAPTION_SIZE: f32 = 8.0;
/// Helvetica advance widths of the caption at 8 pt.
const QR_CAPTION_WIDTH: f32 = 48.46;
const MAX_TEXT_SIZE: f64 = 12.0;

/// What happened to one field while composing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drawn {
    Image,
    Text,
    Skipped,
}

/// A PDF being composed. Only ever appends to the loaded document.
#[derive(Debug, Clone)]
pub(crate) struct PdfCanvas {
    raw_document: Document,
    /// 1-indexed page number to page object.
    pages: BTreeMap<u32, ObjectId>,
    /// Link between the hash of an image and the objectId of the image.
    /// This is used to reduce the amount of copies of the images in the pdf file.
    image_object_ids: HashMap<String, ObjectId>,
    /// Pages whose original content is already wrapped in `q ... Q`.
    isolated_pages: HashSet<ObjectId>,
    next_xobject: usize,
}

impl PdfCanvas {
    pub fn load(bytes: &[u8]) -> Result<Self, Error> {
        let raw_document = Document::load_mem(bytes)?;
        let pages = raw_document.get_pages();
        Ok(Self {
            raw_document,
            pages,
            image_object_ids: HashMap::new(),
            isolated_pages: HashSet::new(),
            next_xobject: 0,
        })
    }

    #[cfg(test)]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Draw the value of a field at its recorded position.
    /// Fields that can not be drawn are skipped with a warning.
    pub fn draw_field(&mut self, field: &Field) -> Result<Drawn, Error> {
        let value = match field.value.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => return Ok(Drawn::Skipped),
        };
        let page_id = match self.pages.get(&field.page_number) {
            Some(page_id) => *page_id,
            None => {
                log::warn!(
                    "Field {} is on page {} but the document has {} pages, skipping",
                    field.id,
                    field.page_number,
                    self.pages.len()
                );
                return Ok(Drawn::Skipped);
            }
        };
        let page_box = media_box(&self.raw_document, page_id)?;
        let rect = Rectangle::from_percentages(
            &page_box,
            field.position_x,
            field.position_y,
            field.width,
            field.height,
        );

        match DataUrl::parse(value) {
            Some(url) if url.mime == PNG => {
                self.add_image(&url, page_id, rect)?;
                Ok(Drawn::Image)
            }
            Some(url) if url.mime == SVG => {
                log::warn!(
                    "Field {} holds an SVG signature which can not be rasterised, skipping",
                    field.id
                );
                Ok(Drawn::Skipped)
            }
            Some(url) if url.is_image() => {
                log::warn!(
                    "Field {} holds unsupported image type {}, skipping",
                    field.id,
                    url.mime
                );
                Ok(Drawn::Skipped)
            }
            _ if field.field_type.is_image() => {
                log::warn!("Field {} has no image value, skipping", field.id);
                Ok(Drawn::Skipped)
            }
            _ => {
                self.add_text(value, page_id, rect)?;
                Ok(Drawn::Text)
            }
        }
    }

    /// Stamp a QR code for `url` in the bottom right corner of the last page.
    pub fn stamp_verification_qr(&mut self, url: &str) -> Result<(), Error> {
        let (_, page_id) = self
            .pages
            .iter()
            .next_back()
            .map(|(number, id)| (*number, *id))
            .ok_or_else(|| Error::validation("PDF has no pages"))?;
        let page_box = media_box(&self.raw_document, page_id)?;

        let qr_png = crate::qr::generate_png(url)?;
        let qr_image_id = self.raw_document.add_png_image(&qr_png)?;

        let width = QR_SIZE + 2.0 * QR_PADDING;
        let height = QR_SIZE + 2.0 * QR_PADDING + QR_CAPTION_SPACE;
        let resources = dictionary! {
            "Font" => dictionary! { "Helv" => helvetica() },
            "XObject" => dictionary! { "QrImg" => qr_image_id },
        };
        let mut content = Content {
            operations: Vec::<Operation>::new(),
        };
        // White backing with a light gray border.
        content.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("g", vec![1.0f32.into()]),
            Operation::new("G", vec![0.7f32.into()]),
            Operation::new("w", vec![0.5f32.into()]),
            Operation::new(
                "re",
                vec![0.0f32.into(), 0.0f32.into(), width.into(), height.into()],
            ),
            Operation::new("B", vec![]),
            Operation::new("Q", vec![]),
        ]);
        content.operations.extend(
            draw_xobject(
                "QrImg",
                [QR_SIZE, 0.0, 0.0, QR_SIZE, QR_PADDING, QR_PADDING],
            )
            .operations,
        );
        content.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"Helv".to_vec()), QR_CAPTION_SIZE.into()],
            ),
            Operation::new("g", vec![0.3f32.into()]),
            Operation::new(
                "Td",
                vec![
                    ((width - QR_CAPTION_WIDTH) / 2.0).into(),
                    (QR_PADDING + QR_SIZE + (QR_CAPTION_SPACE - QR_CAPTION_SIZE) / 2.0).into(),
                ],
            ),
            Operation::new("Tj", vec![Object::string_literal(QR_CAPTION)]),
            Operation::new("ET", vec![]),
        ]);
        let stamp_id = self
            .raw_document
            .add_form_xobject(resources, width, height, content)?;

        let origin = Rectangle {
            x1: page_box.x2 - f64::from(QR_MARGIN + QR_SIZE + QR_PADDING),
            y1: page_box.y1 + f64::from(QR_MARGIN - QR_PADDING),
            x2: page_box.x2 - f64::from(QR_MARGIN - QR_PADDING),
            y2: page_box.y1 + f64::from(QR_MARGIN + QR_SIZE + QR_PADDING + QR_CAPTION_SPACE),
        };
        self.place_xobject("VerifyQr", stamp_id, page_id, translate_matrix(&origin))?;
        log::debug!("Stamped verification QR on page {:?}", page_id);
        Ok(())
    }

    pub fn finished(mut self) -> Result<Vec<u8>, Error> {
        let mut bytes = Vec::new();
        self.raw_document.save_to(&mut bytes)?;
        Ok(bytes)
    }

    fn add_image(
        &mut self,
        url: &DataUrl<'_>,
        page_id: ObjectId,
        rect: Rectangle,
    ) -> Result<(), Error> {
        let png = url.decode()?;
        let image_key = crypto::hash(&png);
        let image_object_id = match self.image_object_ids.get(&image_key) {
            // Image was already added so we can reuse it.
            Some(image_object_id) => *image_object_id,
            None => {
                let image_object_id = self.raw_document.add_png_image(&png)?;
                self.image_object_ids.insert(image_key, image_object_id);
                image_object_id
            }
        };
        let name = self.next_name("Sig");
        self.place_xobject(&name, image_object_id, page_id, image_matrix(&rect))
    }

    fn add_text(&mut self, text: &str, page_id: ObjectId, rect: Rectangle) -> Result<(), Error> {
        let (width, height) = (rect.width() as f32, rect.height() as f32);
        let size = (rect.height() * 0.6).min(MAX_TEXT_SIZE) as f32;
        let resources = dictionary! {
            "Font" => dictionary! { "Helv" => helvetica() },
        };
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![Object::Name(b"Helv".to_vec()), size.into()]),
                Operation::new("g", vec![0.0f32.into()]),
                Operation::new(
                    "Td",
                    vec![2.0f32.into(), ((height - size) / 2.0 + size * 0.2).into()],
                ),
                Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]),
                Operation::new("ET", vec![]),
            ],
        };
        let form_id = self
            .raw_document
            .add_form_xobject(resources, width, height, content)?;
        let name = self.next_name("Txt");
        self.place_xobject(&name, form_id, page_id, translate_matrix(&rect))
    }

    fn place_xobject(
        &mut self,
        name: &str,
        xobject_id: ObjectId,
        page_id: ObjectId,
        matrix: [f32; 6],
    ) -> Result<(), Error> {
        self.raw_document
            .add_xobject_to_page(page_id, name, xobject_id)?;
        let isolate = self.isolated_pages.insert(page_id);
        self.raw_document
            .append_page_content(page_id, draw_xobject(name, matrix), isolate)
    }

    fn next_name(&mut self, prefix: &str) -> String {
        self.next_xobject += 1;
        format!("{}{}", prefix, self.next_xobject)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::image_xobject::tests::encode_png;
    use crate::model::FieldType;
    use lopdf::{Dictionary, Stream};

    /// A minimal PDF with `pages` letter sized pages, each with a bit of text.
    pub(crate) fn fixture_pdf(pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(helvetica());
        let mut kids = Vec::new();
        for number in 1..=pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Page {}", number))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
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

    pub(crate) fn png_data_url() -> String {
        let png = encode_png(2, 2, png::ColorType::Rgba, &[0, 0, 0, 255].repeat(4));
        format!("data:image/png;base64,{}", base64::encode(png))
    }

    fn field(page: u32, value: &str) -> Field {
        Field {
            id: format!("f{}", page),
            document_id: "d1".to_owned(),
            field_type: FieldType::Signature,
            page_number: page,
            position_x: 10.0,
            position_y: 80.0,
            width: 30.0,
            height: 8.0,
            signer_id: None,
            value: Some(value.to_owned()),
            is_required: true,
            placeholder: None,
        }
    }

    fn xobject_names(doc: &Document, page_id: ObjectId) -> Vec<String> {
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        resources
            .get(b"XObject")
            .unwrap()
            .as_dict()
            .unwrap()
            .iter()
            .map(|(name, _)| String::from_utf8_lossy(name).into_owned())
            .collect()
    }

    #[test]
    fn test_image_is_drawn_on_its_page() {
        let mut canvas = PdfCanvas::load(&fixture_pdf(2)).unwrap();
        assert_eq!(canvas.page_count(), 2);
        assert_eq!(canvas.draw_field(&field(2, &png_data_url())).unwrap(), Drawn::Image);

        let bytes = canvas.finished().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(xobject_names(&doc, pages[&2]), vec!["Sig1".to_owned()]);
        let content = doc.get_page_content(pages[&2]).unwrap();
        let text = String::from_utf8_lossy(&content);
        assert!(text.contains("/Sig1 Do"));
        assert!(text.starts_with("q"));
    }

    #[test]
    fn test_same_image_is_stored_once() {
        let mut canvas = PdfCanvas::load(&fixture_pdf(2)).unwrap();
        let url = png_data_url();
        canvas.draw_field(&field(1, &url)).unwrap();
        canvas.draw_field(&field(2, &url)).unwrap();
        assert_eq!(canvas.image_object_ids.len(), 1);
    }

    #[test]
    fn test_out_of_range_page_and_svg_are_skipped() {
        let mut canvas = PdfCanvas::load(&fixture_pdf(1)).unwrap();
        assert_eq!(canvas.draw_field(&field(5, &png_data_url())).unwrap(), Drawn::Skipped);
        let svg = format!("data:image/svg+xml;base64,{}", base64::encode("<svg/>"));
        assert_eq!(canvas.draw_field(&field(1, &svg)).unwrap(), Drawn::Skipped);
    }

    #[test]
    fn test_text_value_is_drawn() {
        let mut canvas = PdfCanvas::load(&fixture_pdf(1)).unwrap();
        let mut date = field(1, "2024-05-01");
        date.field_type = FieldType::Date;
        assert_eq!(canvas.draw_field(&date).unwrap(), Drawn::Text);
    }

    #[test]
    fn test_qr_lands_on_last_page() {
        let mut canvas = PdfCanvas::load(&fixture_pdf(3)).unwrap();
        canvas
            .stamp_verification_qr("http://localhost:5556/verify/d1")
            .unwrap();
        let bytes = canvas.finished().unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(xobject_names(&doc, pages[&3]), vec!["VerifyQr".to_owned()]);
        assert!(doc
            .get_object(pages[&1])
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Resources")
            .is_err());
    }

    #[test]
    fn test_non_pdf_is_rejected() {
        assert!(PdfCanvas::load(b"plain text").is_err());
    }
}
