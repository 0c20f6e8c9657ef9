use crate::image_xobject::ImageXObject;
use crate::pdf_object::{inherited, PdfObjectDeref};
use crate::rectangle::Rectangle;
use crate::Error;
use lopdf::{
    content::{Content, Operation},
    dictionary, Dictionary, Document, Object, ObjectId, Stream,
};

/// Drawing primitives on top of a loaded PDF. Everything is appended, the
/// original page content is never rewritten.
pub(crate) trait StampPage {
    /// Add a PNG as image XObject (plus soft mask for transparency).
    /// The image will not be visible until it is drawn on a page.
    fn add_png_image(&mut self, png: &[u8]) -> Result<ObjectId, Error>;

    /// Add a Form XObject with its own resources. `content` draws in
    /// `0 0 width height` space and is clipped to it.
    fn add_form_xobject(
        &mut self,
        resources: Dictionary,
        width: f32,
        height: f32,
        content: Content<Vec<Operation>>,
    ) -> Result<ObjectId, Error>;

    /// Register an XObject under `name` in the resources of a page.
    fn add_xobject_to_page(
        &mut self,
        page_id: ObjectId,
        name: &str,
        xobject_id: ObjectId,
    ) -> Result<(), Error>;

    /// Append a content stream to a page. With `isolate_existing` the current
    /// content is wrapped in `q ... Q` first so its graphics state can not leak.
    fn append_page_content(
        &mut self,
        page_id: ObjectId,
        content: Content<Vec<Operation>>,
        isolate_existing: bool,
    ) -> Result<(), Error>;
}

impl StampPage for Document {
    fn add_png_image(&mut self, png: &[u8]) -> Result<ObjectId, Error> {
        let (mut image_xobject, mask_xobject) = ImageXObject::from_png(png)?;
        // Add object to object list
        if let Some(mask_xobject) = mask_xobject {
            let mask_xobject_id = self.add_object(mask_xobject);
            image_xobject.s_mask = Some(mask_xobject_id);
        }
        Ok(self.add_object(image_xobject))
    }

    fn add_form_xobject(
        &mut self,
        resources: Dictionary,
        width: f32,
        height: f32,
        content: Content<Vec<Operation>>,
    ) -> Result<ObjectId, Error> {
        let form_xobject = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "Resources" => resources,
            "BBox" => vec![Object::Integer(0), Object::Integer(0), width.into(), height.into()],
        };
        let content_data = content.encode()?;
        Ok(self.add_object(Stream::new(form_xobject, content_data)))
    }

    fn add_xobject_to_page(
        &mut self,
        page_id: ObjectId,
        name: &str,
        xobject_id: ObjectId,
    ) -> Result<(), Error> {
        // A page without own resources inherits them. Copy them down before
        // adding ours, otherwise the inherited fonts of the page would be hidden.
        let inherited_resources = {
            let page = self.get_object(page_id)?.as_dict()?;
            if page.has(b"Resources") {
                None
            } else {
                Some(
                    inherited(self, page, b"Resources")?
                        .and_then(|resources| resources.as_dict().ok())
                        .cloned()
                        .unwrap_or_default(),
                )
            }
        };
        if let Some(resources) = inherited_resources {
            self.get_object_mut(page_id)?
                .as_dict_mut()?
                .set("Resources", resources);
        }
        self.add_xobject(page_id, name, xobject_id)?;
        Ok(())
    }

    fn append_page_content(
        &mut self,
        page_id: ObjectId,
        content: Content<Vec<Operation>>,
        isolate_existing: bool,
    ) -> Result<(), Error> {
        let mut contents = {
            let page = self.get_object(page_id)?.as_dict()?;
            match page.get(b"Contents") {
                Ok(contents) => match contents.deref(self)? {
                    Object::Array(list) => list.clone(),
                    _ => contents.get_object_id().map(Object::from).into_iter().collect(),
                },
                Err(_) => Vec::new(),
            }
        };

        if isolate_existing && !contents.is_empty() {
            let save_id = self.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let restore_id = self.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
            contents.insert(0, save_id.into());
            contents.push(restore_id.into());
        }
        let stream_id = self.add_object(Stream::new(Dictionary::new(), content.encode()?));
        contents.push(stream_id.into());

        self.get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Contents", contents);
        Ok(())
    }
}

/// `q <matrix> cm /name Do Q`
pub(crate) fn draw_xobject(name: &str, matrix: [f32; 6]) -> Content<Vec<Operation>> {
    let mut content = Content {
        operations: Vec::<Operation>::new(),
    };
    // The following lines use commands: see p643 (Table A.1) for more info
    // `q` = Save graphics state
    content.operations.push(Operation::new("q", vec![]));
    // `cm` = Concatenate matrix to current transformation matrix
    content.operations.push(Operation::new(
        "cm",
        matrix.iter().map(|value| (*value).into()).collect(),
    ));
    // `Do` = Invoke named XObject
    content
        .operations
        .push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
    // `Q` = Restore graphics state
    content.operations.push(Operation::new("Q", vec![]));
    content
}

/// Scale the unit square of an image onto `rect`.
pub(crate) fn image_matrix(rect: &Rectangle) -> [f32; 6] {
    [
        rect.width() as f32,
        0.0,
        0.0,
        rect.height() as f32,
        rect.x1 as f32,
        rect.y1 as f32,
    ]
}

/// Move a form's origin onto the lower left corner of `rect`.
pub(crate) fn translate_matrix(rect: &Rectangle) -> [f32; 6] {
    [1.0, 0.0, 0.0, 1.0, rect.x1 as f32, rect.y1 as f32]
}

/// Standard 14 Helvetica in WinAnsi encoding, usable without embedding.
pub(crate) fn helvetica() -> Dictionary {
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Encode text for a WinAnsi simple font. Characters outside Latin-1 become `?`.
pub(crate) fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_page_document(content: &[u8]) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(612), Object::Integer(792)],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F9" => helvetica() },
                },
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_existing_content_is_wrapped() {
        let (mut doc, page_id) = one_page_document(b"1 0 0 RG");
        doc.append_page_content(page_id, draw_xobject("X", [1.0, 0.0, 0.0, 1.0, 0.0, 0.0]), true)
            .unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 4);
        let first = doc
            .get_object(contents[0].as_reference().unwrap())
            .unwrap()
            .as_stream()
            .unwrap();
        assert_eq!(first.content, b"q\n".to_vec());
    }

    #[test]
    fn test_xobject_keeps_inherited_resources() {
        let (mut doc, page_id) = one_page_document(b"");
        let form_id = doc
            .add_form_xobject(Dictionary::new(), 10.0, 10.0, Content { operations: vec![] })
            .unwrap();
        doc.add_xobject_to_page(page_id, "Form1", form_id).unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"Font").unwrap().as_dict().unwrap().has(b"F9"));
        assert!(resources.get(b"XObject").unwrap().as_dict().unwrap().has(b"Form1"));
    }

    #[test]
    fn test_win_ansi_replaces_unknown_characters() {
        assert_eq!(win_ansi("Zoë ✓"), vec![b'Z', b'o', 0xEB, b' ', b'?']);
    }
}
