use crate::pdf_object::inherited;
use crate::rectangle::Rectangle;
use crate::Error;
use lopdf::{Document, Object, ObjectId};

/// US Letter, used when a page carries no media box at all.
const DEFAULT_MEDIA_BOX: Rectangle = Rectangle {
    x1: 0.0,
    y1: 0.0,
    x2: 612.0,
    y2: 792.0,
};

pub(crate) fn as_number(obj: &Object) -> Result<f64, Error> {
    match *obj {
        Object::Integer(value) => Ok(value as f64),
        Object::Real(value) => Ok(value as f64),
        _ => Err(Error::Pdf(lopdf::Error::Type)),
    }
}

pub(crate) fn as_rectangle(obj: &Object) -> Result<Rectangle, Error> {
    let list = obj.as_array()?;
    if list.len() < 4 {
        return Err(Error::Pdf(lopdf::Error::Type));
    }
    let (a, b, c, d) = (
        as_number(&list[0])?,
        as_number(&list[1])?,
        as_number(&list[2])?,
        as_number(&list[3])?,
    );
    // Normalise, the corners may be given in any order.
    Ok(Rectangle {
        x1: a.min(c),
        y1: b.min(d),
        x2: a.max(c),
        y2: b.max(d),
    })
}

/// Visible area of a page, following inheritance through the page tree.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> Result<Rectangle, Error> {
    let page = doc.get_object(page_id)?.as_dict()?;
    let media_box = match inherited(doc, page, b"CropBox")? {
        Some(crop_box) => Some(crop_box),
        None => inherited(doc, page, b"MediaBox")?,
    };
    match media_box {
        Some(media_box) => as_rectangle(media_box),
        None => {
            log::warn!("Page {:?} has no MediaBox, assuming US Letter", page_id);
            Ok(DEFAULT_MEDIA_BOX)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    #[test]
    fn test_media_box_is_inherited_from_pages_node() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
            }),
        );
        let rect = media_box(&doc, page_id).unwrap();
        assert_eq!(rect.width(), 595.0);
        assert_eq!(rect.height(), 842.0);
    }

    #[test]
    fn test_rectangle_corners_are_normalised() {
        let obj = Object::Array(vec![
            Object::Integer(100),
            Object::Integer(200),
            Object::Integer(0),
            Object::Integer(0),
        ]);
        let rect = as_rectangle(&obj).unwrap();
        assert_eq!((rect.x1, rect.y1, rect.x2, rect.y2), (0.0, 0.0, 100.0, 200.0));
    }
}
