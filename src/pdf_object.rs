use crate::Error;
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Page tree nesting deeper than this is treated as a reference cycle.
const MAX_PAGE_TREE_DEPTH: usize = 32;

pub(crate) trait PdfObjectDeref {
    fn deref<'a>(&'a self, doc: &'a Document) -> Result<&'a Object, Error>;

    fn get_object_id(&self) -> Option<ObjectId>;
}

impl PdfObjectDeref for Object {
    fn deref<'a>(&'a self, doc: &'a Document) -> Result<&'a Object, Error> {
        match *self {
            Object::Reference(oid) => Ok(doc.get_object(oid)?),
            _ => Ok(self),
        }
    }

    fn get_object_id(&self) -> Option<ObjectId> {
        match *self {
            Object::Reference(ref id) => Some(*id),
            _ => None,
        }
    }
}

/// Look up a page attribute that may be inherited from an ancestor in the page
/// tree (`MediaBox`, `Resources`, `Rotate`, ...).
pub(crate) fn inherited<'a>(
    doc: &'a Document,
    page: &'a Dictionary,
    key: &[u8],
) -> Result<Option<&'a Object>, Error> {
    let mut node = page;
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Ok(Some(value.deref(doc)?));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = parent.deref(doc)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
    log::warn!("Page tree is deeper than {} levels", MAX_PAGE_TREE_DEPTH);
    Ok(None)
}
