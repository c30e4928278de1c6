//! Media type classification.
//!
//! The kernel labels rich output with media types while the document stores
//! each representation under a short attribute name. The table is fixed: a
//! media type outside it is an error, never silently dropped.

use nbrun_format::DisplayField;

use crate::error::{Error, Result};

/// Every media type the document can store, with its attribute.
pub const MIME_MAP: &[(&str, DisplayField)] = &[
    ("image/jpeg", DisplayField::Jpeg),
    ("image/png", DisplayField::Png),
    ("text/plain", DisplayField::Text),
    ("text/html", DisplayField::Html),
    ("text/latex", DisplayField::Latex),
    ("application/javascript", DisplayField::Html),
];

/// Map a media type to the attribute it is stored under.
pub fn classify(media_type: &str) -> Result<DisplayField> {
    MIME_MAP
        .iter()
        .find(|(mime, _)| *mime == media_type)
        .map(|(_, field)| *field)
        .ok_or_else(|| Error::UnsupportedMediaType(media_type.to_string()))
}
