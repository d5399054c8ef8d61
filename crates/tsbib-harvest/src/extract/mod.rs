//! Source payloads into [`RawFields`]. The payload format is declared per
//! endpoint and never sniffed.

mod archive;
mod atom;
mod crossref;
pub mod fields;
mod html;

pub use archive::extract_archive;
pub use atom::extract_atom;
pub use crossref::extract_crossref;
pub use fields::{Extraction, Field, RawFields};
pub use html::extract_html;

use tsbib_core::SourceFormat;

use crate::error::ExtractionError;
use crate::fetch::RawPayload;

pub fn extract(payload: &RawPayload, format: SourceFormat) -> Result<Extraction, ExtractionError> {
    match format {
        SourceFormat::Html => Ok(Extraction {
            records: vec![extract_html(&payload.body, &payload.url)?],
            rejected: Vec::new(),
        }),
        SourceFormat::ArxivAtom => extract_atom(&payload.body),
        SourceFormat::CrossrefJson => extract_crossref(&payload.body),
        SourceFormat::InternetArchiveJson => extract_archive(&payload.body),
    }
}
