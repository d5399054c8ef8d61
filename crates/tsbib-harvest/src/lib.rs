//! Record pipeline for the time-series bibliography: fetching, extraction,
//! normalization, duplicate resolution and export.

pub mod catalog;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod identifiers;
pub mod normalize;
pub mod pipeline;

pub use catalog::{Catalog, ImportReport, IngestCounts, UpsertOutcome};
pub use dedup::{DedupEngine, Resolution, fingerprint};
pub use error::{
    ExportError, ExtractionError, FetchError, FetchErrorKind, HarvestError, MergeConflict,
    NormalizationWarning, Result,
};
pub use extract::{Extraction, Field, RawFields, extract};
pub use fetch::{Fetcher, RawPayload};
pub use formats::{Citable, ExportFormat};
pub use normalize::{Normalized, normalize_bib_entry, normalize_fields};
pub use pipeline::{EndpointOutcome, EndpointReport, Pipeline};
