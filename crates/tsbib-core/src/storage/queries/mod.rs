mod record_filter;

pub use record_filter::{RecordFilter, RecordOrder};
