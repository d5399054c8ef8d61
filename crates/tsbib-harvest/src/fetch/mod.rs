pub mod client;
pub mod retry;
pub mod transport;

pub use client::{Fetcher, RawPayload, build_url};
pub use retry::{Outcome, RetryPolicy, RetryState, Step};
pub use transport::{ReqwestTransport, Transport, TransportFailure, TransportResponse};
