//! Fetch → extract → normalize → catalog, one task per endpoint.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tsbib_core::{FetchConfig, Provenance, SourceConfig};

use crate::catalog::{Catalog, IngestCounts};
use crate::error::{FetchErrorKind, Result};
use crate::extract::extract;
use crate::fetch::{Fetcher, RawPayload, ReqwestTransport, Transport};
use crate::normalize::normalize_fields;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EndpointOutcome {
    Completed,
    Failed { kind: FetchErrorKind, message: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointReport {
    pub endpoint: String,
    pub outcome: EndpointOutcome,
    pub attempts: u32,
    /// Records the extractor produced.
    pub extracted: usize,
    /// Records dropped by the extractor or the normalizer.
    pub rejected: usize,
    /// Records skipped for falling under the endpoint's `min_relevance`.
    pub irrelevant: usize,
    pub counts: IngestCounts,
}

impl EndpointReport {
    fn new(source: &SourceConfig) -> Self {
        Self {
            endpoint: source.name.clone(),
            outcome: EndpointOutcome::Completed,
            attempts: 0,
            extracted: 0,
            rejected: 0,
            irrelevant: 0,
            counts: IngestCounts::default(),
        }
    }

    fn cancelled(mut self) -> Self {
        self.outcome = EndpointOutcome::Cancelled;
        self
    }
}

pub struct Pipeline<T: Transport = ReqwestTransport> {
    catalog: Arc<Catalog>,
    fetcher: Fetcher<T>,
    concurrency: usize,
}

impl Pipeline<ReqwestTransport> {
    pub fn from_config(catalog: Arc<Catalog>, config: &FetchConfig) -> Result<Self> {
        Ok(Self::new(catalog, Fetcher::from_config(config)?, config.concurrency))
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn new(catalog: Arc<Catalog>, fetcher: Fetcher<T>, concurrency: usize) -> Self {
        Self {
            catalog,
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Harvest every endpoint. Endpoint failures are reported, not raised;
    /// only a store error stops the run, after cancelling the endpoints still
    /// in flight.
    pub async fn run(
        &self,
        sources: &[SourceConfig],
        cancel: &CancellationToken,
    ) -> Result<Vec<EndpointReport>> {
        let run = cancel.child_token();
        let permits = Semaphore::new(self.concurrency);

        let results = join_all(
            sources
                .iter()
                .map(|source| self.run_endpoint(source, &permits, &run)),
        )
        .await;

        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            reports.push(result?);
        }
        Ok(reports)
    }

    async fn run_endpoint(
        &self,
        source: &SourceConfig,
        permits: &Semaphore,
        run: &CancellationToken,
    ) -> Result<EndpointReport> {
        let report = EndpointReport::new(source);
        let endpoint = source.name.as_str();

        let _permit = tokio::select! {
            _ = run.cancelled() => return Ok(report.cancelled()),
            permit = permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return Ok(report.cancelled()),
            },
        };

        let payload = match self.fetcher.fetch(source, run).await {
            Ok(payload) => payload,
            Err(e) if e.kind == FetchErrorKind::Cancelled => return Ok(report.cancelled()),
            Err(e) => {
                warn!(endpoint, kind = %e.kind, attempts = e.attempts, error = %e.message, "endpoint failed");
                return Ok(EndpointReport {
                    attempts: e.attempts,
                    outcome: EndpointOutcome::Failed {
                        kind: e.kind,
                        message: e.message,
                    },
                    ..report
                });
            }
        };

        let report = EndpointReport {
            attempts: payload.attempts,
            ..report
        };
        if run.is_cancelled() {
            return Ok(report.cancelled());
        }
        self.ingest(source, payload, report, run)
    }

    fn ingest(
        &self,
        source: &SourceConfig,
        payload: RawPayload,
        mut report: EndpointReport,
        run: &CancellationToken,
    ) -> Result<EndpointReport> {
        let endpoint = source.name.as_str();
        let extraction = match extract(&payload, source.format) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(endpoint, kind = "extraction", error = %e, "payload rejected");
                report.rejected += 1;
                return Ok(report);
            }
        };
        for (index, e) in &extraction.rejected {
            warn!(endpoint, index, kind = "extraction", error = %e, "record rejected");
        }
        report.extracted = extraction.records.len();
        report.rejected += extraction.rejected.len();

        let mut batch = Vec::with_capacity(extraction.records.len());
        for raw in extraction.records {
            let provenance = Provenance {
                source: source.name.clone(),
                origin: payload.url.clone(),
                retrieved_at: payload.retrieved_at,
            };
            let normalized = match normalize_fields(raw, source.format, provenance) {
                Ok(n) => n,
                Err(e) => {
                    warn!(endpoint, kind = "normalization", error = %e, "record rejected");
                    report.rejected += 1;
                    continue;
                }
            };
            if normalized.record.relevance < source.min_relevance {
                debug!(
                    endpoint,
                    relevance = normalized.record.relevance,
                    title = %normalized.record.citation.title,
                    "below relevance threshold"
                );
                report.irrelevant += 1;
                continue;
            }
            batch.push(normalized);
        }

        // Cancellation is honoured per payload, never between its records.
        if run.is_cancelled() {
            debug!(endpoint, discarded = batch.len(), "run cancelled before ingest");
            return Ok(report.cancelled());
        }
        for normalized in batch {
            if let Err(e) = self.catalog.ingest(normalized, &mut report.counts) {
                error!(endpoint, error = %e, invariant = e.is_invariant_violation(), "store failure, halting run");
                run.cancel();
                return Err(e);
            }
        }

        info!(
            endpoint,
            extracted = report.extracted,
            rejected = report.rejected,
            inserted = report.counts.inserted,
            merged = report.counts.merged,
            unchanged = report.counts.unchanged,
            "endpoint harvested"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    use async_trait::async_trait;
    use tsbib_core::{DedupConfig, SourceFormat};

    use super::*;
    use crate::fetch::{RetryPolicy, TransportFailure, TransportResponse};

    /// Serves fixed bodies by URL prefix; anything else is a 404.
    struct Canned(HashMap<&'static str, (u16, &'static str)>);

    #[async_trait]
    impl Transport for Canned {
        async fn get(&self, url: &str) -> std::result::Result<TransportResponse, TransportFailure> {
            let hit = self.0.iter().find(|(prefix, _)| url.starts_with(**prefix));
            Ok(match hit {
                Some((_, (status, body))) => TransportResponse::new(*status, *body),
                None => TransportResponse::new(404, ""),
            })
        }
    }

    const FEED: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/2101.00001v1</id>
    <title>Forecasting seasonal time series with ARIMA models</title>
    <published>2021-01-01T00:00:00Z</published>
    <author><name>Jane Doe</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2101.00002v1</id>
    <title>Graph colouring heuristics</title>
    <published>2021-01-02T00:00:00Z</published>
    <author><name>John Roe</name></author>
  </entry>
</feed>"#;

    fn source(name: &str, url: &str, format: SourceFormat, min_relevance: f64) -> SourceConfig {
        SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            format,
            min_interval_ms: 0,
            min_relevance,
            params: BTreeMap::new(),
        }
    }

    fn pipeline(routes: HashMap<&'static str, (u16, &'static str)>) -> Pipeline<Canned> {
        let catalog = Arc::new(Catalog::open_in_memory(DedupConfig::default()).unwrap());
        let policy = RetryPolicy {
            max_attempts: 1,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            jitter: Duration::ZERO,
        };
        let fetcher = Fetcher::new(Canned(routes), policy, Duration::from_secs(5));
        Pipeline::new(catalog, fetcher, 2)
    }

    #[tokio::test]
    async fn relevant_records_are_stored_and_failures_reported() {
        let pipeline = pipeline(HashMap::from([("http://feed.test/", (200, FEED))]));
        let sources = [
            source("feed", "http://feed.test/query", SourceFormat::ArxivAtom, 0.2),
            source("gone", "http://gone.test/query", SourceFormat::CrossrefJson, 0.0),
        ];
        let reports = pipeline
            .run(&sources, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reports[0].outcome, EndpointOutcome::Completed);
        assert_eq!(reports[0].extracted, 2);
        assert_eq!(reports[0].irrelevant, 1);
        assert_eq!(reports[0].counts.inserted, 1);
        assert!(matches!(
            reports[1].outcome,
            EndpointOutcome::Failed {
                kind: FetchErrorKind::Permanent,
                ..
            }
        ));
        assert_eq!(pipeline.catalog().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let pipeline = pipeline(HashMap::from([("http://feed.test/", (200, FEED))]));
        let sources = [source("feed", "http://feed.test/query", SourceFormat::ArxivAtom, 0.0)];
        let token = CancellationToken::new();
        pipeline.run(&sources, &token).await.unwrap();
        let again = pipeline.run(&sources, &token).await.unwrap();
        assert_eq!(again[0].counts.unchanged, 2);
        assert_eq!(pipeline.catalog().count().unwrap(), 2);
    }

    #[tokio::test]
    async fn cancelled_payload_is_discarded_whole() {
        let pipeline = pipeline(HashMap::new());
        let feed = source("feed", "http://feed.test/query", SourceFormat::ArxivAtom, 0.0);
        let payload = RawPayload::new("feed", feed.url.clone(), FEED);
        let token = CancellationToken::new();
        token.cancel();

        let report = pipeline
            .ingest(&feed, payload, EndpointReport::new(&feed), &token)
            .unwrap();
        assert_eq!(report.outcome, EndpointOutcome::Cancelled);
        assert_eq!(report.extracted, 2);
        assert_eq!(report.counts, IngestCounts::default());
        assert_eq!(pipeline.catalog().count().unwrap(), 0);
    }

    #[tokio::test]
    async fn cancelled_run_stores_nothing() {
        let pipeline = pipeline(HashMap::from([("http://feed.test/", (200, FEED))]));
        let sources = [source("feed", "http://feed.test/query", SourceFormat::ArxivAtom, 0.0)];
        let token = CancellationToken::new();
        token.cancel();
        let reports = pipeline.run(&sources, &token).await.unwrap();
        assert_eq!(reports[0].outcome, EndpointOutcome::Cancelled);
        assert_eq!(pipeline.catalog().count().unwrap(), 0);
    }
}
