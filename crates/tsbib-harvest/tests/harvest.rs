use std::collections::BTreeMap;
use std::sync::Arc;

use mockito::Server;
use tokio_util::sync::CancellationToken;
use tsbib_core::{DedupConfig, FetchConfig, IdScheme, SourceConfig, SourceFormat};
use tsbib_harvest::{Catalog, EndpointOutcome, FetchErrorKind, Pipeline};

fn fast_fetch() -> FetchConfig {
    FetchConfig {
        max_attempts: 4,
        base_backoff_ms: 5,
        max_backoff_ms: 20,
        jitter_ms: 0,
        deadline_secs: 10,
        concurrency: 2,
        ..FetchConfig::default()
    }
}

fn source(name: &str, url: String, format: SourceFormat) -> SourceConfig {
    SourceConfig {
        name: name.to_string(),
        url,
        format,
        min_interval_ms: 0,
        min_relevance: 0.0,
        params: BTreeMap::new(),
    }
}

fn pipeline() -> Pipeline {
    let catalog = Arc::new(Catalog::open_in_memory(DedupConfig::default()).unwrap());
    Pipeline::from_config(catalog, &fast_fetch()).unwrap()
}

const WORKS: &str = r#"{
  "status": "ok",
  "message": {
    "items": [
      {
        "DOI": "10.1007/978-3-319-29854-2",
        "title": ["Introduction to Time Series and Forecasting"],
        "author": [
          {"given": "Peter J.", "family": "Brockwell"},
          {"given": "Richard A.", "family": "Davis"}
        ],
        "issued": {"date-parts": [[2016]]},
        "publisher": "Springer",
        "type": "book"
      }
    ]
  }
}"#;

#[tokio::test]
async fn unavailable_endpoint_recovers_on_fourth_attempt() {
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("GET", "/works")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/works")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(WORKS)
        .expect(1)
        .create_async()
        .await;

    let pipeline = pipeline();
    let sources = [source(
        "crossref",
        format!("{}/works", server.url()),
        SourceFormat::CrossrefJson,
    )];
    let reports = pipeline
        .run(&sources, &CancellationToken::new())
        .await
        .unwrap();

    unavailable.assert_async().await;
    ok.assert_async().await;
    assert_eq!(reports[0].outcome, EndpointOutcome::Completed);
    assert_eq!(reports[0].attempts, 4);
    assert_eq!(reports[0].counts.inserted, 1);

    let record = pipeline
        .catalog()
        .find_by_identifier(IdScheme::Doi, "https://doi.org/10.1007/978-3-319-29854-2")
        .unwrap();
    assert_eq!(record.citation.authors.len(), 2);
    assert_eq!(record.citation.year, Some(2016));
    assert_eq!(record.provenance.source, "crossref");
}

#[tokio::test]
async fn page_without_title_stores_nothing() {
    let mut server = Server::new_async().await;
    let _page = server
        .mock("GET", "/record/42")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(
            r#"<html><head>
<meta name="citation_author" content="Hamilton, James D.">
<meta name="citation_publication_date" content="1994">
</head><body><p>Catalog entry</p></body></html>"#,
        )
        .create_async()
        .await;

    let pipeline = pipeline();
    let sources = [source(
        "catalog",
        format!("{}/record/42", server.url()),
        SourceFormat::Html,
    )];
    let reports = pipeline
        .run(&sources, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(reports[0].outcome, EndpointOutcome::Completed);
    assert_eq!(reports[0].rejected, 1);
    assert_eq!(pipeline.catalog().count().unwrap(), 0);
}

#[tokio::test]
async fn failing_endpoint_does_not_block_others() {
    let mut server = Server::new_async().await;
    let _missing = server
        .mock("GET", "/missing")
        .with_status(404)
        .create_async()
        .await;
    let _works = server
        .mock("GET", "/works")
        .with_status(200)
        .with_body(WORKS)
        .create_async()
        .await;

    let pipeline = pipeline();
    let sources = [
        source("gone", format!("{}/missing", server.url()), SourceFormat::ArxivAtom),
        source("crossref", format!("{}/works", server.url()), SourceFormat::CrossrefJson),
    ];
    let reports = pipeline
        .run(&sources, &CancellationToken::new())
        .await
        .unwrap();

    match &reports[0].outcome {
        EndpointOutcome::Failed { kind, .. } => assert_eq!(*kind, FetchErrorKind::Permanent),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(reports[0].attempts, 1);
    assert_eq!(reports[1].counts.inserted, 1);
}

#[tokio::test]
async fn harvest_then_import_merges_on_doi() {
    let mut server = Server::new_async().await;
    let _works = server
        .mock("GET", "/works")
        .with_status(200)
        .with_body(WORKS)
        .create_async()
        .await;

    let pipeline = pipeline();
    let sources = [source(
        "crossref",
        format!("{}/works", server.url()),
        SourceFormat::CrossrefJson,
    )];
    pipeline
        .run(&sources, &CancellationToken::new())
        .await
        .unwrap();

    let report = pipeline
        .catalog()
        .import_bibtex(
            "@book{brockwell2016, title = {Introduction to Time Series and Forecasting}, \
             doi = {10.1007/978-3-319-29854-2}, edition = {3}, series = {Springer Texts in Statistics}}",
            "local.bib",
        )
        .unwrap();
    assert_eq!(report.counts.merged, 1);

    let record = pipeline
        .catalog()
        .find_by_identifier(IdScheme::Doi, "10.1007/978-3-319-29854-2")
        .unwrap();
    assert_eq!(record.citation.edition.as_deref(), Some("3"));
    assert_eq!(record.citation.publisher.as_deref(), Some("Springer"));
    assert_eq!(record.lineage.len(), 2);
}
