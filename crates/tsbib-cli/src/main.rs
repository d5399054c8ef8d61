use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tsbib_core::{
    AppConfig, BibliographicRecord, EntryType, ExitCode, IdScheme, RecordFilter, RecordId,
    RecordOrder, TsbibError,
};
use tsbib_harvest::{
    Catalog, EndpointOutcome, ExportError, ExportFormat, HarvestError, Pipeline,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "tsbib",
    about = "Harvest, deduplicate and export a time-series bibliography",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting TSBIB_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a BibTeX file into the catalog.
    Import { file: PathBuf },

    /// Fetch every configured source (or the named ones) and ingest the results.
    Harvest {
        #[arg(long = "source", action = clap::ArgAction::Append)]
        sources: Vec<String>,
    },

    /// Show one record by internal id.
    Get { id: String },

    /// Look a record up by an external identifier.
    Find {
        /// isbn, doi or arxiv
        scheme: String,
        value: String,
    },

    /// List records, oldest first unless --by-relevance is given.
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Export records as bibtex, ris, csl-json or zotero-csv.
    Export {
        /// Record ids; all records matching the filter when omitted.
        ids: Vec<String>,
        #[arg(long, short, default_value = "bibtex")]
        format: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List configured sources.
    Sources,

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
struct FilterArgs {
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    venue: Option<String>,
    #[arg(long)]
    from: Option<i32>,
    #[arg(long)]
    to: Option<i32>,
    /// Substring of the title, abstract or authors.
    #[arg(long)]
    text: Option<String>,
    /// Only records a given source contributed to.
    #[arg(long)]
    source: Option<String>,
    /// Entry type, e.g. article or book.
    #[arg(long = "type")]
    entry_type: Option<String>,
    /// Most relevant first instead of creation order.
    #[arg(long)]
    by_relevance: bool,
    #[arg(long)]
    limit: Option<usize>,
}

impl FilterArgs {
    fn to_filter(&self) -> RecordFilter {
        RecordFilter {
            year_from: self.from,
            year_to: self.to,
            author: self.author.clone(),
            venue: self.venue.clone(),
            text: self.text.clone(),
            source: self.source.clone(),
            entry_type: self.entry_type.as_deref().map(EntryType::from),
            order: if self.by_relevance {
                RecordOrder::Relevance
            } else {
                RecordOrder::Created
            },
            limit: self.limit,
        }
    }
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
    /// Print the config file location.
    Path,
    /// Write the default configuration file.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    init_tracing();

    let json_output = cli.json || std::env::var("TSBIB_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json_output, start).await {
        let code = exit_code(&err);
        if json_output {
            let payload = serde_json::json!({
                "status": "error",
                "error": error_kind(&err),
                "message": format!("{err:#}"),
                "meta": { "duration_ms": start.elapsed().as_millis() }
            });
            println!("{}", serde_json::to_string_pretty(&payload).unwrap_or_default());
        } else {
            eprintln!("error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn init_tracing() {
    let filter = std::env::var("TSBIB_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("tsbib=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, json_output: bool, start: Instant) -> Result<()> {
    // Load config (honors TSBIB_CONFIG and TSBIB_LIBRARY_PATH)
    let mut config = AppConfig::load()?;
    if let Ok(lib_path) = std::env::var("TSBIB_LIBRARY_PATH") {
        config.set_library_path(lib_path.into());
    }

    match command {
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let catalog = Catalog::from_config(&config)?;
            let report = catalog.import_bibtex(&text, &file.to_string_lossy())?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":report,"meta":{"duration_ms":dur}}))?;
            } else {
                let c = &report.counts;
                println!(
                    "{} entries: {} inserted, {} merged, {} unchanged, {} skipped, {} warnings",
                    report.entries, c.inserted, c.merged, c.unchanged, c.skipped, c.warnings
                );
                for rejected in &report.rejected {
                    println!("  skipped {} (line {}): {}", rejected.entry, rejected.line, rejected.reason);
                }
            }
        }

        Commands::Harvest { sources } => {
            let selected: Vec<_> = if sources.is_empty() {
                config.sources.clone()
            } else {
                let mut picked = Vec::new();
                for name in &sources {
                    match config.source(name) {
                        Some(source) => picked.push(source.clone()),
                        None => return Err(TsbibError::ValidationError(format!("unknown source: {name}")).into()),
                    }
                }
                picked
            };
            if selected.is_empty() {
                bail!(TsbibError::ConfigError("no sources configured".to_string()));
            }

            let catalog = Arc::new(Catalog::from_config(&config)?);
            let pipeline = Pipeline::from_config(catalog, &config.fetch)?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling harvest");
                    on_interrupt.cancel();
                }
            });

            info!(sources = selected.len(), "harvest started");
            let reports = pipeline.run(&selected, &cancel).await?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":{"endpoints":reports},"meta":{"duration_ms":dur}}))?;
            } else {
                for report in &reports {
                    let status = match &report.outcome {
                        EndpointOutcome::Completed => "ok".to_string(),
                        EndpointOutcome::Failed { kind, message } => format!("failed ({kind}): {message}"),
                        EndpointOutcome::Cancelled => "cancelled".to_string(),
                    };
                    let c = &report.counts;
                    println!(
                        "{:<20} {status}  extracted {}, inserted {}, merged {}, unchanged {}, rejected {}, off-topic {}",
                        report.endpoint, report.extracted, c.inserted, c.merged, c.unchanged, report.rejected, report.irrelevant
                    );
                }
            }
        }

        Commands::Get { id } => {
            let id: RecordId = id.parse()?;
            let catalog = Catalog::from_config(&config)?;
            let record = catalog.get(&id)?;
            print_record(&record, json_output, start)?;
        }

        Commands::Find { scheme, value } => {
            let scheme: IdScheme = scheme.parse()?;
            let catalog = Catalog::from_config(&config)?;
            let record = catalog.find_by_identifier(scheme, &value)?;
            print_record(&record, json_output, start)?;
        }

        Commands::Query { filter } => {
            let catalog = Catalog::from_config(&config)?;
            let records = catalog.query(&filter.to_filter())?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": records, "total": records.len() },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if records.is_empty() {
                println!("No records. Use `tsbib import` or `tsbib harvest` to add some.");
            } else {
                for record in &records {
                    println!("{}", summary_line(record));
                }
            }
        }

        Commands::Export { ids, format, output, filter } => {
            let format: ExportFormat = format.parse()?;
            let catalog = Catalog::from_config(&config)?;
            let rendered = if ids.is_empty() {
                catalog.export_matching(&filter.to_filter(), format)?
            } else {
                let ids = ids
                    .iter()
                    .map(|id| id.parse::<RecordId>())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                catalog.export(&ids, format)?
            };
            let dur = start.elapsed().as_millis();

            match &output {
                Some(path) => {
                    std::fs::write(path, &rendered)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"format":format.as_str(),"path":path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote {} to {}", format, path.display());
                    }
                }
                None if json_output => {
                    print_json(&serde_json::json!({"status":"ok","data":{"format":format.as_str(),"content":rendered},"meta":{"duration_ms":dur}}))?;
                }
                None => print!("{rendered}"),
            }
        }

        Commands::Sources => {
            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({"status":"ok","data":config.sources,"meta":{"duration_ms":dur}}))?;
            } else if config.sources.is_empty() {
                println!("No sources configured. Run `tsbib config init` for the defaults.");
            } else {
                for source in &config.sources {
                    println!(
                        "{:<20} {:<22} every {}ms  {}",
                        source.name,
                        source.format.to_string(),
                        source.min_interval_ms,
                        source.url
                    );
                }
            }
        }

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            let path = AppConfig::config_path();
            match action {
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path,"exists":path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", path.display());
                    }
                }
                ConfigAction::Init { force } => {
                    if path.exists() && !force {
                        bail!(TsbibError::ConfigError(format!(
                            "{} already exists; pass --force to overwrite",
                            path.display()
                        )));
                    }
                    AppConfig::with_default_sources().save_to(&path)?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote default config to {}", path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn summary_line(record: &BibliographicRecord) -> String {
    let c = &record.citation;
    let authors = c
        .authors
        .iter()
        .map(|a| a.surname.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let year = c.year.map(|y| y.to_string()).unwrap_or_else(|| "----".to_string());
    format!(
        "{id}  {year}  {title:<50}  {authors}",
        id = &record.id.to_string()[..8],
        title = c.title,
    )
}

fn print_record(record: &BibliographicRecord, json_output: bool, start: Instant) -> Result<()> {
    let dur = start.elapsed().as_millis();
    if json_output {
        return print_json(&serde_json::json!({"status":"ok","data":record,"meta":{"duration_ms":dur}}));
    }
    let c = &record.citation;
    println!("{}  [{}]", record.id, c.entry_type);
    println!("  title:       {}", c.title);
    if !c.authors.is_empty() {
        let names: Vec<String> = c.authors.iter().map(|a| a.display()).collect();
        println!("  authors:     {}", names.join("; "));
    }
    if let Some(year) = c.year {
        println!("  year:        {year}");
    }
    if let Some(venue) = &c.venue {
        println!("  venue:       {venue}");
    }
    if let Some(publisher) = &c.publisher {
        println!("  publisher:   {publisher}");
    }
    println!("  relevance:   {:.2}", record.relevance);
    for id in &c.identifiers {
        println!("  {:<12} {}", format!("{}:", id.scheme), id.value);
    }
    println!(
        "  lineage:     {} input(s), first from {} ({})",
        record.lineage.len(),
        record.provenance.source,
        record.provenance.origin
    );
    Ok(())
}

fn error_kind(err: &anyhow::Error) -> &'static str {
    match exit_code(err) {
        ExitCode::Success => "ok",
        ExitCode::GeneralError => "error",
        ExitCode::NotFound => "not_found",
        ExitCode::InvalidArgs => "invalid_args",
        ExitCode::NetworkError => "network",
        ExitCode::Conflict => "conflict",
    }
}

fn store_exit_code(err: &TsbibError) -> ExitCode {
    match err {
        TsbibError::RecordNotFound(_) => ExitCode::NotFound,
        TsbibError::ValidationError(_) | TsbibError::ConfigError(_) | TsbibError::TomlParse(_) => {
            ExitCode::InvalidArgs
        }
        TsbibError::InvariantViolation(_) => ExitCode::Conflict,
        _ => ExitCode::GeneralError,
    }
}

fn export_exit_code(err: &ExportError) -> ExitCode {
    match err {
        ExportError::NotFound(_) => ExitCode::NotFound,
        ExportError::UnsupportedFormat(_) => ExitCode::InvalidArgs,
        ExportError::Store(e) => store_exit_code(e),
        _ => ExitCode::GeneralError,
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<HarvestError>() {
        return match e {
            HarvestError::Store(e) => store_exit_code(e),
            HarvestError::Export(e) => export_exit_code(e),
            HarvestError::BibtexParse { .. } => ExitCode::InvalidArgs,
            HarvestError::Fetch(_) | HarvestError::Http(_) => ExitCode::NetworkError,
            HarvestError::MergeConflict(_) => ExitCode::Conflict,
            HarvestError::Extraction(_) => ExitCode::GeneralError,
        };
    }
    if let Some(e) = err.downcast_ref::<ExportError>() {
        return export_exit_code(e);
    }
    if let Some(e) = err.downcast_ref::<TsbibError>() {
        return store_exit_code(e);
    }
    ExitCode::GeneralError
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_filter(args: &[&str]) -> RecordFilter {
        let cli = Cli::try_parse_from(["tsbib", "query"].iter().chain(args)).unwrap();
        match cli.command {
            Commands::Query { filter } => filter.to_filter(),
            _ => panic!("expected the query command"),
        }
    }

    #[test]
    fn filter_flags_map_onto_record_filter() {
        let filter = query_filter(&[
            "--text", "arima", "--source", "arxiv", "--type", "Article", "--by-relevance",
            "--from", "2000", "--limit", "10",
        ]);
        assert_eq!(filter.text.as_deref(), Some("arima"));
        assert_eq!(filter.source.as_deref(), Some("arxiv"));
        assert_eq!(filter.entry_type, Some(EntryType::Article));
        assert_eq!(filter.order, RecordOrder::Relevance);
        assert_eq!(filter.year_from, Some(2000));
        assert_eq!(filter.limit, Some(10));
    }

    #[test]
    fn bare_query_lists_everything_in_creation_order() {
        assert_eq!(query_filter(&[]), RecordFilter::new());
    }
}
