pub mod cli;
pub mod config;
pub mod dedup;
pub mod emit;
pub mod error;
pub mod io_utils;
pub mod mapping;
pub mod monitor;
pub mod normalize;
pub mod parser;
pub mod report;
pub mod session;
pub mod store;
pub mod table;
pub mod upload;

use std::{env, fs::File, io::BufWriter, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands, DetectArgs, ImportArgs, PipelineArgs},
    config::IngestConfig,
    mapping::ColumnMapping,
    monitor::Monitor,
    parser::ParseOptions,
    session::UploadSession,
    store::JsonFileStore,
    upload::UploadFile,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("lead_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            IngestConfig::load(path).with_context(|| format!("Loading config from {path:?}"))?
        }
        None => IngestConfig::default(),
    };
    debug!("Effective config: {config:?}");
    match &cli.command {
        Commands::Detect(args) => handle_detect(args, &config),
        Commands::Preview(args) => handle_preview(args, &config),
        Commands::Import(args) => handle_import(args, &config),
    }
}

fn parse_options(input: &cli::InputArgs) -> Result<ParseOptions> {
    Ok(ParseOptions {
        delimiter: input.delimiter,
        encoding: io_utils::resolve_encoding(input.input_encoding.as_deref())?,
    })
}

fn handle_detect(args: &DetectArgs, config: &IngestConfig) -> Result<()> {
    let input = &args.input.input;
    let file = UploadFile::from_path(input)?;
    upload::validate_upload(&file, config)
        .with_context(|| format!("Validating upload {input:?}"))?;
    let parsed = parser::parse_upload(&file, &parse_options(&args.input)?)
        .with_context(|| format!("Parsing {input:?}"))?;
    let mapping = ColumnMapping::detect(&parsed.headers);

    table::mapping_table(&parsed.headers, &mapping).print();
    info!(
        "Detected {} of {} column(s) across {} row(s) in {:?} (delimiter '{}')",
        mapping.len(),
        parsed.headers.len(),
        parsed.row_count(),
        input,
        io_utils::printable_delimiter(parsed.delimiter)
    );
    if let Some(path) = &args.save_mapping {
        mapping
            .save(path)
            .with_context(|| format!("Writing mapping to {path:?}"))?;
        info!("Mapping written to {path:?}");
    }
    Ok(())
}

/// Loads, maps, and previews `args.input` against the store.
fn prepare_session(
    args: &PipelineArgs,
    config: &IngestConfig,
    store: &JsonFileStore,
) -> Result<UploadSession> {
    let input = &args.input.input;
    let mut session = UploadSession::new(
        config.clone(),
        args.scope(),
        Monitor::new(config.monitor_capacity),
    )
    .with_parse_options(parse_options(&args.input)?);

    let file = UploadFile::from_path(input)?;
    session
        .load_file(file)
        .with_context(|| format!("Loading {input:?}"))?;
    if let Some(path) = &args.mapping {
        let mapping = ColumnMapping::load(path)?;
        session
            .replace_mapping(mapping)
            .with_context(|| format!("Applying mapping {path:?}"))?;
    }
    for raw in &args.assign {
        let (column, field) = cli::parse_assignment(raw).map_err(|err| anyhow!(err))?;
        session.assign_column(&column, field)?;
    }
    session.preview(store).context("Building preview")?;
    Ok(session)
}

fn print_preview(session: &UploadSession, rows: usize) -> Result<()> {
    let preview = session
        .preview_result()
        .ok_or_else(|| anyhow!("No preview available"))?;
    table::stats_table(&preview.classification.stats).print();
    if rows > 0 {
        println!();
        table::preview_table(&preview.classification, rows).print();
    }
    Ok(())
}

fn write_report(session: &UploadSession, args: &PipelineArgs) -> Result<()> {
    let Some(path) = &args.report else {
        return Ok(());
    };
    let writer = io_utils::open_output(Some(path))?;
    report::write_duplicate_report(writer, session.duplicates())
        .with_context(|| format!("Writing duplicate report {path:?}"))?;
    info!(
        "Duplicate report with {} row(s) written to {:?}",
        session.duplicates().len(),
        path
    );
    Ok(())
}

fn open_store(args: &PipelineArgs) -> Result<JsonFileStore> {
    JsonFileStore::open(&args.store).with_context(|| format!("Opening store {:?}", args.store))
}

fn handle_preview(args: &PipelineArgs, config: &IngestConfig) -> Result<()> {
    let store = open_store(args)?;
    let session = prepare_session(args, config, &store)?;
    print_preview(&session, args.rows)?;
    write_report(&session, args)?;
    let importable = session.unique_leads().len();
    info!(
        "Preview of {:?}: {} lead(s) would be imported into {}",
        args.input.input,
        importable,
        session.scope()
    );
    Ok(())
}

fn handle_import(args: &ImportArgs, config: &IngestConfig) -> Result<()> {
    let pipeline = &args.pipeline;
    let mut store = open_store(pipeline)?;
    let mut session = prepare_session(pipeline, config, &store)?;
    print_preview(&session, pipeline.rows)?;
    write_report(&session, pipeline)?;

    let outcome = session.commit(&mut store);
    if let Err(err) = &outcome {
        warn!("Import of {:?} failed: {err}", pipeline.input.input);
    }
    if let Some(path) = &args.events {
        let file = File::create(path).with_context(|| format!("Creating events file {path:?}"))?;
        session.monitor_mut().export_json(BufWriter::new(file))?;
    }
    let summary = outcome.with_context(|| format!("Importing {:?}", pipeline.input.input))?;
    info!(
        "Imported {} lead(s) in {} chunk(s) into {} ({} duplicate(s) skipped, {} empty row(s) dropped)",
        summary.inserted,
        summary.chunks,
        session.scope(),
        summary.stats.duplicates,
        summary.stats.dropped
    );
    Ok(())
}
