use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use disclosure_rollup::{
    logging, DirectoryProvider, GeoReference, Pipeline, PipelineConfig, SourceProvider, VERSION,
};

#[derive(Parser)]
#[command(name = "disclosure-rollup", version = VERSION, about = "Yearly regional disclosure rollups")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and print the result tables as JSON on stdout
    Run(RunArgs),
    /// Load and validate the yearly sources only
    Inspect(SourceArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Directory holding one CSV per year (year in the file name)
    #[arg(long)]
    input_dir: PathBuf,

    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parse sources one after another instead of on worker threads
    #[arg(long)]
    sequential: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    sources: SourceArgs,

    /// GeoJSON FeatureCollection with region polygons
    #[arg(long)]
    geo: Option<PathBuf>,

    /// Year for the raw-total ranking and geo join (default: latest)
    #[arg(long)]
    year: Option<i32>,

    /// Rows per year in the per-recipient ranking
    #[arg(long)]
    top_k: Option<usize>,

    /// Rows in the raw-total ranking of the selected year
    #[arg(long)]
    top_n: Option<usize>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args),
        Command::Inspect(args) => inspect(args),
    }
}

fn load_config(args: &SourceArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if args.sequential {
        config.parallel_load = false;
    }
    Ok(config)
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.sources)?;
    if let Some(year) = args.year {
        config.selected_year = Some(year);
    }
    if let Some(k) = args.top_k {
        config.per_year_top_k = k;
    }
    if let Some(n) = args.top_n {
        config.selected_top_k = n;
    }

    let geo = match &args.geo {
        Some(path) => match GeoReference::from_geojson_file(path, &config.geo_name_property) {
            Ok(reference) => Some(reference),
            Err(e) => {
                // Degrade: the rest of the outputs do not depend on the map
                warn!(path = %path.display(), error = %e, "geo reference unusable, skipping map join");
                None
            }
        },
        None => None,
    };

    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?;
    let provider = DirectoryProvider::new(&args.sources.input_dir);

    let output = pipeline
        .run(&provider, geo.as_ref())
        .with_context(|| format!("Pipeline failed for {}", args.sources.input_dir.display()))?;

    let json = if args.pretty {
        output.to_json_pretty()?
    } else {
        output.to_json()?
    };
    println!("{}", json);

    for summary in &output.national_summary {
        info!("{}", summary.summary());
    }
    info!(fingerprint = %output.fingerprint()?, "done");

    Ok(())
}

fn inspect(args: SourceArgs) -> Result<()> {
    let config = load_config(&args)?;
    let loader = disclosure_rollup::DatasetLoader::new(config.columns.clone());
    let provider = DirectoryProvider::new(&args.input_dir);

    let sources = provider
        .sources()
        .with_context(|| format!("Failed to list sources in {}", args.input_dir.display()))?;
    if sources.is_empty() {
        warn!(dir = %args.input_dir.display(), "no yearly CSV files found");
        return Ok(());
    }

    let batches = loader.load_all(&sources, config.parallel_load)?;
    for batch in &batches {
        info!(
            source = %batch.source_label,
            year = batch.year,
            rows = batch.records.len(),
            missing_counts = batch.missing_count_rows(),
            "source ok"
        );
    }

    let corpus = disclosure_rollup::combine(batches);
    let duplicates = corpus.duplicate_keys();
    info!(
        rows = corpus.len(),
        years = ?corpus.years(),
        duplicate_keys = duplicates.len(),
        "inspection complete"
    );

    Ok(())
}
