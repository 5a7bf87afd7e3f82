#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use flate2::read::MultiGzDecoder;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use serde_json::{Map, Value, json};
use std::error::Error;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process;

use vardex::encode::AnnotationEncoder;
use vardex::registry::ColumnRegistry;
use vardex::samples::{InMemoryCohort, SampleDataManager, SampleDataQuery};
use vardex::shared::config::VardexConfig;
use vardex::shared::progress::{EncodeProgressObserver, EncodeProgressStage};
use vardex::types::{IndexRow, VariantAnnotation};

#[derive(Args)]
pub struct EncodeArgs {
    /// JSON-lines file of variant annotations, optionally gzip-compressed (.gz)
    #[arg(value_name = "ANNOTATIONS")]
    pub input: PathBuf,

    /// TOML configuration file (built-in registry and options when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where to write one JSON line per index row (stdout when omitted)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct SamplesArgs {
    /// JSON cohort fixture serving both the variant store and the study metadata
    #[arg(long, value_name = "PATH")]
    pub fixture: PathBuf,

    /// Variant id, e.g. 1:100:A:T
    #[arg(long)]
    pub variant: String,

    /// Study name
    #[arg(long)]
    pub study: String,

    /// Genotype to report; repeat for several (defaults to the configured genotypes)
    #[arg(long = "genotype", value_name = "GT")]
    pub genotypes: Vec<String>,

    /// Restrict the cohort to this sample; repeat for several
    #[arg(long = "sample", value_name = "NAME")]
    pub samples: Vec<String>,

    /// Matches to pass over in every genotype before samples are kept
    #[arg(long)]
    pub skip: Option<usize>,

    /// Samples kept per genotype
    #[arg(long)]
    pub limit: Option<usize>,

    /// Samples requested from the store per call
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Collapse all accepted genotypes into a single bucket
    #[arg(long)]
    pub merge: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Parser)]
#[command(
    name = "vardex",
    about = "Variant annotation indexing and genotype sample aggregation",
    long_about = "Flattens variant annotations into typed secondary-index rows and groups \
                 the samples of a variant by genotype, reading large cohorts in batches."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode variant annotations into index rows
    #[command(about = "Encode annotations into index rows (outputs: JSON lines)")]
    Encode(EncodeArgs),

    /// Group the samples of one variant by genotype
    #[command(about = "Group a variant's samples by genotype (outputs: JSON)")]
    Samples(SamplesArgs),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();
    let result = match command {
        Some(Commands::Encode(args)) => run_encode(args),
        Some(Commands::Samples(args)) => run_samples(args),
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());
    pb
}

/// Drives a terminal progress bar from encoder progress events.
#[derive(Default)]
struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl EncodeProgressObserver for ConsoleProgress {
    fn on_stage_start(&mut self, stage: EncodeProgressStage, total_variants: usize) {
        self.bar = Some(create_progress_bar(total_variants as u64, stage.describe()));
    }

    fn on_stage_advance(&mut self, stage: EncodeProgressStage, processed_variants: usize) {
        let _ = stage;
        if let Some(bar) = &self.bar {
            bar.set_position(processed_variants as u64);
        }
    }

    fn on_stage_finish(&mut self, stage: EncodeProgressStage) {
        if let Some(bar) = self.bar.take() {
            bar.finish_with_message(format!("{stage} complete"));
        }
    }
}

fn open_annotations(path: &Path) -> Result<Box<dyn BufRead>, Box<dyn Error>> {
    let file = File::open(path)
        .map_err(|e| format!("Failed to open annotations {}: {e}", path.display()))?;
    let reader: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

fn read_annotations(path: &Path) -> Result<Vec<VariantAnnotation>, Box<dyn Error>> {
    let mut annotations = Vec::new();
    for (index, line) in open_annotations(path)?.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let annotation = serde_json::from_str(&line)
            .map_err(|e| format!("{}:{}: {e}", path.display(), index + 1))?;
        annotations.push(annotation);
    }
    Ok(annotations)
}

fn row_key_hex(row_key: &[u8]) -> String {
    row_key.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn row_to_json(row: &IndexRow, registry: &ColumnRegistry) -> Result<Value, Box<dyn Error>> {
    let mut columns = Map::new();
    for (id, value) in &row.columns {
        let spec = registry
            .spec(*id)
            .ok_or_else(|| format!("Column {id:?} is not declared by the registry"))?;
        columns.insert(spec.name.clone(), serde_json::to_value(value)?);
    }
    Ok(json!({ "rowKey": row_key_hex(&row.row_key), "columns": columns }))
}

fn run_encode(args: EncodeArgs) -> Result<(), Box<dyn Error>> {
    let config = VardexConfig::load_or_default(args.config.as_deref())?;
    let encoder = AnnotationEncoder::from_config(&config)?;

    let annotations = read_annotations(&args.input)?;
    info!(
        "Loaded {} annotations from {}",
        annotations.len(),
        args.input.display()
    );

    let mut progress = ConsoleProgress::default();
    let rows = encoder.encode_all(&annotations, &mut progress)?;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    let mut stored_bytes = 0usize;
    for row in &rows {
        stored_bytes += row
            .column_writes(encoder.registry())?
            .iter()
            .map(|write| write.bytes.len())
            .sum::<usize>();
        serde_json::to_writer(&mut writer, &row_to_json(row, encoder.registry())?)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    info!(
        "Encoded {} rows ({} bytes of column data, {:?} row keys)",
        rows.len(),
        stored_bytes,
        encoder.row_key_format()
    );
    Ok(())
}

fn run_samples(args: SamplesArgs) -> Result<(), Box<dyn Error>> {
    let config = VardexConfig::load_or_default(args.config.as_deref())?;
    let fixture = fs::read_to_string(&args.fixture)
        .map_err(|e| format!("Failed to read fixture {}: {e}", args.fixture.display()))?;
    let cohort = InMemoryCohort::from_json(&fixture)?;

    let mut query = SampleDataQuery::from_config(&config.samples);
    if !args.genotypes.is_empty() {
        query.genotypes = args.genotypes;
    }
    if !args.samples.is_empty() {
        query.include_samples = Some(args.samples);
    }
    query.skip = args.skip.unwrap_or(query.skip);
    query.limit = args.limit.unwrap_or(query.limit);
    query.batch_size = args.batch_size.unwrap_or(query.batch_size);
    query.merge = args.merge;

    let manager = SampleDataManager::new(&cohort, &cohort);
    let result = manager.get_sample_data(&args.variant, &args.study, &query)?;
    info!(
        "Read {} samples in {} store calls ({} ms in store)",
        result.read_samples, result.queries, result.db_time_ms
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
