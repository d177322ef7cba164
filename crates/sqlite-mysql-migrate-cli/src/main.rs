//! sqlite-mysql-migrate CLI - SQLite to MySQL migration script generator.

use clap::{Parser, Subcommand, ValueEnum};
use flate2::write::GzEncoder;
use flate2::Compression;
use sqlite_mysql_migrate::{
    Config, ExportMode, MigrateError, MigrationResult, Orchestrator, SqliteReader, WriterSink,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sqlite-mysql-migrate")]
#[command(about = "Convert a SQLite database into a MySQL migration script")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportModeArg {
    Structure,
    Data,
    Both,
}

impl From<ExportModeArg> for ExportMode {
    fn from(mode: ExportModeArg) -> Self {
        match mode {
            ExportModeArg::Structure => ExportMode::Structure,
            ExportModeArg::Data => ExportMode::Data,
            ExportModeArg::Both => ExportMode::Both,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the migration script
    Run {
        /// SQLite database file
        sqlite_db: PathBuf,

        /// Output script path, `-` for stdout [default: <db stem>_mysql.sql]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: MigrationArgs,

        /// Dry run: show the plan without reading any rows
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the table order, type mappings and warnings
    Plan {
        /// SQLite database file
        sqlite_db: PathBuf,

        #[command(flatten)]
        options: MigrationArgs,
    },
}

/// Flags that override the configuration file.
#[derive(clap::Args)]
struct MigrationArgs {
    /// Do not emit DROP statements before CREATE
    #[arg(long)]
    no_drop: bool,

    /// Which parts of the script to generate
    #[arg(long, value_enum)]
    export_mode: Option<ExportModeArg>,

    /// Storage engine for created tables
    #[arg(long)]
    engine: Option<String>,

    /// Default character set
    #[arg(long)]
    charset: Option<String>,

    /// Default collation
    #[arg(long)]
    collate: Option<String>,

    /// Rows per INSERT statement
    #[arg(long)]
    batch_size: Option<usize>,

    /// Largest blob kept inline, in bytes
    #[arg(long)]
    max_blob_size: Option<usize>,

    /// Directory for externalized blobs
    #[arg(long)]
    blob_dir: Option<PathBuf>,

    /// Reference blobs relative to the blob directory
    #[arg(long)]
    relative_blob_paths: bool,

    /// Add FULLTEXT indexes on text columns
    #[arg(long)]
    fulltext: bool,

    /// Partition clause appended to every CREATE TABLE
    #[arg(long)]
    partition: Option<String>,

    /// Tablespace for created tables
    #[arg(long)]
    tablespace: Option<String>,

    /// Target MySQL version, e.g. 8.0 or 5.7
    #[arg(long)]
    mysql_version: Option<String>,

    /// Compare source and emitted row counts in the report
    #[arg(long)]
    verify_data: bool,

    /// Gzip the output script
    #[arg(long)]
    compress: bool,

    /// Number of tables streamed in parallel
    #[arg(long)]
    workers: Option<usize>,
}

impl MigrationArgs {
    fn apply(self, config: &mut Config) {
        let m = &mut config.migration;
        if self.no_drop {
            m.drop_tables = false;
        }
        if let Some(mode) = self.export_mode {
            m.export_mode = mode.into();
        }
        if let Some(engine) = self.engine {
            m.engine = engine;
        }
        if let Some(charset) = self.charset {
            m.charset = charset;
        }
        if let Some(collation) = self.collate {
            m.collation = collation;
        }
        if let Some(n) = self.batch_size {
            m.batch_size = n;
        }
        if let Some(n) = self.max_blob_size {
            m.max_blob_size = n;
        }
        if self.blob_dir.is_some() {
            m.blob_dir = self.blob_dir;
        }
        if self.relative_blob_paths {
            m.relative_blob_paths = true;
        }
        if self.fulltext {
            m.fulltext = true;
        }
        if self.partition.is_some() {
            m.partition = self.partition;
        }
        if self.tablespace.is_some() {
            m.tablespace = self.tablespace;
        }
        if let Some(version) = self.mysql_version {
            m.target_version = version;
        }
        if self.verify_data {
            m.verify_data = true;
        }
        if let Some(w) = self.workers {
            m.workers = Some(w);
        }
        if self.compress {
            config.output.compress = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let (sqlite_db, output, options, plan_only) = match cli.command {
        Commands::Run {
            sqlite_db,
            output,
            options,
            dry_run,
        } => (sqlite_db, output, options, dry_run),
        Commands::Plan { sqlite_db, options } => (sqlite_db, None, options, true),
    };

    let mut config = load_config(cli.config.as_deref(), sqlite_db)?;
    options.apply(&mut config);
    if let Some(path) = output {
        config.output.path = Some(path);
    }
    config.validate()?;
    let config = config.with_auto_tuning();

    let source = Arc::new(SqliteReader::open(&config.source.path)?);

    if plan_only {
        let plan = Orchestrator::new(config, source).plan().await?;
        if cli.output_json {
            println!("{}", plan.to_json()?);
        } else {
            print!("{}", plan.render());
        }
        return Ok(());
    }

    let cancel_token = setup_signal_handler();
    let output_path = config.output_path();
    let to_stdout = output_path.as_os_str() == "-";
    let compress = config.output.compress;
    info!(
        "Writing script to {}",
        if to_stdout { "stdout".to_string() } else { output_path.display().to_string() }
    );

    let mut sink = WriterSink::new(open_output(&output_path, compress)?);
    let orchestrator = Orchestrator::new(config, source);
    let outcome = orchestrator.run(&mut sink, cancel_token).await;
    let bytes = sink.bytes_written();
    // Finish the stream even after a failure: the report block is already in it
    let finished = sink.into_inner().finish();
    let result = outcome?;
    finished?;

    print_result(&result, bytes, cli.output_json, to_stdout)?;

    if result.cancelled {
        return Err(MigrateError::Cancelled);
    }
    Ok(())
}

fn load_config(path: Option<&Path>, sqlite_db: PathBuf) -> Result<Config, MigrateError> {
    match path {
        Some(path) => {
            let mut config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config.source.path = sqlite_db;
            Ok(config)
        }
        None => Ok(Config::for_source(sqlite_db)),
    }
}

fn print_result(
    result: &MigrationResult,
    bytes: u64,
    json: bool,
    script_on_stdout: bool,
) -> Result<(), MigrateError> {
    let text = if json {
        result.to_json()?
    } else {
        let mut lines = vec![
            if result.cancelled {
                "\nMigration cancelled.".to_string()
            } else {
                "\nMigration script generated!".to_string()
            },
            format!("  Run ID: {}", result.run_id),
            format!("  Duration: {:.2}s", result.duration_seconds),
            format!("  Tables: {}", result.tables_total),
            format!("  Rows: {}", result.rows_emitted),
            format!("  Blobs externalized: {}", result.blobs_externalized),
            format!("  Script size: {} bytes", bytes),
            format!("  Warnings: {}", result.report.warnings.len()),
        ];
        if result.report.has_mismatches() {
            lines.push("  Row count mismatches: see the report at the end of the script".into());
        }
        lines.join("\n")
    };

    if script_on_stdout {
        eprintln!("{}", text);
    } else {
        println!("{}", text);
    }
    Ok(())
}

/// Script destination, optionally gzip-compressed.
enum ScriptOutput {
    Plain(BufWriter<Box<dyn Write + Send>>),
    Gzip(GzEncoder<BufWriter<Box<dyn Write + Send>>>),
}

impl ScriptOutput {
    /// Flush everything, writing the gzip trailer when compressing.
    fn finish(self) -> Result<(), MigrateError> {
        match self {
            ScriptOutput::Plain(mut w) => w.flush()?,
            ScriptOutput::Gzip(gz) => gz.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for ScriptOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ScriptOutput::Plain(w) => w.write(buf),
            ScriptOutput::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ScriptOutput::Plain(w) => w.flush(),
            ScriptOutput::Gzip(w) => w.flush(),
        }
    }
}

fn open_output(path: &Path, compress: bool) -> Result<ScriptOutput, MigrateError> {
    let inner: Box<dyn Write + Send> = if path.as_os_str() == "-" {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(path)?)
    };
    let buffered = BufWriter::with_capacity(256 * 1024, inner);
    Ok(if compress {
        ScriptOutput::Gzip(GzEncoder::new(buffered, Compression::default()))
    } else {
        ScriptOutput::Plain(buffered)
    })
}

/// Logs go to stderr so the script can be written to stdout.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Finishing the current batch...", name);
                    token.cancel();
                });
            }
            Err(e) => tracing::warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Finishing the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
