use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use markup_core::artifact::{load_table, save_table, EXTRACTED_MARKUPS_FILE, TRANSLATED_MARKUPS_FILE};
use markup_core::export::export_csv;
use markup_core::segments::debug_dump_city_segments;
use markup_core::{
    apply_session, ensure_offsets, extract_from_file, resolve_dictionary_paths, resolve_save_path, run,
    translate_from_files, CsvLayout, Distribution, EditSession, MarkupError, MarkupSettings,
    RandomizeSettings, SaveMode,
};

mod logging;

use logging::{init_logging, LogConfig, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "markup-editor",
    version,
    about = "Find and edit trade price markups in Kenshi save files"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// JSON settings file; command line flags override its values.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    log_format: LogFormatArg,

    /// Append logs to a file instead of stderr.
    #[arg(long, value_name = "PATH", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan a save file and write the city/item markup table.
    Extract(ExtractArgs),
    /// Replace item identifiers in a markup table with display names.
    Translate(TranslateArgs),
    /// Extract and translate in one go.
    Run(RunArgs),
    /// Print the rows of a translated table.
    List(ListArgs),
    /// Edit markups and write them back into a save file.
    Apply(ApplyArgs),
    /// Convert a markup table to CSV.
    ExportCsv(ExportCsvArgs),
}

#[derive(Debug, Args)]
struct ScanArgs {
    /// Save file to scan (detected when omitted).
    #[arg(long)]
    save: Option<PathBuf>,

    #[arg(long)]
    lower: Option<f64>,

    #[arg(long)]
    upper: Option<f64>,

    /// Minimum share of cities an item must appear in.
    #[arg(long)]
    frequency_ratio: Option<f64>,
}

#[derive(Debug, Args)]
struct DictionaryArgs {
    /// Dictionary file (.mod/.base), searched in the order given.
    #[arg(long = "dict", value_name = "FILE")]
    dictionaries: Vec<PathBuf>,

    /// Directory to search for a game installation.
    #[arg(long = "install-root", value_name = "DIR")]
    install_roots: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ExtractArgs {
    #[command(flatten)]
    scan: ScanArgs,

    #[arg(long, default_value = EXTRACTED_MARKUPS_FILE)]
    output: PathBuf,

    /// Write `[value, offset]` pairs instead of bare values.
    #[arg(long)]
    offsets: bool,

    /// Print every city window with its raw records.
    #[arg(long, hide = true)]
    debug_segments: bool,
}

#[derive(Debug, Args)]
struct TranslateArgs {
    /// Table written by `extract --offsets`.
    #[arg(long, default_value = EXTRACTED_MARKUPS_FILE)]
    input: PathBuf,

    #[arg(long, default_value = TRANSLATED_MARKUPS_FILE)]
    output: PathBuf,

    #[command(flatten)]
    dictionaries: DictionaryArgs,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    scan: ScanArgs,

    #[command(flatten)]
    dictionaries: DictionaryArgs,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also write a city segment report next to the outputs.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// Only rows whose city contains this text (case-insensitive).
    #[arg(long, default_value = "")]
    city: String,

    /// Only rows whose item name contains this text (case-insensitive).
    #[arg(long, default_value = "")]
    item: String,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, default_value = TRANSLATED_MARKUPS_FILE)]
    table: PathBuf,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DistributionArg {
    Uniform,
    Normal,
    Triangular,
    TwoPeak,
}

impl From<DistributionArg> for Distribution {
    fn from(arg: DistributionArg) -> Self {
        match arg {
            DistributionArg::Uniform => Distribution::Uniform,
            DistributionArg::Normal => Distribution::Normal,
            DistributionArg::Triangular => Distribution::Triangular,
            DistributionArg::TwoPeak => Distribution::TwoPeak,
        }
    }
}

#[derive(Debug, Args)]
struct ApplyArgs {
    #[arg(long, default_value = TRANSLATED_MARKUPS_FILE)]
    table: PathBuf,

    /// Save file the table was extracted from (detected when omitted).
    #[arg(long)]
    save: Option<PathBuf>,

    /// Explicit edit, e.g. `--set "Squin/Iron Plate=120"`.
    #[arg(long = "set", value_name = "CITY/ITEM=VALUE", value_parser = parse_edit)]
    edits: Vec<(String, String, f64)>,

    /// Randomize the filtered rows with this distribution.
    #[arg(long, value_enum)]
    randomize: Option<DistributionArg>,

    #[arg(long, default_value_t = 70.0)]
    lower_cap: f64,

    #[arg(long, default_value_t = 140.5)]
    upper_cap: f64,

    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    filter: FilterArgs,

    /// Patch the original save instead of a local copy.
    #[arg(long)]
    direct_write: bool,

    /// Confirm a direct write.
    #[arg(long)]
    yes: bool,

    /// Where the local copy is written.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Debug, Args)]
struct ExportCsvArgs {
    #[arg(long, default_value = TRANSLATED_MARKUPS_FILE)]
    input: PathBuf,

    #[arg(long, default_value = "game_markups_spreadsheet.csv")]
    output: PathBuf,

    /// One row per item instead of one row per city.
    #[arg(long)]
    cities_as_columns: bool,
}

fn parse_edit(s: &str) -> Result<(String, String, f64), String> {
    let (target, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected CITY/ITEM=VALUE, got '{s}'"))?;
    let (city, item) = target
        .split_once('/')
        .ok_or_else(|| format!("expected CITY/ITEM before '=', got '{target}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok((city.trim().to_string(), item.trim().to_string(), value))
}

fn load_settings(cli: &Cli) -> Result<MarkupSettings, MarkupError> {
    match &cli.config {
        Some(path) => MarkupSettings::load(path),
        None => Ok(MarkupSettings::default()),
    }
}

fn apply_scan_args(settings: &mut MarkupSettings, args: &ScanArgs) {
    if let Some(save) = &args.save {
        settings.save_path = Some(save.clone());
    }
    if let Some(lower) = args.lower {
        settings.bounds.lower = lower;
    }
    if let Some(upper) = args.upper {
        settings.bounds.upper = upper;
    }
    if let Some(ratio) = args.frequency_ratio {
        settings.frequency_ratio = ratio;
    }
}

fn apply_dictionary_args(settings: &mut MarkupSettings, args: &DictionaryArgs) {
    if !args.dictionaries.is_empty() {
        settings.dictionary_paths = args.dictionaries.clone();
    }
    settings.install_roots.extend(args.install_roots.iter().cloned());
}

fn cmd_extract(mut settings: MarkupSettings, args: &ExtractArgs) -> Result<(), MarkupError> {
    apply_scan_args(&mut settings, &args.scan);
    let save_path = resolve_save_path(&settings)?;
    let extraction = extract_from_file(&save_path, &settings)?;

    if args.debug_segments {
        let len = std::fs::metadata(&save_path)?.len() as usize;
        println!(
            "{}",
            debug_dump_city_segments(len, &extraction.cities, &extraction.records)
        );
    }

    let table = if args.offsets {
        extraction.table.clone()
    } else {
        extraction.table.values_only()
    };
    save_table(&table, &args.output)?;

    let s = &extraction.summary;
    if table.is_empty() {
        println!("No markups extracted from {}.", save_path.display());
    } else {
        println!(
            "Extracted {} markups across {} cities ({} range-rejected, {} rare items dropped) -> {}",
            s.surviving_entries,
            s.surviving_cities,
            s.range_rejected,
            s.dropped_items.len(),
            args.output.display()
        );
    }
    Ok(())
}

fn cmd_translate(mut settings: MarkupSettings, args: &TranslateArgs) -> Result<(), MarkupError> {
    apply_dictionary_args(&mut settings, &args.dictionaries);
    let table = load_table(&args.input)?;
    ensure_offsets(&table, &args.input)?;
    let dictionaries = if table.is_empty() {
        Vec::new()
    } else {
        resolve_dictionary_paths(&settings)
    };
    if !table.is_empty() && dictionaries.is_empty() {
        tracing::warn!("no dictionary files found; item identifiers will be kept");
    }
    let translation = translate_from_files(&table, &dictionaries);
    save_table(&translation.table, &args.output)?;

    println!(
        "Translated {} item names ({} unresolved) -> {}",
        translation.names.len(),
        translation.unresolved.len(),
        args.output.display()
    );
    for id in &translation.unresolved {
        println!("  unresolved: {id}");
    }
    Ok(())
}

fn cmd_run(mut settings: MarkupSettings, args: &RunArgs) -> Result<(), MarkupError> {
    apply_scan_args(&mut settings, &args.scan);
    apply_dictionary_args(&mut settings, &args.dictionaries);
    if let Some(dir) = &args.output_dir {
        settings.output_path = dir.clone();
    }
    settings.debug |= args.debug;

    let report = run(&settings)?;
    println!("Save file: {}", report.save_path.display());
    println!("Extracted table: {}", report.extracted_path.display());
    match &report.translated_path {
        Some(path) => {
            println!(
                "Translated table: {} ({} entries, {} dictionaries, {} unresolved)",
                path.display(),
                report.summary.surviving_entries,
                report.dictionaries,
                report.unresolved.len()
            );
        }
        None => println!("No markups found; nothing to translate."),
    }
    Ok(())
}

fn cmd_list(args: &ListArgs) -> Result<(), MarkupError> {
    let table = load_table(&args.table)?;
    let mut session = EditSession::from_table(&table);
    session.set_filters(&args.filter.city, &args.filter.item);

    let mut shown = 0usize;
    for row in session.visible_rows() {
        println!(
            "{:<22} {:<40} {:>8.2}  @0x{:08X}",
            row.city, row.item, row.value, row.offset
        );
        shown += 1;
    }
    if shown == 0 {
        println!("No rows.");
    }
    Ok(())
}

fn cmd_apply(settings: MarkupSettings, args: &ApplyArgs) -> Result<(), MarkupError> {
    let mode = if args.direct_write {
        if !args.yes {
            return Err(MarkupError::Config(
                "--direct-write overwrites the original save; pass --yes to confirm".to_string(),
            ));
        }
        SaveMode::DirectWrite
    } else {
        SaveMode::LocalCopy
    };

    let mut settings = settings;
    if let Some(save) = &args.save {
        settings.save_path = Some(save.clone());
    }
    let save_path = resolve_save_path(&settings)?;

    let table = load_table(&args.table)?;
    let mut session = EditSession::from_table(&table);
    session.set_filters(&args.filter.city, &args.filter.item);

    if let Some(distribution) = args.randomize {
        let changed = session.randomize(&RandomizeSettings {
            lower: args.lower_cap,
            upper: args.upper_cap,
            distribution: distribution.into(),
            seed: args.seed,
        })?;
        if changed == 0 {
            println!("No rows matched the filters; nothing randomized.");
        }
    }

    for (city, item, value) in &args.edits {
        if let Err(err) = session.set_value(city, item, *value) {
            eprintln!("Warning: {err}");
        }
    }

    let report = apply_session(&session, &save_path, mode, &args.output_dir)?;
    for err in &report.rejected {
        eprintln!("Skipped: {err}");
    }
    if report.written == 0 {
        println!("No markups were modified.");
    } else {
        println!(
            "{} change(s) written to {}",
            report.written,
            report.target.display()
        );
    }
    Ok(())
}

fn cmd_export_csv(args: &ExportCsvArgs) -> Result<(), MarkupError> {
    let table = load_table(&args.input)?;
    if table.is_empty() {
        println!("Table is empty; no CSV written.");
        return Ok(());
    }
    let layout = if args.cities_as_columns {
        CsvLayout::CitiesAsColumns
    } else {
        CsvLayout::CitiesAsRows
    };
    let rows = export_csv(&table, layout, &args.output)?;
    println!("Wrote {rows} rows to {}", args.output.display());
    Ok(())
}

fn log_config(cli: &Cli) -> LogConfig {
    let mut config = LogConfig::from_verbosity(cli.verbose, cli.quiet);
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config
}

fn dispatch(cli: &Cli) -> Result<(), MarkupError> {
    match &cli.command {
        Command::List(args) => cmd_list(args),
        Command::ExportCsv(args) => cmd_export_csv(args),
        command => {
            let settings = load_settings(cli)?;
            match command {
                Command::Extract(args) => cmd_extract(settings, args),
                Command::Translate(args) => cmd_translate(settings, args),
                Command::Run(args) => cmd_run(settings, args),
                Command::Apply(args) => cmd_apply(settings, args),
                Command::List(_) | Command::ExportCsv(_) => Ok(()),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&log_config(&cli)) {
        eprintln!("Error: failed to initialise logging: {err}");
        std::process::exit(1);
    }

    if let Err(err) = dispatch(&cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
