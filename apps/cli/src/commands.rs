//! CLI command definitions, routing, and tracing setup.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::info;

use cityprep_citygml::{InsertOptions, UsetypeOptions, insert_attributes, merge_documents, remap_usetypes};
use cityprep_lookup::AttributeTable;
use cityprep_shared::{AppConfig, init_config, load_config};
use cityprep_weather::convert_epw_to_tmy;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// cityprep — prepare city-model and weather data for energy simulation.
#[derive(Parser)]
#[command(
    name = "cityprep",
    version,
    about = "Attach attributes, remap use types, and convert weather files for urban-energy simulation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Insert lookup-table attributes into CityGML buildings.
    Attributes {
        /// CityGML file, or a directory of .gml/.xml files.
        #[arg(long)]
        input: PathBuf,

        /// CSV lookup table. In directory mode each model defaults to the
        /// table with the same file stem.
        #[arg(long)]
        table: Option<PathBuf>,

        /// Output file, or output directory in directory mode.
        #[arg(long)]
        out: PathBuf,

        /// Write a machine-readable JSON run report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Remap use-type codes to the simulation vocabulary.
    Usetype {
        /// CityGML file, or a directory of .gml/.xml files.
        #[arg(long)]
        input: PathBuf,

        /// Output file, or output directory in directory mode.
        #[arg(long)]
        out: PathBuf,

        /// Replacement for codes missing from the translation table
        /// (overrides the config file).
        #[arg(long)]
        default_code: Option<String>,

        /// Write a machine-readable JSON run report to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Convert an EPW weather file to the TMY3-like layout.
    Weather {
        /// EPW file, or a directory of .epw files.
        #[arg(long)]
        input: PathBuf,

        /// Output file, or output directory in directory mode.
        #[arg(long)]
        out: PathBuf,
    },

    /// Merge CityGML documents; members of later inputs are appended to the first.
    Merge {
        /// Input documents (at least two); the first is the base.
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        /// Output file.
        #[arg(long)]
        out: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "cityprep=info",
        1 => "cityprep=debug",
        _ => "cityprep=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Attributes {
            input,
            table,
            out,
            report,
        } => cmd_attributes(&input, table.as_deref(), &out, report.as_deref()),
        Command::Usetype {
            input,
            out,
            default_code,
            report,
        } => cmd_usetype(&input, &out, default_code, report.as_deref()),
        Command::Weather { input, out } => cmd_weather(&input, &out),
        Command::Merge { inputs, out } => cmd_merge(&inputs, &out),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// attributes
// ---------------------------------------------------------------------------

fn cmd_attributes(
    input: &Path,
    table: Option<&Path>,
    out: &Path,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let opts = insert_options(&config);

    if input.is_dir() {
        let files = model_files_in(input)?;
        fs::create_dir_all(out)?;
        let bar = progress_bar(files.len());
        let mut entries = Vec::new();
        let mut failures = 0usize;

        for file in &files {
            bar.set_message(display_name(file));
            let table_path = match table {
                Some(path) => path.to_path_buf(),
                None => file.with_extension("csv"),
            };
            if !table_path.exists() {
                tracing::warn!(model = %file.display(), table = %table_path.display(), "no lookup table, skipping model");
                entries.push(json!({
                    "file": display_name(file),
                    "error": format!("lookup table {} not found", table_path.display()),
                }));
                failures += 1;
                bar.inc(1);
                continue;
            }

            let report = insert_one(file, &table_path, &out.join(file_name(file)?), &opts)?;
            if report.has_failures() {
                failures += 1;
            }
            entries.push(json!({ "file": display_name(file), "report": report }));
            bar.inc(1);
        }
        bar.finish_and_clear();

        if let Some(path) = report_path {
            write_report(path, &json!(entries))?;
        }
        if failures > 0 {
            return Err(eyre!(
                "{failures} of {} models had failing rows; fix the source data and re-run",
                files.len()
            ));
        }
        println!("  Processed {} models into {}", files.len(), out.display());
        return Ok(());
    }

    let table_path =
        table.ok_or_else(|| eyre!("--table is required when --input is a single file"))?;
    let out_file = resolve_out_file(out, input)?;
    let report = insert_one(input, table_path, &out_file, &opts)?;

    println!();
    println!("  Attributes inserted");
    println!("  Buildings matched:  {}", report.buildings_matched);
    println!("  Attributes written: {}", report.attributes_written);
    println!("  Unmatched ids:      {}", report.unmatched_ids.len());
    println!("  Malformed rows:     {}", report.issues.len());
    println!("  Output:             {}", out_file.display());
    println!();

    for id in &report.unmatched_ids {
        eprintln!("  no building with id `{id}` in the document");
    }
    for issue in &report.issues {
        eprintln!("  {issue}");
    }

    if let Some(path) = report_path {
        write_report(path, &serde_json::to_value(&report)?)?;
    }

    if report.has_failures() {
        return Err(eyre!(
            "{} rows failed; fix the source data and re-run",
            report.unmatched_ids.len() + report.issues.len()
        ));
    }
    Ok(())
}

fn insert_one(
    model: &Path,
    table_path: &Path,
    out_file: &Path,
    opts: &InsertOptions,
) -> Result<cityprep_shared::InsertReport> {
    info!(model = %model.display(), table = %table_path.display(), "inserting attributes");

    let table = AttributeTable::from_path(table_path)?;
    let xml = fs::read_to_string(model)?;
    let (output, report) = insert_attributes(&xml, &table, opts)?;
    fs::write(out_file, output)?;

    Ok(report)
}

// ---------------------------------------------------------------------------
// usetype
// ---------------------------------------------------------------------------

fn cmd_usetype(
    input: &Path,
    out: &Path,
    default_code: Option<String>,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let opts = UsetypeOptions {
        default_code: default_code.or(config.usetype.default_code.clone()),
        overrides: config.usetype.overrides.clone(),
    };

    if input.is_dir() {
        let files = model_files_in(input)?;
        fs::create_dir_all(out)?;
        let bar = progress_bar(files.len());
        let mut entries = Vec::new();
        let mut failures = 0usize;

        for file in &files {
            bar.set_message(display_name(file));
            let report = remap_one(file, &out.join(file_name(file)?), &opts)?;
            if report.has_failures() {
                failures += 1;
            }
            entries.push(json!({ "file": display_name(file), "report": report }));
            bar.inc(1);
        }
        bar.finish_and_clear();

        if let Some(path) = report_path {
            write_report(path, &json!(entries))?;
        }
        if failures > 0 {
            return Err(eyre!(
                "{failures} of {} models carry unknown use-type codes",
                files.len()
            ));
        }
        println!("  Processed {} models into {}", files.len(), out.display());
        return Ok(());
    }

    let out_file = resolve_out_file(out, input)?;
    let report = remap_one(input, &out_file, &opts)?;

    println!();
    println!("  Use types remapped");
    println!("  Replaced:  {}", report.replaced);
    println!("  Defaulted: {}", report.defaulted);
    println!("  Unknown:   {}", report.unknown.len());
    println!("  Output:    {}", out_file.display());
    println!();

    for unknown in &report.unknown {
        match &unknown.building_id {
            Some(id) => eprintln!("  unknown code `{}` on building `{id}`", unknown.code),
            None => eprintln!("  unknown code `{}`", unknown.code),
        }
    }

    if let Some(path) = report_path {
        write_report(path, &serde_json::to_value(&report)?)?;
    }

    if report.has_failures() {
        return Err(eyre!(
            "{} use-type codes are not in the translation table",
            report.unknown.len()
        ));
    }
    Ok(())
}

fn remap_one(
    model: &Path,
    out_file: &Path,
    opts: &UsetypeOptions,
) -> Result<cityprep_shared::RemapReport> {
    info!(model = %model.display(), "remapping use types");

    let xml = fs::read_to_string(model)?;
    let (output, report) = remap_usetypes(&xml, opts)?;
    fs::write(out_file, output)?;

    Ok(report)
}

// ---------------------------------------------------------------------------
// weather
// ---------------------------------------------------------------------------

fn cmd_weather(input: &Path, out: &Path) -> Result<()> {
    if input.is_dir() {
        let files = weather_files_in(input)?;
        fs::create_dir_all(out)?;
        let bar = progress_bar(files.len());

        for file in &files {
            bar.set_message(display_name(file));
            let out_file = out.join(file_name(file)?).with_extension("csv");
            convert_epw_to_tmy(file, &out_file)?;
            bar.inc(1);
        }
        bar.finish_and_clear();

        println!("  Converted {} weather files into {}", files.len(), out.display());
        return Ok(());
    }

    let out_file = resolve_out_file(out, input)?;
    let summary = convert_epw_to_tmy(input, &out_file)?;

    println!();
    println!("  Weather file converted");
    println!("  Station: {}", summary.station_name);
    println!("  Records: {}", summary.records);
    println!("  Output:  {}", out_file.display());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

fn cmd_merge(inputs: &[PathBuf], out: &Path) -> Result<()> {
    info!(documents = inputs.len(), "merging documents");

    let contents: Vec<String> = inputs
        .iter()
        .map(|path| fs::read_to_string(path).map_err(|e| eyre!("{}: {e}", path.display())))
        .collect::<Result<_>>()?;
    let others: Vec<&str> = contents[1..].iter().map(String::as_str).collect();

    let (output, report) = merge_documents(&contents[0], &others)?;
    fs::write(out, output)?;

    println!();
    println!("  Documents merged");
    println!("  Inputs:           {}", report.documents);
    println!("  Members appended: {}", report.members_appended);
    println!("  Output:           {}", out.display());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn insert_options(config: &AppConfig) -> InsertOptions {
    InsertOptions {
        pretty: config.defaults.pretty_print,
        indent: config.defaults.indent,
    }
}

/// CityGML files in a directory, sorted by name.
fn model_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extensions(dir, &["gml", "xml"])
}

/// EPW files in a directory, sorted by name.
fn weather_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extensions(dir, &["epw"])
}

fn files_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| eyre!("{}: {e}", dir.display()))? {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|ext| e.eq_ignore_ascii_case(ext)));
        if matches {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(eyre!(
            "no {} files found in {}",
            extensions.join("/"),
            dir.display()
        ));
    }
    Ok(files)
}

/// Use `out` directly, or `out/<input name>` when `out` is a directory.
fn resolve_out_file(out: &Path, input: &Path) -> Result<PathBuf> {
    if out.is_dir() {
        Ok(out.join(file_name(input)?))
    } else {
        Ok(out.to_path_buf())
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name()
        .ok_or_else(|| eyre!("{} has no file name", path.display()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_report(path: &Path, value: &serde_json::Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!(report = %path.display(), "run report written");
    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid progress template"),
    );
    bar
}
