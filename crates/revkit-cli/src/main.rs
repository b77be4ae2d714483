mod logging;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use revkit_core::{
    AppConfig, Blocking, ConfigurationError, DedupConfig, DeduplicationResult, ExitCode,
    MatchMethod, RecordTable, Representative, RevkitError, deduplicate, extract_unique,
};
use revkit_formats::{Format, FormatError};

use crate::logging::{LogConfig, init_logging};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "revkit",
    about = "Find and merge duplicate bibliographic records",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting REVKIT_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Detect duplicate records across one or more files.
    Dedup(DedupArgs),

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags override the `[dedup]` section of the config file.
#[derive(Args, Debug)]
struct DedupArgs {
    /// Input files (.ris, .csv, .tsv, .txt).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Field to compare on. Repeat for fallback fields, tried in order.
    #[arg(long = "match-by", value_name = "FIELD", action = clap::ArgAction::Append)]
    match_by: Vec<String>,

    /// `exact`, `fuzzy` or `fuzzy:<osa|levenshtein|damerau-levenshtein|jaro-winkler|token-sort>`.
    #[arg(long)]
    method: Option<MatchMethod>,

    /// Minimum similarity ratio for fuzzy matches, in [0, 1].
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long, overrides_with = "no_lower")]
    to_lower: bool,
    #[arg(long, overrides_with = "to_lower")]
    no_lower: bool,

    #[arg(long, overrides_with = "keep_punctuation")]
    rm_punctuation: bool,
    #[arg(long, overrides_with = "rm_punctuation")]
    keep_punctuation: bool,

    /// Fold accented letters to their base letter before comparing.
    #[arg(long)]
    strip_diacritics: bool,

    /// Only compare records whose first match value shares this many leading characters.
    #[arg(long, value_name = "N", conflicts_with = "group_by")]
    block_prefix: Option<usize>,

    /// Only compare records with equal values in these fields.
    #[arg(long = "group-by", value_name = "FIELD", action = clap::ArgAction::Append)]
    group_by: Vec<String>,

    /// Which record of each cluster is kept: `first` or `most-complete`.
    #[arg(long)]
    representative: Option<Representative>,

    /// Fill fields missing on the kept record from its duplicates.
    #[arg(long)]
    merge: bool,

    /// Write the unique records here; format follows the extension.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show the effective config.
    Show,
    /// Print the config file path.
    Path,
    /// Write a default config file.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() -> std::process::ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            let code = if err.use_stderr() {
                ExitCode::InvalidArgs
            } else {
                ExitCode::Success
            };
            return process_exit_code(code);
        }
    };

    let json_output = cli.json || std::env::var("REVKIT_JSON").as_deref() == Ok("1");

    match run(cli, json_output) {
        Ok(()) => process_exit_code(ExitCode::Success),
        Err(err) => {
            let code = exit_code_for(&err);
            if json_output {
                let envelope = serde_json::json!({
                    "status": "error",
                    "error": { "message": format!("{err:#}"), "code": code as i32 },
                });
                println!("{envelope:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            process_exit_code(code)
        }
    }
}

fn run(cli: Cli, json_output: bool) -> Result<()> {
    let start = Instant::now();

    let config_path = config_path();
    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    init_logging(
        &LogConfig::from_settings(&config.logging, cli.verbose)
            .with_ansi(std::io::stderr().is_terminal()),
    );
    tracing::debug!(path = %config_path.display(), "config loaded");

    match cli.command {
        Commands::Dedup(args) => {
            let report = run_dedup(&args, &config)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "records": report.result.record_count(),
                        "clusters": report.result.cluster_count(),
                        "duplicates": report.result.duplicate_count(),
                        "duplicate_clusters": report.result.duplicate_clusters().collect::<Vec<_>>(),
                        "warnings": report.result.warnings,
                        "output": report.output,
                    },
                    "meta": { "duration_ms": dur, "inputs": args.inputs }
                }))?;
            } else {
                print_summary(&report);
            }
        }

        // ── Config ─────────────────────────────────────────────────────────
        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": config,
                            "meta": { "duration_ms": dur, "path": config_path }
                        }))?;
                    } else {
                        print!("{}", config.to_toml()?);
                    }
                }
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "path": config_path, "exists": config_path.exists() },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        println!("{}", config_path.display());
                    }
                }
                ConfigAction::Init { force } => {
                    if config_path.exists() && !force {
                        bail!(
                            "config file already exists at {} (use --force to overwrite)",
                            config_path.display()
                        );
                    }
                    AppConfig::default().save_to(&config_path)?;
                    if json_output {
                        print_json(&serde_json::json!({
                            "status": "ok",
                            "data": { "path": config_path },
                            "meta": { "duration_ms": dur }
                        }))?;
                    } else {
                        println!("Wrote default config to {}", config_path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Dedup ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct DedupReport {
    result: DeduplicationResult,
    /// Rows written to `output`, when an output path was given.
    written: usize,
    output: Option<PathBuf>,
}

impl DedupArgs {
    fn apply(&self, mut config: DedupConfig) -> DedupConfig {
        if !self.match_by.is_empty() {
            config.match_by = self.match_by.clone();
        }
        if let Some(method) = self.method {
            config.method = method;
        }
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(to_lower) = flag_pair(self.to_lower, self.no_lower) {
            config.normalizer.to_lower = to_lower;
        }
        if let Some(rm_punctuation) = flag_pair(self.rm_punctuation, self.keep_punctuation) {
            config.normalizer.rm_punctuation = rm_punctuation;
        }
        if self.strip_diacritics {
            config.normalizer.strip_diacritics = true;
        }
        if let Some(length) = self.block_prefix {
            config.blocking = Blocking::Prefix { length };
        } else if !self.group_by.is_empty() {
            config.blocking = Blocking::Fields {
                fields: self.group_by.clone(),
            };
        }
        if let Some(representative) = self.representative {
            config.representative = representative;
        }
        config
    }
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn run_dedup(args: &DedupArgs, config: &AppConfig) -> Result<DedupReport> {
    let table = revkit_formats::import_files(&args.inputs)?;
    let dedup_config = args.apply(config.dedup.clone());
    let result = deduplicate(&table, &dedup_config)?;

    let mut written = 0;
    if let Some(output) = &args.output {
        let merge = args.merge || config.output.merge_fields;
        let unique = extract_unique(&table, &result, merge);
        write_output(&unique, output, &config.output.default_format)?;
        written = unique.len();
    }

    Ok(DedupReport {
        result,
        written,
        output: args.output.clone(),
    })
}

/// Uses the path's extension, or the configured default format when the
/// extension is missing or unknown.
fn write_output(table: &RecordTable, path: &Path, default_format: &str) -> Result<()> {
    let format = match Format::from_path(path) {
        Ok(format) => format,
        Err(_) => Format::from_name(default_format)
            .ok_or_else(|| FormatError::UnsupportedFormat(default_format.to_string()))?,
    };
    revkit_formats::export_file_as(table, path, format)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &DedupReport) {
    let result = &report.result;
    println!("Records:     {}", result.record_count());
    println!("Clusters:    {}", result.cluster_count());
    println!("Duplicates:  {}", result.duplicate_count());
    if !result.warnings.is_empty() {
        println!(
            "Warnings:    {} records had no value to compare on",
            result.warnings.len()
        );
    }
    if let Some(output) = &report.output {
        println!("Wrote {} records to {}", report.written, output.display());
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// `REVKIT_CONFIG` wins over the standard location.
fn config_path() -> PathBuf {
    std::env::var_os("REVKIT_CONFIG")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path)
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(err) = err.downcast_ref::<RevkitError>() {
        return err.exit_code();
    }
    if err.downcast_ref::<ConfigurationError>().is_some() {
        return ExitCode::InvalidArgs;
    }
    if let Some(err) = err.downcast_ref::<FormatError>() {
        return match err {
            FormatError::Io(_) => ExitCode::FileSystemError,
            FormatError::UnsupportedFormat(_) => ExitCode::InvalidArgs,
            FormatError::Parse { .. } | FormatError::Csv(_) => ExitCode::GeneralError,
        };
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return ExitCode::FileSystemError;
    }
    ExitCode::GeneralError
}

fn process_exit_code(code: ExitCode) -> std::process::ExitCode {
    std::process::ExitCode::from(code as u8)
}
