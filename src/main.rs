//! Livesheet - spreadsheet formula engine, command-line front end

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use livesheet_core::storage::{export_csv, import_csv, save_workbook, write_csv};
use livesheet_core::{EngineConfig, Workbook};
use livesheet_engine::builtins::{BUILTINS, SystemClock};
use livesheet_engine::engine::format_value;

fn print_usage() {
    eprintln!("Usage: livesheet [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Workbook to open (.json)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula against the active sheet and print it");
    eprintln!("  --csv <FILE>              Load the active sheet from a CSV file");
    eprintln!("  -o, --output <FILE>       Export to .csv (active sheet) or .json (workbook)");
    eprintln!("  --recalculate             Recalculate every formula after loading");
    eprintln!("  --config <FILE>           Load engine settings from a TOML file");
    eprintln!("  --no-config               Ignore the user config file (--config still applies)");
    eprintln!("  --list-functions          List built-in functions");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default)]
struct Options {
    file_path: Option<PathBuf>,
    csv_path: Option<PathBuf>,
    output_file: Option<PathBuf>,
    config_file: Option<PathBuf>,
    command: Option<String>,
    recalculate: bool,
    no_config: bool,
    list_functions: bool,
}

fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut options = Options::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-c" | "--command" => {
                i += 1;
                let Some(formula) = args.get(i) else {
                    bail!("--command requires a formula");
                };
                options.command = Some(formula.clone());
            }
            "--csv" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--csv requires a file path");
                };
                options.csv_path = Some(PathBuf::from(path));
            }
            "-o" | "--output" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--output requires a file path");
                };
                options.output_file = Some(PathBuf::from(path));
            }
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config requires a file path");
                };
                options.config_file = Some(PathBuf::from(path));
            }
            "--recalculate" => options.recalculate = true,
            "--no-config" => options.no_config = true,
            "--list-functions" => options.list_functions = true,
            arg if arg.starts_with('-') => {
                print_usage();
                bail!("Unknown option: {}", arg);
            }
            arg => {
                if options.file_path.is_some() {
                    print_usage();
                    bail!("Unexpected argument: {}", arg);
                }
                options.file_path = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    if options.file_path.is_some() && options.csv_path.is_some() {
        bail!("FILE and --csv cannot be used together");
    }
    Ok(Some(options))
}

fn user_config_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "livesheet")?;
    let mut path = proj.config_dir().to_path_buf();
    path.push("config.toml");
    Some(path)
}

fn load_config(options: &Options) -> Result<EngineConfig> {
    if let Some(path) = &options.config_file {
        return EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    if options.no_config {
        return Ok(EngineConfig::default());
    }
    match user_config_path() {
        Some(path) => EngineConfig::load_or_default(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_input(options: &Options, config: &EngineConfig) -> Result<Workbook> {
    if let Some(path) = &options.file_path {
        return config
            .open_workbook(path)
            .with_context(|| format!("failed to open {}", path.display()));
    }

    let mut workbook = config.new_workbook();
    if let Some(path) = &options.csv_path {
        import_csv(path, workbook.active_sheet_mut())
            .with_context(|| format!("failed to import {}", path.display()))?;
    }
    Ok(workbook)
}

fn export(path: &Path, workbook: &Workbook) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => export_csv(path, workbook.active_sheet())?,
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            save_workbook(path, workbook, &SystemClock)?
        }
        _ => bail!(
            "cannot export to {}: expected a .csv or .json file",
            path.display()
        ),
    }
    Ok(())
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().collect();
    let Some(options) = parse_args(&args)? else {
        return Ok(ExitCode::SUCCESS);
    };

    if options.list_functions {
        for builtin in BUILTINS {
            println!("{:<12} {}", builtin.name, builtin.description);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&options)?;
    tracing::debug!(?config, "engine configuration");
    let mut workbook = load_input(&options, &config)?;
    if options.recalculate {
        for id in workbook
            .sheets()
            .iter()
            .map(|sheet| sheet.id().to_string())
            .collect::<Vec<_>>()
        {
            if let Some(sheet) = workbook.sheet_mut(&id) {
                sheet.recalculate();
            }
        }
    }

    if let Some(command) = &options.command {
        let formula = if command.starts_with('=') {
            command.clone()
        } else {
            format!("={}", command)
        };
        let sheet = workbook.active_sheet();
        let value = sheet.evaluator().evaluate(&formula, sheet);
        println!("{}", format_value(&value));
        if value.is_error() {
            return Ok(ExitCode::FAILURE);
        }
    }

    if let Some(path) = &options.output_file {
        export(path, &workbook).with_context(|| format!("failed to export {}", path.display()))?;
        println!("Exported to {}", path.display());
    } else if options.command.is_none() {
        write_csv(workbook.active_sheet(), std::io::stdout().lock())?;
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
