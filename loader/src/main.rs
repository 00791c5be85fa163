use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use log::{debug, LevelFilter};

use modload::config::{load_config, load_var_file, parse_var_assignment};
use modload::error::LoadError;
use modload::render;
use modload::{load_mod_dir, LoadOptions, LoadStatus};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum Emit {
    /// Diagnostics, then the resource tree
    Tree,
    /// A JSON report of the whole load
    Json,
    /// Diagnostics only
    Diagnostics,
}

#[derive(Parser, Debug)]
#[command(
    name = "modload",
    version,
    about = "Decodes .sp mod definitions into a reference-resolved resource tree"
)]
struct Cli {
    /// Mod directory containing .sp files
    path: PathBuf,

    /// Set a variable, NAME=VALUE (repeatable)
    #[arg(long = "var", value_name = "NAME=VALUE")]
    vars: Vec<String>,

    /// TOML file of variable values (repeatable)
    #[arg(long = "var-file", value_name = "FILE")]
    var_files: Vec<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only decode blocks of this type (repeatable)
    #[arg(long = "only", value_name = "TYPE")]
    only: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Emit::Tree)]
    emit: Emit,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = LevelFilter::from_str(&cli.log_level).unwrap_or_else(|_| {
        eprintln!("modload: invalid log level '{}', using 'warn'", cli.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("modload: error: {e}");
            ExitCode::from(2)
        }
    }
}

fn options(cli: &Cli) -> Result<LoadOptions, LoadError> {
    let mut options = load_config(cli.config.as_deref(), &cli.path)?.into_options();
    for path in &cli.var_files {
        options.variables.extend(load_var_file(path)?);
    }
    for assignment in &cli.vars {
        let (name, value) = parse_var_assignment(assignment)?;
        options.variables.insert(name, value);
    }
    if !cli.only.is_empty() {
        options.block_types = Some(cli.only.clone());
    }
    debug!(variables = options.variables.len(); "resolved load options");
    Ok(options)
}

fn run(cli: &Cli) -> Result<ExitCode, LoadError> {
    let options = options(cli)?;
    let loaded = load_mod_dir(&cli.path, &options)?;
    let result = &loaded.result;

    match cli.emit {
        Emit::Json => match render::render_json(result, &loaded.sources) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("modload: error: {e}");
                return Ok(ExitCode::from(2));
            }
        },
        Emit::Tree | Emit::Diagnostics => {
            if !result.diagnostics.is_empty() {
                eprintln!("{}", render::render_diagnostics(&result.diagnostics, &loaded.sources));
            }
            if matches!(cli.emit, Emit::Tree) {
                print!("{}", render::render_tree(&result.tree));
            }
            eprintln!("modload: {}", render::render_status(result));
        }
    }

    Ok(match result.status() {
        LoadStatus::Clean => ExitCode::SUCCESS,
        LoadStatus::Failed { .. } => ExitCode::from(1),
    })
}
