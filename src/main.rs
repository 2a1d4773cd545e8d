//! Hydroweave CLI Entry Point
//!
//! Provides command-line access to workflow loading, execution and rule
//! file generation.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow description
//! hydroweave workflow.yml
//!
//! # Preview without running anything
//! hydroweave workflow.yml --dry-run
//!
//! # Generate a Snakefile instead of executing
//! hydroweave workflow.yml --snakemake Snakefile
//!
//! # Run a single registered method (used by generated rule files)
//! hydroweave run-method shell command="touch {out}" out=data/out.txt
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use log::{error, info};

use hydroweave::execution::run_method_with_checks;
use hydroweave::methods::ShellMethod;
use hydroweave::render::{load_workflow, to_snakemake};
use hydroweave::workflow::{MethodRegistry, Value};
use hydroweave::{APP_NAME, VERSION};

/// Default maximum concurrent runs within one rule.
const DEFAULT_MAX_WORKERS: usize = 4;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    snakefile: Option<PathBuf>,
    dry_run: bool,
    strict_missing: bool,
    working_dir: Option<PathBuf>,
    max_workers: usize,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: String::new(),
            snakefile: None,
            dry_run: false,
            strict_missing: false,
            working_dir: None,
            max_workers: DEFAULT_MAX_WORKERS,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

fn print_usage() {
    println!("Usage: hydroweave [OPTIONS] <WORKFLOW_FILE>");
    println!("       hydroweave run-method <METHOD> [KEY=VALUE...]");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to a workflow description (YAML)");
    println!();
    println!("Options:");
    println!("  --dry-run           Check the workflow and touch placeholder files");
    println!("  --strict            Treat missing input files as errors in dry runs");
    println!("  --snakemake PATH    Write a Snakefile instead of executing");
    println!("  --working-dir PATH  Set working directory for file operations");
    println!("  --workers N         Maximum concurrent runs per rule (default: {})", DEFAULT_MAX_WORKERS);
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  hydroweave flood_risk.yml --dry-run");
    println!("  hydroweave flood_risk.yml --snakemake Snakefile");
    println!("  hydroweave flood_risk.yml --workers 8");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--strict" => {
                config.strict_missing = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--snakemake" => {
                i += 1;
                if i >= args.len() {
                    return Err("--snakemake requires a path argument".to_string());
                }
                config.snakefile = Some(PathBuf::from(&args[i]));
            }
            "--working-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--working-dir requires a path argument".to_string());
                }
                config.working_dir = Some(PathBuf::from(&args[i]));
            }
            "--workers" => {
                i += 1;
                if i >= args.len() {
                    return Err("--workers requires a number argument".to_string());
                }
                config.max_workers = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid workers value: {}", args[i]))?;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if !config.workflow_path.is_empty() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.workflow_path = arg.clone();
            }
        }
        i += 1;
    }

    if config.workflow_path.is_empty() {
        return Err("No workflow file specified".to_string());
    }
    Ok(config)
}

/// Parses `KEY=VALUE` pairs for the run-method command. Values that look
/// like numbers or booleans are converted; everything else stays a string
/// for schema-driven coercion.
fn parse_kwargs(args: &[String]) -> Result<BTreeMap<String, Value>, String> {
    let mut kwargs = BTreeMap::new();
    for pair in args {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid syntax for KEY=VALUE arg: {}", pair))?;
        let value = if let Ok(n) = value.parse::<f64>() {
            Value::Number(n)
        } else if let Ok(b) = value.parse::<bool>() {
            Value::Bool(b)
        } else {
            Value::String(value.to_string())
        };
        kwargs.insert(key.to_string(), value);
    }
    Ok(kwargs)
}

/// Builds the registry of methods known to this binary.
fn build_registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    ShellMethod::register(&mut registry);
    registry
}

/// Validates and changes into the working directory.
fn setup_working_directory(working_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(dir) = working_dir else {
        return Ok(());
    };

    if !dir.is_dir() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }
    env::set_current_dir(&dir)?;
    info!("Working directory: {}", env::current_dir()?.display());
    Ok(())
}

/// Runs a single registered method: `hydroweave run-method <METHOD> KEY=VALUE...`
fn run_method(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let Some(method_name) = args.first() else {
        return Err("run-method requires a method name".into());
    };
    let kwargs = parse_kwargs(&args[1..])?;

    let registry = build_registry();
    let method = registry.build_from_values(method_name, kwargs)?;
    run_method_with_checks(method.as_ref(), method_name)?;
    info!("Method '{}' completed", method_name);
    Ok(())
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Single-method mode, used by generated rule files
    if args.len() > 1 && args[1] == "run-method" {
        setup_logging(false);
        return run_method(&args[2..]);
    }

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!();

    setup_working_directory(config.working_dir)?;

    let workflow = load_workflow(config.workflow_path.as_ref(), build_registry()).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        e
    })?;

    if let Some(snakefile) = config.snakefile {
        to_snakemake(&workflow, &snakefile)?;
        println!("Snakefile written to {}", snakefile.display());
        return Ok(());
    }

    if config.dry_run {
        info!("Mode: DRY RUN (methods will not execute)");
        workflow.dryrun(config.strict_missing)?;
    } else {
        workflow.run(config.max_workers)?;
    }

    println!();
    println!("Workflow completed successfully");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
