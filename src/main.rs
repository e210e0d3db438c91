use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use depshield::{
    config::Config,
    model::{ScanResult, Severity},
    output::{format_result_to_string, print_result, OutputFormat},
    progress::{Phase, ProgressEvent},
    scan::ScanContext,
    source::DirectorySource,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
}

#[derive(Parser)]
#[command(name = "depshield")]
#[command(
    author,
    version,
    about = "Scan dependency manifests for known vulnerabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a local checkout
    Scan {
        /// Repository directory
        path: String,

        /// Output format (table, json, csv)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<String>,

        /// Exit with error if vulnerabilities at or above this severity are found
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,

        /// Maximum concurrent vulnerability queries
        #[arg(long)]
        concurrency: Option<usize>,

        /// Per-query timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// List supported manifest files
    ListManifests,

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl FailLevel {
    fn threshold(self) -> Severity {
        match self {
            FailLevel::Critical => Severity::Critical,
            FailLevel::High => Severity::High,
            FailLevel::Medium => Severity::Medium,
            FailLevel::Low => Severity::Low,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            format,
            output,
            fail_on,
            concurrency,
            timeout,
            verbose,
        } => {
            init_logging(verbose);

            let mut config = Config::load().context("failed to load config")?;
            if let Some(concurrency) = concurrency {
                config.concurrency = concurrency;
            }
            if let Some(timeout) = timeout {
                config.query_timeout_secs = timeout;
            }
            config.validate()?;

            let format_str = format.unwrap_or(config.default_format.clone());
            run_scan(config, path, format_str, output, fail_on).await
        }
        Commands::ListManifests => {
            list_manifests();
            Ok(exit_codes::SUCCESS)
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

/// Logs go to stderr so JSON and CSV on stdout stay clean.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("depshield={default_level}")));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

async fn run_scan(
    config: Config,
    path: String,
    format: String,
    output_file: Option<String>,
    fail_on: Option<FailLevel>,
) -> Result<u8> {
    let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table;

    let source = Arc::new(DirectorySource::new(config.skip_directories.clone()));
    let mut events = ScanContext::from_config(&config, source).scan(path);

    let progress = is_interactive.then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let mut outcome = None;
    while let Some(event) = events.next().await {
        if let Some(pb) = &progress {
            pb.set_length(event.total as u64);
            pb.set_position(event.processed as u64);
            match (&event.current_package, &event.message) {
                (Some(package), _) => pb.set_message(package.clone()),
                (None, Some(message)) => pb.set_message(message.clone()),
                (None, None) => {}
            }
        }

        if event.phase.is_terminal() {
            outcome = Some(scan_outcome(event));
            break;
        }
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }

    let result = outcome.unwrap_or_else(|| Err(anyhow::anyhow!("scan ended without a result")))?;

    if let Some(path) = output_file {
        let content = format_result_to_string(&result, format)?;
        std::fs::write(&path, content).with_context(|| format!("failed to write {path}"))?;
        if is_interactive {
            println!("Results written to: {}", path);
        }
    } else {
        print_result(&result, format)?;
    }

    Ok(determine_exit_code(&result, fail_on))
}

fn scan_outcome(event: ProgressEvent) -> Result<ScanResult> {
    match (event.phase, event.result) {
        (Phase::Done, Some(result)) => Ok(*result),
        _ => {
            let message = event
                .error
                .map(|err| err.to_string())
                .or(event.message)
                .unwrap_or_else(|| "scan aborted".to_string());
            Err(anyhow::anyhow!(message))
        }
    }
}

/// Exit code for the most severe finding at or above the `--fail-on` level.
fn determine_exit_code(result: &ScanResult, fail_on: Option<FailLevel>) -> u8 {
    let Some(fail_on) = fail_on else {
        return exit_codes::SUCCESS;
    };

    match result.max_severity() {
        Some(worst) if worst >= fail_on.threshold() => match worst {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            Severity::Low => exit_codes::LOW_VULN,
            Severity::Unknown => exit_codes::SUCCESS,
        },
        _ => exit_codes::SUCCESS,
    }
}

fn list_manifests() {
    println!("Supported manifests:");
    println!();

    let manifests = [
        ("package.json", "npm", "dependencies, devDependencies"),
        ("requirements*.txt", "PyPI", "one requirement per line"),
        ("Pipfile", "PyPI", "[packages], [dev-packages]"),
        ("pyproject.toml", "PyPI", "PEP 621 and Poetry tables"),
        ("Gemfile.lock", "RubyGems", "GEM specs"),
        ("go.mod", "Go", "require directives"),
        ("composer.json", "Packagist", "require, require-dev"),
    ];

    for (file, ecosystem, sections) in manifests {
        println!("  {:<20} {:<10} {}", file, ecosystem, sections);
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        Config::default().save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'depshield config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
