//! Handle Check CLI Application
//!
//! A command-line interface for finding which sites host an account with a
//! given username. This CLI application provides a user-friendly interface
//! to the handle-check-lib library.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use handle_check_lib::{
    load_env_config, load_exclusions, parse_timeout_string, BatchSummary, CheckConfig,
    ConfigManager, FileConfig, ProbeBatch, ProbeOutcome, SiteCatalog,
    UsernameChecker,
};
use serde::Serialize;
use std::process;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for handle-check
#[derive(Parser, Debug)]
#[command(name = "handle-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find which sites host an account with a given username")]
#[command(
    long_about = "Probe every site in a catalog for a username and report where an account exists.\n\nSites are described by a sherlock-style JSON catalog. Probes run concurrently under a global ceiling; a site that cannot be reached is reported as unknown and never stops the run."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Username to look for
    #[arg(value_name = "USERNAME", help_heading = "Search")]
    pub username: String,

    /// Site catalog (JSON object of site definitions)
    #[arg(long = "catalog", value_name = "FILE", help_heading = "Search")]
    pub catalog: Option<String>,

    /// Site names to skip, one per line (e.g. known false positives)
    #[arg(long = "exclude", value_name = "FILE", help_heading = "Search")]
    pub exclude: Option<String>,

    /// Only probe these sites (comma-separated or repeated)
    #[arg(long = "site", value_name = "NAME", value_delimiter = ',', help_heading = "Search")]
    pub sites: Vec<String>,

    /// Keywords to look for in found profiles (comma-separated or repeated)
    #[arg(short = 'k', long = "keyword", value_name = "KEYWORD", value_delimiter = ',', help_heading = "Search")]
    pub keywords: Vec<String>,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Output results in CSV format
    #[arg(long = "csv", help_heading = "Output Format")]
    pub csv: bool,

    /// Enable grouped, structured output with section headers
    #[arg(short = 'p', long = "pretty", help_heading = "Output Format")]
    pub pretty: bool,

    /// Also print sites where no account was found
    #[arg(short = 'a', long = "print-all", help_heading = "Output Format")]
    pub print_all: bool,

    /// Collect all results before displaying
    #[arg(long = "batch", help_heading = "Output Format")]
    pub batch: bool,

    /// Show results as they complete
    #[arg(long = "streaming", help_heading = "Output Format")]
    pub streaming: bool,

    /// Max probes in flight (default: 100, max: 1000)
    #[arg(short = 'c', long = "concurrency", help_heading = "Performance")]
    pub concurrency: Option<usize>,

    /// Per-site timeout, e.g. 5s, 500ms, 1m (default: 5s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// User-Agent sent with every probe
    #[arg(long = "user-agent", value_name = "UA", help_heading = "Protocol")]
    pub user_agent: Option<String>,

    /// Verify TLS certificates (relaxed by default)
    #[arg(long = "strict-tls", help_heading = "Protocol")]
    pub strict_tls: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show detailed debug information and error messages
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Everything a run needs, resolved from config files, environment and CLI.
#[derive(Debug, Clone)]
struct Settings {
    check: CheckConfig,
    catalog: String,
    exclude: Option<String>,
    format: OutputFormat,
    pretty: bool,
    print_all: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_logging(&args);
    info!("handle-check v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_handle_check(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Set up the tracing subscriber. `RUST_LOG` wins over the CLI flags.
fn init_logging(args: &Args) {
    let default_filter = if args.debug {
        "handle_check_lib=debug,handle_check=debug,warn"
    } else if args.verbose {
        "handle_check_lib=info,handle_check=info,warn"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if args.username.trim().is_empty() {
        return Err("Username cannot be empty".to_string());
    }

    // Can't have conflicting output modes
    if args.batch && args.streaming {
        return Err("Cannot specify both --batch and --streaming modes".to_string());
    }

    // Can't have multiple output formats
    if args.json && args.csv {
        return Err("Cannot specify multiple output formats (--json, --csv)".to_string());
    }

    // Streaming mode doesn't support structured output formats
    if args.streaming && (args.json || args.csv) {
        return Err(
            "Cannot use --streaming with --json or --csv. Use --batch for structured output"
                .to_string(),
        );
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > handle_check_lib::MAX_CONCURRENCY {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                handle_check_lib::MAX_CONCURRENCY
            ));
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use format like '5s', '500ms', '2m'",
                timeout
            ));
        }
    }

    Ok(())
}

/// Main username checking logic
async fn run_handle_check(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings(&args)?;
    let catalog = load_catalog(&settings, &args.sites)?;

    let checker = UsernameChecker::with_config(settings.check.clone());

    if should_use_streaming(&args, &settings) {
        run_streaming_check(&checker, &catalog, &args, &settings).await?;
    } else {
        run_batch_check(&checker, &catalog, &args, &settings).await?;
    }

    Ok(())
}

/// Load the catalog, apply exclusions and the `--site` filter.
///
/// Any failure here is fatal: nothing has been probed yet.
fn load_catalog(
    settings: &Settings,
    sites: &[String],
) -> Result<SiteCatalog, Box<dyn std::error::Error>> {
    let mut catalog = SiteCatalog::from_file(&settings.catalog)?;
    debug!(path = %settings.catalog, sites = catalog.len(), "loaded catalog");

    if let Some(exclude_path) = &settings.exclude {
        let excluded = load_exclusions(exclude_path)?;
        let removed = catalog.exclude(&excluded);
        info!(path = %exclude_path, removed, "applied exclusion list");
    }

    if !sites.is_empty() {
        catalog.retain_sites(sites);
        if catalog.is_empty() {
            return Err(format!("None of the requested sites are in the catalog: {}", sites.join(", ")).into());
        }
    }

    Ok(catalog)
}

/// Determine whether to use streaming or batch mode
fn should_use_streaming(args: &Args, settings: &Settings) -> bool {
    if args.batch {
        return false;
    }
    if args.streaming {
        return true;
    }

    // Structured and grouped output need the whole batch
    settings.format == OutputFormat::Text && !settings.pretty
}

/// Run in streaming mode, printing outcomes as they complete
async fn run_streaming_check(
    checker: &UsernameChecker,
    catalog: &SiteCatalog,
    args: &Args,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    use futures::StreamExt;

    let keywords_in_use = !settings.check.keywords.is_empty();
    if settings.pretty || args.verbose {
        ui::print_header(
            &args.username,
            catalog.len(),
            settings.check.concurrency,
            &settings.check.keywords,
        );
    }

    let start_time = std::time::Instant::now();
    let mut stream = checker.check_username_stream(&args.username, catalog)?;
    let mut summary = BatchSummary::default();
    let total = catalog.len();

    while let Some(outcome) = stream.next().await {
        summary.record(&outcome);
        if ui::should_list(&outcome, keywords_in_use, settings.print_all) {
            let counter = args.debug.then_some((summary.total, total));
            ui::print_outcome(&outcome, keywords_in_use, args.debug, counter);
        }
    }

    summary.elapsed = start_time.elapsed();

    println!();
    ui::print_summary(&args.username, &summary, keywords_in_use, settings.pretty);
    if args.verbose || args.debug {
        ui::print_unknown_summary(&summary, args.debug);
    }

    Ok(())
}

/// Run in batch mode (collect all outcomes first)
async fn run_batch_check(
    checker: &UsernameChecker,
    catalog: &SiteCatalog,
    args: &Args,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let is_structured = settings.format != OutputFormat::Text;

    if settings.pretty && !is_structured {
        ui::print_header(
            &args.username,
            catalog.len(),
            settings.check.concurrency,
            &settings.check.keywords,
        );
    }

    // Spinner::start returns None if stderr isn't a TTY.
    let spinner = if !is_structured {
        ui::Spinner::start(format!("Checking {} sites...", catalog.len()))
    } else {
        None
    };

    let batch = checker.check_username(&args.username, catalog).await?;

    if let Some(s) = spinner {
        s.stop().await;
    }

    display_results(&batch, args, settings)?;

    Ok(())
}

/// Build the run settings from CLI arguments with config file integration.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments (explicit user input)
/// 2. Environment variables (HC_*)
/// 3. Local config file (./handle-check.toml)
/// 4. Global config file (~/.handle-check.toml)
/// 5. XDG config file (~/.config/handle-check/config.toml)
/// 6. Built-in defaults
fn build_settings(args: &Args) -> Result<Settings, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new(args.verbose);
    let env_config = load_env_config(args.verbose);

    let file_config = if let Some(explicit_config_path) = &args.config {
        info!(path = %explicit_config_path, "using explicit config file (CLI --config)");
        config_manager
            .load_file(explicit_config_path)
            .map_err(|e| format!("Failed to load config file '{}': {}", explicit_config_path, e))?
    } else if let Some(env_config_path) = &env_config.config {
        info!(path = %env_config_path, "using explicit config file (HC_CONFIG)");
        config_manager
            .load_file(env_config_path)
            .map_err(|e| format!("Failed to load config file '{}': {}", env_config_path, e))?
    } else {
        config_manager.discover_and_load().unwrap_or_default()
    };

    let mut settings = Settings {
        check: CheckConfig::default(),
        catalog: String::new(),
        exclude: None,
        format: OutputFormat::Text,
        pretty: false,
        print_all: false,
    };

    // Step 1: config files
    apply_file_config(&mut settings, file_config);

    // Step 2: environment variables (HC_*)
    if env_config.has_output_format_conflict() {
        tracing::warn!("Both HC_JSON and HC_CSV are set, JSON wins unless a CLI flag says otherwise");
    }
    if let Some(concurrency) = env_config.concurrency {
        settings.check = settings.check.with_concurrency(concurrency);
    }
    if let Some(timeout) = env_config.timeout.as_deref().and_then(parse_timeout_string) {
        settings.check.timeout = timeout;
    }
    if let Some(user_agent) = env_config.user_agent {
        settings.check.user_agent = user_agent;
    }
    if let Some(insecure) = env_config.insecure {
        settings.check.accept_invalid_certs = insecure;
    }
    if let Some(catalog) = env_config.catalog {
        settings.catalog = catalog;
    }
    if let Some(exclude) = env_config.exclude {
        settings.exclude = Some(exclude);
    }
    if env_config.csv == Some(true) {
        settings.format = OutputFormat::Csv;
    }
    if env_config.json == Some(true) {
        settings.format = OutputFormat::Json;
    }

    // Step 3: CLI arguments (highest precedence)
    apply_cli_args(&mut settings, args);

    if settings.catalog.trim().is_empty() {
        return Err(
            "No site catalog given. Use --catalog FILE, HC_CATALOG, or 'catalog' in a config file"
                .into(),
        );
    }

    Ok(settings)
}

/// Merge a FileConfig into the run settings.
fn apply_file_config(settings: &mut Settings, file_config: FileConfig) {
    if let Some(defaults) = file_config.defaults {
        if let Some(order) = defaults.strategy_order() {
            settings.check.strategy_order = order;
        }
        if let Some(concurrency) = defaults.concurrency {
            settings.check = settings.check.clone().with_concurrency(concurrency);
        }
        if let Some(timeout) = defaults.timeout.as_deref().and_then(parse_timeout_string) {
            settings.check.timeout = timeout;
        }
        if let Some(user_agent) = defaults.user_agent {
            settings.check.user_agent = user_agent;
        }
        if let Some(insecure) = defaults.insecure {
            settings.check.accept_invalid_certs = insecure;
        }
        if let Some(keywords) = defaults.keywords {
            settings.check = settings.check.clone().with_keywords(keywords);
        }
        if let Some(catalog) = defaults.catalog {
            settings.catalog = catalog;
        }
        if defaults.exclude.is_some() {
            settings.exclude = defaults.exclude;
        }
    }

    if let Some(output) = file_config.output {
        match output.default_format.as_deref() {
            Some("json") => settings.format = OutputFormat::Json,
            Some("csv") => settings.format = OutputFormat::Csv,
            Some("text") => settings.format = OutputFormat::Text,
            _ => {}
        }
        if let Some(print_all) = output.print_all {
            settings.print_all = print_all;
        }
        if let Some(pretty) = output.pretty {
            settings.pretty = pretty;
        }
    }
}

/// Apply CLI arguments to the settings (highest precedence).
///
/// Boolean flags only override when passed, so a config or env value is not
/// clobbered by a flag's default.
fn apply_cli_args(settings: &mut Settings, args: &Args) {
    if let Some(concurrency) = args.concurrency {
        settings.check = settings.check.clone().with_concurrency(concurrency);
    }
    if let Some(timeout) = args.timeout.as_deref().and_then(parse_timeout_string) {
        settings.check.timeout = timeout;
    }
    if let Some(user_agent) = &args.user_agent {
        settings.check.user_agent = user_agent.clone();
    }
    if args.strict_tls {
        settings.check.accept_invalid_certs = false;
    }
    if !args.keywords.is_empty() {
        settings.check = settings.check.clone().with_keywords(args.keywords.clone());
    }
    if let Some(catalog) = &args.catalog {
        settings.catalog = catalog.clone();
    }
    if let Some(exclude) = &args.exclude {
        settings.exclude = Some(exclude.clone());
    }
    if args.json {
        settings.format = OutputFormat::Json;
    } else if args.csv {
        settings.format = OutputFormat::Csv;
    }
    if args.pretty {
        settings.pretty = true;
    }
    if args.print_all {
        settings.print_all = true;
    }
}

fn display_results(
    batch: &ProbeBatch,
    args: &Args,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    match settings.format {
        OutputFormat::Json => display_json_results(batch)?,
        OutputFormat::Csv => display_csv_results(batch),
        OutputFormat::Text => display_text_results(batch, args, settings),
    }

    Ok(())
}

/// JSON document printed by `--json`.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    username: &'a str,
    elapsed_ms: u64,
    summary: &'a BatchSummary,
    outcomes: Vec<&'a ProbeOutcome>,
}

fn json_report(batch: &ProbeBatch) -> Result<String, serde_json::Error> {
    let summary = BatchSummary::from_batch(batch);
    let report = JsonReport {
        username: &batch.username,
        elapsed_ms: batch.elapsed.as_millis() as u64,
        summary: &summary,
        outcomes: batch.outcomes.values().collect(),
    };
    serde_json::to_string_pretty(&report)
}

/// Display results in JSON format
fn display_json_results(batch: &ProbeBatch) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", json_report(batch)?);
    Ok(())
}

/// Render results as CSV, one row per site.
fn csv_report(batch: &ProbeBatch) -> String {
    let mut out = String::from("site,status,url,http_status,elapsed_ms\n");

    for outcome in batch.outcomes.values() {
        let http_status = outcome
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let elapsed = outcome
            .elapsed
            .map(|d| d.as_millis().to_string())
            .unwrap_or_else(|| "-".to_string());

        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_field(&outcome.site),
            serde_json::to_value(outcome.status)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default(),
            csv_field(&outcome.url),
            http_status,
            elapsed
        ));
    }

    out
}

/// Display results in CSV format
fn display_csv_results(batch: &ProbeBatch) {
    print!("{}", csv_report(batch));
}

/// Quote a CSV field when it contains a separator, quote or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Display results in human-readable text format
fn display_text_results(batch: &ProbeBatch, args: &Args, settings: &Settings) {
    let keywords_in_use = !settings.check.keywords.is_empty();
    let summary = BatchSummary::from_batch(batch);

    if settings.pretty {
        let outcomes: Vec<&ProbeOutcome> = batch.outcomes.values().collect();
        ui::print_grouped_results(&outcomes, keywords_in_use, settings.print_all, args.debug);
    } else {
        for outcome in batch.outcomes.values() {
            if ui::should_list(outcome, keywords_in_use, settings.print_all) {
                ui::print_outcome(outcome, keywords_in_use, args.debug, None);
            }
        }
        println!();
    }

    ui::print_summary(&args.username, &summary, keywords_in_use, settings.pretty);
    if settings.pretty || args.verbose || args.debug {
        ui::print_unknown_summary(&summary, args.debug);
    }
}
