//! Rule Warden CLI - Command-line interface for rule-driven validation
//!
//! CDD Principle: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to domain operations
//! - Handles external concerns like file I/O, process exit codes, and terminal output
//! - Exit codes: 0 clean, 1 violations found, 2 the run could not be performed

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rule_warden::overrides::fingerprint;
use rule_warden::{
    CancellationToken, CheckOptions, EngineConfig, Operator, OutputFormat, OverrideRecord,
    OverrideStatus, ReportFormatter, ReportOptions, RuleTarget, Severity, Warden,
};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

/// Rule Warden - Rule-driven validation of project trees
#[derive(Parser)]
#[command(name = "rule-warden")]
#[command(version)]
#[command(about = "Evaluate project files against declarative validators, profiles and plugins")]
#[command(long_about = "Rule Warden loads validators and profiles from YAML or JSON documents, evaluates every matching (file, validator) pair, and reports violations with confidence, severity and recorded override decisions.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project root that rule paths, file patterns and reported paths are relative to
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check files against the selected validators
    Check(CheckArgs),

    /// Validate the configuration and every rule document it names
    ValidateConfig {
        /// Configuration file to validate
        config_file: Option<PathBuf>,
    },

    /// List validators, profiles, operators and plugins
    Rules {
        /// Show only enabled validators
        #[arg(long)]
        enabled_only: bool,

        /// Show only the validators of one profile
        #[arg(long)]
        profile: Option<String>,
    },

    /// Show which validators apply to a path
    Explain {
        /// File or directory, relative to the root
        path: PathBuf,
    },

    /// Manage recorded override decisions
    Overrides {
        #[command(subcommand)]
        action: OverrideCommands,
    },
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Paths to evaluate (files or directories)
    paths: Vec<PathBuf>,

    /// Profiles to run, in order
    #[arg(short, long, action = clap::ArgAction::Append)]
    profile: Vec<String>,

    /// Validators to run in addition to the profiles
    #[arg(long = "validator", action = clap::ArgAction::Append)]
    validators: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormatArg,

    /// Drop violations below this confidence
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Ignore recorded override decisions
    #[arg(long)]
    no_overrides: bool,

    /// Minimum severity level to report
    #[arg(short, long, value_enum)]
    severity: Option<SeverityArg>,

    /// Maximum number of violations to report
    #[arg(long)]
    max_violations: Option<usize>,

    /// Disable parallel processing
    #[arg(long)]
    no_parallel: bool,
}

#[derive(Subcommand)]
enum OverrideCommands {
    /// Record a decision about a violation
    Add {
        /// Fingerprint of the violation, as printed in JSON reports
        #[arg(long, conflicts_with_all = ["validator", "rule", "file", "matched"])]
        fingerprint: Option<String>,

        /// Validator of the violation (used to compute the fingerprint)
        #[arg(long)]
        validator: Option<String>,

        /// Rule id of the violation
        #[arg(long)]
        rule: Option<String>,

        /// File of the violation, relative to the root
        #[arg(long)]
        file: Option<PathBuf>,

        /// Matched excerpt, when the violation carries one
        #[arg(long)]
        matched: Option<String>,

        /// false-positive or accepted-risk
        #[arg(long, value_enum)]
        status: StatusArg,

        /// Why the decision was taken
        #[arg(long)]
        reason: String,

        /// Who took the decision
        #[arg(long)]
        by: Option<String>,
    },

    /// Delete a decision
    Remove {
        fingerprint: String,
    },

    /// List every decision
    List,

    /// Show counts per status
    Stats,
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum SeverityArg {
    Info,
    Warning,
    Error,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Info => Severity::Info,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Error => Severity::Error,
        }
    }
}

#[derive(Copy, Clone, ValueEnum)]
enum StatusArg {
    FalsePositive,
    AcceptedRisk,
}

impl From<StatusArg> for OverrideStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::FalsePositive => OverrideStatus::FalsePositive,
            StatusArg::AcceptedRisk => OverrideStatus::AcceptedRisk,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    match run_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(2);
        }
    }
}

async fn run_command(cli: Cli) -> anyhow::Result<i32> {
    let use_colors = !cli.no_color;
    match cli.command {
        Commands::Check(args) => run_check(cli.config, cli.root, args, use_colors).await,
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config), cli.root),
        Commands::Rules { enabled_only, profile } => run_list_rules(cli.config, cli.root, enabled_only, profile),
        Commands::Explain { path } => run_explain(cli.config, cli.root, path),
        Commands::Overrides { action } => run_overrides(cli.config, cli.root, action),
    }
}

fn open_warden(config_path: Option<PathBuf>, root: PathBuf) -> anyhow::Result<Warden> {
    match config_path {
        Some(path) => Warden::from_config_file(&path, &root)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Warden::open(&root)
            .with_context(|| format!("Failed to load configuration under {}", root.display())),
    }
}

async fn run_check(
    config_path: Option<PathBuf>,
    root: PathBuf,
    args: CheckArgs,
    use_colors: bool,
) -> anyhow::Result<i32> {
    if let Some(min) = args.min_confidence {
        if !(0.0..=1.0).contains(&min) {
            bail!("--min-confidence must be within 0.0..=1.0, got {min}");
        }
    }

    let format: OutputFormat = args.format.into();
    let warden = open_warden(config_path, root)?.with_report_formatter(ReportFormatter::new(ReportOptions {
        use_colors: use_colors && format == OutputFormat::Human,
        max_violations: args.max_violations,
        min_severity: args.severity.map(Into::into),
        ..Default::default()
    }));

    // Use the root itself if no paths specified
    let paths = if args.paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.paths
    };

    let cancellation = CancellationToken::new();
    let options = CheckOptions {
        profiles: args.profile,
        validators: args.validators,
        min_confidence: args.min_confidence,
        apply_overrides: args.no_overrides.then_some(false),
        parallel: args.no_parallel.then_some(false),
        cancellation: cancellation.clone(),
    };

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing in-flight evaluations");
            cancellation.cancel();
        }
    });
    let result = warden.validate(paths, options).await;
    interrupt.abort();
    let summary = result.context("Check could not be completed")?;

    let formatted = warden.format_report(&summary, format)?;
    print!("{formatted}");

    // Return appropriate exit code
    if summary.has_failures() {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn run_validate_config(config_path: Option<PathBuf>, root: PathBuf) -> anyhow::Result<i32> {
    let label = config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| format!("{} (discovered)", root.display()));
    println!("Validating configuration: {label}");

    let warden = match open_warden(config_path, root) {
        Ok(warden) => warden,
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e:#}");
            return Ok(1);
        }
    };

    let rules = warden.rules();
    let unknown_plugins: Vec<(String, String)> = rules
        .validators()
        .iter()
        .flat_map(|v| v.plugins().map(move |p| (v.name.clone(), p.to_string())))
        .filter(|(_, plugin)| !warden.plugins().contains(plugin))
        .collect();

    println!("📊 Configuration summary:");
    println!("  Fingerprint: {} (rules {})", warden.config().fingerprint(), rules.fingerprint());
    println!(
        "  Validators: {} total, {} enabled",
        rules.validators().len(),
        rules.validators().iter().filter(|v| v.enabled).count()
    );
    println!(
        "  Rules: {}",
        rules.validators().iter().map(|v| v.rules.len()).sum::<usize>()
    );
    println!("  Profiles: {}", rules.profiles().len());
    println!("  Plugins registered: {}", warden.plugins().names().collect::<Vec<_>>().join(", "));

    if unknown_plugins.is_empty() {
        println!("✅ Configuration is valid");
        Ok(0)
    } else {
        for (validator, plugin) in &unknown_plugins {
            eprintln!("❌ Validator '{validator}' uses unregistered plugin '{plugin}'");
        }
        Ok(1)
    }
}

fn run_list_rules(
    config_path: Option<PathBuf>,
    root: PathBuf,
    enabled_only: bool,
    profile: Option<String>,
) -> anyhow::Result<i32> {
    let warden = open_warden(config_path, root)?;
    let rules = warden.rules();

    let selected: Option<Vec<String>> = match &profile {
        Some(name) => Some(rules.resolve_profile(name)?),
        None => None,
    };

    println!("📋 Validators\n");
    for validator in rules.validators() {
        if enabled_only && !validator.enabled {
            continue;
        }
        if let Some(selected) = &selected {
            if !selected.contains(&validator.name) {
                continue;
            }
        }

        let status = if validator.enabled { "✅" } else { "❌" };
        println!(
            "{}📂 {} ({}, pattern {})",
            status,
            validator.name,
            validator.validation_type.as_str(),
            validator.file_pattern
        );
        if !validator.description.is_empty() {
            println!("   {}", validator.description);
        }
        for rule in &validator.rules {
            let target = match &rule.target {
                RuleTarget::Operator(op) => format!("operator {op}"),
                RuleTarget::Plugin(name) => format!("plugin {name}"),
            };
            let severity = rule.severity.or(validator.severity).unwrap_or(Severity::Error);
            println!("  🔍 {} [{}] - {}", rule.id, severity.as_str(), target);
        }
        println!();
    }

    if profile.is_none() {
        println!("📚 Profiles");
        for profile in rules.profiles() {
            println!("  {}: {}", profile.name, profile.validators.join(", "));
        }
        println!();

        println!("🧰 Operators");
        for op in Operator::ALL {
            println!("  {} - {}", op.name(), op.description());
        }
        println!();

        println!("🔌 Plugins");
        for name in warden.plugins().names() {
            println!("  {name}");
        }
    }

    Ok(0)
}

fn run_explain(config_path: Option<PathBuf>, root: PathBuf, path: PathBuf) -> anyhow::Result<i32> {
    let warden = open_warden(config_path, root)?;
    let validators = warden.explain(&path);

    if validators.is_empty() {
        println!("No validators apply to {}", path.display());
        return Ok(1);
    }

    println!("📖 {} is evaluated by:", path.display());
    for validator in validators {
        println!(
            "  📂 {} ({}, pattern {})",
            validator.name,
            validator.validation_type.as_str(),
            validator.file_pattern
        );
        for rule in &validator.rules {
            println!("     - {} ({})", rule.id, rule.target.name());
        }
    }
    Ok(0)
}

fn run_overrides(config_path: Option<PathBuf>, root: PathBuf, action: OverrideCommands) -> anyhow::Result<i32> {
    // Management commands only need the store location, not the rule documents
    let config = match config_path {
        Some(path) => EngineConfig::load_from_file(&path)?,
        None => EngineConfig::discover(&root)?,
    };
    let store_path = root.join(&config.overrides_file);
    let mut store = rule_warden::OverrideStore::open(&store_path)
        .with_context(|| format!("Failed to open override store {}", store_path.display()))?;

    match action {
        OverrideCommands::Add {
            fingerprint: explicit,
            validator,
            rule,
            file,
            matched,
            status,
            reason,
            by,
        } => {
            let (fp, rule_label, file) = match (explicit, validator, rule, file) {
                (Some(fp), _, _, _) => (fp, String::new(), PathBuf::new()),
                (None, Some(validator), Some(rule), Some(file)) => (
                    fingerprint(&validator, &rule, &file, matched.as_deref()),
                    format!("{validator}/{rule}"),
                    file,
                ),
                _ => bail!("Either --fingerprint or --validator, --rule and --file are required"),
            };
            let added_by = by
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "unknown".to_string());

            let record = OverrideRecord::new(fp.clone(), rule_label, file, status.into(), reason, added_by);
            match store.add(record)? {
                Some(previous) => println!("✅ Replaced {} decision for {fp}", previous.status.as_str()),
                None => println!("✅ Recorded decision for {fp}"),
            }
            Ok(0)
        }
        OverrideCommands::Remove { fingerprint } => {
            if store.remove(&fingerprint)? {
                println!("✅ Removed decision for {fingerprint}");
                Ok(0)
            } else {
                eprintln!("❌ No decision recorded for {fingerprint}");
                Ok(1)
            }
        }
        OverrideCommands::List => {
            let records = store.list();
            if records.is_empty() {
                println!("No overrides recorded in {}", store_path.display());
            }
            for record in records {
                println!(
                    "{} [{}] {} {} - {} ({}, {})",
                    record.fingerprint,
                    record.status.as_str(),
                    record.rule,
                    record.file_path.display(),
                    record.reason,
                    record.added_by,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(0)
        }
        OverrideCommands::Stats => {
            println!("📊 {}", store.stats().format_display());
            println!("   File: {}", store_path.display());
            Ok(0)
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = std::env::var("RUST_WARDEN_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
