use std::path::{Path, PathBuf};

use clap::Parser;
use miette::{Context, IntoDiagnostic, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use difflint_core::{CheckoutMode, DiffMode, DifflintConfig, OutputFormat, Vcs};
use difflint_diff::select::ChangeSelector;
use difflint_gate::analyzer::CommandAnalyzer;
use difflint_gate::pipeline::{Gate, GateOptions, Revisions};
use difflint_vcs::GitRepo;

const DEFAULT_CONFIG_FILE: &str = ".difflint.toml";
const DEFAULT_RCFILE: &str = "pylint.conf";

#[derive(Parser)]
#[command(
    name = "difflint",
    version,
    about = "Report only the lint diagnostics a change introduces",
    long_about = "difflint runs a static analyzer over the files a branch changed and reports\n\
                  only the diagnostics the change introduced. Diagnostics that already existed\n\
                  on the target branch are matched across moved lines and suppressed.\n\n\
                  The exit status is a bitmask: bit 0 means the analyzer failed fatally,\n\
                  the other bits are the severities of reported diagnostics.\n\n\
                  Examples:\n  \
                    difflint                             Gate staged changes against master\n  \
                    difflint --target-branch main        Compare against main\n  \
                    difflint --diff-mode file            Report every diagnostic in changed files\n  \
                    difflint -- --disable=C0114          Pass extra arguments to the analyzer"
)]
struct Cli {
    /// Branch the change will be merged into (default: master)
    #[arg(long)]
    target_branch: Option<String>,

    /// `line` reports new diagnostics only, `file` reports all diagnostics in changed files
    #[arg(long)]
    diff_mode: Option<DiffMode>,

    /// `file` stages single blobs, `tree` checks out whole trees (needs a clean tree)
    #[arg(long)]
    checkout_mode: Option<CheckoutMode>,

    /// Comma-separated basenames to skip
    #[arg(long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Comma-separated regexes matched against the start of basenames to skip
    #[arg(long, value_delimiter = ',')]
    ignore_patterns: Vec<String>,

    /// Analyzer configuration file (default: ~/pylint.conf if present)
    #[arg(long)]
    rcfile: Option<PathBuf>,

    /// Comma-separated directories added to the analyzer's module search path
    #[arg(long, value_delimiter = ',')]
    python_path: Vec<PathBuf>,

    /// Template for each reported diagnostic
    #[arg(long)]
    msg_template: Option<String>,

    /// Path to configuration file (default: .difflint.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,

    /// Repository path (default: current directory)
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Extra arguments passed to the analyzer
    #[arg(last = true)]
    analyzer_args: Vec<String>,
}

/// Environment inputs that influence a run.
#[derive(Debug, Default)]
struct Environment {
    /// `CI_SERVER=yes`.
    ci: bool,
    /// `CI_COMMIT_SHA`, the revision under test in CI.
    commit_sha: Option<String>,
    home: Option<PathBuf>,
}

impl Environment {
    fn from_env() -> Self {
        Self {
            ci: std::env::var("CI_SERVER").is_ok_and(|v| v == "yes"),
            commit_sha: std::env::var("CI_COMMIT_SHA").ok().filter(|s| !s.is_empty()),
            home: dirs::home_dir(),
        }
    }

    /// `~/pylint.conf`, if it exists.
    fn default_rcfile(&self) -> Option<PathBuf> {
        self.home
            .as_ref()
            .map(|h| h.join(DEFAULT_RCFILE))
            .filter(|p| p.is_file())
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let status = run(cli, &Environment::from_env())?;
    std::process::exit(status);
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, env: &Environment) -> Result<i32> {
    let config = resolve_config(&cli, env)?;
    debug!(?config, "effective configuration");

    let repo = GitRepo::open(&cli.repo)
        .into_diagnostic()
        .wrap_err_with(|| format!("no git repository at {}", cli.repo.display()))?;

    let target = resolve_target(&repo, &config.gate.target_branch, env);
    let (source, head) = match &env.commit_sha {
        Some(sha) => (sha.clone(), sha.clone()),
        None => (repo.head_commit()?, repo.index_tree()?),
    };
    let base = repo.merge_base(&target, &source)?;
    info!(%target, %base, %head, "comparing revisions");

    let changes = repo.diff(&base, &head)?;
    let selection = ChangeSelector::from_config(&config)?.select(changes);
    info!(
        selected = selection.selected.len(),
        skipped = selection.skipped.len(),
        "selected changed files"
    );

    let analyzer = CommandAnalyzer::from_config(&config.analyzer, repo.workdir(), &cli.analyzer_args);
    let gate = Gate::new(&repo, &analyzer, GateOptions::from(&config.gate));
    let report = gate.run(&selection.selected, &Revisions { base, head })?;

    if report.aborted() {
        warn!("analyzer failed fatally, remaining files were not analyzed");
    }

    match cli.format {
        OutputFormat::Text => {
            print!(
                "{}",
                difflint_gate::report::to_text(&report, &config.gate.msg_template, repo.workdir())
            );
        }
        OutputFormat::Json => {
            let json = difflint_gate::report::to_json(&report);
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
    }

    Ok(report.status)
}

fn load_config(explicit: Option<&Path>) -> Result<DifflintConfig> {
    let config = match explicit {
        Some(path) => DifflintConfig::from_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                DifflintConfig::from_file(default_path)?
            } else {
                DifflintConfig::default()
            }
        }
    };
    Ok(config)
}

/// Layer defaults, the config file, the analyzer rcfile and the command line.
fn resolve_config(cli: &Cli, env: &Environment) -> Result<DifflintConfig> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(rcfile) = &cli.rcfile {
        config.analyzer.rcfile = Some(rcfile.clone());
    }
    if config.analyzer.rcfile.is_none() {
        config.analyzer.rcfile = env.default_rcfile();
    }
    if let Some(rcfile) = config.analyzer.rcfile.clone() {
        debug!(rcfile = %rcfile.display(), "reading analyzer rcfile");
        config.apply_rcfile(&rcfile)?;
    }
    apply_cli(&mut config, cli);
    Ok(config)
}

/// Overlay command-line flags on the loaded configuration.
fn apply_cli(config: &mut DifflintConfig, cli: &Cli) {
    if let Some(target) = &cli.target_branch {
        config.gate.target_branch = target.clone();
    }
    if let Some(mode) = cli.diff_mode {
        config.gate.diff_mode = mode;
    }
    if let Some(mode) = cli.checkout_mode {
        config.gate.checkout_mode = mode;
    }
    if !cli.ignore.is_empty() {
        config.gate.ignore = cli.ignore.clone();
    }
    if !cli.ignore_patterns.is_empty() {
        config.gate.ignore_patterns = cli.ignore_patterns.clone();
    }
    if let Some(template) = &cli.msg_template {
        config.gate.msg_template = template.clone();
    }
    if let Some(rcfile) = &cli.rcfile {
        config.analyzer.rcfile = Some(rcfile.clone());
    }
    config
        .analyzer
        .search_path
        .extend(cli.python_path.iter().cloned());
}

/// In CI only remote branches exist, so prefer `origin/<target>` when it resolves.
fn resolve_target<V: Vcs>(repo: &V, target: &str, env: &Environment) -> String {
    if env.ci {
        let remote = format!("origin/{target}");
        if repo.resolves(&remote) {
            return remote;
        }
        warn!(%remote, "remote target branch not found, using local name");
    }
    target.to_string()
}
