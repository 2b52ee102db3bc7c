use anyhow::{anyhow, Context, Result};
use casedup::config::{Config, Overrides};
use casedup::embed::load_embedder;
use casedup::pipeline::{analyze_catalog, load_tables, work_list_artifacts, Analysis, Outputs};
use casedup::report::{self, priority_summary, read_stats, ArtifactSet, PrioritySummary};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = ".casedup.toml";

/// casedup - Find exact and near-duplicate test cases in an exported catalog
#[derive(Parser)]
#[command(name = "casedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Args, Debug, Clone, Copy)]
struct ThresholdArgs {
    /// Similarity at which a pair is labeled semantic_duplicate
    #[arg(long)]
    dup_threshold: Option<f64>,

    /// Similarity below which pairs are discarded
    #[arg(long)]
    sim_threshold: Option<f64>,

    /// Step overlap at which a pair shares most steps
    #[arg(long)]
    overlap_threshold: Option<f64>,

    /// Nearest neighbors examined per case
    #[arg(short = 'k', long)]
    neighbors: Option<usize>,
}

impl From<ThresholdArgs> for Overrides {
    fn from(args: ThresholdArgs) -> Self {
        Overrides {
            semantic_duplicate: args.dup_threshold,
            similarity_floor: args.sim_threshold,
            step_overlap: args.overlap_threshold,
            neighbors: args.neighbors,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: duplicate tables, work lists and priority summary
    Run {
        /// Catalog export (CSV or JSON)
        catalog: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "casedup-out")]
        output: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write only the exact-duplicate and similar-pair tables
    Find {
        /// Catalog export (CSV or JSON)
        catalog: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "casedup-out")]
        output: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },

    /// Build work lists from tables written by `find`
    Worklist {
        /// Directory holding duplicates_exact.csv and similar_pairs.csv
        #[arg(short, long, default_value = "casedup-out")]
        dir: PathBuf,
    },

    /// Print the prioritized review summary for a previous run
    Summary {
        /// Directory holding the run's tables
        #[arg(short, long, default_value = "casedup-out")]
        dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let result = load_config(&cli.config).and_then(|config| match cli.command {
        Commands::Run {
            catalog,
            output,
            thresholds,
            json,
        } => cmd_run(&catalog, &output, config, thresholds.into(), json, cli.quiet),
        Commands::Find {
            catalog,
            output,
            thresholds,
        } => cmd_find(&catalog, &output, config, thresholds.into(), cli.quiet),
        Commands::Worklist { dir } => cmd_worklist(&dir, &config, cli.quiet),
        Commands::Summary { dir } => cmd_summary(&dir, &config),
    });

    if let Err(e) = result {
        eprintln!("{}: {:#}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let default = if quiet {
        "casedup=error"
    } else if verbose {
        "casedup=debug"
    } else {
        "casedup=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    let required = path != Path::new(DEFAULT_CONFIG);
    Config::load(path, required).with_context(|| format!("loading config {}", path.display()))
}

fn analyze(catalog: &Path, config: &Config) -> Result<Analysis> {
    let embedder = load_embedder(&config.embedding);
    analyze_catalog(catalog, config, &*embedder).with_context(|| format!("analyzing {}", catalog.display()))
}

/// Write what the analysis produced, then surface a semantic failure as the
/// command's error so the exit status reflects it.
fn write_and_check(analysis: &Analysis, artifacts: &ArtifactSet, output: &Path, quiet: bool) -> Result<()> {
    artifacts
        .write_to(output)
        .with_context(|| format!("writing artifacts to {}", output.display()))?;
    if !quiet {
        print_written(output, artifacts);
    }
    match &analysis.semantic {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow!("semantic pass failed, only exact results were written: {e}")),
    }
}

fn cmd_run(catalog: &Path, output: &Path, config: Config, overrides: Overrides, json: bool, quiet: bool) -> Result<()> {
    let config = config.with_overrides(overrides)?;
    let analysis = analyze(catalog, &config)?;
    let artifacts = analysis.artifacts(&config.thresholds, Outputs::All)?;
    let stats = analysis.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else if !quiet {
        let summary = priority_summary(
            &analysis.exact_groups,
            &analysis.titles(),
            analysis.pairs().unwrap_or_default(),
            &config.thresholds,
            Some(stats.total_cases),
        );
        print_summary(&summary);
    }
    write_and_check(&analysis, &artifacts, output, quiet || json)
}

fn cmd_find(catalog: &Path, output: &Path, config: Config, overrides: Overrides, quiet: bool) -> Result<()> {
    let config = config.with_overrides(overrides)?;
    let analysis = analyze(catalog, &config)?;
    let artifacts = analysis.artifacts(&config.thresholds, Outputs::Tables)?;

    if !quiet {
        let stats = analysis.stats();
        println!(
            "{} cases, {} exact groups ({} cases), {} similar pairs ({} semantic duplicates)",
            stats.total_cases.to_string().cyan(),
            stats.exact_groups.to_string().yellow().bold(),
            stats.cases_in_exact_groups,
            stats.similar_pairs.to_string().yellow().bold(),
            stats.semantic_duplicates
        );
        if stats.records_with_warnings > 0 {
            println!(
                "{}",
                format!("{} records had unparseable steps", stats.records_with_warnings).dimmed()
            );
        }
    }
    write_and_check(&analysis, &artifacts, output, quiet)
}

fn cmd_worklist(dir: &Path, config: &Config, quiet: bool) -> Result<()> {
    let tables = load_tables(dir)?;
    let (lists, artifacts) = work_list_artifacts(&tables, &config.thresholds)?;
    artifacts
        .write_to(dir)
        .with_context(|| format!("writing work lists to {}", dir.display()))?;

    if !quiet {
        println!(
            "{} exact rows, {} perfect matches, {} high-priority pairs, {} high-overlap pairs",
            lists.exact.len().to_string().yellow(),
            lists.perfect.len().to_string().yellow(),
            lists.high_priority.len().to_string().yellow(),
            lists.high_overlap.len().to_string().yellow()
        );
        print_written(dir, &artifacts);
    }
    Ok(())
}

fn cmd_summary(dir: &Path, config: &Config) -> Result<()> {
    let tables = load_tables(dir)?;
    let stats = read_stats(dir)?;
    let summary = priority_summary(
        &tables.groups,
        &tables.titles,
        tables.pairs.as_deref().unwrap_or_default(),
        &config.thresholds,
        stats.as_ref().map(|s| s.total_cases),
    );
    print_summary(&summary);
    if tables.pairs.is_none() {
        println!(
            "{}",
            format!("{} not found; pair tiers are empty", report::SIMILAR_FILE).dimmed()
        );
    }
    Ok(())
}

fn print_written(dir: &Path, artifacts: &ArtifactSet) {
    println!("\n{} {}", "Wrote".green(), dir.display());
    for name in artifacts.file_names() {
        println!("  {}", name);
    }
}

fn print_summary(summary: &PrioritySummary) {
    println!("{}", "Exact duplicates".bold());
    if summary.large_groups.is_empty() && summary.medium_groups.is_empty() && summary.small_group_count == 0 {
        println!("  {}", "none".green());
    }
    for group in summary.large_groups.iter().chain(&summary.medium_groups) {
        println!(
            "  {} group {} ({} cases) {}",
            "!".red().bold(),
            group.group_id,
            group.size,
            group.title.cyan()
        );
        println!("    keep {}  archive {}", group.keep.green(), group.archive.join(", ").dimmed());
    }
    if summary.small_group_count > 0 {
        println!(
            "  {} groups of 2 ({} to archive)",
            summary.small_group_count.to_string().yellow(),
            summary.small_group_count
        );
    }

    println!("\n{}", "Similar pairs".bold());
    println!("  perfect matches:      {}", summary.perfect_pairs.len().to_string().yellow().bold());
    for pair in summary.perfect_pairs.iter().take(10) {
        println!("    {} <-> {}  {}", pair.case_id_1.cyan(), pair.case_id_2, pair.title_1.dimmed());
    }
    if summary.perfect_pairs.len() > 10 {
        println!("    {}", format!("... and {} more", summary.perfect_pairs.len() - 10).dimmed());
    }
    println!("  near-perfect:         {}", summary.near_perfect_pairs.to_string().yellow());
    println!("  high step overlap:    {}", summary.high_overlap_pairs.to_string().yellow());

    let reduction = summary.estimated_reduction();
    match summary.reduction_percent() {
        Some(pct) => println!(
            "\n{} {} cases ({:.1}% of catalog)",
            "Estimated reduction:".bold(),
            reduction.to_string().green().bold(),
            pct
        ),
        None => println!("\n{} {} cases", "Estimated reduction:".bold(), reduction.to_string().green().bold()),
    }
}
