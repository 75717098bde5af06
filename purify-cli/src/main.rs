use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use purify_core::graph::nodes;
use purify_core::{
    CovarianceMatrix, Decision, MeasurementModel, Node, Purification, Purifier, PurifyConfig,
    VisitOrder, WishartTetradTest,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Command::Demo {
            clusters,
            indicators,
            loading,
            factor_correlation,
            cross_load,
            cross_factor,
            cross_loading,
            sample_size,
            simulate,
            search,
        } => {
            let model = MeasurementModel::pure(clusters, indicators, loading, factor_correlation)?;
            let model = match cross_load {
                Some(name) => model.with_cross_loading(&name, cross_factor, cross_loading)?,
                None => model,
            };
            run_demo(&model, sample_size, simulate, &search)
        }
        Command::Run {
            input,
            cluster,
            search,
        } => run_purify(&input, &cluster, &search),
        Command::Check {
            input,
            cluster,
            alpha,
        } => run_check(&input, &cluster, alpha),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "purify",
    about = "Purify measurement clusters using vanishing tetrad constraints"
)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Purify the clustering of a simulated factor model
    Demo {
        /// Number of latent factors
        #[arg(long, default_value_t = 4)]
        clusters: usize,

        /// Indicators per factor
        #[arg(long, default_value_t = 4)]
        indicators: usize,

        /// Loading of each indicator on its own factor
        #[arg(long, default_value_t = 0.8)]
        loading: f64,

        /// Correlation shared by every pair of factors
        #[arg(long, default_value_t = 0.4)]
        factor_correlation: f64,

        /// Indicator given a second loading (e.g. X1)
        #[arg(long)]
        cross_load: Option<String>,

        /// Zero-based factor the cross-loaded indicator also loads on
        #[arg(long, default_value_t = 1)]
        cross_factor: usize,

        /// Size of the cross loading
        #[arg(long, default_value_t = 0.5)]
        cross_loading: f64,

        /// Sample size attributed to the covariance matrix
        #[arg(long, default_value_t = 1000)]
        sample_size: usize,

        /// Draw a sample instead of using the model-implied covariance
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Purify a clustering against a covariance matrix or data file
    Run {
        /// JSON file with variables plus covariance or data
        #[arg(long)]
        input: PathBuf,

        /// One cluster as comma-separated names (repeat per cluster)
        #[arg(long, required = true)]
        cluster: Vec<String>,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Report whether a clustering shows any violated tetrad
    Check {
        #[arg(long)]
        input: PathBuf,

        #[arg(long, required = true)]
        cluster: Vec<String>,

        /// Significance level of the tetrad test
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
    },
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Seed for the shuffled visitation order
    #[arg(long, conflicts_with = "order")]
    seed: Option<u64>,

    /// Fixed visitation order, comma-separated
    #[arg(long, value_delimiter = ',')]
    order: Option<Vec<String>>,

    /// Abort after this many tetrad evaluations
    #[arg(long)]
    max_evaluations: Option<u64>,

    /// Significance level of the tetrad test
    #[arg(long, default_value_t = 0.05)]
    alpha: f64,

    /// Print the result as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

impl SearchArgs {
    fn config(&self) -> PurifyConfig {
        self.config_with_seed(self.seed)
    }

    fn config_with_seed(&self, seed: Option<u64>) -> PurifyConfig {
        let visit_order = match &self.order {
            Some(order) => VisitOrder::Fixed(order.iter().map(|s| s.trim().to_string()).collect()),
            None => VisitOrder::Shuffled { seed },
        };
        PurifyConfig {
            visit_order,
            max_tetrad_evaluations: self.max_evaluations,
            significance: None,
        }
    }
}

/// Input file: either a covariance matrix with its sample size or raw data.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct InputFile {
    variables: Vec<String>,
    #[serde(default)]
    sample_size: Option<usize>,
    #[serde(default)]
    covariance: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    data: Option<Vec<Vec<f64>>>,
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_covariance(path: &Path) -> Result<CovarianceMatrix> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let input: InputFile =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    let variables = nodes(&input.variables);

    let cov = match (input.covariance, input.data) {
        (Some(rows), None) => {
            let Some(n) = input.sample_size else {
                bail!("{}: a covariance matrix needs \"sample_size\"", path.display());
            };
            CovarianceMatrix::from_rows(variables, &rows, n)?
        }
        (None, Some(data)) => CovarianceMatrix::from_data(variables, &data)?,
        (Some(_), Some(_)) => bail!("{}: give either \"covariance\" or \"data\", not both", path.display()),
        (None, None) => bail!("{}: missing \"covariance\" or \"data\"", path.display()),
    };
    info!(
        variables = cov.dimension(),
        sample_size = cov.sample_size(),
        "loaded covariance"
    );
    Ok(cov)
}

fn parse_clusters(specs: &[String]) -> Result<Vec<Vec<Node>>> {
    specs
        .iter()
        .map(|spec| {
            let names: Vec<&str> = spec.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            if names.is_empty() {
                bail!("empty cluster '{spec}'");
            }
            Ok(nodes(&names))
        })
        .collect()
}

/// Seed shared by the sampled data and the shuffled visit order. Drawn when
/// sampling without `--seed` so the run can be replayed.
fn demo_seed(search: &SearchArgs, simulate: bool) -> Option<u64> {
    match search.seed {
        Some(seed) => Some(seed),
        None if simulate => Some(rand::random()),
        None => None,
    }
}

fn run_demo(model: &MeasurementModel, sample_size: usize, simulate: bool, search: &SearchArgs) -> Result<()> {
    let seed = demo_seed(search, simulate);
    let cov = match seed {
        Some(seed) if simulate => {
            info!(seed, cases = sample_size, "sampling data");
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let data = model.sample(sample_size, &mut rng)?;
            if !search.json {
                println!("Sampled {sample_size} cases with seed {seed}");
            }
            CovarianceMatrix::from_data(model.indicators().to_vec(), &data)?
        }
        _ => model.implied_covariance(sample_size)?,
    };
    let test = WishartTetradTest::new(cov, search.alpha)?;
    let clustering = model.clustering();
    let result = Purifier::with_config(&test, search.config_with_seed(seed))?.purify(&clustering)?;
    report(&clustering, &result, search.json)
}

fn run_purify(input: &Path, clusters: &[String], search: &SearchArgs) -> Result<()> {
    let test = WishartTetradTest::new(load_covariance(input)?, search.alpha)?;
    let clustering = parse_clusters(clusters)?;
    let result = Purifier::with_config(&test, search.config())?
        .purify(&clustering)
        .context("purification failed")?;
    report(&clustering, &result, search.json)
}

fn run_check(input: &Path, clusters: &[String], alpha: f64) -> Result<()> {
    let test = WishartTetradTest::new(load_covariance(input)?, alpha)?;
    let clustering = parse_clusters(clusters)?;
    match Purifier::new(&test)?.first_impurity(&clustering)? {
        Some(evidence) => println!("Impure: {evidence}"),
        None => println!("Pure at alpha = {alpha}"),
    }
    Ok(())
}

fn report(input: &[Vec<Node>], result: &Purification, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!(
        "Purified clustering ({} tetrad evaluations{})",
        result.tetrad_evaluations,
        result.seed.map(|s| format!(", seed {s}")).unwrap_or_default()
    );
    for (i, (out, inp)) in result.clusters.iter().zip(input).enumerate() {
        let names: Vec<&str> = out.iter().map(Node::name).collect();
        println!("  {}) [{}/{}] {}", i + 1, out.len(), inp.len(), names.join(", "));
    }

    let rejections: Vec<&Decision> = result.decisions.iter().filter(|d| d.is_rejection()).collect();
    if rejections.is_empty() {
        println!("\nNo indicators removed.");
        return Ok(());
    }
    println!("\nRemoved:");
    for decision in rejections {
        if let Decision::Rejected {
            node,
            evidence,
            corroboration,
        } = decision
        {
            match corroboration {
                Some(second) => println!("  {node}  {evidence}; also {second}"),
                None => println!("  {node}  {evidence}"),
            }
        }
    }
    Ok(())
}
