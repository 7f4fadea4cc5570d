use clap::{Args, Parser, Subcommand, ValueEnum};
use qsphere::engine::config::Criterion;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qsphere - uniform spherical sampling scheme design for diffusion MRI gradient tables.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate a uniform scheme: electrostatic start refined by continuous
    /// separation optimization.
    Generate(GenerateArgs),
    /// Generate a scheme with the electrostatic stage only.
    Geem(GeemArgs),
    /// Optimize the polarity (sign) of every direction of an existing scheme.
    Flip(FlipArgs),
    /// Select uniform subsets out of oversampled candidate schemes.
    Subsample(SubsampleArgs),
    /// Optimize the acquisition order so interrupted scans stay uniform.
    Order(OrderArgs),
    /// Merge per-shell b-vector files and b-values into one scheme pair.
    Combine(CombineArgs),
    /// Report quality statistics of a scheme.
    Stats(StatsArgs),
    /// Run generate, flip and order as one pipeline.
    Pipeline(PipelineArgs),
}

/// Objective family for the discrete optimizers.
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum CriterionArg {
    Distance,
    Electrostatic,
}

impl From<CriterionArg> for Criterion {
    fn from(arg: CriterionArg) -> Self {
        match arg {
            CriterionArg::Distance => Criterion::Distance,
            CriterionArg::Electrostatic => Criterion::Electrostatic,
        }
    }
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Number of points per shell, comma-separated (e.g. 30 or 90,90,90).
    #[arg(short, long, required = true, value_name = "LIST")]
    pub number: String,

    /// Output file; multi-shell schemes are written as {stem}_shell{i}{ext}.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Starting points file instead of the electrostatic initializer.
    #[arg(short, long, value_name = "PATH")]
    pub initialization: Option<PathBuf>,

    /// Treat directions as asymmetric (no antipodal symmetry).
    #[arg(long)]
    pub asym: bool,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Maximum angular movement of one refinement step, in radians.
    #[arg(long, value_name = "FLOAT", default_value_t = 0.1)]
    pub delta: f64,

    /// Maximum iteration rounds for continuous optimization.
    #[arg(long, value_name = "INT", default_value_t = 1000)]
    pub max_iter: usize,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct GeemArgs {
    /// Number of points per shell, comma-separated.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub number: String,

    /// Output file; multi-shell schemes are written as {stem}_shell{i}{ext}.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Treat directions as asymmetric (no antipodal symmetry).
    #[arg(long)]
    pub asym: bool,

    /// Maximum descent iterations.
    #[arg(long, value_name = "INT", default_value_t = 1000)]
    pub max_iter: usize,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct FlipArgs {
    /// Input b-vector file(s), comma-separated for multi-shell schemes.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub input: String,

    /// Output file; multi-shell schemes are written as {stem}_shell{i}{ext}.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Objective for the sign assignment.
    #[arg(short, long, value_enum, default_value_t = CriterionArg::Electrostatic)]
    pub criterion: CriterionArg,

    /// Inverse-power order of the electrostatic criterion.
    #[arg(long, value_name = "INT", default_value_t = 1)]
    pub order: i32,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Wall-clock budget of the discrete solver, in seconds.
    #[arg(short, long, value_name = "SECONDS", default_value_t = 600.0)]
    pub time_limit: f64,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct SubsampleArgs {
    /// Candidate b-vector file(s), comma-separated for per-shell pools.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub input: String,

    /// Number of points to keep, comma-separated for multiple shells.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub number: String,

    /// Output file; multi-shell schemes are written as {stem}_shell{i}{ext}.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Treat directions as asymmetric (no antipodal symmetry).
    #[arg(long)]
    pub asym: bool,

    /// Objective for the selection.
    #[arg(short, long, value_enum, default_value_t = CriterionArg::Distance)]
    pub criterion: CriterionArg,

    /// Inverse-power order of the electrostatic criterion.
    #[arg(long, value_name = "INT", default_value_t = 1)]
    pub order: i32,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Covering-radius lower bounds in radians, one per shell plus one for
    /// the combined set, passed to the solver as search hints.
    #[arg(long, value_name = "LIST")]
    pub lower_bound: Option<String>,

    /// Wall-clock budget of the discrete solver, in seconds.
    #[arg(short, long, value_name = "SECONDS", default_value_t = 600.0)]
    pub time_limit: f64,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Input b-vector file.
    #[arg(value_name = "BVEC")]
    pub bvec: PathBuf,

    /// Matching b-value file; enables multi-shell ordering.
    #[arg(value_name = "BVAL")]
    pub bval: Option<PathBuf>,

    /// Output file; with b-values, {stem}_bvec{ext} and {stem}_bval{ext}
    /// are written.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Number of points ordered per solver batch.
    #[arg(short, long, value_name = "INT", default_value_t = 3)]
    pub split: usize,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Wall-clock budget of each solver batch, in seconds.
    #[arg(short, long, value_name = "SECONDS", default_value_t = 600.0)]
    pub time_limit: f64,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct CombineArgs {
    /// Per-shell b-vector files, comma-separated.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub input: String,

    /// One b-value per input shell, comma-separated.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub bval: String,

    /// Output stem; {stem}_bvec{ext} and {stem}_bval{ext} are written.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Input b-vector file.
    #[arg(value_name = "BVEC")]
    pub bvec: PathBuf,

    /// Matching b-value file; enables per-shell reporting.
    #[arg(value_name = "BVAL")]
    pub bval: Option<PathBuf>,

    /// Treat directions as asymmetric (no antipodal symmetry).
    #[arg(long)]
    pub asym: bool,

    /// Inverse-power order of the reported electrostatic energy.
    #[arg(long, value_name = "INT", default_value_t = 1)]
    pub order: i32,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Read in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[derive(Args, Debug)]
pub struct PipelineArgs {
    /// Number of points per shell, comma-separated.
    #[arg(short, long, required = true, value_name = "LIST")]
    pub number: String,

    /// Final output file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// One b-value per shell, comma-separated. Required for multi-shell runs.
    #[arg(short, long, value_name = "LIST")]
    pub bval: Option<String>,

    /// Starting points file instead of the electrostatic initializer.
    #[arg(short, long, value_name = "PATH")]
    pub initialization: Option<PathBuf>,

    /// Weight for the per-shell term; 1-weight goes to the combined term.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 0.5)]
    pub weight: f64,

    /// Objective for the polarity stage.
    #[arg(short, long, value_enum, default_value_t = CriterionArg::Electrostatic)]
    pub criterion: CriterionArg,

    /// Number of points ordered per solver batch.
    #[arg(short, long, value_name = "INT", default_value_t = 3)]
    pub split: usize,

    /// Maximum iteration rounds for continuous optimization.
    #[arg(long, value_name = "INT", default_value_t = 1000)]
    pub max_iter: usize,

    /// Wall-clock budget of each discrete solve, in seconds.
    #[arg(short, long, value_name = "SECONDS", default_value_t = 600.0)]
    pub time_limit: f64,

    /// Read and write in the transposed FSL gradient layout.
    #[arg(long)]
    pub fslgrad: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_parses_a_multi_shell_request() {
        let cli = Cli::parse_from([
            "qsphere", "generate", "-n", "90,90,90", "-o", "scheme.txt", "-vv",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.number, "90,90,90");
                assert!(!args.asym);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn order_accepts_an_optional_bval_positional() {
        let cli = Cli::parse_from(["qsphere", "order", "bvec.txt", "-o", "out.txt"]);
        match cli.command {
            Commands::Order(args) => assert!(args.bval.is_none()),
            _ => panic!("wrong subcommand"),
        }
    }
}
