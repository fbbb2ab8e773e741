mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use lccusum_core::CusumError;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "lccusum",
    about = "Track procedure learning curves with LC-CUSUM and decide competence",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .lccusum/)
    #[arg(long, global = true, env = "LCCUSUM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a project with the starter procedure catalog
    Init,

    /// Show, validate, or resolve the rate configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Run LC-CUSUM over an outcome string without storing anything
    Compute {
        /// Outcomes in order, S = success and F = failure (e.g. SSFSS)
        outcomes: String,
        #[arg(long)]
        p0: f64,
        #[arg(long)]
        p1: f64,
        #[arg(long)]
        alpha: Option<f64>,
        #[arg(long)]
        beta: Option<f64>,
    },

    /// Record one outcome for a trainee on a procedure
    Record {
        trainee: String,
        procedure: String,
        /// Supervisor-validated success
        #[arg(long, conflicts_with = "failure")]
        success: bool,
        /// Supervisor-validated failure
        #[arg(long)]
        failure: bool,
        /// Self-reported autonomy: observed, assisted, capable, autonomous
        #[arg(long)]
        autonomy: Option<String>,
        /// Attempt number within the open cycle (default: next)
        #[arg(long)]
        index: Option<u64>,
        /// Team whose overrides apply when the tracker is first created
        #[arg(long)]
        team: Option<String>,
    },

    /// Show the open cycle of a tracker
    Status { trainee: String, procedure: String },

    /// List closed cycles of a tracker
    History { trainee: String, procedure: String },

    /// Export the open cycle's trajectory as chart points
    Chart { trainee: String, procedure: String },

    /// Close a decided cycle and open the next one
    Reset { trainee: String, procedure: String },

    /// Rebuild open cycles from stored outcomes with the current configuration
    Recompute {
        /// Trainee (omit with --all)
        #[arg(required_unless_present = "all")]
        trainee: Option<String>,
        /// Procedure (omit with --all)
        #[arg(required_unless_present = "all")]
        procedure: Option<String>,
        /// Team whose overrides apply
        #[arg(long)]
        team: Option<String>,
        /// Recompute every stored tracker
        #[arg(long, conflicts_with_all = ["trainee", "procedure"])]
        all: bool,
    },

    /// Confidence alerts for a team's procedure thresholds
    Alerts {
        #[arg(long)]
        team: String,
    },

    /// Trainee by procedure progress matrix
    Matrix {
        /// Team whose thresholds drive alerts
        #[arg(long)]
        team: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
        Commands::Compute {
            outcomes,
            p0,
            p1,
            alpha,
            beta,
        } => cmd::compute::run(&outcomes, p0, p1, alpha, beta, json),
        Commands::Record {
            trainee,
            procedure,
            success,
            failure,
            autonomy,
            index,
            team,
        } => {
            let validated = match (success, failure) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            cmd::record::run(
                &root,
                cmd::record::RecordArgs {
                    trainee: &trainee,
                    procedure: &procedure,
                    validated,
                    autonomy: autonomy.as_deref(),
                    index,
                    team: team.as_deref(),
                },
                json,
            )
        }
        Commands::Status { trainee, procedure } => {
            cmd::status::status(&root, &trainee, &procedure, json)
        }
        Commands::History { trainee, procedure } => {
            cmd::status::history(&root, &trainee, &procedure, json)
        }
        Commands::Chart { trainee, procedure } => {
            cmd::status::chart(&root, &trainee, &procedure, json)
        }
        Commands::Reset { trainee, procedure } => cmd::reset::run(&root, &trainee, &procedure, json),
        Commands::Recompute {
            trainee,
            procedure,
            team,
            all,
        } => match (all, trainee, procedure) {
            (true, _, _) => cmd::recompute::run_all(&root, team.as_deref(), json),
            (false, Some(trainee), Some(procedure)) => {
                cmd::recompute::run(&root, &trainee, &procedure, team.as_deref(), json)
            }
            _ => Err(anyhow::anyhow!(
                "recompute needs <trainee> <procedure> or --all"
            )),
        },
        Commands::Alerts { team } => cmd::report::alerts(&root, &team, json),
        Commands::Matrix { team } => cmd::report::matrix(&root, team.as_deref(), json),
    };

    if let Err(e) = result {
        if json {
            let code = e
                .downcast_ref::<CusumError>()
                .map(CusumError::code)
                .unwrap_or("error");
            output::print_json_error(code, &format!("{e:#}"));
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
