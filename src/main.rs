use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod aggregate;
mod change;
mod config;
mod dashboard;
mod db;
mod error;
mod joiner;
mod kpi;
mod models;
mod ranking;
mod report;
mod source;
mod view;

use config::{Config, StoreArgs};
use dashboard::{render, Dashboard, Snapshot, ViewQuery};
use ranking::{top_observations, DateRange, TOP_LIMIT};
use view::{Selection, ViewMode};

#[derive(Parser)]
#[command(name = "observation-dashboard")]
#[command(
    about = "Classroom observation scores per observation, per teacher and per institution",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Raise verbosity above --log-level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one view of the observation data
    Show {
        #[arg(long, value_enum, default_value_t = ViewMode::Single)]
        view: ViewMode,
        /// Observation to show in the single view (defaults to the first loaded)
        #[arg(long)]
        observation: Option<String>,
        /// Teacher to average in the by-teacher view (defaults to the first eligible)
        #[arg(long)]
        teacher: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the highest scoring observations
    Ranking {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = TOP_LIMIT)]
        limit: usize,
    },
    /// List teachers with enough observations for an average
    Teachers,
    /// Find the first observation by teacher name or subject
    Search { term: String },
    /// Export observations as CSV
    Export {
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value = "observations.csv")]
        out: PathBuf,
    },
    /// Keep a view up to date, reloading whenever new responses arrive
    Watch {
        #[arg(long, value_enum, default_value_t = ViewMode::Institution)]
        view: ViewMode,
        #[arg(long)]
        teacher: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

fn effective_level(level: &str, verbose: u8) -> &str {
    match verbose {
        0 => level,
        1 => "debug",
        _ => "trace",
    }
}

fn init_logging(level: &str, verbose: u8) {
    let level = effective_level(level, verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.verbose);

    let config = Config::from_args(&cli.store)?;
    debug!(schema = %config.schema, "configuration loaded");

    let pool = db::connect(&config)
        .await
        .context("failed to connect to Postgres")?;
    let source = Arc::new(db::PgSource::new(pool, config.schema.clone()));
    let dashboard = Dashboard::new(source);

    // Watch mode starts from an empty view and keeps retrying on each tick.
    if let Err(err) = dashboard.reload().await {
        if !matches!(cli.command, Commands::Watch { .. }) {
            return Err(err).context("initial load of observation data failed");
        }
        error!(error = %err, "initial load failed, waiting for the next check");
    }
    let snapshot = dashboard.snapshot().await;
    info!(observations = snapshot.observations.len(), "observation data loaded");

    match cli.command {
        Commands::Show {
            view,
            observation,
            teacher,
            from,
            to,
            format,
            out,
        } => {
            let query = ViewQuery {
                mode: Some(view),
                selection: Selection {
                    observation_id: observation,
                    teacher_id: teacher,
                },
                range: DateRange::new(from, to),
            };
            let rendered = render(&snapshot, &query);
            let output = match format {
                OutputFormat::Markdown => report::build_report(&rendered),
                OutputFormat::Json => serde_json::to_string_pretty(&rendered)?,
            };

            match out {
                Some(path) => {
                    std::fs::write(&path, output)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => println!("{output}"),
            }
        }
        Commands::Ranking { from, to, limit } => {
            let observations = DateRange::new(from, to).filter(&snapshot.observations);
            let ranked = top_observations(&observations, limit);

            if ranked.is_empty() {
                println!("No observations found for this window.");
                return Ok(());
            }

            println!("Top observations by total score:");
            for (position, observation) in ranked.iter().enumerate() {
                println!("{}. {}", position + 1, report::format_observation(observation));
            }
        }
        Commands::Teachers => {
            let teachers = view::eligible_teachers(&snapshot.observations);
            print!("{}", report::build_teacher_list(&teachers));
        }
        Commands::Search { term } => match view::search(&snapshot.observations, &term) {
            Some(found) => {
                let query = ViewQuery {
                    mode: Some(ViewMode::Single),
                    selection: Selection {
                        observation_id: Some(found.observation_id.clone()),
                        teacher_id: None,
                    },
                    range: DateRange::default(),
                };
                println!("{}", report::build_report(&render(&snapshot, &query)));
            }
            None => println!("No observation matches {term:?}."),
        },
        Commands::Export { from, to, out } => {
            let observations = DateRange::new(from, to).filter(&snapshot.observations);
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_csv(file, &observations)?;
            println!("Exported {} observations to {}.", observations.len(), out.display());
        }
        Commands::Watch { view, teacher } => {
            let query = ViewQuery {
                mode: Some(view),
                selection: Selection {
                    observation_id: None,
                    teacher_id: teacher,
                },
                range: DateRange::default(),
            };
            let print_view = |snapshot: &Snapshot| {
                println!("{}", report::build_report(&render(snapshot, &query)));
            };

            print_view(snapshot.as_ref());
            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    error!(error = %err, "failed to listen for ctrl-c, stopping watch");
                }
            };
            dashboard
                .watch(config.poll_interval, shutdown, print_view)
                .await;
        }
    }

    Ok(())
}
