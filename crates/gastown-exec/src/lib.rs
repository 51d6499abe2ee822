//! The `gastown` command line: stage and launch convoys, watch their
//! progress, and run the feeder.

#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use gastown_convoy::cli::{LaunchArgs, StageArgs, StatusArgs};
use gastown_convoy::ops;
use gastown_convoy::report::{render_human, StageStatus};
use gastown_convoy::StageError;
use gastown_core::dispatch::LogDispatcher;
use gastown_core::logging::LoggingArgs;
use gastown_core::routing::{RoutesError, StaticRoutes};
use gastown_core::store::{JsonFileStore, StoreError};
use gastown_feeder::{FeedArgs, Feeder, FeederConfig};

/// Command line options for gastown.
#[derive(Debug, Parser)]
#[clap(name = "gastown")]
#[clap(version, author)]
#[clap(about = "Stage, launch, and feed convoys of beads")]
pub struct GastownArgs {
    /// Log level to run in.
    #[clap(flatten)]
    logging: LoggingArgs,

    /// The bead store to operate on
    #[clap(long, global = true, default_value = ".gastown/beads.json")]
    store: PathBuf,

    /// The routing table mapping id prefixes to pools
    #[clap(long, global = true, default_value = ".gastown/routes.toml")]
    routes: PathBuf,

    #[clap(subcommand)]
    command: GastownCommand,
}

#[derive(Debug, Subcommand)]
enum GastownCommand {
    /// Validate a working set and mint or refresh a convoy
    Stage(StageArgs),
    /// Launch a staged convoy and dispatch its first wave
    Launch(LaunchArgs),
    /// Show a convoy's progress through its waves
    Status(StatusArgs),
    /// Run the feeder loop until interrupted
    Feed(FeedArgs),
}

/// An error terminating the command line run
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Routes(#[from] RoutesError),
    /// Staging surfaced error findings; the report was already emitted.
    #[error("staging failed")]
    StageRefused,
}

/// Parse args from the environment and run the requested command.
pub fn execute() -> Result<(), ExecError> {
    let args = GastownArgs::parse();
    args.logging.init_root_logger();

    match run(&args) {
        Ok(()) => Ok(()),
        Err(ExecError::StageRefused) => Err(ExecError::StageRefused),
        Err(e) => {
            eprintln!("error: {}", e);
            Err(e)
        }
    }
}

fn run(args: &GastownArgs) -> Result<(), ExecError> {
    let store = JsonFileStore::open(&args.store)?;
    let routes = load_routes(&args.routes)?;
    let dispatcher = LogDispatcher;

    match &args.command {
        GastownCommand::Stage(stage_args) => {
            let run = ops::run_stage(&store, &routes, &dispatcher, stage_args)?;
            if stage_args.json {
                println!("{}", serde_json::to_string_pretty(&run.outcome.report)?);
            } else {
                print!("{}", render_human(&run.outcome.report));
                if let Some(launch) = &run.launch {
                    print!("{}", ops::render_launch(launch));
                }
            }
            if run.outcome.status == StageStatus::Error {
                return Err(ExecError::StageRefused);
            }
            Ok(())
        }
        GastownCommand::Launch(launch_args) => {
            let outcome = ops::run_launch(&store, &routes, &dispatcher, launch_args)?;
            if launch_args.json {
                let value = serde_json::json!({
                    "convoy_id": outcome.convoy_id,
                    "dispatched": outcome.dispatched.iter()
                        .map(|(id, pool)| serde_json::json!({"id": id, "pool": pool}))
                        .collect::<Vec<_>>(),
                    "failed": outcome.failed.iter()
                        .map(|(id, error)| serde_json::json!({"id": id, "error": error}))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print!("{}", ops::render_launch(&outcome));
            }
            Ok(())
        }
        GastownCommand::Status(status_args) => {
            let progress = ops::run_status(&store, status_args)?;
            if status_args.json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                print!("{}", ops::render_progress(&progress));
            }
            Ok(())
        }
        GastownCommand::Feed(feed_args) => {
            let config = FeederConfig::from(feed_args);
            let feeder = Feeder::new(
                Arc::new(store),
                Arc::new(routes),
                Arc::new(dispatcher),
                config,
            );
            // runs until the process is interrupted
            let (_shutdown_tx, shutdown_rx) = Feeder::shutdown_channel();
            feeder.run(shutdown_rx);
            Ok(())
        }
    }
}

fn load_routes(path: &PathBuf) -> Result<StaticRoutes, ExecError> {
    if path.exists() {
        Ok(StaticRoutes::from_path(path)?)
    } else {
        warn!("no routes file at {}, all prefixes unrouted", path.display());
        Ok(StaticRoutes::new())
    }
}

impl From<serde_json::Error> for ExecError {
    fn from(e: serde_json::Error) -> Self {
        ExecError::Store(StoreError::Serde(e))
    }
}
