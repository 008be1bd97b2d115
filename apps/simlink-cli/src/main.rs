mod scenario;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use simlink_client::LoopbackServer;
use simlink_controller::Simulation;
use simlink_present::{DebugTextPresenter, Presenter};
use simlink_provision::EntityState;
use simlink_session::Session;
use tracing_subscriber::EnvFilter;

use crate::scenario::ScenarioFile;

#[derive(Parser)]
#[command(name = "simlink-cli", about = "CLI tool for simlink scenarios")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Parse and check a scenario file without connecting
    Validate {
        /// Scenario file (YAML)
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a scenario against the in-process loopback simulator
    Run {
        /// Scenario file (YAML)
        #[arg(short, long)]
        config: PathBuf,
        /// Override the number of steps in the file
        #[arg(short, long)]
        steps: Option<u64>,
    },
}

#[derive(Serialize)]
struct StepReport<'a> {
    step: u64,
    entities: &'a [EntityState],
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info => {
            println!("simlink-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "walker controller: {}",
                simlink_provision::WALKER_CONTROLLER_BLUEPRINT
            );
            println!("camera: {}", simlink_present::CAMERA_BLUEPRINT);
        }
        Commands::Validate { config } => {
            let scenario = ScenarioFile::load(&config)?;
            println!(
                "{}: OK (map={}, timestep={}s, entities={}, steps={}, controls={})",
                config.display(),
                scenario.session.map.label(),
                scenario.session.timestep,
                scenario.entities.len(),
                scenario.steps,
                scenario.controls.len()
            );
        }
        Commands::Run { config, steps } => {
            let mut scenario = ScenarioFile::load(&config)?;
            if let Some(steps) = steps {
                scenario.steps = steps;
            }
            run(&scenario)?;
        }
    }

    Ok(())
}

fn run(scenario: &ScenarioFile) -> anyhow::Result<()> {
    let server = LoopbackServer::new();
    let session =
        Session::open(scenario.session.clone(), &server).context("failed to open session")?;
    tracing::info!(session = %session.id(), "session open");

    let presenter: Option<Box<dyn Presenter>> = scenario
        .session
        .render
        .then(|| Box::new(DebugTextPresenter::new(scenario.session.display)) as Box<dyn Presenter>);
    let mut sim = Simulation::new(session, &scenario.entities, presenter)
        .context("failed to provision scenario")?;

    for step in 1..=scenario.steps {
        for scheduled in scenario.controls_at(step) {
            sim.enqueue(scheduled.entity, scheduled.control()?)?;
        }
        let states = sim.step().with_context(|| format!("step {step} failed"))?;
        let report = StepReport {
            step,
            entities: &states,
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    sim.destroy().context("teardown failed")?;
    tracing::info!(
        steps = scenario.steps,
        frames = server.frame(),
        "scenario finished"
    );
    Ok(())
}
