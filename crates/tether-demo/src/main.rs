#![forbid(unsafe_code)]

//! `tether-demo`: run a built-in scenario or load a scene file and print
//! what every node exposes and binds.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tether_demo::{ComponentRegistry, Scenario, Scene, SceneError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Scoped reactive data binding, demonstrated.
#[derive(Parser, Debug)]
#[command(name = "tether-demo")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Built-in scenario to run
    #[arg(value_enum, default_value_t = Scenario::Basic)]
    scenario: Scenario,

    /// Load this scene file instead of the scenario's own scene; the
    /// scenario script is skipped
    #[arg(short, long)]
    scene: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `tether_tree=trace` (overrides RUST_LOG)
    #[arg(short, long)]
    log: Option<String>,

    /// List the registered component kinds and exit
    #[arg(long)]
    kinds: bool,
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("invalid --log filter ({err}); using `info`");
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}

fn run(cli: &Cli) -> Result<(), SceneError> {
    let registry = ComponentRegistry::with_demo_components();
    if cli.kinds {
        for kind in registry.kinds() {
            println!("{kind}");
        }
        return Ok(());
    }

    let scene = match &cli.scene {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading scene");
            Scene::load(path, &registry)?
        }
        None => {
            let mut scene = cli.scenario.load(&registry)?;
            cli.scenario.run(&mut scene)?;
            scene
        }
    };

    for report in scene.reports()? {
        print!("{report}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref());

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "tether-demo failed");
            ExitCode::FAILURE
        }
    }
}
