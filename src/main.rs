use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mammoth_steppe::{
    engine::{Engine, EngineSettings},
    scenario::{RunOverrides, ScenarioLoader},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Mammoth steppe grid simulation")]
struct Cli {
    /// Path to the scenario YAML file
    #[arg(long, default_value = "scenarios/siberia_transect.yaml")]
    scenario: PathBuf,

    /// Override day count (uses scenario default when omitted)
    #[arg(long)]
    days: Option<u64>,

    /// Override the master random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the initial megaherbivore density per square kilometre
    #[arg(long)]
    mammoth_density: Option<f64>,

    /// Override snapshot interval in days (0 disables snapshot files)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Directory for snapshots
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Print an ASCII biome map after every day
    #[arg(long)]
    visualize: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mammoth_steppe=info")),
        )
        .init();

    let cli = Cli::parse();
    let loader = ScenarioLoader::new(".");
    let scenario = loader.load(&cli.scenario)?;
    let overrides = RunOverrides {
        seed: cli.seed,
        mammoth_density_per_km2: cli.mammoth_density,
    };
    let mut grid = scenario.build_grid(overrides)?;
    let days = scenario.days(cli.days);

    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        snapshot_interval_days: cli
            .snapshot_interval
            .unwrap_or(scenario.snapshot_interval_days),
        snapshot_dir: cli
            .snapshot_dir
            .unwrap_or_else(|| PathBuf::from("snapshots")),
    };
    let mut engine = Engine::new(settings);

    let summary = if cli.visualize {
        engine.run_with_hook(&mut grid, days, |snapshot| {
            println!("day {}\n{}\n", snapshot.day, snapshot.ascii_map());
        })?
    } else {
        engine.run(&mut grid, days)?
    };

    println!(
        "Scenario '{}' completed for {} days. Biomes: {:?}",
        scenario.name, summary.days, summary.final_census
    );
    for ((row, col), day) in &summary.first_steppe_day {
        println!("  plot ({row}, {col}) first became mammoth steppe on day {day}");
    }
    Ok(())
}
