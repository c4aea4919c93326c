use std::sync::Arc;

use mammoth_steppe::{
    biome::{Biome, BiomeProfile},
    climate::{Climate, ClimateTable, DayStats},
    engine::{Engine, EngineSettings},
    error::ConfigError,
    grid::{Neighborhood, PlotGrid},
    plot::Plot,
    scenario::{RunOverrides, ScenarioLoader},
};
use tempfile::tempdir;

#[test]
fn engine_runs_hook_each_day() {
    let loader = ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"));
    let scenario = loader
        .load("scenarios/edge_herd.yaml")
        .expect("scenario should load");
    let mut grid = scenario
        .build_grid(RunOverrides::default())
        .expect("grid builds");
    let temp = tempdir().expect("tempdir");
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        snapshot_interval_days: 5,
        snapshot_dir: temp.path().to_path_buf(),
    };
    let mut engine = Engine::new(settings);

    let mut days = Vec::new();
    let summary = engine
        .run_with_hook(&mut grid, 12, |snapshot| days.push(snapshot.day))
        .expect("run succeeds");

    assert_eq!(days.len(), 12);
    assert_eq!(days.first().copied(), Some(1));
    assert_eq!(days.last().copied(), Some(12));
    assert_eq!(summary.days, 12);
    assert_eq!(summary.final_census.values().sum::<usize>(), 9);

    let dir = temp.path().join("edge_herd");
    assert!(dir.join("day_000005.json").exists());
    assert!(dir.join("day_000010.json").exists());
    assert!(!dir.join("day_000012.json").exists());
}

#[test]
fn engine_reports_the_failing_day() {
    let mut table = ClimateTable::uniform("gap", DayStats::constant(-5.0, 1.0));
    table.remove("gap", 2);
    let table = Arc::new(table);
    let mut profile = BiomeProfile::builtin(Biome::NorthernTundra);
    profile.climate_location = "gap".into();
    let build = |pos| -> Result<Plot, ConfigError> {
        let climate = Climate::new("gap", table.clone(), 3)?;
        Ok(Plot::from_profile(pos, Biome::NorthernTundra, &profile, 1.0, climate))
    };
    let mut grid = PlotGrid::from_fn(1, 2, Neighborhood::VonNeumann, build).expect("grid builds");
    let temp = tempdir().expect("tempdir");
    let mut engine = Engine::new(EngineSettings {
        scenario_name: "gap".into(),
        snapshot_interval_days: 1,
        snapshot_dir: temp.path().to_path_buf(),
    });

    let mut seen = 0;
    let err = engine
        .run_with_hook(&mut grid, 5, |_| seen += 1)
        .expect_err("day 2 has no statistics");

    assert_eq!(seen, 2);
    assert_eq!(grid.current_day(), 2);
    let message = format!("{err:#}");
    assert!(message.contains("stopped on day 2"), "{message}");
    assert!(message.contains("day-of-year 2"), "{message}");
    assert!(temp.path().join("gap").join("day_000002.json").exists());
    assert!(!temp.path().join("gap").join("day_000003.json").exists());
}
