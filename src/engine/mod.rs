use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    biome::Biome,
    grid::{DayReport, PlotGrid},
    snapshot::{GridSnapshot, SnapshotWriter},
};

pub struct EngineSettings {
    pub scenario_name: String,
    pub snapshot_interval_days: u64,
    pub snapshot_dir: PathBuf,
}

/// Totals gathered over one `run` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub days: u64,
    pub migrations: usize,
    pub discarded_migrations: usize,
    pub transitions: usize,
    /// First day each plot (row, col) became steppe.
    pub first_steppe_day: BTreeMap<(usize, usize), u64>,
    pub final_census: BTreeMap<Biome, usize>,
}

impl RunSummary {
    fn record(&mut self, report: &DayReport) {
        self.days += 1;
        self.migrations += report.migrations.len();
        self.discarded_migrations += report.discarded.len();
        self.transitions += report.transitions.len();
        for transition in &report.transitions {
            if transition.to == Biome::MammothSteppe {
                self.first_steppe_day
                    .entry((transition.pos.row, transition.pos.col))
                    .or_insert(report.day);
            }
        }
    }
}

pub struct Engine {
    settings: EngineSettings,
    snapshot_writer: SnapshotWriter,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            snapshot_writer: SnapshotWriter::new(
                &settings.snapshot_dir,
                settings.snapshot_interval_days,
            ),
            settings,
        }
    }

    pub fn run(&mut self, grid: &mut PlotGrid, days: u64) -> Result<RunSummary> {
        self.run_with_hook(grid, days, |_| {})
    }

    /// Runs `days` days, handing each end-of-day snapshot to `hook`.
    pub fn run_with_hook<F>(
        &mut self,
        grid: &mut PlotGrid,
        days: u64,
        mut hook: F,
    ) -> Result<RunSummary>
    where
        F: FnMut(Arc<GridSnapshot>),
    {
        let name = self.settings.scenario_name.as_str();
        info!(
            scenario = name,
            days,
            start_day = grid.current_day(),
            plots = grid.rows() * grid.cols(),
            "simulation starting"
        );
        let mut summary = RunSummary::default();
        for _ in 0..days {
            let day = grid.current_day();
            let report = grid
                .step()
                .with_context(|| format!("Scenario '{name}' stopped on day {day}"))?;
            summary.record(&report);

            let snapshot = Arc::new(grid.snapshot());
            if let Some(path) = self
                .snapshot_writer
                .maybe_write(&snapshot, name)
                .with_context(|| format!("Failed to write snapshot for day {}", snapshot.day))?
            {
                info!(path = %path.display(), "snapshot written");
            }
            hook(snapshot);
        }
        summary.final_census = grid.biome_census();
        info!(
            scenario = name,
            days = summary.days,
            transitions = summary.transitions,
            migrations = summary.migrations,
            census = ?summary.final_census,
            "simulation finished"
        );
        Ok(summary)
    }
}
