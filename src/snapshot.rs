use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    biome::Biome,
    climate::ClimateSummary,
    fauna::FaunaKind,
    flora::{FloraTaxon, GrowthStage},
    grid::PlotGrid,
    plot::Plot,
};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloraSnapshot {
    pub taxon: FloraTaxon,
    pub stage: GrowthStage,
    pub biomass_kg: f64,
    pub ground_cover: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaunaSnapshot {
    pub kind: FaunaKind,
    pub species: String,
    /// Rounded to whole animals.
    pub population: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotSnapshot {
    pub row: usize,
    pub col: usize,
    pub biome: Biome,
    pub climate: ClimateSummary,
    pub snow_compaction: f64,
    pub flora: Vec<FloraSnapshot>,
    pub fauna: Vec<FaunaSnapshot>,
}

impl PlotSnapshot {
    pub fn capture(plot: &Plot) -> Self {
        Self {
            row: plot.pos().row,
            col: plot.pos().col,
            biome: plot.biome(),
            climate: plot.climate().summary(),
            snow_compaction: plot.snow_compaction(),
            flora: plot
                .flora()
                .map(|population| FloraSnapshot {
                    taxon: population.taxon(),
                    stage: population.stage(),
                    biomass_kg: population.biomass_kg(),
                    ground_cover: population.ground_cover(),
                })
                .collect(),
            fauna: plot
                .fauna()
                .map(|population| FaunaSnapshot {
                    kind: population.kind(),
                    species: population.params().species.clone(),
                    population: population.population().round().max(0.0) as u64,
                })
                .collect(),
        }
    }

    pub fn ground_cover(&self, taxon: FloraTaxon) -> f64 {
        self.flora
            .iter()
            .find(|flora| flora.taxon == taxon)
            .map_or(0.0, |flora| flora.ground_cover)
    }
}

/// Immutable end-of-day view of the whole grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSnapshot {
    /// Days completed so far.
    pub day: u64,
    pub rows: usize,
    pub cols: usize,
    pub census: BTreeMap<Biome, usize>,
    pub plots: Vec<PlotSnapshot>,
}

impl GridSnapshot {
    pub fn capture(grid: &PlotGrid) -> Self {
        Self {
            day: grid.current_day(),
            rows: grid.rows(),
            cols: grid.cols(),
            census: grid.biome_census(),
            plots: grid.plots().map(PlotSnapshot::capture).collect(),
        }
    }

    pub fn plot(&self, row: usize, col: usize) -> Option<&PlotSnapshot> {
        self.plots.iter().find(|plot| plot.row == row && plot.col == col)
    }

    /// One character per plot, one line per grid row.
    pub fn ascii_map(&self) -> String {
        let mut lines = vec![String::with_capacity(self.cols); self.rows];
        for plot in &self.plots {
            if let Some(line) = lines.get_mut(plot.row) {
                line.push(plot.biome.map_char());
            }
        }
        lines.join("\n")
    }
}

pub struct SnapshotWriter {
    output_dir: PathBuf,
    interval_days: u64,
}

impl SnapshotWriter {
    pub fn new(output_dir: impl AsRef<Path>, interval_days: u64) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            interval_days,
        }
    }

    /// Writes `snapshot` when its day falls on the interval; 0 disables.
    pub fn maybe_write(
        &self,
        snapshot: &GridSnapshot,
        scenario_name: &str,
    ) -> Result<Option<PathBuf>, SnapshotError> {
        if self.interval_days == 0 || snapshot.day == 0 || snapshot.day % self.interval_days != 0 {
            return Ok(None);
        }
        self.write(snapshot, scenario_name).map(Some)
    }

    pub fn write(
        &self,
        snapshot: &GridSnapshot,
        scenario_name: &str,
    ) -> Result<PathBuf, SnapshotError> {
        let dir = self.output_dir.join(scenario_name);
        fs::create_dir_all(&dir).map_err(|source| SnapshotError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("day_{:06}.json", snapshot.day));
        let json = serde_json::to_string_pretty(snapshot)?;
        fs::write(&path, json).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(day: u64) -> GridSnapshot {
        GridSnapshot {
            day,
            rows: 2,
            cols: 2,
            census: BTreeMap::new(),
            plots: vec![
                plot(0, 0, Biome::SouthernTundra),
                plot(0, 1, Biome::MammothSteppe),
                plot(1, 0, Biome::NorthernTaiga),
                plot(1, 1, Biome::NorthernTundra),
            ],
        }
    }

    fn plot(row: usize, col: usize, biome: Biome) -> PlotSnapshot {
        PlotSnapshot {
            row,
            col,
            biome,
            climate: ClimateSummary {
                air_temp_c: 0.0,
                soil_temp_c: 0.0,
                snow_depth_m: 0.0,
                precipitation_mm: 0.0,
                meltwater_mm: 0.0,
                solar_radiation_mj_m2: 0.0,
                uv_index: None,
                dry_days: 0,
                permafrost: false,
            },
            snow_compaction: 0.0,
            flora: vec![FloraSnapshot {
                taxon: FloraTaxon::GrassHerb,
                stage: GrowthStage::Established,
                biomass_kg: 10.0,
                ground_cover: 0.25,
            }],
            fauna: Vec::new(),
        }
    }

    #[test]
    fn ascii_map_has_one_line_per_row() {
        assert_eq!(snapshot(1).ascii_map(), "uM\ntn");
    }

    #[test]
    fn writer_honours_interval() {
        let temp = tempfile::tempdir().expect("tempdir");
        let writer = SnapshotWriter::new(temp.path(), 10);
        assert!(writer.maybe_write(&snapshot(5), "demo").expect("io").is_none());
        let path = writer
            .maybe_write(&snapshot(20), "demo")
            .expect("io")
            .expect("written on interval");
        assert!(path.ends_with("demo/day_000020.json"));
        let json = fs::read_to_string(&path).expect("readable");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["day"], 20);
        assert_eq!(value["plots"][1]["biome"], "mammoth_steppe");
        assert_eq!(value["plots"][0]["flora"][0]["taxon"], "grass_herb");

        let disabled = SnapshotWriter::new(temp.path(), 0);
        assert!(disabled.maybe_write(&snapshot(20), "demo").expect("io").is_none());
    }

    #[test]
    fn ground_cover_lookup_defaults_to_zero() {
        let plot = plot(0, 0, Biome::SouthernTundra);
        assert_eq!(plot.ground_cover(FloraTaxon::GrassHerb), 0.25);
        assert_eq!(plot.ground_cover(FloraTaxon::Shrub), 0.0);
    }
}
