use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    biome::{Biome, BiomeDefaults, BiomeProfile, FaunaSeed, FloraSeed},
    climate::{Climate, ClimateTable},
    error::ConfigError,
    fauna::{FaunaKind, FaunaParams, FaunaPopulation},
    flora::{FloraTaxon, GrowthStage},
    grid::{GridPos, Neighborhood, PlotGrid},
    plot::Plot,
    rng::{RngManager, Stream},
};

fn default_snapshot_interval_days() -> u64 {
    30
}

fn default_plot_area_km2() -> f64 {
    1.0
}

fn default_biome() -> String {
    Biome::SouthernTundra.name().to_string()
}

fn default_migration_patience_days() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    pub seed: u64,
    #[serde(default)]
    pub days: Option<u64>,
    #[serde(default = "default_snapshot_interval_days")]
    pub snapshot_interval_days: u64,
    /// Resolved against the loader's base directory.
    pub climate_stats: PathBuf,
    pub grid: ScenarioGrid,
    #[serde(default)]
    pub megaherbivores: Option<MegaherbivoreIntroduction>,
    #[serde(default = "default_migration_patience_days")]
    pub migration_patience_days: u32,
    #[serde(default)]
    pub biomes: BTreeMap<String, BiomeOverride>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioGrid {
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub neighborhood: Neighborhood,
    #[serde(default = "default_plot_area_km2")]
    pub plot_area_km2: f64,
    #[serde(default = "default_biome")]
    pub default_biome: String,
    /// Assigns biomes by latitude, row 0 being the northern edge.
    #[serde(default)]
    pub latitude: Option<LatitudeSpan>,
    #[serde(default)]
    pub cells: Vec<CellOverride>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LatitudeSpan {
    pub north: f64,
    pub south: f64,
}

impl LatitudeSpan {
    fn at_row(&self, row: usize, rows: usize) -> f64 {
        let fraction = (row as f64 + 0.5) / rows.max(1) as f64;
        self.north - (self.north - self.south) * fraction
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CellOverride {
    pub row: usize,
    pub col: usize,
    pub biome: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MegaherbivoreIntroduction {
    pub density_per_km2: f64,
    /// `[row, col]` pairs; every plot when omitted.
    #[serde(default)]
    pub cells: Option<Vec<[usize; 2]>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiomeOverride {
    pub climate_location: Option<String>,
    pub flora: Option<Vec<FloraSeedConfig>>,
    pub fauna: Option<Vec<FaunaSeedConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloraSeedConfig {
    pub taxon: String,
    pub ground_cover: f64,
    #[serde(default)]
    pub seedling: bool,
    pub nominal_mass_kg: Option<f64>,
    pub footprint_m2: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaunaSeedConfig {
    pub kind: String,
    pub density_per_km2: f64,
    pub species: Option<String>,
    pub avg_mass_kg: Option<f64>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let mut scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        scenario.climate_stats = self.base_dir.join(&scenario.climate_stats);
        Ok(scenario)
    }
}

/// Run parameters that may override what the scenario file says.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub seed: Option<u64>,
    pub mammoth_density_per_km2: Option<f64>,
}

impl Scenario {
    pub fn days(&self, override_days: Option<u64>) -> u64 {
        override_days.or(self.days).unwrap_or(365)
    }

    pub fn load_climate(&self) -> Result<Arc<ClimateTable>> {
        let table = ClimateTable::load(&self.climate_stats)
            .with_context(|| format!("Scenario '{}' has no usable climate statistics", self.name))?;
        Ok(Arc::new(table))
    }

    pub fn build_grid(&self, overrides: RunOverrides) -> Result<PlotGrid> {
        let table = self.load_climate()?;
        let grid = self
            .build_grid_with(table, overrides)
            .with_context(|| format!("Invalid scenario '{}'", self.name))?;
        Ok(grid)
    }

    /// Builds the initial grid from an already loaded climate table.
    pub fn build_grid_with(
        &self,
        table: Arc<ClimateTable>,
        overrides: RunOverrides,
    ) -> Result<PlotGrid, ConfigError> {
        let layout = &self.grid;
        if !(layout.plot_area_km2 > 0.0) {
            return Err(ConfigError::Validation(format!(
                "plot_area_km2 must be positive, got {}",
                layout.plot_area_km2
            )));
        }
        let defaults = self.biome_defaults()?;
        let fallback = initial_biome(&layout.default_biome, "default_biome")?;

        let mut cell_biomes = BTreeMap::new();
        for cell in &layout.cells {
            if cell.row >= layout.rows || cell.col >= layout.cols {
                return Err(ConfigError::Validation(format!(
                    "cell override ({}, {}) is outside the {}x{} grid",
                    cell.row, cell.col, layout.rows, layout.cols
                )));
            }
            let what = format!("cell ({}, {})", cell.row, cell.col);
            cell_biomes.insert(
                GridPos::new(cell.row, cell.col),
                initial_biome(&cell.biome, &what)?,
            );
        }

        let mammoths = self.mammoth_cells(overrides)?;
        let mammoth_params = FaunaParams {
            migration_patience_days: self.migration_patience_days,
            ..FaunaParams::mammoth()
        };
        let rng = RngManager::new(overrides.seed.unwrap_or(self.seed));
        let area = layout.plot_area_km2;

        let build = |pos: GridPos| -> Result<Plot, ConfigError> {
            let biome = cell_biomes.get(&pos).copied().unwrap_or_else(|| {
                layout.latitude
                    .map(|span| Biome::from_latitude(span.at_row(pos.row, layout.rows)))
                    .unwrap_or(fallback)
            });
            let profile = defaults
                .profile(biome)
                .ok_or_else(|| ConfigError::UnknownBiome(biome.name().to_string()))?;
            let cell_id = (pos.row * layout.cols + pos.col) as u64;
            let climate = Climate::new(
                profile.climate_location.as_str(),
                table.clone(),
                rng.cell_seed(Stream::Climate, cell_id),
            )?;
            let mut plot = Plot::from_profile(pos, biome, profile, area, climate);
            if let Some((density, cells)) = &mammoths {
                if cells.as_ref().map_or(true, |cells| cells.contains(&pos)) {
                    plot.insert_fauna(FaunaPopulation::new(mammoth_params.clone(), density * area));
                }
            }
            Ok(plot)
        };
        PlotGrid::from_fn(layout.rows, layout.cols, layout.neighborhood, build)
    }

    fn mammoth_cells(
        &self,
        overrides: RunOverrides,
    ) -> Result<Option<(f64, Option<Vec<GridPos>>)>, ConfigError> {
        let density = overrides
            .mammoth_density_per_km2
            .or(self.megaherbivores.as_ref().map(|intro| intro.density_per_km2));
        let Some(density) = density else {
            return Ok(None);
        };
        if !(density >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "megaherbivore density must be non-negative, got {density}"
            )));
        }
        let cells = match self.megaherbivores.as_ref().and_then(|intro| intro.cells.as_ref()) {
            Some(cells) => {
                let mut positions = Vec::with_capacity(cells.len());
                for &[row, col] in cells {
                    if row >= self.grid.rows || col >= self.grid.cols {
                        return Err(ConfigError::Validation(format!(
                            "megaherbivore cell ({row}, {col}) is outside the grid"
                        )));
                    }
                    positions.push(GridPos::new(row, col));
                }
                Some(positions)
            }
            None => None,
        };
        Ok(Some((density, cells)))
    }

    /// Built-in profiles with this scenario's overrides applied.
    pub fn biome_defaults(&self) -> Result<BiomeDefaults, ConfigError> {
        let mut defaults = BiomeDefaults::siberia();
        for (name, custom) in &self.biomes {
            let biome: Biome = name.parse()?;
            let mut profile = defaults
                .profile(biome)
                .cloned()
                .unwrap_or_else(|| BiomeProfile::builtin(biome));
            if let Some(location) = &custom.climate_location {
                profile.climate_location = location.clone();
            }
            if let Some(flora) = &custom.flora {
                profile.flora = flora
                    .iter()
                    .map(FloraSeedConfig::to_seed)
                    .collect::<Result<_, _>>()?;
            }
            if let Some(fauna) = &custom.fauna {
                profile.fauna = fauna
                    .iter()
                    .map(FaunaSeedConfig::to_seed)
                    .collect::<Result<_, _>>()?;
            }
            profile.validate(biome)?;
            defaults.set_profile(biome, profile);
        }
        let patience = self.migration_patience_days;
        let adjusted: Vec<(Biome, BiomeProfile)> = defaults
            .iter()
            .map(|(biome, profile)| {
                let mut profile = profile.clone();
                for seed in &mut profile.fauna {
                    seed.params.migration_patience_days = patience;
                }
                (biome, profile)
            })
            .collect();
        for (biome, profile) in adjusted {
            defaults.set_profile(biome, profile);
        }
        Ok(defaults)
    }
}

/// Parses a biome a plot may start in. Mammoth steppe is rejected because a
/// plot needs a native biome to revert to.
fn initial_biome(name: &str, what: &str) -> Result<Biome, ConfigError> {
    let biome: Biome = name.parse()?;
    if biome.is_native() {
        Ok(biome)
    } else {
        Err(ConfigError::Validation(format!(
            "{what} cannot start as {biome}; it only arises from grazing"
        )))
    }
}

impl FloraSeedConfig {
    fn to_seed(&self) -> Result<FloraSeed, ConfigError> {
        let taxon: FloraTaxon = self.taxon.parse()?;
        let mut seed = FloraSeed::standard(taxon, self.ground_cover);
        if self.seedling {
            if taxon != FloraTaxon::Tree {
                return Err(ConfigError::Validation(format!(
                    "only trees have a seedling stage, got '{}'",
                    self.taxon
                )));
            }
            seed.stage = GrowthStage::Seedling;
        }
        if let Some(mass) = self.nominal_mass_kg {
            seed.nominal_mass_kg = mass;
        }
        if let Some(footprint) = self.footprint_m2 {
            seed.footprint_m2 = footprint;
        }
        Ok(seed)
    }
}

impl FaunaSeedConfig {
    fn to_seed(&self) -> Result<FaunaSeed, ConfigError> {
        let kind: FaunaKind = self.kind.parse()?;
        let mut seed = FaunaSeed::standard(kind, self.density_per_km2);
        if let Some(species) = &self.species {
            seed.params.species = species.clone();
        }
        if let Some(mass) = self.avg_mass_kg {
            seed.params.avg_mass_kg = mass;
        }
        Ok(seed)
    }
}
