//! Plant groups: growth, lethal-day penalties, trampling and grazing.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{climate::Climate, error::ConfigError};

/// Seedling trees become established after five years.
pub const SEEDLING_MATURATION_DAYS: u32 = 5 * 365;
/// Below this share of nominal mass grazing starts killing individuals.
const OVERGRAZED_MASS_FRACTION: f64 = 0.2;
const OVERGRAZING_MORTALITY: f64 = 0.05;
/// Understory growth lost per unit of tree cover.
const CANOPY_SHADING: f64 = 0.6;
/// Share of UV a closed canopy keeps off the understory.
const CANOPY_UV_INTERCEPTION: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloraTaxon {
    Tree,
    Shrub,
    Moss,
    GrassHerb,
}

impl FloraTaxon {
    pub const ALL: [FloraTaxon; 4] = [
        FloraTaxon::Tree,
        FloraTaxon::Shrub,
        FloraTaxon::Moss,
        FloraTaxon::GrassHerb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FloraTaxon::Tree => "tree",
            FloraTaxon::Shrub => "shrub",
            FloraTaxon::Moss => "moss",
            FloraTaxon::GrassHerb => "grass_herb",
        }
    }

    pub fn is_woody(self) -> bool {
        matches!(self, FloraTaxon::Tree | FloraTaxon::Shrub)
    }

    pub fn traits(self, stage: GrowthStage) -> TaxonTraits {
        match (self, stage) {
            (FloraTaxon::Tree, stage) => TaxonTraits {
                growth_rate: 0.002,
                regrowth_rate: 0.005,
                max_cover: 0.7,
                window: ThermalWindow::new(2.0, 12.0, 22.0, 32.0),
                uv: IdealRange::new(2.0, 8.0),
                hydration_mm: IdealRange::new(0.5, 8.0),
                trample_loss: if stage == GrowthStage::Seedling { 0.6 } else { 0.05 },
                woody_mortality: 0.10,
                overflow_priority: 3,
                needs_thawed_soil: true,
                tolerance: if stage == GrowthStage::Seedling {
                    Tolerance::new((-35.0, 3), (30.0, 5), 14, 0.08, 0.03)
                } else {
                    Tolerance::new((-55.0, 10), (35.0, 10), 30, 0.02, 0.01)
                },
            },
            (FloraTaxon::Shrub, _) => TaxonTraits {
                growth_rate: 0.003,
                regrowth_rate: 0.02,
                max_cover: 0.6,
                window: ThermalWindow::new(2.0, 10.0, 22.0, 32.0),
                uv: IdealRange::new(1.5, 7.0),
                hydration_mm: IdealRange::new(0.3, 8.0),
                trample_loss: 0.5,
                woody_mortality: 0.25,
                overflow_priority: 2,
                needs_thawed_soil: true,
                tolerance: Tolerance::new((-50.0, 7), (33.0, 7), 21, 0.03, 0.02),
            },
            (FloraTaxon::Moss, _) => TaxonTraits {
                growth_rate: 0.003,
                regrowth_rate: 0.01,
                max_cover: 0.6,
                window: ThermalWindow::new(-2.0, 5.0, 15.0, 25.0),
                uv: IdealRange::new(0.5, 4.0),
                hydration_mm: IdealRange::new(0.5, 12.0),
                trample_loss: 0.4,
                woody_mortality: 0.0,
                overflow_priority: 1,
                needs_thawed_soil: false,
                tolerance: Tolerance::new((-65.0, 30), (38.0, 21), 45, 0.01, 0.005),
            },
            (FloraTaxon::GrassHerb, _) => TaxonTraits {
                growth_rate: 0.004,
                regrowth_rate: 0.08,
                max_cover: 0.9,
                window: ThermalWindow::new(3.0, 12.0, 26.0, 36.0),
                uv: IdealRange::new(2.0, 9.0),
                hydration_mm: IdealRange::new(0.2, 8.0),
                trample_loss: 0.02,
                woody_mortality: 0.0,
                overflow_priority: 0,
                needs_thawed_soil: true,
                tolerance: Tolerance::new((-45.0, 10), (35.0, 10), 18, 0.03, 0.03),
            },
        }
    }
}

impl fmt::Display for FloraTaxon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FloraTaxon {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" | "trees" | "conifer" => Ok(FloraTaxon::Tree),
            "shrub" | "shrubs" => Ok(FloraTaxon::Shrub),
            "moss" | "lichen" | "moss_lichen" => Ok(FloraTaxon::Moss),
            "grass" | "herb" | "grass_herb" | "graminoid" => Ok(FloraTaxon::GrassHerb),
            _ => Err(ConfigError::UnknownFloraTaxon(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    #[default]
    Established,
}

/// Lethal-day thresholds: a penalty applies on every day the matching
/// consecutive-day counter is strictly above the day limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub cold_c: f64,
    pub cold_days: u32,
    pub heat_c: f64,
    pub heat_days: u32,
    pub drought_days: u32,
    pub extreme_mortality: f64,
    pub drought_mortality: f64,
}

impl Tolerance {
    fn new(
        (cold_c, cold_days): (f64, u32),
        (heat_c, heat_days): (f64, u32),
        drought_days: u32,
        extreme_mortality: f64,
        drought_mortality: f64,
    ) -> Self {
        Self {
            cold_c,
            cold_days,
            heat_c,
            heat_days,
            drought_days,
            extreme_mortality,
            drought_mortality,
        }
    }

    /// Survival multiplier for today's climate.
    pub fn survival(&self, climate: &Climate) -> f64 {
        let mut survival = 1.0;
        if climate.consecutive_days_below(self.cold_c) > self.cold_days {
            survival *= 1.0 - self.extreme_mortality;
        }
        if climate.consecutive_days_above(self.heat_c) > self.heat_days {
            survival *= 1.0 - self.extreme_mortality;
        }
        if climate.dry_days() > self.drought_days {
            survival *= 1.0 - self.drought_mortality;
        }
        survival
    }
}

/// Trapezoidal growth response to air temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalWindow {
    pub min_c: f64,
    pub optimum_low_c: f64,
    pub optimum_high_c: f64,
    pub max_c: f64,
}

impl ThermalWindow {
    const fn new(min_c: f64, optimum_low_c: f64, optimum_high_c: f64, max_c: f64) -> Self {
        Self {
            min_c,
            optimum_low_c,
            optimum_high_c,
            max_c,
        }
    }

    pub fn response(&self, temp_c: f64) -> f64 {
        if temp_c <= self.min_c || temp_c >= self.max_c {
            0.0
        } else if temp_c < self.optimum_low_c {
            (temp_c - self.min_c) / (self.optimum_low_c - self.min_c)
        } else if temp_c > self.optimum_high_c {
            (self.max_c - temp_c) / (self.max_c - self.optimum_high_c)
        } else {
            1.0
        }
    }
}

/// Range a factor is best kept in; growth falls off linearly outside it and
/// stops one range-width past either edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealRange {
    pub low: f64,
    pub high: f64,
}

impl IdealRange {
    const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn response(&self, value: f64) -> f64 {
        let width = self.high - self.low;
        if width <= 0.0 {
            return 1.0;
        }
        let outside = if value < self.low {
            self.low - value
        } else if value > self.high {
            value - self.high
        } else {
            0.0
        };
        (1.0 - outside / width).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxonTraits {
    /// Maximum relative population growth per day.
    pub growth_rate: f64,
    /// Daily recovery of individual mass toward nominal.
    pub regrowth_rate: f64,
    /// Ecological ceiling on this taxon's ground cover.
    pub max_cover: f64,
    pub window: ThermalWindow,
    /// UV index reaching the plant.
    pub uv: IdealRange,
    /// Daily rain plus meltwater.
    pub hydration_mm: IdealRange,
    /// Cover lost per unit of trampling pressure.
    pub trample_loss: f64,
    /// Extra mortality per unit of trampling pressure (woody taxa).
    pub woody_mortality: f64,
    /// Lower values give up cover first when the plot overflows.
    pub overflow_priority: u8,
    pub needs_thawed_soil: bool,
    pub tolerance: Tolerance,
}

/// What the rest of the plot looks like to one flora population today.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StandConditions {
    pub trample_pressure: f64,
    /// Uncovered share of the plot before today's growth.
    pub free_cover: f64,
    pub tree_cover: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloraPopulation {
    taxon: FloraTaxon,
    stage: GrowthStage,
    nominal_mass_kg: f64,
    avg_mass_kg: f64,
    population: f64,
    cover_per_individual: f64,
    age_days: u32,
}

impl FloraPopulation {
    /// `cover_per_individual` is the share of the plot one individual covers.
    pub fn new(
        taxon: FloraTaxon,
        stage: GrowthStage,
        nominal_mass_kg: f64,
        cover_per_individual: f64,
        population: f64,
    ) -> Self {
        let stage = if taxon == FloraTaxon::Tree {
            stage
        } else {
            GrowthStage::Established
        };
        Self {
            taxon,
            stage,
            nominal_mass_kg: nominal_mass_kg.max(0.0),
            avg_mass_kg: nominal_mass_kg.max(0.0),
            population: population.max(0.0),
            cover_per_individual: cover_per_individual.max(f64::MIN_POSITIVE),
            age_days: 0,
        }
    }

    /// Seeds a population sized to reach `ground_cover` on a plot of
    /// `plot_area_m2`, given the footprint of one individual.
    pub fn with_cover(
        taxon: FloraTaxon,
        stage: GrowthStage,
        nominal_mass_kg: f64,
        footprint_m2: f64,
        plot_area_m2: f64,
        ground_cover: f64,
    ) -> Self {
        let cover_per_individual = footprint_m2 / plot_area_m2.max(f64::MIN_POSITIVE);
        let mut population = Self::new(taxon, stage, nominal_mass_kg, cover_per_individual, 0.0);
        population.population = ground_cover.clamp(0.0, 1.0) / population.cover_per_individual;
        population
    }

    pub fn taxon(&self) -> FloraTaxon {
        self.taxon
    }

    pub fn stage(&self) -> GrowthStage {
        self.stage
    }

    pub fn traits(&self) -> TaxonTraits {
        self.taxon.traits(self.stage)
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn avg_mass_kg(&self) -> f64 {
        self.avg_mass_kg
    }

    pub fn nominal_mass_kg(&self) -> f64 {
        self.nominal_mass_kg
    }

    pub fn biomass_kg(&self) -> f64 {
        self.avg_mass_kg * self.population
    }

    pub fn ground_cover(&self) -> f64 {
        self.population * self.cover_per_individual
    }

    /// Trampling pressure above which losses outpace the best possible growth.
    pub fn dieback_pressure(&self) -> f64 {
        let traits = self.traits();
        let losses = traits.trample_loss + traits.woody_mortality;
        if losses <= 0.0 {
            f64::INFINITY
        } else {
            traits.growth_rate / losses
        }
    }

    pub fn update(&mut self, climate: &Climate, stand: &StandConditions) {
        let traits = self.traits();

        let mut response = traits.window.response(climate.air_temp_c());
        if traits.needs_thawed_soil {
            response *= ((climate.soil_temp_c() + 1.0) / 3.0).clamp(0.0, 1.0);
        }
        response *= traits.hydration_mm.response(climate.hydration_mm());
        let canopy = if self.taxon == FloraTaxon::Tree {
            0.0
        } else {
            stand.tree_cover.clamp(0.0, 1.0)
        };
        if let Some(uv) = climate.uv_index() {
            response *= traits.uv.response(uv * (1.0 - CANOPY_UV_INTERCEPTION * canopy));
        }
        let shade = 1.0 - CANOPY_SHADING * canopy;
        let headroom = (1.0 - self.ground_cover() / traits.max_cover)
            .min(stand.free_cover / traits.max_cover)
            .max(0.0);
        self.population *= 1.0 + traits.growth_rate * response * shade * headroom;
        self.avg_mass_kg +=
            traits.regrowth_rate * response * (self.nominal_mass_kg - self.avg_mass_kg);

        self.population *= traits.tolerance.survival(climate);

        let pressure = stand.trample_pressure.clamp(0.0, 1.0);
        self.population *= (1.0 - traits.trample_loss * pressure).max(0.0)
            * (1.0 - traits.woody_mortality * pressure).max(0.0);

        self.clamp(traits.max_cover);
        self.mature();
    }

    /// Removes up to `demand_kg` of standing mass and returns what was eaten.
    pub fn graze(&mut self, demand_kg: f64) -> f64 {
        if self.population <= 0.0 || demand_kg <= 0.0 {
            return 0.0;
        }
        let eaten = demand_kg.min(self.biomass_kg());
        self.avg_mass_kg = (self.avg_mass_kg - eaten / self.population).max(0.0);
        if self.avg_mass_kg < OVERGRAZED_MASS_FRACTION * self.nominal_mass_kg {
            self.population *= 1.0 - OVERGRAZING_MORTALITY;
        }
        eaten
    }

    /// Gives up at most `cover` of ground cover, returning what was released.
    pub fn shed_cover(&mut self, cover: f64) -> f64 {
        let current = self.ground_cover();
        let released = cover.clamp(0.0, current);
        if released >= current {
            self.population = 0.0;
        } else {
            self.population = (self.population - released / self.cover_per_individual).max(0.0);
        }
        released
    }

    fn clamp(&mut self, max_cover: f64) {
        if !self.population.is_finite() || self.population < 0.0 {
            self.population = 0.0;
        }
        if self.ground_cover() > max_cover {
            self.population = max_cover / self.cover_per_individual;
        }
        self.avg_mass_kg = self.avg_mass_kg.clamp(0.0, self.nominal_mass_kg);
    }

    fn mature(&mut self) {
        if self.stage != GrowthStage::Seedling {
            return;
        }
        self.age_days += 1;
        if self.age_days >= SEEDLING_MATURATION_DAYS {
            self.stage = GrowthStage::Established;
        }
    }
}
