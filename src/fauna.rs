//! Animal populations: forage-driven growth, starvation, predation and
//! migration proposals.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    climate::Climate,
    error::ConfigError,
    flora::{FloraTaxon, IdealRange},
    grid::Direction,
};

/// Body-size multiplier on the daily requirement of megaherbivores.
pub const MEGAHERBIVORE_FORAGE_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaunaKind {
    Prey,
    Predator,
    Megaherbivore,
}

impl FaunaKind {
    pub const ALL: [FaunaKind; 3] = [
        FaunaKind::Prey,
        FaunaKind::Predator,
        FaunaKind::Megaherbivore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FaunaKind::Prey => "prey",
            FaunaKind::Predator => "predator",
            FaunaKind::Megaherbivore => "megaherbivore",
        }
    }

    pub fn forage_factor(self) -> f64 {
        match self {
            FaunaKind::Megaherbivore => MEGAHERBIVORE_FORAGE_FACTOR,
            FaunaKind::Prey | FaunaKind::Predator => 1.0,
        }
    }

    /// Whether this kind compacts ground and snow as it moves.
    pub fn tramples(self) -> bool {
        matches!(self, FaunaKind::Megaherbivore)
    }

    /// Whether predators may take this kind.
    pub fn is_prey(self) -> bool {
        matches!(self, FaunaKind::Prey)
    }
}

impl fmt::Display for FaunaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FaunaKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prey" | "deer" | "reindeer" => Ok(FaunaKind::Prey),
            "predator" | "wolf" | "wolves" => Ok(FaunaKind::Predator),
            "megaherbivore" | "mammoth" | "mammoths" => Ok(FaunaKind::Megaherbivore),
            _ => Err(ConfigError::UnknownFaunaKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrophicRole {
    Herbivore,
    Carnivore,
    Omnivore,
}

/// How a species copes with air temperature. Births slow outside the
/// comfort range; past the day limits of the extreme-cold (below -40 °C) or
/// extreme-heat (above 30 °C) streaks, every day costs `extreme_mortality`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalTolerance {
    pub comfort_low_c: f64,
    pub comfort_high_c: f64,
    pub cold_days: u32,
    pub heat_days: u32,
    pub extreme_mortality: f64,
}

impl ThermalTolerance {
    /// Birth multiplier: 1 inside the comfort range, falling linearly to 0
    /// one range-width outside it.
    pub fn comfort(&self, temp_c: f64) -> f64 {
        IdealRange {
            low: self.comfort_low_c,
            high: self.comfort_high_c,
        }
        .response(temp_c)
    }

    pub fn survival(&self, climate: &Climate) -> f64 {
        let mut survival = 1.0;
        if climate.cold_extreme_days() > self.cold_days {
            survival *= 1.0 - self.extreme_mortality;
        }
        if climate.heat_extreme_days() > self.heat_days {
            survival *= 1.0 - self.extreme_mortality;
        }
        survival
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaunaParams {
    pub species: String,
    pub kind: FaunaKind,
    pub role: TrophicRole,
    pub avg_mass_kg: f64,
    /// Daily food requirement as a share of body mass.
    pub intake_fraction: f64,
    pub birth_rate: f64,
    pub death_rate: f64,
    /// Forage ratio below which the population starves.
    pub starvation_threshold: f64,
    pub starvation_rate: f64,
    /// Share of standing food reachable in one day.
    pub forage_access: f64,
    pub foot_area_m2: f64,
    pub steps_per_day: f64,
    pub max_density_per_km2: f64,
    pub migration_patience_days: u32,
    pub thermal: ThermalTolerance,
    pub flora_diet: Vec<FloraTaxon>,
    pub fauna_diet: Vec<FaunaKind>,
}

impl FaunaParams {
    pub fn mammoth() -> Self {
        Self {
            species: "woolly mammoth".into(),
            kind: FaunaKind::Megaherbivore,
            role: TrophicRole::Herbivore,
            avg_mass_kg: 6000.0,
            intake_fraction: 0.02,
            birth_rate: 0.0006,
            death_rate: 0.0003,
            starvation_threshold: 0.6,
            starvation_rate: 0.01,
            forage_access: 0.05,
            foot_area_m2: 0.25,
            steps_per_day: 4000.0,
            max_density_per_km2: 20.0,
            migration_patience_days: 3,
            thermal: ThermalTolerance {
                comfort_low_c: -35.0,
                comfort_high_c: 15.0,
                cold_days: 30,
                heat_days: 3,
                extreme_mortality: 0.02,
            },
            flora_diet: vec![FloraTaxon::GrassHerb, FloraTaxon::Shrub],
            fauna_diet: Vec::new(),
        }
    }

    pub fn reindeer() -> Self {
        Self {
            species: "reindeer".into(),
            kind: FaunaKind::Prey,
            role: TrophicRole::Herbivore,
            avg_mass_kg: 100.0,
            intake_fraction: 0.03,
            birth_rate: 0.001,
            death_rate: 0.0005,
            starvation_threshold: 0.5,
            starvation_rate: 0.01,
            forage_access: 0.02,
            foot_area_m2: 0.02,
            steps_per_day: 6000.0,
            max_density_per_km2: 5.0,
            migration_patience_days: 3,
            thermal: ThermalTolerance {
                comfort_low_c: -40.0,
                comfort_high_c: 15.0,
                cold_days: 45,
                heat_days: 5,
                extreme_mortality: 0.01,
            },
            flora_diet: vec![FloraTaxon::Moss, FloraTaxon::GrassHerb],
            fauna_diet: Vec::new(),
        }
    }

    pub fn wolf() -> Self {
        Self {
            species: "grey wolf".into(),
            kind: FaunaKind::Predator,
            role: TrophicRole::Carnivore,
            avg_mass_kg: 40.0,
            intake_fraction: 0.05,
            birth_rate: 0.0015,
            death_rate: 0.0008,
            starvation_threshold: 0.5,
            starvation_rate: 0.02,
            forage_access: 0.01,
            foot_area_m2: 0.01,
            steps_per_day: 15000.0,
            max_density_per_km2: 0.05,
            migration_patience_days: 3,
            thermal: ThermalTolerance {
                comfort_low_c: -45.0,
                comfort_high_c: 20.0,
                cold_days: 30,
                heat_days: 7,
                extreme_mortality: 0.01,
            },
            flora_diet: Vec::new(),
            fauna_diet: vec![FaunaKind::Prey],
        }
    }

    pub fn defaults_for(kind: FaunaKind) -> Self {
        match kind {
            FaunaKind::Prey => Self::reindeer(),
            FaunaKind::Predator => Self::wolf(),
            FaunaKind::Megaherbivore => Self::mammoth(),
        }
    }

    pub fn need_per_individual_kg(&self) -> f64 {
        self.avg_mass_kg * self.intake_fraction * self.kind.forage_factor()
    }

    /// Food reachable today given standing biomass lookups.
    pub fn accessible_forage_kg(
        &self,
        flora_biomass: impl Fn(FloraTaxon) -> f64,
        fauna_biomass: impl Fn(FaunaKind) -> f64,
    ) -> f64 {
        let plants: f64 = match self.role {
            TrophicRole::Herbivore | TrophicRole::Omnivore => {
                self.flora_diet.iter().map(|&taxon| flora_biomass(taxon)).sum()
            }
            TrophicRole::Carnivore => 0.0,
        };
        let animals: f64 = match self.role {
            TrophicRole::Carnivore | TrophicRole::Omnivore => {
                self.fauna_diet.iter().map(|&kind| fauna_biomass(kind)).sum()
            }
            TrophicRole::Herbivore => 0.0,
        };
        (plants + animals).max(0.0) * self.forage_access
    }
}

/// A neighbour as seen from the previous day's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborForage {
    pub direction: Direction,
    pub forage_kg: f64,
    pub population: f64,
}

/// Proposed move of part of a population into a neighbouring plot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrationProposal {
    pub direction: Direction,
    pub count: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaunaPopulation {
    params: FaunaParams,
    population: f64,
    crowded_days: u32,
}

impl FaunaPopulation {
    pub fn new(params: FaunaParams, population: f64) -> Self {
        Self {
            params,
            population: population.max(0.0),
            crowded_days: 0,
        }
    }

    /// Empty population sharing this one's parameters.
    pub fn empty_like(&self) -> Self {
        Self::new(self.params.clone(), 0.0)
    }

    pub fn kind(&self) -> FaunaKind {
        self.params.kind
    }

    pub fn params(&self) -> &FaunaParams {
        &self.params
    }

    pub fn population(&self) -> f64 {
        self.population
    }

    pub fn biomass_kg(&self) -> f64 {
        self.population * self.params.avg_mass_kg
    }

    pub fn crowded_days(&self) -> u32 {
        self.crowded_days
    }

    pub fn daily_need_kg(&self) -> f64 {
        self.population * self.params.need_per_individual_kg()
    }

    /// Ground swept by feet per day, in square metres.
    pub fn trampled_area_m2(&self) -> f64 {
        if self.params.kind.tramples() {
            self.population * self.params.foot_area_m2 * self.params.steps_per_day
        } else {
            0.0
        }
    }

    /// Individuals the plot can feed, capped by the density limit.
    pub fn carrying_capacity(&self, forage_kg: f64, area_km2: f64) -> f64 {
        let need = self.params.need_per_individual_kg();
        let by_food = if need > 0.0 { forage_kg / need } else { f64::INFINITY };
        by_food.min(self.params.max_density_per_km2 * area_km2).max(0.0)
    }

    /// Applies one day of births, deaths, starvation, predation losses and
    /// temperature stress. `predation` is in individuals. Returns the
    /// kilograms eaten.
    pub fn update(
        &mut self,
        climate: &Climate,
        forage_kg: f64,
        predation: f64,
        area_km2: f64,
    ) -> f64 {
        let need = self.daily_need_kg();
        let survival = self.params.thermal.survival(climate);
        if need <= 0.0 {
            self.population = (self.population - predation.max(0.0)).max(0.0) * survival;
            return 0.0;
        }
        let forage_kg = forage_kg.max(0.0);
        let ratio = forage_kg / need;
        let params = &self.params;
        let delta = if ratio < params.starvation_threshold {
            -self.population * params.starvation_rate * (1.0 - ratio / params.starvation_threshold)
        } else {
            let limit = params.max_density_per_km2 * area_km2;
            let crowding = if limit > 0.0 {
                (1.0 - self.population / limit).max(0.0)
            } else {
                0.0
            };
            let comfort = params.thermal.comfort(climate.air_temp_c());
            let births = params.birth_rate * ratio.min(1.0) * crowding * comfort;
            self.population * (births - params.death_rate)
        };
        self.population = (self.population + delta - predation.max(0.0)).max(0.0) * survival;
        need.min(forage_kg)
    }

    /// Tracks crowding and, once it has lasted long enough, proposes moving
    /// half the excess toward the best-fed neighbour. Ties keep the earlier
    /// neighbour in `neighbors`.
    pub fn migration_intent(
        &mut self,
        local_capacity: f64,
        neighbors: &[NeighborForage],
    ) -> Option<MigrationProposal> {
        if self.population <= local_capacity {
            self.crowded_days = 0;
            return None;
        }
        self.crowded_days += 1;
        if self.crowded_days < self.params.migration_patience_days.max(1) {
            return None;
        }

        let need = self.params.need_per_individual_kg();
        let mut best: Option<(Direction, f64)> = None;
        for neighbor in neighbors {
            let appetite = (neighbor.population + 1.0) * need.max(f64::MIN_POSITIVE);
            let ratio = neighbor.forage_kg / appetite;
            if ratio > 0.0 && best.map_or(true, |(_, current)| ratio > current) {
                best = Some((neighbor.direction, ratio));
            }
        }
        let (direction, _) = best?;
        self.crowded_days = 0;
        let count = 0.5 * (self.population - local_capacity);
        Some(MigrationProposal { direction, count })
    }

    pub(crate) fn remove(&mut self, count: f64) -> f64 {
        let removed = count.clamp(0.0, self.population);
        self.population -= removed;
        removed
    }

    pub(crate) fn add(&mut self, count: f64) {
        self.population += count.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::climate::{ClimateTable, DayStats};

    fn climate_at(temp_c: f64) -> Climate {
        let table = Arc::new(ClimateTable::uniform("test", DayStats::constant(temp_c, 1.0)));
        let mut climate = Climate::new("test", table, 0).expect("location exists");
        climate.advance(0).expect("stats present");
        climate
    }

    fn neighbor(direction: Direction, forage_kg: f64, population: f64) -> NeighborForage {
        NeighborForage {
            direction,
            forage_kg,
            population,
        }
    }

    #[test]
    fn parses_kind_aliases() {
        assert_eq!("Mammoth".parse::<FaunaKind>().ok(), Some(FaunaKind::Megaherbivore));
        assert_eq!("wolf".parse::<FaunaKind>().ok(), Some(FaunaKind::Predator));
        assert!(matches!(
            "sabretooth".parse::<FaunaKind>(),
            Err(ConfigError::UnknownFaunaKind(_))
        ));
    }

    #[test]
    fn megaherbivores_need_more_per_kilogram() {
        let mammoth = FaunaParams::mammoth();
        assert!((mammoth.need_per_individual_kg() - 180.0).abs() < 1e-9);
        let mut plain = mammoth.clone();
        plain.kind = FaunaKind::Prey;
        assert!(plain.need_per_individual_kg() < mammoth.need_per_individual_kg());
    }

    #[test]
    fn well_fed_population_grows_slowly() {
        let mut herd = FaunaPopulation::new(FaunaParams::mammoth(), 5.0);
        let eaten = herd.update(&climate_at(5.0), 10_000.0, 0.0, 1.0);
        assert!((eaten - 900.0).abs() < 1e-9);
        assert!(herd.population() > 5.0 && herd.population() < 5.01);
    }

    #[test]
    fn starvation_declines_toward_zero_but_not_below() {
        let climate = climate_at(5.0);
        let mut herd = FaunaPopulation::new(FaunaParams::mammoth(), 10.0);
        let eaten = herd.update(&climate, 0.0, 0.0, 1.0);
        assert_eq!(eaten, 0.0);
        assert!((herd.population() - 9.9).abs() < 1e-9);
        for _ in 0..5000 {
            herd.update(&climate, 0.0, 0.0, 1.0);
        }
        assert!(herd.population() >= 0.0 && herd.population() < 0.01);
    }

    #[test]
    fn predation_cannot_drive_population_negative() {
        let mut deer = FaunaPopulation::new(FaunaParams::reindeer(), 2.0);
        deer.update(&climate_at(5.0), 1_000.0, 50.0, 1.0);
        assert_eq!(deer.population(), 0.0);
    }

    #[test]
    fn births_slow_outside_the_comfort_range() {
        let mut mild = FaunaPopulation::new(FaunaParams::reindeer(), 100.0);
        let mut warm = mild.clone();
        let mut hot = mild.clone();
        for _ in 0..200 {
            mild.update(&climate_at(5.0), 1e6, 0.0, 100.0);
            warm.update(&climate_at(25.0), 1e6, 0.0, 100.0);
            hot.update(&climate_at(80.0), 1e6, 0.0, 100.0);
        }
        assert!(mild.population() > warm.population());
        assert!(warm.population() > hot.population());
        // Deaths only, and no extreme-heat streak from a one-day climate.
        assert!((hot.population() - 100.0 * (1.0 - 0.0005f64).powi(200)).abs() < 1e-9);
    }

    #[test]
    fn heat_mortality_starts_after_the_streak_limit() {
        let params = FaunaParams::mammoth();
        let limit = params.thermal.heat_days;
        let mortality = params.thermal.extreme_mortality;
        let table = |temp_c: f64| {
            Arc::new(ClimateTable::uniform("test", DayStats::constant(temp_c, 1.0)))
        };
        let mut hot = Climate::new("test", table(35.0), 0).expect("location exists");
        let mut mild = Climate::new("test", table(5.0), 0).expect("location exists");
        // Starving herds change by the same amount whatever the weather.
        let mut stressed = FaunaPopulation::new(params.clone(), 10.0);
        let mut control = FaunaPopulation::new(params, 10.0);
        for day in 0..(limit as u64 + 4) {
            hot.advance(day).expect("stats present");
            mild.advance(day).expect("stats present");
            stressed.update(&hot, 0.0, 0.0, 1.0);
            control.update(&mild, 0.0, 0.0, 1.0);
            let penalised_days = hot.heat_extreme_days().saturating_sub(limit) as i32;
            let expected = control.population() * (1.0 - mortality).powi(penalised_days);
            assert!(
                (stressed.population() - expected).abs() < 1e-9,
                "day {day}: {} vs {expected}",
                stressed.population()
            );
        }
        assert!(stressed.population() < control.population());
    }

    #[test]
    fn extreme_cold_needs_a_long_streak() {
        let wolf = FaunaParams::wolf().thermal;
        let table = Arc::new(ClimateTable::uniform("test", DayStats::constant(-45.0, 0.0)));
        let mut climate = Climate::new("test", table, 0).expect("location exists");
        for day in 0..wolf.cold_days as u64 {
            climate.advance(day).expect("stats present");
        }
        assert_eq!(wolf.survival(&climate), 1.0);
        climate.advance(wolf.cold_days as u64).expect("stats present");
        assert!((wolf.survival(&climate) - (1.0 - wolf.extreme_mortality)).abs() < 1e-12);
        assert_eq!(wolf.comfort(-45.0), 1.0);
        assert!((wolf.comfort(-77.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn carnivores_only_count_prey_as_forage() {
        let wolf = FaunaParams::wolf();
        let forage = wolf.accessible_forage_kg(
            |_| 1_000_000.0,
            |kind| if kind == FaunaKind::Prey { 500.0 } else { 9_999.0 },
        );
        assert!((forage - 5.0).abs() < 1e-12);
    }

    #[test]
    fn only_megaherbivores_trample() {
        let mammoths = FaunaPopulation::new(FaunaParams::mammoth(), 2.0);
        let deer = FaunaPopulation::new(FaunaParams::reindeer(), 200.0);
        assert!((mammoths.trampled_area_m2() - 2000.0).abs() < 1e-9);
        assert_eq!(deer.trampled_area_m2(), 0.0);
    }

    #[test]
    fn migration_waits_for_patience_then_picks_best_neighbor() {
        let mut herd = FaunaPopulation::new(FaunaParams::mammoth(), 30.0);
        let neighbors = [
            neighbor(Direction::North, 1_000.0, 0.0),
            neighbor(Direction::East, 4_000.0, 1.0),
            neighbor(Direction::South, 4_000.0, 1.0),
        ];
        assert_eq!(herd.migration_intent(10.0, &neighbors), None);
        assert_eq!(herd.migration_intent(10.0, &neighbors), None);
        let proposal = herd.migration_intent(10.0, &neighbors).expect("third crowded day");
        assert_eq!(proposal.direction, Direction::East);
        assert!((proposal.count - 10.0).abs() < 1e-12);
        assert_eq!(herd.crowded_days(), 0);
    }

    #[test]
    fn relief_resets_the_crowding_counter() {
        let mut herd = FaunaPopulation::new(FaunaParams::mammoth(), 30.0);
        let neighbors = [neighbor(Direction::West, 1.0, 0.0)];
        herd.migration_intent(10.0, &neighbors);
        herd.migration_intent(10.0, &neighbors);
        assert_eq!(herd.migration_intent(50.0, &neighbors), None);
        assert_eq!(herd.crowded_days(), 0);
        assert_eq!(herd.migration_intent(10.0, &[]), None);
    }

    #[test]
    fn capacity_is_capped_by_density() {
        let herd = FaunaPopulation::new(FaunaParams::mammoth(), 1.0);
        assert!((herd.carrying_capacity(1_800.0, 1.0) - 10.0).abs() < 1e-9);
        assert!((herd.carrying_capacity(1e9, 2.0) - 40.0).abs() < 1e-9);
    }
}
