//! One grid cell: climate, plants and animals stepped together for a day.

use std::collections::BTreeMap;

use crate::{
    biome::{Biome, BiomeProfile},
    climate::{Climate, ClimateError},
    fauna::{FaunaKind, FaunaParams, FaunaPopulation, NeighborForage, TrophicRole},
    flora::{FloraPopulation, FloraTaxon, StandConditions},
    grid::{Direction, GridPos, MigrationIntent},
};

pub const STEPPE_MIN_GRASS_COVER: f64 = 0.45;
pub const STEPPE_MAX_WOODY_COVER: f64 = 0.15;
pub const STEPPE_MIN_COMPACTION: f64 = 0.30;

/// Trampling pressure at which compaction saturates.
const COMPACTION_SATURATION_PRESSURE: f64 = 0.02;
const COMPACTION_RATE: f64 = 0.05;
/// Share of the snowpack pressed down per unit of trampling pressure.
const SNOW_COMPACTION_DEPTH: f64 = 0.7;
const M2_PER_KM2: f64 = 1_000_000.0;

/// Read-only summary of a plot, used by its neighbours to judge forage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotOutlook {
    flora_biomass: BTreeMap<FloraTaxon, f64>,
    fauna_population: BTreeMap<FaunaKind, f64>,
    fauna_biomass: BTreeMap<FaunaKind, f64>,
}

impl PlotOutlook {
    pub fn forage_for(&self, params: &FaunaParams) -> f64 {
        params.accessible_forage_kg(
            |taxon| self.flora_biomass.get(&taxon).copied().unwrap_or(0.0),
            |kind| self.fauna_biomass.get(&kind).copied().unwrap_or(0.0),
        )
    }

    pub fn population(&self, kind: FaunaKind) -> f64 {
        self.fauna_population.get(&kind).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiomeTransition {
    pub pos: GridPos,
    pub from: Biome,
    pub to: Biome,
}

#[derive(Debug, Clone)]
pub struct Plot {
    pos: GridPos,
    biome: Biome,
    native_biome: Biome,
    area_km2: f64,
    climate: Climate,
    flora: BTreeMap<FloraTaxon, FloraPopulation>,
    fauna: BTreeMap<FaunaKind, FaunaPopulation>,
    snow_compaction: f64,
    trample_pressure: f64,
}

impl Plot {
    pub fn new(pos: GridPos, biome: Biome, area_km2: f64, climate: Climate) -> Self {
        Self {
            pos,
            biome,
            native_biome: biome,
            area_km2,
            climate,
            flora: BTreeMap::new(),
            fauna: BTreeMap::new(),
            snow_compaction: 0.0,
            trample_pressure: 0.0,
        }
    }

    /// Seeds every taxon named by the profile, scaled to the plot area.
    pub fn from_profile(
        pos: GridPos,
        biome: Biome,
        profile: &BiomeProfile,
        area_km2: f64,
        climate: Climate,
    ) -> Self {
        let mut plot = Self::new(pos, biome, area_km2, climate);
        let area_m2 = area_km2 * M2_PER_KM2;
        for seed in &profile.flora {
            plot.insert_flora(FloraPopulation::with_cover(
                seed.taxon,
                seed.stage,
                seed.nominal_mass_kg,
                seed.footprint_m2,
                area_m2,
                seed.ground_cover,
            ));
        }
        for seed in &profile.fauna {
            plot.insert_fauna(FaunaPopulation::new(
                seed.params.clone(),
                seed.density_per_km2 * area_km2,
            ));
        }
        plot
    }

    pub fn insert_flora(&mut self, population: FloraPopulation) {
        self.flora.insert(population.taxon(), population);
    }

    pub fn insert_fauna(&mut self, population: FaunaPopulation) {
        self.fauna.insert(population.kind(), population);
    }

    pub fn pos(&self) -> GridPos {
        self.pos
    }

    pub fn biome(&self) -> Biome {
        self.biome
    }

    pub fn native_biome(&self) -> Biome {
        self.native_biome
    }

    pub fn area_km2(&self) -> f64 {
        self.area_km2
    }

    pub fn climate(&self) -> &Climate {
        &self.climate
    }

    pub fn flora(&self) -> impl Iterator<Item = &FloraPopulation> {
        self.flora.values()
    }

    pub fn fauna(&self) -> impl Iterator<Item = &FaunaPopulation> {
        self.fauna.values()
    }

    pub fn flora_population(&self, taxon: FloraTaxon) -> Option<&FloraPopulation> {
        self.flora.get(&taxon)
    }

    pub fn fauna_population(&self, kind: FaunaKind) -> Option<&FaunaPopulation> {
        self.fauna.get(&kind)
    }

    pub(crate) fn fauna_population_mut(
        &mut self,
        kind: FaunaKind,
    ) -> Option<&mut FaunaPopulation> {
        self.fauna.get_mut(&kind)
    }

    pub fn ground_cover(&self, taxon: FloraTaxon) -> f64 {
        self.flora.get(&taxon).map_or(0.0, FloraPopulation::ground_cover)
    }

    pub fn total_ground_cover(&self) -> f64 {
        self.flora.values().map(FloraPopulation::ground_cover).sum()
    }

    pub fn woody_cover(&self) -> f64 {
        self.flora
            .values()
            .filter(|population| population.taxon().is_woody())
            .map(FloraPopulation::ground_cover)
            .sum()
    }

    pub fn snow_compaction(&self) -> f64 {
        self.snow_compaction
    }

    /// Pressure applied during the most recent step.
    pub fn trample_pressure(&self) -> f64 {
        self.trample_pressure
    }

    pub fn outlook(&self) -> PlotOutlook {
        PlotOutlook {
            flora_biomass: self
                .flora
                .iter()
                .map(|(taxon, population)| (*taxon, population.biomass_kg()))
                .collect(),
            fauna_population: self
                .fauna
                .iter()
                .map(|(kind, population)| (*kind, population.population()))
                .collect(),
            fauna_biomass: self
                .fauna
                .iter()
                .map(|(kind, population)| (*kind, population.biomass_kg()))
                .collect(),
        }
    }

    pub fn check_statistics(&self, day_index: u64) -> Result<(), ClimateError> {
        self.climate.has_statistics(day_index)
    }

    /// Runs the local part of a day: climate, flora, fauna, then migration
    /// proposals. Nothing outside this plot is modified.
    pub fn step(
        &mut self,
        day_index: u64,
        neighbors: &[(Direction, &PlotOutlook)],
    ) -> Result<Vec<MigrationIntent>, ClimateError> {
        self.climate.advance(day_index)?;

        let pressure = self.current_trample_pressure();
        self.trample_pressure = pressure;
        let stand = StandConditions {
            trample_pressure: pressure,
            free_cover: (1.0 - self.total_ground_cover()).max(0.0),
            tree_cover: self.ground_cover(FloraTaxon::Tree),
        };
        for population in self.flora.values_mut() {
            population.update(&self.climate, &stand);
        }
        self.resolve_cover_overflow();

        self.update_compaction(pressure);
        self.climate.compact_snow(SNOW_COMPACTION_DEPTH * pressure);

        self.feed_fauna();
        Ok(self.collect_migration_intents(neighbors))
    }

    pub fn meets_steppe_conditions(&self) -> bool {
        self.ground_cover(FloraTaxon::GrassHerb) >= STEPPE_MIN_GRASS_COVER
            && self.woody_cover() <= STEPPE_MAX_WOODY_COVER
            && self.snow_compaction >= STEPPE_MIN_COMPACTION
    }

    /// Relabels the plot as steppe while all steppe conditions hold, and
    /// back to its native biome once they stop holding.
    pub fn reclassify_biome(&mut self) -> Option<BiomeTransition> {
        let next = if self.meets_steppe_conditions() {
            Biome::MammothSteppe
        } else {
            self.native_biome
        };
        if next == self.biome {
            return None;
        }
        let transition = BiomeTransition {
            pos: self.pos,
            from: self.biome,
            to: next,
        };
        self.biome = next;
        Some(transition)
    }

    fn current_trample_pressure(&self) -> f64 {
        let trampled: f64 = self.fauna.values().map(FaunaPopulation::trampled_area_m2).sum();
        let area_m2 = self.area_km2 * M2_PER_KM2;
        if area_m2 <= 0.0 {
            return 0.0;
        }
        (trampled / area_m2).clamp(0.0, 1.0)
    }

    fn resolve_cover_overflow(&mut self) {
        let mut overflow = self.total_ground_cover() - 1.0;
        if overflow <= 0.0 {
            return;
        }
        let mut order: Vec<(u8, FloraTaxon)> = self
            .flora
            .values()
            .map(|population| (population.traits().overflow_priority, population.taxon()))
            .collect();
        order.sort();
        for (_, taxon) in order {
            if overflow <= 0.0 {
                break;
            }
            if let Some(population) = self.flora.get_mut(&taxon) {
                overflow -= population.shed_cover(overflow);
            }
        }
    }

    fn update_compaction(&mut self, pressure: f64) {
        let trampled = self
            .fauna
            .values()
            .any(|population| population.kind().tramples() && population.population() > 0.0);
        let target = if trampled {
            (pressure / COMPACTION_SATURATION_PRESSURE).min(1.0)
        } else {
            0.0
        };
        self.snow_compaction += (target - self.snow_compaction) * COMPACTION_RATE;
        self.snow_compaction = self.snow_compaction.clamp(0.0, 1.0);
    }

    /// Hunters eat first, from the morning's prey biomass; grazers then eat
    /// from the day's grown flora. Kills are handed to the prey's update.
    fn feed_fauna(&mut self) {
        let fauna_biomass: BTreeMap<FaunaKind, f64> = self
            .fauna
            .iter()
            .map(|(kind, population)| (*kind, population.biomass_kg()))
            .collect();
        let fauna_mass: BTreeMap<FaunaKind, f64> = self
            .fauna
            .iter()
            .map(|(kind, population)| (*kind, population.params().avg_mass_kg))
            .collect();
        let (hunters, grazers): (Vec<FaunaKind>, Vec<FaunaKind>) = self
            .fauna
            .keys()
            .copied()
            .partition(|kind| !self.fauna[kind].params().fauna_diet.is_empty());

        let mut kills: BTreeMap<FaunaKind, f64> = BTreeMap::new();
        for kind in hunters.into_iter().chain(grazers) {
            let Some(population) = self.fauna.get_mut(&kind) else {
                continue;
            };
            let flora = &self.flora;
            let flora_lookup =
                |taxon: FloraTaxon| flora.get(&taxon).map_or(0.0, FloraPopulation::biomass_kg);
            let fauna_lookup =
                |prey: FaunaKind| fauna_biomass.get(&prey).copied().unwrap_or(0.0);

            let params = population.params();
            let forage = params.accessible_forage_kg(flora_lookup, fauna_lookup);
            let eats_plants = params.role != TrophicRole::Carnivore;
            let eats_animals = params.role != TrophicRole::Herbivore;
            let mut shares: Vec<(DietItem, f64)> = Vec::new();
            if eats_plants {
                shares.extend(
                    params
                        .flora_diet
                        .iter()
                        .map(|&taxon| (DietItem::Flora(taxon), flora_lookup(taxon))),
                );
            }
            if eats_animals {
                shares.extend(
                    params
                        .fauna_diet
                        .iter()
                        .map(|&prey| (DietItem::Fauna(prey), fauna_lookup(prey))),
                );
            }
            let available: f64 = shares.iter().map(|(_, kg)| kg).sum();

            let predation = kills.remove(&kind).unwrap_or(0.0);
            let eaten = population.update(&self.climate, forage, predation, self.area_km2);
            if eaten <= 0.0 || available <= 0.0 {
                continue;
            }
            for (item, kg) in shares {
                let portion = eaten * kg / available;
                match item {
                    DietItem::Flora(taxon) => {
                        if let Some(plants) = self.flora.get_mut(&taxon) {
                            plants.graze(portion);
                        }
                    }
                    DietItem::Fauna(prey) => {
                        let mass = fauna_mass.get(&prey).copied().unwrap_or(0.0);
                        if mass > 0.0 {
                            *kills.entry(prey).or_insert(0.0) += portion / mass;
                        }
                    }
                }
            }
        }
        // Kills on populations that had already eaten today.
        for (kind, count) in kills {
            if let Some(population) = self.fauna.get_mut(&kind) {
                population.remove(count);
            }
        }
    }

    fn collect_migration_intents(
        &mut self,
        neighbors: &[(Direction, &PlotOutlook)],
    ) -> Vec<MigrationIntent> {
        let mut intents = Vec::new();
        let flora = &self.flora;
        let fauna_biomass: BTreeMap<FaunaKind, f64> = self
            .fauna
            .iter()
            .map(|(kind, population)| (*kind, population.biomass_kg()))
            .collect();
        for (kind, population) in self.fauna.iter_mut() {
            if population.population() <= 0.0 {
                continue;
            }
            let forage = population.params().accessible_forage_kg(
                |taxon| flora.get(&taxon).map_or(0.0, FloraPopulation::biomass_kg),
                |prey| fauna_biomass.get(&prey).copied().unwrap_or(0.0),
            );
            let capacity = population.carrying_capacity(forage, self.area_km2);
            let options: Vec<NeighborForage> = neighbors
                .iter()
                .map(|(direction, outlook)| NeighborForage {
                    direction: *direction,
                    forage_kg: outlook.forage_for(population.params()),
                    population: outlook.population(*kind),
                })
                .collect();
            if let Some(proposal) = population.migration_intent(capacity, &options) {
                intents.push(MigrationIntent {
                    source: self.pos,
                    kind: *kind,
                    direction: proposal.direction,
                    count: proposal.count,
                });
            }
        }
        intents
    }
}

#[derive(Debug, Clone, Copy)]
enum DietItem {
    Flora(FloraTaxon),
    Fauna(FaunaKind),
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        biome::FloraSeed,
        climate::{ClimateTable, DayStats},
    };

    fn plot(seeds: &[(FloraTaxon, f64)]) -> Plot {
        let table = Arc::new(ClimateTable::uniform("here", DayStats::constant(15.0, 2.0)));
        let climate = Climate::new("here", table, 0).expect("location exists");
        let profile = BiomeProfile {
            climate_location: "here".into(),
            flora: seeds
                .iter()
                .map(|&(taxon, cover)| FloraSeed::standard(taxon, cover))
                .collect(),
            fauna: Vec::new(),
        };
        Plot::from_profile(GridPos::new(0, 0), Biome::SouthernTundra, &profile, 1.0, climate)
    }

    fn population(plot: &Plot, kind: FaunaKind) -> f64 {
        plot.fauna_population(kind).map_or(0.0, FaunaPopulation::population)
    }

    #[test]
    fn overflow_is_taken_from_grass_first() {
        let mut p = plot(&[(FloraTaxon::GrassHerb, 0.6), (FloraTaxon::Shrub, 0.45)]);
        p.step(0, &[]).expect("stats present");
        assert!(p.total_ground_cover() <= 1.0 + 1e-9);
        assert!((p.ground_cover(FloraTaxon::Shrub) - 0.45).abs() < 1e-9);
        assert!((p.ground_cover(FloraTaxon::GrassHerb) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn mammoths_drive_pressure_and_compaction() {
        let mut p = plot(&[(FloraTaxon::GrassHerb, 0.5)]);
        p.insert_fauna(FaunaPopulation::new(FaunaParams::mammoth(), 10.0));
        p.step(0, &[]).expect("stats present");
        assert!((p.trample_pressure() - 0.01).abs() < 1e-12);
        assert!((p.snow_compaction() - 0.025).abs() < 1e-12);

        let mut empty = plot(&[(FloraTaxon::GrassHerb, 0.5)]);
        empty.step(0, &[]).expect("stats present");
        assert_eq!(empty.trample_pressure(), 0.0);
        assert_eq!(empty.snow_compaction(), 0.0);
    }

    #[test]
    fn grazing_removes_biomass() {
        let mut grazed = plot(&[(FloraTaxon::GrassHerb, 0.5)]);
        grazed.insert_fauna(FaunaPopulation::new(FaunaParams::mammoth(), 10.0));
        let mut control = plot(&[(FloraTaxon::GrassHerb, 0.5)]);
        grazed.step(0, &[]).expect("stats present");
        control.step(0, &[]).expect("stats present");
        let grass = |plot: &Plot| {
            plot.flora_population(FloraTaxon::GrassHerb)
                .map_or(0.0, FloraPopulation::biomass_kg)
        };
        let eaten = grass(&control) - grass(&grazed);
        // Ten animals at 180 kg each, with trampling losses on top.
        assert!(eaten >= 1800.0 - 1e-6, "eaten {eaten}");
    }

    #[test]
    fn predators_take_prey() {
        let seeds = [(FloraTaxon::Moss, 0.4), (FloraTaxon::GrassHerb, 0.3)];
        let mut hunted = plot(&seeds);
        hunted.insert_fauna(FaunaPopulation::new(FaunaParams::reindeer(), 3.0));
        hunted.insert_fauna(FaunaPopulation::new(FaunaParams::wolf(), 0.5));
        let mut safe = plot(&seeds);
        safe.insert_fauna(FaunaPopulation::new(FaunaParams::reindeer(), 3.0));
        for day in 0..30 {
            hunted.step(day, &[]).expect("stats present");
            safe.step(day, &[]).expect("stats present");
        }
        assert!(population(&hunted, FaunaKind::Prey) < population(&safe, FaunaKind::Prey));
        assert!(population(&hunted, FaunaKind::Predator) > 0.0);
    }

    #[test]
    fn wolves_without_prey_starve() {
        let mut p = plot(&[(FloraTaxon::GrassHerb, 0.3)]);
        p.insert_fauna(FaunaPopulation::new(FaunaParams::wolf(), 1.0));
        for day in 0..30 {
            p.step(day, &[]).expect("stats present");
        }
        assert!(population(&p, FaunaKind::Predator) < 1.0);
    }

    #[test]
    fn steppe_label_follows_conditions() {
        let mut p = plot(&[(FloraTaxon::GrassHerb, 0.6), (FloraTaxon::Shrub, 0.05)]);
        assert!(p.reclassify_biome().is_none());
        p.snow_compaction = 0.5;
        let transition = p.reclassify_biome().expect("becomes steppe");
        assert_eq!(transition.from, Biome::SouthernTundra);
        assert_eq!(transition.to, Biome::MammothSteppe);
        assert!(p.reclassify_biome().is_none());
        p.snow_compaction = 0.1;
        let back = p.reclassify_biome().expect("reverts");
        assert_eq!(back.to, Biome::SouthernTundra);
        assert_eq!(p.native_biome(), Biome::SouthernTundra);
    }

    #[test]
    fn crowded_herd_proposes_migration_toward_forage() {
        let mut p = plot(&[(FloraTaxon::GrassHerb, 0.05)]);
        p.insert_fauna(FaunaPopulation::new(FaunaParams::mammoth(), 18.0));
        let rich = plot(&[(FloraTaxon::GrassHerb, 0.8)]).outlook();
        let poor = plot(&[(FloraTaxon::GrassHerb, 0.1)]).outlook();
        let neighbors = [(Direction::North, &poor), (Direction::South, &rich)];
        let mut intents = Vec::new();
        for day in 0..3 {
            intents.extend(p.step(day, &neighbors).expect("stats present"));
        }
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].direction, Direction::South);
        assert_eq!(intents[0].kind, FaunaKind::Megaherbivore);
        assert!(intents[0].count > 0.0);
        // Proposals are not applied locally.
        assert!(population(&p, FaunaKind::Megaherbivore) > 17.0);
    }

    #[test]
    fn missing_statistics_fail_before_any_change() {
        let mut table = ClimateTable::uniform("here", DayStats::constant(15.0, 2.0));
        table.remove("here", 0);
        let climate = Climate::new("here", Arc::new(table), 0).expect("location exists");
        let mut p = Plot::new(GridPos::new(0, 0), Biome::NorthernTundra, 1.0, climate);
        p.insert_flora(FloraPopulation::new(
            FloraTaxon::Moss,
            Default::default(),
            0.3,
            1e-6,
            1000.0,
        ));
        let err = p.step(0, &[]).unwrap_err();
        assert!(matches!(err, ClimateError::MissingStatistics { day_of_year: 0, .. }));
        assert_eq!(p.flora_population(FloraTaxon::Moss).map(|f| f.population()), Some(1000.0));
    }
}
