//! The plot grid and its three-phase daily step.

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    biome::Biome,
    error::{ConfigError, SimulationError},
    fauna::{FaunaKind, FaunaPopulation},
    flora::FloraTaxon,
    plot::{BiomeTransition, Plot, PlotOutlook},
    snapshot::GridSnapshot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub row: usize,
    pub col: usize,
}

impl GridPos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Neighbour directions, in tie-breaking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// (row, col) step; north is row - 1.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Neighborhood {
    /// 4-neighbourhood.
    #[default]
    VonNeumann,
    /// 8-neighbourhood.
    Moore,
}

impl Neighborhood {
    pub fn directions(self) -> &'static [Direction] {
        match self {
            Neighborhood::VonNeumann => &Direction::CARDINAL,
            Neighborhood::Moore => &Direction::ALL,
        }
    }
}

/// Proposed, not yet applied, movement out of `source`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MigrationIntent {
    pub source: GridPos,
    pub kind: FaunaKind,
    pub direction: Direction,
    pub count: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedMigration {
    pub from: GridPos,
    pub to: GridPos,
    pub kind: FaunaKind,
    pub count: f64,
}

/// What happened during one `advance_day`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayReport {
    pub day: u64,
    pub migrations: Vec<AppliedMigration>,
    /// Intents pointing outside the grid.
    pub discarded: Vec<MigrationIntent>,
    pub totals_before_migration: BTreeMap<FaunaKind, f64>,
    pub totals_after_migration: BTreeMap<FaunaKind, f64>,
    pub transitions: Vec<BiomeTransition>,
}

#[derive(Debug, Clone)]
pub struct PlotGrid {
    rows: usize,
    cols: usize,
    neighborhood: Neighborhood,
    plots: Vec<Plot>,
    adjacency: Vec<Vec<(Direction, usize)>>,
    day: u64,
}

impl PlotGrid {
    /// `plots` must be in row-major order with matching positions.
    pub fn new(
        rows: usize,
        cols: usize,
        neighborhood: Neighborhood,
        plots: Vec<Plot>,
    ) -> Result<Self, ConfigError> {
        if rows == 0 || cols == 0 {
            return Err(ConfigError::Validation(format!(
                "grid must have at least one cell, got {rows}x{cols}"
            )));
        }
        if plots.len() != rows * cols {
            return Err(ConfigError::Validation(format!(
                "grid {rows}x{cols} needs {} plots, got {}",
                rows * cols,
                plots.len()
            )));
        }
        for (index, plot) in plots.iter().enumerate() {
            let expected = GridPos::new(index / cols, index % cols);
            if plot.pos() != expected {
                return Err(ConfigError::Validation(format!(
                    "plot at index {index} is at ({}, {}), expected ({}, {})",
                    plot.pos().row,
                    plot.pos().col,
                    expected.row,
                    expected.col
                )));
            }
        }
        let mut grid = Self {
            rows,
            cols,
            neighborhood,
            plots,
            adjacency: Vec::new(),
            day: 0,
        };
        grid.adjacency = (0..grid.plots.len())
            .map(|index| {
                let pos = grid.pos_of(index);
                neighborhood
                    .directions()
                    .iter()
                    .filter_map(|&direction| {
                        grid.neighbor(pos, direction)
                            .map(|neighbor| (direction, grid.index_of(neighbor)))
                    })
                    .collect()
            })
            .collect();
        Ok(grid)
    }

    /// Builds every cell with `make`, in row-major order.
    pub fn from_fn<E>(
        rows: usize,
        cols: usize,
        neighborhood: Neighborhood,
        mut make: impl FnMut(GridPos) -> Result<Plot, E>,
    ) -> Result<Self, E>
    where
        E: From<ConfigError>,
    {
        let mut plots = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                plots.push(make(GridPos::new(row, col))?);
            }
        }
        Ok(Self::new(rows, cols, neighborhood, plots)?)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn neighborhood(&self) -> Neighborhood {
        self.neighborhood
    }

    /// Index of the next day to simulate.
    pub fn current_day(&self) -> u64 {
        self.day
    }

    pub fn plots(&self) -> impl Iterator<Item = &Plot> {
        self.plots.iter()
    }

    pub fn plot(&self, pos: GridPos) -> Option<&Plot> {
        self.contains(pos).then(|| &self.plots[self.index_of(pos)])
    }

    /// Mutable access to one plot's contents, e.g. to introduce animals.
    pub fn plot_mut(&mut self, pos: GridPos) -> Option<&mut Plot> {
        if self.contains(pos) {
            let index = self.index_of(pos);
            Some(&mut self.plots[index])
        } else {
            None
        }
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    pub fn neighbor(&self, pos: GridPos, direction: Direction) -> Option<GridPos> {
        let (dr, dc) = direction.offset();
        let row = pos.row.checked_add_signed(dr)?;
        let col = pos.col.checked_add_signed(dc)?;
        let next = GridPos::new(row, col);
        self.contains(next).then_some(next)
    }

    pub fn neighbors(&self, pos: GridPos) -> Vec<(Direction, GridPos)> {
        if !self.contains(pos) {
            return Vec::new();
        }
        self.adjacency[self.index_of(pos)]
            .iter()
            .map(|&(direction, index)| (direction, self.pos_of(index)))
            .collect()
    }

    pub fn total_population(&self, kind: FaunaKind) -> f64 {
        self.plots
            .iter()
            .filter_map(|plot| plot.fauna_population(kind))
            .map(FaunaPopulation::population)
            .sum()
    }

    pub fn population_totals(&self) -> BTreeMap<FaunaKind, f64> {
        let mut totals = BTreeMap::new();
        for plot in &self.plots {
            for population in plot.fauna() {
                *totals.entry(population.kind()).or_insert(0.0) += population.population();
            }
        }
        totals
    }

    pub fn total_biomass(&self, taxon: FloraTaxon) -> f64 {
        self.plots
            .iter()
            .filter_map(|plot| plot.flora_population(taxon))
            .map(|population| population.biomass_kg())
            .sum()
    }

    pub fn biome_census(&self) -> BTreeMap<Biome, usize> {
        let mut census = BTreeMap::new();
        for plot in &self.plots {
            *census.entry(plot.biome()).or_insert(0) += 1;
        }
        census
    }

    pub fn snapshot(&self) -> GridSnapshot {
        GridSnapshot::capture(self)
    }

    /// Simulates the next day.
    pub fn step(&mut self) -> Result<DayReport, SimulationError> {
        self.advance_day(self.day)
    }

    pub fn advance_days(&mut self, days: u64) -> Result<(), SimulationError> {
        for _ in 0..days {
            self.step()?;
        }
        Ok(())
    }

    /// Runs day `day_index` across the grid: every plot steps from its own
    /// prior-day state, migration intents are then applied together, and
    /// finally every plot is reclassified. If any plot lacks climate
    /// statistics for the day the grid is left untouched.
    pub fn advance_day(&mut self, day_index: u64) -> Result<DayReport, SimulationError> {
        for plot in &self.plots {
            plot.check_statistics(day_index).map_err(|source| SimulationError::Climate {
                row: plot.pos().row,
                col: plot.pos().col,
                day: day_index,
                source,
            })?;
        }

        let outlooks: Vec<PlotOutlook> = self.plots.iter().map(Plot::outlook).collect();
        let adjacency = &self.adjacency;
        let step_plot = |(index, plot): (usize, &mut Plot)| {
            let views: Vec<(Direction, &PlotOutlook)> = adjacency[index]
                .iter()
                .map(|&(direction, neighbor)| (direction, &outlooks[neighbor]))
                .collect();
            let pos = plot.pos();
            plot.step(day_index, &views)
                .map_err(|source| SimulationError::Climate {
                    row: pos.row,
                    col: pos.col,
                    day: day_index,
                    source,
                })
        };
        #[cfg(feature = "parallel")]
        let stepped: Result<Vec<Vec<MigrationIntent>>, SimulationError> =
            self.plots.par_iter_mut().enumerate().map(step_plot).collect();
        #[cfg(not(feature = "parallel"))]
        let stepped: Result<Vec<Vec<MigrationIntent>>, SimulationError> =
            self.plots.iter_mut().enumerate().map(step_plot).collect();
        let intents: Vec<MigrationIntent> = stepped?.into_iter().flatten().collect();

        let totals_before_migration = self.population_totals();
        let (migrations, discarded) = self.apply_migrations(intents);
        let totals_after_migration = self.population_totals();

        let mut transitions = Vec::new();
        for plot in &mut self.plots {
            if let Some(transition) = plot.reclassify_biome() {
                info!(
                    day = day_index,
                    row = transition.pos.row,
                    col = transition.pos.col,
                    from = %transition.from,
                    to = %transition.to,
                    "biome transition"
                );
                transitions.push(transition);
            }
        }

        self.day = day_index + 1;
        debug!(
            day = day_index,
            migrations = migrations.len(),
            discarded = discarded.len(),
            census = ?self.biome_census(),
            "day complete"
        );
        Ok(DayReport {
            day: day_index,
            migrations,
            discarded,
            totals_before_migration,
            totals_after_migration,
            transitions,
        })
    }

    /// Applies all intents in one deterministic pass. Outflow from a source
    /// is limited to what it held before any migration that day; intents
    /// leaving the grid are discarded and their animals stay put.
    pub(crate) fn apply_migrations(
        &mut self,
        mut intents: Vec<MigrationIntent>,
    ) -> (Vec<AppliedMigration>, Vec<MigrationIntent>) {
        intents.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then(a.kind.cmp(&b.kind))
                .then(a.direction.cmp(&b.direction))
        });

        let mut applied = Vec::new();
        let mut discarded = Vec::new();
        let mut outflow: BTreeMap<(usize, FaunaKind), f64> = BTreeMap::new();
        for intent in intents {
            let Some(destination) = self
                .plot(intent.source)
                .and_then(|_| self.neighbor(intent.source, intent.direction))
            else {
                warn!(
                    row = intent.source.row,
                    col = intent.source.col,
                    kind = %intent.kind,
                    direction = ?intent.direction,
                    count = intent.count,
                    "discarding migration off the grid"
                );
                discarded.push(intent);
                continue;
            };
            let source = self.index_of(intent.source);
            let held = self.plots[source]
                .fauna_population(intent.kind)
                .map_or(0.0, FaunaPopulation::population);
            let already = outflow.entry((source, intent.kind)).or_insert(0.0);
            let count = intent.count.min(held - *already).max(0.0);
            if count <= 0.0 {
                continue;
            }
            *already += count;
            applied.push(AppliedMigration {
                from: intent.source,
                to: destination,
                kind: intent.kind,
                count,
            });
        }

        for migration in &applied {
            let source = self.index_of(migration.from);
            let destination = self.index_of(migration.to);
            let Some(population) = self.plots[source].fauna_population_mut(migration.kind) else {
                continue;
            };
            let template = population.empty_like();
            let count = population.remove(migration.count);
            let target = &mut self.plots[destination];
            if target.fauna_population(migration.kind).is_none() {
                target.insert_fauna(template);
            }
            if let Some(population) = target.fauna_population_mut(migration.kind) {
                population.add(count);
            }
        }
        (applied, discarded)
    }

    fn index_of(&self, pos: GridPos) -> usize {
        pos.row * self.cols + pos.col
    }

    fn pos_of(&self, index: usize) -> GridPos {
        GridPos::new(index / self.cols, index % self.cols)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        climate::{Climate, ClimateTable, DayStats},
        fauna::FaunaParams,
    };

    fn grid(rows: usize, cols: usize, neighborhood: Neighborhood) -> PlotGrid {
        let table = Arc::new(ClimateTable::uniform("here", DayStats::constant(10.0, 1.0)));
        PlotGrid::from_fn(rows, cols, neighborhood, |pos| -> Result<Plot, ConfigError> {
            let climate = Climate::new("here", table.clone(), 0)?;
            Ok(Plot::new(pos, Biome::SouthernTundra, 1.0, climate))
        })
        .expect("grid builds")
    }

    fn add_mammoths(grid: &mut PlotGrid, pos: GridPos, count: f64) {
        grid.plot_mut(pos)
            .expect("on grid")
            .insert_fauna(FaunaPopulation::new(FaunaParams::mammoth(), count));
    }

    fn mammoths_at(grid: &PlotGrid, pos: GridPos) -> f64 {
        grid.plot(pos)
            .and_then(|plot| plot.fauna_population(FaunaKind::Megaherbivore))
            .map_or(0.0, FaunaPopulation::population)
    }

    #[test]
    fn neighborhoods_respect_edges() {
        let g = grid(3, 3, Neighborhood::VonNeumann);
        assert_eq!(g.neighbors(GridPos::new(1, 1)).len(), 4);
        assert_eq!(g.neighbors(GridPos::new(0, 0)).len(), 2);
        let m = grid(3, 3, Neighborhood::Moore);
        assert_eq!(m.neighbors(GridPos::new(1, 1)).len(), 8);
        assert_eq!(m.neighbors(GridPos::new(0, 2)).len(), 3);
        assert_eq!(m.neighbor(GridPos::new(0, 0), Direction::North), None);
        assert_eq!(
            m.neighbor(GridPos::new(0, 0), Direction::SouthEast),
            Some(GridPos::new(1, 1))
        );
    }

    #[test]
    fn rejects_mismatched_geometry() {
        let g = grid(2, 2, Neighborhood::VonNeumann);
        let plots: Vec<Plot> = g.plots().cloned().collect();
        assert!(PlotGrid::new(3, 2, Neighborhood::VonNeumann, plots.clone()).is_err());
        let mut swapped = plots;
        swapped.swap(0, 1);
        assert!(PlotGrid::new(2, 2, Neighborhood::VonNeumann, swapped).is_err());
    }

    #[test]
    fn off_grid_intents_are_discarded_and_population_stays() {
        let mut g = grid(2, 2, Neighborhood::VonNeumann);
        let corner = GridPos::new(0, 0);
        add_mammoths(&mut g, corner, 10.0);
        let (applied, discarded) = g.apply_migrations(vec![MigrationIntent {
            source: corner,
            kind: FaunaKind::Megaherbivore,
            direction: Direction::North,
            count: 4.0,
        }]);
        assert!(applied.is_empty());
        assert_eq!(discarded.len(), 1);
        assert_eq!(mammoths_at(&g, corner), 10.0);
    }

    #[test]
    fn migration_creates_destination_population_and_conserves_totals() {
        let mut g = grid(3, 3, Neighborhood::Moore);
        let center = GridPos::new(1, 1);
        add_mammoths(&mut g, center, 10.0);
        let before = g.total_population(FaunaKind::Megaherbivore);
        let intents = vec![
            MigrationIntent {
                source: center,
                kind: FaunaKind::Megaherbivore,
                direction: Direction::East,
                count: 3.0,
            },
            MigrationIntent {
                source: center,
                kind: FaunaKind::Megaherbivore,
                direction: Direction::SouthWest,
                count: 2.5,
            },
        ];
        let (applied, discarded) = g.apply_migrations(intents);
        assert_eq!(applied.len(), 2);
        assert!(discarded.is_empty());
        assert!((mammoths_at(&g, center) - 4.5).abs() < 1e-12);
        assert!((mammoths_at(&g, GridPos::new(1, 2)) - 3.0).abs() < 1e-12);
        assert!((mammoths_at(&g, GridPos::new(2, 0)) - 2.5).abs() < 1e-12);
        let created = g
            .plot(GridPos::new(1, 2))
            .and_then(|plot| plot.fauna_population(FaunaKind::Megaherbivore))
            .expect("destination record created");
        assert_eq!(created.params(), &FaunaParams::mammoth());
        assert!((g.total_population(FaunaKind::Megaherbivore) - before).abs() < 1e-9);
    }

    #[test]
    fn outflow_is_limited_to_pre_migration_population() {
        let mut g = grid(1, 3, Neighborhood::VonNeumann);
        let middle = GridPos::new(0, 1);
        add_mammoths(&mut g, middle, 5.0);
        add_mammoths(&mut g, GridPos::new(0, 0), 0.0);
        let intents = vec![
            MigrationIntent {
                source: middle,
                kind: FaunaKind::Megaherbivore,
                direction: Direction::West,
                count: 4.0,
            },
            MigrationIntent {
                source: middle,
                kind: FaunaKind::Megaherbivore,
                direction: Direction::East,
                count: 4.0,
            },
        ];
        let (applied, _) = g.apply_migrations(intents);
        let moved: f64 = applied.iter().map(|m| m.count).sum();
        assert!((moved - 5.0).abs() < 1e-12);
        assert_eq!(mammoths_at(&g, middle), 0.0);
        // Sorted by direction: East is resolved before West.
        assert!((mammoths_at(&g, GridPos::new(0, 2)) - 4.0).abs() < 1e-12);
        assert!((mammoths_at(&g, GridPos::new(0, 0)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn intent_order_does_not_change_the_outcome() {
        let make = || {
            let mut g = grid(2, 2, Neighborhood::Moore);
            add_mammoths(&mut g, GridPos::new(0, 0), 8.0);
            add_mammoths(&mut g, GridPos::new(1, 1), 6.0);
            g
        };
        let intents = vec![
            MigrationIntent {
                source: GridPos::new(0, 0),
                kind: FaunaKind::Megaherbivore,
                direction: Direction::SouthEast,
                count: 3.0,
            },
            MigrationIntent {
                source: GridPos::new(1, 1),
                kind: FaunaKind::Megaherbivore,
                direction: Direction::NorthWest,
                count: 2.0,
            },
        ];
        let mut forward = make();
        forward.apply_migrations(intents.clone());
        let mut reversed = make();
        reversed.apply_migrations(intents.into_iter().rev().collect());
        for pos in [GridPos::new(0, 0), GridPos::new(1, 1)] {
            assert_eq!(mammoths_at(&forward, pos), mammoths_at(&reversed, pos));
        }
        assert!((mammoths_at(&forward, GridPos::new(0, 0)) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn advance_day_moves_the_day_counter_and_census() {
        let mut g = grid(2, 3, Neighborhood::VonNeumann);
        let report = g.step().expect("statistics available");
        assert_eq!(report.day, 0);
        assert_eq!(g.current_day(), 1);
        g.advance_days(4).expect("statistics available");
        assert_eq!(g.current_day(), 5);
        assert_eq!(g.biome_census().get(&Biome::SouthernTundra), Some(&6));
    }
}
