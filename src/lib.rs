pub mod biome;
pub mod climate;
pub mod engine;
pub mod error;
pub mod fauna;
pub mod flora;
pub mod grid;
pub mod plot;
pub mod rng;
pub mod scenario;
pub mod snapshot;

pub use engine::{Engine, EngineSettings, RunSummary};
pub use error::{ConfigError, SimulationError};
pub use grid::{DayReport, PlotGrid};
pub use scenario::{Scenario, ScenarioLoader};
