use thiserror::Error;

use crate::climate::ClimateError;

/// Setup mistakes caught before the first simulated day.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown biome '{0}'")]
    UnknownBiome(String),

    #[error("unknown flora taxon '{0}'")]
    UnknownFloraTaxon(String),

    #[error("unknown fauna kind '{0}'")]
    UnknownFaunaKind(String),

    #[error("scenario validation error: {0}")]
    Validation(String),

    #[error("climate setup failed: {0}")]
    Climate(#[from] ClimateError),
}

/// Failure of a simulated day. The grid is left as it was before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("plot ({row}, {col}) cannot advance day {day}: {source}")]
    Climate {
        row: usize,
        col: usize,
        day: u64,
        #[source]
        source: ClimateError,
    },
}

impl SimulationError {
    pub fn climate_error(&self) -> &ClimateError {
        match self {
            SimulationError::Climate { source, .. } => source,
        }
    }
}
