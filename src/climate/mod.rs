//! Per-plot climate state, advanced one day at a time from historical
//! day-of-year statistics.

mod stats;

use std::{collections::VecDeque, sync::Arc};

use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::rng::{daily_rng, GaussianExt};

pub use stats::{ClimateTable, DayStats};

pub const DAYS_PER_YEAR: u64 = 365;
pub const FREEZING_POINT_C: f64 = 0.0;
/// Air temperatures retained for consecutive-day queries.
pub const HISTORY_DAYS: usize = 90;
/// Consecutive frozen-soil days after which the ground counts as permafrost.
pub const PERMAFROST_DAYS: u32 = 720;
pub const EXTREME_COLD_C: f64 = -40.0;
pub const EXTREME_HEAT_C: f64 = 30.0;

/// Metres of snow per millimetre of water equivalent (10:1).
const SNOW_PER_WATER_MM: f64 = 0.01;
/// Degree-day melt factor, metres per degree above freezing.
const MELT_RATE_M_PER_DEGREE: f64 = 0.004;
const SOIL_COUPLING: f64 = 0.25;
/// Snow depth at which soil coupling is halved.
const SNOW_INSULATION_M: f64 = 0.15;
const SNOW_AIR_SENSITIVITY: f64 = 2.0;
const MAX_SNOW_AIR_OFFSET_C: f64 = 1.5;
const DRY_DAY_THRESHOLD_MM: f64 = 0.5;
/// Share of downward shortwave energy that goes into melting snow.
const SOLAR_MELT_EFFICIENCY: f64 = 0.35;
/// Latent heat of fusion of ice, J/kg.
const LATENT_HEAT_FUSION_J_KG: f64 = 334_000.0;
/// Colder than this the snowpack refreezes whatever the sun melts.
const SOLAR_MELT_MIN_AIR_C: f64 = -5.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClimateError {
    #[error("no climate statistics for location '{location}' on day-of-year {day_of_year}")]
    MissingStatistics { location: String, day_of_year: u32 },
    #[error("unknown climate location '{0}'")]
    UnknownLocation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClimateSummary {
    pub air_temp_c: f64,
    pub soil_temp_c: f64,
    pub snow_depth_m: f64,
    pub precipitation_mm: f64,
    pub meltwater_mm: f64,
    pub solar_radiation_mj_m2: f64,
    pub uv_index: Option<f64>,
    pub dry_days: u32,
    pub permafrost: bool,
}

#[derive(Debug, Clone)]
pub struct Climate {
    location: String,
    table: Arc<ClimateTable>,
    seed: u64,
    air_temp_c: f64,
    soil_temp_c: f64,
    snow_depth_m: f64,
    precipitation_mm: f64,
    meltwater_mm: f64,
    solar_radiation_j_m2: f64,
    uv_index: Option<f64>,
    dry_days: u32,
    frozen_soil_days: u32,
    history: VecDeque<f64>,
    last_snow_change_m: f64,
}

impl Climate {
    /// Creates a climate bound to `location`, starting from that location's
    /// earliest recorded mean temperature with bare ground.
    pub fn new(
        location: impl Into<String>,
        table: Arc<ClimateTable>,
        seed: u64,
    ) -> Result<Self, ClimateError> {
        let location = location.into();
        let initial_temp = table
            .first_day(&location)
            .map(|stats| stats.temp_mean_c)
            .ok_or_else(|| ClimateError::UnknownLocation(location.clone()))?;
        Ok(Self {
            location,
            table,
            seed,
            air_temp_c: initial_temp,
            soil_temp_c: initial_temp,
            snow_depth_m: 0.0,
            precipitation_mm: 0.0,
            meltwater_mm: 0.0,
            solar_radiation_j_m2: 0.0,
            uv_index: None,
            dry_days: 0,
            frozen_soil_days: 0,
            history: VecDeque::with_capacity(HISTORY_DAYS),
            last_snow_change_m: 0.0,
        })
    }

    pub fn with_snow_depth(mut self, depth_m: f64) -> Self {
        self.snow_depth_m = depth_m.max(0.0);
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn day_of_year(day_index: u64) -> u32 {
        (day_index % DAYS_PER_YEAR) as u32
    }

    pub fn has_statistics(&self, day_index: u64) -> Result<(), ClimateError> {
        self.table
            .lookup(&self.location, Self::day_of_year(day_index))
            .map(|_| ())
    }

    /// Samples the day's weather and updates snow, soil and the counters.
    /// On a missing statistics row nothing is modified.
    pub fn advance(&mut self, day_index: u64) -> Result<(), ClimateError> {
        let day_of_year = Self::day_of_year(day_index);
        let stats = *self.table.lookup(&self.location, day_of_year)?;
        let mut rng = daily_rng(self.seed, day_index);

        let snow_offset = (-self.last_snow_change_m * SNOW_AIR_SENSITIVITY)
            .clamp(-MAX_SNOW_AIR_OFFSET_C, MAX_SNOW_AIR_OFFSET_C);
        let air = rng.gaussian(
            stats.temp_mean_c + snow_offset,
            stats.temp_var.max(0.0).sqrt(),
        );
        let precipitation = rng
            .gaussian(stats.precip_mean_mm, stats.precip_var.max(0.0).sqrt())
            .max(0.0);
        let radiation = rng
            .gaussian(stats.ssrd_mean, stats.ssrd_var.max(0.0).sqrt())
            .max(0.0);
        let uv = stats
            .uv_mean
            .map(|mean| rng.gaussian(mean, stats.uv_var.max(0.0).sqrt()).max(0.0));

        let previous_snow = self.snow_depth_m;
        let mut melt_m = 0.0;
        if air < FREEZING_POINT_C {
            self.snow_depth_m += precipitation * SNOW_PER_WATER_MM;
        } else {
            melt_m = (MELT_RATE_M_PER_DEGREE * (air - FREEZING_POINT_C)).min(self.snow_depth_m);
            self.snow_depth_m -= melt_m;
        }
        if air > SOLAR_MELT_MIN_AIR_C {
            let solar_m = solar_melt_m(radiation).min(self.snow_depth_m);
            self.snow_depth_m = (self.snow_depth_m - solar_m).max(0.0);
            melt_m += solar_m;
        }
        self.last_snow_change_m = self.snow_depth_m - previous_snow;
        self.meltwater_mm = melt_m / SNOW_PER_WATER_MM;
        self.precipitation_mm = precipitation;
        self.solar_radiation_j_m2 = radiation;
        self.uv_index = uv;

        let coupling = SOIL_COUPLING / (1.0 + self.snow_depth_m / SNOW_INSULATION_M);
        self.soil_temp_c += (air - self.soil_temp_c) * coupling;
        self.air_temp_c = air;

        if self.hydration_mm() < DRY_DAY_THRESHOLD_MM {
            self.dry_days += 1;
        } else {
            self.dry_days = 0;
        }
        if self.soil_temp_c < FREEZING_POINT_C {
            self.frozen_soil_days += 1;
        } else {
            self.frozen_soil_days = 0;
        }

        if self.history.len() == HISTORY_DAYS {
            self.history.pop_front();
        }
        self.history.push_back(air);

        trace!(
            location = %self.location,
            day = day_index,
            air,
            precipitation,
            snow = self.snow_depth_m,
            "climate advanced"
        );
        Ok(())
    }

    pub fn air_temp_c(&self) -> f64 {
        self.air_temp_c
    }

    pub fn soil_temp_c(&self) -> f64 {
        self.soil_temp_c
    }

    pub fn snow_depth_m(&self) -> f64 {
        self.snow_depth_m
    }

    pub fn precipitation_mm(&self) -> f64 {
        self.precipitation_mm
    }

    pub fn meltwater_mm(&self) -> f64 {
        self.meltwater_mm
    }

    /// Rain or snowfall plus snowmelt, the water plants saw today.
    pub fn hydration_mm(&self) -> f64 {
        self.precipitation_mm + self.meltwater_mm
    }

    pub fn solar_radiation_j_m2(&self) -> f64 {
        self.solar_radiation_j_m2
    }

    /// Today's UV index, when the statistics table records one.
    pub fn uv_index(&self) -> Option<f64> {
        self.uv_index
    }

    /// Consecutive days without meaningful moisture, ending today.
    pub fn dry_days(&self) -> u32 {
        self.dry_days
    }

    pub fn frozen_soil_days(&self) -> u32 {
        self.frozen_soil_days
    }

    pub fn is_permafrost(&self) -> bool {
        self.frozen_soil_days >= PERMAFROST_DAYS
    }

    /// Consecutive days, ending today, with air temperature strictly below
    /// `threshold_c`. Bounded by the retained history.
    pub fn consecutive_days_below(&self, threshold_c: f64) -> u32 {
        self.history
            .iter()
            .rev()
            .take_while(|&&t| t < threshold_c)
            .count() as u32
    }

    pub fn consecutive_days_above(&self, threshold_c: f64) -> u32 {
        self.history
            .iter()
            .rev()
            .take_while(|&&t| t > threshold_c)
            .count() as u32
    }

    pub fn cold_extreme_days(&self) -> u32 {
        self.consecutive_days_below(EXTREME_COLD_C)
    }

    pub fn heat_extreme_days(&self) -> u32 {
        self.consecutive_days_above(EXTREME_HEAT_C)
    }

    /// Removes a fraction of the snowpack (trampling compaction).
    pub fn compact_snow(&mut self, fraction: f64) {
        self.snow_depth_m *= (1.0 - fraction).clamp(0.0, 1.0);
    }

    pub fn summary(&self) -> ClimateSummary {
        ClimateSummary {
            air_temp_c: self.air_temp_c,
            soil_temp_c: self.soil_temp_c,
            snow_depth_m: self.snow_depth_m,
            precipitation_mm: self.precipitation_mm,
            meltwater_mm: self.meltwater_mm,
            solar_radiation_mj_m2: self.solar_radiation_j_m2 / 1e6,
            uv_index: self.uv_index,
            dry_days: self.dry_days,
            permafrost: self.is_permafrost(),
        }
    }
}

/// Snow depth melted by a day of downward shortwave radiation.
fn solar_melt_m(radiation_j_m2: f64) -> f64 {
    let water_mm = SOLAR_MELT_EFFICIENCY * radiation_j_m2 / LATENT_HEAT_FUSION_J_KG;
    water_mm * SNOW_PER_WATER_MM
}
