use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use super::{ClimateError, DAYS_PER_YEAR};

/// Historical distribution of one day-of-year at one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub temp_mean_c: f64,
    #[serde(default)]
    pub temp_var: f64,
    pub precip_mean_mm: f64,
    #[serde(default)]
    pub precip_var: f64,
    /// Surface solar radiation downwards, J/m² per day.
    #[serde(default)]
    pub ssrd_mean: f64,
    #[serde(default)]
    pub ssrd_var: f64,
    /// UV index. Tables without UV leave it unset and UV never limits growth.
    #[serde(default)]
    pub uv_mean: Option<f64>,
    #[serde(default)]
    pub uv_var: f64,
}

impl DayStats {
    pub fn constant(temp_c: f64, precip_mm: f64) -> Self {
        Self {
            temp_mean_c: temp_c,
            temp_var: 0.0,
            precip_mean_mm: precip_mm,
            precip_var: 0.0,
            ssrd_mean: 0.0,
            ssrd_var: 0.0,
            uv_mean: None,
            uv_var: 0.0,
        }
    }

    pub fn with_radiation(mut self, ssrd_j_m2: f64, uv_index: f64) -> Self {
        self.ssrd_mean = ssrd_j_m2;
        self.uv_mean = Some(uv_index);
        self
    }
}

/// On-disk row: one day-of-year for one location.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DayRecord {
    day_of_year: u32,
    #[serde(flatten)]
    stats: DayStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TableFile {
    locations: BTreeMap<String, Vec<DayRecord>>,
}

/// Per-location, per-day-of-year climate statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClimateTable {
    locations: BTreeMap<String, BTreeMap<u32, DayStats>>,
}

impl ClimateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same statistics for every day of the year.
    pub fn uniform(location: impl Into<String>, stats: DayStats) -> Self {
        let mut table = Self::new();
        table.insert_year(location, |_| stats);
        table
    }

    pub fn insert(&mut self, location: impl Into<String>, day_of_year: u32, stats: DayStats) {
        self.locations
            .entry(location.into())
            .or_default()
            .insert(day_of_year, stats);
    }

    pub fn insert_year(&mut self, location: impl Into<String>, stats: impl Fn(u32) -> DayStats) {
        let days = self.locations.entry(location.into()).or_default();
        for day in 0..DAYS_PER_YEAR as u32 {
            days.insert(day, stats(day));
        }
    }

    pub fn remove(&mut self, location: &str, day_of_year: u32) -> Option<DayStats> {
        self.locations.get_mut(location)?.remove(&day_of_year)
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.locations.contains_key(location)
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    pub fn get(&self, location: &str, day_of_year: u32) -> Option<&DayStats> {
        self.locations.get(location)?.get(&day_of_year)
    }

    pub fn lookup(&self, location: &str, day_of_year: u32) -> Result<&DayStats, ClimateError> {
        self.get(location, day_of_year)
            .ok_or_else(|| ClimateError::MissingStatistics {
                location: location.to_string(),
                day_of_year,
            })
    }

    /// Earliest recorded day for a location, used to seed initial conditions.
    pub fn first_day(&self, location: &str) -> Option<&DayStats> {
        self.locations.get(location)?.values().next()
    }

    /// Loads a table from JSON or YAML, picked by file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read climate statistics {}", path.display()))?;
        let file: TableFile = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            _ => serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
        };
        Self::from_file(file).with_context(|| format!("Invalid climate table {}", path.display()))
    }

    fn from_file(file: TableFile) -> Result<Self> {
        let mut table = Self::new();
        for (location, records) in file.locations {
            for record in records {
                if record.day_of_year >= DAYS_PER_YEAR as u32 {
                    bail!(
                        "location '{location}' has day_of_year {} outside 0..{DAYS_PER_YEAR}",
                        record.day_of_year
                    );
                }
                let stats = &record.stats;
                if stats.temp_var < 0.0
                    || stats.precip_var < 0.0
                    || stats.ssrd_var < 0.0
                    || stats.uv_var < 0.0
                {
                    bail!(
                        "location '{location}' day {} has a negative variance",
                        record.day_of_year
                    );
                }
                table.insert(location.clone(), record.day_of_year, record.stats);
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_rows_by_location() {
        let json = r#"{
            "locations": {
                "salekhard": [
                    {"day_of_year": 0, "temp_mean_c": -24.0, "temp_var": 30.0,
                     "precip_mean_mm": 1.1, "precip_var": 0.5},
                    {"day_of_year": 1, "temp_mean_c": -23.5, "precip_mean_mm": 1.0}
                ]
            }
        }"#;
        let file: TableFile = serde_json::from_str(json).expect("valid json");
        let table = ClimateTable::from_file(file).expect("valid table");
        assert!(table.has_location("salekhard"));
        let day1 = table.get("salekhard", 1).expect("day 1");
        assert_eq!(day1.temp_var, 0.0);
        assert_eq!(table.first_day("salekhard").map(|d| d.temp_mean_c), Some(-24.0));
    }

    #[test]
    fn radiation_columns_are_optional() {
        let json = r#"{
            "locations": {
                "saskylakh": [
                    {"day_of_year": 0, "temp_mean_c": 12.0, "precip_mean_mm": 1.0,
                     "ssrd_mean": 18000000.0, "ssrd_var": 4.0e12, "uv_mean": 4.5, "uv_var": 0.8},
                    {"day_of_year": 1, "temp_mean_c": 12.0, "precip_mean_mm": 1.0}
                ]
            }
        }"#;
        let file: TableFile = serde_json::from_str(json).expect("valid json");
        let table = ClimateTable::from_file(file).expect("valid table");
        let sunny = table.get("saskylakh", 0).expect("day 0");
        assert_eq!(sunny.ssrd_mean, 18_000_000.0);
        assert_eq!(sunny.uv_mean, Some(4.5));
        let bare = table.get("saskylakh", 1).expect("day 1");
        assert_eq!(bare.ssrd_mean, 0.0);
        assert_eq!(bare.uv_mean, None);

        let negative = r#"{"locations": {"x": [
            {"day_of_year": 0, "temp_mean_c": 1.0, "precip_mean_mm": 0.0, "uv_var": -1.0}
        ]}}"#;
        let file: TableFile = serde_json::from_str(negative).expect("valid json");
        assert!(ClimateTable::from_file(file).is_err());
    }

    #[test]
    fn rejects_out_of_range_days() {
        let json = r#"{"locations": {"x": [
            {"day_of_year": 400, "temp_mean_c": 1.0, "precip_mean_mm": 0.0}
        ]}}"#;
        let file: TableFile = serde_json::from_str(json).expect("valid json");
        assert!(ClimateTable::from_file(file).is_err());
    }

    #[test]
    fn lookup_reports_missing_day() {
        let mut table = ClimateTable::uniform("krasnoyarsk", DayStats::constant(5.0, 1.0));
        table.remove("krasnoyarsk", 40);
        let err = table.lookup("krasnoyarsk", 40).unwrap_err();
        assert_eq!(
            err,
            ClimateError::MissingStatistics {
                location: "krasnoyarsk".into(),
                day_of_year: 40
            }
        );
        assert!(table.lookup("krasnoyarsk", 41).is_ok());
    }
}
