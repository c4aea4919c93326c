use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    fauna::{FaunaKind, FaunaParams},
    flora::{FloraTaxon, GrowthStage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    SouthernTaiga,
    NorthernTaiga,
    SouthernTundra,
    NorthernTundra,
    MammothSteppe,
}

impl Biome {
    pub const ALL: [Biome; 5] = [
        Biome::SouthernTaiga,
        Biome::NorthernTaiga,
        Biome::SouthernTundra,
        Biome::NorthernTundra,
        Biome::MammothSteppe,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Biome::SouthernTaiga => "southern_taiga",
            Biome::NorthernTaiga => "northern_taiga",
            Biome::SouthernTundra => "southern_tundra",
            Biome::NorthernTundra => "northern_tundra",
            Biome::MammothSteppe => "mammoth_steppe",
        }
    }

    /// Whether a plot can start out in this biome. Mammoth steppe only
    /// arises from grazing and always has a native biome to fall back to.
    pub fn is_native(self) -> bool {
        self != Biome::MammothSteppe
    }

    /// Present-day Siberian zonation by latitude.
    pub fn from_latitude(latitude: f64) -> Self {
        if latitude < 60.0 {
            Biome::SouthernTaiga
        } else if latitude < 70.0 {
            Biome::NorthernTaiga
        } else if latitude < 75.0 {
            Biome::SouthernTundra
        } else {
            Biome::NorthernTundra
        }
    }

    pub fn map_char(self) -> char {
        match self {
            Biome::SouthernTaiga => 'T',
            Biome::NorthernTaiga => 't',
            Biome::SouthernTundra => 'u',
            Biome::NorthernTundra => 'n',
            Biome::MammothSteppe => 'M',
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Biome {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Biome::ALL
            .into_iter()
            .find(|biome| biome.name() == key)
            .or(match key.as_str() {
                "steppe" => Some(Biome::MammothSteppe),
                _ => None,
            })
            .ok_or_else(|| ConfigError::UnknownBiome(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FloraSeed {
    pub taxon: FloraTaxon,
    pub stage: GrowthStage,
    pub ground_cover: f64,
    pub nominal_mass_kg: f64,
    pub footprint_m2: f64,
}

impl FloraSeed {
    /// Typical individual mass and footprint for the taxon.
    pub fn standard(taxon: FloraTaxon, ground_cover: f64) -> Self {
        let (nominal_mass_kg, footprint_m2) = match taxon {
            FloraTaxon::Tree => (200.0, 10.0),
            FloraTaxon::Shrub => (2.0, 1.0),
            FloraTaxon::Moss => (0.3, 1.0),
            FloraTaxon::GrassHerb => (0.15, 1.0),
        };
        Self {
            taxon,
            stage: GrowthStage::Established,
            ground_cover,
            nominal_mass_kg,
            footprint_m2,
        }
    }

    pub fn seedlings(mut self) -> Self {
        self.stage = GrowthStage::Seedling;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FaunaSeed {
    pub params: FaunaParams,
    pub density_per_km2: f64,
}

impl FaunaSeed {
    pub fn standard(kind: FaunaKind, density_per_km2: f64) -> Self {
        Self {
            params: FaunaParams::defaults_for(kind),
            density_per_km2,
        }
    }
}

/// Starting state for every plot of one biome.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomeProfile {
    pub climate_location: String,
    pub flora: Vec<FloraSeed>,
    pub fauna: Vec<FaunaSeed>,
}

impl BiomeProfile {
    pub fn builtin(biome: Biome) -> Self {
        use FaunaKind::{Predator, Prey};
        use FloraTaxon::{GrassHerb, Moss, Shrub, Tree};

        let (location, flora, fauna) = match biome {
            Biome::SouthernTaiga => (
                "krasnoyarsk",
                vec![(Tree, 0.45), (Shrub, 0.15), (Moss, 0.2), (GrassHerb, 0.1)],
                vec![(Prey, 2.0), (Predator, 0.02)],
            ),
            Biome::NorthernTaiga => (
                "salekhard",
                vec![(Tree, 0.25), (Shrub, 0.25), (Moss, 0.3), (GrassHerb, 0.1)],
                vec![(Prey, 3.0), (Predator, 0.02)],
            ),
            Biome::SouthernTundra => (
                "saskylakh",
                vec![(Shrub, 0.35), (Moss, 0.35), (GrassHerb, 0.15)],
                vec![(Prey, 3.0), (Predator, 0.01)],
            ),
            Biome::NorthernTundra => (
                "cape_chelyuskin",
                vec![(Shrub, 0.1), (Moss, 0.45), (GrassHerb, 0.1)],
                vec![(Prey, 1.0), (Predator, 0.005)],
            ),
            Biome::MammothSteppe => (
                "saskylakh",
                vec![(Shrub, 0.05), (Moss, 0.05), (GrassHerb, 0.6)],
                vec![(Prey, 3.0), (Predator, 0.01)],
            ),
        };
        Self {
            climate_location: location.to_string(),
            flora: flora
                .into_iter()
                .map(|(taxon, cover)| FloraSeed::standard(taxon, cover))
                .collect(),
            fauna: fauna
                .into_iter()
                .map(|(kind, density)| FaunaSeed::standard(kind, density))
                .collect(),
        }
    }

    pub fn flora_taxa(&self) -> impl Iterator<Item = FloraTaxon> + '_ {
        self.flora.iter().map(|seed| seed.taxon)
    }

    pub fn fauna_kinds(&self) -> impl Iterator<Item = FaunaKind> + '_ {
        self.fauna.iter().map(|seed| seed.params.kind)
    }

    pub fn validate(&self, biome: Biome) -> Result<(), ConfigError> {
        let cover: f64 = self.flora.iter().map(|seed| seed.ground_cover).sum();
        if cover > 1.0 + 1e-9 {
            return Err(ConfigError::Validation(format!(
                "biome '{biome}' seeds {cover:.3} ground cover, more than the whole plot"
            )));
        }
        for seed in &self.flora {
            if seed.ground_cover < 0.0 || seed.nominal_mass_kg <= 0.0 || seed.footprint_m2 <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "biome '{biome}' has a non-positive seed for {}",
                    seed.taxon
                )));
            }
        }
        if self.fauna.iter().any(|seed| seed.density_per_km2 < 0.0) {
            return Err(ConfigError::Validation(format!(
                "biome '{biome}' has a negative fauna density"
            )));
        }
        Ok(())
    }
}

/// Profiles for every biome, starting from the built-in Siberian defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BiomeDefaults {
    profiles: BTreeMap<Biome, BiomeProfile>,
}

impl BiomeDefaults {
    pub fn siberia() -> Self {
        Self {
            profiles: Biome::ALL
                .into_iter()
                .map(|biome| (biome, BiomeProfile::builtin(biome)))
                .collect(),
        }
    }

    pub fn profile(&self, biome: Biome) -> Option<&BiomeProfile> {
        self.profiles.get(&biome)
    }

    pub fn set_profile(&mut self, biome: Biome, profile: BiomeProfile) {
        self.profiles.insert(biome, profile);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Biome, &BiomeProfile)> {
        self.profiles.iter().map(|(biome, profile)| (*biome, profile))
    }
}

impl Default for BiomeDefaults {
    fn default() -> Self {
        Self::siberia()
    }
}
