//! Weight mapping: raw board totals into kilograms and occupant names

use serde::{Deserialize, Serialize};

// Scale settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScaleSettings {
    /// Raw board units per kilogram.
    pub units_per_kg: f64,
    /// Constant correction added after conversion, in kilograms.
    pub tare_offset_kg: f64,
    /// Known occupants and their weight ranges.
    pub occupants: Vec<Occupant>,
    /// Name reported when no occupant range matches.
    pub fallback: String,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            units_per_kg: 100.0,
            tare_offset_kg: 0.0,
            occupants: Vec::new(),
            fallback: "guest".to_string(),
        }
    }
}

/// One known occupant with an inclusive-exclusive weight range.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Occupant {
    pub name: String,
    pub min_kg: f64,
    pub max_kg: f64,
}

/// Converts raw totals and resolves who is standing on the board.
#[derive(Clone, Debug)]
pub struct WeightScale {
    settings: ScaleSettings,
}

impl WeightScale {
    pub fn new(settings: ScaleSettings) -> Self {
        Self { settings }
    }

    pub fn to_kilograms(&self, raw_total: f64) -> f64 {
        raw_total / self.settings.units_per_kg + self.settings.tare_offset_kg
    }

    pub fn classify(&self, kg: f64) -> &str {
        self.settings
            .occupants
            .iter()
            .find(|occupant| kg >= occupant.min_kg && kg < occupant.max_kg)
            .map(|occupant| occupant.name.as_str())
            .unwrap_or(&self.settings.fallback)
    }
}
