//! Ruptures and per-generation magnitude bounds.

use serde::{Deserialize, Serialize};

/// One earthquake in a simulated catalog.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rupture {
    /// Origin time, days.
    pub t_day: f64,
    pub mag: f64,
    /// Productivity `k` used to draw this rupture's direct children.
    pub k_prod: f64,
    /// Index of the parent within the previous generation; `None` for seeds.
    pub parent: Option<u32>,
    /// Location offset from the catalog origin, km. Carried, not simulated.
    pub x_km: f64,
    pub y_km: f64,
}

impl Rupture {
    /// A parentless seed rupture at the origin.
    pub fn seed(t_day: f64, mag: f64, k_prod: f64) -> Self {
        Self {
            t_day,
            mag,
            k_prod,
            parent: None,
            x_km: 0.0,
            y_km: 0.0,
        }
    }

    /// A child of `parent_index`, inheriting the parent's location.
    pub fn child(t_day: f64, mag: f64, k_prod: f64, parent_index: u32, parent: &Rupture) -> Self {
        Self {
            t_day,
            mag,
            k_prod,
            parent: Some(parent_index),
            x_km: parent.x_km,
            y_km: parent.y_km,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.parent.is_none()
    }
}

/// Magnitude bounds applied while drawing one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    pub gen_mag_min: f64,
    pub gen_mag_max: f64,
}

impl GenerationInfo {
    pub fn new(gen_mag_min: f64, gen_mag_max: f64) -> Self {
        Self {
            gen_mag_min,
            gen_mag_max,
        }
    }
}
