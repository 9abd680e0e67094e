pub mod controller;
pub mod doctor;
pub mod waypoints;

use serde::Deserialize;

fn default_takeoff_alt_m() -> f64 {
    20.0
}

fn default_cruise_speed_ms() -> f32 {
    3.0
}

fn default_reach_threshold_m() -> f64 {
    2.0
}

fn default_battery_low_v() -> f32 {
    10.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    /// Path to the TOML mission file with the ordered waypoint list.
    pub mission_file: String,

    #[serde(default = "default_takeoff_alt_m")]
    pub takeoff_alt_m: f64,

    #[serde(default = "default_cruise_speed_ms")]
    pub cruise_speed_ms: f32,

    /// Planar distance below which a waypoint counts as reached.
    #[serde(default = "default_reach_threshold_m")]
    pub reach_threshold_m: f64,

    /// Battery voltage below which transit is abandoned for RTL.
    #[serde(default = "default_battery_low_v")]
    pub battery_low_v: f32,
}
