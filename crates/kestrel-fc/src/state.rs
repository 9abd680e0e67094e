use std::time::{Duration, Instant};

/// ArduPilot copter custom-mode numbers for the modes the mission core
/// commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightMode {
    Guided,
    Loiter,
    Rtl,
    Land,
}

impl FlightMode {
    pub fn custom_mode(self) -> u32 {
        match self {
            FlightMode::Guided => 4,
            FlightMode::Loiter => 5,
            FlightMode::Rtl => 6,
            FlightMode::Land => 9,
        }
    }
}

/// Last-known vehicle telemetry, updated by the link reader and read as a
/// snapshot by every worker. `None` means "not yet reported" and callers
/// retry on their next cycle.
#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    pub connected: bool,
    pub armed: bool,
    pub prearm_ok: Option<bool>,
    pub position: Option<(f64, f64)>,
    pub rel_alt_m: Option<f64>,
    pub battery_voltage: Option<f32>,
    pub rc_override_value: Option<u16>,
    pub custom_mode: Option<u32>,
    pub last_heartbeat: Option<Instant>,
}

impl VehicleState {
    pub fn hb_age(&self) -> Option<Duration> {
        self.last_heartbeat.map(|t| t.elapsed())
    }
}
