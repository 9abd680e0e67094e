use serde::{Deserialize, Serialize};

/// One periodic position/power sample posted by the telemetry reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub ts_unix: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub battery_voltage: Option<f32>,
}

/// Sidecar record written next to every captured image. The shared
/// timestamp is the pairing key on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureMeta {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub timestamp: i64,
}
