pub mod camera;
pub mod doctor;
pub mod scheduler;
pub mod store;
pub mod upload;

use serde::Deserialize;

fn default_interval_secs() -> u64 {
    5
}

fn default_sweep_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Durable directory holding `<ts>.jpg` / `<ts>.json` pairs.
    pub dir: String,

    /// Capture period. The GCS can override it mid-mission.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upload sweep period.
    #[serde(default = "default_sweep_secs")]
    pub sweep_secs: u64,

    pub camera: camera::CameraConfig,
}
