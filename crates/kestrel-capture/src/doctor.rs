use std::path::Path;

use anyhow::Result;

use crate::camera::Camera;
use crate::CaptureConfig;

pub fn check_capture(cfg: &CaptureConfig) -> Result<()> {
    let p = Path::new(&cfg.dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "capture.dir is not a dir: {}", cfg.dir);
    }
    anyhow::ensure!(cfg.interval_secs > 0, "capture.interval_secs must be positive");
    anyhow::ensure!(cfg.sweep_secs > 0, "capture.sweep_secs must be positive");
    // resolution checks live with the camera
    Camera::new(cfg.camera.clone())?;
    Ok(())
}
