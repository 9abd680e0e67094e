use anyhow::Result;

use crate::waypoints;
use crate::MissionConfig;

pub fn check_mission(cfg: &MissionConfig) -> Result<()> {
    let wps = waypoints::load(&cfg.mission_file)?;
    anyhow::ensure!(cfg.takeoff_alt_m > 0.0, "mission.takeoff_alt_m must be positive");
    anyhow::ensure!(cfg.cruise_speed_ms > 0.0, "mission.cruise_speed_ms must be positive");
    anyhow::ensure!(cfg.reach_threshold_m > 0.0, "mission.reach_threshold_m must be positive");
    anyhow::ensure!(cfg.battery_low_v > 0.0, "mission.battery_low_v must be positive");
    tracing::info!("doctor: mission file OK ({} waypoints)", wps.len());
    Ok(())
}
