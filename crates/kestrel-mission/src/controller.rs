use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use kestrel_fc::arbiter::{CommandArbiter, Directive};
use kestrel_fc::link::VehicleLink;
use kestrel_fc::state::{FlightMode, VehicleState};

use crate::waypoints::Waypoint;
use crate::MissionConfig;

/// Control-cycle period for every mission poll loop.
const MISSION_POLL: Duration = Duration::from_secs(2);
/// The arm confirmation is polled faster than the rest of the mission.
const ARM_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Arming,
    Takeoff,
    Cruise,
    Paused,
    Override,
    Rtl,
    Land,
    Terminated,
}

/// How a waypoint transit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    Reached,
    Interrupted,
    BatteryLow,
}

/// Terminal outcome of the mission path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionEnd {
    Completed,
    ReturnToLaunch,
    Landed,
}

enum Flow {
    Resume,
    End(MissionEnd),
}

/// Drives the vehicle through the waypoint sequence, consulting the
/// arbiter every cycle and enforcing the battery interrupt. Owns its
/// index/phase state exclusively; telemetry comes from the shared link.
pub struct MissionController {
    link: Arc<VehicleLink>,
    arbiter: Arc<CommandArbiter>,
    cfg: MissionConfig,
    waypoints: Vec<Waypoint>,
    index: usize,
    phase: Phase,
    last_voltage: Option<f32>,
}

impl MissionController {
    pub fn new(
        link: Arc<VehicleLink>,
        arbiter: Arc<CommandArbiter>,
        cfg: MissionConfig,
        waypoints: Vec<Waypoint>,
    ) -> Self {
        Self {
            link,
            arbiter,
            cfg,
            waypoints,
            index: 0,
            phase: Phase::Arming,
            last_voltage: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn run(mut self) -> Result<MissionEnd> {
        if let Some(end) = self.arm_and_climb().await? {
            self.phase = Phase::Terminated;
            return Ok(end);
        }
        let end = self.follow_waypoints().await?;
        self.phase = Phase::Terminated;
        debug!("mission path terminated: {:?}", end);
        Ok(end)
    }

    /// Folds the latest RC sample into the arbiter, then resolves the
    /// directive for this cycle.
    fn current_directive(&self) -> Directive {
        self.arbiter.poll_radio_channel(self.link.rc_override_value());
        self.arbiter.active_directive()
    }

    /// Blocks until armed and at 95% of the target altitude. Returns
    /// Some(end) when an override escalated to a terminal mode during the
    /// climb; the climb must never mask overrides.
    async fn arm_and_climb(&mut self) -> Result<Option<MissionEnd>> {
        self.phase = Phase::Arming;
        loop {
            if self.link.snapshot().prearm_ok == Some(true) {
                break;
            }
            info!("waiting for vehicle to become armable");
            sleep(MISSION_POLL).await;
        }

        self.link.set_mode(FlightMode::Guided)?;
        self.link.arm()?;
        while !self.link.snapshot().armed {
            info!("waiting for arm");
            sleep(ARM_POLL).await;
        }

        self.phase = Phase::Takeoff;
        info!("taking off to {} m", self.cfg.takeoff_alt_m);
        self.link.takeoff(self.cfg.takeoff_alt_m)?;
        loop {
            let alt = self.link.snapshot().rel_alt_m.unwrap_or(0.0);
            if alt >= self.cfg.takeoff_alt_m * 0.95 {
                info!("reached target altitude");
                break;
            }
            let d = self.current_directive();
            if d != Directive::Mission {
                warn!("climb aborted by {:?}", d);
                return match self.handle_interrupt(d).await? {
                    Flow::Resume => Ok(None),
                    Flow::End(end) => Ok(Some(end)),
                };
            }
            sleep(MISSION_POLL).await;
        }
        self.phase = Phase::Cruise;
        Ok(None)
    }

    async fn follow_waypoints(&mut self) -> Result<MissionEnd> {
        let total = self.waypoints.len();
        while self.index < total {
            let d = self.current_directive();
            if d != Directive::Mission {
                match self.handle_interrupt(d).await? {
                    Flow::Resume => continue,
                    Flow::End(end) => return Ok(end),
                }
            }

            let wp = self.waypoints[self.index];
            info!("heading to waypoint {}/{}", self.index + 1, total);
            self.link
                .goto_waypoint(wp.lat, wp.lon, wp.alt_m, self.cfg.cruise_speed_ms)?;

            match self.wait_for_arrival(&wp).await? {
                Arrival::Reached => {
                    let skip = self.arbiter.take_skip_waypoint();
                    if skip {
                        info!("skipping next waypoint per GCS request");
                    }
                    self.index = next_waypoint_index(self.index, skip);
                }
                Arrival::BatteryLow => {
                    warn!("battery low ({:?} V), returning to launch", self.last_voltage);
                    self.link.set_mode(FlightMode::Rtl)?;
                    self.phase = Phase::Rtl;
                    return Ok(MissionEnd::ReturnToLaunch);
                }
                Arrival::Interrupted => continue,
            }
        }

        info!("all waypoints completed, returning to launch");
        self.link.set_mode(FlightMode::Rtl)?;
        self.phase = Phase::Rtl;
        Ok(MissionEnd::Completed)
    }

    /// Polls directive and telemetry each cycle until the waypoint is
    /// reached, the battery drops below the floor, or an override takes
    /// the cycle. Missing telemetry just means "not yet available".
    async fn wait_for_arrival(&mut self, wp: &Waypoint) -> Result<Arrival> {
        loop {
            if self.current_directive() != Directive::Mission {
                return Ok(Arrival::Interrupted);
            }
            let st = self.link.snapshot();
            self.last_voltage = st.battery_voltage.or(self.last_voltage);
            if let Some(arrival) = transit_status(&st, wp, &self.cfg) {
                if arrival == Arrival::Reached {
                    info!("waypoint reached");
                }
                return Ok(arrival);
            }
            sleep(MISSION_POLL).await;
        }
    }

    /// Dispatches a non-mission directive until it either resumes cruise
    /// or ends the mission in a terminal mode.
    async fn handle_interrupt(&mut self, first: Directive) -> Result<Flow> {
        let mut d = first;
        loop {
            d = match d {
                Directive::Mission => {
                    info!("resuming mission");
                    self.link.set_mode(FlightMode::Guided)?;
                    self.phase = Phase::Cruise;
                    return Ok(Flow::Resume);
                }
                Directive::Pause => self.pause_and_wait().await?,
                Directive::RcOverride => self.handle_override().await?,
                Directive::ReturnToLaunch => {
                    info!("return to launch commanded");
                    self.link.set_mode(FlightMode::Rtl)?;
                    self.phase = Phase::Rtl;
                    return Ok(Flow::End(MissionEnd::ReturnToLaunch));
                }
                Directive::Land => {
                    info!("landing commanded");
                    self.link.set_mode(FlightMode::Land)?;
                    self.phase = Phase::Land;
                    return Ok(Flow::End(MissionEnd::Landed));
                }
            };
        }
    }

    /// Holds position until the pause clears; returns the directive that
    /// ended the wait.
    async fn pause_and_wait(&mut self) -> Result<Directive> {
        self.phase = Phase::Paused;
        info!("mission paused, holding position");
        self.link.set_mode(FlightMode::Loiter)?;
        loop {
            sleep(MISSION_POLL).await;
            let d = self.current_directive();
            if d != Directive::Pause {
                return Ok(d);
            }
        }
    }

    /// Holds position while the pilot has the sticks; returns the next
    /// directive once the override channel releases.
    async fn handle_override(&mut self) -> Result<Directive> {
        self.phase = Phase::Override;
        info!("RC override active, deferring to pilot");
        self.link.set_mode(FlightMode::Loiter)?;
        loop {
            sleep(MISSION_POLL).await;
            let d = self.current_directive();
            if d != Directive::RcOverride {
                return Ok(d);
            }
        }
    }
}

/// Planar approximation, meters. Only valid over short ranges; the reach
/// thresholds are calibrated against this, so do not swap in a geodesic
/// distance without re-checking them.
pub fn planar_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat1 - lat2) * 111_139.0;
    let dlon = (lon1 - lon2) * 111_139.0;
    (dlat * dlat + dlon * dlon).sqrt()
}

fn next_waypoint_index(current: usize, skip: bool) -> usize {
    if skip {
        current + 2
    } else {
        current + 1
    }
}

/// Pure per-cycle transit assessment: battery first, then reach.
/// None means keep waiting.
fn transit_status(st: &VehicleState, wp: &Waypoint, cfg: &MissionConfig) -> Option<Arrival> {
    if let Some(v) = st.battery_voltage {
        if v < cfg.battery_low_v {
            return Some(Arrival::BatteryLow);
        }
    }
    let (lat, lon) = st.position?;
    if planar_distance_m(lat, lon, wp.lat, wp.lon) < cfg.reach_threshold_m {
        Some(Arrival::Reached)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MissionConfig {
        MissionConfig {
            mission_file: String::new(),
            takeoff_alt_m: 20.0,
            cruise_speed_ms: 3.0,
            reach_threshold_m: 2.0,
            battery_low_v: 10.5,
        }
    }

    fn state(position: Option<(f64, f64)>, voltage: Option<f32>) -> VehicleState {
        VehicleState {
            position,
            battery_voltage: voltage,
            ..VehicleState::default()
        }
    }

    const WP: Waypoint = Waypoint {
        lat: 45.001,
        lon: -75.001,
        alt_m: 20.0,
    };

    #[test]
    fn distance_is_zero_at_target() {
        assert_eq!(planar_distance_m(45.001, -75.001, WP.lat, WP.lon), 0.0);
    }

    #[test]
    fn distance_half_millidegree_diagonal() {
        // sqrt((0.0005*111139)^2 * 2) ~= 78.6 m
        let d = planar_distance_m(45.0005, -75.0005, WP.lat, WP.lon);
        assert!((d - 78.59).abs() < 0.1, "d = {}", d);
    }

    #[test]
    fn at_target_is_reached() {
        let st = state(Some((45.001, -75.001)), Some(12.0));
        assert_eq!(transit_status(&st, &WP, &cfg()), Some(Arrival::Reached));
    }

    #[test]
    fn half_millidegree_away_is_not_reached() {
        let st = state(Some((45.0005, -75.0005)), Some(12.0));
        assert_eq!(transit_status(&st, &WP, &cfg()), None);
    }

    #[test]
    fn battery_low_wins_even_at_target() {
        let st = state(Some((45.001, -75.001)), Some(10.4));
        assert_eq!(transit_status(&st, &WP, &cfg()), Some(Arrival::BatteryLow));
    }

    #[test]
    fn unknown_battery_is_not_low() {
        let st = state(Some((44.9, -74.9)), None);
        assert_eq!(transit_status(&st, &WP, &cfg()), None);
    }

    #[test]
    fn missing_position_keeps_waiting() {
        let st = state(None, Some(12.0));
        assert_eq!(transit_status(&st, &WP, &cfg()), None);
    }

    #[test]
    fn skip_advances_by_two() {
        assert_eq!(next_waypoint_index(0, true), 2);
        assert_eq!(next_waypoint_index(0, false), 1);
        assert_eq!(next_waypoint_index(3, true), 5);
    }
}
