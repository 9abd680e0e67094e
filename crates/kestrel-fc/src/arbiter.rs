use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use mavlink::common::{MavCmd, COMMAND_LONG_DATA};
use tracing::{debug, info};

use crate::state::FlightMode;

/// RC pulse width above which the pilot is considered to have taken over.
pub const RC_OVERRIDE_THRESHOLD_US: u16 = 1800;

/// COMPONENT_ARM_DISARM force-sentinel the ground station sends to demand
/// an immediate landing.
const FORCE_LAND_SENTINEL: i32 = 21196;

/// DO_SET_PARAMETER id reserved for the camera capture interval.
const CAMERA_INTERVAL_PARAM_ID: i32 = 999;

/// The one resolved command governing the mission controller this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Mission,
    RcOverride,
    Pause,
    ReturnToLaunch,
    Land,
}

/// Authoritative override state, fed from two independent sources: the
/// inbound ground-control command stream and the local RC channel poll.
/// Every field is individually synchronized; `skip_next_waypoint` and
/// `camera_interval_override` are one-shot (consumed by the first read).
pub struct CommandArbiter {
    pause_requested: AtomicBool,
    skip_next_waypoint: AtomicBool,
    return_to_launch_requested: AtomicBool,
    land_requested: AtomicBool,
    rc_override_active: AtomicBool,
    camera_interval_override: Mutex<Option<Duration>>,
}

impl Default for CommandArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandArbiter {
    pub fn new() -> Self {
        Self {
            pause_requested: AtomicBool::new(false),
            skip_next_waypoint: AtomicBool::new(false),
            return_to_launch_requested: AtomicBool::new(false),
            land_requested: AtomicBool::new(false),
            rc_override_active: AtomicBool::new(false),
            camera_interval_override: Mutex::new(None),
        }
    }

    /// Applies one inbound COMMAND_LONG from the ground station.
    /// Unrecognized codes are ignored, never fatal.
    pub fn record_inbound_command(&self, cmd: &COMMAND_LONG_DATA) {
        match cmd.command {
            MavCmd::MAV_CMD_NAV_LOITER_UNLIM => {
                info!("GCS command: loiter unlimited (pause mission)");
                self.pause_requested.store(true, Ordering::SeqCst);
            }
            MavCmd::MAV_CMD_DO_JUMP => {
                info!("GCS command: do-jump (skip next waypoint)");
                self.skip_next_waypoint.store(true, Ordering::SeqCst);
            }
            MavCmd::MAV_CMD_DO_SET_MODE => {
                // Deliberately our outbound RTL mode number (6), not the
                // bare 5 legacy ground tooling sent for this transition:
                // inbound and outbound must agree on what "RTL" is.
                if cmd.param2 as u32 == FlightMode::Rtl.custom_mode() {
                    info!("GCS command: set mode RTL");
                    self.return_to_launch_requested.store(true, Ordering::SeqCst);
                }
            }
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM => {
                if cmd.param2 as i32 == FORCE_LAND_SENTINEL {
                    info!("GCS command: emergency land");
                    self.land_requested.store(true, Ordering::SeqCst);
                }
            }
            MavCmd::MAV_CMD_DO_SET_PARAMETER => {
                if cmd.param1 as i32 == CAMERA_INTERVAL_PARAM_ID && cmd.param2 > 0.0 {
                    let interval = Duration::from_secs(cmd.param2 as u64);
                    info!("GCS command: camera interval override {:?}", interval);
                    *self.camera_interval_override.lock().unwrap() = Some(interval);
                }
            }
            MavCmd::MAV_CMD_DO_PAUSE_CONTINUE => {
                if cmd.param1 as i32 == 1 {
                    info!("GCS command: continue (resume mission)");
                    self.pause_requested.store(false, Ordering::SeqCst);
                } else {
                    info!("GCS command: pause");
                    self.pause_requested.store(true, Ordering::SeqCst);
                }
            }
            other => debug!("ignoring GCS command {:?}", other),
        }
    }

    /// Folds the latest RC channel sample into the override flag. A
    /// missing sample (receiver not reporting yet) leaves it unchanged.
    pub fn poll_radio_channel(&self, sample: Option<u16>) {
        if let Some(v) = sample {
            self.rc_override_active
                .store(v > RC_OVERRIDE_THRESHOLD_US, Ordering::SeqCst);
        }
    }

    /// Pure resolution over current flags. Precedence, highest first:
    /// RC override > return-to-launch > land > pause > mission. A pilot
    /// physically on the sticks outranks everything remote or autonomous.
    pub fn active_directive(&self) -> Directive {
        if self.rc_override_active.load(Ordering::SeqCst) {
            Directive::RcOverride
        } else if self.return_to_launch_requested.load(Ordering::SeqCst) {
            Directive::ReturnToLaunch
        } else if self.land_requested.load(Ordering::SeqCst) {
            Directive::Land
        } else if self.pause_requested.load(Ordering::SeqCst) {
            Directive::Pause
        } else {
            Directive::Mission
        }
    }

    /// One-shot: true exactly once per skip request.
    pub fn take_skip_waypoint(&self) -> bool {
        self.skip_next_waypoint.swap(false, Ordering::SeqCst)
    }

    /// One-shot: the pending interval override, if any, consumed.
    pub fn take_camera_interval(&self) -> Option<Duration> {
        self.camera_interval_override.lock().unwrap().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cl(command: MavCmd, param1: f32, param2: f32) -> COMMAND_LONG_DATA {
        COMMAND_LONG_DATA {
            target_system: 1,
            target_component: 1,
            command,
            confirmation: 0,
            param1,
            param2,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        }
    }

    #[test]
    fn default_directive_is_mission() {
        let a = CommandArbiter::new();
        assert_eq!(a.active_directive(), Directive::Mission);
    }

    #[test]
    fn precedence_over_all_flag_combinations() {
        // rc > rtl > land > pause > mission, for every combination
        for bits in 0u8..16 {
            let a = CommandArbiter::new();
            let rc = bits & 1 != 0;
            let rtl = bits & 2 != 0;
            let land = bits & 4 != 0;
            let pause = bits & 8 != 0;

            a.rc_override_active.store(rc, Ordering::SeqCst);
            a.return_to_launch_requested.store(rtl, Ordering::SeqCst);
            a.land_requested.store(land, Ordering::SeqCst);
            a.pause_requested.store(pause, Ordering::SeqCst);

            let expected = if rc {
                Directive::RcOverride
            } else if rtl {
                Directive::ReturnToLaunch
            } else if land {
                Directive::Land
            } else if pause {
                Directive::Pause
            } else {
                Directive::Mission
            };
            assert_eq!(a.active_directive(), expected, "bits={:#06b}", bits);
        }
    }

    #[test]
    fn pause_plus_rtl_yields_rtl() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_NAV_LOITER_UNLIM, 0.0, 0.0));
        a.record_inbound_command(&cl(
            MavCmd::MAV_CMD_DO_SET_MODE,
            1.0,
            FlightMode::Rtl.custom_mode() as f32,
        ));
        assert_eq!(a.active_directive(), Directive::ReturnToLaunch);
    }

    #[test]
    fn skip_is_read_and_clear() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_JUMP, 0.0, 0.0));
        assert!(a.take_skip_waypoint());
        assert!(!a.take_skip_waypoint());
    }

    #[test]
    fn camera_interval_is_read_and_clear() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_SET_PARAMETER, 999.0, 12.0));
        assert_eq!(a.take_camera_interval(), Some(Duration::from_secs(12)));
        assert_eq!(a.take_camera_interval(), None);
    }

    #[test]
    fn camera_interval_rejects_wrong_id_and_nonpositive() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_SET_PARAMETER, 7.0, 12.0));
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_SET_PARAMETER, 999.0, 0.0));
        assert_eq!(a.take_camera_interval(), None);
    }

    #[test]
    fn set_mode_only_triggers_rtl_for_rtl_mode() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(
            MavCmd::MAV_CMD_DO_SET_MODE,
            1.0,
            FlightMode::Loiter.custom_mode() as f32,
        ));
        assert_eq!(a.active_directive(), Directive::Mission);
    }

    #[test]
    fn arm_disarm_needs_force_sentinel() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, 0.0, 0.0));
        assert_eq!(a.active_directive(), Directive::Mission);
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, 0.0, 21196.0));
        assert_eq!(a.active_directive(), Directive::Land);
    }

    #[test]
    fn continue_clears_pause() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_NAV_LOITER_UNLIM, 0.0, 0.0));
        assert_eq!(a.active_directive(), Directive::Pause);
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_PAUSE_CONTINUE, 1.0, 0.0));
        assert_eq!(a.active_directive(), Directive::Mission);
    }

    #[test]
    fn unrecognized_command_is_ignored() {
        let a = CommandArbiter::new();
        a.record_inbound_command(&cl(MavCmd::MAV_CMD_DO_SET_ROI, 0.0, 0.0));
        assert_eq!(a.active_directive(), Directive::Mission);
        assert!(!a.take_skip_waypoint());
    }

    #[test]
    fn rc_poll_sets_and_clears_threshold_flag() {
        let a = CommandArbiter::new();
        a.poll_radio_channel(Some(1900));
        assert_eq!(a.active_directive(), Directive::RcOverride);
        a.poll_radio_channel(Some(1500));
        assert_eq!(a.active_directive(), Directive::Mission);
        // missing sample leaves the flag untouched
        a.poll_radio_channel(Some(1900));
        a.poll_radio_channel(None);
        assert_eq!(a.active_directive(), Directive::RcOverride);
    }
}
