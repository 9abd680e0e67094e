pub mod arbiter;
pub mod link;
pub mod state;

use serde::Deserialize;

fn default_rc_override_channel() -> u8 {
    7
}

fn default_send_heartbeat_hz() -> f32 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    /// Serial device of the autopilot link, e.g. /dev/serial0.
    pub serial_dev: String,
    pub baud: u32,

    /// MAVLink ids we use (companion side).
    pub sys_id: u8,
    pub comp_id: u8,

    /// Target system/component (autopilot side). 1/1 is common for ArduPilot.
    pub target_sys: u8,
    pub target_comp: u8,

    /// RC channel sampled for pilot-takeover detection.
    #[serde(default = "default_rc_override_channel")]
    pub rc_override_channel: u8,

    /// Companion heartbeat rate.
    #[serde(default = "default_send_heartbeat_hz")]
    pub send_heartbeat_hz: f32,
}
