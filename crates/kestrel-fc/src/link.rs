use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use mavlink::common::{
    MavAutopilot, MavCmd, MavFrame, MavMessage, MavModeFlag, MavState, MavSysStatusSensor,
    MavType, COMMAND_INT_DATA, COMMAND_LONG_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA,
    RC_CHANNELS_DATA, SYS_STATUS_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use crate::arbiter::CommandArbiter;
use crate::state::{FlightMode, VehicleState};
use crate::FcConfig;

/// The one shared handle to the autopilot: telemetry snapshot reads and
/// mode/arm/takeoff/goto writes. Sends are serialized through the header
/// mutex; state updates come from the blocking reader pump.
pub struct VehicleLink {
    conn: Box<dyn MavConnection<MavMessage> + Sync + Send>,
    hdr: Mutex<MavHeader>,
    state: Mutex<VehicleState>,
    target_sys: u8,
    target_comp: u8,
    rc_override_channel: u8,
    hb_interval: Duration,
}

impl VehicleLink {
    pub fn open(cfg: &FcConfig) -> Result<Self> {
        // quick validate device
        let _ = tokio_serial::new(&cfg.serial_dev, cfg.baud)
            .open_native_async()
            .with_context(|| format!("open fc serial device {}", cfg.serial_dev))?;

        let url = format!("serial:{}:{}", cfg.serial_dev, cfg.baud);
        let conn = mavlink::connect::<MavMessage>(&url)
            .with_context(|| format!("mavlink connect {}", url))?;

        let hb_hz = cfg.send_heartbeat_hz.max(0.2);
        Ok(Self {
            conn,
            hdr: Mutex::new(MavHeader {
                system_id: cfg.sys_id,
                component_id: cfg.comp_id,
                sequence: 0,
            }),
            state: Mutex::new(VehicleState::default()),
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            rc_override_channel: cfg.rc_override_channel,
            hb_interval: Duration::from_secs_f32(1.0 / hb_hz),
        })
    }

    pub fn snapshot(&self) -> VehicleState {
        self.state.lock().unwrap().clone()
    }

    /// Current raw value of the configured pilot-takeover RC channel.
    pub fn rc_override_value(&self) -> Option<u16> {
        self.state.lock().unwrap().rc_override_value
    }

    /// Blocking reader loop. Updates the shared snapshot, routes inbound
    /// COMMAND_LONGs to the arbiter, and sends the companion heartbeat.
    /// Returns Err only when the link itself is gone; the caller treats
    /// that as fatal to the mission.
    pub fn pump(&self, arbiter: &CommandArbiter, stop: &AtomicBool) -> Result<()> {
        let mut last_hb_send = Instant::now();
        while !stop.load(Ordering::Relaxed) {
            if last_hb_send.elapsed() >= self.hb_interval {
                let _ = self.send_heartbeat();
                last_hb_send = Instant::now();
            }

            match self.recv_once()? {
                Some(msg) => {
                    self.note_message(&msg);
                    if let MavMessage::COMMAND_LONG(cl) = &msg {
                        arbiter.record_inbound_command(cl);
                    }
                }
                None => std::thread::sleep(Duration::from_millis(10)),
            }
        }
        Ok(())
    }

    fn recv_once(&self) -> Result<Option<MavMessage>> {
        match self.conn.recv() {
            Ok((_hdr, msg)) => Ok(Some(msg)),
            Err(MessageReadError::Io(e))
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(MessageReadError::Io(e)) => {
                Err(anyhow::Error::new(e).context("flight controller link read"))
            }
            Err(MessageReadError::Parse(e)) => {
                debug!("mavlink parse error (ignored): {:?}", e);
                Ok(None)
            }
        }
    }

    fn note_message(&self, msg: &MavMessage) {
        let mut st = self.state.lock().unwrap();
        match msg {
            MavMessage::HEARTBEAT(hb) => {
                st.connected = true;
                st.last_heartbeat = Some(Instant::now());
                st.armed = hb
                    .base_mode
                    .contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                st.custom_mode = Some(hb.custom_mode);
            }
            MavMessage::SYS_STATUS(status) => self.note_sys_status(&mut st, status),
            MavMessage::GLOBAL_POSITION_INT(pos) => self.note_position(&mut st, pos),
            MavMessage::RC_CHANNELS(rc) => {
                if let Some(v) = channel_value(rc, self.rc_override_channel) {
                    st.rc_override_value = Some(v);
                }
            }
            _ => {}
        }
    }

    fn note_sys_status(&self, st: &mut VehicleState, status: &SYS_STATUS_DATA) {
        // voltage_battery is millivolts, u16::MAX means unknown
        if status.voltage_battery != u16::MAX {
            st.battery_voltage = Some(status.voltage_battery as f32 / 1000.0);
        }
        st.prearm_ok = Some(
            status
                .onboard_control_sensors_health
                .contains(MavSysStatusSensor::MAV_SYS_STATUS_PREARM_CHECK),
        );
    }

    fn note_position(&self, st: &mut VehicleState, pos: &GLOBAL_POSITION_INT_DATA) {
        st.position = Some((pos.lat as f64 / 1e7, pos.lon as f64 / 1e7));
        st.rel_alt_m = Some(pos.relative_alt as f64 / 1000.0);
    }

    pub fn send_heartbeat(&self) -> Result<()> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(MavMessage::HEARTBEAT(hb))
    }

    pub fn set_mode(&self, mode: FlightMode) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command: MavCmd::MAV_CMD_DO_SET_MODE,
            confirmation: 0,
            param1: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED.bits() as f32,
            param2: mode.custom_mode() as f32,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        };
        info!("FC: set mode {:?}", mode);
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn arm(&self) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command: MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            confirmation: 0,
            param1: 1.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
        };
        info!("FC: arming");
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    pub fn takeoff(&self, alt_m: f64) -> Result<()> {
        let cmd = COMMAND_LONG_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            command: MavCmd::MAV_CMD_NAV_TAKEOFF,
            confirmation: 0,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: alt_m as f32,
        };
        info!("FC: takeoff to {} m", alt_m);
        self.send(MavMessage::COMMAND_LONG(cmd))
    }

    /// Guided-mode reposition toward a waypoint. Scaled-int coordinates
    /// keep full lat/lon precision; cruise speed rides in param1.
    pub fn goto_waypoint(&self, lat: f64, lon: f64, alt_m: f64, groundspeed_ms: f32) -> Result<()> {
        let cmd = COMMAND_INT_DATA {
            target_system: self.target_sys,
            target_component: self.target_comp,
            frame: MavFrame::MAV_FRAME_GLOBAL_RELATIVE_ALT_INT,
            command: MavCmd::MAV_CMD_DO_REPOSITION,
            current: 0,
            autocontinue: 0,
            param1: groundspeed_ms,
            param2: 0.0,
            param3: 0.0,
            param4: f32::NAN,
            x: (lat * 1e7) as i32,
            y: (lon * 1e7) as i32,
            z: alt_m as f32,
        };
        info!("FC: goto {:.6},{:.6} alt {} m", lat, lon, alt_m);
        self.send(MavMessage::COMMAND_INT(cmd))
    }

    fn send(&self, msg: MavMessage) -> Result<()> {
        let mut hdr = self.hdr.lock().unwrap();
        hdr.sequence = hdr.sequence.wrapping_add(1);
        self.conn.send(&hdr, &msg).context("mavlink send")?;
        Ok(())
    }
}

fn channel_value(rc: &RC_CHANNELS_DATA, channel: u8) -> Option<u16> {
    if channel == 0 || channel > rc.chancount {
        return None;
    }
    let raw = match channel {
        1 => rc.chan1_raw,
        2 => rc.chan2_raw,
        3 => rc.chan3_raw,
        4 => rc.chan4_raw,
        5 => rc.chan5_raw,
        6 => rc.chan6_raw,
        7 => rc.chan7_raw,
        8 => rc.chan8_raw,
        9 => rc.chan9_raw,
        10 => rc.chan10_raw,
        11 => rc.chan11_raw,
        12 => rc.chan12_raw,
        13 => rc.chan13_raw,
        14 => rc.chan14_raw,
        15 => rc.chan15_raw,
        16 => rc.chan16_raw,
        17 => rc.chan17_raw,
        18 => rc.chan18_raw,
        _ => return None,
    };
    // UINT16_MAX marks a channel the receiver does not report
    if raw == u16::MAX {
        None
    } else {
        Some(raw)
    }
}
