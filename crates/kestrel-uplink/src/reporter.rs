use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kestrel_fc::link::VehicleLink;
use kestrel_fc::state::VehicleState;
use kestrel_proto::telemetry::TelemetryReport;

use crate::Uplink;

/// One sample from the current snapshot, or None until the vehicle has
/// reported a position.
pub fn build_report(st: &VehicleState) -> Option<TelemetryReport> {
    let (lat, lon) = st.position?;
    Some(TelemetryReport {
        ts_unix: time::OffsetDateTime::now_utc().unix_timestamp(),
        latitude: lat,
        longitude: lon,
        altitude_m: st.rel_alt_m.unwrap_or(0.0),
        battery_voltage: st.battery_voltage,
    })
}

/// Fire-and-forget position/power reporting. A failed post is dropped;
/// the next period's sample supersedes it.
pub async fn run_telemetry_loop(
    link: Arc<VehicleLink>,
    uplink: Arc<Uplink>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("telemetry reporter shutting down");
                break;
            }
            _ = ticker.tick() => {
                match build_report(&link.snapshot()) {
                    Some(report) => {
                        if let Err(e) = uplink.send_telemetry(&report).await {
                            warn!("telemetry post failed (sample dropped): {:#}", e);
                        }
                    }
                    None => debug!("telemetry: position not yet available"),
                }
            }
        }
    }
}

/// Lets the backend know the vehicle is alive. Same fire-and-forget
/// semantics as the telemetry loop.
pub async fn run_heartbeat_loop(
    uplink: Arc<Uplink>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("heartbeat loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = uplink.send_heartbeat().await {
                    warn!("heartbeat failed: {:#}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_report_before_first_position() {
        assert!(build_report(&VehicleState::default()).is_none());
    }

    #[test]
    fn report_carries_snapshot_fields() {
        let st = VehicleState {
            position: Some((45.0, -75.0)),
            rel_alt_m: Some(18.5),
            battery_voltage: Some(11.7),
            ..VehicleState::default()
        };
        let r = build_report(&st).unwrap();
        assert_eq!(r.latitude, 45.0);
        assert_eq!(r.longitude, -75.0);
        assert_eq!(r.altitude_m, 18.5);
        assert_eq!(r.battery_voltage, Some(11.7));
    }
}
