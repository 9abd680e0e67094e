use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use kestrel_fc::arbiter::CommandArbiter;
use kestrel_fc::link::VehicleLink;
use kestrel_proto::telemetry::CaptureMeta;

use crate::camera::Camera;
use crate::store::CaptureStore;

/// Periodic geotagged capture, independent of mission state. A pending
/// GCS interval override is consumed at the top of a cycle and applies
/// from the next period on; an in-progress cycle is never interrupted.
pub async fn run_capture_loop(
    link: Arc<VehicleLink>,
    arbiter: Arc<CommandArbiter>,
    store: CaptureStore,
    camera: Camera,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut period = interval;
    info!("capture scheduler started ({:?} period)", period);
    loop {
        if let Some(new_period) = arbiter.take_camera_interval() {
            info!("camera interval now {:?} (GCS override)", new_period);
            period = new_period;
        }

        if let Err(e) = capture_once(&link, &store, &camera).await {
            warn!("capture cycle failed: {:#}", e);
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("capture scheduler shutting down");
                break;
            }
            _ = tokio::time::sleep(period) => {}
        }
    }
}

async fn capture_once(link: &VehicleLink, store: &CaptureStore, camera: &Camera) -> Result<()> {
    let st = link.snapshot();
    let Some((lat, lon)) = st.position else {
        debug!("capture: position not yet available, skipping cycle");
        return Ok(());
    };

    let jpeg = camera.grab_frame().await?;
    let meta = CaptureMeta {
        latitude: lat,
        longitude: lon,
        altitude: st.rel_alt_m.unwrap_or(0.0),
        timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
    };
    store.save_pair(&meta, &jpeg).await?;
    info!("captured image {} ({} bytes)", meta.timestamp, jpeg.len());
    Ok(())
}
