use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{info, warn};

use kestrel_uplink::Uplink;

use crate::store::CaptureStore;

/// Sweeps the capture directory and offloads complete pairs. Local files
/// are pruned only on a confirmed ack; every other outcome leaves them
/// for the next sweep. Retries are unbounded with no backoff beyond the
/// sweep period itself.
pub async fn run_upload_loop(
    store: CaptureStore,
    uplink: Arc<Uplink>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("upload agent shutting down");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sweep(&store, &uplink).await {
                    warn!("upload sweep failed: {:#}", e);
                }
            }
        }
    }
}

async fn sweep(store: &CaptureStore, uplink: &Uplink) -> Result<()> {
    for pair in store.complete_pairs().await? {
        let (meta, jpeg) = match store.read_pair(&pair).await {
            Ok(x) => x,
            Err(e) => {
                warn!("skipping unreadable pair {}: {:#}", pair.timestamp, e);
                continue;
            }
        };
        match uplink.upload_capture(&meta, &jpeg).await {
            Ok(true) => {
                if let Err(e) = store.remove_pair(&pair).await {
                    warn!("pruning uploaded pair {} failed: {:#}", pair.timestamp, e);
                }
            }
            Ok(false) => {
                warn!(
                    "backend did not acknowledge capture {}, keeping for retry",
                    pair.timestamp
                );
            }
            Err(e) => {
                warn!(
                    "upload failed for capture {}, keeping for retry: {:#}",
                    pair.timestamp, e
                );
            }
        }
    }
    Ok(())
}
