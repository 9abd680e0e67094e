use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;

use kestrel_proto::telemetry::CaptureMeta;

/// An image and its metadata sidecar sharing a timestamp key.
#[derive(Debug, Clone)]
pub struct CapturePair {
    pub timestamp: i64,
    pub image_path: PathBuf,
    pub meta_path: PathBuf,
}

/// Durable pair storage. Invariants: the image write precedes and gates
/// the sidecar write, and a pair is only ever deleted together, after a
/// confirmed upload.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `<ts>.jpg`, then `<ts>.json`. A failure in between leaves
    /// an orphaned image (which the uploader skips), never an orphaned
    /// sidecar.
    pub async fn save_pair(&self, meta: &CaptureMeta, jpeg: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create capture dir {}", self.dir.display()))?;

        let image_path = self.dir.join(format!("{}.jpg", meta.timestamp));
        fs::write(&image_path, jpeg)
            .await
            .with_context(|| format!("write image {}", image_path.display()))?;

        let meta_path = self.dir.join(format!("{}.json", meta.timestamp));
        let body = serde_json::to_vec(meta)?;
        fs::write(&meta_path, body)
            .await
            .with_context(|| format!("write metadata {}", meta_path.display()))?;
        Ok(())
    }

    /// Images with a matching sidecar, oldest first. An image without its
    /// sidecar is left alone until the sidecar appears.
    pub async fn complete_pairs(&self) -> Result<Vec<CapturePair>> {
        let mut pairs = Vec::new();
        if !self.dir.exists() {
            return Ok(pairs);
        }
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(ent) = entries.next_entry().await? {
            let image_path = ent.path();
            if image_path.extension().and_then(|e| e.to_str()) != Some("jpg") {
                continue;
            }
            let Some(stem) = image_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(timestamp) = stem.parse::<i64>() else {
                continue;
            };
            let meta_path = image_path.with_extension("json");
            if !meta_path.exists() {
                continue;
            }
            pairs.push(CapturePair {
                timestamp,
                image_path,
                meta_path,
            });
        }
        pairs.sort_by_key(|p| p.timestamp);
        Ok(pairs)
    }

    pub async fn read_pair(&self, pair: &CapturePair) -> Result<(CaptureMeta, Vec<u8>)> {
        let meta_bytes = fs::read(&pair.meta_path)
            .await
            .with_context(|| format!("read metadata {}", pair.meta_path.display()))?;
        let meta: CaptureMeta =
            serde_json::from_slice(&meta_bytes).context("parse capture metadata")?;
        let jpeg = fs::read(&pair.image_path)
            .await
            .with_context(|| format!("read image {}", pair.image_path.display()))?;
        Ok((meta, jpeg))
    }

    /// Only called after the backend confirmed receipt.
    pub async fn remove_pair(&self, pair: &CapturePair) -> Result<()> {
        fs::remove_file(&pair.image_path).await?;
        fs::remove_file(&pair.meta_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn meta(ts: i64) -> CaptureMeta {
        CaptureMeta {
            latitude: 45.0,
            longitude: -75.0,
            altitude: 20.0,
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn save_pair_writes_image_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let store = CaptureStore::new(dir.path());
        store.save_pair(&meta(1700000000), b"jpegdata").await.unwrap();
        assert!(dir.path().join("1700000000.jpg").exists());
        assert!(dir.path().join("1700000000.json").exists());
    }

    #[tokio::test]
    async fn failed_image_write_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        // a file where the capture dir should be makes every write fail
        let blocked = dir.path().join("captures");
        std::fs::write(&blocked, b"not a dir").unwrap();
        let store = CaptureStore::new(&blocked);
        assert!(store.save_pair(&meta(1), b"jpegdata").await.is_err());
        assert!(!dir.path().join("captures").is_dir());
    }

    #[tokio::test]
    async fn orphan_image_is_not_a_complete_pair() {
        let dir = TempDir::new().unwrap();
        let store = CaptureStore::new(dir.path());
        store.save_pair(&meta(100), b"a").await.unwrap();
        // simulate a crash between image and sidecar writes
        std::fs::write(dir.path().join("200.jpg"), b"b").unwrap();

        let pairs = store.complete_pairs().await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].timestamp, 100);
    }

    #[tokio::test]
    async fn pairs_come_back_oldest_first() {
        let dir = TempDir::new().unwrap();
        let store = CaptureStore::new(dir.path());
        store.save_pair(&meta(300), b"c").await.unwrap();
        store.save_pair(&meta(100), b"a").await.unwrap();
        store.save_pair(&meta(200), b"b").await.unwrap();
        let ts: Vec<i64> = store
            .complete_pairs()
            .await
            .unwrap()
            .iter()
            .map(|p| p.timestamp)
            .collect();
        assert_eq!(ts, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn read_pair_round_trips_metadata() {
        let dir = TempDir::new().unwrap();
        let store = CaptureStore::new(dir.path());
        store.save_pair(&meta(42), b"jpegdata").await.unwrap();
        let pair = &store.complete_pairs().await.unwrap()[0];
        let (m, jpeg) = store.read_pair(pair).await.unwrap();
        assert_eq!(m.timestamp, 42);
        assert_eq!(m.latitude, 45.0);
        assert_eq!(jpeg, b"jpegdata");
    }

    #[tokio::test]
    async fn remove_pair_deletes_both_files() {
        let dir = TempDir::new().unwrap();
        let store = CaptureStore::new(dir.path());
        store.save_pair(&meta(7), b"x").await.unwrap();
        let pair = store.complete_pairs().await.unwrap().remove(0);
        store.remove_pair(&pair).await.unwrap();
        assert!(!pair.image_path.exists());
        assert!(!pair.meta_path.exists());
    }
}
