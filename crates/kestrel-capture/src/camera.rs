use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

/// Which capture pipeline drives the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraKind {
    /// Pi camera stack, one still per invocation of `libcamera-still`.
    LibcameraJpeg,
    /// USB cameras exposing MJPEG, one frame pulled through `ffmpeg`.
    V4l2Mjpeg,
}

fn default_device() -> String {
    "/dev/video0".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub kind: CameraKind,
    /// Video device node; only consulted for v4l2 capture.
    #[serde(default = "default_device")]
    pub device: String,
    pub width: u32,
    pub height: u32,
}

/// One camera, one frame at a time. Frames come back in memory so the
/// capture store keeps full control of on-disk ordering; the camera
/// itself never touches the capture directory.
pub struct Camera {
    cfg: CameraConfig,
}

impl Camera {
    pub fn new(cfg: CameraConfig) -> Result<Self> {
        anyhow::ensure!(
            cfg.width > 0 && cfg.height > 0,
            "camera resolution {}x{} invalid",
            cfg.width,
            cfg.height
        );
        Ok(Self { cfg })
    }

    /// Grabs a single JPEG frame at the configured resolution.
    pub async fn grab_frame(&self) -> Result<Vec<u8>> {
        let mut cmd = self.capture_command();
        debug!("camera: spawning {:?}", cmd.as_std().get_program());
        let out = cmd.output().await.context("spawn capture process")?;
        if !out.status.success() {
            anyhow::bail!(
                "capture process exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            );
        }
        anyhow::ensure!(!out.stdout.is_empty(), "capture process produced no frame");
        Ok(out.stdout)
    }

    fn capture_command(&self) -> Command {
        let (w, h) = (self.cfg.width.to_string(), self.cfg.height.to_string());
        match self.cfg.kind {
            CameraKind::LibcameraJpeg => {
                // -n: no preview; -t 1: shortest settle; frame on stdout
                let mut cmd = Command::new("libcamera-still");
                cmd.args(["-n", "-t", "1"])
                    .args(["--width", &w, "--height", &h])
                    .args(["-o", "-"]);
                cmd
            }
            CameraKind::V4l2Mjpeg => {
                let mut cmd = Command::new("ffmpeg");
                cmd.args(["-hide_banner", "-loglevel", "error"])
                    .args(["-f", "video4linux2", "-input_format", "mjpeg"])
                    .args(["-video_size", &format!("{}x{}", w, h)])
                    .args(["-i", &self.cfg.device])
                    .args(["-vframes", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "-"]);
                cmd
            }
        }
    }
}
