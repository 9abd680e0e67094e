pub mod doctor;
pub mod reporter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rustls::{ClientConfig, RootCertStore};
use rustls_pki_types::ServerName;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::info;

use kestrel_proto::backend::{BackendAck, BackendRequest};
use kestrel_proto::telemetry::{CaptureMeta, TelemetryReport};

/// Backend replies are small JSON bodies; anything bigger is a protocol
/// violation, not a response.
const MAX_ACK_BYTES: u32 = 64 * 1024;

fn default_role() -> String {
    "drone".into()
}

fn default_request_timeout_s() -> u64 {
    10
}

fn default_telemetry_secs() -> u64 {
    30
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_login_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct UplinkConfig {
    /// tls://host:port
    pub endpoint: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
    pub mission_name: String,
    #[serde(default = "default_request_timeout_s")]
    pub request_timeout_s: u64,
    #[serde(default = "default_telemetry_secs")]
    pub telemetry_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
}

/// Backend client. Every call is a fresh TLS connection carrying one
/// length-framed JSON request (uploads add a second raw JPEG frame) and
/// reading one framed JSON ack, bounded by the per-call timeout.
pub struct Uplink {
    endpoint: String,
    mission: String,
    tls: TlsConnector,
    timeout: Duration,
    username: String,
    password: String,
    role: String,
    token: Option<String>,
}

impl Uplink {
    pub fn new(cfg: &UplinkConfig) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_cfg = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            endpoint: cfg.endpoint.clone(),
            mission: cfg.mission_name.clone(),
            tls: TlsConnector::from(Arc::new(tls_cfg)),
            timeout: Duration::from_secs(cfg.request_timeout_s),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            role: cfg.role.clone(),
            token: None,
        })
    }

    /// One login attempt. On success the bearer token is kept for every
    /// later call. The supervisor wraps this in its bounded retry loop.
    pub async fn authenticate(&mut self) -> Result<()> {
        let req = BackendRequest::Login {
            username: self.username.clone(),
            password: self.password.clone(),
            role: self.role.clone(),
        };
        let ack = self.call(&req, None).await.context("backend login")?;
        match ack.token {
            Some(token) => {
                info!("backend login successful");
                self.token = Some(token);
                Ok(())
            }
            None => anyhow::bail!("backend login refused: {}", ack.message),
        }
    }

    fn token(&self) -> Result<String> {
        self.token.clone().context("uplink not authenticated")
    }

    pub async fn send_heartbeat(&self) -> Result<()> {
        let req = BackendRequest::Heartbeat {
            token: self.token()?,
        };
        self.call(&req, None).await?;
        Ok(())
    }

    pub async fn send_telemetry(&self, report: &TelemetryReport) -> Result<()> {
        let req = BackendRequest::Telemetry {
            token: self.token()?,
            mission: self.mission.clone(),
            report: report.clone(),
        };
        self.call(&req, None).await?;
        Ok(())
    }

    /// Uploads one capture pair. Returns true only when the backend's ack
    /// body textually confirms the upload; the caller must not delete
    /// local files otherwise.
    pub async fn upload_capture(&self, meta: &CaptureMeta, jpeg: &[u8]) -> Result<bool> {
        let req = BackendRequest::UploadCapture {
            token: self.token()?,
            mission: self.mission.clone(),
            meta: meta.clone(),
            image_len: jpeg.len() as u32,
        };
        let ack = self.call(&req, Some(jpeg)).await?;
        if ack_confirms_upload(&ack) {
            info!("uploaded capture {} ({} bytes)", meta.timestamp, jpeg.len());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn call(&self, req: &BackendRequest, extra: Option<&[u8]>) -> Result<BackendAck> {
        let payload = serde_json::to_vec(req)?;
        tokio::time::timeout(self.timeout, self.exchange(&payload, extra))
            .await
            .context("backend call timed out")?
    }

    async fn exchange(&self, payload: &[u8], extra: Option<&[u8]>) -> Result<BackendAck> {
        // endpoint: tls://host:port
        let ep = self
            .endpoint
            .strip_prefix("tls://")
            .context("endpoint must start with tls://")?;
        let mut parts = ep.split(':');
        let host = parts.next().context("missing host")?;
        let port = parts.next().context("missing port")?;
        let addr = format!("{}:{}", host, port);

        let tcp = TcpStream::connect(addr).await?;
        let name = ServerName::try_from(host.to_string())?;
        let mut tls = self.tls.connect(name, tcp).await?;

        // framing: u32 length + payload, per frame
        let len = (payload.len() as u32).to_be_bytes();
        tls.write_all(&len).await?;
        tls.write_all(payload).await?;
        if let Some(blob) = extra {
            let len = (blob.len() as u32).to_be_bytes();
            tls.write_all(&len).await?;
            tls.write_all(blob).await?;
        }
        tls.flush().await?;

        let mut len_buf = [0u8; 4];
        tls.read_exact(&mut len_buf).await?;
        let ack_len = u32::from_be_bytes(len_buf);
        anyhow::ensure!(ack_len <= MAX_ACK_BYTES, "oversized backend ack ({} bytes)", ack_len);
        let mut ack_buf = vec![0u8; ack_len as usize];
        tls.read_exact(&mut ack_buf).await?;
        Ok(serde_json::from_slice(&ack_buf).context("parse backend ack")?)
    }
}

/// Deletion of local capture files is gated on this: the ack body must
/// say the upload happened, a bare 200-equivalent is not enough.
pub fn ack_confirms_upload(ack: &BackendAck) -> bool {
    ack.message.to_lowercase().contains("uploaded")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(message: &str) -> BackendAck {
        BackendAck {
            message: message.into(),
            token: None,
        }
    }

    #[test]
    fn upload_confirmation_requires_the_word() {
        assert!(ack_confirms_upload(&ack("Images uploaded successfully")));
        assert!(ack_confirms_upload(&ack("UPLOADED")));
        assert!(!ack_confirms_upload(&ack("ok")));
        assert!(!ack_confirms_upload(&ack("queued for processing")));
        assert!(!ack_confirms_upload(&ack("")));
    }
}
