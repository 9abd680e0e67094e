use anyhow::{Context, Result};

use crate::UplinkConfig;

pub fn check_uplink(cfg: &UplinkConfig) -> Result<()> {
    let ep = cfg
        .endpoint
        .strip_prefix("tls://")
        .context("uplink.endpoint must start with tls://")?;
    let mut parts = ep.split(':');
    let host = parts.next().unwrap_or_default();
    anyhow::ensure!(!host.is_empty(), "uplink.endpoint missing host");
    let port = parts.next().context("uplink.endpoint missing port")?;
    port.parse::<u16>()
        .context("uplink.endpoint port is not a number")?;
    anyhow::ensure!(!cfg.username.is_empty(), "uplink.username missing");
    anyhow::ensure!(!cfg.mission_name.is_empty(), "uplink.mission_name missing");
    anyhow::ensure!(cfg.request_timeout_s > 0, "uplink.request_timeout_s must be positive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(endpoint: &str) -> UplinkConfig {
        UplinkConfig {
            endpoint: endpoint.into(),
            username: "kestrel".into(),
            password: "secret".into(),
            role: "drone".into(),
            mission_name: "bridge_inspection_001".into(),
            request_timeout_s: 10,
            telemetry_secs: 30,
            heartbeat_secs: 15,
            login_attempts: 3,
        }
    }

    #[test]
    fn accepts_tls_endpoint() {
        assert!(check_uplink(&cfg("tls://backend.example.net:7700")).is_ok());
    }

    #[test]
    fn rejects_other_schemes_and_bad_ports() {
        assert!(check_uplink(&cfg("https://backend.example.net:7700")).is_err());
        assert!(check_uplink(&cfg("tls://backend.example.net")).is_err());
        assert!(check_uplink(&cfg("tls://backend.example.net:port")).is_err());
    }
}
