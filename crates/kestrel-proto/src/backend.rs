use serde::{Deserialize, Serialize};

use crate::telemetry::{CaptureMeta, TelemetryReport};

/// Request envelope sent to the backend, one JSON frame per call.
/// `UploadCapture` is followed by a second raw frame of `image_len`
/// JPEG bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BackendRequest {
    Login {
        username: String,
        password: String,
        role: String,
    },
    Heartbeat {
        token: String,
    },
    Telemetry {
        token: String,
        mission: String,
        report: TelemetryReport,
    },
    UploadCapture {
        token: String,
        mission: String,
        meta: CaptureMeta,
        image_len: u32,
    },
}

/// Backend reply. `message` is the human-readable body the uploader
/// inspects before it is allowed to delete local files; `token` is only
/// present on a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendAck {
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_without_token_deserializes() {
        let ack: BackendAck = serde_json::from_str(r#"{"message":"ok"}"#).unwrap();
        assert_eq!(ack.message, "ok");
        assert!(ack.token.is_none());
    }

    #[test]
    fn login_request_tags_op() {
        let req = BackendRequest::Login {
            username: "kestrel".into(),
            password: "secret".into(),
            role: "drone".into(),
        };
        let s = serde_json::to_string(&req).unwrap();
        assert!(s.contains(r#""op":"login""#));
    }
}
