//! Wire formats shared by the SLTR call crates.
//! Keeping these in a dedicated crate lets the metadata and data-channel
//! envelopes evolve without pulling in the sync runtime.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback display name when neither metadata nor identity carries one.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal encode failed: {0}")]
    Encode(String),
    #[error("signal decode failed: {0}")]
    Decode(String),
}

pub type SignalResult<T> = Result<T, SignalError>;

/// Participant role inside a call. Closed set; gating logic matches
/// exhaustively instead of comparing strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Guest,
    Member,
    Host,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Decoded form of the JSON envelope attached to a participant's opaque
/// transport metadata field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantMetadata {
    pub user_id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawMetadata {
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

impl ParticipantMetadata {
    /// Total decode: malformed or absent metadata degrades field-by-field to
    /// defaults derived from the transport identity. Never fails.
    pub fn decode(identity: &str, raw: Option<&str>) -> Self {
        let parsed: RawMetadata = raw
            .and_then(|text| serde_json::from_str(text).ok())
            .unwrap_or(RawMetadata {
                user_id: None,
                name: None,
                avatar: None,
                role: None,
            });
        let fallback_name = if identity.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            identity.to_string()
        };
        Self {
            user_id: parsed
                .user_id
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| identity.to_string()),
            name: parsed
                .name
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback_name),
            avatar: parsed.avatar.filter(|v| !v.is_empty()),
            role: parsed.role.unwrap_or_default(),
        }
    }

    /// JSON envelope written to the transport's local-participant metadata.
    pub fn encode(&self) -> String {
        let raw = RawMetadata {
            user_id: Some(self.user_id.clone()),
            name: Some(self.name.clone()),
            avatar: self.avatar.clone(),
            role: Some(self.role),
        };
        // RawMetadata is plain data; serialization cannot fail.
        serde_json::to_string(&raw).unwrap_or_default()
    }
}

/// Host-initiated cooperative actions. These are requests, not commands:
/// the data channel carries no server-side enforcement, so a receiving
/// client honors them voluntarily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostAction {
    Mute,
    CameraOff,
    StopScreenShare,
    Kick,
}

/// Requests a host may send that only the target can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRequestKind {
    CameraOn,
}

/// Data-channel message envelope. UTF-8 JSON with a mandatory `type` tag;
/// listeners silently drop payloads whose tag they do not recognize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalEnvelope {
    Chat {
        text: String,
        #[serde(rename = "userId")]
        user_id: String,
        name: String,
    },
    HostAction {
        action: HostAction,
        target: String,
    },
    HostRequest {
        request: HostRequestKind,
        from: String,
        #[serde(rename = "fromName")]
        from_name: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl SignalEnvelope {
    pub fn to_bytes(&self) -> SignalResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|err| SignalError::Encode(err.to_string()))
    }

    pub fn from_bytes(payload: &[u8]) -> SignalResult<Self> {
        serde_json::from_slice(payload).map_err(|err| SignalError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trip() {
        let meta = ParticipantMetadata {
            user_id: "u1".into(),
            name: "Ann".into(),
            avatar: Some("a.png".into()),
            role: Role::Host,
        };
        let decoded = ParticipantMetadata::decode("u1", Some(&meta.encode()));
        assert_eq!(decoded, meta);
    }

    #[test]
    fn malformed_metadata_degrades_to_guest_defaults() {
        let decoded = ParticipantMetadata::decode("user-42", Some("not json"));
        assert_eq!(decoded.user_id, "user-42");
        assert_eq!(decoded.name, "user-42");
        assert_eq!(decoded.avatar, None);
        assert_eq!(decoded.role, Role::Guest);
    }

    #[test]
    fn absent_metadata_with_empty_identity_uses_unknown() {
        let decoded = ParticipantMetadata::decode("", None);
        assert_eq!(decoded.name, UNKNOWN_NAME);
        assert_eq!(decoded.role, Role::Guest);
    }

    #[test]
    fn partial_metadata_fills_missing_fields() {
        let decoded = ParticipantMetadata::decode("id-7", Some(r#"{"name":"Bea"}"#));
        assert_eq!(decoded.user_id, "id-7");
        assert_eq!(decoded.name, "Bea");
        assert_eq!(decoded.role, Role::Guest);
    }

    #[test]
    fn host_action_wire_shape() {
        let envelope = SignalEnvelope::HostAction {
            action: HostAction::StopScreenShare,
            target: "user-9".into(),
        };
        let bytes = envelope.to_bytes().expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(value["type"], "host_action");
        assert_eq!(value["action"], "stop_screen_share");
        assert_eq!(value["target"], "user-9");
    }

    #[test]
    fn chat_wire_shape_uses_camel_case_user_id() {
        let envelope = SignalEnvelope::Chat {
            text: "hi".into(),
            user_id: "u1".into(),
            name: "Ann".into(),
        };
        let bytes = envelope.to_bytes().expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(value["type"], "chat");
        assert_eq!(value["userId"], "u1");
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        let err = SignalEnvelope::from_bytes(br#"{"type":"ping"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = SignalEnvelope::HostRequest {
            request: HostRequestKind::CameraOn,
            from: "host-1".into(),
            from_name: "Ann".into(),
            target: "user-2".into(),
            message: Some("Ann asked you to turn your camera on".into()),
        };
        let bytes = envelope.to_bytes().expect("encode");
        let decoded = SignalEnvelope::from_bytes(&bytes).expect("decode");
        assert_eq!(decoded, envelope);
    }
}
