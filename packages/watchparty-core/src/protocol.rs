//! Wire types exchanged with playback clients over the WebSocket.
//!
//! Client → server messages are tagged by `type` (`register`,
//! `status_update`). Server → client commands are wrapped in a `cmd`
//! envelope and always carry the filename and the target [`Device`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Devices
// ─────────────────────────────────────────────────────────────────────────────

/// An addressable remote playback endpoint (a media player the client controls).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub title: String,
    pub id: String,
}

impl Device {
    pub fn new(title: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
        }
    }

    /// Normalizes one loosely typed `authorized_clients` entry.
    ///
    /// Accepts only JSON objects whose `title` and `id` are non-empty strings.
    /// Extra fields are ignored.
    pub fn from_value(value: &Value) -> Result<Self, DeviceRejection> {
        let obj = value.as_object().ok_or(DeviceRejection::NotAnObject)?;
        let title = non_empty_str(obj.get("title")).ok_or(DeviceRejection::MissingTitle)?;
        let id = non_empty_str(obj.get("id")).ok_or(DeviceRejection::MissingId)?;
        Ok(Self::new(title, id))
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Reason an authorized-device entry was rejected during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeviceRejection {
    #[error("entry is not an object")]
    NotAnObject,
    #[error("missing or empty title")]
    MissingTitle,
    #[error("missing or empty id")]
    MissingId,
}

/// Normalizes a list of authorized-device entries.
///
/// Returns one result per input entry, in order.
pub fn normalize_devices(entries: &[Value]) -> Vec<Result<Device, DeviceRejection>> {
    entries.iter().map(Device::from_value).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Playback command kinds understood by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Play,
    Pause,
    Seek,
    Stop,
    Sync,
}

/// A playback command addressed to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandType,
    /// Media position in milliseconds; `None` for PAUSE and STOP.
    pub offset: Option<u64>,
    pub filename: String,
    pub device: Device,
}

impl Command {
    pub fn play(offset: u64, filename: &str, device: Device) -> Self {
        Self::with_offset(CommandType::Play, Some(offset), filename, device)
    }

    pub fn pause(filename: &str, device: Device) -> Self {
        Self::with_offset(CommandType::Pause, None, filename, device)
    }

    pub fn seek(offset: u64, filename: &str, device: Device) -> Self {
        Self::with_offset(CommandType::Seek, Some(offset), filename, device)
    }

    pub fn stop(filename: &str, device: Device) -> Self {
        Self::with_offset(CommandType::Stop, None, filename, device)
    }

    fn with_offset(kind: CommandType, offset: Option<u64>, filename: &str, device: Device) -> Self {
        Self {
            kind,
            offset,
            filename: filename.to_string(),
            device,
        }
    }
}

/// Outbound frame: `{"cmd": {...}}`.
#[derive(Debug, Serialize)]
pub struct CommandEnvelope<'a> {
    pub cmd: &'a Command,
}

impl<'a> CommandEnvelope<'a> {
    pub fn new(cmd: &'a Command) -> Self {
        Self { cmd }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announces the devices this client is allowed to control.
    Register {
        #[serde(default, deserialize_with = "null_as_empty")]
        authorized_clients: Vec<Value>,
    },
    /// Periodic playback position report.
    StatusUpdate {
        #[serde(default)]
        filename: Option<String>,
        #[serde(default, deserialize_with = "lenient_offset")]
        current_offset: i64,
    },
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts integers, floats and numeric strings; anything else reads as 0.
fn lenient_offset<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let offset = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
        _ => 0,
    };
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_envelope_matches_wire_format() {
        let cmd = Command::play(1500, "movie.mkv", Device::new("Living Room", "m1"));
        let json: Value = serde_json::from_str(&CommandEnvelope::new(&cmd).to_json().unwrap()).unwrap();

        assert_eq!(
            json,
            json!({
                "cmd": {
                    "type": "play",
                    "offset": 1500,
                    "filename": "movie.mkv",
                    "device": {"title": "Living Room", "id": "m1"}
                }
            })
        );
    }

    #[test]
    fn pause_serializes_null_offset() {
        let cmd = Command::pause("movie.mkv", Device::new("TV", "m2"));
        let json = serde_json::to_value(CommandEnvelope::new(&cmd)).unwrap();
        assert_eq!(json["cmd"]["type"], "pause");
        assert!(json["cmd"]["offset"].is_null());
    }

    #[test]
    fn device_from_value_rejects_malformed_entries() {
        assert_eq!(
            Device::from_value(&json!({"title": "TV", "id": "m1", "extra": true})),
            Ok(Device::new("TV", "m1"))
        );
        assert_eq!(
            Device::from_value(&json!("TV")),
            Err(DeviceRejection::NotAnObject)
        );
        assert_eq!(
            Device::from_value(&json!({"title": "", "id": "m1"})),
            Err(DeviceRejection::MissingTitle)
        );
        assert_eq!(
            Device::from_value(&json!({"title": "TV", "id": 7})),
            Err(DeviceRejection::MissingId)
        );
    }

    #[test]
    fn normalize_devices_reports_each_entry() {
        let results = normalize_devices(&[
            json!({"title": "TV", "id": "m1"}),
            json!({"title": "Phone"}),
            json!(null),
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(DeviceRejection::MissingId));
        assert_eq!(results[2], Err(DeviceRejection::NotAnObject));
    }

    #[test]
    fn register_accepts_null_client_list() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"register","authorized_clients":null}"#).unwrap();
        match msg {
            ClientMessage::Register { authorized_clients } => assert!(authorized_clients.is_empty()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn status_update_offset_is_lenient() {
        let parse = |raw: &str| match serde_json::from_str::<ClientMessage>(raw).unwrap() {
            ClientMessage::StatusUpdate { current_offset, .. } => current_offset,
            other => panic!("unexpected message: {:?}", other),
        };

        assert_eq!(parse(r#"{"type":"status_update","filename":"a","current_offset":1200}"#), 1200);
        assert_eq!(parse(r#"{"type":"status_update","filename":"a","current_offset":1200.7}"#), 1200);
        assert_eq!(parse(r#"{"type":"status_update","filename":"a","current_offset":"3400"}"#), 3400);
        assert_eq!(parse(r#"{"type":"status_update","filename":"a","current_offset":"soon"}"#), 0);
        assert_eq!(parse(r#"{"type":"status_update","filename":"a"}"#), 0);
    }

    #[test]
    fn status_update_without_filename_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"status_update"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StatusUpdate { filename: None, current_offset: 0 }));
    }
}
