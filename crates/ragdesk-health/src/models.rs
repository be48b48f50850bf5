//! Health socket message types

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Overall backend status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Healthy => write!(f, "healthy"),
            ServiceStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Latest status pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    /// Number of MCP servers the backend reports as running
    #[serde(default, deserialize_with = "count_or_list")]
    pub mcp_servers: u32,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Accepts either a count or the list of servers itself
fn count_or_list<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_u64().unwrap_or(0).min(u32::MAX as u64) as u32),
        Value::Array(items) => Ok(items.len().min(u32::MAX as usize) as u32),
        Value::Object(map) => Ok(map.len().min(u32::MAX as usize) as u32),
        _ => Ok(0),
    }
}

/// Socket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

/// Messages the client sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

impl ClientMessage {
    pub fn to_text(&self) -> String {
        match self {
            ClientMessage::Ping => r#"{"type":"ping"}"#.to_string(),
        }
    }
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Status(HealthStatus),
    Pong,
    /// Anything else; ignored by the monitor
    Other,
}

impl ServerMessage {
    /// Decode one text frame
    ///
    /// Status frames may arrive bare (`{"status": ..}`) or with a `type`
    /// field; both carry the status at the top level.
    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => return ServerMessage::Other,
        };
        if value.get("type").and_then(Value::as_str) == Some("pong") {
            return ServerMessage::Pong;
        }
        if value.get("status").is_none() {
            return ServerMessage::Other;
        }
        serde_json::from_value(value)
            .map(ServerMessage::Status)
            .unwrap_or(ServerMessage::Other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_wire_format() {
        let text = ClientMessage::Ping.to_text();
        assert_eq!(text, serde_json::to_string(&ClientMessage::Ping).unwrap());
        assert_eq!(text, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_parse_status() {
        let msg = ServerMessage::parse(r#"{"status":"healthy","mcp_servers":2}"#);
        assert_eq!(
            msg,
            ServerMessage::Status(HealthStatus {
                status: ServiceStatus::Healthy,
                mcp_servers: 2
            })
        );

        let msg = ServerMessage::parse(
            r#"{"type":"health_status","status":"unhealthy","mcp_servers":["a","b","c"]}"#,
        );
        match msg {
            ServerMessage::Status(status) => {
                assert!(!status.is_healthy());
                assert_eq!(status.mcp_servers, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_other_frames() {
        assert_eq!(ServerMessage::parse(r#"{"type":"pong"}"#), ServerMessage::Pong);
        assert_eq!(ServerMessage::parse("not json"), ServerMessage::Other);
        assert_eq!(ServerMessage::parse(r#"{"status":"sideways"}"#), ServerMessage::Other);
        assert_eq!(ServerMessage::parse(r#"{"hello":1}"#), ServerMessage::Other);
    }

    #[test]
    fn test_missing_server_count_defaults() {
        let status: HealthStatus = serde_json::from_str(r#"{"status":"healthy"}"#).unwrap();
        assert_eq!(status.mcp_servers, 0);
    }
}
