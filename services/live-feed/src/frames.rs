//! Wire frames for technician sockets
//!
//! Technicians push small JSON frames upstream; everything downstream is a
//! serialized `DispatchEvent`. Unknown or malformed frames produce an
//! error frame on that connection only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inbound frame from a technician connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TechFrame {
    /// Position report, forwarded into the dispatch core.
    LocationUpdate { lat: f64, lon: f64 },
    /// Liveness probe; answered with `pong`.
    Ping,
}

/// Outbound control frame (distinct from broadcast events).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once on connect.
    Connected { role: String },
    Pong,
    Error { message: String },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl TechFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerFrame {
    pub fn connected(role: &str) -> Self {
        ServerFrame::Connected {
            role: role.to_string(),
        }
    }

    /// Infallible encoding for the write path.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location_update() {
        let frame = TechFrame::parse(r#"{"type":"location_update","lat":40.7,"lon":-74.0}"#)
            .unwrap();
        assert_eq!(
            frame,
            TechFrame::LocationUpdate { lat: 40.7, lon: -74.0 }
        );
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(TechFrame::parse(r#"{"type":"ping"}"#).unwrap(), TechFrame::Ping);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(TechFrame::parse(r#"{"type":"subscribe"}"#).is_err());
        assert!(TechFrame::parse("not json").is_err());
    }

    #[test]
    fn test_server_frame_encoding() {
        assert_eq!(
            ServerFrame::connected("dispatcher").to_json(),
            r#"{"type":"connected","role":"dispatcher"}"#
        );
        assert_eq!(ServerFrame::Pong.to_json(), r#"{"type":"pong"}"#);
    }
}
