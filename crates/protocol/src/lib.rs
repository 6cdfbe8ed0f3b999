//! Control-channel protocol: the JSON envelopes exchanged with the server.
//!
//! The server speaks a subscribe/publish dialect over WebSocket text frames.
//! Outbound traffic is a `subscribe` request followed by `message`
//! envelopes; inbound traffic is either a typed control frame or an untyped
//! channel-data frame.  See [`InboundFrame`] for the decoding rules.

mod inbound;

pub use inbound::{
    ChannelData, ChannelDataError, ChannelPayload, DecodeError, DisconnectReason, InboundFrame,
};

use serde::{Deserialize, Serialize};

/// Name of the one logical channel this agent subscribes to.
pub const CONTROL_CHANNEL: &str = "CommandChannel";

/// Payload carried by every heartbeat envelope.
pub const HEARTBEAT_ACTION: &str = "heartbeat_ping";

/// Which channel and tunnel a frame belongs to.
///
/// On the wire this travels as a JSON document *inside* a string field, so
/// it is serialized twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelIdentity {
    pub channel: String,
    /// Missing on some server frames; decodes as empty.
    #[serde(default)]
    pub tunnel: String,
}

impl TunnelIdentity {
    /// Identity for the command channel of the given tunnel.
    pub fn command_channel(tunnel: impl Into<String>) -> Self {
        Self {
            channel: CONTROL_CHANNEL.into(),
            tunnel: tunnel.into(),
        }
    }

    /// The string form used in the `identifier` field.
    pub fn to_identifier(&self) -> String {
        // A struct of two strings cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse an `identifier` field back into an identity.
    pub fn from_identifier(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn is_control_channel(&self) -> bool {
        self.channel == CONTROL_CHANNEL
    }
}

/// Client → server: join the channel.  Sent once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub command: String,
    pub identifier: String,
}

impl SubscriptionRequest {
    pub fn new(identity: &TunnelIdentity) -> Self {
        Self {
            command: "subscribe".into(),
            identifier: identity.to_identifier(),
        }
    }
}

/// Client → server: application message on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub command: String,
    pub identifier: String,
    /// JSON-encoded payload, again as a string.
    pub data: String,
}

impl OutboundMessage {
    pub fn new(identity: &TunnelIdentity, data: &serde_json::Value) -> Self {
        Self {
            command: "message".into(),
            identifier: identity.to_identifier(),
            data: data.to_string(),
        }
    }

    /// The keep-alive ping.
    pub fn heartbeat(identity: &TunnelIdentity) -> Self {
        Self::new(identity, &serde_json::json!({ "action": HEARTBEAT_ACTION }))
    }
}

/// Encode any outbound envelope as a text frame.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_wire_format() {
        let id = TunnelIdentity::command_channel("T1");
        let json = encode(&SubscriptionRequest::new(&id)).unwrap();
        assert_eq!(
            json,
            r#"{"command":"subscribe","identifier":"{\"channel\":\"CommandChannel\",\"tunnel\":\"T1\"}"}"#
        );
    }

    #[test]
    fn heartbeat_wire_format() {
        let id = TunnelIdentity::command_channel("T1");
        let json = encode(&OutboundMessage::heartbeat(&id)).unwrap();
        assert_eq!(
            json,
            r#"{"command":"message","identifier":"{\"channel\":\"CommandChannel\",\"tunnel\":\"T1\"}","data":"{\"action\":\"heartbeat_ping\"}"}"#
        );
    }

    #[test]
    fn identifier_parses_back() {
        let id = TunnelIdentity::command_channel("ffe9-eew3");
        let parsed = TunnelIdentity::from_identifier(&id.to_identifier()).unwrap();
        assert_eq!(parsed, id);
        assert!(parsed.is_control_channel());
    }

    #[test]
    fn other_channel_is_not_control() {
        let id = TunnelIdentity::from_identifier(r#"{"channel":"ChatChannel","tunnel":"T1"}"#)
            .unwrap();
        assert!(!id.is_control_channel());
    }
}
