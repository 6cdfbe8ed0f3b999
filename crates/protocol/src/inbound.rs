//! Server → client frames.
//!
//! Decoding happens in two steps: a string `type` field selects one of the
//! control frames; without it the frame is channel data addressed to a
//! subscription.  Channel data is validated separately by
//! [`ChannelData::payload`] so the caller can tell a malformed frame from a
//! frame meant for someone else.

use serde_json::{Map, Value};

use crate::TunnelIdentity;

/// Why a text frame could not be turned into an [`InboundFrame`].
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// Reason attached to a server `disconnect` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Unauthorized,
    InvalidRequest,
    ServerRestart,
    Remote,
    Other(String),
}

impl DisconnectReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "unauthorized" => Self::Unauthorized,
            "invalid_request" => Self::InvalidRequest,
            "server_restart" => Self::ServerRestart,
            "remote" => Self::Remote,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Human-readable description for logs.
    pub fn describe(&self) -> &str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest => "invalid request",
            Self::ServerRestart => "server is about to restart",
            Self::Remote => "remote server closed connection",
            Self::Other(raw) => raw,
        }
    }
}

/// A decoded server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Ping,
    Welcome,
    ConfirmSubscription {
        identifier: Option<String>,
    },
    RejectSubscription,
    Disconnect {
        reason: Option<DisconnectReason>,
        reconnect: Option<bool>,
    },
    /// A frame with a `type` this client does not know.
    Unknown {
        kind: String,
    },
    /// No `type`: a message published on a subscribed channel.
    ChannelData(ChannelData),
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let Value::Object(mut map) = serde_json::from_str::<Value>(text)? else {
            return Err(DecodeError::NotAnObject);
        };

        let kind = match map.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            // A non-string `type` is not a discriminator.
            _ => return Ok(Self::ChannelData(ChannelData::from_map(map))),
        };

        let frame = match kind.as_str() {
            "ping" => Self::Ping,
            "welcome" => Self::Welcome,
            "confirm_subscription" => Self::ConfirmSubscription {
                identifier: take_string(&mut map, "identifier"),
            },
            "reject_subscription" => Self::RejectSubscription,
            "disconnect" => Self::Disconnect {
                reason: map
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(DisconnectReason::parse),
                reconnect: map.get("reconnect").and_then(Value::as_bool),
            },
            _ => Self::Unknown { kind },
        };
        Ok(frame)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::Welcome => "welcome",
            Self::ConfirmSubscription { .. } => "confirm_subscription",
            Self::RejectSubscription => "reject_subscription",
            Self::Disconnect { .. } => "disconnect",
            Self::Unknown { kind } => kind,
            Self::ChannelData(_) => "channel_data",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Channel data
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Raw channel-data frame, before identity and body validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelData {
    /// `None` when the field is missing or not a string.
    pub identifier: Option<String>,
    /// `None` when the field is missing or not an object.
    pub message: Option<Map<String, Value>>,
}

/// Validated channel data.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelPayload {
    /// Shell text to execute.
    Command {
        identity: TunnelIdentity,
        command: String,
    },
    /// Informational notice from the server.
    Info { identity: TunnelIdentity, info: Value },
}

#[derive(thiserror::Error, Debug)]
pub enum ChannelDataError {
    #[error("missing or invalid 'identifier' field")]
    MissingIdentifier,
    #[error("failed to parse 'identifier': {0}")]
    InvalidIdentifier(serde_json::Error),
    #[error("unexpected channel {0:?}")]
    UnexpectedChannel(String),
    #[error("missing or invalid 'message' field")]
    MissingMessage,
    #[error("'command' is not a string")]
    CommandNotText,
    #[error("'message' carries neither 'command' nor 'info'")]
    Empty,
}

impl ChannelData {
    fn from_map(mut map: Map<String, Value>) -> Self {
        let message = match map.remove("message") {
            Some(Value::Object(message)) => Some(message),
            _ => None,
        };
        Self {
            identifier: take_string(&mut map, "identifier"),
            message,
        }
    }

    /// Validate the identity, then pick the body.  `command` wins over
    /// `info` when both are present.
    pub fn payload(&self) -> Result<ChannelPayload, ChannelDataError> {
        let raw = self
            .identifier
            .as_deref()
            .ok_or(ChannelDataError::MissingIdentifier)?;
        let identity =
            TunnelIdentity::from_identifier(raw).map_err(ChannelDataError::InvalidIdentifier)?;
        if !identity.is_control_channel() {
            return Err(ChannelDataError::UnexpectedChannel(identity.channel));
        }

        let message = self
            .message
            .as_ref()
            .ok_or(ChannelDataError::MissingMessage)?;

        if let Some(command) = message.get("command") {
            return match command {
                Value::String(command) => Ok(ChannelPayload::Command {
                    identity,
                    command: command.clone(),
                }),
                _ => Err(ChannelDataError::CommandNotText),
            };
        }
        match message.get("info") {
            Some(info) => Ok(ChannelPayload::Info {
                identity,
                info: info.clone(),
            }),
            None => Err(ChannelDataError::Empty),
        }
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}
