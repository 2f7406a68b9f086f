use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{Envelope, Message};

/// Discriminators a client or server may put on the wire.
pub const REGISTERED_TYPES: [&str; 6] = [
    Message::CHAT,
    Message::JOIN,
    Message::LEAVE,
    Message::LLM_DELTA,
    Message::UPDATE_METADATA,
    Message::WELCOME,
];

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid frame format: expected '<type> <payload>'")]
    MissingSeparator,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
    #[error("malformed '{discriminator}' payload: {source}")]
    MalformedPayload {
        discriminator: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode '{discriminator}' payload: {source}")]
    Encode {
        discriminator: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a payload for the given discriminator. Total over
/// [`REGISTERED_TYPES`]; anything else is [`ProtocolError::UnknownType`].
pub fn decode_message(discriminator: &str, payload: &str) -> Result<Message, ProtocolError> {
    let message = match discriminator {
        Message::CHAT => Message::Chat(parse_payload(discriminator, payload)?),
        Message::JOIN => Message::Join(parse_payload(discriminator, payload)?),
        Message::LEAVE => Message::Leave(parse_payload(discriminator, payload)?),
        Message::LLM_DELTA => Message::LlmDelta(parse_payload(discriminator, payload)?),
        Message::UPDATE_METADATA => Message::UpdateMetadata(parse_payload(discriminator, payload)?),
        Message::WELCOME => Message::Welcome(parse_payload(discriminator, payload)?),
        other => return Err(ProtocolError::UnknownType(other.to_string())),
    };
    Ok(message)
}

fn parse_payload<T: DeserializeOwned>(discriminator: &str, payload: &str) -> Result<T, ProtocolError> {
    serde_json::from_str(payload).map_err(|source| ProtocolError::MalformedPayload {
        discriminator: discriminator.to_string(),
        source,
    })
}

/// Decode a client frame: `<discriminator> <payload>`. The sender is implied
/// by the connection the frame arrived on.
pub fn decode_inbound(frame: &str) -> Result<Message, ProtocolError> {
    let (discriminator, payload) = frame
        .split_once(' ')
        .ok_or(ProtocolError::MissingSeparator)?;
    decode_message(discriminator, payload)
}

/// Encode a frame for a client: `<senderID> <discriminator> <payload>`.
pub fn encode_outbound(envelope: &Envelope) -> Result<String, ProtocolError> {
    let discriminator = envelope.message.discriminator();
    let payload = envelope
        .message
        .payload_json()
        .map_err(|source| ProtocolError::Encode { discriminator, source })?;
    Ok(format!("{} {} {}", envelope.sender.id, discriminator, payload))
}
