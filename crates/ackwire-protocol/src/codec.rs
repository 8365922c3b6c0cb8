//! Codec trait and the JSON envelope codec.
//!
//! A "codec" (coder/decoder) converts between [`Message`] values and the
//! text carried by a text frame. The dispatcher doesn't care HOW messages
//! are serialized; it just needs something that implements [`Codec`].

use crate::{Message, MessageKind, ProtocolError};

/// Converts messages to envelope text and back.
///
/// `Send + Sync + 'static` because one codec is shared by every
/// connection task on the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a message, always including its `type` discriminator.
    fn encode(&self, message: &Message) -> Result<String, ProtocolError>;

    /// Resolves the discriminator in `payload` and builds that message.
    ///
    /// # Errors
    /// - [`ProtocolError::Malformed`]: not JSON at all
    /// - [`ProtocolError::MissingDiscriminator`]: no string `type`
    /// - [`ProtocolError::UnknownDiscriminator`]: `type` not in [`MessageKind`]
    /// - [`ProtocolError::InvalidPayload`]: fields don't match the kind
    fn decode(&self, payload: &str) -> Result<Message, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Compact by default. [`JsonCodec::pretty`] indents the output, which is
/// easier to read when frames are echoed to a terminal.
///
/// ## Example
///
/// ```rust
/// use ackwire_protocol::{Codec, JsonCodec, Message};
///
/// let codec = JsonCodec::default();
///
/// let text = codec.encode(&Message::text("hello")).unwrap();
/// assert_eq!(text, r#"{"type":"ackwire.message.TextMessage","text":"hello"}"#);
///
/// let decoded = codec.decode(&text).unwrap();
/// assert_eq!(decoded, Message::text("hello"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// A codec that emits indented JSON.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<String, ProtocolError> {
        if self.pretty {
            serde_json::to_string_pretty(message)
        } else {
            serde_json::to_string(message)
        }
        .map_err(ProtocolError::Encode)
    }

    fn decode(&self, payload: &str) -> Result<Message, ProtocolError> {
        // Two passes: read the discriminator from a generic `Value` first,
        // so an unknown `type` is reported as such (and never reaches the
        // typed deserializer), then build the typed message.
        let value: serde_json::Value =
            serde_json::from_str(payload).map_err(ProtocolError::Malformed)?;

        let discriminator = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingDiscriminator)?;

        let kind = MessageKind::from_discriminator(discriminator).ok_or_else(|| {
            ProtocolError::UnknownDiscriminator(discriminator.to_string())
        })?;

        serde_json::from_value(value)
            .map_err(|source| ProtocolError::InvalidPayload { kind, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AckTextMessage;

    #[test]
    fn test_decode_text_message() {
        let msg = JsonCodec::default()
            .decode(r#"{"type":"ackwire.message.TextMessage","text":"hello"}"#)
            .unwrap();
        assert_eq!(msg, Message::text("hello"));
    }

    #[test]
    fn test_decode_ack_message() {
        let msg = JsonCodec::default()
            .decode(r#"{"type":"ackwire.message.AckTextMessage","text":"hi","accepted":true}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::AckText(AckTextMessage {
                text: "hi".into(),
                accepted: true,
            })
        );
    }

    #[test]
    fn test_round_trip_every_kind_through_both_styles() {
        let messages = [
            Message::text("line one\nline two"),
            Message::Disconnect,
            Message::AckText(AckTextMessage {
                text: "ok".into(),
                accepted: true,
            }),
        ];
        for codec in [JsonCodec::default(), JsonCodec::pretty()] {
            for msg in &messages {
                let text = codec.encode(msg).unwrap();
                assert_eq!(&codec.decode(&text).unwrap(), msg);
            }
        }
    }

    #[test]
    fn test_pretty_output_is_indented() {
        let text = JsonCodec::pretty().encode(&Message::text("x")).unwrap();
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_not_json_is_malformed() {
        let err = JsonCodec::default().decode("not-json").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_missing_type_is_rejected() {
        let err = JsonCodec::default().decode(r#"{"text":"hello"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDiscriminator));
    }

    #[test]
    fn test_non_string_type_is_rejected() {
        let err = JsonCodec::default().decode(r#"{"type":7}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingDiscriminator));
    }

    #[test]
    fn test_unknown_type_is_rejected_with_its_name() {
        let err = JsonCodec::default()
            .decode(r#"{"type":"java.io.File","path":"/etc/passwd"}"#)
            .unwrap_err();
        match err {
            ProtocolError::UnknownDiscriminator(d) => assert_eq!(d, "java.io.File"),
            other => panic!("expected UnknownDiscriminator, got {other:?}"),
        }
    }

    #[test]
    fn test_known_type_with_wrong_fields_is_invalid_payload() {
        let err = JsonCodec::default()
            .decode(r#"{"type":"ackwire.message.TextMessage","text":42}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidPayload {
                kind: MessageKind::Text,
                ..
            }
        ));
        assert_eq!(err.discriminator(), Some("ackwire.message.TextMessage"));
    }
}
