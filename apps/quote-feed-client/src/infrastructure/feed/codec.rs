//! Frame Codec Module
//!
//! Encodes calls into the feed's socket.io-derived framing and splits raw
//! inbound text back into frames.
//!
//! # Wire Format
//!
//! ```text
//! ~m~<N>~m~<payload>
//! ```
//!
//! `<N>` is the exact byte length of `<payload>`. Several frames may arrive
//! back-to-back in one message. A payload of the form `~h~<token>` is a
//! keepalive probe; anything else is a JSON object.
//!
//! # Decoding Errors
//!
//! A payload that fails to parse is reported for that frame only and the
//! following frames are still decoded. A corrupt header (or a length running
//! past the end of the message) loses the frame boundary, so decoding of that
//! message stops there.

use serde_json::Value;

use super::messages::{Call, Payload};

/// Marker opening and closing every frame header.
pub const HEADER_MARKER: &str = "~m~";

/// Marker prefixing keepalive payloads.
pub const KEEPALIVE_MARKER: &str = "~h~";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The text at `offset` is not a `~m~<digits>~m~` header.
    #[error("invalid frame header at byte {offset}")]
    InvalidHeader {
        /// Byte offset of the bad header in the raw message.
        offset: usize,
    },

    /// The declared payload length runs past the end of the message.
    #[error("frame declares {declared} bytes but only {available} remain")]
    LengthOverrun {
        /// Declared payload length.
        declared: usize,
        /// Bytes left after the header.
        available: usize,
    },

    /// The payload is neither a keepalive nor a JSON object.
    #[error("invalid frame payload: {0}")]
    InvalidPayload(String),

    /// A quote data frame carried a malformed body.
    #[error("invalid quote data: {0}")]
    InvalidQuoteData(#[source] serde_json::Error),

    /// JSON encoding of an outbound call failed.
    #[error("failed to encode call: {0}")]
    Encode(#[source] serde_json::Error),
}

impl FramingError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidHeader { .. } => "invalid_header",
            Self::LengthOverrun { .. } => "length_overrun",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::InvalidQuoteData(_) => "invalid_quote_data",
            Self::Encode(_) => "encode",
        }
    }

    /// Check if this error ended decoding of the whole message.
    #[must_use]
    pub const fn is_boundary_lost(&self) -> bool {
        matches!(self, Self::InvalidHeader { .. } | Self::LengthOverrun { .. })
    }
}

/// A decoded protocol unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keepalive probe carrying the token to echo.
    KeepAlive(String),
    /// Data or control frame.
    Data(Payload),
}

impl Frame {
    /// Check if this is a keepalive probe.
    #[must_use]
    pub const fn is_keep_alive(&self) -> bool {
        matches!(self, Self::KeepAlive(_))
    }
}

/// Parsed `~m~<N>~m~` header.
#[derive(Debug, Clone, Copy)]
struct Header {
    /// Header length in bytes.
    len: usize,
    /// Declared payload length in bytes.
    declared: usize,
}

fn parse_header(text: &str) -> Option<Header> {
    let after = text.strip_prefix(HEADER_MARKER)?;
    let digits = after.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let declared = after.get(..digits)?.parse().ok()?;
    after.get(digits..)?.strip_prefix(HEADER_MARKER)?;

    Some(Header {
        len: HEADER_MARKER.len() * 2 + digits,
        declared,
    })
}

/// Stateless codec for the framed feed protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a function call as a single frame.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument cannot be serialized.
    pub fn encode(&self, function: &str, args: &[Value]) -> Result<String, FramingError> {
        let payload = serde_json::to_string(&Call {
            m: function,
            p: args,
        })
        .map_err(FramingError::Encode)?;
        Ok(Self::prepend_header(&payload))
    }

    /// Encode the reply to a keepalive probe.
    #[must_use]
    pub fn encode_keepalive_echo(&self, token: &str) -> String {
        Self::prepend_header(&format!("{KEEPALIVE_MARKER}{token}"))
    }

    /// Wrap a raw payload with its length header.
    #[must_use]
    pub fn prepend_header(payload: &str) -> String {
        format!("{HEADER_MARKER}{}{HEADER_MARKER}{payload}", payload.len())
    }

    /// Split a raw inbound message into frames.
    ///
    /// Each element is one frame or the error that frame produced. When the
    /// frame boundary is lost the last element is the error and the rest of
    /// the message is skipped.
    #[must_use]
    pub fn decode(&self, raw: &str) -> Vec<Result<Frame, FramingError>> {
        let mut frames = Vec::new();
        let mut offset = 0;

        while offset < raw.len() {
            let Some(header) = raw.get(offset..).and_then(parse_header) else {
                frames.push(Err(FramingError::InvalidHeader { offset }));
                break;
            };

            let body_start = offset + header.len;
            let available = raw.len() - body_start;
            if header.declared > available {
                frames.push(Err(FramingError::LengthOverrun {
                    declared: header.declared,
                    available,
                }));
                break;
            }

            let declared_end = body_start + header.declared;
            if Self::is_frame_boundary(raw, declared_end) {
                frames.push(Self::decode_payload(&raw[body_start..declared_end]));
                offset = declared_end;
                continue;
            }

            // A JSON object at the declared length stands on its own; whatever
            // follows is checked as the next header.
            let declared = raw
                .get(body_start..declared_end)
                .map(Self::decode_payload);
            if let Some(Ok(frame @ Frame::Data(_))) = declared {
                frames.push(Ok(frame));
                offset = declared_end;
                continue;
            }

            // Keepalive tokens are not self-delimiting: take the payload up to
            // the next header.
            let resync = Self::next_header(raw, body_start);
            tracing::debug!(
                declared = header.declared,
                actual = resync - body_start,
                "frame length mismatch, resynchronized on next header"
            );
            frames.push(Self::decode_payload(&raw[body_start..resync]));
            offset = resync;
        }

        frames
    }

    fn is_frame_boundary(raw: &str, pos: usize) -> bool {
        pos == raw.len() || raw.get(pos..).and_then(parse_header).is_some()
    }

    fn next_header(raw: &str, from: usize) -> usize {
        raw[from..]
            .match_indices(HEADER_MARKER)
            .map(|(idx, _)| from + idx)
            .find(|&pos| raw.get(pos..).and_then(parse_header).is_some())
            .unwrap_or(raw.len())
    }

    fn decode_payload(payload: &str) -> Result<Frame, FramingError> {
        if let Some(token) = payload.strip_prefix(KEEPALIVE_MARKER) {
            return Ok(Frame::KeepAlive(token.to_string()));
        }

        let value: Value = serde_json::from_str(payload)
            .map_err(|e| FramingError::InvalidPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(FramingError::InvalidPayload(format!(
                "expected JSON object, got: {}...",
                payload.chars().take(50).collect::<String>()
            )));
        }

        serde_json::from_value(value)
            .map(Frame::Data)
            .map_err(|e| FramingError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    fn data(frame: &Result<Frame, FramingError>) -> &Payload {
        match frame {
            Ok(Frame::Data(payload)) => payload,
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_produces_exact_header() {
        let codec = FrameCodec::new();
        let frame = codec.encode("set_auth_token", &[json!("tok")]).unwrap();
        let payload = r#"{"m":"set_auth_token","p":["tok"]}"#;
        assert_eq!(frame, format!("~m~{}~m~{payload}", payload.len()));
    }

    #[test]
    fn encode_counts_bytes_not_chars() {
        let codec = FrameCodec::new();
        let frame = codec.encode("f", &[json!("€")]).unwrap();
        // {"m":"f","p":["€"]} is 19 chars but 21 bytes
        assert!(frame.starts_with("~m~21~m~"), "{frame}");
    }

    #[test]
    fn keepalive_echo_encoding() {
        let codec = FrameCodec::new();
        assert_eq!(codec.encode_keepalive_echo("1"), "~m~4~m~~h~1");
        assert_eq!(codec.encode_keepalive_echo("42"), "~m~5~m~~h~42");
    }

    #[test]
    fn decode_single_call() {
        let codec = FrameCodec::new();
        let raw = codec
            .encode("quote_create_session", &[json!("qs_abc")])
            .unwrap();

        let frames = codec.decode(&raw);
        assert_eq!(frames.len(), 1);
        let payload = data(&frames[0]);
        assert_eq!(payload.m.as_deref(), Some("quote_create_session"));
        assert_eq!(payload.p, vec![json!("qs_abc")]);
    }

    #[test]
    fn decode_concatenated_frames_in_order() {
        let codec = FrameCodec::new();
        let first = codec.encode("a", &[json!(1)]).unwrap();
        let second = codec.encode("b", &[json!("~m~9~m~")]).unwrap();

        let frames = codec.decode(&format!("{first}{second}"));
        assert_eq!(frames.len(), 2);
        assert_eq!(data(&frames[0]).m.as_deref(), Some("a"));
        assert_eq!(data(&frames[1]).m.as_deref(), Some("b"));
        assert_eq!(data(&frames[1]).p, vec![json!("~m~9~m~")]);
    }

    #[test]
    fn decode_keepalive_with_exact_length() {
        let frames = FrameCodec::new().decode("~m~4~m~~h~1");
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Ok(Frame::KeepAlive(token)) if token == "1"));
    }

    #[test]
    fn decode_keepalive_with_short_length_resyncs() {
        let frames = FrameCodec::new().decode("~m~3~m~~h~1");
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Ok(Frame::KeepAlive(token)) if token == "1"));
    }

    #[test]
    fn decode_keepalive_between_data_frames() {
        let codec = FrameCodec::new();
        let raw = format!(
            "{}{}{}",
            codec.encode("x", &[]).unwrap(),
            codec.encode_keepalive_echo("7"),
            codec.encode("y", &[]).unwrap(),
        );

        let frames = codec.decode(&raw);
        assert_eq!(frames.len(), 3);
        assert!(!frames[0].as_ref().unwrap().is_keep_alive());
        assert!(frames[1].as_ref().unwrap().is_keep_alive());
        assert_eq!(data(&frames[2]).m.as_deref(), Some("y"));
    }

    #[test]
    fn decode_isolates_bad_payload() {
        let codec = FrameCodec::new();
        let raw = format!(
            "{}{}{}",
            codec.encode("before", &[]).unwrap(),
            FrameCodec::prepend_header("{not json"),
            codec.encode("after", &[]).unwrap(),
        );

        let frames = codec.decode(&raw);
        assert_eq!(frames.len(), 3);
        assert_eq!(data(&frames[0]).m.as_deref(), Some("before"));
        assert!(matches!(&frames[1], Err(FramingError::InvalidPayload(_))));
        assert_eq!(data(&frames[2]).m.as_deref(), Some("after"));
    }

    #[test]
    fn decode_rejects_non_object_json() {
        let frames = FrameCodec::new().decode(&FrameCodec::prepend_header("[1,2,3]"));
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], Err(FramingError::InvalidPayload(_))));
    }

    #[test]
    fn corrupt_header_aborts_rest_of_message() {
        let codec = FrameCodec::new();
        let good = codec.encode("ok", &[]).unwrap();
        let raw = format!("{good}~m~x~m~{{}}{good}");

        let frames = codec.decode(&raw);
        assert_eq!(frames.len(), 2);
        assert_eq!(data(&frames[0]).m.as_deref(), Some("ok"));
        assert!(matches!(
            &frames[1],
            Err(FramingError::InvalidHeader { offset }) if *offset == good.len()
        ));
    }

    #[test]
    fn trailing_garbage_keeps_preceding_frame() {
        let codec = FrameCodec::new();
        let good = codec.encode("qsd", &[json!("qs_x")]).unwrap();

        let frames = codec.decode(&format!("{good}garbage"));
        assert_eq!(frames.len(), 2);
        assert_eq!(data(&frames[0]).p, vec![json!("qs_x")]);
        assert!(matches!(
            &frames[1],
            Err(FramingError::InvalidHeader { offset }) if *offset == good.len()
        ));
    }

    #[test]
    fn keepalive_with_short_length_before_next_frame() {
        let codec = FrameCodec::new();
        let next = codec.encode("after", &[]).unwrap();

        let frames = codec.decode(&format!("~m~2~m~~h~12{next}"));
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[0], Ok(Frame::KeepAlive(token)) if token == "12"));
        assert_eq!(data(&frames[1]).m.as_deref(), Some("after"));
    }

    #[test]
    fn decode_empty_message() {
        assert!(FrameCodec::new().decode("").is_empty());
    }

    #[test_case("garbage", "invalid_header" ; "missing marker")]
    #[test_case("~m~abc~m~{}", "invalid_header" ; "non numeric length")]
    #[test_case("~m~12", "invalid_header" ; "unterminated header")]
    #[test_case("~m~~m~{}", "invalid_header" ; "empty length")]
    #[test_case("~m~99999999999999999999999~m~{}", "invalid_header" ; "length overflow")]
    #[test_case("~m~50~m~{}", "length_overrun" ; "length past end")]
    fn malformed_header(raw: &str, kind: &str) {
        let frames = FrameCodec::new().decode(raw);
        assert_eq!(frames.len(), 1);
        let err = frames[0].as_ref().unwrap_err();
        assert_eq!(err.kind(), kind);
        assert!(err.is_boundary_lost());
    }

    fn arg_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "\\PC{0,12}".prop_map(Value::from),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(
            function in "[a-z_]{1,24}",
            args in prop::collection::vec(arg_strategy(), 0..6),
        ) {
            let codec = FrameCodec::new();
            let raw = codec.encode(&function, &args).unwrap();
            let frames = codec.decode(&raw);

            prop_assert_eq!(frames.len(), 1);
            let expected = Payload { m: Some(function), p: args, session_id: None };
            prop_assert_eq!(frames[0].as_ref().unwrap(), &Frame::Data(expected));
        }
    }
}
