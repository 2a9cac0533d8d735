//! Payload conversion for application messages.
//!
//! Wire frames carry opaque bytes; application senders may hand the bridge
//! structured payloads instead. [`convert_payload`] turns a
//! [`Payload`](crate::message::Payload) into body bytes using the message's
//! declared content type:
//!
//! - [`JsonConverter`] - `application/json` via `serde_json`
//! - [`MsgPackConverter`] - `application/msgpack` via `rmp-serde`
//!   (`to_vec_named`, struct-as-map format)
//! - byte and text payloads pass through regardless of content type
//!
//! Converters are marker structs with static methods rather than trait
//! objects; selection happens once per message in `convert_payload`.
//!
//! # Example
//!
//! ```
//! use stomp_relay::convert::convert_payload;
//! use stomp_relay::message::Payload;
//!
//! let payload = Payload::Json(serde_json::json!({"qty": 3}));
//! let bytes = convert_payload(&payload, Some("application/json")).unwrap();
//! assert_eq!(&bytes[..], br#"{"qty":3}"#);
//! ```

use bytes::Bytes;

use crate::error::{RelayError, Result};
use crate::message::Payload;

/// JSON converter using `serde_json`.
pub struct JsonConverter;

impl JsonConverter {
    /// Encode a value to JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }
}

/// MessagePack converter using `rmp-serde`.
///
/// Uses `to_vec_named` so structs serialize as maps with field names,
/// the format non-Rust STOMP peers expect.
pub struct MsgPackConverter;

impl MsgPackConverter {
    /// Encode a value to MessagePack bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }
}

/// Convert a payload to body bytes per the declared content type.
///
/// Byte payloads pass through untouched and text payloads become their
/// UTF-8 encoding, whatever the content type says. Structured payloads
/// require a content type with a known converter; a missing content type
/// defaults to JSON.
///
/// # Errors
///
/// `Conversion` when a structured payload names a content type without a
/// converter; serializer failures map through their own variants.
pub fn convert_payload(payload: &Payload, content_type: Option<&str>) -> Result<Bytes> {
    match payload {
        Payload::Bytes(bytes) => Ok(bytes.clone()),
        Payload::Text(text) => Ok(Bytes::from(text.clone().into_bytes())),
        Payload::Json(value) => match content_type.map(media_type) {
            None | Some("application/json") => Ok(Bytes::from(JsonConverter::encode(value)?)),
            Some("application/msgpack") | Some("application/x-msgpack") => {
                Ok(Bytes::from(MsgPackConverter::encode(value)?))
            }
            Some(other) => Err(RelayError::Conversion(format!(
                "no converter for content type {:?}",
                other
            ))),
        },
    }
}

/// Strip MIME parameters: `application/json;charset=utf-8` → `application/json`.
fn media_type(raw: &str) -> &str {
    raw.split(';').next().unwrap_or(raw).trim()
}
