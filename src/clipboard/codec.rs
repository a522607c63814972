//! Payload codec
//!
//! Entries travel as a JSON envelope `{"content", "data_type", "metadata"}`.
//! Text content is carried verbatim, image content as standard Base64.
//! Anything that does not decode is plain legacy text; callers are expected
//! to fall back instead of failing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ClipboardData, ClipboardEntry, ClipboardKind, Metadata};

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Input is not a JSON envelope
    #[error("not a clipboard envelope: {0}")]
    NotEnvelope(#[from] serde_json::Error),

    /// Envelope says image but the content is not Base64
    #[error("invalid image payload: {0}")]
    InvalidImage(#[from] base64::DecodeError),
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    content: &'a str,
    data_type: ClipboardKind,
    metadata: &'a Metadata,
}

#[derive(Deserialize)]
struct Envelope {
    content: String,
    data_type: String,
    #[serde(default)]
    metadata: Metadata,
}

/// Serialize an entry into its envelope
pub fn encode(entry: &ClipboardEntry) -> String {
    let encoded_image;
    let content = match &entry.data {
        ClipboardData::Text(text) => text.as_str(),
        ClipboardData::Image(bytes) => {
            encoded_image = BASE64.encode(bytes);
            encoded_image.as_str()
        }
    };

    let envelope = EnvelopeRef {
        content,
        data_type: entry.kind(),
        metadata: &entry.metadata,
    };

    // Strings and a string-keyed map cannot fail to serialize.
    serde_json::to_string(&envelope).unwrap_or_default()
}

/// Parse an envelope back into an entry
///
/// Unknown `data_type` values are read as text so newer peers stay readable.
pub fn decode(input: &str) -> Result<ClipboardEntry, DecodeError> {
    let envelope: Envelope = serde_json::from_str(input)?;

    let data = if envelope.data_type == "image" {
        ClipboardData::Image(BASE64.decode(envelope.content.as_bytes())?)
    } else {
        ClipboardData::Text(envelope.content)
    };

    Ok(ClipboardEntry {
        data,
        metadata: envelope.metadata,
    })
}

/// Decode, or treat the whole input as legacy plain text
pub fn decode_or_text(input: &str) -> ClipboardEntry {
    match decode(input) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::debug!("Treating payload as legacy text ({})", e);
            ClipboardEntry::text(input)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_text_layout() {
        let encoded = encode(&ClipboardEntry::text("x"));
        assert_eq!(encoded, r#"{"content":"x","data_type":"text","metadata":{}}"#);
    }

    #[test]
    fn test_encode_image_is_base64() {
        let mut metadata = Metadata::new();
        metadata.insert("format".into(), json!("PNG"));
        let entry = ClipboardEntry::image(vec![0x89, b'P', b'N', b'G'], metadata);

        let value: serde_json::Value = serde_json::from_str(&encode(&entry)).unwrap();
        assert_eq!(value["data_type"], "image");
        assert_eq!(value["content"], "iVBORw==");
        assert_eq!(value["metadata"]["format"], "PNG");
    }

    #[test]
    fn test_decode_unicode_text() {
        for text in ["😀 emoji", "中文字符", "مرحبا", "e\u{301}", "line\nbreak\t\"quoted\""] {
            let entry = ClipboardEntry::text(text);
            assert_eq!(decode(&encode(&entry)).unwrap(), entry);
        }
    }

    #[test]
    fn test_decode_accepts_python_spacing() {
        let entry = decode(r#"{"content": "hi", "data_type": "text", "metadata": {}}"#).unwrap();
        assert_eq!(entry, ClipboardEntry::text("hi"));
    }

    #[test]
    fn test_decode_missing_metadata() {
        let entry = decode(r#"{"content":"hi","data_type":"text"}"#).unwrap();
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn test_decode_unknown_kind_as_text() {
        let entry = decode(r#"{"content":"<b>x</b>","data_type":"html","metadata":{}}"#).unwrap();
        assert_eq!(entry.as_text(), Some("<b>x</b>"));
    }

    #[test]
    fn test_decode_plain_text_is_not_envelope() {
        assert!(matches!(decode("plain text"), Err(DecodeError::NotEnvelope(_))));
        assert!(matches!(decode(""), Err(DecodeError::NotEnvelope(_))));
        assert!(matches!(decode("42"), Err(DecodeError::NotEnvelope(_))));
        assert!(matches!(decode(r#"{"a":1}"#), Err(DecodeError::NotEnvelope(_))));
    }

    #[test]
    fn test_decode_bad_image_payload() {
        let result = decode(r#"{"content":"not base64!","data_type":"image","metadata":{}}"#);
        assert!(matches!(result, Err(DecodeError::InvalidImage(_))));
    }

    #[test]
    fn test_decode_or_text_fallback() {
        assert_eq!(decode_or_text("plain text"), ClipboardEntry::text("plain text"));
        assert_eq!(
            decode_or_text(r#"{"content":"x","data_type":"text","metadata":{}}"#),
            ClipboardEntry::text("x")
        );
    }

    #[test]
    fn test_float_metadata_survives_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("dpi".into(), json!(1.0715660391465826e-75));
        metadata.insert("scale".into(), json!(0.1 + 0.2));
        let entry = ClipboardEntry::image(vec![1, 2, 3], metadata);

        let encoded = encode(&entry);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(encode(&decoded), encoded);
    }

    fn json_value_strategy() -> impl Strategy<Value = serde_json::Value> {
        use serde_json::Value;

        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            any::<f64>().prop_filter_map("finite", |f| serde_json::Number::from_f64(f).map(Value::Number)),
            any::<String>().prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    fn metadata_strategy() -> impl Strategy<Value = Metadata> {
        prop::collection::btree_map("[a-z]{1,8}", json_value_strategy(), 0..4)
            .prop_map(|map| map.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_text_round_trip(text in any::<String>(), metadata in metadata_strategy()) {
            let entry = ClipboardEntry { data: ClipboardData::Text(text), metadata };
            prop_assert_eq!(decode(&encode(&entry)).unwrap(), entry);
        }

        #[test]
        fn prop_image_round_trip(
            bytes in prop::collection::vec(any::<u8>(), 0..512),
            metadata in metadata_strategy(),
        ) {
            let entry = ClipboardEntry::image(bytes, metadata);
            let encoded = encode(&entry);
            let decoded = decode(&encoded).unwrap();
            prop_assert_eq!(encode(&decoded), encoded);
            prop_assert_eq!(decoded, entry);
        }
    }
}
