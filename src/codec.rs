//! Byte-array fields inside text payloads
//!
//! JSON has no binary type. Hosts serialize `[]byte`-style fields as
//! standard base64 strings, so every binary field that crosses the boundary
//! inside JSON is routed through one of these modules with
//! `#[serde(with = "...")]`. Mapping the bytes to text any other way
//! corrupts them silently.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Encode raw bytes for a text payload
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 text field back into raw bytes
pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text.as_bytes())
}

/// `Vec<u8>` <-> base64 string. An empty string decodes to an empty vector.
pub mod base64_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        super::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// `Option<Vec<u8>>` <-> optional base64 string (`null` stays `None`)
pub mod base64_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&super::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| super::decode(&t).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        #[serde(with = "super::base64_bytes")]
        data: Vec<u8>,
        #[serde(default, with = "super::base64_opt")]
        extra: Option<Vec<u8>>,
    }

    #[test]
    fn test_binary_field_is_base64_text() {
        let payload = Payload { data: vec![0, 159, 146, 150, 255], extra: None };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"data":"AJ+Slv8=","extra":null}"#);
    }

    #[test]
    fn test_non_utf8_bytes_survive() {
        let payload = Payload { data: vec![0xff, 0xfe, 0x00, 0x80], extra: Some(vec![0xc3]) };
        let json = serde_json::to_vec(&payload).unwrap();
        let back: Payload = serde_json::from_slice(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_missing_optional_field_is_none() {
        let back: Payload = serde_json::from_str(r#"{"data":""}"#).unwrap();
        assert_eq!(back, Payload { data: vec![], extra: None });
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let result: Result<Payload, _> = serde_json::from_str(r#"{"data":"not base64!"}"#);
        assert!(result.is_err());
    }
}
