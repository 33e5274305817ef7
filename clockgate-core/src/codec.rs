//! Transport encoding for challenge and credential material.
//!
//! Binary values cross the popup boundary (and travel in query strings) as
//! unpadded base64url text.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::DecodeError;

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url text.
///
/// Padding characters, standard-alphabet `+`/`/` and whitespace are all
/// rejected.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| DecodeError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_lengths() {
        let data: Vec<u8> = (0..=255u8).collect();
        for len in 0..data.len() {
            let encoded = encode(&data[..len]);
            assert_eq!(decode(&encoded).unwrap(), &data[..len]);
        }
    }

    #[test]
    fn test_output_is_url_safe_and_unpadded() {
        let encoded = encode(&[0xfb, 0xff, 0xfe, 0x00]);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        assert_eq!(encoded, "-__-AA");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(decode("not base64!").is_err());
        assert!(decode("AA==").is_err());
        assert!(decode("+/+/").is_err());
        assert!(decode("A").is_err());
    }

    #[test]
    fn test_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }
}
