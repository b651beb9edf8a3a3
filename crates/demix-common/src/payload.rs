//! Decoding of uploaded audio payloads

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{DemixError, Result};

/// Decode a base64 `mp3` field.
///
/// Absent or blank input is `MissingPayload`; anything that is not valid
/// base64 is `InvalidPayload`. ASCII whitespace is ignored, so line-wrapped
/// output of `base64 song.mp3` is accepted as is.
pub fn decode_audio(encoded: Option<&str>) -> Result<Vec<u8>> {
    let compact: Vec<u8> = encoded
        .unwrap_or_default()
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact.is_empty() {
        return Err(DemixError::MissingPayload);
    }

    STANDARD
        .decode(&compact)
        .map_err(|e| DemixError::InvalidPayload(e.to_string()))
}

/// Encode bytes the way clients submit them.
pub fn encode_audio(data: &[u8]) -> String {
    STANDARD.encode(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_valid() {
        let encoded = encode_audio(b"ID3\x03\x00fake");
        assert_eq!(decode_audio(Some(&encoded)).unwrap(), b"ID3\x03\x00fake");
    }

    #[test]
    fn test_decode_missing() {
        assert!(matches!(decode_audio(None), Err(DemixError::MissingPayload)));
        assert!(matches!(
            decode_audio(Some("   ")),
            Err(DemixError::MissingPayload)
        ));
    }

    #[test]
    fn test_decode_line_wrapped() {
        let audio: Vec<u8> = (0..120u8).collect();
        let encoded = encode_audio(&audio);
        let (head, tail) = encoded.split_at(76);
        let wrapped = format!("{}\n{}\r\n", head, tail);

        assert_eq!(decode_audio(Some(&wrapped)).unwrap(), audio);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            decode_audio(Some("!!not base64!!")),
            Err(DemixError::InvalidPayload(_))
        ));
    }

    proptest! {
        #[test]
        fn decode_never_panics(input in ".*") {
            let _ = decode_audio(Some(&input));
        }
    }
}
