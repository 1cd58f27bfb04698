//! Object key validation and normalization

use percent_encoding::percent_encode_byte;

use crate::error::{Result, UploadError};

/// Upper limit on the byte length of an object key.
pub const MAX_KEY_BYTES: usize = 1024;

/// Checks that `key` is valid UTF-8 without control characters. When
/// `encode` is true, invalid byte sequences and control characters are
/// percent-encoded instead; when false their presence is an error. The
/// encoded form is subject to a final [`MAX_KEY_BYTES`] length check.
pub fn normalize_key(key: &[u8], encode: bool) -> Result<String> {
    if !encode && std::str::from_utf8(key).is_err() {
        return Err(UploadError::InvalidKey {
            reason: format!(
                "key is not valid UTF-8 and percent-encoding was not requested: {}",
                String::from_utf8_lossy(key)
            ),
        });
    }

    let mut normalized = String::with_capacity(key.len());
    let mut rest = key;

    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(text) => {
                push_text(&mut normalized, text);
                rest = &[];
            }
            Err(err) => {
                let (valid, tail) = rest.split_at(err.valid_up_to());
                // valid_up_to guarantees this prefix decodes
                push_text(&mut normalized, String::from_utf8_lossy(valid).as_ref());

                let bad = err.error_len().unwrap_or(tail.len());
                for &byte in &tail[..bad] {
                    normalized.push_str(percent_encode_byte(byte));
                }
                rest = &tail[bad..];
            }
        }
    }

    if !encode && normalized.as_bytes() != key {
        return Err(UploadError::InvalidKey {
            reason: format!(
                "key contained control characters and percent-encoding was not requested: {normalized}"
            ),
        });
    }

    if normalized.len() > MAX_KEY_BYTES {
        let reason = if normalized.as_bytes() != key {
            format!(
                "encoded key is {} bytes which exceeds the maximum of {}: {}",
                normalized.len(),
                MAX_KEY_BYTES,
                normalized
            )
        } else {
            format!(
                "key is {} bytes which exceeds the maximum of {}: {}",
                normalized.len(),
                MAX_KEY_BYTES,
                normalized
            )
        };
        return Err(UploadError::InvalidKey { reason });
    }

    Ok(normalized)
}

fn push_text(normalized: &mut String, text: &str) {
    let mut utf8 = [0u8; 4];
    for ch in text.chars() {
        if ch.is_control() {
            for byte in ch.encode_utf8(&mut utf8).bytes() {
                normalized.push_str(percent_encode_byte(byte));
            }
        } else {
            normalized.push(ch);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_keys_pass_through() {
        assert_eq!(normalize_key(b"path/to/object.txt", false).unwrap(), "path/to/object.txt");
        assert_eq!(normalize_key("päth/ünïcode".as_bytes(), false).unwrap(), "päth/ünïcode");
    }

    #[test]
    fn control_characters_rejected_without_encoding() {
        let err = normalize_key(b"bad\x01key", false).unwrap_err();
        assert!(matches!(err, UploadError::InvalidKey { .. }));
    }

    #[test]
    fn control_characters_percent_encoded() {
        assert_eq!(normalize_key(b"bad\x01key", true).unwrap(), "bad%01key");
        assert_eq!(normalize_key(b"tab\there", true).unwrap(), "tab%09here");
    }

    #[test]
    fn invalid_utf8_rejected_without_encoding() {
        let err = normalize_key(b"raw\xffbytes", false).unwrap_err();
        assert!(matches!(err, UploadError::InvalidKey { .. }));
    }

    #[test]
    fn invalid_utf8_percent_encoded() {
        assert_eq!(normalize_key(b"raw\xffbytes", true).unwrap(), "raw%FFbytes");
        assert_eq!(normalize_key(b"\xf0\x28\x8c\x28", true).unwrap(), "%F0(%8C(");
    }

    #[test]
    fn encoded_output_is_clean_utf8() {
        let normalized = normalize_key(b"a\x00\x80\xffz\n", true).unwrap();
        assert!(normalized.chars().all(|c| !c.is_control()));
        assert_eq!(normalized, "a%00%80%FFz%0A");
    }

    #[test]
    fn length_cap_applies_to_encoded_form() {
        let key = vec![b'a'; MAX_KEY_BYTES];
        assert!(normalize_key(&key, false).is_ok());

        let key = vec![b'a'; MAX_KEY_BYTES + 1];
        assert!(normalize_key(&key, false).is_err());

        // 400 control bytes encode to 1200 bytes, over the cap
        let key = vec![b'\x01'; 400];
        assert!(normalize_key(&key, true).is_err());
    }
}
