//! Checksum byte vectors with hex and base64 renderings

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A digest produced by one of the checksum algorithms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSum(Vec<u8>);

impl HashSum {
    pub fn new(bytes: Vec<u8>) -> Self {
        HashSum(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex-encoded representation of the checksum.
    pub fn hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Base64-encoded representation of the checksum.
    pub fn base64(&self) -> String {
        BASE64.encode(&self.0)
    }
}

impl From<Vec<u8>> for HashSum {
    fn from(bytes: Vec<u8>) -> Self {
        HashSum(bytes)
    }
}

impl AsRef<[u8]> for HashSum {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for HashSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// A [`HashSum`] that parses from and renders to its hexadecimal form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HexSum(pub HashSum);

impl FromStr for HexSum {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(HexSum(HashSum(hex::decode(s)?)))
    }
}

impl fmt::Display for HexSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.hex())
    }
}

impl Serialize for HexSum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.hex())
    }
}

impl<'de> Deserialize<'de> for HexSum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A [`HashSum`] that parses from and renders to its base64 form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Base64Sum(pub HashSum);

impl FromStr for Base64Sum {
    type Err = base64::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Base64Sum(HashSum(BASE64.decode(s)?)))
    }
}

impl fmt::Display for Base64Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.base64())
    }
}

impl Serialize for Base64Sum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.base64())
    }
}

impl<'de> Deserialize<'de> for Base64Sum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let sum = HashSum::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(sum.hex(), "deadbeef");

        let parsed: HexSum = sum.hex().parse().unwrap();
        assert_eq!(parsed.0, sum);
    }

    #[test]
    fn base64_roundtrip() {
        let sum = HashSum::new(vec![0x00, 0x01, 0x02, 0xff]);
        let parsed: Base64Sum = sum.base64().parse().unwrap();
        assert_eq!(parsed.0, sum);
    }

    #[test]
    fn display_is_hex() {
        let sum = HashSum::new(vec![0xab]);
        assert_eq!(sum.to_string(), "ab");
    }

    #[test]
    fn serde_text_forms() {
        let sum = HashSum::new(vec![1, 2, 3]);

        let hex_json = serde_json::to_string(&HexSum(sum.clone())).unwrap();
        assert_eq!(hex_json, "\"010203\"");
        let back: HexSum = serde_json::from_str(&hex_json).unwrap();
        assert_eq!(back.0, sum);

        let b64_json = serde_json::to_string(&Base64Sum(sum.clone())).unwrap();
        let back: Base64Sum = serde_json::from_str(&b64_json).unwrap();
        assert_eq!(back.0, sum);
    }
}
