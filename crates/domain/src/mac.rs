//! MAC addresses — the stable identity of a physical device.
//!
//! Entries store the MAC in canonical form (lowercase, colon separated).
//! Entities created by the current scheme use the *rollout* form
//! (uppercase, no separators).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn octets(self) -> [u8; 6] {
        self.0
    }

    /// The unique id used by entities created with the current scheme,
    /// e.g. `AABBCCDDEEFF`.
    #[must_use]
    pub fn rollout_id(self) -> String {
        self.0.iter().map(|b| format!("{b:02X}")).collect()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    /// Accepts colon or dash separated pairs, or 12 bare hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMac(s.to_string());

        let digits: String = if s.contains([':', '-']) {
            let parts: Vec<&str> = s.split([':', '-']).collect();
            if parts.len() != 6 || parts.iter().any(|p| p.len() != 2) {
                return Err(invalid());
            }
            parts.concat()
        } else {
            s.to_string()
        };

        if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (idx, byte) in bytes.iter_mut().enumerate() {
            let pair = &digits[idx * 2..idx * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: MacAddress = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

    #[test]
    fn should_parse_colon_separated_lowercase() {
        assert_eq!("aa:bb:cc:dd:ee:ff".parse::<MacAddress>().unwrap(), MAC);
    }

    #[test]
    fn should_parse_dash_separated_uppercase() {
        assert_eq!("AA-BB-CC-DD-EE-FF".parse::<MacAddress>().unwrap(), MAC);
    }

    #[test]
    fn should_parse_bare_hex() {
        assert_eq!("AABBCCddeeff".parse::<MacAddress>().unwrap(), MAC);
    }

    #[test]
    fn should_reject_wrong_group_count() {
        assert!("aa:bb:cc:dd:ee".parse::<MacAddress>().is_err());
    }

    #[test]
    fn should_reject_non_hex_digits() {
        assert!("zz:bb:cc:dd:ee:ff".parse::<MacAddress>().is_err());
        assert!("aabbccddeefg".parse::<MacAddress>().is_err());
    }

    #[test]
    fn should_reject_uneven_groups() {
        assert!("aab:b:cc:dd:ee:ff".parse::<MacAddress>().is_err());
    }

    #[test]
    fn should_display_canonical_form() {
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn should_produce_rollout_id() {
        assert_eq!(MAC.rollout_id(), "AABBCCDDEEFF");
    }

    #[test]
    fn should_compare_equal_regardless_of_input_format() {
        let a: MacAddress = "aa:bb:cc:dd:ee:f0".parse().unwrap();
        let b: MacAddress = "AABBCCDDEEF0".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn should_serialize_as_canonical_string() {
        let json = serde_json::to_string(&MAC).unwrap();
        assert_eq!(json, "\"aa:bb:cc:dd:ee:ff\"");
        let parsed: MacAddress = serde_json::from_str("\"AA-BB-CC-DD-EE-FF\"").unwrap();
        assert_eq!(parsed, MAC);
    }
}
