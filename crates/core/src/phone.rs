//! Phone number normalization and validation.
//!
//! Numbers are stored in a canonical `+<digits>` (E.164-like) form. The
//! WhatsApp Cloud API addresses recipients by digits only, see
//! [`PhoneNumber::as_wa_id`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Accepted shape after separators are stripped.
pub const PHONE_PATTERN: &str = r"^\+?[1-9][0-9]{6,14}$";

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PHONE_PATTERN).expect("valid regex"));

/// Characters tolerated as visual separators in user-supplied numbers.
const SEPARATORS: &[char] = &[' ', '-', '.', '(', ')'];

/// A validated phone number in canonical `+<digits>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize and validate a raw number.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let stripped: String = raw
            .trim()
            .chars()
            .filter(|c| !SEPARATORS.contains(c))
            .collect();

        if !PHONE_RE.is_match(&stripped) {
            return Err(CoreError::Validation(format!(
                "Invalid phone number '{raw}'"
            )));
        }

        let digits = stripped.trim_start_matches('+');
        Ok(Self(format!("+{digits}")))
    }

    /// Canonical form, e.g. `+15550000001`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits only, as the Cloud API expects in `to` / `from` fields.
    pub fn as_wa_id(&self) -> &str {
        &self.0[1..]
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for PhoneNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_with_plus_prefix() {
        let p = PhoneNumber::parse("15550000001").unwrap();
        assert_eq!(p.as_str(), "+15550000001");
        assert_eq!(p.as_wa_id(), "15550000001");
    }

    #[test]
    fn strips_separators() {
        let p = PhoneNumber::parse(" +1 (555) 000-0001 ").unwrap();
        assert_eq!(p.as_str(), "+15550000001");
        let q = PhoneNumber::parse("+44.20.7946.0958").unwrap();
        assert_eq!(q.as_str(), "+442079460958");
    }

    #[test]
    fn rejects_garbage() {
        assert!(PhoneNumber::parse("").is_err());
        assert!(PhoneNumber::parse("hello").is_err());
        assert!(PhoneNumber::parse("+0123456789").is_err());
        assert!(PhoneNumber::parse("12345").is_err());
        assert!(PhoneNumber::parse("+1234567890123456").is_err());
        assert!(PhoneNumber::parse("++15550000001").is_err());
    }

    #[test]
    fn equal_after_normalization() {
        let a = PhoneNumber::parse("+1 555 000 0001").unwrap();
        let b = PhoneNumber::parse("15550000001").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deserialize_validates() {
        let ok: PhoneNumber = serde_json::from_str("\"+1555000001\"").unwrap();
        assert_eq!(ok.as_str(), "+1555000001");
        assert!(serde_json::from_str::<PhoneNumber>("\"abc\"").is_err());
    }
}
