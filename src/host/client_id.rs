//! Client identity carried on every call: `<language>:<token>`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::HostError;

/// Identifies one analyzer session. Comparison ignores ASCII case.
#[derive(Debug, Clone)]
pub struct ClientId {
    language: String,
    token: String,
}

impl ClientId {
    /// Fresh identity for a language with a random token
    pub fn create(language: &str) -> Self {
        Self {
            language: language.to_string(),
            token: Uuid::new_v4().to_string(),
        }
    }

    /// Split at the first `:`. The language part must not be empty.
    pub fn parse(s: &str) -> Result<Self, HostError> {
        match s.split_once(':') {
            Some((language, token)) if !language.is_empty() => Ok(Self {
                language: language.to_string(),
                token: token.to_string(),
            }),
            _ => Err(HostError::InvalidClientId(s.to_string())),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.language, self.token)
    }
}

impl FromStr for ClientId {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for ClientId {
    fn eq(&self, other: &Self) -> bool {
        self.language.eq_ignore_ascii_case(&other.language) && self.token.eq_ignore_ascii_case(&other.token)
    }
}

impl Eq for ClientId {}

impl Hash for ClientId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.language.to_ascii_lowercase().hash(state);
        self.token.to_ascii_lowercase().hash(state);
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClientId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ClientId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_is_unique() {
        let a = ClientId::create("csharp");
        let b = ClientId::create("csharp");
        assert_eq!(a.language(), "csharp");
        assert_ne!(a, b);
    }

    #[test]
    fn test_parse_splits_at_first_colon() {
        let id = ClientId::parse("cpp:abc:def").unwrap();
        assert_eq!(id.language(), "cpp");
        assert_eq!(id.token(), "abc:def");
        assert_eq!(id.to_string(), "cpp:abc:def");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(ClientId::parse("nocolon"), Err(HostError::InvalidClientId(_))));
        assert!(ClientId::parse(":token").is_err());
        assert!(ClientId::parse("").is_err());
    }

    #[test]
    fn test_equality_ignores_case() {
        let a = ClientId::parse("CSharp:ABCDEF").unwrap();
        let b = ClientId::parse("csharp:abcdef").unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_serde_as_string() {
        let id = ClientId::parse("csharp:1").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"csharp:1\"");
        let back: ClientId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ClientId>("\"bad\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_display_parse_roundtrip(language in "[a-z]{1,10}", token in "[A-Za-z0-9:-]{0,40}") {
            let id = ClientId::parse(&format!("{}:{}", language, token)).unwrap();
            prop_assert_eq!(id.language(), language.as_str());
            prop_assert_eq!(id.token(), token.as_str());
            prop_assert_eq!(ClientId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
