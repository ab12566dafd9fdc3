//! Business location identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Tag of one business location (each has its own QuickBooks company).
///
/// Tags are normalised to lowercase and restricted to `[a-z0-9_-]`, so they
/// can be used verbatim as an OAuth `state` value and as a cache key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocationTag(String);

impl LocationTag {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, DomainError> {
        let tag = raw.as_ref().trim().to_ascii_lowercase();
        if tag.is_empty() {
            return Err(DomainError::validation("location tag must not be empty"));
        }
        if tag == LocationScope::ALL {
            return Err(DomainError::validation("\"all\" is reserved and cannot name a location"));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DomainError::UnknownLocation(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for LocationTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocationTag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LocationTag {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocationTag> for String {
    fn from(value: LocationTag) -> Self {
        value.0
    }
}

/// Which locations a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LocationScope {
    /// Every configured location, summed.
    All,
    One(LocationTag),
}

impl LocationScope {
    pub const ALL: &'static str = "all";

    /// Parse an optional query parameter; absent, blank or `all` means every location.
    pub fn parse(raw: Option<&str>) -> Result<Self, DomainError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::All),
            Some(s) if s.eq_ignore_ascii_case(Self::ALL) => Ok(Self::All),
            Some(s) => LocationTag::new(s).map(Self::One),
        }
    }

    /// Key segment used by the response cache (`all` or the tag).
    pub fn key(&self) -> &str {
        match self {
            Self::All => Self::ALL,
            Self::One(tag) => tag.as_str(),
        }
    }

    /// Resolve against the configured locations, rejecting unknown tags.
    pub fn resolve(&self, configured: &[LocationTag]) -> Result<Vec<LocationTag>, DomainError> {
        match self {
            Self::All => Ok(configured.to_vec()),
            Self::One(tag) if configured.contains(tag) => Ok(vec![tag.clone()]),
            Self::One(tag) => Err(DomainError::UnknownLocation(tag.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalised() {
        let tag = LocationTag::new("  Austin ").unwrap();
        assert_eq!(tag.as_str(), "austin");
    }

    #[test]
    fn invalid_tags_are_rejected() {
        assert!(LocationTag::new("").is_err());
        assert!(LocationTag::new("all").is_err());
        assert!(LocationTag::new("north/side").is_err());
    }

    #[test]
    fn scope_defaults_to_all() {
        assert_eq!(LocationScope::parse(None).unwrap(), LocationScope::All);
        assert_eq!(LocationScope::parse(Some("ALL")).unwrap(), LocationScope::All);
        assert_eq!(LocationScope::parse(Some(" ")).unwrap(), LocationScope::All);
    }

    #[test]
    fn scope_resolution_rejects_unconfigured_location() {
        let configured = vec![LocationTag::new("austin").unwrap()];
        let scope = LocationScope::parse(Some("dallas")).unwrap();
        assert!(matches!(
            scope.resolve(&configured),
            Err(DomainError::UnknownLocation(t)) if t == "dallas"
        ));
        assert_eq!(LocationScope::All.resolve(&configured).unwrap(), configured);
    }
}
