//! Version requirements.

use semver::{Op, Version, VersionReq};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A version requirement could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid version requirement '{requirement}': {reason}")]
pub struct RequirementError {
    pub requirement: String,
    pub reason: String,
}

/// A set of comparison operators with version operands, e.g. `>=1.0, <2.0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement(VersionReq);

impl Requirement {
    /// The requirement every version satisfies.
    #[must_use]
    pub fn any() -> Self {
        Self(VersionReq::STAR)
    }

    /// Parse a requirement string.
    ///
    /// Bare versions (`1.2.0`) are treated as caret requirements, the same way
    /// `stratum.toml` dependencies are read.
    pub fn parse(input: &str) -> Result<Self, RequirementError> {
        let trimmed = input.trim();
        let normalized = if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            format!("^{trimmed}")
        } else {
            trimmed.to_string()
        };

        VersionReq::parse(&normalized)
            .map(Self)
            .map_err(|e| RequirementError {
                requirement: input.to_string(),
                reason: e.to_string(),
            })
    }

    /// Returns true if `version` satisfies every comparator.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(version)
    }

    /// Returns true if this is the unconstrained requirement.
    #[must_use]
    pub fn is_any(&self) -> bool {
        self.0.comparators.is_empty()
    }

    /// Returns true if every comparator is a pure equality constraint.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        !self.0.comparators.is_empty() && self.0.comparators.iter().all(|c| c.op == Op::Exact)
    }
}

impl Default for Requirement {
    fn default() -> Self {
        Self::any()
    }
}

impl From<VersionReq> for Requirement {
    fn from(req: VersionReq) -> Self {
        Self(req)
    }
}

impl FromStr for Requirement {
    type Err = RequirementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_bare_version_is_caret() {
        let req = Requirement::parse("1.0.0").unwrap();
        assert!(req.matches(&v("1.5.0")));
        assert!(!req.matches(&v("2.0.0")));
    }

    #[test]
    fn test_parse_range() {
        let req = Requirement::parse(">=1.0, <2.0").unwrap();
        assert!(req.matches(&v("1.9.9")));
        assert!(!req.matches(&v("2.0.0")));
        assert!(!req.matches(&v("0.9.0")));
    }

    #[test]
    fn test_parse_invalid() {
        let err = Requirement::parse("not-a-version").unwrap_err();
        assert_eq!(err.requirement, "not-a-version");
    }

    #[test]
    fn test_display_reparses_to_same_requirement() {
        let req = Requirement::parse(">=1.2, <3").unwrap();
        let again = Requirement::parse(&req.to_string()).unwrap();
        assert_eq!(req, again);
    }

    #[test]
    fn test_is_exact() {
        assert!(Requirement::parse("=1.0.0").unwrap().is_exact());
        assert!(!Requirement::parse(">=1.0").unwrap().is_exact());
        assert!(!Requirement::any().is_exact());
        assert!(Requirement::any().is_any());
    }
}
