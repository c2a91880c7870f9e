//! Target platforms recorded in lock files.

use std::fmt;

/// A platform a package build targets.
///
/// Pure-Stratum packages use the generic platform; packages that ship native
/// code are tagged with an `<arch>-<os>` pair such as `x86_64-linux`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Platform(String);

impl Platform {
    /// Name of the generic platform.
    pub const GENERIC: &'static str = "stratum";

    /// The generic platform, matching every host.
    #[must_use]
    pub fn generic() -> Self {
        Self(Self::GENERIC.to_string())
    }

    /// The platform of the running host.
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS))
    }

    /// Create a platform from its string form.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns true for the generic platform.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.0 == Self::GENERIC
    }

    /// Returns true if a package built for `self` can run on `host`.
    #[must_use]
    pub fn runs_on(&self, host: &Platform) -> bool {
        self.is_generic() || self == host
    }

    /// Returns the platform as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::generic()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
