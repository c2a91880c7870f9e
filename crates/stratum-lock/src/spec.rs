//! Resolved package specs.
//!
//! A spec names one concrete package: name, version, platform and the source
//! it comes from. Specs exist in two states:
//! - [`LazySpec`] is an identity plus whatever dependency list was recorded
//!   alongside it (in a lock file or a candidate listing).
//! - [`Spec`] is materialized: its metadata was fetched from the owning
//!   source and is authoritative.
//!
//! Code that needs the full graph takes a [`Spec`]; code that only compares
//! identities works over any [`SpecLike`].

use crate::dependency::Dependency;
use crate::platform::Platform;
use crate::source::Source;
use semver::Version;
use std::fmt;
use std::sync::Arc;

/// A candidate as reported by a source backend, before it is tied to a source.
#[derive(Debug, Clone)]
pub struct Summary {
    pub name: String,
    pub version: Version,
    pub platform: Platform,
    pub dependencies: Vec<Dependency>,
    pub post_install_message: Option<String>,
}

impl Summary {
    /// Create a generic-platform summary with no dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            platform: Platform::generic(),
            dependencies: Vec::new(),
            post_install_message: None,
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn with_post_install_message(mut self, message: impl Into<String>) -> Self {
        self.post_install_message = Some(message.into());
        self
    }

    /// Returns true if both describe the same name, version and platform.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.platform == other.platform
    }
}

/// Accessors shared by lazy and materialized specs.
pub trait SpecLike: Clone + fmt::Debug {
    fn name(&self) -> &str;
    fn version(&self) -> &Version;
    fn platform(&self) -> &Platform;
    fn source(&self) -> &Arc<Source>;
    fn dependencies(&self) -> &[Dependency];

    /// Returns true if this spec meets the dependency's requirement and,
    /// for a bound dependency, comes from the required source.
    fn satisfies(&self, dependency: &Dependency) -> bool {
        self.name() == dependency.name()
            && dependency.requirement().matches(self.version())
            && dependency
                .source()
                .map_or(true, |required| **required == **self.source())
    }

    /// `name-version`, with the platform appended when it is not generic.
    fn full_name(&self) -> String {
        if self.platform().is_generic() {
            format!("{}-{}", self.name(), self.version())
        } else {
            format!("{}-{}-{}", self.name(), self.version(), self.platform())
        }
    }

    /// Render the lock file entry for this spec.
    ///
    /// Non-generic platforms follow the version inside the parentheses,
    /// separated by a space, since semver pre-release tags may contain `-`.
    fn to_lock(&self) -> String {
        let mut out = if self.platform().is_generic() {
            format!("    {} ({})\n", self.name(), self.version())
        } else {
            format!("    {} ({} {})\n", self.name(), self.version(), self.platform())
        };

        let mut dependencies: Vec<&Dependency> = self.dependencies().iter().collect();
        dependencies.sort_by(|a, b| a.name().cmp(b.name()));
        for dependency in dependencies {
            out.push_str(&format!("      {dependency}\n"));
        }
        out
    }
}

/// A resolved identity whose full metadata has not been fetched.
#[derive(Debug, Clone)]
pub struct LazySpec {
    name: String,
    version: Version,
    platform: Platform,
    source: Arc<Source>,
    dependencies: Vec<Dependency>,
}

impl LazySpec {
    /// Create a generic-platform spec with no recorded dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version, source: Arc<Source>) -> Self {
        Self {
            name: name.into(),
            version,
            platform: Platform::generic(),
            source,
            dependencies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub(crate) fn from_summary(summary: Summary, source: Arc<Source>) -> Self {
        Self {
            name: summary.name,
            version: summary.version,
            platform: summary.platform,
            source,
            dependencies: summary.dependencies,
        }
    }

    pub(crate) fn push_dependency(&mut self, dependency: Dependency) {
        self.dependencies.push(dependency);
    }

    /// Point this spec at an equal, canonical source instance.
    pub(crate) fn rebind_source(&mut self, source: Arc<Source>) {
        debug_assert!(*self.source == *source);
        self.source = source;
    }
}

impl SpecLike for LazySpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn source(&self) -> &Arc<Source> {
        &self.source
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

/// A spec whose metadata was fetched from its source.
#[derive(Debug, Clone)]
pub struct Spec {
    name: String,
    version: Version,
    platform: Platform,
    source: Arc<Source>,
    dependencies: Vec<Dependency>,
    post_install_message: Option<String>,
}

impl Spec {
    pub(crate) fn from_summary(summary: Summary, source: Arc<Source>) -> Self {
        Self {
            name: summary.name,
            version: summary.version,
            platform: summary.platform,
            source,
            dependencies: summary.dependencies,
            post_install_message: summary.post_install_message,
        }
    }

    /// Message the package wants shown after it is installed.
    #[must_use]
    pub fn post_install_message(&self) -> Option<&str> {
        self.post_install_message.as_deref()
    }
}

impl SpecLike for Spec {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn source(&self) -> &Arc<Source> {
        &self.source
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }
}

impl fmt::Display for LazySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
