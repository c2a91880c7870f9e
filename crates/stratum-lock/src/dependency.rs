//! Requested dependencies.

use crate::requirement::Requirement;
use crate::source::Source;
use std::fmt;
use std::sync::Arc;

/// The group dependencies belong to unless declared otherwise.
pub const DEFAULT_GROUP: &str = "default";

/// A request for a package: a name, a version requirement, the groups it was
/// declared in, and optionally the source it must come from.
#[derive(Debug, Clone)]
pub struct Dependency {
    name: String,
    requirement: Requirement,
    groups: Vec<String>,
    source: Option<Arc<Source>>,
}

impl Dependency {
    /// Create an unbound dependency in the default group.
    #[must_use]
    pub fn new(name: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            name: name.into(),
            requirement,
            groups: vec![DEFAULT_GROUP.to_string()],
            source: None,
        }
    }

    /// Replace the groups this dependency belongs to.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Bind this dependency to a specific source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// The package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The version requirement.
    #[must_use]
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    /// The groups this dependency was declared in.
    #[must_use]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// The source this dependency is pinned to, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Arc<Source>> {
        self.source.as_ref()
    }

    /// Point the bound source at an equal, canonical instance.
    pub(crate) fn rebind_source(&mut self, source: Arc<Source>) {
        debug_assert!(self.source.as_deref() == Some(&*source));
        self.source = Some(source);
    }

    /// Render the `DEPENDENCIES` entry for this dependency.
    #[must_use]
    pub fn to_lock(&self) -> String {
        let mut out = format!("  {}", self.name);
        if !self.requirement.is_any() {
            out.push_str(&format!(" ({})", self.requirement));
        }
        if self.source.is_some() {
            out.push('!');
        }
        out.push('\n');
        out
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.requirement == other.requirement
            && self.source.as_deref() == other.source.as_deref()
    }
}

impl Eq for Dependency {}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.requirement.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.requirement)
        }
    }
}
