//! Merged candidate listings.

use crate::dependency::Dependency;
use crate::source::{Source, SourceError, Tier};
use crate::spec::{LazySpec, SpecLike};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A deduplicated view of candidate specs drawn from one or more sources.
///
/// Candidates are unique by name, version and platform. When two sources
/// offer the same candidate, the one from the source listed first wins, so
/// the result does not depend on the order listings arrive in.
#[derive(Debug, Clone, Default)]
pub struct Index {
    specs: BTreeMap<String, Vec<LazySpec>>,
}

impl Index {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the given tier from every source and merge the listings.
    ///
    /// Sources are listed in parallel; merging follows source order.
    pub fn build(sources: &[Arc<Source>], tier: Tier) -> Result<Self, SourceError> {
        let listings = sources
            .par_iter()
            .map(|source| source.candidates(tier))
            .collect::<Result<Vec<_>, _>>()?;

        let mut index = Self::new();
        for listing in listings {
            index.use_specs(listing);
        }
        debug!(tier = %tier, sources = sources.len(), candidates = index.len(), "built index");
        Ok(index)
    }

    /// Index a single source.
    pub fn from_source(source: &Arc<Source>, tier: Tier) -> Result<Self, SourceError> {
        let mut index = Self::new();
        index.use_specs(source.candidates(tier)?);
        Ok(index)
    }

    /// Add candidates, ignoring any whose identity is already indexed.
    pub fn use_specs(&mut self, specs: impl IntoIterator<Item = LazySpec>) {
        for spec in specs {
            let entries = self.specs.entry(spec.name().to_string()).or_default();
            if entries
                .iter()
                .any(|s| s.version() == spec.version() && s.platform() == spec.platform())
            {
                continue;
            }
            let at = entries
                .iter()
                .position(|s| (s.version(), s.platform()) > (spec.version(), spec.platform()))
                .unwrap_or(entries.len());
            entries.insert(at, spec);
        }
    }

    /// All candidates for a name, lowest version first.
    #[must_use]
    pub fn search(&self, name: &str) -> &[LazySpec] {
        self.specs.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Candidates satisfying a dependency, lowest version first.
    #[must_use]
    pub fn search_dependency(&self, dependency: &Dependency) -> Vec<&LazySpec> {
        self.search(dependency.name())
            .iter()
            .filter(|s| s.satisfies(dependency))
            .collect()
    }

    /// Total number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.values().map(Vec::len).sum()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Indexed package names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }
}
