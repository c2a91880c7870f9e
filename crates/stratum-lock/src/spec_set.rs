//! Ordered collections of resolved specs.

use crate::dependency::Dependency;
use crate::platform::Platform;
use crate::source::{Source, SourceError, Tier};
use crate::spec::{LazySpec, Spec, SpecLike};
use std::collections::{BTreeSet, HashSet, VecDeque};
use thiserror::Error;
use tracing::debug;

/// Errors from spec set queries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecSetError {
    /// No member spec satisfies a requested dependency.
    #[error("no spec satisfies {dependency}")]
    Unsatisfied { dependency: String },
}

/// An ordered set of specs, unique by name and platform.
#[derive(Debug, Clone)]
pub struct SpecSet<S> {
    specs: Vec<S>,
}

impl<S: SpecLike> SpecSet<S> {
    /// Build a set; a spec whose name and platform were already seen is dropped.
    #[must_use]
    pub fn new(specs: impl IntoIterator<Item = S>) -> Self {
        let mut seen: HashSet<(String, Platform)> = HashSet::new();
        let specs = specs
            .into_iter()
            .filter(|s| seen.insert((s.name().to_string(), s.platform().clone())))
            .collect();
        Self { specs }
    }

    /// An empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// Returns the number of specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns true if the set has no specs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Iterate over specs in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, S> {
        self.specs.iter()
    }

    /// All specs with the given name (one per platform).
    pub fn lookup<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a S> + 'a {
        self.specs.iter().filter(move |s| s.name() == name)
    }

    /// The first spec with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&S> {
        self.specs.iter().find(|s| s.name() == name)
    }

    /// Specs that come from `source`.
    pub fn for_source<'a>(&'a self, source: &'a Source) -> impl Iterator<Item = &'a S> + 'a {
        self.specs.iter().filter(move |s| **s.source() == *source)
    }

    /// Returns true if some member satisfies the dependency.
    #[must_use]
    pub fn satisfies(&self, dependency: &Dependency) -> bool {
        self.specs.iter().any(|s| s.satisfies(dependency))
    }

    /// Names of every member, deduplicated and sorted.
    #[must_use]
    pub fn names(&self) -> BTreeSet<String> {
        self.specs.iter().map(|s| s.name().to_string()).collect()
    }

    /// The subset reachable from `dependencies`, skipping any name in `skip`.
    ///
    /// Each dependency is matched against the first member that satisfies it;
    /// the match's own dependencies are then followed. Every platform variant
    /// of a matched version is kept. A dependency that is not skipped and has
    /// no satisfying member is an error: the subset is never silently partial.
    pub fn for_dependencies(
        &self,
        dependencies: &[Dependency],
        skip: &BTreeSet<String>,
    ) -> Result<Self, SpecSetError> {
        let mut queue: VecDeque<&Dependency> = dependencies.iter().collect();
        let mut handled: HashSet<String> = HashSet::new();
        let mut selected: HashSet<(String, Platform)> = HashSet::new();

        while let Some(dependency) = queue.pop_front() {
            if skip.contains(dependency.name()) || !handled.insert(dependency_key(dependency)) {
                continue;
            }

            let Some(found) = self.specs.iter().find(|s| s.satisfies(dependency)) else {
                debug!(dependency = %dependency, "no spec in set satisfies dependency");
                return Err(SpecSetError::Unsatisfied {
                    dependency: dependency.to_string(),
                });
            };

            for variant in self
                .specs
                .iter()
                .filter(|s| s.name() == found.name() && s.version() == found.version())
            {
                if selected.insert((variant.name().to_string(), variant.platform().clone())) {
                    queue.extend(variant.dependencies());
                }
            }
        }

        Ok(Self {
            specs: self
                .specs
                .iter()
                .filter(|s| selected.contains(&(s.name().to_string(), s.platform().clone())))
                .cloned()
                .collect(),
        })
    }
}

impl SpecSet<LazySpec> {
    /// Fetch full metadata for every member from its owning source.
    pub fn materialize(&self, tier: Tier) -> Result<SpecSet<Spec>, SourceError> {
        let specs = self
            .specs
            .iter()
            .map(|lazy| lazy.source().materialize(tier, lazy))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(tier = %tier, count = specs.len(), "materialized specs");
        Ok(SpecSet { specs })
    }
}

impl<S> Default for SpecSet<S> {
    fn default() -> Self {
        Self { specs: Vec::new() }
    }
}

impl<'a, S> IntoIterator for &'a SpecSet<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

impl<S> IntoIterator for SpecSet<S> {
    type Item = S;
    type IntoIter = std::vec::IntoIter<S>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.into_iter()
    }
}

fn dependency_key(dependency: &Dependency) -> String {
    match dependency.source() {
        Some(source) => format!("{}|{}|{}", dependency.name(), dependency.requirement(), source),
        None => format!("{}|{}", dependency.name(), dependency.requirement()),
    }
}
