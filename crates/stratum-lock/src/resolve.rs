//! Dependency resolution for Stratum packages.
//!
//! This module provides:
//! - The [`Resolve`] seam the orchestrator calls into
//! - A backtracking [`Resolver`] that prefers previously locked versions
//! - Per-package source restrictions, so pinned dependencies never draw
//!   candidates from another source

use crate::dependency::Dependency;
use crate::index::Index;
use crate::platform::Platform;
use crate::spec::{LazySpec, SpecLike};
use crate::spec_set::SpecSet;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Candidate listings that replace the merged index for specific packages.
pub type SourceRequirements = BTreeMap<String, Index>;

/// Errors that can occur during dependency resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No candidate satisfies a requirement.
    #[error("could not find a candidate satisfying {requirement}{}", format_chain(.chain))]
    Unsatisfiable {
        requirement: String,
        chain: Vec<String>,
    },

    /// A requirement contradicts a package version that is already selected.
    #[error("conflicting requirements for package '{package}': {requirement} does not match {activated}{}", format_chain(.chain))]
    Conflict {
        package: String,
        requirement: String,
        activated: String,
        chain: Vec<String>,
    },
}

fn format_chain(chain: &[String]) -> String {
    if chain.is_empty() {
        String::new()
    } else {
        format!(" (required by {})", chain.join(" -> "))
    }
}

/// A constraint solver over candidate specs.
pub trait Resolve: fmt::Debug {
    /// Choose one candidate per package so every dependency is satisfied.
    ///
    /// Packages named in `source_requirements` draw candidates only from the
    /// listing given there. Versions found in `locked` are tried first.
    fn resolve(
        &self,
        dependencies: &[Dependency],
        index: &Index,
        source_requirements: &SourceRequirements,
        locked: &SpecSet<LazySpec>,
    ) -> Result<SpecSet<LazySpec>, ResolveError>;
}

/// Backtracking resolver.
///
/// Candidates are tried newest first, except that a locked version still
/// allowed by the requirements is always tried before anything else. Only
/// candidates that run on the configured platform are considered; when a
/// version is offered for both the exact platform and the generic one, the
/// exact build wins.
#[derive(Debug, Clone)]
pub struct Resolver {
    platform: Platform,
}

impl Default for Resolver {
    fn default() -> Self {
        Self {
            platform: Platform::local(),
        }
    }
}

impl Resolver {
    /// Create a resolver for the running platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve for a different platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The platform candidates must run on.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }
}

impl Resolve for Resolver {
    fn resolve(
        &self,
        dependencies: &[Dependency],
        index: &Index,
        source_requirements: &SourceRequirements,
        locked: &SpecSet<LazySpec>,
    ) -> Result<SpecSet<LazySpec>, ResolveError> {
        debug!(
            dependencies = dependencies.len(),
            candidates = index.len(),
            pinned = source_requirements.len(),
            locked = locked.len(),
            "resolving"
        );

        let search = Search {
            index,
            source_requirements,
            locked,
            platform: &self.platform,
        };
        let pending = dependencies
            .iter()
            .map(|dependency| Pending {
                dependency: dependency.clone(),
                chain: Arc::default(),
            })
            .collect();
        let activated = search.solve(BTreeMap::new(), pending)?;

        Ok(SpecSet::new(activated.into_values()))
    }
}

#[derive(Debug, Clone)]
struct Pending {
    dependency: Dependency,
    chain: Arc<Vec<String>>,
}

struct Search<'a> {
    index: &'a Index,
    source_requirements: &'a SourceRequirements,
    locked: &'a SpecSet<LazySpec>,
    platform: &'a Platform,
}

impl Search<'_> {
    /// Work through `pending` in order, recursing only where more than one
    /// candidate could be chosen. Stack depth is bounded by the number of
    /// such choice points, not by the number of dependency edges.
    fn solve(
        &self,
        mut activated: BTreeMap<String, LazySpec>,
        mut pending: VecDeque<Pending>,
    ) -> Result<BTreeMap<String, LazySpec>, ResolveError> {
        while let Some(next) = pending.pop_front() {
            let name = next.dependency.name();

            if let Some(existing) = activated.get(name) {
                if existing.satisfies(&next.dependency) {
                    continue;
                }
                return Err(ResolveError::Conflict {
                    package: name.to_string(),
                    requirement: next.dependency.to_string(),
                    activated: existing.full_name(),
                    chain: next.chain.to_vec(),
                });
            }

            let candidates = self.candidates(&next.dependency);
            match candidates.as_slice() {
                [] => {
                    return Err(ResolveError::Unsatisfiable {
                        requirement: next.dependency.to_string(),
                        chain: next.chain.to_vec(),
                    });
                }
                [only] => activate(&mut activated, &mut pending, &next, only),
                _ => return self.branch(&activated, &pending, &next, &candidates),
            }
        }
        Ok(activated)
    }

    fn branch(
        &self,
        activated: &BTreeMap<String, LazySpec>,
        pending: &VecDeque<Pending>,
        next: &Pending,
        candidates: &[&LazySpec],
    ) -> Result<BTreeMap<String, LazySpec>, ResolveError> {
        let mut first_error = None;
        for candidate in candidates {
            trace!(package = next.dependency.name(), candidate = %candidate, "trying candidate");
            let mut activated = activated.clone();
            let mut pending = pending.clone();
            activate(&mut activated, &mut pending, next, candidate);

            match self.solve(activated, pending) {
                Ok(solution) => return Ok(solution),
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| ResolveError::Unsatisfiable {
            requirement: next.dependency.to_string(),
            chain: next.chain.to_vec(),
        }))
    }

    /// Candidates for a dependency in the order they should be tried.
    fn candidates(&self, dependency: &Dependency) -> Vec<&LazySpec> {
        let pool = match self.source_requirements.get(dependency.name()) {
            Some(pinned) => pinned.search_dependency(dependency),
            None => self.index.search_dependency(dependency),
        };

        // One entry per version, ascending; the exact platform beats generic.
        let mut by_version: Vec<&LazySpec> = Vec::new();
        for spec in pool.into_iter().filter(|s| s.platform().runs_on(self.platform)) {
            match by_version.last_mut() {
                Some(last) if last.version() == spec.version() => {
                    if spec.platform() == self.platform {
                        *last = spec;
                    }
                }
                _ => by_version.push(spec),
            }
        }
        by_version.reverse();

        // The locked version wins even if the merged index credits it to
        // another source that lists the same version first.
        let preferred = self.locked.lookup(dependency.name()).find_map(|locked| {
            by_version
                .iter()
                .position(|c| c.version() == locked.version() && **c.source() == **locked.source())
                .or_else(|| by_version.iter().position(|c| c.version() == locked.version()))
        });
        if let Some(at) = preferred {
            let spec = by_version.remove(at);
            by_version.insert(0, spec);
        }
        by_version
    }
}

fn activate(
    activated: &mut BTreeMap<String, LazySpec>,
    pending: &mut VecDeque<Pending>,
    next: &Pending,
    candidate: &LazySpec,
) {
    let mut chain = next.chain.to_vec();
    chain.push(candidate.full_name());
    let chain = Arc::new(chain);
    activated.insert(next.dependency.name().to_string(), candidate.clone());
    pending.extend(candidate.dependencies().iter().map(|dependency| Pending {
        dependency: dependency.clone(),
        chain: Arc::clone(&chain),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::Requirement;
    use crate::source::{Backend, MemorySource, Source, SourceId, Tier};
    use crate::spec::Summary;
    use semver::Version;
    use std::sync::Arc;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn dep(name: &str, req: &str) -> Dependency {
        Dependency::new(name, Requirement::parse(req).unwrap())
    }

    fn source(remote: &str, specs: Vec<Summary>) -> Arc<Source> {
        Source::new(
            SourceId::Registry {
                remotes: vec![remote.to_string()],
            },
            Backend::plain(MemorySource::with_listings(specs, vec![])),
        )
    }

    fn resolver() -> Resolver {
        Resolver::new().with_platform(Platform::new("x86_64-linux"))
    }

    fn resolve(
        deps: &[Dependency],
        sources: &[Arc<Source>],
        pinned: &SourceRequirements,
        locked: &SpecSet<LazySpec>,
    ) -> Result<SpecSet<LazySpec>, ResolveError> {
        let index = Index::build(sources, Tier::Local).unwrap();
        resolver().resolve(deps, &index, pinned, locked)
    }

    #[test]
    fn test_picks_newest_matching_version() {
        let registry = source(
            "https://a.example",
            vec![
                Summary::new("http", v("1.0.0")),
                Summary::new("http", v("1.9.0")),
                Summary::new("http", v("2.0.0")),
            ],
        );
        let result = resolve(&[dep("http", "^1.0")], &[registry], &BTreeMap::new(), &SpecSet::empty()).unwrap();
        assert_eq!(result.get("http").unwrap().version(), &v("1.9.0"));
    }

    #[test]
    fn test_prefers_locked_version() {
        let registry = source(
            "https://a.example",
            vec![Summary::new("http", v("1.0.0")), Summary::new("http", v("1.9.0"))],
        );
        let locked = SpecSet::new(vec![LazySpec::new("http", v("1.0.0"), Arc::clone(&registry))]);
        let result = resolve(&[dep("http", "^1.0")], &[registry], &BTreeMap::new(), &locked).unwrap();
        assert_eq!(result.get("http").unwrap().version(), &v("1.0.0"));
    }

    #[test]
    fn test_prefers_locked_version_listed_by_earlier_source() {
        let first = source(
            "https://a.example",
            vec![Summary::new("http", v("1.0.0")), Summary::new("http", v("1.9.0"))],
        );
        let second = source("https://b.example", vec![Summary::new("http", v("1.0.0"))]);
        let locked = SpecSet::new(vec![LazySpec::new("http", v("1.0.0"), Arc::clone(&second))]);
        let result = resolve(&[dep("http", "^1.0")], &[first, second], &BTreeMap::new(), &locked).unwrap();
        assert_eq!(result.get("http").unwrap().version(), &v("1.0.0"));
    }

    #[test]
    fn test_large_graph_resolves_without_deep_recursion() {
        // Each package depends on the twelve before it, and every package
        // offers two versions so each activation is a choice point.
        let mut summaries = Vec::new();
        for i in 0..300_usize {
            for version in ["1.0.0", "1.1.0"] {
                let mut summary = Summary::new(format!("pkg{i}"), v(version));
                for j in i.saturating_sub(12)..i {
                    summary = summary.with_dependency(dep(&format!("pkg{j}"), "^1.0"));
                }
                summaries.push(summary);
            }
        }
        let registry = source("https://a.example", summaries);
        let roots: Vec<Dependency> = (0..300).rev().map(|i| dep(&format!("pkg{i}"), "*")).collect();

        let result = resolve(&roots, &[registry], &BTreeMap::new(), &SpecSet::empty()).unwrap();
        assert_eq!(result.len(), 300);
        assert!(result.iter().all(|s| s.version() == &v("1.1.0")));
    }

    #[test]
    fn test_ignores_locked_version_that_no_longer_matches() {
        let registry = source(
            "https://a.example",
            vec![Summary::new("http", v("1.0.0")), Summary::new("http", v("2.1.0"))],
        );
        let locked = SpecSet::new(vec![LazySpec::new("http", v("1.0.0"), Arc::clone(&registry))]);
        let result = resolve(&[dep("http", ">=2.0")], &[registry], &BTreeMap::new(), &locked).unwrap();
        assert_eq!(result.get("http").unwrap().version(), &v("2.1.0"));
    }

    #[test]
    fn test_backtracks_on_conflict() {
        let registry = source(
            "https://a.example",
            vec![
                Summary::new("web", v("2.0.0")).with_dependency(dep("http", "^2.0")),
                Summary::new("web", v("1.0.0")).with_dependency(dep("http", "^1.0")),
                Summary::new("http", v("1.5.0")),
                Summary::new("http", v("2.0.0")),
            ],
        );
        let result = resolve(
            &[dep("web", "*"), dep("http", "<2.0")],
            &[registry],
            &BTreeMap::new(),
            &SpecSet::empty(),
        )
        .unwrap();
        assert_eq!(result.get("web").unwrap().version(), &v("1.0.0"));
        assert_eq!(result.get("http").unwrap().version(), &v("1.5.0"));
    }

    #[test]
    fn test_unsatisfiable_reports_chain() {
        let registry = source(
            "https://a.example",
            vec![Summary::new("web", v("1.0.0")).with_dependency(dep("socket", ">=3.0"))],
        );
        let err = resolve(&[dep("web", "*")], &[registry], &BTreeMap::new(), &SpecSet::empty()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Unsatisfiable {
                requirement: "socket (>=3.0)".to_string(),
                chain: vec!["web-1.0.0".to_string()],
            }
        );
        assert!(err.to_string().contains("required by web-1.0.0"));
    }

    #[test]
    fn test_source_requirements_pin_candidates() {
        let public = source("https://public.example", vec![Summary::new("http", v("9.0.0"))]);
        let private = source("https://private.example", vec![Summary::new("http", v("1.0.0"))]);

        let mut pinned = SourceRequirements::new();
        pinned.insert("http".to_string(), Index::from_source(&private, Tier::Local).unwrap());

        let result = resolve(
            &[dep("http", "*").with_source(Arc::clone(&private))],
            &[public, Arc::clone(&private)],
            &pinned,
            &SpecSet::empty(),
        )
        .unwrap();
        let http = result.get("http").unwrap();
        assert_eq!(http.version(), &v("1.0.0"));
        assert!(Arc::ptr_eq(http.source(), &private));
    }

    #[test]
    fn test_platform_specific_build_preferred() {
        let registry = source(
            "https://a.example",
            vec![
                Summary::new("crypto", v("1.0.0")),
                Summary::new("crypto", v("1.0.0")).with_platform(Platform::new("x86_64-linux")),
                Summary::new("crypto", v("1.1.0")).with_platform(Platform::new("aarch64-macos")),
            ],
        );
        let result = resolve(&[dep("crypto", "*")], &[registry], &BTreeMap::new(), &SpecSet::empty()).unwrap();
        let crypto = result.get("crypto").unwrap();
        assert_eq!(crypto.version(), &v("1.0.0"));
        assert_eq!(crypto.platform(), &Platform::new("x86_64-linux"));
    }
}
