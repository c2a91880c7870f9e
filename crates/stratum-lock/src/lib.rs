//! Manifest and lock file reconciliation for Stratum packages.
//!
//! This crate provides:
//! - Parsing of `stratum.toml` manifests and `stratum.lock` lock files
//! - Package sources with cheap (cached) and full candidate listings
//! - Convergence of manifest sources with locked sources, and unlocking
//! - Local-first resolution with a fallback to full listings
//! - Deterministic lock file rendering

mod definition;
mod dependency;
mod index;
mod lockfile;
mod manifest;
mod platform;
mod requirement;
mod resolve;
mod source;
mod spec;
mod spec_set;

pub use definition::{Definition, DefinitionConfig, DefinitionError, Unlock};
pub use dependency::{Dependency, DEFAULT_GROUP};
pub use index::Index;
pub use lockfile::{LockError, Lockfile, LOCK_FILE};
pub use manifest::{
    DeclaredDependency, DependencySpec, DetailedDependency, Manifest, ManifestError, Package, BUILD_GROUP,
    DEFAULT_REGISTRY, DEV_GROUP, MANIFEST_FILE,
};
pub use platform::Platform;
pub use requirement::{Requirement, RequirementError};
pub use resolve::{Resolve, ResolveError, Resolver, SourceRequirements};
pub use source::{
    Backend, Detached, GitReference, MemorySource, PathLoader, PathSource, Source, SourceError,
    SourceId, SourceLoader, SpecProvider, Tier, UnlockableProvider,
};
pub use spec::{LazySpec, Spec, SpecLike, Summary};
pub use spec_set::{SpecSet, SpecSetError};
