//! Package sources.
//!
//! A [`Source`] pairs an identity ([`SourceId`]) with a [`Backend`] that can
//! enumerate candidate specs. Identity decides equality: two sources are equal
//! when they are the same kind with the same connection parameters, no matter
//! which backend is attached. This is what lets sources parsed out of a lock
//! file be matched against the live sources declared in a manifest.
//!
//! Candidate enumeration comes in two cost tiers:
//! - [`Tier::Local`] reads only what is already cached on disk.
//! - [`Tier::Remote`] may reach the network and returns the full set.

use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::platform::Platform;
use crate::spec::{LazySpec, Spec, SpecLike, Summary};
use semver::Version;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Errors raised by package sources.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The source has no spec with this identity.
    #[error("could not find {name} ({version}) in {origin}")]
    SpecNotFound {
        name: String,
        version: Version,
        origin: String,
    },

    /// The source cannot be read (missing path, unreachable remote, ...).
    #[error("{origin} is unavailable: {reason}")]
    Unavailable { origin: String, reason: String },

    /// A path source contains an invalid manifest.
    #[error("invalid manifest in {}: {error}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        error: ManifestError,
    },
}

/// Which candidate listing to read from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Cache-only, cheap.
    Local,
    /// Full listing, possibly remote.
    Remote,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A git reference (branch, tag, or revision).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GitReference {
    /// A branch name.
    Branch(String),
    /// A tag name.
    Tag(String),
    /// A specific commit revision.
    Rev(String),
    /// Default branch (HEAD).
    DefaultBranch,
}

impl fmt::Display for GitReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch(b) => write!(f, "branch:{b}"),
            Self::Tag(t) => write!(f, "tag:{t}"),
            Self::Rev(r) => write!(f, "rev:{r}"),
            Self::DefaultBranch => write!(f, "HEAD"),
        }
    }
}

/// The identity of a package origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    /// A package registry, possibly mirrored across several remotes.
    Registry { remotes: Vec<String> },
    /// A package on the local filesystem.
    Path { path: PathBuf },
    /// A package checked out from a git repository.
    Git { uri: String, reference: GitReference },
}

impl SourceId {
    /// Short name used when unlocking a whole source.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Registry { .. } => "registry".to_string(),
            Self::Path { path } => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Git { uri, .. } => {
                let tail = uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri.as_str());
                tail.strip_suffix(".git").unwrap_or(tail).to_string()
            }
        }
    }

    /// Returns true for registry sources.
    #[must_use]
    pub fn is_registry(&self) -> bool {
        matches!(self, Self::Registry { .. })
    }

    /// The section header used for this kind of source in lock files.
    #[must_use]
    pub fn section(&self) -> &'static str {
        match self {
            Self::Registry { .. } => "REGISTRY",
            Self::Path { .. } => "PATH",
            Self::Git { .. } => "GIT",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { remotes } if remotes.is_empty() => write!(f, "locally installed packages"),
            Self::Registry { remotes } => write!(f, "registry at {}", remotes.join(", ")),
            Self::Path { path } => write!(f, "source at {}", path.display()),
            Self::Git { uri, reference } => write!(f, "{uri} (at {reference})"),
        }
    }
}

/// Enumerates candidate specs for a source.
pub trait SpecProvider: Send + Sync + fmt::Debug {
    /// Candidates available without leaving the local cache.
    fn local_specs(&self) -> Result<Vec<Summary>, SourceError>;

    /// The full candidate listing.
    fn specs(&self) -> Result<Vec<Summary>, SourceError>;

    /// Fetch the complete metadata for one candidate.
    fn fetch(
        &self,
        tier: Tier,
        name: &str,
        version: &Version,
        platform: &Platform,
    ) -> Result<Option<Summary>, SourceError> {
        let listing = match tier {
            Tier::Local => self.local_specs()?,
            Tier::Remote => self.specs()?,
        };
        Ok(listing
            .into_iter()
            .find(|s| s.name == name && &s.version == version && &s.platform == platform))
    }

    /// The revision this source is pinned to, for sources that have one.
    fn revision(&self) -> Option<String> {
        None
    }
}

/// A provider whose cached state can be discarded on request.
pub trait UnlockableProvider: SpecProvider {
    /// Drop cached state so the next listing reflects the origin.
    fn unlock(&self);
}

/// The capabilities a source's backend supports.
#[derive(Debug)]
pub enum Backend {
    /// Enumeration only.
    Plain(Box<dyn SpecProvider>),
    /// Enumeration plus [`UnlockableProvider::unlock`].
    Unlockable(Box<dyn UnlockableProvider>),
}

impl Backend {
    /// Wrap a provider without the unlock capability.
    pub fn plain(provider: impl SpecProvider + 'static) -> Self {
        Self::Plain(Box::new(provider))
    }

    /// Wrap a provider that supports unlocking.
    pub fn unlockable(provider: impl UnlockableProvider + 'static) -> Self {
        Self::Unlockable(Box::new(provider))
    }

    fn list(&self, tier: Tier) -> Result<Vec<Summary>, SourceError> {
        match (self, tier) {
            (Self::Plain(p), Tier::Local) => p.local_specs(),
            (Self::Plain(p), Tier::Remote) => p.specs(),
            (Self::Unlockable(p), Tier::Local) => p.local_specs(),
            (Self::Unlockable(p), Tier::Remote) => p.specs(),
        }
    }

    fn fetch(
        &self,
        tier: Tier,
        name: &str,
        version: &Version,
        platform: &Platform,
    ) -> Result<Option<Summary>, SourceError> {
        match self {
            Self::Plain(p) => p.fetch(tier, name, version, platform),
            Self::Unlockable(p) => p.fetch(tier, name, version, platform),
        }
    }

    fn revision(&self) -> Option<String> {
        match self {
            Self::Plain(p) => p.revision(),
            Self::Unlockable(p) => p.revision(),
        }
    }
}

/// A package origin: identity plus the backend that reads it.
///
/// Sources are shared through `Arc` by every dependency and spec that refers
/// to them. Their identity never changes once created.
#[derive(Debug)]
pub struct Source {
    id: SourceId,
    backend: Backend,
}

impl Source {
    /// Create a shared source.
    #[must_use]
    pub fn new(id: SourceId, backend: Backend) -> Arc<Self> {
        Arc::new(Self { id, backend })
    }

    /// A source known only by identity, e.g. one read from a lock file.
    #[must_use]
    pub fn detached(id: SourceId) -> Arc<Self> {
        Self::new(id, Backend::plain(Detached::default()))
    }

    /// A detached source that remembers the revision it was locked at.
    #[must_use]
    pub fn detached_at(id: SourceId, revision: Option<String>) -> Arc<Self> {
        Self::new(id, Backend::plain(Detached { revision }))
    }

    /// The identity of this source.
    #[must_use]
    pub fn id(&self) -> &SourceId {
        &self.id
    }

    /// Short name used when unlocking a whole source.
    #[must_use]
    pub fn name(&self) -> String {
        self.id.name()
    }

    /// Cheap, cache-only candidates.
    pub fn local_specs(self: &Arc<Self>) -> Result<Vec<LazySpec>, SourceError> {
        self.candidates(Tier::Local)
    }

    /// Full candidate listing.
    pub fn specs(self: &Arc<Self>) -> Result<Vec<LazySpec>, SourceError> {
        self.candidates(Tier::Remote)
    }

    /// Candidates from the given tier, tagged with this source.
    pub fn candidates(self: &Arc<Self>, tier: Tier) -> Result<Vec<LazySpec>, SourceError> {
        Ok(self
            .backend
            .list(tier)?
            .into_iter()
            .map(|summary| LazySpec::from_summary(summary, Arc::clone(self)))
            .collect())
    }

    /// Fetch the full spec for a resolved identity from the given tier.
    pub fn materialize(self: &Arc<Self>, tier: Tier, lazy: &LazySpec) -> Result<Spec, SourceError> {
        let summary = self
            .backend
            .fetch(tier, lazy.name(), lazy.version(), lazy.platform())?
            .ok_or_else(|| SourceError::SpecNotFound {
                name: lazy.name().to_string(),
                version: lazy.version().clone(),
                origin: self.id.to_string(),
            })?;
        Ok(Spec::from_summary(summary, Arc::clone(self)))
    }

    /// Ask the backend to drop cached state.
    ///
    /// Returns false when the backend has no unlock capability.
    pub fn unlock(&self) -> bool {
        match &self.backend {
            Backend::Unlockable(p) => {
                p.unlock();
                true
            }
            Backend::Plain(_) => false,
        }
    }

    /// The revision reported by the backend.
    #[must_use]
    pub fn revision(&self) -> Option<String> {
        self.backend.revision()
    }

    /// Render the lock file header for this source.
    #[must_use]
    pub fn to_lock(&self) -> String {
        let mut out = format!("{}\n", self.id.section());
        match &self.id {
            SourceId::Registry { remotes } => {
                for remote in remotes {
                    out.push_str(&format!("  remote: {remote}\n"));
                }
            }
            SourceId::Path { path } => {
                out.push_str(&format!("  remote: {}\n", path.display()));
            }
            SourceId::Git { uri, reference } => {
                out.push_str(&format!("  remote: {uri}\n"));
                if let Some(revision) = self.revision() {
                    out.push_str(&format!("  revision: {revision}\n"));
                }
                match reference {
                    GitReference::Branch(b) => out.push_str(&format!("  branch: {b}\n")),
                    GitReference::Tag(t) => out.push_str(&format!("  tag: {t}\n")),
                    GitReference::Rev(r) => out.push_str(&format!("  ref: {r}\n")),
                    GitReference::DefaultBranch => {}
                }
            }
        }
        out.push_str("  specs:\n");
        out
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

/// Backend for sources that exist only as identities.
#[derive(Debug, Default)]
pub struct Detached {
    revision: Option<String>,
}

impl SpecProvider for Detached {
    fn local_specs(&self) -> Result<Vec<Summary>, SourceError> {
        Ok(Vec::new())
    }

    fn specs(&self) -> Result<Vec<Summary>, SourceError> {
        Ok(Vec::new())
    }

    fn revision(&self) -> Option<String> {
        self.revision.clone()
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    cached: Mutex<Vec<Summary>>,
    remote: Vec<Summary>,
    revision: Option<String>,
    local_listings: AtomicUsize,
    remote_listings: AtomicUsize,
    fetches: AtomicUsize,
}

/// An in-memory catalog with separate cached and remote listings.
///
/// Clones share state, so a caller can keep a handle for inspection after
/// giving a clone to a [`Backend`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

impl MemorySource {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from cached and remote listings.
    #[must_use]
    pub fn with_listings(cached: Vec<Summary>, remote: Vec<Summary>) -> Self {
        Self::from_parts(cached, remote, None)
    }

    /// Build a catalog pinned to a revision.
    #[must_use]
    pub fn from_parts(cached: Vec<Summary>, remote: Vec<Summary>, revision: Option<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                cached: Mutex::new(cached),
                remote,
                revision,
                ..MemoryInner::default()
            }),
        }
    }

    /// How many times the cheap listing was read.
    #[must_use]
    pub fn local_listings(&self) -> usize {
        self.inner.local_listings.load(Ordering::SeqCst)
    }

    /// How many times the full listing was read.
    #[must_use]
    pub fn remote_listings(&self) -> usize {
        self.inner.remote_listings.load(Ordering::SeqCst)
    }

    /// How many specs were materialized from this catalog.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    fn cached(&self) -> Vec<Summary> {
        self.inner
            .cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn full(&self) -> Vec<Summary> {
        let mut all = self.inner.remote.clone();
        for summary in self.cached() {
            if !all.iter().any(|s| s.same_identity(&summary)) {
                all.push(summary);
            }
        }
        all
    }
}

impl SpecProvider for MemorySource {
    fn local_specs(&self) -> Result<Vec<Summary>, SourceError> {
        self.inner.local_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.cached())
    }

    fn specs(&self) -> Result<Vec<Summary>, SourceError> {
        self.inner.remote_listings.fetch_add(1, Ordering::SeqCst);
        Ok(self.full())
    }

    fn fetch(
        &self,
        tier: Tier,
        name: &str,
        version: &Version,
        platform: &Platform,
    ) -> Result<Option<Summary>, SourceError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        let listing = match tier {
            Tier::Local => self.cached(),
            Tier::Remote => self.full(),
        };
        Ok(listing
            .into_iter()
            .find(|s| s.name == name && &s.version == version && &s.platform == platform))
    }

    fn revision(&self) -> Option<String> {
        self.inner.revision.clone()
    }
}

impl UnlockableProvider for MemorySource {
    fn unlock(&self) {
        self.inner
            .cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// A package that lives in a directory with its own `stratum.toml`.
#[derive(Debug, Clone)]
pub struct PathSource {
    root: PathBuf,
}

impl PathSource {
    /// Read the package rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn load(&self) -> Result<Vec<Summary>, SourceError> {
        let manifest_path = self.root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(SourceError::Unavailable {
                origin: format!("source at {}", self.root.display()),
                reason: format!("{} not found", manifest_path.display()),
            });
        }

        let manifest = Manifest::from_path(&manifest_path).map_err(|error| SourceError::Manifest {
            path: manifest_path.clone(),
            error,
        })?;
        let summary = manifest
            .summary()
            .map_err(|error| SourceError::Manifest {
                path: manifest_path,
                error,
            })?;
        Ok(vec![summary])
    }
}

impl SpecProvider for PathSource {
    fn local_specs(&self) -> Result<Vec<Summary>, SourceError> {
        self.load()
    }

    fn specs(&self) -> Result<Vec<Summary>, SourceError> {
        self.load()
    }
}

/// Attaches backends to sources declared in a manifest.
pub trait SourceLoader {
    /// Create the backend for a source identity.
    fn load(&self, id: &SourceId) -> Result<Backend, SourceError>;
}

impl<F> SourceLoader for F
where
    F: Fn(&SourceId) -> Result<Backend, SourceError>,
{
    fn load(&self, id: &SourceId) -> Result<Backend, SourceError> {
        self(id)
    }
}

/// Loads path sources relative to a project root; rejects everything else.
#[derive(Debug, Clone)]
pub struct PathLoader {
    root: PathBuf,
}

impl PathLoader {
    /// Resolve relative paths against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceLoader for PathLoader {
    fn load(&self, id: &SourceId) -> Result<Backend, SourceError> {
        match id {
            SourceId::Path { path } => Ok(Backend::plain(PathSource::new(self.root.join(path)))),
            other => Err(SourceError::Unavailable {
                origin: other.to_string(),
                reason: "no loader configured for this kind of source".to_string(),
            }),
        }
    }
}
