//! Reconciling a manifest with its lock file.
//!
//! A [`Definition`] is built once per manifest and lock file pair. Building it
//! converges the two source lists; any locked spec whose source is no longer
//! declared is unlocked. Callers may then declare further unlocks, and finally
//! ask for specs, either cheaply from what is cached locally ([`Definition::specs`])
//! or with a fallback to full listings ([`Definition::resolve_remotely`]).
//! Resolution runs at most once; the result can be rendered back to lock file
//! text with [`Definition::to_lock`].

use crate::dependency::Dependency;
use crate::index::Index;
use crate::lockfile::{LockError, Lockfile};
use crate::manifest::{Manifest, ManifestError};
use crate::platform::Platform;
use crate::resolve::{Resolve, ResolveError, Resolver, SourceRequirements};
use crate::source::{Source, SourceError, SourceId, SourceLoader, Tier};
use crate::spec::{LazySpec, Spec, SpecLike};
use crate::spec_set::{SpecSet, SpecSetError};
use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while building or resolving a [`Definition`].
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("manifest not found at {}", .0.display())]
    ManifestNotFound(PathBuf),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Lock(#[from] LockError),

    /// The locked specs cannot satisfy the requested dependencies.
    #[error("the lock file cannot satisfy the manifest: {0}")]
    UnsatisfiableLock(#[from] SpecSetError),

    /// The resolver found no consistent set of specs.
    #[error("could not resolve dependencies: {0}")]
    UnsatisfiableDependencies(#[from] ResolveError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("no source named '{0}'")]
    UnknownSource(String),

    #[error("failed to write lock file: {0}")]
    Io(#[from] std::io::Error),

    /// The definition was used out of order.
    #[error("invalid usage: {0}")]
    InvalidUsage(&'static str),
}

impl DefinitionError {
    /// Returns true for failures that a resolution against full listings may fix.
    #[must_use]
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(
            self,
            Self::UnsatisfiableLock(_)
                | Self::UnsatisfiableDependencies(_)
                | Self::Source(SourceError::SpecNotFound { .. } | SourceError::Unavailable { .. })
        )
    }
}

/// Options for building a [`Definition`].
#[derive(Debug, Default)]
pub struct DefinitionConfig {
    platform: Option<Platform>,
    resolver: Option<Box<dyn Resolve>>,
    ignore_all_messages: bool,
    ignored_messages: BTreeSet<String>,
}

impl DefinitionConfig {
    /// Default configuration: the running platform and the bundled [`Resolver`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve for a platform other than the running one.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Use a different resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl Resolve + 'static) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// Suppress every post-install message.
    #[must_use]
    pub fn ignore_messages(mut self) -> Self {
        self.ignore_all_messages = true;
        self
    }

    /// Suppress post-install messages from the named packages.
    #[must_use]
    pub fn ignore_messages_for<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_messages.extend(names.into_iter().map(Into::into));
        self
    }
}

/// Packages and sources whose locked versions should be discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unlock {
    pub packages: Vec<String>,
    pub sources: Vec<String>,
}

impl Unlock {
    /// Unlock nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlock the named packages.
    #[must_use]
    pub fn packages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.extend(names.into_iter().map(Into::into));
        self
    }

    /// Unlock every package locked from the named sources.
    #[must_use]
    pub fn sources<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources.extend(names.into_iter().map(Into::into));
        self
    }
}

/// A manifest's dependencies reconciled with a lock file.
#[derive(Debug)]
pub struct Definition {
    dependencies: Vec<Dependency>,
    sources: Vec<Arc<Source>>,
    platforms: Vec<Platform>,
    platform: Platform,
    locked_dependencies: Vec<Dependency>,
    locked: SpecSet<LazySpec>,
    unlock: BTreeSet<String>,
    resolver: Box<dyn Resolve>,
    ignore_all_messages: bool,
    ignored_messages: BTreeSet<String>,
    index: OnceCell<Index>,
    remote_index: OnceCell<Index>,
    specs: OnceCell<SpecSet<Spec>>,
}

impl Definition {
    /// Read a manifest and, if it exists, its lock file.
    ///
    /// Every source the manifest declares gets a backend from `loader`: the
    /// registry first, then each path or git source in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::ManifestNotFound`] if `manifest_path` is not
    /// a file, or any error from reading the manifest, the lock file or a
    /// source backend.
    pub fn build(
        manifest_path: impl AsRef<Path>,
        lockfile_path: impl AsRef<Path>,
        loader: &impl SourceLoader,
        config: DefinitionConfig,
    ) -> Result<Self, DefinitionError> {
        let manifest_path = manifest_path.as_ref();
        if !manifest_path.is_file() {
            return Err(DefinitionError::ManifestNotFound(manifest_path.to_path_buf()));
        }

        let manifest = Manifest::from_path(manifest_path)?;
        let declared = manifest.declared_dependencies()?;

        let mut ids: Vec<SourceId> = vec![manifest.registry()];
        for id in declared.iter().filter_map(|d| d.source.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }

        let sources = ids
            .into_iter()
            .map(|id| {
                let backend = loader.load(&id)?;
                Ok(Source::new(id, backend))
            })
            .collect::<Result<Vec<_>, SourceError>>()?;

        let dependencies = declared
            .into_iter()
            .map(|declared| {
                let dependency =
                    Dependency::new(declared.name, declared.requirement).with_groups(declared.groups);
                let live = declared
                    .source
                    .and_then(|id| sources.iter().find(|s| s.id() == &id));
                match live {
                    Some(source) => dependency.with_source(Arc::clone(source)),
                    None => dependency,
                }
            })
            .collect();

        let lockfile_path = lockfile_path.as_ref();
        let lockfile = if lockfile_path.is_file() {
            Some(Lockfile::from_path(lockfile_path)?)
        } else {
            None
        };

        debug!(
            manifest = %manifest_path.display(),
            lockfile = %lockfile_path.display(),
            locked = lockfile.is_some(),
            "building definition"
        );
        Ok(Self::new(lockfile, dependencies, sources, config))
    }

    /// Reconcile dependencies and sources with an optional parsed lock file.
    #[must_use]
    pub fn new(
        lockfile: Option<Lockfile>,
        dependencies: Vec<Dependency>,
        sources: Vec<Arc<Source>>,
        config: DefinitionConfig,
    ) -> Self {
        let lockfile = lockfile.unwrap_or_default();
        let platform = config.platform.unwrap_or_else(Platform::local);
        let resolver = config
            .resolver
            .unwrap_or_else(|| Box::new(Resolver::new().with_platform(platform.clone())));

        let mut platforms = lockfile.platforms;
        if !platforms.contains(&platform) {
            platforms.push(platform.clone());
        }

        let mut definition = Self {
            dependencies,
            sources,
            platforms,
            platform,
            locked_dependencies: lockfile.dependencies,
            locked: SpecSet::empty(),
            unlock: BTreeSet::new(),
            resolver,
            ignore_all_messages: config.ignore_all_messages,
            ignored_messages: config.ignored_messages,
            index: OnceCell::new(),
            remote_index: OnceCell::new(),
            specs: OnceCell::new(),
        };
        definition.converge(&lockfile.sources, lockfile.specs);
        definition
    }

    /// Order sources as common-with-the-lock then new, and point locked
    /// specs and bound dependencies at the live source instances.
    fn converge(&mut self, locked_sources: &[Arc<Source>], locked_specs: Vec<LazySpec>) {
        let (common, fresh): (Vec<_>, Vec<_>) = std::mem::take(&mut self.sources)
            .into_iter()
            .partition(|source| locked_sources.iter().any(|locked| **locked == **source));
        debug!(common = common.len(), fresh = fresh.len(), "converging sources");
        self.sources = common.into_iter().chain(fresh).collect();

        let mut specs = locked_specs;
        for spec in &mut specs {
            match self.sources.iter().find(|s| ***s == **spec.source()) {
                Some(live) => spec.rebind_source(Arc::clone(live)),
                None => {
                    info!(
                        package = spec.name(),
                        origin = %spec.source(),
                        "locked source is no longer declared, unlocking"
                    );
                    self.unlock.insert(spec.name().to_string());
                }
            }
        }
        self.locked = SpecSet::new(specs);

        for dependency in &mut self.dependencies {
            let Some(bound) = dependency.source() else {
                continue;
            };
            if let Some(live) = self.sources.iter().find(|s| ***s == **bound) {
                if !Arc::ptr_eq(bound, live) {
                    dependency.rebind_source(Arc::clone(live));
                }
            }
        }
    }

    /// Discard locked versions for the given packages and sources.
    ///
    /// Unlocking a source asks its backend to drop cached state, if it can,
    /// and unlocks every package that was locked from it.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidUsage`] once specs have been loaded,
    /// and [`DefinitionError::UnknownSource`] for a source name that matches
    /// no declared source. Nothing is unlocked when an error is returned.
    pub fn unlock(&mut self, request: &Unlock) -> Result<(), DefinitionError> {
        if self.specs.get().is_some() {
            return Err(DefinitionError::InvalidUsage("cannot unlock after specs are loaded"));
        }

        let sources = request
            .sources
            .iter()
            .map(|name| {
                self.sources
                    .iter()
                    .find(|s| s.name() == *name)
                    .cloned()
                    .ok_or_else(|| DefinitionError::UnknownSource(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.unlock.extend(request.packages.iter().cloned());

        for source in sources {
            if source.unlock() {
                debug!(origin = %source, "source dropped its cached state");
                self.index = OnceCell::new();
                self.remote_index = OnceCell::new();
            }
            let names: Vec<String> = self
                .locked
                .for_source(&source)
                .map(|spec| spec.name().to_string())
                .collect();
            info!(origin = %source, packages = names.len(), "unlocking source");
            self.unlock.extend(names);
        }

        debug!(unlocked = ?self.unlock, "unlock set updated");
        Ok(())
    }

    /// Resolve, falling back to full listings when the lock file falls short.
    ///
    /// The cached tier is tried first, provided the locked specs alone
    /// satisfy every dependency. Otherwise resolution runs against the full
    /// candidate listings of every source.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::InvalidUsage`] if specs are already loaded,
    /// or the error from the full resolution.
    pub fn resolve_remotely(&mut self) -> Result<&SpecSet<Spec>, DefinitionError> {
        if self.specs.get().is_some() {
            return Err(DefinitionError::InvalidUsage("specs are already loaded"));
        }

        let specs = match self.resolve_from_lock() {
            Ok(specs) => specs,
            Err(err) if err.is_unsatisfiable() => {
                info!(reason = %err, "lock file is insufficient, resolving against full listings");
                self.resolve(Tier::Remote, self.remote_index()?, &self.locked_bias())?
            }
            Err(err) => return Err(err),
        };
        Ok(self.specs.get_or_init(|| specs))
    }

    fn resolve_from_lock(&self) -> Result<SpecSet<Spec>, DefinitionError> {
        let locked = self.locked_specs()?;
        locked.for_dependencies(&self.dependencies, &BTreeSet::new())?;
        debug!("locked specs satisfy every dependency");
        self.resolve(Tier::Local, self.index()?, &locked)
    }

    /// Locked specs to prefer during resolution; empty when the lock file
    /// cannot even satisfy its own anchoring dependencies.
    fn locked_bias(&self) -> SpecSet<LazySpec> {
        self.locked_specs().unwrap_or_else(|err| {
            info!(reason = %err, "ignoring locked versions");
            SpecSet::empty()
        })
    }

    /// The resolved specs, resolving from cached listings on first use.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if no consistent set exists locally.
    pub fn specs(&self) -> Result<&SpecSet<Spec>, DefinitionError> {
        if let Some(specs) = self.specs.get() {
            return Ok(specs);
        }
        let specs = self.resolve(Tier::Local, self.index()?, &self.locked_bias())?;
        Ok(self.specs.get_or_init(|| specs))
    }

    /// Candidates cached locally by every source.
    ///
    /// # Errors
    ///
    /// Returns the error of the first source that cannot be listed.
    pub fn index(&self) -> Result<&Index, DefinitionError> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let index = Index::build(&self.sources, Tier::Local)?;
        Ok(self.index.get_or_init(|| index))
    }

    /// Full candidate listings of every source.
    ///
    /// # Errors
    ///
    /// Returns the error of the first source that cannot be listed.
    pub fn remote_index(&self) -> Result<&Index, DefinitionError> {
        if let Some(index) = self.remote_index.get() {
            return Ok(index);
        }
        let index = Index::build(&self.sources, Tier::Remote)?;
        Ok(self.remote_index.get_or_init(|| index))
    }

    fn resolve(
        &self,
        tier: Tier,
        index: &Index,
        locked: &SpecSet<LazySpec>,
    ) -> Result<SpecSet<Spec>, DefinitionError> {
        let mut source_requirements = SourceRequirements::new();
        for dependency in &self.dependencies {
            if let Some(source) = dependency.source() {
                source_requirements.insert(dependency.name().to_string(), Index::from_source(source, tier)?);
            }
        }

        debug!(tier = %tier, locked = locked.len(), "invoking resolver");
        let resolved = self
            .resolver
            .resolve(&self.dependencies, index, &source_requirements, locked)?;
        Ok(resolved.materialize(tier)?)
    }

    /// Locked specs that may anchor resolution.
    ///
    /// A dependency anchors if the lock file requested it the same way, or if
    /// some locked spec already satisfies it. The result is everything
    /// reachable from the anchoring dependencies, minus unlocked packages.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::UnsatisfiableLock`] if the unlocked packages
    /// leave an anchoring dependency unsatisfied.
    pub fn locked_specs(&self) -> Result<SpecSet<LazySpec>, DefinitionError> {
        let anchors: Vec<Dependency> = self
            .dependencies
            .iter()
            .filter(|dependency| {
                self.locked_dependencies.contains(dependency) || self.locked.satisfies(dependency)
            })
            .cloned()
            .collect();
        Ok(self.locked.for_dependencies(&anchors, &self.unlock)?)
    }

    /// Render the resolved state in lock file format.
    ///
    /// Source blocks come first, ordered by their display string with the
    /// registry last, then the platforms and the requested dependencies.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if specs were not loaded yet and cannot be.
    pub fn to_lock(&self) -> Result<String, DefinitionError> {
        let specs = self.specs()?;
        let mut out = String::new();

        for source in self.sorted_sources() {
            out.push_str(&source.to_lock());
            let mut entries: Vec<&Spec> = specs.for_source(source).collect();
            entries.sort_by(|a, b| (a.name(), a.platform()).cmp(&(b.name(), b.platform())));
            for spec in entries {
                out.push_str(&spec.to_lock());
            }
            out.push('\n');
        }

        out.push_str("PLATFORMS\n");
        let platforms: BTreeSet<&Platform> = self.platforms.iter().collect();
        for platform in platforms {
            out.push_str(&format!("  {platform}\n"));
        }

        out.push_str("\nDEPENDENCIES\n");
        let mut dependencies: Vec<&Dependency> = self.dependencies.iter().collect();
        dependencies.sort_by(|a, b| a.name().cmp(b.name()));
        for dependency in dependencies {
            out.push_str(&dependency.to_lock());
        }

        Ok(out)
    }

    /// Write the lock file, leaving it untouched when nothing changed.
    ///
    /// # Errors
    ///
    /// Returns the resolution error, or an I/O error from writing.
    pub fn write_lock(&self, path: impl AsRef<Path>) -> Result<(), DefinitionError> {
        let path = path.as_ref();
        let contents = self.to_lock()?;
        if std::fs::read_to_string(path).is_ok_and(|existing| existing == contents) {
            debug!(path = %path.display(), "lock file is up to date");
            return Ok(());
        }
        std::fs::write(path, contents)?;
        info!(path = %path.display(), "wrote lock file");
        Ok(())
    }

    fn sorted_sources(&self) -> Vec<&Arc<Source>> {
        let mut sources: Vec<&Arc<Source>> = self.sources.iter().collect();
        sources.sort_by_cached_key(|s| (s.id().is_registry(), s.to_string()));
        sources
    }

    /// The requested dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Declared sources, those already in the lock file first.
    #[must_use]
    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    /// Locked platforms plus the one being resolved for.
    #[must_use]
    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    /// The platform being resolved for.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Every group named by a dependency, in first-seen order.
    #[must_use]
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for group in self.dependencies.iter().flat_map(Dependency::groups) {
            if !groups.contains(&group.as_str()) {
                groups.push(group);
            }
        }
        groups
    }

    /// Package names whose locked versions are discarded.
    #[must_use]
    pub fn unlocked(&self) -> &BTreeSet<String> {
        &self.unlock
    }

    /// Returns true if the only source is a registry with no remotes.
    #[must_use]
    pub fn no_sources(&self) -> bool {
        matches!(
            self.sources.as_slice(),
            [source] if matches!(source.id(), SourceId::Registry { remotes } if remotes.is_empty())
        )
    }

    /// Returns true if the dependency pins exact versions only.
    #[must_use]
    pub fn is_exact(&self, dependency: &Dependency) -> bool {
        dependency.requirement().is_exact()
    }

    /// Post-install messages of newly installed or updated specs, sorted by
    /// package name.
    ///
    /// A spec locked at the same version, platform and source is not new and
    /// stays quiet, as do packages whose messages were ignored in the config.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if specs were not loaded yet and cannot be.
    pub fn post_install_messages(&self) -> Result<Vec<(String, String)>, DefinitionError> {
        let specs = self.specs()?;
        if self.ignore_all_messages {
            return Ok(Vec::new());
        }
        let mut messages: Vec<(String, String)> = specs
            .iter()
            .filter(|spec| !self.ignored_messages.contains(spec.name()) && !self.was_locked(spec))
            .filter_map(|spec| {
                spec.post_install_message()
                    .map(|message| (spec.name().to_string(), message.to_string()))
            })
            .collect();
        messages.sort();
        if !messages.is_empty() {
            info!(count = messages.len(), "packages have post-install messages");
        }
        Ok(messages)
    }

    fn was_locked(&self, spec: &Spec) -> bool {
        self.locked.iter().any(|locked| {
            locked.name() == spec.name()
                && locked.version() == spec.version()
                && locked.platform() == spec.platform()
                && **locked.source() == **spec.source()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requirement::Requirement;
    use crate::source::{Backend, MemorySource};
    use crate::spec::Summary;
    use semver::Version;

    const LOCK: &str = "\
PATH
  remote: vendor/json
  specs:
    json (1.1.0)

REGISTRY
  remote: https://registry.example
  specs:
    http (1.0.0)
    socket (0.3.0)

PLATFORMS
  x86_64-linux

DEPENDENCIES
  http (>=1.0)
  json!
";

    fn summary(name: &str, version: &str) -> Summary {
        Summary::new(name, Version::parse(version).unwrap())
    }

    fn dep(name: &str, req: &str) -> Dependency {
        Dependency::new(name, Requirement::parse(req).unwrap())
    }

    fn registry(catalog: MemorySource) -> Arc<Source> {
        Source::new(
            SourceId::Registry {
                remotes: vec!["https://registry.example".to_string()],
            },
            Backend::unlockable(catalog),
        )
    }

    fn vendor_json() -> Arc<Source> {
        Source::new(
            SourceId::Path {
                path: PathBuf::from("vendor/json"),
            },
            Backend::plain(MemorySource::with_listings(vec![summary("json", "1.1.0")], vec![])),
        )
    }

    fn config() -> DefinitionConfig {
        DefinitionConfig::new().with_platform(Platform::new("x86_64-linux"))
    }

    fn definition(sources: Vec<Arc<Source>>, dependencies: Vec<Dependency>) -> Definition {
        Definition::new(Some(Lockfile::parse(LOCK).unwrap()), dependencies, sources, config())
    }

    #[test]
    fn test_converge_orders_common_sources_first() {
        let fresh = Source::new(
            SourceId::Path {
                path: PathBuf::from("vendor/extra"),
            },
            Backend::plain(MemorySource::new()),
        );
        let json = vendor_json();
        let reg = registry(MemorySource::new());
        let def = definition(
            vec![Arc::clone(&fresh), Arc::clone(&reg), Arc::clone(&json)],
            vec![dep("http", ">=1.0")],
        );
        assert!(Arc::ptr_eq(&def.sources()[0], &reg));
        assert!(Arc::ptr_eq(&def.sources()[1], &json));
        assert!(Arc::ptr_eq(&def.sources()[2], &fresh));
    }

    #[test]
    fn test_converge_rebinds_locked_specs() {
        let reg = registry(MemorySource::new());
        let json = vendor_json();
        let def = definition(vec![Arc::clone(&reg), Arc::clone(&json)], vec![dep("http", ">=1.0")]);
        for spec in def.locked.iter() {
            let live = if spec.name() == "json" { &json } else { &reg };
            assert!(Arc::ptr_eq(spec.source(), live));
        }
        assert!(def.unlocked().is_empty());
    }

    #[test]
    fn test_converge_unlocks_specs_from_removed_sources() {
        let def = definition(vec![registry(MemorySource::new())], vec![dep("http", ">=1.0")]);
        assert_eq!(def.unlocked().iter().collect::<Vec<_>>(), ["json"]);
    }

    #[test]
    fn test_converge_rebinds_bound_dependencies() {
        let json = vendor_json();
        let stale = Source::detached(json.id().clone());
        let def = definition(
            vec![registry(MemorySource::new()), Arc::clone(&json)],
            vec![dep("json", "*").with_source(stale)],
        );
        assert!(Arc::ptr_eq(def.dependencies()[0].source().unwrap(), &json));
    }

    #[test]
    fn test_unlock_by_source_adds_locked_names() {
        let catalog = MemorySource::with_listings(vec![summary("http", "1.0.0")], vec![]);
        let mut def = definition(
            vec![registry(catalog.clone()), vendor_json()],
            vec![dep("http", ">=1.0")],
        );
        def.unlock(&Unlock::new().packages(["http", "zlib"]).sources(["registry"]))
            .unwrap();
        assert_eq!(
            def.unlocked().iter().collect::<Vec<_>>(),
            ["http", "socket", "zlib"]
        );
        assert_eq!(catalog.local_listings(), 0);
    }

    #[test]
    fn test_unlock_unknown_source_changes_nothing() {
        let mut def = definition(vec![registry(MemorySource::new()), vendor_json()], vec![]);
        let err = def
            .unlock(&Unlock::new().packages(["http"]).sources(["nowhere"]))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownSource(name) if name == "nowhere"));
        assert!(def.unlocked().is_empty());
    }

    #[test]
    fn test_unlock_after_specs_is_invalid() {
        let catalog = MemorySource::with_listings(vec![summary("http", "1.0.0")], vec![]);
        let mut def = definition(vec![registry(catalog), vendor_json()], vec![dep("http", ">=1.0")]);
        def.specs().unwrap();
        let err = def.unlock(&Unlock::new().packages(["http"])).unwrap_err();
        assert!(matches!(err, DefinitionError::InvalidUsage(_)));
        assert!(matches!(
            def.resolve_remotely().unwrap_err(),
            DefinitionError::InvalidUsage(_)
        ));
    }

    #[test]
    fn test_locked_specs_uses_matching_dependencies() {
        let def = definition(
            vec![registry(MemorySource::new()), vendor_json()],
            vec![dep("http", ">=1.0"), dep("json", "*")],
        );
        let locked = def.locked_specs().unwrap();
        assert_eq!(
            locked.names().into_iter().collect::<Vec<_>>(),
            ["http", "json"]
        );
    }

    #[test]
    fn test_locked_specs_excludes_unlocked_names() {
        let mut def = definition(
            vec![registry(MemorySource::new()), vendor_json()],
            vec![dep("http", ">=1.0")],
        );
        def.unlock(&Unlock::new().packages(["http"])).unwrap();
        assert!(def.locked_specs().unwrap().is_empty());
    }

    #[test]
    fn test_groups_and_platforms() {
        let def = definition(
            vec![registry(MemorySource::new())],
            vec![
                dep("http", "*").with_groups(["default", "dev"]),
                dep("mock", "*").with_groups(["dev"]),
                dep("cc", "*").with_groups(["build"]),
            ],
        );
        assert_eq!(def.groups(), ["default", "dev", "build"]);
        assert_eq!(def.platforms(), [Platform::new("x86_64-linux")]);
    }

    #[test]
    fn test_platforms_add_current() {
        let def = Definition::new(
            Some(Lockfile::parse(LOCK).unwrap()),
            vec![],
            vec![],
            DefinitionConfig::new().with_platform(Platform::new("aarch64-macos")),
        );
        assert_eq!(
            def.platforms(),
            [Platform::new("x86_64-linux"), Platform::new("aarch64-macos")]
        );
    }

    #[test]
    fn test_no_sources() {
        let local = Source::new(SourceId::Registry { remotes: vec![] }, Backend::plain(MemorySource::new()));
        let def = Definition::new(None, vec![], vec![local], config());
        assert!(def.no_sources());

        let def = Definition::new(None, vec![], vec![registry(MemorySource::new())], config());
        assert!(!def.no_sources());
    }

    #[test]
    fn test_is_exact() {
        let def = Definition::new(None, vec![], vec![], config());
        assert!(def.is_exact(&dep("http", "=1.2.0")));
        assert!(!def.is_exact(&dep("http", ">=1.2")));
    }

    #[test]
    fn test_unsatisfiable_classification() {
        let err = DefinitionError::UnsatisfiableLock(SpecSetError::Unsatisfied {
            dependency: "http".to_string(),
        });
        assert!(err.is_unsatisfiable());
        assert!(!DefinitionError::UnknownSource("x".to_string()).is_unsatisfiable());
        assert!(!DefinitionError::InvalidUsage("x").is_unsatisfiable());
    }

    fn chatty_catalog() -> MemorySource {
        MemorySource::with_listings(
            vec![
                summary("http", "1.0.0").with_post_install_message("http is ready"),
                summary("mock", "0.1.0").with_post_install_message("mock is ready"),
            ],
            vec![],
        )
    }

    fn chatty(config: DefinitionConfig) -> Definition {
        Definition::new(
            Some(Lockfile::parse(LOCK).unwrap()),
            vec![dep("http", ">=1.0"), dep("mock", "*")],
            vec![registry(chatty_catalog()), vendor_json()],
            config,
        )
    }

    #[test]
    fn test_post_install_messages_only_for_new_specs() {
        let def = chatty(config());
        assert_eq!(
            def.post_install_messages().unwrap(),
            vec![("mock".to_string(), "mock is ready".to_string())]
        );
    }

    #[test]
    fn test_post_install_messages_can_be_ignored() {
        let def = chatty(config().ignore_messages_for(["mock"]));
        assert!(def.post_install_messages().unwrap().is_empty());

        let def = chatty(config().ignore_messages());
        assert!(def.post_install_messages().unwrap().is_empty());
        assert_eq!(def.specs().unwrap().len(), 2);
    }

    #[test]
    fn test_sorted_sources_put_registry_last() {
        let git = Source::detached(SourceId::Git {
            uri: "https://github.com/example/widgets.git".to_string(),
            reference: crate::source::GitReference::DefaultBranch,
        });
        let def = Definition::new(
            None,
            vec![],
            vec![registry(MemorySource::new()), vendor_json(), git],
            config(),
        );
        let order: Vec<&str> = def.sorted_sources().iter().map(|s| s.id().section()).collect();
        assert_eq!(order, ["GIT", "PATH", "REGISTRY"]);
    }
}
