//! Lock file (`stratum.lock`) parsing.
//!
//! The lock file records one block per source, followed by the platforms the
//! resolution was made for and the dependencies that were requested:
//!
//! ```text
//! GIT
//!   remote: https://github.com/example/widgets.git
//!   revision: 4f2a9c1
//!   branch: main
//!   specs:
//!     widgets (0.2.0)
//!       http (^1.0)
//!
//! REGISTRY
//!   remote: https://packages.stratum-lang.org
//!   specs:
//!     http (1.4.0)
//!
//! PLATFORMS
//!   x86_64-linux
//!
//! DEPENDENCIES
//!   http (>=1.0)
//!   widgets!
//! ```
//!
//! A trailing `!` marks a dependency pinned to the source its locked spec
//! came from.

use crate::dependency::Dependency;
use crate::platform::Platform;
use crate::requirement::{Requirement, RequirementError};
use crate::source::{GitReference, Source, SourceId};
use crate::spec::{LazySpec, SpecLike};
use semver::Version;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// The lock file filename.
pub const LOCK_FILE: &str = "stratum.lock";

/// Errors that can occur when reading a lock file.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("failed to read lock file: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("line {line}: unknown section '{name}'")]
    UnknownSection { line: usize, name: String },

    #[error("line {line}: '{name}' is pinned to a source but no locked spec records one")]
    UnknownSource { line: usize, name: String },

    #[error("line {line}: invalid version '{version}': {reason}")]
    InvalidVersion {
        line: usize,
        version: String,
        reason: String,
    },

    #[error("line {line}: {error}")]
    InvalidRequirement {
        line: usize,
        #[source]
        error: RequirementError,
    },
}

/// The contents of a lock file.
///
/// Sources are detached: they carry identity (and a git revision, when one
/// was recorded) but cannot list candidates until they are matched against
/// the live sources of a manifest.
#[derive(Debug, Clone, Default)]
pub struct Lockfile {
    pub sources: Vec<Arc<Source>>,
    pub specs: Vec<LazySpec>,
    pub dependencies: Vec<Dependency>,
    pub platforms: Vec<Platform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Registry,
    Path,
    Git,
}

/// A source block whose `specs:` line has not been reached yet.
#[derive(Debug, Default)]
struct PendingSource {
    remotes: Vec<String>,
    revision: Option<String>,
    reference: Option<GitReference>,
}

/// A `DEPENDENCIES` entry awaiting source binding.
#[derive(Debug)]
struct Requested {
    line: usize,
    name: String,
    requirement: Requirement,
    is_pinned: bool,
}

#[derive(Debug)]
enum Section {
    None,
    Header(Kind, PendingSource),
    Specs(Arc<Source>),
    Platforms,
    Dependencies,
}

impl Lockfile {
    /// Load a lock file from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse lock file text.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending line.
    pub fn parse(content: &str) -> Result<Self, LockError> {
        let mut lock = Self::default();
        let mut section = Section::None;
        let mut requested: Vec<Requested> = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let text = raw.trim_end();

            if text.is_empty() {
                if let Section::Header(..) = section {
                    return Err(malformed(line, "source block ended before its specs"));
                }
                section = Section::None;
                continue;
            }

            let indent = text.len() - text.trim_start().len();
            let body = text.trim_start();

            if indent == 0 {
                section = match body {
                    "REGISTRY" => Section::Header(Kind::Registry, PendingSource::default()),
                    "PATH" => Section::Header(Kind::Path, PendingSource::default()),
                    "GIT" => Section::Header(Kind::Git, PendingSource::default()),
                    "PLATFORMS" => Section::Platforms,
                    "DEPENDENCIES" => Section::Dependencies,
                    other => {
                        return Err(LockError::UnknownSection {
                            line,
                            name: other.to_string(),
                        })
                    }
                };
                continue;
            }

            match &mut section {
                Section::None => return Err(malformed(line, "entry outside of any section")),

                Section::Header(kind, pending) => {
                    if indent != 2 {
                        return Err(malformed(line, "expected a source attribute"));
                    }
                    if body == "specs:" {
                        let source = pending_into_source(*kind, std::mem::take(pending), line)?;
                        lock.sources.push(Arc::clone(&source));
                        section = Section::Specs(source);
                        continue;
                    }
                    let Some((key, value)) = body.split_once(": ") else {
                        return Err(malformed(line, "expected `key: value`"));
                    };
                    let value = value.to_string();
                    match key {
                        "remote" => pending.remotes.push(value),
                        "revision" => pending.revision = Some(value),
                        "branch" => pending.reference = Some(GitReference::Branch(value)),
                        "tag" => pending.reference = Some(GitReference::Tag(value)),
                        "ref" => pending.reference = Some(GitReference::Rev(value)),
                        other => {
                            return Err(malformed(line, format!("unknown source attribute '{other}'")))
                        }
                    }
                }

                Section::Specs(source) => match indent {
                    4 => lock.specs.push(parse_spec(body, source, line)?),
                    6 => {
                        let (name, requirement) = parse_dependency(body, line)?;
                        let Some(spec) = lock.specs.last_mut() else {
                            return Err(malformed(line, "dependency listed before any spec"));
                        };
                        spec.push_dependency(Dependency::new(name, requirement));
                    }
                    _ => return Err(malformed(line, "unexpected indentation in specs")),
                },

                Section::Platforms => {
                    if indent != 2 {
                        return Err(malformed(line, "unexpected indentation in PLATFORMS"));
                    }
                    lock.platforms.push(Platform::new(body));
                }

                Section::Dependencies => {
                    if indent != 2 {
                        return Err(malformed(line, "unexpected indentation in DEPENDENCIES"));
                    }
                    let (entry, is_pinned) = match body.strip_suffix('!') {
                        Some(entry) => (entry, true),
                        None => (body, false),
                    };
                    let (name, requirement) = parse_dependency(entry, line)?;
                    requested.push(Requested {
                        line,
                        name,
                        requirement,
                        is_pinned,
                    });
                }
            }
        }

        if let Section::Header(..) = section {
            return Err(malformed(content.lines().count(), "source block ended before its specs"));
        }

        // Pinned dependencies take the source of their locked spec, so they
        // are bound once every block has been read.
        for entry in requested {
            let dependency = Dependency::new(entry.name, entry.requirement);
            let dependency = if entry.is_pinned {
                let Some(spec) = lock.specs.iter().find(|s| s.name() == dependency.name()) else {
                    return Err(LockError::UnknownSource {
                        line: entry.line,
                        name: dependency.name().to_string(),
                    });
                };
                dependency.with_source(Arc::clone(spec.source()))
            } else {
                dependency
            };
            lock.dependencies.push(dependency);
        }

        Ok(lock)
    }
}

fn malformed(line: usize, reason: impl Into<String>) -> LockError {
    LockError::Malformed {
        line,
        reason: reason.into(),
    }
}

fn pending_into_source(kind: Kind, pending: PendingSource, line: usize) -> Result<Arc<Source>, LockError> {
    let id = match kind {
        Kind::Registry => SourceId::Registry {
            remotes: pending.remotes,
        },
        Kind::Path => match pending.remotes.as_slice() {
            [path] => SourceId::Path {
                path: PathBuf::from(path),
            },
            _ => return Err(malformed(line, "a PATH source needs exactly one remote")),
        },
        Kind::Git => match pending.remotes.as_slice() {
            [uri] => SourceId::Git {
                uri: uri.clone(),
                reference: pending.reference.unwrap_or(GitReference::DefaultBranch),
            },
            _ => return Err(malformed(line, "a GIT source needs exactly one remote")),
        },
    };
    Ok(Source::detached_at(id, pending.revision))
}

/// Split `name` or `name (inner)`.
fn split_entry(entry: &str, line: usize) -> Result<(String, Option<&str>), LockError> {
    match entry.split_once(" (") {
        Some((name, rest)) => {
            let inner = rest
                .strip_suffix(')')
                .ok_or_else(|| malformed(line, "unterminated parenthesis"))?;
            Ok((name.to_string(), Some(inner)))
        }
        None if entry.contains(char::is_whitespace) => {
            Err(malformed(line, format!("unexpected entry '{entry}'")))
        }
        None => Ok((entry.to_string(), None)),
    }
}

fn parse_spec(entry: &str, source: &Arc<Source>, line: usize) -> Result<LazySpec, LockError> {
    let (name, inner) = split_entry(entry, line)?;
    let inner = inner.ok_or_else(|| malformed(line, format!("spec '{name}' has no version")))?;
    let (version, platform) = match inner.split_once(' ') {
        Some((version, platform)) => (version, Some(Platform::new(platform))),
        None => (inner, None),
    };
    let version = Version::parse(version).map_err(|e| LockError::InvalidVersion {
        line,
        version: version.to_string(),
        reason: e.to_string(),
    })?;

    let spec = LazySpec::new(name, version, Arc::clone(source));
    Ok(match platform {
        Some(platform) => spec.with_platform(platform),
        None => spec,
    })
}

fn parse_dependency(entry: &str, line: usize) -> Result<(String, Requirement), LockError> {
    let (name, inner) = split_entry(entry, line)?;
    let requirement = match inner {
        Some(req) => Requirement::parse(req).map_err(|error| LockError::InvalidRequirement { line, error })?,
        None => Requirement::any(),
    };
    Ok((name, requirement))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
GIT
  remote: https://github.com/example/widgets.git
  revision: 4f2a9c1
  branch: main
  specs:
    widgets (0.2.0)
      http (^1.0)

PATH
  remote: vendor/json
  specs:
    json (1.1.0)

REGISTRY
  remote: https://packages.stratum-lang.org
  specs:
    crypto (2.0.0 x86_64-linux)
    http (1.4.0)
      socket (>=0.3, <0.5)
    socket (0.4.2-beta.1)

PLATFORMS
  x86_64-linux

DEPENDENCIES
  crypto
  http (>=1.0)
  json!
  widgets!
";

    #[test]
    fn parse_sources() {
        let lock = Lockfile::parse(SAMPLE).unwrap();
        assert_eq!(lock.sources.len(), 3);
        assert_eq!(
            lock.sources[0].id(),
            &SourceId::Git {
                uri: "https://github.com/example/widgets.git".to_string(),
                reference: GitReference::Branch("main".to_string()),
            }
        );
        assert_eq!(lock.sources[0].revision().as_deref(), Some("4f2a9c1"));
        assert_eq!(
            lock.sources[1].id(),
            &SourceId::Path {
                path: PathBuf::from("vendor/json")
            }
        );
        assert!(lock.sources[2].id().is_registry());
    }

    #[test]
    fn parse_specs() {
        let lock = Lockfile::parse(SAMPLE).unwrap();
        let names: Vec<String> = lock.specs.iter().map(SpecLike::full_name).collect();
        assert_eq!(
            names,
            [
                "widgets-0.2.0",
                "json-1.1.0",
                "crypto-2.0.0-x86_64-linux",
                "http-1.4.0",
                "socket-0.4.2-beta.1"
            ]
        );

        let http = &lock.specs[3];
        assert!(Arc::ptr_eq(http.source(), &lock.sources[2]));
        assert_eq!(http.dependencies().len(), 1);
        assert_eq!(http.dependencies()[0].to_string(), "socket (>=0.3, <0.5)");
    }

    #[test]
    fn parse_platforms_and_dependencies() {
        let lock = Lockfile::parse(SAMPLE).unwrap();
        assert_eq!(lock.platforms, vec![Platform::new("x86_64-linux")]);

        let deps: Vec<String> = lock.dependencies.iter().map(ToString::to_string).collect();
        assert_eq!(deps, ["crypto", "http (>=1.0)", "json", "widgets"]);
        assert!(lock.dependencies[0].source().is_none());
        assert!(Arc::ptr_eq(
            lock.dependencies[2].source().unwrap(),
            &lock.sources[1]
        ));
        assert!(Arc::ptr_eq(
            lock.dependencies[3].source().unwrap(),
            &lock.sources[0]
        ));
    }

    #[test]
    fn empty_lock_file() {
        let lock = Lockfile::parse("").unwrap();
        assert!(lock.sources.is_empty());
        assert!(lock.specs.is_empty());
    }

    #[test]
    fn unknown_section() {
        let err = Lockfile::parse("BUNDLED WITH\n  2.0\n").unwrap_err();
        assert!(matches!(err, LockError::UnknownSection { line: 1, .. }));
    }

    #[test]
    fn pinned_dependency_without_spec() {
        let err = Lockfile::parse("DEPENDENCIES\n  ghost!\n").unwrap_err();
        assert!(matches!(err, LockError::UnknownSource { line: 2, ref name } if name == "ghost"));
    }

    #[test]
    fn invalid_version() {
        let text = "REGISTRY\n  specs:\n    http (one)\n";
        let err = Lockfile::parse(text).unwrap_err();
        assert!(matches!(err, LockError::InvalidVersion { line: 3, .. }));
    }

    #[test]
    fn spec_before_specs_line() {
        let text = "REGISTRY\n  remote: https://packages.stratum-lang.org\n    http (1.0.0)\n";
        let err = Lockfile::parse(text).unwrap_err();
        assert!(matches!(err, LockError::Malformed { line: 3, .. }));
    }

    #[test]
    fn from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);
        std::fs::write(&path, SAMPLE).unwrap();
        let lock = Lockfile::from_path(&path).unwrap();
        assert_eq!(lock.specs.len(), 5);
    }
}
