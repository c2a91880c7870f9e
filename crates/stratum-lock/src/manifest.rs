//! Stratum package manifest (`stratum.toml`) parsing and validation.
//!
//! Only the parts that feed dependency resolution are modelled: the package
//! identity, the registries packages may come from, and the three dependency
//! sections. Other tables are ignored.

use crate::dependency::{Dependency as Requested, DEFAULT_GROUP};
use crate::requirement::{Requirement, RequirementError};
use crate::source::{GitReference, SourceId};
use crate::spec::Summary;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The manifest filename.
pub const MANIFEST_FILE: &str = "stratum.toml";

/// The registry used when a manifest lists none.
pub const DEFAULT_REGISTRY: &str = "https://packages.stratum-lang.org";

/// Group assigned to `[dev-dependencies]`.
pub const DEV_GROUP: &str = "dev";

/// Group assigned to `[build-dependencies]`.
pub const BUILD_GROUP: &str = "build";

/// Errors that can occur when working with manifests.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid package name '{0}': {1}")]
    InvalidName(String, &'static str),

    #[error("invalid version '{0}': {1}")]
    InvalidVersion(String, String),

    #[error("invalid requirement for dependency '{0}': {1}")]
    InvalidRequirement(String, RequirementError),

    #[error("dependency '{0}' is declared more than once with different requirements")]
    DuplicateDependency(String),
}

/// The parts of `stratum.toml` that drive resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Package metadata (required).
    pub package: Package,

    /// Registry remotes packages may be fetched from.
    #[serde(default = "default_sources")]
    pub source: Vec<String>,

    /// Runtime dependencies.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,

    /// Development-only dependencies.
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<String, DependencySpec>,

    /// Build-time dependencies.
    #[serde(default, rename = "build-dependencies")]
    pub build_dependencies: BTreeMap<String, DependencySpec>,
}

fn default_sources() -> Vec<String> {
    vec![DEFAULT_REGISTRY.to_string()]
}

/// Package metadata section.
#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    /// Package name (required).
    pub name: String,

    /// Package version (required, semver).
    pub version: String,

    /// Stratum language edition.
    #[serde(default)]
    pub edition: Option<String>,

    /// Short description.
    #[serde(default)]
    pub description: Option<String>,

    /// Message shown to users after the package is installed.
    #[serde(default, rename = "post-install-message")]
    pub post_install_message: Option<String>,
}

/// Dependency specification.
///
/// Can be either a simple version string or a detailed specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// Simple version string: `"1.0"` or `"^2.1.0"`.
    Simple(String),

    /// Detailed dependency specification.
    Detailed(DetailedDependency),
}

impl DependencySpec {
    /// Returns the version requirement string if specified.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Simple(v) => Some(v),
            Self::Detailed(d) => d.version.as_deref(),
        }
    }

    /// The source this dependency is pinned to, if it is a path or git dependency.
    #[must_use]
    pub fn source_id(&self) -> Option<SourceId> {
        let Self::Detailed(dep) = self else {
            return None;
        };

        if let Some(ref path) = dep.path {
            Some(SourceId::Path {
                path: PathBuf::from(path),
            })
        } else if let Some(ref git) = dep.git {
            let reference = if let Some(ref branch) = dep.branch {
                GitReference::Branch(branch.clone())
            } else if let Some(ref tag) = dep.tag {
                GitReference::Tag(tag.clone())
            } else if let Some(ref rev) = dep.rev {
                GitReference::Rev(rev.clone())
            } else {
                GitReference::DefaultBranch
            };
            Some(SourceId::Git {
                uri: git.clone(),
                reference,
            })
        } else {
            None
        }
    }

    fn requirement(&self, name: &str) -> Result<Requirement, ManifestError> {
        match self.version() {
            Some(version) => Requirement::parse(version)
                .map_err(|e| ManifestError::InvalidRequirement(name.to_string(), e)),
            None => Ok(Requirement::any()),
        }
    }
}

/// Detailed dependency specification.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetailedDependency {
    /// Version requirement.
    #[serde(default)]
    pub version: Option<String>,

    /// Path to local dependency.
    #[serde(default)]
    pub path: Option<String>,

    /// Git repository URL.
    #[serde(default)]
    pub git: Option<String>,

    /// Git branch name.
    #[serde(default)]
    pub branch: Option<String>,

    /// Git tag name.
    #[serde(default)]
    pub tag: Option<String>,

    /// Git commit revision.
    #[serde(default)]
    pub rev: Option<String>,
}

/// A dependency as declared in the manifest, before sources are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredDependency {
    pub name: String,
    pub requirement: Requirement,
    pub groups: Vec<String>,
    pub source: Option<SourceId>,
}

impl Manifest {
    /// Load a manifest from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse a manifest from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or missing required fields.
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest.
    fn validate(&self) -> Result<(), ManifestError> {
        self.validate_name()?;
        self.validate_version()?;
        Ok(())
    }

    /// Validate the package name.
    fn validate_name(&self) -> Result<(), ManifestError> {
        let name = &self.package.name;

        if name.is_empty() {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name cannot be empty",
            ));
        }

        if name.len() > 64 {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name cannot exceed 64 characters",
            ));
        }

        // Must start with a letter
        if !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name must start with a letter",
            ));
        }

        // Only alphanumeric, hyphens, and underscores
        if name
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '-' && c != '_')
        {
            return Err(ManifestError::InvalidName(
                name.clone(),
                "name can only contain letters, numbers, hyphens, and underscores",
            ));
        }

        Ok(())
    }

    /// Validate the version string.
    fn validate_version(&self) -> Result<(), ManifestError> {
        self.parsed_version().map(|_| ())
    }

    fn parsed_version(&self) -> Result<semver::Version, ManifestError> {
        let version = &self.package.version;
        semver::Version::parse(version)
            .map_err(|e| ManifestError::InvalidVersion(version.clone(), e.to_string()))
    }

    /// The registry every unpinned dependency is resolved against.
    #[must_use]
    pub fn registry(&self) -> SourceId {
        SourceId::Registry {
            remotes: self.source.clone(),
        }
    }

    /// Every declared dependency, merged across sections.
    ///
    /// A package listed in several sections becomes one dependency carrying
    /// every section's group, as long as the declarations agree.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid requirement or for conflicting
    /// declarations of the same package.
    pub fn declared_dependencies(&self) -> Result<Vec<DeclaredDependency>, ManifestError> {
        let sections = [
            (DEFAULT_GROUP, &self.dependencies),
            (DEV_GROUP, &self.dev_dependencies),
            (BUILD_GROUP, &self.build_dependencies),
        ];

        let mut declared: Vec<DeclaredDependency> = Vec::new();
        for (group, section) in sections {
            for (name, spec) in section {
                let requirement = spec.requirement(name)?;
                let source = spec.source_id();

                if let Some(existing) = declared.iter_mut().find(|d| &d.name == name) {
                    if existing.requirement != requirement || existing.source != source {
                        return Err(ManifestError::DuplicateDependency(name.clone()));
                    }
                    existing.groups.push(group.to_string());
                    continue;
                }

                declared.push(DeclaredDependency {
                    name: name.clone(),
                    requirement,
                    groups: vec![group.to_string()],
                    source,
                });
            }
        }
        Ok(declared)
    }

    /// Describe this package as a resolution candidate.
    ///
    /// Only runtime dependencies are part of the candidate's graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the version or a requirement is invalid.
    pub fn summary(&self) -> Result<Summary, ManifestError> {
        let mut summary = Summary::new(self.package.name.clone(), self.parsed_version()?);
        for (name, spec) in &self.dependencies {
            summary = summary.with_dependency(Requested::new(name.clone(), spec.requirement(name)?));
        }
        summary.post_install_message = self.package.post_install_message.clone();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_manifest() {
        let toml = r#"
[package]
name = "test-pkg"
version = "0.1.0"
edition = "2025"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.package.name, "test-pkg");
        assert_eq!(manifest.package.version, "0.1.0");
        assert_eq!(manifest.source, vec![DEFAULT_REGISTRY.to_string()]);
    }

    #[test]
    fn parse_full_manifest() {
        let toml = r#"
source = ["https://mirror.example.com", "https://packages.example.com"]

[package]
name = "my-app"
version = "1.2.3"
edition = "2025"
description = "A sample Stratum application"

[dependencies]
http = "1.0"
json = { version = "2.1" }

[dev-dependencies]
test-utils = "0.5"

[[bin]]
name = "my-app"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.package.name, "my-app");
        assert_eq!(manifest.dependencies.len(), 2);
        assert_eq!(manifest.dev_dependencies.len(), 1);
        assert_eq!(
            manifest.registry(),
            SourceId::Registry {
                remotes: vec![
                    "https://mirror.example.com".to_string(),
                    "https://packages.example.com".to_string()
                ]
            }
        );
    }

    #[test]
    fn parse_path_dependency() {
        let toml = r#"
[package]
name = "test"
version = "0.1.0"

[dependencies]
local-lib = { path = "../local-lib" }
"#;
        let manifest = Manifest::parse(toml).unwrap();
        let dep = &manifest.dependencies["local-lib"];
        assert_eq!(
            dep.source_id(),
            Some(SourceId::Path {
                path: PathBuf::from("../local-lib")
            })
        );
    }

    #[test]
    fn parse_git_dependency() {
        let toml = r#"
[package]
name = "test"
version = "0.1.0"

[dependencies]
remote-lib = { git = "https://github.com/example/lib", branch = "main" }
"#;
        let manifest = Manifest::parse(toml).unwrap();
        let dep = &manifest.dependencies["remote-lib"];
        assert_eq!(
            dep.source_id(),
            Some(SourceId::Git {
                uri: "https://github.com/example/lib".to_string(),
                reference: GitReference::Branch("main".to_string()),
            })
        );
    }

    #[test]
    fn invalid_name_empty() {
        let toml = r#"
[package]
name = ""
version = "0.1.0"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName(..)));
    }

    #[test]
    fn invalid_name_starts_with_number() {
        let toml = r#"
[package]
name = "123pkg"
version = "0.1.0"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidName(..)));
    }

    #[test]
    fn invalid_version() {
        let toml = r#"
[package]
name = "test"
version = "not-a-version"
"#;
        let err = Manifest::parse(toml).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidVersion(..)));
    }

    #[test]
    fn unknown_dependency_key() {
        let toml = r#"
[package]
name = "test"
version = "0.1.0"

[dependencies]
http = { verison = "1.0" }
"#;
        assert!(Manifest::parse(toml).is_err());
    }

    #[test]
    fn declared_dependencies_merge_groups() {
        let toml = r#"
[package]
name = "test"
version = "0.1.0"

[dependencies]
http = ">=1.0"

[dev-dependencies]
http = ">=1.0"
mock = "*"
"#;
        let declared = Manifest::parse(toml).unwrap().declared_dependencies().unwrap();
        assert_eq!(declared.len(), 2);
        assert_eq!(declared[0].name, "http");
        assert_eq!(declared[0].groups, vec!["default", "dev"]);
        assert_eq!(declared[1].groups, vec!["dev"]);
        assert!(declared[1].requirement.is_any());
    }

    #[test]
    fn declared_dependencies_reject_conflicts() {
        let toml = r#"
[package]
name = "test"
version = "0.1.0"

[dependencies]
http = "^1.0"

[build-dependencies]
http = "^2.0"
"#;
        let err = Manifest::parse(toml).unwrap().declared_dependencies().unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateDependency(name) if name == "http"));
    }

    #[test]
    fn summary_uses_runtime_dependencies() {
        let toml = r#"
[package]
name = "widgets"
version = "0.4.0"
post-install-message = "Run `widgets setup` to finish."

[dependencies]
http = "^1.0"

[dev-dependencies]
mock = "*"
"#;
        let summary = Manifest::parse(toml).unwrap().summary().unwrap();
        assert_eq!(summary.name, "widgets");
        assert_eq!(summary.version, semver::Version::new(0, 4, 0));
        assert_eq!(summary.dependencies.len(), 1);
        assert_eq!(
            summary.post_install_message.as_deref(),
            Some("Run `widgets setup` to finish.")
        );
    }
}
