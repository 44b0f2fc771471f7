//! Repository document and the merge that folds manifests into it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::RepositoryInfo;
use crate::error::{BuildError, BuildResult, SchemaError, SchemaKind};
use crate::manifest::{HttpUrl, Manifest};

/// All known versions of a single package, keyed by version string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageIndex {
    versions: BTreeMap<String, Manifest>,
}

impl PackageIndex {
    pub fn new(manifest: Manifest) -> Self {
        let mut versions = BTreeMap::new();
        versions.insert(manifest.version.clone(), manifest);
        Self { versions }
    }

    pub fn versions(&self) -> &BTreeMap<String, Manifest> {
        &self.versions
    }

    pub fn get(&self, version: &str) -> Option<&Manifest> {
        self.versions.get(version)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Insert a new version, refusing duplicates and foreign package names.
    pub fn insert(&mut self, manifest: Manifest) -> BuildResult<()> {
        if let Some(foreign) = self.versions.values().find(|m| m.name != manifest.name) {
            return Err(BuildError::NameMismatch {
                package: manifest.name,
                version: foreign.version.clone(),
                found: foreign.name.clone(),
            });
        }
        if self.versions.contains_key(&manifest.version) {
            return Err(BuildError::DuplicateVersion {
                package: manifest.name,
                version: manifest.version,
            });
        }
        self.versions.insert(manifest.version.clone(), manifest);
        Ok(())
    }
}

/// Top-level published index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub author: String,
    pub name: String,
    pub id: String,
    pub url: HttpUrl,
    #[serde(default)]
    pub packages: BTreeMap<String, PackageIndex>,
}

impl Repository {
    pub fn new(info: &RepositoryInfo) -> Self {
        Self {
            author: info.author.clone(),
            name: info.name.clone(),
            id: info.id.clone(),
            url: info.url.clone(),
            packages: BTreeMap::new(),
        }
    }

    /// Read a persisted repository document.
    pub fn load(path: &Path) -> BuildResult<Self> {
        let raw = fs::read(path).map_err(|err| BuildError::io(path, err))?;
        Self::from_slice(&raw).map_err(|source| BuildError::Schema {
            kind: SchemaKind::Repository,
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a repository document, checking that every entry is valid and
    /// filed under its own package name and version.
    pub fn from_slice(raw: &[u8]) -> Result<Self, SchemaError> {
        let repository: Self = serde_json::from_slice(raw)?;
        for (package, index) in &repository.packages {
            for (version, manifest) in &index.versions {
                manifest.validate()?;
                if &manifest.name != package || &manifest.version != version {
                    return Err(SchemaError::MisplacedEntry {
                        package: package.clone(),
                        version: version.clone(),
                        found_name: manifest.name.clone(),
                        found_version: manifest.version.clone(),
                    });
                }
            }
        }
        Ok(repository)
    }

    /// Replace the header fields, keeping the package listing.
    pub fn with_info(mut self, info: &RepositoryInfo) -> Self {
        self.author = info.author.clone();
        self.name = info.name.clone();
        self.id = info.id.clone();
        self.url = info.url.clone();
        self
    }

    pub fn package(&self, name: &str) -> Option<&PackageIndex> {
        self.packages.get(name)
    }

    pub fn version_count(&self) -> usize {
        self.packages.values().map(PackageIndex::len).sum()
    }
}

/// Folds manifests into a repository.
///
/// Versions already present when the builder is created count as persisted:
/// each may be re-supplied once by an identical manifest without error, so
/// rebuilding an unchanged input set in update mode is a no-op.
#[derive(Debug)]
pub struct IndexBuilder {
    repository: Repository,
    persisted: BTreeSet<(String, String)>,
}

impl IndexBuilder {
    pub fn new(repository: Repository) -> Self {
        let persisted = repository
            .packages
            .iter()
            .flat_map(|(package, index)| {
                index
                    .versions
                    .keys()
                    .map(move |version| (package.clone(), version.clone()))
            })
            .collect();
        Self {
            repository,
            persisted,
        }
    }

    pub fn add(&mut self, manifest: Manifest) -> BuildResult<()> {
        let Some(index) = self.repository.packages.get_mut(&manifest.name) else {
            tracing::debug!(package = %manifest.name, "adding new package to repository");
            self.repository
                .packages
                .insert(manifest.name.clone(), PackageIndex::new(manifest));
            return Ok(());
        };

        let key = (manifest.name.clone(), manifest.version.clone());
        if self.persisted.contains(&key)
            && index.get(&manifest.version) == Some(&manifest)
            && index.versions.values().all(|m| m.name == manifest.name)
        {
            self.persisted.remove(&key);
            tracing::debug!(
                package = %manifest.name,
                version = %manifest.version,
                "version already published unchanged"
            );
            return Ok(());
        }
        index.insert(manifest)
    }

    pub fn finish(self) -> Repository {
        self.repository
    }
}

/// Merge `manifests` into `repository`.
pub fn merge(
    repository: Repository,
    manifests: impl IntoIterator<Item = Manifest>,
) -> BuildResult<Repository> {
    let mut builder = IndexBuilder::new(repository);
    for manifest in manifests {
        builder.add(manifest)?;
    }
    Ok(builder.finish())
}

/// Reject duplicate `(name, version)` pairs before any digest is resolved.
///
/// Two inputs sharing a pair always collide. An input matching a version
/// already in `repository` passes only if it can still resolve to exactly
/// the persisted entry; [`merge`] makes the final call once digests are known.
pub fn check_unique<'a>(
    repository: &Repository,
    manifests: impl IntoIterator<Item = &'a Manifest>,
) -> BuildResult<()> {
    let mut seen = BTreeSet::new();
    for manifest in manifests {
        let repeated = !seen.insert((manifest.name.as_str(), manifest.version.as_str()));
        let conflicts_with_persisted = repository
            .package(&manifest.name)
            .and_then(|index| index.get(&manifest.version))
            .is_some_and(|persisted| !may_resupply(persisted, manifest));
        if repeated || conflicts_with_persisted {
            return Err(BuildError::DuplicateVersion {
                package: manifest.name.clone(),
                version: manifest.version.clone(),
            });
        }
    }
    Ok(())
}

/// An input without a digest may still gain the persisted one.
fn may_resupply(persisted: &Manifest, candidate: &Manifest) -> bool {
    match candidate.content_digest {
        Some(_) => candidate == persisted,
        None => {
            let completed = Manifest {
                content_digest: persisted.content_digest.clone(),
                ..candidate.clone()
            };
            &completed == persisted
        }
    }
}
