//! Makes sure every manifest entering the index carries a trustworthy
//! `zipSHA256`, or that leaving it empty is allowed by the digest policy.
//!
//! Manifests that declare a digest are always verified by downloading the
//! artifact. Manifests without one first ask the release host for a published
//! asset digest; when that fails the [`DigestPolicy`] decides what happens.

use std::sync::Arc;

use crate::config::{BuildConfig, DigestPolicy};
use crate::digest::Sha256Digest;
use crate::error::{BuildError, BuildResult, IntegrityError, UnresolvedDigest};
use crate::manifest::Manifest;

pub use archive::verify_archive;
pub use fetch::{ArtifactFetcher, HttpFetcher};
pub use release::{
    GithubReleases, ReleaseAsset, ReleaseCoordinates, ReleaseMetadata, lookup_digest,
};

mod archive;
mod fetch;
mod release;

/// How a manifest ended up with (or without) its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestSource {
    /// Declared by the author and confirmed against the downloaded artifact.
    Verified,
    /// Taken from release-asset metadata.
    ReleaseMetadata,
    /// Computed from the downloaded artifact.
    Computed,
    /// Left empty under [`DigestPolicy::AllowMissing`].
    Missing,
}

/// A manifest after digest resolution.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub manifest: Manifest,
    pub source: DigestSource,
}

pub struct IntegrityResolver {
    policy: DigestPolicy,
    release_host: Option<String>,
    release: Arc<dyn ReleaseMetadata>,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl IntegrityResolver {
    /// `release_host` of `None` disables the release-metadata strategy.
    pub fn new(
        policy: DigestPolicy,
        release_host: Option<String>,
        release: Arc<dyn ReleaseMetadata>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        Self {
            policy,
            release_host,
            release,
            fetcher,
        }
    }

    /// Resolver talking to the real release API and artifact hosts.
    pub fn from_config(cfg: &BuildConfig) -> BuildResult<Self> {
        let release = GithubReleases::new(&cfg.release, cfg.fetch_timeout)
            .map_err(|reason| BuildError::HttpClient { reason })?;
        let fetcher = HttpFetcher::new(cfg.fetch_timeout).map_err(|err| BuildError::HttpClient {
            reason: err.to_string(),
        })?;
        let release_host = cfg.release.enabled.then(|| cfg.release.host.clone());
        Ok(Self::new(
            cfg.digest_policy,
            release_host,
            Arc::new(release),
            Arc::new(fetcher),
        ))
    }

    pub async fn resolve(&self, mut manifest: Manifest) -> BuildResult<Resolved> {
        if let Some(declared) = manifest.content_digest.clone() {
            self.download_and_hash(&manifest, Some(&declared)).await?;
            return Ok(Resolved {
                manifest,
                source: DigestSource::Verified,
            });
        }

        let unresolved = match self.release_digest(&manifest).await {
            Ok(digest) => {
                tracing::info!(
                    package = %manifest.name,
                    version = %manifest.version,
                    digest = %digest,
                    "zipSHA256 appended from release metadata"
                );
                manifest.content_digest = Some(digest);
                return Ok(Resolved {
                    manifest,
                    source: DigestSource::ReleaseMetadata,
                });
            }
            Err(reason) => reason,
        };

        match self.policy {
            DigestPolicy::Strict => Err(BuildError::UnresolvedDigest {
                package: manifest.name,
                version: manifest.version,
                reason: unresolved,
            }),
            DigestPolicy::AllowMissing => {
                tracing::warn!(
                    package = %manifest.name,
                    version = %manifest.version,
                    reason = %unresolved,
                    "zipSHA256 is empty"
                );
                Ok(Resolved {
                    manifest,
                    source: DigestSource::Missing,
                })
            }
            DigestPolicy::Fallback => {
                tracing::warn!(
                    package = %manifest.name,
                    version = %manifest.version,
                    reason = %unresolved,
                    "no release digest, downloading artifact to compute one"
                );
                let computed = self.download_and_hash(&manifest, None).await?;
                tracing::warn!(
                    package = %manifest.name,
                    version = %manifest.version,
                    digest = %computed,
                    "zipSHA256 filled in from downloaded artifact, not authored"
                );
                manifest.content_digest = Some(computed);
                Ok(Resolved {
                    manifest,
                    source: DigestSource::Computed,
                })
            }
        }
    }

    async fn release_digest(&self, manifest: &Manifest) -> Result<Sha256Digest, UnresolvedDigest> {
        let Some(host) = self.release_host.as_deref() else {
            return Err(UnresolvedDigest::LookupDisabled);
        };
        lookup_digest(self.release.as_ref(), &manifest.url, host).await
    }

    async fn download_and_hash(
        &self,
        manifest: &Manifest,
        declared: Option<&Sha256Digest>,
    ) -> BuildResult<Sha256Digest> {
        let url = manifest.url.as_str();
        let bytes = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|reason| BuildError::Fetch {
                package: manifest.name.clone(),
                version: manifest.version.clone(),
                url: url.to_string(),
                reason,
            })?;
        let integrity = |reason| BuildError::Integrity {
            package: manifest.name.clone(),
            version: manifest.version.clone(),
            reason,
        };
        let computed = verify_archive(&bytes).map_err(integrity)?;
        if let Some(declared) = declared
            && declared != &computed
        {
            return Err(integrity(IntegrityError::DigestMismatch {
                declared: declared.clone(),
                computed,
            }));
        }
        Ok(computed)
    }
}
