//! One build run: load, resolve digests, merge, write.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::index::{Repository, check_unique, merge};
use crate::integrity::{DigestSource, IntegrityResolver, Resolved};
use crate::loader::{self, LoadedManifest};
use crate::manifest::Manifest;
use crate::serialize::write_repository;

/// Outcome of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub output: PathBuf,
    pub packages: usize,
    pub versions: usize,
    pub verified: usize,
    pub from_release: usize,
    pub computed: usize,
    pub missing: usize,
}

impl BuildSummary {
    fn record(&mut self, source: DigestSource) {
        match source {
            DigestSource::Verified => self.verified += 1,
            DigestSource::ReleaseMetadata => self.from_release += 1,
            DigestSource::Computed => self.computed += 1,
            DigestSource::Missing => self.missing += 1,
        }
    }
}

/// Run a build against the real release API and artifact hosts.
pub async fn run(cfg: &BuildConfig) -> BuildResult<BuildSummary> {
    let resolver = IntegrityResolver::from_config(cfg)?;
    run_with(cfg, Arc::new(resolver)).await
}

/// Run a build with the given resolver.
///
/// Nothing is written unless loading, every resolution and the merge all
/// succeed.
pub async fn run_with(
    cfg: &BuildConfig,
    resolver: Arc<IntegrityResolver>,
) -> BuildResult<BuildSummary> {
    let loaded = loader::load_all(&cfg.packages_dir)?;
    tracing::info!(
        manifests = loaded.len(),
        dir = %cfg.packages_dir.display(),
        "loaded package manifests"
    );

    let base = base_repository(cfg)?;
    check_unique(&base, loaded.iter().map(|l| &l.manifest))?;
    let resolved = resolve_all(resolver, loaded, cfg.effective_concurrency()).await?;

    let mut summary = BuildSummary {
        output: cfg.output.clone(),
        ..BuildSummary::default()
    };
    let manifests: Vec<Manifest> = resolved
        .into_iter()
        .map(|r| {
            summary.record(r.source);
            r.manifest
        })
        .collect();

    let repository = merge(base, manifests)?;
    summary.packages = repository.packages.len();
    summary.versions = repository.version_count();

    write_repository(&cfg.output, &repository)?;
    tracing::info!(
        output = %cfg.output.display(),
        packages = summary.packages,
        versions = summary.versions,
        verified = summary.verified,
        from_release = summary.from_release,
        computed = summary.computed,
        missing = summary.missing,
        "Updated VPM repository is {}",
        cfg.output.display()
    );
    Ok(summary)
}

fn base_repository(cfg: &BuildConfig) -> BuildResult<Repository> {
    if cfg.update_existing && cfg.output.is_file() {
        tracing::info!(path = %cfg.output.display(), "updating existing repository in place");
        return Ok(Repository::load(&cfg.output)?.with_info(&cfg.repository));
    }
    Ok(Repository::new(&cfg.repository))
}

/// Resolve every manifest on a pool of at most `concurrency` tasks.
///
/// The first fatal error cancels the shared token, aborts whatever is still
/// queued or in flight, and is returned. Results come back in completion
/// order.
pub async fn resolve_all(
    resolver: Arc<IntegrityResolver>,
    manifests: Vec<LoadedManifest>,
    concurrency: usize,
) -> BuildResult<Vec<Resolved>> {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    for LoadedManifest { path, manifest } in manifests {
        let resolver = Arc::clone(&resolver);
        let permits = Arc::clone(&permits);
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let work = async move {
                let _permit = permits.acquire_owned().await.map_err(|_| BuildError::Task {
                    reason: format!("worker pool closed before {} was resolved", manifest.id()),
                })?;
                tracing::debug!(
                    package = %manifest.name,
                    version = %manifest.version,
                    path = %path.display(),
                    "resolving digest"
                );
                resolver.resolve(manifest).await
            };
            tokio::select! {
                _ = cancel.cancelled() => None,
                result = work => Some(result),
            }
        });
    }

    let mut resolved = Vec::with_capacity(tasks.len());
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        let outcome = match joined {
            Ok(Some(outcome)) => outcome,
            Ok(None) => continue,
            Err(err) if err.is_cancelled() => continue,
            Err(err) => Err(BuildError::Task {
                reason: err.to_string(),
            }),
        };
        match outcome {
            Ok(done) => resolved.push(done),
            Err(err) => {
                tracing::error!(error = %err, "digest resolution failed, cancelling build");
                cancel.cancel();
                tasks.abort_all();
                failure = Some(err);
                break;
            }
        }
    }

    if let Some(err) = failure {
        while tasks.join_next().await.is_some() {}
        return Err(err);
    }
    Ok(resolved)
}
