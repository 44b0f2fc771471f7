use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use vpm_index_core::config::{
    BuildConfig, DEFAULT_AUTHOR, DEFAULT_ID, DEFAULT_NAME, DEFAULT_OUTPUT, DEFAULT_PACKAGES_DIR,
    DEFAULT_URL, DigestPolicy, RepositoryInfo, parse_timeout,
};
use vpm_index_core::HttpUrl;

const LEGACY_ARITY: usize = 5;

#[derive(Debug, Parser)]
#[command(
    name = "vpm-index",
    version,
    about = "Build a VPM repository index from per-version package manifests"
)]
pub struct Cli {
    /// Legacy form: AUTHOR ID NAME URL OUTPUT
    #[arg(
        value_name = "ARGS",
        conflicts_with_all = ["author", "id", "name", "url", "output"]
    )]
    legacy: Vec<String>,

    /// Repository author
    #[arg(long, default_value = DEFAULT_AUTHOR)]
    author: String,

    /// Repository id
    #[arg(long, default_value = DEFAULT_ID)]
    id: String,

    /// Repository display name
    #[arg(long, default_value = DEFAULT_NAME)]
    name: String,

    /// Public URL of the published repository file
    #[arg(long, default_value = DEFAULT_URL)]
    url: String,

    /// Directory of package manifests (`*.json`)
    #[arg(long, value_name = "DIR", default_value = DEFAULT_PACKAGES_DIR)]
    packages_dir: PathBuf,

    /// Repository file to write
    #[arg(long, short, value_name = "PATH", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Merge into the existing output file instead of starting empty
    #[arg(long)]
    update: bool,

    /// What to do when no release digest is published: fallback, allow-missing or strict
    #[arg(long, value_name = "POLICY", default_value_t = DigestPolicy::default())]
    digest_policy: DigestPolicy,

    /// Skip the release-asset metadata lookup
    #[arg(long)]
    no_release_lookup: bool,

    /// Host whose release download URLs are looked up
    #[arg(long, value_name = "HOST")]
    release_host: Option<String>,

    /// Release API base URL
    #[arg(long, value_name = "URL")]
    release_api: Option<String>,

    /// Maximum concurrent digest resolutions
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Per-request timeout, e.g. `30s` or `2m`
    #[arg(long, value_name = "DURATION", value_parser = parse_fetch_timeout)]
    fetch_timeout: Option<Duration>,

    /// Log at debug level
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    /// Process environment overrides first, then explicit flags on top.
    pub fn into_config(self) -> Result<BuildConfig> {
        self.into_config_with(|key| std::env::var(key).ok())
    }

    pub fn into_config_with(self, env: impl Fn(&str) -> Option<String>) -> Result<BuildConfig> {
        let (author, id, name, url, output) = match self.legacy.as_slice() {
            [] => (self.author, self.id, self.name, self.url, self.output),
            [author, id, name, url, output] => (
                author.clone(),
                id.clone(),
                name.clone(),
                url.clone(),
                PathBuf::from(output),
            ),
            other => bail!(
                "expected {LEGACY_ARITY} positional arguments (AUTHOR ID NAME URL OUTPUT), got {}",
                other.len()
            ),
        };
        let repository = RepositoryInfo {
            author,
            id,
            name,
            url: HttpUrl::parse(&url).context("invalid repository url")?,
        };

        let mut cfg = BuildConfig::new(repository)
            .with_env_lookup(env)
            .context("invalid environment configuration")?;
        cfg.packages_dir = self.packages_dir;
        cfg.output = output;
        cfg.update_existing = self.update;
        cfg.digest_policy = self.digest_policy;
        cfg.release.enabled = !self.no_release_lookup;
        if let Some(host) = self.release_host {
            cfg.release.host = host;
        }
        if let Some(api) = self.release_api {
            cfg.release.api_base =
                Some(HttpUrl::parse(&api).context("invalid --release-api")?);
        }
        if let Some(concurrency) = self.concurrency {
            cfg.concurrency = concurrency;
        }
        if let Some(timeout) = self.fetch_timeout {
            cfg.fetch_timeout = timeout;
        }
        Ok(cfg)
    }
}

fn parse_fetch_timeout(raw: &str) -> Result<Duration, String> {
    parse_timeout(raw).ok_or_else(|| format!("`{raw}` is not a duration such as 30s or 2m"))
}
