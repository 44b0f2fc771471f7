use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::manifest::{HttpUrl, InvalidUrl};

pub const DEFAULT_AUTHOR: &str = "VPM Index Maintainers";
pub const DEFAULT_ID: &str = "com.example.vpm";
pub const DEFAULT_NAME: &str = "Example VPM Repository";
pub const DEFAULT_URL: &str = "https://example.com/vpm/index.json";
pub const DEFAULT_PACKAGES_DIR: &str = "packages";
pub const DEFAULT_OUTPUT: &str = "index.json";
pub const DEFAULT_RELEASE_HOST: &str = "github.com";
pub const DEFAULT_RELEASE_API: &str = "https://api.github.com";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything one build run needs; there is no other global state.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub repository: RepositoryInfo,
    pub packages_dir: PathBuf,
    pub output: PathBuf,
    pub update_existing: bool,
    pub digest_policy: DigestPolicy,
    pub release: ReleaseConfig,
    pub concurrency: usize,
    pub fetch_timeout: Duration,
}

impl BuildConfig {
    pub fn new(repository: RepositoryInfo) -> Self {
        Self {
            repository,
            packages_dir: PathBuf::from(DEFAULT_PACKAGES_DIR),
            output: PathBuf::from(DEFAULT_OUTPUT),
            update_existing: false,
            digest_policy: DigestPolicy::default(),
            release: ReleaseConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Apply the documented environment overrides from the process environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// `GITHUB_TOKEN`, `GITHUB_API_URL`, `VPM_INDEX_CONCURRENCY` and
    /// `VPM_INDEX_FETCH_TIMEOUT` (a humantime duration such as `30s`) are
    /// recognised.
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(token) = lookup("GITHUB_TOKEN").filter(|t| !t.trim().is_empty()) {
            self.release.token = Some(token);
        }
        if let Some(api) = lookup("GITHUB_API_URL") {
            let url = HttpUrl::parse(api.trim()).map_err(|source| ConfigError::InvalidUrl {
                key: "GITHUB_API_URL",
                source,
            })?;
            self.release.api_base = Some(url);
        }
        if let Some(raw) = lookup("VPM_INDEX_CONCURRENCY") {
            self.concurrency = raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "VPM_INDEX_CONCURRENCY",
                    value: raw.clone(),
                })?;
        }
        if let Some(raw) = lookup("VPM_INDEX_FETCH_TIMEOUT") {
            self.fetch_timeout =
                parse_timeout(&raw).ok_or_else(|| ConfigError::InvalidValue {
                    key: "VPM_INDEX_FETCH_TIMEOUT",
                    value: raw.clone(),
                })?;
        }
        Ok(self)
    }

    /// Worker pool size, never below one.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

/// Header fields of the published repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryInfo {
    pub author: String,
    pub name: String,
    pub id: String,
    pub url: HttpUrl,
}

impl RepositoryInfo {
    /// Header built from the `DEFAULT_*` constants.
    pub fn defaults() -> Result<Self, ConfigError> {
        let url = HttpUrl::parse(DEFAULT_URL).map_err(|source| ConfigError::InvalidUrl {
            key: "repository url",
            source,
        })?;
        Ok(Self {
            author: DEFAULT_AUTHOR.into(),
            name: DEFAULT_NAME.into(),
            id: DEFAULT_ID.into(),
            url,
        })
    }
}

/// Where release-asset digests are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    pub enabled: bool,
    /// Host whose `/<owner>/<repo>/releases/download/<tag>/<asset>` URLs are
    /// recognised.
    pub host: String,
    /// Overrides [`DEFAULT_RELEASE_API`].
    pub api_base: Option<HttpUrl>,
    pub token: Option<String>,
}

impl ReleaseConfig {
    /// The configured API base, or the default one.
    pub fn api_base(&self) -> Result<HttpUrl, InvalidUrl> {
        match &self.api_base {
            Some(url) => Ok(url.clone()),
            None => HttpUrl::parse(DEFAULT_RELEASE_API),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_RELEASE_HOST.into(),
            api_base: None,
            token: None,
        }
    }
}

/// What to do when no digest is declared and release metadata cannot supply
/// one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DigestPolicy {
    /// Warn, then download the artifact and hash it.
    #[default]
    Fallback,
    /// Warn and publish without a digest.
    AllowMissing,
    /// Fail the build.
    Strict,
}

impl DigestPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fallback => "fallback",
            Self::AllowMissing => "allow-missing",
            Self::Strict => "strict",
        }
    }
}

impl FromStr for DigestPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fallback" | "download" => Ok(Self::Fallback),
            "allow-missing" | "allow_missing" | "skip" => Ok(Self::AllowMissing),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidValue {
                key: "digest policy",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DigestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a fetch timeout written as a humantime duration (`90s`, `2m`).
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    humantime::parse_duration(raw.trim()).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: InvalidUrl,
    },

    #[error("unsupported {key} `{value}`")]
    InvalidValue { key: &'static str, value: String },
}
