//! Release-asset metadata lookup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::fetch::USER_AGENT;
use crate::config::ReleaseConfig;
use crate::digest::Sha256Digest;
use crate::error::UnresolvedDigest;
use crate::manifest::HttpUrl;

/// `(owner, repo, tag)` of a hosted release, plus the asset file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCoordinates {
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub asset: String,
}

impl ReleaseCoordinates {
    /// Match `https://<host>/<owner>/<repo>/releases/download/<tag>/<asset>`.
    ///
    /// Tags may contain `/`; the last segment is always the asset.
    pub fn from_url(url: &HttpUrl, host: &str) -> Option<Self> {
        let url = url.as_url();
        if !url.host_str()?.eq_ignore_ascii_case(host) {
            return None;
        }
        let segments: Vec<&str> = url.path_segments()?.collect();
        let [owner, repo, "releases", "download", tag @ .., asset] = segments.as_slice() else {
            return None;
        };
        if tag.is_empty() || [owner, repo, asset].iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            tag: tag.join("/"),
            asset: asset.to_string(),
        })
    }
}

/// One downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    #[serde(default)]
    pub digest: Option<String>,
}

/// Read-only, best-effort release metadata provider.
#[async_trait]
pub trait ReleaseMetadata: Send + Sync {
    async fn assets(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Vec<ReleaseAsset>, String>;
}

/// Look up the host-published digest of `url`.
pub async fn lookup_digest(
    metadata: &dyn ReleaseMetadata,
    url: &HttpUrl,
    host: &str,
) -> Result<Sha256Digest, UnresolvedDigest> {
    let coords =
        ReleaseCoordinates::from_url(url, host).ok_or_else(|| UnresolvedDigest::NotReleaseUrl {
            url: url.to_string(),
        })?;
    let assets = metadata
        .assets(&coords.owner, &coords.repo, &coords.tag)
        .await
        .map_err(|reason| UnresolvedDigest::ReleaseUnavailable {
            owner: coords.owner.clone(),
            repo: coords.repo.clone(),
            tag: coords.tag.clone(),
            reason,
        })?;
    let asset = assets
        .iter()
        .find(|asset| same_url(&asset.download_url, url))
        .ok_or_else(|| UnresolvedDigest::AssetNotFound {
            owner: coords.owner.clone(),
            repo: coords.repo.clone(),
            tag: coords.tag.clone(),
            asset: coords.asset.clone(),
        })?;
    let raw = asset
        .digest
        .as_deref()
        .ok_or_else(|| UnresolvedDigest::DigestMissing {
            url: url.to_string(),
        })?;
    tracing::debug!(%url, digest = raw, "release asset digest");
    Sha256Digest::parse_prefixed(raw)
}

fn same_url(candidate: &str, url: &HttpUrl) -> bool {
    HttpUrl::parse(candidate).is_ok_and(|parsed| &parsed == url)
}

/// GitHub REST API client for `GET /repos/{owner}/{repo}/releases/tags/{tag}`.
pub struct GithubReleases {
    client: Client,
    api_base: HttpUrl,
}

#[derive(Deserialize)]
struct ReleaseDocument {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

impl GithubReleases {
    pub fn new(cfg: &ReleaseConfig, timeout: Duration) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        if let Some(token) = &cfg.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| "GITHUB_TOKEN contains invalid header characters".to_string())?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|err| format!("failed to build release API client: {err}"))?;
        let api_base = cfg.api_base().map_err(|err| err.to_string())?;
        Ok(Self { client, api_base })
    }

    fn release_url(&self, owner: &str, repo: &str, tag: &str) -> Result<url::Url, String> {
        let mut url = self.api_base.as_url().clone();
        url.path_segments_mut()
            .map_err(|_| format!("release API base {} cannot take a path", self.api_base))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "releases", "tags", tag]);
        Ok(url)
    }
}

#[async_trait]
impl ReleaseMetadata for GithubReleases {
    async fn assets(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Vec<ReleaseAsset>, String> {
        let url = self.release_url(owner, repo, tag)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| format!("request to {url} failed: {err}"))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err("release not found".into()),
            status if !status.is_success() => {
                return Err(format!("release API answered HTTP {}", status.as_u16()));
            }
            _ => {}
        }
        let release: ReleaseDocument = response
            .json()
            .await
            .map_err(|err| format!("release API response is not valid JSON: {err}"))?;
        Ok(release.assets)
    }
}
